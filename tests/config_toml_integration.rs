use localcode::cli::ConfigDiscovery;
use localcode::integration::{AssistantConfig, ConfigError};
use localcode::llm::ProviderKind;
use serial_test::serial;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_config_serialization_roundtrip() {
    let mut original_config = AssistantConfig::default();
    original_config.connection.endpoint = Some("localhost:1234".to_string());
    original_config.connection.provider = Some(ProviderKind::LmStudio);
    original_config.retry.overrides.rate_limit = Some(8);

    let toml_str = original_config
        .to_toml_string()
        .expect("Should be able to serialize config to TOML");
    assert!(toml_str.contains("[circuit_breaker]"), "Should contain breaker section");
    assert!(toml_str.contains("lm_studio"), "Provider kind should be snake_case");

    let deserialized_config =
        AssistantConfig::from_toml_str(&toml_str).expect("Should be able to deserialize TOML");
    assert_eq!(original_config, deserialized_config);
}

#[test]
fn test_config_file_operations() {
    let original_config = AssistantConfig::default();

    let temp_file = NamedTempFile::new().expect("Should be able to create temporary file");
    let temp_path = temp_file.path();

    original_config
        .to_toml_file(temp_path)
        .expect("Should be able to save config to file");
    let loaded_config =
        AssistantConfig::from_toml_file(temp_path).expect("Should be able to load config from file");

    assert_eq!(original_config, loaded_config);
}

#[test]
fn test_handwritten_config() {
    let config = AssistantConfig::from_toml_str(
        r#"
        [connection]
        provider = "vllm"
        endpoint = "http://gpu-box:8000"
        default_model = "Qwen/Qwen2.5-Coder-32B-Instruct"

        [retry]
        jitter = false
        initial_delay = { secs = 2, nanos = 0 }

        [retry.overrides]
        network = 5

        [stream]
        max_stall = { secs = 45, nanos = 0 }
        "#,
    )
    .expect("Should parse hand-written config");

    assert_eq!(config.connection.provider, Some(ProviderKind::Vllm));
    assert_eq!(config.connection.endpoint.as_deref(), Some("http://gpu-box:8000"));
    assert!(!config.retry.jitter);
    assert_eq!(config.retry.initial_delay, Duration::from_secs(2));
    assert_eq!(config.retry.overrides.network, Some(5));
    assert_eq!(config.stream.max_stall, Duration::from_secs(45));
    assert_eq!(config.stream.max_duration, Duration::from_secs(120));
}

#[test]
fn test_invalid_config_rejected() {
    let err = AssistantConfig::from_toml_str("[connection]\nprovider = \"llamafile\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));

    let err = AssistantConfig::from_toml_str(
        "[retry]\ninitial_delay = { secs = 300, nanos = 0 }\n",
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
#[serial]
fn test_discovery_prefers_project_file_and_applies_env() {
    let project = TempDir::new().unwrap();
    std::fs::write(
        project.path().join("localcode.toml"),
        "[connection]\nendpoint = \"localhost:8080\"\nprovider = \"tgi\"\n",
    )
    .unwrap();

    let previous_dir = std::env::current_dir().unwrap();
    std::env::set_current_dir(project.path()).unwrap();
    unsafe {
        std::env::set_var("LOCALCODE_MODEL", "bigcode/starcoder2-15b");
    }

    let found = ConfigDiscovery::find_config_file();
    let config = ConfigDiscovery::discover_config();

    unsafe {
        std::env::remove_var("LOCALCODE_MODEL");
    }
    std::env::set_current_dir(previous_dir).unwrap();

    assert_eq!(
        found.unwrap().file_name().unwrap(),
        std::ffi::OsStr::new("localcode.toml")
    );
    let config = config.unwrap();
    assert_eq!(config.connection.provider, Some(ProviderKind::Tgi));
    assert_eq!(config.connection.endpoint.as_deref(), Some("localhost:8080"));
    assert_eq!(
        config.connection.default_model.as_deref(),
        Some("bigcode/starcoder2-15b")
    );
}

#[test]
#[serial]
fn test_explicit_config_path_with_bad_env_override() {
    let file = NamedTempFile::new().unwrap();
    AssistantConfig::default().to_toml_file(file.path()).unwrap();

    unsafe {
        std::env::set_var("LOCALCODE_ENDPOINT", "localhost:notaport");
    }
    let result = ConfigDiscovery::load(file.path());
    unsafe {
        std::env::remove_var("LOCALCODE_ENDPOINT");
    }

    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

//! Command line argument parsing
//!
//! Subcommands:
//! - `detect`: Find a running local LLM server
//! - `test`: Probe the configured server and report its health
//! - `models`: List the models the server offers
//! - `chat`: Send one prompt and stream the answer
//! - `interactive`: Line-oriented chat loop
//! - `show-config`: Show configuration discovery information

use crate::integration::{AssistantConfig, ConfigError};
use crate::llm::{GenerationOptions, ProviderKind};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug)]
pub enum ExecutionMode {
    Detect { all: bool, json: bool },
    Test { json: bool },
    Models { json: bool },
    Chat(ChatConfig),
    Interactive(InteractiveConfig),
    ShowConfig,
    InitConfig,
}

#[derive(Debug)]
pub struct ChatConfig {
    pub prompt: String,
    pub system: Option<String>,
    pub model: Option<String>,
    pub options: GenerationOptions,
}

#[derive(Debug)]
pub struct InteractiveConfig {
    pub system: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Parser)]
#[command(name = "localcode")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Local-first coding assistant client for Ollama, LM Studio, vLLM, TGI and OpenAI-compatible servers")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path (skips discovery)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    /// Server endpoint, host:port or URL (skips detection)
    #[arg(short = 'e', long = "endpoint", global = true)]
    pub endpoint: Option<String>,
    /// Server protocol: ollama, lm_studio, vllm, tgi, openai_compatible
    #[arg(short = 'p', long = "provider", global = true)]
    pub provider: Option<String>,
    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Find a running local LLM server
    Detect {
        /// Report every responsive server instead of the first one
        #[arg(long = "all")]
        all: bool,
        /// Print JSON instead of text
        #[arg(long = "json")]
        json: bool,
    },
    /// Probe the server and report reachability, latency and models
    Test {
        #[arg(long = "json")]
        json: bool,
    },
    /// List available models
    Models {
        #[arg(long = "json")]
        json: bool,
    },
    /// Send one prompt and stream the answer to stdout
    Chat {
        /// Prompt text
        prompt: String,
        /// System message
        #[arg(short = 's', long = "system")]
        system: Option<String>,
        /// Model name (defaults to the configured or first listed model)
        #[arg(short = 'm', long = "model")]
        model: Option<String>,
        #[arg(short = 't', long = "temperature")]
        temperature: Option<f32>,
        #[arg(long = "max-tokens")]
        max_tokens: Option<u32>,
        /// Ask the server for a JSON object
        #[arg(long = "json-mode")]
        json_mode: bool,
    },
    /// Run an interactive chat loop
    Interactive {
        #[arg(short = 's', long = "system")]
        system: Option<String>,
        #[arg(short = 'm', long = "model")]
        model: Option<String>,
    },
    /// Show configuration discovery information
    ShowConfig,
    /// Write a default ~/.localcode/config.toml if none exists
    InitConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Detect { all, json }) => Ok(ExecutionMode::Detect {
                all: *all,
                json: *json,
            }),
            Some(Commands::Test { json }) => Ok(ExecutionMode::Test { json: *json }),
            Some(Commands::Models { json }) => Ok(ExecutionMode::Models { json: *json }),
            Some(Commands::Chat {
                prompt,
                system,
                model,
                temperature,
                max_tokens,
                json_mode,
            }) => {
                if prompt.trim().is_empty() {
                    return Err("Prompt must not be empty.".to_string());
                }
                Ok(ExecutionMode::Chat(ChatConfig {
                    prompt: prompt.clone(),
                    system: system.clone(),
                    model: model.clone(),
                    options: GenerationOptions {
                        temperature: *temperature,
                        max_tokens: *max_tokens,
                        json_mode: *json_mode,
                        stop: Vec::new(),
                    },
                }))
            }
            Some(Commands::Interactive { system, model }) => {
                Ok(ExecutionMode::Interactive(InteractiveConfig {
                    system: system.clone(),
                    model: model.clone(),
                }))
            }
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            Some(Commands::InitConfig) => Ok(ExecutionMode::InitConfig),
            None => Err(
                "No command specified. Use 'localcode --help' to see available commands."
                    .to_string(),
            ),
        }
    }

    /// Applies `--endpoint` and `--provider`, which take precedence over the
    /// configuration file and environment.
    pub fn apply_overrides(&self, config: &mut AssistantConfig) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.endpoint {
            config.connection.endpoint = Some(endpoint.clone());
        }
        if let Some(provider) = &self.provider {
            let kind = provider
                .parse::<ProviderKind>()
                .map_err(|e| ConfigError::Invalid(e.message))?;
            config.connection.provider = Some(kind);
        }
        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_init_config_command() {
        let args = Args::try_parse_from(["localcode", "init-config"]).unwrap();
        assert!(matches!(args.mode(), Ok(ExecutionMode::InitConfig)));
    }

    #[test]
    fn test_chat_command_options() {
        let args = Args::try_parse_from([
            "localcode",
            "chat",
            "explain this",
            "--model",
            "qwen2.5-coder",
            "--temperature",
            "0.2",
            "--json-mode",
        ])
        .unwrap();
        let mode = args.mode().unwrap();

        if let ExecutionMode::Chat(config) = mode {
            assert_eq!(config.prompt, "explain this");
            assert_eq!(config.model.as_deref(), Some("qwen2.5-coder"));
            assert_eq!(config.options.temperature, Some(0.2));
            assert!(config.options.json_mode);
        } else {
            panic!("Expected Chat mode");
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "localcode",
            "detect",
            "--all",
            "--endpoint",
            "localhost:8000",
            "-v",
        ])
        .unwrap();
        assert!(args.verbose);
        assert!(matches!(
            args.mode().unwrap(),
            ExecutionMode::Detect {
                all: true,
                json: false
            }
        ));

        let mut config = AssistantConfig::default();
        args.apply_overrides(&mut config).unwrap();
        assert_eq!(config.connection.endpoint.as_deref(), Some("localhost:8000"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let args = Args::try_parse_from(["localcode", "test", "--provider", "llamafile"]).unwrap();
        let mut config = AssistantConfig::default();
        assert!(args.apply_overrides(&mut config).is_err());
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let args = Args::try_parse_from(["localcode", "chat", "  "]).unwrap();
        assert!(args.mode().is_err());
    }
}

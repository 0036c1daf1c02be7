use localcode::llm::{
    LLMProvider, ProviderConfig, ProviderDetector, ProviderEndpoint, ProviderKind,
};
use localcode::ErrorCategory;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> ProviderConfig {
    ProviderConfig {
        probe_timeout: Duration::from_millis(500),
        ..ProviderConfig::default()
    }
}

fn endpoint(server: &MockServer) -> ProviderEndpoint {
    ProviderEndpoint::parse(&server.uri()).unwrap()
}

/// A localhost port with nothing listening on it.
fn closed_port() -> ProviderEndpoint {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    ProviderEndpoint::new("127.0.0.1", port)
}

async fn mount_models(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{ "id": "local-model" }]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_most_specific_protocol_wins() {
    // Ollama also answers the OpenAI-style listing
    let server = MockServer::start().await;
    mount_models(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": "0.5.7" })))
        .mount(&server)
        .await;

    let detector = ProviderDetector::with_candidates(vec![endpoint(&server)], fast_config());
    let detected = detector.detect().await.expect("server should be detected");
    assert_eq!(detected.kind, ProviderKind::Ollama);
    assert_eq!(detected.endpoint, endpoint(&server));
}

#[tokio::test]
async fn test_plain_openai_server_falls_back_to_generic() {
    let server = MockServer::start().await;
    mount_models(&server).await;

    let detector = ProviderDetector::with_candidates(vec![endpoint(&server)], fast_config());
    let detected = detector.detect_at(endpoint(&server), None).await.unwrap();
    assert_eq!(detected.kind, ProviderKind::OpenAiCompatible);
    assert_eq!(detected.provider.kind(), ProviderKind::OpenAiCompatible);
}

#[tokio::test]
async fn test_nothing_listening() {
    let detector = ProviderDetector::with_candidates(vec![closed_port()], fast_config());
    assert!(detector.detect().await.is_none());
    assert!(detector.scan().await.is_empty());

    let err = detector.detect_at(closed_port(), None).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::Network);
    assert!(!detector.suggestions().is_empty());
}

#[tokio::test]
async fn test_scan_reports_every_server() {
    let tgi = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/info"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "model_id": "bigcode/starcoder2-3b" })),
        )
        .mount(&tgi)
        .await;
    let generic = MockServer::start().await;
    mount_models(&generic).await;

    let detector = ProviderDetector::with_candidates(
        vec![endpoint(&tgi), closed_port(), endpoint(&generic)],
        fast_config(),
    );
    let found: Vec<ProviderKind> = detector.scan().await.into_iter().map(|d| d.kind).collect();
    assert_eq!(found, vec![ProviderKind::Tgi, ProviderKind::OpenAiCompatible]);
}

#[tokio::test]
async fn test_explicit_kind_that_does_not_answer() {
    let server = MockServer::start().await;
    mount_models(&server).await;

    let detector = ProviderDetector::with_candidates(Vec::new(), fast_config());
    let err = detector
        .detect_at(endpoint(&server), Some(ProviderKind::Vllm))
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::Configuration);
    assert_eq!(err.context("provider"), Some("vllm"));
}

#[tokio::test]
async fn test_slow_server_is_not_detected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "version": "0.5.7" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let detector = ProviderDetector::with_candidates(vec![endpoint(&server)], fast_config());
    let started = std::time::Instant::now();
    assert!(detector.detect().await.is_none());
    assert!(started.elapsed() < Duration::from_secs(3));
}

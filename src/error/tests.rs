use super::*;
use std::io;
use std::time::Duration;

#[test]
fn test_status_codes_map_to_categories() {
    assert_eq!(classify_status(401, "").category, ErrorCategory::Auth);
    assert_eq!(classify_status(403, "").category, ErrorCategory::Auth);
    assert_eq!(classify_status(404, "").category, ErrorCategory::ModelNotFound);
    assert_eq!(classify_status(429, "").category, ErrorCategory::RateLimit);
    assert_eq!(classify_status(400, "").category, ErrorCategory::InvalidRequest);
    assert_eq!(classify_status(503, "").category, ErrorCategory::ProviderError);
    assert_eq!(classify_status(418, "").category, ErrorCategory::Unknown);
}

#[test]
fn test_context_overflow_payload_wins_over_status() {
    let body = r#"{"object":"error","message":"This model's maximum context length is 4096 tokens. However, you requested 5120 tokens.","type":"BadRequestError"}"#;
    let error = classify_status(400, body);
    assert_eq!(error.category, ErrorCategory::ContextLength);
    assert!(!error.recoverable);
    assert!(error.message.contains("maximum context length"));

    let tgi = r#"{"error":"Input validation error: `inputs` tokens + `max_new_tokens` must be <= 4096. Given: 4000 `inputs` tokens and 200 `max_new_tokens`","error_type":"validation"}"#;
    assert_eq!(classify_status(422, tgi).category, ErrorCategory::ContextLength);
}

#[test]
fn test_extract_error_message_shapes() {
    assert_eq!(
        extract_error_message(r#"{"error":{"message":"bad model","type":"invalid"}}"#).as_deref(),
        Some("bad model")
    );
    assert_eq!(
        extract_error_message(r#"{"error":"model 'x' not found"}"#).as_deref(),
        Some("model 'x' not found")
    );
    assert_eq!(
        extract_error_message(r#"{"message":"nope"}"#).as_deref(),
        Some("nope")
    );
    assert_eq!(extract_error_message("not json"), None);
    assert_eq!(extract_error_message(r#"{"error":""}"#), None);
}

#[test]
fn test_non_retryable_categories() {
    for category in [
        ErrorCategory::Auth,
        ErrorCategory::ModelNotFound,
        ErrorCategory::ContextLength,
        ErrorCategory::Configuration,
    ] {
        let error = ClassifiedError::new(category, "x");
        assert!(!error.recoverable, "{} should not be recoverable", category);
    }
}

#[test]
fn test_unknown_defaults() {
    let error = classify_message("something odd happened");
    assert_eq!(error.category, ErrorCategory::Unknown);
    assert_eq!(error.severity, Severity::Medium);
    assert!(error.recoverable);
}

#[test]
fn test_message_heuristics() {
    assert_eq!(
        classify_message("error sending request: Connection refused (os error 111)").category,
        ErrorCategory::Network
    );
    assert_eq!(
        classify_message("model 'llama9' not found, try pulling it first").category,
        ErrorCategory::ModelNotFound
    );
    assert_eq!(
        classify_message("operation timed out").category,
        ErrorCategory::Timeout
    );
}

#[test]
fn test_io_errors() {
    let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
    assert_eq!(refused.classify().category, ErrorCategory::Network);

    let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
    assert_eq!(missing.classify().category, ErrorCategory::FileNotFound);

    let slow = io::Error::new(io::ErrorKind::TimedOut, "slow");
    assert_eq!(ClassifiedError::from(slow).category, ErrorCategory::Timeout);
}

#[test]
fn test_json_error_is_parse_error() {
    let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let classified = classify(&err);
    assert_eq!(classified.category, ErrorCategory::ParseError);
    assert!(classified.recoverable);

    let err = serde_json::from_str::<serde_json::Value>("[1, 2").unwrap_err();
    let converted = ClassifiedError::from(err);
    assert_eq!(converted.category, ErrorCategory::ParseError);
    assert_eq!(converted.context("line"), Some("1"));
}

#[tokio::test]
async fn test_connection_refused_from_reqwest() {
    // Bind and immediately release a port so nothing is listening on it.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/", port))
        .send()
        .await
        .unwrap_err();

    let classified = ClassifiedError::from(err);
    assert_eq!(classified.category, ErrorCategory::Network);
    assert!(classified.context("url").is_some());
}

#[test]
fn test_circuit_open_condition() {
    let error = ClassifiedError::circuit_open("http://localhost:11434", Duration::from_millis(41_200));
    assert!(error.is_circuit_open());
    assert!(!error.recoverable);
    assert_eq!(error.message, "provider unresponsive, will retry in 42s");
    assert!(error.user_message().contains("hint:"));
}

#[test]
fn test_cancelled_condition() {
    let error = ClassifiedError::cancelled("interrupted by user");
    assert!(error.is_cancelled());
    assert!(!error.recoverable);
    assert!(!error.is_circuit_open());
}

#[test]
fn test_retry_after_hint() {
    let error = classify_status(429, "").with_context("retry_after_ms", "1500");
    assert_eq!(error.retry_after(), Some(Duration::from_millis(1500)));
    assert_eq!(classify_status(429, "").retry_after(), None);
}

#[test]
fn test_category_round_trips_through_str() {
    for category in ErrorCategory::ALL {
        let parsed: ErrorCategory = category.as_str().parse().unwrap();
        assert_eq!(parsed, category);
    }
    assert!("bogus".parse::<ErrorCategory>().is_err());
}

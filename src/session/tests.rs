use crate::error::{ClassifiedError, ErrorCategory};
use crate::session::*;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_input_denied_while_streaming() {
    let guard = ConcurrencyGuard::default();
    assert!(guard.can_accept_input().allowed);

    let permit = guard.begin_turn().unwrap();
    assert!(guard.is_streaming());

    tokio::time::advance(Duration::from_secs(1)).await;
    let decision = guard.can_accept_input();
    assert!(!decision.allowed);
    assert_eq!(decision.reason.as_deref(), Some("a response is still streaming"));
    assert_eq!(guard.begin_turn().unwrap_err(), GuardError::Busy);

    drop(permit);
    assert!(!guard.is_streaming());
    assert!(guard.can_accept_input().allowed);
}

#[tokio::test(start_paused = true)]
async fn test_minimum_input_interval() {
    let guard = ConcurrencyGuard::default();
    drop(guard.begin_turn().unwrap());

    tokio::time::advance(Duration::from_millis(40)).await;
    let decision = guard.can_accept_input();
    assert!(!decision.allowed);
    assert_eq!(
        guard.begin_turn().unwrap_err(),
        GuardError::TooSoon {
            wait: Duration::from_millis(60)
        }
    );

    tokio::time::advance(Duration::from_millis(60)).await;
    assert!(guard.can_accept_input().allowed);
    assert!(guard.begin_turn().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_streaming_flag_cleared_when_turn_panics() {
    let guard = ConcurrencyGuard::default();
    let worker = guard.clone();

    let result = tokio::spawn(async move {
        let _permit = worker.begin_turn().unwrap();
        panic!("turn failed");
    })
    .await;
    assert!(result.is_err());

    assert!(!guard.is_streaming());
    tokio::time::advance(Duration::from_millis(100)).await;
    assert!(guard.begin_turn().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_active_turn() {
    let guard = ConcurrencyGuard::default();
    assert!(!guard.cancel_active());

    let permit = guard.begin_turn().unwrap();
    assert!(!permit.is_cancelled());
    assert!(guard.cancel_active());
    assert!(permit.cancel_token().is_cancelled());

    drop(permit);
    assert!(!guard.cancel_active());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_submissions_admit_one_turn() {
    let guard = ConcurrencyGuard::new(GuardConfig {
        min_input_interval: Duration::ZERO,
    });

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let guard = guard.clone();
            tokio::spawn(async move { guard.begin_turn().map(|permit| std::mem::forget(permit)) })
        })
        .collect();

    let mut admitted = 0;
    for attempt in attempts {
        if attempt.await.unwrap().is_ok() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
    assert!(guard.is_streaming());
}

#[test]
fn test_guard_error_classification() {
    let error = ClassifiedError::from(GuardError::Busy);
    assert_eq!(error.category, ErrorCategory::InvalidRequest);
    assert!(!error.recoverable);

    let too_soon = GuardError::TooSoon {
        wait: Duration::from_millis(25),
    };
    assert_eq!(too_soon.to_string(), "input arrived too soon, wait 25ms");
}

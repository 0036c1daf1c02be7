use super::*;
use crate::error::{ClassifiedError, ErrorCategory};
use crate::llm::provider::TextStream;
use futures::StreamExt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn chunks_then_hang(count: usize) -> TextStream {
    let chunks = (0..count).map(|i| Ok::<_, ClassifiedError>(format!("c{} ", i)));
    Box::pin(futures::stream::iter(chunks).chain(futures::stream::pending()))
}

fn ticking(every: Duration) -> TextStream {
    Box::pin(async_stream::stream! {
        loop {
            tokio::time::sleep(every).await;
            yield Ok::<_, ClassifiedError>("tick".to_string());
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_stall_preserves_partial_output() {
    let cancel = CancellationToken::new();
    let started = Instant::now();
    let monitored = monitor_stream(chunks_then_hang(10), StreamHealthConfig::default(), cancel.clone());

    let mut seen = 0;
    let outcome = collect_stream(monitored, |_| seen += 1).await;

    assert_eq!(seen, 10);
    assert_eq!(outcome.chunk_count, 10);
    assert!(outcome.text.starts_with("c0 c1 "));
    assert!(outcome.interrupted());

    let error = outcome.error.unwrap();
    assert_eq!(error.category, ErrorCategory::Network);
    assert_eq!(error.message, "stream stalled, no data received");
    assert_eq!(error.context("chunk_count"), Some("10"));
    assert_eq!(error.context("bytes_received"), Some("30"));
    assert!(cancel.is_cancelled());
    assert_eq!(started.elapsed(), Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_maximum_duration_enforced_on_active_stream() {
    let cancel = CancellationToken::new();
    let monitored = monitor_stream(
        ticking(Duration::from_secs(10)),
        StreamHealthConfig::default(),
        cancel.clone(),
    );

    let outcome = collect_stream(monitored, |_| {}).await;
    let error = outcome.error.unwrap();
    assert_eq!(error.category, ErrorCategory::Timeout);
    assert_eq!(error.message, "stream exceeded maximum duration");
    assert_eq!(error.context("elapsed_ms"), Some("120000"));
    assert!(outcome.chunk_count >= 11);
    assert!(cancel.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_no_first_chunk_counts_as_stall() {
    let config = StreamHealthConfig {
        max_duration: Duration::from_secs(120),
        max_stall: Duration::from_secs(5),
    };
    let monitored = monitor_stream(chunks_then_hang(0), config, CancellationToken::new());

    let outcome = collect_stream(monitored, |_| {}).await;
    assert_eq!(outcome.chunk_count, 0);
    assert!(!outcome.interrupted());
    assert_eq!(outcome.error.unwrap().category, ErrorCategory::Network);
}

#[tokio::test(start_paused = true)]
async fn test_external_cancellation_ends_stream() {
    let cancel = CancellationToken::new();
    let monitored = monitor_stream(chunks_then_hang(2), StreamHealthConfig::default(), cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let outcome = collect_stream(monitored, |_| {}).await;
    assert_eq!(outcome.text, "c0 c1 ");
    let error = outcome.error.unwrap();
    assert!(error.is_cancelled());
    assert!(!error.recoverable);
}

#[tokio::test]
async fn test_inner_error_is_annotated_and_ends_stream() {
    let inner: TextStream = Box::pin(futures::stream::iter(vec![
        Ok("partial".to_string()),
        Err(ClassifiedError::network("connection reset")),
        Ok("never seen".to_string()),
    ]));
    let outcome = collect_stream(
        monitor_stream(inner, StreamHealthConfig::default(), CancellationToken::new()),
        |_| {},
    )
    .await;

    assert_eq!(outcome.text, "partial");
    let error = outcome.error.unwrap();
    assert_eq!(error.category, ErrorCategory::Network);
    assert_eq!(error.context("chunk_count"), Some("1"));
}

#[tokio::test]
async fn test_healthy_stream_completes() {
    let inner: TextStream = Box::pin(futures::stream::iter(vec![
        Ok("Hello".to_string()),
        Ok(", world".to_string()),
    ]));
    let cancel = CancellationToken::new();
    let outcome = collect_stream(
        monitor_stream(inner, StreamHealthConfig::default(), cancel.clone()),
        |_| {},
    )
    .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.text, "Hello, world");
    assert_eq!(outcome.chunk_count, 2);
    assert!(!cancel.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_monitor_deadlines() {
    let mut monitor =
        StreamHealthMonitor::new(StreamHealthConfig::default(), CancellationToken::new());
    let started = monitor.session().started_at;
    assert!(monitor.check().is_ok());
    assert_eq!(monitor.next_deadline(), started + Duration::from_secs(30));

    tokio::time::advance(Duration::from_secs(20)).await;
    monitor.record_chunk(4);
    assert_eq!(monitor.next_deadline(), started + Duration::from_secs(50));

    tokio::time::advance(Duration::from_secs(94)).await;
    for _ in 0..5 {
        tokio::time::advance(Duration::from_secs(1)).await;
        monitor.record_chunk(1);
    }
    // Stall deadline is past the total budget now
    assert_eq!(monitor.next_deadline(), started + Duration::from_secs(120));
    assert!(monitor.check().is_ok());
    assert!(!monitor.cancel_token().is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_slow_establishment_counts_toward_stall() {
    let config = StreamHealthConfig {
        max_duration: Duration::from_secs(120),
        max_stall: Duration::from_secs(5),
    };
    let cancel = CancellationToken::new();
    let monitor = StreamHealthMonitor::new(config, cancel.clone());

    // Headers after 3s, then silence: the stall window started before them
    let stream = monitor
        .establish(async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok::<_, ClassifiedError>(chunks_then_hang(0))
        })
        .await
        .unwrap();
    let started = Instant::now();
    let outcome = collect_stream(watch_stream(stream, monitor), |_| {}).await;

    assert_eq!(outcome.error.unwrap().category, ErrorCategory::Network);
    assert_eq!(started.elapsed(), Duration::from_secs(2));
    assert!(cancel.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_establishment() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let monitor = StreamHealthMonitor::new(StreamHealthConfig::default(), cancel);

    let result = monitor
        .establish(futures::future::pending::<Result<TextStream, ClassifiedError>>())
        .await;
    let error = result.err().unwrap();
    assert!(error.is_cancelled());
    assert_eq!(error.context("chunk_count"), Some("0"));
}

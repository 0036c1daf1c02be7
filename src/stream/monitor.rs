use crate::error::ClassifiedError;
use crate::llm::provider::TextStream;
use crate::stream::types::{StreamHealthConfig, StreamOutcome, StreamSession};
use futures::StreamExt;
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Watches one stream for the duration and stall limits.
#[derive(Debug)]
pub struct StreamHealthMonitor {
    config: StreamHealthConfig,
    session: StreamSession,
    cancel: CancellationToken,
}

impl StreamHealthMonitor {
    pub fn new(config: StreamHealthConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            session: StreamSession::start(),
            cancel,
        }
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn record_chunk(&mut self, bytes: usize) {
        self.session.last_chunk_at = Some(Instant::now());
        self.session.chunk_count += 1;
        self.session.bytes_received += bytes as u64;
    }

    /// Fails once either limit is reached, cancelling the token so the
    /// producer stops as well.
    ///
    /// A limit counts as reached at exactly its configured value.
    pub fn check(&self) -> Result<(), ClassifiedError> {
        let error = if self.session.elapsed() >= self.config.max_duration {
            ClassifiedError::timeout("stream exceeded maximum duration").with_context(
                "max_duration_ms",
                self.config.max_duration.as_millis().to_string(),
            )
        } else if self.session.idle() >= self.config.max_stall {
            ClassifiedError::network("stream stalled, no data received").with_context(
                "max_stall_ms",
                self.config.max_stall.as_millis().to_string(),
            )
        } else {
            return Ok(());
        };

        warn!(
            "Stream aborted after {} chunks: {}",
            self.session.chunk_count, error.message
        );
        self.cancel.cancel();
        Err(self.annotate(error))
    }

    /// Awaits `setup` (resolving a model, sending the request, waiting
    /// for response headers) under the same limits and cancellation token as
    /// the chunks that follow.
    ///
    /// Dropping `setup` on cancellation also abandons any retry backoff
    /// it is sleeping through.
    pub async fn establish<T, Fut>(&self, setup: Fut) -> Result<T, ClassifiedError>
    where
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        tokio::pin!(setup);
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Stream cancelled before the first byte");
                    return Err(self.annotate(ClassifiedError::cancelled(
                        "stream cancelled before it started",
                    )));
                }
                _ = tokio::time::sleep_until(deadline) => self.check()?,
                result = &mut setup => return result,
            }
        }
    }

    /// The earliest instant at which [`StreamHealthMonitor::check`] can fail.
    pub fn next_deadline(&self) -> Instant {
        let duration_deadline = self.session.started_at + self.config.max_duration;
        let stall_deadline =
            self.session.last_chunk_at.unwrap_or(self.session.started_at) + self.config.max_stall;
        duration_deadline.min(stall_deadline)
    }

    /// Attaches the stream's progress counters to an error.
    pub fn annotate(&self, error: ClassifiedError) -> ClassifiedError {
        error
            .with_context("chunk_count", self.session.chunk_count.to_string())
            .with_context("bytes_received", self.session.bytes_received.to_string())
            .with_context("elapsed_ms", self.session.elapsed().as_millis().to_string())
    }
}

enum Event {
    Cancelled,
    Deadline,
    Item(Option<Result<String, ClassifiedError>>),
}

/// Wraps a text stream so it ends with a classified error when it runs too
/// long, stalls, or `cancel` is triggered.
///
/// Chunks already received are passed through unchanged, so the consumer
/// keeps partial output.
pub fn monitor_stream(
    stream: TextStream,
    config: StreamHealthConfig,
    cancel: CancellationToken,
) -> TextStream {
    watch_stream(stream, StreamHealthMonitor::new(config, cancel))
}

/// Like [`monitor_stream`], continuing with a monitor whose clock is already
/// running, typically one that guarded [`StreamHealthMonitor::establish`].
pub fn watch_stream(stream: TextStream, monitor: StreamHealthMonitor) -> TextStream {
    Box::pin(async_stream::stream! {
        let mut inner = stream;
        let mut monitor = monitor;
        let cancel = monitor.cancel_token().clone();

        loop {
            let deadline = monitor.next_deadline();
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => Event::Cancelled,
                _ = tokio::time::sleep_until(deadline) => Event::Deadline,
                item = inner.next() => Event::Item(item),
            };

            match event {
                Event::Cancelled => {
                    debug!("Stream cancelled after {} chunks", monitor.session().chunk_count);
                    yield Err(monitor.annotate(ClassifiedError::cancelled("stream cancelled")));
                    break;
                }
                Event::Deadline => {
                    if let Err(error) = monitor.check() {
                        yield Err(error);
                        break;
                    }
                }
                Event::Item(Some(Ok(text))) => {
                    monitor.record_chunk(text.len());
                    yield Ok(text);
                }
                Event::Item(Some(Err(error))) => {
                    yield Err(monitor.annotate(error));
                    break;
                }
                Event::Item(None) => break,
            }
        }
    })
}

/// Drains a stream, handing every chunk to `on_chunk` as it arrives.
pub async fn collect_stream<F>(mut stream: TextStream, mut on_chunk: F) -> StreamOutcome
where
    F: FnMut(&str),
{
    let started = Instant::now();
    let mut outcome = StreamOutcome::default();

    while let Some(item) = stream.next().await {
        match item {
            Ok(text) => {
                on_chunk(&text);
                outcome.text.push_str(&text);
                outcome.chunk_count += 1;
            }
            Err(error) => {
                outcome.error = Some(error);
                break;
            }
        }
    }

    outcome.elapsed = started.elapsed();
    outcome
}

//! # Benchmark Module
//!
//! Runs a stream-producing operation many times with bounded concurrency and
//! records when each run started, when each of its events arrived and when it
//! finished.
//!
//! ## Key Features:
//! - Concurrency capped by a semaphore, never more than `concurrency` runs in flight
//! - Fail-fast: the first failing run cancels every other run
//! - No run outlives [`Benchmark::run_streams`]
//! - Works with any stream whose items implement [`Event`]

pub mod runner;
pub mod timings;

pub use runner::{Benchmark, ProgressFn};
pub use timings::{tbts, totals, ttfts, RunTiming};

use crate::client::CompletionClient;
use crate::error::BenchError;
use crate::schemas::{ChatMessage, CompletionEvent};
use crate::streaming::{map, EventStream};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The part of an event the benchmark needs: where it sits in its stream and
/// when it arrived.
pub trait Event: Send {
    fn index(&self) -> usize;
    fn timestamp(&self) -> Instant;
}

impl<E: Event + ?Sized> Event for Box<E> {
    fn index(&self) -> usize {
        (**self).index()
    }

    fn timestamp(&self) -> Instant {
        (**self).timestamp()
    }
}

impl Event for CompletionEvent {
    fn index(&self) -> usize {
        CompletionEvent::index(self)
    }

    fn timestamp(&self) -> Instant {
        self.received_at()
    }
}

/// Type-erased stream of events for one benchmark run.
pub type BenchStream = Box<dyn EventStream<Item = Box<dyn Event>>>;

/// Erases the concrete event type of `stream`.
pub fn into_bench_stream<S>(stream: S) -> BenchStream
where
    S: EventStream + 'static,
    S::Item: Event + 'static,
{
    Box::new(map(stream, |event| Box::new(event) as Box<dyn Event>))
}

/// Starts the stream for one benchmark run.
///
/// Implemented for every `Fn(CancellationToken) -> impl Future<Output =
/// Result<BenchStream, BenchError>>`, so a closure is usually enough.
#[async_trait]
pub trait StreamFunc: Send + Sync {
    async fn start(&self, cancel: CancellationToken) -> Result<BenchStream, BenchError>;
}

#[async_trait]
impl<F, Fut> StreamFunc for F
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<BenchStream, BenchError>> + Send + 'static,
{
    async fn start(&self, cancel: CancellationToken) -> Result<BenchStream, BenchError> {
        (self)(cancel).await
    }
}

/// Stream factory that opens one chat completion per run.
pub fn benchmark_stream(
    client: CompletionClient,
    model: &str,
    messages: Vec<ChatMessage>,
) -> impl StreamFunc {
    let model: Arc<str> = Arc::from(model);
    let messages: Arc<[ChatMessage]> = Arc::from(messages);

    move |cancel: CancellationToken| {
        let client = client.clone();
        let model = model.clone();
        let messages = messages.clone();
        async move {
            let stream = client
                .stream_chat_completion(&model, &messages, &cancel)
                .await?;
            Ok::<BenchStream, BenchError>(into_bench_stream(stream.map(note_failure)))
        }
    }
}

fn note_failure(event: CompletionEvent) -> CompletionEvent {
    if let Some(err) = event.error() {
        debug!(index = event.index(), error = %err, "completion event failed");
    }
    event
}

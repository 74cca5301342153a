//! # NexusNitro Bench (nnbench) - Streaming Latency Benchmarking Library
//!
//! Drives OpenAI-compatible streaming chat completion APIs and measures how
//! quickly they answer: time to first token (TTFT), time between tokens (TBT)
//! and total time (TT), each reduced to average, minimum, median, maximum, P90
//! and P95.
//!
//! ## Features
//!
//! - **Pull-based streams**: every stage of the pipeline is a cancellable [`streaming::EventStream`]
//! - **Leak-free SSE reading**: response bodies are released exactly once, before a stream reports its end
//! - **Cancellable retries**: transport failures are retried with a fixed delay that cancellation cuts short
//! - **Fail-fast benchmarking**: bounded concurrency, and the first failing run stops all the others
//! - **Nearest-rank statistics**: percentiles that are exact and reproducible
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nexus_nitro_bench::{benchmark_stream, Benchmark, ChatMessage, CompletionClient, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::for_test();
//!     let client = CompletionClient::from_config(&config)?;
//!
//!     let messages = vec![ChatMessage::user("What is the capital of France?")];
//!     let result = Benchmark::new(12, 3)?
//!         .run(
//!             &CancellationToken::new(),
//!             benchmark_stream(client, &config.model, messages),
//!         )
//!         .await?;
//!
//!     println!("{}", nexus_nitro_bench::report::render_table(&result));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`streaming`] - Stream abstraction and the Server-Sent Events reader
//! - [`core`] - HTTP client construction and retrying request execution
//! - [`client`] - Streaming chat completion client
//! - [`schemas`] - Wire types and decoded completion events
//! - [`bench`] - Bounded-concurrency, fail-fast benchmark runner
//! - [`metrics`] - Latency distributions
//! - [`report`] - Table rendering
//! - [`chat`] - Multi-turn chat session
//! - [`config`] - Command-line and environment configuration
//! - [`error`] - Error taxonomy

// Core infrastructure
pub mod core;
pub mod config;
pub mod error;
pub mod graceful_shutdown;

// Streaming pipeline
pub mod streaming;
pub mod schemas;
pub mod client;

// Benchmarking and presentation
pub mod bench;
pub mod metrics;
pub mod report;
pub mod chat;

pub use bench::{benchmark_stream, into_bench_stream, BenchStream, Benchmark, Event, RunTiming, StreamFunc};
pub use chat::{ChatSession, Fragment};
pub use client::{chat_completions_endpoint, CompletionClient, CompletionStream};
pub use config::{Command, Config};
pub use crate::core::{HttpClientBuilder, RetryClient, RetryPolicy};
pub use error::BenchError;
pub use metrics::{BenchmarkResult, Metrics};
pub use schemas::{ChatCompletionChunk, ChatMessage, CompletionEvent};
pub use streaming::{EventStream, Next};

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, BenchError>;

//! # Error Types
//!
//! A single error enum covers every layer of the pipeline. Transport errors are
//! absorbed by the retry layer, decode errors are attached to individual events,
//! and everything that stops a run propagates to the benchmark runner, which
//! surfaces exactly one of them.

use crate::core::http_client::HttpClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    /// Invalid input detected before any work was attempted.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The governing cancellation token fired.
    #[error("Operation cancelled")]
    Cancelled,

    /// A single request/response exchange failed at the transport level.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("All {attempts} attempts failed, last error: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<BenchError>,
    },

    #[error("Unexpected status code: {status}, body: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Reading the response body failed for a reason other than end-of-input.
    #[error("Failed to read server-sent event: {0}")]
    StreamRead(#[source] std::io::Error),

    #[error("Failed to decode server-sent event: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    HttpClient(#[from] HttpClientError),

    #[error("Failed to start stream: {0}")]
    StreamStart(#[source] Box<BenchError>),

    #[error("Failed to drain stream: {0}")]
    StreamDrain(#[source] Box<BenchError>),

    /// A benchmark worker task panicked or was aborted.
    #[error("Benchmark worker failed: {0}")]
    Worker(String),
}

impl BenchError {
    /// Returns true if this error is, or wraps, a cancellation.
    ///
    /// Cancellation takes priority over whatever else went wrong at the same
    /// time, so callers use this to tell an interrupted benchmark apart from a
    /// failing backend.
    pub fn is_cancelled(&self) -> bool {
        match self {
            BenchError::Cancelled => true,
            BenchError::RetriesExhausted { source, .. }
            | BenchError::StreamStart(source)
            | BenchError::StreamDrain(source) => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for BenchError {
    fn from(err: std::io::Error) -> Self {
        BenchError::StreamRead(err)
    }
}

//! # Core Infrastructure
//!
//! HTTP client construction and retrying request execution.

pub mod http_client;
pub mod retry;

pub use http_client::{HttpClientBuilder, HttpClientConfig, HttpClientError, PoolConfig};
pub use retry::{retry, RetryClient, RetryPolicy};

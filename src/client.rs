//! # Completion Client
//!
//! Opens streaming chat completions against an OpenAI-compatible server and
//! exposes each response as a stream of decoded [`CompletionEvent`]s.
//!
//! ## Key Features:
//! - Request sent through [`RetryClient`], so transient connect failures are retried
//! - Non-200 responses surface the server's body for diagnostics
//! - Response body handed to the SSE reader without buffering
//! - Every request tagged with an `X-Request-Id` for log correlation

use crate::config::Config;
use crate::core::http_client::HttpClientBuilder;
use crate::core::retry::{RetryClient, RetryPolicy};
use crate::error::BenchError;
use crate::schemas::{ChatCompletionRequest, ChatMessage, CompletionEvent};
use crate::streaming::{map, read_server_sent_events, Map, RawEvent, SseStream};
use bytes::Bytes;
use futures_util::TryStreamExt;
use reqwest::{Client, StatusCode};
use std::io;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;
use uuid::Uuid;

const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";

/// Stream of decoded events produced by one chat completion.
pub type CompletionStream = Map<SseStream, fn(RawEvent) -> CompletionEvent>;

/// Joins the chat completions path onto `base`, keeping any path prefix the
/// base already carries (`http://host/proxy` becomes
/// `http://host/proxy/v1/chat/completions`).
pub fn chat_completions_endpoint(base: &str) -> Result<Url, BenchError> {
    let mut url = Url::parse(base.trim())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(BenchError::Config(format!(
            "base URL must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url.join(CHAT_COMPLETIONS_PATH)?)
}

/// # Completion Client
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    endpoint: Url,
    http: RetryClient,
}

impl CompletionClient {
    pub fn new(base_url: &str, client: Client, policy: RetryPolicy) -> Result<Self, BenchError> {
        policy.validate()?;
        Ok(Self {
            endpoint: chat_completions_endpoint(base_url)?,
            http: RetryClient::new(client, policy),
        })
    }

    /// Builds the HTTP client and retry policy from application configuration.
    pub fn from_config(config: &Config) -> Result<Self, BenchError> {
        let client = HttpClientBuilder::from_config(config).build()?;
        Self::new(&config.base_url, client, config.retry_policy())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Starts a streaming completion for `messages` and returns its events.
    ///
    /// Fails if the request cannot be sent within the retry budget, if the
    /// server answers with anything other than 200, or if `cancel` fires first.
    /// Once the stream is returned, decode and read failures are reported on
    /// individual events instead.
    pub async fn stream_chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<CompletionStream, BenchError> {
        let request_id = Uuid::new_v4();
        let request = self
            .http
            .client()
            .post(self.endpoint.clone())
            .header("X-Request-Id", request_id.to_string())
            .json(&ChatCompletionRequest::streaming(model, messages))
            .build()?;

        debug!(%request_id, model, messages = messages.len(), "sending streaming completion request");
        let response = self.http.execute(request, cancel).await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BenchError::Cancelled),
                body = response.text() => body.unwrap_or_else(|err| format!("<unreadable body: {err}>")),
            };
            debug!(%request_id, status = status.as_u16(), "completion request rejected");
            return Err(BenchError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        debug!(%request_id, "completion stream opened");
        let body: StreamReader<_, Bytes> =
            StreamReader::new(Box::pin(response.bytes_stream().map_err(io::Error::other)));
        let events = read_server_sent_events(body, cancel);

        Ok(map(events, CompletionEvent::from_raw as fn(RawEvent) -> CompletionEvent))
    }
}

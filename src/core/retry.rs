//! # Retrying Request Execution
//!
//! Retries a single request/response exchange on transport failure with a
//! fixed, cancellable delay between attempts.
//!
//! Only transport-level failures are retried. Any HTTP response, whatever its
//! status, counts as a successful exchange; judging the status belongs to the
//! caller. The stream that follows a successful exchange is never retried.

use crate::error::BenchError;
use reqwest::{Client, Request, Response};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How many times to attempt an exchange and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        if self.max_attempts == 0 {
            return Err(BenchError::Config(
                "max attempts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            delay: Duration::from_millis(50),
        }
    }
}

/// Runs `operation` until it succeeds or the policy's attempts are used up.
///
/// `operation` receives the 1-based attempt number. Both the attempt and the
/// wait after a failed attempt are raced against `cancel`; cancellation wins
/// over the pending failure and is reported as [`BenchError::Cancelled`].
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, BenchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BenchError>,
{
    policy.validate()?;

    let mut attempt = 1;
    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BenchError::Cancelled),
            outcome = operation(attempt) => outcome,
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "request succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) => {
                let err = err.into();
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "request attempt failed"
                );
                if attempt >= policy.max_attempts {
                    return Err(BenchError::RetriesExhausted {
                        attempts: policy.max_attempts,
                        source: Box::new(err),
                    });
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BenchError::Cancelled),
            _ = tokio::time::sleep(policy.delay) => {}
        }
        attempt += 1;
    }
}

/// HTTP client that re-sends rewindable requests on transport failure.
#[derive(Debug, Clone)]
pub struct RetryClient {
    client: Client,
    policy: RetryPolicy,
}

impl RetryClient {
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Executes `request`, retrying transport failures per the policy.
    ///
    /// The request body must be rewindable (buffered, not streamed) because
    /// every attempt sends a fresh copy. A request that cannot be copied is
    /// rejected before anything is sent. On success the caller owns the
    /// response and its body.
    pub async fn execute(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, BenchError> {
        if request.try_clone().is_none() {
            return Err(BenchError::Config(
                "request body must be rewindable for retrying".to_string(),
            ));
        }

        let client = self.client.clone();
        retry(&self.policy, cancel, move |_attempt| {
            let client = client.clone();
            let attempt_request = request.try_clone();
            async move {
                let attempt_request = attempt_request.ok_or_else(|| {
                    BenchError::Config("request body could not be rewound".to_string())
                })?;
                client
                    .execute(attempt_request)
                    .await
                    .map_err(BenchError::Transport)
            }
        })
        .await
    }
}

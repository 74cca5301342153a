//! # Benchmark Runner
//!
//! Admits runs through a semaphore, drives each one on its own task and folds
//! the results back on the caller's task, where the first failure is recorded
//! and turned into cancellation of everything else.

use super::timings::RunTiming;
use super::StreamFunc;
use crate::error::BenchError;
use crate::metrics::BenchmarkResult;
use crate::streaming::EventStream;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Observer called with `(completed, total)` after each successful run.
pub type ProgressFn = Box<dyn Fn(usize, usize) + Send + Sync>;

/// # Benchmark
///
/// Runs a [`StreamFunc`] `run_count` times with at most `concurrency` runs in
/// flight.
pub struct Benchmark {
    run_count: usize,
    concurrency: usize,
    progress: ProgressFn,
}

impl std::fmt::Debug for Benchmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Benchmark")
            .field("run_count", &self.run_count)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl Benchmark {
    pub fn new(run_count: usize, concurrency: usize) -> Result<Self, BenchError> {
        if concurrency == 0 {
            return Err(BenchError::Config(
                "concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            run_count,
            concurrency,
            progress: Box::new(|completed, total| {
                info!("[{}/{}] requests complete", completed, total);
            }),
        })
    }

    /// Replaces the default progress log line.
    pub fn on_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Box::new(progress);
        self
    }

    pub fn run_count(&self) -> usize {
        self.run_count
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs the benchmark and reduces the timings to latency distributions.
    pub async fn run<F>(
        &self,
        cancel: &CancellationToken,
        stream_func: F,
    ) -> Result<BenchmarkResult, BenchError>
    where
        F: StreamFunc + 'static,
    {
        let timings = self.run_streams(cancel, stream_func).await?;
        Ok(BenchmarkResult::from_timings(&timings))
    }

    /// Runs `stream_func` `run_count` times and returns one timing per run.
    ///
    /// Timings come back in completion order. The first run to fail cancels
    /// the others and its error is the one returned; nothing partial is
    /// returned on failure. Every run that was started has finished by the
    /// time this returns.
    pub async fn run_streams<F>(
        &self,
        cancel: &CancellationToken,
        stream_func: F,
    ) -> Result<Vec<RunTiming>, BenchError>
    where
        F: StreamFunc + 'static,
    {
        let total = self.run_count;
        if total == 0 {
            return Ok(Vec::new());
        }

        let token = cancel.child_token();
        let _cancel_on_return = token.clone().drop_guard();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let stream_func = Arc::new(stream_func);

        let mut workers = JoinSet::new();
        let mut timings = Vec::with_capacity(total);
        let mut first_error: Option<BenchError> = None;
        let mut started = 0;
        let mut admitting = true;

        debug!(total, concurrency = self.concurrency, "starting benchmark");

        loop {
            let can_admit = admitting && started < total;
            if !can_admit && workers.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    match flatten(joined) {
                        Ok(timing) => {
                            timings.push(timing);
                            (self.progress)(timings.len(), total);
                        }
                        Err(err) if first_error.is_none() => {
                            warn!(error = %err, "benchmark run failed, cancelling remaining runs");
                            token.cancel();
                            first_error = Some(err);
                        }
                        Err(err) => debug!(error = %err, "discarding error from cancelled run"),
                    }
                }
                permit = admit(&semaphore, &token), if can_admit => match permit {
                    Some(permit) => {
                        workers.spawn(run_one(started, stream_func.clone(), token.clone(), permit));
                        started += 1;
                    }
                    None => {
                        debug!(started, total, "admission stopped by cancellation");
                        admitting = false;
                    }
                },
                else => break,
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        if timings.len() < total {
            return Err(BenchError::Cancelled);
        }

        debug!(runs = timings.len(), "benchmark finished");
        Ok(timings)
    }
}

/// Waits for a concurrency slot, or returns `None` once `token` fires.
async fn admit(semaphore: &Arc<Semaphore>, token: &CancellationToken) -> Option<OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        permit = semaphore.clone().acquire_owned() => permit.ok(),
    }
}

async fn run_one<F>(
    run: usize,
    stream_func: Arc<F>,
    token: CancellationToken,
    permit: OwnedSemaphorePermit,
) -> Result<RunTiming, BenchError>
where
    F: StreamFunc + ?Sized,
{
    let start = Instant::now();
    let mut stream = stream_func
        .start(token.clone())
        .await
        .map_err(|err| BenchError::StreamStart(Box::new(err)))?;

    let events = stream
        .drain_all(&token)
        .await
        .map_err(|err| BenchError::StreamDrain(Box::new(err)))?;
    let end = Instant::now();
    drop(stream);

    let timing = RunTiming::new(start, end, events);
    debug!(run, events = timing.events().len(), elapsed = ?timing.total(), "run complete");

    drop(permit);
    Ok(timing)
}

fn flatten(joined: Result<Result<RunTiming, BenchError>, JoinError>) -> Result<RunTiming, BenchError> {
    match joined {
        Ok(outcome) => outcome,
        Err(err) => Err(BenchError::Worker(err.to_string())),
    }
}

//! # Metrics Module
//!
//! Reduces raw benchmark timings to latency distributions.
//!
//! ## Key Features:
//! - Average, minimum, median, maximum, P90 and P95 per distribution
//! - Nearest-rank percentiles: `sorted[floor((n - 1) * p / 100)]`, no interpolation
//! - Median averages the two central values for even-sized inputs
//! - Empty inputs reduce to all-zero metrics

use crate::bench::{tbts, totals, ttfts, RunTiming};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// # Metrics
///
/// Summary of one latency distribution. Serialized as fractional milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    #[serde(rename = "avg_ms", serialize_with = "as_millis")]
    pub avg: Duration,
    #[serde(rename = "min_ms", serialize_with = "as_millis")]
    pub min: Duration,
    #[serde(rename = "med_ms", serialize_with = "as_millis")]
    pub med: Duration,
    #[serde(rename = "max_ms", serialize_with = "as_millis")]
    pub max: Duration,
    #[serde(rename = "p90_ms", serialize_with = "as_millis")]
    pub p90: Duration,
    #[serde(rename = "p95_ms", serialize_with = "as_millis")]
    pub p95: Duration,
}

impl Metrics {
    pub fn from_durations(durations: &[Duration]) -> Self {
        if durations.is_empty() {
            return Self::default();
        }

        let mut sorted = durations.to_vec();
        sorted.sort_unstable();

        Self {
            avg: average(&sorted),
            min: sorted[0],
            med: median(&sorted),
            max: sorted[sorted.len() - 1],
            p90: percentile(&sorted, 90),
            p95: percentile(&sorted, 95),
        }
    }
}

/// Nearest-rank percentile of an ascending slice. Zero for an empty slice.
pub fn percentile(sorted: &[Duration], p: u32) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }

    let last = sorted.len() - 1;
    // Multiply before dividing so integral ranks stay exact.
    let rank = (last as u64 * u64::from(p.min(100)) / 100) as usize;
    sorted[rank.min(last)]
}

/// Median of an ascending slice. Zero for an empty slice.
pub fn median(sorted: &[Duration]) -> Duration {
    let n = sorted.len();
    match n {
        0 => Duration::ZERO,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2,
    }
}

pub fn average(durations: &[Duration]) -> Duration {
    if durations.is_empty() {
        return Duration::ZERO;
    }
    let total: u128 = durations.iter().map(Duration::as_nanos).sum();
    let avg = total / durations.len() as u128;
    Duration::from_nanos(u64::try_from(avg).unwrap_or(u64::MAX))
}

/// # Benchmark Result
///
/// Time to first token, time between tokens and total time distributions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BenchmarkResult {
    pub ttft: Metrics,
    pub tbt: Metrics,
    pub tt: Metrics,
}

impl BenchmarkResult {
    pub fn from_timings(timings: &[RunTiming]) -> Self {
        Self {
            ttft: Metrics::from_durations(&ttfts(timings)),
            tbt: Metrics::from_durations(&tbts(timings)),
            tt: Metrics::from_durations(&totals(timings)),
        }
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_nanos() as f64 / 1_000_000.0)
}

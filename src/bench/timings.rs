//! Per-run timing records and the raw duration sets derived from them.

use super::Event;
use std::time::{Duration, Instant};

/// Start, end and event arrival times of one benchmark run.
///
/// Event timestamps are held in index order, whatever order the events were
/// delivered in. A timing is fixed once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTiming {
    start: Instant,
    end: Instant,
    events: Vec<Instant>,
}

impl RunTiming {
    pub fn new<E: Event>(start: Instant, end: Instant, mut events: Vec<E>) -> Self {
        // Stable, so events sharing an index keep their delivery order.
        events.sort_by_key(|event| event.index());
        Self {
            start,
            end,
            events: events.iter().map(|event| event.timestamp()).collect(),
        }
    }

    /// Builds a timing from timestamps already in index order.
    #[cfg(test)]
    pub(crate) fn from_parts(start: Instant, end: Instant, events: Vec<Instant>) -> Self {
        Self { start, end, events }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn end(&self) -> Instant {
        self.end
    }

    /// Arrival times, ordered by event index.
    pub fn events(&self) -> &[Instant] {
        &self.events
    }

    /// Time to first event, or `None` for a run that produced no events.
    pub fn ttft(&self) -> Option<Duration> {
        self.events
            .first()
            .map(|first| first.saturating_duration_since(self.start))
    }

    /// Gaps between consecutive events.
    pub fn tbts(&self) -> impl Iterator<Item = Duration> + '_ {
        self.events
            .windows(2)
            .map(|pair| pair[1].saturating_duration_since(pair[0]))
    }

    pub fn total(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }
}

/// Time to first event of every run that produced at least one event.
pub fn ttfts(timings: &[RunTiming]) -> Vec<Duration> {
    timings.iter().filter_map(RunTiming::ttft).collect()
}

/// Gaps between consecutive events, pooled across all runs.
pub fn tbts(timings: &[RunTiming]) -> Vec<Duration> {
    timings.iter().flat_map(RunTiming::tbts).collect()
}

pub fn totals(timings: &[RunTiming]) -> Vec<Duration> {
    timings.iter().map(RunTiming::total).collect()
}

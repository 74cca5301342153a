//! # Benchmark Tests
//!
//! Orchestrator behaviour under load, failure and cancellation, driven by
//! synthetic streams so timings are under the test's control.

use async_trait::async_trait;
use nexus_nitro_bench::bench::{tbts, ttfts};
use nexus_nitro_bench::{
    into_bench_stream, BenchError, BenchStream, Benchmark, BenchmarkResult, Event, EventStream,
    Next,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

struct Tick {
    index: usize,
    at: Instant,
}

impl Event for Tick {
    fn index(&self) -> usize {
        self.index
    }

    fn timestamp(&self) -> Instant {
        self.at
    }
}

/// Emits one event per entry of `order`, sleeping `gap` before each.
struct PacedStream {
    order: Vec<usize>,
    gap: Duration,
    _guard: Option<InFlight>,
}

#[async_trait]
impl EventStream for PacedStream {
    type Item = Tick;

    async fn next(&mut self, cancel: &CancellationToken) -> Next<Tick> {
        if self.order.is_empty() {
            return Next::Exhausted;
        }
        tokio::select! {
            _ = cancel.cancelled() => Next::Cancelled,
            _ = tokio::time::sleep(self.gap) => Next::Item(Tick {
                index: self.order.remove(0),
                at: Instant::now(),
            }),
        }
    }
}

fn paced(count: usize, gap: Duration) -> BenchStream {
    into_bench_stream(PacedStream {
        order: (0..count).collect(),
        gap,
        _guard: None,
    })
}

/// Tracks how many streams are alive at once.
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
}

struct InFlight(Arc<Gauge>);

impl InFlight {
    fn enter(gauge: &Arc<Gauge>) -> Self {
        gauge.started.fetch_add(1, Ordering::SeqCst);
        let now = gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        gauge.peak.fetch_max(now, Ordering::SeqCst);
        InFlight(gauge.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_never_exceeds_concurrency_limit() {
    let gauge = Arc::new(Gauge::default());
    let factory_gauge = gauge.clone();

    let timings = Benchmark::new(12, 3)
        .unwrap()
        .run_streams(&CancellationToken::new(), move |_cancel: CancellationToken| {
            let guard = InFlight::enter(&factory_gauge);
            async move {
                Ok::<_, BenchError>(into_bench_stream(PacedStream {
                    order: vec![0, 1, 2],
                    gap: Duration::from_millis(10),
                    _guard: Some(guard),
                }))
            }
        })
        .await
        .unwrap();

    assert_eq!(timings.len(), 12);
    assert_eq!(gauge.started.load(Ordering::SeqCst), 12);
    assert_eq!(gauge.current.load(Ordering::SeqCst), 0);
    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency was {peak}");
    assert!(peak >= 1);
}

#[tokio::test]
async fn test_first_failure_stops_the_benchmark_early() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let started = Instant::now();
    let err = Benchmark::new(20, 2)
        .unwrap()
        .run_streams(&CancellationToken::new(), move |_cancel: CancellationToken| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Err(BenchError::UnexpectedStatus {
                        status: 502,
                        body: "bad gateway".to_string(),
                    })
                } else {
                    Ok(paced(2, Duration::from_millis(100)))
                }
            }
        })
        .await
        .unwrap_err();

    // Twenty runs of 200ms at concurrency 2 would take two seconds.
    assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
    assert!(matches!(err, BenchError::StreamStart(_)), "got {err}");
    assert!(err.to_string().contains("bad gateway"));
    assert!(calls.load(Ordering::SeqCst) < 20);
}

#[tokio::test]
async fn test_drain_failure_is_reported_as_such() {
    struct Broken;

    #[async_trait]
    impl EventStream for Broken {
        type Item = Tick;

        async fn next(&mut self, _cancel: &CancellationToken) -> Next<Tick> {
            // A source that reports cancellation on its own.
            Next::Cancelled
        }
    }

    let err = Benchmark::new(3, 1)
        .unwrap()
        .run_streams(&CancellationToken::new(), |_cancel: CancellationToken| async {
            Ok::<_, BenchError>(into_bench_stream(Broken))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BenchError::StreamDrain(_)));
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_external_cancellation_mid_run() {
    let cancel = CancellationToken::new();
    let gauge = Arc::new(Gauge::default());
    let factory_gauge = gauge.clone();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = Benchmark::new(10, 2)
        .unwrap()
        .run_streams(&cancel, move |_cancel: CancellationToken| {
            let guard = InFlight::enter(&factory_gauge);
            async move {
                Ok::<_, BenchError>(into_bench_stream(PacedStream {
                    order: (0..5).collect(),
                    gap: Duration::from_secs(10),
                    _guard: Some(guard),
                }))
            }
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled(), "got {err}");
    assert!(started.elapsed() < Duration::from_secs(2));
    // Every started run has been torn down by the time the call returns.
    assert_eq!(gauge.current.load(Ordering::SeqCst), 0);
    assert_eq!(gauge.started.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_zero_runs_yield_zero_metrics() {
    let result = Benchmark::new(0, 3)
        .unwrap()
        .run(&CancellationToken::new(), |_cancel: CancellationToken| async {
            Ok::<_, BenchError>(paced(1, Duration::ZERO))
        })
        .await
        .unwrap();

    assert_eq!(result, BenchmarkResult::default());
}

#[tokio::test]
async fn test_out_of_order_delivery_is_sorted_before_timing() {
    let timings = Benchmark::new(2, 2)
        .unwrap()
        .run_streams(&CancellationToken::new(), |_cancel: CancellationToken| async {
            Ok::<_, BenchError>(into_bench_stream(PacedStream {
                order: vec![2, 0, 1],
                gap: Duration::from_millis(5),
                _guard: None,
            }))
        })
        .await
        .unwrap();

    for timing in &timings {
        assert_eq!(timing.events().len(), 3);
        // Index 0 arrived second, so index order is not arrival order.
        assert!(timing.events()[0] > timing.events()[2]);
        assert!(timing.ttft().is_some());
    }
    assert_eq!(ttfts(&timings).len(), 2);
    assert_eq!(tbts(&timings).len(), 4);
}

#[tokio::test]
async fn test_metrics_cover_every_run() {
    let result = Benchmark::new(5, 5)
        .unwrap()
        .on_progress(|_, _| {})
        .run(&CancellationToken::new(), |_cancel: CancellationToken| async {
            Ok::<_, BenchError>(paced(3, Duration::from_millis(10)))
        })
        .await
        .unwrap();

    assert!(result.ttft.min >= Duration::from_millis(10));
    assert!(result.tbt.min >= Duration::from_millis(10));
    assert!(result.tt.min >= Duration::from_millis(30));
    assert!(result.tt.p95 >= result.tt.med);
}

//! # Pipeline Benchmark
//!
//! Runs the benchmark orchestrator over in-memory SSE bodies, so the numbers
//! reflect the cost of parsing, decoding and bookkeeping rather than a server.
//! Nearest-rank percentiles are printed next to an HDR histogram's for
//! comparison.
//!
//! Tunables (environment): `N` runs, `C` concurrency, `EVENTS` per run,
//! `CHUNK` bytes per body read.

use bytes::Bytes;
use futures_util::stream;
use hdrhistogram::Histogram;
use nexus_nitro_bench::bench::totals;
use nexus_nitro_bench::report::{format_duration, render_table};
use nexus_nitro_bench::schemas::CompletionEvent;
use nexus_nitro_bench::streaming::read_server_sent_events;
use nexus_nitro_bench::{into_bench_stream, BenchError, Benchmark, BenchmarkResult, EventStream};
use std::io;
use std::time::{Duration, Instant};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

fn env_or(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// A complete streamed answer of `events` chunks, split into `chunk`-byte reads.
fn synthetic_body(events: usize, chunk: usize) -> Vec<Bytes> {
    let mut body = String::new();
    for i in 0..events {
        body.push_str(&format!(
            "data: {{\"id\":\"chatcmpl-bench\",\"object\":\"chat.completion.chunk\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"token-{i} \"}}}}]}}\n\n"
        ));
    }
    body.push_str("data: [DONE]\n\n");

    Bytes::from(body)
        .chunks(chunk.max(1))
        .map(Bytes::copy_from_slice)
        .collect()
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let runs = env_or("N", 2_000);
    let concurrency = env_or("C", 32);
    let events = env_or("EVENTS", 64);
    let chunk = env_or("CHUNK", 512);

    println!(
        "Starting pipeline benchmark: runs={}, concurrency={}, events={}, chunk={}B",
        runs, concurrency, events, chunk
    );

    let body = synthetic_body(events, chunk);
    let benchmark = match Benchmark::new(runs, concurrency) {
        Ok(benchmark) => benchmark.on_progress(|_, _| {}),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let started = Instant::now();
    let timings = benchmark
        .run_streams(&cancel, move |cancel: CancellationToken| {
            let chunks = body.clone();
            async move {
                let reader = StreamReader::new(stream::iter(
                    chunks.into_iter().map(Ok::<Bytes, io::Error>),
                ));
                let decoded = read_server_sent_events(reader, &cancel).map(CompletionEvent::from_raw);
                Ok::<_, BenchError>(into_bench_stream(decoded))
            }
        })
        .await;
    let elapsed = started.elapsed();

    let timings = match timings {
        Ok(timings) => timings,
        Err(err) => {
            eprintln!("Error in benchmarking: {err}");
            std::process::exit(1);
        }
    };

    let result = BenchmarkResult::from_timings(&timings);
    print!("{}", render_table(&result));

    let mut hist = match Histogram::<u64>::new(3) {
        Ok(hist) => hist,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };
    for total in totals(&timings) {
        let _ = hist.record(total.as_micros() as u64);
    }

    let hdr = |q: f64| format_duration(Duration::from_micros(hist.value_at_quantile(q)));
    println!();
    println!("TT cross-check (nearest rank vs HDR):");
    println!("  P50 {} vs {}", format_duration(result.tt.med), hdr(0.50));
    println!("  P90 {} vs {}", format_duration(result.tt.p90), hdr(0.90));
    println!("  P95 {} vs {}", format_duration(result.tt.p95), hdr(0.95));

    let total_events = runs * events;
    println!();
    println!(
        "{} runs, {} events in {} ({:.0} events/s)",
        runs,
        total_events,
        format_duration(elapsed),
        total_events as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
}

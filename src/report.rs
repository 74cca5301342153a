//! Human-readable rendering of benchmark results.

use crate::metrics::{BenchmarkResult, Metrics};
use std::time::Duration;

const HEADER: [&str; 7] = ["Metric", "Avg", "Min", "Med", "Max", "P90", "P95"];

/// Formats a duration in the largest unit that keeps it above one, with two
/// decimals (`0s`, `850ns`, `12.50µs`, `3.27ms`, `1.04s`).
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    match nanos {
        0 => "0s".to_string(),
        n if n < 1_000 => format!("{n}ns"),
        n if n < 1_000_000 => format!("{:.2}µs", n as f64 / 1_000.0),
        n if n < 1_000_000_000 => format!("{:.2}ms", n as f64 / 1_000_000.0),
        _ => format!("{:.2}s", duration.as_secs_f64()),
    }
}

fn row(name: &str, metrics: &Metrics) -> Vec<String> {
    let mut cells = vec![name.to_string()];
    cells.extend(
        [
            metrics.avg,
            metrics.min,
            metrics.med,
            metrics.max,
            metrics.p90,
            metrics.p95,
        ]
        .into_iter()
        .map(format_duration),
    );
    cells
}

/// Renders the TTFT / TBT / TT table, one space between left-aligned columns.
pub fn render_table(result: &BenchmarkResult) -> String {
    let rows = [
        HEADER.iter().map(|cell| cell.to_string()).collect::<Vec<_>>(),
        row("TTFT", &result.ttft),
        row("TBT", &result.tbt),
        row("TT", &result.tt),
    ];

    let widths: Vec<usize> = (0..HEADER.len())
        .map(|column| {
            rows.iter()
                .map(|cells| cells[column].chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::from("--------------------------\n");
    for cells in &rows {
        let line = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

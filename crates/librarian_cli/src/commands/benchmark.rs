//! `librarian benchmark` — measure query latency against the current
//! index by repeating a query N times and reporting latency
//! percentiles, the only per-operation timing the rest of the CLI
//! surface exposes.

use crate::cli_error::CliResult;
use crate::output::OutputMode;
use librarian_core::{Librarian, QueryRequest};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

#[derive(Serialize)]
struct BenchmarkOutput {
    iterations: usize,
    min_ms: f64,
    mean_ms: f64,
    p95_ms: f64,
    max_ms: f64,
}

pub fn run(workspace: &Path, query: String, iterations: usize, out: &OutputMode) -> CliResult<()> {
    let librarian = Librarian::open(workspace)?;
    let request = QueryRequest { query, token_budget: 4000, release_critical: false };

    let mut samples_ms = Vec::with_capacity(iterations.max(1));
    for _ in 0..iterations.max(1) {
        let start = Instant::now();
        let timestamp = super::now_unix();
        librarian.query(&request, timestamp)?;
        samples_ms.push(start.elapsed().as_secs_f64() * 1000.0);
    }
    samples_ms.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let n = samples_ms.len();
    let min_ms = samples_ms[0];
    let max_ms = samples_ms[n - 1];
    let mean_ms = samples_ms.iter().sum::<f64>() / n as f64;
    let p95_index = ((n as f64 * 0.95).ceil() as usize).saturating_sub(1).min(n - 1);
    let p95_ms = samples_ms[p95_index];

    let output = BenchmarkOutput { iterations: n, min_ms, mean_ms, p95_ms, max_ms };
    out.emit(&output, || {
        println!("{}", out.heading("Query benchmark"));
        println!("  iterations: {}", output.iterations);
        println!("  min:  {:.2}ms", output.min_ms);
        println!("  mean: {:.2}ms", output.mean_ms);
        println!("  p95:  {:.2}ms", output.p95_ms);
        println!("  max:  {:.2}ms", output.max_ms);
    });

    Ok(())
}

//! Ranked comparison report and exit gate

use std::fmt::Write as _;
use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use super::stats::BackendSummary;

/// Benchmark outcome, backends ranked fastest to slowest
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub fixtures: usize,
    pub warmup_trials: usize,
    pub trials: usize,
    pub embeddings_consumed: u64,
    pub backends: Vec<BackendSummary>,
}

impl Report {
    pub fn new(
        fixtures: usize,
        warmup_trials: usize,
        trials: usize,
        embeddings_consumed: u64,
        summaries: Vec<BackendSummary>,
    ) -> Self {
        Self {
            fixtures,
            warmup_trials,
            trials,
            embeddings_consumed,
            backends: rank(summaries),
        }
    }

    /// Render the comparison table
    pub fn render(&self) -> String {
        let mut out = String::new();
        let fastest = self.backends.first().map(|s| s.mean_ms).unwrap_or(0.0);

        let _ = writeln!(
            out,
            "Faces: {} | Warm-up trials: {} | Measured trials: {} | Embeddings consumed: {}",
            self.fixtures, self.warmup_trials, self.trials, self.embeddings_consumed
        );
        let _ = writeln!(out);

        let header = format!(
            "| {:>4} | {:<24} | {:>6} | {:>11} | {:>11} | {:>10} | {:>11} | {:>6} | {:>9} | {:>11} | {:>12} | {:>12} | {:>8} |",
            "Rank", "Backend", "Trials", "Mean", "Median", "StdDev", "P95", "Ratio", "Faces/s",
            "Allocs", "Allocated", "Retained", "Cosine"
        );
        let rule: String = header
            .chars()
            .map(|c| if c == '|' { '|' } else { '-' })
            .collect();

        let _ = writeln!(out, "{}", header);
        let _ = writeln!(out, "{}", rule);

        for (i, s) in self.backends.iter().enumerate() {
            let ratio = if fastest > 0.0 { s.mean_ms / fastest } else { 1.0 };
            let cosine = s
                .agreement
                .map(|c| format!("{:.4}", c))
                .unwrap_or_else(|| "-".to_string());

            let _ = writeln!(
                out,
                "| {:>4} | {:<24} | {:>6} | {:>11} | {:>11} | {:>10} | {:>11} | {:>6.2} | {:>9.2} | {:>11.1} | {:>12} | {:>12} | {:>8} |",
                i + 1,
                truncate(&s.name, 24),
                s.trials,
                format_ms(s.mean_ms),
                format_ms(s.median_ms),
                format_ms(s.std_dev_ms),
                format_ms(s.p95_ms),
                ratio,
                s.throughput,
                s.allocations_per_trial,
                format_bytes(s.allocated_bytes_per_trial),
                format_signed_bytes(s.retained_bytes_per_trial),
                cosine
            );
        }

        out
    }

    /// Write the report as pretty JSON, creating parent directories
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))
    }
}

/// Sort by mean trial duration, fastest first. Ties keep input order.
pub fn rank(mut summaries: Vec<BackendSummary>) -> Vec<BackendSummary> {
    summaries.sort_by(|a, b| a.mean_ms.total_cmp(&b.mean_ms));
    summaries
}

fn format_ms(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.3} s", ms / 1000.0)
    } else {
        format!("{:.3} ms", ms)
    }
}

fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn format_signed_bytes(bytes: f64) -> String {
    if bytes < 0.0 {
        format!("-{}", format_bytes(-bytes))
    } else {
        format_bytes(bytes)
    }
}

fn truncate(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        name.to_string()
    } else {
        let mut short: String = name.chars().take(max - 1).collect();
        short.push('~');
        short
    }
}

/// Block until the user types `x` (or input ends).
///
/// Input is line-buffered, so the key must be followed by Enter.
pub fn wait_for_exit<R: BufRead, W: Write>(mut input: R, mut output: W) -> io::Result<()> {
    let mut line = String::new();
    loop {
        writeln!(output, "\nDone! Press X to exit.")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(());
        }
        if line.trim().eq_ignore_ascii_case("x") {
            return Ok(());
        }
    }
}

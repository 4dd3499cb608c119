//! Trial measurements and per-backend summaries

use std::time::Duration;

use serde::Serialize;

use super::alloc::AllocDelta;

/// One measured trial: a full pass over the fixtures
#[derive(Debug, Clone)]
pub struct TrialMeasurement {
    pub backend: String,
    pub duration: Duration,
    pub alloc: AllocDelta,
    pub faces: usize,
}

/// Aggregate statistics for one backend
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendSummary {
    pub name: String,
    pub trials: usize,
    pub faces_per_trial: usize,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub std_dev_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
    /// Faces embedded per second at the mean trial duration
    pub throughput: f64,
    pub allocations_per_trial: f64,
    pub allocated_bytes_per_trial: f64,
    /// Net bytes still held after a trial (negative when it freed more)
    pub retained_bytes_per_trial: f64,
    /// Mean cosine similarity to the baseline backend's embeddings
    pub agreement: Option<f32>,
}

impl BackendSummary {
    /// Summarize a backend's trials. No trials gives an all-zero summary.
    pub fn from_trials(name: &str, faces_per_trial: usize, trials: &[TrialMeasurement]) -> Self {
        if trials.is_empty() {
            return Self {
                name: name.to_string(),
                faces_per_trial,
                ..Self::default()
            };
        }

        let mut times_ms: Vec<f64> = trials
            .iter()
            .map(|t| t.duration.as_secs_f64() * 1000.0)
            .collect();
        times_ms.sort_by(|a, b| a.total_cmp(b));

        let n = times_ms.len() as f64;
        let mean = times_ms.iter().sum::<f64>() / n;
        let variance = times_ms.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;

        let throughput = if mean > 0.0 {
            faces_per_trial as f64 * 1000.0 / mean
        } else {
            0.0
        };

        Self {
            name: name.to_string(),
            trials: trials.len(),
            faces_per_trial,
            mean_ms: mean,
            median_ms: median(&times_ms),
            std_dev_ms: variance.sqrt(),
            min_ms: times_ms[0],
            max_ms: times_ms[times_ms.len() - 1],
            p95_ms: percentile(&times_ms, 95.0),
            throughput,
            allocations_per_trial: trials.iter().map(|t| t.alloc.allocations as f64).sum::<f64>() / n,
            allocated_bytes_per_trial: trials
                .iter()
                .map(|t| t.alloc.allocated_bytes as f64)
                .sum::<f64>()
                / n,
            retained_bytes_per_trial: trials
                .iter()
                .map(|t| t.alloc.retained_bytes as f64)
                .sum::<f64>()
                / n,
            agreement: None,
        }
    }
}

/// Median of sorted values
fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Nearest-rank percentile of sorted values
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(ms: u64, allocations: u64) -> TrialMeasurement {
        TrialMeasurement {
            backend: "full".to_string(),
            duration: Duration::from_millis(ms),
            alloc: AllocDelta {
                allocations,
                allocated_bytes: allocations * 100,
                retained_bytes: allocations as i64 * 10 - 40,
            },
            faces: 2,
        }
    }

    #[test]
    fn test_summary_statistics() {
        let trials = [trial(40, 2), trial(10, 4), trial(30, 6), trial(20, 8)];
        let summary = BackendSummary::from_trials("full", 2, &trials);

        assert_eq!(summary.trials, 4);
        assert!((summary.mean_ms - 25.0).abs() < 1e-9);
        assert!((summary.median_ms - 25.0).abs() < 1e-9);
        assert!((summary.min_ms - 10.0).abs() < 1e-9);
        assert!((summary.max_ms - 40.0).abs() < 1e-9);
        assert!((summary.p95_ms - 40.0).abs() < 1e-9);
        assert!((summary.std_dev_ms - 125f64.sqrt()).abs() < 1e-9);
        assert!((summary.throughput - 80.0).abs() < 1e-9);
        assert!((summary.allocations_per_trial - 5.0).abs() < 1e-9);
        assert!((summary.allocated_bytes_per_trial - 500.0).abs() < 1e-9);
        // (-20 + 0 + 20 + 40) / 4
        assert!((summary.retained_bytes_per_trial - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary_is_zero() {
        let summary = BackendSummary::from_trials("int8", 0, &[]);
        assert_eq!(summary.trials, 0);
        assert_eq!(summary.mean_ms, 0.0);
        assert_eq!(summary.throughput, 0.0);
        assert_eq!(summary.name, "int8");
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let values: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(percentile(&values, 95.0), 19.0);
        assert_eq!(percentile(&values, 50.0), 10.0);
        assert_eq!(median(&[3.0]), 3.0);
    }
}

//! Timing statistics with IQR outlier rejection.

use serde::{Deserialize, Serialize};

/// Summary of a set of wall-clock samples, in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
    pub cv_percent: f64,
    pub sample_count: usize,
    pub outliers_removed: usize,
}

/// Summarize `samples`, first dropping values outside
/// `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]` when at least two samples survive.
pub fn compute_stats(samples: &[f64]) -> Stats {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let kept: Vec<f64> = if sorted.len() > 2 {
        let q1 = percentile(&sorted, 25.0);
        let q3 = percentile(&sorted, 75.0);
        let fence = 1.5 * (q3 - q1);
        let inside: Vec<f64> = sorted
            .iter()
            .copied()
            .filter(|v| (q1 - fence..=q3 + fence).contains(v))
            .collect();
        if inside.len() >= 2 {
            inside
        } else {
            sorted.clone()
        }
    } else {
        sorted.clone()
    };

    let Some((&min, &max)) = kept.first().zip(kept.last()) else {
        return Stats::default();
    };
    let n = kept.len() as f64;
    let mean = kept.iter().sum::<f64>() / n;
    let stddev = if kept.len() > 1 {
        (kept.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };

    Stats {
        mean,
        median: percentile(&kept, 50.0),
        min,
        max,
        stddev,
        cv_percent: if mean > 0.0 { stddev / mean * 100.0 } else { 0.0 },
        sample_count: kept.len(),
        outliers_removed: samples.len() - kept.len(),
    }
}

/// Linearly interpolated percentile (0-100) of an ascending slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = pct / 100.0 * (len - 1) as f64;
            let (lo, hi) = (rank.floor() as usize, rank.ceil() as usize);
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

//! Measurement harness: warmup plus measured sorts per size, checked against
//! the std library sort and summarized into [`DataPoint`]s.

use std::time::Instant;

use bitsort::runtime::ComputeBackend;
use bitsort::{RadixSorter, SortError, SortOptions};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data_gen::DataGenerator;
use crate::stats::{compute_stats, Stats};

/// Results for one key count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPoint {
    pub size: usize,
    pub passes: u32,
    /// Radix sort wall time per run, ms.
    pub sort_stats: Stats,
    /// `slice::sort_unstable` on the same keys, ms.
    pub baseline_stats: Stats,
    /// Baseline mean over radix sort mean.
    pub speedup: f64,
    pub mkeys_per_sec: f64,
    /// Radix sort output matched the baseline.
    pub validated: bool,
}

/// Configuration for a benchmark run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchConfig {
    pub sizes: Vec<usize>,
    pub runs: u32,
    pub warmup: u32,
    pub max_value: u32,
    pub work_group_size: usize,
    pub seed: u64,
}

/// Run every configured size on `backend`.
///
/// For each size:
/// 1. generate keys below `max_value`
/// 2. one checked sort against `sort_unstable`
/// 3. warmup loop (timings discarded)
/// 4. measured radix sort and baseline loops
pub fn run_sizes(
    backend: &dyn ComputeBackend,
    config: &BenchConfig,
    progress_cb: Option<&dyn Fn(&str)>,
) -> Result<Vec<DataPoint>, SortError> {
    let options = SortOptions::default().with_work_group_size(config.work_group_size);
    let sorter = RadixSorter::with_options(backend, options);
    let mut gen = DataGenerator::new(config.seed);
    let report = |msg: String| {
        if let Some(cb) = progress_cb {
            cb(&msg);
        }
    };

    let mut results = Vec::with_capacity(config.sizes.len());
    for &size in &config.sizes {
        let label = format_size(size);
        report(format!("{label}: generating keys"));
        let data = gen.keys_below(size, config.max_value);

        let mut expected = data.clone();
        expected.sort_unstable();
        let mut actual = data.clone();
        let first = sorter.sort(&mut actual)?;
        let validated = actual == expected;
        if !validated {
            let at = actual.iter().zip(&expected).position(|(a, b)| a != b);
            warn!(size, first_mismatch = ?at, "radix sort output differs from sort_unstable");
        }

        report(format!("{label}: warmup ({} runs)", config.warmup));
        for _ in 0..config.warmup {
            let mut keys = data.clone();
            sorter.sort(&mut keys)?;
        }

        report(format!("{label}: measuring radix sort ({} runs)", config.runs));
        let mut sort_times = Vec::with_capacity(config.runs as usize);
        for _ in 0..config.runs {
            let mut keys = data.clone();
            let start = Instant::now();
            sorter.sort(&mut keys)?;
            sort_times.push(start.elapsed().as_secs_f64() * 1000.0);
        }

        report(format!("{label}: measuring sort_unstable ({} runs)", config.runs));
        let baseline_times: Vec<f64> = (0..config.runs)
            .map(|_| {
                let mut keys = data.clone();
                let start = Instant::now();
                keys.sort_unstable();
                start.elapsed().as_secs_f64() * 1000.0
            })
            .collect();

        let sort_stats = compute_stats(&sort_times);
        let baseline_stats = compute_stats(&baseline_times);
        let speedup = if sort_stats.mean > 0.0 {
            baseline_stats.mean / sort_stats.mean
        } else {
            0.0
        };
        let mkeys_per_sec = if sort_stats.mean > 0.0 {
            size as f64 / (sort_stats.mean / 1000.0) / 1e6
        } else {
            0.0
        };
        debug!(size, passes = first.passes, mean_ms = sort_stats.mean, "size complete");

        results.push(DataPoint {
            size,
            passes: first.passes,
            sort_stats,
            baseline_stats,
            speedup,
            mkeys_per_sec,
            validated,
        });
    }

    Ok(results)
}

/// Format a size number for display (e.g., 1000000 -> "1M").
pub fn format_size(size: usize) -> String {
    if size >= 1_000_000 && size % 1_000_000 == 0 {
        format!("{}M", size / 1_000_000)
    } else if size >= 1_000 && size % 1_000 == 0 {
        format!("{}K", size / 1_000)
    } else {
        format!("{}", size)
    }
}

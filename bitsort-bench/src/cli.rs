use bitsort::DEFAULT_WORK_GROUP_SIZE;
use clap::{Parser, ValueEnum};

/// Which compute backend runs the partition passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Work-group parallel CPU backend (rayon)
    Host,
    /// Single-threaded CPU reference backend
    Sequential,
    /// Metal GPU backend (macOS only)
    Metal,
}

/// Radix sort benchmark: sorts random keys and reports timings
#[derive(Parser, Debug)]
#[command(name = "bitsort-bench", version, about)]
pub struct BenchArgs {
    /// Key counts to benchmark (e.g., 1M, 100K, 1000000)
    #[arg(long, value_delimiter = ',')]
    pub sizes: Option<Vec<String>>,

    /// Keys are drawn uniformly from [0, MAX_VALUE)
    #[arg(long, default_value = "1M")]
    pub max_value: String,

    /// Number of measured runs per size
    #[arg(long, default_value_t = 10)]
    pub runs: u32,

    /// Number of warmup runs before measurement
    #[arg(long, default_value_t = 3)]
    pub warmup: u32,

    /// Benchmark profile: quick (1M/3/1), standard (1M+10M/10/3), thorough (1M+10M+100M/30/3)
    #[arg(long)]
    pub profile: Option<String>,

    /// Compute backend
    #[arg(long, value_enum, default_value_t = BackendKind::Host)]
    pub backend: BackendKind,

    /// Work-group size for every partition launch
    #[arg(long, default_value_t = DEFAULT_WORK_GROUP_SIZE)]
    pub work_group_size: usize,

    /// Seed for key generation
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Write JSON results to file
    #[arg(long)]
    pub json_file: Option<String>,

    /// Log every pass (same as RUST_LOG=debug)
    #[arg(short, long)]
    pub verbose: bool,
}

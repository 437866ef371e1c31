mod cli;
mod config;
mod data_gen;
mod harness;
mod output;
mod stats;

use std::error::Error;

use bitsort::runtime::{ComputeBackend, HostBackend};
use clap::Parser;
use cli::{BackendKind, BenchArgs};
use config::{get_profile, parse_max_value, parse_sizes};
use harness::{run_sizes, BenchConfig};
use output::progress::BenchProgress;
use output::table::render_table;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_backend(kind: BackendKind) -> Result<Box<dyn ComputeBackend>, String> {
    match kind {
        BackendKind::Host => Ok(Box::new(HostBackend::new())),
        BackendKind::Sequential => Ok(Box::new(HostBackend::sequential())),
        #[cfg(target_os = "macos")]
        BackendKind::Metal => bitsort::runtime::MetalBackend::new()
            .map(|b| Box::new(b) as Box<dyn ComputeBackend>)
            .map_err(|e| e.to_string()),
        #[cfg(not(target_os = "macos"))]
        BackendKind::Metal => Err("the metal backend is only available on macOS".to_string()),
    }
}

/// Resolve sizes, runs and warmup: --sizes wins over --profile, and explicit
/// --runs/--warmup win over the profile's values.
fn resolve_config(args: &BenchArgs) -> Result<BenchConfig, String> {
    let profile = match &args.profile {
        Some(name) => Some(get_profile(name).ok_or_else(|| {
            format!("Unknown profile '{}'. Valid: quick, standard, thorough", name)
        })?),
        None => None,
    };

    let sizes = match (&args.sizes, &profile) {
        (Some(raw), _) => parse_sizes(raw).map_err(|e| format!("Error parsing sizes: {}", e))?,
        (None, Some(p)) => p.sizes.clone(),
        (None, None) => vec![1_000_000],
    };

    let (runs, warmup) = match &profile {
        Some(p) => (
            if args.runs != 10 { args.runs } else { p.runs },
            if args.warmup != 3 { args.warmup } else { p.warmup },
        ),
        None => (args.runs, args.warmup),
    };

    Ok(BenchConfig {
        sizes,
        runs,
        warmup,
        max_value: parse_max_value(&args.max_value)?,
        work_group_size: args.work_group_size,
        seed: args.seed,
    })
}

fn main() {
    let args = BenchArgs::parse();
    init_tracing(args.verbose);

    let config = match resolve_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let backend = match open_backend(args.backend) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error opening {:?} backend: {}", args.backend, e);
            std::process::exit(1);
        }
    };
    let device = backend.info();

    println!("bitsort-bench: 1-bit LSD radix sort");
    println!("  Backend: {} ({})", device.backend, device.device_name);
    println!("  Sizes: {:?}", config.sizes);
    println!("  Keys in [0, {})", config.max_value);
    println!("  Work-group size: {}", config.work_group_size);
    println!("  Runs: {}, Warmup: {}", config.runs, config.warmup);
    if let Some(ref path) = args.json_file {
        println!("  JSON output: {}", path);
    }
    println!();

    let progress = BenchProgress::new();
    let cb = progress.callback();
    let results = run_sizes(backend.as_ref(), &config, Some(&cb));
    progress.finish();

    let results = match results {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Sort failed during {}: {}", e.stage(), e);
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = cause.source();
            }
            std::process::exit(1);
        }
    };

    render_table(&format!("{} / {}", device.backend, device.device_name), &results);
    for dp in &results {
        info!(size = dp.size, passes = dp.passes, mean_ms = dp.sort_stats.mean, "result");
        println!(
            "Execution time for {} keys: {:.3} ms",
            dp.size, dp.sort_stats.mean
        );
    }

    if let Some(ref path) = args.json_file {
        if let Err(e) = output::json::write_json(path, &results, &config, &device) {
            eprintln!("Error writing JSON: {}", e);
        }
    }

    if results.iter().any(|dp| !dp.validated) {
        std::process::exit(1);
    }
}

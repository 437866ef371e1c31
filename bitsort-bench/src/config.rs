use serde::{Deserialize, Serialize};

/// A benchmark profile with preset sizes, runs, and warmup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchProfile {
    pub name: String,
    pub sizes: Vec<usize>,
    pub runs: u32,
    pub warmup: u32,
}

/// Returns the "quick" profile: 1M / 3 runs / 1 warmup.
pub fn quick_profile() -> BenchProfile {
    BenchProfile {
        name: "quick".to_string(),
        sizes: vec![1_000_000],
        runs: 3,
        warmup: 1,
    }
}

/// Returns the "standard" profile: 1M+10M / 10 runs / 3 warmup.
pub fn standard_profile() -> BenchProfile {
    BenchProfile {
        name: "standard".to_string(),
        sizes: vec![1_000_000, 10_000_000],
        runs: 10,
        warmup: 3,
    }
}

/// Returns the "thorough" profile: 1M+10M+100M / 30 runs / 3 warmup.
pub fn thorough_profile() -> BenchProfile {
    BenchProfile {
        name: "thorough".to_string(),
        sizes: vec![1_000_000, 10_000_000, 100_000_000],
        runs: 30,
        warmup: 3,
    }
}

/// Lookup a profile by name.
pub fn get_profile(name: &str) -> Option<BenchProfile> {
    match name {
        "quick" => Some(quick_profile()),
        "standard" => Some(standard_profile()),
        "thorough" => Some(thorough_profile()),
        _ => None,
    }
}

/// Parse a human-readable count: "1M", "100k", "1_000_000", "0.5M".
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();

    let scaled = |prefix: &str, factor: f64| -> Result<usize, String> {
        let num: f64 = prefix
            .replace('_', "")
            .parse()
            .map_err(|e| format!("Invalid size '{}': {}", s, e))?;
        if !num.is_finite() || num < 0.0 {
            return Err(format!("Invalid size '{}': must be non-negative", s));
        }
        Ok((num * factor) as usize)
    };

    if let Some(prefix) = s.strip_suffix('M').or_else(|| s.strip_suffix('m')) {
        return scaled(prefix, 1_000_000.0);
    }
    if let Some(prefix) = s.strip_suffix('K').or_else(|| s.strip_suffix('k')) {
        return scaled(prefix, 1_000.0);
    }

    s.replace('_', "")
        .parse::<usize>()
        .map_err(|e| format!("Invalid size '{}': {}", s, e))
}

/// Parse a comma-separated list of size strings.
pub fn parse_sizes(raw: &[String]) -> Result<Vec<usize>, String> {
    raw.iter().map(|s| parse_size(s)).collect()
}

/// Parse the exclusive upper bound for generated keys. Must fit a `u32` key
/// and leave at least one value to draw.
pub fn parse_max_value(s: &str) -> Result<u32, String> {
    let value = parse_size(s)?;
    if value == 0 {
        return Err(format!("Invalid max value '{}': must be at least 1", s.trim()));
    }
    u32::try_from(value).map_err(|_| format!("Invalid max value '{}': exceeds u32::MAX", s.trim()))
}

//! JSON output for benchmark results.

use std::fs;
use std::path::Path;

use bitsort::runtime::DeviceInfo;
use serde::Serialize;

use crate::harness::{BenchConfig, DataPoint};

#[derive(Serialize)]
struct JsonReport<'a> {
    device: DeviceHeader<'a>,
    timestamp: String,
    config: &'a BenchConfig,
    results: &'a [DataPoint],
}

#[derive(Serialize)]
struct DeviceHeader<'a> {
    backend: &'a str,
    name: &'a str,
    max_work_group_size: usize,
}

/// Write benchmark results, with device and run configuration, to `path`.
pub fn write_json(
    path: &str,
    data: &[DataPoint],
    config: &BenchConfig,
    device: &DeviceInfo,
) -> Result<(), String> {
    let report = JsonReport {
        device: DeviceHeader {
            backend: device.backend,
            name: &device.device_name,
            max_work_group_size: device.max_work_group_size,
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
        config,
        results: data,
    };

    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| format!("JSON serialization failed: {}", e))?;

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create directory {}: {}", parent.display(), e))?;
        }
    }

    fs::write(path, json).map_err(|e| format!("Failed to write {}: {}", path, e))?;

    println!("JSON results written to: {}", path);
    Ok(())
}

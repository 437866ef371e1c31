//! Compute substrate for bitsort.
//!
//! Everything the radix sort orchestrator needs from a device lives behind
//! [`ComputeBackend`]: buffer allocation, blocking transfers, kernel build,
//! asynchronous dispatch and a queue-wide `finish`. Two implementations ship:
//!
//! - [`HostBackend`]: runs the partition kernel on the CPU, either work-group
//!   parallel on the rayon pool or as a sequential reference.
//! - `MetalBackend` (macOS only): compiles the partition kernel from source at
//!   runtime and runs it on the system default Metal device.
//!
//! Device allocations are wrapped in [`DeviceBuffer`], which releases the
//! allocation when dropped.

pub mod backend;
pub mod buffer;
pub mod error;
pub mod host;
#[cfg(target_os = "macos")]
pub mod metal;

pub use backend::{
    BufferId, ComputeBackend, DeviceInfo, Kernel, KernelArg, KeyWidth, LaunchGrid, LaunchId,
    PartitionArgs, HISTOGRAM_BYTES,
};
pub use buffer::DeviceBuffer;
pub use error::RuntimeError;
pub use host::{Execution, Histogram, HostBackend};
#[cfg(target_os = "macos")]
pub use metal::MetalBackend;

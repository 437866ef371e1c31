use std::fmt;

use bitsort_runtime::RuntimeError;

/// Direction of a host/device copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => f.write_str("upload"),
            Self::Download => f.write_str("download"),
        }
    }
}

/// Why a sort failed. Every variant names the stage that failed; the
/// caller's keys are untouched in all cases.
#[derive(Debug, thiserror::Error)]
pub enum SortError {
    #[error("compute substrate unavailable")]
    SubstrateUnavailable(#[source] RuntimeError),

    #[error("failed to allocate {bytes} bytes for the {purpose} buffer")]
    Allocation {
        bytes: usize,
        purpose: &'static str,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to build kernel `{kernel}`")]
    KernelBuild {
        kernel: &'static str,
        #[source]
        source: RuntimeError,
    },

    #[error("pass {pass} (bit {bit}) failed")]
    Dispatch {
        pass: u32,
        bit: u32,
        #[source]
        source: RuntimeError,
    },

    #[error("{direction} of {bytes} bytes failed")]
    Transfer {
        direction: TransferDirection,
        bytes: usize,
        #[source]
        source: RuntimeError,
    },

    #[error("work-group size {requested} is outside 1..={max} for the {backend} backend")]
    InvalidWorkGroupSize {
        requested: usize,
        max: usize,
        backend: &'static str,
    },

    #[error("pass {pass} histogram counts {zeros} zeros and {ones} ones for {expected} keys")]
    PassInvariant {
        pass: u32,
        zeros: u64,
        ones: u64,
        expected: u64,
    },

    #[error("sort cancelled after {completed_passes} of {total_passes} passes")]
    Cancelled {
        completed_passes: u32,
        total_passes: u32,
    },

    #[error("deadline exceeded after {completed_passes} of {total_passes} passes")]
    DeadlineExceeded {
        completed_passes: u32,
        total_passes: u32,
    },
}

/// Where in a sort a backend call failed.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Stage {
    Build(&'static str),
    Allocate { bytes: usize, purpose: &'static str },
    Transfer { direction: TransferDirection, bytes: usize },
    Pass(u32),
}

impl SortError {
    /// Attach stage context to a backend failure. A missing device is
    /// reported as such whichever call discovered it.
    pub(crate) fn at(stage: Stage, source: RuntimeError) -> Self {
        if matches!(source, RuntimeError::DeviceUnavailable(_)) {
            return Self::SubstrateUnavailable(source);
        }
        match stage {
            Stage::Build(kernel) => Self::KernelBuild { kernel, source },
            Stage::Allocate { bytes, purpose } => Self::Allocation {
                bytes,
                purpose,
                source,
            },
            Stage::Transfer { direction, bytes } => Self::Transfer {
                direction,
                bytes,
                source,
            },
            Stage::Pass(pass) => Self::Dispatch {
                pass,
                bit: pass,
                source,
            },
        }
    }

    /// Short name of the failing stage, for logs and the bench.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::SubstrateUnavailable(_) | Self::InvalidWorkGroupSize { .. } => "setup",
            Self::Allocation { .. } => "allocation",
            Self::KernelBuild { .. } => "kernel build",
            Self::Dispatch { .. } | Self::PassInvariant { .. } => "pass",
            Self::Transfer {
                direction: TransferDirection::Upload,
                ..
            } => "upload",
            Self::Transfer {
                direction: TransferDirection::Download,
                ..
            } => "download",
            Self::Cancelled { .. } | Self::DeadlineExceeded { .. } => "interrupted",
        }
    }
}

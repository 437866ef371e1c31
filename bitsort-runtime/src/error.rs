/// Failure reported by a compute backend.
///
/// Variants line up with the stages a caller drives: device discovery,
/// allocation, kernel build, dispatch, execution and transfer.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("no compatible compute device found: {0}")]
    DeviceUnavailable(String),
    #[error("failed to allocate {bytes} bytes of device memory: {reason}")]
    Allocation { bytes: usize, reason: String },
    #[error("kernel `{kernel}` failed to build: {log}")]
    Build { kernel: &'static str, log: String },
    #[error("dispatch of `{kernel}` failed: {reason}")]
    Dispatch { kernel: &'static str, reason: String },
    #[error("device execution failed: {0}")]
    Execution(String),
    #[error("transfer failed: {0}")]
    Transfer(String),
}

impl RuntimeError {
    pub(crate) fn dispatch(kernel: &'static str, reason: impl Into<String>) -> Self {
        Self::Dispatch {
            kernel,
            reason: reason.into(),
        }
    }
}

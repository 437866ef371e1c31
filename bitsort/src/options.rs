use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Work-group size used when none is configured.
pub const DEFAULT_WORK_GROUP_SIZE: usize = 64;

/// Shared flag that asks a running sort to stop at the next pass boundary.
///
/// Clones share the flag, so one clone can be handed to the sort and another
/// kept by whoever decides to cancel.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Per-sorter configuration.
#[derive(Debug, Clone)]
pub struct SortOptions {
    /// Work items per work-group for every partition launch.
    pub work_group_size: usize,
    /// Abort once this instant has passed. Checked between passes.
    pub deadline: Option<Instant>,
    /// Abort once cancelled. Checked between passes.
    pub cancel: Option<CancelToken>,
    /// Read back the histogram after every pass, check that it accounts for
    /// every key and keep it in the report. Costs one extra blocking read per
    /// pass.
    pub verify_passes: bool,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            work_group_size: DEFAULT_WORK_GROUP_SIZE,
            deadline: None,
            cancel: None,
            verify_passes: false,
        }
    }
}

impl SortOptions {
    pub fn with_work_group_size(mut self, size: usize) -> Self {
        self.work_group_size = size;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_verify_passes(mut self, verify: bool) -> Self {
        self.verify_passes = verify;
        self
    }
}

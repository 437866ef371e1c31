//! CPU compute backend.
//!
//! Emulates an in-order device queue: `dispatch` only records the launch and
//! the kernel runs when the queue is drained by `finish` or by a blocking
//! transfer. Device memory is a set of 8-byte aligned host allocations.

pub mod partition;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytemuck::Pod;
use tracing::{debug, trace};

use crate::backend::{
    BufferId, ComputeBackend, DeviceInfo, Kernel, KernelArg, KeyWidth, LaunchGrid, LaunchId,
    PartitionArgs, HISTOGRAM_BYTES,
};
use crate::error::RuntimeError;

pub use partition::{bit_is_set, partition_parallel, partition_sequential, Histogram};

/// Largest work-group the host backend accepts.
pub const HOST_MAX_WORK_GROUP_SIZE: usize = 1024;

/// How the host backend executes a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// Work-groups run concurrently on the rayon pool.
    Parallel,
    /// The sequential reference partition, one item at a time.
    Sequential,
}

struct HostBuffer {
    words: Vec<u64>,
    size: usize,
}

impl HostBuffer {
    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.size]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.size]
    }
}

struct PendingLaunch {
    id: LaunchId,
    kernel: Kernel,
    args: PartitionArgs,
    grid: LaunchGrid,
}

#[derive(Default)]
struct HostState {
    next_buffer: u64,
    next_launch: u64,
    buffers: HashMap<BufferId, HostBuffer>,
    /// Released while still referenced by a queued launch; freed after drain.
    deferred_release: Vec<BufferId>,
    allocated_bytes: usize,
    peak_bytes: usize,
    built: HashSet<Kernel>,
    pending: VecDeque<PendingLaunch>,
    completed_launches: u64,
}

/// CPU implementation of [`ComputeBackend`].
pub struct HostBackend {
    execution: Execution,
    memory_limit: Option<usize>,
    state: Mutex<HostState>,
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBackend {
    /// Work-group parallel backend.
    pub fn new() -> Self {
        Self::with_execution(Execution::Parallel)
    }

    /// Sequential reference backend.
    pub fn sequential() -> Self {
        Self::with_execution(Execution::Sequential)
    }

    pub fn with_execution(execution: Execution) -> Self {
        Self {
            execution,
            memory_limit: None,
            state: Mutex::new(HostState::default()),
        }
    }

    /// Cap the total bytes that may be allocated at once, modelling the
    /// memory size of a real device.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn execution(&self) -> Execution {
        self.execution
    }

    /// Number of live allocations.
    pub fn live_buffers(&self) -> usize {
        self.state().buffers.len()
    }

    /// Bytes currently allocated.
    pub fn allocated_bytes(&self) -> usize {
        self.state().allocated_bytes
    }

    /// Peak bytes allocated at once.
    pub fn peak_bytes(&self) -> usize {
        self.state().peak_bytes
    }

    /// Launches queued but not yet executed.
    pub fn pending_launches(&self) -> usize {
        self.state().pending.len()
    }

    /// Launches executed since the backend was created.
    pub fn completed_launches(&self) -> u64 {
        self.state().completed_launches
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run every queued launch in submission order, then free buffers whose
    /// release was deferred. The queue is emptied even when a launch fails.
    fn drain(&self, state: &mut HostState) -> Result<(), RuntimeError> {
        let mut result = Ok(());
        while let Some(launch) = state.pending.pop_front() {
            if result.is_ok() {
                result = self.execute(state, &launch);
                if result.is_ok() {
                    state.completed_launches += 1;
                }
            }
        }
        for id in std::mem::take(&mut state.deferred_release) {
            free(state, id);
        }
        result
    }

    fn execute(&self, state: &mut HostState, launch: &PendingLaunch) -> Result<(), RuntimeError> {
        let args = launch.args;
        if let Some(id) = [args.input, args.output, args.histogram]
            .into_iter()
            .find(|id| !state.buffers.contains_key(id))
        {
            return Err(RuntimeError::Execution(format!(
                "{} of {} was released before it ran",
                id, launch.id
            )));
        }

        // All three handles exist and are distinct (PartitionArgs::from_args),
        // so output and histogram can be taken out while input stays borrowed.
        let missing =
            |id: BufferId| RuntimeError::Execution(format!("{id} vanished during {}", launch.id));
        let mut output = state
            .buffers
            .remove(&args.output)
            .ok_or_else(|| missing(args.output))?;
        let mut histogram = state
            .buffers
            .remove(&args.histogram)
            .ok_or_else(|| missing(args.histogram))?;
        let input = state
            .buffers
            .get(&args.input)
            .ok_or_else(|| missing(args.input))?;

        let Kernel::RadixPartition(width) = launch.kernel;
        let n = args.count as usize;
        let hist = match width {
            KeyWidth::U32 => self.partition::<u32>(input, &mut output, n, args.bit, launch.grid),
            KeyWidth::U64 => self.partition::<u64>(input, &mut output, n, args.bit, launch.grid),
        };
        histogram.bytes_mut()[..HISTOGRAM_BYTES]
            .copy_from_slice(bytemuck::cast_slice(&hist.to_words()));

        state.buffers.insert(args.output, output);
        state.buffers.insert(args.histogram, histogram);

        trace!(
            launch = %launch.id,
            bit = args.bit,
            zeros = hist.zeros,
            ones = hist.ones,
            "executed partition"
        );
        Ok(())
    }

    fn partition<K>(
        &self,
        input: &HostBuffer,
        output: &mut HostBuffer,
        n: usize,
        bit: u32,
        grid: LaunchGrid,
    ) -> Histogram
    where
        K: Pod + Into<u64> + Send + Sync,
    {
        let width = std::mem::size_of::<K>();
        let src: &[K] = bytemuck::cast_slice(&input.bytes()[..n * width]);
        let dst: &mut [K] = bytemuck::cast_slice_mut(&mut output.bytes_mut()[..n * width]);
        match self.execution {
            Execution::Parallel => partition_parallel(src, dst, grid.local, |k| bit_is_set(k, bit)),
            Execution::Sequential => partition_sequential(src, dst, |k| bit_is_set(k, bit)),
        }
    }

    fn validate_launch(
        &self,
        state: &HostState,
        kernel: Kernel,
        args: &PartitionArgs,
        grid: LaunchGrid,
    ) -> Result<(), RuntimeError> {
        let name = kernel.name();
        if !state.built.contains(&kernel) {
            return Err(RuntimeError::dispatch(name, "kernel has not been built"));
        }
        if grid.local == 0 || grid.local > HOST_MAX_WORK_GROUP_SIZE {
            return Err(RuntimeError::dispatch(
                name,
                format!(
                    "work-group size {} is outside 1..={}",
                    grid.local, HOST_MAX_WORK_GROUP_SIZE
                ),
            ));
        }
        if grid.global % grid.local != 0 || (grid.global as u64) < args.count {
            return Err(RuntimeError::dispatch(
                name,
                format!(
                    "global size {} does not cover {} items in groups of {}",
                    grid.global, args.count, grid.local
                ),
            ));
        }

        let Kernel::RadixPartition(width) = kernel;
        let key_bytes = usize::try_from(args.count)
            .ok()
            .and_then(|n| n.checked_mul(width.bytes()))
            .ok_or_else(|| RuntimeError::dispatch(name, "element count overflows host memory"))?;
        for (slot, id, needed) in [
            ("input", args.input, key_bytes),
            ("output", args.output, key_bytes),
            ("histogram", args.histogram, HISTOGRAM_BYTES),
        ] {
            match state.buffers.get(&id) {
                None => {
                    return Err(RuntimeError::dispatch(name, format!("{slot} {id} is not allocated")))
                }
                Some(buffer) if buffer.size < needed => {
                    return Err(RuntimeError::dispatch(
                        name,
                        format!("{slot} {id} holds {} bytes, needs {needed}", buffer.size),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

fn free(state: &mut HostState, id: BufferId) {
    if let Some(buffer) = state.buffers.remove(&id) {
        state.allocated_bytes -= buffer.size;
        trace!(%id, "freed host buffer");
    }
}

impl ComputeBackend for HostBackend {
    fn info(&self) -> DeviceInfo {
        let device_name = match self.execution {
            Execution::Parallel => format!("host cpu ({} threads)", rayon::current_num_threads()),
            Execution::Sequential => "host cpu (sequential)".to_string(),
        };
        DeviceInfo {
            backend: "host",
            device_name,
            max_work_group_size: HOST_MAX_WORK_GROUP_SIZE,
        }
    }

    fn allocate(&self, bytes: usize) -> Result<BufferId, RuntimeError> {
        let mut state = self.state();
        if let Some(limit) = self.memory_limit {
            if state.allocated_bytes.saturating_add(bytes) > limit {
                return Err(RuntimeError::Allocation {
                    bytes,
                    reason: format!(
                        "{} of {} bytes already in use",
                        state.allocated_bytes, limit
                    ),
                });
            }
        }

        let mut words = Vec::new();
        words
            .try_reserve_exact(bytes.div_ceil(8))
            .map_err(|e| RuntimeError::Allocation {
                bytes,
                reason: e.to_string(),
            })?;
        words.resize(bytes.div_ceil(8), 0);

        let id = BufferId::from_raw(state.next_buffer);
        state.next_buffer += 1;
        state.buffers.insert(id, HostBuffer { words, size: bytes });
        state.allocated_bytes += bytes;
        state.peak_bytes = state.peak_bytes.max(state.allocated_bytes);
        Ok(id)
    }

    fn release(&self, buffer: BufferId) {
        let mut state = self.state();
        let in_use = state.pending.iter().any(|launch| {
            [launch.args.input, launch.args.output, launch.args.histogram].contains(&buffer)
        });
        if in_use {
            state.deferred_release.push(buffer);
        } else {
            free(&mut state, buffer);
        }
    }

    fn write(&self, buffer: BufferId, data: &[u8]) -> Result<(), RuntimeError> {
        let mut state = self.state();
        self.drain(&mut state)?;
        let target = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| RuntimeError::Transfer(format!("write to unknown {buffer}")))?;
        if data.len() > target.size {
            return Err(RuntimeError::Transfer(format!(
                "write of {} bytes exceeds {buffer} ({} bytes)",
                data.len(),
                target.size
            )));
        }
        target.bytes_mut()[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, buffer: BufferId, out: &mut [u8]) -> Result<(), RuntimeError> {
        let mut state = self.state();
        self.drain(&mut state)?;
        let source = state
            .buffers
            .get(&buffer)
            .ok_or_else(|| RuntimeError::Transfer(format!("read from unknown {buffer}")))?;
        if out.len() > source.size {
            return Err(RuntimeError::Transfer(format!(
                "read of {} bytes exceeds {buffer} ({} bytes)",
                out.len(),
                source.size
            )));
        }
        out.copy_from_slice(&source.bytes()[..out.len()]);
        Ok(())
    }

    fn build(&self, kernel: Kernel) -> Result<(), RuntimeError> {
        if self.state().built.insert(kernel) {
            debug!(%kernel, execution = ?self.execution, "prepared host kernel");
        }
        Ok(())
    }

    fn dispatch(
        &self,
        kernel: Kernel,
        args: &[KernelArg],
        grid: LaunchGrid,
    ) -> Result<LaunchId, RuntimeError> {
        let args = PartitionArgs::from_args(kernel, args)?;
        let mut state = self.state();
        self.validate_launch(&state, kernel, &args, grid)?;

        let id = LaunchId::from_raw(state.next_launch);
        state.next_launch += 1;
        state.pending.push_back(PendingLaunch {
            id,
            kernel,
            args,
            grid,
        });
        Ok(id)
    }

    fn finish(&self) -> Result<(), RuntimeError> {
        let mut state = self.state();
        self.drain(&mut state)
    }
}

#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use bitsort::runtime::{
    BufferId, ComputeBackend, DeviceInfo, HostBackend, Kernel, KernelArg, LaunchGrid, LaunchId,
    PartitionArgs, RuntimeError,
};
use bitsort::RadixKey;
use rand::distributions::uniform::SampleUniform;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// `n` keys drawn uniformly from `[0, below)`.
pub fn random_keys<K>(rng: &mut ChaCha8Rng, n: usize, below: K) -> Vec<K>
where
    K: RadixKey + SampleUniform,
{
    (0..n).map(|_| rng.gen_range(K::zeroed()..below)).collect()
}

/// Sort with the std library and compare, reporting the first differing index.
pub fn assert_matches_std<K: RadixKey>(actual: &[K], original: &[K]) {
    let mut expected = original.to_vec();
    expected.sort_unstable();
    assert_eq!(
        actual,
        &expected[..],
        "sort mismatch at n={}. First diff at index {}",
        original.len(),
        actual
            .iter()
            .zip(expected.iter())
            .position(|(a, b)| a != b)
            .unwrap_or(original.len())
    );
}

// ============================================================================
// Fault injection
// ============================================================================

/// Which backend call fails. `nth` counts from zero per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    DeviceLost,
    Allocate { nth: usize },
    Build,
    Upload,
    Dispatch { nth: usize },
    Finish { nth: usize },
    Download,
}

/// Host backend that fails one chosen call.
pub struct FaultyBackend {
    pub inner: HostBackend,
    fault: Fault,
    allocations: Cell<usize>,
    dispatches: Cell<usize>,
    finishes: Cell<usize>,
}

fn bump(counter: &Cell<usize>) -> usize {
    let n = counter.get();
    counter.set(n + 1);
    n
}

impl FaultyBackend {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: HostBackend::new(),
            fault,
            allocations: Cell::new(0),
            dispatches: Cell::new(0),
            finishes: Cell::new(0),
        }
    }

    pub fn live_buffers(&self) -> usize {
        self.inner.live_buffers()
    }
}

impl ComputeBackend for FaultyBackend {
    fn info(&self) -> DeviceInfo {
        self.inner.info()
    }

    fn allocate(&self, bytes: usize) -> Result<BufferId, RuntimeError> {
        let nth = bump(&self.allocations);
        match self.fault {
            Fault::DeviceLost => Err(RuntimeError::DeviceUnavailable("injected".into())),
            Fault::Allocate { nth: k } if k == nth => Err(RuntimeError::Allocation {
                bytes,
                reason: "injected".into(),
            }),
            _ => self.inner.allocate(bytes),
        }
    }

    fn release(&self, buffer: BufferId) {
        self.inner.release(buffer)
    }

    fn write(&self, buffer: BufferId, data: &[u8]) -> Result<(), RuntimeError> {
        if self.fault == Fault::Upload {
            return Err(RuntimeError::Transfer("injected".into()));
        }
        self.inner.write(buffer, data)
    }

    fn read(&self, buffer: BufferId, out: &mut [u8]) -> Result<(), RuntimeError> {
        if self.fault == Fault::Download {
            return Err(RuntimeError::Transfer("injected".into()));
        }
        self.inner.read(buffer, out)
    }

    fn build(&self, kernel: Kernel) -> Result<(), RuntimeError> {
        if self.fault == Fault::Build {
            return Err(RuntimeError::Build {
                kernel: kernel.name(),
                log: "injected".into(),
            });
        }
        self.inner.build(kernel)
    }

    fn dispatch(
        &self,
        kernel: Kernel,
        args: &[KernelArg],
        grid: LaunchGrid,
    ) -> Result<LaunchId, RuntimeError> {
        let nth = bump(&self.dispatches);
        if self.fault == (Fault::Dispatch { nth }) {
            return Err(RuntimeError::Dispatch {
                kernel: kernel.name(),
                reason: "injected".into(),
            });
        }
        self.inner.dispatch(kernel, args, grid)
    }

    fn finish(&self) -> Result<(), RuntimeError> {
        let nth = bump(&self.finishes);
        // Drain regardless so queued launches do not pin buffers.
        self.inner.finish()?;
        if self.fault == (Fault::Finish { nth }) {
            return Err(RuntimeError::Execution("injected".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Call recording
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Allocate(usize),
    Release(BufferId),
    Write(BufferId),
    Read(BufferId),
    Build(Kernel),
    Dispatch(PartitionArgs, LaunchGrid),
    Finish,
}

/// Host backend that logs every call it forwards.
pub struct RecordingBackend {
    inner: HostBackend,
    events: RefCell<Vec<Event>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            inner: HostBackend::new(),
            events: RefCell::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn dispatches(&self) -> Vec<(PartitionArgs, LaunchGrid)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Dispatch(args, grid) => Some((*args, *grid)),
                _ => None,
            })
            .collect()
    }

    pub fn live_buffers(&self) -> usize {
        self.inner.live_buffers()
    }

    fn record(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

impl ComputeBackend for RecordingBackend {
    fn info(&self) -> DeviceInfo {
        self.inner.info()
    }

    fn allocate(&self, bytes: usize) -> Result<BufferId, RuntimeError> {
        self.record(Event::Allocate(bytes));
        self.inner.allocate(bytes)
    }

    fn release(&self, buffer: BufferId) {
        self.record(Event::Release(buffer));
        self.inner.release(buffer)
    }

    fn write(&self, buffer: BufferId, data: &[u8]) -> Result<(), RuntimeError> {
        self.record(Event::Write(buffer));
        self.inner.write(buffer, data)
    }

    fn read(&self, buffer: BufferId, out: &mut [u8]) -> Result<(), RuntimeError> {
        self.record(Event::Read(buffer));
        self.inner.read(buffer, out)
    }

    fn build(&self, kernel: Kernel) -> Result<(), RuntimeError> {
        self.record(Event::Build(kernel));
        self.inner.build(kernel)
    }

    fn dispatch(
        &self,
        kernel: Kernel,
        args: &[KernelArg],
        grid: LaunchGrid,
    ) -> Result<LaunchId, RuntimeError> {
        let decoded = PartitionArgs::from_args(kernel, args)?;
        self.record(Event::Dispatch(decoded, grid));
        self.inner.dispatch(kernel, args, grid)
    }

    fn finish(&self) -> Result<(), RuntimeError> {
        self.record(Event::Finish);
        self.inner.finish()
    }
}

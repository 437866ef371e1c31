//! The substrate contract: handles, kernel identifiers, launch geometry and
//! the [`ComputeBackend`] trait.

use std::fmt;

use crate::error::RuntimeError;

/// Size in bytes of the per-pass histogram buffer: two `u64` counters,
/// `[count_zero, count_one]`.
pub const HISTOGRAM_BYTES: usize = 2 * std::mem::size_of::<u64>();

/// Opaque handle to a device allocation owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

/// Token identifying one asynchronous launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaunchId(u64);

impl LaunchId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LaunchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "launch#{}", self.0)
    }
}

/// Width of the keys a kernel variant operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyWidth {
    U32,
    U64,
}

impl KeyWidth {
    /// Size of one key in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            KeyWidth::U32 => 4,
            KeyWidth::U64 => 8,
        }
    }

    /// Number of bits in one key.
    pub const fn bits(self) -> u32 {
        (self.bytes() * 8) as u32
    }
}

/// Kernels a backend knows how to build and launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Stable two-way partition of the keys on a single bit.
    RadixPartition(KeyWidth),
}

impl Kernel {
    pub const fn name(self) -> &'static str {
        match self {
            Kernel::RadixPartition(KeyWidth::U32) => "radix_partition_u32",
            Kernel::RadixPartition(KeyWidth::U64) => "radix_partition_u64",
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single kernel argument binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelArg {
    Buffer(BufferId),
    U32(u32),
    U64(u64),
}

/// Argument bindings of the partition kernel, in binding order:
/// `(input, output, histogram, bit, count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionArgs {
    pub input: BufferId,
    pub output: BufferId,
    pub histogram: BufferId,
    pub bit: u32,
    pub count: u64,
}

impl PartitionArgs {
    pub const ARITY: usize = 5;

    pub fn to_args(&self) -> [KernelArg; Self::ARITY] {
        [
            KernelArg::Buffer(self.input),
            KernelArg::Buffer(self.output),
            KernelArg::Buffer(self.histogram),
            KernelArg::U32(self.bit),
            KernelArg::U64(self.count),
        ]
    }

    /// Decode and validate a binding list for `kernel`.
    ///
    /// Rejects the wrong arity, mistyped slots, aliased buffers and a bit index
    /// outside the key width.
    pub fn from_args(kernel: Kernel, args: &[KernelArg]) -> Result<Self, RuntimeError> {
        let name = kernel.name();
        let Kernel::RadixPartition(width) = kernel;

        let [input, output, histogram, bit, count] = args else {
            return Err(RuntimeError::dispatch(
                name,
                format!("expected {} arguments, got {}", Self::ARITY, args.len()),
            ));
        };

        let buffer = |slot: usize, arg: &KernelArg| match arg {
            KernelArg::Buffer(id) => Ok(*id),
            other => Err(RuntimeError::dispatch(
                name,
                format!("argument {slot} must be a buffer, got {other:?}"),
            )),
        };
        let input = buffer(0, input)?;
        let output = buffer(1, output)?;
        let histogram = buffer(2, histogram)?;

        let KernelArg::U32(bit) = *bit else {
            return Err(RuntimeError::dispatch(
                name,
                format!("argument 3 must be a u32 bit index, got {bit:?}"),
            ));
        };
        let count = match *count {
            KernelArg::U64(v) => v,
            KernelArg::U32(v) => u64::from(v),
            other => {
                return Err(RuntimeError::dispatch(
                    name,
                    format!("argument 4 must be an element count, got {other:?}"),
                ))
            }
        };

        if input == output || input == histogram || output == histogram {
            return Err(RuntimeError::dispatch(
                name,
                "input, output and histogram must be distinct buffers",
            ));
        }
        if bit >= width.bits() {
            return Err(RuntimeError::dispatch(
                name,
                format!("bit {bit} is outside a {}-bit key", width.bits()),
            ));
        }

        Ok(Self {
            input,
            output,
            histogram,
            bit,
            count,
        })
    }
}

/// One-dimensional launch geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGrid {
    /// Total work items, always a multiple of `local`.
    pub global: usize,
    /// Work-group size.
    pub local: usize,
}

impl LaunchGrid {
    /// Cover `items` work items with groups of `local`, rounding the global
    /// size up to the next multiple of `local`. Items past `items` must be
    /// no-ops inside the kernel.
    pub fn linear(items: usize, local: usize) -> Self {
        let local = local.max(1);
        Self {
            global: items.div_ceil(local) * local,
            local,
        }
    }

    /// Number of work-groups in the launch.
    pub fn groups(&self) -> usize {
        self.global / self.local
    }
}

/// Static description of the device behind a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub backend: &'static str,
    pub device_name: String,
    pub max_work_group_size: usize,
}

/// Data-parallel compute substrate.
///
/// Methods take `&self` so that scoped [`DeviceBuffer`](crate::DeviceBuffer)
/// guards can borrow the backend while the caller keeps dispatching; backends
/// use interior mutability for their bookkeeping.
///
/// Queue semantics are in-order: `dispatch` returns once the launch is queued,
/// `finish` blocks until every queued launch has completed, and `read`/`write`
/// are blocking and observe all previously queued launches.
pub trait ComputeBackend {
    fn info(&self) -> DeviceInfo;

    fn allocate(&self, bytes: usize) -> Result<BufferId, RuntimeError>;

    /// Release an allocation. Unknown handles are ignored.
    fn release(&self, buffer: BufferId);

    fn write(&self, buffer: BufferId, data: &[u8]) -> Result<(), RuntimeError>;

    fn read(&self, buffer: BufferId, out: &mut [u8]) -> Result<(), RuntimeError>;

    /// Compile or otherwise prepare `kernel`. Must succeed before the first
    /// dispatch of that kernel; repeated calls are cheap.
    fn build(&self, kernel: Kernel) -> Result<(), RuntimeError>;

    fn dispatch(
        &self,
        kernel: Kernel,
        args: &[KernelArg],
        grid: LaunchGrid,
    ) -> Result<LaunchId, RuntimeError>;

    fn finish(&self) -> Result<(), RuntimeError>;
}

//! Metal compute backend (macOS).
//!
//! The partition kernel source is compiled at runtime with
//! `newLibraryWithSource`, so no offline shader toolchain is needed. Each
//! launch encodes three serial dispatches into one command buffer and commits
//! it; `finish` waits on every committed command buffer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::NonNull;

use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_foundation::NSString;
use objc2_metal::{
    MTLBuffer, MTLCommandBuffer, MTLCommandBufferStatus, MTLCommandEncoder, MTLCommandQueue,
    MTLComputeCommandEncoder, MTLComputePipelineState, MTLCreateSystemDefaultDevice, MTLDevice,
    MTLLibrary, MTLResourceOptions, MTLSize,
};
use tracing::{debug, info};

use crate::backend::{
    BufferId, ComputeBackend, DeviceInfo, Kernel, KernelArg, KeyWidth, LaunchGrid, LaunchId,
    PartitionArgs, HISTOGRAM_BYTES,
};
use crate::error::RuntimeError;

const PARTITION_SOURCE: &str = include_str!("partition.metal");

/// Must match `MAX_GROUP_SIZE` in partition.metal.
const METAL_MAX_WORK_GROUP_SIZE: usize = 256;

/// Must match `PartitionParams` in partition.metal.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
struct PartitionParams {
    count: u32,
    bit: u32,
    num_groups: u32,
    _pad: u32,
}

struct PartitionPipelines {
    count: Retained<ProtocolObject<dyn MTLComputePipelineState>>,
    scan: Retained<ProtocolObject<dyn MTLComputePipelineState>>,
    scatter: Retained<ProtocolObject<dyn MTLComputePipelineState>>,
}

#[derive(Default)]
struct MetalState {
    library: Option<Retained<ProtocolObject<dyn MTLLibrary>>>,
    pipelines: HashMap<KeyWidth, PartitionPipelines>,
    buffers: HashMap<BufferId, Retained<ProtocolObject<dyn MTLBuffer>>>,
    next_buffer: u64,
    next_launch: u64,
    /// Per-group zero counts, grown on demand and reused across launches.
    group_counts: Option<Retained<ProtocolObject<dyn MTLBuffer>>>,
    group_counts_capacity: usize,
    in_flight: Vec<Retained<ProtocolObject<dyn MTLCommandBuffer>>>,
}

/// [`ComputeBackend`] on the system default Metal device.
pub struct MetalBackend {
    device: Retained<ProtocolObject<dyn MTLDevice>>,
    queue: Retained<ProtocolObject<dyn MTLCommandQueue>>,
    device_name: String,
    state: RefCell<MetalState>,
}

impl MetalBackend {
    /// Acquire the system default device and create a command queue.
    pub fn new() -> Result<Self, RuntimeError> {
        let device = MTLCreateSystemDefaultDevice()
            .ok_or_else(|| RuntimeError::DeviceUnavailable("no Metal device".into()))?;
        let queue = device
            .newCommandQueue()
            .ok_or_else(|| RuntimeError::DeviceUnavailable("failed to create command queue".into()))?;
        let device_name = device.name().to_string();
        info!(device = %device_name, "initialized Metal backend");

        Ok(Self {
            device,
            queue,
            device_name,
            state: RefCell::new(MetalState::default()),
        })
    }

    fn library(&self, state: &mut MetalState) -> Result<Retained<ProtocolObject<dyn MTLLibrary>>, RuntimeError> {
        if let Some(library) = &state.library {
            return Ok(library.clone());
        }
        let source = NSString::from_str(PARTITION_SOURCE);
        let library = self
            .device
            .newLibraryWithSource_options_error(&source, None)
            .map_err(|e| RuntimeError::Build {
                kernel: "partition.metal",
                log: e.to_string(),
            })?;
        state.library = Some(library.clone());
        Ok(library)
    }

    fn compile(
        &self,
        library: &ProtocolObject<dyn MTLLibrary>,
        kernel: Kernel,
        function_name: &str,
    ) -> Result<Retained<ProtocolObject<dyn MTLComputePipelineState>>, RuntimeError> {
        let fn_name = NSString::from_str(function_name);
        let function = library
            .newFunctionWithName(&fn_name)
            .ok_or_else(|| RuntimeError::Build {
                kernel: kernel.name(),
                log: format!("function '{function_name}' not found in library"),
            })?;
        self.device
            .newComputePipelineStateWithFunction_error(&function)
            .map_err(|e| RuntimeError::Build {
                kernel: kernel.name(),
                log: format!("pipeline for '{function_name}': {e}"),
            })
    }

    fn ensure_group_counts(&self, state: &mut MetalState, groups: usize) -> Result<(), RuntimeError> {
        if state.group_counts.is_some() && state.group_counts_capacity >= groups {
            return Ok(());
        }
        let bytes = groups.max(1) * std::mem::size_of::<u32>();
        let buffer = self
            .device
            .newBufferWithLength_options(bytes, MTLResourceOptions::StorageModeShared)
            .ok_or_else(|| RuntimeError::Allocation {
                bytes,
                reason: "group count scratch buffer".into(),
            })?;
        state.group_counts = Some(buffer);
        state.group_counts_capacity = groups.max(1);
        Ok(())
    }

    fn wait_in_flight(&self, state: &mut MetalState) -> Result<(), RuntimeError> {
        let mut result = Ok(());
        for cmd in state.in_flight.drain(..) {
            cmd.waitUntilCompleted();
            if cmd.status() == MTLCommandBufferStatus::Error && result.is_ok() {
                result = Err(RuntimeError::Execution(format!(
                    "command buffer error: {:?}",
                    cmd.error()
                )));
            }
        }
        result
    }
}

fn lookup<'s>(
    state: &'s MetalState,
    kernel: Kernel,
    slot: &str,
    id: BufferId,
    needed: usize,
) -> Result<&'s ProtocolObject<dyn MTLBuffer>, RuntimeError> {
    let buffer = state
        .buffers
        .get(&id)
        .ok_or_else(|| RuntimeError::dispatch(kernel.name(), format!("{slot} {id} is not allocated")))?;
    if buffer.length() < needed {
        return Err(RuntimeError::dispatch(
            kernel.name(),
            format!("{slot} {id} holds {} bytes, needs {needed}", buffer.length()),
        ));
    }
    Ok(buffer)
}

fn linear_size(width: usize) -> MTLSize {
    MTLSize {
        width,
        height: 1,
        depth: 1,
    }
}

impl ComputeBackend for MetalBackend {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            backend: "metal",
            device_name: self.device_name.clone(),
            max_work_group_size: METAL_MAX_WORK_GROUP_SIZE,
        }
    }

    fn allocate(&self, bytes: usize) -> Result<BufferId, RuntimeError> {
        if bytes > self.device.maxBufferLength() {
            return Err(RuntimeError::Allocation {
                bytes,
                reason: format!("device max buffer length is {}", self.device.maxBufferLength()),
            });
        }
        // Zero-length Metal buffers are invalid.
        let buffer = self
            .device
            .newBufferWithLength_options(bytes.max(4), MTLResourceOptions::StorageModeShared)
            .ok_or_else(|| RuntimeError::Allocation {
                bytes,
                reason: "newBufferWithLength returned nil".into(),
            })?;

        let mut state = self.state.borrow_mut();
        let id = BufferId::from_raw(state.next_buffer);
        state.next_buffer += 1;
        state.buffers.insert(id, buffer);
        Ok(id)
    }

    fn release(&self, buffer: BufferId) {
        // Committed command buffers retain what they reference.
        self.state.borrow_mut().buffers.remove(&buffer);
    }

    fn write(&self, buffer: BufferId, data: &[u8]) -> Result<(), RuntimeError> {
        let mut state = self.state.borrow_mut();
        self.wait_in_flight(&mut state)?;
        let target = state
            .buffers
            .get(&buffer)
            .ok_or_else(|| RuntimeError::Transfer(format!("write to unknown {buffer}")))?;
        if data.len() > target.length() {
            return Err(RuntimeError::Transfer(format!(
                "write of {} bytes exceeds {buffer} ({} bytes)",
                data.len(),
                target.length()
            )));
        }
        // SAFETY: shared storage, no GPU work in flight, length checked above.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                target.contents().as_ptr() as *mut u8,
                data.len(),
            );
        }
        Ok(())
    }

    fn read(&self, buffer: BufferId, out: &mut [u8]) -> Result<(), RuntimeError> {
        let mut state = self.state.borrow_mut();
        self.wait_in_flight(&mut state)?;
        let source = state
            .buffers
            .get(&buffer)
            .ok_or_else(|| RuntimeError::Transfer(format!("read from unknown {buffer}")))?;
        if out.len() > source.length() {
            return Err(RuntimeError::Transfer(format!(
                "read of {} bytes exceeds {buffer} ({} bytes)",
                out.len(),
                source.length()
            )));
        }
        // SAFETY: shared storage, no GPU work in flight, length checked above.
        unsafe {
            std::ptr::copy_nonoverlapping(
                source.contents().as_ptr() as *const u8,
                out.as_mut_ptr(),
                out.len(),
            );
        }
        Ok(())
    }

    fn build(&self, kernel: Kernel) -> Result<(), RuntimeError> {
        let mut state = self.state.borrow_mut();
        let Kernel::RadixPartition(width) = kernel;
        if state.pipelines.contains_key(&width) {
            return Ok(());
        }

        let library = self.library(&mut state)?;
        let suffix = match width {
            KeyWidth::U32 => "u32",
            KeyWidth::U64 => "u64",
        };
        let pipelines = PartitionPipelines {
            count: self.compile(&library, kernel, &format!("partition_count_{suffix}"))?,
            scan: self.compile(&library, kernel, "partition_scan")?,
            scatter: self.compile(&library, kernel, &format!("partition_scatter_{suffix}"))?,
        };
        debug!(%kernel, "compiled Metal partition pipelines");
        state.pipelines.insert(width, pipelines);
        Ok(())
    }

    fn dispatch(
        &self,
        kernel: Kernel,
        args: &[KernelArg],
        grid: LaunchGrid,
    ) -> Result<LaunchId, RuntimeError> {
        let args = PartitionArgs::from_args(kernel, args)?;
        let name = kernel.name();
        let Kernel::RadixPartition(width) = kernel;

        let count = u32::try_from(args.count)
            .map_err(|_| RuntimeError::dispatch(name, "element count exceeds 32-bit device indices"))?;
        if grid.local == 0 || grid.local > METAL_MAX_WORK_GROUP_SIZE {
            return Err(RuntimeError::dispatch(
                name,
                format!("work-group size {} is outside 1..={METAL_MAX_WORK_GROUP_SIZE}", grid.local),
            ));
        }
        if grid.global % grid.local != 0 || (grid.global as u64) < args.count {
            return Err(RuntimeError::dispatch(name, "global size does not cover the element count"));
        }
        let groups = grid.groups();
        let num_groups = u32::try_from(groups)
            .map_err(|_| RuntimeError::dispatch(name, "too many work-groups"))?;

        let mut state = self.state.borrow_mut();
        self.ensure_group_counts(&mut state, groups)?;
        let state = &mut *state;

        let pipelines = state
            .pipelines
            .get(&width)
            .ok_or_else(|| RuntimeError::dispatch(name, "kernel has not been built"))?;
        for pso in [&pipelines.count, &pipelines.scatter] {
            if pso.maxTotalThreadsPerThreadgroup() < grid.local {
                return Err(RuntimeError::dispatch(
                    name,
                    format!(
                        "pipeline supports {} threads per group, launch asks for {}",
                        pso.maxTotalThreadsPerThreadgroup(),
                        grid.local
                    ),
                ));
            }
        }

        let key_bytes = args.count as usize * width.bytes();
        let input = lookup(state, kernel, "input", args.input, key_bytes)?;
        let output = lookup(state, kernel, "output", args.output, key_bytes)?;
        let histogram = lookup(state, kernel, "histogram", args.histogram, HISTOGRAM_BYTES)?;
        let group_counts = state
            .group_counts
            .as_deref()
            .ok_or_else(|| RuntimeError::dispatch(name, "group count buffer missing"))?;

        let params = PartitionParams {
            count,
            bit: args.bit,
            num_groups,
            _pad: 0,
        };
        let params_ptr = NonNull::from(&params).cast();
        let params_len = std::mem::size_of::<PartitionParams>();

        let cmd = self
            .queue
            .commandBuffer()
            .ok_or_else(|| RuntimeError::dispatch(name, "failed to create command buffer"))?;
        let enc = cmd
            .computeCommandEncoder()
            .ok_or_else(|| RuntimeError::dispatch(name, "failed to create compute encoder"))?;

        let tg_size = linear_size(grid.local);
        let group_grid = linear_size(groups);

        // Dispatch 1: per-group zero counts
        enc.setComputePipelineState(&pipelines.count);
        unsafe {
            enc.setBuffer_offset_atIndex(Some(input), 0, 0);
            enc.setBuffer_offset_atIndex(Some(group_counts), 0, 1);
            enc.setBytes_length_atIndex(params_ptr, params_len, 2);
        }
        enc.dispatchThreadgroups_threadsPerThreadgroup(group_grid, tg_size);

        // Dispatch 2: exclusive scan over groups + histogram
        enc.setComputePipelineState(&pipelines.scan);
        unsafe {
            enc.setBuffer_offset_atIndex(Some(group_counts), 0, 0);
            enc.setBuffer_offset_atIndex(Some(histogram), 0, 1);
            enc.setBytes_length_atIndex(params_ptr, params_len, 2);
        }
        enc.dispatchThreadgroups_threadsPerThreadgroup(linear_size(1), linear_size(1));

        // Dispatch 3: ranked scatter (input → output)
        enc.setComputePipelineState(&pipelines.scatter);
        unsafe {
            enc.setBuffer_offset_atIndex(Some(input), 0, 0);
            enc.setBuffer_offset_atIndex(Some(output), 0, 1);
            enc.setBuffer_offset_atIndex(Some(group_counts), 0, 2);
            enc.setBuffer_offset_atIndex(Some(histogram), 0, 3);
            enc.setBytes_length_atIndex(params_ptr, params_len, 4);
        }
        enc.dispatchThreadgroups_threadsPerThreadgroup(group_grid, tg_size);

        enc.endEncoding();
        cmd.commit();

        let id = LaunchId::from_raw(state.next_launch);
        state.next_launch += 1;
        state.in_flight.push(cmd);
        Ok(id)
    }

    fn finish(&self) -> Result<(), RuntimeError> {
        let mut state = self.state.borrow_mut();
        self.wait_in_flight(&mut state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceBuffer;

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<PartitionParams>(), 16);
    }

    #[test]
    fn test_metal_partition_matches_host() {
        let Ok(backend) = MetalBackend::new() else {
            return;
        };
        let kernel = Kernel::RadixPartition(KeyWidth::U32);
        backend.build(kernel).unwrap();

        let keys: Vec<u32> = (0..1000u32).map(|i| i.wrapping_mul(2_654_435_761) % 1024).collect();
        let input = DeviceBuffer::from_slice(&backend, &keys).unwrap();
        let output = DeviceBuffer::allocate(&backend, keys.len() * 4).unwrap();
        let hist = DeviceBuffer::allocate(&backend, HISTOGRAM_BYTES).unwrap();

        let args = PartitionArgs {
            input: input.id(),
            output: output.id(),
            histogram: hist.id(),
            bit: 3,
            count: keys.len() as u64,
        };
        backend
            .dispatch(kernel, &args.to_args(), LaunchGrid::linear(keys.len(), 64))
            .unwrap();
        backend.finish().unwrap();

        let mut actual = vec![0u32; keys.len()];
        output.download(&mut actual).unwrap();
        let mut expected = vec![0u32; keys.len()];
        crate::host::partition_sequential(&keys, &mut expected, |k| crate::host::bit_is_set(k, 3));
        assert_eq!(actual, expected);
    }
}

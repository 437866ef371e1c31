//! Host backend behaviour driven through the `ComputeBackend` trait only.

mod common;

use bitsort_runtime::host::partition_sequential;
use bitsort_runtime::{
    ComputeBackend, DeviceBuffer, HostBackend, Kernel, KernelArg, KeyWidth, LaunchGrid,
    PartitionArgs, RuntimeError, HISTOGRAM_BYTES,
};
use common::{partition_u32, seeded_rng};
use rand::Rng;

#[test]
fn test_parallel_and_sequential_agree() {
    let mut rng = seeded_rng(42);
    let keys: Vec<u32> = (0..50_000).map(|_| rng.gen_range(0..1_000_000)).collect();

    let parallel = HostBackend::new();
    let sequential = HostBackend::sequential();
    for bit in [0, 5, 19] {
        let (p_out, p_hist) = partition_u32(&parallel, &keys, bit, 64);
        let (s_out, s_hist) = partition_u32(&sequential, &keys, bit, 64);
        assert_eq!(p_out, s_out, "bit={bit}");
        assert_eq!(p_hist, s_hist);
        assert_eq!(p_hist.total(), keys.len() as u64);
    }
    assert_eq!(parallel.live_buffers(), 0);
    assert_eq!(sequential.live_buffers(), 0);
}

#[test]
fn test_u64_partition_on_high_bit() {
    let backend = HostBackend::new();
    let kernel = Kernel::RadixPartition(KeyWidth::U64);
    backend.build(kernel).unwrap();

    let keys = [1u64 << 40, 3, 1 << 40 | 1, 7];
    let input = DeviceBuffer::from_slice(&backend, &keys).unwrap();
    let output = DeviceBuffer::allocate(&backend, 32).unwrap();
    let hist = DeviceBuffer::allocate(&backend, HISTOGRAM_BYTES).unwrap();
    let args = PartitionArgs {
        input: input.id(),
        output: output.id(),
        histogram: hist.id(),
        bit: 40,
        count: 4,
    };
    backend
        .dispatch(kernel, &args.to_args(), LaunchGrid::linear(4, 2))
        .unwrap();

    let mut out = [0u64; 4];
    output.download(&mut out).unwrap();
    assert_eq!(out, [3, 7, 1 << 40, 1 << 40 | 1]);
}

#[test]
fn test_chained_launches_run_in_order() {
    // Two queued passes without an intervening finish: the second must see
    // the output of the first.
    let backend = HostBackend::new();
    let kernel = Kernel::RadixPartition(KeyWidth::U32);
    backend.build(kernel).unwrap();

    let keys = [3u32, 0, 2, 1];
    let a = DeviceBuffer::from_slice(&backend, &keys).unwrap();
    let b = DeviceBuffer::allocate(&backend, 16).unwrap();
    let hist = DeviceBuffer::allocate(&backend, HISTOGRAM_BYTES).unwrap();
    let grid = LaunchGrid::linear(4, 4);

    for (bit, input, output) in [(0, &a, &b), (1, &b, &a)] {
        let args = PartitionArgs {
            input: input.id(),
            output: output.id(),
            histogram: hist.id(),
            bit,
            count: 4,
        };
        backend.dispatch(kernel, &args.to_args(), grid).unwrap();
    }
    assert_eq!(backend.pending_launches(), 2);
    backend.finish().unwrap();
    assert_eq!(backend.pending_launches(), 0);
    assert_eq!(backend.completed_launches(), 2);

    let mut out = [0u32; 4];
    a.download(&mut out).unwrap();
    assert_eq!(out, [0, 1, 2, 3]);
}

#[test]
fn test_rejects_malformed_bindings() {
    let backend = HostBackend::new();
    let kernel = Kernel::RadixPartition(KeyWidth::U32);
    backend.build(kernel).unwrap();

    let buf = DeviceBuffer::allocate(&backend, 16).unwrap();
    let err = backend
        .dispatch(
            kernel,
            &[KernelArg::Buffer(buf.id()), KernelArg::U32(0)],
            LaunchGrid::linear(4, 4),
        )
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Dispatch { .. }), "{err}");
    assert_eq!(backend.pending_launches(), 0);
}

#[test]
fn test_rejects_oversized_work_group() {
    let backend = HostBackend::new();
    let kernel = Kernel::RadixPartition(KeyWidth::U32);
    backend.build(kernel).unwrap();

    let input = DeviceBuffer::allocate(&backend, 16).unwrap();
    let output = DeviceBuffer::allocate(&backend, 16).unwrap();
    let hist = DeviceBuffer::allocate(&backend, HISTOGRAM_BYTES).unwrap();
    let args = PartitionArgs {
        input: input.id(),
        output: output.id(),
        histogram: hist.id(),
        bit: 0,
        count: 4,
    };
    let max = backend.info().max_work_group_size;
    let err = backend
        .dispatch(kernel, &args.to_args(), LaunchGrid::linear(4, max * 2))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Dispatch { .. }), "{err}");
}

#[test]
fn test_guard_releases_on_early_return() {
    fn fails_midway(backend: &HostBackend) -> Result<(), RuntimeError> {
        let _a = DeviceBuffer::allocate(backend, 64)?;
        let _b = DeviceBuffer::allocate(backend, 64)?;
        Err(RuntimeError::Execution("injected".into()))
    }

    let backend = HostBackend::new();
    assert!(fails_midway(&backend).is_err());
    assert_eq!(backend.live_buffers(), 0);
    assert_eq!(backend.allocated_bytes(), 0);
    assert_eq!(backend.peak_bytes(), 128);
}

#[test]
fn test_matches_reference_partition() {
    let mut rng = seeded_rng(9);
    let keys: Vec<u32> = (0..4097).map(|_| rng.gen()).collect();
    let mut expected = vec![0u32; keys.len()];
    let expected_hist =
        partition_sequential(&keys, &mut expected, |k| (k >> 31) & 1 == 1);

    let (out, hist) = partition_u32(&HostBackend::new(), &keys, 31, 256);
    assert_eq!(out, expected);
    assert_eq!(hist, expected_hist);
}

#![allow(dead_code)]

use bitsort_runtime::{
    ComputeBackend, DeviceBuffer, Histogram, Kernel, KeyWidth, LaunchGrid, PartitionArgs,
    HISTOGRAM_BYTES,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Run one u32 partition launch through the trait and read back the result.
pub fn partition_u32<B: ComputeBackend>(
    backend: &B,
    keys: &[u32],
    bit: u32,
    work_group_size: usize,
) -> (Vec<u32>, Histogram) {
    let kernel = Kernel::RadixPartition(KeyWidth::U32);
    backend.build(kernel).unwrap();

    let input = DeviceBuffer::from_slice(backend, keys).unwrap();
    let output = DeviceBuffer::allocate(backend, std::mem::size_of_val(keys)).unwrap();
    let hist = DeviceBuffer::allocate(backend, HISTOGRAM_BYTES).unwrap();

    let args = PartitionArgs {
        input: input.id(),
        output: output.id(),
        histogram: hist.id(),
        bit,
        count: keys.len() as u64,
    };
    backend
        .dispatch(
            kernel,
            &args.to_args(),
            LaunchGrid::linear(keys.len(), work_group_size),
        )
        .unwrap();
    backend.finish().unwrap();

    let mut out = vec![0u32; keys.len()];
    output.download(&mut out).unwrap();
    let mut words = [0u64; 2];
    hist.download(&mut words).unwrap();
    (out, Histogram::from_words(words))
}

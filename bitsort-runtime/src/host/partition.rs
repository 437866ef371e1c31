//! Host implementations of the stable single-bit partition.
//!
//! Both functions produce the same input→output mapping: every item whose
//! predicate is false lands before every item whose predicate is true, and
//! relative input order is kept inside each group.

use rayon::prelude::*;

/// Per-pass bit histogram: how many keys had the inspected bit clear or set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Histogram {
    pub zeros: u64,
    pub ones: u64,
}

impl Histogram {
    /// Output index at which the "1" partition begins.
    pub fn one_offset(&self) -> u64 {
        self.zeros
    }

    pub fn total(&self) -> u64 {
        self.zeros + self.ones
    }

    pub fn to_words(self) -> [u64; 2] {
        [self.zeros, self.ones]
    }

    pub fn from_words(words: [u64; 2]) -> Self {
        Self {
            zeros: words[0],
            ones: words[1],
        }
    }
}

/// Single-threaded stable partition. The reference mapping.
///
/// # Panics
/// Panics if `input` and `output` differ in length.
pub fn partition_sequential<T, F>(input: &[T], output: &mut [T], is_one: F) -> Histogram
where
    T: Copy,
    F: Fn(&T) -> bool,
{
    assert_eq!(input.len(), output.len(), "partition buffers differ in length");

    let zeros = input.iter().filter(|item| !is_one(item)).count();
    let (mut next_zero, mut next_one) = (0, zeros);
    for item in input {
        if is_one(item) {
            output[next_one] = *item;
            next_one += 1;
        } else {
            output[next_zero] = *item;
            next_zero += 1;
        }
    }

    Histogram {
        zeros: zeros as u64,
        ones: (input.len() - zeros) as u64,
    }
}

/// Work-group parallel stable partition.
///
/// Mirrors the device algorithm: each group of `group_size` items counts its
/// zero-bit items, an exclusive scan over those counts gives every group a
/// contiguous destination range in both halves of the output, and each group
/// scatters its items in input order into its ranges. Groups run on the rayon
/// pool in any order; the ranges are disjoint, so the result does not depend
/// on scheduling.
///
/// # Panics
/// Panics if `input` and `output` differ in length.
pub fn partition_parallel<T, F>(
    input: &[T],
    output: &mut [T],
    group_size: usize,
    is_one: F,
) -> Histogram
where
    T: Copy + Send + Sync,
    F: Fn(&T) -> bool + Sync,
{
    assert_eq!(input.len(), output.len(), "partition buffers differ in length");
    let group_size = group_size.max(1);

    let group_zeros: Vec<usize> = input
        .par_chunks(group_size)
        .map(|tile| tile.iter().filter(|item| !is_one(item)).count())
        .collect();
    let total_zeros: usize = group_zeros.iter().sum();

    // Exclusive scan, expressed as carving both halves into per-group ranges.
    let (zero_half, one_half) = output.split_at_mut(total_zeros);
    let mut zero_ranges = Vec::with_capacity(group_zeros.len());
    let mut one_ranges = Vec::with_capacity(group_zeros.len());
    let (mut zero_rest, mut one_rest) = (zero_half, one_half);
    for (tile, &zeros) in input.chunks(group_size).zip(&group_zeros) {
        let (head, tail) = std::mem::take(&mut zero_rest).split_at_mut(zeros);
        zero_ranges.push(head);
        zero_rest = tail;

        let (head, tail) = std::mem::take(&mut one_rest).split_at_mut(tile.len() - zeros);
        one_ranges.push(head);
        one_rest = tail;
    }

    input
        .par_chunks(group_size)
        .zip(zero_ranges)
        .zip(one_ranges)
        .for_each(|((tile, zero_dst), one_dst)| {
            let (mut z, mut o) = (0, 0);
            for item in tile {
                if is_one(item) {
                    one_dst[o] = *item;
                    o += 1;
                } else {
                    zero_dst[z] = *item;
                    z += 1;
                }
            }
        });

    Histogram {
        zeros: total_zeros as u64,
        ones: (input.len() - total_zeros) as u64,
    }
}

/// Predicate for "bit `bit` of `key` is set".
pub fn bit_is_set<K: Copy + Into<u64>>(key: &K, bit: u32) -> bool {
    ((*key).into() >> bit) & 1 == 1
}

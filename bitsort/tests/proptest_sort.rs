//! Property-based tests for the radix sort against the std library sort.

mod common;

use bitsort::runtime::host::{bit_is_set, partition_parallel};
use bitsort::runtime::HostBackend;
use bitsort::{pass_count, RadixSorter, SortOptions};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_sort_u32_matches_std(
        keys in prop::collection::vec(any::<u32>(), 0..3000),
        work_group_size in 1usize..=1024,
    ) {
        let backend = HostBackend::new();
        let sorter = RadixSorter::with_options(
            &backend,
            SortOptions::default().with_work_group_size(work_group_size),
        );
        let actual = sorter.sorted(&keys).unwrap();
        let mut expected = keys.clone();
        expected.sort_unstable();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn prop_sort_u64_matches_std(keys in prop::collection::vec(any::<u64>(), 0..1000)) {
        let backend = HostBackend::sequential();
        let actual = RadixSorter::new(&backend).sorted(&keys).unwrap();
        let mut expected = keys.clone();
        expected.sort_unstable();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn prop_idempotent(keys in prop::collection::vec(0u32..1_000_000, 0..2000)) {
        let backend = HostBackend::new();
        let sorter = RadixSorter::new(&backend);
        let once = sorter.sorted(&keys).unwrap();
        let twice = sorter.sorted(&once).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_pass_count_is_highest_bit(max in any::<u32>()) {
        let passes = pass_count(max);
        prop_assert_eq!(passes, 32 - max.leading_zeros());
        if passes > 0 {
            prop_assert_eq!(max >> (passes - 1), 1);
        }
    }

    /// Tag every key with its input position and run the LSD passes through
    /// the same work-group partition the host backend uses. Equal keys must
    /// come out in input order.
    #[test]
    fn prop_lsd_passes_are_stable(
        keys in prop::collection::vec(0u32..64, 1..2000),
        group_size in 1usize..300,
    ) {
        let mut current: Vec<(u32, usize)> = keys.iter().copied().zip(0..).collect();
        let mut scratch = current.clone();
        let max = keys.iter().copied().max().unwrap_or(0);
        for bit in 0..pass_count(max) {
            partition_parallel(&current, &mut scratch, group_size, |(k, _)| bit_is_set(k, bit));
            std::mem::swap(&mut current, &mut scratch);
        }

        for pair in current.windows(2) {
            prop_assert!(pair[0].0 <= pair[1].0);
            if pair[0].0 == pair[1].0 {
                prop_assert!(pair[0].1 < pair[1].1);
            }
        }
    }
}

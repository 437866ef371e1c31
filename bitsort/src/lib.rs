//! Parallel 1-bit LSD radix sort.
//!
//! [`RadixSorter`] sorts `u32`/`u64` keys by running one stable single-bit
//! partition per significant bit of the largest key on a
//! [`ComputeBackend`](bitsort_runtime::ComputeBackend), ping-ponging between
//! two device buffers and waiting for each pass before issuing the next.
//!
//! ```
//! use bitsort::runtime::HostBackend;
//! use bitsort::RadixSorter;
//!
//! let backend = HostBackend::new();
//! let mut keys = vec![5u32, 3, 8, 1];
//! let report = RadixSorter::new(&backend).sort(&mut keys).unwrap();
//! assert_eq!(keys, [1, 3, 5, 8]);
//! assert_eq!(report.passes, 4);
//! ```

pub mod error;
pub mod key;
pub mod options;
pub mod sorter;

pub use bitsort_runtime as runtime;

pub use error::{SortError, TransferDirection};
pub use key::{max_key, pass_count, RadixKey};
pub use options::{CancelToken, SortOptions, DEFAULT_WORK_GROUP_SIZE};
pub use sorter::{RadixSorter, SortReport};

/// Sort `keys` on a fresh work-group parallel host backend.
pub fn sort_host<K: RadixKey>(keys: &mut [K]) -> Result<SortReport, SortError> {
    let backend = runtime::HostBackend::new();
    RadixSorter::new(&backend).sort(keys)
}

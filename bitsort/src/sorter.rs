use std::time::{Duration, Instant};

use bitsort_runtime::{
    ComputeBackend, DeviceBuffer, Histogram, Kernel, LaunchGrid, PartitionArgs, HISTOGRAM_BYTES,
};
use tracing::{debug, info, warn};

use crate::error::{SortError, Stage, TransferDirection};
use crate::key::{max_key, pass_count, RadixKey};
use crate::options::SortOptions;

/// What a successful sort did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortReport {
    pub len: usize,
    /// Largest key, zero-extended. Zero for an empty input.
    pub max_key: u64,
    pub passes: u32,
    pub work_group_size: usize,
    pub elapsed: Duration,
    /// One histogram per pass, filled only with
    /// [`SortOptions::verify_passes`].
    pub histograms: Vec<Histogram>,
}

impl SortReport {
    fn trivial(len: usize, max_key: u64, work_group_size: usize, start: Instant) -> Self {
        Self {
            len,
            max_key,
            passes: 0,
            work_group_size,
            elapsed: start.elapsed(),
            histograms: Vec::new(),
        }
    }
}

/// Host-side driver of the 1-bit LSD radix sort.
///
/// Borrows a backend for its lifetime; every [`sort`](Self::sort) call owns
/// its device buffers and releases them before returning, so one backend can
/// serve any number of sorts.
pub struct RadixSorter<'b, B: ComputeBackend + ?Sized> {
    backend: &'b B,
    options: SortOptions,
}

impl<'b, B: ComputeBackend + ?Sized> RadixSorter<'b, B> {
    pub fn new(backend: &'b B) -> Self {
        Self::with_options(backend, SortOptions::default())
    }

    pub fn with_options(backend: &'b B, options: SortOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &SortOptions {
        &self.options
    }

    pub fn backend(&self) -> &'b B {
        self.backend
    }

    /// Sort `keys` ascending in place.
    ///
    /// One partition launch per significant bit of the largest key, each
    /// followed by a blocking `finish`. Keys are staged through a host vector
    /// and copied back only once the final read succeeds, so on error `keys`
    /// is left exactly as it was.
    pub fn sort<K: RadixKey>(&self, keys: &mut [K]) -> Result<SortReport, SortError> {
        let start = Instant::now();
        let n = keys.len();
        let work_group_size = self.options.work_group_size;

        let info = self.backend.info();
        if work_group_size == 0 || work_group_size > info.max_work_group_size {
            return Err(SortError::InvalidWorkGroupSize {
                requested: work_group_size,
                max: info.max_work_group_size,
                backend: info.backend,
            });
        }

        let Some(max) = max_key(keys) else {
            return Ok(SortReport::trivial(0, 0, work_group_size, start));
        };
        let passes = pass_count(max);
        if passes == 0 {
            debug!(n, "all keys are zero, nothing to sort");
            return Ok(SortReport::trivial(n, 0, work_group_size, start));
        }

        let kernel = Kernel::RadixPartition(K::WIDTH);
        self.backend
            .build(kernel)
            .map_err(|e| SortError::at(Stage::Build(kernel.name()), e))?;

        let bytes = std::mem::size_of_val(keys);
        let alloc = |purpose: &'static str, bytes: usize| {
            DeviceBuffer::allocate(self.backend, bytes)
                .map_err(|e| SortError::at(Stage::Allocate { bytes, purpose }, e))
        };
        let mut input = alloc("keys", bytes)?;
        let mut output = alloc("scratch", bytes)?;
        let histogram = alloc("histogram", HISTOGRAM_BYTES)?;

        input.upload(keys).map_err(|e| {
            SortError::at(
                Stage::Transfer {
                    direction: TransferDirection::Upload,
                    bytes,
                },
                e,
            )
        })?;

        debug!(
            n,
            max = max.to_u64(),
            passes,
            work_group_size,
            device = %info.device_name,
            "starting radix sort"
        );

        let grid = LaunchGrid::linear(n, work_group_size);
        let mut histograms = Vec::new();
        for bit in 0..passes {
            self.check_interrupt(bit, passes)?;

            let args = PartitionArgs {
                input: input.id(),
                output: output.id(),
                histogram: histogram.id(),
                bit,
                count: n as u64,
            };
            let launch = self
                .backend
                .dispatch(kernel, &args.to_args(), grid)
                .map_err(|e| SortError::at(Stage::Pass(bit), e))?;
            self.backend
                .finish()
                .map_err(|e| SortError::at(Stage::Pass(bit), e))?;

            if self.options.verify_passes {
                let hist = read_histogram(&histogram)?;
                if hist.total() != n as u64 {
                    return Err(SortError::PassInvariant {
                        pass: bit,
                        zeros: hist.zeros,
                        ones: hist.ones,
                        expected: n as u64,
                    });
                }
                debug!(pass = bit, %launch, zeros = hist.zeros, ones = hist.ones, "pass complete");
                histograms.push(hist);
            } else {
                debug!(pass = bit, %launch, "pass complete");
            }

            std::mem::swap(&mut input, &mut output);
        }

        let mut staged = vec![K::zeroed(); n];
        input.download(&mut staged).map_err(|e| {
            SortError::at(
                Stage::Transfer {
                    direction: TransferDirection::Download,
                    bytes,
                },
                e,
            )
        })?;
        keys.copy_from_slice(&staged);

        let report = SortReport {
            len: n,
            max_key: max.to_u64(),
            passes,
            work_group_size,
            elapsed: start.elapsed(),
            histograms,
        };
        info!(
            n,
            passes,
            elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
            "radix sort complete"
        );
        Ok(report)
    }

    /// Sorted copy of `keys`.
    pub fn sorted<K: RadixKey>(&self, keys: &[K]) -> Result<Vec<K>, SortError> {
        let mut out = keys.to_vec();
        self.sort(&mut out)?;
        Ok(out)
    }

    fn check_interrupt(&self, completed_passes: u32, total_passes: u32) -> Result<(), SortError> {
        if let Some(token) = &self.options.cancel {
            if token.is_cancelled() {
                warn!(completed_passes, total_passes, "radix sort cancelled");
                return Err(SortError::Cancelled {
                    completed_passes,
                    total_passes,
                });
            }
        }
        if let Some(deadline) = self.options.deadline {
            if Instant::now() >= deadline {
                warn!(completed_passes, total_passes, "radix sort deadline exceeded");
                return Err(SortError::DeadlineExceeded {
                    completed_passes,
                    total_passes,
                });
            }
        }
        Ok(())
    }
}

fn read_histogram<B: ComputeBackend + ?Sized>(
    buffer: &DeviceBuffer<'_, B>,
) -> Result<Histogram, SortError> {
    let mut words = [0u64; 2];
    buffer.download(&mut words).map_err(|e| {
        SortError::at(
            Stage::Transfer {
                direction: TransferDirection::Download,
                bytes: HISTOGRAM_BYTES,
            },
            e,
        )
    })?;
    Ok(Histogram::from_words(words))
}

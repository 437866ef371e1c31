use bitsort_runtime::KeyWidth;
use bytemuck::Pod;

mod private {
    pub trait Sealed {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
}

/// Keys the radix sort accepts: fixed-width unsigned integers.
///
/// Sealed: only `u32` and `u64` implement it. Signed and floating point keys
/// would need an order-preserving bit transform first, which this crate does
/// not do.
pub trait RadixKey: private::Sealed + Pod + Ord + Send + Sync + std::fmt::Debug + 'static {
    /// Kernel variant that handles this key width.
    const WIDTH: KeyWidth;
    /// Number of bits in the key.
    const BITS: u32;

    /// Zero-extend to 64 bits.
    fn to_u64(self) -> u64;
}

impl RadixKey for u32 {
    const WIDTH: KeyWidth = KeyWidth::U32;
    const BITS: u32 = u32::BITS;

    fn to_u64(self) -> u64 {
        self as u64
    }
}

impl RadixKey for u64 {
    const WIDTH: KeyWidth = KeyWidth::U64;
    const BITS: u32 = u64::BITS;

    fn to_u64(self) -> u64 {
        self
    }
}

/// Largest key in `keys`, or `None` when empty.
pub fn max_key<K: RadixKey>(keys: &[K]) -> Option<K> {
    keys.iter().copied().max()
}

/// Number of 1-bit passes needed to sort keys no larger than `max`: the
/// position of the highest set bit plus one. Zero when `max` is zero.
pub fn pass_count<K: RadixKey>(max: K) -> u32 {
    u64::BITS - max.to_u64().leading_zeros()
}

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic key generator seeded for reproducible benchmarks.
pub struct DataGenerator {
    rng: StdRng,
}

impl DataGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate `count` keys uniformly distributed in `[0, below)`.
    ///
    /// # Panics
    /// Panics if `below` is zero.
    pub fn keys_below(&mut self, count: usize, below: u32) -> Vec<u32> {
        (0..count).map(|_| self.rng.gen_range(0..below)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = DataGenerator::new(42).keys_below(100, 1_000_000);
        let b = DataGenerator::new(42).keys_below(100, 1_000_000);
        assert_eq!(a, b);
    }

    #[test]
    fn test_keys_in_range() {
        let keys = DataGenerator::new(1).keys_below(10_000, 1_000);
        assert!(keys.iter().all(|&k| k < 1_000));
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = DataGenerator::new(1).keys_below(100, u32::MAX);
        let b = DataGenerator::new(2).keys_below(100, u32::MAX);
        assert_ne!(a, b);
    }
}

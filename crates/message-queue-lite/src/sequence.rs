//! Thread-safe generator for delivery tags.

use std::sync::atomic::{AtomicU64, Ordering};

/// Issues strictly increasing values starting after a seed.
///
/// Any number of threads may call [`SequenceGenerator::next_value`]
/// concurrently. For `N` calls on a generator seeded with `s` the values
/// returned are exactly `s + 1 ..= s + N`, each handed out once. Wraparound at
/// `u64::MAX` is not handled.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    current: AtomicU64,
}

impl SequenceGenerator {
    /// Create a generator whose first issued value is 1
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create a generator whose first issued value is `seed + 1`
    pub fn with_seed(seed: u64) -> Self {
        Self {
            current: AtomicU64::new(seed),
        }
    }

    /// Issue the next value
    pub fn next_value(&self) -> u64 {
        self.current.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Most recently issued value, or the seed if nothing was issued yet
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "sequence_tests.rs"]
mod tests;

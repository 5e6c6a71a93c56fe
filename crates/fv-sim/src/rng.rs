//! Seeded randomness for simulation scenarios.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Seeded generator for randomized scenario inputs.
///
/// Carries its seed so a failing assertion can name its own repro:
/// rebuild with the same seed and the scenario replays byte for byte.
#[derive(Debug)]
pub struct SimRng {
    inner: SmallRng,
    seed: u64,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: SmallRng::seed_from_u64(seed),
            seed,
        }
    }

    /// The seed this generator was built from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform value in `[0, max)`.
    pub fn next_range(&mut self, max: u64) -> u64 {
        debug_assert!(max > 0, "empty range");
        self.inner.gen_range(0..max)
    }

    /// Fills `buf` with random bytes.
    pub fn fill_bytes(&mut self, buf: &mut [u8]) {
        self.inner.fill(buf);
    }
}

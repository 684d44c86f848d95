//! Deterministic randomness.
//!
//! Every random choice in a run (load-balancer picks, kill victims,
//! backoff jitter, latency noise) draws from one seeded generator, so
//! two runs with the same inputs and seed replay identically.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Seeded random number generator for a simulation run.
pub struct SimRng {
    rng: StdRng,
    seed: u64,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// The seed this generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A uniform value in `[0, 1)`.
    pub fn f64(&mut self) -> f64 {
        self.rng.random()
    }

    /// A uniform index in `[0, len)`.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero.
    pub fn index(&mut self, len: usize) -> usize {
        assert!(len > 0, "cannot pick from an empty range");
        self.rng.random_range(0..len)
    }

    /// A sample from `N(mean, stddev)`, clamped to be non-negative so it
    /// can be used directly as a latency or delay.
    pub fn normal(&mut self, mean: f64, stddev: f64) -> f64 {
        if !stddev.is_finite() || stddev <= 0.0 {
            return mean.max(0.0);
        }
        let dist = Normal::new(mean, stddev).expect("stddev is finite and positive");
        dist.sample(&mut self.rng).max(0.0)
    }
}

impl std::fmt::Debug for SimRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRng").field("seed", &self.seed).finish()
    }
}

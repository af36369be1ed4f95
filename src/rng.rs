//! Seedable random source shared by simulators and lock pools.
//!
//! Nothing in the simulation calls a thread-local or global RNG. Every
//! component owns a [`SimRng`], either seeded explicitly for reproducible
//! runs or from OS entropy, and hands children their own derived stream
//! via [`SimRng::fork`].

use std::sync::Mutex;

use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// Thread-safe deterministic generator.
///
/// The inner lock is only held for a single draw and never across an await.
#[derive(Debug)]
pub struct SimRng {
    inner: Mutex<Pcg64Mcg>,
}

impl SimRng {
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Mutex::new(Pcg64Mcg::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            inner: Mutex::new(Pcg64Mcg::from_entropy()),
        }
    }

    /// Seeded when `seed` is set, entropy otherwise.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    /// Derive an independent generator from this one's stream.
    pub fn fork(&self) -> SimRng {
        SimRng::seeded(self.next_u64())
    }

    pub fn next_u64(&self) -> u64 {
        self.with(|r| r.next_u64())
    }

    /// Uniform draw in `[0, n)`. `n` must be non-zero.
    pub fn below(&self, n: usize) -> usize {
        assert!(n > 0, "n must be > 0");
        self.with(|r| r.gen_range(0..n))
    }

    /// Uniform draw in `[lo, hi]`.
    pub fn in_range(&self, lo: u64, hi: u64) -> u64 {
        assert!(lo <= hi, "empty range {lo}..={hi}");
        self.with(|r| r.gen_range(lo..=hi))
    }

    /// True with probability `percent / 100`. Values of 100 or more always hit.
    pub fn chance(&self, percent: u8) -> bool {
        if percent == 0 {
            return false;
        }
        self.with(|r| r.gen_range(0..100u8)) < percent
    }

    fn with<T>(&self, f: impl FnOnce(&mut Pcg64Mcg) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }
}

//! Deterministic random streams for batch generation.
//!
//! Every batch gets its own RNG seeded with `base_seed + batch_counter`, so a
//! batch can be regenerated byte-for-byte from the seed manifest and the state
//! counters alone. The generator (ChaCha8) is portable: the same seed yields
//! the same sequence on every platform and toolchain.
//!
//! # Invariants
//!
//! - Two `DeterministicRng`s built from the same `(seed, kind)` produce the same
//!   draw sequence.
//! - Company and driver-event streams never share a sequence, even when their
//!   batch counters (and therefore seeds) coincide.

use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::{Builder, Uuid};

/// Largest rate handed to a single Knuth draw. `exp(-lambda)` underflows for
/// large rates, so bigger rates are split into chunks and summed.
const POISSON_CHUNK: f64 = 30.0;

/// Which generator a stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Company,
    DriverEvent,
}

impl StreamKind {
    const fn stream_id(self) -> u64 {
        match self {
            Self::Company => 1,
            Self::DriverEvent => 2,
        }
    }
}

/// Per-batch sub-seed.
#[must_use]
pub const fn batch_seed(base_seed: u64, batch_counter: u64) -> u64 {
    base_seed.wrapping_add(batch_counter)
}

/// Seeded random source shared by record generation and quality injection.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    inner: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    #[must_use]
    pub fn new(seed: u64, kind: StreamKind) -> Self {
        let mut inner = ChaCha8Rng::seed_from_u64(seed);
        inner.set_stream(kind.stream_id());
        Self { inner, seed }
    }

    /// RNG for the `batch_counter`-th batch of a generator.
    #[must_use]
    pub fn for_batch(base_seed: u64, batch_counter: u64, kind: StreamKind) -> Self {
        Self::new(batch_seed(base_seed, batch_counter), kind)
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform float in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.inner.random::<f64>()
    }

    /// Bernoulli trial with success probability `p`.
    ///
    /// `p <= 0` never succeeds and `p >= 1` always does.
    pub fn chance(&mut self, p: f64) -> bool {
        self.unit() < p
    }

    /// Uniform integer in `[0, n)`. Returns 0 when `n == 0`.
    pub fn below(&mut self, n: u64) -> u64 {
        if n == 0 { 0 } else { self.inner.random_range(0..n) }
    }

    /// Uniform index into a slice of length `len`.
    pub fn index(&mut self, len: usize) -> usize {
        if len == 0 { 0 } else { self.inner.random_range(0..len) }
    }

    /// Uniformly pick one element, or `None` for an empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.index(items.len());
        items.get(index)
    }

    /// Weighted categorical draw.
    ///
    /// Entries with weight zero are never selected. Returns `None` when no
    /// entry has positive weight (or a weight is negative/NaN).
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let distribution = WeightedIndex::<f64>::new(weights).ok()?;
        Some(distribution.sample(&mut self.inner))
    }

    /// Draw from a Poisson distribution with mean `lambda`.
    ///
    /// Non-positive or non-finite rates yield 0.
    pub fn poisson(&mut self, lambda: f64) -> u64 {
        if lambda.is_nan() || lambda.is_infinite() || lambda <= 0.0 {
            return 0;
        }

        let mut remaining = lambda;
        let mut total = 0;
        while remaining > 0.0 {
            let step = remaining.min(POISSON_CHUNK);
            remaining -= step;
            total += self.knuth_poisson(step);
        }
        total
    }

    fn knuth_poisson(&mut self, lambda: f64) -> u64 {
        let limit = (-lambda).exp();
        let mut product = 1.0;
        let mut count = 0;
        loop {
            product *= self.unit();
            if product <= limit {
                return count;
            }
            count += 1;
        }
    }

    /// Version-4 UUID built from stream bytes.
    pub fn uuid(&mut self) -> Uuid {
        let bytes: [u8; 16] = self.inner.random();
        Builder::from_random_bytes(bytes).into_uuid()
    }
}

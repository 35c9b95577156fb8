//! Seeded random streams shared by every stochastic system.
//!
//! Sessions derive all randomness from a single [`Seed`]. The seed is reduced
//! to a 32-bit state with FNV-1a and expanded by a Mulberry32 generator, which
//! keeps research sessions reproducible across platforms and across any
//! reimplementation that uses the same two public algorithms. Independent
//! subsystems draw from forked children so their streams never interleave.

use rand::{Error as RandError, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;
const MULBERRY_INCREMENT: u32 = 0x6d2b_79f5;
const UNIT_SCALE: f32 = 1.0 / (1u32 << 24) as f32;

/// Opaque seed accepted at session construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Seed {
    /// Numeric seed used verbatim as the generator state.
    Numeric(u32),
    /// Text seed reduced to a generator state with FNV-1a over its UTF-8 bytes.
    Text(String),
}

impl Seed {
    /// Draws a seed from operating system entropy.
    ///
    /// Only play sessions without an explicit seed use this; research sessions
    /// must always be constructed from a known seed.
    #[must_use]
    pub fn fresh() -> Self {
        let mut entropy = ChaCha8Rng::from_entropy();
        Self::Numeric(entropy.next_u32())
    }

    /// 32-bit generator state derived from the seed.
    #[must_use]
    pub fn state(&self) -> u32 {
        match self {
            Self::Numeric(value) => *value,
            Self::Text(text) => fnv1a(text.as_bytes()),
        }
    }
}

impl From<u32> for Seed {
    fn from(value: u32) -> Self {
        Self::Numeric(value)
    }
}

impl From<&str> for Seed {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Seed {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Computes the 32-bit FNV-1a hash of the provided bytes.
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Mulberry32 generator producing a reproducible stream of unit floats.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeterministicRng {
    origin: u32,
    state: u32,
}

impl DeterministicRng {
    /// Creates a generator seeded from the provided session seed.
    #[must_use]
    pub fn new(seed: &Seed) -> Self {
        Self::from_state(seed.state())
    }

    /// Creates a generator from a raw 32-bit state.
    #[must_use]
    pub const fn from_state(state: u32) -> Self {
        Self {
            origin: state,
            state,
        }
    }

    /// State the generator was created with, independent of how far it advanced.
    #[must_use]
    pub const fn origin(&self) -> u32 {
        self.origin
    }

    /// Advances the generator and returns the next raw 32-bit output.
    pub fn next_word(&mut self) -> u32 {
        self.state = self.state.wrapping_add(MULBERRY_INCREMENT);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    /// Returns the next value in `[0, 1)`.
    ///
    /// Uses the upper 24 bits of the raw output so the result is exact in
    /// `f32` and never rounds up to `1.0`.
    pub fn next_unit(&mut self) -> f32 {
        (self.next_word() >> 8) as f32 * UNIT_SCALE
    }

    /// Returns a value in `[min, max)`; a reversed range is swapped.
    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        low + (high - low) * self.next_unit()
    }

    /// Returns `true` with the provided probability.
    pub fn chance(&mut self, probability: f32) -> bool {
        self.next_unit() < probability
    }

    /// Returns an index in `0..len`, or zero when `len` is zero.
    pub fn index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let scaled = (self.next_unit() * len as f32) as usize;
        scaled.min(len - 1)
    }

    /// Derives an independent child stream labelled for a single subsystem.
    ///
    /// The child depends only on the origin state and the label, so forking
    /// is unaffected by how many values the parent has already produced.
    #[must_use]
    pub fn fork(&self, label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(self.origin.to_le_bytes());
        hasher.update(label.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&digest[..4]);
        Self::from_state(u32::from_le_bytes(bytes))
    }
}

impl RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        self.next_word()
    }

    fn next_u64(&mut self) -> u64 {
        let high = u64::from(self.next_word());
        let low = u64::from(self.next_word());
        (high << 32) | low
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_word().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), RandError> {
        self.fill_bytes(dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a(b""), 0x811c_9dc5);
        assert_eq!(fnv1a(b"a"), 0xe40c_292c);
    }

    #[test]
    fn identical_seeds_replay_identical_streams() {
        let mut first = DeterministicRng::new(&Seed::from("abc"));
        let mut second = DeterministicRng::new(&Seed::from("abc"));
        for _ in 0..256 {
            assert_eq!(first.next_word(), second.next_word());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut first = DeterministicRng::new(&Seed::from("abc"));
        let mut second = DeterministicRng::new(&Seed::from("abd"));
        let a: Vec<u32> = (0..8).map(|_| first.next_word()).collect();
        let b: Vec<u32> = (0..8).map(|_| second.next_word()).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn unit_values_stay_in_half_open_interval() {
        let mut rng = DeterministicRng::from_state(u32::MAX);
        for _ in 0..10_000 {
            let value = rng.next_unit();
            assert!((0.0..1.0).contains(&value), "value {value} escaped [0, 1)");
        }
    }

    #[test]
    fn fork_ignores_parent_progress() {
        let parent = DeterministicRng::new(&Seed::from(7u32));
        let mut advanced = parent.clone();
        for _ in 0..50 {
            let _ = advanced.next_word();
        }

        let mut from_fresh = parent.fork("placement");
        let mut from_advanced = advanced.fork("placement");
        assert_eq!(from_fresh.next_word(), from_advanced.next_word());
    }

    #[test]
    fn forks_with_different_labels_are_independent() {
        let parent = DeterministicRng::new(&Seed::from("session"));
        let mut selector = parent.fork("selector");
        let mut placement = parent.fork("placement");
        let a: Vec<u32> = (0..4).map(|_| selector.next_word()).collect();
        let b: Vec<u32> = (0..4).map(|_| placement.next_word()).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn index_handles_empty_and_bounds() {
        let mut rng = DeterministicRng::from_state(99);
        assert_eq!(rng.index(0), 0);
        for _ in 0..1_000 {
            assert!(rng.index(3) < 3);
        }
    }

    #[test]
    fn numeric_seed_is_used_verbatim() {
        assert_eq!(Seed::from(1234u32).state(), 1234);
        assert_eq!(Seed::from("abc").state(), fnv1a(b"abc"));
    }
}

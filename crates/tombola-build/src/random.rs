use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::{ChaCha8Rng, ChaCha12Rng, ChaCha20Rng};
use sha2::{Digest, Sha256};
use tombola_core::SeedMode;

use crate::errors::BuildError;

/// Purpose label of the single run-wide stream.
pub const RUN_STREAM: &str = "run";
/// Purpose label of per-card worker streams.
pub const CARD_STREAM: &str = "card";

/// Turns a run seed into the seed of one concrete stream.
///
/// New seed modes plug in here without touching the constructor or repair code.
pub trait SeedDerivation: Send + Sync {
    fn id(&self) -> &'static str;
    fn derive(&self, seed: u64, purpose: &str, index: u64) -> u64;
}

/// Uses the seed value as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectSeed;

impl SeedDerivation for DirectSeed {
    fn id(&self) -> &'static str {
        "direct"
    }

    fn derive(&self, seed: u64, _purpose: &str, _index: u64) -> u64 {
        seed
    }
}

/// SHA-256 of `"{seed}|{index}|{purpose}"`, first 8 bytes big-endian, masked to 63 bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashedSeed;

impl SeedDerivation for HashedSeed {
    fn id(&self) -> &'static str {
        "hashed"
    }

    fn derive(&self, seed: u64, purpose: &str, index: u64) -> u64 {
        let digest = Sha256::digest(format!("{seed}|{index}|{purpose}").as_bytes());
        let mut bytes = [0_u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes) & ((1_u64 << 63) - 1)
    }
}

pub fn derivation_for(mode: SeedMode) -> &'static dyn SeedDerivation {
    match mode {
        SeedMode::Direct => &DirectSeed,
        SeedMode::Hashed => &HashedSeed,
    }
}

enum EngineState {
    ChaCha8(ChaCha8Rng),
    ChaCha12(ChaCha12Rng),
    ChaCha20(ChaCha20Rng),
}

/// Deterministic seeded stream: identical `(seed, engine)` always yields the
/// identical sequence.
pub struct RandomSource {
    engine: &'static str,
    state: EngineState,
}

impl RandomSource {
    pub fn new(seed: u64, engine_id: &str) -> Result<Self, BuildError> {
        let (engine, state) = match engine_id {
            "chacha8" => ("chacha8", EngineState::ChaCha8(ChaCha8Rng::seed_from_u64(seed))),
            "chacha12" => (
                "chacha12",
                EngineState::ChaCha12(ChaCha12Rng::seed_from_u64(seed)),
            ),
            "chacha20" => (
                "chacha20",
                EngineState::ChaCha20(ChaCha20Rng::seed_from_u64(seed)),
            ),
            other => return Err(BuildError::UnknownEngine(other.to_string())),
        };
        Ok(Self { engine, state })
    }

    pub fn derived(
        derivation: &dyn SeedDerivation,
        seed: u64,
        purpose: &str,
        index: u64,
        engine_id: &str,
    ) -> Result<Self, BuildError> {
        Self::new(derivation.derive(seed, purpose, index), engine_id)
    }

    pub fn engine(&self) -> &'static str {
        self.engine
    }

    /// Uniform draw from `[lo, hi)`. `hi` must be greater than `lo`.
    pub fn next_uniform_in(&mut self, lo: usize, hi: usize) -> usize {
        self.random_range(lo..hi)
    }

    pub fn coin(&mut self) -> bool {
        self.next_u32() & 1 == 1
    }

    /// Index drawn with probability proportional to its weight; `None` when all weights are zero.
    pub fn pick_weighted(&mut self, weights: &[u64]) -> Option<usize> {
        let total: u64 = weights.iter().sum();
        if total == 0 {
            return None;
        }
        let mut target = self.random_range(0..total);
        for (index, weight) in weights.iter().enumerate() {
            if target < *weight {
                return Some(index);
            }
            target -= weight;
        }
        None
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(self);
    }
}

impl RngCore for RandomSource {
    fn next_u32(&mut self) -> u32 {
        match &mut self.state {
            EngineState::ChaCha8(rng) => rng.next_u32(),
            EngineState::ChaCha12(rng) => rng.next_u32(),
            EngineState::ChaCha20(rng) => rng.next_u32(),
        }
    }

    fn next_u64(&mut self) -> u64 {
        match &mut self.state {
            EngineState::ChaCha8(rng) => rng.next_u64(),
            EngineState::ChaCha12(rng) => rng.next_u64(),
            EngineState::ChaCha20(rng) => rng.next_u64(),
        }
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        match &mut self.state {
            EngineState::ChaCha8(rng) => rng.fill_bytes(dst),
            EngineState::ChaCha12(rng) => rng.fill_bytes(dst),
            EngineState::ChaCha20(rng) => rng.fill_bytes(dst),
        }
    }
}

//! Seeded draws from proptest strategies
//!
//! Values are taken from a fresh value tree and never simplified: a shrink
//! step would be one more request against the live API.

use proptest::strategy::{Strategy, ValueTree};
use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Golden-ratio increment used to spread one `u64` over the 32-byte seed.
const SEED_SPREAD: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, thiserror::Error)]
#[error("value generation rejected every candidate: {0}")]
pub struct DrawError(pub String);

/// Deterministic sample source; equal seeds give equal draw sequences.
pub struct Sampler {
    /// Only a source of per-draw RNGs, never drawn from directly
    runner: TestRunner,
    seed: u64,
}

impl Sampler {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let mut bytes = [0u8; 32];
        for (i, chunk) in bytes.chunks_exact_mut(8).enumerate() {
            let word = seed ^ (i as u64 + 1).wrapping_mul(SEED_SPREAD);
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &bytes);
        Self {
            runner: TestRunner::new_with_rng(Config::default(), rng),
            seed,
        }
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// # Errors
    ///
    /// Returns [`DrawError`] when the strategy's filters reject too many
    /// candidates for this one draw.
    pub fn draw<S: Strategy>(&mut self, strategy: &S) -> Result<S::Value, DrawError> {
        // proptest charges filter rejects to the runner, so each draw gets its own budget
        let mut runner = TestRunner::new_with_rng(Config::default(), self.runner.new_rng());
        strategy
            .new_tree(&mut runner)
            .map(|tree| tree.current())
            .map_err(|reason| DrawError(reason.to_string()))
    }
}

/// Fresh run seed from OS entropy.
#[must_use]
pub fn entropy_seed() -> u64 {
    SmallRng::from_entropy().r#gen()
}

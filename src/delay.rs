/// Randomized message delay.
///
/// Every simulated message is delayed by an independent draw from a
/// uniform distribution over `[0, max_delay]`. Draws come from a seeded
/// ChaCha stream so that a given seed always yields the same sequence.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded source of message delays.
#[derive(Debug, Clone)]
pub struct DelayModel {
    max_delay: u64,
    rng: ChaCha8Rng,
    draws: u64,
}

impl DelayModel {
    /// Delays uniform over `[0, max_delay]`, seeded with `seed`.
    pub fn new(max_delay: u64, seed: u64) -> Self {
        DelayModel {
            max_delay,
            rng: ChaCha8Rng::seed_from_u64(seed),
            draws: 0,
        }
    }

    /// A model that always returns zero.
    pub fn instant() -> Self {
        Self::new(0, 0)
    }

    /// Draw the next delay in ticks.
    pub fn delay(&mut self) -> u64 {
        self.draws += 1;
        if self.max_delay == 0 {
            return 0;
        }
        self.rng.gen_range(0..=self.max_delay)
    }

    /// Inclusive upper bound on any delay.
    pub fn max_delay(&self) -> u64 {
        self.max_delay
    }

    /// Number of delays drawn so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }
}

//! Shared source of randomness for topic, unit and excerpt picks.
//!
//! Every random decision in the quiz goes through [`Dice`], so a seeded
//! instance makes a whole session reproducible.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Thread-safe uniform random picker.
#[derive(Debug)]
pub struct Dice {
    rng: Mutex<StdRng>,
}

impl Dice {
    /// Creates a `Dice` seeded from operating system entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Creates a deterministic `Dice` from a fixed seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Creates a `Dice` from an optional seed, falling back to entropy.
    #[must_use]
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    /// Picks one element uniformly; `None` when `items` is empty.
    pub fn pick<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        items.choose(&mut *rng)
    }

    /// Returns `true` with probability `p` (clamped to `[0, 1]`).
    pub fn chance(&self, p: f64) -> bool {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Returns `-1` or `1` with equal probability.
    pub fn sign(&self) -> i64 {
        if self.chance(0.5) {
            1
        } else {
            -1
        }
    }
}

impl Default for Dice {
    fn default() -> Self {
        Self::from_entropy()
    }
}

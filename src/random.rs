//! Seeded uniform random number generation, on top of the "rand" crate

use crate::numeric::Float;
use rand::{Rng, SeedableRng};

// Select random number generation engine in use
#[cfg(feature = "f32")]
type Engine = rand_xoshiro::Xoshiro128Plus;
#[cfg(not(feature = "f32"))]
type Engine = rand_xoshiro::Xoshiro256Plus;

/// Reproducible source of uniform random numbers
///
/// The state is cheap to clone, which the scheduler uses to hand each batch
/// of events a generator that starts exactly where a sequential run would be
/// when reaching the batch's first event.
///
#[derive(Clone)]
pub struct RandomGenerator {
    rng: Engine,
}
//
impl RandomGenerator {
    /// Spawn a new random number generator from a run seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Engine::seed_from_u64(seed),
        }
    }

    /// Generate a random floating-point number in [0, 1)
    pub fn random(&mut self) -> Float {
        self.rng.gen()
    }

    /// Advance state as if random() had been called "iterations" times
    pub fn skip(&mut self, iterations: usize) {
        for _ in 0..iterations {
            self.random();
        }
    }
}

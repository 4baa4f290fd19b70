//! Deterministic RNG utilities for reproducible tests.

use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Create a deterministic `ChaCha8Rng` from a seed.
///
/// All test randomization should go through this to ensure reproducibility.
#[must_use]
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// `count` points drawn uniformly from the ball of `radius` around `center`.
#[must_use]
pub fn random_points(seed: u64, count: usize, center: Vector3<f32>, radius: f32) -> Vec<Vector3<f32>> {
    let mut rng = seeded_rng(seed);
    let mut points = Vec::with_capacity(count);
    while points.len() < count {
        let v = Vector3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        if v.norm_squared() <= 1.0 {
            points.push(center + v * radius);
        }
    }
    points
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

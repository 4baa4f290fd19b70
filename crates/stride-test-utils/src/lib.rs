//! Shared test fixtures and utilities for Stride crates.
//!
//! Provides a T-pose humanoid builder with optional-bone variants, mock
//! environment probes and deterministic RNG setup.

pub mod humanoid;
pub mod probes;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use humanoid::{HumanoidBuilder, humanoid};
pub use probes::{AlwaysBlocked, FloorProbe, NeverBlocked, WallProbe};
pub use rng::{random_points, seeded_rng};

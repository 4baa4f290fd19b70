//! Soft warnings raised while solving.
//!
//! The solver never panics or fails on a per-frame basis. Conflicting input is
//! corrected and reported to a caller-supplied [`DiagnosticsSink`], once per
//! [`WarningSite`] per solver instance.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::types::{BoneSlot, Side};

/// A non-fatal condition the solver corrected on its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolverWarning {
    /// A pelvis target is weighted while feet are planted; feet planting is
    /// ignored for the pelvis pass.
    PelvisTargetWithPlantFeet,
    /// No palm-to-thumb axis was configured and it was inferred from the rig.
    GuessedPalmToThumbAxis(Side),
    /// `solve` received a negative delta time; zero was used.
    NegativeDeltaTime(f32),
    /// A target for this effector contained NaN or infinity and was ignored.
    NonFiniteTarget(BoneSlot),
    /// A bone present at initiation is missing from the solved skeleton.
    BoneRemoved(BoneSlot),
    /// `solve` was called before a successful `initiate`.
    NotReady,
}

/// Deduplication key: one report per site per solver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningSite {
    PelvisTargetWithPlantFeet,
    GuessedPalmToThumbAxis(Side),
    NegativeDeltaTime,
    NonFiniteTarget(BoneSlot),
    BoneRemoved(BoneSlot),
    NotReady,
}

impl SolverWarning {
    #[must_use]
    pub const fn site(&self) -> WarningSite {
        match self {
            Self::PelvisTargetWithPlantFeet => WarningSite::PelvisTargetWithPlantFeet,
            Self::GuessedPalmToThumbAxis(side) => WarningSite::GuessedPalmToThumbAxis(*side),
            Self::NegativeDeltaTime(_) => WarningSite::NegativeDeltaTime,
            Self::NonFiniteTarget(slot) => WarningSite::NonFiniteTarget(*slot),
            Self::BoneRemoved(slot) => WarningSite::BoneRemoved(*slot),
            Self::NotReady => WarningSite::NotReady,
        }
    }
}

impl fmt::Display for SolverWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PelvisTargetWithPlantFeet => {
                f.write_str("pelvis target is weighted while plant_feet is enabled")
            }
            Self::GuessedPalmToThumbAxis(side) => {
                write!(f, "palm-to-thumb axis for {side} hand was guessed from the rig")
            }
            Self::NegativeDeltaTime(dt) => write!(f, "negative delta time {dt}, using 0"),
            Self::NonFiniteTarget(slot) => write!(f, "non-finite target for {slot} ignored"),
            Self::BoneRemoved(slot) => write!(f, "bone {slot} was removed after initiation"),
            Self::NotReady => f.write_str("solve called before a successful initiate"),
        }
    }
}

// ---------------------------------------------------------------------------
// DiagnosticsSink
// ---------------------------------------------------------------------------

/// Receiver for solver warnings.
pub trait DiagnosticsSink: Send {
    fn report(&mut self, warning: SolverWarning);
}

/// Default sink: forwards every warning to `tracing::warn!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&mut self, warning: SolverWarning) {
        warn!(site = ?warning.site(), "{warning}");
    }
}

/// Stores warnings in a shared buffer. Clones share the buffer, so a test can
/// hand one clone to the solver and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    warnings: Arc<Mutex<Vec<SolverWarning>>>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the warnings received so far.
    #[must_use]
    pub fn warnings(&self) -> Vec<SolverWarning> {
        self.warnings
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.warnings.lock().map(|w| w.len()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticsSink for CollectingSink {
    fn report(&mut self, warning: SolverWarning) {
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(warning);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

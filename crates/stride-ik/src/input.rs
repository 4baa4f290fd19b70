//! Per-frame solver input.

use nalgebra::Vector3;

use stride_core::types::{BoneSlot, Side, Target};

/// Weighted world position a joint is pulled toward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Goal {
    pub position: Vector3<f32>,
    /// Weight in [0, 1].
    pub weight: f32,
}

impl Goal {
    #[must_use]
    pub const fn new(position: Vector3<f32>, weight: f32) -> Self {
        Self { position, weight }
    }

    /// The goal when it is finite and weighted, otherwise `None`.
    #[must_use]
    pub fn active(goal: Option<&Self>) -> Option<&Self> {
        goal.filter(|g| g.weight > 0.0 && g.weight.is_finite() && g.position.iter().all(|c| c.is_finite()))
    }
}

/// Elbow or knee direction controls for one limb.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LimbGoals {
    /// Point the joint bows toward.
    pub bend_goal: Option<Goal>,
    /// Extra rotation of the bend plane about the limb, in degrees.
    pub swivel_offset: f32,
}

/// Everything the caller supplies for one solve.
///
/// Absent targets count as weight 0.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveInput {
    pub head: Option<Target>,
    pub pelvis: Option<Target>,
    /// Indexed by [`Side::index`].
    pub hands: [Option<Target>; 2],
    /// Indexed by [`Side::index`]. Drives the last bone of each leg.
    pub feet: [Option<Target>; 2],
    /// Master blend between the read pose (0) and the solved pose (1).
    pub weight: f32,
    pub arms: [LimbGoals; 2],
    pub legs: [LimbGoals; 2],
    /// Point the chest turns its forward axis toward.
    pub chest_goal: Option<Goal>,
    /// Procedural stepping weight in [0, 1].
    pub locomotion_weight: f32,
}

impl Default for SolveInput {
    fn default() -> Self {
        Self {
            head: None,
            pelvis: None,
            hands: [None; 2],
            feet: [None; 2],
            weight: 1.0,
            arms: [LimbGoals::default(); 2],
            legs: [LimbGoals::default(); 2],
            chest_goal: None,
            locomotion_weight: 1.0,
        }
    }
}

impl SolveInput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_head(mut self, target: Target) -> Self {
        self.head = Some(target);
        self
    }

    #[must_use]
    pub const fn with_pelvis(mut self, target: Target) -> Self {
        self.pelvis = Some(target);
        self
    }

    #[must_use]
    pub const fn with_hand(mut self, side: Side, target: Target) -> Self {
        self.hands[side.index()] = Some(target);
        self
    }

    #[must_use]
    pub const fn with_foot(mut self, side: Side, target: Target) -> Self {
        self.feet[side.index()] = Some(target);
        self
    }

    #[must_use]
    pub const fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub const fn with_locomotion_weight(mut self, weight: f32) -> Self {
        self.locomotion_weight = weight;
        self
    }

    /// Every target paired with the effector slot it drives.
    pub(crate) fn targets(&self) -> [(BoneSlot, Option<&Target>); 6] {
        [
            (BoneSlot::Head, self.head.as_ref()),
            (BoneSlot::Pelvis, self.pelvis.as_ref()),
            (BoneSlot::LeftHand, self.hands[0].as_ref()),
            (BoneSlot::RightHand, self.hands[1].as_ref()),
            (BoneSlot::LeftFoot, self.feet[0].as_ref()),
            (BoneSlot::RightFoot, self.feet[1].as_ref()),
        ]
    }
}

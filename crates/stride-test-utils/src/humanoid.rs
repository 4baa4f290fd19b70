//! T-pose humanoid skeletons.
//!
//! Z up, X forward, Y left. Elbows bend slightly back and knees slightly
//! forward so every two-bone chain has a defined bend plane.

use nalgebra::Vector3;
use stride_core::types::{BonePose, BoneSlot, Side, Skeleton};

/// Full humanoid standing at the origin.
#[must_use]
pub fn humanoid() -> Skeleton {
    HumanoidBuilder::new().build()
}

/// Builder for humanoid variants with optional bones left out.
#[derive(Debug, Clone)]
pub struct HumanoidBuilder {
    chest: bool,
    neck: bool,
    shoulders: bool,
    toes: bool,
    origin: Vector3<f32>,
}

impl Default for HumanoidBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanoidBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            chest: true,
            neck: true,
            shoulders: true,
            toes: true,
            origin: Vector3::zeros(),
        }
    }

    #[must_use]
    pub const fn without_chest(mut self) -> Self {
        self.chest = false;
        self
    }

    #[must_use]
    pub const fn without_neck(mut self) -> Self {
        self.neck = false;
        self
    }

    #[must_use]
    pub const fn without_shoulders(mut self) -> Self {
        self.shoulders = false;
        self
    }

    #[must_use]
    pub const fn without_toes(mut self) -> Self {
        self.toes = false;
        self
    }

    /// Stand the humanoid at `origin` instead of the world origin.
    #[must_use]
    pub const fn at(mut self, origin: Vector3<f32>) -> Self {
        self.origin = origin;
        self
    }

    #[must_use]
    pub fn build(&self) -> Skeleton {
        let o = self.origin;
        let at = |x: f32, y: f32, z: f32| BonePose::at(o + Vector3::new(x, y, z));

        let mut skel = Skeleton::new()
            .with(BoneSlot::Root, at(0.0, 0.0, 0.0))
            .with(BoneSlot::Pelvis, at(0.0, 0.0, 1.0))
            .with(BoneSlot::Spine, at(0.01, 0.0, 1.15))
            .with(BoneSlot::Head, at(0.0, 0.0, 1.65));
        if self.chest {
            skel.set(BoneSlot::Chest, at(0.02, 0.0, 1.35));
        }
        if self.neck {
            skel.set(BoneSlot::Neck, at(0.01, 0.0, 1.52));
        }

        for side in [Side::Left, Side::Right] {
            let s = side.sign();
            if self.shoulders {
                skel.set(BoneSlot::shoulder(side), at(0.0, 0.05 * s, 1.45));
            }
            skel.set(BoneSlot::upper_arm(side), at(0.0, 0.2 * s, 1.45));
            skel.set(BoneSlot::forearm(side), at(-0.02, 0.48 * s, 1.45));
            skel.set(BoneSlot::hand(side), at(0.0, 0.75 * s, 1.45));

            skel.set(BoneSlot::thigh(side), at(0.0, 0.1 * s, 0.95));
            skel.set(BoneSlot::calf(side), at(0.08, 0.1 * s, 0.5));
            skel.set(BoneSlot::foot(side), at(0.0, 0.1 * s, 0.08));
            if self.toes {
                skel.set(BoneSlot::toes(side), at(0.15, 0.1 * s, 0.0));
            }
        }
        skel
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_humanoid_fills_every_slot() {
        let skel = humanoid();
        assert!(BoneSlot::ALL.iter().all(|slot| skel.contains(*slot)));
    }

    #[test]
    fn minimal_humanoid_omits_optional_slots() {
        let skel = HumanoidBuilder::new()
            .without_chest()
            .without_neck()
            .without_shoulders()
            .without_toes()
            .build();
        for slot in BoneSlot::ALL {
            assert_eq!(skel.contains(slot), !slot.is_optional(), "{slot}");
        }
    }

    #[test]
    fn sides_are_mirrored() {
        let skel = humanoid();
        let l = skel.get(BoneSlot::LeftHand).unwrap().position;
        let r = skel.get(BoneSlot::RightHand).unwrap().position;
        assert!((l.y + r.y).abs() < f32::EPSILON);
        assert!(l.y > 0.0);
    }

    #[test]
    fn origin_shifts_every_bone() {
        let skel = HumanoidBuilder::new().at(Vector3::new(1.0, 2.0, 0.0)).build();
        let pelvis = skel.get(BoneSlot::Pelvis).unwrap().position;
        assert!((pelvis - Vector3::new(1.0, 2.0, 1.0)).norm() < 1e-6);
    }
}

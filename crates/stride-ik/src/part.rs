//! The per-limb pipeline shared by spine, arms and legs.
//!
//! Each frame the orchestrator drives every part through
//! `read → presolve → apply_offsets → solve → reset_offsets → write`. Parts own
//! their [`VirtualBone`] array and a slot table mapping each bone back to the
//! skeleton; the solve step takes a part-specific context carrying read-only
//! snapshots of the other parts.

use nalgebra::{UnitQuaternion, Vector3};

use stride_core::types::{BonePose, BoneSlot, Skeleton};

use crate::bone::{self, VirtualBone};
use crate::math::{lerp_rotation, lerp_vec};

/// One limb group of the humanoid.
pub trait BodyPart {
    /// Per-solve inputs from the orchestrator and sibling parts.
    type Context<'a>
    where
        Self: 'a;

    fn bones(&self) -> &[VirtualBone];

    fn bones_mut(&mut self) -> &mut [VirtualBone];

    /// Skeleton slot for each bone, in chain order.
    fn slots(&self) -> &[BoneSlot];

    /// Pose of the frame this part hangs from (root, pelvis or chest).
    fn root(&self) -> &BonePose;

    fn root_mut(&mut self) -> &mut BonePose;

    /// Capture per-frame relations after the bones were read.
    fn on_read(&mut self) {}

    /// Cache lengths and resolve targets. Returns the chain length.
    fn presolve(&mut self) -> f32 {
        bone::presolve(self.bones_mut())
    }

    /// Fold accumulated offsets into the working targets.
    fn apply_offsets(&mut self);

    fn solve(&mut self, ctx: Self::Context<'_>);

    /// Clear offsets consumed by this solve.
    fn reset_offsets(&mut self);

    /// Read world poses for this part's slots. Missing slots keep their
    /// previous pose.
    fn read(&mut self, skeleton: &Skeleton, root: &BonePose) {
        *self.root_mut() = *root;
        let slots: Vec<BoneSlot> = self.slots().to_vec();
        for (bone, slot) in self.bones_mut().iter_mut().zip(slots) {
            if let Some(pose) = skeleton.get(slot) {
                bone.read(pose);
            }
        }
        self.on_read();
    }

    /// Write solver poses back, blended against the read pose by `weight`.
    fn write(&self, skeleton: &mut Skeleton, weight: f32) {
        for (bone, slot) in self.bones().iter().zip(self.slots()) {
            if let Some(pose) = skeleton.get_mut(*slot) {
                *pose = blend_pose(bone, weight);
            }
        }
    }

    /// Carry the part along with its parent frame.
    fn translate_root(&mut self, position: &Vector3<f32>, rotation: &UnitQuaternion<f32>) {
        let root = *self.root();
        let delta_position = position - root.position;
        let delta_rotation = rotation * root.rotation.inverse();
        *self.root_mut() = BonePose::new(*position, *rotation);
        let bones = self.bones_mut();
        for bone in bones.iter_mut() {
            bone.solver_position += delta_position;
        }
        bone::rotate_around_point(bones, 0, position, &delta_rotation);
    }

    /// Move the whole chain so its first bone lands at `position`.
    fn move_position(&mut self, position: &Vector3<f32>) {
        let bones = self.bones_mut();
        let Some(first) = bones.first() else {
            return;
        };
        let delta = position - first.solver_position;
        for bone in bones.iter_mut() {
            bone.solver_position += delta;
        }
    }
}

/// Read pose blended toward the solver pose.
#[must_use]
pub fn blend_pose(bone: &VirtualBone, weight: f32) -> BonePose {
    if weight >= 1.0 {
        return bone.solver_pose();
    }
    BonePose::new(
        lerp_vec(&bone.read_position, &bone.solver_position, weight),
        lerp_rotation(&bone.read_rotation, &bone.solver_rotation, weight),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::math::angle_axis;

    struct Stick {
        bones: Vec<VirtualBone>,
        slots: Vec<BoneSlot>,
        root: BonePose,
        offset: Vector3<f32>,
    }

    impl Stick {
        fn new() -> Self {
            Self {
                bones: vec![VirtualBone::new(&BonePose::identity()); 2],
                slots: vec![BoneSlot::LeftThigh, BoneSlot::LeftCalf],
                root: BonePose::identity(),
                offset: Vector3::zeros(),
            }
        }
    }

    impl BodyPart for Stick {
        type Context<'a> = f32;

        fn bones(&self) -> &[VirtualBone] {
            &self.bones
        }
        fn bones_mut(&mut self) -> &mut [VirtualBone] {
            &mut self.bones
        }
        fn slots(&self) -> &[BoneSlot] {
            &self.slots
        }
        fn root(&self) -> &BonePose {
            &self.root
        }
        fn root_mut(&mut self) -> &mut BonePose {
            &mut self.root
        }
        fn apply_offsets(&mut self) {
            let offset = self.offset;
            self.bones[1].solver_position += offset;
        }
        fn solve(&mut self, ctx: f32) {
            let q = angle_axis(ctx, &Vector3::z());
            crate::bone::rotate_by(&mut self.bones, 0, &q);
        }
        fn reset_offsets(&mut self) {
            self.offset = Vector3::zeros();
        }
    }

    fn skeleton() -> Skeleton {
        Skeleton::new()
            .with(BoneSlot::LeftThigh, BonePose::at(Vector3::new(0.0, 0.1, 1.0)))
            .with(BoneSlot::LeftCalf, BonePose::at(Vector3::new(0.0, 0.1, 0.5)))
    }

    #[test]
    fn read_presolve_and_write_round_trip() {
        let mut part = Stick::new();
        let mut skel = skeleton();
        part.read(&skel, &BonePose::identity());
        assert_relative_eq!(part.presolve(), 0.5, epsilon = 1e-6);
        part.apply_offsets();
        part.solve(0.0);
        part.reset_offsets();
        part.write(&mut skel, 1.0);
        assert_eq!(skel, skeleton());
    }

    #[test]
    fn write_blends_by_weight() {
        let mut part = Stick::new();
        let mut skel = skeleton();
        part.read(&skel, &BonePose::identity());
        part.move_position(&Vector3::new(1.0, 0.1, 1.0));
        part.write(&mut skel, 0.5);
        let thigh = skel.get(BoneSlot::LeftThigh).unwrap();
        assert_relative_eq!(thigh.position, Vector3::new(0.5, 0.1, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn write_zero_weight_restores_read_pose() {
        let mut part = Stick::new();
        let mut skel = skeleton();
        part.read(&skel, &BonePose::identity());
        part.solve(1.0);
        part.write(&mut skel, 0.0);
        assert_eq!(skel, skeleton());
    }

    #[test]
    fn translate_root_carries_chain_rigidly() {
        let mut part = Stick::new();
        part.read(&skeleton(), &BonePose::at(Vector3::new(0.0, 0.0, 1.0)));
        part.presolve();
        let q = angle_axis(std::f32::consts::FRAC_PI_2, &Vector3::z());
        part.translate_root(&Vector3::new(1.0, 0.0, 1.0), &q);
        // Thigh was 0.1 left of the root; after a 90° yaw it is 0.1 behind.
        assert_relative_eq!(
            part.bones()[0].solver_position,
            Vector3::new(0.9, 0.0, 1.0),
            epsilon = 1e-5
        );
        let len = (part.bones()[1].solver_position - part.bones()[0].solver_position).norm();
        assert_relative_eq!(len, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn read_skips_missing_slots() {
        let mut part = Stick::new();
        let skel = Skeleton::new().with(BoneSlot::LeftThigh, BonePose::at(Vector3::new(0.0, 0.0, 2.0)));
        part.read(&skel, &BonePose::identity());
        assert_relative_eq!(part.bones()[0].solver_position.z, 2.0);
        assert_relative_eq!(part.bones()[1].solver_position.z, 0.0);
    }
}

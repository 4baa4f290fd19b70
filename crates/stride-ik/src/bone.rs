//! Solver-local bone records and the chain primitives built on them.
//!
//! A [`VirtualBone`] mirrors one skeleton slot: the pose read this frame, the
//! working pose the solver mutates, and the length and local axis toward the
//! next bone cached by [`presolve`]. Every rotation helper here reduces to
//! [`rotate_around_point`], which moves bones rigidly and so preserves
//! inter-bone distances.

use nalgebra::{UnitQuaternion, Vector3};

use stride_core::types::BonePose;

use crate::math::{EPS, from_to_rotation, lerp_vec, orthogonal, safe_normalize, weighted_rotation};

/// A bone as the solver sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualBone {
    pub read_position: Vector3<f32>,
    pub read_rotation: UnitQuaternion<f32>,
    pub solver_position: Vector3<f32>,
    pub solver_rotation: UnitQuaternion<f32>,
    /// Distance to the next bone in the chain. Zero for the tip.
    pub length: f32,
    pub sqr_mag: f32,
    /// Direction to the next bone in this bone's local frame.
    pub axis: Vector3<f32>,
}

impl VirtualBone {
    #[must_use]
    pub fn new(pose: &BonePose) -> Self {
        Self {
            read_position: pose.position,
            read_rotation: pose.rotation,
            solver_position: pose.position,
            solver_rotation: pose.rotation,
            length: 0.0,
            sqr_mag: 0.0,
            axis: Vector3::zeros(),
        }
    }

    /// Overwrite both read and solver poses.
    pub fn read(&mut self, pose: &BonePose) {
        self.read_position = pose.position;
        self.read_rotation = pose.rotation;
        self.solver_position = pose.position;
        self.solver_rotation = pose.rotation;
    }

    #[must_use]
    pub fn solver_pose(&self) -> BonePose {
        BonePose::new(self.solver_position, self.solver_rotation)
    }

    #[must_use]
    pub fn read_pose(&self) -> BonePose {
        BonePose::new(self.read_position, self.read_rotation)
    }
}

// ---------------------------------------------------------------------------
// Chain bookkeeping
// ---------------------------------------------------------------------------

/// Cache per-bone length and local axis from the solver poses.
///
/// Returns the summed chain length.
pub fn presolve(bones: &mut [VirtualBone]) -> f32 {
    let mut total = 0.0;
    for i in 0..bones.len() {
        if let Some(next) = bones.get(i + 1).map(|b| b.solver_position) {
            let bone = &mut bones[i];
            let to_next = next - bone.solver_position;
            bone.sqr_mag = to_next.norm_squared();
            bone.length = bone.sqr_mag.sqrt();
            bone.axis = bone.solver_rotation.inverse() * to_next;
            total += bone.length;
        } else {
            let bone = &mut bones[i];
            bone.sqr_mag = 0.0;
            bone.length = 0.0;
        }
    }
    total
}

/// Rotate every bone from `index` on about `pivot` by `rotation`.
pub fn rotate_around_point(
    bones: &mut [VirtualBone],
    index: usize,
    pivot: &Vector3<f32>,
    rotation: &UnitQuaternion<f32>,
) {
    for bone in bones.iter_mut().skip(index) {
        let dir = bone.solver_position - pivot;
        bone.solver_position = pivot + rotation * dir;
        bone.solver_rotation = rotation * bone.solver_rotation;
    }
}

/// Rotate bones from `index` on about the bone at `index`.
pub fn rotate_by(bones: &mut [VirtualBone], index: usize, rotation: &UnitQuaternion<f32>) {
    if let Some(pivot) = bones.get(index).map(|b| b.solver_position) {
        rotate_around_point(bones, index, &pivot, rotation);
    }
}

/// Rotate the bone at `index` toward world `rotation`, carrying its children.
pub fn rotate_to(
    bones: &mut [VirtualBone],
    index: usize,
    rotation: &UnitQuaternion<f32>,
    weight: f32,
) {
    if weight <= 0.0 {
        return;
    }
    let Some(bone) = bones.get(index) else {
        return;
    };
    let delta = weighted_rotation(&(rotation * bone.solver_rotation.inverse()), weight);
    let pivot = bone.solver_position;
    rotate_around_point(bones, index, &pivot, &delta);
}

/// Swing the bone at `index` so its axis points at `target`.
///
/// Only rotations change; callers that use this after repositioning bones
/// (FABRIK) already own the positions.
pub fn swing_rotation(bones: &mut [VirtualBone], index: usize, target: &Vector3<f32>, weight: f32) {
    if weight <= 0.0 {
        return;
    }
    let Some(bone) = bones.get(index) else {
        return;
    };
    let swing = weighted_rotation(
        &from_to_rotation(&(bone.solver_rotation * bone.axis), &(target - bone.solver_position)),
        weight,
    );
    for bone in bones.iter_mut().skip(index) {
        bone.solver_rotation = swing * bone.solver_rotation;
    }
}

// ---------------------------------------------------------------------------
// Trigonometric solve
// ---------------------------------------------------------------------------

/// Closed-form two-bone solve over `first`, `second`, `third`.
///
/// The target is blended toward the current `third` position by `weight`,
/// then its distance from `first` is clamped to the reach of the two segments
/// and to the current `first`-`third` distance. `second` bows along
/// `dir × bend_normal`. Bones after `third` are carried rigidly.
#[allow(clippy::too_many_arguments)]
pub fn solve_trigonometric(
    bones: &mut [VirtualBone],
    first: usize,
    second: usize,
    third: usize,
    target: &Vector3<f32>,
    bend_normal: &Vector3<f32>,
    weight: f32,
) {
    if weight <= 0.0 || third >= bones.len() || !(first < second && second < third) {
        return;
    }
    let p1 = bones[first].solver_position;
    let p2 = bones[second].solver_position;
    let p3 = bones[third].solver_position;

    let blended = lerp_vec(&p3, target, weight);
    let to_target = blended - p1;
    let Some(dir) = safe_normalize(&to_target) else {
        return;
    };

    let upper = p2 - p1;
    let lower = p3 - p2;
    let sqr1 = upper.norm_squared();
    let sqr2 = lower.norm_squared();
    let reach = sqr1.sqrt() + sqr2.sqrt();
    let current = (p3 - p1).norm();
    let distance = to_target.norm().min(reach).min(current);
    if distance < EPS {
        return;
    }
    let clamped = p1 + dir * distance;

    // Bend direction, perpendicular to the limb direction.
    let bend_dir = safe_normalize(&dir.cross(bend_normal))
        .or_else(|| safe_normalize(&(upper - dir * upper.dot(&dir))))
        .unwrap_or_else(|| orthogonal(&dir));

    let x = (distance * distance + sqr1 - sqr2) / (2.0 * distance);
    let y = (sqr1 - x * x).max(0.0).sqrt();
    let to_bend_point = dir * x + bend_dir * y;

    let q1 = from_to_rotation(&upper, &to_bend_point);
    rotate_around_point(bones, first, &p1, &q1);

    let p2 = bones[second].solver_position;
    let q2 = from_to_rotation(&(bones[third].solver_position - p2), &(clamped - p2));
    rotate_around_point(bones, second, &p2, &q2);
}

// ---------------------------------------------------------------------------
// FABRIK
// ---------------------------------------------------------------------------

/// Forward-and-backward reaching solve over the whole chain.
///
/// `min_reach_fraction` keeps the target at least that fraction of
/// `reference_length` away from `start`. `start_offset` is added to every
/// joint after the first backward pass, which biases which way a straight
/// chain folds. Lengths come from the last [`presolve`].
#[allow(clippy::too_many_arguments)]
pub fn solve_fabrik(
    bones: &mut [VirtualBone],
    start: &Vector3<f32>,
    target: &Vector3<f32>,
    weight: f32,
    min_reach_fraction: f32,
    iterations: u32,
    reference_length: f32,
    start_offset: &Vector3<f32>,
) {
    if weight <= 0.0 || bones.is_empty() {
        return;
    }
    let mut target = *target;
    if min_reach_fraction > 0.0 {
        let to_target = target - start;
        if let Some(dir) = safe_normalize(&to_target) {
            target = start + dir * to_target.norm().max(reference_length * min_reach_fraction);
        }
    }

    let last = bones.len() - 1;
    for iteration in 0..iterations {
        bones[last].solver_position = lerp_vec(&bones[last].solver_position, &target, weight);
        for i in (0..last).rev() {
            bones[i].solver_position = fabrik_joint(
                &bones[i].solver_position,
                &bones[i + 1].solver_position,
                bones[i].length,
            );
        }

        if iteration == 0 {
            for bone in bones.iter_mut() {
                bone.solver_position += start_offset;
            }
        }

        bones[0].solver_position = *start;
        for i in 1..=last {
            bones[i].solver_position = fabrik_joint(
                &bones[i].solver_position,
                &bones[i - 1].solver_position,
                bones[i - 1].length,
            );
        }
    }

    for i in 0..last {
        let next = bones[i + 1].solver_position;
        swing_rotation(bones, i, &next, 1.0);
    }
}

/// Place `joint` at `length` from `anchor`, keeping its direction.
fn fabrik_joint(joint: &Vector3<f32>, anchor: &Vector3<f32>, length: f32) -> Vector3<f32> {
    let dir = safe_normalize(&(joint - anchor)).unwrap_or_else(Vector3::z);
    anchor + dir * length
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::math::angle_axis;

    fn chain(points: &[[f32; 3]]) -> Vec<VirtualBone> {
        let mut bones: Vec<VirtualBone> = points
            .iter()
            .map(|p| VirtualBone::new(&BonePose::at(Vector3::new(p[0], p[1], p[2]))))
            .collect();
        presolve(&mut bones);
        bones
    }

    fn assert_lengths(bones: &[VirtualBone], lengths: &[f32]) {
        for (i, len) in lengths.iter().enumerate() {
            let d = (bones[i + 1].solver_position - bones[i].solver_position).norm();
            assert_relative_eq!(d, *len, epsilon = 1e-4);
        }
    }

    /// Slightly bent two-bone arm along +X.
    fn arm() -> Vec<VirtualBone> {
        chain(&[[0.0, 0.0, 0.0], [0.5, 0.0, -0.05], [1.0, 0.0, 0.0]])
    }

    #[test]
    fn presolve_caches_lengths_and_axes() {
        let mut bones = chain(&[[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 2.0, 1.0]]);
        bones[1].solver_rotation = angle_axis(std::f32::consts::FRAC_PI_2, &Vector3::z());
        let total = presolve(&mut bones);
        assert_relative_eq!(total, 3.0);
        assert_relative_eq!(bones[0].length, 1.0);
        assert_relative_eq!(bones[2].length, 0.0);
        // Bone 1 is yawed 90°, so world +Y is its local +X.
        assert_relative_eq!(bones[1].axis, Vector3::new(2.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn rotate_around_point_is_rigid() {
        let mut bones = arm();
        let lengths = [bones[0].length, bones[1].length];
        let q = angle_axis(0.7, &Vector3::new(1.0, 1.0, 0.0));
        rotate_around_point(&mut bones, 0, &Vector3::new(0.2, -0.3, 0.1), &q);
        assert_lengths(&bones, &lengths);
        assert_relative_eq!(bones[2].solver_rotation.angle(), 0.7, epsilon = 1e-5);
    }

    #[test]
    fn rotate_to_reaches_rotation() {
        let mut bones = arm();
        let goal = angle_axis(0.4, &Vector3::z());
        rotate_to(&mut bones, 1, &goal, 1.0);
        assert_relative_eq!(bones[1].solver_rotation.angle_to(&goal), 0.0, epsilon = 1e-5);
        assert_relative_eq!(bones[0].solver_rotation.angle(), 0.0);
    }

    #[test]
    fn swing_rotation_aligns_axis() {
        let mut bones = arm();
        let target = Vector3::new(0.0, 1.0, 0.0);
        swing_rotation(&mut bones, 0, &target, 1.0);
        let axis = (bones[0].solver_rotation * bones[0].axis).normalize();
        assert_relative_eq!(axis, Vector3::y(), epsilon = 1e-5);
    }

    #[test]
    fn trigonometric_reaches_reachable_target() {
        let mut bones = arm();
        let lengths = [bones[0].length, bones[1].length];
        let target = Vector3::new(0.6, 0.3, 0.2);
        solve_trigonometric(&mut bones, 0, 1, 2, &target, &Vector3::z(), 1.0);
        assert_relative_eq!(bones[2].solver_position, target, epsilon = 1e-4);
        assert_lengths(&bones, &lengths);
    }

    #[test]
    fn trigonometric_bends_along_normal_cross() {
        let mut bones = arm();
        let target = Vector3::new(0.6, 0.0, 0.0);
        // dir = +X, normal = +Y, so the elbow bows toward +Z.
        solve_trigonometric(&mut bones, 0, 1, 2, &target, &Vector3::y(), 1.0);
        assert!(bones[1].solver_position.z > 0.1);
    }

    #[test]
    fn trigonometric_unreachable_target_preserves_lengths() {
        let mut bones = arm();
        let lengths = [bones[0].length, bones[1].length];
        let before = (bones[2].solver_position - bones[0].solver_position).norm();
        solve_trigonometric(&mut bones, 0, 1, 2, &Vector3::new(0.0, 5.0, 0.0), &Vector3::z(), 1.0);
        assert_lengths(&bones, &lengths);
        let after = (bones[2].solver_position - bones[0].solver_position).norm();
        assert!(after <= before + 1e-5);
        // Still points at the target.
        let dir = (bones[2].solver_position - bones[0].solver_position).normalize();
        assert_relative_eq!(dir, Vector3::y(), epsilon = 1e-4);
    }

    #[test]
    fn trigonometric_weight_zero_is_bit_identical() {
        let mut bones = arm();
        let before = bones.clone();
        solve_trigonometric(&mut bones, 0, 1, 2, &Vector3::new(0.1, 0.5, 0.0), &Vector3::z(), 0.0);
        assert_eq!(bones, before);
    }

    #[test]
    fn trigonometric_partial_weight_moves_partway() {
        let mut bones = arm();
        let start = bones[2].solver_position;
        let target = Vector3::new(0.4, 0.4, 0.0);
        solve_trigonometric(&mut bones, 0, 1, 2, &target, &Vector3::z(), 0.5);
        let expected = start.lerp(&target, 0.5);
        assert_relative_eq!(bones[2].solver_position, expected, epsilon = 1e-4);
    }

    #[test]
    fn trigonometric_carries_trailing_bones() {
        let mut bones = chain(&[
            [0.0, 0.0, 1.0],
            [0.0, 0.02, 0.5],
            [0.0, 0.0, 0.0],
            [0.2, 0.0, 0.0],
        ]);
        let foot_len = bones[2].length;
        solve_trigonometric(&mut bones, 0, 1, 2, &Vector3::new(0.0, 0.0, 0.2), &Vector3::y(), 1.0);
        let d = (bones[3].solver_position - bones[2].solver_position).norm();
        assert_relative_eq!(d, foot_len, epsilon = 1e-5);
    }

    #[test]
    fn fabrik_reaches_target_and_preserves_lengths() {
        let mut bones = chain(&[
            [0.0, 0.0, 0.0],
            [0.05, 0.0, 0.2],
            [0.08, 0.0, 0.4],
            [0.05, 0.0, 0.6],
        ]);
        let lengths = [bones[0].length, bones[1].length, bones[2].length];
        let total: f32 = lengths.iter().sum();
        let start = bones[0].solver_position;
        let target = Vector3::new(0.1, 0.05, 0.55);
        solve_fabrik(&mut bones, &start, &target, 1.0, 0.0, 20, total, &Vector3::zeros());
        assert_lengths(&bones, &lengths);
        assert_relative_eq!(bones[0].solver_position, start);
        assert_relative_eq!(bones[3].solver_position, target, epsilon = 1e-3);
    }

    #[test]
    fn fabrik_unreachable_target_stretches_toward_it() {
        let mut bones = chain(&[[0.0, 0.0, 0.0], [0.0, 0.1, 0.5], [0.0, 0.0, 1.0]]);
        let lengths = [bones[0].length, bones[1].length];
        let start = bones[0].solver_position;
        solve_fabrik(&mut bones, &start, &Vector3::new(0.0, 0.0, 5.0), 1.0, 0.0, 4, 1.0, &Vector3::zeros());
        assert_lengths(&bones, &lengths);
        assert!(bones[2].solver_position.z > 0.99);
    }

    #[test]
    fn fabrik_rotations_follow_positions() {
        let mut bones = chain(&[[0.0, 0.0, 0.0], [0.0, 0.0, 0.5], [0.0, 0.0, 1.0]]);
        let start = bones[0].solver_position;
        solve_fabrik(&mut bones, &start, &Vector3::new(0.5, 0.0, 0.5), 1.0, 0.0, 8, 1.0, &Vector3::new(0.1, 0.0, 0.0));
        let axis = (bones[0].solver_rotation * bones[0].axis).normalize();
        let actual = (bones[1].solver_position - bones[0].solver_position).normalize();
        assert_relative_eq!(axis, actual, epsilon = 1e-4);
    }

    #[test]
    fn fabrik_weight_zero_is_bit_identical() {
        let mut bones = arm();
        let before = bones.clone();
        solve_fabrik(&mut bones, &Vector3::zeros(), &Vector3::new(0.3, 0.3, 0.0), 0.0, 1.0, 3, 1.0, &Vector3::zeros());
        assert_eq!(bones, before);
    }

    #[test]
    fn fabrik_min_reach_keeps_distance() {
        let mut bones = chain(&[[0.0, 0.0, 0.0], [0.0, 0.1, 0.5], [0.0, 0.0, 1.0]]);
        let start = bones[0].solver_position;
        solve_fabrik(&mut bones, &start, &Vector3::new(0.0, 0.0, 0.1), 1.0, 1.0, 4, 1.0, &Vector3::zeros());
        let reach = (bones[2].solver_position - start).norm();
        assert!(reach > 0.95);
    }
}

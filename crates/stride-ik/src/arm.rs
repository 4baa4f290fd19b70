//! Optional shoulder, upper arm, forearm and hand.
//!
//! The shoulder is swung by one of two heuristics before the upper arm chain
//! is bent with a trigonometric pass. Both heuristics work on changes
//! relative to the read pose, so an arm whose target sits on its current hand
//! keeps its shoulder where it is.
//!
//! The elbow direction comes from a closed-form construction in the chest
//! frame, biased away from the palm and thumb, unless a bend goal overrides
//! it.

use nalgebra::{UnitQuaternion, Vector3};

use stride_core::config::{ArmConfig, HandAxesConfig, ShoulderRotationMode};
use stride_core::error::{HandAxis, ValidationError};
use stride_core::types::{BonePose, BoneSlot, Side, Target};

use crate::bone::{self, VirtualBone};
use crate::input::{Goal, LimbGoals};
use crate::math::{
    EPS, angle_axis, axis_to_direction, damper_value, flatten, forward, from_to_rotation, left,
    lerp_rotation, lerp_vec, look_rotation, normalize_or, safe_normalize, signed_angle, up,
    weighted_rotation,
};
use crate::part::BodyPart;

/// Fraction of the damped yaw/pitch change carried by the shoulder.
const SHOULDER_SHARE: f32 = 0.5;

/// Solve-time inputs for an arm.
#[derive(Debug, Clone, Copy)]
pub struct ArmContext {
    /// Character root rotation at read time. Fixes which chest axes mean
    /// forward and up.
    pub root_rotation: UnitQuaternion<f32>,
}

#[derive(Debug, Clone)]
pub struct Arm {
    side: Side,
    slots: Vec<BoneSlot>,
    bones: Vec<VirtualBone>,
    root: BonePose,
    has_shoulder: bool,
    config: ArmConfig,
    target: Option<Target>,
    goals: LimbGoals,

    wrist_to_palm_axis: Vector3<f32>,
    palm_to_thumb_axis: Vector3<f32>,
    read_chest_rotation: UnitQuaternion<f32>,

    hand_position_offset: Vector3<f32>,
    position: Vector3<f32>,
    forearm_relative_to_upper_arm: UnitQuaternion<f32>,
}

impl Arm {
    #[must_use]
    pub fn new(side: Side, has_shoulder: bool, config: &ArmConfig) -> Self {
        let mut slots = Vec::with_capacity(4);
        if has_shoulder {
            slots.push(BoneSlot::shoulder(side));
        }
        slots.extend([BoneSlot::upper_arm(side), BoneSlot::forearm(side), BoneSlot::hand(side)]);
        Self {
            side,
            bones: vec![VirtualBone::new(&BonePose::identity()); slots.len()],
            slots,
            root: BonePose::identity(),
            has_shoulder,
            config: config.clone(),
            target: None,
            goals: LimbGoals::default(),
            wrist_to_palm_axis: Vector3::y(),
            palm_to_thumb_axis: Vector3::x(),
            read_chest_rotation: UnitQuaternion::identity(),
            hand_position_offset: Vector3::zeros(),
            position: Vector3::zeros(),
            forearm_relative_to_upper_arm: UnitQuaternion::identity(),
        }
    }

    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    #[must_use]
    pub const fn has_shoulder(&self) -> bool {
        self.has_shoulder
    }

    pub fn configure(&mut self, config: &ArmConfig) {
        self.config = config.clone();
    }

    pub fn set_input(&mut self, target: Option<Target>, goals: LimbGoals) {
        self.target = target;
        self.goals = goals;
    }

    pub fn add_hand_position_offset(&mut self, offset: &Vector3<f32>) {
        self.hand_position_offset += offset;
    }

    #[must_use]
    pub fn position_weight(&self) -> f32 {
        self.target.map_or(0.0, |t| t.position_weight)
    }

    #[must_use]
    pub fn rotation_weight(&self) -> f32 {
        self.target.map_or(0.0, |t| t.rotation_weight)
    }

    /// Hand-local axes in use, `(wrist_to_palm, palm_to_thumb)`.
    #[must_use]
    pub const fn hand_axes(&self) -> (Vector3<f32>, Vector3<f32>) {
        (self.wrist_to_palm_axis, self.palm_to_thumb_axis)
    }

    /// Hand target blended by position weight.
    #[must_use]
    pub fn weighted_position(&self) -> Vector3<f32> {
        lerp_vec(&self.hand().solver_position, &self.position, self.position_weight())
    }

    const fn upper_index(&self) -> usize {
        if self.has_shoulder { 1 } else { 0 }
    }

    #[must_use]
    pub fn hand(&self) -> &VirtualBone {
        &self.bones[self.upper_index() + 2]
    }

    /// Resolve hand axes from configuration or the current read pose.
    ///
    /// Returns `true` when the palm-to-thumb axis had to be guessed.
    ///
    /// # Errors
    ///
    /// [`ValidationError::ZeroHandAxis`] for a configured zero axis.
    pub fn initiate_hand_axes(
        &mut self,
        axes: &HandAxesConfig,
        character_forward: &Vector3<f32>,
    ) -> Result<bool, ValidationError> {
        let upper = self.upper_index();
        let forearm = self.bones[upper + 1];
        let hand = self.bones[upper + 2];
        let side = self.side;

        let configured = |axis: Option<[f32; 3]>, kind: HandAxis| -> Result<Option<Vector3<f32>>, ValidationError> {
            axis.map(|[x, y, z]| {
                safe_normalize(&Vector3::new(x, y, z))
                    .ok_or(ValidationError::ZeroHandAxis { side, axis: kind })
            })
            .transpose()
        };

        let wrist = hand.read_position - forearm.read_position;
        self.wrist_to_palm_axis = match configured(axes.wrist_to_palm, HandAxis::WristToPalm)? {
            Some(axis) => axis,
            None => axis_to_direction(&hand.read_rotation, &wrist),
        };

        if let Some(axis) = configured(axes.palm_to_thumb, HandAxis::PalmToThumb)? {
            self.palm_to_thumb_axis = axis;
            return Ok(false);
        }
        let wrist_world = hand.read_rotation * self.wrist_to_palm_axis;
        let thumb = flatten(character_forward, &wrist_world);
        let thumb = normalize_or(&thumb, *character_forward);
        self.palm_to_thumb_axis = axis_to_direction(&hand.read_rotation, &thumb);
        Ok(true)
    }

    /// Chest frame with local X forward and Z up.
    fn chest_frame(&self, root_rotation: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        let to_local = self.read_chest_rotation.inverse() * root_rotation;
        let chest_forward = self.root.rotation * (to_local * forward());
        let chest_up = self.root.rotation * (to_local * up());
        look_rotation(&chest_forward, &chest_up)
    }

    fn solve_yaw_pitch(&mut self, position: &Vector3<f32>, chest: &UnitQuaternion<f32>, weight: f32) {
        let chest_forward = chest * forward();
        let chest_up = chest * up();
        let side_dir = chest * (left() * self.side.sign());
        let shoulder = self.bones[0];
        let hand = self.hand().solver_position;

        let yaw = |dir: &Vector3<f32>| -> f32 {
            let Some(dir) = safe_normalize(dir) else {
                return 0.0;
            };
            let h = flatten(&dir, &chest_up);
            let angle = h.dot(&chest_forward).atan2(h.dot(&side_dir)).to_degrees();
            let angle = angle * (1.0 - dir.dot(&chest_up).abs()) - self.config.shoulder_yaw_offset;
            let range = self.config.shoulder_yaw_range;
            damper_value(angle, -range, range, self.config.shoulder_yaw_damper_weight)
        };
        let pivot = shoulder.solver_position - side_dir * shoulder.length;
        let pitch = |point: &Vector3<f32>| -> f32 {
            let v = point - pivot;
            let elevation = v.dot(&chest_up).atan2(v.dot(&side_dir)).to_degrees();
            let offset = self.config.shoulder_pitch_offset;
            let range = self.config.shoulder_pitch_range;
            damper_value(elevation, offset - range, offset + range, 1.0)
        };

        let yaw_delta = (yaw(&(position - shoulder.solver_position)) - yaw(&(hand - shoulder.solver_position)))
            * SHOULDER_SHARE;
        let pitch_delta = (pitch(position) - pitch(&hand)) * SHOULDER_SHARE;

        let yaw_rotation = angle_axis(yaw_delta.to_radians(), &side_dir.cross(&chest_forward));
        let pitch_rotation = angle_axis(pitch_delta.to_radians(), &side_dir.cross(&chest_up));
        let rotation = weighted_rotation(&(pitch_rotation * yaw_rotation), weight);
        bone::rotate_by(&mut self.bones, 0, &rotation);
    }

    fn solve_from_to(&mut self, position: &Vector3<f32>, chest: &UnitQuaternion<f32>, weight: f32) {
        let shoulder = self.bones[0].solver_position;
        let upper = self.bones[1].solver_position;
        let from = normalize_or(&(upper - shoulder), Vector3::zeros()) + chest * forward();
        let rotation = weighted_rotation(&from_to_rotation(&from, &(position - shoulder)), 0.5 * weight);
        bone::rotate_by(&mut self.bones, 0, &rotation);

        let forearm = self.bones[2].solver_position;
        let hand = self.bones[3].solver_position;
        let normal = (forearm - shoulder).cross(&(hand - shoulder));
        bone::solve_trigonometric(&mut self.bones, 0, 2, 3, position, &normal, 0.5 * weight);
    }

    /// Normal of the plane the elbow bends in.
    fn bend_normal(
        &self,
        dir: &Vector3<f32>,
        chest: &UnitQuaternion<f32>,
        hand_rotation: &UnitQuaternion<f32>,
    ) -> Vector3<f32> {
        let side_dir = chest * (left() * self.side.sign());
        let arm_dir = if self.has_shoulder {
            let shoulder = &self.bones[0];
            normalize_or(&(shoulder.solver_rotation * shoulder.axis), side_dir)
        } else {
            side_dir
        };
        let dir = normalize_or(dir, arm_dir);
        let to_chest = chest.inverse();

        let t = to_chest * dir + forward();
        let mut b = from_to_rotation(&-up(), &t) * -forward();
        b = from_to_rotation(&(to_chest * arm_dir), &(to_chest * dir)) * b;
        b = chest * b;
        b += arm_dir;
        b -= hand_rotation * self.wrist_to_palm_axis;
        b -= hand_rotation * self.palm_to_thumb_axis * 0.5;

        if let Some(goal) = Goal::active(self.goals.bend_goal.as_ref()) {
            let to_goal = goal.position - self.bones[self.upper_index()].solver_position;
            b = weighted_rotation(&from_to_rotation(&b, &to_goal), goal.weight.min(1.0)) * b;
        }
        if self.goals.swivel_offset.abs() > EPS {
            b = angle_axis(self.goals.swivel_offset.to_radians(), &dir) * b;
        }
        b.cross(&dir)
    }

    /// Roll the shoulder and upper arm about their own axes as the shoulder
    /// rises.
    fn twist_shoulder(&mut self, elevation: f32, weight: f32) {
        let p = (elevation.to_degrees() * 2.0 * weight * self.config.shoulder_twist_weight)
            .clamp(0.0, 180.0)
            .to_radians();
        if p <= EPS {
            return;
        }
        let sign = self.side.sign();
        for bone in &mut self.bones[..2] {
            let axis = bone.solver_rotation * bone.axis * sign;
            bone.solver_rotation = angle_axis(-p, &axis) * bone.solver_rotation;
        }
    }
}

impl BodyPart for Arm {
    type Context<'a> = ArmContext;

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

    fn on_read(&mut self) {
        self.read_chest_rotation = self.root.rotation;
    }

    fn presolve(&mut self) -> f32 {
        let total = bone::presolve(&mut self.bones);
        let upper = self.upper_index();
        self.forearm_relative_to_upper_arm =
            self.bones[upper].solver_rotation.inverse() * self.bones[upper + 1].solver_rotation;
        let hand = self.hand().solver_position;
        self.position = self.target.map_or(hand, |t| t.position);
        total
    }

    fn apply_offsets(&mut self) {
        self.position += self.hand_position_offset;
    }

    fn solve(&mut self, ctx: ArmContext) {
        let weight = self.position_weight();
        let chest = self.chest_frame(&ctx.root_rotation);
        let position = self.position;
        let upper = self.upper_index();

        let hand = *self.hand();
        let hand_rotation = match self.target {
            Some(t) => lerp_rotation(&hand.solver_rotation, &t.rotation, t.rotation_weight),
            None => hand.solver_rotation,
        };

        let shoulder_weight = self.config.shoulder_rotation_weight * weight;
        let shoulder_before = self.has_shoulder.then(|| self.bones[0].solver_rotation * self.bones[0].axis);
        if self.has_shoulder && shoulder_weight > 0.0 {
            match self.config.shoulder_rotation_mode {
                ShoulderRotationMode::YawPitch => self.solve_yaw_pitch(&position, &chest, shoulder_weight),
                ShoulderRotationMode::FromTo => self.solve_from_to(&position, &chest, shoulder_weight),
            }
        }

        let dir = position - self.bones[upper].solver_position;
        let normal = self.bend_normal(&dir, &chest, &hand_rotation);
        bone::solve_trigonometric(&mut self.bones, upper, upper + 1, upper + 2, &position, &normal, weight);

        if let Some(before) = shoulder_before.filter(|_| shoulder_weight > 0.0) {
            let after = self.bones[0].solver_rotation * self.bones[0].axis;
            let side_dir = chest * (left() * self.side.sign());
            let elevation = signed_angle(&before, &after, &side_dir.cross(&(chest * up())));
            self.twist_shoulder(elevation, weight);
        }

        // Restore the forearm's twist relative to the upper arm.
        let forearm_fixed = self.bones[upper].solver_rotation * self.forearm_relative_to_upper_arm;
        let forearm = self.bones[upper + 1];
        let to_hand = self.hand().solver_position - forearm.solver_position;
        let swing = from_to_rotation(&(forearm_fixed * forearm.axis), &to_hand);
        bone::rotate_to(&mut self.bones, upper + 1, &(swing * forearm_fixed), weight);

        if let Some(target) = self.target.filter(|t| t.rotation_weight > 0.0) {
            let hand = &mut self.bones[upper + 2];
            hand.solver_rotation = lerp_rotation(&hand.solver_rotation, &target.rotation, target.rotation_weight);
        }
    }

    fn reset_offsets(&mut self) {
        self.hand_position_offset = Vector3::zeros();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use stride_core::types::Skeleton;

    fn skeleton() -> Skeleton {
        Skeleton::new()
            .with(BoneSlot::Chest, BonePose::at(Vector3::new(0.0, 0.0, 1.4)))
            .with(BoneSlot::LeftShoulder, BonePose::at(Vector3::new(0.0, 0.05, 1.45)))
            .with(BoneSlot::LeftUpperArm, BonePose::at(Vector3::new(0.0, 0.2, 1.45)))
            .with(BoneSlot::LeftForearm, BonePose::at(Vector3::new(-0.02, 0.48, 1.45)))
            .with(BoneSlot::LeftHand, BonePose::at(Vector3::new(0.0, 0.75, 1.45)))
    }

    fn arm(config: &ArmConfig) -> Arm {
        let skel = skeleton();
        let mut arm = Arm::new(Side::Left, true, config);
        arm.read(&skel, skel.get(BoneSlot::Chest).unwrap());
        arm.initiate_hand_axes(&HandAxesConfig::default(), &Vector3::x()).unwrap();
        arm
    }

    fn run(arm: &mut Arm) {
        arm.presolve();
        arm.apply_offsets();
        arm.solve(ArmContext { root_rotation: UnitQuaternion::identity() });
        arm.reset_offsets();
    }

    fn lengths(arm: &Arm) -> Vec<f32> {
        arm.bones()
            .windows(2)
            .map(|w| (w[1].solver_position - w[0].solver_position).norm())
            .collect()
    }

    #[test]
    fn hand_axes_are_inferred_from_pose() {
        let arm = arm(&ArmConfig::default());
        let (wrist, thumb) = arm.hand_axes();
        assert_relative_eq!(wrist, Vector3::y());
        assert_relative_eq!(thumb, Vector3::x());
    }

    #[test]
    fn zero_configured_axis_is_rejected() {
        let skel = skeleton();
        let mut arm = Arm::new(Side::Left, true, &ArmConfig::default());
        arm.read(&skel, skel.get(BoneSlot::Chest).unwrap());
        let axes = HandAxesConfig { wrist_to_palm: Some([0.0; 3]), palm_to_thumb: None };
        let err = arm.initiate_hand_axes(&axes, &Vector3::x()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::ZeroHandAxis { side: Side::Left, axis: HandAxis::WristToPalm }
        );
    }

    #[test]
    fn configured_thumb_axis_is_not_guessed() {
        let skel = skeleton();
        let mut arm = Arm::new(Side::Left, true, &ArmConfig::default());
        arm.read(&skel, skel.get(BoneSlot::Chest).unwrap());
        let axes = HandAxesConfig { wrist_to_palm: None, palm_to_thumb: Some([0.0, 0.0, 2.0]) };
        assert!(!arm.initiate_hand_axes(&axes, &Vector3::x()).unwrap());
        assert_relative_eq!(arm.hand_axes().1, Vector3::z());
    }

    #[test]
    fn untargeted_arm_keeps_its_pose() {
        let mut arm = arm(&ArmConfig::default());
        let before: Vec<_> = arm.bones().iter().map(|b| b.solver_position).collect();
        run(&mut arm);
        for (bone, p) in arm.bones().iter().zip(before) {
            assert_relative_eq!(bone.solver_position, p, epsilon = 1e-5);
        }
    }

    #[test]
    fn target_on_current_hand_keeps_shoulder() {
        let mut arm = arm(&ArmConfig::default());
        let shoulder = arm.bones()[0].solver_rotation;
        let hand = arm.hand().solver_position;
        arm.set_input(Some(Target::position(hand)), LimbGoals::default());
        run(&mut arm);
        assert_relative_eq!(arm.hand().solver_position, hand, epsilon = 1e-4);
        assert_relative_eq!(arm.bones()[0].solver_rotation.angle_to(&shoulder), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn reachable_target_is_reached() {
        for mode in [ShoulderRotationMode::YawPitch, ShoulderRotationMode::FromTo] {
            let config = ArmConfig { shoulder_rotation_mode: mode, ..ArmConfig::default() };
            let mut arm = arm(&config);
            let before = lengths(&arm);
            let target = Vector3::new(0.25, 0.35, 1.35);
            arm.set_input(Some(Target::position(target)), LimbGoals::default());
            run(&mut arm);
            assert_relative_eq!(arm.hand().solver_position, target, epsilon = 1e-3);
            for (a, b) in lengths(&arm).iter().zip(before) {
                assert_relative_eq!(*a, b, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn raised_target_lifts_the_shoulder() {
        let mut arm = arm(&ArmConfig::default());
        arm.set_input(Some(Target::position(Vector3::new(0.05, 0.3, 1.95))), LimbGoals::default());
        run(&mut arm);
        assert!(arm.bones()[1].solver_position.z > 1.46);
    }

    #[test]
    fn zero_shoulder_weight_leaves_shoulder() {
        let config = ArmConfig { shoulder_rotation_weight: 0.0, ..ArmConfig::default() };
        let mut arm = arm(&config);
        let upper = arm.bones()[1].solver_position;
        arm.set_input(Some(Target::position(Vector3::new(0.05, 0.3, 1.95))), LimbGoals::default());
        run(&mut arm);
        assert_relative_eq!(arm.bones()[1].solver_position, upper, epsilon = 1e-6);
    }

    #[test]
    fn bend_goal_pulls_elbow_back() {
        let mut arm = arm(&ArmConfig::default());
        let goals = LimbGoals {
            bend_goal: Some(Goal::new(Vector3::new(-1.0, 0.35, 1.4), 1.0)),
            swivel_offset: 0.0,
        };
        arm.set_input(Some(Target::position(Vector3::new(0.25, 0.35, 1.35))), goals);
        run(&mut arm);
        let upper = arm.bones()[1].solver_position;
        let elbow = arm.bones()[2].solver_position;
        let hand = arm.hand().solver_position;
        assert!(elbow.x < (upper.x + hand.x) * 0.5);
    }

    #[test]
    fn hand_rotation_follows_target() {
        let mut arm = arm(&ArmConfig::default());
        let q = angle_axis(0.7, &Vector3::y());
        let hand = arm.hand().solver_position;
        arm.set_input(Some(Target::pose(hand, q)), LimbGoals::default());
        run(&mut arm);
        assert_relative_eq!(arm.hand().solver_rotation.angle_to(&q), 0.0, epsilon = 1e-5);
    }
}

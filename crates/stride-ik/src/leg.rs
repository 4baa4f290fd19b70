//! Thigh, calf, foot and optional toes.
//!
//! The leg keeps a working tip pose (`position`/`rotation`, the last bone) and
//! a working foot pose. Targets and locomotion offsets are folded into both
//! before the chain is bent with two trigonometric passes.

use nalgebra::{UnitQuaternion, Vector3};

use stride_core::config::LegConfig;
use stride_core::types::{BonePose, BoneSlot, Side, Target};

use crate::bone::{self, VirtualBone};
use crate::input::{Goal, LimbGoals};
use crate::math::{
    EPS, angle_axis, from_to_rotation, left, lerp_rotation, safe_normalize, signed_angle,
    weighted_rotation,
};
use crate::part::BodyPart;

const THIGH: usize = 0;
const CALF: usize = 1;
const FOOT: usize = 2;
const TOES: usize = 3;

/// Reach data the spine needs to keep the pelvis within leg length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegReach {
    pub thigh: Vector3<f32>,
    /// Working tip position after targets and offsets.
    pub target: Vector3<f32>,
    /// Summed bone lengths from thigh to tip.
    pub length: f32,
    pub current_length: f32,
}

#[derive(Debug, Clone)]
pub struct Leg {
    side: Side,
    slots: Vec<BoneSlot>,
    bones: Vec<VirtualBone>,
    root: BonePose,
    has_toes: bool,
    target: Option<Target>,
    goals: LimbGoals,
    bend_to_target_weight: f32,

    foot_position_offset: Vector3<f32>,
    heel_position_offset: Vector3<f32>,
    foot_rotation_offset: UnitQuaternion<f32>,

    position: Vector3<f32>,
    rotation: UnitQuaternion<f32>,
    foot_position: Vector3<f32>,
    foot_rotation: UnitQuaternion<f32>,
    bend_normal: Vector3<f32>,
    bend_normal_relative_to_pelvis: Vector3<f32>,
    calf_relative_to_thigh: UnitQuaternion<f32>,
    thigh_relative_to_foot: UnitQuaternion<f32>,
    length: f32,
    tip_length: f32,
    current_length: f32,
}

impl Leg {
    #[must_use]
    pub fn new(side: Side, has_toes: bool, config: &LegConfig) -> Self {
        let mut slots = vec![BoneSlot::thigh(side), BoneSlot::calf(side), BoneSlot::foot(side)];
        if has_toes {
            slots.push(BoneSlot::toes(side));
        }
        Self {
            side,
            bones: vec![VirtualBone::new(&BonePose::identity()); slots.len()],
            slots,
            root: BonePose::identity(),
            has_toes,
            target: None,
            goals: LimbGoals::default(),
            bend_to_target_weight: config.bend_to_target_weight,
            foot_position_offset: Vector3::zeros(),
            heel_position_offset: Vector3::zeros(),
            foot_rotation_offset: UnitQuaternion::identity(),
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            foot_position: Vector3::zeros(),
            foot_rotation: UnitQuaternion::identity(),
            bend_normal: left(),
            bend_normal_relative_to_pelvis: left(),
            calf_relative_to_thigh: UnitQuaternion::identity(),
            thigh_relative_to_foot: UnitQuaternion::identity(),
            length: 0.0,
            tip_length: 0.0,
            current_length: 0.0,
        }
    }

    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    #[must_use]
    pub const fn has_toes(&self) -> bool {
        self.has_toes
    }

    pub fn configure(&mut self, config: &LegConfig) {
        self.bend_to_target_weight = config.bend_to_target_weight;
    }

    /// Target and bend controls for the next solve.
    pub fn set_input(&mut self, target: Option<Target>, goals: LimbGoals) {
        self.target = target;
        self.goals = goals;
    }

    #[must_use]
    pub fn position_weight(&self) -> f32 {
        self.target.map_or(0.0, |t| t.position_weight)
    }

    #[must_use]
    pub fn rotation_weight(&self) -> f32 {
        self.target.map_or(0.0, |t| t.rotation_weight)
    }

    #[must_use]
    pub fn thigh(&self) -> &VirtualBone {
        &self.bones[THIGH]
    }

    /// Foot, or toes when present. Foot targets drive this bone.
    #[must_use]
    pub fn last_bone(&self) -> &VirtualBone {
        &self.bones[self.bones.len() - 1]
    }

    /// Working tip position.
    #[must_use]
    pub const fn position(&self) -> &Vector3<f32> {
        &self.position
    }

    /// Working tip rotation.
    #[must_use]
    pub const fn rotation(&self) -> &UnitQuaternion<f32> {
        &self.rotation
    }

    /// Thigh plus calf length from the last presolve.
    #[must_use]
    pub const fn length(&self) -> f32 {
        self.length
    }

    pub fn add_foot_position_offset(&mut self, offset: &Vector3<f32>) {
        self.foot_position_offset += offset;
    }

    pub fn add_heel_position_offset(&mut self, offset: &Vector3<f32>) {
        self.heel_position_offset += offset;
    }

    pub fn add_foot_rotation_offset(&mut self, offset: &UnitQuaternion<f32>) {
        self.foot_rotation_offset = offset * self.foot_rotation_offset;
    }

    /// Grow the allowed pelvis reach to the current thigh-to-tip distance.
    pub(crate) fn refresh_current_length(&mut self) {
        let d = (self.last_bone().solver_position - self.thigh().solver_position).norm();
        self.current_length = self.current_length.max(d);
    }

    /// Measured over the whole chain to the working tip, like `current_length`.
    pub(crate) fn reach(&self) -> LegReach {
        LegReach {
            thigh: self.thigh().solver_position,
            target: self.position,
            length: self.tip_length,
            current_length: self.current_length,
        }
    }

    fn triangle_normal(&self) -> Option<Vector3<f32>> {
        let thigh = self.bones[THIGH].solver_position;
        let calf = self.bones[CALF].solver_position;
        let foot = self.bones[FOOT].solver_position;
        safe_normalize(&(calf - thigh).cross(&(foot - calf)))
    }

    fn apply_rotation_offset(&mut self, offset: &UnitQuaternion<f32>, weight: f32) {
        if weight <= 0.0 {
            return;
        }
        let q = weighted_rotation(offset, weight);
        self.foot_rotation = q * self.foot_rotation;
        self.rotation = q * self.rotation;
        self.bend_normal = q * self.bend_normal;
        self.foot_position = self.position + q * (self.foot_position - self.position);
    }

    fn apply_position_offset(&mut self, offset: &Vector3<f32>, weight: f32) {
        if weight <= 0.0 {
            return;
        }
        let offset = offset * weight;
        self.foot_position += offset;
        self.position += offset;
    }

    /// Keep the thigh twist aligned with the working tip and the calf with the
    /// thigh.
    fn fix_twist_rotations(&mut self) {
        let thigh_pos = self.bones[THIGH].solver_position;
        let calf_pos = self.bones[CALF].solver_position;
        if self.bend_to_target_weight > 0.0 {
            let current = self.bones[THIGH].solver_rotation;
            let twisted = self.rotation * self.thigh_relative_to_foot;
            let swing = from_to_rotation(&(twisted * self.bones[THIGH].axis), &(calf_pos - thigh_pos));
            self.bones[THIGH].solver_rotation =
                lerp_rotation(&current, &(swing * twisted), self.bend_to_target_weight);
        }
        let calf_rotation = self.bones[THIGH].solver_rotation * self.calf_relative_to_thigh;
        let to_foot = self.bones[FOOT].solver_position - calf_pos;
        let swing = from_to_rotation(&(calf_rotation * self.bones[CALF].axis), &to_foot);
        self.bones[CALF].solver_rotation = swing * calf_rotation;
    }
}

impl BodyPart for Leg {
    type Context<'a> = ();

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
        if let Some(normal) = self.triangle_normal() {
            self.bend_normal_relative_to_pelvis = self.root.rotation.inverse() * normal;
        }
    }

    fn presolve(&mut self) -> f32 {
        let total = bone::presolve(&mut self.bones);
        self.length = self.bones[THIGH].length + self.bones[CALF].length;
        self.tip_length = total;

        let last = *self.last_bone();
        self.current_length = (last.solver_position - self.thigh().solver_position).norm();
        self.foot_position = self.bones[FOOT].solver_position;
        self.foot_rotation = self.bones[FOOT].solver_rotation;
        self.position = last.solver_position;
        self.rotation = last.solver_rotation;
        self.bend_normal = self
            .triangle_normal()
            .unwrap_or_else(|| self.root.rotation * self.bend_normal_relative_to_pelvis);

        if let Some(target) = self.target {
            let offset = target.rotation * self.rotation.inverse();
            self.apply_rotation_offset(&offset, target.rotation_weight);
            let offset = target.position - self.position;
            self.apply_position_offset(&offset, target.position_weight);
        }

        self.calf_relative_to_thigh =
            self.bones[THIGH].solver_rotation.inverse() * self.bones[CALF].solver_rotation;
        self.thigh_relative_to_foot = last.solver_rotation.inverse() * self.bones[THIGH].solver_rotation;
        total
    }

    fn apply_offsets(&mut self) {
        let offset = self.foot_position_offset;
        self.apply_position_offset(&offset, 1.0);
        let offset = self.foot_rotation_offset;
        self.apply_rotation_offset(&offset, 1.0);

        // Heel lift pivots the foot about the tip.
        let heel = from_to_rotation(
            &(self.foot_position - self.position),
            &(self.foot_position + self.heel_position_offset - self.position),
        );
        self.foot_position = self.position + heel * (self.foot_position - self.position);
        self.foot_rotation = heel * self.foot_rotation;

        let thigh = self.bones[THIGH].solver_position;
        let axis = thigh - self.last_bone().solver_position;
        let mut angle = 0.0;
        if let Some(goal) = Goal::active(self.goals.bend_goal.as_ref()) {
            let towards = (goal.position - thigh).cross(&(self.position - thigh));
            let leg_axis = thigh - self.bones[FOOT].solver_position;
            angle = signed_angle(&self.bend_normal, &towards, &leg_axis) * goal.weight.min(1.0);
        }
        angle += self.goals.swivel_offset.to_radians();
        if angle.abs() > EPS {
            self.bend_normal = angle_axis(angle, &axis) * self.bend_normal;
            let thigh = &mut self.bones[THIGH];
            thigh.solver_rotation =
                angle_axis(-angle, &(thigh.solver_rotation * thigh.axis)) * thigh.solver_rotation;
        }
    }

    fn solve(&mut self, (): ()) {
        let foot_position = self.foot_position;
        let bend_normal = self.bend_normal;
        bone::solve_trigonometric(&mut self.bones, THIGH, CALF, FOOT, &foot_position, &bend_normal, 1.0);
        let foot_rotation = self.foot_rotation;
        bone::rotate_to(&mut self.bones, FOOT, &foot_rotation, 1.0);

        if !self.has_toes {
            self.fix_twist_rotations();
            return;
        }

        let thigh = self.bones[THIGH].solver_position;
        let foot = self.bones[FOOT].solver_position;
        let toes = self.bones[TOES].solver_position;
        let normal = (foot - thigh).cross(&(toes - foot));
        let position = self.position;
        bone::solve_trigonometric(&mut self.bones, THIGH, FOOT, TOES, &position, &normal, 1.0);
        self.fix_twist_rotations();
        self.bones[TOES].solver_rotation = self.rotation;
    }

    fn reset_offsets(&mut self) {
        self.foot_position_offset = Vector3::zeros();
        self.heel_position_offset = Vector3::zeros();
        self.foot_rotation_offset = UnitQuaternion::identity();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

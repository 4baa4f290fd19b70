//! Pelvis, spine, optional chest, optional neck and head.
//!
//! The head target drives the whole torso: the pelvis is translated after the
//! head, the chain is reshaped by FABRIK, then the chest and neck are bent
//! toward their target rotations. A pelvis target is honoured last with
//! trigonometric passes over the links.

use nalgebra::{UnitQuaternion, Vector3};

use stride_core::config::SpineConfig;
use stride_core::types::{BonePose, BoneSlot, Target};

use crate::bone::{self, VirtualBone};
use crate::input::Goal;
use crate::leg::LegReach;
use crate::math::{
    EPS, angle_axis, clamp_rotation, extract_horizontal, forward, from_to_rotation, left,
    lerp_rotation, lerp_vec, right, signed_angle, up, weighted_rotation,
};
use crate::part::BodyPart;

const PELVIS: usize = 0;
const SPINE: usize = 1;

/// Pelvis-to-head distance of the reference body the hand lean was tuned on.
const REFERENCE_TORSO_LENGTH: f32 = 0.7;

/// FABRIK keeps the head target at least the full chain length away.
const MIN_REACH_FRACTION: f32 = 1.0;

/// Sibling snapshots the spine reads during its solve.
#[derive(Debug, Clone, Copy)]
pub struct SpineContext<'a> {
    pub legs: &'a [LegReach],
    /// Weighted hand targets, indexed by side.
    pub hands: [Vector3<f32>; 2],
}

#[derive(Debug, Clone)]
pub struct Spine {
    slots: Vec<BoneSlot>,
    bones: Vec<VirtualBone>,
    root: BonePose,
    has_chest: bool,
    has_neck: bool,
    config: SpineConfig,
    fabrik_iterations: u32,

    head_target: Option<Target>,
    pelvis_target: Option<Target>,
    chest_goal: Option<Goal>,

    pub(crate) pelvis_position_offset: Vector3<f32>,
    pub(crate) chest_position_offset: Vector3<f32>,
    pub(crate) head_position_offset: Vector3<f32>,
    pub(crate) pelvis_rotation_offset: UnitQuaternion<f32>,
    pub(crate) chest_rotation_offset: UnitQuaternion<f32>,
    pub(crate) head_rotation_offset: UnitQuaternion<f32>,

    head_position: Vector3<f32>,
    head_rotation: UnitQuaternion<f32>,
    pelvis_rotation: UnitQuaternion<f32>,
    anchor_rotation: UnitQuaternion<f32>,
    head_delta_position: Vector3<f32>,
    pelvis_delta_rotation: UnitQuaternion<f32>,
    face_direction: Vector3<f32>,

    pelvis_relative_rotation: UnitQuaternion<f32>,
    chest_relative_rotation: UnitQuaternion<f32>,
    anchor_relative_to_head: UnitQuaternion<f32>,
    anchor_relative_to_pelvis: UnitQuaternion<f32>,
    chest_forward: Vector3<f32>,
    head_height: f32,
    size_mlp: f32,
    length: f32,
}

impl Spine {
    #[must_use]
    pub fn new(has_chest: bool, has_neck: bool, config: &SpineConfig, fabrik_iterations: u32) -> Self {
        let mut slots = vec![BoneSlot::Pelvis, BoneSlot::Spine];
        if has_chest {
            slots.push(BoneSlot::Chest);
        }
        if has_neck {
            slots.push(BoneSlot::Neck);
        }
        slots.push(BoneSlot::Head);
        Self {
            bones: vec![VirtualBone::new(&BonePose::identity()); slots.len()],
            slots,
            root: BonePose::identity(),
            has_chest,
            has_neck,
            config: config.clone(),
            fabrik_iterations,
            head_target: None,
            pelvis_target: None,
            chest_goal: None,
            pelvis_position_offset: Vector3::zeros(),
            chest_position_offset: Vector3::zeros(),
            head_position_offset: Vector3::zeros(),
            pelvis_rotation_offset: UnitQuaternion::identity(),
            chest_rotation_offset: UnitQuaternion::identity(),
            head_rotation_offset: UnitQuaternion::identity(),
            head_position: Vector3::zeros(),
            head_rotation: UnitQuaternion::identity(),
            pelvis_rotation: UnitQuaternion::identity(),
            anchor_rotation: UnitQuaternion::identity(),
            head_delta_position: Vector3::zeros(),
            pelvis_delta_rotation: UnitQuaternion::identity(),
            face_direction: forward(),
            pelvis_relative_rotation: UnitQuaternion::identity(),
            chest_relative_rotation: UnitQuaternion::identity(),
            anchor_relative_to_head: UnitQuaternion::identity(),
            anchor_relative_to_pelvis: UnitQuaternion::identity(),
            chest_forward: forward(),
            head_height: 0.0,
            size_mlp: 1.0,
            length: 0.0,
        }
    }

    pub fn configure(&mut self, config: &SpineConfig, fabrik_iterations: u32) {
        self.config = config.clone();
        self.fabrik_iterations = fabrik_iterations;
    }

    pub fn set_input(&mut self, head: Option<Target>, pelvis: Option<Target>, chest_goal: Option<Goal>) {
        self.head_target = head;
        self.pelvis_target = pelvis;
        self.chest_goal = chest_goal;
    }

    #[must_use]
    pub fn pelvis(&self) -> &VirtualBone {
        &self.bones[PELVIS]
    }

    /// Chest, or the spine bone when the rig has no chest.
    #[must_use]
    pub fn chest(&self) -> &VirtualBone {
        &self.bones[self.chest_index()]
    }

    #[must_use]
    pub fn head(&self) -> &VirtualBone {
        &self.bones[self.head_index()]
    }

    /// Working head target after weights and offsets.
    #[must_use]
    pub const fn head_position(&self) -> &Vector3<f32> {
        &self.head_position
    }

    /// Body facing, blended from head and pelvis targets.
    #[must_use]
    pub const fn anchor_rotation(&self) -> &UnitQuaternion<f32> {
        &self.anchor_rotation
    }

    #[must_use]
    pub const fn face_direction(&self) -> &Vector3<f32> {
        &self.face_direction
    }

    #[must_use]
    pub fn position_weight(&self) -> f32 {
        self.head_target.map_or(0.0, |t| t.position_weight)
    }

    #[must_use]
    pub fn rotation_weight(&self) -> f32 {
        self.head_target.map_or(0.0, |t| t.rotation_weight)
    }

    #[must_use]
    pub fn pelvis_position_weight(&self) -> f32 {
        self.pelvis_target.map_or(0.0, |t| t.position_weight)
    }

    #[must_use]
    pub fn pelvis_rotation_weight(&self) -> f32 {
        self.pelvis_target.map_or(0.0, |t| t.rotation_weight)
    }

    fn chest_index(&self) -> usize {
        SPINE + usize::from(self.has_chest)
    }

    fn head_index(&self) -> usize {
        self.bones.len() - 1
    }

    /// Last bone before the head.
    fn neck_index(&self) -> usize {
        self.head_index() - 1
    }

    /// Move the pelvis so the head lands on its working target.
    ///
    /// `limited` keeps the pelvis within leg reach, optionally against the
    /// legs' current extension rather than their full length.
    pub fn inverse_translate_to_head(
        &mut self,
        legs: &[LegReach],
        limited: bool,
        use_current_leg_length: bool,
        offset: &Vector3<f32>,
        weight: f32,
    ) {
        let delta = (self.head_position + offset - self.head().solver_position) * weight;
        let mut position = self.pelvis().solver_position + delta;
        if limited {
            position = self.limit_pelvis_position(legs, position, use_current_leg_length);
        }
        self.move_position(&position);
    }

    fn limit_pelvis_position(
        &self,
        legs: &[LegReach],
        mut position: Vector3<f32>,
        use_current_leg_length: bool,
    ) -> Vector3<f32> {
        let pelvis = self.pelvis().solver_position;
        for _ in 0..2 {
            for leg in legs {
                let max = if use_current_leg_length { leg.current_length } else { leg.length };
                let wanted = leg.thigh + (position - pelvis);
                let to_wanted = wanted - leg.target;
                let limited = leg.target + to_wanted.cap_magnitude(max);
                position += limited - wanted;
            }
        }
        position
    }

    /// Lean the chest target toward where the hands are reaching.
    fn adjust_chest_by_hands(&self, chest_target: &mut UnitQuaternion<f32>, hands: &[Vector3<f32>; 2]) {
        let to_anchor = self.anchor_rotation.inverse();
        let l = to_anchor * (hands[0] - self.head_position) / self.size_mlp;
        let r = to_anchor * (hands[1] - self.head_position) / self.size_mlp;
        let amount = self.config.rotate_chest_by_hands;

        // Forward reach and crossing to the far side twist the chest about up.
        let twist = (-l.y * l.y.abs() + l.x * l.x.abs() - r.y * r.y.abs() - r.x * r.x.abs()) * 5.0 * amount;
        let root_up = self.root.rotation * up();
        *chest_target = angle_axis(-twist.atan2(1.0), &root_up) * *chest_target;

        // A higher hand raises that side of the chest.
        let tilt = (l.z - r.z) * 0.5 * amount;
        let root_forward = self.root.rotation * forward();
        *chest_target = angle_axis(tilt.atan2(1.0), &root_forward) * *chest_target;
    }

    fn translate_pelvis(&mut self, legs: &[LegReach]) {
        let head = self.head_index();
        let head_before = self.bones[head].solver_position;
        let rotation_weight = self.rotation_weight();

        let delta_rotation = clamp_rotation(&self.pelvis_delta_rotation, self.config.chest_clamp_weight, 2);
        let mut rotation = weighted_rotation(&delta_rotation, self.config.body_rot_stiffness * rotation_weight);
        if let Some(target) = self.pelvis_target.filter(|t| t.rotation_weight > 0.0) {
            let to_target = target.rotation * self.bones[PELVIS].solver_rotation.inverse();
            rotation = lerp_rotation(&rotation, &to_target, target.rotation_weight);
        }
        let pivot = self.bones[PELVIS].solver_position;
        bone::rotate_around_point(&mut self.bones, PELVIS, &pivot, &(self.pelvis_rotation_offset * rotation));

        let mut delta = self.head_delta_position - (self.bones[head].solver_position - head_before);

        // Crouching moves the body back.
        let root_up = self.root.rotation * up();
        let drop = (-delta.dot(&root_up)).max(0.0);
        delta -= self.root.rotation * forward() * (drop * self.config.move_body_back_when_crouching * self.head_height);

        let position = self.bones[PELVIS].solver_position
            + delta * self.config.body_pos_stiffness * self.position_weight();
        let position = self.limit_pelvis_position(legs, position, false);
        self.move_position(&position);
    }

    fn fabrik_pass(&mut self, animated_pelvis: &Vector3<f32>, root_up: &Vector3<f32>, weight: f32) {
        let start = lerp_vec(
            &self.bones[PELVIS].solver_position,
            animated_pelvis,
            self.config.maintain_pelvis_position,
        ) + self.pelvis_position_offset;
        let end = self.head_position - self.chest_position_offset;
        let start_offset = root_up * (self.head().solver_position - self.pelvis().solver_position).norm();
        bone::solve_fabrik(
            &mut self.bones,
            &start,
            &end,
            weight,
            MIN_REACH_FRACTION,
            self.fabrik_iterations,
            self.length,
            &start_offset,
        );
    }

    fn solve_pelvis(&mut self) {
        let Some(target) = self.pelvis_target.filter(|t| t.position_weight > 0.0) else {
            return;
        };
        let weight = target.position_weight;
        let head = self.head_index();
        let head_rotation = self.bones[head].solver_rotation;

        let delta = (target.position + self.pelvis_position_offset - self.bones[PELVIS].solver_position) * weight;
        for bone in &mut self.bones {
            bone.solver_position += delta;
        }

        let normal = self.anchor_rotation * left();
        let goal = self.head_position;
        let passes: &[(usize, usize, f32)] = match (self.has_chest, self.has_neck) {
            (true, true) => &[(PELVIS, SPINE, 0.9), (SPINE, 2, 0.9), (2, 3, 1.0)],
            (true, false) | (false, true) => &[(PELVIS, SPINE, 0.75), (SPINE, 2, 1.0)],
            (false, false) => &[(PELVIS, SPINE, 1.0)],
        };
        for &(first, second, w) in passes {
            bone::solve_trigonometric(&mut self.bones, first, second, head, &goal, &normal, w * weight);
        }
        self.bones[head].solver_rotation = head_rotation;
    }
}

/// Rotate `first..=last` so the last bone reaches `target`, spreading the
/// rotation along the chain.
///
/// Per-bone shares always sum to one. Uniform shares are `1/n`; graduated
/// shares grow linearly toward `last`.
#[allow(clippy::too_many_arguments, clippy::cast_precision_loss)]
pub fn bend(
    bones: &mut [VirtualBone],
    first: usize,
    last: usize,
    target: &UnitQuaternion<f32>,
    offset: &UnitQuaternion<f32>,
    clamp_weight: f32,
    uniform: bool,
    weight: f32,
) {
    if weight <= 0.0 || last >= bones.len() || last < first {
        return;
    }
    let count = (last + 1 - first) as f32;
    let ramp_total = count * (count + 1.0) * 0.5;
    let rotation = clamp_rotation(&(target * bones[last].solver_rotation.inverse()), clamp_weight, 2);
    let rotation = rotation * offset;
    for i in first..=last {
        let step = if uniform {
            1.0 / count
        } else {
            (i - first + 1) as f32 / ramp_total
        };
        let pivot = bones[i].solver_position;
        bone::rotate_around_point(bones, i, &pivot, &weighted_rotation(&rotation, step * weight));
    }
}

impl BodyPart for Spine {
    type Context<'a> = SpineContext<'a>;

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
        let pelvis = self.bones[PELVIS];
        let chest = self.bones[self.chest_index()];
        let head = self.bones[self.head_index()];
        let to_head = head.solver_rotation.inverse();

        self.pelvis_relative_rotation = to_head * pelvis.solver_rotation;
        self.chest_relative_rotation = to_head * chest.solver_rotation;
        self.anchor_relative_to_head = to_head * self.root.rotation;
        self.anchor_relative_to_pelvis = pelvis.solver_rotation.inverse() * self.root.rotation;
        self.chest_forward = chest.solver_rotation.inverse() * (self.root.rotation * forward());
        self.head_height = (head.solver_position - self.root.position)
            .dot(&(self.root.rotation * up()))
            .abs();
        let torso = (head.solver_position - pelvis.solver_position).norm();
        self.size_mlp = if torso > EPS { torso / REFERENCE_TORSO_LENGTH } else { 1.0 };
    }

    fn presolve(&mut self) -> f32 {
        self.length = bone::presolve(&mut self.bones);
        let head = *self.head();
        let pelvis = *self.pelvis();

        self.head_position = head.solver_position;
        self.head_rotation = head.solver_rotation;
        if let Some(t) = self.head_target {
            self.head_position = lerp_vec(&head.solver_position, &t.position, t.position_weight);
            self.head_rotation = lerp_rotation(&head.solver_rotation, &t.rotation, t.rotation_weight);
        }
        self.pelvis_rotation = self
            .pelvis_target
            .map_or(pelvis.solver_rotation, |t| lerp_rotation(&pelvis.solver_rotation, &t.rotation, t.rotation_weight));
        self.length
    }

    fn apply_offsets(&mut self) {
        self.head_position += self.head_position_offset;

        // Keep the head above the root plane.
        let root_up = self.root.rotation * up();
        let to_head = self.head_position - self.root.position;
        let horizontal = extract_horizontal(&to_head, &root_up, 1.0);
        let height = to_head.dot(&root_up).max(self.config.min_head_height);
        self.head_position = self.root.position + horizontal + root_up * height;

        self.head_rotation = self.head_rotation_offset * self.head_rotation;
        self.head_delta_position = self.head_position - self.head().solver_position;
        self.pelvis_delta_rotation =
            (self.head_rotation * self.pelvis_relative_rotation) * self.pelvis().solver_rotation.inverse();

        let from_head = self.head_rotation * self.anchor_relative_to_head;
        let from_pelvis = self.pelvis_rotation * self.anchor_relative_to_pelvis;
        self.anchor_rotation = lerp_rotation(&from_head, &from_pelvis, self.pelvis_rotation_weight());
    }

    fn solve(&mut self, ctx: SpineContext<'_>) {
        let position_weight = self.position_weight();
        let rotation_weight = self.rotation_weight();

        let mut chest_target = self.head_rotation * self.chest_relative_rotation;
        if self.config.rotate_chest_by_hands > 0.0 {
            self.adjust_chest_by_hands(&mut chest_target, &ctx.hands);
        }

        let read_up = self.root.rotation * up();
        self.face_direction =
            read_up.cross(&(self.anchor_rotation * right())) + self.anchor_rotation * forward();

        if let Some(max) = self.config.max_root_angle_rad() {
            let angle = signed_angle(&(self.root.rotation * forward()), &self.face_direction, &read_up);
            let excess = if angle > max {
                angle - max
            } else if angle < -max {
                angle + max
            } else {
                0.0
            };
            if excess != 0.0 {
                self.root.rotation = angle_axis(excess, &read_up) * self.root.rotation;
            }
        }

        let animated_pelvis = self.bones[PELVIS].solver_position;
        let root_up = self.root.rotation * up();

        self.translate_pelvis(ctx.legs);
        self.fabrik_pass(&animated_pelvis, &root_up, position_weight);

        let chest = self.chest_index();
        let chest_offset = self.chest_rotation_offset;
        bend(
            &mut self.bones,
            PELVIS,
            chest,
            &chest_target,
            &chest_offset,
            self.config.chest_clamp_weight,
            self.config.uniform_chest_bend,
            self.config.neck_stiffness * rotation_weight,
        );

        if let Some(goal) = Goal::active(self.chest_goal.as_ref()) {
            let bone = self.bones[chest];
            let facing = from_to_rotation(
                &(bone.solver_rotation * self.chest_forward),
                &(goal.position - bone.solver_position),
            ) * bone.solver_rotation;
            bend(
                &mut self.bones,
                PELVIS,
                chest,
                &facing,
                &chest_offset,
                self.config.chest_clamp_weight,
                self.config.uniform_chest_bend,
                goal.weight.min(1.0) * rotation_weight,
            );
        }

        self.inverse_translate_to_head(ctx.legs, false, false, &Vector3::zeros(), position_weight);
        self.fabrik_pass(&animated_pelvis, &root_up, position_weight);

        let (neck, head) = (self.neck_index(), self.head_index());
        let head_rotation = self.head_rotation;
        bend(
            &mut self.bones,
            neck,
            head,
            &head_rotation,
            &UnitQuaternion::identity(),
            self.config.head_clamp_weight,
            true,
            rotation_weight,
        );

        self.solve_pelvis();
    }

    fn reset_offsets(&mut self) {
        self.pelvis_position_offset = Vector3::zeros();
        self.chest_position_offset = Vector3::zeros();
        self.head_position_offset = Vector3::zeros();
        self.pelvis_rotation_offset = UnitQuaternion::identity();
        self.chest_rotation_offset = UnitQuaternion::identity();
        self.head_rotation_offset = UnitQuaternion::identity();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

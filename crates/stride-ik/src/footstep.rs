//! Per-foot stepping state.
//!
//! A [`Footstep`] is planted while `progress == 1` and stepping while it is
//! below 1. Stepping interpolates from `step_from` to `step_to` through an
//! easing curve; planted feet only relax their rotation toward the root
//! facing.

use nalgebra::{UnitQuaternion, Vector3};

use stride_core::curve::Easing;

use crate::math::{lerp_rotation, lerp_vec, rotate_towards, smooth_damp};

/// Root-facing drift beyond which a repeated step is never skipped, radians.
const STEP_ROOT_ANGLE: f32 = 25.0 * std::f32::consts::PI / 180.0;

/// Seconds for the support-leg weight to settle.
const SUPPORT_SMOOTH_TIME: f32 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct Footstep {
    /// Root-relative placement offset from the predicted center of mass.
    character_space_offset: Vector3<f32>,
    position: Vector3<f32>,
    rotation: UnitQuaternion<f32>,
    step_from: Vector3<f32>,
    step_to: Vector3<f32>,
    step_from_rotation: UnitQuaternion<f32>,
    step_to_rotation: UnitQuaternion<f32>,
    step_to_root_rotation: UnitQuaternion<f32>,
    foot_relative_to_root: UnitQuaternion<f32>,
    progress: f32,
    /// Progress per second for the current step.
    pub step_speed: f32,
    is_support_leg: bool,
    support_weight: f32,
    support_velocity: f32,
    relax_flag: bool,
}

impl Footstep {
    #[must_use]
    pub fn new(
        root_rotation: &UnitQuaternion<f32>,
        foot_position: &Vector3<f32>,
        foot_rotation: &UnitQuaternion<f32>,
        character_space_offset: Vector3<f32>,
    ) -> Self {
        let mut footstep = Self {
            character_space_offset,
            position: *foot_position,
            rotation: *foot_rotation,
            step_from: *foot_position,
            step_to: *foot_position,
            step_from_rotation: *foot_rotation,
            step_to_rotation: *foot_rotation,
            step_to_root_rotation: *root_rotation,
            foot_relative_to_root: root_rotation.inverse() * foot_rotation,
            progress: 1.0,
            step_speed: 3.0,
            is_support_leg: false,
            support_weight: 0.0,
            support_velocity: 0.0,
            relax_flag: false,
        };
        footstep.reset(root_rotation, foot_position, foot_rotation);
        footstep
    }

    /// Plant the foot at the given pose, abandoning any step in progress.
    pub fn reset(
        &mut self,
        root_rotation: &UnitQuaternion<f32>,
        foot_position: &Vector3<f32>,
        foot_rotation: &UnitQuaternion<f32>,
    ) {
        self.position = *foot_position;
        self.rotation = *foot_rotation;
        self.step_from = *foot_position;
        self.step_to = *foot_position;
        self.step_from_rotation = *foot_rotation;
        self.step_to_rotation = *foot_rotation;
        self.step_to_root_rotation = *root_rotation;
        self.progress = 1.0;
        self.relax_flag = false;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[must_use]
    pub const fn position(&self) -> &Vector3<f32> {
        &self.position
    }

    #[must_use]
    pub const fn rotation(&self) -> &UnitQuaternion<f32> {
        &self.rotation
    }

    #[must_use]
    pub const fn step_from(&self) -> &Vector3<f32> {
        &self.step_from
    }

    #[must_use]
    pub const fn step_to(&self) -> &Vector3<f32> {
        &self.step_to
    }

    #[must_use]
    pub const fn step_to_root_rotation(&self) -> &UnitQuaternion<f32> {
        &self.step_to_root_rotation
    }

    #[must_use]
    pub const fn character_space_offset(&self) -> &Vector3<f32> {
        &self.character_space_offset
    }

    /// Step progress in [0, 1]. 1 means planted.
    #[must_use]
    pub const fn progress(&self) -> f32 {
        self.progress
    }

    #[must_use]
    pub fn is_stepping(&self) -> bool {
        self.progress < 1.0
    }

    #[must_use]
    pub const fn is_support_leg(&self) -> bool {
        self.is_support_leg
    }

    pub(crate) fn set_support_leg(&mut self, value: bool) {
        self.is_support_leg = value;
    }

    pub(crate) fn set_character_space_offset(&mut self, offset: Vector3<f32>) {
        self.character_space_offset = offset;
    }

    // -----------------------------------------------------------------------
    // Stepping
    // -----------------------------------------------------------------------

    /// Start a step toward `target`.
    ///
    /// Skipped when `target` is within `step_threshold` of the last step
    /// target and the root has barely turned, unless a relaxation is pending.
    /// Returns whether a step started.
    pub fn start_step(
        &mut self,
        target: &Vector3<f32>,
        root_rotation: &UnitQuaternion<f32>,
        step_threshold: f32,
    ) -> bool {
        let mut threshold = step_threshold;
        if self.relax_flag {
            threshold = 0.0;
            self.relax_flag = false;
        }
        if (target - self.step_to).norm() < threshold
            && root_rotation.angle_to(&self.step_to_root_rotation) < STEP_ROOT_ANGLE
        {
            return false;
        }
        self.step_from = self.position;
        self.step_to = *target;
        self.step_from_rotation = self.rotation;
        self.step_to_root_rotation = *root_rotation;
        self.step_to_rotation = root_rotation * self.foot_relative_to_root;
        self.progress = 0.0;
        true
    }

    /// Chase a moving step target while stepping.
    pub fn update_stepping(
        &mut self,
        target: &Vector3<f32>,
        root_rotation: &UnitQuaternion<f32>,
        speed: f32,
        dt: f32,
    ) {
        let t = dt * speed;
        self.step_to = lerp_vec(&self.step_to, target, t);
        self.step_to_rotation = lerp_rotation(
            &self.step_to_rotation,
            &(root_rotation * self.foot_relative_to_root),
            t,
        );
        self.step_to_root_rotation = self.step_to_rotation * self.foot_relative_to_root.inverse();
    }

    /// Relax a planted foot's rotation toward the root facing.
    ///
    /// Only the misalignment beyond `min_angle` is removed, at most
    /// `speed * dt` radians per call, less for the support leg.
    pub fn update_standing(
        &mut self,
        root_rotation: &UnitQuaternion<f32>,
        min_angle: f32,
        speed: f32,
        dt: f32,
    ) {
        if speed <= 0.0 || dt <= 0.0 || min_angle >= std::f32::consts::PI {
            return;
        }
        let relaxed = root_rotation * self.foot_relative_to_root;
        let angle = self.rotation.angle_to(&relaxed);
        if angle <= min_angle {
            return;
        }
        let max_step = (dt * speed * (1.0 - self.support_weight)).min(angle - min_angle);
        self.rotation = rotate_towards(&self.rotation, &relaxed, max_step);
        self.relax_flag = true;
    }

    /// Facing the foot would relax toward under `root_rotation`.
    #[must_use]
    pub fn relaxed_rotation(&self, root_rotation: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        root_rotation * self.foot_relative_to_root
    }

    /// Advance the step. Returns true exactly once, on the call that plants
    /// the foot.
    pub fn update(&mut self, easing: Easing, dt: f32) -> bool {
        let support_target = if self.is_support_leg { 1.0 } else { 0.0 };
        self.support_weight = smooth_damp(
            self.support_weight,
            support_target,
            &mut self.support_velocity,
            SUPPORT_SMOOTH_TIME,
            dt,
        );

        if !self.is_stepping() || dt <= 0.0 {
            return false;
        }
        self.progress = (self.progress + dt * self.step_speed).min(1.0);
        let s = easing.ease(self.progress);
        self.position = lerp_vec(&self.step_from, &self.step_to, s);
        self.rotation = lerp_rotation(&self.step_from_rotation, &self.step_to_rotation, s);
        self.progress >= 1.0
    }

    // -----------------------------------------------------------------------
    // Platform motion
    // -----------------------------------------------------------------------

    pub fn translate(&mut self, delta: &Vector3<f32>) {
        self.position += delta;
        self.step_from += delta;
        self.step_to += delta;
    }

    pub fn rotate_about(&mut self, delta: &UnitQuaternion<f32>, pivot: &Vector3<f32>) {
        self.rotation = delta * self.rotation;
        self.step_from_rotation = delta * self.step_from_rotation;
        self.step_to_rotation = delta * self.step_to_rotation;
        self.step_to_root_rotation = delta * self.step_to_root_rotation;
        self.position = pivot + delta * (self.position - pivot);
        self.step_from = pivot + delta * (self.step_from - pivot);
        self.step_to = pivot + delta * (self.step_to - pivot);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

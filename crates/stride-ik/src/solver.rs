//! Full-body orchestrator.
//!
//! [`FullBodyIk`] owns the spine, both arms, both legs, the footstep planner
//! and a root bone. Each [`FullBodyIk::solve`] reads the skeleton, solves the
//! parts in dependency order (spine, locomotion, legs, arms) and writes the
//! result back blended by the master weight.
//!
//! The solver is not ready until [`FullBodyIk::initiate`] has accepted a
//! skeleton. Until then `solve` leaves the skeleton untouched.

use std::collections::HashSet;

use nalgebra::{UnitQuaternion, Vector3};
use tracing::debug;

use stride_core::config::IkConfig;
use stride_core::diagnostics::{DiagnosticsSink, SolverWarning, TracingSink, WarningSite};
use stride_core::error::{ConfigError, ValidationError};
use stride_core::traits::EnvironmentProbe;
use stride_core::types::{BonePose, BoneSlot, Side, Skeleton, Target};

use crate::arm::{Arm, ArmContext};
use crate::bone::VirtualBone;
use crate::footstep::Footstep;
use crate::input::{LimbGoals, SolveInput};
use crate::leg::{Leg, LegReach};
use crate::locomotion::{LegState, Locomotion, LocomotionFrame};
use crate::math::{EPS, flatten, forward, lerp_vec, point_to_plane, up, weighted_rotation};
use crate::part::{BodyPart, blend_pose};
use crate::spine::{Spine, SpineContext};

const SIDES: [Side; 2] = [Side::Left, Side::Right];

/// Rate at which the body follows the summed foot lift.
const BODY_OFFSET_SPEED: f32 = 3.0;

/// Spring gain pulling the root toward the feet.
const ROOT_VELOCITY_GAIN: f32 = 10.0;

/// Rate at which the pelvis ground correction settles.
const PELVIS_CORRECTION_SPEED: f32 = 10.0;

/// Pelvis/leg alternations when feet are planted.
const PLANT_FEET_PASSES: usize = 2;

// ---------------------------------------------------------------------------
// SolveHooks
// ---------------------------------------------------------------------------

/// Optional callbacks run at fixed points of one solve.
#[derive(Default)]
pub struct SolveHooks<'a> {
    /// Runs after the rest pose is restored and before the skeleton is read.
    /// The place to apply animation.
    pub pre_read: Option<&'a mut dyn FnMut(&mut Skeleton)>,
    /// Runs after the solved pose was written.
    pub post_solve: Option<&'a mut dyn FnMut(&Skeleton)>,
    /// Runs once for each foot that finished a step.
    pub on_footstep: Option<&'a mut dyn FnMut(Side)>,
}

impl<'a> SolveHooks<'a> {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_pre_read(mut self, hook: &'a mut dyn FnMut(&mut Skeleton)) -> Self {
        self.pre_read = Some(hook);
        self
    }

    #[must_use]
    pub fn with_post_solve(mut self, hook: &'a mut dyn FnMut(&Skeleton)) -> Self {
        self.post_solve = Some(hook);
        self
    }

    #[must_use]
    pub fn with_on_footstep(mut self, hook: &'a mut dyn FnMut(Side)) -> Self {
        self.on_footstep = Some(hook);
        self
    }
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Forwards each warning site to the sink once per solver instance.
struct Warnings {
    sink: Box<dyn DiagnosticsSink>,
    reported: HashSet<WarningSite>,
}

impl Default for Warnings {
    fn default() -> Self {
        Self {
            sink: Box::new(TracingSink),
            reported: HashSet::new(),
        }
    }
}

impl Warnings {
    fn report(&mut self, warning: SolverWarning) {
        if self.reported.insert(warning.site()) {
            self.sink.report(warning);
        }
    }
}

/// Drop non-finite targets and clamp weights into [0, 1].
fn sanitize(warnings: &mut Warnings, slot: BoneSlot, target: Option<&Target>) -> Option<Target> {
    let target = target?;
    if !target.is_finite() {
        warnings.report(SolverWarning::NonFiniteTarget(slot));
        return None;
    }
    Some(target.with_weights(
        target.position_weight.clamp(0.0, 1.0),
        target.rotation_weight.clamp(0.0, 1.0),
    ))
}

// ---------------------------------------------------------------------------
// Skeleton validation
// ---------------------------------------------------------------------------

/// Slot chains in root-to-tip order, optional slots kept only when present.
fn chains(skeleton: &Skeleton) -> Vec<Vec<BoneSlot>> {
    let present = |slots: &[BoneSlot]| -> Vec<BoneSlot> {
        slots.iter().copied().filter(|s| skeleton.contains(*s)).collect()
    };
    let mut chains = vec![present(&[
        BoneSlot::Pelvis,
        BoneSlot::Spine,
        BoneSlot::Chest,
        BoneSlot::Neck,
        BoneSlot::Head,
    ])];
    for side in SIDES {
        chains.push(present(&[
            BoneSlot::shoulder(side),
            BoneSlot::upper_arm(side),
            BoneSlot::forearm(side),
            BoneSlot::hand(side),
        ]));
        chains.push(present(&[
            BoneSlot::thigh(side),
            BoneSlot::calf(side),
            BoneSlot::foot(side),
            BoneSlot::toes(side),
        ]));
    }
    chains
}

fn validate_skeleton(skeleton: &Skeleton) -> Result<(), ValidationError> {
    for slot in BoneSlot::ALL {
        match skeleton.get(slot) {
            None if !slot.is_optional() => return Err(ValidationError::MissingBone(slot)),
            Some(pose) if !pose.is_finite() => return Err(ValidationError::NonFinitePose(slot)),
            _ => {}
        }
    }
    for chain in chains(skeleton) {
        for pair in chain.windows(2) {
            let (Some(a), Some(b)) = (skeleton.get(pair[0]), skeleton.get(pair[1])) else {
                continue;
            };
            if (a.position - b.position).norm() < EPS {
                return Err(ValidationError::DegenerateSegment { from: pair[0], to: pair[1] });
            }
        }
    }
    Ok(())
}

fn to_local(root: &BonePose, pose: &BonePose) -> BonePose {
    let inv = root.rotation.inverse();
    BonePose::new(inv * (pose.position - root.position), inv * pose.rotation)
}

fn to_world(root: &BonePose, local: &BonePose) -> BonePose {
    BonePose::new(root.position + root.rotation * local.position, root.rotation * local.rotation)
}

// ---------------------------------------------------------------------------
// Rig
// ---------------------------------------------------------------------------

/// Per-frame switches resolved from input and configuration.
#[derive(Debug, Clone, Copy)]
struct FrameParams {
    weight: f32,
    locomotion_weight: f32,
    plant_feet: bool,
    dt: f32,
}

/// Everything built by a successful initiation.
struct Rig {
    root: VirtualBone,
    spine: Spine,
    arms: [Arm; 2],
    legs: [Leg; 2],
    locomotion: Locomotion,
    /// Slots filled at initiation with their pose relative to the root.
    rest_pose: Vec<(BoneSlot, BonePose)>,
    body_offset: Vector3<f32>,
    root_velocity: Vector3<f32>,
    pelvis_correction: Vector3<f32>,
    support_leg: Option<Side>,
}

impl Rig {
    /// Build the parts from a validated skeleton. Returns the sides whose
    /// palm-to-thumb axis was guessed.
    fn build(skeleton: &Skeleton, config: &IkConfig) -> Result<(Self, Vec<Side>), ValidationError> {
        let root_pose = skeleton
            .get(BoneSlot::Root)
            .copied()
            .ok_or(ValidationError::MissingBone(BoneSlot::Root))?;

        let spine = Spine::new(
            skeleton.contains(BoneSlot::Chest),
            skeleton.contains(BoneSlot::Neck),
            &config.spine,
            config.solver.fabrik_iterations,
        );
        let arms = SIDES.map(|side| {
            Arm::new(side, skeleton.contains(BoneSlot::shoulder(side)), &config.arm)
        });
        let legs = SIDES.map(|side| Leg::new(side, skeleton.contains(BoneSlot::toes(side)), &config.leg));

        let rest_pose = skeleton
            .iter()
            .filter(|(slot, _)| *slot != BoneSlot::Root)
            .map(|(slot, pose)| (slot, to_local(&root_pose, pose)))
            .collect();

        let mut rig = Self {
            root: VirtualBone::new(&root_pose),
            spine,
            arms,
            legs,
            locomotion: Locomotion::new(&config.locomotion, &root_pose, &[BonePose::identity(); 2]),
            rest_pose,
            body_offset: Vector3::zeros(),
            root_velocity: Vector3::zeros(),
            pelvis_correction: Vector3::zeros(),
            support_leg: None,
        };
        rig.read(skeleton);

        let character_forward = root_pose.rotation * forward();
        let mut guessed = Vec::new();
        for arm in &mut rig.arms {
            let axes = match arm.side() {
                Side::Left => &config.arm.left_hand,
                Side::Right => &config.arm.right_hand,
            };
            if arm.initiate_hand_axes(axes, &character_forward)? {
                guessed.push(arm.side());
            }
        }
        rig.replant();
        Ok((rig, guessed))
    }

    fn read(&mut self, skeleton: &Skeleton) {
        if let Some(root) = skeleton.get(BoneSlot::Root) {
            self.root.read(root);
        }
        let root = self.root.read_pose();
        self.spine.read(skeleton, &root);
        let chest = self.spine.chest().read_pose();
        for arm in &mut self.arms {
            arm.read(skeleton, &chest);
        }
        let pelvis = self.spine.pelvis().read_pose();
        for leg in &mut self.legs {
            leg.read(skeleton, &pelvis);
        }

        let extension = |leg: &Leg| (leg.last_bone().read_position - leg.thigh().read_position).norm();
        self.support_leg = Some(if extension(&self.legs[0]) <= extension(&self.legs[1]) {
            Side::Left
        } else {
            Side::Right
        });
    }

    /// Plant both footsteps at the read feet and clear smoothed state.
    fn replant(&mut self) {
        let root = self.root.read_pose();
        let feet = self.legs.each_ref().map(|leg| leg.last_bone().read_pose());
        self.locomotion.reset(&root, &feet);
        self.body_offset = Vector3::zeros();
        self.root_velocity = Vector3::zeros();
        self.pelvis_correction = Vector3::zeros();
    }

    fn restore_rest_pose(&self, skeleton: &mut Skeleton) {
        let root = skeleton.get(BoneSlot::Root).copied().unwrap_or_else(|| self.root.read_pose());
        for (slot, local) in &self.rest_pose {
            if let Some(pose) = skeleton.get_mut(*slot) {
                *pose = to_world(&root, local);
            }
        }
    }

    fn configure(&mut self, config: &IkConfig) {
        self.spine.configure(&config.spine, config.solver.fabrik_iterations);
        for arm in &mut self.arms {
            arm.configure(&config.arm);
        }
        for leg in &mut self.legs {
            leg.configure(&config.leg);
        }
        self.locomotion.configure(&config.locomotion);
    }

    fn leg_reaches(&self) -> [LegReach; 2] {
        self.legs.each_ref().map(Leg::reach)
    }

    fn root_up(&self) -> Vector3<f32> {
        self.root.solver_rotation * up()
    }

    // -----------------------------------------------------------------------
    // Frame
    // -----------------------------------------------------------------------

    fn solve_frame(
        &mut self,
        config: &IkConfig,
        probe: Option<&dyn EnvironmentProbe>,
        params: FrameParams,
        hooks: &mut SolveHooks<'_>,
    ) {
        self.spine.presolve();
        for arm in &mut self.arms {
            arm.presolve();
        }
        for leg in &mut self.legs {
            leg.presolve();
        }
        self.spine.apply_offsets();
        for arm in &mut self.arms {
            arm.apply_offsets();
        }

        let reaches = self.leg_reaches();
        let hands = self.arms.each_ref().map(Arm::weighted_position);
        self.spine.solve(SpineContext { legs: &reaches, hands });
        self.root.solver_rotation = self.spine.root().rotation;

        if params.locomotion_weight > 0.0 {
            self.solve_locomotion(config, probe, params, hooks);
        } else {
            self.replant();
        }

        self.solve_legs(params.plant_feet);

        let chest = self.spine.chest().solver_pose();
        let ctx = ArmContext { root_rotation: self.root.read_rotation };
        for arm in &mut self.arms {
            arm.translate_root(&chest.position, &chest.rotation);
            arm.solve(ctx);
        }

        self.spine.reset_offsets();
        for arm in &mut self.arms {
            arm.reset_offsets();
        }
        for leg in &mut self.legs {
            leg.reset_offsets();
        }

        self.update_pelvis_correction(config, probe, params.dt);
    }

    fn solve_locomotion(
        &mut self,
        config: &IkConfig,
        probe: Option<&dyn EnvironmentProbe>,
        params: FrameParams,
        hooks: &mut SolveHooks<'_>,
    ) {
        let FrameParams { weight, locomotion_weight: lw, dt, .. } = params;
        let pelvis = *self.spine.pelvis();
        let legs = self.legs.each_ref().map(|leg| {
            let thigh_local =
                pelvis.read_rotation.inverse() * (leg.thigh().read_position - pelvis.read_position);
            LegState {
                thigh: pelvis.solver_position + pelvis.solver_rotation * thigh_local,
                foot_read_position: leg.last_bone().read_position,
                length: leg.bones().iter().map(|b| b.length).sum(),
            }
        });
        let frame = LocomotionFrame {
            root: self.root.solver_pose(),
            pelvis: pelvis.solver_position,
            head: self.spine.head().solver_position,
            hands: self.arms.each_ref().map(Arm::weighted_position),
            face_direction: *self.spine.face_direction(),
            legs,
            support_leg: self.support_leg,
            probe,
            dt,
        };
        let out = self.locomotion.solve(&frame);

        for side in SIDES {
            if out.completed[side.index()] {
                debug!(%side, "Footstep completed");
                if let Some(hook) = hooks.on_footstep.as_mut() {
                    hook(side);
                }
            }
        }

        let root_up = self.root_up();
        for (i, leg) in self.legs.iter_mut().enumerate() {
            let position_weight = weight * (1.0 - leg.position_weight()) * lw;
            let foot = out.foot_positions[i] + root_up * out.foot_offsets[i];
            leg.add_foot_position_offset(&((foot - leg.position()) * position_weight));
            leg.add_heel_position_offset(&(root_up * (out.heel_offsets[i] * position_weight)));

            let rotation_weight = weight * (1.0 - leg.rotation_weight()) * lw;
            let delta = out.foot_rotations[i] * leg.rotation().inverse();
            leg.add_foot_rotation_offset(&weighted_rotation(&delta, rotation_weight));
        }

        // Pull the root under the feet.
        let root_position = self.root.solver_position;
        let feet_center = point_to_plane(
            &((out.foot_positions[0] + out.foot_positions[1]) * 0.5),
            &root_position,
            &root_up,
        );
        let nudged = root_position + self.root_velocity * (dt * 2.0 * lw);
        self.root.solver_position =
            lerp_vec(&nudged, &feet_center, dt * config.locomotion.root_speed * lw);
        self.root_velocity += (feet_center - root_position) * (dt * ROOT_VELOCITY_GAIN);
        self.root_velocity = flatten(&self.root_velocity, &root_up);

        let lift = root_up * (out.foot_offsets[0] + out.foot_offsets[1]);
        self.body_offset = lerp_vec(&self.body_offset, &lift, dt * BODY_OFFSET_SPEED) * lw;
    }

    fn solve_legs(&mut self, plant_feet: bool) {
        for leg in &mut self.legs {
            leg.apply_offsets();
        }
        let body_offset = self.body_offset;
        let correction = self.pelvis_correction;

        let passes = if plant_feet { PLANT_FEET_PASSES } else { 1 };
        for _ in 0..passes {
            // Reaches are measured from thighs hanging off the current pelvis.
            let pelvis = self.spine.pelvis().solver_pose();
            for leg in &mut self.legs {
                leg.translate_root(&pelvis.position, &pelvis.rotation);
                if plant_feet {
                    leg.refresh_current_length();
                }
            }
            let reaches = self.leg_reaches();
            self.spine
                .inverse_translate_to_head(&reaches, plant_feet, plant_feet, &body_offset, 1.0);

            // Ground correction is exempt from the leg length limit.
            let lifted = self.spine.pelvis().solver_position + correction;
            self.spine.move_position(&lifted);

            let pelvis = self.spine.pelvis().solver_pose();
            for leg in &mut self.legs {
                leg.translate_root(&pelvis.position, &pelvis.rotation);
                leg.solve(());
            }
        }
    }

    /// Measure how far the pelvis sank into the ground; applied next frame.
    fn update_pelvis_correction(&mut self, config: &IkConfig, probe: Option<&dyn EnvironmentProbe>, dt: f32) {
        let target = match probe.filter(|_| config.solver.pelvis_ground_correction) {
            Some(probe) => {
                let root_up = self.root_up();
                let pelvis = self.spine.pelvis().solver_position - self.pelvis_correction;
                let height = config.locomotion.probe_height;
                let from = pelvis + root_up * height;
                probe
                    .cast(&from, &pelvis, config.locomotion.probe_radius)
                    .map_or_else(Vector3::zeros, |hit| root_up * (height - hit).max(0.0))
            }
            None => Vector3::zeros(),
        };
        self.pelvis_correction =
            lerp_vec(&self.pelvis_correction, &target, dt * PELVIS_CORRECTION_SPEED);
    }

    fn write(&self, skeleton: &mut Skeleton, weight: f32) {
        if let Some(pose) = skeleton.get_mut(BoneSlot::Root) {
            *pose = blend_pose(&self.root, weight);
        }
        self.spine.write(skeleton, weight);
        for arm in &self.arms {
            arm.write(skeleton, weight);
        }
        for leg in &self.legs {
            leg.write(skeleton, weight);
        }
    }
}

// ---------------------------------------------------------------------------
// FullBodyIk
// ---------------------------------------------------------------------------

/// Real-time full-body solver for one humanoid.
pub struct FullBodyIk {
    config: IkConfig,
    probe: Option<Box<dyn EnvironmentProbe>>,
    warnings: Warnings,
    rig: Option<Rig>,
}

impl FullBodyIk {
    /// Create a solver with validated tuning. Not ready until
    /// [`initiate`](Self::initiate) succeeds.
    ///
    /// # Errors
    ///
    /// The first invalid configuration field.
    pub fn new(config: IkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            probe: None,
            warnings: Warnings::default(),
            rig: None,
        })
    }

    /// Solver with default tuning.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            config: IkConfig::default(),
            probe: None,
            warnings: Warnings::default(),
            rig: None,
        }
    }

    #[must_use]
    pub fn with_probe<P: EnvironmentProbe + 'static>(mut self, probe: P) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    pub fn set_probe(&mut self, probe: Option<Box<dyn EnvironmentProbe>>) {
        self.probe = probe;
    }

    #[must_use]
    pub fn with_diagnostics<S: DiagnosticsSink + 'static>(mut self, sink: S) -> Self {
        self.warnings.sink = Box::new(sink);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &IkConfig {
        &self.config
    }

    /// Swap tuning without re-initiating. Hand axes keep their initiated
    /// values.
    ///
    /// # Errors
    ///
    /// The first invalid configuration field; the current tuning is kept.
    pub fn set_config(&mut self, config: IkConfig) -> Result<(), ConfigError> {
        config.validate()?;
        if let Some(rig) = self.rig.as_mut() {
            rig.configure(&config);
        }
        self.config = config;
        Ok(())
    }

    /// Validate `skeleton` and build every body part from it.
    ///
    /// On failure the solver is left not ready.
    ///
    /// # Errors
    ///
    /// Missing required bones, non-finite poses, zero-length segments and
    /// zero configured hand axes.
    pub fn initiate(&mut self, skeleton: &Skeleton) -> Result<(), ValidationError> {
        self.rig = None;
        validate_skeleton(skeleton)?;
        let (rig, guessed) = Rig::build(skeleton, &self.config)?;
        for side in guessed {
            self.warnings.report(SolverWarning::GuessedPalmToThumbAxis(side));
        }
        debug!(
            bones = rig.rest_pose.len() + 1,
            chest = skeleton.contains(BoneSlot::Chest),
            neck = skeleton.contains(BoneSlot::Neck),
            "Full-body solver initiated"
        );
        self.rig = Some(rig);
        Ok(())
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.rig.is_some()
    }

    /// Re-read `skeleton` and re-plant the feet, dropping all smoothing.
    /// Use after teleports.
    pub fn reset(&mut self, skeleton: &Skeleton) {
        let Some(rig) = self.rig.as_mut() else {
            self.warnings.report(SolverWarning::NotReady);
            return;
        };
        rig.read(skeleton);
        rig.replant();
        debug!("Full-body solver reset");
    }

    /// Carry planted feet with a moving platform.
    pub fn add_platform_motion(
        &mut self,
        delta_position: &Vector3<f32>,
        delta_rotation: &UnitQuaternion<f32>,
        pivot: &Vector3<f32>,
    ) {
        if let Some(rig) = self.rig.as_mut() {
            rig.locomotion.add_platform_motion(delta_position, delta_rotation, pivot);
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn center_of_mass(&self) -> Option<Vector3<f32>> {
        self.rig.as_ref().map(|rig| *rig.locomotion.center_of_mass())
    }

    #[must_use]
    pub fn footsteps(&self) -> Option<&[Footstep; 2]> {
        self.rig.as_ref().map(|rig| rig.locomotion.footsteps())
    }

    /// Leg with the shorter thigh-to-foot distance at the last read.
    #[must_use]
    pub fn support_leg(&self) -> Option<Side> {
        self.rig.as_ref().and_then(|rig| rig.support_leg)
    }

    #[must_use]
    pub fn spine(&self) -> Option<&Spine> {
        self.rig.as_ref().map(|rig| &rig.spine)
    }

    #[must_use]
    pub fn arm(&self, side: Side) -> Option<&Arm> {
        self.rig.as_ref().map(|rig| &rig.arms[side.index()])
    }

    #[must_use]
    pub fn leg(&self, side: Side) -> Option<&Leg> {
        self.rig.as_ref().map(|rig| &rig.legs[side.index()])
    }

    // -----------------------------------------------------------------------
    // Solve
    // -----------------------------------------------------------------------

    /// Solve one frame and write the result into `skeleton`.
    ///
    /// A master weight of 0 leaves the skeleton bit-identical.
    pub fn solve(&mut self, skeleton: &mut Skeleton, input: &SolveInput, dt: f32, mut hooks: SolveHooks<'_>) {
        let Some(rig) = self.rig.as_mut() else {
            self.warnings.report(SolverWarning::NotReady);
            return;
        };
        let weight = input.weight.clamp(0.0, 1.0);
        if weight.is_nan() || weight <= 0.0 {
            return;
        }
        let dt = if dt < 0.0 {
            self.warnings.report(SolverWarning::NegativeDeltaTime(dt));
            0.0
        } else if dt.is_finite() {
            dt
        } else {
            0.0
        };

        if self.config.solver.fix_transforms {
            rig.restore_rest_pose(skeleton);
        }
        if let Some(hook) = hooks.pre_read.as_mut() {
            hook(&mut *skeleton);
        }
        for (slot, _) in &rig.rest_pose {
            if !skeleton.contains(*slot) {
                self.warnings.report(SolverWarning::BoneRemoved(*slot));
            }
        }
        rig.read(skeleton);

        let warnings = &mut self.warnings;
        let [head, pelvis, left_hand, right_hand, left_foot, right_foot] =
            input.targets().map(|(slot, target)| sanitize(warnings, slot, target));

        let mut plant_feet = self.config.solver.plant_feet;
        if plant_feet && pelvis.is_some_and(|t| t.position_weight > 0.0) {
            self.warnings.report(SolverWarning::PelvisTargetWithPlantFeet);
            plant_feet = false;
        }

        rig.spine.set_input(head, pelvis, input.chest_goal);
        let goals: [LimbGoals; 2] = input.arms;
        for (arm, target) in rig.arms.iter_mut().zip([left_hand, right_hand]) {
            arm.set_input(target, goals[arm.side().index()]);
        }
        for (leg, target) in rig.legs.iter_mut().zip([left_foot, right_foot]) {
            leg.set_input(target, input.legs[leg.side().index()]);
        }

        let params = FrameParams {
            weight,
            locomotion_weight: input.locomotion_weight.clamp(0.0, 1.0),
            plant_feet,
            dt,
        };
        rig.solve_frame(&self.config, self.probe.as_deref(), params, &mut hooks);
        rig.write(skeleton, weight);

        if let Some(hook) = hooks.post_solve.as_mut() {
            hook(&*skeleton);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use stride_core::diagnostics::CollectingSink;
    use stride_test_utils::{HumanoidBuilder, humanoid};

    const DT: f32 = 1.0 / 60.0;

    fn ready() -> FullBodyIk {
        let mut ik = FullBodyIk::with_defaults();
        ik.initiate(&humanoid()).unwrap();
        ik
    }

    #[test]
    fn solver_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FullBodyIk>();
    }

    #[test]
    fn missing_bone_keeps_solver_not_ready() {
        let mut skel = humanoid();
        skel.remove(BoneSlot::LeftCalf);
        let mut ik = FullBodyIk::with_defaults();
        let err = ik.initiate(&skel).unwrap_err();
        assert_eq!(err, ValidationError::MissingBone(BoneSlot::LeftCalf));
        assert!(!ik.is_ready());
    }

    #[test]
    fn degenerate_segment_is_rejected() {
        let mut skel = humanoid();
        let hand = *skel.get(BoneSlot::RightForearm).unwrap();
        skel.set(BoneSlot::RightHand, hand);
        let err = FullBodyIk::with_defaults().initiate(&skel).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DegenerateSegment { from: BoneSlot::RightForearm, to: BoneSlot::RightHand }
        );
    }

    #[test]
    fn non_finite_pose_is_rejected() {
        let mut skel = humanoid();
        skel.set(BoneSlot::Neck, BonePose::at(Vector3::new(f32::NAN, 0.0, 1.5)));
        let err = FullBodyIk::with_defaults().initiate(&skel).unwrap_err();
        assert_eq!(err, ValidationError::NonFinitePose(BoneSlot::Neck));
    }

    #[test]
    fn solve_before_initiate_leaves_skeleton_untouched() {
        let sink = CollectingSink::new();
        let mut ik = FullBodyIk::with_defaults().with_diagnostics(sink.clone());
        let mut skel = humanoid();
        let input = SolveInput::new().with_head(Target::position(Vector3::new(0.3, 0.0, 1.5)));
        ik.solve(&mut skel, &input, DT, SolveHooks::none());
        ik.solve(&mut skel, &input, DT, SolveHooks::none());
        assert_eq!(skel, humanoid());
        assert_eq!(sink.warnings(), vec![SolverWarning::NotReady]);
    }

    #[test]
    fn guessed_thumb_axis_is_reported_per_side() {
        let sink = CollectingSink::new();
        let mut ik = FullBodyIk::with_defaults().with_diagnostics(sink.clone());
        ik.initiate(&humanoid()).unwrap();
        assert_eq!(
            sink.warnings(),
            vec![
                SolverWarning::GuessedPalmToThumbAxis(Side::Left),
                SolverWarning::GuessedPalmToThumbAxis(Side::Right),
            ]
        );
    }

    #[test]
    fn negative_dt_is_reported_once_and_clamped() {
        let sink = CollectingSink::new();
        let mut ik = FullBodyIk::with_defaults().with_diagnostics(sink.clone());
        ik.initiate(&humanoid()).unwrap();
        let mut skel = humanoid();
        for _ in 0..3 {
            ik.solve(&mut skel, &SolveInput::new(), -0.1, SolveHooks::none());
        }
        let count = sink
            .warnings()
            .iter()
            .filter(|w| matches!(w, SolverWarning::NegativeDeltaTime(_)))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn non_finite_target_is_ignored() {
        let sink = CollectingSink::new();
        let mut ik = FullBodyIk::with_defaults().with_diagnostics(sink.clone());
        ik.initiate(&humanoid()).unwrap();
        let mut skel = humanoid();
        let input = SolveInput::new().with_hand(Side::Left, Target::position(Vector3::new(f32::NAN, 0.0, 0.0)));
        ik.solve(&mut skel, &input, DT, SolveHooks::none());
        assert!(sink.warnings().contains(&SolverWarning::NonFiniteTarget(BoneSlot::LeftHand)));
        assert!(skel.iter().all(|(_, pose)| pose.is_finite()));
    }

    #[test]
    fn pelvis_target_disables_plant_feet_with_warning() {
        let sink = CollectingSink::new();
        let mut ik = FullBodyIk::with_defaults().with_diagnostics(sink.clone());
        ik.initiate(&humanoid()).unwrap();
        let mut skel = humanoid();
        let input = SolveInput::new().with_pelvis(Target::position(Vector3::new(0.0, 0.0, 0.95)));
        ik.solve(&mut skel, &input, DT, SolveHooks::none());
        assert!(sink.warnings().contains(&SolverWarning::PelvisTargetWithPlantFeet));
    }

    #[test]
    fn removed_bone_is_reported() {
        let sink = CollectingSink::new();
        let mut ik = FullBodyIk::with_defaults().with_diagnostics(sink.clone());
        ik.initiate(&humanoid()).unwrap();
        let mut skel = humanoid();
        skel.remove(BoneSlot::LeftToes);
        ik.solve(&mut skel, &SolveInput::new(), DT, SolveHooks::none());
        assert!(sink.warnings().contains(&SolverWarning::BoneRemoved(BoneSlot::LeftToes)));
        assert!(!skel.contains(BoneSlot::LeftToes));
    }

    #[test]
    fn hooks_run_in_order() {
        let mut ik = ready();
        let mut skel = humanoid();
        let mut calls = Vec::new();
        {
            let log = std::cell::RefCell::new(&mut calls);
            let mut pre = |_: &mut Skeleton| log.borrow_mut().push("pre_read");
            let mut post = |_: &Skeleton| log.borrow_mut().push("post_solve");
            let hooks = SolveHooks::none().with_pre_read(&mut pre).with_post_solve(&mut post);
            ik.solve(&mut skel, &SolveInput::new(), DT, hooks);
        }
        assert_eq!(calls, vec!["pre_read", "post_solve"]);
    }

    #[test]
    fn support_leg_is_the_less_extended_leg() {
        let mut skel = humanoid();
        let foot = skel.get_mut(BoneSlot::RightToes).unwrap();
        foot.position.z += 0.05;
        let mut ik = FullBodyIk::with_defaults();
        ik.initiate(&skel).unwrap();
        assert_eq!(ik.support_leg(), Some(Side::Right));
    }

    #[test]
    fn set_config_rejects_invalid_tuning() {
        let mut ik = ready();
        let mut config = IkConfig::default();
        config.solver.fabrik_iterations = 0;
        assert!(ik.set_config(config).is_err());
        assert_eq!(ik.config().solver.fabrik_iterations, 2);
    }

    #[test]
    fn reset_replants_footsteps_at_the_feet() {
        let mut ik = ready();
        let skel = HumanoidBuilder::new().at(Vector3::new(0.5, 0.0, 0.0)).build();
        ik.reset(&skel);
        let toes = skel.get(BoneSlot::LeftToes).unwrap().position;
        assert_relative_eq!(*ik.footsteps().unwrap()[0].position(), toes);
    }
}

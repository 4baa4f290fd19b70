//! Procedural footstep planner.
//!
//! Each frame the planner predicts where the center of mass is heading,
//! decides whether one planted foot should step toward the prediction and
//! advances any step in flight. It never touches bones: the result is a set
//! of per-foot poses and lift offsets that the orchestrator blends into the
//! legs.

use nalgebra::{UnitQuaternion, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use stride_core::config::LocomotionConfig;
use stride_core::traits::EnvironmentProbe;
use stride_core::types::{BonePose, Side};

use crate::footstep::Footstep;
use crate::math::{
    flatten, lerp, line_sphere_collision, look_rotation, point_to_plane, safe_normalize,
};

/// Center-of-mass weights for pelvis, head and each hand.
const PELVIS_MASS: f32 = 1.0;
const HEAD_MASS: f32 = 1.0;
const HAND_MASS: f32 = 0.2;

/// Progress every stepping foot must reach before another step may start.
const STEP_GATE: f32 = 0.8;

/// Rate at which a stepping foot chases its moving target.
const STEP_CHASE_SPEED: f32 = 10.0;

/// Left foot threshold scale. Breaks the tie when both feet qualify.
const LEFT_THRESHOLD_SCALE: f32 = 0.9;

/// How fast the step threshold shrinks with COM tilt, per degree.
const TILT_THRESHOLD_RATE: f32 = 0.015;

// ---------------------------------------------------------------------------
// Frame input / output
// ---------------------------------------------------------------------------

/// Leg measurements the planner needs, sampled after the spine solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegState {
    pub thigh: Vector3<f32>,
    /// Read position of the leg's last bone; fixes the height feet land at.
    pub foot_read_position: Vector3<f32>,
    pub length: f32,
}

/// Body state for one planning step.
pub struct LocomotionFrame<'a> {
    pub root: BonePose,
    pub pelvis: Vector3<f32>,
    pub head: Vector3<f32>,
    /// Indexed by [`Side::index`].
    pub hands: [Vector3<f32>; 2],
    pub face_direction: Vector3<f32>,
    /// Indexed by [`Side::index`].
    pub legs: [LegState; 2],
    pub support_leg: Option<Side>,
    pub probe: Option<&'a dyn EnvironmentProbe>,
    pub dt: f32,
}

/// Per-foot planner output, indexed by [`Side::index`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocomotionOutput {
    pub foot_positions: [Vector3<f32>; 2],
    pub foot_rotations: [UnitQuaternion<f32>; 2],
    /// Vertical lift of each foot.
    pub foot_offsets: [f32; 2],
    /// Vertical lift of each heel.
    pub heel_offsets: [f32; 2],
    /// Feet whose step finished this frame.
    pub completed: [bool; 2],
}

// ---------------------------------------------------------------------------
// Locomotion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Locomotion {
    config: LocomotionConfig,
    footsteps: [Footstep; 2],
    rng: ChaCha8Rng,
    last_com: Option<Vector3<f32>>,
    center_of_mass: Vector3<f32>,
    velocity: Vector3<f32>,
}

impl Locomotion {
    /// Plant both feet at `feet` (indexed by [`Side::index`]).
    #[must_use]
    pub fn new(config: &LocomotionConfig, root: &BonePose, feet: &[BonePose; 2]) -> Self {
        let footsteps = [Side::Left, Side::Right].map(|side| {
            let foot = &feet[side.index()];
            Footstep::new(
                &root.rotation,
                &foot.position,
                &foot.rotation,
                Self::lateral_offset(config, side),
            )
        });
        Self {
            config: config.clone(),
            footsteps,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            last_com: None,
            center_of_mass: root.position,
            velocity: Vector3::zeros(),
        }
    }

    fn lateral_offset(config: &LocomotionConfig, side: Side) -> Vector3<f32> {
        Vector3::y() * (config.foot_distance * 0.5 * side.sign())
    }

    /// Swap tuning. Footstep state and the RNG stream are kept.
    pub fn configure(&mut self, config: &LocomotionConfig) {
        self.config = config.clone();
        for side in [Side::Left, Side::Right] {
            self.footsteps[side.index()]
                .set_character_space_offset(Self::lateral_offset(config, side));
        }
    }

    /// Re-plant both feet and forget motion history.
    pub fn reset(&mut self, root: &BonePose, feet: &[BonePose; 2]) {
        for (footstep, foot) in self.footsteps.iter_mut().zip(feet) {
            footstep.reset(&root.rotation, &foot.position, &foot.rotation);
        }
        self.rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.last_com = None;
        self.velocity = Vector3::zeros();
        self.center_of_mass = root.position;
    }

    /// Carry footsteps and motion history with a moving platform.
    pub fn add_platform_motion(
        &mut self,
        delta_position: &Vector3<f32>,
        delta_rotation: &UnitQuaternion<f32>,
        pivot: &Vector3<f32>,
    ) {
        for footstep in &mut self.footsteps {
            footstep.rotate_about(delta_rotation, pivot);
            footstep.translate(delta_position);
        }
        if let Some(com) = self.last_com.as_mut() {
            *com = pivot + delta_rotation * (*com - pivot) + delta_position;
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Weighted body center from the last solve.
    #[must_use]
    pub const fn center_of_mass(&self) -> &Vector3<f32> {
        &self.center_of_mass
    }

    /// Clamped COM velocity from the last solve, before scaling.
    #[must_use]
    pub const fn velocity(&self) -> &Vector3<f32> {
        &self.velocity
    }

    #[must_use]
    pub const fn footsteps(&self) -> &[Footstep; 2] {
        &self.footsteps
    }

    #[must_use]
    pub const fn footstep(&self, side: Side) -> &Footstep {
        &self.footsteps[side.index()]
    }

    #[must_use]
    pub const fn config(&self) -> &LocomotionConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Solve
    // -----------------------------------------------------------------------

    pub fn solve(&mut self, frame: &LocomotionFrame<'_>) -> LocomotionOutput {
        let up = frame.root.rotation * Vector3::z();
        let root_position = frame.root.position;
        let dt = frame.dt;

        // Center of mass and its prediction.
        let total = PELVIS_MASS + HEAD_MASS + 2.0 * HAND_MASS;
        let offset = Vector3::from(self.config.offset);
        let com = (frame.pelvis * PELVIS_MASS
            + frame.head * HEAD_MASS
            + (frame.hands[0] + frame.hands[1]) * HAND_MASS)
            / total
            + frame.root.rotation * offset;
        self.center_of_mass = com;

        self.velocity = match self.last_com {
            Some(last) if dt > 0.0 => ((com - last) / dt).cap_magnitude(self.config.max_velocity),
            _ => Vector3::zeros(),
        };
        self.last_com = Some(com);
        let predicted = com + self.velocity * self.config.velocity_factor;

        let com_ground = point_to_plane(&predicted, &root_position, &up);
        let pelvis_ground = point_to_plane(&frame.pelvis, &root_position, &up);
        let center_of_pressure =
            (self.footsteps[0].position() + self.footsteps[1].position()) * 0.5;
        let com_angle = (predicted - center_of_pressure).angle(&up).to_degrees()
            * self.config.com_angle_mlp;

        let facing = flatten(&frame.face_direction, &up);
        let facing = if safe_normalize(&facing).is_some() {
            look_rotation(&facing, &up)
        } else {
            frame.root.rotation
        };

        for side in [Side::Left, Side::Right] {
            let i = side.index();
            self.footsteps[i].set_support_leg(frame.support_leg == Some(side));
        }

        // Keep stepping feet chasing the prediction, relax planted ones.
        let min_angle = self.config.relax_leg_twist_min_angle.to_radians();
        let relax_speed = self.config.relax_leg_twist_speed.to_radians();
        for i in 0..2 {
            let candidate = com_ground + facing * self.footsteps[i].character_space_offset();
            if self.footsteps[i].is_stepping() {
                let from = *self.footsteps[i].step_from();
                if !self.step_blocked(frame.probe, &from, &candidate, &root_position, &up) {
                    self.footsteps[i].update_stepping(&candidate, &facing, STEP_CHASE_SPEED, dt);
                }
            } else {
                let from = *self.footsteps[i].step_from();
                let to = *self.footsteps[i].step_to();
                if !self.step_blocked(frame.probe, &from, &to, &root_position, &up) {
                    self.footsteps[i].update_standing(&facing, min_angle, relax_speed, dt);
                }
            }
        }

        if self.can_step() {
            let mut best: Option<(usize, f32, Vector3<f32>)> = None;
            for side in [Side::Left, Side::Right] {
                let i = side.index();
                let footstep = &self.footsteps[i];
                if footstep.is_stepping() {
                    continue;
                }
                let leg = &frame.legs[i];
                let length_step = (footstep.position() - leg.thigh).norm()
                    >= leg.length * self.config.max_leg_stretch;
                let base = if length_step { pelvis_ground } else { com_ground };
                let candidate = base + facing * footstep.character_space_offset();

                let other = &self.footsteps[side.opposite().index()];
                let other_position = if other.is_stepping() {
                    other.step_to()
                } else {
                    other.position()
                };
                let collision = line_sphere_collision(
                    footstep.position(),
                    &candidate,
                    other_position,
                    self.config.foot_distance * 0.5,
                );

                let mut threshold = lerp(
                    self.config.step_threshold,
                    self.config.step_threshold * 0.1,
                    com_angle * TILT_THRESHOLD_RATE,
                );
                if length_step {
                    threshold *= 0.5;
                }
                if side == Side::Left {
                    threshold *= LEFT_THRESHOLD_SCALE;
                }

                let distance = (footstep.position() - candidate).norm();
                let turned = facing.angle_to(footstep.step_to_root_rotation())
                    > self.config.angle_threshold.to_radians();
                let wants_step = (!collision && distance > threshold) || length_step || turned;
                if !wants_step
                    || self.step_blocked(
                        frame.probe,
                        footstep.position(),
                        &candidate,
                        &root_position,
                        &up,
                    )
                {
                    continue;
                }
                if best.is_none_or(|(_, d, _)| distance > d) {
                    best = Some((i, distance, candidate));
                }
            }

            if let Some((i, _, candidate)) = best {
                // Refused steps leave the speed stream untouched.
                if self.footsteps[i].start_step(&candidate, &facing, self.config.step_threshold) {
                    let speed = self.config.step_speed;
                    let spread = speed * (1.0 + self.config.step_speed_spread);
                    self.footsteps[i].step_speed = self.rng.gen_range(speed..=spread);
                }
            }
        }

        let mut completed = [false; 2];
        for (done, footstep) in completed.iter_mut().zip(&mut self.footsteps) {
            *done = footstep.update(self.config.stepping_easing, dt);
        }

        let mut output = LocomotionOutput {
            foot_positions: [Vector3::zeros(); 2],
            foot_rotations: [UnitQuaternion::identity(); 2],
            foot_offsets: [0.0; 2],
            heel_offsets: [0.0; 2],
            completed,
        };
        for (i, footstep) in self.footsteps.iter().enumerate() {
            output.foot_positions[i] =
                point_to_plane(footstep.position(), &frame.legs[i].foot_read_position, &up);
            output.foot_rotations[i] = *footstep.rotation();
            output.foot_offsets[i] = self.config.step_height.evaluate(footstep.progress());
            output.heel_offsets[i] = self.config.heel_height.evaluate(footstep.progress());
        }
        output
    }

    /// A new step may start only once every foot in flight is nearly down.
    fn can_step(&self) -> bool {
        self.footsteps
            .iter()
            .all(|f| !f.is_stepping() || f.progress() >= STEP_GATE)
    }

    /// Sweep at probe height from `from` toward `to`, horizontally. A
    /// degenerate path degrades to an overlap query at `from`.
    fn step_blocked(
        &self,
        probe: Option<&dyn EnvironmentProbe>,
        from: &Vector3<f32>,
        to: &Vector3<f32>,
        root_position: &Vector3<f32>,
        up: &Vector3<f32>,
    ) -> bool {
        let Some(probe) = probe else {
            return false;
        };
        let radius = self.config.probe_radius;
        let origin = point_to_plane(from, root_position, up)
            + up * (self.config.probe_height + radius);
        let direction = flatten(&(to - origin), up);
        probe.blocked(&origin, &(origin + direction), radius)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

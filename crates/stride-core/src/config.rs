use serde::{Deserialize, Serialize};

use crate::curve::{Curve, Easing};
use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_true() -> bool {
    true
}
const fn default_one() -> f32 {
    1.0
}
const fn default_fabrik_iterations() -> u32 {
    2
}
const fn default_min_head_height() -> f32 {
    0.8
}
const fn default_body_pos_stiffness() -> f32 {
    0.55
}
const fn default_body_rot_stiffness() -> f32 {
    0.1
}
const fn default_neck_stiffness() -> f32 {
    0.2
}
const fn default_chest_clamp_weight() -> f32 {
    0.5
}
const fn default_head_clamp_weight() -> f32 {
    0.6
}
const fn default_crouch_back() -> f32 {
    0.5
}
const fn default_maintain_pelvis() -> f32 {
    0.2
}
const fn default_max_root_angle() -> f32 {
    25.0
}
const fn default_yaw_offset() -> f32 {
    45.0
}
const fn default_yaw_range() -> f32 {
    45.0
}
const fn default_yaw_damper_weight() -> f32 {
    0.7
}
const fn default_pitch_offset() -> f32 {
    30.0
}
const fn default_pitch_range() -> f32 {
    45.0
}
const fn default_half() -> f32 {
    0.5
}
const fn default_foot_distance() -> f32 {
    0.3
}
const fn default_step_threshold() -> f32 {
    0.4
}
const fn default_angle_threshold() -> f32 {
    60.0
}
const fn default_max_velocity() -> f32 {
    0.4
}
const fn default_velocity_factor() -> f32 {
    0.4
}
const fn default_root_speed() -> f32 {
    20.0
}
const fn default_step_speed() -> f32 {
    3.0
}
const fn default_relax_twist_min_angle() -> f32 {
    20.0
}
const fn default_relax_twist_speed() -> f32 {
    400.0
}
const fn default_probe_radius() -> f32 {
    0.2
}
const fn default_probe_height() -> f32 {
    0.5
}
fn default_step_height() -> Curve {
    Curve::bump(0.1)
}
fn default_heel_height() -> Curve {
    Curve::bump(0.1)
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn check_unit(field: &str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must be in [0, 1]")))
    }
}

fn check_positive(field: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must be > 0")))
    }
}

fn check_non_negative(field: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must be >= 0")))
    }
}

fn check_angle(field: &str, value: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("{value} must be in [0, {max}] degrees"),
        ))
    }
}

// ---------------------------------------------------------------------------
// IkConfig
// ---------------------------------------------------------------------------

/// Complete tuning set for one full-body solver instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IkConfig {
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub spine: SpineConfig,
    #[serde(default)]
    pub arm: ArmConfig,
    #[serde(default)]
    pub leg: LegConfig,
    #[serde(default)]
    pub locomotion: LocomotionConfig,
}

impl IkConfig {
    /// Validate every section. Returns the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.solver.validate()?;
        self.spine.validate()?;
        self.arm.validate()?;
        self.leg.validate()?;
        self.locomotion.validate()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

// ---------------------------------------------------------------------------
// SolverConfig
// ---------------------------------------------------------------------------

/// Orchestrator-level switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Restore the initiation pose (relative to root) before each read, so
    /// output never feeds back into the next frame on an un-animated rig.
    #[serde(default = "default_true")]
    pub fix_transforms: bool,

    /// Keep feet planted while the pelvis and head move.
    #[serde(default = "default_true")]
    pub plant_feet: bool,

    /// Lift the pelvis out of ground the probe reports under it.
    #[serde(default = "default_true")]
    pub pelvis_ground_correction: bool,

    /// FABRIK iterations per spine pass (default: 2).
    #[serde(default = "default_fabrik_iterations")]
    pub fabrik_iterations: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            fix_transforms: true,
            plant_feet: true,
            pelvis_ground_correction: true,
            fabrik_iterations: default_fabrik_iterations(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fabrik_iterations == 0 {
            return Err(ConfigError::invalid(
                "solver.fabrik_iterations",
                "must be >= 1",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SpineConfig
// ---------------------------------------------------------------------------

/// Spine and head solve tuning. Weights are in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpineConfig {
    /// Minimum head height above the root, in meters.
    #[serde(default = "default_min_head_height")]
    pub min_head_height: f32,

    /// How strongly the pelvis follows head translation.
    #[serde(default = "default_body_pos_stiffness")]
    pub body_pos_stiffness: f32,

    /// How strongly the pelvis follows head rotation.
    #[serde(default = "default_body_rot_stiffness")]
    pub body_rot_stiffness: f32,

    /// Share of the head rotation taken by the chest rather than the neck.
    #[serde(default = "default_neck_stiffness")]
    pub neck_stiffness: f32,

    /// Chest lean driven by hand offsets from the head.
    #[serde(default = "default_one")]
    pub rotate_chest_by_hands: f32,

    /// Clamp on chest rotation relative to the pelvis.
    #[serde(default = "default_chest_clamp_weight")]
    pub chest_clamp_weight: f32,

    /// Clamp on head rotation relative to the chest.
    #[serde(default = "default_head_clamp_weight")]
    pub head_clamp_weight: f32,

    /// Pelvis back-off when the head drops below its rest height.
    #[serde(default = "default_crouch_back")]
    pub move_body_back_when_crouching: f32,

    /// Pull toward the animated pelvis position.
    #[serde(default = "default_maintain_pelvis")]
    pub maintain_pelvis_position: f32,

    /// Head yaw beyond which the root turns to follow, in degrees.
    /// Values >= 180 disable root following.
    #[serde(default = "default_max_root_angle")]
    pub max_root_angle: f32,

    /// Spread the chest bend evenly instead of graduating it toward the chest.
    #[serde(default)]
    pub uniform_chest_bend: bool,
}

impl Default for SpineConfig {
    fn default() -> Self {
        Self {
            min_head_height: default_min_head_height(),
            body_pos_stiffness: default_body_pos_stiffness(),
            body_rot_stiffness: default_body_rot_stiffness(),
            neck_stiffness: default_neck_stiffness(),
            rotate_chest_by_hands: default_one(),
            chest_clamp_weight: default_chest_clamp_weight(),
            head_clamp_weight: default_head_clamp_weight(),
            move_body_back_when_crouching: default_crouch_back(),
            maintain_pelvis_position: default_maintain_pelvis(),
            max_root_angle: default_max_root_angle(),
            uniform_chest_bend: false,
        }
    }
}

impl SpineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("spine.min_head_height", self.min_head_height)?;
        check_unit("spine.body_pos_stiffness", self.body_pos_stiffness)?;
        check_unit("spine.body_rot_stiffness", self.body_rot_stiffness)?;
        check_unit("spine.neck_stiffness", self.neck_stiffness)?;
        check_unit("spine.rotate_chest_by_hands", self.rotate_chest_by_hands)?;
        check_unit("spine.chest_clamp_weight", self.chest_clamp_weight)?;
        check_unit("spine.head_clamp_weight", self.head_clamp_weight)?;
        check_unit(
            "spine.move_body_back_when_crouching",
            self.move_body_back_when_crouching,
        )?;
        check_unit(
            "spine.maintain_pelvis_position",
            self.maintain_pelvis_position,
        )?;
        check_angle("spine.max_root_angle", self.max_root_angle, 180.0)
    }

    /// Root-follow limit in radians, `None` when disabled.
    #[must_use]
    pub fn max_root_angle_rad(&self) -> Option<f32> {
        (self.max_root_angle < 180.0).then(|| self.max_root_angle.to_radians())
    }
}

// ---------------------------------------------------------------------------
// ArmConfig
// ---------------------------------------------------------------------------

/// Shoulder heuristic selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShoulderRotationMode {
    /// Yaw/pitch decomposition with eased damping.
    #[default]
    YawPitch,
    /// Direct alignment to a blended target direction.
    FromTo,
}

/// Hand-local axes. Inferred from the skeleton when absent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HandAxesConfig {
    #[serde(default)]
    pub wrist_to_palm: Option<[f32; 3]>,
    #[serde(default)]
    pub palm_to_thumb: Option<[f32; 3]>,
}

/// Arm and shoulder tuning. Angles in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmConfig {
    #[serde(default)]
    pub shoulder_rotation_mode: ShoulderRotationMode,

    #[serde(default = "default_one")]
    pub shoulder_rotation_weight: f32,

    /// Shoulder roll when raising the arm.
    #[serde(default = "default_one")]
    pub shoulder_twist_weight: f32,

    /// Working yaw direction, measured from the side axis toward forward.
    #[serde(default = "default_yaw_offset")]
    pub shoulder_yaw_offset: f32,

    /// Damped yaw range either side of the working direction.
    #[serde(default = "default_yaw_range")]
    pub shoulder_yaw_range: f32,

    #[serde(default = "default_yaw_damper_weight")]
    pub shoulder_yaw_damper_weight: f32,

    /// Elevation bias added before pitch damping.
    #[serde(default = "default_pitch_offset")]
    pub shoulder_pitch_offset: f32,

    /// Damped pitch range either side of the offset elevation.
    #[serde(default = "default_pitch_range")]
    pub shoulder_pitch_range: f32,

    #[serde(default)]
    pub left_hand: HandAxesConfig,

    #[serde(default)]
    pub right_hand: HandAxesConfig,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            shoulder_rotation_mode: ShoulderRotationMode::default(),
            shoulder_rotation_weight: default_one(),
            shoulder_twist_weight: default_one(),
            shoulder_yaw_offset: default_yaw_offset(),
            shoulder_yaw_range: default_yaw_range(),
            shoulder_yaw_damper_weight: default_yaw_damper_weight(),
            shoulder_pitch_offset: default_pitch_offset(),
            shoulder_pitch_range: default_pitch_range(),
            left_hand: HandAxesConfig::default(),
            right_hand: HandAxesConfig::default(),
        }
    }
}

impl ArmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("arm.shoulder_rotation_weight", self.shoulder_rotation_weight)?;
        check_unit("arm.shoulder_twist_weight", self.shoulder_twist_weight)?;
        check_angle("arm.shoulder_yaw_offset", self.shoulder_yaw_offset, 90.0)?;
        check_angle("arm.shoulder_yaw_range", self.shoulder_yaw_range, 90.0)?;
        check_unit(
            "arm.shoulder_yaw_damper_weight",
            self.shoulder_yaw_damper_weight,
        )?;
        check_angle("arm.shoulder_pitch_offset", self.shoulder_pitch_offset, 90.0)?;
        check_angle("arm.shoulder_pitch_range", self.shoulder_pitch_range, 90.0)?;
        if self.shoulder_yaw_range <= 0.0 || self.shoulder_pitch_range <= 0.0 {
            return Err(ConfigError::invalid(
                "arm.shoulder_yaw_range",
                "damper ranges must be > 0",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LegConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegConfig {
    /// Thigh twist blended toward the foot target rotation.
    #[serde(default = "default_half")]
    pub bend_to_target_weight: f32,
}

impl Default for LegConfig {
    fn default() -> Self {
        Self {
            bend_to_target_weight: default_half(),
        }
    }
}

impl LegConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("leg.bend_to_target_weight", self.bend_to_target_weight)
    }
}

// ---------------------------------------------------------------------------
// LocomotionConfig
// ---------------------------------------------------------------------------

/// Procedural stepping tuning. Distances in meters, angles in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocomotionConfig {
    /// Lateral distance between planted feet.
    #[serde(default = "default_foot_distance")]
    pub foot_distance: f32,

    /// Predicted-COM distance that triggers a step.
    #[serde(default = "default_step_threshold")]
    pub step_threshold: f32,

    /// Facing drift that triggers a step.
    #[serde(default = "default_angle_threshold")]
    pub angle_threshold: f32,

    /// Shrinks the step threshold as the body tilts.
    #[serde(default = "default_one")]
    pub com_angle_mlp: f32,

    /// Clamp on predicted COM velocity, m/s.
    #[serde(default = "default_max_velocity")]
    pub max_velocity: f32,

    /// Seconds of velocity added to the COM prediction.
    #[serde(default = "default_velocity_factor")]
    pub velocity_factor: f32,

    /// Thigh-to-foot distance, as a fraction of leg length, that forces a step.
    #[serde(default = "default_one")]
    pub max_leg_stretch: f32,

    /// Root nudge speed toward the feet midpoint.
    #[serde(default = "default_root_speed")]
    pub root_speed: f32,

    /// Base step progress per second.
    #[serde(default = "default_step_speed")]
    pub step_speed: f32,

    /// Random step speed spread: speeds are drawn from
    /// `[step_speed, step_speed * (1 + step_speed_spread)]`.
    #[serde(default = "default_half")]
    pub step_speed_spread: f32,

    /// Misalignment below which planted feet do not relax.
    #[serde(default = "default_relax_twist_min_angle")]
    pub relax_leg_twist_min_angle: f32,

    /// Planted foot relax speed, degrees per second.
    #[serde(default = "default_relax_twist_speed")]
    pub relax_leg_twist_speed: f32,

    #[serde(default)]
    pub stepping_easing: Easing,

    /// Vertical foot lift over step progress.
    #[serde(default = "default_step_height")]
    pub step_height: Curve,

    /// Heel lift over step progress.
    #[serde(default = "default_heel_height")]
    pub heel_height: Curve,

    /// Root-relative COM offset.
    #[serde(default)]
    pub offset: [f32; 3],

    /// Sphere radius for step-blocking casts.
    #[serde(default = "default_probe_radius")]
    pub probe_radius: f32,

    /// Height above the feet at which step-blocking casts run.
    #[serde(default = "default_probe_height")]
    pub probe_height: f32,

    /// Step speed jitter seed.
    #[serde(default)]
    pub seed: u64,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            foot_distance: default_foot_distance(),
            step_threshold: default_step_threshold(),
            angle_threshold: default_angle_threshold(),
            com_angle_mlp: default_one(),
            max_velocity: default_max_velocity(),
            velocity_factor: default_velocity_factor(),
            max_leg_stretch: default_one(),
            root_speed: default_root_speed(),
            step_speed: default_step_speed(),
            step_speed_spread: default_half(),
            relax_leg_twist_min_angle: default_relax_twist_min_angle(),
            relax_leg_twist_speed: default_relax_twist_speed(),
            stepping_easing: Easing::default(),
            step_height: default_step_height(),
            heel_height: default_heel_height(),
            offset: [0.0; 3],
            probe_radius: default_probe_radius(),
            probe_height: default_probe_height(),
            seed: 0,
        }
    }
}

impl LocomotionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("locomotion.foot_distance", self.foot_distance)?;
        check_positive("locomotion.step_threshold", self.step_threshold)?;
        check_angle("locomotion.angle_threshold", self.angle_threshold, 180.0)?;
        check_non_negative("locomotion.com_angle_mlp", self.com_angle_mlp)?;
        check_non_negative("locomotion.max_velocity", self.max_velocity)?;
        check_non_negative("locomotion.velocity_factor", self.velocity_factor)?;
        check_positive("locomotion.max_leg_stretch", self.max_leg_stretch)?;
        check_non_negative("locomotion.root_speed", self.root_speed)?;
        check_positive("locomotion.step_speed", self.step_speed)?;
        check_non_negative("locomotion.step_speed_spread", self.step_speed_spread)?;
        check_angle(
            "locomotion.relax_leg_twist_min_angle",
            self.relax_leg_twist_min_angle,
            180.0,
        )?;
        check_non_negative(
            "locomotion.relax_leg_twist_speed",
            self.relax_leg_twist_speed,
        )?;
        check_non_negative("locomotion.probe_radius", self.probe_radius)?;
        check_non_negative("locomotion.probe_height", self.probe_height)?;
        if !self.offset.iter().all(|v| v.is_finite()) {
            return Err(ConfigError::invalid("locomotion.offset", "must be finite"));
        }
        if !self.step_height.is_sorted() {
            return Err(ConfigError::invalid(
                "locomotion.step_height",
                "keys must be finite and sorted by time",
            ));
        }
        if !self.heel_height.is_sorted() {
            return Err(ConfigError::invalid(
                "locomotion.heel_height",
                "keys must be finite and sorted by time",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

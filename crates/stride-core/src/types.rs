use std::fmt;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Number of canonical humanoid bone slots.
pub const BONE_SLOT_COUNT: usize = 22;

// ---------------------------------------------------------------------------
// BoneSlot
// ---------------------------------------------------------------------------

/// Canonical humanoid bone slot.
///
/// The discriminant doubles as the index into flat per-slot arrays such as
/// [`Skeleton`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoneSlot {
    Root = 0,
    Pelvis,
    Spine,
    Chest,
    Neck,
    Head,
    LeftShoulder,
    LeftUpperArm,
    LeftForearm,
    LeftHand,
    RightShoulder,
    RightUpperArm,
    RightForearm,
    RightHand,
    LeftThigh,
    LeftCalf,
    LeftFoot,
    LeftToes,
    RightThigh,
    RightCalf,
    RightFoot,
    RightToes,
}

impl BoneSlot {
    /// All slots in index order.
    pub const ALL: [Self; BONE_SLOT_COUNT] = [
        Self::Root,
        Self::Pelvis,
        Self::Spine,
        Self::Chest,
        Self::Neck,
        Self::Head,
        Self::LeftShoulder,
        Self::LeftUpperArm,
        Self::LeftForearm,
        Self::LeftHand,
        Self::RightShoulder,
        Self::RightUpperArm,
        Self::RightForearm,
        Self::RightHand,
        Self::LeftThigh,
        Self::LeftCalf,
        Self::LeftFoot,
        Self::LeftToes,
        Self::RightThigh,
        Self::RightCalf,
        Self::RightFoot,
        Self::RightToes,
    ];

    /// Index into flat per-slot arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether a skeleton may leave this slot empty.
    #[must_use]
    pub const fn is_optional(self) -> bool {
        matches!(
            self,
            Self::Chest
                | Self::Neck
                | Self::LeftShoulder
                | Self::RightShoulder
                | Self::LeftToes
                | Self::RightToes
        )
    }

    /// Snake-case name, matching the serde representation.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Pelvis => "pelvis",
            Self::Spine => "spine",
            Self::Chest => "chest",
            Self::Neck => "neck",
            Self::Head => "head",
            Self::LeftShoulder => "left_shoulder",
            Self::LeftUpperArm => "left_upper_arm",
            Self::LeftForearm => "left_forearm",
            Self::LeftHand => "left_hand",
            Self::RightShoulder => "right_shoulder",
            Self::RightUpperArm => "right_upper_arm",
            Self::RightForearm => "right_forearm",
            Self::RightHand => "right_hand",
            Self::LeftThigh => "left_thigh",
            Self::LeftCalf => "left_calf",
            Self::LeftFoot => "left_foot",
            Self::LeftToes => "left_toes",
            Self::RightThigh => "right_thigh",
            Self::RightCalf => "right_calf",
            Self::RightFoot => "right_foot",
            Self::RightToes => "right_toes",
        }
    }

    #[must_use]
    pub const fn shoulder(side: Side) -> Self {
        match side {
            Side::Left => Self::LeftShoulder,
            Side::Right => Self::RightShoulder,
        }
    }

    #[must_use]
    pub const fn upper_arm(side: Side) -> Self {
        match side {
            Side::Left => Self::LeftUpperArm,
            Side::Right => Self::RightUpperArm,
        }
    }

    #[must_use]
    pub const fn forearm(side: Side) -> Self {
        match side {
            Side::Left => Self::LeftForearm,
            Side::Right => Self::RightForearm,
        }
    }

    #[must_use]
    pub const fn hand(side: Side) -> Self {
        match side {
            Side::Left => Self::LeftHand,
            Side::Right => Self::RightHand,
        }
    }

    #[must_use]
    pub const fn thigh(side: Side) -> Self {
        match side {
            Side::Left => Self::LeftThigh,
            Side::Right => Self::RightThigh,
        }
    }

    #[must_use]
    pub const fn calf(side: Side) -> Self {
        match side {
            Side::Left => Self::LeftCalf,
            Side::Right => Self::RightCalf,
        }
    }

    #[must_use]
    pub const fn foot(side: Side) -> Self {
        match side {
            Side::Left => Self::LeftFoot,
            Side::Right => Self::RightFoot,
        }
    }

    #[must_use]
    pub const fn toes(side: Side) -> Self {
        match side {
            Side::Left => Self::LeftToes,
            Side::Right => Self::RightToes,
        }
    }
}

impl fmt::Display for BoneSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Body side of a limb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Self; 2] = [Self::Left, Self::Right];

    /// Index into two-element per-side arrays (left = 0).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// `+1.0` for left, `-1.0` for right. Multiplies mirrored angles.
    #[must_use]
    pub const fn sign(self) -> f32 {
        match self {
            Self::Left => 1.0,
            Self::Right => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
        }
    }
}

// ---------------------------------------------------------------------------
// BonePose
// ---------------------------------------------------------------------------

/// World-space position and rotation of a bone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BonePose {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl BonePose {
    #[must_use]
    pub const fn new(position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self { position, rotation }
    }

    /// Pose at `position` with identity rotation.
    #[must_use]
    pub fn at(position: Vector3<f32>) -> Self {
        Self::new(position, UnitQuaternion::identity())
    }

    #[must_use]
    pub fn identity() -> Self {
        Self::at(Vector3::zeros())
    }

    /// True when every component is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.rotation.coords.iter().all(|v| v.is_finite())
    }
}

impl Default for BonePose {
    fn default() -> Self {
        Self::identity()
    }
}

// ---------------------------------------------------------------------------
// Skeleton
// ---------------------------------------------------------------------------

/// Flat, slot-indexed set of world bone poses.
///
/// This is both the input the solver reads and the output it writes back.
/// Optional slots may be left empty; required slots must be filled before
/// initiation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    poses: [Option<BonePose>; BONE_SLOT_COUNT],
}

impl Skeleton {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, slot: BoneSlot, pose: BonePose) -> Self {
        self.set(slot, pose);
        self
    }

    pub fn set(&mut self, slot: BoneSlot, pose: BonePose) {
        self.poses[slot.index()] = Some(pose);
    }

    pub fn remove(&mut self, slot: BoneSlot) -> Option<BonePose> {
        self.poses[slot.index()].take()
    }

    #[must_use]
    pub fn get(&self, slot: BoneSlot) -> Option<&BonePose> {
        self.poses[slot.index()].as_ref()
    }

    pub fn get_mut(&mut self, slot: BoneSlot) -> Option<&mut BonePose> {
        self.poses[slot.index()].as_mut()
    }

    #[must_use]
    pub fn contains(&self, slot: BoneSlot) -> bool {
        self.poses[slot.index()].is_some()
    }

    /// Iterate over filled slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (BoneSlot, &BonePose)> {
        BoneSlot::ALL
            .iter()
            .zip(self.poses.iter())
            .filter_map(|(slot, pose)| pose.as_ref().map(|p| (*slot, p)))
    }

    /// Translate every filled slot by `delta`.
    pub fn translate(&mut self, delta: &Vector3<f32>) {
        for pose in self.poses.iter_mut().flatten() {
            pose.position += delta;
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// A tracked end-effector pose with independent position and rotation weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    /// Position weight in [0, 1].
    pub position_weight: f32,
    /// Rotation weight in [0, 1].
    pub rotation_weight: f32,
}

impl Target {
    /// Fully weighted position and rotation target.
    #[must_use]
    pub const fn pose(position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self {
            position,
            rotation,
            position_weight: 1.0,
            rotation_weight: 1.0,
        }
    }

    /// Position-only target; rotation is left to the solver.
    #[must_use]
    pub fn position(position: Vector3<f32>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
            position_weight: 1.0,
            rotation_weight: 0.0,
        }
    }

    #[must_use]
    pub const fn with_weights(mut self, position_weight: f32, rotation_weight: f32) -> Self {
        self.position_weight = position_weight;
        self.rotation_weight = rotation_weight;
        self
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.rotation.coords.iter().all(|v| v.is_finite())
            && self.position_weight.is_finite()
            && self.rotation_weight.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_indices_match_all_order() {
        for (i, slot) in BoneSlot::ALL.iter().enumerate() {
            assert_eq!(slot.index(), i);
        }
    }

    #[test]
    fn optional_slots() {
        let optional: Vec<BoneSlot> = BoneSlot::ALL
            .iter()
            .copied()
            .filter(|s| s.is_optional())
            .collect();
        assert_eq!(optional.len(), 6);
        assert!(!BoneSlot::Head.is_optional());
        assert!(BoneSlot::RightToes.is_optional());
    }

    #[test]
    fn side_slot_helpers_mirror() {
        assert_eq!(BoneSlot::hand(Side::Left), BoneSlot::LeftHand);
        assert_eq!(BoneSlot::hand(Side::Right), BoneSlot::RightHand);
        assert_eq!(BoneSlot::toes(Side::Right), BoneSlot::RightToes);
        assert_eq!(Side::Left.opposite(), Side::Right);
        assert!((Side::Right.sign() + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn skeleton_set_get_remove() {
        let mut skeleton = Skeleton::new();
        assert!(!skeleton.contains(BoneSlot::Head));

        skeleton.set(BoneSlot::Head, BonePose::at(Vector3::new(0.0, 0.0, 1.7)));
        assert!(skeleton.contains(BoneSlot::Head));
        assert_eq!(skeleton.iter().count(), 1);

        let removed = skeleton.remove(BoneSlot::Head).unwrap();
        assert!((removed.position.z - 1.7).abs() < f32::EPSILON);
        assert!(skeleton.get(BoneSlot::Head).is_none());
    }

    #[test]
    fn skeleton_translate_moves_filled_slots() {
        let mut skeleton = Skeleton::new()
            .with(BoneSlot::Root, BonePose::identity())
            .with(BoneSlot::Head, BonePose::at(Vector3::new(0.0, 0.0, 1.7)));
        skeleton.translate(&Vector3::new(1.0, 0.0, 0.0));
        assert!((skeleton.get(BoneSlot::Root).unwrap().position.x - 1.0).abs() < f32::EPSILON);
        assert!((skeleton.get(BoneSlot::Head).unwrap().position.x - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn bone_pose_finite_check() {
        assert!(BonePose::identity().is_finite());
        let bad = BonePose::at(Vector3::new(f32::NAN, 0.0, 0.0));
        assert!(!bad.is_finite());
    }

    #[test]
    fn target_constructors() {
        let t = Target::position(Vector3::new(1.0, 2.0, 3.0));
        assert!((t.position_weight - 1.0).abs() < f32::EPSILON);
        assert!(t.rotation_weight.abs() < f32::EPSILON);

        let t = Target::pose(Vector3::zeros(), UnitQuaternion::identity()).with_weights(0.5, 0.25);
        assert!((t.position_weight - 0.5).abs() < f32::EPSILON);
        assert!((t.rotation_weight - 0.25).abs() < f32::EPSILON);
        assert!(t.is_finite());
    }
}

//! Real-time full-body inverse kinematics for humanoid skeletons.
//!
//! Drives a humanoid from a handful of effector targets (head, pelvis, hands,
//! feet) and plans footsteps procedurally so the character keeps its balance
//! while the upper body is tracked.
//!
//! # Architecture
//!
//! ```text
//! Skeleton ──► read ──► Spine ──► Locomotion ──► Legs ──► Arms ──► write ──► Skeleton
//!                        ▲            │
//!                        └── SolveInput (targets, goals, weights)
//! ```
//!
//! [`FullBodyIk`] owns one [`Spine`], two [`Arm`]s, two [`Leg`]s and a
//! [`Locomotion`] planner. Each part implements [`BodyPart`] and works on its
//! own [`VirtualBone`] array; the orchestrator hands sibling state between
//! parts through per-solve context structs.

pub mod arm;
pub mod bone;
pub mod footstep;
pub mod input;
pub mod leg;
pub mod locomotion;
pub mod math;
pub mod part;
pub mod solver;
pub mod spine;

pub use arm::{Arm, ArmContext};
pub use bone::VirtualBone;
pub use footstep::Footstep;
pub use input::{Goal, LimbGoals, SolveInput};
pub use leg::{Leg, LegReach};
pub use locomotion::{LegState, Locomotion, LocomotionFrame, LocomotionOutput};
pub use part::BodyPart;
pub use solver::{FullBodyIk, SolveHooks};
pub use spine::{Spine, SpineContext};

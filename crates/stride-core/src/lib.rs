// stride-core: Bone slots, poses, errors, diagnostics and configuration for the stride IK solver.

pub mod config;
pub mod curve;
pub mod diagnostics;
pub mod error;
pub mod traits;
pub mod types;

pub use config::IkConfig;
pub use error::{ConfigError, StrideError, ValidationError};
pub use types::{BonePose, BoneSlot, Side, Skeleton, Target};

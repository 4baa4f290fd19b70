use thiserror::Error;

use crate::types::{BoneSlot, Side};

/// Top-level error type for stride.
#[derive(Debug, Error)]
pub enum StrideError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Skeleton validation errors raised at initiation.
///
/// Copy + static messages for cheap propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required bone: {0}")]
    MissingBone(BoneSlot),

    #[error("Degenerate segment: {from} and {to} share a position")]
    DegenerateSegment { from: BoneSlot, to: BoneSlot },

    #[error("Non-finite pose for bone {0}")]
    NonFinitePose(BoneSlot),

    #[error("Zero {axis} axis for {side} hand")]
    ZeroHandAxis { side: Side, axis: HandAxis },
}

/// Hand-local axis that may be supplied or inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandAxis {
    WristToPalm,
    PalmToThumb,
}

impl std::fmt::Display for HandAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WristToPalm => f.write_str("wrist-to-palm"),
            Self::PalmToThumb => f.write_str("palm-to-thumb"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_error_from_config_error() {
        let err = ConfigError::invalid("spine.chest_clamp_weight", "must be in [0, 1]");
        let stride_err: StrideError = err.into();
        assert!(matches!(stride_err, StrideError::Config(_)));
        assert!(stride_err.to_string().contains("chest_clamp_weight"));
    }

    #[test]
    fn stride_error_from_validation_error() {
        let err = ValidationError::MissingBone(BoneSlot::Head);
        let stride_err: StrideError = err.into();
        assert!(matches!(stride_err, StrideError::Validation(_)));
        assert!(stride_err.to_string().contains("head"));
    }

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::Io(_)));
    }

    #[test]
    fn validation_error_is_copy() {
        let err = ValidationError::NonFinitePose(BoneSlot::Pelvis);
        let err2 = err; // Copy
        assert_eq!(err, err2);
    }

    #[test]
    fn validation_error_display_messages() {
        assert_eq!(
            ValidationError::MissingBone(BoneSlot::LeftCalf).to_string(),
            "Missing required bone: left_calf"
        );
        assert_eq!(
            ValidationError::DegenerateSegment {
                from: BoneSlot::RightThigh,
                to: BoneSlot::RightCalf
            }
            .to_string(),
            "Degenerate segment: right_thigh and right_calf share a position"
        );
        assert_eq!(
            ValidationError::NonFinitePose(BoneSlot::Spine).to_string(),
            "Non-finite pose for bone spine"
        );
        assert_eq!(
            ValidationError::ZeroHandAxis {
                side: Side::Left,
                axis: HandAxis::PalmToThumb
            }
            .to_string(),
            "Zero palm-to-thumb axis for left hand"
        );
    }

    #[test]
    fn config_error_display_messages() {
        assert_eq!(
            ConfigError::InvalidValue {
                field: "locomotion.step_speed".into(),
                message: "must be > 0".into()
            }
            .to_string(),
            "Invalid value for locomotion.step_speed: must be > 0"
        );
    }
}

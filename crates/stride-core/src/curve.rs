//! Easing functions and keyed height curves used by footstep interpolation.
//!
//! [`Easing`] maps normalized progress to eased progress. [`Curve`] is a
//! piecewise profile over sorted `(time, value)` keys with zero slope at each
//! key, so a step's vertical offset lifts and lands without a velocity jump.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Easing
// ---------------------------------------------------------------------------

/// Parametric easing function on [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
    /// `6t^5 - 15t^4 + 10t^3`. Zero velocity and acceleration at both ends.
    InOutQuintic,
    InSine,
    OutSine,
    #[default]
    InOutSine,
}

impl Easing {
    /// Evaluate at `t`, clamped to [0, 1].
    #[must_use]
    pub fn ease(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::InQuad => t * t,
            Self::OutQuad => t * (2.0 - t),
            Self::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Self::InCubic => t * t * t,
            Self::OutCubic => {
                let u = t - 1.0;
                u * u * u + 1.0
            }
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    let u = 2.0 * t - 2.0;
                    0.5 * u * u * u + 1.0
                }
            }
            Self::InOutQuintic => t * t * t * (t * (6.0 * t - 15.0) + 10.0),
            Self::InSine => 1.0 - (t * PI * 0.5).cos(),
            Self::OutSine => (t * PI * 0.5).sin(),
            Self::InOutSine => -0.5 * ((PI * t).cos() - 1.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Curve
// ---------------------------------------------------------------------------

/// Keyed scalar profile over normalized time.
///
/// Keys are `[time, value]` pairs sorted by time. Between two keys the value
/// follows a smoothstep; outside the key range it holds the end values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Curve {
    keys: Vec<[f32; 2]>,
}

impl Curve {
    #[must_use]
    pub fn new(keys: Vec<[f32; 2]>) -> Self {
        Self { keys }
    }

    /// Single-peak profile: zero at 0 and 1, `peak` at 0.5.
    #[must_use]
    pub fn bump(peak: f32) -> Self {
        Self::new(vec![[0.0, 0.0], [0.5, peak], [1.0, 0.0]])
    }

    /// Constant zero.
    #[must_use]
    pub fn zero() -> Self {
        Self::new(vec![[0.0, 0.0], [1.0, 0.0]])
    }

    #[must_use]
    pub fn keys(&self) -> &[[f32; 2]] {
        &self.keys
    }

    /// True when key times are finite and strictly increasing.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.keys.iter().all(|k| k[0].is_finite() && k[1].is_finite())
            && self.keys.windows(2).all(|w| w[0][0] < w[1][0])
    }

    /// Sample the curve at `t`. An empty curve evaluates to zero.
    #[must_use]
    pub fn evaluate(&self, t: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return 0.0;
        };
        if t <= first[0] {
            return first[1];
        }
        if t >= last[0] {
            return last[1];
        }
        for w in self.keys.windows(2) {
            let (a, b) = (w[0], w[1]);
            if t <= b[0] {
                let span = b[0] - a[0];
                if span <= f32::EPSILON {
                    return b[1];
                }
                let s = (t - a[0]) / span;
                let s = s * s * (3.0 - 2.0 * s);
                return a[1] + (b[1] - a[1]) * s;
            }
        }
        last[1]
    }
}

impl Default for Curve {
    fn default() -> Self {
        Self::zero()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

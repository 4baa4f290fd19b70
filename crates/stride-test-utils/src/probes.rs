//! Mock environment probes.

use nalgebra::Vector3;
use stride_core::traits::EnvironmentProbe;

// ---------------------------------------------------------------------------
// AlwaysBlocked / NeverBlocked
// ---------------------------------------------------------------------------

/// Reports a hit at the start of every cast.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysBlocked;

impl EnvironmentProbe for AlwaysBlocked {
    fn cast(&self, _from: &Vector3<f32>, _to: &Vector3<f32>, _radius: f32) -> Option<f32> {
        Some(0.0)
    }
}

/// Empty world.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverBlocked;

impl EnvironmentProbe for NeverBlocked {
    fn cast(&self, _from: &Vector3<f32>, _to: &Vector3<f32>, _radius: f32) -> Option<f32> {
        None
    }
}

// ---------------------------------------------------------------------------
// WallProbe
// ---------------------------------------------------------------------------

/// Infinite wall at `x = self.x`, facing -X.
#[derive(Debug, Clone, Copy)]
pub struct WallProbe {
    pub x: f32,
}

impl EnvironmentProbe for WallProbe {
    fn cast(&self, from: &Vector3<f32>, to: &Vector3<f32>, radius: f32) -> Option<f32> {
        let dir = to - from;
        if dir.x <= f32::EPSILON {
            return None;
        }
        let t = (self.x - radius - from.x) / dir.x;
        (0.0..=1.0).contains(&t).then(|| t * dir.norm())
    }
}

// ---------------------------------------------------------------------------
// FloorProbe
// ---------------------------------------------------------------------------

/// Infinite floor at `z = self.height`.
#[derive(Debug, Clone, Copy)]
pub struct FloorProbe {
    pub height: f32,
}

impl EnvironmentProbe for FloorProbe {
    fn cast(&self, from: &Vector3<f32>, to: &Vector3<f32>, radius: f32) -> Option<f32> {
        let dir = to - from;
        if dir.z >= -f32::EPSILON {
            return None;
        }
        let t = (self.height + radius - from.z) / dir.z;
        (0.0..=1.0).contains(&t).then(|| t * dir.norm())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_blocks_only_paths_that_reach_it() {
        let wall = WallProbe { x: 1.0 };
        let from = Vector3::zeros();
        assert!(wall.blocked(&from, &Vector3::new(2.0, 0.0, 0.0), 0.0));
        assert!(!wall.blocked(&from, &Vector3::new(0.5, 0.0, 0.0), 0.0));
        assert!(!wall.blocked(&from, &Vector3::new(-2.0, 0.0, 0.0), 0.0));
    }

    #[test]
    fn wall_hit_distance_accounts_for_radius() {
        let wall = WallProbe { x: 1.0 };
        let hit = wall.cast(&Vector3::zeros(), &Vector3::new(2.0, 0.0, 0.0), 0.2);
        assert!((hit.unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn floor_reports_distance_down() {
        let floor = FloorProbe { height: 0.1 };
        let hit = floor.cast(&Vector3::new(0.0, 0.0, 1.0), &Vector3::zeros(), 0.0);
        assert!((hit.unwrap() - 0.9).abs() < 1e-6);
        assert!(floor.cast(&Vector3::new(0.0, 0.0, 1.0), &Vector3::new(0.0, 0.0, 0.5), 0.0).is_none());
    }

    #[test]
    fn constant_probes() {
        let (a, b) = (Vector3::zeros(), Vector3::x());
        assert!(AlwaysBlocked.blocked(&a, &b, 0.1));
        assert!(!NeverBlocked.blocked(&a, &b, 0.1));
    }
}

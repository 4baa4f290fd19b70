//! Vector and quaternion helpers shared by every body part.
//!
//! All helpers guard degenerate input (zero vectors, anti-parallel from-to
//! pairs, 180° interpolation) with [`EPS`] and fall back to identity rather
//! than producing NaN.
//!
//! The frame convention is right-handed, Z up, X forward, Y left.

use std::f32::consts::{FRAC_PI_2, PI};

use nalgebra::{Quaternion, Rotation3, Unit, UnitQuaternion, Vector3};

use stride_core::curve::Easing;

/// Degeneracy threshold for lengths and angles.
pub const EPS: f32 = 1e-6;

#[must_use]
pub fn up() -> Vector3<f32> {
    Vector3::z()
}

#[must_use]
pub fn forward() -> Vector3<f32> {
    Vector3::x()
}

#[must_use]
pub fn left() -> Vector3<f32> {
    Vector3::y()
}

#[must_use]
pub fn right() -> Vector3<f32> {
    -Vector3::y()
}

// ---------------------------------------------------------------------------
// Scalars and vectors
// ---------------------------------------------------------------------------

/// Linear interpolation with `t` clamped to [0, 1].
#[must_use]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

/// Vector interpolation with `t` clamped to [0, 1].
#[must_use]
pub fn lerp_vec(a: &Vector3<f32>, b: &Vector3<f32>, t: f32) -> Vector3<f32> {
    a.lerp(b, t.clamp(0.0, 1.0))
}

/// Normalized copy, or `None` for vectors shorter than [`EPS`].
#[must_use]
pub fn safe_normalize(v: &Vector3<f32>) -> Option<Vector3<f32>> {
    v.try_normalize(EPS)
}

#[must_use]
pub fn normalize_or(v: &Vector3<f32>, fallback: Vector3<f32>) -> Vector3<f32> {
    safe_normalize(v).unwrap_or(fallback)
}

/// Some unit vector perpendicular to `v`.
#[must_use]
pub fn orthogonal(v: &Vector3<f32>) -> Vector3<f32> {
    let helper = if v.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
    normalize_or(&v.cross(&helper), Vector3::z())
}

/// Remove the component of `v` along `normal`.
#[must_use]
pub fn flatten(v: &Vector3<f32>, normal: &Vector3<f32>) -> Vector3<f32> {
    match safe_normalize(normal) {
        Some(n) => v - n * v.dot(&n),
        None => *v,
    }
}

/// Component of `v` along `up`, scaled by `weight`.
#[must_use]
pub fn extract_vertical(v: &Vector3<f32>, up: &Vector3<f32>, weight: f32) -> Vector3<f32> {
    match safe_normalize(up) {
        Some(n) => n * v.dot(&n) * weight,
        None => Vector3::zeros(),
    }
}

/// Component of `v` orthogonal to `normal`, scaled by `weight`.
#[must_use]
pub fn extract_horizontal(v: &Vector3<f32>, normal: &Vector3<f32>, weight: f32) -> Vector3<f32> {
    flatten(v, normal) * weight
}

/// Project `point` onto the plane through `plane_point` with `normal`.
#[must_use]
pub fn point_to_plane(
    point: &Vector3<f32>,
    plane_point: &Vector3<f32>,
    normal: &Vector3<f32>,
) -> Vector3<f32> {
    plane_point + flatten(&(point - plane_point), normal)
}

/// Angle from `from` to `to` about `axis`, both projected onto the plane
/// orthogonal to `axis`. Zero when either projection is degenerate.
#[must_use]
pub fn signed_angle(from: &Vector3<f32>, to: &Vector3<f32>, axis: &Vector3<f32>) -> f32 {
    let Some(axis) = safe_normalize(axis) else {
        return 0.0;
    };
    let a = flatten(from, &axis);
    let b = flatten(to, &axis);
    if a.norm_squared() < EPS || b.norm_squared() < EPS {
        return 0.0;
    }
    a.cross(&b).dot(&axis).atan2(a.dot(&b))
}

/// Segment versus sphere intersection.
#[must_use]
pub fn line_sphere_collision(
    start: &Vector3<f32>,
    end: &Vector3<f32>,
    center: &Vector3<f32>,
    radius: f32,
) -> bool {
    let seg = end - start;
    let len_sq = seg.norm_squared();
    let t = if len_sq < EPS {
        0.0
    } else {
        ((center - start).dot(&seg) / len_sq).clamp(0.0, 1.0)
    };
    (start + seg * t - center).norm_squared() < radius * radius
}

/// Eased clamp used by the shoulder heuristics.
///
/// Weights below 1 first pull `value` halfway toward the middle of the range.
/// The result is then remapped through an in-out quintic between `min` and
/// `max`, so it approaches the limits with zero slope.
#[must_use]
pub fn damper_value(value: f32, min: f32, max: f32, weight: f32) -> f32 {
    let range = max - min;
    if range.abs() < EPS {
        return min;
    }
    let mut value = value;
    if weight < 1.0 {
        let mid = max - range * 0.5;
        value = mid + (value - mid) * 0.5;
    }
    let t = Easing::InOutQuintic.ease((value - min) / range);
    min + range * t
}

/// Critically damped approach of `current` toward `target`.
///
/// `velocity` carries state between calls.
#[must_use]
pub fn smooth_damp(current: f32, target: f32, velocity: &mut f32, smooth_time: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        return current;
    }
    let smooth_time = smooth_time.max(1e-4);
    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let decay = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);
    let change = current - target;
    let temp = (*velocity + omega * change) * dt;
    *velocity = (*velocity - omega * temp) * decay;
    let mut output = target + (change + temp) * decay;
    // No overshoot.
    if (target - current > 0.0) == (output > target) {
        output = target;
        *velocity = 0.0;
    }
    output
}

// ---------------------------------------------------------------------------
// Rotations
// ---------------------------------------------------------------------------

/// Rotation about `axis` by `angle` radians. Identity for a zero axis.
#[must_use]
pub fn angle_axis(angle: f32, axis: &Vector3<f32>) -> UnitQuaternion<f32> {
    Unit::try_new(*axis, EPS).map_or_else(UnitQuaternion::identity, |a| {
        UnitQuaternion::from_axis_angle(&a, angle)
    })
}

/// Shortest rotation taking direction `from` onto direction `to`.
///
/// Identity for zero vectors. Anti-parallel input rotates 180° about an
/// arbitrary perpendicular axis.
#[must_use]
pub fn from_to_rotation(from: &Vector3<f32>, to: &Vector3<f32>) -> UnitQuaternion<f32> {
    let (Some(a), Some(b)) = (safe_normalize(from), safe_normalize(to)) else {
        return UnitQuaternion::identity();
    };
    UnitQuaternion::rotation_between(&a, &b).unwrap_or_else(|| {
        if a.dot(&b) > 0.0 {
            UnitQuaternion::identity()
        } else {
            angle_axis(PI, &orthogonal(&a))
        }
    })
}

/// Rotation whose local X points along `forward` and local Z toward `up`.
#[must_use]
pub fn look_rotation(forward: &Vector3<f32>, up: &Vector3<f32>) -> UnitQuaternion<f32> {
    let Some(f) = safe_normalize(forward) else {
        return UnitQuaternion::identity();
    };
    let l = safe_normalize(&up.cross(&f)).unwrap_or_else(|| orthogonal(&f));
    let u = f.cross(&l);
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_basis_unchecked(&[f, l, u]))
}

/// Normalized lerp with hemisphere correction.
fn nlerp(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>, t: f32) -> UnitQuaternion<f32> {
    let qa = a.into_inner();
    let mut qb = b.into_inner();
    if qa.coords.dot(&qb.coords) < 0.0 {
        qb = -qb;
    }
    let q = Quaternion::from(qa.coords.lerp(&qb.coords, t));
    if q.norm_squared() < EPS {
        return *a;
    }
    UnitQuaternion::new_normalize(q)
}

/// Spherical interpolation with `t` clamped to [0, 1].
///
/// Falls back to [`nlerp`] where slerp is undefined.
#[must_use]
pub fn lerp_rotation(
    from: &UnitQuaternion<f32>,
    to: &UnitQuaternion<f32>,
    t: f32,
) -> UnitQuaternion<f32> {
    if t <= 0.0 {
        return *from;
    }
    if t >= 1.0 {
        return *to;
    }
    from.try_slerp(to, t, EPS)
        .unwrap_or_else(|| nlerp(from, to, t))
}

/// `rotation` scaled toward identity by `weight`.
#[must_use]
pub fn weighted_rotation(rotation: &UnitQuaternion<f32>, weight: f32) -> UnitQuaternion<f32> {
    lerp_rotation(&UnitQuaternion::identity(), rotation, weight)
}

/// Step from `from` toward `to` by at most `max_angle` radians.
#[must_use]
pub fn rotate_towards(
    from: &UnitQuaternion<f32>,
    to: &UnitQuaternion<f32>,
    max_angle: f32,
) -> UnitQuaternion<f32> {
    let angle = from.angle_to(to);
    if angle <= max_angle.max(0.0) || angle < EPS {
        return *to;
    }
    lerp_rotation(from, to, max_angle.max(0.0) / angle)
}

/// Soft-limit a rotation's angle from identity.
///
/// `clamp_weight` 0 leaves the rotation untouched, 1 removes it. In between,
/// rotations approach the limit through `smoothing` sine passes.
#[must_use]
pub fn clamp_rotation(
    rotation: &UnitQuaternion<f32>,
    clamp_weight: f32,
    smoothing: u32,
) -> UnitQuaternion<f32> {
    if clamp_weight >= 1.0 {
        return UnitQuaternion::identity();
    }
    if clamp_weight <= 0.0 {
        return *rotation;
    }
    let dot = 1.0 - rotation.angle() / PI;
    let target_clamp = if dot >= 1.0 {
        1.0
    } else {
        (1.0 - (clamp_weight - dot) / (1.0 - dot)).clamp(0.0, 1.0)
    };
    let mut clamp = (dot / clamp_weight).clamp(0.0, 1.0);
    for _ in 0..smoothing {
        clamp = (clamp * FRAC_PI_2).sin();
    }
    weighted_rotation(rotation, clamp * target_clamp)
}

/// Local axis of `rotation` (±X, ±Y or ±Z) most aligned with `direction`.
#[must_use]
pub fn axis_to_direction(rotation: &UnitQuaternion<f32>, direction: &Vector3<f32>) -> Vector3<f32> {
    let local = rotation.inverse() * direction;
    let abs = local.abs();
    if abs.x >= abs.y && abs.x >= abs.z {
        Vector3::x() * local.x.signum()
    } else if abs.y >= abs.z {
        Vector3::y() * local.y.signum()
    } else {
        Vector3::z() * local.z.signum()
    }
}

/// True when every vector component is finite.
#[must_use]
pub fn is_finite(v: &Vector3<f32>) -> bool {
    v.iter().all(|c| c.is_finite())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn right_is_forward_cross_up() {
        assert_relative_eq!(forward().cross(&up()), right());
        assert_relative_eq!(up().cross(&forward()), left());
    }

    #[test]
    fn from_to_handles_parallel_and_antiparallel() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        let q = from_to_rotation(&a, &a);
        assert_relative_eq!(q.angle(), 0.0, epsilon = 1e-6);

        let q = from_to_rotation(&a, &-a);
        assert_relative_eq!(q * a, -a, epsilon = 1e-5);

        let q = from_to_rotation(&Vector3::zeros(), &a);
        assert_eq!(q, UnitQuaternion::identity());
    }

    #[test]
    fn from_to_rotates_direction() {
        let q = from_to_rotation(&Vector3::new(1.0, 0.0, 0.0), &Vector3::new(0.0, 2.0, 0.0));
        assert_relative_eq!(q * Vector3::x(), Vector3::y(), epsilon = 1e-6);
    }

    #[test]
    fn angle_axis_zero_axis_is_identity() {
        assert_eq!(angle_axis(1.0, &Vector3::zeros()), UnitQuaternion::identity());
    }

    #[test]
    fn look_rotation_maps_local_axes() {
        let q = look_rotation(&Vector3::y(), &Vector3::z());
        assert_relative_eq!(q * Vector3::x(), Vector3::y(), epsilon = 1e-6);
        assert_relative_eq!(q * Vector3::z(), Vector3::z(), epsilon = 1e-6);

        // Forward parallel to up still yields a valid frame.
        let q = look_rotation(&Vector3::z(), &Vector3::z());
        assert_relative_eq!(q * Vector3::x(), Vector3::z(), epsilon = 1e-6);
    }

    #[test]
    fn lerp_rotation_survives_opposite_quaternions() {
        let a = UnitQuaternion::identity();
        let b = angle_axis(PI, &Vector3::z());
        let q = lerp_rotation(&a, &b, 0.5);
        assert!(q.coords.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn lerp_rotation_clamps_weight() {
        let a = UnitQuaternion::identity();
        let b = angle_axis(1.0, &Vector3::z());
        assert_eq!(lerp_rotation(&a, &b, -1.0), a);
        assert_eq!(lerp_rotation(&a, &b, 2.0), b);
        assert_relative_eq!(lerp_rotation(&a, &b, 0.5).angle(), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn rotate_towards_limits_step() {
        let a = UnitQuaternion::identity();
        let b = angle_axis(1.0, &Vector3::z());
        let q = rotate_towards(&a, &b, 0.25);
        assert_relative_eq!(q.angle(), 0.25, epsilon = 1e-5);
        assert_eq!(rotate_towards(&a, &b, 2.0), b);
    }

    #[test]
    fn clamp_rotation_extremes() {
        let q = angle_axis(1.0, &Vector3::x());
        assert_eq!(clamp_rotation(&q, 0.0, 2), q);
        assert_eq!(clamp_rotation(&q, 1.0, 2), UnitQuaternion::identity());
        let c = clamp_rotation(&q, 0.5, 2);
        assert!(c.angle() <= q.angle() + 1e-6);
    }

    #[test]
    fn signed_angle_sign_follows_axis() {
        let a = signed_angle(&Vector3::x(), &Vector3::y(), &Vector3::z());
        assert_relative_eq!(a, FRAC_PI_2, epsilon = 1e-6);
        let a = signed_angle(&Vector3::x(), &Vector3::y(), &-Vector3::z());
        assert_relative_eq!(a, -FRAC_PI_2, epsilon = 1e-6);
        assert_relative_eq!(signed_angle(&Vector3::z(), &Vector3::x(), &Vector3::z()), 0.0);
    }

    #[test]
    fn point_to_plane_projects() {
        let p = point_to_plane(
            &Vector3::new(1.0, 2.0, 3.0),
            &Vector3::new(0.0, 0.0, 1.0),
            &Vector3::z(),
        );
        assert_relative_eq!(p, Vector3::new(1.0, 2.0, 1.0));
    }

    #[test]
    fn vertical_and_horizontal_split() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let sum = extract_vertical(&v, &up(), 1.0) + extract_horizontal(&v, &up(), 1.0);
        assert_relative_eq!(sum, v, epsilon = 1e-6);
    }

    #[test]
    fn line_sphere_hits_and_misses() {
        let s = Vector3::zeros();
        let e = Vector3::new(2.0, 0.0, 0.0);
        assert!(line_sphere_collision(&s, &e, &Vector3::new(1.0, 0.1, 0.0), 0.2));
        assert!(!line_sphere_collision(&s, &e, &Vector3::new(1.0, 0.5, 0.0), 0.2));
        assert!(!line_sphere_collision(&s, &e, &Vector3::new(3.0, 0.0, 0.0), 0.5));
        // Degenerate segment behaves like a point test.
        assert!(line_sphere_collision(&s, &s, &Vector3::new(0.1, 0.0, 0.0), 0.2));
    }

    #[test]
    fn damper_value_stays_in_range() {
        for i in -20..=20 {
            #[allow(clippy::cast_precision_loss)]
            let v = damper_value(i as f32 * 10.0, -45.0, 45.0, 1.0);
            assert!((-45.0..=45.0).contains(&v));
        }
        assert_relative_eq!(damper_value(0.0, -45.0, 45.0, 1.0), 0.0, epsilon = 1e-4);
        assert_relative_eq!(damper_value(0.0, -45.0, 45.0, 0.7), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn smooth_damp_converges_without_overshoot() {
        let mut v = 0.0;
        let mut x = 0.0;
        for _ in 0..200 {
            x = smooth_damp(x, 1.0, &mut v, 0.2, 1.0 / 60.0);
            assert!(x <= 1.0);
        }
        assert_relative_eq!(x, 1.0, epsilon = 1e-3);
        assert_relative_eq!(smooth_damp(0.3, 1.0, &mut v, 0.2, 0.0), 0.3);
    }

    #[test]
    fn axis_to_direction_finds_signed_axis() {
        let q = angle_axis(FRAC_PI_2, &Vector3::z());
        // Local +X maps to world +Y, so world -Y is local -X.
        assert_relative_eq!(axis_to_direction(&q, &-Vector3::y()), -Vector3::x());
        assert_relative_eq!(axis_to_direction(&q, &Vector3::new(0.1, 0.0, 0.9)), Vector3::z());
    }
}

// ==============================================================================
// math.rs — SHARED VECTOR HELPERS + NON-FINITE GUARDS
// ------------------------------------------------------------------------------
// Chassis convention (MUST match every module that builds a basis):
//   +Y up, -Z forward, +X right  (right = forward × up)
//
// sanitize(...) is the single place where a NaN/Inf mid-tick is caught,
// logged and replaced with zero. Nothing non-finite may reach rapier.
// ==============================================================================

use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::{Isometry, Point, Real, Vector};

#[inline]
pub fn up() -> Vector<Real> {
    Vector::new(0.0, 1.0, 0.0)
}

#[inline]
pub fn forward() -> Vector<Real> {
    Vector::new(0.0, 0.0, -1.0)
}

#[inline]
pub fn right() -> Vector<Real> {
    Vector::new(1.0, 0.0, 0.0)
}

/// World-space velocity of a point rigidly attached to a body:
/// v(p) = v_com + ω × (p - com)
#[inline]
pub fn point_velocity(
    linvel: Vector<Real>,
    angvel: Vector<Real>,
    com: Point<Real>,
    p: Point<Real>,
) -> Vector<Real> {
    let r = p.coords - com.coords;
    linvel + angvel.cross(&r)
}

#[inline]
pub fn safe_normalize(v: Vector<Real>, fallback: Vector<Real>) -> Vector<Real> {
    let n = v.norm();
    if n > 1e-6 && n.is_finite() { v / n } else { fallback }
}

/// Removes the component of `v` along unit normal `n`.
#[inline]
pub fn project_on_plane(v: Vector<Real>, n: Vector<Real>) -> Vector<Real> {
    v - n * v.dot(&n)
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// `signum` that returns 0 for 0 (f32::signum returns 1 for +0.0).
#[inline]
pub fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Replace a non-finite value with zero and report it.
#[inline]
pub fn sanitize(value: f32, what: &'static str) -> f32 {
    if value.is_finite() {
        value
    } else {
        tracing::warn!(quantity = what, value = %value, "non-finite value replaced with zero");
        0.0
    }
}

/// Vector flavour of [`sanitize`]: the whole vector is zeroed if any lane is bad.
#[inline]
pub fn sanitize_vec(v: Vector<Real>, what: &'static str) -> Vector<Real> {
    if v.iter().all(|c| c.is_finite()) {
        v
    } else {
        tracing::warn!(quantity = what, "non-finite vector replaced with zero");
        Vector::zeros()
    }
}

#[inline]
pub fn v3(v: Vector<Real>) -> [f32; 3] {
    [v.x, v.y, v.z]
}

#[inline]
pub fn p3(p: Point<Real>) -> [f32; 3] {
    [p.x, p.y, p.z]
}

/// Quaternion as `[i, j, k, w]`.
#[inline]
pub fn quat4(q: &UnitQuaternion<Real>) -> [f32; 4] {
    [q.i, q.j, q.k, q.w]
}

/// Rotation about the chassis up axis, positive = steer left.
#[inline]
pub fn yaw_rotation(angle: f32) -> UnitQuaternion<Real> {
    UnitQuaternion::from_axis_angle(&Vector::y_axis(), angle)
}

/// Transform a chassis-local point to world.
#[inline]
pub fn to_world(pose: &Isometry<Real>, local: Point<Real>) -> Point<Real> {
    pose * local
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn basis_is_right_handed() {
        let r = forward().cross(&up());
        assert_relative_eq!(r, right(), epsilon = 1e-6);
    }

    #[test]
    fn sanitize_zeroes_nan_and_inf() {
        assert_eq!(sanitize(f32::NAN, "test"), 0.0);
        assert_eq!(sanitize(f32::INFINITY, "test"), 0.0);
        assert_eq!(sanitize(2.5, "test"), 2.5);
        let v = sanitize_vec(Vector::new(1.0, f32::NAN, 0.0), "test");
        assert_eq!(v, Vector::zeros());
    }

    #[test]
    fn point_velocity_adds_rotation() {
        let v = point_velocity(
            Vector::zeros(),
            Vector::new(0.0, 1.0, 0.0),
            Point::origin(),
            Point::new(1.0, 0.0, 0.0),
        );
        // ω = +Y, r = +X  =>  ω × r = -Z
        assert_relative_eq!(v, Vector::new(0.0, 0.0, -1.0), epsilon = 1e-6);
    }

    #[test]
    fn positive_yaw_turns_forward_to_the_left() {
        let f = yaw_rotation(0.3) * forward();
        assert!(f.x < 0.0);
    }
}

// ==============================================================================
// kinematics.rs — CONTACT FRAME + SLIP DECOMPOSITION
// ------------------------------------------------------------------------------
// contact_frame(hub, normal):
//   heading = wheel forward (hub -Z) projected on the ground plane
//   right   = heading × normal
//
// slip_components(v, frame) -> (v_x, v_y) along heading / right.
//
// instantaneous slip:
//   slip_ratio = (ωR − v_x) / max(|v_x|, v_min)
//   slip_angle = atan2(v_y, |v_x|)
//
// relax(): first-order lag whose step is the distance travelled this tick over
// the relaxation length, so slip state follows carcass deflection rather than
// jumping with the kinematics.
// ==============================================================================

use rapier3d::prelude::{Isometry, Real, Vector};

use crate::math::{forward, right, safe_normalize, up};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactFrame {
    pub heading: Vector<Real>,
    pub right: Vector<Real>,
    pub normal: Vector<Real>,
}

pub fn contact_frame(hub: &Isometry<Real>, normal: Vector<Real>) -> ContactFrame {
    let normal = safe_normalize(normal, up());
    let wheel_forward = hub.rotation * forward();
    let along = wheel_forward - normal * wheel_forward.dot(&normal);
    let heading = safe_normalize(along, hub.rotation * forward());
    ContactFrame {
        heading,
        right: heading.cross(&normal),
        normal,
    }
}

#[inline]
pub fn slip_components(v: Vector<Real>, frame: &ContactFrame) -> (Real, Real) {
    (v.dot(&frame.heading), v.dot(&frame.right))
}

#[inline]
pub fn instantaneous_slip(
    omega: f32,
    radius: f32,
    v_x: f32,
    v_y: f32,
    min_speed: f32,
) -> (f32, f32) {
    let denom = v_x.abs().max(min_speed);
    let slip_ratio = (omega * radius - v_x) / denom;
    let slip_angle = v_y.atan2(v_x.abs().max(1e-3));
    (slip_ratio, slip_angle)
}

#[inline]
pub fn relax(current: f32, target: f32, distance: f32, relaxation_length: f32) -> f32 {
    let k = (distance / relaxation_length.max(1e-4)).clamp(0.0, 1.0);
    current + (target - current) * k
}

/// Camber against the ground, SAE sign: positive when the top of the wheel
/// leans outboard. `side` is +1 for right corners, -1 for left.
pub fn camber_angle(hub: &Isometry<Real>, normal: Vector<Real>, side: f32) -> f32 {
    let axle = hub.rotation * right();
    -side * axle.dot(&normal).clamp(-1.0, 1.0).asin()
}

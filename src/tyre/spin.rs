// ==============================================================================
// spin.rs — WHEEL SPIN INTEGRATION WITH BRAKE HOLD / LOCK DETECTION
// ------------------------------------------------------------------------------
// Shared by free-rolling wheels (tyre solver) and driven shafts (drivetrain).
//
//   net  = free_torque − brake·dir        dir = sign(ω), or sign(free) at rest
//   ω'   = ω + net·dt / I
//
// If ω' crosses (or lands on) zero while |free_torque| ≤ brake, the brake
// holds the wheel: ω' = 0, locked. A stationary wheel stays put for the same
// condition. Otherwise the brake only slows it down.
// ==============================================================================

use crate::math::sign;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinResult {
    pub omega: f32,
    pub locked: bool,
}

pub fn integrate_spin(
    omega: f32,
    free_torque: f32,
    brake_torque: f32,
    inertia: f32,
    dt: f32,
) -> SpinResult {
    let brake = brake_torque.abs();
    let holds = brake > 0.0 && free_torque.abs() <= brake;

    if omega == 0.0 && holds {
        return SpinResult {
            omega: 0.0,
            locked: true,
        };
    }

    let dir = if omega != 0.0 { sign(omega) } else { sign(free_torque) };
    let net = free_torque - brake * dir;
    let next = omega + net * dt / inertia.max(1e-6);

    if dir != 0.0 && sign(next) != dir && holds {
        return SpinResult {
            omega: 0.0,
            locked: true,
        };
    }

    SpinResult {
        omega: next,
        locked: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn free_wheel_accelerates() {
        let r = integrate_spin(0.0, 10.0, 0.0, 1.0, 0.1);
        assert_relative_eq!(r.omega, 1.0);
        assert!(!r.locked);
    }

    #[test]
    fn brake_stops_and_holds_without_reversing() {
        let mut omega = 5.0;
        let mut locked = false;
        for _ in 0..100 {
            let r = integrate_spin(omega, 20.0, 500.0, 1.0, 0.01);
            omega = r.omega;
            locked = r.locked;
            assert!(omega >= 0.0);
        }
        assert_eq!(omega, 0.0);
        assert!(locked);
    }

    #[test]
    fn torque_above_holding_breaks_the_lock() {
        let r = integrate_spin(0.0, 600.0, 500.0, 1.0, 0.1);
        assert_relative_eq!(r.omega, 10.0);
        assert!(!r.locked);
    }

    #[test]
    fn brake_on_reverse_spin_slows_it() {
        let r = integrate_spin(-10.0, 0.0, 50.0, 1.0, 0.1);
        assert_relative_eq!(r.omega, -5.0);
    }
}

// ==============================================================================
// clutch.rs — FRICTION CLUTCH WITH OPEN/CLOSED HYSTERESIS
// ------------------------------------------------------------------------------
// Capacity from the pedal (0 = engaged, 1 = pressed):
//   capacity = max_torque · (1 − pedal)          closed
//            = max_torque · (1 − pedal) · kinetic_ratio   slipping
//
// Torque is solved implicitly: the torque that would bring engine and
// driveline to the same speed at the end of the step, clamped to capacity.
// The closed flag only flips on slip thresholds (close < open), so a clutch
// sitting on the edge does not chatter.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Result, VehicleError, ensure_positive};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClutchConfig {
    pub max_torque: f32, // N·m
    pub kinetic_ratio: f32,
    pub close_slip_rpm: f32,
    pub open_slip_rpm: f32,
}

impl Default for ClutchConfig {
    fn default() -> Self {
        Self {
            max_torque: 600.0,
            kinetic_ratio: 0.85,
            close_slip_rpm: 30.0,
            open_slip_rpm: 90.0,
        }
    }
}

impl ClutchConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("drivetrain", "clutch.max_torque", self.max_torque)?;
        ensure_positive("drivetrain", "clutch.kinetic_ratio", self.kinetic_ratio)?;
        ensure_positive("drivetrain", "clutch.close_slip_rpm", self.close_slip_rpm)?;
        if self.open_slip_rpm <= self.close_slip_rpm {
            return Err(VehicleError::invalid_value(
                "drivetrain",
                "clutch.open_slip_rpm",
                "must be above close_slip_rpm",
            ));
        }
        Ok(())
    }
}

/// Torque from side A to side B that equalizes their speeds after `dt`.
/// `delta` = ω_a − ω_b; loads are torques already acting on each side.
pub fn implicit_coupling_torque(
    delta: f32,
    dt: f32,
    torque_a: f32,
    inertia_a: f32,
    torque_b: f32,
    inertia_b: f32,
) -> f32 {
    let compliance = 1.0 / inertia_a + 1.0 / inertia_b;
    (delta + dt * (torque_a / inertia_a - torque_b / inertia_b)) / (dt * compliance)
}

#[derive(Debug, Clone)]
pub struct Clutch {
    config: ClutchConfig,
    closed: bool,
    saturated: bool,
}

impl Clutch {
    pub fn new(config: &ClutchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: *config,
            closed: true,
            saturated: false,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_saturated(&self) -> bool {
        self.saturated
    }

    pub fn capacity(&self, pedal: f32) -> f32 {
        let engaged = self.config.max_torque * (1.0 - pedal.clamp(0.0, 1.0));
        if self.closed {
            engaged
        } else {
            engaged * self.config.kinetic_ratio
        }
    }

    /// Engine-side clutch torque for this step.
    pub fn transmit(
        &mut self,
        pedal: f32,
        delta: f32,
        dt: f32,
        engine_torque: f32,
        engine_inertia: f32,
        load_torque: f32,
        load_inertia: f32,
    ) -> f32 {
        let required = implicit_coupling_torque(
            delta,
            dt,
            engine_torque,
            engine_inertia,
            load_torque,
            load_inertia,
        );
        let capacity = self.capacity(pedal);
        self.saturated = required.abs() > capacity;
        required.clamp(-capacity, capacity)
    }

    pub fn update_state(&mut self, slip_rpm: f32) {
        let slip = slip_rpm.abs();
        if self.closed && slip > self.config.open_slip_rpm {
            self.closed = false;
        } else if !self.closed && slip < self.config.close_slip_rpm && !self.saturated {
            self.closed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn implicit_torque_equalizes_speeds() {
        let (ja, jb, dt) = (0.2, 1.5, 0.01);
        let (wa, wb, ta, tb) = (120.0, 100.0, 150.0, -40.0);
        let t = implicit_coupling_torque(wa - wb, dt, ta, ja, tb, jb);
        let wa1 = wa + dt * (ta - t) / ja;
        let wb1 = wb + dt * (tb + t) / jb;
        assert_relative_eq!(wa1, wb1, epsilon = 1e-3);
    }

    #[test]
    fn pressed_pedal_transmits_nothing() {
        let mut c = Clutch::new(&ClutchConfig::default()).unwrap();
        assert_eq!(c.transmit(1.0, 50.0, 0.01, 200.0, 0.2, 0.0, 1.0), 0.0);
        assert!(c.is_saturated());
    }

    #[test]
    fn hysteresis_needs_both_thresholds() {
        let mut c = Clutch::new(&ClutchConfig::default()).unwrap();
        c.update_state(60.0);
        assert!(c.is_closed());
        c.update_state(120.0);
        assert!(!c.is_closed());
        c.update_state(60.0);
        assert!(!c.is_closed());
        c.update_state(10.0);
        assert!(c.is_closed());
    }

    #[test]
    fn slipping_clutch_has_kinetic_capacity() {
        let mut c = Clutch::new(&ClutchConfig::default()).unwrap();
        let closed = c.capacity(0.0);
        c.update_state(500.0);
        assert_relative_eq!(c.capacity(0.0), closed * 0.85);
    }
}

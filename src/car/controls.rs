use serde::{Deserialize, Serialize};

/// Driver inputs for one tick. Everything is clamped on use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarControls {
    pub gas: f32,    // 0..1
    pub brake: f32,  // 0..1
    pub steer: f32,  // -1 (left) .. 1 (right)
    pub clutch: f32, // 0 = engaged, 1 = pressed
    pub handbrake: f32,
    /// Gear index to select (0 = R, 1 = N, 2.. = forward), or -1 for
    /// sequential mode driven by `gear_up` / `gear_down`.
    pub requested_gear: i32,
    pub gear_up: bool,
    pub gear_down: bool,
    /// Torque from hub motors, per wheel FL, FR, RL, RR.
    pub electric_torque: [f32; 4],
    pub tick: u64,
}

impl Default for CarControls {
    fn default() -> Self {
        Self {
            gas: 0.0,
            brake: 0.0,
            steer: 0.0,
            clutch: 0.0,
            handbrake: 0.0,
            requested_gear: -1,
            gear_up: false,
            gear_down: false,
            electric_torque: [0.0; 4],
            tick: 0,
        }
    }
}

impl CarControls {
    pub fn sequential(&self) -> bool {
        self.requested_gear < 0
    }

    /// Non-finite axes read as released.
    pub fn sanitized(&self) -> Self {
        let axis = |v: f32, lo: f32| if v.is_finite() { v.clamp(lo, 1.0) } else { 0.0 };
        Self {
            gas: axis(self.gas, 0.0),
            brake: axis(self.brake, 0.0),
            steer: axis(self.steer, -1.0),
            clutch: axis(self.clutch, 0.0),
            handbrake: axis(self.handbrake, 0.0),
            electric_torque: self
                .electric_torque
                .map(|t| if t.is_finite() { t } else { 0.0 }),
            ..*self
        }
    }
}

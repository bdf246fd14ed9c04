// ==============================================================================
// steering.rs — STEERING RACK + ACKERMANN GEOMETRY (FRONT AXLE)
// ------------------------------------------------------------------------------
// Driver input → road-wheel angles → per-corner rack offsets.
//
//   target  = −input · lock · speed_limit(speed)        input > 0 steers right
//   angle  += clamp(target − angle, ±rate·dt)           rate-limited rack
//   (l, r)  = blend(parallel, ackermann, ackermann)
//   offset  = wheel_angle · steering_arm                per corner
//
// Angles are yaw about chassis up, positive steers left. The inner wheel turns
// more under full Ackermann.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Result, ensure_non_negative, ensure_positive};
use crate::math::{lerp, sanitize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    pub lock: f32,            // rad at the road wheel
    pub rate: f32,            // rad/s
    pub ackermann: f32,       // 0 = parallel, 1 = full Ackermann
    pub speed_reduction: f32, // fraction of lock removed at reduction_speed
    pub reduction_speed: f32, // m/s
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            lock: 0.55,
            rate: 4.0,
            ackermann: 0.6,
            speed_reduction: 0.5,
            reduction_speed: 50.0,
        }
    }
}

impl SteeringConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("steering", "lock", self.lock)?;
        ensure_positive("steering", "rate", self.rate)?;
        ensure_non_negative("steering", "ackermann", self.ackermann)?;
        ensure_non_negative("steering", "speed_reduction", self.speed_reduction)?;
        ensure_positive("steering", "reduction_speed", self.reduction_speed)
    }
}

/// Inner/outer wheel angles for a bicycle-model `base` angle, as (left, right).
pub fn ackermann_angles(base: f32, wheelbase: f32, track: f32) -> (f32, f32) {
    if base.abs() < 1e-4 {
        return (0.0, 0.0);
    }
    let sign = base.signum();
    let r = wheelbase / base.abs().tan();
    let inner = (wheelbase / (r - track * 0.5).max(0.01)).atan() * sign;
    let outer = (wheelbase / (r + track * 0.5).max(0.01)).atan() * sign;
    if sign > 0.0 {
        (inner, outer) // left turn
    } else {
        (outer, inner)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelAngles {
    pub left: f32,
    pub right: f32,
}

#[derive(Debug, Clone)]
pub struct SteeringRack {
    config: SteeringConfig,
    wheelbase: f32,
    track: f32,
    angle: f32,
}

impl SteeringRack {
    pub fn new(config: &SteeringConfig, wheelbase: f32, track: f32) -> Result<Self> {
        config.validate()?;
        ensure_positive("steering", "wheelbase", wheelbase)?;
        ensure_positive("steering", "track", track)?;
        Ok(Self {
            config: *config,
            wheelbase,
            track,
            angle: 0.0,
        })
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn reset(&mut self) {
        self.angle = 0.0;
    }

    fn speed_limit(&self, speed: f32) -> f32 {
        let t = (speed.abs() / self.config.reduction_speed).clamp(0.0, 1.0);
        (1.0 - self.config.speed_reduction * t).max(0.0)
    }

    pub fn update(&mut self, input: f32, speed: f32, dt: f32) -> WheelAngles {
        let input = sanitize(input, "steering.input").clamp(-1.0, 1.0);
        let target = -input * self.config.lock * self.speed_limit(speed);
        let max_step = self.config.rate * dt.max(0.0);
        self.angle += (target - self.angle).clamp(-max_step, max_step);

        let (ack_l, ack_r) = ackermann_angles(self.angle, self.wheelbase, self.track);
        WheelAngles {
            left: lerp(self.angle, ack_l, self.config.ackermann),
            right: lerp(self.angle, ack_r, self.config.ackermann),
        }
    }
}

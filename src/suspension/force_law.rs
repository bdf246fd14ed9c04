// ==============================================================================
// force_law.rs — SPRING / BUMP STOP / DAMPER (shared by every topology)
// ------------------------------------------------------------------------------
// travel x  > 0 : compression from the unloaded rest position (hub moved up)
// speed  v  > 0 : closing speed along chassis up
//
//   spring   = (progressive·x + rate)·x          x > 0, else 0
//   bump     = bump_rate·(x − bump_travel)²      x > bump_travel
//   droop    = −droop_rate·(−x − droop_travel)²  x < −droop_travel
//   damper   = 4-segment piecewise linear in v (slow / fast, bump / rebound)
//
// total > 0 pushes chassis up and hub down.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Result, ensure_non_negative, ensure_positive};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringConfig {
    pub rate: f32,        // N/m
    pub progressive: f32, // N/m²
    pub bump_stop_travel: f32,
    pub bump_stop_rate: f32, // N/m²
    pub droop_stop_travel: f32,
    pub droop_stop_rate: f32,
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            rate: 60_000.0,
            progressive: 40_000.0,
            bump_stop_travel: 0.09,
            bump_stop_rate: 8_000_000.0,
            droop_stop_travel: 0.08,
            droop_stop_rate: 8_000_000.0,
        }
    }
}

impl SpringConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("suspension", "spring.rate", self.rate)?;
        ensure_non_negative("suspension", "spring.progressive", self.progressive)?;
        ensure_positive("suspension", "spring.bump_stop_travel", self.bump_stop_travel)?;
        ensure_non_negative("suspension", "spring.bump_stop_rate", self.bump_stop_rate)?;
        ensure_positive("suspension", "spring.droop_stop_travel", self.droop_stop_travel)?;
        ensure_non_negative("suspension", "spring.droop_stop_rate", self.droop_stop_rate)
    }

    /// Travel at which the spring alone carries `load`.
    pub fn static_travel(&self, load: f32) -> f32 {
        if load <= 0.0 {
            return 0.0;
        }
        if self.progressive <= f32::EPSILON {
            return load / self.rate;
        }
        let k = self.rate;
        let p = self.progressive;
        (-k + (k * k + 4.0 * p * load).sqrt()) / (2.0 * p)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamperConfig {
    pub bump_slow: f32, // N·s/m
    pub bump_fast: f32,
    pub bump_threshold: f32, // m/s
    pub rebound_slow: f32,
    pub rebound_fast: f32,
    pub rebound_threshold: f32,
}

impl Default for DamperConfig {
    fn default() -> Self {
        Self {
            bump_slow: 4_000.0,
            bump_fast: 1_800.0,
            bump_threshold: 0.12,
            rebound_slow: 6_500.0,
            rebound_fast: 2_800.0,
            rebound_threshold: 0.12,
        }
    }
}

impl DamperConfig {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("damper.bump_slow", self.bump_slow),
            ("damper.bump_fast", self.bump_fast),
            ("damper.rebound_slow", self.rebound_slow),
            ("damper.rebound_fast", self.rebound_fast),
        ] {
            ensure_non_negative("suspension", field, value)?;
        }
        ensure_positive("suspension", "damper.bump_threshold", self.bump_threshold)?;
        ensure_positive("suspension", "damper.rebound_threshold", self.rebound_threshold)
    }

    pub fn force(&self, speed: f32) -> f32 {
        if speed >= 0.0 {
            if speed <= self.bump_threshold {
                self.bump_slow * speed
            } else {
                self.bump_slow * self.bump_threshold
                    + self.bump_fast * (speed - self.bump_threshold)
            }
        } else {
            let s = -speed;
            let f = if s <= self.rebound_threshold {
                self.rebound_slow * s
            } else {
                self.rebound_slow * self.rebound_threshold
                    + self.rebound_fast * (s - self.rebound_threshold)
            };
            -f
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForceBreakdown {
    pub spring: f32,
    pub bump_stop: f32,
    pub damper: f32,
    pub total: f32,
}

pub fn force_law(
    spring: &SpringConfig,
    damper: &DamperConfig,
    travel: f32,
    speed: f32,
) -> ForceBreakdown {
    let spring_force = if travel > 0.0 {
        (spring.progressive * travel + spring.rate) * travel
    } else {
        0.0
    };

    let bump_stop = if travel > spring.bump_stop_travel {
        let d = travel - spring.bump_stop_travel;
        spring.bump_stop_rate * d * d
    } else if travel < -spring.droop_stop_travel {
        let d = -travel - spring.droop_stop_travel;
        -spring.droop_stop_rate * d * d
    } else {
        0.0
    };

    let damper_force = damper.force(speed);

    ForceBreakdown {
        spring: spring_force,
        bump_stop,
        damper: damper_force,
        total: spring_force + bump_stop + damper_force,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zero_travel_zero_speed_is_zero_force() {
        let f = force_law(&SpringConfig::default(), &DamperConfig::default(), 0.0, 0.0);
        assert_eq!(f.total, 0.0);
    }

    #[test]
    fn spring_is_monotonic_in_travel() {
        let s = SpringConfig::default();
        let d = DamperConfig::default();
        let mut last = 0.0;
        for i in 1..200 {
            let x = i as f32 * 0.001;
            let f = force_law(&s, &d, x, 0.0).total;
            assert!(f > last, "x={x}");
            last = f;
        }
    }

    #[test]
    fn static_travel_inverts_the_spring() {
        let s = SpringConfig::default();
        let x = s.static_travel(3_000.0);
        assert_relative_eq!((s.progressive * x + s.rate) * x, 3_000.0, max_relative = 1e-4);

        let linear = SpringConfig { progressive: 0.0, ..s };
        assert_relative_eq!(linear.static_travel(3_000.0), 0.05);
    }

    #[test]
    fn stops_are_one_sided() {
        let s = SpringConfig::default();
        let d = DamperConfig::default();
        assert!(force_law(&s, &d, 0.1, 0.0).bump_stop > 0.0);
        assert!(force_law(&s, &d, -0.1, 0.0).bump_stop < 0.0);
        assert_eq!(force_law(&s, &d, 0.05, 0.0).bump_stop, 0.0);
        assert_eq!(force_law(&s, &d, -0.1, 0.0).spring, 0.0);
    }

    #[test]
    fn damper_has_four_segments() {
        let d = DamperConfig::default();
        assert_relative_eq!(d.force(0.1), 400.0);
        assert_relative_eq!(d.force(0.22), 4_000.0 * 0.12 + 1_800.0 * 0.1, max_relative = 1e-5);
        assert_relative_eq!(d.force(-0.1), -650.0);
        assert_relative_eq!(d.force(-0.22), -(6_500.0 * 0.12 + 2_800.0 * 0.1), max_relative = 1e-5);
    }
}

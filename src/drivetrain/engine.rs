// ==============================================================================
// engine.rs — TORQUE CURVE, TURBOS, LIMITER, IDLE, LIFE
// ------------------------------------------------------------------------------
// Per tick, in order:
//   limiter : rpm ≥ limiter_rpm starts a cut of limiter_cycle seconds
//   idle    : below idle_rpm the throttle never drops under idle_throttle
//   turbos  : boost → max_boost · throttle · clamp(rpm / reference)^γ
//             with separate spool-up / spool-down lags, capped by wastegate
//   torque  = curve(rpm) · throttle · (1 + Σ boost)
//           − (1 − throttle) · coast_torque · clamp(rpm / limiter_rpm)
//   life    : every second over over_rev_rpm costs damage_rate · excess_rpm
//
// A blown engine (life ≤ 0) delivers no drive torque, only coast friction.
// ==============================================================================

use serde::{Deserialize, Serialize};

use super::RAD_TO_RPM;
use crate::config::cache::{CurveCache, CurveSource};
use crate::curve::Curve;
use crate::error::{Result, VehicleError, ensure_non_negative, ensure_positive};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurboConfig {
    pub max_boost: f32, // fraction of NA torque
    pub reference_rpm: f32,
    pub gamma: f32,
    pub lag_up: f32,   // 1/s
    pub lag_down: f32, // 1/s
    pub wastegate: f32,
}

impl Default for TurboConfig {
    fn default() -> Self {
        Self {
            max_boost: 0.6,
            reference_rpm: 4_500.0,
            gamma: 2.0,
            lag_up: 2.5,
            lag_down: 6.0,
            wastegate: 0.55,
        }
    }
}

impl TurboConfig {
    fn validate(&self) -> Result<()> {
        ensure_non_negative("engine", "turbo.max_boost", self.max_boost)?;
        ensure_positive("engine", "turbo.reference_rpm", self.reference_rpm)?;
        ensure_positive("engine", "turbo.gamma", self.gamma)?;
        ensure_positive("engine", "turbo.lag_up", self.lag_up)?;
        ensure_positive("engine", "turbo.lag_down", self.lag_down)?;
        ensure_non_negative("engine", "turbo.wastegate", self.wastegate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// rpm → N·m at full throttle, naturally aspirated.
    pub torque_curve: CurveSource,
    pub coast_torque: f32,
    pub idle_rpm: f32,
    pub idle_throttle: f32,
    pub limiter_rpm: f32,
    pub limiter_cycle: f32,
    pub inertia: f32,
    pub over_rev_rpm: f32,
    pub life: f32,
    pub damage_rate: f32,
    pub turbos: Vec<TurboConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            torque_curve: CurveSource::Inline(Curve::from_samples(vec![
                [0.0, 120.0],
                [1_000.0, 160.0],
                [3_000.0, 200.0],
                [5_000.0, 215.0],
                [6_500.0, 200.0],
                [7_500.0, 170.0],
                [8_500.0, 100.0],
            ])),
            coast_torque: 40.0,
            idle_rpm: 900.0,
            idle_throttle: 0.12,
            limiter_rpm: 7_400.0,
            limiter_cycle: 0.05,
            inertia: 0.15,
            over_rev_rpm: 7_800.0,
            life: 1_000.0,
            damage_rate: 0.02,
            turbos: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("engine", "coast_torque", self.coast_torque)?;
        ensure_positive("engine", "idle_rpm", self.idle_rpm)?;
        ensure_non_negative("engine", "idle_throttle", self.idle_throttle)?;
        ensure_positive("engine", "limiter_cycle", self.limiter_cycle)?;
        ensure_positive("engine", "inertia", self.inertia)?;
        ensure_positive("engine", "life", self.life)?;
        ensure_non_negative("engine", "damage_rate", self.damage_rate)?;
        if self.limiter_rpm <= self.idle_rpm {
            return Err(VehicleError::invalid_value(
                "engine",
                "limiter_rpm",
                "must be above idle_rpm",
            ));
        }
        if self.idle_throttle > 1.0 {
            return Err(VehicleError::invalid_value(
                "engine",
                "idle_throttle",
                "must be within [0, 1]",
            ));
        }
        for turbo in &self.turbos {
            turbo.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub rpm: f32,
    pub throttle: f32,
    pub torque: f32,
    pub boost: f32,
    pub limiter_active: bool,
    pub life: f32,
    pub blown: bool,
}

#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    torque_curve: Curve,
    omega: f32,
    boost: Vec<f32>,
    limiter_timer: f32,
    life: f32,
    status: EngineStatus,
}

impl Engine {
    pub fn new(config: &EngineConfig, cache: &mut CurveCache) -> Result<Self> {
        config.validate()?;
        let torque_curve = cache.resolve(&config.torque_curve, "engine", "torque_curve")?;
        let omega = config.idle_rpm / RAD_TO_RPM;
        Ok(Self {
            torque_curve,
            omega,
            boost: vec![0.0; config.turbos.len()],
            limiter_timer: 0.0,
            life: config.life,
            status: EngineStatus {
                rpm: config.idle_rpm,
                life: config.life,
                ..EngineStatus::default()
            },
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn inertia(&self) -> f32 {
        self.config.inertia
    }

    pub fn omega(&self) -> f32 {
        self.omega
    }

    pub fn rpm(&self) -> f32 {
        self.omega * RAD_TO_RPM
    }

    pub fn set_omega(&mut self, omega: f32) {
        self.omega = omega.max(0.0);
    }

    pub fn is_blown(&self) -> bool {
        self.life <= 0.0
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    /// Effective throttle after limiter and idle control.
    fn governed_throttle(&mut self, throttle: f32, dt: f32) -> f32 {
        let rpm = self.rpm();
        if self.limiter_timer > 0.0 {
            self.limiter_timer -= dt;
            if self.limiter_timer < 1e-5 {
                self.limiter_timer = 0.0;
            }
        } else if rpm >= self.config.limiter_rpm {
            self.limiter_timer = self.config.limiter_cycle;
        }

        let mut throttle = throttle.clamp(0.0, 1.0);
        if self.limiter_timer > 0.0 {
            throttle = 0.0;
        }
        if rpm < self.config.idle_rpm {
            throttle = throttle.max(self.config.idle_throttle);
        }
        throttle
    }

    fn update_boost(&mut self, throttle: f32, dt: f32) -> f32 {
        let rpm = self.rpm();
        let mut total = 0.0;
        for (boost, turbo) in self.boost.iter_mut().zip(&self.config.turbos) {
            let spool = (rpm / turbo.reference_rpm).clamp(0.0, 1.0).powf(turbo.gamma);
            let target = (turbo.max_boost * throttle * spool).min(turbo.wastegate);
            let rate = if target > *boost { turbo.lag_up } else { turbo.lag_down };
            *boost += (target - *boost) * (rate * dt).min(1.0);
            total += *boost;
        }
        total
    }

    /// Engine torque for this tick at the current ω. Does not integrate ω.
    pub fn step(&mut self, throttle: f32, dt: f32) -> f32 {
        let throttle = self.governed_throttle(throttle, dt);
        let boost = self.update_boost(throttle, dt);
        let rpm = self.rpm();

        if rpm > self.config.over_rev_rpm && !self.is_blown() {
            self.life -= self.config.damage_rate * (rpm - self.config.over_rev_rpm) * dt;
            if self.life <= 0.0 {
                self.life = 0.0;
                tracing::warn!(rpm, "engine blown by over-rev");
            }
        }

        let drive = if self.is_blown() {
            0.0
        } else {
            self.torque_curve.lookup(rpm) * throttle * (1.0 + boost)
        };
        let coast = (1.0 - throttle)
            * self.config.coast_torque
            * (rpm / self.config.limiter_rpm).clamp(0.0, 1.0);
        let torque = drive - coast;

        self.status = EngineStatus {
            rpm,
            throttle,
            torque,
            boost,
            limiter_active: self.limiter_timer > 0.0,
            life: self.life,
            blown: self.is_blown(),
        };
        torque
    }
}

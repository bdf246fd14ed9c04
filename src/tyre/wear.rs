// ==============================================================================
// wear.rs — TYRE CONDITION: WEAR, GRAIN, BLISTER, FLAT SPOT, DIRT, PRESSURE
// ------------------------------------------------------------------------------
// Slow-moving state that scales grip. Every accumulator is clamped to its range
// on each update:
//   virtual_km  ≥ 0          (distance rolled, plus extra for sliding)
//   grain       0..100       (cold sliding; rubbed off by rolling)
//   blister     0..100       (hot core while sliding; permanent)
//   flat_spot   0..100       (locked sliding; permanent, gives a load ripple)
//   dirt        0..dirt_max  (picked up off track, cleaned on track)
// Pressure follows the gas law on the core temperature.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::config::cache::{CurveCache, CurveSource};
use crate::curve::Curve;
use crate::error::{Result, ensure_non_negative, ensure_positive};
use crate::physics::track::SurfaceDescriptor;

const ATMOSPHERE_PSI: f32 = 14.696;
const KELVIN: f32 = 273.15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WearConfig {
    /// virtual km → grip multiplier
    pub curve: CurveSource,
    pub slide_rate: f32, // extra virtual km per km slid
    pub grain_threshold: f32,
    pub grain_rate: f32,
    pub grain_decay: f32, // per km rolled
    pub grain_gain: f32,  // grip lost at 100
    pub blister_threshold: f32,
    pub blister_rate: f32,
    pub blister_gain: f32,
    pub flat_spot_rate: f32,
    pub flat_spot_ripple: f32, // load ripple amplitude at 100
    pub dirt_max: f32,
    pub dirt_clean_rate: f32, // per metre on a valid surface
    pub dirt_grip_loss: f32,  // grip lost at dirt_max
}

impl Default for WearConfig {
    fn default() -> Self {
        Self {
            curve: CurveSource::Inline(Curve::constant(1.0)),
            slide_rate: 4.0,
            grain_threshold: 60.0,
            grain_rate: 0.02,
            grain_decay: 20.0,
            grain_gain: 0.12,
            blister_threshold: 125.0,
            blister_rate: 0.01,
            blister_gain: 0.15,
            flat_spot_rate: 0.4,
            flat_spot_ripple: 0.15,
            dirt_max: 5.0,
            dirt_clean_rate: 0.01,
            dirt_grip_loss: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    pub static_pressure: f32,   // psi at reference_temp
    pub reference_temp: f32,    // °C
    pub ideal_pressure: f32,    // psi, hot
    pub grip_gain: f32,         // grip lost per (ratio - 1)²
    pub stiffness_gain: f32,    // exponent on ratio for carcass stiffness
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            static_pressure: 26.0,
            reference_temp: 20.0,
            ideal_pressure: 29.0,
            grip_gain: 0.6,
            stiffness_gain: 0.5,
        }
    }
}

impl PressureConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("tyre", "pressure.static_pressure", self.static_pressure)?;
        ensure_positive("tyre", "pressure.ideal_pressure", self.ideal_pressure)?;
        ensure_non_negative("tyre", "pressure.grip_gain", self.grip_gain)
    }

    /// Gauge pressure at `core_temp`, gas law on absolute values.
    pub fn dynamic(&self, core_temp: f32) -> f32 {
        let abs = (self.static_pressure + ATMOSPHERE_PSI) * (core_temp + KELVIN)
            / (self.reference_temp + KELVIN);
        (abs - ATMOSPHERE_PSI).max(0.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConditionInput {
    pub dt: f32,
    pub speed: f32,         // contact-patch speed, m/s
    pub sliding_speed: f32, // m/s
    pub surface_temp: f32,
    pub core_temp: f32,
    pub locked: bool,
    pub in_contact: bool,
    pub surface: SurfaceDescriptor,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TyreCondition {
    pub virtual_km: f32,
    pub grain: f32,
    pub blister: f32,
    pub flat_spot: f32,
    pub dirt: f32,
}

#[derive(Debug, Clone)]
pub struct WearModel {
    config: WearConfig,
    curve: Curve,
}

impl WearModel {
    pub fn new(config: &WearConfig, cache: &mut CurveCache) -> Result<Self> {
        ensure_positive("tyre-wear", "dirt_max", config.dirt_max)?;
        for (field, value) in [
            ("slide_rate", config.slide_rate),
            ("grain_rate", config.grain_rate),
            ("grain_decay", config.grain_decay),
            ("blister_rate", config.blister_rate),
            ("flat_spot_rate", config.flat_spot_rate),
            ("dirt_clean_rate", config.dirt_clean_rate),
        ] {
            ensure_non_negative("tyre-wear", field, value)?;
        }
        Ok(Self {
            curve: cache.resolve(&config.curve, "tyre-wear", "curve")?,
            config: config.clone(),
        })
    }

    pub fn update(&self, cond: &mut TyreCondition, input: &ConditionInput) {
        let c = &self.config;
        if !input.in_contact || input.dt <= 0.0 {
            return;
        }
        let rolled = input.speed.abs() * input.dt; // m
        let slid = input.sliding_speed.abs() * input.dt;

        cond.virtual_km += (rolled + slid * c.slide_rate) / 1000.0;

        if input.surface_temp < c.grain_threshold {
            cond.grain += c.grain_rate * slid * (c.grain_threshold - input.surface_temp);
        }
        cond.grain -= c.grain_decay * rolled / 1000.0;
        cond.grain = cond.grain.clamp(0.0, 100.0);

        if input.core_temp > c.blister_threshold {
            cond.blister += c.blister_rate * slid * (input.core_temp - c.blister_threshold);
        }
        cond.blister = cond.blister.clamp(0.0, 100.0);

        if input.locked {
            cond.flat_spot = (cond.flat_spot + c.flat_spot_rate * slid).clamp(0.0, 100.0);
        }

        if input.surface.is_valid_track {
            cond.dirt -= c.dirt_clean_rate * rolled;
        }
        cond.dirt += input.surface.dirt_rate * rolled;
        cond.dirt = cond.dirt.clamp(0.0, c.dirt_max);
    }

    pub fn wear_multiplier(&self, cond: &TyreCondition) -> f32 {
        self.curve.lookup(cond.virtual_km).max(0.0)
    }

    /// Grain and blister together.
    pub fn surface_multiplier(&self, cond: &TyreCondition) -> f32 {
        let c = &self.config;
        ((1.0 - c.grain_gain * cond.grain / 100.0) * (1.0 - c.blister_gain * cond.blister / 100.0))
            .max(0.0)
    }

    pub fn dirt_multiplier(&self, cond: &TyreCondition) -> f32 {
        (1.0 - self.config.dirt_grip_loss * cond.dirt / self.config.dirt_max).max(0.0)
    }

    /// Once-per-revolution load factor from a flat spot.
    pub fn flat_spot_ripple(&self, cond: &TyreCondition, phase: f32) -> f32 {
        1.0 + self.config.flat_spot_ripple * cond.flat_spot / 100.0 * phase.cos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> WearModel {
        let config = WearConfig {
            curve: CurveSource::Inline(
                Curve::new("wear", vec![[0.0, 1.0], [100.0, 0.9]]).unwrap(),
            ),
            ..WearConfig::default()
        };
        WearModel::new(&config, &mut CurveCache::new()).unwrap()
    }

    fn rolling(surface: SurfaceDescriptor) -> ConditionInput {
        ConditionInput {
            dt: 1.0,
            speed: 30.0,
            sliding_speed: 0.0,
            surface_temp: 80.0,
            core_temp: 80.0,
            locked: false,
            in_contact: true,
            surface,
        }
    }

    #[test]
    fn pressure_rises_with_core_temperature() {
        let p = PressureConfig::default();
        assert_relative_eq!(p.dynamic(p.reference_temp), p.static_pressure, epsilon = 1e-3);
        assert!(p.dynamic(90.0) > p.static_pressure + 4.0);
    }

    #[test]
    fn virtual_km_accumulates_and_wears_grip() {
        let m = model();
        let mut cond = TyreCondition::default();
        for _ in 0..1000 {
            m.update(&mut cond, &rolling(SurfaceDescriptor::default()));
        }
        assert_relative_eq!(cond.virtual_km, 30.0, epsilon = 1e-2);
        assert!(m.wear_multiplier(&cond) < 1.0);
    }

    #[test]
    fn cold_sliding_grains_and_accumulators_clamp() {
        let m = model();
        let mut cond = TyreCondition::default();
        let mut input = rolling(SurfaceDescriptor::default());
        input.sliding_speed = 10.0;
        input.surface_temp = 20.0;
        input.core_temp = 200.0;
        input.locked = true;
        for _ in 0..10_000 {
            m.update(&mut cond, &input);
        }
        assert_eq!(cond.grain, 100.0);
        assert_eq!(cond.blister, 100.0);
        assert_eq!(cond.flat_spot, 100.0);
        assert!(m.surface_multiplier(&cond) < 1.0);
    }

    #[test]
    fn dirt_is_picked_up_off_track_and_cleaned_on_track() {
        let m = model();
        let mut cond = TyreCondition::default();
        let grass = SurfaceDescriptor {
            grip: 0.6,
            category: 2,
            dirt_rate: 0.01,
            is_valid_track: false,
        };
        m.update(&mut cond, &rolling(grass));
        assert!(cond.dirt > 0.0);
        let dirty = cond.dirt;
        m.update(&mut cond, &rolling(SurfaceDescriptor::default()));
        assert!(cond.dirt < dirty);
        assert!(m.dirt_multiplier(&cond) <= 1.0);
    }

    #[test]
    fn airborne_tyre_does_not_change() {
        let m = model();
        let mut cond = TyreCondition::default();
        let mut input = rolling(SurfaceDescriptor::default());
        input.in_contact = false;
        m.update(&mut cond, &input);
        assert_eq!(cond, TyreCondition::default());
    }
}

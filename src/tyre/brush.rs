// ==============================================================================
// brush.rs — BRUSH SLIP CURVE + COMBINED-SLIP FORCE EVALUATION
// ------------------------------------------------------------------------------
// One saturating curve serves both axes. Slip on each axis is normalized by
// that axis' peak slip:
//
//   peak_x = 3·μx / Cx        nx = slip_ratio   / peak_x
//   peak_y = 3·μy / Cy        ny = tan(α)       / peak_y
//
//   s = (|nx|^p + |ny|^p)^(1/p)          p = 2 → Euclidean
//
//   f(s) = 3s − 3s² + s³                      s < 1   (classic brush)
//        = L + (1 − L)·exp(−k·(s − 1))        s ≥ 1   (slide falloff)
//
//   Fx =  μx·Fz·f(s)·nx/s      Fy = −μy·Fz·f(s)·ny/s
//
// The pure longitudinal / lateral samples f(|nx|), f(|ny|) bound the combined
// components so a combined state never exceeds what either axis could do alone.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::config::cache::{CurveCache, CurveSource};
use crate::curve::Curve;
use crate::error::{Result, VehicleError, ensure_positive};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushConfig {
    pub long_stiffness: f32,    // Cx / Fz, per unit slip ratio
    pub lat_stiffness: f32,     // Cy / Fz, per unit tan(α)
    pub falloff_level: f32,     // fraction of peak kept at large slip
    pub falloff_rate: f32,      // per unit normalized slip past the peak
    pub combined_exponent: f32, // p of the combined-slip norm
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            long_stiffness: 30.0,
            lat_stiffness: 22.0,
            falloff_level: 0.82,
            falloff_rate: 0.9,
            combined_exponent: 2.0,
        }
    }
}

impl BrushConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("tyre", "brush.long_stiffness", self.long_stiffness)?;
        ensure_positive("tyre", "brush.lat_stiffness", self.lat_stiffness)?;
        ensure_positive("tyre", "brush.falloff_rate", self.falloff_rate)?;
        ensure_positive("tyre", "brush.combined_exponent", self.combined_exponent)?;
        if !(0.0..=1.0).contains(&self.falloff_level) {
            return Err(VehicleError::invalid_value(
                "tyre",
                "brush.falloff_level",
                format!("expected 0..=1, got {}", self.falloff_level),
            ));
        }
        Ok(())
    }
}

/// Normalized brush curve. `s` is slip over peak slip; output is in units of
/// the peak force.
#[inline]
pub fn curve(s: f32, falloff_level: f32, falloff_rate: f32) -> f32 {
    let s = s.abs();
    if s < 1.0 {
        3.0 * s - 3.0 * s * s + s * s * s
    } else {
        falloff_level + (1.0 - falloff_level) * (-falloff_rate * (s - 1.0)).exp()
    }
}

#[inline]
pub fn combined_norm(nx: f32, ny: f32, p: f32) -> f32 {
    if (p - 2.0).abs() < 1e-6 {
        (nx * nx + ny * ny).sqrt()
    } else {
        (nx.abs().powf(p) + ny.abs().powf(p)).powf(1.0 / p)
    }
}

// ------------------------------------------------------------------------------
// Load sensitivity
// ------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadSensitivityConfig {
    /// μ·(Fz / Fref)^(−exponent)
    Power { reference_load: f32, exponent: f32 },
    /// μ multiplier looked up by load in newtons.
    Curve { curve: CurveSource },
}

impl Default for LoadSensitivityConfig {
    fn default() -> Self {
        Self::Power {
            reference_load: 3500.0,
            exponent: 0.12,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadSensitivity {
    Power { reference_load: f32, exponent: f32 },
    Curve(Curve),
}

impl LoadSensitivity {
    pub fn resolve(config: &LoadSensitivityConfig, cache: &mut CurveCache) -> Result<Self> {
        match config {
            LoadSensitivityConfig::Power {
                reference_load,
                exponent,
            } => {
                ensure_positive("tyre", "load_sensitivity.reference_load", *reference_load)?;
                Ok(Self::Power {
                    reference_load: *reference_load,
                    exponent: *exponent,
                })
            }
            LoadSensitivityConfig::Curve { curve } => Ok(Self::Curve(cache.resolve(
                curve,
                "tyre",
                "load_sensitivity",
            )?)),
        }
    }

    pub fn factor(&self, load: f32) -> f32 {
        match self {
            Self::Power {
                reference_load,
                exponent,
            } => {
                let ratio = (load / reference_load).max(0.05);
                ratio.powf(-exponent).clamp(0.5, 1.5)
            }
            Self::Curve(curve) => curve.lookup(load).max(0.0),
        }
    }
}

// ------------------------------------------------------------------------------
// Evaluation
// ------------------------------------------------------------------------------

/// Static friction coefficients of a compound, before any live multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct BrushCoefficients {
    pub dx0: f32,
    pub dy0: f32,
    pub load: LoadSensitivity,
    pub brush: BrushConfig,
    pub camber_gain: f32,
    pub ideal_camber: f32,
    pub pressure_grip_gain: f32,
    pub pressure_stiffness_gain: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BrushInput {
    pub load: f32,
    pub slip_ratio: f32,
    pub slip_angle: f32,
    pub camber: f32,
    /// dynamic / ideal pressure
    pub pressure_ratio: f32,
    /// wear curve multiplier
    pub wear: f32,
    /// combined grain + blister multiplier
    pub grain: f32,
    /// thermal × surface × track × dirt multiplier
    pub grip: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BrushOutput {
    pub fx: f32,
    pub fy: f32,
    pub mu_x: f32,
    pub mu_y: f32,
    pub combined_slip: f32,
    /// pure lateral force magnitude at this slip angle
    pub fy_pure: f32,
}

pub fn evaluate(c: &BrushCoefficients, input: &BrushInput) -> BrushOutput {
    let load = input.load.max(0.0);
    if load <= 0.0 {
        return BrushOutput::default();
    }

    let pressure_ratio = input.pressure_ratio.max(0.1);
    let pressure_grip = (1.0 - c.pressure_grip_gain * (pressure_ratio - 1.0).powi(2)).max(0.5);
    let camber_factor =
        (1.0 - c.camber_gain * (input.camber - c.ideal_camber).abs()).clamp(0.5, 1.0);

    let base = c.load.factor(load) * pressure_grip * input.wear * input.grain * input.grip;
    let mu_x = c.dx0 * base * camber_factor.sqrt();
    let mu_y = c.dy0 * base * camber_factor;

    let stiffness = pressure_ratio.powf(c.pressure_stiffness_gain);
    let peak_x = (3.0 * mu_x / (c.brush.long_stiffness * stiffness)).max(1e-4);
    let peak_y = (3.0 * mu_y / (c.brush.lat_stiffness * stiffness)).max(1e-4);

    let nx = input.slip_ratio / peak_x;
    let ny = input.slip_angle.tan().clamp(-1e3, 1e3) / peak_y;
    let s = combined_norm(nx, ny, c.brush.combined_exponent);

    let (level, rate) = (c.brush.falloff_level, c.brush.falloff_rate);
    let fx_pure = mu_x * load * curve(nx, level, rate);
    let fy_pure = mu_y * load * curve(ny, level, rate);

    if s < 1e-9 {
        return BrushOutput {
            mu_x,
            mu_y,
            ..BrushOutput::default()
        };
    }

    let f = curve(s, level, rate);
    let fx = (mu_x * load * f * nx / s).clamp(-fx_pure, fx_pure);
    let fy = (-mu_y * load * f * ny / s).clamp(-fy_pure, fy_pure);

    BrushOutput {
        fx,
        fy,
        mu_x,
        mu_y,
        combined_slip: s,
        fy_pure,
    }
}

// ==============================================================================
// differential.rs — TORQUE SPLIT ACROSS THE DRIVEN AXLE
// ------------------------------------------------------------------------------
// Spool : both shafts are one body. ω_l = ω_r = ω_shaft, brakes and road
//         torques summed.
// LSD   : each side gets half the input torque; a locking torque resists the
//         speed difference up to
//             cap = preload + ramp·|T_in|      (power or coast ramp)
//         The locking torque is solved implicitly (the value that would equalize
//         the shafts this step) and clamped to the cap; beyond it the road
//         torque difference free-differentiates the shafts.
// ==============================================================================

use serde::{Deserialize, Serialize};

use super::clutch::implicit_coupling_torque;
use crate::error::{Result, ensure_non_negative};
use crate::tyre::spin::integrate_spin;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DifferentialConfig {
    Spool,
    Lsd {
        preload: f32,    // N·m
        power_ramp: f32, // locking torque per N·m of input, on power
        coast_ramp: f32, // ... on overrun
    },
}

impl Default for DifferentialConfig {
    fn default() -> Self {
        DifferentialConfig::Lsd {
            preload: 60.0,
            power_ramp: 0.4,
            coast_ramp: 0.2,
        }
    }
}

impl DifferentialConfig {
    pub fn validate(&self) -> Result<()> {
        if let DifferentialConfig::Lsd {
            preload,
            power_ramp,
            coast_ramp,
        } = *self
        {
            ensure_non_negative("drivetrain", "differential.preload", preload)?;
            ensure_non_negative("drivetrain", "differential.power_ramp", power_ramp)?;
            ensure_non_negative("drivetrain", "differential.coast_ramp", coast_ramp)?;
        }
        Ok(())
    }
}

/// One output shaft with everything attached to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shaft {
    pub omega: f32,
    /// Road feedback + electric torque.
    pub torque: f32,
    pub brake: f32,
    pub inertia: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SplitResult {
    pub omega: [f32; 2],
    pub locked: [bool; 2],
    /// Torque delivered by the differential to each shaft.
    pub drive: [f32; 2],
    pub locking_torque: f32,
}

pub fn split(
    config: &DifferentialConfig,
    input_torque: f32,
    left: Shaft,
    right: Shaft,
    dt: f32,
) -> SplitResult {
    match *config {
        DifferentialConfig::Spool => {
            let inertia = left.inertia + right.inertia;
            let omega = (left.omega * left.inertia + right.omega * right.inertia) / inertia;
            let r = integrate_spin(
                omega,
                input_torque + left.torque + right.torque,
                left.brake + right.brake,
                inertia,
                dt,
            );
            SplitResult {
                omega: [r.omega, r.omega],
                locked: [r.locked, r.locked],
                drive: [input_torque * 0.5, input_torque * 0.5],
                locking_torque: 0.0,
            }
        }
        DifferentialConfig::Lsd {
            preload,
            power_ramp,
            coast_ramp,
        } => {
            let half = input_torque * 0.5;
            let mean = 0.5 * (left.omega + right.omega);
            let ramp = if input_torque * mean >= 0.0 {
                power_ramp
            } else {
                coast_ramp
            };
            let cap = preload + ramp * input_torque.abs();
            let required = implicit_coupling_torque(
                left.omega - right.omega,
                dt,
                half + left.torque,
                left.inertia,
                half + right.torque,
                right.inertia,
            );
            let lock = required.clamp(-cap, cap);

            let l = integrate_spin(left.omega, half + left.torque - lock, left.brake, left.inertia, dt);
            let r = integrate_spin(right.omega, half + right.torque + lock, right.brake, right.inertia, dt);
            SplitResult {
                omega: [l.omega, r.omega],
                locked: [l.locked, r.locked],
                drive: [half - lock, half + lock],
                locking_torque: lock,
            }
        }
    }
}

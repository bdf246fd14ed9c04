// ==============================================================================
// thermal.rs — TYRE THERMAL PATCH GRID
// ------------------------------------------------------------------------------
// stripes × elements surface cells (stripes run across the width, inner first;
// elements run around the circumference) plus one core node.
//
// Per substep (Jacobi, all flows from the previous temperatures):
//   cell ↔ circumferential and lateral neighbours   surface_transfer
//   cell ↔ core                                     core_transfer
//   cell ↔ air                                      ambient_transfer (+ speed)
//   contact cells ↔ road                            road_transfer
//   core ↔ air                                      core_ambient_transfer
//   contact cells  += friction heat (camber-weighted across stripes)
//   core           += rolling heat
//
// Exchange terms are energy conserving (flow q leaves one node and enters the
// other, each scaled by its own heat capacity). dt is split into substeps so
// that h·(Σ rates)/capacity ≤ 1 for every node: the update matrix stays
// non-negative and temperatures never overshoot their neighbours.
//
// A phase accumulator (wheel rotation angle) picks the element row facing the
// road this substep.
// ==============================================================================

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::config::cache::{CurveCache, CurveSource};
use crate::curve::Curve;
use crate::error::{Result, VehicleError, ensure_non_negative, ensure_positive};

const MAX_SUBSTEPS: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
    pub stripes: usize,
    pub elements: usize,
    pub surface_transfer: f32,      // W/K between neighbouring cells
    pub core_transfer: f32,         // W/K per cell to core
    pub ambient_transfer: f32,      // W/K per cell to air
    pub speed_cooling: f32,         // extra W/K per cell per m/s
    pub core_ambient_transfer: f32, // W/K core to air
    pub road_transfer: f32,         // W/K per contact cell to road
    pub cell_capacity: f32,         // J/K
    pub core_capacity: f32,         // J/K
    pub friction_heat: f32,         // fraction of sliding power into the surface
    pub rolling_heat: f32,          // fraction of rolling power into the core
    pub camber_spread: f32,         // heat shift across stripes per rad of camber
    pub core_weight: f32,           // weight of the core in the practical temperature
    /// practical temperature (°C) → grip multiplier
    pub performance: CurveSource,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            stripes: 3,
            elements: 8,
            surface_transfer: 2.0,
            core_transfer: 1.5,
            ambient_transfer: 0.4,
            speed_cooling: 0.02,
            core_ambient_transfer: 2.0,
            road_transfer: 1.0,
            cell_capacity: 250.0,
            core_capacity: 9000.0,
            friction_heat: 0.5,
            rolling_heat: 0.6,
            camber_spread: 6.0,
            core_weight: 0.7,
            performance: CurveSource::Inline(Curve::constant(1.0)),
        }
    }
}

impl ThermalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stripes == 0 || self.elements == 0 {
            return Err(VehicleError::invalid_value(
                "tyre-thermal",
                "stripes/elements",
                "grid needs at least one stripe and one element",
            ));
        }
        ensure_positive("tyre-thermal", "cell_capacity", self.cell_capacity)?;
        ensure_positive("tyre-thermal", "core_capacity", self.core_capacity)?;
        for (field, value) in [
            ("surface_transfer", self.surface_transfer),
            ("core_transfer", self.core_transfer),
            ("ambient_transfer", self.ambient_transfer),
            ("speed_cooling", self.speed_cooling),
            ("core_ambient_transfer", self.core_ambient_transfer),
            ("road_transfer", self.road_transfer),
            ("friction_heat", self.friction_heat),
            ("rolling_heat", self.rolling_heat),
        ] {
            ensure_non_negative("tyre-thermal", field, value)?;
        }
        if !(0.0..=1.0).contains(&self.core_weight) {
            return Err(VehicleError::invalid_value(
                "tyre-thermal",
                "core_weight",
                format!("expected 0..=1, got {}", self.core_weight),
            ));
        }
        Ok(())
    }
}

/// Per-tick drive of the grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThermalInput {
    pub dt: f32,
    pub angular_velocity: f32,
    pub in_contact: bool,
    pub friction_power: f32, // W, sliding speed × tangential force
    pub rolling_power: f32,  // W, rolling resistance × speed
    pub camber: f32,
    pub speed: f32,
    pub ambient: f32,
    pub road: f32,
}

#[derive(Debug, Clone)]
pub struct ThermalGrid {
    config: ThermalConfig,
    performance: Curve,
    cells: Vec<f32>,
    scratch: Vec<f32>,
    core: f32,
    phase: f32,
}

impl ThermalGrid {
    pub fn new(config: &ThermalConfig, cache: &mut CurveCache, initial_temp: f32) -> Result<Self> {
        config.validate()?;
        let performance = cache.resolve(&config.performance, "tyre-thermal", "performance")?;
        let n = config.stripes * config.elements;
        Ok(Self {
            config: config.clone(),
            performance,
            cells: vec![initial_temp; n],
            scratch: vec![initial_temp; n],
            core: initial_temp,
            phase: 0.0,
        })
    }

    pub fn reset(&mut self, temp: f32) {
        self.cells.fill(temp);
        self.core = temp;
        self.phase = 0.0;
    }

    #[inline]
    fn idx(&self, stripe: usize, element: usize) -> usize {
        stripe * self.config.elements + element
    }

    pub fn core(&self) -> f32 {
        self.core
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn cells(&self) -> &[f32] {
        &self.cells
    }

    pub fn contact_element(&self) -> usize {
        let e = self.config.elements;
        ((self.phase / TAU * e as f32) as usize).min(e - 1)
    }

    pub fn surface_mean(&self) -> f32 {
        self.cells.iter().sum::<f32>() / self.cells.len() as f32
    }

    /// Core-weighted temperature the grip curve is keyed on.
    pub fn practical_temp(&self) -> f32 {
        let w = self.config.core_weight;
        w * self.core + (1.0 - w) * self.surface_mean()
    }

    pub fn grip_multiplier(&self) -> f32 {
        self.performance.lookup(self.practical_temp()).max(0.0)
    }

    /// Inner / middle / outer stripe means.
    pub fn imo(&self) -> [f32; 3] {
        let s = self.config.stripes;
        let mean = |stripe: usize| {
            let row = &self.cells[self.idx(stripe, 0)..self.idx(stripe, 0) + self.config.elements];
            row.iter().sum::<f32>() / row.len() as f32
        };
        [mean(0), mean(s / 2), mean(s - 1)]
    }

    /// Heat stored relative to 0 °C, for diagnostics and tests.
    pub fn total_heat(&self) -> f32 {
        self.cells.iter().sum::<f32>() * self.config.cell_capacity
            + self.core * self.config.core_capacity
    }

    /// Share of the contact heat each stripe receives. Negative camber loads
    /// the inner stripes.
    fn stripe_weights(&self, camber: f32) -> Vec<f32> {
        let s = self.config.stripes;
        if s == 1 {
            return vec![1.0];
        }
        let raw: Vec<f32> = (0..s)
            .map(|i| {
                let x = -1.0 + 2.0 * i as f32 / (s - 1) as f32; // inner = -1
                (1.0 + self.config.camber_spread * camber * x).max(0.05)
            })
            .collect();
        let sum: f32 = raw.iter().sum();
        raw.iter().map(|w| w * s as f32 / sum).collect()
    }

    pub fn step(&mut self, input: &ThermalInput) {
        if input.dt <= 0.0 {
            return;
        }
        let c = &self.config;
        let air = c.ambient_transfer + c.speed_cooling * input.speed.abs();
        let cell_rate =
            (4.0 * c.surface_transfer + c.core_transfer + air + c.road_transfer) / c.cell_capacity;
        let core_rate = (self.cells.len() as f32 * c.core_transfer + c.core_ambient_transfer)
            / c.core_capacity;
        let max_rate = cell_rate.max(core_rate);
        let substeps = ((input.dt * max_rate).ceil() as usize).clamp(1, MAX_SUBSTEPS);
        let h = input.dt / substeps as f32;

        let weights = self.stripe_weights(input.camber);
        let surface_heat = if input.in_contact {
            input.friction_power.max(0.0) * c.friction_heat / c.stripes as f32
        } else {
            0.0
        };
        let core_heat = if input.in_contact {
            input.rolling_power.max(0.0) * c.rolling_heat
        } else {
            0.0
        };

        for _ in 0..substeps {
            self.phase = (self.phase + input.angular_velocity * h).rem_euclid(TAU);
            let contact = self.contact_element();
            self.substep(h, air, contact, &weights, surface_heat, core_heat, input);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn substep(
        &mut self,
        h: f32,
        air: f32,
        contact: usize,
        weights: &[f32],
        surface_heat: f32,
        core_heat: f32,
        input: &ThermalInput,
    ) {
        let c = &self.config;
        let (stripes, elements) = (c.stripes, c.elements);
        let mut core_flow = c.core_ambient_transfer * (input.ambient - self.core) + core_heat;

        for s in 0..stripes {
            for e in 0..elements {
                let i = s * elements + e;
                let t = self.cells[i];
                let mut q = 0.0;

                if elements > 1 {
                    let prev = s * elements + (e + elements - 1) % elements;
                    let next = s * elements + (e + 1) % elements;
                    q += c.surface_transfer * (self.cells[prev] - t);
                    if next != prev {
                        q += c.surface_transfer * (self.cells[next] - t);
                    }
                }
                if s > 0 {
                    q += c.surface_transfer * (self.cells[i - elements] - t);
                }
                if s + 1 < stripes {
                    q += c.surface_transfer * (self.cells[i + elements] - t);
                }

                let to_core = c.core_transfer * (self.core - t);
                q += to_core;
                core_flow -= to_core;

                q += air * (input.ambient - t);

                if input.in_contact && e == contact {
                    q += c.road_transfer * (input.road - t);
                    q += surface_heat * weights[s];
                }

                self.scratch[i] = t + h * q / c.cell_capacity;
            }
        }

        std::mem::swap(&mut self.cells, &mut self.scratch);
        self.core += h * core_flow / c.core_capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn insulated() -> ThermalConfig {
        ThermalConfig {
            ambient_transfer: 0.0,
            speed_cooling: 0.0,
            core_ambient_transfer: 0.0,
            road_transfer: 0.0,
            ..ThermalConfig::default()
        }
    }

    fn grid(config: &ThermalConfig, temp: f32) -> ThermalGrid {
        ThermalGrid::new(config, &mut CurveCache::new(), temp).unwrap()
    }

    fn heating(dt: f32) -> ThermalInput {
        ThermalInput {
            dt,
            angular_velocity: 60.0,
            in_contact: true,
            friction_power: 3000.0,
            rolling_power: 400.0,
            camber: -0.03,
            speed: 20.0,
            ambient: 20.0,
            road: 30.0,
        }
    }

    #[test]
    fn insulated_grid_conserves_exchanged_heat() {
        let config = insulated();
        let mut g = grid(&config, 20.0);
        g.cells[0] = 120.0;
        let before = g.total_heat();
        g.step(&ThermalInput {
            dt: 0.5,
            ambient: 20.0,
            road: 20.0,
            ..ThermalInput::default()
        });
        assert_relative_eq!(g.total_heat(), before, max_relative = 1e-4);
    }

    #[test]
    fn contact_heat_prefers_the_inner_stripe_under_negative_camber() {
        let mut g = grid(&insulated(), 20.0);
        for _ in 0..120 {
            g.step(&heating(1.0 / 60.0));
        }
        let [i, m, o] = g.imo();
        assert!(i > m && m > o, "imo = {i} {m} {o}");
    }

    #[test]
    fn huge_dt_stays_bounded() {
        let mut g = grid(&ThermalConfig::default(), 80.0);
        g.step(&ThermalInput {
            dt: 30.0,
            ambient: 20.0,
            road: 20.0,
            ..ThermalInput::default()
        });
        for &t in g.cells() {
            assert!((20.0..=80.0).contains(&t), "t = {t}");
        }
        assert!((20.0..=80.0).contains(&g.core()));
    }

    #[test]
    fn grip_follows_the_performance_curve() {
        let config = ThermalConfig {
            performance: CurveSource::Inline(
                Curve::new("perf", vec![[20.0, 0.8], [90.0, 1.0], [130.0, 0.9]]).unwrap(),
            ),
            ..ThermalConfig::default()
        };
        let cold = grid(&config, 20.0);
        let hot = grid(&config, 90.0);
        assert_relative_eq!(cold.grip_multiplier(), 0.8);
        assert_relative_eq!(hot.grip_multiplier(), 1.0);
    }

    proptest! {
        #[test]
        fn heat_only_grows_under_constant_input(
            start in 0.0f32..100.0,
            friction_power in 1.0f32..20_000.0,
            rolling_power in 0.0f32..2_000.0,
            camber in -0.1f32..0.1,
            angular_velocity in 0.0f32..200.0,
        ) {
            let mut g = grid(&insulated(), start);
            let input = ThermalInput {
                dt: 1.0 / 60.0,
                angular_velocity,
                in_contact: true,
                friction_power,
                rolling_power,
                camber,
                speed: angular_velocity * 0.32,
                ambient: start,
                road: start,
            };
            let mut last = g.total_heat();
            for _ in 0..120 {
                g.step(&input);
                let heat = g.total_heat();
                prop_assert!(heat >= last - 1e-5 * last.abs(), "{last} -> {heat}");
                last = heat;
            }
        }

        #[test]
        fn idle_core_settles_towards_ambient(
            ambient in -10.0f32..40.0,
            excess in 1.0f32..100.0,
            speed in 0.0f32..60.0,
        ) {
            let start = ambient + excess;
            let mut g = grid(&ThermalConfig::default(), start);
            let input = ThermalInput {
                dt: 5.0,
                speed,
                ambient,
                road: ambient,
                ..ThermalInput::default()
            };
            let mut last = g.core();
            for _ in 0..60 {
                g.step(&input);
                let core = g.core();
                prop_assert!(core <= last + 1e-4, "core rose {last} -> {core}");
                prop_assert!(core >= ambient - 1e-3, "core undershot to {core}");
                last = core;
            }
            prop_assert!(g.core() < start);
        }
    }
}

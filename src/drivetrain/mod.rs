// ==============================================================================
// drivetrain — ENGINE → CLUTCH → GEARBOX → DIFFERENTIAL → DRIVEN WHEELS
// ------------------------------------------------------------------------------
// One driven axle per car. Per tick (after the tyres have produced their road
// feedback torques):
//
//   g     = gearbox ratio · final ratio      (0 in neutral, < 0 in reverse)
//   J_s   = I_l + I_r + 2·J_out + J_gb·g²    driveline inertia at the wheels
//   T_c   = clutch torque that would sync ω_e and g·ω_avg after dt, reflected
//           through g, clamped to pedal capacity
//   ω_e  += dt·(T_e − T_c) / J_e
//   wheels: differential split of T_c·g plus each side's road torque
//   closed, unsaturated clutch → ω_e snapped to g·ω_avg (rigid coupling)
//
// Gear changes advance in update_shift() before the tyres run, so events reach
// the assists in the same tick.
// ==============================================================================

pub mod clutch;
pub mod differential;
pub mod engine;
pub mod events;
pub mod gearbox;

use serde::{Deserialize, Serialize};

use crate::config::cache::CurveCache;
use crate::error::{Result, VehicleError, ensure_non_negative, ensure_positive};
use crate::suspension::Corner;
use clutch::{Clutch, ClutchConfig};
use differential::{DifferentialConfig, Shaft, split};
use engine::{Engine, EngineConfig, EngineStatus};
use events::{DrivetrainEvent, EventQueue};
use gearbox::{Gearbox, GearRequest, NEUTRAL, ShiftConfig};

pub const RAD_TO_RPM: f32 = 60.0 / (2.0 * std::f32::consts::PI);

/// Pedal travel past which a gear change counts as clutched.
const CLUTCH_OPEN_PEDAL: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TractionLayout {
    #[default]
    Rwd,
    Fwd,
    Awd,
}

impl TractionLayout {
    /// Driven corners, left first. AWD has no implementation.
    pub fn driven_corners(self) -> Result<[Corner; 2]> {
        match self {
            TractionLayout::Rwd => Ok([Corner::RearLeft, Corner::RearRight]),
            TractionLayout::Fwd => Ok([Corner::FrontLeft, Corner::FrontRight]),
            TractionLayout::Awd => Err(VehicleError::unimplemented(
                "drivetrain",
                "AWD traction layout",
            )),
        }
    }
}

/// Where the driveline's reaction torques go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorqueReactionMode {
    None,
    /// Engine torque reacts on the chassis about its longitudinal axis.
    #[default]
    ReactionOnly,
    /// As above, plus each wheel's drive torque reacts on the body carrying
    /// its axle (chassis, or the axle tube of a rigid axle).
    PerWheelSplit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    pub layout: TractionLayout,
    /// Forward gear ratios, first gear first.
    pub gears: Vec<f32>,
    pub reverse: f32,
    pub final_ratio: f32,
    pub differential: DifferentialConfig,
    pub clutch: ClutchConfig,
    pub shift: ShiftConfig,
    /// Clutch disc + gearbox input, seen at the engine side.
    pub gearbox_inertia: f32,
    /// Per driven side.
    pub output_shaft_inertia: f32,
    pub torque_reaction: TorqueReactionMode,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        Self {
            layout: TractionLayout::Rwd,
            gears: vec![3.63, 2.19, 1.54, 1.21, 1.0, 0.77],
            reverse: 3.44,
            final_ratio: 4.1,
            differential: DifferentialConfig::default(),
            clutch: ClutchConfig::default(),
            shift: ShiftConfig::default(),
            gearbox_inertia: 0.02,
            output_shaft_inertia: 0.05,
            torque_reaction: TorqueReactionMode::ReactionOnly,
        }
    }
}

impl DrivetrainConfig {
    pub fn validate(&self) -> Result<()> {
        self.layout.driven_corners()?;
        ensure_positive("drivetrain", "gearbox_inertia", self.gearbox_inertia)?;
        ensure_non_negative("drivetrain", "output_shaft_inertia", self.output_shaft_inertia)?;
        self.differential.validate()?;
        self.clutch.validate()?;
        self.shift.validate()
    }
}

/// Control inputs the drivetrain reads each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrivetrainInputs {
    pub dt: f32,
    pub throttle: f32,
    /// 0 = engaged, 1 = pressed.
    pub clutch_pedal: f32,
    /// Driven wheels, left then right. `torque` is road feedback plus electric.
    pub wheels: [Shaft; 2],
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrivetrainOutput {
    pub wheel_omega: [f32; 2],
    pub locked: [bool; 2],
    /// Torque the differential puts into each driven wheel.
    pub drive_torque: [f32; 2],
    pub engine_torque: f32,
    pub clutch_torque: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DrivetrainStatus {
    pub gear: usize,
    pub pending: bool,
    pub grinding: bool,
    pub grind_window_rpm: f32,
    pub engine: EngineStatus,
    pub clutch_closed: bool,
    pub clutch_torque: f32,
    /// Gearbox output (propshaft) speed, rad/s.
    pub drive_shaft_omega: f32,
    pub output_shaft_omega: [f32; 2],
    pub drive_torque: [f32; 2],
    pub locking_torque: f32,
}

#[derive(Debug)]
pub struct Drivetrain {
    config: DrivetrainConfig,
    driven: [Corner; 2],
    engine: Engine,
    clutch: Clutch,
    gearbox: Gearbox,
    events: EventQueue,
    output_omega: [f32; 2],
    status: DrivetrainStatus,
}

impl Drivetrain {
    pub fn new(
        config: &DrivetrainConfig,
        engine: &EngineConfig,
        cache: &mut CurveCache,
    ) -> Result<Self> {
        config.validate()?;
        let driven = config.layout.driven_corners()?;
        let engine = Engine::new(engine, cache)?;
        let gearbox = Gearbox::new(&config.gears, config.reverse, config.final_ratio, &config.shift)?;
        let clutch = Clutch::new(&config.clutch)?;
        tracing::debug!(
            layout = ?config.layout,
            gears = config.gears.len(),
            "drivetrain ready"
        );
        Ok(Self {
            config: config.clone(),
            driven,
            engine,
            clutch,
            gearbox,
            events: EventQueue::default(),
            output_omega: [0.0; 2],
            status: DrivetrainStatus {
                gear: NEUTRAL,
                clutch_closed: true,
                ..DrivetrainStatus::default()
            },
        })
    }

    pub fn config(&self) -> &DrivetrainConfig {
        &self.config
    }

    pub fn driven_corners(&self) -> [Corner; 2] {
        self.driven
    }

    pub fn is_driven(&self, corner: Corner) -> bool {
        self.driven.contains(&corner)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_rpm(&self) -> f32 {
        self.engine.rpm()
    }

    pub fn gearbox(&self) -> &Gearbox {
        &self.gearbox
    }

    pub fn gear(&self) -> usize {
        self.gearbox.current()
    }

    pub fn gear_request(&self) -> GearRequest {
        self.gearbox.request()
    }

    pub fn status(&self) -> &DrivetrainStatus {
        &self.status
    }

    pub fn request_gear(&mut self, gear: usize) -> bool {
        self.gearbox.request_gear(gear, &mut self.events)
    }

    pub fn shift_up(&mut self) -> bool {
        self.gearbox.shift_up(&mut self.events)
    }

    pub fn shift_down(&mut self) -> bool {
        self.gearbox.shift_down(&mut self.events)
    }

    /// Engage `gear` with no shift sequence.
    pub fn force_gear(&mut self, gear: usize) -> Result<()> {
        self.gearbox.force_gear(gear)
    }

    pub fn set_engine_omega(&mut self, omega: f32) {
        self.engine.set_omega(omega);
    }

    /// Wheel speeds as last integrated, left then right.
    pub fn output_omega(&self) -> [f32; 2] {
        self.output_omega
    }

    /// Seed the wheel speeds the shift logic compares against (spawn,
    /// teleport, forced gear).
    pub fn set_output_omega(&mut self, omega: [f32; 2]) {
        self.output_omega = omega;
    }

    pub fn drain_events(&mut self) -> Vec<DrivetrainEvent> {
        self.events.drain().collect()
    }

    /// Advance a pending gear change using last tick's shaft speeds.
    pub fn update_shift(&mut self, dt: f32, clutch_pedal: f32) {
        let output = 0.5 * (self.output_omega[0] + self.output_omega[1]);
        let clutch_open = clutch_pedal >= CLUTCH_OPEN_PEDAL;
        self.gearbox
            .update(dt, self.engine.omega(), output, clutch_open, &mut self.events);
    }

    pub fn step(&mut self, inputs: &DrivetrainInputs) -> DrivetrainOutput {
        let dt = inputs.dt;
        let throttle = if self.gearbox.throttle_cut() {
            0.0
        } else {
            inputs.throttle
        };
        let engine_torque = self.engine.step(throttle, dt);
        let engine_inertia = self.engine.inertia();
        let g = self.gearbox.total_ratio();
        let [left, right] = inputs.wheels;

        let per_side_extra =
            self.config.output_shaft_inertia + 0.5 * self.config.gearbox_inertia * g * g;
        let left = Shaft {
            inertia: left.inertia + per_side_extra,
            ..left
        };
        let right = Shaft {
            inertia: right.inertia + per_side_extra,
            ..right
        };

        let clutch_torque = if g != 0.0 {
            let omega_avg = 0.5 * (left.omega + right.omega);
            let reflected_inertia = (left.inertia + right.inertia) / (g * g);
            let reflected_load = (left.torque + right.torque) / g;
            self.clutch.transmit(
                inputs.clutch_pedal,
                self.engine.omega() - g * omega_avg,
                dt,
                engine_torque,
                engine_inertia,
                reflected_load,
                reflected_inertia,
            )
        } else {
            0.0
        };

        let omega_e = self.engine.omega() + dt * (engine_torque - clutch_torque) / engine_inertia;
        self.engine.set_omega(omega_e);

        let result = split(&self.config.differential, clutch_torque * g, left, right, dt);
        let omega_avg = 0.5 * (result.omega[0] + result.omega[1]);

        if g != 0.0 {
            let slip_rpm = (self.engine.omega() - g * omega_avg) * RAD_TO_RPM;
            if self.clutch.is_closed() && !self.clutch.is_saturated() {
                self.engine.set_omega(g * omega_avg);
            }
            self.clutch.update_state(slip_rpm);
        }

        self.output_omega = result.omega;
        self.status = DrivetrainStatus {
            gear: self.gearbox.current(),
            pending: self.gearbox.is_pending(),
            grinding: self.gearbox.grinding(),
            grind_window_rpm: self.gearbox.grind_window_rpm(),
            engine: *self.engine.status(),
            clutch_closed: self.clutch.is_closed(),
            clutch_torque,
            drive_shaft_omega: omega_avg * self.config.final_ratio,
            output_shaft_omega: result.omega,
            drive_torque: result.drive,
            locking_torque: result.locking_torque,
        };

        DrivetrainOutput {
            wheel_omega: result.omega,
            locked: result.locked,
            drive_torque: result.drive,
            engine_torque,
            clutch_torque,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Curve;
    use approx::assert_relative_eq;
    use gearbox::FIRST;

    const DT: f32 = 1.0 / 240.0;

    fn drivetrain(config: DrivetrainConfig) -> Drivetrain {
        let engine = EngineConfig {
            torque_curve: Curve::constant(200.0).into(),
            ..EngineConfig::default()
        };
        Drivetrain::new(&config, &engine, &mut CurveCache::new()).unwrap()
    }

    fn free_wheel(omega: f32) -> Shaft {
        Shaft {
            omega,
            torque: 0.0,
            brake: 0.0,
            inertia: 1.2,
        }
    }

    fn inputs(throttle: f32, pedal: f32, wheels: [Shaft; 2]) -> DrivetrainInputs {
        DrivetrainInputs {
            dt: DT,
            throttle,
            clutch_pedal: pedal,
            wheels,
        }
    }

    #[test]
    fn awd_fails_at_init() {
        let cfg = DrivetrainConfig {
            layout: TractionLayout::Awd,
            ..DrivetrainConfig::default()
        };
        let err = Drivetrain::new(&cfg, &EngineConfig::default(), &mut CurveCache::new())
            .unwrap_err();
        assert!(matches!(err, VehicleError::Unimplemented { .. }));
        assert_eq!(err.subsystem(), "drivetrain");
    }

    #[test]
    fn layouts_pick_the_driven_axle() {
        let rwd = drivetrain(DrivetrainConfig::default());
        assert!(rwd.is_driven(Corner::RearLeft));
        assert!(!rwd.is_driven(Corner::FrontLeft));
        let fwd = drivetrain(DrivetrainConfig {
            layout: TractionLayout::Fwd,
            ..DrivetrainConfig::default()
        });
        assert_eq!(fwd.driven_corners(), [Corner::FrontLeft, Corner::FrontRight]);
    }

    #[test]
    fn neutral_revs_freely_and_leaves_wheels_alone() {
        let mut dt = drivetrain(DrivetrainConfig::default());
        let start = dt.engine_rpm();
        let out = dt.step(&inputs(1.0, 0.0, [free_wheel(0.0), free_wheel(0.0)]));
        assert!(dt.engine_rpm() > start);
        assert_eq!(out.clutch_torque, 0.0);
        assert_eq!(out.wheel_omega, [0.0, 0.0]);
    }

    #[test]
    fn closed_clutch_keeps_engine_synced_to_wheels() {
        let mut dt = drivetrain(DrivetrainConfig::default());
        dt.force_gear(FIRST).unwrap();
        let g = dt.gearbox().total_ratio();
        let wheel = 2_000.0 / RAD_TO_RPM / g;
        dt.set_engine_omega(wheel * g);
        let mut wheels = [free_wheel(wheel), free_wheel(wheel)];
        for _ in 0..20 {
            let out = dt.step(&inputs(1.0, 0.0, wheels));
            wheels[0].omega = out.wheel_omega[0];
            wheels[1].omega = out.wheel_omega[1];
            assert!(out.clutch_torque > 0.0);
        }
        let avg = 0.5 * (wheels[0].omega + wheels[1].omega);
        assert_relative_eq!(dt.engine().omega(), g * avg, max_relative = 1e-4);
        assert!(dt.engine_rpm() > 2_000.0);
    }

    #[test]
    fn pressed_clutch_decouples() {
        let mut dt = drivetrain(DrivetrainConfig::default());
        dt.force_gear(FIRST).unwrap();
        let out = dt.step(&inputs(1.0, 1.0, [free_wheel(5.0), free_wheel(5.0)]));
        assert_eq!(out.clutch_torque, 0.0);
        assert_relative_eq!(out.wheel_omega[0], 5.0, epsilon = 1e-5);
    }

    #[test]
    fn spool_keeps_driven_wheels_equal() {
        let mut dt = drivetrain(DrivetrainConfig {
            differential: DifferentialConfig::Spool,
            ..DrivetrainConfig::default()
        });
        dt.force_gear(FIRST).unwrap();
        let mut l = free_wheel(3.0);
        l.torque = -400.0;
        let out = dt.step(&inputs(1.0, 0.0, [l, free_wheel(4.0)]));
        assert_eq!(out.wheel_omega[0], out.wheel_omega[1]);
    }

    #[test]
    fn upshift_cuts_throttle_and_reports_neutral() {
        let mut dt = drivetrain(DrivetrainConfig::default());
        dt.force_gear(FIRST).unwrap();
        dt.set_engine_omega(3_000.0 / RAD_TO_RPM);
        assert!(dt.shift_up());
        assert_eq!(dt.gear(), NEUTRAL);
        dt.step(&inputs(1.0, 0.0, [free_wheel(0.0), free_wheel(0.0)]));
        assert_eq!(dt.status().engine.throttle, 0.0);
        let events = dt.drain_events();
        assert!(matches!(events[0], DrivetrainEvent::ShiftRequested { .. }));
        assert!(dt.drain_events().is_empty());
    }

    #[test]
    fn clutched_shift_engages_after_the_shift_time() {
        let mut dt = drivetrain(DrivetrainConfig::default());
        dt.force_gear(FIRST).unwrap();
        dt.shift_up();
        dt.drain_events();
        for _ in 0..40 {
            dt.update_shift(DT, 1.0);
        }
        assert_eq!(dt.gear(), FIRST + 1);
        let events = dt.drain_events();
        assert_eq!(
            events.iter().filter(|e| matches!(e, DrivetrainEvent::GearEngaged { .. })).count(),
            1
        );
    }
}

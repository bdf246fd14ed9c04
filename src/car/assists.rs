// ==============================================================================
// assists.rs — ABS, TRACTION CONTROL, AUTO-BLIP, AUTO-CLUTCH
// ------------------------------------------------------------------------------
// Assists sit between the driver's controls and the car. They read last tick's
// tyre slip and this tick's drivetrain events, and only ever reduce brake/gas
// or add clutch/blip.
//
//   ABS  : brake_scale = clamp(abs_slip / −slip_ratio, 0, 1)   when locking
//   TC   : gas        *= clamp(tc_slip / slip_ratio, 0, 1)     driven wheels
//   blip : downshift request → gas ≥ blip_throttle for blip_time
//   auto-clutch FSM (output = max(driver pedal, automation)):
//
//     Idle ── ShiftRequested ──────────────────────▶ SequenceActive (1.0)
//     Idle ── rpm < stall_rpm, in gear, no gas ────▶ RampToTarget { 1.0 }
//     SequenceActive ── GearEngaged | TimedOut ────▶ RampToTarget { 0.0 }
//     RampToTarget { 1.0 } ── stall clears ───────▶ RampToTarget { 0.0 }
//     RampToTarget { 0.0 } ── level reaches 0 ────▶ Idle
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::drivetrain::events::DrivetrainEvent;
use crate::error::{Result, ensure_non_negative, ensure_positive};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistsConfig {
    pub abs: bool,
    pub abs_slip: f32,
    pub tc: bool,
    pub tc_slip: f32,
    /// ABS and TC stay out of the way below this speed, m/s.
    pub min_speed: f32,
    pub auto_blip: bool,
    pub blip_throttle: f32,
    pub blip_time: f32,
    pub auto_clutch: bool,
    pub clutch_rate: f32, // pedal units per second
    pub stall_rpm: f32,
}

impl Default for AssistsConfig {
    fn default() -> Self {
        Self {
            abs: true,
            abs_slip: 0.15,
            tc: true,
            tc_slip: 0.12,
            min_speed: 2.0,
            auto_blip: true,
            blip_throttle: 0.6,
            blip_time: 0.15,
            auto_clutch: true,
            clutch_rate: 4.0,
            stall_rpm: 1_200.0,
        }
    }
}

impl AssistsConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("assists", "abs_slip", self.abs_slip)?;
        ensure_positive("assists", "tc_slip", self.tc_slip)?;
        ensure_non_negative("assists", "min_speed", self.min_speed)?;
        ensure_non_negative("assists", "blip_throttle", self.blip_throttle)?;
        ensure_non_negative("assists", "blip_time", self.blip_time)?;
        ensure_positive("assists", "clutch_rate", self.clutch_rate)?;
        ensure_non_negative("assists", "stall_rpm", self.stall_rpm)
    }
}

// ------------------------------------------------------------------------------
// auto-clutch
// ------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ClutchState {
    #[default]
    Idle,
    RampToTarget {
        target: f32,
    },
    SequenceActive,
}

/// What the clutch automation looks at each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClutchSense {
    pub engine_rpm: f32,
    pub in_gear: bool,
    pub gas: f32,
}

impl ClutchState {
    pub fn on_event(self, event: &DrivetrainEvent) -> Self {
        match (self, event) {
            (_, DrivetrainEvent::ShiftRequested { .. }) => ClutchState::SequenceActive,
            (
                ClutchState::SequenceActive,
                DrivetrainEvent::GearEngaged { .. } | DrivetrainEvent::RequestTimedOut { .. },
            ) => ClutchState::RampToTarget { target: 0.0 },
            (state, _) => state,
        }
    }

    pub fn on_tick(self, level: f32, sense: &ClutchSense, stall_rpm: f32) -> Self {
        let stalling = sense.in_gear && sense.engine_rpm < stall_rpm && sense.gas < 0.1;
        match self {
            ClutchState::Idle if stalling => ClutchState::RampToTarget { target: 1.0 },
            ClutchState::RampToTarget { target } if target > 0.0 && !stalling => {
                ClutchState::RampToTarget { target: 0.0 }
            }
            ClutchState::RampToTarget { target } if target == 0.0 && level <= 1e-3 => {
                ClutchState::Idle
            }
            state => state,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AutoClutch {
    state: ClutchState,
    level: f32,
}

impl AutoClutch {
    pub fn state(&self) -> ClutchState {
        self.state
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn on_event(&mut self, event: &DrivetrainEvent) {
        self.state = self.state.on_event(event);
    }

    /// Pedal to feed the drivetrain.
    pub fn update(&mut self, driver_pedal: f32, sense: &ClutchSense, rate: f32, stall_rpm: f32, dt: f32) -> f32 {
        self.state = self.state.on_tick(self.level, sense, stall_rpm);
        self.level = match self.state {
            ClutchState::Idle => 0.0,
            ClutchState::SequenceActive => 1.0,
            ClutchState::RampToTarget { target } => {
                let step = rate * dt;
                self.level + (target - self.level).clamp(-step, step)
            }
        };
        driver_pedal.max(self.level)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ------------------------------------------------------------------------------
// assists
// ------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssistInputs {
    pub dt: f32,
    pub speed: f32,
    /// Last tick's slip ratio, FL FR RL RR.
    pub slip_ratio: [f32; 4],
    pub driven: [bool; 4],
    pub engine_rpm: f32,
    pub in_gear: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssistOutput {
    pub gas: f32,
    pub clutch: f32,
    pub brake_scale: [f32; 4],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistStatus {
    pub abs_active: [bool; 4],
    pub tc_active: bool,
    pub blip_active: bool,
    pub clutch: ClutchState,
}

#[derive(Debug, Clone)]
pub struct Assists {
    config: AssistsConfig,
    clutch: AutoClutch,
    blip_timer: f32,
    status: AssistStatus,
}

impl Assists {
    pub fn new(config: &AssistsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: *config,
            clutch: AutoClutch::default(),
            blip_timer: 0.0,
            status: AssistStatus::default(),
        })
    }

    pub fn config(&self) -> &AssistsConfig {
        &self.config
    }

    pub fn status(&self) -> &AssistStatus {
        &self.status
    }

    pub fn reset(&mut self) {
        self.clutch.reset();
        self.blip_timer = 0.0;
        self.status = AssistStatus::default();
    }

    pub fn on_event(&mut self, event: &DrivetrainEvent) {
        if self.config.auto_clutch {
            self.clutch.on_event(event);
        }
        if self.config.auto_blip && event.is_downshift_request() {
            self.blip_timer = self.config.blip_time;
        }
    }

    pub fn apply(&mut self, gas: f32, brake: f32, clutch: f32, inputs: &AssistInputs) -> AssistOutput {
        let mut gas = gas;
        let mut brake_scale = [1.0; 4];
        let fast = inputs.speed.abs() > self.config.min_speed;

        self.status.abs_active = [false; 4];
        if self.config.abs && brake > 0.01 && fast {
            for (i, sr) in inputs.slip_ratio.iter().enumerate() {
                if -sr > self.config.abs_slip {
                    brake_scale[i] = (self.config.abs_slip / -sr).clamp(0.0, 1.0);
                    self.status.abs_active[i] = true;
                }
            }
        }

        self.status.tc_active = false;
        if self.config.tc && gas > 0.01 {
            let worst = inputs
                .slip_ratio
                .iter()
                .zip(inputs.driven)
                .filter(|(_, driven)| *driven)
                .map(|(sr, _)| *sr)
                .fold(0.0_f32, f32::max);
            if worst > self.config.tc_slip && fast {
                gas *= (self.config.tc_slip / worst).clamp(0.0, 1.0);
                self.status.tc_active = true;
            }
        }

        self.status.blip_active = self.blip_timer > 0.0;
        if self.blip_timer > 0.0 {
            gas = gas.max(self.config.blip_throttle);
            self.blip_timer = (self.blip_timer - inputs.dt).max(0.0);
        }

        let clutch = if self.config.auto_clutch {
            let sense = ClutchSense {
                engine_rpm: inputs.engine_rpm,
                in_gear: inputs.in_gear,
                gas,
            };
            self.clutch.update(
                clutch,
                &sense,
                self.config.clutch_rate,
                self.config.stall_rpm,
                inputs.dt,
            )
        } else {
            clutch
        };
        self.status.clutch = self.clutch.state();

        AssistOutput {
            gas,
            clutch,
            brake_scale,
        }
    }
}

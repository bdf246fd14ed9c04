// ==============================================================================
// gearbox.rs — GEAR TABLE + SHIFT STATE MACHINE
// ------------------------------------------------------------------------------
// Index convention: 0 = reverse, 1 = neutral, 2.. = forward gears 1..n.
//
//   NoRequest ──request──► ChangeUp | ChangeDown   (current reads NEUTRAL)
//        ▲                      │ elapsed ≥ shift time
//        │                      ▼
//        │               grind check ── pass ──► commit target (once)
//        │                      │
//        │                    fail: grinding, window −= damage·dt, retry
//        │                      │ elapsed ≥ request_timeout
//        └───────── abandoned, stays NEUTRAL ◄──┘
//
// Grind check: with the clutch open the gear always goes in; otherwise the
// engine / gearbox-input speed mismatch for the target gear must sit inside
// the RPM window. The window only ever shrinks, down to its floor.
//
// Standing launch: first and reverse also go in when the gearbox input is
// below launch_rpm, i.e. the car is at rest and the clutch slip takes up the
// engine speed.
// ==============================================================================

use serde::{Deserialize, Serialize};

use super::events::{DrivetrainEvent, EventQueue};
use super::RAD_TO_RPM;
use crate::error::{Result, VehicleError, ensure_non_negative, ensure_positive};

pub const REVERSE: usize = 0;
pub const NEUTRAL: usize = 1;
pub const FIRST: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShiftConfig {
    pub upshift_time: f32,   // s
    pub downshift_time: f32, // s
    pub request_timeout: f32,
    pub grind_window_rpm: f32,
    pub min_grind_window_rpm: f32,
    pub grind_damage_rate: f32, // rpm of window lost per second of grinding
    pub launch_rpm: f32,
    pub throttle_cut: bool,
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            upshift_time: 0.12,
            downshift_time: 0.15,
            request_timeout: 1.0,
            grind_window_rpm: 800.0,
            min_grind_window_rpm: 150.0,
            grind_damage_rate: 200.0,
            launch_rpm: 250.0,
            throttle_cut: true,
        }
    }
}

impl ShiftConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("drivetrain", "shift.upshift_time", self.upshift_time)?;
        ensure_non_negative("drivetrain", "shift.downshift_time", self.downshift_time)?;
        ensure_positive("drivetrain", "shift.grind_window_rpm", self.grind_window_rpm)?;
        ensure_non_negative("drivetrain", "shift.min_grind_window_rpm", self.min_grind_window_rpm)?;
        ensure_non_negative("drivetrain", "shift.grind_damage_rate", self.grind_damage_rate)?;
        ensure_non_negative("drivetrain", "shift.launch_rpm", self.launch_rpm)?;
        if self.request_timeout <= self.upshift_time.max(self.downshift_time) {
            return Err(VehicleError::invalid_value(
                "drivetrain",
                "shift.request_timeout",
                "must be longer than both shift times",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GearRequest {
    #[default]
    NoRequest,
    ChangeUp { target: usize, elapsed: f32 },
    ChangeDown { target: usize, elapsed: f32 },
}

impl GearRequest {
    pub fn target(&self) -> Option<usize> {
        match *self {
            GearRequest::NoRequest => None,
            GearRequest::ChangeUp { target, .. } | GearRequest::ChangeDown { target, .. } => {
                Some(target)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Gearbox {
    /// Gearbox ratio per index (reverse negative, neutral 0).
    ratios: Vec<f32>,
    final_ratio: f32,
    shift: ShiftConfig,
    current: usize,
    request: GearRequest,
    grind_window_rpm: f32,
    grinding: bool,
}

impl Gearbox {
    pub fn new(gears: &[f32], reverse: f32, final_ratio: f32, shift: &ShiftConfig) -> Result<Self> {
        if gears.is_empty() {
            return Err(VehicleError::missing_section("drivetrain", "gears"));
        }
        for (i, g) in gears.iter().enumerate() {
            ensure_positive("drivetrain", &format!("gears[{i}]"), *g)?;
        }
        ensure_positive("drivetrain", "reverse", reverse)?;
        ensure_positive("drivetrain", "final_ratio", final_ratio)?;
        shift.validate()?;

        let mut ratios = Vec::with_capacity(gears.len() + 2);
        ratios.push(-reverse);
        ratios.push(0.0);
        ratios.extend_from_slice(gears);
        Ok(Self {
            ratios,
            final_ratio,
            shift: *shift,
            current: NEUTRAL,
            request: GearRequest::NoRequest,
            grind_window_rpm: shift.grind_window_rpm,
            grinding: false,
        })
    }

    /// Number of indices including reverse and neutral.
    pub fn gear_count(&self) -> usize {
        self.ratios.len()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn request(&self) -> GearRequest {
        self.request
    }

    pub fn is_pending(&self) -> bool {
        self.request != GearRequest::NoRequest
    }

    pub fn grinding(&self) -> bool {
        self.grinding
    }

    pub fn grind_window_rpm(&self) -> f32 {
        self.grind_window_rpm
    }

    /// Engine-to-wheel ratio for a gear index, final drive included.
    pub fn ratio(&self, gear: usize) -> f32 {
        self.ratios.get(gear).copied().unwrap_or(0.0) * self.final_ratio
    }

    pub fn total_ratio(&self) -> f32 {
        self.ratio(self.current)
    }

    pub fn throttle_cut(&self) -> bool {
        self.shift.throttle_cut && matches!(self.request, GearRequest::ChangeUp { .. })
    }

    /// Start a change to `target`. Ignored while another change is pending,
    /// for the gear already engaged, or for an index out of range.
    pub fn request_gear(&mut self, target: usize, events: &mut EventQueue) -> bool {
        if self.is_pending() || target == self.current || target >= self.ratios.len() {
            return false;
        }
        let from = self.current;
        self.request = if target > from {
            GearRequest::ChangeUp { target, elapsed: 0.0 }
        } else {
            GearRequest::ChangeDown { target, elapsed: 0.0 }
        };
        self.current = NEUTRAL;
        events.push(DrivetrainEvent::ShiftRequested { from, to: target });
        true
    }

    pub fn shift_up(&mut self, events: &mut EventQueue) -> bool {
        self.request_gear(self.current + 1, events)
    }

    pub fn shift_down(&mut self, events: &mut EventQueue) -> bool {
        match self.current.checked_sub(1) {
            Some(target) => self.request_gear(target, events),
            None => false,
        }
    }

    /// Engage `gear` immediately, dropping any pending request.
    pub fn force_gear(&mut self, gear: usize) -> Result<()> {
        if gear >= self.ratios.len() {
            return Err(VehicleError::invalid_value(
                "drivetrain",
                "gear",
                format!("index {gear} out of range 0..{}", self.ratios.len()),
            ));
        }
        self.request = GearRequest::NoRequest;
        self.current = gear;
        self.grinding = false;
        Ok(())
    }

    /// Advance a pending change. `output_omega` is the mean driven-wheel speed.
    pub fn update(
        &mut self,
        dt: f32,
        engine_omega: f32,
        output_omega: f32,
        clutch_open: bool,
        events: &mut EventQueue,
    ) {
        let (target, elapsed, shift_time) = match &mut self.request {
            GearRequest::NoRequest => return,
            GearRequest::ChangeUp { target, elapsed } => {
                *elapsed += dt;
                (*target, *elapsed, self.shift.upshift_time)
            }
            GearRequest::ChangeDown { target, elapsed } => {
                *elapsed += dt;
                (*target, *elapsed, self.shift.downshift_time)
            }
        };

        if elapsed >= shift_time {
            let input_rpm = output_omega * self.ratio(target) * RAD_TO_RPM;
            let mismatch_rpm = (engine_omega * RAD_TO_RPM - input_rpm).abs();
            let launch =
                matches!(target, FIRST | REVERSE) && input_rpm.abs() <= self.shift.launch_rpm;
            if target == NEUTRAL || clutch_open || launch || mismatch_rpm <= self.grind_window_rpm {
                self.current = target;
                self.request = GearRequest::NoRequest;
                self.grinding = false;
                events.push(DrivetrainEvent::GearEngaged { gear: target });
                return;
            }
            if !self.grinding {
                events.push(DrivetrainEvent::Grinding {
                    target,
                    mismatch_rpm,
                });
            }
            self.grinding = true;
            self.grind_window_rpm = (self.grind_window_rpm - self.shift.grind_damage_rate * dt)
                .max(self.shift.min_grind_window_rpm);
        }

        if elapsed >= self.shift.request_timeout {
            tracing::warn!(target, "gear request timed out, left in neutral");
            self.request = GearRequest::NoRequest;
            self.grinding = false;
            events.push(DrivetrainEvent::RequestTimedOut { target });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 240.0;

    fn gearbox() -> Gearbox {
        Gearbox::new(&[3.6, 2.2, 1.5, 1.1], 3.4, 4.1, &ShiftConfig::default()).unwrap()
    }

    #[test]
    fn ratio_table_follows_the_index_convention() {
        let g = gearbox();
        assert_eq!(g.gear_count(), 6);
        assert!(g.ratio(REVERSE) < 0.0);
        assert_eq!(g.ratio(NEUTRAL), 0.0);
        assert!((g.ratio(FIRST) - 3.6 * 4.1).abs() < 1e-5);
        assert_eq!(g.ratio(99), 0.0);
    }

    #[test]
    fn upshift_reads_neutral_while_pending_and_commits_once() {
        let mut g = gearbox();
        let mut events = EventQueue::default();
        g.force_gear(FIRST).unwrap();
        assert!(g.shift_up(&mut events));
        assert!(g.throttle_cut());

        let mut engaged = 0;
        let mut neutral_ticks = 0;
        for _ in 0..240 {
            // synchronized shafts, clutch closed
            let out = 50.0;
            let engine = out * g.ratio(FIRST + 1);
            let was_pending = g.is_pending();
            g.update(DT, engine, out, false, &mut events);
            if was_pending && g.is_pending() {
                assert_eq!(g.current(), NEUTRAL);
                neutral_ticks += 1;
            }
            engaged += events
                .drain()
                .filter(|e| matches!(e, DrivetrainEvent::GearEngaged { .. }))
                .count();
            if !g.is_pending() {
                assert_eq!(g.current(), FIRST + 1);
            }
        }
        assert_eq!(engaged, 1);
        assert!(neutral_ticks >= 27);
        assert!(!g.throttle_cut());
    }

    #[test]
    fn requests_are_exclusive() {
        let mut g = gearbox();
        let mut events = EventQueue::default();
        g.force_gear(FIRST).unwrap();
        assert!(g.shift_up(&mut events));
        assert!(!g.shift_up(&mut events));
        assert!(!g.shift_down(&mut events));
        assert_eq!(g.request().target(), Some(FIRST + 1));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn mismatch_grinds_shrinks_window_then_times_out_in_neutral() {
        let mut g = gearbox();
        let mut events = EventQueue::default();
        g.force_gear(FIRST + 2).unwrap();
        assert!(g.shift_down(&mut events));
        let window = g.grind_window_rpm();

        let mut grinding_events = 0;
        let mut timed_out = false;
        for _ in 0..480 {
            // engine far below what the lower gear needs
            g.update(DT, 100.0, 60.0, false, &mut events);
            for e in events.drain() {
                match e {
                    DrivetrainEvent::Grinding { .. } => grinding_events += 1,
                    DrivetrainEvent::RequestTimedOut { .. } => timed_out = true,
                    DrivetrainEvent::GearEngaged { .. } => panic!("grinding gear engaged"),
                    DrivetrainEvent::ShiftRequested { .. } => {}
                }
            }
            assert_eq!(g.current(), NEUTRAL);
        }
        assert_eq!(grinding_events, 1);
        assert!(timed_out);
        assert!(!g.is_pending());
        assert!(g.grind_window_rpm() < window);
        assert!(g.grind_window_rpm() >= ShiftConfig::default().min_grind_window_rpm);
    }

    #[test]
    fn open_clutch_always_engages() {
        let mut g = gearbox();
        let mut events = EventQueue::default();
        g.force_gear(FIRST + 2).unwrap();
        g.shift_down(&mut events);
        for _ in 0..60 {
            g.update(DT, 100.0, 60.0, true, &mut events);
        }
        assert_eq!(g.current(), FIRST + 1);
        assert!(!g.grinding());
    }

    #[test]
    fn first_goes_in_from_rest_with_the_clutch_up() {
        let mut g = gearbox();
        let mut events = EventQueue::default();
        let idle = 900.0 / RAD_TO_RPM;
        assert!(g.request_gear(FIRST, &mut events));
        for _ in 0..60 {
            g.update(DT, idle, 0.0, false, &mut events);
        }
        assert_eq!(g.current(), FIRST);
        assert!(!g.grinding());
        assert!(
            !events
                .drain()
                .any(|e| matches!(e, DrivetrainEvent::Grinding { .. }))
        );

        // same from rest into reverse
        g.force_gear(NEUTRAL).unwrap();
        g.request_gear(REVERSE, &mut events);
        for _ in 0..60 {
            g.update(DT, idle, 0.0, false, &mut events);
        }
        assert_eq!(g.current(), REVERSE);
    }

    #[test]
    fn rolling_into_first_still_grinds() {
        let mut g = gearbox();
        let mut events = EventQueue::default();
        g.request_gear(FIRST, &mut events);
        for _ in 0..60 {
            g.update(DT, 900.0 / RAD_TO_RPM, 20.0, false, &mut events);
        }
        assert_eq!(g.current(), NEUTRAL);
        assert!(g.grinding());
    }

    #[test]
    fn bad_tables_are_rejected() {
        assert!(Gearbox::new(&[], 3.0, 4.0, &ShiftConfig::default()).is_err());
        assert!(Gearbox::new(&[3.0, -1.0], 3.0, 4.0, &ShiftConfig::default()).is_err());
        let shift = ShiftConfig {
            request_timeout: 0.1,
            ..ShiftConfig::default()
        };
        assert!(Gearbox::new(&[3.0], 3.0, 4.0, &shift).is_err());
    }
}

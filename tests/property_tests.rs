use proptest::prelude::*;

use vehicle_dynamics::drivetrain::differential::{DifferentialConfig, Shaft, split};
use vehicle_dynamics::drivetrain::events::{DrivetrainEvent, EventQueue};
use vehicle_dynamics::drivetrain::gearbox::{Gearbox, NEUTRAL, ShiftConfig};
use vehicle_dynamics::suspension::force_law::{DamperConfig, SpringConfig, force_law};
use vehicle_dynamics::tyre::brush::{
    BrushCoefficients, BrushConfig, BrushInput, LoadSensitivity, curve, evaluate,
};
use vehicle_dynamics::tyre::spin::integrate_spin;

const DT: f32 = 1.0 / 240.0;

fn coefficients() -> BrushCoefficients {
    BrushCoefficients {
        dx0: 1.2,
        dy0: 1.15,
        load: LoadSensitivity::Power {
            reference_load: 3500.0,
            exponent: 0.12,
        },
        brush: BrushConfig::default(),
        camber_gain: 0.4,
        ideal_camber: -0.03,
        pressure_grip_gain: 0.6,
        pressure_stiffness_gain: 0.5,
    }
}

fn shaft() -> impl Strategy<Value = Shaft> {
    (-150.0f32..150.0, -800.0f32..800.0, 0.0f32..3000.0, 0.5f32..3.0).prop_map(
        |(omega, torque, brake, inertia)| Shaft {
            omega,
            torque,
            brake,
            inertia,
        },
    )
}

proptest! {
    #[test]
    fn brush_curve_is_bounded(s in -20.0f32..20.0, level in 0.0f32..1.0, rate in 0.0f32..10.0) {
        let f = curve(s, level, rate);
        prop_assert!((0.0..=1.0 + 1e-6).contains(&f), "curve({s}) = {f}");
    }

    #[test]
    fn brush_curve_is_continuous_at_the_peak(level in 0.0f32..1.0, rate in 0.0f32..10.0) {
        let below = curve(1.0 - 1e-4, level, rate);
        let above = curve(1.0 + 1e-4, level, rate);
        prop_assert!((below - above).abs() < 1e-2);
        prop_assert!((curve(1.0, level, rate) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn brush_curve_settles_at_or_above_the_falloff_level(
        s in 1.0f32..1_000.0,
        level in 0.0f32..1.0,
        rate in 0.0f32..10.0,
    ) {
        prop_assert_eq!(curve(0.0, level, rate), 0.0);
        prop_assert!(curve(s, level, rate) >= level - 1e-6);
    }

    #[test]
    fn brush_curve_rises_up_to_the_peak(a in 0.0f32..1.0, b in 0.0f32..1.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(curve(lo, 0.8, 2.0) <= curve(hi, 0.8, 2.0) + 1e-6);
    }

    #[test]
    fn tyre_force_never_exceeds_friction(
        load in 0.0f32..12_000.0,
        slip_ratio in -1.0f32..3.0,
        slip_angle in -1.4f32..1.4,
        camber in -0.1f32..0.1,
        pressure_ratio in 0.6f32..1.4,
        grip in 0.3f32..1.2,
    ) {
        let out = evaluate(&coefficients(), &BrushInput {
            load,
            slip_ratio,
            slip_angle,
            camber,
            pressure_ratio,
            wear: 1.0,
            grain: 1.0,
            grip,
        });
        let tol = 1e-3 * load.max(1.0);
        prop_assert!(out.fx.abs() <= out.mu_x * load + tol);
        prop_assert!(out.fy.abs() <= out.mu_y * load + tol);
        let bound = out.mu_x.max(out.mu_y) * load;
        prop_assert!(out.fx.hypot(out.fy) <= bound + tol);
    }

    #[test]
    fn lateral_force_opposes_slip_angle(slip_angle in 0.01f32..0.5) {
        let input = BrushInput {
            load: 4_000.0,
            slip_angle,
            pressure_ratio: 1.0,
            wear: 1.0,
            grain: 1.0,
            grip: 1.0,
            ..BrushInput::default()
        };
        prop_assert!(evaluate(&coefficients(), &input).fy < 0.0);
    }

    #[test]
    fn spool_keeps_both_sides_equal(input in -4_000.0f32..4_000.0, left in shaft(), right in shaft()) {
        let r = split(&DifferentialConfig::Spool, input, left, right, DT);
        prop_assert_eq!(r.omega[0], r.omega[1]);
    }

    #[test]
    fn lsd_locking_stays_within_capacity(input in -4_000.0f32..4_000.0, left in shaft(), right in shaft()) {
        let config = DifferentialConfig::Lsd { preload: 60.0, power_ramp: 0.4, coast_ramp: 0.2 };
        let r = split(&config, input, left, right, DT);
        prop_assert!(r.locking_torque.abs() <= 60.0 + 0.4 * input.abs() + 1e-3);
        prop_assert!((r.drive[0] + r.drive[1] - input).abs() <= 1e-3 * input.abs().max(1.0));
    }

    #[test]
    fn brakes_never_reverse_a_wheel(
        omega in -80.0f32..80.0,
        free in -500.0f32..500.0,
        extra in 0.0f32..2_000.0,
        inertia in 0.5f32..3.0,
    ) {
        // brake strong enough to hold against the free torque
        let brake = free.abs() + extra;
        let r = integrate_spin(omega, free, brake, inertia, DT);
        prop_assert!(r.omega == 0.0 || r.omega.signum() == omega.signum(), "{omega} -> {}", r.omega);
    }

    #[test]
    fn spring_force_grows_with_compression(a in 0.0f32..0.2, b in 0.0f32..0.2) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let s = SpringConfig::default();
        let d = DamperConfig::default();
        prop_assert!(force_law(&s, &d, lo, 0.0).total <= force_law(&s, &d, hi, 0.0).total);
    }

    #[test]
    fn gearbox_handles_one_request_at_a_time(
        ops in prop::collection::vec((0usize..8, -200.0f32..200.0, any::<bool>()), 1..300),
    ) {
        let mut g = Gearbox::new(&[3.6, 2.2, 1.5, 1.1], 3.4, 4.1, &ShiftConfig::default()).unwrap();
        let mut events = EventQueue::default();
        let mut requested = 0usize;
        let mut settled = 0usize;
        for (target, out, clutch_open) in ops {
            g.request_gear(target, &mut events);
            g.update(DT, 300.0, out, clutch_open, &mut events);
            if g.is_pending() {
                prop_assert_eq!(g.current(), NEUTRAL);
            }
            for e in events.drain() {
                match e {
                    DrivetrainEvent::ShiftRequested { .. } => requested += 1,
                    DrivetrainEvent::GearEngaged { .. } | DrivetrainEvent::RequestTimedOut { .. } => {
                        settled += 1
                    }
                    _ => {}
                }
            }
            prop_assert!(requested - settled <= 1);
        }
    }
}

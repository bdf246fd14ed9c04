// ==============================================================================
// tyre/mod.rs — PER-WHEEL TYRE FORCE SOLVER
// ------------------------------------------------------------------------------
// Tyre::step(hub, hit, inputs), once per wheel per tick, after the suspension
// has updated the hub transform:
//
//   1) contact    : hit from Tyre::probe (ray along hub-down). No hit, no
//                   penetration, or hub tilted past max_tilt → airborne branch
//   2) slip       : heading/right split of contact-point velocity,
//                   instantaneous slip, distance-relaxed slip state
//   3) load       : k·penetration + c·penetration_rate, ≥ 0, flat-spot ripple
//   4) brush      : combined + pure samples (brush.rs)
//   5) multipliers: camber, pressure, wear, grain/blister, thermal, dirt,
//                   surface grip, track grip
//   6) heat       : sliding power → surface cells, rolling power → core
//   7) spin       : driven wheels are left to the drivetrain; free wheels
//                   integrate ω from road + brake torque with lock detection
//
// Output: world-space force at the contact point, aligning torque about the
// contact normal, and the road feedback torque on the wheel (for the
// drivetrain). Every non-finite intermediate is zeroed via math::sanitize.
// ==============================================================================

pub mod brush;
pub mod kinematics;
pub mod spin;
pub mod thermal;
pub mod wear;

use rapier3d::prelude::{Isometry, Point, Real, Vector};
use serde::{Deserialize, Serialize};

use crate::config::cache::CurveCache;
use crate::error::{Result, ensure_non_negative, ensure_positive};
use crate::math::{point_velocity, sanitize, sanitize_vec, sign, up};
use crate::physics::PhysicsWorld;
use crate::physics::track::{SurfaceDescriptor, SurfaceHit, Track};

use brush::{BrushCoefficients, BrushConfig, BrushInput, LoadSensitivity, LoadSensitivityConfig};
use kinematics::{camber_angle, contact_frame, instantaneous_slip, relax, slip_components};
use spin::integrate_spin;
use thermal::{ThermalConfig, ThermalGrid, ThermalInput};
use wear::{ConditionInput, PressureConfig, TyreCondition, WearConfig, WearModel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TyreCompoundConfig {
    pub name: String,
    pub width: f32,           // m
    pub radius: f32,          // m
    pub angular_inertia: f32, // kg·m², wheel + tyre
    pub vertical_stiffness: f32, // N/m
    pub vertical_damping: f32,   // N·s/m
    pub relaxation_length: f32,  // m
    pub min_slip_speed: f32,     // m/s, slip-ratio denominator floor
    pub dx0: f32,
    pub dy0: f32,
    pub load_sensitivity: LoadSensitivityConfig,
    pub brush: BrushConfig,
    pub camber_gain: f32,   // grip lost per rad away from ideal_camber
    pub ideal_camber: f32,  // rad
    pub rolling_resistance: f32,       // Frr / Fz at rest
    pub rolling_resistance_speed: f32, // extra Frr / Fz per m/s
    pub trail0: f32,        // m
    pub trail_falloff: f32, // rad
    pub max_aligning_torque: f32,
    pub max_tilt: f32,      // rad between hub up and ground normal
    pub pressure: PressureConfig,
    pub thermal: ThermalConfig,
    pub wear: WearConfig,
}

impl Default for TyreCompoundConfig {
    fn default() -> Self {
        Self {
            name: "street".into(),
            width: 0.225,
            radius: 0.32,
            angular_inertia: 1.2,
            vertical_stiffness: 250_000.0,
            vertical_damping: 1_500.0,
            relaxation_length: 0.25,
            min_slip_speed: 1.5,
            dx0: 1.20,
            dy0: 1.15,
            load_sensitivity: LoadSensitivityConfig::default(),
            brush: BrushConfig::default(),
            camber_gain: 0.5,
            ideal_camber: -0.03,
            rolling_resistance: 0.012,
            rolling_resistance_speed: 0.0002,
            trail0: 0.05,
            trail_falloff: 0.2,
            max_aligning_torque: 600.0,
            max_tilt: 1.0,
            pressure: PressureConfig::default(),
            thermal: ThermalConfig::default(),
            wear: WearConfig::default(),
        }
    }
}

/// A compound with every curve resolved. Immutable while the tyre runs.
#[derive(Debug, Clone)]
pub struct TyreCompound {
    pub config: TyreCompoundConfig,
    pub coefficients: BrushCoefficients,
    wear: WearModel,
}

impl TyreCompound {
    pub fn resolve(config: &TyreCompoundConfig, cache: &mut CurveCache) -> Result<Self> {
        ensure_positive("tyre", "radius", config.radius)?;
        ensure_positive("tyre", "width", config.width)?;
        ensure_positive("tyre", "angular_inertia", config.angular_inertia)?;
        ensure_positive("tyre", "vertical_stiffness", config.vertical_stiffness)?;
        ensure_non_negative("tyre", "vertical_damping", config.vertical_damping)?;
        ensure_positive("tyre", "relaxation_length", config.relaxation_length)?;
        ensure_positive("tyre", "min_slip_speed", config.min_slip_speed)?;
        ensure_positive("tyre", "dx0", config.dx0)?;
        ensure_positive("tyre", "dy0", config.dy0)?;
        ensure_positive("tyre", "trail_falloff", config.trail_falloff)?;
        config.brush.validate()?;
        config.pressure.validate()?;
        config.thermal.validate()?;

        let coefficients = BrushCoefficients {
            dx0: config.dx0,
            dy0: config.dy0,
            load: LoadSensitivity::resolve(&config.load_sensitivity, cache)?,
            brush: config.brush,
            camber_gain: config.camber_gain,
            ideal_camber: config.ideal_camber,
            pressure_grip_gain: config.pressure.grip_gain,
            pressure_stiffness_gain: config.pressure.stiffness_gain,
        };
        Ok(Self {
            wear: WearModel::new(&config.wear, cache)?,
            coefficients,
            config: config.clone(),
        })
    }
}

/// Hub state handed over by the suspension.
#[derive(Debug, Clone, Copy)]
pub struct HubKinematics {
    /// Wheel frame: origin at the wheel centre, -Z rolling direction, +X axle.
    pub pose: Isometry<Real>,
    pub linvel: Vector<Real>,
    pub angvel: Vector<Real>,
    pub com: Point<Real>,
}

#[derive(Debug, Clone, Copy)]
pub struct TyreInputs {
    pub dt: f32,
    pub brake_torque: f32,
    pub electric_torque: f32,
    pub ambient_temp: f32,
    pub road_temp: f32,
    pub track_grip: f32,
    /// ω comes from the drivetrain when true
    pub driven: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactForces {
    pub point: Point<Real>,
    pub force: Vector<Real>,
    pub aligning_torque: Vector<Real>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TyreOutput {
    pub contact: Option<ContactForces>,
    /// Torque the road puts on the wheel (−Fx·R + rolling resistance).
    pub feedback_torque: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TyreStatus {
    pub in_contact: bool,
    pub load: f32,
    pub slip_ratio: f32,
    pub slip_angle: f32,
    pub camber: f32,
    pub angular_velocity: f32,
    pub fx: f32,
    pub fy: f32,
    pub mz: f32,
    pub rolling_resistance_torque: f32,
    pub sliding_speed: f32,
    pub pressure_static: f32,
    pub pressure_dynamic: f32,
    pub core_temp: f32,
    pub imo: [f32; 3],
    pub thermal_grip: f32,
    pub grain: f32,
    pub blister: f32,
    pub flat_spot: f32,
    pub dirt: f32,
    pub virtual_km: f32,
    pub locked: bool,
    pub surface_valid: bool,
    pub contact_point: Option<[f32; 3]>,
}

#[derive(Debug, Clone)]
pub struct Tyre {
    compound: TyreCompound,
    thermal: ThermalGrid,
    condition: TyreCondition,
    /// +1 right, -1 left
    side: f32,
    omega: f32,
    slip_ratio: f32,
    slip_angle: f32,
    status: TyreStatus,
}

impl Tyre {
    pub fn new(
        config: &TyreCompoundConfig,
        cache: &mut CurveCache,
        side: f32,
        ambient_temp: f32,
    ) -> Result<Self> {
        let compound = TyreCompound::resolve(config, cache)?;
        let thermal = ThermalGrid::new(&config.thermal, cache, ambient_temp)?;
        let mut tyre = Self {
            compound,
            thermal,
            condition: TyreCondition::default(),
            side: sign(side),
            omega: 0.0,
            slip_ratio: 0.0,
            slip_angle: 0.0,
            status: TyreStatus::default(),
        };
        tyre.status.pressure_static = config.pressure.static_pressure;
        tyre.status.pressure_dynamic = config.pressure.dynamic(ambient_temp);
        Ok(tyre)
    }

    /// Swap the compound. Slip and thermal state restart, wear restarts.
    pub fn set_compound(
        &mut self,
        config: &TyreCompoundConfig,
        cache: &mut CurveCache,
        ambient_temp: f32,
    ) -> Result<()> {
        let fresh = Self::new(config, cache, self.side, ambient_temp)?;
        let omega = self.omega;
        *self = fresh;
        self.omega = omega;
        tracing::debug!(compound = %config.name, "tyre compound swapped");
        Ok(())
    }

    pub fn compound(&self) -> &TyreCompound {
        &self.compound
    }

    pub fn radius(&self) -> f32 {
        self.compound.config.radius
    }

    pub fn inertia(&self) -> f32 {
        self.compound.config.angular_inertia
    }

    pub fn angular_velocity(&self) -> f32 {
        self.omega
    }

    /// Drivetrain hand-off for driven wheels.
    pub fn set_angular_velocity(&mut self, omega: f32, locked: bool) {
        self.omega = sanitize(omega, "tyre.omega");
        self.status.angular_velocity = self.omega;
        self.status.locked = locked;
    }

    pub fn status(&self) -> &TyreStatus {
        &self.status
    }

    pub fn thermal(&self) -> &ThermalGrid {
        &self.thermal
    }

    pub fn condition(&self) -> &TyreCondition {
        &self.condition
    }

    /// Synchronous ray from the wheel centre along hub-down.
    pub fn probe(&self, hub: &HubKinematics, world: &PhysicsWorld, track: &Track) -> Option<SurfaceHit> {
        let down = -(hub.pose.rotation * up());
        let origin = Point::from(hub.pose.translation.vector);
        track.ray_cast(world, origin, down, self.radius() * 1.5)
    }

    pub fn step(
        &mut self,
        hub: &HubKinematics,
        hit: Option<&SurfaceHit>,
        inputs: &TyreInputs,
    ) -> TyreOutput {
        let cfg = &self.compound.config;
        let dt = inputs.dt;
        let radius = cfg.radius;
        let hub_up = hub.pose.rotation * up();

        let contact = hit.filter(|h| {
            h.distance < radius && hub_up.dot(&h.normal) >= cfg.max_tilt.cos()
        });

        let mut out = TyreOutput::default();
        let mut friction_power = 0.0;
        let mut rolling_power = 0.0;
        let mut speed = 0.0;
        let mut sliding_speed = 0.0;
        let mut surface = SurfaceDescriptor::default();
        let mut rr_torque = 0.0;

        self.status.in_contact = false;
        self.status.contact_point = None;
        self.status.load = 0.0;
        self.status.fx = 0.0;
        self.status.fy = 0.0;
        self.status.mz = 0.0;

        if let Some(hit) = contact {
            surface = hit.surface;
            let frame = contact_frame(&hub.pose, hit.normal);
            let v = sanitize_vec(
                point_velocity(hub.linvel, hub.angvel, hub.com, hit.point),
                "tyre.contact_velocity",
            );
            let (v_x, v_y) = slip_components(v, &frame);
            speed = (v_x * v_x + v_y * v_y).sqrt();

            // vertical spring-damper
            let penetration = radius - hit.distance;
            let penetration_rate = -v.dot(&frame.normal);
            let ripple = self
                .compound
                .wear
                .flat_spot_ripple(&self.condition, self.thermal.phase());
            let load = sanitize(
                ((cfg.vertical_stiffness * penetration + cfg.vertical_damping * penetration_rate)
                    * ripple)
                    .max(0.0),
                "tyre.load",
            );

            // slip with relaxation
            let (sr_inst, sa_inst) =
                instantaneous_slip(self.omega, radius, v_x, v_y, cfg.min_slip_speed);
            let travelled = speed * dt;
            self.slip_ratio = sanitize(
                relax(self.slip_ratio, sr_inst, travelled, cfg.relaxation_length),
                "tyre.slip_ratio",
            );
            self.slip_angle = sanitize(
                relax(self.slip_angle, sa_inst, travelled, cfg.relaxation_length),
                "tyre.slip_angle",
            );

            let camber = camber_angle(&hub.pose, frame.normal, self.side);
            let pressure_dynamic = cfg.pressure.dynamic(self.thermal.core());
            let wear = &self.compound.wear;
            let grip = self.thermal.grip_multiplier()
                * wear.dirt_multiplier(&self.condition)
                * surface.grip
                * inputs.track_grip;

            let sample = brush::evaluate(
                &self.compound.coefficients,
                &BrushInput {
                    load,
                    slip_ratio: self.slip_ratio,
                    slip_angle: self.slip_angle,
                    camber,
                    pressure_ratio: pressure_dynamic / cfg.pressure.ideal_pressure,
                    wear: wear.wear_multiplier(&self.condition),
                    grain: wear.surface_multiplier(&self.condition),
                    grip,
                },
            );
            let fx = sanitize(sample.fx, "tyre.fx");
            let fy = sanitize(sample.fy, "tyre.fy");

            let trail = cfg.trail0 * (-self.slip_angle.abs() / cfg.trail_falloff).exp();
            let mz = sanitize(
                (trail * fy).clamp(-cfg.max_aligning_torque, cfg.max_aligning_torque),
                "tyre.mz",
            );

            // rolling resistance as a torque, not from the slip curve
            let frr = load * (cfg.rolling_resistance + cfg.rolling_resistance_speed * v_x.abs());
            rr_torque = -sign(self.omega) * frr * radius;

            let slide_x = self.omega * radius - v_x;
            sliding_speed = (slide_x * slide_x + v_y * v_y).sqrt();
            friction_power = (fx * fx + fy * fy).sqrt() * sliding_speed;
            rolling_power = frr * v_x.abs();

            let force = sanitize_vec(
                frame.normal * load + frame.heading * fx + frame.right * fy,
                "tyre.force",
            );
            out.contact = Some(ContactForces {
                point: hit.point,
                force,
                aligning_torque: frame.normal * mz,
            });
            out.feedback_torque = sanitize(-fx * radius + rr_torque, "tyre.feedback_torque");

            self.status.in_contact = true;
            self.status.contact_point = Some([hit.point.x, hit.point.y, hit.point.z]);
            self.status.load = load;
            self.status.fx = fx;
            self.status.fy = fy;
            self.status.mz = mz;
            self.status.camber = camber;
            self.status.pressure_dynamic = pressure_dynamic;
        } else {
            // airborne: slip state decays with the wheel free in the air
            self.slip_ratio = 0.0;
            self.slip_angle = 0.0;
        }

        self.status.slip_ratio = self.slip_ratio;
        self.status.slip_angle = self.slip_angle;
        self.status.rolling_resistance_torque = rr_torque;
        self.status.sliding_speed = sliding_speed;
        self.status.surface_valid = surface.is_valid_track;

        // heat
        self.thermal.step(&ThermalInput {
            dt,
            angular_velocity: self.omega,
            in_contact: self.status.in_contact,
            friction_power,
            rolling_power,
            camber: self.status.camber,
            speed,
            ambient: inputs.ambient_temp,
            road: inputs.road_temp,
        });

        // wheel spin for wheels the drivetrain does not own
        if !inputs.driven {
            let r = integrate_spin(
                self.omega,
                out.feedback_torque + inputs.electric_torque,
                inputs.brake_torque,
                cfg.angular_inertia,
                dt,
            );
            self.omega = sanitize(r.omega, "tyre.omega");
            self.status.locked = r.locked;
        }
        self.status.angular_velocity = self.omega;

        // slow state
        self.compound.wear.update(
            &mut self.condition,
            &ConditionInput {
                dt,
                speed,
                sliding_speed,
                surface_temp: self.thermal.surface_mean(),
                core_temp: self.thermal.core(),
                locked: self.status.locked || (self.omega.abs() < 0.5 && speed > 2.0),
                in_contact: self.status.in_contact,
                surface,
            },
        );

        self.status.core_temp = self.thermal.core();
        self.status.imo = self.thermal.imo();
        self.status.thermal_grip = self.thermal.grip_multiplier();
        self.status.grain = self.condition.grain;
        self.status.blister = self.condition.blister;
        self.status.flat_spot = self.condition.flat_spot;
        self.status.dirt = self.condition.dirt;
        self.status.virtual_km = self.condition.virtual_km;

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rapier3d::prelude::{point, vector};

    fn tyre() -> Tyre {
        Tyre::new(&TyreCompoundConfig::default(), &mut CurveCache::new(), 1.0, 20.0).unwrap()
    }

    /// Wheel centre `height` above flat ground at origin, rolling along -Z.
    fn hub(height: f32, speed: f32) -> HubKinematics {
        HubKinematics {
            pose: Isometry::translation(0.0, height, 0.0),
            linvel: vector![0.0, 0.0, -speed],
            angvel: Vector::zeros(),
            com: point![0.0, height, 0.0],
        }
    }

    fn ground(height: f32) -> SurfaceHit {
        SurfaceHit {
            point: point![0.0, 0.0, 0.0],
            normal: up(),
            distance: height,
            surface: SurfaceDescriptor::default(),
        }
    }

    fn inputs(brake: f32) -> TyreInputs {
        TyreInputs {
            dt: 1.0 / 60.0,
            brake_torque: brake,
            electric_torque: 0.0,
            ambient_temp: 20.0,
            road_temp: 25.0,
            track_grip: 1.0,
            driven: false,
        }
    }

    #[test]
    fn pure_rolling_has_no_tangential_force_but_resists_rolling() {
        let mut t = tyre();
        let h = 0.31;
        t.set_angular_velocity(20.0 / t.radius(), false);
        let out = t.step(&hub(h, 20.0), Some(&ground(h)), &inputs(0.0));
        let s = t.status();
        assert!(s.in_contact);
        assert!(s.load > 0.0);
        assert_abs_diff_eq!(s.fx, 0.0, epsilon = 1e-2);
        assert_abs_diff_eq!(s.fy, 0.0, epsilon = 1e-2);
        assert!(s.rolling_resistance_torque < 0.0);
        assert!(out.contact.is_some());
    }

    #[test]
    fn locked_wheel_slides_at_minus_one() {
        let mut t = tyre();
        let h = 0.31;
        for _ in 0..10 {
            t.set_angular_velocity(0.0, true);
            t.step(&hub(h, 20.0), Some(&ground(h)), &inputs(5_000.0));
        }
        let s = t.status();
        assert_abs_diff_eq!(s.slip_ratio, -1.0, epsilon = 1e-3);
        assert!(s.fx < 0.0);
        assert_eq!(s.angular_velocity, 0.0);
        assert!(s.locked);
    }

    #[test]
    fn airborne_wheel_has_zero_force_and_keeps_spinning() {
        let mut t = tyre();
        t.set_angular_velocity(30.0, false);
        let out = t.step(&hub(1.0, 10.0), None, &inputs(0.0));
        assert!(out.contact.is_none());
        assert_eq!(out.feedback_torque, 0.0);
        assert_eq!(t.status().load, 0.0);
        assert_abs_diff_eq!(t.angular_velocity(), 30.0);
    }

    #[test]
    fn hit_beyond_the_radius_is_not_contact() {
        let mut t = tyre();
        let out = t.step(&hub(0.4, 0.0), Some(&ground(0.4)), &inputs(0.0));
        assert!(out.contact.is_none());
    }

    #[test]
    fn tilted_hub_is_treated_as_airborne() {
        let mut t = tyre();
        let mut k = hub(0.3, 5.0);
        k.pose.rotation = rapier3d::na::UnitQuaternion::from_axis_angle(&Vector::z_axis(), 1.4);
        let out = t.step(&k, Some(&ground(0.3)), &inputs(0.0));
        assert!(out.contact.is_none());
    }

    #[test]
    fn non_finite_kinematics_never_escape() {
        let mut t = tyre();
        let mut k = hub(0.31, 10.0);
        k.linvel.x = f32::NAN;
        let out = t.step(&k, Some(&ground(0.31)), &inputs(0.0));
        let c = out.contact.unwrap();
        assert!(c.force.iter().all(|v| v.is_finite()));
        assert!(out.feedback_torque.is_finite());
        assert!(t.angular_velocity().is_finite());
    }

    #[test]
    fn compound_swap_resets_slip() {
        let mut t = tyre();
        t.step(&hub(0.31, 20.0), Some(&ground(0.31)), &inputs(5_000.0));
        let soft = TyreCompoundConfig {
            name: "soft".into(),
            dx0: 1.4,
            dy0: 1.35,
            ..TyreCompoundConfig::default()
        };
        t.set_compound(&soft, &mut CurveCache::new(), 20.0).unwrap();
        assert_eq!(t.status().slip_ratio, 0.0);
        assert_eq!(t.compound().config.name, "soft");
    }
}

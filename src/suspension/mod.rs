// ==============================================================================
// suspension/mod.rs — PER-CORNER SUSPENSION (constraint-based)
// ------------------------------------------------------------------------------
// One hub rigid body per corner (a shared axle body for rigid axles), held to
// the chassis by rapier joints. The joints carry the kinematics; the spring,
// damper and stops are applied here as force pairs:
//
//   travel  x = (wheel_centre − rest_centre) · chassis_up
//   speed   v = (v_hub − v_chassis) · chassis_up        (at the wheel centre)
//   F       = force_law(x, v)
//   chassis : +F·up at the spring seat (rest_centre + up·seat_height)
//   hub     : −F·up at the wheel centre
//
// Topologies only differ in which joints they create (see wishbone.rs,
// strut.rs, rigid_axle.rs, multilink.rs). All pickups are written for the
// right-hand corner relative to the travel-0 wheel centre in chassis axes and
// mirrored in x for the left.
//
// Steering: the steer link's chassis anchor slides along chassis +X by
//   (rack offset + (side·toe + damage_toe)·arm)
// where arm is the z of the link's hub pickup. The link length never changes.
// ==============================================================================

pub mod anti_roll;
pub mod force_law;
pub mod multilink;
pub mod rigid_axle;
pub mod steering;
pub mod strut;
pub mod wishbone;

use rapier3d::na::{Translation3, UnitQuaternion};
use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VehicleError, ensure_positive};
use crate::math::{right, sanitize, sanitize_vec, up};
use crate::physics::{BodyDesc, LinkSoftness, PhysicsWorld};
use crate::tyre::HubKinematics;

use force_law::{DamperConfig, SpringConfig, force_law};
use multilink::MultilinkGeometry;
use rigid_axle::RigidAxleGeometry;
use strut::StrutGeometry;
use wishbone::WishboneGeometry;

const SUBSYSTEM: &str = "suspension";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::FrontLeft,
        Corner::FrontRight,
        Corner::RearLeft,
        Corner::RearRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// +1 right, -1 left.
    pub fn side(self) -> f32 {
        match self {
            Corner::FrontLeft | Corner::RearLeft => -1.0,
            Corner::FrontRight | Corner::RearRight => 1.0,
        }
    }

    pub fn is_front(self) -> bool {
        matches!(self, Corner::FrontLeft | Corner::FrontRight)
    }

    pub fn label(self) -> &'static str {
        match self {
            Corner::FrontLeft => "FL",
            Corner::FrontRight => "FR",
            Corner::RearLeft => "RL",
            Corner::RearRight => "RR",
        }
    }
}

/// One ball-ended link: chassis pickup and hub pickup, right-hand corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkPickup {
    pub chassis: [f32; 3],
    pub hub: [f32; 3],
}

impl LinkPickup {
    pub const fn new(chassis: [f32; 3], hub: [f32; 3]) -> Self {
        Self { chassis, hub }
    }
}

#[inline]
pub(crate) fn mirror(p: [f32; 3], side: f32) -> Vector<Real> {
    vector![p[0] * side, p[1], p[2]]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Geometry {
    Wishbone(WishboneGeometry),
    Strut(StrutGeometry),
    RigidAxle(RigidAxleGeometry),
    Multilink(MultilinkGeometry),
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry::Wishbone(WishboneGeometry::default())
    }
}

impl Geometry {
    pub fn name(&self) -> &'static str {
        match self {
            Geometry::Wishbone(_) => "wishbone",
            Geometry::Strut(_) => "strut",
            Geometry::RigidAxle(_) => "rigid_axle",
            Geometry::Multilink(_) => "multilink",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Geometry::Wishbone(g) => g.validate(),
            Geometry::Strut(g) => g.validate(),
            Geometry::RigidAxle(g) => g.validate(),
            Geometry::Multilink(g) => g.validate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspensionConfig {
    pub geometry: Geometry,
    pub spring: SpringConfig,
    pub damper: DamperConfig,
    pub hub_mass: f32,
    pub hub_inertia: [f32; 3],
    pub static_camber: f32, // rad, SAE sign
    pub toe: f32,           // rad, toe-in positive
    pub seat_height: f32,   // m above the wheel centre
    pub softness: LinkSoftness,
}

impl Default for SuspensionConfig {
    fn default() -> Self {
        Self {
            geometry: Geometry::default(),
            spring: SpringConfig::default(),
            damper: DamperConfig::default(),
            hub_mass: 18.0,
            hub_inertia: [0.4, 0.4, 0.4],
            static_camber: -0.02,
            toe: 0.0,
            seat_height: 0.35,
            softness: LinkSoftness::default(),
        }
    }
}

impl SuspensionConfig {
    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;
        self.spring.validate()?;
        self.damper.validate()?;
        ensure_positive(SUBSYSTEM, "hub_mass", self.hub_mass)?;
        for (i, v) in self.hub_inertia.iter().enumerate() {
            ensure_positive(SUBSYSTEM, &format!("hub_inertia[{i}]"), *v)?;
        }
        ensure_positive(SUBSYSTEM, "softness.stiffness", self.softness.stiffness)?;
        ensure_positive(SUBSYSTEM, "softness.damping", self.softness.damping)
    }
}

/// Spring + damper pair that can be swapped while the car runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuspensionTuning {
    pub spring: SpringConfig,
    pub damper: DamperConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SuspensionStatus {
    pub travel: f32,
    pub damper_speed: f32,
    pub spring_force: f32,
    pub bump_stop_force: f32,
    pub damper_force: f32,
    /// Spring + stops + damper.
    pub force: f32,
    pub anti_roll_force: f32,
    pub lateral_force: f32,
    pub steer_torque: f32,
    pub steer_offset: f32,
    pub hub_position: [f32; 3],
}

/// Steering axis in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteerBasis {
    pub origin: Point<Real>,
    pub axis: UnitVector<Real>,
}

/// Capability shared by every topology.
pub trait SuspensionKinematics {
    /// Seat the hub and its joints at the chassis' current pose, at static
    /// sag. `partner` is the other corner's hub for shared-body topologies.
    fn attach(
        &mut self,
        world: &mut PhysicsWorld,
        chassis: RigidBodyHandle,
        partner: Option<RigidBodyHandle>,
    ) -> Result<()>;

    /// Remove joints and owned bodies.
    fn stop(&mut self, world: &mut PhysicsWorld);

    fn step(&mut self, world: &mut PhysicsWorld, dt: f32) -> Result<()>;

    fn add_force_at_pos(
        &mut self,
        world: &mut PhysicsWorld,
        force: Vector<Real>,
        pos: Point<Real>,
        accumulate_steer_torque: bool,
    ) -> Result<()>;

    fn add_torque(&mut self, world: &mut PhysicsWorld, torque: Vector<Real>) -> Result<()>;

    fn set_steer_length_offset(&mut self, world: &mut PhysicsWorld, offset: f32) -> Result<()>;

    /// Wheel frame: origin at the wheel centre, -Z rolling direction.
    fn hub_world_matrix(&self, world: &PhysicsWorld) -> Result<Isometry<Real>>;

    fn steer_basis(&self, world: &PhysicsWorld) -> Result<SteerBasis>;

    fn status(&self) -> &SuspensionStatus;
}

// ------------------------------------------------------------------------------
// attach plumbing shared by the topology modules
// ------------------------------------------------------------------------------

pub(crate) struct AttachContext<'a> {
    pub world: &'a mut PhysicsWorld,
    pub chassis: RigidBodyHandle,
    pub chassis_pose: Isometry<Real>,
    /// Travel-0 wheel centre, chassis frame.
    pub centre: Vector<Real>,
    /// Wheel pose relative to the chassis at static sag (camber + toe).
    pub wheel_local: Isometry<Real>,
    pub side: f32,
    pub softness: LinkSoftness,
    pub hub_desc: BodyDesc,
}

impl AttachContext<'_> {
    pub fn hub_world(&self) -> Isometry<Real> {
        self.chassis_pose * self.wheel_local
    }

    /// Distance link between a chassis pickup and a hub pickup. Length is
    /// taken from the current placement.
    pub fn link(
        &mut self,
        hub: RigidBodyHandle,
        hub_pose: &Isometry<Real>,
        chassis_local: Vector<Real>,
        hub_local: Vector<Real>,
    ) -> ImpulseJointHandle {
        let a1 = Point::from(chassis_local);
        let a2 = Point::from(hub_local);
        let length = (self.chassis_pose * a1 - hub_pose * a2).norm();
        self.world
            .create_link(self.chassis, a1, hub, a2, length, self.softness)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SteerLink {
    pub joint: ImpulseJointHandle,
    /// Chassis anchor at zero rack offset, no toe.
    pub base: Point<Real>,
    pub arm: f32,
}

#[derive(Debug)]
pub(crate) struct Attached {
    pub hub: RigidBodyHandle,
    pub owns_hub: bool,
    /// Wheel frame relative to the hub body.
    pub wheel_in_hub: Isometry<Real>,
    pub joints: Vec<ImpulseJointHandle>,
    pub extra_bodies: Vec<RigidBodyHandle>,
    pub steer: Option<SteerLink>,
    /// Kingpin end points, hub-body frame.
    pub kingpin: [Point<Real>; 2],
    pub lateral_stiffness: f32,
}

// ------------------------------------------------------------------------------
// Suspension
// ------------------------------------------------------------------------------

#[derive(Debug)]
pub struct Suspension {
    config: SuspensionConfig,
    corner: Corner,
    centre: Vector<Real>,
    sag: f32,
    chassis: Option<RigidBodyHandle>,
    attached: Option<Attached>,
    steer_offset: f32,
    damage_toe: f32,
    steer_torque: f32,
    status: SuspensionStatus,
}

impl Suspension {
    /// `centre` is the travel-0 wheel centre in chassis frame; `static_load`
    /// the sprung weight this corner carries at rest.
    pub fn new(
        config: &SuspensionConfig,
        corner: Corner,
        centre: Vector<Real>,
        static_load: f32,
    ) -> Result<Self> {
        config.validate()?;
        let sag = config.spring.static_travel(static_load);
        if sag >= config.spring.bump_stop_travel {
            return Err(VehicleError::invalid_value(
                SUBSYSTEM,
                format!("{}.spring.rate", corner.label()),
                format!(
                    "static sag {sag:.3} m reaches the bump stop at {:.3} m",
                    config.spring.bump_stop_travel
                ),
            ));
        }
        Ok(Self {
            config: config.clone(),
            corner,
            centre,
            sag,
            chassis: None,
            attached: None,
            steer_offset: 0.0,
            damage_toe: 0.0,
            steer_torque: 0.0,
            status: SuspensionStatus::default(),
        })
    }

    pub fn corner(&self) -> Corner {
        self.corner
    }

    pub fn config(&self) -> &SuspensionConfig {
        &self.config
    }

    pub fn sag(&self) -> f32 {
        self.sag
    }

    pub fn centre(&self) -> Vector<Real> {
        self.centre
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Body the tyre pushes on (shared axle body for rigid axles).
    pub fn hub_body(&self) -> Option<RigidBodyHandle> {
        self.attached.as_ref().map(|a| a.hub)
    }

    /// True for the corner that owns a shared axle body.
    pub fn owns_hub(&self) -> bool {
        self.attached.as_ref().is_some_and(|a| a.owns_hub)
    }

    pub fn is_rigid_axle(&self) -> bool {
        matches!(self.config.geometry, Geometry::RigidAxle(_))
    }

    /// Lever that converts a steer angle into a rack displacement, if the
    /// corner steers.
    pub fn steer_arm(&self) -> Option<f32> {
        self.attached.as_ref()?.steer.map(|s| s.arm)
    }

    pub fn set_damage_toe(&mut self, angle: f32) {
        self.damage_toe = sanitize(angle, "suspension.damage_toe");
    }

    /// Steer-axis torque accumulated since the last `step`.
    pub fn steer_torque(&self) -> f32 {
        self.steer_torque
    }

    /// Swap spring and damper. Joints and geometry stay.
    pub fn set_tuning(&mut self, tuning: &SuspensionTuning) -> Result<()> {
        tuning.spring.validate()?;
        tuning.damper.validate()?;
        self.config.spring = tuning.spring;
        self.config.damper = tuning.damper;
        tracing::debug!(corner = self.corner.label(), "suspension tuning swapped");
        Ok(())
    }

    /// Wheel pose relative to the chassis at static sag.
    fn wheel_local(&self) -> Isometry<Real> {
        let side = self.corner.side();
        let rotation = UnitQuaternion::from_axis_angle(&Vector::y_axis(), side * self.config.toe)
            * UnitQuaternion::from_axis_angle(&Vector::z_axis(), -side * self.config.static_camber);
        Isometry::from_parts(
            Translation3::from(self.centre + up() * self.sag),
            rotation,
        )
    }

    fn attached(&self) -> Result<&Attached> {
        self.attached.as_ref().ok_or_else(|| {
            VehicleError::invalid_value(
                SUBSYSTEM,
                self.corner.label(),
                "suspension used before attach",
            )
        })
    }

    fn chassis(&self) -> Result<RigidBodyHandle> {
        self.chassis.ok_or_else(|| {
            VehicleError::invalid_value(
                SUBSYSTEM,
                self.corner.label(),
                "suspension used before attach",
            )
        })
    }

    /// Hub pose and velocities for the tyre solver.
    pub fn hub_kinematics(&self, world: &PhysicsWorld) -> Result<HubKinematics> {
        let a = self.attached()?;
        let body = world.body(a.hub, SUBSYSTEM)?;
        Ok(HubKinematics {
            pose: body.position() * a.wheel_in_hub,
            linvel: *body.linvel(),
            angvel: *body.angvel(),
            com: *body.center_of_mass(),
        })
    }

    /// Extra force pair on top of the force law (anti-roll bars).
    pub fn apply_pair_force(&mut self, world: &mut PhysicsWorld, force: f32) -> Result<()> {
        let force = sanitize(force, "suspension.pair_force");
        let chassis = self.chassis()?;
        let (hub, wheel_in_hub) = {
            let a = self.attached()?;
            (a.hub, a.wheel_in_hub)
        };
        let chassis_pose = world.pose(chassis, SUBSYSTEM)?;
        let hub_pose = world.pose(hub, SUBSYSTEM)?;
        let axis = chassis_pose.rotation * up();
        let seat = chassis_pose * Point::from(self.centre + up() * self.config.seat_height);
        let wheel = hub_pose * Point::from(wheel_in_hub.translation.vector);
        world.add_force_at_point(chassis, axis * force, seat, SUBSYSTEM)?;
        world.add_force_at_point(hub, -axis * force, wheel, SUBSYSTEM)?;
        self.status.anti_roll_force += force;
        Ok(())
    }

    fn steer_anchor(&self, link: &SteerLink) -> Point<Real> {
        let toe = self.corner.side() * self.config.toe + self.damage_toe;
        link.base + right() * (self.steer_offset + toe * link.arm)
    }
}

impl SuspensionKinematics for Suspension {
    fn attach(
        &mut self,
        world: &mut PhysicsWorld,
        chassis: RigidBodyHandle,
        partner: Option<RigidBodyHandle>,
    ) -> Result<()> {
        if self.attached.is_some() {
            self.stop(world);
        }
        let (chassis_pose, chassis_linvel, chassis_angvel, chassis_com) = {
            let body = world.body(chassis, SUBSYSTEM)?;
            (*body.position(), *body.linvel(), *body.angvel(), *body.center_of_mass())
        };
        let side = self.corner.side();
        let wheel_local = self.wheel_local();
        let [ix, iy, iz] = self.config.hub_inertia;
        let hub_desc = BodyDesc::new(
            chassis_pose * wheel_local,
            self.config.hub_mass,
            vector![ix, iy, iz],
        );
        let mut ctx = AttachContext {
            world: &mut *world,
            chassis,
            chassis_pose,
            centre: self.centre,
            wheel_local,
            side,
            softness: self.config.softness,
            hub_desc,
        };

        let mut attached = match &self.config.geometry {
            Geometry::Wishbone(g) => g.attach(&mut ctx)?,
            Geometry::Strut(g) => g.attach(&mut ctx)?,
            Geometry::Multilink(g) => g.attach(&mut ctx)?,
            Geometry::RigidAxle(g) => g.attach(&mut ctx, partner)?,
        };
        // links are measured with the hub already toed; take the toe back out
        // of the reference anchor
        if let Some(link) = attached.steer.as_mut() {
            link.base -= right() * (side * self.config.toe * link.arm);
        }

        // new bodies inherit the chassis motion (teleport with velocity)
        let mut owned = attached.extra_bodies.clone();
        if attached.owns_hub {
            owned.push(attached.hub);
        }
        for handle in owned {
            let pose = ctx.world.pose(handle, SUBSYSTEM)?;
            let at = pose * Point::from(attached.wheel_in_hub.translation.vector);
            let linvel = crate::math::point_velocity(chassis_linvel, chassis_angvel, chassis_com, at);
            ctx.world
                .set_state(handle, pose, linvel, chassis_angvel, SUBSYSTEM)?;
        }

        tracing::debug!(
            corner = self.corner.label(),
            topology = self.config.geometry.name(),
            joints = attached.joints.len(),
            sag = self.sag,
            "suspension attached"
        );

        self.chassis = Some(chassis);
        self.attached = Some(attached);
        if let Some(link) = self.attached.as_ref().and_then(|a| a.steer) {
            let anchor = self.steer_anchor(&link);
            world.set_joint_anchor1(link.joint, anchor, SUBSYSTEM)?;
        }
        self.status = SuspensionStatus::default();
        Ok(())
    }

    fn stop(&mut self, world: &mut PhysicsWorld) {
        if let Some(a) = self.attached.take() {
            for joint in a.joints {
                world.remove_joint(joint);
            }
            for body in a.extra_bodies {
                world.remove_body(body);
            }
            if a.owns_hub {
                world.remove_body(a.hub);
            }
            tracing::debug!(corner = self.corner.label(), "suspension stopped");
        }
        self.chassis = None;
    }

    fn step(&mut self, world: &mut PhysicsWorld, dt: f32) -> Result<()> {
        self.steer_torque = 0.0;
        self.status.anti_roll_force = 0.0;
        self.status.lateral_force = 0.0;
        if dt <= 0.0 {
            return Ok(());
        }
        let chassis = self.chassis()?;
        let (hub, wheel_in_hub, lateral_stiffness, owns_hub) = {
            let a = self.attached()?;
            (a.hub, a.wheel_in_hub, a.lateral_stiffness, a.owns_hub)
        };

        let chassis_body = world.body(chassis, SUBSYSTEM)?;
        let chassis_pose = *chassis_body.position();
        let axis = chassis_pose.rotation * up();
        let rest = chassis_pose * Point::from(self.centre);
        let seat = chassis_pose * Point::from(self.centre + up() * self.config.seat_height);
        let v_chassis = chassis_body.velocity_at_point(&rest);

        let hub_body = world.body(hub, SUBSYSTEM)?;
        let hub_pose = *hub_body.position();
        let wheel = hub_pose * Point::from(wheel_in_hub.translation.vector);
        let v_hub = hub_body.velocity_at_point(&wheel);

        let travel = sanitize((wheel - rest).dot(&axis), "suspension.travel");
        let speed = sanitize((v_hub - v_chassis).dot(&axis), "suspension.damper_speed");
        let f = force_law(&self.config.spring, &self.config.damper, travel, speed);
        let total = sanitize(f.total, "suspension.force");

        world.add_force_at_point(chassis, axis * total, seat, SUBSYSTEM)?;
        world.add_force_at_point(hub, -axis * total, wheel, SUBSYSTEM)?;

        // leaf-spring lateral location, applied once per shared axle
        if owns_hub && lateral_stiffness > 0.0 {
            let lateral_axis = chassis_pose.rotation * right();
            let at = Point::from(hub_pose.translation.vector);
            let axle_rest = chassis_pose * point![0.0, self.centre.y, self.centre.z];
            let drift = (at - axle_rest).dot(&lateral_axis);
            let lateral = sanitize(-lateral_stiffness * drift, "suspension.lateral_force");
            world.add_force_at_point(hub, lateral_axis * lateral, at, SUBSYSTEM)?;
            world.add_force_at_point(chassis, -lateral_axis * lateral, at, SUBSYSTEM)?;
            self.status.lateral_force = lateral;
        }

        self.status.travel = travel;
        self.status.damper_speed = speed;
        self.status.spring_force = f.spring;
        self.status.bump_stop_force = f.bump_stop;
        self.status.damper_force = f.damper;
        self.status.force = total;
        self.status.steer_offset = self.steer_offset;
        self.status.hub_position = [wheel.x, wheel.y, wheel.z];
        Ok(())
    }

    fn add_force_at_pos(
        &mut self,
        world: &mut PhysicsWorld,
        force: Vector<Real>,
        pos: Point<Real>,
        accumulate_steer_torque: bool,
    ) -> Result<()> {
        let force = sanitize_vec(force, "suspension.contact_force");
        let hub = self.attached()?.hub;
        world.add_force_at_point(hub, force, pos, SUBSYSTEM)?;
        if accumulate_steer_torque {
            let basis = self.steer_basis(world)?;
            let moment = (pos - basis.origin).cross(&force);
            self.steer_torque += sanitize(moment.dot(&basis.axis), "suspension.steer_torque");
            self.status.steer_torque = self.steer_torque;
        }
        Ok(())
    }

    fn add_torque(&mut self, world: &mut PhysicsWorld, torque: Vector<Real>) -> Result<()> {
        let hub = self.attached()?.hub;
        world.add_torque(hub, torque, SUBSYSTEM)
    }

    fn set_steer_length_offset(&mut self, world: &mut PhysicsWorld, offset: f32) -> Result<()> {
        self.steer_offset = sanitize(offset, "suspension.steer_offset");
        let Some(link) = self.attached()?.steer else {
            return Ok(());
        };
        let anchor = self.steer_anchor(&link);
        world.set_joint_anchor1(link.joint, anchor, SUBSYSTEM)
    }

    fn hub_world_matrix(&self, world: &PhysicsWorld) -> Result<Isometry<Real>> {
        let a = self.attached()?;
        Ok(world.pose(a.hub, SUBSYSTEM)? * a.wheel_in_hub)
    }

    fn steer_basis(&self, world: &PhysicsWorld) -> Result<SteerBasis> {
        let a = self.attached()?;
        let pose = world.pose(a.hub, SUBSYSTEM)?;
        let lower = pose * a.kingpin[0];
        let upper = pose * a.kingpin[1];
        let axis = UnitVector::try_new(upper - lower, 1e-6)
            .unwrap_or_else(|| UnitVector::new_normalize(pose.rotation * up()));
        Ok(SteerBasis {
            origin: lower,
            axis,
        })
    }

    fn status(&self) -> &SuspensionStatus {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::GRAVITY;
    use approx::assert_relative_eq;

    const CHASSIS_MASS: f32 = 1200.0;

    fn chassis(world: &mut PhysicsWorld, height: f32) -> RigidBodyHandle {
        world.create_body(BodyDesc::new(
            Isometry::translation(0.0, height, 0.0),
            CHASSIS_MASS,
            vector![500.0, 2000.0, 1800.0],
        ))
    }

    fn corner(config: &SuspensionConfig, corner: Corner) -> Suspension {
        let centre = vector![0.78 * corner.side(), -0.2, -1.3];
        Suspension::new(config, corner, centre, CHASSIS_MASS * GRAVITY / 4.0).unwrap()
    }

    fn every_topology() -> Vec<SuspensionConfig> {
        vec![
            SuspensionConfig::default(),
            SuspensionConfig {
                geometry: Geometry::Strut(StrutGeometry::default()),
                ..SuspensionConfig::default()
            },
            SuspensionConfig {
                geometry: Geometry::Multilink(MultilinkGeometry::default()),
                ..SuspensionConfig::default()
            },
        ]
    }

    #[test]
    fn travel_is_zero_at_rest_without_load() {
        for config in every_topology() {
            let mut world = PhysicsWorld::new();
            let body = chassis(&mut world, 1.0);
            let mut s = Suspension::new(&config, Corner::FrontRight, vector![0.78, -0.2, -1.3], 0.0)
                .unwrap();
            assert_eq!(s.sag(), 0.0);
            s.attach(&mut world, body, None).unwrap();
            s.step(&mut world, 1.0 / 240.0).unwrap();
            assert_relative_eq!(s.status().travel, 0.0, epsilon = 1e-5);
            assert_relative_eq!(s.status().force, 0.0, epsilon = 1e-2);
        }
    }

    #[test]
    fn spawned_at_sag_carries_the_corner_load() {
        for config in every_topology() {
            let mut world = PhysicsWorld::new();
            let body = chassis(&mut world, 1.0);
            let mut s = corner(&config, Corner::FrontLeft);
            s.attach(&mut world, body, None).unwrap();
            s.step(&mut world, 1.0 / 240.0).unwrap();
            assert_relative_eq!(s.status().travel, s.sag(), epsilon = 1e-5);
            assert_relative_eq!(
                s.status().force,
                CHASSIS_MASS * GRAVITY / 4.0,
                max_relative = 1e-3
            );
        }
    }

    #[test]
    fn force_pairs_are_equal_and_opposite() {
        let mut world = PhysicsWorld::new();
        let body = chassis(&mut world, 1.0);
        let mut s = corner(&SuspensionConfig::default(), Corner::RearRight);
        s.attach(&mut world, body, None).unwrap();
        s.step(&mut world, 1.0 / 240.0).unwrap();
        let hub = s.hub_body().unwrap();
        let on_chassis = world.bodies[body].user_force();
        let on_hub = world.bodies[hub].user_force();
        assert_relative_eq!(on_chassis + on_hub, Vector::zeros(), epsilon = 1e-2);
        assert!(on_chassis.y > 0.0);
    }

    #[test]
    fn steering_offset_reseats_only_the_steer_link() {
        let mut world = PhysicsWorld::new();
        let body = chassis(&mut world, 1.0);
        let mut s = corner(&SuspensionConfig::default(), Corner::FrontRight);
        s.attach(&mut world, body, None).unwrap();
        let arm = s.steer_arm().unwrap();
        assert!(arm.abs() > 0.05);
        let link = s.attached.as_ref().unwrap().steer.unwrap();
        let anchors = |world: &PhysicsWorld| {
            let joint = world.joints.get(link.joint).unwrap();
            (joint.data.local_anchor1(), joint.data.local_anchor2())
        };
        let (a1, a2) = anchors(&world);
        s.set_steer_length_offset(&mut world, 0.01).unwrap();
        let (b1, b2) = anchors(&world);
        assert_relative_eq!(b1.x - a1.x, 0.01, epsilon = 1e-6);
        assert_eq!(b1.y, a1.y);
        assert_eq!(a2, b2);
    }

    #[test]
    fn contact_force_accumulates_steer_torque() {
        let mut world = PhysicsWorld::new();
        let body = chassis(&mut world, 1.0);
        let mut s = corner(&SuspensionConfig::default(), Corner::FrontRight);
        s.attach(&mut world, body, None).unwrap();
        s.step(&mut world, 1.0 / 240.0).unwrap();
        let hub = s.hub_world_matrix(&world).unwrap();
        let contact = hub * point![0.0, -0.3, 0.0];
        s.add_force_at_pos(&mut world, vector![500.0, 0.0, 0.0], contact, true)
            .unwrap();
        assert!(s.steer_torque().abs() > 0.0);
        s.add_force_at_pos(&mut world, vector![500.0, 0.0, 0.0], contact, false)
            .unwrap();
        let once = s.steer_torque();
        s.step(&mut world, 1.0 / 240.0).unwrap();
        assert!(once != 0.0);
        assert_eq!(s.steer_torque(), 0.0);
    }

    #[test]
    fn stop_removes_owned_bodies_and_joints() {
        let mut world = PhysicsWorld::new();
        let body = chassis(&mut world, 1.0);
        let config = SuspensionConfig {
            geometry: Geometry::Strut(StrutGeometry::default()),
            ..SuspensionConfig::default()
        };
        let mut s = corner(&config, Corner::FrontLeft);
        s.attach(&mut world, body, None).unwrap();
        assert_eq!(world.bodies.len(), 3);
        assert!(world.joints.len() >= 5);
        s.stop(&mut world);
        assert_eq!(world.bodies.len(), 1);
        assert_eq!(world.joints.len(), 0);
        assert!(!s.is_attached());
    }

    /// Toe and camber of the wheel relative to the chassis, rad.
    fn wheel_angles(world: &PhysicsWorld, chassis: RigidBodyHandle, s: &Suspension) -> (f32, f32) {
        let chassis_pose = world.pose(chassis, "test").unwrap();
        let wheel = s.hub_world_matrix(world).unwrap();
        let rel = chassis_pose.rotation.inverse() * wheel.rotation;
        let forward = rel * vector![0.0, 0.0, -1.0];
        let lateral = rel * Vector::x();
        (forward.x.atan2(-forward.z), lateral.y.clamp(-1.0, 1.0).asin())
    }

    /// Holds the chassis still and pushes every corner at its contact patch
    /// with corner load plus 4 kN lateral and 4 kN longitudinal for one second.
    fn load_corners(world: &mut PhysicsWorld, corners: &mut [Suspension]) {
        let dt = 1.0 / 240.0;
        for _ in 0..240 {
            for s in corners.iter_mut() {
                let hub = s.hub_body().unwrap();
                world.reset_forces(hub, "test").unwrap();
            }
            for s in corners.iter_mut() {
                s.step(world, dt).unwrap();
                let contact = s.hub_world_matrix(world).unwrap() * point![0.0, -0.3, 0.0];
                let side = s.corner().side();
                let load = CHASSIS_MASS * GRAVITY / 4.0;
                s.add_force_at_pos(world, vector![-side * 4_000.0, load, -4_000.0], contact, false)
                    .unwrap();
            }
            world.step(dt);
        }
    }

    #[test]
    fn links_hold_toe_and_camber_under_cornering_load() {
        for config in every_topology() {
            for c in [Corner::FrontLeft, Corner::RearRight] {
                let mut world = PhysicsWorld::new();
                world.gravity = Vector::zeros();
                let body = chassis(&mut world, 1.0);
                world.bodies[body].set_body_type(RigidBodyType::Fixed, true);
                let mut s = corner(&config, c);
                s.attach(&mut world, body, None).unwrap();
                let (toe0, camber0) = wheel_angles(&world, body, &s);

                let mut corners = [s];
                load_corners(&mut world, &mut corners);
                let (toe, camber) = wheel_angles(&world, body, &corners[0]);
                let name = config.geometry.name();
                assert!((toe - toe0).abs() < 0.01, "{name} {c:?} toe moved {}", toe - toe0);
                assert!(
                    (camber - camber0).abs() < 0.01,
                    "{name} {c:?} camber moved {}",
                    camber - camber0
                );
            }
        }
    }

    #[test]
    fn rigid_axle_holds_toe_under_cornering_load() {
        let config = SuspensionConfig {
            geometry: Geometry::RigidAxle(RigidAxleGeometry::default()),
            ..SuspensionConfig::default()
        };
        let mut world = PhysicsWorld::new();
        world.gravity = Vector::zeros();
        let body = chassis(&mut world, 1.0);
        world.bodies[body].set_body_type(RigidBodyType::Fixed, true);
        let mut left = corner(&config, Corner::RearLeft);
        let mut right = corner(&config, Corner::RearRight);
        left.attach(&mut world, body, None).unwrap();
        right.attach(&mut world, body, left.hub_body()).unwrap();
        let (toe0, _) = wheel_angles(&world, body, &left);

        let mut corners = [left, right];
        load_corners(&mut world, &mut corners);
        // camber follows axle roll on the springs; only steer is locked
        let (toe, _) = wheel_angles(&world, body, &corners[0]);
        assert!((toe - toe0).abs() < 0.01, "axle steered {}", toe - toe0);
    }

    #[test]
    fn sag_into_the_bump_stop_is_rejected() {
        let config = SuspensionConfig::default();
        let err = Suspension::new(&config, Corner::FrontLeft, Vector::zeros(), 1.0e6).unwrap_err();
        assert_eq!(err.subsystem(), "suspension");
    }
}

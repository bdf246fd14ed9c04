// ==============================================================================
// physics/mod.rs — RIGID-BODY ENGINE SEAM (rapier3d)
// ------------------------------------------------------------------------------
// The vehicle core never touches rapier sets directly. Everything it needs goes
// through PhysicsWorld:
//
//   bodies   : create (mass / inertia / COM), pose + velocities, remove
//   forces   : add force at world point, add force, add torque, reset
//   joints   : link (distance with softness), ball, slider, fixed
//   queries  : synchronous ray cast (asserted on the owning thread)
//   stepping : one pipeline step per fixed tick, after every car has pushed
//              its forces
//
// Collision groups:
//   TRACK   : static track surfaces (ray targets)
//   CHASSIS : car bodies, collide with TRACK only
//   PROBE   : tyre rays, hit TRACK only
// ==============================================================================

pub mod track;

use std::thread::{self, ThreadId};

use rapier3d::prelude::*;

use crate::error::{Result, VehicleError};

pub const GROUP_TRACK: Group = Group::from_bits_truncate(0b0001);
pub const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);
pub const GROUP_PROBE: Group = Group::from_bits_truncate(0b0100);

pub const GRAVITY: Real = 9.81;

/// Everything needed to create one dynamic body.
#[derive(Debug, Clone, Copy)]
pub struct BodyDesc {
    pub pose: Isometry<Real>,
    pub mass: Real,
    pub principal_inertia: Vector<Real>,
    pub local_com: Point<Real>,
    pub linear_damping: Real,
    pub angular_damping: Real,
}

impl BodyDesc {
    pub fn new(pose: Isometry<Real>, mass: Real, principal_inertia: Vector<Real>) -> Self {
        Self {
            pose,
            mass,
            principal_inertia,
            local_com: Point::origin(),
            linear_damping: 0.0,
            angular_damping: 0.0,
        }
    }
}

/// Constraint softness of a distance link. Stiffness and damping are
/// acceleration based, so the same numbers work for any body masses.
///
/// The default is bushing-hard: at 240 Hz the solver corrects ~95% of the
/// length error per step and the link stretches well under a millimetre at
/// corner loads.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LinkSoftness {
    pub stiffness: Real, // 1/s²
    pub damping: Real,   // 1/s
}

impl Default for LinkSoftness {
    fn default() -> Self {
        Self {
            stiffness: 1.0e8,
            damping: 2.0e4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    pub collider: ColliderHandle,
    pub point: Point<Real>,
    pub normal: Vector<Real>,
    pub distance: Real,
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    pub query_pipeline: QueryPipeline,
    owner: ThreadId,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    /// Empty world owned by the calling thread. Ray casts from any other
    /// thread panic.
    pub fn new() -> Self {
        Self {
            gravity: vector![0.0, -GRAVITY, 0.0],
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            owner: thread::current().id(),
        }
    }

    #[track_caller]
    fn assert_owner(&self) {
        assert_eq!(
            thread::current().id(),
            self.owner,
            "PhysicsWorld used from a thread that does not own it"
        );
    }

    // --------------------------------------------------------------------------
    // bodies
    // --------------------------------------------------------------------------

    pub fn create_body(&mut self, desc: BodyDesc) -> RigidBodyHandle {
        let rb = RigidBodyBuilder::dynamic()
            .position(desc.pose)
            .additional_mass_properties(MassProperties::new(
                desc.local_com,
                desc.mass,
                desc.principal_inertia,
            ))
            .linear_damping(desc.linear_damping)
            .angular_damping(desc.angular_damping)
            .can_sleep(false)
            .build();
        self.bodies.insert(rb)
    }

    /// Massless box collider so the chassis can hit the track.
    pub fn attach_chassis_box(
        &mut self,
        body: RigidBodyHandle,
        half_extents: Vector<Real>,
        offset: Vector<Real>,
    ) -> ColliderHandle {
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .translation(offset)
            .collision_groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_TRACK))
            .density(0.0)
            .friction(0.4)
            .restitution(0.0)
            .build();
        self.colliders
            .insert_with_parent(collider, body, &mut self.bodies)
    }

    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            true,
        );
    }

    pub fn body(&self, handle: RigidBodyHandle, subsystem: &'static str) -> Result<&RigidBody> {
        self.bodies
            .get(handle)
            .ok_or(VehicleError::MissingBody { subsystem, handle })
    }

    pub fn body_mut(
        &mut self,
        handle: RigidBodyHandle,
        subsystem: &'static str,
    ) -> Result<&mut RigidBody> {
        self.bodies
            .get_mut(handle)
            .ok_or(VehicleError::MissingBody { subsystem, handle })
    }

    pub fn pose(&self, handle: RigidBodyHandle, subsystem: &'static str) -> Result<Isometry<Real>> {
        Ok(*self.body(handle, subsystem)?.position())
    }

    /// Teleport: pose and velocities are replaced, accumulated forces dropped.
    pub fn set_state(
        &mut self,
        handle: RigidBodyHandle,
        pose: Isometry<Real>,
        linvel: Vector<Real>,
        angvel: Vector<Real>,
        subsystem: &'static str,
    ) -> Result<()> {
        let body = self.body_mut(handle, subsystem)?;
        body.set_position(pose, true);
        body.set_linvel(linvel, true);
        body.set_angvel(angvel, true);
        body.reset_forces(true);
        body.reset_torques(true);
        Ok(())
    }

    pub fn velocity_at_point(
        &self,
        handle: RigidBodyHandle,
        point: Point<Real>,
        subsystem: &'static str,
    ) -> Result<Vector<Real>> {
        Ok(self.body(handle, subsystem)?.velocity_at_point(&point))
    }

    // --------------------------------------------------------------------------
    // forces (accumulated until the next reset_forces)
    // --------------------------------------------------------------------------

    pub fn add_force_at_point(
        &mut self,
        handle: RigidBodyHandle,
        force: Vector<Real>,
        point: Point<Real>,
        subsystem: &'static str,
    ) -> Result<()> {
        let force = crate::math::sanitize_vec(force, subsystem);
        self.body_mut(handle, subsystem)?
            .add_force_at_point(force, point, true);
        Ok(())
    }

    pub fn add_torque(
        &mut self,
        handle: RigidBodyHandle,
        torque: Vector<Real>,
        subsystem: &'static str,
    ) -> Result<()> {
        let torque = crate::math::sanitize_vec(torque, subsystem);
        self.body_mut(handle, subsystem)?.add_torque(torque, true);
        Ok(())
    }

    pub fn reset_forces(&mut self, handle: RigidBodyHandle, subsystem: &'static str) -> Result<()> {
        let body = self.body_mut(handle, subsystem)?;
        body.reset_forces(true);
        body.reset_torques(true);
        Ok(())
    }

    // --------------------------------------------------------------------------
    // joints
    // --------------------------------------------------------------------------

    /// Distance link between two anchors. Length is fixed at creation.
    pub fn create_link(
        &mut self,
        body1: RigidBodyHandle,
        anchor1: Point<Real>,
        body2: RigidBodyHandle,
        anchor2: Point<Real>,
        length: Real,
        softness: LinkSoftness,
    ) -> ImpulseJointHandle {
        let joint = SpringJointBuilder::new(length, softness.stiffness, softness.damping)
            .spring_model(MotorModel::AccelerationBased)
            .local_anchor1(anchor1)
            .local_anchor2(anchor2)
            .build();
        self.joints.insert(body1, body2, joint, true)
    }

    pub fn create_ball(
        &mut self,
        body1: RigidBodyHandle,
        anchor1: Point<Real>,
        body2: RigidBodyHandle,
        anchor2: Point<Real>,
    ) -> ImpulseJointHandle {
        let joint = SphericalJointBuilder::new()
            .local_anchor1(anchor1)
            .local_anchor2(anchor2)
            .build();
        self.joints.insert(body1, body2, joint, true)
    }

    /// Slider along `axis` (body1 frame), free between `limits`.
    pub fn create_slider(
        &mut self,
        body1: RigidBodyHandle,
        anchor1: Point<Real>,
        body2: RigidBodyHandle,
        anchor2: Point<Real>,
        axis: UnitVector<Real>,
        limits: [Real; 2],
    ) -> ImpulseJointHandle {
        let joint = PrismaticJointBuilder::new(axis)
            .local_anchor1(anchor1)
            .local_anchor2(anchor2)
            .limits(limits)
            .build();
        self.joints.insert(body1, body2, joint, true)
    }

    pub fn create_fixed(
        &mut self,
        body1: RigidBodyHandle,
        frame1: Isometry<Real>,
        body2: RigidBodyHandle,
        frame2: Isometry<Real>,
    ) -> ImpulseJointHandle {
        let joint = FixedJointBuilder::new()
            .local_frame1(frame1)
            .local_frame2(frame2)
            .build();
        self.joints.insert(body1, body2, joint, true)
    }

    /// Move the first anchor of an existing joint (steering link reseat).
    pub fn set_joint_anchor1(
        &mut self,
        handle: ImpulseJointHandle,
        anchor: Point<Real>,
        subsystem: &'static str,
    ) -> Result<()> {
        let joint = self
            .joints
            .get_mut(handle)
            .ok_or(VehicleError::MissingJoint { subsystem, handle })?;
        joint.data.set_local_anchor1(anchor);
        Ok(())
    }

    pub fn remove_joint(&mut self, handle: ImpulseJointHandle) {
        self.joints.remove(handle, true);
    }

    // --------------------------------------------------------------------------
    // queries
    // --------------------------------------------------------------------------

    /// Rebuild the query acceleration structure after colliders change.
    pub fn sync_queries(&mut self) {
        self.query_pipeline.update(&self.colliders);
    }

    /// Synchronous ray cast. `dir` need not be unit; `max_distance` is in units
    /// of `dir`.
    #[track_caller]
    pub fn cast_ray(
        &self,
        origin: Point<Real>,
        dir: Vector<Real>,
        max_distance: Real,
        filter: QueryFilter,
    ) -> Option<RayHit> {
        self.assert_owner();
        let ray = Ray::new(origin, dir);
        self.query_pipeline
            .cast_ray_and_get_normal(
                &self.bodies,
                &self.colliders,
                &ray,
                max_distance,
                true,
                filter,
            )
            .map(|(collider, hit)| RayHit {
                collider,
                point: ray.point_at(hit.time_of_impact),
                normal: hit.normal,
                distance: hit.time_of_impact,
            })
    }

    /// Filter that only sees track surfaces.
    pub fn track_filter() -> QueryFilter<'static> {
        QueryFilter::exclude_dynamic().groups(InteractionGroups::new(GROUP_PROBE, GROUP_TRACK))
    }

    // --------------------------------------------------------------------------
    // stepping
    // --------------------------------------------------------------------------

    pub fn step(&mut self, dt: Real) {
        self.assert_owner();

        let hooks = ();
        let events = ();

        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &hooks,
            &events,
        );

        // Never hand a non-finite state to the next tick.
        for (handle, body) in self.bodies.iter_mut() {
            let t = body.translation();
            let bad = !(t.x.is_finite() && t.y.is_finite() && t.z.is_finite())
                || !body.linvel().iter().all(|c| c.is_finite())
                || !body.angvel().iter().all(|c| c.is_finite());
            if bad {
                tracing::warn!(?handle, "non-finite body state, velocities zeroed");
                body.set_linvel(Vector::zeros(), true);
                body.set_angvel(Vector::zeros(), true);
            }
        }
    }
}

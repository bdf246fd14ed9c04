// ==============================================================================
// car — ONE CAR, ONE TICK
// ------------------------------------------------------------------------------
// Car::tick(dt, controls, world, track) runs strictly in this order:
//
//   1) cache        : previous controls and tyre slip
//   2) controls     : gear requests, shift timers, drivetrain events → assists,
//                     steering rack → front steer-link offsets
//   3) reset        : clear accumulated forces on chassis and hubs
//   4) suspension   : force law per corner, then anti-roll bars per axle
//   5) tyres        : probe, solve, push contact force + aligning torque into
//                     the hub (front corners accumulate steer torque)
//   6) drivetrain   : engine/clutch/gearbox/differential, ω back to the
//                     driven tyres
//   7) reactions    : driveline reaction torques onto chassis or axle body
//   8) snapshot     : CarState
//
// The caller steps the PhysicsWorld after tick() returns. Nothing in here
// owns the world or the track.
// ==============================================================================

pub mod assists;
pub mod controls;
pub mod state;

use rapier3d::prelude::{Isometry, Point, Real, RigidBodyHandle, Vector, vector};

use crate::config::CarConfig;
use crate::config::cache::CurveCache;
use crate::drivetrain::differential::Shaft;
use crate::drivetrain::gearbox::NEUTRAL;
use crate::drivetrain::{Drivetrain, DrivetrainInputs, TorqueReactionMode};
use crate::error::Result;
use crate::math::{forward, quat4, right, sanitize, v3};
use crate::physics::track::Track;
use crate::physics::{BodyDesc, PhysicsWorld};
use crate::suspension::anti_roll::AntiRollBar;
use crate::suspension::steering::SteeringRack;
use crate::suspension::{Corner, Suspension, SuspensionKinematics, SuspensionTuning};
use crate::tyre::{Tyre, TyreCompoundConfig, TyreInputs};

use assists::{AssistInputs, Assists};
use controls::CarControls;
use state::{CarState, WheelState};

const SUBSYSTEM: &str = "car";

/// Mutable access to two distinct corners of one slice.
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert!(a < b);
    let (lo, hi) = items.split_at_mut(b);
    (&mut lo[a], &mut hi[0])
}

pub struct Car {
    config: CarConfig,
    chassis: RigidBodyHandle,
    /// Indexed by Corner::index().
    suspensions: Vec<Suspension>,
    tyres: Vec<Tyre>,
    anti_roll: [AntiRollBar; 2],
    drivetrain: Drivetrain,
    steering: SteeringRack,
    assists: Assists,
    controls: CarControls,
    steer_angles: [f32; 4],
    tick: u64,
    state: CarState,
}

impl Car {
    /// Build every subsystem and seat the car at `pose` (chassis centre of
    /// mass). Any configuration problem is fatal for this car.
    pub fn spawn(
        config: &CarConfig,
        cache: &mut CurveCache,
        world: &mut PhysicsWorld,
        track: &Track,
        pose: Isometry<Real>,
    ) -> Result<Self> {
        let car = Self::build(config, cache, world, track, pose);
        if let Err(err) = &car {
            tracing::error!(car = %config.name, %err, "car spawn failed");
        }
        car
    }

    fn build(
        config: &CarConfig,
        cache: &mut CurveCache,
        world: &mut PhysicsWorld,
        track: &Track,
        pose: Isometry<Real>,
    ) -> Result<Self> {
        config.validate()?;

        let mut suspensions = Vec::with_capacity(4);
        let mut tyres = Vec::with_capacity(4);
        for corner in Corner::ALL {
            let axle = config.axle(corner.is_front());
            let centre = vector![corner.side() * axle.half_track, axle.wheel_y, axle.z];
            suspensions.push(Suspension::new(
                &axle.suspension,
                corner,
                centre,
                config.corner_load(corner.is_front()),
            )?);
            tyres.push(Tyre::new(&axle.tyre, cache, corner.side(), track.ambient_temp)?);
        }
        let drivetrain = Drivetrain::new(&config.drivetrain, &config.engine, cache)?;
        let steering = SteeringRack::new(
            &config.steering,
            config.wheelbase(),
            2.0 * config.front.half_track,
        )?;
        let anti_roll = [
            AntiRollBar::new(config.front.anti_roll)?,
            AntiRollBar::new(config.rear.anti_roll)?,
        ];
        let assists = Assists::new(&config.assists)?;

        let c = &config.chassis;
        let chassis = world.create_body(BodyDesc {
            linear_damping: c.linear_damping,
            angular_damping: c.angular_damping,
            ..BodyDesc::new(pose, c.mass, c.inertia.into())
        });
        world.attach_chassis_box(chassis, c.half_extents.into(), c.collider_offset.into());

        let mut car = Self {
            config: config.clone(),
            chassis,
            suspensions,
            tyres,
            anti_roll,
            drivetrain,
            steering,
            assists,
            controls: CarControls::default(),
            steer_angles: [0.0; 4],
            tick: 0,
            state: CarState::default(),
        };
        car.attach_corners(world)?;
        car.snapshot(world, track)?;
        tracing::info!(
            car = %config.name,
            front = config.front.suspension.geometry.name(),
            rear = config.rear.suspension.geometry.name(),
            layout = ?config.drivetrain.layout,
            "car spawned"
        );
        Ok(car)
    }

    /// Left corner first so a shared axle body exists before its partner
    /// attaches.
    fn attach_corners(&mut self, world: &mut PhysicsWorld) -> Result<()> {
        for (left, right) in [
            (Corner::FrontLeft, Corner::FrontRight),
            (Corner::RearLeft, Corner::RearRight),
        ] {
            self.suspensions[left.index()].attach(world, self.chassis, None)?;
            let partner = if self.suspensions[right.index()].is_rigid_axle() {
                self.suspensions[left.index()].hub_body()
            } else {
                None
            };
            self.suspensions[right.index()].attach(world, self.chassis, partner)?;
        }
        Ok(())
    }

    pub fn config(&self) -> &CarConfig {
        &self.config
    }

    pub fn chassis(&self) -> RigidBodyHandle {
        self.chassis
    }

    pub fn state(&self) -> &CarState {
        &self.state
    }

    pub fn tyre(&self, corner: Corner) -> &Tyre {
        &self.tyres[corner.index()]
    }

    pub fn suspension(&self, corner: Corner) -> &Suspension {
        &self.suspensions[corner.index()]
    }

    pub fn drivetrain(&self) -> &Drivetrain {
        &self.drivetrain
    }

    pub fn assists(&self) -> &Assists {
        &self.assists
    }

    /// Remove the car's bodies and joints from the world.
    pub fn despawn(mut self, world: &mut PhysicsWorld) {
        // secondary rigid-axle corners first; the primary owns the axle body
        for corner in [Corner::FrontRight, Corner::RearRight, Corner::FrontLeft, Corner::RearLeft] {
            self.suspensions[corner.index()].stop(world);
        }
        world.remove_body(self.chassis);
        tracing::debug!(car = %self.config.name, "car despawned");
    }

    // --------------------------------------------------------------------------
    // out-of-tick operations
    // --------------------------------------------------------------------------

    /// Move the car, keep it running. Suspensions re-seat at static sag and
    /// wheel speeds match the new forward velocity.
    pub fn teleport(
        &mut self,
        world: &mut PhysicsWorld,
        pose: Isometry<Real>,
        linvel: Vector<Real>,
    ) -> Result<()> {
        world.set_state(self.chassis, pose, linvel, Vector::zeros(), SUBSYSTEM)?;
        for corner in [Corner::FrontRight, Corner::RearRight, Corner::FrontLeft, Corner::RearLeft] {
            self.suspensions[corner.index()].stop(world);
        }
        self.attach_corners(world)?;

        let v_forward = linvel.dot(&(pose.rotation * forward()));
        for tyre in &mut self.tyres {
            let omega = v_forward / tyre.radius();
            tyre.set_angular_velocity(omega, false);
        }
        let [l, r] = self.drivetrain.driven_corners();
        self.drivetrain.set_output_omega([
            self.tyres[l.index()].angular_velocity(),
            self.tyres[r.index()].angular_velocity(),
        ]);
        self.steering.reset();
        self.steer_angles = [0.0; 4];
        self.assists.reset();
        tracing::debug!(car = %self.config.name, ?pose, "car teleported");
        Ok(())
    }

    /// Swap the compound on one corner. Slip and thermal state restart.
    pub fn set_tyre_compound(
        &mut self,
        corner: Corner,
        config: &TyreCompoundConfig,
        cache: &mut CurveCache,
        ambient_temp: f32,
    ) -> Result<()> {
        self.tyres[corner.index()].set_compound(config, cache, ambient_temp)?;
        let axle = if corner.is_front() {
            &mut self.config.front
        } else {
            &mut self.config.rear
        };
        axle.tyre = config.clone();
        Ok(())
    }

    pub fn set_suspension_tuning(&mut self, corner: Corner, tuning: &SuspensionTuning) -> Result<()> {
        self.suspensions[corner.index()].set_tuning(tuning)
    }

    /// Engage `gear` at once with the engine matched to the driven wheels.
    pub fn set_gear_synced(&mut self, gear: usize) -> Result<()> {
        self.drivetrain.force_gear(gear)?;
        let [l, r] = self.drivetrain.driven_corners();
        let g = self.drivetrain.gearbox().total_ratio();
        if g == 0.0 {
            return Ok(());
        }
        let engine = self.drivetrain.engine().omega();
        let wheel = engine / g;
        self.tyres[l.index()].set_angular_velocity(wheel, false);
        self.tyres[r.index()].set_angular_velocity(wheel, false);
        self.drivetrain.set_output_omega([wheel, wheel]);
        Ok(())
    }

    // --------------------------------------------------------------------------
    // tick
    // --------------------------------------------------------------------------

    pub fn tick(
        &mut self,
        dt: f32,
        controls: &CarControls,
        world: &mut PhysicsWorld,
        track: &Track,
    ) -> Result<&CarState> {
        // 1) cache
        let previous = self.controls;
        let controls = controls.sanitized();
        let slip_ratio: [f32; 4] = std::array::from_fn(|i| self.tyres[i].status().slip_ratio);
        let chassis_pose = world.pose(self.chassis, SUBSYSTEM)?;
        let chassis_linvel = *world.body(self.chassis, SUBSYSTEM)?.linvel();
        let speed = chassis_linvel.dot(&(chassis_pose.rotation * forward()));

        // 2) controls
        self.apply_gear_controls(&controls, &previous);
        self.deliver_events();

        let driven = self.drivetrain.driven_corners();
        let assist_out = self.assists.apply(
            controls.gas,
            controls.brake,
            controls.clutch,
            &AssistInputs {
                dt,
                speed,
                slip_ratio,
                driven: Corner::ALL.map(|c| driven.contains(&c)),
                engine_rpm: self.drivetrain.engine_rpm(),
                in_gear: self.drivetrain.gear() != NEUTRAL,
            },
        );
        self.drivetrain.update_shift(dt, assist_out.clutch);
        self.deliver_events();

        let angles = self.steering.update(controls.steer, speed, dt);
        self.steer_angles = [angles.left, angles.right, 0.0, 0.0];
        for corner in [Corner::FrontLeft, Corner::FrontRight] {
            let suspension = &mut self.suspensions[corner.index()];
            if let Some(arm) = suspension.steer_arm() {
                suspension.set_steer_length_offset(world, self.steer_angles[corner.index()] * arm)?;
            }
        }

        // 3) reset
        world.reset_forces(self.chassis, SUBSYSTEM)?;
        for suspension in &self.suspensions {
            if let Some(hub) = suspension.hub_body() {
                world.reset_forces(hub, SUBSYSTEM)?;
            }
        }

        // 4) suspension
        for suspension in &mut self.suspensions {
            suspension.step(world, dt)?;
        }
        for (axle, (l, r)) in [
            (Corner::FrontLeft.index(), Corner::FrontRight.index()),
            (Corner::RearLeft.index(), Corner::RearRight.index()),
        ]
        .into_iter()
        .enumerate()
        {
            let (left, right) = pair_mut(&mut self.suspensions, l, r);
            self.anti_roll[axle].apply(world, left, right)?;
        }

        // 5) tyres
        let mut feedback = [0.0_f32; 4];
        let mut brake_torque = [0.0_f32; 4];
        for corner in Corner::ALL {
            let i = corner.index();
            let is_driven = driven.contains(&corner);
            let mut brake = self.config.brakes.wheel_torque(corner.is_front())
                * controls.brake
                * assist_out.brake_scale[i];
            if !corner.is_front() {
                brake += self.config.brakes.handbrake_torque * controls.handbrake;
            }
            brake_torque[i] = brake;

            let suspension = &mut self.suspensions[i];
            let hub = suspension.hub_kinematics(world)?;
            let tyre = &mut self.tyres[i];
            let hit = tyre.probe(&hub, world, track);
            let out = tyre.step(
                &hub,
                hit.as_ref(),
                &TyreInputs {
                    dt,
                    brake_torque: brake,
                    electric_torque: controls.electric_torque[i],
                    ambient_temp: track.ambient_temp,
                    road_temp: track.road_temp,
                    track_grip: track.grip,
                    driven: is_driven,
                },
            );
            if let Some(contact) = out.contact {
                suspension.add_force_at_pos(world, contact.force, contact.point, corner.is_front())?;
                suspension.add_torque(world, contact.aligning_torque)?;
            }
            feedback[i] = out.feedback_torque;
        }

        // 6) drivetrain
        let [dl, dr] = driven;
        let shaft = |c: Corner| Shaft {
            omega: self.tyres[c.index()].angular_velocity(),
            torque: feedback[c.index()] + controls.electric_torque[c.index()],
            brake: brake_torque[c.index()],
            inertia: self.tyres[c.index()].inertia(),
        };
        let inputs = DrivetrainInputs {
            dt,
            throttle: assist_out.gas,
            clutch_pedal: assist_out.clutch,
            wheels: [shaft(dl), shaft(dr)],
        };
        let out = self.drivetrain.step(&inputs);
        for (side, corner) in driven.into_iter().enumerate() {
            self.tyres[corner.index()].set_angular_velocity(out.wheel_omega[side], out.locked[side]);
        }

        // 7) reactions
        let mode = self.drivetrain.config().torque_reaction;
        if mode != TorqueReactionMode::None {
            let longitudinal = chassis_pose.rotation * forward();
            let reaction = -sanitize(out.engine_torque, "car.engine_reaction");
            world.add_torque(self.chassis, longitudinal * reaction, SUBSYSTEM)?;
        }
        if mode == TorqueReactionMode::PerWheelSplit {
            let axle_axis = chassis_pose.rotation * right();
            for (side, corner) in driven.into_iter().enumerate() {
                let suspension = &self.suspensions[corner.index()];
                let carrier = match suspension.hub_body() {
                    Some(hub) if suspension.is_rigid_axle() => hub,
                    _ => self.chassis,
                };
                let torque = sanitize(out.drive_torque[side], "car.wheel_reaction");
                world.add_torque(carrier, axle_axis * torque, SUBSYSTEM)?;
            }
        }

        // 8) snapshot
        self.controls = controls;
        self.tick += 1;
        self.snapshot(world, track)?;
        Ok(&self.state)
    }

    fn apply_gear_controls(&mut self, controls: &CarControls, previous: &CarControls) {
        if controls.sequential() {
            if controls.gear_up && !previous.gear_up {
                self.drivetrain.shift_up();
            }
            if controls.gear_down && !previous.gear_down {
                self.drivetrain.shift_down();
            }
            return;
        }
        let target = controls.requested_gear as usize;
        let pending = self.drivetrain.gear_request().target();
        if target != self.drivetrain.gear() && pending.is_none() {
            self.drivetrain.request_gear(target);
        }
    }

    fn deliver_events(&mut self) {
        for event in self.drivetrain.drain_events() {
            self.assists.on_event(&event);
        }
    }

    fn snapshot(&mut self, world: &PhysicsWorld, track: &Track) -> Result<()> {
        let body = world.body(self.chassis, SUBSYSTEM)?;
        let pose = *body.position();
        let linvel = *body.linvel();
        let position = pose.translation.vector;

        let mut wheels = Vec::with_capacity(4);
        for corner in Corner::ALL {
            let i = corner.index();
            let suspension = &self.suspensions[i];
            let hub = suspension.hub_world_matrix(world)?;
            wheels.push(WheelState {
                corner: corner.label(),
                hub_position: v3(hub.translation.vector),
                hub_rotation: quat4(&hub.rotation),
                steer_angle: self.steer_angles[i],
                tyre: *self.tyres[i].status(),
                suspension: *suspension.status(),
            });
        }

        let drivetrain = *self.drivetrain.status();
        self.state = CarState {
            tick: self.tick,
            name: self.config.name.clone(),
            position: v3(position),
            rotation: quat4(&pose.rotation),
            linvel: v3(linvel),
            angvel: v3(*body.angvel()),
            speed: linvel.dot(&(pose.rotation * forward())),
            engine_rpm: self.drivetrain.engine_rpm(),
            gear: self.drivetrain.gear(),
            grinding: drivetrain.grinding,
            track_location: track.location(Point::from(position)),
            wheels,
            drivetrain,
            assists: *self.assists.status(),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::presets;
    use crate::drivetrain::gearbox::FIRST;
    use crate::physics::track::TrackConfig;

    const DT: f32 = 1.0 / 240.0;

    fn world_with(config: &CarConfig) -> (PhysicsWorld, Track, Car) {
        let mut world = PhysicsWorld::new();
        let track = Track::flat(&mut world, &TrackConfig::default()).unwrap();
        let pose = Isometry::translation(0.0, config.rest_height(), 0.0);
        let car = Car::spawn(config, &mut CurveCache::new(), &mut world, &track, pose).unwrap();
        (world, track, car)
    }

    #[test]
    fn spawn_publishes_four_wheels() {
        let (_world, _track, car) = world_with(&presets::coupe());
        let state = car.state();
        assert_eq!(state.wheels.len(), 4);
        assert_eq!(state.wheels[0].corner, "FL");
        assert_eq!(state.gear, NEUTRAL);
    }

    #[test]
    fn sequential_shift_fires_on_the_edge_only() {
        let (mut world, track, mut car) = world_with(&presets::coupe());
        car.set_gear_synced(FIRST).unwrap();
        let up = CarControls {
            gear_up: true,
            ..CarControls::default()
        };
        car.tick(DT, &up, &mut world, &track).unwrap();
        world.step(DT);
        assert!(car.drivetrain().gear_request().target() == Some(FIRST + 1));
        for _ in 0..120 {
            car.tick(DT, &up, &mut world, &track).unwrap();
            world.step(DT);
        }
        // held button does not keep shifting
        assert_eq!(car.drivetrain().gear(), FIRST + 1);
    }

    #[test]
    fn full_lock_turns_the_front_hubs() {
        let (mut world, track, mut car) = world_with(&presets::coupe());
        let left = CarControls {
            steer: -1.0,
            ..CarControls::default()
        };
        for _ in 0..240 {
            car.tick(DT, &left, &mut world, &track).unwrap();
            world.step(DT);
        }
        let fl = car.state().wheels[0].steer_angle;
        let fr = car.state().wheels[1].steer_angle;
        assert!(fl > 0.3 && fr > 0.3, "fl {fl} fr {fr}");
        // inner wheel turns more
        assert!(fl > fr);
    }

    #[test]
    fn teleport_reseats_and_spins_the_wheels() {
        let (mut world, track, mut car) = world_with(&presets::pickup());
        let pose = Isometry::translation(20.0, car.config().rest_height(), -5.0);
        car.teleport(&mut world, pose, vector![0.0, 0.0, -10.0]).unwrap();
        car.tick(DT, &CarControls::default(), &mut world, &track).unwrap();
        assert!((car.state().position[0] - 20.0).abs() < 0.1);
        let omega = car.tyre(Corner::FrontLeft).angular_velocity();
        assert!((omega - 10.0 / 0.38).abs() < 1.0, "omega {omega}");
        let hub = car.state().wheels[3].hub_position;
        assert!((hub[0] - 20.82).abs() < 0.1);
    }

    #[test]
    fn compound_swap_keeps_the_car_running() {
        let (mut world, track, mut car) = world_with(&presets::coupe());
        let wet = TyreCompoundConfig {
            name: "wet".into(),
            ..TyreCompoundConfig::default()
        };
        car.set_tyre_compound(Corner::RearLeft, &wet, &mut CurveCache::new(), 15.0)
            .unwrap();
        assert_eq!(car.tyre(Corner::RearLeft).compound().config.name, "wet");
        assert_eq!(car.config().rear.tyre.name, "wet");
        car.tick(DT, &CarControls::default(), &mut world, &track).unwrap();
    }
}

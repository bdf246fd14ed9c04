// ==============================================================================
// rigid_axle.rs — LIVE AXLE (one body shared by a left/right corner pair)
// ------------------------------------------------------------------------------
// The first corner attached (partner = None) creates the axle body and its
// locating links, and applies the leaf-spring lateral term. The second corner
// is handed the axle body and only adds its own spring/damper pair and wheel
// frame. Links are written for the whole axle relative to the travel-0 axle
// centre; they are not mirrored.
// ==============================================================================

use rapier3d::na::Translation3;
use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

use super::multilink::validate_links;
use super::{AttachContext, Attached, LinkPickup};
use crate::error::{Result, VehicleError, ensure_non_negative, ensure_positive};
use crate::physics::BodyDesc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidAxleGeometry {
    pub links: Vec<LinkPickup>,
    pub axle_mass: f32,
    pub axle_inertia: [f32; 3],
    /// Leaf-spring lateral stiffness, N/m.
    pub lateral_stiffness: f32,
}

impl Default for RigidAxleGeometry {
    fn default() -> Self {
        // four-link: two trailing arms, two converging upper links
        Self {
            links: vec![
                LinkPickup::new([-0.55, -0.05, -0.45], [-0.55, -0.10, 0.0]),
                LinkPickup::new([0.55, -0.05, -0.45], [0.55, -0.10, 0.0]),
                LinkPickup::new([-0.25, 0.20, -0.35], [-0.12, 0.15, 0.0]),
                LinkPickup::new([0.25, 0.20, -0.35], [0.12, 0.15, 0.0]),
            ],
            axle_mass: 60.0,
            axle_inertia: [1.0, 13.0, 13.0],
            lateral_stiffness: 150_000.0,
        }
    }
}

impl RigidAxleGeometry {
    pub fn validate(&self) -> Result<()> {
        if self.links.is_empty() {
            return Err(VehicleError::invalid_value(
                "suspension",
                "rigid_axle.links",
                "an axle needs at least one locating link",
            ));
        }
        validate_links("rigid_axle", &self.links, None)?;
        ensure_positive("suspension", "rigid_axle.axle_mass", self.axle_mass)?;
        for (i, v) in self.axle_inertia.iter().enumerate() {
            ensure_positive("suspension", &format!("rigid_axle.axle_inertia[{i}]"), *v)?;
        }
        ensure_non_negative("suspension", "rigid_axle.lateral_stiffness", self.lateral_stiffness)
    }

    pub(crate) fn attach(
        &self,
        ctx: &mut AttachContext<'_>,
        partner: Option<RigidBodyHandle>,
    ) -> Result<Attached> {
        let wheel_in_hub = Isometry::from_parts(
            Translation3::new(ctx.centre.x, 0.0, 0.0),
            ctx.wheel_local.rotation,
        );
        let kingpin = [
            point![ctx.centre.x, -0.1, 0.0],
            point![ctx.centre.x, 0.1, 0.0],
        ];

        if let Some(axle) = partner {
            return Ok(Attached {
                hub: axle,
                owns_hub: false,
                wheel_in_hub,
                joints: Vec::new(),
                extra_bodies: Vec::new(),
                steer: None,
                kingpin,
                lateral_stiffness: 0.0,
            });
        }

        let centre_local = vector![0.0, ctx.centre.y, ctx.centre.z];
        let sagged = ctx.wheel_local.translation.vector;
        let axle_pose =
            ctx.chassis_pose * Isometry::translation(0.0, sagged.y, sagged.z);
        let [ix, iy, iz] = self.axle_inertia;
        let axle = ctx
            .world
            .create_body(BodyDesc::new(axle_pose, self.axle_mass, vector![ix, iy, iz]));

        let joints = self
            .links
            .iter()
            .map(|link| {
                let [cx, cy, cz] = link.chassis;
                let [hx, hy, hz] = link.hub;
                ctx.link(
                    axle,
                    &axle_pose,
                    centre_local + vector![cx, cy, cz],
                    vector![hx, hy, hz],
                )
            })
            .collect();

        Ok(Attached {
            hub: axle,
            owns_hub: true,
            wheel_in_hub,
            joints,
            extra_bodies: Vec::new(),
            steer: None,
            kingpin,
            lateral_stiffness: self.lateral_stiffness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{GRAVITY, PhysicsWorld};
    use crate::suspension::{
        Corner, Geometry, Suspension, SuspensionConfig, SuspensionKinematics,
    };
    use approx::assert_relative_eq;

    fn axle_config() -> SuspensionConfig {
        SuspensionConfig {
            geometry: Geometry::RigidAxle(RigidAxleGeometry::default()),
            static_camber: 0.0,
            ..SuspensionConfig::default()
        }
    }

    #[test]
    fn pair_shares_one_axle_body() {
        let mut world = PhysicsWorld::new();
        let chassis = world.create_body(BodyDesc::new(
            Isometry::translation(0.0, 1.0, 0.0),
            1500.0,
            vector![600.0, 2400.0, 2200.0],
        ));
        let load = 1500.0 * GRAVITY / 4.0;
        let config = axle_config();
        let mut left =
            Suspension::new(&config, Corner::RearLeft, vector![-0.75, -0.2, 1.4], load).unwrap();
        let mut right =
            Suspension::new(&config, Corner::RearRight, vector![0.75, -0.2, 1.4], load).unwrap();
        left.attach(&mut world, chassis, None).unwrap();
        right.attach(&mut world, chassis, left.hub_body()).unwrap();

        assert_eq!(left.hub_body(), right.hub_body());
        assert!(left.owns_hub());
        assert!(!right.owns_hub());
        assert_eq!(world.joints.len(), 4);
        assert_eq!(world.bodies.len(), 2);

        left.step(&mut world, 1.0 / 240.0).unwrap();
        right.step(&mut world, 1.0 / 240.0).unwrap();
        assert_relative_eq!(left.status().travel, left.sag(), epsilon = 1e-5);
        assert_relative_eq!(right.status().travel, right.sag(), epsilon = 1e-5);
        assert_relative_eq!(left.status().lateral_force, 0.0, epsilon = 1e-2);

        let l = left.hub_world_matrix(&world).unwrap().translation.vector;
        let r = right.hub_world_matrix(&world).unwrap().translation.vector;
        assert_relative_eq!(r.x - l.x, 1.5, epsilon = 1e-5);

        // the secondary corner does not own the axle
        right.stop(&mut world);
        assert_eq!(world.bodies.len(), 2);
        left.stop(&mut world);
        assert_eq!(world.bodies.len(), 1);
    }

    #[test]
    fn empty_link_list_is_rejected() {
        let g = RigidAxleGeometry {
            links: Vec::new(),
            ..RigidAxleGeometry::default()
        };
        assert!(g.validate().is_err());
    }
}

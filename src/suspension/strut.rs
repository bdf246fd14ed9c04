// ==============================================================================
// strut.rs — MACPHERSON STRUT (slider + ball + 3 links)
// ------------------------------------------------------------------------------
//   top mount : ball joint, chassis ↔ strut body
//   strut     : slider, strut body ↔ hub, along top mount − strut mount
//   lower arm : front + rear chassis pivots → lower ball joint (2 links)
//   tie rod   : rack end → steering arm
// The strut body turns with the hub when steering. Kingpin runs lower ball →
// top mount.
// ==============================================================================

use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

use super::multilink::validate_links;
use super::{AttachContext, Attached, LinkPickup, SteerLink, mirror};
use crate::error::{Result, VehicleError, ensure_positive};
use crate::physics::BodyDesc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrutGeometry {
    pub top_mount: [f32; 3],
    pub strut_mount: [f32; 3],
    pub lower_front: [f32; 3],
    pub lower_rear: [f32; 3],
    pub lower_ball: [f32; 3],
    pub tie_rod_inner: [f32; 3],
    pub tie_rod_outer: [f32; 3],
    pub strut_mass: f32,
    pub strut_inertia: [f32; 3],
    /// Slider limits along the strut axis, m (extension, compression).
    pub travel_limits: [f32; 2],
}

impl Default for StrutGeometry {
    fn default() -> Self {
        Self {
            top_mount: [-0.06, 0.62, 0.02],
            strut_mount: [-0.06, 0.16, 0.0],
            lower_front: [-0.40, -0.12, -0.20],
            lower_rear: [-0.40, -0.12, 0.22],
            lower_ball: [-0.03, -0.14, 0.0],
            tie_rod_inner: [-0.38, -0.03, 0.14],
            tie_rod_outer: [-0.10, -0.03, 0.14],
            strut_mass: 3.0,
            strut_inertia: [0.05, 0.01, 0.05],
            travel_limits: [-0.15, 0.15],
        }
    }
}

impl StrutGeometry {
    fn links(&self) -> [LinkPickup; 3] {
        [
            LinkPickup::new(self.lower_front, self.lower_ball),
            LinkPickup::new(self.lower_rear, self.lower_ball),
            LinkPickup::new(self.tie_rod_inner, self.tie_rod_outer),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        validate_links("strut", &self.links(), Some(2))?;
        ensure_positive("suspension", "strut.strut_mass", self.strut_mass)?;
        for (i, v) in self.strut_inertia.iter().enumerate() {
            ensure_positive("suspension", &format!("strut.strut_inertia[{i}]"), *v)?;
        }
        let axis = mirror(self.top_mount, 1.0) - mirror(self.strut_mount, 1.0);
        if axis.norm() < 0.05 {
            return Err(VehicleError::invalid_value(
                "suspension",
                "strut.top_mount",
                "strut is shorter than 5 cm",
            ));
        }
        if self.travel_limits[0] >= self.travel_limits[1] {
            return Err(VehicleError::invalid_value(
                "suspension",
                "strut.travel_limits",
                "lower limit must be below upper limit",
            ));
        }
        Ok(())
    }

    pub(crate) fn attach(&self, ctx: &mut AttachContext<'_>) -> Result<Attached> {
        let side = ctx.side;
        let hub_pose = ctx.hub_world();
        let hub = ctx.world.create_body(ctx.hub_desc);

        let top_local = ctx.centre + mirror(self.top_mount, side);
        let top_world = ctx.chassis_pose * Point::from(top_local);
        let mount_hub = Point::from(mirror(self.strut_mount, side));
        let mount_world = hub_pose * mount_hub;
        let axis_world = UnitVector::try_new(top_world - mount_world, 1e-6).ok_or_else(|| {
            VehicleError::invalid_value("suspension", "strut.top_mount", "degenerate strut axis")
        })?;

        let strut_pose = Isometry::from_parts(top_world.coords.into(), hub_pose.rotation);
        let [ix, iy, iz] = self.strut_inertia;
        let strut = ctx.world.create_body(BodyDesc::new(
            strut_pose,
            self.strut_mass,
            vector![ix, iy, iz],
        ));

        let mut joints = Vec::with_capacity(5);
        joints.push(
            ctx.world
                .create_ball(ctx.chassis, Point::from(top_local), strut, Point::origin()),
        );
        let axis_local = UnitVector::new_unchecked(strut_pose.rotation.inverse() * *axis_world);
        joints.push(ctx.world.create_slider(
            strut,
            strut_pose.inverse() * mount_world,
            hub,
            mount_hub,
            axis_local,
            self.travel_limits,
        ));

        let mut steer = None;
        for (i, link) in self.links().iter().enumerate() {
            let chassis_local = ctx.centre + mirror(link.chassis, side);
            let joint = ctx.link(hub, &hub_pose, chassis_local, mirror(link.hub, side));
            if i == 2 {
                steer = Some(SteerLink {
                    joint,
                    base: Point::from(chassis_local),
                    arm: link.hub[2],
                });
            }
            joints.push(joint);
        }

        Ok(Attached {
            hub,
            owns_hub: true,
            wheel_in_hub: Isometry::identity(),
            joints,
            extra_bodies: vec![strut],
            steer,
            kingpin: [
                Point::from(mirror(self.lower_ball, side)),
                hub_pose.inverse() * top_world,
            ],
            lateral_stiffness: 0.0,
        })
    }
}

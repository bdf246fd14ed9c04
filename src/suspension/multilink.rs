// ==============================================================================
// multilink.rs — FIVE GENERIC BALL-ENDED LINKS
// ------------------------------------------------------------------------------
// Five distance links between chassis and hub leave the hub one degree of
// freedom. Any one of them may be flagged as the steer (or toe) link; its
// chassis pickup is what set_steer_length_offset slides.
//
// attach_links() is also the builder behind the double wishbone, which is the
// same five-link layout with the arm pairs sharing a ball joint.
// ==============================================================================

use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

use super::{AttachContext, Attached, LinkPickup, SteerLink, mirror};
use crate::error::{Result, VehicleError};

pub const LINK_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultilinkGeometry {
    pub links: Vec<LinkPickup>,
    pub steer_link: Option<usize>,
    /// Lower and upper points of the virtual steering axis, hub side.
    pub kingpin: [[f32; 3]; 2],
}

impl Default for MultilinkGeometry {
    fn default() -> Self {
        Self {
            links: vec![
                // upper pair
                LinkPickup::new([-0.36, 0.22, -0.18], [-0.07, 0.20, -0.10]),
                LinkPickup::new([-0.36, 0.20, 0.16], [-0.07, 0.20, 0.08]),
                // lower pair
                LinkPickup::new([-0.42, -0.10, -0.24], [-0.05, -0.14, -0.12]),
                LinkPickup::new([-0.42, -0.08, 0.22], [-0.05, -0.14, 0.12]),
                // toe link, square to the wheel plane
                LinkPickup::new([-0.40, -0.02, 0.20], [-0.08, -0.02, 0.20]),
            ],
            steer_link: Some(4),
            kingpin: [[-0.05, -0.14, 0.0], [-0.07, 0.20, -0.01]],
        }
    }
}

impl MultilinkGeometry {
    pub fn validate(&self) -> Result<()> {
        if self.links.len() != LINK_COUNT {
            return Err(VehicleError::invalid_value(
                "suspension",
                "multilink.links",
                format!("expected {LINK_COUNT} links, got {}", self.links.len()),
            ));
        }
        validate_links("multilink", &self.links, self.steer_link)
    }

    pub(crate) fn attach(&self, ctx: &mut AttachContext<'_>) -> Result<Attached> {
        attach_links(ctx, &self.links, self.steer_link, self.kingpin)
    }
}

/// Shared link checks: no zero-length link, steer link in range with a usable arm.
pub(crate) fn validate_links(
    topology: &str,
    links: &[LinkPickup],
    steer_link: Option<usize>,
) -> Result<()> {
    for (i, link) in links.iter().enumerate() {
        let c = mirror(link.chassis, 1.0);
        let h = mirror(link.hub, 1.0);
        if (c - h).norm() < 1e-3 {
            return Err(VehicleError::invalid_value(
                "suspension",
                format!("{topology}.links[{i}]"),
                "chassis and hub pickups coincide",
            ));
        }
    }
    if let Some(i) = steer_link {
        let Some(link) = links.get(i) else {
            return Err(VehicleError::invalid_value(
                "suspension",
                format!("{topology}.steer_link"),
                format!("index {i} out of range"),
            ));
        };
        if link.hub[2].abs() < 1e-3 {
            return Err(VehicleError::invalid_value(
                "suspension",
                format!("{topology}.steer_link"),
                "steer link hub pickup has no steering arm (z == 0)",
            ));
        }
    }
    Ok(())
}

pub(crate) fn attach_links(
    ctx: &mut AttachContext<'_>,
    links: &[LinkPickup],
    steer_link: Option<usize>,
    kingpin: [[f32; 3]; 2],
) -> Result<Attached> {
    let hub_pose = ctx.hub_world();
    let hub = ctx.world.create_body(ctx.hub_desc);
    let side = ctx.side;

    let mut joints = Vec::with_capacity(links.len());
    let mut steer = None;
    for (i, link) in links.iter().enumerate() {
        let chassis_local = ctx.centre + mirror(link.chassis, side);
        let joint = ctx.link(hub, &hub_pose, chassis_local, mirror(link.hub, side));
        if steer_link == Some(i) {
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
        extra_bodies: Vec::new(),
        steer,
        kingpin: [
            Point::from(mirror(kingpin[0], side)),
            Point::from(mirror(kingpin[1], side)),
        ],
        lateral_stiffness: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_is_valid() {
        assert!(MultilinkGeometry::default().validate().is_ok());
    }

    #[test]
    fn wrong_link_count_is_rejected() {
        let mut g = MultilinkGeometry::default();
        g.links.pop();
        assert!(g.validate().is_err());
    }

    #[test]
    fn steer_link_needs_an_arm() {
        let mut g = MultilinkGeometry::default();
        g.links[4].hub[2] = 0.0;
        assert!(g.validate().is_err());
        g.steer_link = Some(7);
        assert!(g.validate().is_err());
        g.steer_link = None;
        assert!(g.validate().is_ok());
    }
}

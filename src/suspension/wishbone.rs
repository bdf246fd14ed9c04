// ==============================================================================
// wishbone.rs — DOUBLE WISHBONE (5 links)
// ------------------------------------------------------------------------------
//   upper arm : front + rear chassis pivots → upper ball joint
//   lower arm : front + rear chassis pivots → lower ball joint
//   tie rod   : rack end → steering arm
// Each arm is two distance links meeting at the ball joint. Kingpin runs lower
// ball → upper ball.
// ==============================================================================

use serde::{Deserialize, Serialize};

use super::multilink::{attach_links, validate_links};
use super::{AttachContext, Attached, LinkPickup};
use crate::error::Result;

pub const TIE_ROD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WishboneGeometry {
    pub upper_front: [f32; 3],
    pub upper_rear: [f32; 3],
    pub upper_ball: [f32; 3],
    pub lower_front: [f32; 3],
    pub lower_rear: [f32; 3],
    pub lower_ball: [f32; 3],
    pub tie_rod_inner: [f32; 3],
    pub tie_rod_outer: [f32; 3],
}

impl Default for WishboneGeometry {
    fn default() -> Self {
        Self {
            upper_front: [-0.38, 0.22, -0.15],
            upper_rear: [-0.38, 0.20, 0.15],
            upper_ball: [-0.09, 0.20, 0.02],
            lower_front: [-0.40, -0.10, -0.20],
            lower_rear: [-0.40, -0.10, 0.20],
            lower_ball: [-0.05, -0.12, 0.0],
            tie_rod_inner: [-0.40, -0.02, 0.13],
            tie_rod_outer: [-0.10, -0.02, 0.13],
        }
    }
}

impl WishboneGeometry {
    pub fn links(&self) -> [LinkPickup; 5] {
        [
            LinkPickup::new(self.upper_front, self.upper_ball),
            LinkPickup::new(self.upper_rear, self.upper_ball),
            LinkPickup::new(self.lower_front, self.lower_ball),
            LinkPickup::new(self.lower_rear, self.lower_ball),
            LinkPickup::new(self.tie_rod_inner, self.tie_rod_outer),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        validate_links("wishbone", &self.links(), Some(TIE_ROD))
    }

    pub(crate) fn attach(&self, ctx: &mut AttachContext<'_>) -> Result<Attached> {
        attach_links(
            ctx,
            &self.links(),
            Some(TIE_ROD),
            [self.lower_ball, self.upper_ball],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_is_valid() {
        assert!(WishboneGeometry::default().validate().is_ok());
    }

    #[test]
    fn arms_share_their_ball_joint() {
        let links = WishboneGeometry::default().links();
        assert_eq!(links[0].hub, links[1].hub);
        assert_eq!(links[2].hub, links[3].hub);
    }

    #[test]
    fn tie_rod_without_arm_is_rejected() {
        let g = WishboneGeometry {
            tie_rod_outer: [-0.10, -0.02, 0.0],
            ..WishboneGeometry::default()
        };
        assert!(g.validate().is_err());
    }
}

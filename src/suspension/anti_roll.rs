// ==============================================================================
// anti_roll.rs — ANTI-ROLL BAR
// ------------------------------------------------------------------------------
// The bar twists with the travel difference across an axle and pushes back on
// both corners with equal and opposite force:
//
//   F = k · (travel_l − travel_r)
//   left  corner : +F   (chassis up, hub down)
//   right corner : −F
//
// No net vertical force on the car; it only moves load across the axle. Runs
// after both corners have stepped so travels are current.
// ==============================================================================

use serde::{Deserialize, Serialize};

use super::{Suspension, SuspensionKinematics};
use crate::error::{Result, ensure_non_negative};
use crate::math::sanitize;
use crate::physics::PhysicsWorld;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AntiRollBar {
    pub stiffness: f32, // N/m
}

impl AntiRollBar {
    pub fn new(stiffness: f32) -> Result<Self> {
        ensure_non_negative("suspension", "anti_roll.stiffness", stiffness)?;
        Ok(Self { stiffness })
    }

    pub fn force(&self, travel_left: f32, travel_right: f32) -> f32 {
        sanitize(
            self.stiffness * (travel_left - travel_right),
            "suspension.anti_roll",
        )
    }

    pub fn apply(
        &self,
        world: &mut PhysicsWorld,
        left: &mut Suspension,
        right: &mut Suspension,
    ) -> Result<f32> {
        if self.stiffness == 0.0 {
            return Ok(0.0);
        }
        let f = self.force(left.status().travel, right.status().travel);
        left.apply_pair_force(world, f)?;
        right.apply_pair_force(world, -f)?;
        Ok(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_resists_roll_and_is_symmetric() {
        let bar = AntiRollBar::new(20_000.0).unwrap();
        assert_eq!(bar.force(0.02, 0.02), 0.0);
        assert!(bar.force(0.04, 0.0) > 0.0);
        assert_eq!(bar.force(0.04, 0.0), -bar.force(0.0, 0.04));
    }

    #[test]
    fn negative_stiffness_is_rejected() {
        assert!(AntiRollBar::new(-1.0).is_err());
    }
}

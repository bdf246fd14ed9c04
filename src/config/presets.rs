//! Built-in cars, usable without any config file.

use super::{AxleConfig, BrakesConfig, CarConfig, ChassisConfig};
use crate::car::assists::AssistsConfig;
use crate::config::cache::CurveSource;
use crate::curve::Curve;
use crate::drivetrain::differential::DifferentialConfig;
use crate::drivetrain::engine::{EngineConfig, TurboConfig};
use crate::drivetrain::{DrivetrainConfig, TorqueReactionMode, TractionLayout};
use crate::suspension::force_law::{DamperConfig, SpringConfig};
use crate::suspension::multilink::MultilinkGeometry;
use crate::suspension::rigid_axle::RigidAxleGeometry;
use crate::suspension::steering::SteeringConfig;
use crate::suspension::strut::StrutGeometry;
use crate::suspension::wishbone::WishboneGeometry;
use crate::suspension::{Geometry, SuspensionConfig};
use crate::tyre::TyreCompoundConfig;

/// Light rear-drive coupe: wishbone front, multilink rear, clutch-type LSD.
pub fn coupe() -> CarConfig {
    let tyre = TyreCompoundConfig {
        name: "sport".into(),
        radius: 0.32,
        ..TyreCompoundConfig::default()
    };
    CarConfig {
        name: "coupe".into(),
        chassis: ChassisConfig::default(),
        front: AxleConfig {
            z: -1.30,
            half_track: 0.76,
            wheel_y: -0.12,
            suspension: SuspensionConfig {
                geometry: Geometry::Wishbone(WishboneGeometry::default()),
                static_camber: -0.025,
                toe: 0.002,
                ..SuspensionConfig::default()
            },
            tyre: tyre.clone(),
            anti_roll: 18_000.0,
        },
        rear: AxleConfig {
            z: 1.25,
            half_track: 0.78,
            wheel_y: -0.12,
            suspension: SuspensionConfig {
                geometry: Geometry::Multilink(MultilinkGeometry::default()),
                static_camber: -0.015,
                ..SuspensionConfig::default()
            },
            tyre,
            anti_roll: 12_000.0,
        },
        engine: EngineConfig::default(),
        drivetrain: DrivetrainConfig::default(),
        steering: SteeringConfig::default(),
        assists: AssistsConfig::default(),
        brakes: BrakesConfig::default(),
    }
}

/// Heavy turbo pickup: struts up front, leaf-located live rear axle, spool.
pub fn pickup() -> CarConfig {
    let tyre = TyreCompoundConfig {
        name: "all-terrain".into(),
        radius: 0.38,
        width: 0.265,
        angular_inertia: 2.2,
        vertical_stiffness: 300_000.0,
        ..TyreCompoundConfig::default()
    };
    let spring = SpringConfig {
        rate: 80_000.0,
        bump_stop_travel: 0.12,
        droop_stop_travel: 0.12,
        ..SpringConfig::default()
    };
    let damper = DamperConfig {
        bump_slow: 5_500.0,
        rebound_slow: 8_500.0,
        ..DamperConfig::default()
    };
    CarConfig {
        name: "pickup".into(),
        chassis: ChassisConfig {
            mass: 1_700.0,
            inertia: [2_600.0, 3_000.0, 700.0],
            half_extents: [0.95, 0.45, 2.5],
            collider_offset: [0.0, 0.25, 0.2],
            ..ChassisConfig::default()
        },
        front: AxleConfig {
            z: -1.60,
            half_track: 0.82,
            wheel_y: -0.15,
            suspension: SuspensionConfig {
                geometry: Geometry::Strut(StrutGeometry::default()),
                spring,
                damper,
                hub_mass: 24.0,
                ..SuspensionConfig::default()
            },
            tyre: tyre.clone(),
            anti_roll: 15_000.0,
        },
        rear: AxleConfig {
            z: 1.50,
            half_track: 0.82,
            wheel_y: -0.15,
            suspension: SuspensionConfig {
                geometry: Geometry::RigidAxle(RigidAxleGeometry::default()),
                spring,
                damper,
                static_camber: 0.0,
                ..SuspensionConfig::default()
            },
            tyre,
            anti_roll: 0.0,
        },
        engine: EngineConfig {
            torque_curve: CurveSource::Inline(Curve::from_samples(vec![
                [0.0, 220.0],
                [1_500.0, 330.0],
                [2_500.0, 380.0],
                [4_000.0, 360.0],
                [5_500.0, 300.0],
                [6_500.0, 220.0],
            ])),
            coast_torque: 70.0,
            idle_rpm: 750.0,
            limiter_rpm: 5_800.0,
            over_rev_rpm: 6_300.0,
            inertia: 0.3,
            turbos: vec![TurboConfig {
                max_boost: 0.45,
                reference_rpm: 3_000.0,
                wastegate: 0.4,
                ..TurboConfig::default()
            }],
            ..EngineConfig::default()
        },
        drivetrain: DrivetrainConfig {
            layout: TractionLayout::Rwd,
            gears: vec![4.17, 2.34, 1.52, 1.14, 0.87],
            reverse: 3.8,
            final_ratio: 3.73,
            differential: DifferentialConfig::Spool,
            gearbox_inertia: 0.04,
            output_shaft_inertia: 0.1,
            torque_reaction: TorqueReactionMode::PerWheelSplit,
            ..DrivetrainConfig::default()
        },
        steering: SteeringConfig {
            lock: 0.6,
            rate: 3.0,
            ..SteeringConfig::default()
        },
        assists: AssistsConfig {
            tc: false,
            ..AssistsConfig::default()
        },
        brakes: BrakesConfig {
            max_torque: 8_000.0,
            front_bias: 0.7,
            handbrake_torque: 2_500.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        coupe().validate().unwrap();
        pickup().validate().unwrap();
    }
}

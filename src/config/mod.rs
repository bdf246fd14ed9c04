//! Car configuration tree.
//!
//! Everything a car needs at spawn, deserializable from JSON. Mandatory
//! sections are checked by name before deserialization so a missing one
//! reports as [`VehicleError::MissingSection`] rather than a serde message.

pub mod cache;
pub mod presets;

use serde::{Deserialize, Serialize};

use crate::car::assists::AssistsConfig;
use crate::drivetrain::DrivetrainConfig;
use crate::drivetrain::engine::EngineConfig;
use crate::error::{Result, VehicleError, ensure_non_negative, ensure_positive};
use crate::physics::GRAVITY;
use crate::suspension::SuspensionConfig;
use crate::suspension::steering::SteeringConfig;
use crate::tyre::TyreCompoundConfig;

/// Sections a car file cannot omit.
pub const MANDATORY_SECTIONS: [&str; 5] = ["chassis", "front", "rear", "engine", "drivetrain"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChassisConfig {
    /// Sprung mass, kg. The centre of mass is the body origin.
    pub mass: f32,
    pub inertia: [f32; 3], // principal, kg·m²
    pub half_extents: [f32; 3],
    /// Collision box offset from the centre of mass.
    pub collider_offset: [f32; 3],
    pub linear_damping: f32,
    pub angular_damping: f32,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            mass: 1_250.0,
            inertia: [1_900.0, 2_200.0, 450.0],
            half_extents: [0.9, 0.35, 2.1],
            collider_offset: [0.0, 0.15, 0.0],
            linear_damping: 0.0,
            angular_damping: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxleConfig {
    /// Axle position along the chassis, m (front is negative).
    pub z: f32,
    pub half_track: f32,
    /// Wheel centre height at zero travel, chassis frame.
    pub wheel_y: f32,
    pub suspension: SuspensionConfig,
    pub tyre: TyreCompoundConfig,
    /// Anti-roll bar rate, N/m. 0 = none.
    pub anti_roll: f32,
}

impl Default for AxleConfig {
    fn default() -> Self {
        Self {
            z: 0.0,
            half_track: 0.78,
            wheel_y: -0.12,
            suspension: SuspensionConfig::default(),
            tyre: TyreCompoundConfig::default(),
            anti_roll: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrakesConfig {
    /// Total brake torque at full pedal, N·m, split across four wheels.
    pub max_torque: f32,
    pub front_bias: f32,
    /// Per rear wheel.
    pub handbrake_torque: f32,
}

impl Default for BrakesConfig {
    fn default() -> Self {
        Self {
            max_torque: 6_000.0,
            front_bias: 0.65,
            handbrake_torque: 2_000.0,
        }
    }
}

impl BrakesConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("brakes", "max_torque", self.max_torque)?;
        ensure_non_negative("brakes", "handbrake_torque", self.handbrake_torque)?;
        if !(0.0..=1.0).contains(&self.front_bias) {
            return Err(VehicleError::invalid_value(
                "brakes",
                "front_bias",
                format!("expected a value in [0, 1], got {}", self.front_bias),
            ));
        }
        Ok(())
    }

    /// Per-wheel torque at full pedal.
    pub fn wheel_torque(&self, front: bool) -> f32 {
        let share = if front {
            self.front_bias
        } else {
            1.0 - self.front_bias
        };
        0.5 * self.max_torque * share
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub chassis: ChassisConfig,
    pub front: AxleConfig,
    pub rear: AxleConfig,
    pub engine: EngineConfig,
    pub drivetrain: DrivetrainConfig,
    #[serde(default)]
    pub steering: SteeringConfig,
    #[serde(default)]
    pub assists: AssistsConfig,
    #[serde(default)]
    pub brakes: BrakesConfig,
}

fn default_name() -> String {
    "car".into()
}

impl CarConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        for section in MANDATORY_SECTIONS {
            if value.get(section).is_none() {
                let err = VehicleError::missing_section("config", section);
                tracing::error!(%err, "car configuration rejected");
                return Err(err);
            }
        }
        let config: CarConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| VehicleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn axle(&self, front: bool) -> &AxleConfig {
        if front { &self.front } else { &self.rear }
    }

    pub fn wheelbase(&self) -> f32 {
        self.rear.z - self.front.z
    }

    /// Sprung weight one corner of the axle carries at rest.
    pub fn corner_load(&self, front: bool) -> f32 {
        let weight = self.chassis.mass * GRAVITY;
        let axle = if front {
            weight * self.rear.z / self.wheelbase()
        } else {
            -weight * self.front.z / self.wheelbase()
        };
        0.5 * axle
    }

    /// Chassis height over flat ground at which the car sits at static
    /// equilibrium, averaged over both axles.
    pub fn rest_height(&self) -> f32 {
        let axle_height = |front: bool| {
            let axle = self.axle(front);
            let load = self.corner_load(front);
            let sag = axle.suspension.spring.static_travel(load);
            let wheel_load = load + axle.suspension.hub_mass * GRAVITY;
            let penetration = wheel_load / axle.tyre.vertical_stiffness;
            axle.tyre.radius - penetration - axle.wheel_y - sag
        };
        0.5 * (axle_height(true) + axle_height(false))
    }

    pub fn validate(&self) -> Result<()> {
        let result = self.validate_inner();
        if let Err(err) = &result {
            tracing::error!(car = %self.name, %err, "car configuration rejected");
        }
        result
    }

    fn validate_inner(&self) -> Result<()> {
        ensure_positive("chassis", "mass", self.chassis.mass)?;
        for (i, v) in self.chassis.inertia.iter().enumerate() {
            ensure_positive("chassis", &format!("inertia[{i}]"), *v)?;
        }
        for (i, v) in self.chassis.half_extents.iter().enumerate() {
            ensure_positive("chassis", &format!("half_extents[{i}]"), *v)?;
        }
        ensure_non_negative("chassis", "linear_damping", self.chassis.linear_damping)?;
        ensure_non_negative("chassis", "angular_damping", self.chassis.angular_damping)?;

        if !(self.front.z < 0.0 && self.rear.z > 0.0) {
            return Err(VehicleError::invalid_value(
                "chassis",
                "front.z / rear.z",
                "the centre of mass must lie between the axles (front z < 0 < rear z)",
            ));
        }
        for (name, axle) in [("front", &self.front), ("rear", &self.rear)] {
            ensure_positive("chassis", &format!("{name}.half_track"), axle.half_track)?;
            ensure_non_negative("suspension", &format!("{name}.anti_roll"), axle.anti_roll)?;
            ensure_positive("tyre", &format!("{name}.tyre.radius"), axle.tyre.radius)?;
            ensure_positive(
                "tyre",
                &format!("{name}.tyre.vertical_stiffness"),
                axle.tyre.vertical_stiffness,
            )?;
            axle.suspension.validate()?;
        }

        self.engine.validate()?;
        self.drivetrain.validate()?;
        self.steering.validate()?;
        self.assists.validate()?;
        self.brakes.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn missing_section_is_named() {
        let err = CarConfig::from_json_str(r#"{"chassis": {}, "front": {}, "rear": {}, "engine": {}}"#)
            .unwrap_err();
        match err {
            VehicleError::MissingSection { section, .. } => assert_eq!(section, "drivetrain"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn preset_round_trips_through_json() {
        let coupe = presets::coupe();
        let text = serde_json::to_string(&coupe).unwrap();
        let back = CarConfig::from_json_str(&text).unwrap();
        assert_eq!(back, coupe);
    }

    #[test]
    fn corner_loads_sum_to_the_sprung_weight() {
        let c = presets::coupe();
        let total = 2.0 * (c.corner_load(true) + c.corner_load(false));
        assert_relative_eq!(total, c.chassis.mass * GRAVITY, max_relative = 1e-5);
    }

    #[test]
    fn com_outside_the_wheelbase_is_rejected() {
        let mut c = presets::coupe();
        c.front.z = 0.3;
        assert!(c.validate().is_err());
    }

    #[test]
    fn awd_is_rejected_at_validation() {
        let mut c = presets::coupe();
        c.drivetrain.layout = crate::drivetrain::TractionLayout::Awd;
        let err = c.validate().unwrap_err();
        assert!(matches!(err, VehicleError::Unimplemented { .. }));
    }
}

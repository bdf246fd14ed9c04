//! Read-only per-tick snapshot of one car, published after the tick.

use serde::Serialize;

use super::assists::AssistStatus;
use crate::drivetrain::DrivetrainStatus;
use crate::suspension::SuspensionStatus;
use crate::tyre::TyreStatus;

#[derive(Debug, Clone, Default, Serialize)]
pub struct WheelState {
    pub corner: &'static str,
    pub hub_position: [f32; 3],
    pub hub_rotation: [f32; 4], // quaternion i, j, k, w
    pub steer_angle: f32,
    pub tyre: TyreStatus,
    pub suspension: SuspensionStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CarState {
    pub tick: u64,
    pub name: String,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub linvel: [f32; 3],
    pub angvel: [f32; 3],
    /// Forward speed, m/s.
    pub speed: f32,
    pub engine_rpm: f32,
    pub gear: usize,
    pub grinding: bool,
    pub track_location: f32,
    pub wheels: Vec<WheelState>,
    pub drivetrain: DrivetrainStatus,
    pub assists: AssistStatus,
}

impl CarState {
    /// Wire form for the live feed.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn total_suspension_force(&self) -> f32 {
        self.wheels.iter().map(|w| w.suspension.force).sum()
    }
}

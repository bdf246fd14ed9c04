//! Real-time vehicle dynamics on top of rapier3d.
//!
//! A [`car::Car`] owns four tyre + suspension corners, a drivetrain and its
//! driver aids. Every fixed step the caller runs [`car::Car::tick`] and then
//! steps the shared [`physics::PhysicsWorld`].

pub mod car;
pub mod config;
pub mod curve;
pub mod drivetrain;
pub mod error;
pub mod math;
pub mod net;
pub mod physics;
pub mod suspension;
pub mod tyre;

pub use car::Car;
pub use car::controls::CarControls;
pub use car::state::CarState;
pub use config::CarConfig;
pub use error::{Result, VehicleError};

//! Fatal error taxonomy for car initialization and per-tick invariants.
//!
//! Recoverable numerical trouble never shows up here: it is logged and zeroed
//! in place (see [`crate::math::sanitize`]). Everything in [`VehicleError`]
//! terminates the owning car's simulation.

use std::panic::Location;

use rapier3d::prelude::{ImpulseJointHandle, RigidBodyHandle};

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, VehicleError>;

#[derive(Debug, thiserror::Error)]
pub enum VehicleError {
    /// A mandatory configuration section or named curve is absent.
    #[error("[{subsystem}] missing mandatory section '{section}' (raised at {location})")]
    MissingSection {
        subsystem: &'static str,
        section: String,
        location: &'static Location<'static>,
    },

    /// A curve is empty, non-monotonic in x, or holds non-finite samples.
    #[error("[{subsystem}] malformed curve '{curve}': {reason} (raised at {location})")]
    MalformedCurve {
        subsystem: &'static str,
        curve: String,
        reason: String,
        location: &'static Location<'static>,
    },

    /// A scalar parameter violates its invariant.
    #[error("[{subsystem}] invalid value for '{field}': {reason} (raised at {location})")]
    InvalidValue {
        subsystem: &'static str,
        field: String,
        reason: String,
        location: &'static Location<'static>,
    },

    /// Configuration selected a branch that deliberately has no implementation.
    #[error("[{subsystem}] '{feature}' is not implemented (raised at {location})")]
    Unimplemented {
        subsystem: &'static str,
        feature: String,
        location: &'static Location<'static>,
    },

    #[error("[{subsystem}] rigid body {handle:?} is not present in the physics world")]
    MissingBody {
        subsystem: &'static str,
        handle: RigidBodyHandle,
    },

    #[error("[{subsystem}] joint {handle:?} is not present in the physics world")]
    MissingJoint {
        subsystem: &'static str,
        handle: ImpulseJointHandle,
    },

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse car configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl VehicleError {
    #[track_caller]
    pub fn missing_section(subsystem: &'static str, section: impl Into<String>) -> Self {
        Self::MissingSection {
            subsystem,
            section: section.into(),
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn malformed_curve(
        subsystem: &'static str,
        curve: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedCurve {
            subsystem,
            curve: curve.into(),
            reason: reason.into(),
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn invalid_value(
        subsystem: &'static str,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            subsystem,
            field: field.into(),
            reason: reason.into(),
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn unimplemented(subsystem: &'static str, feature: impl Into<String>) -> Self {
        Self::Unimplemented {
            subsystem,
            feature: feature.into(),
            location: Location::caller(),
        }
    }

    /// Subsystem that raised the error, for diagnostics.
    pub fn subsystem(&self) -> &'static str {
        match self {
            Self::MissingSection { subsystem, .. }
            | Self::MalformedCurve { subsystem, .. }
            | Self::InvalidValue { subsystem, .. }
            | Self::Unimplemented { subsystem, .. }
            | Self::MissingBody { subsystem, .. }
            | Self::MissingJoint { subsystem, .. } => subsystem,
            Self::Io { .. } | Self::Parse(_) => "config",
        }
    }
}

/// Checks `value > 0` and finite, for config validation.
#[track_caller]
pub(crate) fn ensure_positive(subsystem: &'static str, field: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(VehicleError::invalid_value(
            subsystem,
            field,
            format!("expected a finite value > 0, got {value}"),
        ))
    }
}

/// Checks `value >= 0` and finite, for config validation.
#[track_caller]
pub(crate) fn ensure_non_negative(subsystem: &'static str, field: &str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(VehicleError::invalid_value(
            subsystem,
            field,
            format!("expected a finite value >= 0, got {value}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unimplemented_reports_subsystem_and_location() {
        let err = VehicleError::unimplemented("drivetrain", "AWD traction");
        let msg = err.to_string();
        assert!(msg.contains("[drivetrain]"));
        assert!(msg.contains("AWD traction"));
        assert!(msg.contains("error.rs"));
        assert_eq!(err.subsystem(), "drivetrain");
    }

    #[test]
    fn positivity_checks() {
        assert!(ensure_positive("tyre", "radius", 0.3).is_ok());
        assert!(ensure_positive("tyre", "radius", 0.0).is_err());
        assert!(ensure_positive("tyre", "radius", f32::NAN).is_err());
        assert!(ensure_non_negative("tyre", "dirt", 0.0).is_ok());
        assert!(ensure_non_negative("tyre", "dirt", -1.0).is_err());
    }
}

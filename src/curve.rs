//! Piecewise-linear lookup curve.
//!
//! Used for torque curves, tyre thermal performance, wear, load sensitivity
//! and every other "x → y" table a car carries. Lookups clamp to the first and
//! last sample.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VehicleError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Curve {
    points: Vec<[f32; 2]>,
}

impl Curve {
    /// Build and validate. `name` only feeds error messages.
    pub fn new(name: &str, points: Vec<[f32; 2]>) -> Result<Self> {
        let curve = Self { points };
        curve.validate("curve", name)?;
        Ok(curve)
    }

    /// A curve that returns `value` everywhere.
    pub fn constant(value: f32) -> Self {
        Self {
            points: vec![[0.0, value]],
        }
    }

    /// Wrap samples without checking them. Every curve that reaches a running
    /// car goes through [`Curve::validate`] when it is resolved.
    pub fn from_samples(points: Vec<[f32; 2]>) -> Self {
        Self { points }
    }

    /// Check the shape invariants. Called on every curve a config hands in.
    pub fn validate(&self, subsystem: &'static str, name: &str) -> Result<()> {
        if self.points.is_empty() {
            return Err(VehicleError::malformed_curve(subsystem, name, "no samples"));
        }
        for (i, p) in self.points.iter().enumerate() {
            if !p[0].is_finite() || !p[1].is_finite() {
                return Err(VehicleError::malformed_curve(
                    subsystem,
                    name,
                    format!("sample {i} is not finite"),
                ));
            }
        }
        for (i, w) in self.points.windows(2).enumerate() {
            if w[1][0] <= w[0][0] {
                return Err(VehicleError::malformed_curve(
                    subsystem,
                    name,
                    format!("x is not strictly increasing at sample {}", i + 1),
                ));
            }
        }
        Ok(())
    }

    pub fn lookup(&self, x: f32) -> f32 {
        let Some(first) = self.points.first() else {
            return 0.0;
        };
        if x <= first[0] {
            return first[1];
        }
        for w in self.points.windows(2) {
            let (a, b) = (w[0], w[1]);
            if x <= b[0] {
                let t = (x - a[0]) / (b[0] - a[0]);
                return a[1] + (b[1] - a[1]) * t;
            }
        }
        self.points.last().map_or(0.0, |p| p[1])
    }

    pub fn points(&self) -> &[[f32; 2]] {
        &self.points
    }

    pub fn max_y(&self) -> f32 {
        self.points
            .iter()
            .map(|p| p[1])
            .fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn last_x(&self) -> f32 {
        self.points.last().map_or(0.0, |p| p[0])
    }

    /// Multiply every y sample in place.
    pub fn scale_y(&mut self, factor: f32) {
        for p in &mut self.points {
            p[1] *= factor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn interpolates_and_clamps() {
        let c = Curve::new("t", vec![[0.0, 0.0], [10.0, 100.0], [20.0, 50.0]]).unwrap();
        assert_relative_eq!(c.lookup(-5.0), 0.0);
        assert_relative_eq!(c.lookup(5.0), 50.0);
        assert_relative_eq!(c.lookup(15.0), 75.0);
        assert_relative_eq!(c.lookup(99.0), 50.0);
        assert_relative_eq!(c.max_y(), 100.0);
    }

    #[test]
    fn rejects_malformed_samples() {
        assert!(Curve::new("empty", vec![]).is_err());
        assert!(Curve::new("backwards", vec![[1.0, 0.0], [0.5, 1.0]]).is_err());
        assert!(Curve::new("nan", vec![[0.0, f32::NAN]]).is_err());
    }

    #[test]
    fn deserializes_from_pairs() {
        let c: Curve = serde_json::from_str("[[0, 1], [1, 2]]").unwrap();
        assert_relative_eq!(c.lookup(0.5), 1.5);
    }
}

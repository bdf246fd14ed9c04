// ==============================================================================
// cache.rs — PARSED CURVE CACHE (EXPLICIT, OWNED, NO GLOBALS)
// ------------------------------------------------------------------------------
// A car config refers to curves either inline or by name. Named curves are
// resolved through a CurveCache that the caller owns and passes into
// Car::spawn / hot-swap calls. Nothing here runs on the per-tick path.
//
// Lookup order for a named curve:
//   1) already cached            -> clone
//   2) cache has a root dir      -> read "<root>/<name>.json", validate, insert
//   3) otherwise                 -> MissingSection (fatal for that car)
// ==============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::curve::Curve;
use crate::error::{Result, VehicleError};

/// Where a curve comes from: samples in the config itself, or a cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CurveSource {
    Inline(Curve),
    Named(String),
}

impl From<Curve> for CurveSource {
    fn from(curve: Curve) -> Self {
        Self::Inline(curve)
    }
}

#[derive(Debug, Default)]
pub struct CurveCache {
    curves: HashMap<String, Curve>,
    root: Option<PathBuf>,
}

impl CurveCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache that can fall back to `<root>/<name>.json` for unknown names.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            curves: HashMap::new(),
            root: Some(root.into()),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, curve: Curve) -> Result<()> {
        let name = name.into();
        curve.validate("curve-cache", &name)?;
        self.curves.insert(name, curve);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Curve> {
        self.curves.get(name)
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    pub fn get_or_load(&mut self, name: &str) -> Result<Curve> {
        if let Some(curve) = self.curves.get(name) {
            return Ok(curve.clone());
        }
        let Some(root) = self.root.as_deref() else {
            return Err(VehicleError::missing_section("curve-cache", name));
        };
        let curve = load_curve_file(root, name)?;
        tracing::debug!(curve = name, samples = curve.points().len(), "curve loaded");
        self.curves.insert(name.to_owned(), curve.clone());
        Ok(curve)
    }

    /// Resolve a config reference into an owned, validated curve.
    pub fn resolve(
        &mut self,
        source: &CurveSource,
        subsystem: &'static str,
        field: &str,
    ) -> Result<Curve> {
        match source {
            CurveSource::Inline(curve) => {
                curve.validate(subsystem, field)?;
                Ok(curve.clone())
            }
            CurveSource::Named(name) => self.get_or_load(name),
        }
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&mut self, name: &str) -> bool {
        self.curves.remove(name).is_some()
    }

    /// Drop and re-read one entry from disk.
    pub fn reload(&mut self, name: &str) -> Result<Curve> {
        self.invalidate(name);
        self.get_or_load(name)
    }

    pub fn clear(&mut self) {
        self.curves.clear();
    }
}

fn load_curve_file(root: &Path, name: &str) -> Result<Curve> {
    let path = root.join(format!("{name}.json"));
    let text = std::fs::read_to_string(&path).map_err(|source| VehicleError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let curve: Curve = serde_json::from_str(&text)?;
    curve.validate("curve-cache", name)?;
    Ok(curve)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Curve {
        Curve::new("ramp", vec![[0.0, 0.0], [1.0, 1.0]]).unwrap()
    }

    #[test]
    fn inline_and_named_sources_deserialize() {
        let inline: CurveSource = serde_json::from_str("[[0, 1], [2, 3]]").unwrap();
        assert!(matches!(inline, CurveSource::Inline(_)));
        let named: CurveSource = serde_json::from_str("\"engine/torque\"").unwrap();
        assert_eq!(named, CurveSource::Named("engine/torque".into()));
    }

    #[test]
    fn unknown_name_without_root_is_missing_section() {
        let mut cache = CurveCache::new();
        let err = cache.get_or_load("nope").unwrap_err();
        assert!(matches!(err, VehicleError::MissingSection { .. }));
    }

    #[test]
    fn invalidate_and_clear() {
        let mut cache = CurveCache::new();
        cache.insert("a", ramp()).unwrap();
        cache.insert("b", ramp()).unwrap();
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn reload_reads_the_file_again() {
        let dir = std::env::temp_dir().join(format!("vd-curves-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("power.json"), "[[0, 1], [1, 2]]").unwrap();

        let mut cache = CurveCache::with_root(&dir);
        assert_eq!(cache.get_or_load("power").unwrap().lookup(1.0), 2.0);

        std::fs::write(dir.join("power.json"), "[[0, 5], [1, 6]]").unwrap();
        // still the cached copy
        assert_eq!(cache.get_or_load("power").unwrap().lookup(1.0), 2.0);
        assert_eq!(cache.reload("power").unwrap().lookup(1.0), 6.0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn inline_curve_is_validated_on_resolve() {
        let mut cache = CurveCache::new();
        let bad: CurveSource = serde_json::from_str("[[1, 0], [0, 1]]").unwrap();
        assert!(cache.resolve(&bad, "engine", "torque").is_err());
    }
}

// ==============================================================================
// track.rs — TRACK SURFACES, RAY → SURFACE DESCRIPTOR, TRACK LOCATION
// ------------------------------------------------------------------------------
// Surfaces are static rapier colliders in GROUP_TRACK. Each collider carries
// its surface index in `user_data`, so a ray hit resolves to a
// SurfaceDescriptor without any lookup table keyed by handle.
//
// Read-only once built: cars only borrow &Track during a tick.
// ==============================================================================

use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

use super::{GROUP_CHASSIS, GROUP_PROBE, GROUP_TRACK, PhysicsWorld};
use crate::error::{Result, ensure_non_negative, ensure_positive};

/// What a tyre needs to know about the ground it touches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceDescriptor {
    pub grip: f32,           // multiplier on tyre friction
    pub category: u32,       // collision / material category
    pub dirt_rate: f32,      // dirt picked up per metre rolled
    pub is_valid_track: bool,
}

impl Default for SurfaceDescriptor {
    fn default() -> Self {
        Self {
            grip: 1.0,
            category: 0,
            dirt_rate: 0.0,
            is_valid_track: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    pub name: String,
    #[serde(flatten)]
    pub descriptor: SurfaceDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    pub point: Point<Real>,
    pub normal: Vector<Real>,
    pub distance: Real,
    pub surface: SurfaceDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub ambient_temp: f32, // °C
    pub road_temp: f32,    // °C
    pub grip: f32,         // track-wide rubber level multiplier
    pub surfaces: Vec<SurfaceConfig>,
    /// Closed centre line, used for the normalized track location.
    pub centreline: Vec<[f32; 3]>,
    /// Half size of the default flat ground.
    pub ground_half_extent: f32,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            ambient_temp: 20.0,
            road_temp: 25.0,
            grip: 1.0,
            surfaces: vec![SurfaceConfig {
                name: "asphalt".into(),
                descriptor: SurfaceDescriptor::default(),
            }],
            centreline: Vec::new(),
            ground_half_extent: 500.0,
        }
    }
}

impl TrackConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("track", "grip", self.grip)?;
        ensure_positive("track", "ground_half_extent", self.ground_half_extent)?;
        if self.surfaces.is_empty() {
            return Err(crate::error::VehicleError::missing_section("track", "surfaces"));
        }
        for s in &self.surfaces {
            ensure_non_negative("track", format!("surfaces.{}.grip", s.name).as_str(), s.descriptor.grip)?;
            ensure_non_negative("track", format!("surfaces.{}.dirt_rate", s.name).as_str(), s.descriptor.dirt_rate)?;
        }
        Ok(())
    }
}

pub struct Track {
    surfaces: Vec<SurfaceDescriptor>,
    centreline: Vec<Point<Real>>,
    cumulative: Vec<f32>,
    pub ambient_temp: f32,
    pub road_temp: f32,
    pub grip: f32,
}

impl Track {
    /// Flat ground at y = 0 using the first configured surface.
    pub fn flat(world: &mut PhysicsWorld, config: &TrackConfig) -> Result<Self> {
        config.validate()?;
        let mut track = Self::empty(config);

        let ground = RigidBodyBuilder::fixed()
            .translation(vector![0.0, -1.0, 0.0])
            .build();
        let ground_handle = world.bodies.insert(ground);
        let half = config.ground_half_extent;
        track.insert_surface_collider(
            world,
            ground_handle,
            ColliderBuilder::cuboid(half, 1.0, half),
            0,
        );

        world.sync_queries();
        tracing::info!(
            surfaces = track.surfaces.len(),
            colliders = world.colliders.len(),
            "flat track ready"
        );
        Ok(track)
    }

    fn empty(config: &TrackConfig) -> Self {
        let centreline: Vec<Point<Real>> = config
            .centreline
            .iter()
            .map(|p| point![p[0], p[1], p[2]])
            .collect();
        let mut cumulative = Vec::with_capacity(centreline.len() + 1);
        let mut acc = 0.0;
        cumulative.push(0.0);
        for i in 0..centreline.len() {
            let next = centreline[(i + 1) % centreline.len()];
            acc += (next - centreline[i]).norm();
            cumulative.push(acc);
        }
        Self {
            surfaces: config.surfaces.iter().map(|s| s.descriptor).collect(),
            centreline,
            cumulative,
            ambient_temp: config.ambient_temp,
            road_temp: config.road_temp,
            grip: config.grip,
        }
    }

    /// Add a static box of surface `surface` (index into the config list).
    pub fn add_surface_box(
        &mut self,
        world: &mut PhysicsWorld,
        surface: usize,
        half_extents: Vector<Real>,
        pose: Isometry<Real>,
    ) -> ColliderHandle {
        let body = world.bodies.insert(RigidBodyBuilder::fixed().position(pose).build());
        let handle = self.insert_surface_collider(
            world,
            body,
            ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z),
            surface.min(self.surfaces.len().saturating_sub(1)),
        );
        world.sync_queries();
        handle
    }

    fn insert_surface_collider(
        &self,
        world: &mut PhysicsWorld,
        body: RigidBodyHandle,
        builder: ColliderBuilder,
        surface: usize,
    ) -> ColliderHandle {
        let collider = builder
            .collision_groups(InteractionGroups::new(
                GROUP_TRACK,
                GROUP_CHASSIS | GROUP_PROBE,
            ))
            .user_data(surface as u128)
            .friction(1.0)
            .restitution(0.0)
            .build();
        world
            .colliders
            .insert_with_parent(collider, body, &mut world.bodies)
    }

    pub fn surface(&self, index: usize) -> SurfaceDescriptor {
        self.surfaces.get(index).copied().unwrap_or_default()
    }

    /// Synchronous ray against track surfaces only.
    pub fn ray_cast(
        &self,
        world: &PhysicsWorld,
        origin: Point<Real>,
        dir: Vector<Real>,
        max_distance: Real,
    ) -> Option<SurfaceHit> {
        let hit = world.cast_ray(origin, dir, max_distance, PhysicsWorld::track_filter())?;
        let index = world
            .colliders
            .get(hit.collider)
            .map_or(0, |c| c.user_data as usize);
        Some(SurfaceHit {
            point: hit.point,
            normal: hit.normal,
            distance: hit.distance,
            surface: self.surface(index),
        })
    }

    /// Normalized position along the centre line in [0, 1). Zero without one.
    pub fn location(&self, p: Point<Real>) -> f32 {
        let n = self.centreline.len();
        let total = self.cumulative.last().copied().unwrap_or(0.0);
        if n < 2 || total <= 0.0 {
            return 0.0;
        }

        let mut best = (f32::MAX, 0.0);
        for i in 0..n {
            let a = self.centreline[i];
            let b = self.centreline[(i + 1) % n];
            let ab = b - a;
            let len2 = ab.norm_squared();
            let t = if len2 > 0.0 {
                ((p - a).dot(&ab) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let d2 = (p - (a + ab * t)).norm_squared();
            if d2 < best.0 {
                best = (d2, self.cumulative[i] + t * len2.sqrt());
            }
        }
        (best.1 / total).rem_euclid(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ray_hits_flat_ground_with_surface() {
        let mut world = PhysicsWorld::new();
        let track = Track::flat(&mut world, &TrackConfig::default()).unwrap();
        let hit = track
            .ray_cast(&world, point![0.0, 1.0, 0.0], vector![0.0, -1.0, 0.0], 5.0)
            .unwrap();
        assert_relative_eq!(hit.distance, 1.0, epsilon = 1e-4);
        assert_relative_eq!(hit.normal.y, 1.0, epsilon = 1e-4);
        assert_eq!(hit.surface, SurfaceDescriptor::default());
    }

    #[test]
    fn ray_that_misses_is_none() {
        let mut world = PhysicsWorld::new();
        let track = Track::flat(&mut world, &TrackConfig::default()).unwrap();
        assert!(track
            .ray_cast(&world, point![0.0, 10.0, 0.0], vector![0.0, -1.0, 0.0], 2.0)
            .is_none());
    }

    #[test]
    fn grass_patch_reports_its_own_descriptor() {
        let mut config = TrackConfig::default();
        config.surfaces.push(SurfaceConfig {
            name: "grass".into(),
            descriptor: SurfaceDescriptor {
                grip: 0.6,
                category: 2,
                dirt_rate: 0.01,
                is_valid_track: false,
            },
        });
        let mut world = PhysicsWorld::new();
        let mut track = Track::flat(&mut world, &config).unwrap();
        track.add_surface_box(
            &mut world,
            1,
            vector![5.0, 0.05, 5.0],
            Isometry::translation(20.0, 0.0, 0.0),
        );
        let hit = track
            .ray_cast(&world, point![20.0, 1.0, 0.0], vector![0.0, -1.0, 0.0], 5.0)
            .unwrap();
        assert_eq!(hit.surface.category, 2);
        assert!(!hit.surface.is_valid_track);
    }

    #[test]
    fn location_wraps_around_the_centreline() {
        let config = TrackConfig {
            centreline: vec![[0.0, 0.0, 0.0], [100.0, 0.0, 0.0], [100.0, 0.0, 100.0], [0.0, 0.0, 100.0]],
            ..TrackConfig::default()
        };
        let mut world = PhysicsWorld::new();
        let track = Track::flat(&mut world, &config).unwrap();
        assert_relative_eq!(track.location(point![50.0, 0.0, 0.0]), 0.125, epsilon = 1e-4);
        assert_relative_eq!(track.location(point![0.0, 0.0, 50.0]), 0.875, epsilon = 1e-4);
    }
}

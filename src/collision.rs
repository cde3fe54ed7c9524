//! Ray query result structures.
//!
//! These structures hold the results of physics queries (raycasts) used for
//! ground snapping, wall probes, ledge probes and climb probes.

use bevy::prelude::*;
use std::f32::consts::FRAC_PI_2;

/// Information about a raycast hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance from the ray origin to the hit point.
    pub distance: f32,
    /// World position of the hit point.
    pub point: Vec3,
    /// Normal of the surface at the hit point.
    pub normal: Vec3,
    /// Entity that was hit.
    pub entity: Entity,
}

impl RayHit {
    /// Create a hit result.
    pub fn new(distance: f32, point: Vec3, normal: Vec3, entity: Entity) -> Self {
        Self {
            distance,
            point,
            normal,
            entity,
        }
    }

    /// Tilt of the hit surface away from horizontal, measured separately in
    /// the XY and ZY planes, in radians.
    ///
    /// Flat ground (normal `+Y`) reports `(0, 0)`; a sheer wall reports
    /// `FRAC_PI_2` on the axis facing it. Ground snapping compares these
    /// against the slip-free angle.
    pub fn surface_tilt(&self) -> Vec2 {
        Vec2::new(
            (self.normal.y.atan2(self.normal.x) - FRAC_PI_2).abs(),
            (self.normal.y.atan2(self.normal.z) - FRAC_PI_2).abs(),
        )
    }

    /// Angle between the surface normal and world up, in radians.
    ///
    /// Flat ground reports `0`, a sheer wall `FRAC_PI_2`, an overhang
    /// more than that. The wall-run gate compares this against the
    /// minimum runnable wall angle.
    pub fn wall_angle(&self) -> f32 {
        let normal = self.normal.normalize_or_zero();
        normal.y.clamp(-1.0, 1.0).acos()
    }

    /// Whether the surface faces upward enough to stand or grab onto.
    pub fn is_upward_facing(&self) -> bool {
        self.normal.y > 0.0
    }
}

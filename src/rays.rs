//! Ray sensor registry.
//!
//! Characters probe their surroundings through a set of registered rays:
//! the foot ray for ground stepping, forward probes for walls, ledge and
//! climb detectors. All rays are defined in character-local space and
//! refreshed once per fixed step, before any state logic reads them.
//!
//! Rays registered as *cycled* are refreshed round-robin, one per step, as
//! a load-shedding measure for probes that tolerate one frame of staleness
//! (the wall-run side probes). Everything else is cast every step. A miss
//! always clears the cached hit; a stale hit is never returned for a
//! non-cycled ray.

use bevy::prelude::*;

use crate::backend::PhysicsBackend;
use crate::collision::RayHit;

/// Identifier for a registered ray sensor.
///
/// The controller and the built-in control plugins use the constants
/// below; external plugins should allocate ids from [`RayId::USER_BASE`]
/// upwards.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RayId(pub u16);

impl RayId {
    /// Foot ray used by the ground step.
    pub const FOOT: RayId = RayId(0);
    /// Forward probe used by wall collision avoidance.
    pub const FORWARD: RayId = RayId(1);
    pub const WALL_RUN_FORWARD: RayId = RayId(2);
    pub const WALL_RUN_LEFT: RayId = RayId(3);
    pub const WALL_RUN_RIGHT: RayId = RayId(4);
    /// Forward probe at full height used by the ledge grab.
    pub const LEDGE_FORWARD: RayId = RayId(5);
    /// Vertical ledge detector ahead of the character.
    pub const LEDGE_DETECT: RayId = RayId(6);
    pub const LEDGE_DETECT_LEFT: RayId = RayId(7);
    pub const LEDGE_DETECT_RIGHT: RayId = RayId(8);
    /// Forward probe at foot level used by climbing.
    pub const CLIMB_CENTER: RayId = RayId(9);
    pub const CLIMB_TOP: RayId = RayId(10);
    pub const CLIMB_LEFT: RayId = RayId(11);
    pub const CLIMB_RIGHT: RayId = RayId(12);
    /// Vertical probe for the spot the character stands on after a climb
    /// exit over the top edge.
    pub const CLIMB_EXIT_UP: RayId = RayId(13);
    /// First id available to external control plugins.
    pub const USER_BASE: RayId = RayId(64);
}

/// Endpoints of a ray sensor in character-local space.
///
/// Bevy conventions: `-Z` is forward, `+Y` is up.
#[derive(Reflect, Debug, Clone, Copy)]
pub struct RaySpec {
    pub point_a: Vec3,
    pub point_b: Vec3,
    /// Refreshed round-robin instead of every step.
    pub cycled: bool,
}

impl RaySpec {
    pub fn new(point_a: Vec3, point_b: Vec3) -> Self {
        Self { point_a, point_b, cycled: false }
    }

    pub fn cycled(point_a: Vec3, point_b: Vec3) -> Self {
        Self { point_a, point_b, cycled: true }
    }
}

#[derive(Debug, Clone)]
struct RayEntry {
    id: RayId,
    spec: RaySpec,
    hit: Option<RayHit>,
}

/// A single cast the refresh system has to perform this step.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CastJob {
    pub index: usize,
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f32,
}

/// Per-character ray sensor set and hit cache.
///
/// Registration order is stable and drives the round-robin order of
/// cycled rays.
#[derive(Component, Default)]
pub struct RaySensors {
    entries: Vec<RayEntry>,
    cursor: usize,
}

impl RaySensors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ray. Re-registering an id replaces its spec and clears
    /// the cached hit.
    pub fn register(&mut self, id: RayId, spec: RaySpec) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.spec = spec;
            entry.hit = None;
        } else {
            self.entries.push(RayEntry { id, spec, hit: None });
        }
    }

    /// Move an existing ray's endpoints, keeping its cached hit.
    pub fn update_endpoints(&mut self, id: RayId, point_a: Vec3, point_b: Vec3) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.spec.point_a = point_a;
            entry.spec.point_b = point_b;
        }
    }

    /// Latest hit of a ray, if any.
    pub fn query(&self, id: RayId) -> Option<&RayHit> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.hit.as_ref())
    }

    /// Drop the cached hit of one ray.
    pub fn clear(&mut self, id: RayId) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.hit = None;
        }
    }

    /// Drop all cached hits. Call after teleporting the character, the
    /// cache refers to the old position.
    pub fn clear_all(&mut self) {
        for entry in &mut self.entries {
            entry.hit = None;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cycled_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.spec.cycled)
            .map(|(i, _)| i)
            .collect()
    }

    /// Casts due this step: every non-cycled ray plus the one cycled ray
    /// the cursor points at. Advances the cursor.
    pub(crate) fn plan_casts(&mut self, transform: &Transform) -> Vec<CastJob> {
        let cycled = self.cycled_indices();
        let due_cycled = if cycled.is_empty() {
            None
        } else {
            let picked = cycled[self.cursor % cycled.len()];
            self.cursor = (self.cursor + 1) % cycled.len();
            Some(picked)
        };

        let mut jobs = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.spec.cycled && Some(index) != due_cycled {
                continue;
            }
            let origin = transform.translation + transform.rotation * entry.spec.point_a;
            let end = transform.translation + transform.rotation * entry.spec.point_b;
            let segment = end - origin;
            let max_distance = segment.length();
            if max_distance <= f32::EPSILON {
                continue;
            }
            jobs.push(CastJob {
                index,
                origin,
                direction: segment / max_distance,
                max_distance,
            });
        }
        jobs
    }

    pub(crate) fn store(&mut self, index: usize, hit: Option<RayHit>) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.hit = hit;
        }
    }
}

/// Refreshes every character's ray sensors against the physics backend.
///
/// Runs at the top of the fixed-step chain so all later systems read
/// current-frame hits.
pub fn refresh_ray_sensors<B: PhysicsBackend>(world: &mut World) {
    let mut planned: Vec<(Entity, Vec<CastJob>)> = Vec::new();
    let mut query = world.query::<(Entity, &Transform, &mut RaySensors)>();
    for (entity, transform, mut sensors) in query.iter_mut(world) {
        let jobs = sensors.plan_casts(transform);
        if !jobs.is_empty() {
            planned.push((entity, jobs));
        }
    }

    for (entity, jobs) in planned {
        let results: Vec<(usize, Option<RayHit>)> = jobs
            .iter()
            .map(|job| {
                (
                    job.index,
                    B::raycast(world, job.origin, job.direction, job.max_distance, entity),
                )
            })
            .collect();
        if let Some(mut sensors) = world.get_mut::<RaySensors>(entity) {
            for (index, hit) in results {
                sensors.store(index, hit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(distance: f32) -> RayHit {
        RayHit::new(distance, Vec3::ZERO, Vec3::Y, Entity::PLACEHOLDER)
    }

    #[test]
    fn register_and_query() {
        let mut sensors = RaySensors::new();
        sensors.register(RayId::FOOT, RaySpec::new(Vec3::Y, Vec3::new(0.0, -0.3, 0.0)));
        assert_eq!(sensors.len(), 1);
        assert!(sensors.query(RayId::FOOT).is_none());

        sensors.store(0, Some(hit(0.5)));
        assert_eq!(sensors.query(RayId::FOOT).unwrap().distance, 0.5);

        sensors.clear(RayId::FOOT);
        assert!(sensors.query(RayId::FOOT).is_none());
    }

    #[test]
    fn reregister_replaces_and_clears() {
        let mut sensors = RaySensors::new();
        sensors.register(RayId::FORWARD, RaySpec::new(Vec3::ZERO, Vec3::NEG_Z));
        sensors.store(0, Some(hit(1.0)));
        sensors.register(RayId::FORWARD, RaySpec::new(Vec3::ZERO, Vec3::NEG_Z * 2.0));
        assert_eq!(sensors.len(), 1);
        assert!(sensors.query(RayId::FORWARD).is_none());
    }

    #[test]
    fn non_cycled_rays_cast_every_step() {
        let mut sensors = RaySensors::new();
        sensors.register(RayId::FOOT, RaySpec::new(Vec3::Y, Vec3::NEG_Y));
        sensors.register(RayId::FORWARD, RaySpec::new(Vec3::ZERO, Vec3::NEG_Z));

        let transform = Transform::IDENTITY;
        for _ in 0..3 {
            let jobs = sensors.plan_casts(&transform);
            assert_eq!(jobs.len(), 2);
        }
    }

    #[test]
    fn cycled_rays_round_robin_one_per_step() {
        let mut sensors = RaySensors::new();
        sensors.register(RayId::FOOT, RaySpec::new(Vec3::Y, Vec3::NEG_Y));
        sensors.register(RayId::WALL_RUN_LEFT, RaySpec::cycled(Vec3::ZERO, Vec3::NEG_X));
        sensors.register(RayId::WALL_RUN_RIGHT, RaySpec::cycled(Vec3::ZERO, Vec3::X));

        let transform = Transform::IDENTITY;

        // Foot plus exactly one of the two cycled rays, alternating.
        let first = sensors.plan_casts(&transform);
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].index, 1);

        let second = sensors.plan_casts(&transform);
        assert_eq!(second.len(), 2);
        assert_eq!(second[1].index, 2);

        let third = sensors.plan_casts(&transform);
        assert_eq!(third[1].index, 1);
    }

    #[test]
    fn jobs_are_in_world_space() {
        let mut sensors = RaySensors::new();
        sensors.register(
            RayId::FORWARD,
            RaySpec::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 1.0, -2.0)),
        );

        // Character at (10, 0, 0), turned 180 degrees: local -Z becomes +Z.
        let transform = Transform::from_translation(Vec3::new(10.0, 0.0, 0.0))
            .with_rotation(Quat::from_rotation_y(std::f32::consts::PI));
        let jobs = sensors.plan_casts(&transform);
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert!((job.origin - Vec3::new(10.0, 1.0, 0.0)).length() < 1e-5);
        assert!((job.direction - Vec3::Z).length() < 1e-5);
        assert!((job.max_distance - 2.0).abs() < 1e-5);
    }

    #[test]
    fn clear_all_drops_every_hit() {
        let mut sensors = RaySensors::new();
        sensors.register(RayId::FOOT, RaySpec::new(Vec3::Y, Vec3::NEG_Y));
        sensors.register(RayId::FORWARD, RaySpec::new(Vec3::ZERO, Vec3::NEG_Z));
        sensors.store(0, Some(hit(0.2)));
        sensors.store(1, Some(hit(1.5)));

        sensors.clear_all();
        assert!(sensors.query(RayId::FOOT).is_none());
        assert!(sensors.query(RayId::FORWARD).is_none());
    }
}

//! Self-contained kinematic physics backend.
//!
//! No physics engine: world geometry is registered as [`BrushCollider`]
//! components, rays and clearance probes run through `parry3d` queries, and
//! a single integration system applies gravity to [`KinematicBody`]
//! velocities. Headless tests and tools run entirely on this backend; apps
//! can also use it for worlds simple enough not to warrant Rapier.
//!
//! Brush poses are snapshotted into a [`BrushRegistry`] resource at the top
//! of every fixed step so ray queries can run against a plain `&World`.

use bevy::prelude::*;
use parry3d::math::{Isometry, Point, Vector};
use parry3d::na;
use parry3d::query::{self, Ray};
use parry3d::shape::SharedShape;

use crate::backend::{PhysicsBackend, CLEARANCE_HEIGHT, CLEARANCE_RADIUS};
use crate::collision::RayHit;

/// Velocity and simulation mode of a body driven by [`KinematicBackend`].
///
/// While `kinematic` is set the integration system leaves the body alone;
/// the controller moves it by writing its transform directly.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq, Default)]
#[reflect(Component)]
pub struct KinematicBody {
    pub velocity: Vec3,
    pub kinematic: bool,
}

impl KinematicBody {
    /// Advance one step: accumulate gravity and return the translation to
    /// apply. Kinematic bodies don't move on their own.
    pub(crate) fn integrate(&mut self, gravity: Vec3, dt: f32) -> Vec3 {
        if self.kinematic {
            return Vec3::ZERO;
        }
        self.velocity += gravity * dt;
        self.velocity * dt
    }
}

/// Collision shape for world geometry.
///
/// Spawn on any entity with a `GlobalTransform` to make it solid for the
/// kinematic backend. Shapes are centered on the entity origin.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq)]
#[reflect(Component)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum BrushCollider {
    Cuboid { half_extents: Vec3 },
    Capsule { half_height: f32, radius: f32 },
    Ball { radius: f32 },
}

impl Default for BrushCollider {
    fn default() -> Self {
        Self::Cuboid {
            half_extents: Vec3::splat(0.5),
        }
    }
}

impl BrushCollider {
    pub fn cuboid(half_x: f32, half_y: f32, half_z: f32) -> Self {
        Self::Cuboid {
            half_extents: Vec3::new(half_x, half_y, half_z),
        }
    }

    /// Vertical capsule; `half_height` is the half-length of the cylinder
    /// part, matching `parry3d`.
    pub fn capsule(half_height: f32, radius: f32) -> Self {
        Self::Capsule {
            half_height,
            radius,
        }
    }

    pub fn ball(radius: f32) -> Self {
        Self::Ball { radius }
    }

    /// Distance from the shape center down to its lowest point.
    pub fn bottom_offset(&self) -> f32 {
        match *self {
            Self::Cuboid { half_extents } => half_extents.y,
            Self::Capsule {
                half_height,
                radius,
            } => half_height + radius,
            Self::Ball { radius } => radius,
        }
    }

    fn shape(&self) -> SharedShape {
        match *self {
            Self::Cuboid { half_extents } => {
                SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            Self::Capsule {
                half_height,
                radius,
            } => SharedShape::capsule_y(half_height, radius),
            Self::Ball { radius } => SharedShape::ball(radius),
        }
    }
}

/// World gravity used by the kinematic backend.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct KinematicGravity(pub Vec3);

impl Default for KinematicGravity {
    fn default() -> Self {
        Self(Vec3::new(0.0, -9.81, 0.0))
    }
}

#[derive(Debug, Clone, Copy)]
struct BrushEntry {
    entity: Entity,
    shape: BrushCollider,
    translation: Vec3,
    rotation: Quat,
}

impl BrushEntry {
    fn isometry(&self) -> Isometry<f32> {
        let translation = Vector::new(self.translation.x, self.translation.y, self.translation.z);
        let rotation = na::UnitQuaternion::from_quaternion(na::Quaternion::new(
            self.rotation.w,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        ));
        Isometry::from_parts(translation.into(), rotation)
    }
}

/// Snapshot of every brush pose, refreshed once per fixed step.
#[derive(Resource, Default)]
pub struct BrushRegistry {
    entries: Vec<BrushEntry>,
}

impl BrushRegistry {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Re-snapshot brush poses. Runs before the ray sensors so moving platforms
/// are probed where they are this step, not where they were last step.
pub fn refresh_brush_registry(world: &mut World) {
    let mut entries = Vec::new();
    let mut brushes = world.query::<(Entity, &BrushCollider, &GlobalTransform)>();
    for (entity, brush, transform) in brushes.iter(world) {
        let (_, rotation, translation) = transform.to_scale_rotation_translation();
        entries.push(BrushEntry {
            entity,
            shape: *brush,
            translation,
            rotation,
        });
    }
    world.resource_mut::<BrushRegistry>().entries = entries;
}

/// Apply gravity and advance every dynamic body.
pub(crate) fn integrate_kinematic_bodies(
    time: Res<Time>,
    gravity: Res<KinematicGravity>,
    mut bodies: Query<(&mut KinematicBody, &mut Transform)>,
) {
    let dt = time.delta_secs();
    for (mut body, mut transform) in &mut bodies {
        transform.translation += body.integrate(gravity.0, dt);
    }
}

fn to_point(v: Vec3) -> Point<f32> {
    Point::new(v.x, v.y, v.z)
}

fn to_vector(v: Vec3) -> Vector<f32> {
    Vector::new(v.x, v.y, v.z)
}

/// Physics backend backed by [`BrushCollider`] geometry and `parry3d`
/// queries. Always compiled; the Rapier backend is the production
/// alternative behind the `rapier3d` feature.
pub struct KinematicBackend;

impl PhysicsBackend for KinematicBackend {
    fn plugin() -> impl Plugin {
        KinematicBackendPlugin
    }

    fn raycast(
        world: &World,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        exclude: Entity,
    ) -> Option<RayHit> {
        let registry = world.get_resource::<BrushRegistry>()?;
        let ray = Ray::new(to_point(origin), to_vector(direction));

        let mut closest: Option<RayHit> = None;
        for entry in &registry.entries {
            if entry.entity == exclude {
                continue;
            }
            let iso = entry.isometry();
            let shape = entry.shape.shape();
            let Some(distance) = shape.cast_ray(&iso, &ray, max_distance, true) else {
                continue;
            };
            let closer = closest.as_ref().map_or(true, |hit| distance < hit.distance);
            if !closer {
                continue;
            }
            // Second query for the surface normal; the margin keeps it from
            // missing the hit it just found to rounding.
            let normal = shape
                .cast_ray_and_get_normal(&iso, &ray, distance + 0.01, true)
                .map(|intersection| {
                    Vec3::new(
                        intersection.normal.x,
                        intersection.normal.y,
                        intersection.normal.z,
                    )
                })
                .unwrap_or(-direction);
            closest = Some(RayHit::new(
                distance,
                origin + direction * distance,
                normal,
                entry.entity,
            ));
        }
        closest
    }

    fn velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<KinematicBody>(entity)
            .map(|body| body.velocity)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut body) = world.get_mut::<KinematicBody>(entity) {
            body.velocity = velocity;
        }
    }

    fn apply_impulse(world: &mut World, entity: Entity, impulse: Vec3) {
        if let Some(mut body) = world.get_mut::<KinematicBody>(entity) {
            body.velocity += impulse;
        }
    }

    fn set_kinematic(world: &mut World, entity: Entity, kinematic: bool) {
        if let Some(mut body) = world.get_mut::<KinematicBody>(entity) {
            // Velocity resets on the actual switch so a hang doesn't keep
            // fall speed and a release doesn't launch with stale drift.
            if body.kinematic != kinematic {
                body.kinematic = kinematic;
                body.velocity = Vec3::ZERO;
            }
        }
    }

    fn is_kinematic(world: &World, entity: Entity) -> bool {
        world
            .get::<KinematicBody>(entity)
            .map(|body| body.kinematic)
            .unwrap_or(false)
    }

    fn gravity(world: &World) -> Vec3 {
        world
            .get_resource::<KinematicGravity>()
            .map(|gravity| gravity.0)
            .unwrap_or_else(|| KinematicGravity::default().0)
    }

    fn fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.delta_secs())
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0 / 60.0)
    }

    fn check_future_space(world: &World, entity: Entity, position: Vec3) -> bool {
        let Some(registry) = world.get_resource::<BrushRegistry>() else {
            return true;
        };
        let probe = SharedShape::ball(CLEARANCE_RADIUS);
        let probe_iso = Isometry::translation(
            position.x,
            position.y + CLEARANCE_HEIGHT,
            position.z,
        );

        for entry in &registry.entries {
            if entry.entity == entity {
                continue;
            }
            let contact = query::contact(
                &probe_iso,
                probe.as_ref(),
                &entry.isometry(),
                entry.shape.shape().as_ref(),
                0.0,
            );
            if let Ok(Some(_)) = contact {
                return false;
            }
        }
        true
    }

    fn collider_bottom_offset(world: &World, entity: Entity) -> f32 {
        world
            .get::<BrushCollider>(entity)
            .map(BrushCollider::bottom_offset)
            .unwrap_or(0.0)
    }
}

/// Sets up the brush registry and the integration systems.
pub struct KinematicBackendPlugin;

impl Plugin for KinematicBackendPlugin {
    fn build(&self, app: &mut App) {
        use crate::CharacterControllerSet;

        app.init_resource::<BrushRegistry>();
        app.init_resource::<KinematicGravity>();
        app.register_type::<KinematicBody>();
        app.register_type::<BrushCollider>();

        app.add_systems(
            FixedUpdate,
            refresh_brush_registry.in_set(CharacterControllerSet::Preparation),
        );
        app.add_systems(
            FixedUpdate,
            integrate_kinematic_bodies.in_set(CharacterControllerSet::FinalApplication),
        );
    }
}

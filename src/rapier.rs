//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature. The backend expects the application
//! to add `RapierPhysicsPlugin` itself; it only layers the character
//! controller's queries on top of an existing simulation.

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use bevy_rapier3d::rapier::parry::query::DefaultQueryDispatcher;

use crate::backend::{PhysicsBackend, CLEARANCE_HEIGHT, CLEARANCE_RADIUS};
use crate::collision::RayHit;

/// Rapier3D physics backend for the character controller.
///
/// Scene queries (raycasts, clearance probes) go through the query pipeline
/// of the default Rapier context. Rapier stores that context in components
/// on an entity, so the backend tracks the entity in [`RapierContextEntity`]
/// and reads the pieces it needs with plain world lookups.
pub struct RapierBackend;

/// Entity carrying the default Rapier context components.
///
/// Kept current by [`RapierBackendPlugin`]. Scene queries report no hits
/// until the context has spawned.
#[derive(Resource, Clone, Copy)]
pub struct RapierContextEntity(pub Entity);

struct ContextView<'w> {
    colliders: &'w RapierContextColliders,
    bodies: &'w RapierRigidBodySet,
    simulation: &'w RapierContextSimulation,
}

fn context_view(world: &World) -> Option<ContextView<'_>> {
    let entity = world.get_resource::<RapierContextEntity>()?.0;
    Some(ContextView {
        colliders: world.get::<RapierContextColliders>(entity)?,
        bodies: world.get::<RapierRigidBodySet>(entity)?,
        simulation: world.get::<RapierContextSimulation>(entity)?,
    })
}

impl ContextView<'_> {
    /// Runs `scoped_fn` over a query pipeline filtered by `filter`.
    fn with_query_pipeline<T>(
        &self,
        filter: QueryFilter<'_>,
        scoped_fn: impl FnOnce(RapierQueryPipeline<'_>) -> T,
    ) -> T {
        RapierQueryPipeline::new_scoped(
            &self.simulation.broad_phase,
            self.colliders,
            self.bodies,
            &filter,
            &DefaultQueryDispatcher,
            scoped_fn,
        )
    }
}

/// Filter excluding the character's own body and any sensor colliders.
fn character_filter(exclude: Entity) -> QueryFilter<'static> {
    QueryFilter::default()
        .exclude_rigid_body(exclude)
        .exclude_sensors()
}

fn missing_body_component(entity: Entity, component: &str) {
    error!("character {entity} has no {component}; is RapierCharacterBundle attached?");
    debug_assert!(false, "character {entity} has no {component}");
}

impl PhysicsBackend for RapierBackend {
    fn plugin() -> impl Plugin {
        RapierBackendPlugin
    }

    fn raycast(
        world: &World,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        exclude: Entity,
    ) -> Option<RayHit> {
        let context = context_view(world)?;
        context.with_query_pipeline(character_filter(exclude), |query_pipeline| {
            query_pipeline
                .cast_ray_and_get_normal(origin, direction, max_distance, true)
                .map(|(entity, hit)| {
                    RayHit::new(hit.time_of_impact, hit.point, hit.normal, entity)
                })
        })
    }

    fn velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.linvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        let Some(mut vel) = world.get_mut::<Velocity>(entity) else {
            missing_body_component(entity, "Velocity");
            return;
        };
        vel.linvel = velocity;
    }

    fn apply_impulse(world: &mut World, entity: Entity, impulse: Vec3) {
        // Impulses are expressed as velocity changes; scale by mass so the
        // same vector kicks every character equally hard.
        let mass = world
            .get::<ReadMassProperties>(entity)
            .map(|m| m.mass)
            .filter(|&m| m > 0.0)
            .unwrap_or(1.0);
        if let Some(mut ext_impulse) = world.get_mut::<ExternalImpulse>(entity) {
            ext_impulse.impulse += impulse * mass;
        } else if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            // No ExternalImpulse attached; fold the change into the velocity.
            vel.linvel += impulse;
        } else {
            missing_body_component(entity, "ExternalImpulse");
        }
    }

    fn set_kinematic(world: &mut World, entity: Entity, kinematic: bool) {
        let Some(&body) = world.get::<RigidBody>(entity) else {
            missing_body_component(entity, "RigidBody");
            return;
        };
        let target = if kinematic {
            RigidBody::KinematicPositionBased
        } else {
            RigidBody::Dynamic
        };
        if body == target {
            return;
        }
        if let Some(mut rigid_body) = world.get_mut::<RigidBody>(entity) {
            *rigid_body = target;
        }
        // Leftover momentum would flush back into the simulation the moment
        // the body turns dynamic again.
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            *vel = Velocity::zero();
        }
    }

    fn is_kinematic(world: &World, entity: Entity) -> bool {
        matches!(
            world.get::<RigidBody>(entity),
            Some(RigidBody::KinematicPositionBased | RigidBody::KinematicVelocityBased)
        )
    }

    fn gravity(world: &World) -> Vec3 {
        world
            .get_resource::<RapierContextEntity>()
            .and_then(|context| world.get::<RapierConfiguration>(context.0))
            .map(|config| config.gravity)
            .unwrap_or(Vec3::new(0.0, -9.81, 0.0))
    }

    fn fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.delta_secs())
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0 / 60.0)
    }

    fn check_future_space(world: &World, entity: Entity, position: Vec3) -> bool {
        let Some(context) = context_view(world) else {
            // No physics context yet; do not veto the maneuver.
            return true;
        };
        let probe = Collider::ball(CLEARANCE_RADIUS);
        context.with_query_pipeline(character_filter(entity), |query_pipeline| {
            query_pipeline
                .intersect_shape(
                    position + Vec3::Y * CLEARANCE_HEIGHT,
                    Quat::IDENTITY,
                    &*probe.raw,
                )
                .next()
                .is_none()
        })
    }

    fn collider_bottom_offset(world: &World, entity: Entity) -> f32 {
        world
            .get::<Collider>(entity)
            .map(collider_bottom_offset)
            .unwrap_or(0.0)
    }
}

/// Get the distance from collider center to bottom for a given collider.
/// For capsules, this is half_height + radius.
pub fn collider_bottom_offset(collider: &Collider) -> f32 {
    if let Some(capsule) = collider.as_capsule() {
        // Capsule: half-length of segment + radius
        let segment = capsule.segment();
        let half_height = (segment.a().y - segment.b().y).abs() / 2.0;
        half_height + capsule.radius()
    } else if let Some(ball) = collider.as_ball() {
        ball.radius()
    } else if let Some(cuboid) = collider.as_cuboid() {
        cuboid.half_extents().y
    } else {
        // Unknown shape: measure from the origin
        0.0
    }
}

/// Plugin registering the Rapier backend.
///
/// Added automatically through `CharacterControllerPlugin` when the backend
/// type parameter is [`RapierBackend`]. Does not add `RapierPhysicsPlugin`;
/// the application owns the simulation setup.
pub struct RapierBackendPlugin;

impl Plugin for RapierBackendPlugin {
    fn build(&self, app: &mut App) {
        // The context entity spawns after plugin setup, so track it every
        // frame rather than once at startup.
        app.add_systems(PreUpdate, cache_rapier_context);
    }
}

/// Records which entity carries the default Rapier context components.
fn cache_rapier_context(
    mut commands: Commands,
    cached: Option<Res<RapierContextEntity>>,
    context: Query<Entity, With<DefaultRapierContext>>,
) {
    let Ok(entity) = context.single() else {
        return;
    };
    if cached.map(|c| c.0) != Some(entity) {
        commands.insert_resource(RapierContextEntity(entity));
    }
}

/// Physics components a Rapier-driven character needs besides its collider.
///
/// Spawn this next to the controller components and a [`Collider`]:
///
/// ```ignore
/// commands.spawn((
///     CharacterController::default(),
///     ControllerConfig::default(),
///     InputIntent::default(),
///     RapierCharacterBundle::new(),
///     Collider::capsule_y(0.6, 0.3),
///     Transform::from_xyz(0.0, 1.0, 0.0),
/// ));
/// ```
#[derive(Bundle)]
pub struct RapierCharacterBundle {
    pub rigid_body: RigidBody,
    pub velocity: Velocity,
    pub external_impulse: ExternalImpulse,
    pub locked_axes: LockedAxes,
    pub damping: Damping,
    pub mass_properties: ReadMassProperties,
}

impl RapierCharacterBundle {
    /// Create the default character body: dynamic, rotation locked, no
    /// linear damping.
    ///
    /// Rotation stays locked because the controller writes character yaw
    /// straight to the [`Transform`]; a simulated rotation would fight it.
    /// Linear damping stays at zero so jump arcs keep their energy.
    pub fn new() -> Self {
        Self {
            rigid_body: RigidBody::Dynamic,
            velocity: Velocity::default(),
            external_impulse: ExternalImpulse::default(),
            locked_axes: LockedAxes::ROTATION_LOCKED,
            damping: Damping {
                linear_damping: 0.0,
                angular_damping: 1.0,
            },
            // Rapier fills this in from the collider after the first step
            mass_properties: ReadMassProperties::default(),
        }
    }

    /// Set the rigid body type.
    ///
    /// [`RigidBody::Dynamic`] (the default) lets gravity and impulses drive
    /// jumps and falls. The controller itself switches the body kinematic
    /// while flying, hanging or climbing, so there is rarely a reason to
    /// start from anything else.
    pub fn with_body(mut self, body: RigidBody) -> Self {
        self.rigid_body = body;
        self
    }

    /// Set the damping coefficients.
    ///
    /// Nonzero linear damping bleeds speed out of jump arcs, so raise it
    /// only for deliberately heavy characters.
    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.damping = Damping {
            linear_damping: linear,
            angular_damping: angular,
        };
        self
    }

    /// Set which axes are locked.
    pub fn with_locked_axes(mut self, axes: LockedAxes) -> Self {
        self.locked_axes = axes;
        self
    }
}

impl Default for RapierCharacterBundle {
    fn default() -> Self {
        Self::new()
    }
}

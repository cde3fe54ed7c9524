//! Physics backend abstraction.
//!
//! The controller core never talks to a physics engine directly; everything
//! goes through this trait. Two implementations ship with the crate: a
//! Rapier-backed one (`rapier` module, default feature) and a
//! self-contained kinematic one (`kinematic` module) that tests and
//! headless tools use.

use bevy::prelude::*;

use crate::collision::RayHit;

/// Trait for physics backend implementations.
///
/// All methods are associated functions over the [`World`] so the
/// controller systems can stay generic without carrying backend state
/// around. Velocity, impulses and kinematic switching operate on the
/// character's body entity.
pub trait PhysicsBackend: 'static + Send + Sync {
    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;

    /// Cast a ray and return the nearest hit.
    ///
    /// `direction` should be normalized. The character's own body (and any
    /// sensor colliders) must be excluded via `exclude`.
    fn raycast(
        world: &World,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        exclude: Entity,
    ) -> Option<RayHit>;

    /// Current linear velocity of an entity.
    fn velocity(world: &World, entity: Entity) -> Vec3;

    /// Overwrite the linear velocity of an entity.
    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3);

    /// Apply an impulse expressed as a velocity change.
    ///
    /// Backends with mass-based impulses scale by the body mass so a
    /// given vector produces the same velocity delta on every character.
    fn apply_impulse(world: &mut World, entity: Entity, impulse: Vec3);

    /// Switch the body between dynamic and kinematic simulation.
    ///
    /// Kinematic here means the engine stops applying gravity and forces;
    /// the controller moves the body by writing its transform. Used for
    /// fly mode (slope pinning, ledge hang, climbing).
    fn set_kinematic(world: &mut World, entity: Entity, kinematic: bool);

    /// Whether the body is currently kinematic.
    fn is_kinematic(world: &World, entity: Entity) -> bool;

    /// Gravity vector of the simulation.
    fn gravity(world: &World) -> Vec3;

    /// Fixed timestep the backend advances with.
    fn fixed_timestep(world: &World) -> f32;

    /// Whether a character-sized volume at `position` is free of
    /// obstructions. Used before teleporting the character on ledge
    /// pull-ups and climb exits.
    fn check_future_space(world: &World, entity: Entity, position: Vec3) -> bool;

    /// Distance from the character origin down to the collider bottom.
    /// Ground snapping places the origin this far above the hit point.
    fn collider_bottom_offset(_world: &World, _entity: Entity) -> f32 {
        0.0
    }
}

/// Radius of the clearance probe used by [`PhysicsBackend::check_future_space`].
pub(crate) const CLEARANCE_RADIUS: f32 = 0.4;

/// Height above the probed position at which the clearance probe is centered,
/// roughly chest height for a human-sized character.
pub(crate) const CLEARANCE_HEIGHT: f32 = 0.9;

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}

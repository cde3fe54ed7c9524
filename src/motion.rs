//! Position and orientation integration.
//!
//! Everything that writes the character's transform lives here: the step
//! probe with ground snap and slip guard, heading tweens, jump impulse
//! construction and moving-platform riding. The fixed-step systems
//! orchestrate these pieces; the functions themselves only read the world
//! (for ray casts and hierarchy walks) and mutate local copies, so the
//! callers decide when the results land.

use std::f32::consts::{PI, TAU};

use bevy::prelude::*;

use crate::backend::PhysicsBackend;
use crate::collision::RayHit;
use crate::config::{CharacterController, ControllerConfig};

/// Result of one downward step probe.
#[derive(Debug, Clone, Default)]
pub(crate) struct StepOutcome {
    /// Ground within step range.
    pub grounded: bool,
    /// The foot contact, when grounded.
    pub hit: Option<RayHit>,
    /// Moving-platform root under the character, when the contact chain
    /// carries the platform name prefix.
    pub platform: Option<Entity>,
    /// Fly-mode change the caller has to apply: `Some(true)` engages the
    /// slip pin, `Some(false)` releases it.
    pub fly_pin: Option<bool>,
}

/// Downward ground probe with snap and slip guard.
///
/// Casts from `height / 1.8` above the character origin straight down,
/// with `step_height` of reach below the feet. On a hit the character's
/// vertical position snaps onto the contact (plus the collider bottom
/// offset), unless `prevent_slip` is set and the surface tilts past
/// `slip_free_angle_deg`: then the pose is left alone and the slip pin
/// engages instead so the character cannot slide off. The probe is
/// absolute, so repeated calls against an unchanged world agree.
pub(crate) fn step<B: PhysicsBackend>(
    world: &World,
    entity: Entity,
    transform: &mut Transform,
    controller: &CharacterController,
    config: &ControllerConfig,
    prevent_slip: bool,
) -> StepOutcome {
    let above = config.height / 1.8;
    let origin = transform.translation + Vec3::Y * above;
    let reach = above + config.step_height;

    let Some(hit) = B::raycast(world, origin, Vec3::NEG_Y, reach, entity) else {
        // Lost ground: any slip pin has to let go so gravity applies.
        return StepOutcome {
            grounded: false,
            fly_pin: Some(false),
            ..Default::default()
        };
    };

    let platform = find_platform_root(world, hit.entity, config.platform_name_prefix);

    if prevent_slip && exceeds_slip_angle(&hit, config.slip_free_angle_deg) {
        // Too steep to trust the physics influence: freeze instead of snap.
        return StepOutcome {
            grounded: true,
            hit: Some(hit),
            platform,
            fly_pin: Some(true),
        };
    }

    transform.translation.y = hit.point.y + controller.collider_bottom_offset;
    StepOutcome {
        grounded: true,
        hit: Some(hit),
        platform,
        fly_pin: Some(false),
    }
}

/// Whether the surface under `hit` tilts past the slip-free limit on
/// either horizontal axis.
pub(crate) fn exceeds_slip_angle(hit: &RayHit, limit_deg: f32) -> bool {
    let limit = limit_deg.to_radians();
    let tilt = hit.surface_tilt();
    tilt.x > limit || tilt.y > limit
}

/// Walk the contact's ancestor chain and return the highest entity whose
/// [`Name`] starts with the moving-platform prefix.
pub(crate) fn find_platform_root(world: &World, contact: Entity, prefix: &str) -> Option<Entity> {
    let mut found = None;
    let mut current = Some(contact);
    while let Some(entity) = current {
        if let Some(name) = world.get::<Name>(entity) {
            if name.as_str().starts_with(prefix) {
                found = Some(entity);
            }
        }
        current = world.get::<ChildOf>(entity).map(|child_of| child_of.parent());
    }
    found
}

/// World yaw that faces the character along the intent direction.
///
/// Intent axes: `x` right, `z` forward with forward = -1, so an intent of
/// `(0, 0, -1)` keeps the current camera-forward heading.
pub(crate) fn heading_from_direction(direction: Vec3) -> f32 {
    (-direction.x).atan2(-direction.z)
}

/// Wrap an angle difference into `(-PI, PI]`.
pub(crate) fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

/// Turn the character toward `target_yaw` along the shortest arc,
/// covering the tween in `tween_time` seconds. Pitch and roll are forced
/// back to zero; the character always stands upright.
pub(crate) fn turn_toward(transform: &mut Transform, target_yaw: f32, tween_time: f32, dt: f32) {
    let current = transform.rotation.to_euler(EulerRot::YXZ).0;
    let fraction = if tween_time > 0.0 {
        (dt / tween_time).min(1.0)
    } else {
        1.0
    };
    let delta = wrap_angle(target_yaw - current);
    transform.rotation = Quat::from_rotation_y(current + delta * fraction);
}

/// Build the world-space velocity change for one jump tick.
///
/// The impulse is assembled in character-local axes (sideways kick,
/// upward strength and forward drive), scaled by the per-tick `dt` and
/// the controller's jump strength, then rotated into world space. The
/// platform velocity rides along unscaled by strength, so a moving
/// platform hands its momentum over exactly once per tick.
pub(crate) fn jump_impulse(
    transform: &Transform,
    controller: &CharacterController,
    config: &ControllerConfig,
    forward_speed: f32,
    platform_velocity: Vec3,
    dt: f32,
) -> Vec3 {
    let direction = controller.jump_direction;
    let local = Vec3::new(
        direction.x,
        config.phys_jump_strength + direction.y,
        -(forward_speed * config.jump_forward_force_mult) + direction.z,
    ) * dt
        * controller.jump_strength;
    transform.rotation * local + platform_velocity * dt
}

/// Clamp a velocity to the per-axis jump maxima, preserving signs.
pub(crate) fn clamp_jump_velocity(velocity: Vec3, max: Vec3) -> Vec3 {
    Vec3::new(
        velocity.x.clamp(-max.x, max.x),
        velocity.y.clamp(-max.y, max.y),
        velocity.z.clamp(-max.z, max.z),
    )
}

/// Reposition the character on the circle around a rotating platform's
/// pivot and turn it by the same yaw delta. The character's height is
/// left alone; platforms only rotate about the vertical axis.
pub(crate) fn rotate_around_pivot(transform: &mut Transform, pivot: Vec3, yaw_delta: f32) {
    let rotation = Quat::from_rotation_y(yaw_delta);
    let mut offset = transform.translation - pivot;
    offset.y = 0.0;
    let rotated = rotation * offset;
    transform.translation.x = pivot.x + rotated.x;
    transform.translation.z = pivot.z + rotated.z;
    transform.rotation = rotation * transform.rotation;
}

/// Per-frame movement deltas of the platform a character rides.
///
/// The tracker stores the platform pose it saw last frame and hands out
/// the difference, so riders follow translation and yaw without the
/// platform knowing about them.
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct PlatformTracker {
    last_translation: Option<Vec3>,
    last_yaw: Option<f32>,
    /// World traveled by the platform since the previous fixed step. Read by
    /// jump initiation (as a carry velocity) and by the ride pass.
    pub(crate) moved: Vec3,
    /// Yaw turned by the platform since the previous fixed step (radians).
    pub(crate) turned: f32,
    /// Set when a plugin pinned the platform this frame; lets the
    /// attachment survive a single step miss.
    pub(crate) pinned: bool,
}

impl PlatformTracker {
    /// Measure the platform movement since the previous call. The first
    /// call after an attach reports no movement.
    pub(crate) fn delta(&mut self, platform: &GlobalTransform) -> (Vec3, f32) {
        let translation = platform.translation();
        let yaw = platform.rotation().to_euler(EulerRot::YXZ).0;
        let moved = self
            .last_translation
            .map(|last| translation - last)
            .unwrap_or(Vec3::ZERO);
        let turned = self.last_yaw.map(|last| wrap_angle(yaw - last)).unwrap_or(0.0);
        self.last_translation = Some(translation);
        self.last_yaw = Some(yaw);
        (moved, turned)
    }

    /// Measure once per frame and park the deltas for everyone downstream.
    pub(crate) fn measure(&mut self, platform: &GlobalTransform) {
        let (moved, turned) = self.delta(platform);
        self.moved = moved;
        self.turned = turned;
    }

    /// Forget the tracked pose. Called whenever the character leaves the
    /// platform.
    pub(crate) fn reset(&mut self) {
        self.last_translation = None;
        self.last_yaw = None;
        self.moved = Vec3::ZERO;
        self.turned = 0.0;
    }
}

//! Ability plugin chain.
//!
//! Parkour abilities (climbing, ledge grabbing, wall running, wall
//! collision avoidance) hang off the character as boxed plugins ordered by
//! an integer priority key, lowest first. Each fixed step the chain runs
//! three passes:
//!
//! 1. **action**: the ability logic; a `true` return consumes the frame
//!    and skips the remaining plugins,
//! 2. **stamina poll**: whether any plugin drains stamina this frame,
//! 3. **move restriction**: velocity overrides after the core speed
//!    calculation; a `true` return ends the walk.
//!
//! Plugins get a read-only view of the world plus the character's own
//! mutable scratch. World writes (teleports, fly-mode switches, yaw snaps)
//! are collected in [`PluginEffects`] and applied by the integrator after
//! the pass, in a fixed order.

use std::collections::BTreeMap;

use bevy::prelude::*;

use crate::collision::RayHit;
use crate::config::{CharacterController, ControllerConfig};
use crate::intent::InputIntent;
use crate::rays::{RayId, RaySensors};
use crate::stamina::Stamina;
use crate::state::{MotionState, StateMachineBuilder, TransitionTable};

/// Priority keys of the built-in plugins. Lower runs earlier and wins
/// the short-circuit.
pub mod priority {
    pub const CLIMB: i32 = 5;
    pub const LEDGE_GRAB: i32 = 10;
    pub const WALL_RUN: i32 = 20;
    pub const WALL_AVOIDANCE: i32 = 50;
}

/// Everything a plugin sees during a chain pass.
///
/// `world` is the live world, read-only; `controller` is the character's
/// scratch for this frame and may be freely written. Deferred world writes
/// go through `effects`.
pub struct PluginContext<'w> {
    pub entity: Entity,
    pub world: &'w World,
    pub controller: &'w mut CharacterController,
    pub config: &'w ControllerConfig,
    pub sensors: &'w RaySensors,
    pub intent: &'w InputIntent,
    pub stamina: &'w Stamina,
    pub table: &'w TransitionTable,
    /// Character transform at the start of the pass.
    pub transform: Transform,
    pub dt: f32,
    pub(crate) check_space: fn(&World, Entity, Vec3) -> bool,
    pub effects: &'w mut PluginEffects,
}

impl PluginContext<'_> {
    /// Committed motion state of this frame.
    pub fn state(&self) -> MotionState {
        self.controller.state
    }

    /// Cached hit of a registered ray.
    pub fn hit(&self, id: RayId) -> Option<&RayHit> {
        self.sensors.query(id)
    }

    /// Current world yaw of the character, radians.
    pub fn yaw(&self) -> f32 {
        self.transform.rotation.to_euler(EulerRot::YXZ).0
    }

    /// Whether a character-sized volume at `position` is free of
    /// obstructions. A backend failure reads as blocked, so maneuvers
    /// decline instead of teleporting into geometry.
    pub fn has_future_space(&self, position: Vec3) -> bool {
        (self.check_space)(self.world, self.entity, position)
    }
}

/// Deferred world writes collected during a chain pass.
///
/// The integrator applies them right after the pass: velocity zeroing,
/// then fly mode, then yaw snap, then the position write (with ray-cache
/// clear when requested), then the platform pin.
#[derive(Debug, Clone, Default)]
pub struct PluginEffects {
    /// Zero the body's velocity, the grounded half of the landing reset.
    pub zero_velocity: bool,
    /// World translation to place the character at.
    pub position: Option<Vec3>,
    /// Drop every cached ray hit. Set together with `position` on real
    /// teleports so the next frame cannot read a pre-teleport contact.
    pub clear_rays: bool,
    /// Switch physics influence off (`true`) or back on (`false`).
    pub fly_mode: Option<bool>,
    /// Snap to this world yaw (radians) immediately, skipping the
    /// rotation tween.
    pub yaw_snap: Option<f32>,
    /// Keep riding this platform even if the foot ray misses this frame.
    pub platform_pin: Option<Entity>,
}

impl PluginEffects {
    pub fn is_empty(&self) -> bool {
        !self.zero_velocity
            && self.position.is_none()
            && !self.clear_rays
            && self.fly_mode.is_none()
            && self.yaw_snap.is_none()
            && self.platform_pin.is_none()
    }

    /// Take the collected effects, leaving an empty set behind.
    pub(crate) fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// One parkour ability.
///
/// Implementations keep their own per-character working state; the chain
/// component owns them, so each character carries its own instances.
pub trait ControlPlugin: Send + Sync {
    /// Short identifier for diagnostics.
    fn name(&self) -> &'static str;

    /// Whether the plugin participates. Checked before every pass.
    fn enabled(&self, config: &ControllerConfig) -> bool {
        let _ = config;
        true
    }

    /// Extend the transition table with the plugin's states.
    fn register_states(&self, builder: StateMachineBuilder) -> StateMachineBuilder {
        builder
    }

    /// Register the probe rays the plugin reads.
    fn setup_rays(&self, sensors: &mut RaySensors, config: &ControllerConfig) {
        let _ = (sensors, config);
    }

    /// The per-frame ability pass. Returning `true` consumes the frame:
    /// lower-priority plugins are skipped and the core locomotion staging
    /// stands as the plugin left it.
    fn action(&mut self, ctx: &mut PluginContext) -> bool;

    /// Whether the plugin drains stamina this frame.
    fn use_stamina(&self, ctx: &PluginContext) -> bool {
        let _ = ctx;
        false
    }

    /// Movement override pass, run after the core speed calculation even
    /// when the action pass short-circuited. Returning `true` ends the
    /// walk.
    fn move_restriction(&mut self, ctx: &mut PluginContext) -> bool {
        let _ = ctx;
        false
    }
}

/// Ordered plugin set carried by a character.
#[derive(Component, Default)]
pub struct ControlChain {
    plugins: BTreeMap<i32, Vec<Box<dyn ControlPlugin>>>,
}

impl ControlChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard parkour chain: climb, ledge grab, wall run, wall
    /// collision avoidance.
    pub fn standard() -> Self {
        let mut chain = Self::new();
        chain.add(priority::CLIMB, crate::climb::Climb::default());
        chain.add(priority::LEDGE_GRAB, crate::ledge_grab::LedgeGrab::default());
        chain.add(priority::WALL_RUN, crate::wall_run::WallRun::default());
        chain.add(
            priority::WALL_AVOIDANCE,
            crate::wall_avoidance::WallCollisionAvoidance::default(),
        );
        chain
    }

    /// Add a plugin at `priority`. Same-priority plugins keep their
    /// insertion order.
    pub fn add(&mut self, priority: i32, plugin: impl ControlPlugin + 'static) {
        self.plugins.entry(priority).or_default().push(Box::new(plugin));
    }

    pub fn len(&self) -> usize {
        self.plugins.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run every plugin's state registration against `builder`, in
    /// priority order. Registration ignores the enabled gate so a plugin
    /// toggled on later finds its states in place.
    pub fn register_states(&self, mut builder: StateMachineBuilder) -> StateMachineBuilder {
        for plugin in self.plugins.values().flatten() {
            builder = plugin.register_states(builder);
        }
        builder
    }

    /// Register the probe rays of every enabled plugin.
    pub fn setup_rays(&self, sensors: &mut RaySensors, config: &ControllerConfig) {
        for plugin in self.plugins.values().flatten() {
            if plugin.enabled(config) {
                plugin.setup_rays(sensors, config);
            }
        }
    }

    /// The action pass. Returns `true` when a plugin consumed the frame.
    pub fn run_actions(&mut self, ctx: &mut PluginContext) -> bool {
        for plugins in self.plugins.values_mut() {
            for plugin in plugins.iter_mut() {
                if !plugin.enabled(ctx.config) {
                    continue;
                }
                if plugin.action(ctx) {
                    return true;
                }
            }
        }
        false
    }

    /// Whether any enabled plugin drains stamina this frame.
    pub fn wants_stamina(&self, ctx: &PluginContext) -> bool {
        self.plugins
            .values()
            .flatten()
            .any(|plugin| plugin.enabled(ctx.config) && plugin.use_stamina(ctx))
    }

    /// The move-restriction pass. Walks every enabled plugin in priority
    /// order; a `true` return ends the walk.
    pub fn run_move_restrictions(&mut self, ctx: &mut PluginContext) -> bool {
        for plugins in self.plugins.values_mut() {
            for plugin in plugins.iter_mut() {
                if !plugin.enabled(ctx.config) {
                    continue;
                }
                if plugin.move_restriction(ctx) {
                    return true;
                }
            }
        }
        false
    }
}

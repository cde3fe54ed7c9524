//! Wall climbing.
//!
//! Surfaces opt in through the [`Climbable`] tag, which also fixes the
//! axes the character may move along and whether the surface has discrete
//! rungs. A feet-level forward probe finds the surface; the contextual
//! action starts the climb, and from then on it is sticky: it continues
//! without the action until the surface runs out, the character jumps
//! off, or climbs out over the top edge into standing room.

use bevy::prelude::*;

use crate::chain::{ControlPlugin, PluginContext};
use crate::collision::RayHit;
use crate::config::ControllerConfig;
use crate::motion::heading_from_direction;
use crate::rays::{RayId, RaySensors, RaySpec};
use crate::state::{MotionState, StateMachineBuilder};

/// Which axes a climbable surface lets the character move along.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ClimbDirection {
    /// Up and down only, the ladder case.
    #[default]
    Vertical,
    /// Left and right only, the rail case.
    Horizontal,
    /// Free movement on both axes.
    Both,
}

impl ClimbDirection {
    fn vertical(self) -> bool {
        matches!(self, Self::Vertical | Self::Both)
    }

    fn horizontal(self) -> bool {
        matches!(self, Self::Horizontal | Self::Both)
    }
}

/// Marks a surface as climbable. The tag may sit on the collider entity
/// itself or on any ancestor, so one tag can cover a whole prop.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Climbable {
    pub direction: ClimbDirection,
    /// Quantize the hanging height to whole `climb_step_height` rungs.
    pub stepped: bool,
}

/// Nearest climbable tag in `contact`'s ancestor chain, starting at the
/// contact itself.
fn find_climbable(world: &World, contact: Entity) -> Option<(Entity, Climbable)> {
    let mut current = Some(contact);
    while let Some(entity) = current {
        if let Some(tag) = world.get::<Climbable>(entity) {
            return Some((entity, *tag));
        }
        current = world.get::<ChildOf>(entity).map(|child_of| child_of.parent());
    }
    None
}

/// Climb state matching a set of direction flags.
fn climb_move_state(left: bool, right: bool, up: bool, down: bool) -> MotionState {
    use MotionState::*;
    match (left, right, up, down) {
        (true, _, true, _) => ClimbUpLeft,
        (true, _, _, true) => ClimbDownLeft,
        (_, true, true, _) => ClimbUpRight,
        (_, true, _, true) => ClimbDownRight,
        (true, ..) => ClimbLeft,
        (_, true, ..) => ClimbRight,
        (_, _, true, _) => ClimbUp,
        (_, _, _, true) => ClimbDown,
        _ => Climb,
    }
}

/// The climbing control plugin.
#[derive(Default)]
pub struct Climb {
    /// A climb is active; doubles as the action-pass return value, so a
    /// climb consumes the frame.
    do_climb: bool,
    left: bool,
    right: bool,
    up: bool,
    down: bool,
}

impl Climb {
    /// Snap the heading square into the surface. Returns the yaw the
    /// character will have once the effects apply.
    fn face_wall(&self, ctx: &mut PluginContext, contact: &RayHit) -> f32 {
        let target = heading_from_direction(-contact.normal);
        if (target - ctx.yaw()).abs() > f32::EPSILON {
            ctx.effects.yaw_snap = Some(target);
        }
        target
    }

    /// Hanging spot against the surface: keep the lateral and vertical
    /// offsets from the contact, force the forward stand-off to just past
    /// the capsule radius.
    fn attach_position(&self, ctx: &PluginContext, contact: &RayHit, yaw: f32) -> Vec3 {
        let backward = Vec3::new(yaw.sin(), 0.0, yaw.cos());
        let to_character = ctx.transform.translation - contact.point;
        let keep = to_character - backward * to_character.dot(backward);
        contact.point + keep + backward * (ctx.config.radius + 0.05)
    }

    /// Quantized hanging height for stepped surfaces: whole rungs of
    /// `climb_step_height` above the surface root, starting one rung up.
    fn snap_rung(&self, ctx: &PluginContext, carrier: Entity, height: f32) -> f32 {
        let step = ctx.config.climb_step_height;
        let base = ctx
            .world
            .get::<GlobalTransform>(carrier)
            .map(|transform| transform.translation().y)
            .unwrap_or(0.0);
        let rung = ((height - base) / step).round().max(1.0);
        base + rung * step
    }

    /// Drop out of the climb. Falls only when a climb state is actually
    /// active, so a plain decline stays silent.
    fn stop_climb(&mut self, ctx: &mut PluginContext) {
        self.do_climb = false;
        self.left = false;
        self.right = false;
        self.up = false;
        self.down = false;
        if ctx.state().is_climb_state() {
            ctx.controller.request_state(MotionState::Fall);
        }
    }

    /// Whether the probe `id` hit something carrying a climbable tag.
    fn probe_climbable(&self, ctx: &PluginContext, id: RayId) -> bool {
        ctx.hit(id)
            .is_some_and(|hit| find_climbable(ctx.world, hit.entity).is_some())
    }
}

impl ControlPlugin for Climb {
    fn name(&self) -> &'static str {
        "climb"
    }

    fn register_states(&self, builder: StateMachineBuilder) -> StateMachineBuilder {
        use MotionState::*;
        let mut builder = builder
            .register(Climb)
            .to(&[Jump, Fall])
            .to_any()
            .flying()
            .from_any_state()
            .prevent_rotation()
            .register(ClimbExitUp)
            .to_any()
            .flying()
            .from_any_state()
            .prevent_rotation()
            .finish();
        for state in [
            ClimbUp,
            ClimbDown,
            ClimbLeft,
            ClimbRight,
            ClimbUpLeft,
            ClimbUpRight,
            ClimbDownLeft,
            ClimbDownRight,
        ] {
            builder = builder
                .register(state)
                .to(&[Climb, Jump, Fall])
                .to_any()
                .flying()
                .from_any_state()
                .prevent_rotation()
                .finish();
        }
        builder
    }

    fn setup_rays(&self, sensors: &mut RaySensors, config: &ControllerConfig) {
        let forward = -config.climb_forward_check_distance;
        sensors.register(
            RayId::CLIMB_CENTER,
            RaySpec::new(Vec3::ZERO, Vec3::new(0.0, 0.0, forward)),
        );
        sensors.register(
            RayId::CLIMB_TOP,
            RaySpec::new(
                Vec3::new(0.0, config.height, 0.0),
                Vec3::new(0.0, config.height, forward),
            ),
        );
        let waist = config.height / 2.0;
        sensors.register(
            RayId::CLIMB_LEFT,
            RaySpec::new(
                Vec3::new(-config.radius, waist, 0.0),
                Vec3::new(-config.radius, waist, forward),
            ),
        );
        sensors.register(
            RayId::CLIMB_RIGHT,
            RaySpec::new(
                Vec3::new(config.radius, waist, 0.0),
                Vec3::new(config.radius, waist, forward),
            ),
        );
        // Vertical drop probe just past the top edge: where the feet
        // would land after climbing out.
        let exit = -config.climb_exit_up_distance();
        sensors.register(
            RayId::CLIMB_EXIT_UP,
            RaySpec::new(
                Vec3::new(0.0, config.climb_top_check_height(), exit),
                Vec3::new(0.0, config.climb_bottom_check_height(), exit),
            ),
        );
    }

    fn action(&mut self, ctx: &mut PluginContext) -> bool {
        let state = ctx.state();

        // Hold the frame while the exit animation plays; the animator
        // settles the state back to Idle, so its staged request must
        // survive this branch.
        if state == MotionState::ClimbExitUp {
            self.left = false;
            self.right = false;
            self.up = false;
            self.down = false;
            return true;
        }

        let Some(contact) = ctx.hit(RayId::CLIMB_CENTER).copied() else {
            self.stop_climb(ctx);
            return false;
        };
        let Some((carrier, tag)) = find_climbable(ctx.world, contact.entity) else {
            self.stop_climb(ctx);
            return false;
        };

        // Starting needs the contextual action; continuing does not.
        if !self.do_climb && !ctx.intent.intel_action {
            return false;
        }

        if ctx.controller.jump_requested {
            self.stop_climb(ctx);
            ctx.effects.fly_mode = Some(false);
            return false;
        }

        let entering = !state.is_climb_state();
        self.do_climb = true;

        let yaw = self.face_wall(ctx, &contact);
        let mut position = self.attach_position(ctx, &contact, yaw);
        if tag.stepped && (entering || state == MotionState::Climb) {
            position.y = self.snap_rung(ctx, carrier, position.y);
        }
        ctx.effects.position = Some(position);
        ctx.controller.target_heading = None;
        ctx.effects.fly_mode = Some(true);

        self.left = false;
        self.right = false;
        self.up = false;
        self.down = false;

        if ctx.controller.has_move_input() {
            ctx.controller.clear_request();
            let direction = ctx.controller.move_direction;
            let mut exit_up = false;

            if tag.direction.horizontal() {
                if direction.x < -0.3 {
                    self.left = self.probe_climbable(ctx, RayId::CLIMB_LEFT);
                }
                if direction.x > 0.3 {
                    self.right = self.probe_climbable(ctx, RayId::CLIMB_RIGHT);
                }
            }
            if tag.direction.vertical() {
                if direction.z < -0.3 {
                    match ctx.hit(RayId::CLIMB_TOP).copied() {
                        Some(top) => {
                            self.up = find_climbable(ctx.world, top.entity).is_some();
                        }
                        // Nothing left above; try to climb out over the
                        // top edge if the feet would find ground and the
                        // body room to stand.
                        None => {
                            if let Some(exit) = ctx.hit(RayId::CLIMB_EXIT_UP).copied() {
                                if ctx.has_future_space(exit.point) {
                                    exit_up = true;
                                    ctx.effects.position = Some(exit.point + Vec3::Y * 0.05);
                                    ctx.effects.clear_rays = true;
                                }
                            }
                        }
                    }
                }
                if direction.z > 0.3 {
                    // The low probe shares the center geometry, which
                    // already found the surface.
                    self.down = true;
                }
            }

            let target = if exit_up {
                MotionState::ClimbExitUp
            } else {
                climb_move_state(self.left, self.right, self.up, self.down)
            };
            ctx.controller.request_state(target);
        } else if state != MotionState::Climb {
            ctx.controller.request_state(MotionState::Climb);
        } else {
            ctx.controller.clear_request();
        }

        true
    }

    fn use_stamina(&self, ctx: &PluginContext) -> bool {
        self.do_climb && ctx.intent.sprint && ctx.stamina.can_sprint()
    }

    fn move_restriction(&mut self, ctx: &mut PluginContext) -> bool {
        if ctx.state().is_climb_state() {
            ctx.controller.update_speed = Vec3::ZERO;
        }
        if self.do_climb {
            let sprint = if ctx.intent.sprint && ctx.stamina.can_sprint() {
                ctx.config.climb_sprint_multiplier
            } else {
                1.0
            };
            let sideward = ctx.config.climb_sideward_move_speed * sprint * ctx.dt;
            if self.left {
                ctx.controller.update_speed.x = -sideward;
            } else if self.right {
                ctx.controller.update_speed.x = sideward;
            }
            let vertical = ctx.config.climb_vertical_move_speed * sprint * ctx.dt;
            if self.up {
                ctx.controller.update_speed.y = vertical;
            } else if self.down {
                ctx.controller.update_speed.y = -vertical;
            }
        }
        self.do_climb
    }
}

//! Wall running.
//!
//! Three probes watch for walls ahead and to either side at half body
//! height. With wall contact, the contextual-action input held and an
//! eligible state, the plugin turns the character to face up or along the
//! wall, keeps it at a fixed lateral stand-off, drives it upward during
//! the move-restriction pass and arms the jump parameters for a wall
//! kick-off. Contact loss or releasing the input drops the character into
//! `Fall`.

use bevy::prelude::*;

use crate::chain::{ControlPlugin, PluginContext};
use crate::collision::RayHit;
use crate::config::ControllerConfig;
use crate::motion::heading_from_direction;
use crate::rays::{RayId, RaySensors, RaySpec};
use crate::state::{MotionState, StateMachineBuilder};

/// Lateral gap kept between the character center and the wall.
const WALL_STAND_OFF: f32 = 0.5;

/// Which side of the character the active wall is on. Mirrored into the
/// controller hub so the animator can pick the matching lean clip.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WallSide {
    #[default]
    Front,
    Left,
    Right,
}

/// The wall-run control plugin.
#[derive(Default)]
pub struct WallRun {
    /// Armed by a successful action pass, consumed by the following
    /// move-restriction pass.
    do_wall_run: bool,
}

/// A wall contact that passed the steepness gate, with everything the
/// engagement needs derived from it.
struct WallContact {
    side: WallSide,
    /// World yaw to face: into the wall for front contacts, along it for
    /// side contacts.
    target_yaw: f32,
    /// Jump kick-off direction in character-local space.
    jump_direction: Vec3,
    /// Lateral snap target keeping the stand-off gap, world space.
    snap_position: Option<Vec3>,
}

impl WallRun {
    /// States a wall run may be ignited from.
    fn eligible(state: MotionState) -> bool {
        state.is_wall_run_state()
            || state.is_run_state()
            || state.is_sprint_state()
            || state.is_jump_or_fall()
    }

    /// Whether the surface tilts steeply enough to run on: its normal has
    /// to deviate from vertical by at least the configured wall angle.
    fn runnable(hit: &RayHit, config: &ControllerConfig) -> bool {
        hit.wall_angle() >= config.min_wall_angle_deg.to_radians()
    }

    /// Lateral stand-off snap: the character ends up `radius +
    /// WALL_STAND_OFF` away from the contact point, measured horizontally.
    fn snap_to_wall(ctx: &PluginContext, hit: &RayHit, side: WallSide) -> Option<Vec3> {
        let mut to_wall = hit.point - ctx.transform.translation;
        to_wall.y = 0.0;
        let gap = to_wall.length() - ctx.config.radius - WALL_STAND_OFF;
        let local_x = match side {
            WallSide::Left => -gap,
            WallSide::Right => gap,
            WallSide::Front => return None,
        };
        Some(ctx.transform.transform_point(Vec3::new(local_x, 0.0, 0.0)))
    }

    /// Classify the wall contact with front-first priority and work out
    /// heading, kick-off direction and snap target. Contacts failing the
    /// steepness gate yield `None`.
    fn pick_wall(&self, ctx: &PluginContext) -> Option<WallContact> {
        let config = ctx.config;
        let moving_left = ctx.controller.move_direction.x < 0.0;
        let moving_right = ctx.controller.move_direction.x > 0.0;

        if let Some(hit) = ctx.hit(RayId::WALL_RUN_FORWARD).copied() {
            if !Self::runnable(&hit, config) {
                return None;
            }
            return Some(WallContact {
                side: WallSide::Front,
                target_yaw: heading_from_direction(-hit.normal),
                jump_direction: config.wall_run_up_jump_direction,
                snap_position: None,
            });
        }
        if let Some(hit) = ctx.hit(RayId::WALL_RUN_LEFT).copied() {
            if !Self::runnable(&hit, config) {
                return None;
            }
            // Kick away from the wall only when the player is steering
            // away; otherwise the jump carries momentum forward along it.
            let jump_direction = if moving_right {
                config.wall_run_left_jump_direction
            } else {
                config.wall_run_forward_jump_direction
            };
            return Some(WallContact {
                side: WallSide::Left,
                target_yaw: heading_from_direction(Vec3::Y.cross(hit.normal)),
                jump_direction,
                snap_position: Self::snap_to_wall(ctx, &hit, WallSide::Left),
            });
        }
        if let Some(hit) = ctx.hit(RayId::WALL_RUN_RIGHT).copied() {
            if !Self::runnable(&hit, config) {
                return None;
            }
            let jump_direction = if moving_left {
                config.wall_run_right_jump_direction
            } else {
                config.wall_run_forward_jump_direction
            };
            return Some(WallContact {
                side: WallSide::Right,
                target_yaw: heading_from_direction(hit.normal.cross(Vec3::Y)),
                jump_direction,
                snap_position: Self::snap_to_wall(ctx, &hit, WallSide::Right),
            });
        }
        None
    }

    fn engage(&mut self, ctx: &mut PluginContext, contact: WallContact) {
        let state = ctx.state();
        let entering = !state.is_wall_run_state();

        if entering {
            // Jumping off the wall must work immediately, so the jump
            // bookkeeping starts from a clean slate.
            ctx.controller.reset_after_jump(ctx.config);
            ctx.effects.zero_velocity |= ctx.table.is_on_ground_state(state);
        }

        ctx.controller.wall_run_side = contact.side;
        // The per-tick airborne reset restores the plain jump parameters.
        ctx.controller.jump_direction = contact.jump_direction;
        ctx.controller.jump_strength = ctx.config.wall_run_off_jump_strength;

        if let Some(position) = contact.snap_position {
            ctx.effects.position = Some(position);
        }

        if (contact.target_yaw - ctx.yaw()).abs() > f32::EPSILON {
            ctx.effects.yaw_snap = Some(contact.target_yaw);
        }
        // The wall owns the heading now; drop any staged movement turn.
        ctx.controller.target_heading = None;

        self.do_wall_run = true;
        ctx.controller.pre_jump_state = MotionState::Run;

        if entering {
            let target = if state.is_run_state() {
                MotionState::RunToWallRun
            } else if state.is_sprint_state() {
                MotionState::SprintToWallRun
            } else {
                MotionState::WallRun
            };
            ctx.controller.request_state(target);
            ctx.controller.pre_jump_state = target;
        } else {
            // Already wall running, nothing to transition to.
            ctx.controller.clear_request();
        }
    }
}

impl ControlPlugin for WallRun {
    fn name(&self) -> &'static str {
        "wall_run"
    }

    fn enabled(&self, config: &ControllerConfig) -> bool {
        config.wall_run_enabled
    }

    fn register_states(&self, builder: StateMachineBuilder) -> StateMachineBuilder {
        use MotionState::*;
        let sources = [
            WallRun, RunToWallRun, SprintToWallRun,
            Run, RunToIdle, RunToSprint, RunToWalk, IdleToRun, WalkToRun, SprintToRun,
            Sprint, SprintToIdle, IdleToSprint,
            Jump, Fall,
        ];
        builder
            .register(WallRun)
            .to(&[Idle, Walk, Run, Sprint, Jump, Land, Fall, RunToWallRun, SprintToWallRun])
            .to_any()
            .flying()
            .entered_from(&sources)
            .register(RunToWallRun)
            .to(&[Idle, Run, Sprint, Jump, Fall, WallRun, SprintToWallRun])
            .to_any()
            .on_ground()
            .flying()
            .entered_from(&sources)
            .register(SprintToWallRun)
            .to(&[Idle, Run, Sprint, Jump, Fall, WallRun, RunToWallRun])
            .to_any()
            .on_ground()
            .flying()
            .entered_from(&sources)
            .finish()
    }

    fn setup_rays(&self, sensors: &mut RaySensors, config: &ControllerConfig) {
        let waist = Vec3::new(0.0, config.height / 2.0, 0.0);
        sensors.register(
            RayId::WALL_RUN_FORWARD,
            RaySpec::new(
                waist,
                waist + Vec3::new(0.0, 0.0, -config.wall_run_forward_check_distance),
            ),
        );
        // The side probes tolerate a frame of staleness, so they share a
        // round-robin slot.
        sensors.register(
            RayId::WALL_RUN_LEFT,
            RaySpec::cycled(
                waist,
                waist + Vec3::new(-config.wall_run_sideward_check_distance, 0.0, 0.0),
            ),
        );
        sensors.register(
            RayId::WALL_RUN_RIGHT,
            RaySpec::cycled(
                waist,
                waist + Vec3::new(config.wall_run_sideward_check_distance, 0.0, 0.0),
            ),
        );
    }

    fn action(&mut self, ctx: &mut PluginContext) -> bool {
        let state = ctx.state();
        let contact = ctx.hit(RayId::WALL_RUN_FORWARD).is_some()
            || ctx.hit(RayId::WALL_RUN_LEFT).is_some()
            || ctx.hit(RayId::WALL_RUN_RIGHT).is_some();

        // A fall must last a while before it can turn back into a wall
        // run off the same wall; airtime that started elsewhere qualifies
        // right away.
        let fall_time_ok = if state.is_jump_or_fall() {
            ctx.controller.fall_time > ctx.config.wall_run_min_fall_time
                || !ctx.controller.pre_jump_state.is_wall_run_state()
        } else {
            true
        };

        if contact
            && ctx.intent.intel_action
            && Self::eligible(state)
            && fall_time_ok
            && !ctx.controller.jump_requested
        {
            if let Some(wall) = self.pick_wall(ctx) {
                self.engage(ctx, wall);
            }
        }

        if (!contact || !ctx.intent.intel_action) && state.is_wall_run_state() {
            ctx.controller.request_state(MotionState::Fall);
        }

        // Never consume the frame; avoidance further down still gets its
        // look at the forward probe.
        false
    }

    fn move_restriction(&mut self, ctx: &mut PluginContext) -> bool {
        if self.do_wall_run && !ctx.controller.was_jumping {
            let climb = (ctx.config.wall_run_speed * ctx.controller.current_accel)
                .min(ctx.config.wall_run_max_speed);
            ctx.controller.update_speed.y = climb * ctx.dt;
            // Forward drive gets a boost so runs along a wall keep their
            // momentum.
            ctx.controller.update_speed.z *= ctx.config.wall_run_forward_speed_multiplier;
            self.do_wall_run = false;
        }
        false
    }
}

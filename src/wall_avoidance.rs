//! Forward obstruction slowdown.
//!
//! A waist-height forward ray keeps the character from running face first
//! into walls: approaching one bleeds acceleration down to a creep, and
//! within arm's reach the drive is cut and the gait steps down toward
//! Idle. Purely advisory, the pass never consumes the frame.

use bevy::prelude::*;

use crate::chain::{ControlPlugin, PluginContext};
use crate::config::ControllerConfig;
use crate::rays::{RayId, RaySensors, RaySpec};
use crate::state::MotionState;

/// The forward obstruction plugin.
#[derive(Default)]
pub struct WallCollisionAvoidance;

impl ControlPlugin for WallCollisionAvoidance {
    fn name(&self) -> &'static str {
        "wall_collision_avoidance"
    }

    fn setup_rays(&self, sensors: &mut RaySensors, config: &ControllerConfig) {
        let waist = config.height / 2.0;
        sensors.register(
            RayId::FORWARD,
            RaySpec::new(
                Vec3::new(0.0, waist, 0.0),
                Vec3::new(0.0, waist, -config.forward_check_distance),
            ),
        );
    }

    fn action(&mut self, ctx: &mut PluginContext) -> bool {
        let state = ctx.state();
        let Some(wall) = ctx.hit(RayId::FORWARD).copied() else {
            return false;
        };
        if ctx.intent.intel_action || state == MotionState::Fall || ctx.controller.is_airborne {
            return false;
        }

        let mut to_wall = wall.point - ctx.transform.translation;
        to_wall.y = 0.0;
        let distance = to_wall.length();

        let mut step_down = true;
        if distance <= ctx.config.forward_stop_distance() {
            // Arm's reach: no forward drive at all.
            ctx.controller.current_accel = 0.0;
        } else if ctx.controller.has_move_input() {
            ctx.controller.current_accel -= ctx.config.decel_rate * ctx.dt;
            if ctx.controller.current_accel <= 0.0 {
                // Bled out; keep a creep so the walk into the stop range
                // still reads as movement.
                ctx.controller.current_accel = ctx.config.forward_min_speed_to_stop;
                if state == MotionState::Idle {
                    ctx.controller.request_state(MotionState::IdleToWalk);
                }
            }
            step_down = false;
        }

        let jump_pending = ctx.controller.jump_requested
            || ctx.controller.requested_state == Some(MotionState::Jump);
        if step_down && !jump_pending {
            match state {
                MotionState::Walk => ctx.controller.request_state(MotionState::WalkToIdle),
                MotionState::Run => ctx.controller.request_state(MotionState::RunToIdle),
                MotionState::Sprint => ctx.controller.request_state(MotionState::SprintToIdle),
                _ if ctx.table.can_transition(state, MotionState::Idle) => {
                    ctx.controller.request_state(MotionState::Idle)
                }
                _ => ctx.controller.clear_request(),
            }
        }
        false
    }
}

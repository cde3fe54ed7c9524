//! Ledge grabbing.
//!
//! A downward probe hanging in front of the character watches for a
//! walkable lip between waist height and a third above the head. With the
//! contextual action held, the character freezes in fly mode below the
//! lip, facing the wall. While hanging: side input shimmies along the
//! ledge as far as the side probes still find it, pushing away lets go
//! into `Fall`, and pushing toward the wall pulls the character up over
//! the edge when there is room to stand.

use bevy::prelude::*;

use crate::chain::{ControlPlugin, PluginContext};
use crate::collision::RayHit;
use crate::config::ControllerConfig;
use crate::motion::{find_platform_root, heading_from_direction};
use crate::rays::{RayId, RaySensors, RaySpec};
use crate::state::{MotionState, StateMachineBuilder};

/// The ledge-grab control plugin.
#[derive(Default)]
pub struct LedgeGrab {
    /// A grab is active or was initiated this frame; doubles as the
    /// action-pass return value, so a hang consumes the frame.
    do_ledge_grab: bool,
    /// The side probe confirmed room to shimmy this frame.
    can_move: bool,
    move_left: bool,
    move_right: bool,
}

impl LedgeGrab {
    /// Snap the heading square into the wall. Returns the yaw the
    /// character will have once the effects apply.
    fn face_wall(&self, ctx: &mut PluginContext) -> f32 {
        if let Some(front) = ctx.hit(RayId::LEDGE_FORWARD) {
            let target = heading_from_direction(-front.normal);
            if (target - ctx.yaw()).abs() > f32::EPSILON {
                ctx.effects.yaw_snap = Some(target);
            }
            return target;
        }
        ctx.yaw()
    }

    /// Pin the character into the hanging pose: at the wall contact (or
    /// under the lip for concave ledges the forward probe misses), pushed
    /// back to the probe stand-off, `ledge_attach_height` below the lip.
    fn attach(&self, ctx: &mut PluginContext, lip: &RayHit, yaw: f32) {
        let base = ctx
            .hit(RayId::LEDGE_FORWARD)
            .map(|front| front.point)
            .unwrap_or(lip.point);
        let backward = Vec3::new(yaw.sin(), 0.0, yaw.cos());
        let mut position = base + backward * ctx.config.ledge_forward_check_distance();
        position.y = lip.point.y - ctx.config.ledge_attach_height();
        ctx.effects.position = Some(position);
    }

    /// Ride the platform the grabbed ledge belongs to.
    fn pin_platform(&self, ctx: &mut PluginContext, lip: &RayHit) {
        if let Some(platform) =
            find_platform_root(ctx.world, lip.entity, ctx.config.platform_name_prefix)
        {
            ctx.effects.platform_pin = Some(platform);
        }
    }

    /// Standing spot on top of the grabbed ledge: on the lip, carried
    /// forward so the feet land on the surface rather than the edge.
    fn pull_up_target(&self, ctx: &PluginContext, lip: &RayHit) -> Vec3 {
        let yaw = ctx.yaw();
        let forward = Vec3::new(-yaw.sin(), 0.0, -yaw.cos());
        let mut target = lip.point + forward * ctx.config.ledge_pull_up_distance();
        target.y = lip.point.y;
        target
    }
}

impl ControlPlugin for LedgeGrab {
    fn name(&self) -> &'static str {
        "ledge_grab"
    }

    fn register_states(&self, builder: StateMachineBuilder) -> StateMachineBuilder {
        use MotionState::*;
        builder
            .register(LedgeGrab)
            .to(&[Fall, LedgeGrabUp, LedgeGrabLeft, LedgeGrabRight])
            .to_any()
            .flying()
            .from_any_state()
            .prevent_rotation()
            .register(LedgeGrabUp)
            .to_any()
            .flying()
            .prevent_rotation()
            .register(LedgeGrabLeft)
            .to(&[Fall, LedgeGrab, LedgeGrabUp, LedgeGrabRight])
            .to_any()
            .flying()
            .prevent_rotation()
            .register(LedgeGrabRight)
            .to(&[Fall, LedgeGrab, LedgeGrabUp, LedgeGrabLeft])
            .to_any()
            .flying()
            .prevent_rotation()
            .finish()
    }

    fn setup_rays(&self, sensors: &mut RaySensors, config: &ControllerConfig) {
        let head = Vec3::new(0.0, config.height, 0.0);
        sensors.register(
            RayId::LEDGE_FORWARD,
            RaySpec::new(
                head,
                head + Vec3::new(0.0, 0.0, -config.wall_run_forward_check_distance),
            ),
        );
        let top = config.ledge_top_check_height();
        let bottom = config.ledge_bottom_check_height();
        let forward = -config.ledge_forward_check_distance();
        sensors.register(
            RayId::LEDGE_DETECT,
            RaySpec::new(Vec3::new(0.0, top, forward), Vec3::new(0.0, bottom, forward)),
        );
        // The shimmy gates tolerate a frame of staleness, so the side
        // probes share a round-robin slot.
        sensors.register(
            RayId::LEDGE_DETECT_LEFT,
            RaySpec::cycled(
                Vec3::new(-config.radius, top, forward),
                Vec3::new(-config.radius, bottom, forward),
            ),
        );
        sensors.register(
            RayId::LEDGE_DETECT_RIGHT,
            RaySpec::cycled(
                Vec3::new(config.radius, top, forward),
                Vec3::new(config.radius, bottom, forward),
            ),
        );
    }

    fn action(&mut self, ctx: &mut PluginContext) -> bool {
        let state = ctx.state();
        let in_ledge_state = state.is_ledge_state();
        let lip = ctx.hit(RayId::LEDGE_DETECT).copied();

        self.do_ledge_grab = false;
        self.can_move = false;
        self.move_left = ctx.controller.move_direction.x < 0.0;
        self.move_right = ctx.controller.move_direction.x > 0.0;
        let let_go = ctx.controller.move_direction.z > 0.0;
        let pull_up = ctx.intent.pull_up || ctx.controller.move_direction.z < 0.0;

        if in_ledge_state && (let_go || pull_up) {
            self.do_ledge_grab = true;
            ctx.controller.target_heading = None;
            if let_go {
                ctx.effects.fly_mode = Some(false);
                ctx.controller.request_state(MotionState::Fall);
            } else if let Some(lip) = lip {
                let target = self.pull_up_target(ctx, &lip);
                if ctx.has_future_space(target) {
                    ctx.controller.request_state(MotionState::LedgeGrabUp);
                    ctx.effects.position = Some(target);
                    ctx.effects.clear_rays = true;
                } else {
                    // No room to stand up there; keep hanging.
                    ctx.controller.clear_request();
                }
            }
        } else if in_ledge_state && (self.move_left || self.move_right) {
            self.do_ledge_grab = true;
            ctx.controller.target_heading = None;
            let side = if self.move_left {
                ctx.hit(RayId::LEDGE_DETECT_LEFT)
            } else {
                ctx.hit(RayId::LEDGE_DETECT_RIGHT)
            }
            .copied();
            ctx.controller.clear_request();
            if side.is_some() {
                self.can_move = true;
                if self.move_left {
                    if state != MotionState::LedgeGrabLeft {
                        ctx.controller.request_state(MotionState::LedgeGrabLeft);
                    }
                } else if state != MotionState::LedgeGrabRight {
                    ctx.controller.request_state(MotionState::LedgeGrabRight);
                }
            } else {
                // The ledge ends here; recenter and stop the shimmy.
                if state != MotionState::LedgeGrab {
                    ctx.controller.request_state(MotionState::LedgeGrab);
                }
                self.move_left = false;
                self.move_right = false;
            }
            if let Some(lip) = lip {
                self.pin_platform(ctx, &lip);
                let yaw = self.face_wall(ctx);
                self.attach(ctx, &lip, yaw);
            }
        } else if in_ledge_state {
            if let Some(lip) = lip {
                self.do_ledge_grab = true;
                ctx.controller.target_heading = None;
                ctx.effects.fly_mode = Some(true);
                if state != MotionState::LedgeGrab {
                    ctx.controller.request_state(MotionState::LedgeGrab);
                } else {
                    ctx.controller.clear_request();
                }
                self.pin_platform(ctx, &lip);
                let yaw = self.face_wall(ctx);
                self.attach(ctx, &lip, yaw);
            }
        } else if let Some(lip) = lip {
            // Only the walkable top face of a ledge can be grabbed.
            if ctx.intent.intel_action && lip.normal.y > 0.0 {
                self.do_ledge_grab = true;
                ctx.controller.target_heading = None;
                ctx.effects.fly_mode = Some(true);
                self.pin_platform(ctx, &lip);
                let yaw = self.face_wall(ctx);
                self.attach(ctx, &lip, yaw);
                ctx.controller.request_state(MotionState::LedgeGrab);
            }
        }

        if self.do_ledge_grab {
            // While hanging the forward axis never drives movement.
            ctx.controller.move_direction.z = 0.0;
        }
        self.do_ledge_grab
    }

    fn move_restriction(&mut self, ctx: &mut PluginContext) -> bool {
        if ctx.state().is_ledge_state() {
            ctx.controller.update_speed = Vec3::ZERO;
        }
        if self.do_ledge_grab && self.can_move && ctx.state() != MotionState::LedgeGrabUp {
            let shimmy = ctx.config.ledge_sideward_move_speed * ctx.dt;
            if self.move_left {
                ctx.controller.update_speed.x = -shimmy;
            } else if self.move_right {
                ctx.controller.update_speed.x = shimmy;
            }
        }
        self.do_ledge_grab
    }
}

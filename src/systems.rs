//! Fixed-step control pipeline.
//!
//! One physics tick walks every character through the same stations, in
//! order: spawn completion, intent staging, airborne bookkeeping, the
//! acceleration ramp, locomotion staging, the ability chain, platform
//! measurement, jump initiation, movement integration, platform riding
//! and finally the state commit with marker sync. Requests staged along
//! the way all land in [`CharacterController::request_state`]; only the
//! commit at the end of the tick changes the actual state, so within a
//! tick the stations argue by overwriting each other's request and the
//! last writer wins.
//!
//! Systems that talk to the physics backend are generic over
//! [`PhysicsBackend`] and run exclusively, collecting entities first and
//! mutating after. Everything that only touches controller scratch runs
//! as a plain parallel system.

use bevy::prelude::*;

use crate::animator::AnimatorState;
use crate::backend::PhysicsBackend;
use crate::camera::ThirdPersonCamera;
use crate::chain::{ControlChain, PluginContext, PluginEffects};
use crate::config::{CharacterController, ControllerConfig};
use crate::intent::InputIntent;
use crate::motion::{
    clamp_jump_velocity, heading_from_direction, jump_impulse, rotate_around_pivot, step,
    turn_toward, wrap_angle, PlatformTracker,
};
use crate::rays::{RayId, RaySensors, RaySpec};
use crate::stamina::Stamina;
use crate::state::{
    Airborne, Grounded, MotionState, StateChanged, StateMachineBuilder, TransitionTable,
};

/// Components the exclusive passes take off the character and re-insert
/// when done, so plugin callbacks can borrow them next to the world.
type CharacterParts = (
    ControlChain,
    CharacterController,
    RaySensors,
    InputIntent,
    Stamina,
    TransitionTable,
);

/// Completes characters spawned with just a [`CharacterController`].
///
/// Builds the transition table from the core states plus every plugin
/// registration, registers the foot ray and the plugins' probe rays, and
/// fills in whatever runtime components are still missing. A
/// pre-installed [`ControlChain`] or [`RaySensors`] is honored, so apps
/// can swap the ability set or add probes before the first tick.
/// Characters that already carry a [`TransitionTable`] are left alone.
pub fn setup_characters<B: PhysicsBackend>(world: &mut World) {
    let mut pending = Vec::new();
    let mut query =
        world.query_filtered::<Entity, (With<CharacterController>, Without<TransitionTable>)>();
    pending.extend(query.iter(world));

    for entity in pending {
        let bottom = B::collider_bottom_offset(world, entity);

        let Ok(mut entry) = world.get_entity_mut(entity) else {
            continue;
        };
        let stored_config = entry.get::<ControllerConfig>().copied();
        let config = stored_config.unwrap_or_default();

        let chain = entry
            .take::<ControlChain>()
            .unwrap_or_else(ControlChain::standard);
        let mut sensors = entry.take::<RaySensors>().unwrap_or_default();

        // Foot ray matching the step probe: from above the hips down to
        // step reach below the feet. Kept cached for anything that wants
        // the last ground contact without casting again.
        sensors.register(
            RayId::FOOT,
            RaySpec::new(
                Vec3::Y * (config.height / 1.8),
                Vec3::NEG_Y * config.step_height,
            ),
        );
        chain.setup_rays(&mut sensors, &config);

        let table = chain
            .register_states(StateMachineBuilder::new().with_core_states())
            .build();

        if let Some(mut controller) = entry.get_mut::<CharacterController>() {
            controller.collider_bottom_offset = bottom;
        }

        entry.insert((chain, sensors, table));
        if stored_config.is_none() {
            entry.insert(config);
        }
        if entry.get::<InputIntent>().is_none() {
            entry.insert(InputIntent::default());
        }
        if entry.get::<Stamina>().is_none() {
            entry.insert(Stamina::new(config.max_stamina));
        }
        if entry.get::<AnimatorState>().is_none() {
            entry.insert(AnimatorState::default());
        }
        if entry.get::<PlatformTracker>().is_none() {
            entry.insert(PlatformTracker::default());
        }
        if entry.get::<Transform>().is_none() {
            entry.insert(Transform::default());
        }
    }
}

/// Turns the merged input into this tick's movement scratch.
///
/// Resets the per-tick controller fields, mirrors the jump button and
/// derives the movement direction plus the target heading. The heading is
/// camera-relative: stick-forward means away from the camera that follows
/// this character. First-person characters and an active center-camera
/// request keep their heading; the look systems own it there.
pub fn consume_intents(
    mut characters: Query<(
        Entity,
        &mut CharacterController,
        &ControllerConfig,
        &InputIntent,
        &TransitionTable,
    )>,
    cameras: Query<(&ThirdPersonCamera, &Transform)>,
) {
    for (entity, mut controller, config, intent, table) in characters.iter_mut() {
        controller.reset_frame_state(config);

        if table.ignores_input(controller.state) {
            continue;
        }

        controller.jump_requested = intent.jump;

        if !intent.is_moving() {
            continue;
        }
        let local = Vec3::new(intent.movement.x, 0.0, intent.movement.z).clamp_length_max(1.0);
        controller.move_direction = local;

        if intent.center_camera || config.first_person {
            continue;
        }
        let camera_yaw = cameras
            .iter()
            .find(|(camera, _)| camera.target == entity)
            .map(|(_, camera_transform)| camera_transform.rotation.to_euler(EulerRot::YXZ).0)
            .unwrap_or(0.0);
        controller.target_heading = Some(wrap_angle(camera_yaw + heading_from_direction(local)));
    }
}

/// Airborne bookkeeping: fall timers, the forced fall, and the landing
/// reset.
///
/// States outside the on-ground and flying groups count as airborne. Once
/// the fall timer outlasts `start_fall_time` and the jump window is
/// spent, a `Fall` is staged so a walked-off ledge stops pretending to
/// stand. Grounded and flying states instead reset the jump scratch; on
/// actual ground the body velocity is zeroed too, so leftover physics
/// drift never leaks into the next jump.
pub fn update_airborne_state<B: PhysicsBackend>(world: &mut World) {
    let dt = B::fixed_timestep(world);

    let mut grounded = Vec::new();
    let mut query = world.query::<(
        Entity,
        &mut CharacterController,
        &ControllerConfig,
        &TransitionTable,
    )>();
    for (entity, mut controller, config, table) in query.iter_mut(world) {
        let state = controller.state;
        if !table.is_on_ground_state(state) && !table.is_flying_state(state) {
            controller.is_airborne = true;
            if state.is_jump_or_fall() {
                controller.fall_time += dt;
            }
            if controller.fall_time > config.start_fall_time
                && state != MotionState::Fall
                && controller.jump_press_time > config.max_jump_press_time
            {
                controller.request_state(MotionState::Fall);
            }
            controller.jump_press_time += dt;
        } else {
            if table.is_on_ground_state(state) {
                grounded.push(entity);
            }
            controller.reset_after_jump(config);
        }

        // Held past the minimum: the jump keeps thrusting even if the
        // button already came back up.
        if controller.was_jumping && controller.jump_press_time <= config.min_jump_press_time {
            controller.jump_requested = true;
        }
    }

    for entity in grounded {
        B::set_velocity(world, entity, Vec3::ZERO);
    }
}

/// Runs the acceleration ramp for one tick.
///
/// Airborne characters only bleed acceleration, softened by the airborne
/// multiplier. On the ground, held movement raises the ceiling for sprint
/// or lowers it for walk, then ramps toward it at the family rate scaled
/// by the stick deflection; overshooting the ceiling decays back down at
/// the shared decel rate. Releasing the stick stages the matching
/// to-idle blend and bleeds the rest.
pub fn ramp_acceleration(
    time: Res<Time>,
    mut characters: Query<(
        &mut CharacterController,
        &ControllerConfig,
        &InputIntent,
        &Stamina,
        &TransitionTable,
    )>,
) {
    let dt = time.delta_secs();
    for (mut controller, config, intent, stamina, table) in characters.iter_mut() {
        if table.ignores_input(controller.state) {
            continue;
        }
        let state = controller.state;

        if controller.is_airborne {
            if controller.current_accel > 0.0 {
                controller.current_accel = (controller.current_accel
                    - config.decel_rate * config.jump_airborne_decel_multiplier * dt)
                    .max(0.0);
            }
        } else if controller.has_move_input() {
            controller.is_moving = true;
            if intent.sprint && stamina.can_sprint() {
                controller.max_accel = config.max_accel_sprint;
            } else if intent.walk {
                controller.max_accel = config.max_accel_walk;
            }
            let rate = config.accel_rate_for(state) * controller.move_direction.length();
            if controller.current_accel < controller.max_accel {
                controller.current_accel =
                    (controller.current_accel + rate * dt).min(controller.max_accel);
            } else if controller.current_accel > controller.max_accel {
                controller.current_accel =
                    (controller.current_accel - config.decel_rate * dt).max(controller.max_accel);
            }
        } else if controller.current_accel > 0.0 {
            match state {
                MotionState::Walk => controller.request_state(MotionState::WalkToIdle),
                MotionState::Run => controller.request_state(MotionState::RunToIdle),
                MotionState::Sprint => controller.request_state(MotionState::SprintToIdle),
                _ => {}
            }
            controller.current_accel = (controller.current_accel - config.decel_rate * dt).max(0.0);
        }
    }
}

/// Stages the locomotion state for the held keys.
///
/// Grounded characters cascade between the walk, run and sprint families
/// through their blend states; sprint outranks walk outranks the plain
/// run. A character that has stopped accelerating settles through the
/// to-idle blends into `Idle`. Airborne ticks stage nothing here, the
/// airborne bookkeeping owns those.
pub fn stage_locomotion_states(
    mut characters: Query<(
        &mut CharacterController,
        &InputIntent,
        &Stamina,
        &TransitionTable,
    )>,
) {
    for (mut controller, intent, stamina, table) in characters.iter_mut() {
        if table.ignores_input(controller.state) {
            continue;
        }
        if controller.is_airborne {
            continue;
        }
        let state = controller.state;
        let moving_key = controller.has_move_input();

        if intent.sprint && stamina.can_sprint() && moving_key && controller.is_moving {
            match state {
                MotionState::Idle => controller.request_state(MotionState::IdleToSprint),
                MotionState::Run | MotionState::RunToIdle => {
                    controller.request_state(MotionState::RunToSprint)
                }
                MotionState::SprintToIdle => controller.request_state(MotionState::Sprint),
                MotionState::Walk | MotionState::WalkToIdle => {
                    controller.request_state(MotionState::WalkToRun)
                }
                _ => {}
            }
        } else if intent.walk && moving_key && controller.is_moving {
            match state {
                MotionState::Idle => controller.request_state(MotionState::IdleToWalk),
                MotionState::Run => controller.request_state(MotionState::RunToWalk),
                MotionState::WalkToIdle | MotionState::RunToIdle => {
                    controller.request_state(MotionState::Walk)
                }
                MotionState::Sprint | MotionState::SprintToIdle => {
                    controller.request_state(MotionState::SprintToRun)
                }
                _ => {}
            }
        } else if controller.is_moving && moving_key {
            match state {
                MotionState::Idle => controller.request_state(MotionState::IdleToRun),
                MotionState::Walk => controller.request_state(MotionState::WalkToRun),
                MotionState::WalkToIdle | MotionState::RunToIdle => {
                    controller.request_state(MotionState::Run)
                }
                MotionState::Sprint => controller.request_state(MotionState::SprintToRun),
                _ => {}
            }
        }

        if controller.current_accel <= 0.0 {
            match state {
                MotionState::Walk => controller.request_state(MotionState::WalkToIdle),
                MotionState::Run => controller.request_state(MotionState::RunToIdle),
                MotionState::Sprint => controller.request_state(MotionState::SprintToIdle),
                _ => {
                    if state != MotionState::Idle && state != MotionState::Land {
                        controller.request_state(MotionState::Idle);
                    }
                }
            }
        }
    }
}

/// Runs every character's ability chain action pass.
///
/// The chain sees a read-only world plus the character's own components;
/// world writes come back as [`PluginEffects`] and are applied right
/// after, in the documented order. A plugin that consumes the frame
/// short-circuits the ones behind it, but the state it staged still goes
/// through the regular commit.
pub fn run_control_chains<B: PhysicsBackend>(world: &mut World) {
    let dt = B::fixed_timestep(world);

    let mut pending = Vec::new();
    let mut query =
        world.query_filtered::<Entity, (With<ControlChain>, With<CharacterController>)>();
    pending.extend(query.iter(world));

    for entity in pending {
        let Ok(mut entry) = world.get_entity_mut(entity) else {
            continue;
        };
        let Some((mut chain, mut controller, mut sensors, intent, stamina, table)) =
            entry.take::<CharacterParts>()
        else {
            continue;
        };
        let config = world
            .get::<ControllerConfig>(entity)
            .copied()
            .unwrap_or_default();
        let transform = world.get::<Transform>(entity).copied().unwrap_or_default();

        let mut effects = PluginEffects::default();
        {
            let mut ctx = PluginContext {
                entity,
                world,
                controller: &mut controller,
                config: &config,
                sensors: &sensors,
                intent: &intent,
                stamina: &stamina,
                table: &table,
                transform,
                dt,
                check_space: B::check_future_space,
                effects: &mut effects,
            };
            chain.run_actions(&mut ctx);
        }
        apply_plugin_effects::<B>(
            world,
            entity,
            &mut controller,
            &mut sensors,
            &config,
            &table,
            effects,
        );

        world
            .entity_mut(entity)
            .insert((chain, controller, sensors, intent, stamina, table));
    }
}

/// Measures this tick's movement of every ridden platform.
///
/// One measurement per tick, parked on the [`PlatformTracker`]; jump
/// initiation reads it as a carry velocity and the ride pass applies it
/// as a translation. Characters without a platform keep their tracker
/// clear so a later attach starts from a fresh pose.
pub fn track_platform_motion(
    mut characters: Query<(&CharacterController, &mut PlatformTracker)>,
    platforms: Query<&GlobalTransform>,
) {
    for (controller, mut tracker) in characters.iter_mut() {
        let Some(platform) = controller.active_platform else {
            tracker.reset();
            continue;
        };
        let Ok(pose) = platforms.get(platform) else {
            tracker.reset();
            continue;
        };
        tracker.measure(pose);
    }
}

/// Starts and sustains jumps.
///
/// The gate: the jump button is down, jumping is enabled, and the
/// character has not been falling past the grace window, so a step off
/// a ledge can still turn into a late jump. If the current state lists
/// `Jump` as a legal target the jump starts: scratch is saved, `Jump` is
/// staged and the press timer starts counting. While the press stays
/// inside the window each tick applies one impulse; the first tick zeroes
/// the body velocity and carries the forward drive plus the platform
/// velocity, later ticks only add lift. The resulting velocity is clamped
/// per axis so button mashing cannot stack unbounded speed.
pub fn initiate_jumps<B: PhysicsBackend>(world: &mut World) {
    let dt = B::fixed_timestep(world);
    if dt <= 0.0 {
        return;
    }

    let mut pending = Vec::new();
    let mut query = world.query::<(
        Entity,
        &mut CharacterController,
        &ControllerConfig,
        &Transform,
        &TransitionTable,
        &mut PlatformTracker,
    )>();
    for (entity, mut controller, config, transform, table, mut tracker) in query.iter_mut(world) {
        if table.ignores_input(controller.state) {
            continue;
        }
        if !controller.jump_requested
            || !config.jump_enabled
            || controller.fall_time > config.jump_allow_after_fall_time
        {
            continue;
        }

        if table.can_jump_from(controller.state) {
            controller.was_jumping = true;
            controller.is_airborne = true;
            controller.pre_jump_state = controller.state;
            controller.pre_jump_accel = controller.current_accel;
            controller.request_state(MotionState::Jump);
            controller.jump_press_time += dt;
        }

        if controller.jump_press_time <= config.max_jump_press_time {
            let first = controller.first_jump;
            let forward_speed = if first {
                config.speed * controller.current_accel
            } else {
                0.0
            };
            controller.first_jump = false;

            let platform_velocity =
                if config.platform_movement_affects_jump && controller.active_platform.is_some() {
                    tracker.moved / dt
                } else {
                    Vec3::ZERO
                };

            let impulse = jump_impulse(
                transform,
                &controller,
                config,
                forward_speed,
                platform_velocity,
                dt,
            );
            pending.push((entity, impulse, config.max_jump_force, first));

            // Off the platform the moment the jump fires.
            controller.active_platform = None;
            tracker.reset();
            tracker.pinned = false;
        }
    }

    for (entity, impulse, max, first) in pending {
        if first {
            // The grounded reset zeroed velocity already; again, in case
            // a plugin or the platform ride left drift behind this tick.
            B::set_velocity(world, entity, Vec3::ZERO);
        }
        B::apply_impulse(world, entity, impulse);
        let velocity = B::velocity(world, entity);
        let clamped = clamp_jump_velocity(velocity, max);
        if clamped != velocity {
            B::set_velocity(world, entity, clamped);
        }
    }
}

/// Moves the character: speed calculation, stamina, the move-restriction
/// pass, the heading tween, the translation and the ground step.
///
/// The speed scalar follows the acceleration ramp; airborne steering gets
/// at least the airborne floor while input is held, flying states move
/// only through their plugin. The step probe then snaps the character
/// onto the ground, engages or releases the slip pin, resolves the
/// platform under the feet, and stages `Land` or `Fall` when the contact
/// situation changed. States that ignore stepping skip the probe; states
/// that ignore the position update keep their translation (the jump arc
/// belongs to the physics body, not the ramp).
pub fn integrate_characters<B: PhysicsBackend>(world: &mut World) {
    let dt = B::fixed_timestep(world);

    let mut pending = Vec::new();
    let mut query =
        world.query_filtered::<Entity, (With<CharacterController>, With<TransitionTable>)>();
    pending.extend(query.iter(world));

    for entity in pending {
        let Ok(mut entry) = world.get_entity_mut(entity) else {
            continue;
        };
        let Some((mut chain, mut controller, mut sensors, intent, mut stamina, table)) =
            entry.take::<CharacterParts>()
        else {
            continue;
        };
        let config = world
            .get::<ControllerConfig>(entity)
            .copied()
            .unwrap_or_default();
        let state = controller.state;
        let flying = table.is_flying_state(state);

        let mut speed = if controller.is_airborne && !flying && controller.has_move_input() {
            (config.speed_airborne * dt).max(config.speed * controller.current_accel * dt)
        } else {
            config.speed * controller.current_accel * dt
        };
        if flying {
            // Flying states move through their plugin's restriction pass.
            speed = 0.0;
            controller.current_accel = 0.0;
        }
        controller.update_speed = Vec3::new(0.0, 0.0, -speed);
        if config.first_person {
            controller.update_speed = controller.move_direction * speed;
        }

        let snapshot = world.get::<Transform>(entity).copied().unwrap_or_default();
        let mut effects = PluginEffects::default();
        let draining = {
            let mut ctx = PluginContext {
                entity,
                world,
                controller: &mut controller,
                config: &config,
                sensors: &sensors,
                intent: &intent,
                stamina: &stamina,
                table: &table,
                transform: snapshot,
                dt,
                check_space: B::check_future_space,
                effects: &mut effects,
            };
            let draining = ctx.stamina.sprint_drains(
                ctx.controller.state,
                ctx.controller.is_airborne,
                ctx.intent.sprint,
                ctx.controller.is_moving,
            ) || chain.wants_stamina(&ctx);
            chain.run_move_restrictions(&mut ctx);
            draining
        };
        stamina.update(draining, controller.state, &config, dt);
        apply_plugin_effects::<B>(
            world,
            entity,
            &mut controller,
            &mut sensors,
            &config,
            &table,
            effects,
        );

        // Re-read: a restriction may have teleported the character.
        let mut transform = world.get::<Transform>(entity).copied().unwrap_or_default();

        if let Some(target) = controller.target_heading {
            if !table.prevents_rotation(state) {
                turn_toward(&mut transform, target, config.turn_smooth_time, dt);
            }
        }

        if !table.ignores_position_update(state) {
            transform.translation += transform.rotation * controller.update_speed;
        }

        let pinned = world
            .get::<PlatformTracker>(entity)
            .map(|tracker| tracker.pinned)
            .unwrap_or(false);
        let mut contact_platform = None;

        if !table.ignores_step(state) {
            let prevent = table.prevents_slip(state);
            let outcome = step::<B>(world, entity, &mut transform, &controller, &config, prevent);

            if let Some(fly) = outcome.fly_pin {
                if fly != controller.fly_mode {
                    B::set_kinematic(world, entity, fly);
                    controller.fly_mode = fly;
                }
            }

            controller.grounded = outcome.grounded;
            controller.ground = outcome.hit;
            contact_platform = outcome.platform;

            if outcome.grounded {
                // The cached foot contact predates the snap.
                sensors.clear(RayId::FOOT);
                if !table.is_on_ground_state(state) {
                    controller.landing_speed = B::velocity(world, entity).y.abs();
                    B::set_velocity(world, entity, Vec3::ZERO);
                    controller.request_state(MotionState::Land);
                }
            } else if state != MotionState::Jump && state != MotionState::Fall {
                controller.request_state(MotionState::Fall);
            }
        } else {
            controller.grounded = false;
            controller.ground = None;
            if !flying && controller.fly_mode {
                // The state stopped flying while the pin was still on.
                B::set_kinematic(world, entity, false);
                controller.fly_mode = false;
            }
        }

        controller.active_platform = match contact_platform {
            Some(platform) => Some(platform),
            None if pinned => controller.active_platform,
            None => None,
        };
        if let Some(mut tracker) = world.get_mut::<PlatformTracker>(entity) {
            // The pin lasts exactly one tick; plugins renew it each pass.
            tracker.pinned = false;
        }

        if let Some(mut stored) = world.get_mut::<Transform>(entity) {
            *stored = transform;
        }
        world
            .entity_mut(entity)
            .insert((chain, controller, sensors, intent, stamina, table));
    }
}

/// Applies the deferred world writes a chain pass collected.
///
/// Order matters and is part of the plugin contract: velocity zeroing,
/// fly mode, yaw snap, the position write and finally the platform pin.
/// A position write re-runs the ground step at the new spot so the
/// regular integration cannot yank the character back through the old
/// contact, but it never stages `Land` or `Fall`: an attach teleport is
/// not a landing.
fn apply_plugin_effects<B: PhysicsBackend>(
    world: &mut World,
    entity: Entity,
    controller: &mut CharacterController,
    sensors: &mut RaySensors,
    config: &ControllerConfig,
    table: &TransitionTable,
    effects: PluginEffects,
) {
    if effects.is_empty() {
        return;
    }

    if effects.zero_velocity {
        B::set_velocity(world, entity, Vec3::ZERO);
    }
    if let Some(fly) = effects.fly_mode {
        if fly != controller.fly_mode {
            B::set_kinematic(world, entity, fly);
            controller.fly_mode = fly;
        }
    }
    if let Some(yaw) = effects.yaw_snap {
        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            transform.rotation = Quat::from_rotation_y(yaw);
        }
        // The snap wins over this tick's tween.
        controller.target_heading = None;
    }
    if let Some(position) = effects.position {
        if effects.clear_rays {
            sensors.clear_all();
        }
        let mut transform = world.get::<Transform>(entity).copied().unwrap_or_default();
        transform.translation = position;
        let prevent = table.prevents_slip(controller.state);
        let outcome = step::<B>(world, entity, &mut transform, controller, config, prevent);
        controller.grounded = outcome.grounded;
        controller.ground = outcome.hit;
        if let Some(mut stored) = world.get_mut::<Transform>(entity) {
            *stored = transform;
        }
    }
    if let Some(platform) = effects.platform_pin {
        controller.active_platform = Some(platform);
        if let Some(mut tracker) = world.get_mut::<PlatformTracker>(entity) {
            tracker.pinned = true;
        }
    }
}

/// Carries riders along with their platform.
///
/// Applies the translation measured earlier this tick and, when the
/// platform turns and the config respects it, swings the character
/// around the platform pivot by the same yaw. Jumping and falling
/// characters stop riding; their tracker forgets the pose so a new
/// attach starts clean.
pub fn ride_platforms(
    mut characters: Query<(
        &mut Transform,
        &CharacterController,
        &mut PlatformTracker,
        &ControllerConfig,
    )>,
    platforms: Query<&GlobalTransform>,
) {
    for (mut transform, controller, mut tracker, config) in characters.iter_mut() {
        let Some(platform) = controller.active_platform else {
            continue;
        };
        if controller.state.is_jump_or_fall() {
            tracker.reset();
            continue;
        }
        if tracker.moved != Vec3::ZERO {
            transform.translation += tracker.moved;
        }
        if config.respect_platform_rotation && tracker.turned != 0.0 {
            let Ok(pose) = platforms.get(platform) else {
                continue;
            };
            rotate_around_pivot(&mut transform, pose.translation(), tracker.turned);
        }
    }
}

/// Commits the surviving state request through the transition table.
///
/// One request per tick reaches this point; everything staged earlier was
/// overwritten along the way. A legal transition swaps the state and
/// emits [`StateChanged`], an illegal one is dropped with a debug note.
/// Staging is deliberately loose, the table is the gate.
pub fn commit_states(
    mut characters: Query<(Entity, &mut CharacterController, &TransitionTable)>,
    mut changes: EventWriter<StateChanged>,
) {
    for (entity, mut controller, table) in characters.iter_mut() {
        let Some(next) = controller.requested_state.take() else {
            continue;
        };
        let from = controller.state;
        match table.check(from, next) {
            Ok(()) => {
                controller.state = next;
                debug!("state {from:?} -> {next:?}");
                changes.write(StateChanged {
                    entity,
                    from,
                    to: next,
                });
            }
            Err(rejected) => debug!("{rejected}"),
        }
    }
}

/// Mirrors the grounded flag into the [`Grounded`] / [`Airborne`] marker
/// pair, so app systems can filter characters without reading the
/// controller.
pub fn sync_state_markers(
    mut commands: Commands,
    characters: Query<(Entity, &CharacterController, Has<Grounded>, Has<Airborne>)>,
) {
    for (entity, controller, has_grounded, has_airborne) in characters.iter() {
        if controller.is_grounded() {
            if !has_grounded || has_airborne {
                commands.entity(entity).insert(Grounded).remove::<Airborne>();
            }
        } else if !has_airborne || has_grounded {
            commands.entity(entity).insert(Airborne).remove::<Grounded>();
        }
    }
}

//! Scenario tests for the character controller.
//!
//! Each test drives a complete headless app with the kinematic backend:
//! real brushes, real input writes, and the full fixed-step pipeline from
//! intent staging to the state commit. Every test prints PROOF of the
//! values it checked.

use std::time::Duration;

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use parkour_controller::prelude::*;

const DT: f64 = 1.0 / 60.0;

/// Create a headless test app with a manual clock: every `app.update()`
/// advances the virtual clock by exactly one fixed period, so `Update`
/// and `FixedUpdate` both run once per call.
fn create_test_app() -> App {
    let mut app = App::new();

    app.add_plugins(MinimalPlugins);
    app.add_plugins(TransformPlugin);
    app.add_plugins(CharacterControllerPlugin::<KinematicBackend>::default());
    app.insert_resource(Time::<Fixed>::from_hz(60.0));
    app.insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(
        DT,
    )));

    app
}

/// Spawn a static cuboid brush.
fn spawn_brush(app: &mut App, center: Vec3, half_extents: Vec3, rotation: Quat) -> Entity {
    let transform = Transform::from_translation(center).with_rotation(rotation);
    app.world_mut()
        .spawn((
            BrushCollider::cuboid(half_extents.x, half_extents.y, half_extents.z),
            transform,
            GlobalTransform::from(transform),
        ))
        .id()
}

/// Spawn a walkable slab whose top face sits at y = 0.
fn spawn_ground(app: &mut App, half_width: f32) -> Entity {
    spawn_brush(
        app,
        Vec3::new(0.0, -0.5, 0.0),
        Vec3::new(half_width, 0.5, half_width),
        Quat::IDENTITY,
    )
}

/// Spawn a character with the default config. The plugin completes it on
/// its first fixed tick.
fn spawn_character(app: &mut App, position: Vec3) -> Entity {
    let transform = Transform::from_translation(position);
    let config = ControllerConfig::player();
    app.world_mut()
        .spawn((
            transform,
            GlobalTransform::from(transform),
            CharacterController::new(&config),
            config,
            InputIntent::default(),
            KinematicBody::default(),
        ))
        .id()
}

/// Run one frame.
fn tick(app: &mut App) {
    app.update();
}

/// Run the app for N frames.
fn run_frames(app: &mut App, frames: usize) {
    for _ in 0..frames {
        app.update();
    }
}

/// Tick until `predicate` holds, up to `max_frames`. Returns the number of
/// frames it took.
fn run_until(
    app: &mut App,
    max_frames: usize,
    predicate: impl Fn(&App) -> bool,
) -> Option<usize> {
    for frame in 1..=max_frames {
        app.update();
        if predicate(app) {
            return Some(frame);
        }
    }
    None
}

/// Merged input view of a character, for direct writes. No input devices
/// exist in a headless app, so the merge pass leaves these values alone.
fn intent_mut(app: &mut App, entity: Entity) -> Mut<'_, InputIntent> {
    app.world_mut().get_mut::<InputIntent>(entity).unwrap()
}

fn state_of(app: &App, entity: Entity) -> MotionState {
    app.world().get::<CharacterController>(entity).unwrap().state
}

fn translation_of(app: &App, entity: Entity) -> Vec3 {
    app.world().get::<Transform>(entity).unwrap().translation
}

fn stamina_of(app: &App, entity: Entity) -> &Stamina {
    app.world().get::<Stamina>(entity).unwrap()
}

// ==================== Locomotion Blends ====================

mod locomotion_blends {
    use super::*;

    #[test]
    fn run_input_blends_idle_into_run() {
        let mut app = create_test_app();
        spawn_ground(&mut app, 50.0);
        let character = spawn_character(&mut app, Vec3::ZERO);

        intent_mut(&mut app, character).movement = Vec3::new(0.0, 0.0, -1.0);

        // The cascade stages the blend and the commit applies it.
        let entered = run_until(&mut app, 3, |app| {
            state_of(app, character) == MotionState::IdleToRun
        })
        .expect("run input should stage IdleToRun");

        // The blend holds until the animator crossfade finishes, then
        // settles into the full run.
        let settled = run_until(&mut app, 45, |app| {
            state_of(app, character) == MotionState::Run
        })
        .expect("the blend should settle into Run");

        let controller = app.world().get::<CharacterController>(character).unwrap();
        println!(
            "PROOF: entered IdleToRun after {} frame(s), settled into Run {} frames later, accel={}",
            entered, settled, controller.current_accel
        );

        // PROOF: the settle tracks the enter-run crossfade (0.5 s at 60 Hz).
        assert!(
            (28..=34).contains(&settled),
            "settle should take about 30 frames, took {}",
            settled
        );
        assert!(controller.is_grounded(), "running happens on the ground");
        assert!(
            controller.current_accel > 0.0,
            "the ramp should have built up acceleration"
        );
        assert!(
            translation_of(&app, character).z < -0.1,
            "the character should have covered ground"
        );
    }

    #[test]
    fn state_changes_are_published_as_events() {
        let mut app = create_test_app();
        spawn_ground(&mut app, 50.0);
        let character = spawn_character(&mut app, Vec3::ZERO);

        intent_mut(&mut app, character).movement = Vec3::new(0.0, 0.0, -1.0);

        // Drain per frame; the event buffer only holds two frames.
        let mut transitions = Vec::new();
        for _ in 0..50 {
            app.update();
            let mut events = app.world_mut().resource_mut::<Events<StateChanged>>();
            transitions.extend(events.drain().map(|change| (change.entity, change.from, change.to)));
            if transitions.iter().any(|&(_, _, to)| to == MotionState::Run) {
                break;
            }
        }

        println!("PROOF: transitions={:?}", transitions);
        assert!(transitions
            .iter()
            .any(|&(entity, from, to)| entity == character
                && from == MotionState::Idle
                && to == MotionState::IdleToRun));
        assert!(transitions
            .iter()
            .any(|&(entity, from, to)| entity == character
                && from == MotionState::IdleToRun
                && to == MotionState::Run));
    }
}

// ==================== Ledge Walk-Off ====================

mod ledge_walk_off {
    use super::*;

    #[test]
    fn losing_ground_stages_fall_the_same_frame() {
        let mut app = create_test_app();
        // A small slab; the edge lies 2 m ahead of the spawn.
        spawn_brush(
            &mut app,
            Vec3::new(0.0, -0.5, 0.0),
            Vec3::new(2.0, 0.5, 2.0),
            Quat::IDENTITY,
        );
        let character = spawn_character(&mut app, Vec3::ZERO);

        intent_mut(&mut app, character).movement = Vec3::new(0.0, 0.0, -1.0);

        let mut fall_frame = None;
        for frame in 1..=180 {
            app.update();
            let controller = app.world().get::<CharacterController>(character).unwrap();
            if !controller.is_grounded() {
                // PROOF: the commit of the very frame that lost ground
                // already switched to Fall.
                assert_eq!(
                    controller.state,
                    MotionState::Fall,
                    "frame {}: ground lost but state is {:?}",
                    frame,
                    controller.state
                );
                fall_frame = Some(frame);
                break;
            }
        }
        let frame = fall_frame.expect("the character should run off the edge within 3 s");

        let translation = translation_of(&app, character);
        let velocity = app.world().get::<KinematicBody>(character).unwrap().velocity;
        println!(
            "PROOF: ground lost at frame {}, translation={:?}, velocity.y={}",
            frame, translation, velocity.y
        );

        // PROOF: the foot probe ran past the slab edge before it missed.
        assert!(translation.z < -2.0, "still over the slab at {:?}", translation);
        // PROOF: gravity resumed the same frame.
        assert!(velocity.y < 0.0, "fall should start dropping immediately");

        // The fall keeps accumulating airtime, it never turns into a jump.
        intent_mut(&mut app, character).movement = Vec3::ZERO;
        run_frames(&mut app, 30);
        let controller = app.world().get::<CharacterController>(character).unwrap();
        assert_eq!(controller.state, MotionState::Fall);
        assert!(controller.fall_time > 0.4);
        assert!(translation_of(&app, character).y < translation.y);
    }
}

// ==================== Coyote Jump ====================

mod coyote_jump {
    use super::*;

    /// Run the character off the small slab and return once Fall commits,
    /// with movement released.
    fn walk_off(app: &mut App) -> Entity {
        spawn_brush(
            app,
            Vec3::new(0.0, -0.5, 0.0),
            Vec3::new(2.0, 0.5, 2.0),
            Quat::IDENTITY,
        );
        let character = spawn_character(app, Vec3::ZERO);
        intent_mut(app, character).movement = Vec3::new(0.0, 0.0, -1.0);
        run_until(app, 180, |app| {
            state_of(app, character) == MotionState::Fall
        })
        .expect("the character should walk off the edge");
        intent_mut(app, character).movement = Vec3::ZERO;
        character
    }

    #[test]
    fn jump_inside_the_grace_window_fires() {
        let mut app = create_test_app();
        let character = walk_off(&mut app);

        // Two more frames of falling, then the press: the grace window is
        // 0.2 s and the fall is roughly 0.05 s old when the gate checks.
        run_frames(&mut app, 2);
        intent_mut(&mut app, character).jump = true;
        tick(&mut app);
        intent_mut(&mut app, character).jump = false;

        let controller = app.world().get::<CharacterController>(character).unwrap();
        let velocity = app.world().get::<KinematicBody>(character).unwrap().velocity;
        println!(
            "PROOF: state={:?}, fall_time={}, velocity.y={}",
            controller.state, controller.fall_time, velocity.y
        );

        assert_eq!(
            controller.state,
            MotionState::Jump,
            "a press inside the grace window should still jump"
        );
        assert!(
            velocity.y > 0.0,
            "the jump impulse should overcome the short fall: {}",
            velocity.y
        );
    }

    #[test]
    fn jump_after_the_grace_window_is_ignored() {
        let mut app = create_test_app();
        let character = walk_off(&mut app);

        // Half a second of falling before the press; the 0.2 s window is
        // long gone.
        run_frames(&mut app, 30);
        intent_mut(&mut app, character).jump = true;
        tick(&mut app);
        intent_mut(&mut app, character).jump = false;

        let controller = app.world().get::<CharacterController>(character).unwrap();
        let velocity = app.world().get::<KinematicBody>(character).unwrap().velocity;
        println!(
            "PROOF: state={:?}, fall_time={}, velocity.y={}",
            controller.state, controller.fall_time, velocity.y
        );

        assert_eq!(
            controller.state,
            MotionState::Fall,
            "a press after the grace window must not jump"
        );
        assert!(controller.fall_time > 0.2);
        assert!(velocity.y < 0.0, "the fall should continue undisturbed");

        // And it stays that way.
        run_frames(&mut app, 10);
        assert_eq!(state_of(&app, character), MotionState::Fall);
    }
}

// ==================== Wall Run ====================

mod wall_run {
    use super::*;

    /// A wall ahead of the spawn, leaning away from vertical by
    /// `lean_deg`: its face normal reads `90 - lean_deg` degrees off the
    /// up axis, so a 10 degree lean makes an 80 degree wall.
    fn spawn_leaning_wall(app: &mut App, lean_deg: f32) -> Entity {
        spawn_brush(
            app,
            Vec3::new(0.0, 3.0, -4.0),
            Vec3::new(4.0, 3.0, 0.15),
            Quat::from_rotation_x(-lean_deg.to_radians()),
        )
    }

    #[test]
    fn eighty_degree_wall_engages_a_wall_run() {
        let mut app = create_test_app();
        spawn_ground(&mut app, 50.0);
        spawn_leaning_wall(&mut app, 10.0);
        let character = spawn_character(&mut app, Vec3::ZERO);

        {
            let mut intent = intent_mut(&mut app, character);
            intent.movement = Vec3::new(0.0, 0.0, -1.0);
            intent.intel_action = true;
        }

        let frames = run_until(&mut app, 150, |app| {
            state_of(app, character).is_wall_run_state()
        })
        .expect("the runner should engage the steep wall");

        let state = state_of(&app, character);
        println!(
            "PROOF: engaged {:?} after {} frames at {:?}",
            state,
            frames,
            translation_of(&app, character)
        );
        assert!(state.is_wall_run_state());
    }

    #[test]
    fn sixty_degree_wall_declines() {
        let mut app = create_test_app();
        spawn_ground(&mut app, 50.0);
        spawn_leaning_wall(&mut app, 30.0);
        let character = spawn_character(&mut app, Vec3::ZERO);

        {
            let mut intent = intent_mut(&mut app, character);
            intent.movement = Vec3::new(0.0, 0.0, -1.0);
            intent.intel_action = true;
        }

        // Observe the approach up to just short of the surface; past that
        // the probes would read the brush interior instead of its face.
        let mut saw_contact = false;
        let mut frames = 0;
        for frame in 1..=150 {
            app.update();
            let state = state_of(&app, character);
            assert!(
                !state.is_wall_run_state(),
                "frame {}: a 60 degree slope must not wall run, got {:?}",
                frame,
                state
            );
            assert!(!state.is_ledge_state() && !state.is_climb_state());

            let sensors = app.world().get::<RaySensors>(character).unwrap();
            saw_contact |= sensors.query(RayId::WALL_RUN_FORWARD).is_some();

            frames = frame;
            if translation_of(&app, character).z < -1.9 {
                break;
            }
        }

        println!(
            "PROOF: {} frames of approach, forward contact seen: {}, final state {:?}",
            frames,
            saw_contact,
            state_of(&app, character)
        );
        // PROOF: the gate saw the wall and still declined it.
        assert!(saw_contact, "the forward probe should have touched the slope");
    }
}

// ==================== Sprint Stamina ====================

mod sprint_stamina {
    use super::*;

    #[test]
    fn empty_pool_drops_sprint_to_run_and_locks_until_recovery() {
        let mut app = create_test_app();
        spawn_ground(&mut app, 50.0);
        let character = spawn_character(&mut app, Vec3::ZERO);

        // Start with a nearly drained pool so the lockout arrives quickly.
        app.world_mut()
            .entity_mut(character)
            .insert(Stamina::default());
        app.world_mut().get_mut::<Stamina>(character).unwrap().value = 6.0;

        {
            let mut intent = intent_mut(&mut app, character);
            intent.movement = Vec3::new(0.0, 0.0, -1.0);
            intent.sprint = true;
        }

        run_until(&mut app, 3, |app| {
            state_of(app, character) == MotionState::IdleToSprint
        })
        .expect("sprint input should stage the sprint blend");

        // 6 stamina at 25 per second is gone in under a second.
        let drained = run_until(&mut app, 60, |app| {
            !stamina_of(app, character).can_sprint()
        })
        .expect("the pool should empty");
        assert_eq!(stamina_of(&app, character).value, 0.0);

        // With the gate closed the cascade falls back through SprintToRun
        // into the plain run, sprint still held.
        run_until(&mut app, 150, |app| {
            state_of(app, character) == MotionState::Run
        })
        .expect("empty stamina should drop the sprint to a run");

        let stamina = stamina_of(&app, character);
        println!(
            "PROOF: emptied after {} frames, fell back to Run, value={}, can_sprint={}",
            drained,
            stamina.value,
            stamina.can_sprint()
        );
        // PROOF: trickle recovery has not reopened the gate.
        assert!(!stamina.can_sprint(), "the lockout must hold below the threshold");

        // Skip most of the slow run-rate refill; the lock state carries.
        app.world_mut().get_mut::<Stamina>(character).unwrap().value = 49.0;
        intent_mut(&mut app, character).sprint = false;

        run_until(&mut app, 30, |app| stamina_of(app, character).can_sprint())
            .expect("recovery past the threshold should reopen the gate");
        assert!(stamina_of(&app, character).value > 50.0);

        // Sprinting works again.
        intent_mut(&mut app, character).sprint = true;
        let reentry = run_until(&mut app, 10, |app| {
            state_of(app, character).is_sprint_state()
        })
        .expect("the reopened gate should accept sprint input");

        println!(
            "PROOF: re-entered the sprint family ({:?}) {} frames after the press, value={}",
            state_of(&app, character),
            reentry,
            stamina_of(&app, character).value
        );
    }
}

// ==================== Stamina Recovery Rates ====================

mod stamina_recovery {
    use super::*;

    #[test]
    fn recovery_rate_follows_the_committed_state() {
        let mut app = create_test_app();
        spawn_ground(&mut app, 50.0);

        let idler = spawn_character(&mut app, Vec3::new(-3.0, 0.0, 0.0));
        let walker = spawn_character(&mut app, Vec3::new(0.0, 0.0, 0.0));
        let runner = spawn_character(&mut app, Vec3::new(3.0, 0.0, 0.0));

        {
            let mut intent = intent_mut(&mut app, walker);
            intent.movement = Vec3::new(0.0, 0.0, -1.0);
            intent.walk = true;
        }
        intent_mut(&mut app, runner).movement = Vec3::new(0.0, 0.0, -1.0);

        run_until(&mut app, 120, |app| {
            state_of(app, walker) == MotionState::Walk
                && state_of(app, runner) == MotionState::Run
        })
        .expect("both movers should settle into their states");
        assert_eq!(state_of(&app, idler), MotionState::Idle);

        // Zero every pool, then let exactly one second of recovery pass.
        for entity in [idler, walker, runner] {
            app.world_mut().get_mut::<Stamina>(entity).unwrap().value = 0.0;
        }
        run_frames(&mut app, 60);

        let idle_value = stamina_of(&app, idler).value;
        let walk_value = stamina_of(&app, walker).value;
        let run_value = stamina_of(&app, runner).value;
        println!(
            "PROOF: one second of recovery: idle={}, walk={}, run={}",
            idle_value, walk_value, run_value
        );

        // PROOF: the rate is keyed strictly by the committed state, never
        // by leftover sprint input or ramp values.
        assert!((idle_value - 15.0).abs() < 0.3, "idle rate off: {}", idle_value);
        assert!((walk_value - 10.0).abs() < 0.3, "walk rate off: {}", walk_value);
        assert!((run_value - 5.0).abs() < 0.3, "run rate off: {}", run_value);
        assert!(idle_value > walk_value && walk_value > run_value);
    }
}

// ==================== Camera Height ====================

mod camera_height {
    use super::*;

    /// Floater height above the character origin, from the rig defaults.
    const FLOATER_Y: f32 = 1.5;

    fn spawn_camera(app: &mut App, target: Entity, height_offset: f32) -> Entity {
        let transform =
            Transform::from_translation(Vec3::new(0.0, FLOATER_Y + height_offset, 3.5));
        app.world_mut()
            .spawn((ThirdPersonCamera::new(target), transform))
            .id()
    }

    #[test]
    fn height_inside_the_comfort_band_holds() {
        let mut app = create_test_app();
        spawn_ground(&mut app, 50.0);
        let character = spawn_character(&mut app, Vec3::ZERO);
        tick(&mut app);

        // Exactly on the comfort average: nothing should pull on it.
        let camera = spawn_camera(&mut app, character, 2.125);
        let before = translation_of(&app, camera);
        run_frames(&mut app, 60);
        let after = translation_of(&app, camera);

        println!("PROOF: camera held {:?} -> {:?}", before, after);
        assert!((after.y - before.y).abs() < 1e-4, "height moved inside the band");
        assert!((after.x - before.x).abs() < 1e-4);
        assert!((after.z - before.z).abs() < 1e-4);
    }

    #[test]
    fn height_above_the_band_drifts_back_to_its_edge() {
        let mut app = create_test_app();
        spawn_ground(&mut app, 50.0);
        let character = spawn_character(&mut app, Vec3::ZERO);
        tick(&mut app);

        // Well above the band (average 2.125, half-width 0.2).
        let camera = spawn_camera(&mut app, character, 3.4);
        let start = translation_of(&app, camera).y;

        // Half a second of drift at 1 unit per second.
        run_frames(&mut app, 30);
        let half_second = translation_of(&app, camera).y;
        assert!(
            (start - half_second - 0.5).abs() < 0.02,
            "drift speed off: {} -> {}",
            start,
            half_second
        );

        // The drift stops at the band edge, not at the average.
        run_frames(&mut app, 200);
        let settled = translation_of(&app, camera).y;
        let offset = settled - FLOATER_Y;
        println!(
            "PROOF: drift {} -> {} -> settled offset {}",
            start, half_second, offset
        );
        assert!(
            (offset - 2.325).abs() < 0.03,
            "should stop just inside the band edge, offset {}",
            offset
        );

        // Once inside, the height is left alone.
        run_frames(&mut app, 30);
        let still = translation_of(&app, camera).y;
        assert!((still - settled).abs() < 1e-4, "height moved inside the band");
    }
}

//! Parkour Playground Example
//!
//! A playable course with one station per ability:
//! - A wall-run alley with two facing walls
//! - A free-climb wall and a stepped ladder
//! - Ledge blocks at rising heights for grab, shimmy and pull-up chains
//! - A drifting platform to ride between two towers
//!
//! ## Controls
//! - **W/A/S/D**: Move (camera-relative)
//! - **Space**: Jump (hold for extra height)
//! - **Left Shift** (hold): Sprint
//! - **Left Ctrl** (hold): Walk
//! - **Left Mouse** (hold): Wall run, ledge grab and climb; while hanging it
//!   pulls the character up
//! - **Home**: Center the camera behind the character
//!
//! The third-person camera follows the player and pulls in front of
//! geometry that blocks the line of sight.

use std::f32::consts::TAU;

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use parkour_controller::prelude::*;

// ==================== Constants ====================

const PLAYER_HALF_HEIGHT: f32 = 0.6;
const PLAYER_RADIUS: f32 = 0.3;

const FLOOR_HALF_EXTENT: f32 = 40.0;

const ALLEY_HALF_LENGTH: f32 = 7.0;
const ALLEY_HALF_GAP: f32 = 2.2;
const ALLEY_WALL_HEIGHT: f32 = 4.0;
const WALL_THICKNESS: f32 = 0.4;

const PLATFORM_TRAVEL: Vec3 = Vec3::new(0.0, 0.0, 4.5);
const PLATFORM_PERIOD: f32 = 8.0;

// ==================== Main ====================

fn spawn_position() -> Vec3 {
    Vec3::new(0.0, 1.0, 6.0)
}

fn default_config() -> ControllerConfig {
    ControllerConfig::player()
}

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Parkour Playground - Character Controller Example".into(),
                resolution: (1280.0, 720.0).into(),
                ..default()
            }),
            ..default()
        }))
        // Physics
        .add_plugins(RapierPhysicsPlugin::<NoUserData>::default())
        // Character controller
        .add_plugins(CharacterControllerPlugin::<RapierBackend>::default())
        // Systems
        .add_systems(Startup, setup)
        .add_systems(Update, drive_platforms)
        .run();
}

// ==================== Setup ====================

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    // Spawn environment
    spawn_floor(&mut commands, &mut meshes, &mut materials);
    spawn_wall_run_alley(&mut commands, &mut meshes, &mut materials);
    spawn_climbing_walls(&mut commands, &mut meshes, &mut materials);
    spawn_ledge_court(&mut commands, &mut meshes, &mut materials);
    spawn_platform_ride(&mut commands, &mut meshes, &mut materials);

    // Spawn player and its camera
    let player = spawn_player(&mut commands, &mut meshes, &mut materials);
    commands.spawn((
        Camera3d::default(),
        ThirdPersonCamera::new(player),
        Transform::from_xyz(0.0, 3.5, 12.0).looking_at(spawn_position(), Vec3::Y),
    ));

    // Lighting
    commands.spawn((
        DirectionalLight {
            illuminance: 10000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_rotation(Quat::from_euler(EulerRot::YXZ, 0.6, -0.9, 0.0)),
    ));
    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 0.3,
        affects_lightmapped_meshes: false,
    });

    // UI instructions. The mouse button doubles as the parkour action, so
    // the overlay must not swallow clicks.
    commands.spawn((
        Text::new("WASD: Move | Space: Jump | Shift: Sprint | Hold LMB: Wall Run / Grab / Climb | Home: Center Camera"),
        TextFont {
            font_size: 20.0,
            ..default()
        },
        TextColor(Color::WHITE),
        Node {
            position_type: PositionType::Absolute,
            top: Val::Px(10.0),
            left: Val::Px(10.0),
            ..default()
        },
        Pickable::IGNORE,
    ));
}

fn spawn_floor(
    commands: &mut Commands,
    meshes: &mut ResMut<Assets<Mesh>>,
    materials: &mut ResMut<Assets<StandardMaterial>>,
) {
    spawn_static_box(
        commands,
        meshes,
        materials,
        Vec3::new(0.0, -0.25, 0.0),
        Vec3::new(FLOOR_HALF_EXTENT, 0.25, FLOOR_HALF_EXTENT),
        Color::srgb(0.35, 0.38, 0.33),
    );
}

fn spawn_wall_run_alley(
    commands: &mut Commands,
    meshes: &mut ResMut<Assets<Mesh>>,
    materials: &mut ResMut<Assets<StandardMaterial>>,
) {
    // Two facing walls straight ahead of the spawn point. Sprint along
    // either one and hold the mouse button to run on it.
    let center_z = -11.0;
    for side in [-1.0, 1.0] {
        spawn_static_box(
            commands,
            meshes,
            materials,
            Vec3::new(side * ALLEY_HALF_GAP, ALLEY_WALL_HEIGHT / 2.0, center_z),
            Vec3::new(
                WALL_THICKNESS / 2.0,
                ALLEY_WALL_HEIGHT / 2.0,
                ALLEY_HALF_LENGTH,
            ),
            Color::srgb(0.45, 0.45, 0.48),
        );
    }
}

fn spawn_climbing_walls(
    commands: &mut Commands,
    meshes: &mut ResMut<Assets<Mesh>>,
    materials: &mut ResMut<Assets<StandardMaterial>>,
) {
    // Free-climb wall at the far end of the alley: movement on both axes.
    let half = Vec3::new(4.0, 3.5, 0.25);
    let mesh = meshes.add(Cuboid::new(half.x * 2.0, half.y * 2.0, half.z * 2.0));
    let material = materials.add(Color::srgb(0.55, 0.35, 0.3));
    commands.spawn((
        Climbable {
            direction: ClimbDirection::Both,
            stepped: false,
        },
        Transform::from_xyz(0.0, half.y, -26.0),
        RigidBody::Fixed,
        Collider::cuboid(half.x, half.y, half.z),
        Mesh3d(mesh),
        MeshMaterial3d(material),
    ));

    // Ladder next to it: vertical only, snapping to whole rungs.
    let half = Vec3::new(0.5, 3.0, 0.15);
    let mesh = meshes.add(Cuboid::new(half.x * 2.0, half.y * 2.0, half.z * 2.0));
    let material = materials.add(Color::srgb(0.5, 0.42, 0.28));
    commands.spawn((
        Climbable {
            direction: ClimbDirection::Vertical,
            stepped: true,
        },
        Transform::from_xyz(6.0, half.y, -26.0),
        RigidBody::Fixed,
        Collider::cuboid(half.x, half.y, half.z),
        Mesh3d(mesh),
        MeshMaterial3d(material),
    ));
}

fn spawn_ledge_court(
    commands: &mut Commands,
    meshes: &mut ResMut<Assets<Mesh>>,
    materials: &mut ResMut<Assets<StandardMaterial>>,
) {
    // Rising blocks: jump at a face, grab the lip, pull up, repeat.
    for (z, half_height) in [(2.0, 1.1), (-2.0, 1.6), (-6.0, 2.1)] {
        spawn_static_box(
            commands,
            meshes,
            materials,
            Vec3::new(10.0, half_height, z),
            Vec3::new(1.5, half_height, 1.5),
            Color::srgb(0.4, 0.5, 0.3),
        );
    }
}

fn spawn_platform_ride(
    commands: &mut Commands,
    meshes: &mut ResMut<Assets<Mesh>>,
    materials: &mut ResMut<Assets<StandardMaterial>>,
) {
    // Two towers with a drifting platform shuttling between their tops.
    for z in [2.0, 14.0] {
        spawn_static_box(
            commands,
            meshes,
            materials,
            Vec3::new(-12.0, 1.2, z),
            Vec3::new(1.5, 1.2, 1.5),
            Color::srgb(0.35, 0.35, 0.4),
        );
    }

    let origin = Vec3::new(-12.0, 2.6, 8.0);
    let half = Vec3::new(1.5, 0.15, 1.5);
    let mesh = meshes.add(Cuboid::new(half.x * 2.0, half.y * 2.0, half.z * 2.0));
    let material = materials.add(Color::srgb(0.3, 0.55, 0.65));
    commands.spawn((
        // The name prefix is what marks the platform as rideable.
        Name::new("FloatingPlatform.001"),
        PlatformPath {
            origin,
            travel: PLATFORM_TRAVEL,
            period: PLATFORM_PERIOD,
        },
        Transform::from_translation(origin),
        RigidBody::KinematicPositionBased,
        Collider::cuboid(half.x, half.y, half.z),
        Mesh3d(mesh),
        MeshMaterial3d(material),
    ));
}

fn spawn_static_box(
    commands: &mut Commands,
    meshes: &mut ResMut<Assets<Mesh>>,
    materials: &mut ResMut<Assets<StandardMaterial>>,
    position: Vec3,
    half_size: Vec3,
    color: Color,
) {
    let mesh = meshes.add(Cuboid::new(
        half_size.x * 2.0,
        half_size.y * 2.0,
        half_size.z * 2.0,
    ));
    let material = materials.add(color);

    commands.spawn((
        Transform::from_translation(position),
        RigidBody::Fixed,
        Collider::cuboid(half_size.x, half_size.y, half_size.z),
        Mesh3d(mesh),
        MeshMaterial3d(material),
    ));
}

fn spawn_player(
    commands: &mut Commands,
    meshes: &mut ResMut<Assets<Mesh>>,
    materials: &mut ResMut<Assets<StandardMaterial>>,
) -> Entity {
    let config = default_config();

    // Capsule mesh sized to the collider
    let mesh = meshes.add(Capsule3d::new(PLAYER_RADIUS, PLAYER_HALF_HEIGHT * 2.0));
    let material = materials.add(Color::srgb(0.2, 0.6, 0.9));

    commands
        .spawn((
            PlayerControlled,
            Transform::from_translation(spawn_position()),
            Mesh3d(mesh),
            MeshMaterial3d(material),
        ))
        .insert((
            // Character controller; the plugin fills in the rest on the
            // first fixed tick
            CharacterController::new(&config),
            config,
            InputIntent::default(),
        ))
        .insert((
            // Physics
            RapierCharacterBundle::new(),
            Collider::capsule_y(PLAYER_HALF_HEIGHT, PLAYER_RADIUS),
        ))
        .id()
}

// ==================== Moving Platform ====================

/// Ping-pong path for the floating platform.
#[derive(Component)]
struct PlatformPath {
    origin: Vec3,
    travel: Vec3,
    period: f32,
}

fn drive_platforms(time: Res<Time>, mut platforms: Query<(&PlatformPath, &mut Transform)>) {
    for (path, mut transform) in platforms.iter_mut() {
        let phase = (TAU * time.elapsed_secs() / path.period).sin();
        transform.translation = path.origin + path.travel * phase;
    }
}

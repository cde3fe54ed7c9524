//! # `parkour_controller`
//!
//! A parkour-capable 3D character controller with physics backend abstraction.
//!
//! This crate provides a momentum-driven character controller that:
//! - Runs a locomotion state machine (idle, walk, run, sprint and the blend
//!   states between them) behind a transition table
//! - Ramps acceleration over time so direction changes carry momentum
//! - Jumps with variable press time, coyote tolerance and per-axis velocity
//!   clamping
//! - Steps onto the ground with a foot probe, snapping over stair-sized
//!   ledges and pinning on too-steep slopes
//! - Chains prioritized movement-ability plugins (climb, ledge grab,
//!   wall run, wall collision avoidance) that can take over a frame
//! - Rides moving platforms, including their rotation, and carries their
//!   momentum into jumps
//! - Emits animation and sound events instead of touching assets
//! - Abstracts physics access for easy swapping (Rapier 3D included, a
//!   self-contained kinematic backend built in)
//!
//! ## Architecture
//!
//! All control runs on the fixed timestep. One tick walks every character
//! through the chained [`CharacterControllerSet`] stations:
//! 1. **Preparation**: finish freshly spawned characters, turn merged
//!    input into movement scratch
//! 2. **Sensors**: cast the registered probe rays through the backend
//! 3. **Locomotion**: airborne bookkeeping, the acceleration ramp, the
//!    locomotion cascade, animator advance
//! 4. **Plugins**: the ability chain, platform measurement, jump start
//! 5. **Integration**: movement, heading tween, ground step, platform ride
//! 6. **Commit**: the single legality-checked state change of the tick
//! 7. **FinalApplication**: marker sync and the backend's own integration
//!
//! State changes are staged all tick long and committed once at the end;
//! the last writer wins and the [`TransitionTable`](state::TransitionTable)
//! is the gate. Input reading and the cameras run in `Update` at render
//! rate.
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use parkour_controller::prelude::*;
//!
//! // Components a playable character spawns with. The plugin completes
//! // the character on its first fixed tick: transition table, ability
//! // chain, probe rays, stamina, animator.
//! let config = ControllerConfig::player();
//! let controller = CharacterController::new(&config);
//! let intent = InputIntent::default();
//! ```

use bevy::prelude::*;

pub mod animator;
pub mod backend;
pub mod camera;
pub mod chain;
pub mod climb;
pub mod collision;
pub mod config;
pub mod intent;
pub mod kinematic;
pub mod ledge_grab;
pub mod motion;
pub mod rays;
pub mod stamina;
pub mod state;
pub mod systems;
pub mod wall_avoidance;
pub mod wall_run;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::animator::{
        AnimationCommand, AnimatorState, ClipCommand, ClipId, ControllerSound, SoundCue,
    };
    pub use crate::backend::PhysicsBackend;
    pub use crate::camera::{FirstPersonCamera, ThirdPersonCamera};
    pub use crate::chain::{ControlChain, ControlPlugin, PluginContext, PluginEffects};
    pub use crate::climb::{Climb, ClimbDirection, Climbable};
    pub use crate::collision::RayHit;
    pub use crate::config::{CharacterController, ControllerConfig};
    pub use crate::intent::{InputIntent, InputMap, IntentFrame, PlayerControlled};
    pub use crate::kinematic::{BrushCollider, KinematicBackend, KinematicBody};
    pub use crate::ledge_grab::LedgeGrab;
    pub use crate::motion::PlatformTracker;
    pub use crate::rays::{RayId, RaySensors, RaySpec};
    pub use crate::stamina::Stamina;
    pub use crate::state::{
        Airborne, Grounded, MotionState, StateChanged, StateMachineBuilder, TransitionTable,
    };
    pub use crate::wall_avoidance::WallCollisionAvoidance;
    pub use crate::wall_run::WallRun;
    pub use crate::{CharacterControllerPlugin, CharacterControllerSet};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{RapierBackend, RapierCharacterBundle};
}

/// Fixed-step stations of the control pipeline, chained in this order.
///
/// Backend plugins hook their own work into `Preparation` (scene caches)
/// and `FinalApplication` (body integration); applications can order
/// custom systems against any station.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterControllerSet {
    /// Character completion and intent staging.
    Preparation,
    /// Probe ray refresh.
    Sensors,
    /// Airborne bookkeeping, acceleration ramp, locomotion cascade,
    /// animator advance.
    Locomotion,
    /// Ability chain, platform measurement, jump initiation.
    Plugins,
    /// Movement, heading, ground step, platform ride.
    Integration,
    /// The one legality-checked state change of the tick, plus the clips
    /// it triggers.
    Commit,
    /// Marker sync and backend body integration.
    FinalApplication,
}

/// Main plugin for the character controller system.
///
/// Generic over a physics backend `B` that provides raycasts, velocity
/// access, impulses and kinematic switching. The plugin registers the
/// reflected component types, the controller events and the input
/// resources, installs the backend's own plugin, and schedules the fixed
/// pipeline plus the render-rate input and camera systems.
///
/// # Examples
///
/// With the Rapier backend (the application owns the simulation setup):
/// ```rust,no_run
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use parkour_controller::prelude::*;
///
/// App::new()
///     .add_plugins(DefaultPlugins)
///     .add_plugins(RapierPhysicsPlugin::<NoUserData>::default())
///     .add_plugins(CharacterControllerPlugin::<RapierBackend>::default())
///     .run();
/// ```
///
/// Headless with the built-in kinematic backend:
/// ```rust,no_run
/// use bevy::prelude::*;
/// use parkour_controller::prelude::*;
///
/// App::new()
///     .add_plugins(MinimalPlugins)
///     .add_plugins(CharacterControllerPlugin::<KinematicBackend>::default())
///     .run();
/// ```
pub struct CharacterControllerPlugin<B: backend::PhysicsBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::PhysicsBackend> Default for CharacterControllerPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::PhysicsBackend> Plugin for CharacterControllerPlugin<B> {
    fn build(&self, app: &mut App) {
        app.register_type::<config::CharacterController>();
        app.register_type::<config::ControllerConfig>();
        app.register_type::<intent::InputIntent>();
        app.register_type::<intent::PlayerControlled>();
        app.register_type::<stamina::Stamina>();
        app.register_type::<state::MotionState>();
        app.register_type::<state::Grounded>();
        app.register_type::<state::Airborne>();
        app.register_type::<motion::PlatformTracker>();
        app.register_type::<animator::AnimatorState>();
        app.register_type::<camera::ThirdPersonCamera>();
        app.register_type::<camera::FirstPersonCamera>();
        app.register_type::<climb::Climbable>();

        app.add_event::<state::StateChanged>();
        app.add_event::<animator::AnimationCommand>();
        app.add_event::<animator::ControllerSound>();

        app.init_resource::<intent::InputMap>();
        app.init_resource::<intent::GamepadCalibration>();

        // Backend plugin first; it hooks into the sets configured below.
        app.add_plugins(B::plugin());

        app.configure_sets(
            FixedUpdate,
            (
                CharacterControllerSet::Preparation,
                CharacterControllerSet::Sensors,
                CharacterControllerSet::Locomotion,
                CharacterControllerSet::Plugins,
                CharacterControllerSet::Integration,
                CharacterControllerSet::Commit,
                CharacterControllerSet::FinalApplication,
            )
                .chain(),
        );

        app.add_systems(
            FixedUpdate,
            (systems::setup_characters::<B>, systems::consume_intents)
                .chain()
                .in_set(CharacterControllerSet::Preparation),
        );
        app.add_systems(
            FixedUpdate,
            rays::refresh_ray_sensors::<B>.in_set(CharacterControllerSet::Sensors),
        );
        app.add_systems(
            FixedUpdate,
            (
                systems::update_airborne_state::<B>,
                systems::ramp_acceleration,
                systems::stage_locomotion_states,
                animator::advance_animators,
            )
                .chain()
                .in_set(CharacterControllerSet::Locomotion),
        );
        app.add_systems(
            FixedUpdate,
            (
                systems::run_control_chains::<B>,
                systems::track_platform_motion,
                systems::initiate_jumps::<B>,
            )
                .chain()
                .in_set(CharacterControllerSet::Plugins),
        );
        app.add_systems(
            FixedUpdate,
            (systems::integrate_characters::<B>, systems::ride_platforms)
                .chain()
                .in_set(CharacterControllerSet::Integration),
        );
        app.add_systems(
            FixedUpdate,
            (systems::commit_states, animator::apply_state_clips)
                .chain()
                .in_set(CharacterControllerSet::Commit),
        );
        app.add_systems(
            FixedUpdate,
            systems::sync_state_markers.in_set(CharacterControllerSet::FinalApplication),
        );

        // Render-rate side: device reads, the intent merge, then the
        // cameras over the freshly merged look input. The device readers
        // only run when the input plugin provided its resources, so
        // headless apps work unchanged.
        app.add_systems(
            Update,
            (
                (
                    intent::read_keyboard_input.run_if(
                        resource_exists::<ButtonInput<KeyCode>>
                            .and(resource_exists::<ButtonInput<MouseButton>>),
                    ),
                    intent::read_gamepad_input,
                ),
                intent::merge_input_intents,
                (
                    camera::update_third_person_cameras::<B>,
                    camera::update_first_person_cameras,
                ),
                camera::shake_on_landing,
            )
                .chain(),
        );
    }
}

//! Controller configuration and the central character state component.
//!
//! This module defines the tuning parameters for the character controller
//! (locomotion, stamina, jumping, stepping, the probe distances of the
//! ability plugins) and the [`CharacterController`] hub component that the
//! fixed-step pipeline reads and writes.

use bevy::prelude::*;

use crate::collision::RayHit;
use crate::state::MotionState;

#[cfg(feature = "serialize")]
fn default_platform_prefix() -> &'static str {
    ControllerConfig::default().platform_name_prefix
}

/// Configuration parameters for the character controller.
///
/// Probe lengths for ledges and climb exits are DERIVED from the character
/// dimensions (`height`, `radius`) through the accessor methods, so resizing
/// the character keeps the ability probes proportional.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ControllerConfig {
    // === Character Dimensions ===
    /// Character height in world units. Probe heights derive from this.
    pub height: f32,
    /// Character capsule radius. Defaults to `height / 4`.
    pub radius: f32,
    /// Rigid body mass, used by the physics bundles.
    pub mass: f32,

    // === Locomotion Ramp ===
    /// Acceleration ramp rate while in a walk state (units/second).
    pub walk_accel_rate: f32,
    /// Acceleration ramp rate while in a run state (units/second).
    pub run_accel_rate: f32,
    /// Acceleration ramp rate while in a sprint state (units/second).
    pub sprint_accel_rate: f32,
    /// Deceleration rate when input stops (units/second).
    pub decel_rate: f32,
    /// Acceleration ceiling in walk states.
    pub max_accel_walk: f32,
    /// Acceleration ceiling in run states.
    pub max_accel_run: f32,
    /// Acceleration ceiling in sprint states.
    pub max_accel_sprint: f32,
    /// Base movement speed. Per-step travel is `speed * current_accel * dt`.
    pub speed: f32,
    /// Minimum airborne drift speed (units/second), so a character that
    /// jumped from standstill can still be steered.
    pub speed_airborne: f32,
    /// Seconds for the character to turn toward a new heading.
    pub turn_smooth_time: f32,
    /// Drive movement in first person style: forward component only, body
    /// yaw from the camera.
    pub first_person: bool,

    // === Stamina ===
    /// Stamina ceiling.
    pub max_stamina: f32,
    /// After stamina fully drains, sprinting stays unavailable until the
    /// value recovers above this threshold.
    pub min_stamina: f32,
    /// Stamina drain while sprinting (units/second).
    pub stamina_usage_per_sec: f32,
    /// Stamina recovery while idling (units/second).
    pub stamina_recover_idle: f32,
    /// Stamina recovery while walking (units/second).
    pub stamina_recover_walk: f32,
    /// Stamina recovery while running (units/second).
    pub stamina_recover_run: f32,

    // === Stepping ===
    /// How far below the feet the foot ray still counts as ground.
    pub step_height: f32,
    /// Surface tilt (degrees) up to which an idle character holds its
    /// position without assistance. Beyond it, fly mode pins the character
    /// in place instead of snapping.
    pub slip_free_angle_deg: f32,

    // === Jumping ===
    /// Master switch for jumping.
    pub jump_enabled: bool,
    /// Scales the whole jump impulse vector.
    pub jump_strength: f32,
    /// Base vertical component of the jump impulse.
    pub phys_jump_strength: f32,
    /// Scales how much forward drive carries into the jump.
    pub jump_forward_force_mult: f32,
    /// Per-axis velocity clamp applied after the jump impulse (x: lateral,
    /// y: up, z: forward), preventing runaway speeds from stacked impulses.
    pub max_jump_force: Vec3,
    /// Longest press that still counts as the same jump.
    pub max_jump_press_time: f32,
    /// Presses shorter than this are stretched to it.
    pub min_jump_press_time: f32,
    /// Coyote window: a jump is still accepted this many seconds after the
    /// ground was lost.
    pub jump_allow_after_fall_time: f32,
    /// Multiplier on the restored acceleration when landing with a movement
    /// key held.
    pub jump_accel_multiplier: f32,
    /// Deceleration multiplier while airborne.
    pub jump_airborne_decel_multiplier: f32,
    /// Airborne time after which the Fall state is forced.
    pub start_fall_time: f32,

    // === Forward Wall Check ===
    /// Length of the forward obstruction probe.
    pub forward_check_distance: f32,
    /// Minimum forward speed the obstruction slowdown decelerates to.
    pub forward_min_speed_to_stop: f32,
    /// Walls tilted at least this steeply (degrees from horizontal) count
    /// as runnable walls.
    pub min_wall_angle_deg: f32,

    // === Wall Run ===
    /// Master switch for wall running.
    pub wall_run_enabled: bool,
    /// Forward wall probe length.
    pub wall_run_forward_check_distance: f32,
    /// Side wall probe length.
    pub wall_run_sideward_check_distance: f32,
    /// Upward drive speed along the wall.
    pub wall_run_speed: f32,
    /// Upward speed ceiling along the wall.
    pub wall_run_max_speed: f32,
    /// Forward speed multiplier while wall running.
    pub wall_run_forward_speed_multiplier: f32,
    /// Jump strength while kicking off a wall.
    pub wall_run_off_jump_strength: f32,
    /// Kick-off direction when running up a front wall (local space,
    /// `-Z` forward): a slight backward nudge so the character detaches.
    pub wall_run_up_jump_direction: Vec3,
    /// Kick-off direction carrying momentum forward off a side wall.
    pub wall_run_forward_jump_direction: Vec3,
    /// Kick-off direction off a wall on the left (pushes away from it).
    pub wall_run_left_jump_direction: Vec3,
    /// Kick-off direction off a wall on the right (pushes away from it).
    pub wall_run_right_jump_direction: Vec3,
    /// A fall longer than this may transition straight back into a wall
    /// run off the same wall.
    pub wall_run_min_fall_time: f32,

    // === Ledge Grab ===
    /// Sideward shimmy speed while hanging.
    pub ledge_sideward_move_speed: f32,

    // === Climbing ===
    /// Forward probe length for climbable surfaces.
    pub climb_forward_check_distance: f32,
    /// Sideward climb speed.
    pub climb_sideward_move_speed: f32,
    /// Vertical climb speed.
    pub climb_vertical_move_speed: f32,
    /// Climb speed multiplier while the sprint input is held.
    pub climb_sprint_multiplier: f32,
    /// Rung spacing for climbable surfaces marked as stepped.
    pub climb_step_height: f32,

    // === Moving Platforms ===
    /// Scene entities whose `Name` starts with this prefix are treated as
    /// moving platforms.
    #[cfg_attr(
        feature = "serialize",
        serde(skip, default = "default_platform_prefix")
    )]
    pub platform_name_prefix: &'static str,
    /// Rotate the character with the platform it stands on.
    pub respect_platform_rotation: bool,
    /// Add the platform velocity to jump impulses.
    pub platform_movement_affects_jump: bool,

    // === Animation Blending ===
    /// Crossfade length into the walk clip.
    pub enter_walk_duration: f32,
    /// Crossfade length into the run clip.
    pub enter_run_duration: f32,
    /// Crossfade length into the sprint clip.
    pub enter_sprint_duration: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let height = 1.863;
        Self {
            // Character dimensions
            height,
            radius: height / 4.0,
            mass: 210.0,

            // Locomotion ramp
            walk_accel_rate: 10.0,
            run_accel_rate: 19.0,
            sprint_accel_rate: 25.0,
            decel_rate: 30.0,
            max_accel_walk: 5.0,
            max_accel_run: 10.0,
            max_accel_sprint: 15.0,
            speed: 0.7,
            speed_airborne: 3.4,
            turn_smooth_time: 0.1,
            first_person: false,

            // Stamina
            max_stamina: 100.0,
            min_stamina: 50.0,
            stamina_usage_per_sec: 25.0,
            stamina_recover_idle: 15.0,
            stamina_recover_walk: 10.0,
            stamina_recover_run: 5.0,

            // Stepping
            step_height: 0.27,
            slip_free_angle_deg: 30.0,

            // Jumping
            jump_enabled: true,
            jump_strength: 5.0,
            phys_jump_strength: 10.0,
            jump_forward_force_mult: 1.0,
            max_jump_force: Vec3::new(4.0, 6.0, 4.0),
            max_jump_press_time: 1.10,
            min_jump_press_time: 0.1,
            jump_allow_after_fall_time: 0.2,
            jump_accel_multiplier: 1.0,
            jump_airborne_decel_multiplier: 0.25,
            start_fall_time: 1.10,

            // Forward wall check
            forward_check_distance: 2.0,
            forward_min_speed_to_stop: 2.0,
            min_wall_angle_deg: 75.0,

            // Wall run
            wall_run_enabled: true,
            wall_run_forward_check_distance: 1.25,
            wall_run_sideward_check_distance: 1.25,
            wall_run_speed: 2.5,
            wall_run_max_speed: 5.0,
            wall_run_forward_speed_multiplier: 2.0,
            wall_run_off_jump_strength: 5.0,
            wall_run_up_jump_direction: Vec3::new(0.0, 0.0, 0.05),
            wall_run_forward_jump_direction: Vec3::new(0.0, 0.0, -2.0),
            wall_run_left_jump_direction: Vec3::new(2.0, 0.0, 0.0),
            wall_run_right_jump_direction: Vec3::new(-2.0, 0.0, 0.0),
            wall_run_min_fall_time: 1.5,

            // Ledge grab
            ledge_sideward_move_speed: 2.5,

            // Climbing
            climb_forward_check_distance: 1.25,
            climb_sideward_move_speed: 0.8,
            climb_vertical_move_speed: 0.8,
            climb_sprint_multiplier: 2.0,
            climb_step_height: 0.4,

            // Moving platforms
            platform_name_prefix: "FloatingPlatform",
            respect_platform_rotation: true,
            platform_movement_affects_jump: true,

            // Animation blending
            enter_walk_duration: 0.5,
            enter_run_duration: 0.5,
            enter_sprint_duration: 1.0,
        }
    }
}

impl ControllerConfig {
    /// Acceleration ceiling for the given locomotion family.
    pub fn max_accel_for(&self, state: MotionState) -> f32 {
        if state.is_sprint_state() {
            self.max_accel_sprint
        } else if state.is_walk_state() {
            self.max_accel_walk
        } else {
            self.max_accel_run
        }
    }

    /// Acceleration ramp rate for the given locomotion family.
    pub fn accel_rate_for(&self, state: MotionState) -> f32 {
        if state.is_sprint_state() {
            self.sprint_accel_rate
        } else if state.is_walk_state() {
            self.walk_accel_rate
        } else {
            self.run_accel_rate
        }
    }

    /// Forward distance at which the obstruction check halts the character
    /// entirely.
    #[inline]
    pub fn forward_stop_distance(&self) -> f32 {
        self.radius + 0.15
    }

    /// Upper end of the ledge probe segment.
    #[inline]
    pub fn ledge_top_check_height(&self) -> f32 {
        self.height + self.height / 3.0
    }

    /// Lower end of the ledge probe segment.
    #[inline]
    pub fn ledge_bottom_check_height(&self) -> f32 {
        self.height * 0.5
    }

    /// Forward distance of the ledge probe.
    #[inline]
    pub fn ledge_forward_check_distance(&self) -> f32 {
        self.radius * 1.3
    }

    /// Forward travel of the ledge pull-up.
    #[inline]
    pub fn ledge_pull_up_distance(&self) -> f32 {
        self.radius * 1.3
    }

    /// Hanging height below the ledge lip.
    #[inline]
    pub fn ledge_attach_height(&self) -> f32 {
        self.height * 1.3
    }

    /// Forward travel when exiting a climb over the top edge.
    #[inline]
    pub fn climb_exit_up_distance(&self) -> f32 {
        self.radius * 1.3
    }

    /// Upper end of the climb probe segment.
    #[inline]
    pub fn climb_top_check_height(&self) -> f32 {
        self.height + self.height / 3.0
    }

    /// Lower end of the climb probe segment.
    #[inline]
    pub fn climb_bottom_check_height(&self) -> f32 {
        self.height * 0.5
    }

    /// Config tuned for a player character (the defaults).
    pub fn player() -> Self {
        Self::default()
    }

    /// Config for AI-driven characters: no sprint reserve management and no
    /// wall runs, slightly softer ramp.
    pub fn ai() -> Self {
        Self {
            sprint_accel_rate: 19.0,
            max_accel_sprint: 10.0,
            stamina_usage_per_sec: 0.0,
            wall_run_enabled: false,
            ..default()
        }
    }

    /// Builder: set character height, keeping the radius proportional.
    pub fn with_height(mut self, height: f32) -> Self {
        self.height = height;
        self.radius = height / 4.0;
        self
    }

    /// Builder: set the capsule radius independently of the height.
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    /// Builder: set the step height.
    pub fn with_step_height(mut self, step_height: f32) -> Self {
        self.step_height = step_height;
        self
    }

    /// Builder: set jump strength.
    pub fn with_jump_strength(mut self, strength: f32) -> Self {
        self.jump_strength = strength;
        self
    }

    /// Builder: enable or disable jumping.
    pub fn with_jump_enabled(mut self, enabled: bool) -> Self {
        self.jump_enabled = enabled;
        self
    }

    /// Builder: set the coyote window for late jumps.
    pub fn with_jump_allow_after_fall_time(mut self, time: f32) -> Self {
        self.jump_allow_after_fall_time = time;
        self
    }

    /// Builder: set stamina bounds.
    pub fn with_stamina(mut self, max: f32, min: f32) -> Self {
        self.max_stamina = max;
        self.min_stamina = min;
        self
    }

    /// Builder: set the acceleration ceilings for walk/run/sprint.
    pub fn with_accel_ceilings(mut self, walk: f32, run: f32, sprint: f32) -> Self {
        self.max_accel_walk = walk;
        self.max_accel_run = run;
        self.max_accel_sprint = sprint;
        self
    }

    /// Builder: set the slip-free angle in degrees.
    pub fn with_slip_free_angle_deg(mut self, angle: f32) -> Self {
        self.slip_free_angle_deg = angle;
        self
    }

    /// Builder: enable or disable wall running.
    pub fn with_wall_run_enabled(mut self, enabled: bool) -> Self {
        self.wall_run_enabled = enabled;
        self
    }

    /// Builder: set the moving platform name prefix.
    pub fn with_platform_prefix(mut self, prefix: &'static str) -> Self {
        self.platform_name_prefix = prefix;
        self
    }

    /// Builder: switch to first person movement.
    pub fn with_first_person(mut self, first_person: bool) -> Self {
        self.first_person = first_person;
        self
    }
}

/// Core character controller component.
///
/// This is the **central hub** for all per-character state the fixed-step
/// pipeline works on: the committed motion state, the staged transition
/// request, the acceleration ramp, airborne bookkeeping, the merged movement
/// intent and the per-frame movement scratch.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct CharacterController {
    // === Motion State ===
    /// Currently committed motion state.
    pub state: MotionState,
    /// Transition request staged for this frame's commit.
    ///
    /// Last write wins: a later writer in the frame replaces an earlier one.
    /// The plugin chain runs in ascending priority order, so among plugins
    /// the highest priority number decides.
    pub requested_state: Option<MotionState>,

    // === Acceleration Ramp ===
    /// Current acceleration value, always within `[0, max_accel]`.
    pub current_accel: f32,
    /// Acceleration ceiling for the current state family. Reset to the run
    /// ceiling at the top of every frame, then narrowed by the locomotion
    /// pass.
    pub max_accel: f32,

    // === Airborne / Jump Bookkeeping ===
    /// Whether the last step left the character without ground contact.
    pub is_airborne: bool,
    /// Seconds since ground contact was lost.
    pub fall_time: f32,
    /// Seconds the current jump press has been held.
    pub jump_press_time: f32,
    /// Jump staged for this frame.
    pub(crate) jump_requested: bool,
    /// First jump since the last landing; forward drive only carries into
    /// the first one.
    pub(crate) first_jump: bool,
    /// A jump impulse chain is active. Set at jump initiation, cleared by
    /// the landing reset.
    pub(crate) was_jumping: bool,
    /// State the character was in when the jump started.
    pub pre_jump_state: MotionState,
    /// Acceleration when the jump started, restored on landing.
    pub(crate) pre_jump_accel: f32,
    /// Extra local-space jump direction, set by ability plugins for wall
    /// kick-offs. Zero for plain jumps.
    pub jump_direction: Vec3,
    /// Scale of the next jump impulse. Restored from the config after every
    /// jump; plugins override it for special kick-offs.
    pub jump_strength: f32,
    /// Downward speed measured at the landing moment, drives the camera
    /// shake strength.
    pub landing_speed: f32,
    /// Side of the wall the active wall run clings to; drives the
    /// animation clip choice.
    pub wall_run_side: crate::wall_run::WallSide,

    // === Movement Intent ===
    /// Merged movement intent: `x` right, `z` forward (forward = -1).
    /// Climbing reads the forward axis as up/down.
    pub move_direction: Vec3,
    /// Whether the character carried acceleration into this frame. Grounded
    /// frames with held movement input force it on.
    pub(crate) is_moving: bool,
    /// Translation to apply this frame, in character-local units.
    pub(crate) update_speed: Vec3,
    /// World yaw (radians) the character should turn toward this frame.
    /// `None` keeps the current heading.
    pub(crate) target_heading: Option<f32>,

    // === Ground Contact ===
    /// Foot ray result from the last step.
    #[reflect(ignore)]
    pub ground: Option<RayHit>,
    /// Whether the last step reported ground contact.
    pub(crate) grounded: bool,

    // === Moving Platform ===
    /// Platform root entity the character currently rides.
    pub active_platform: Option<Entity>,

    // === Fly Mode ===
    /// Physics influence disabled; the character moves purely kinematically
    /// (flying ability states, slip prevention).
    pub(crate) fly_mode: bool,

    // === Internal ===
    /// Distance from the character origin to the collider bottom.
    pub(crate) collider_bottom_offset: f32,
}

impl Default for CharacterController {
    fn default() -> Self {
        let config = ControllerConfig::default();
        Self {
            // Motion state
            state: MotionState::Idle,
            requested_state: None,
            // Acceleration ramp
            current_accel: 0.0,
            max_accel: config.max_accel_run,
            // Airborne bookkeeping
            is_airborne: false,
            fall_time: 0.0,
            jump_press_time: 0.0,
            jump_requested: false,
            first_jump: true,
            was_jumping: false,
            pre_jump_state: MotionState::Idle,
            pre_jump_accel: 0.0,
            jump_direction: Vec3::ZERO,
            jump_strength: config.jump_strength,
            landing_speed: 0.0,
            wall_run_side: crate::wall_run::WallSide::default(),
            // Movement intent
            move_direction: Vec3::ZERO,
            is_moving: false,
            update_speed: Vec3::ZERO,
            target_heading: None,
            // Ground contact
            ground: None,
            grounded: false,
            // Platform
            active_platform: None,
            // Fly mode
            fly_mode: false,
            // Internal
            collider_bottom_offset: 0.0,
        }
    }
}

impl CharacterController {
    /// Create a controller hub matching the given config.
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            max_accel: config.max_accel_run,
            jump_strength: config.jump_strength,
            ..default()
        }
    }

    /// Stage a transition request. Does nothing when the character is
    /// already in the requested state. Last write wins.
    pub fn request_state(&mut self, state: MotionState) {
        if self.state != state {
            self.requested_state = Some(state);
        }
    }

    /// Drop the staged transition request.
    pub fn clear_request(&mut self) {
        self.requested_state = None;
    }

    /// Whether a transition request is staged.
    pub fn has_request(&self) -> bool {
        self.requested_state.is_some()
    }

    /// Whether the last step reported ground contact.
    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    /// Ground normal from the last foot contact, world up when airborne.
    pub fn ground_normal(&self) -> Vec3 {
        self.ground.map(|g| g.normal).unwrap_or(Vec3::Y)
    }

    /// Entity the character stands on, if any.
    pub fn ground_entity(&self) -> Option<Entity> {
        self.ground.map(|g| g.entity)
    }

    /// Whether physics influence is currently disabled.
    pub fn is_fly_mode(&self) -> bool {
        self.fly_mode
    }

    /// Whether movement input is present this frame.
    pub fn has_move_input(&self) -> bool {
        self.move_direction.length_squared() > f32::EPSILON
    }

    /// Landing bookkeeping: clears the airborne and jump scratch, restores
    /// the pre-jump acceleration (scaled, and only while movement input is
    /// still held), and resets the jump impulse parameters to the config
    /// values. The caller zeroes the body velocity separately when ground
    /// contact warrants it.
    pub(crate) fn reset_after_jump(&mut self, config: &ControllerConfig) {
        self.is_airborne = false;
        self.fall_time = 0.0;
        self.jump_press_time = 0.0;
        self.first_jump = true;
        if self.was_jumping {
            self.was_jumping = false;
            self.current_accel = if self.has_move_input() {
                self.pre_jump_accel * config.jump_accel_multiplier
            } else {
                0.0
            };
        }
        self.jump_strength = config.jump_strength;
        self.jump_direction = Vec3::ZERO;
    }

    /// Reset the per-frame scratch. Called at the top of every fixed step.
    pub(crate) fn reset_frame_state(&mut self, config: &ControllerConfig) {
        self.max_accel = config.max_accel_run;
        self.is_moving = self.current_accel > 0.0;
        self.move_direction = Vec3::ZERO;
        self.update_speed = Vec3::ZERO;
        self.target_heading = None;
        self.requested_state = None;
        self.jump_requested = false;
    }
}

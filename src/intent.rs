//! Input reading and intent merging.
//!
//! Several sources can feed a character at once (keyboard, one or more
//! gamepads, AI writers). Each source stages an [`IntentFrame`]; the merge
//! system collapses them into the [`InputIntent`] component the fixed-step
//! loop reads. Axes take the per-axis maximum magnitude across sources,
//! action buttons are ORed, so a gamepad nudge never cancels a held key.
//!
//! Movement intent is camera-relative: `x` is right, `z` is forward with
//! forward = -1 (Bevy's `-Z` forward).

use std::collections::HashMap;

use bevy::prelude::*;

/// One input source's reading for the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntentFrame {
    /// Movement axes, `x` right, `z` forward = -1.
    pub movement: Vec3,
    /// Camera axes, `x` yaw right, `y` pitch up, range [-1, 1].
    pub camera: Vec2,
    pub jump: bool,
    pub sprint: bool,
    pub walk: bool,
    /// Context interaction hold: wall run, ledge grab, climb.
    pub intel_action: bool,
    /// Pull up over a grabbed ledge.
    pub pull_up: bool,
    pub center_camera: bool,
}

impl IntentFrame {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Merged input view for one character.
///
/// Sources stage frames during `Update`; [`merge_input_intents`] collapses
/// them afterwards. With no staged frame the previous merged values are
/// kept, so held buttons survive frames without fresh reads.
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct InputIntent {
    pub movement: Vec3,
    pub camera: Vec2,
    pub jump: bool,
    pub sprint: bool,
    pub walk: bool,
    pub intel_action: bool,
    pub pull_up: bool,
    pub center_camera: bool,
    #[reflect(ignore)]
    staged: Vec<IntentFrame>,
}

impl InputIntent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage one source's frame for the next merge.
    pub fn push_frame(&mut self, frame: IntentFrame) {
        self.staged.push(frame);
    }

    /// Collapse staged frames into the merged view.
    pub fn merge(&mut self) {
        if self.staged.is_empty() {
            return;
        }
        let mut movement = Vec3::ZERO;
        let mut camera = Vec2::ZERO;
        let mut jump = false;
        let mut sprint = false;
        let mut walk = false;
        let mut intel_action = false;
        let mut pull_up = false;
        let mut center_camera = false;
        for frame in self.staged.drain(..) {
            movement.x = max_magnitude(movement.x, frame.movement.x);
            movement.y = max_magnitude(movement.y, frame.movement.y);
            movement.z = max_magnitude(movement.z, frame.movement.z);
            camera.x = max_magnitude(camera.x, frame.camera.x);
            camera.y = max_magnitude(camera.y, frame.camera.y);
            jump |= frame.jump;
            sprint |= frame.sprint;
            walk |= frame.walk;
            intel_action |= frame.intel_action;
            pull_up |= frame.pull_up;
            center_camera |= frame.center_camera;
        }
        self.movement = movement;
        self.camera = camera;
        self.jump = jump;
        self.sprint = sprint;
        self.walk = walk;
        self.intel_action = intel_action;
        self.pull_up = pull_up;
        self.center_camera = center_camera;
    }

    pub fn is_moving(&self) -> bool {
        self.movement.length_squared() > f32::EPSILON
    }

    /// Drop everything, merged view included.
    pub fn clear(&mut self) {
        self.staged.clear();
        self.movement = Vec3::ZERO;
        self.camera = Vec2::ZERO;
        self.jump = false;
        self.sprint = false;
        self.walk = false;
        self.intel_action = false;
        self.pull_up = false;
        self.center_camera = false;
    }
}

/// Marker for characters driven by the device reader systems.
///
/// AI characters skip the marker and get their [`InputIntent`] written by
/// game systems instead.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct PlayerControlled;

fn max_magnitude(a: f32, b: f32) -> f32 {
    if b.abs() > a.abs() {
        b
    } else {
        a
    }
}

/// Action bindings for the built-in device readers.
///
/// Every action can carry several keys; any of them counts as pressed.
#[derive(Resource, Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct InputMap {
    pub forward: Vec<KeyCode>,
    pub backward: Vec<KeyCode>,
    pub left: Vec<KeyCode>,
    pub right: Vec<KeyCode>,
    pub camera_up: Vec<KeyCode>,
    pub camera_down: Vec<KeyCode>,
    pub camera_left: Vec<KeyCode>,
    pub camera_right: Vec<KeyCode>,
    pub jump: Vec<KeyCode>,
    pub sprint: Vec<KeyCode>,
    pub walk: Vec<KeyCode>,
    pub center_camera: Vec<KeyCode>,
    pub intel_action: Vec<KeyCode>,
    pub intel_action_mouse: Vec<MouseButton>,
    pub pull_up: Vec<KeyCode>,
    pub pull_up_mouse: Vec<MouseButton>,

    pub pad_jump: GamepadButton,
    pub pad_sprint: GamepadButton,
    pub pad_walk: GamepadButton,
    pub pad_intel_action: GamepadButton,
    pub pad_pull_up: GamepadButton,
    pub pad_center_camera: GamepadButton,
    pub pad_recalibrate: GamepadButton,

    /// Stick readings below this magnitude, after calibration, are zero.
    pub deadzone: f32,
}

impl Default for InputMap {
    fn default() -> Self {
        Self {
            forward: vec![KeyCode::KeyW],
            backward: vec![KeyCode::KeyS],
            left: vec![KeyCode::KeyA],
            right: vec![KeyCode::KeyD],
            camera_up: vec![KeyCode::PageUp],
            camera_down: vec![KeyCode::End],
            camera_left: vec![KeyCode::Delete],
            camera_right: vec![KeyCode::PageDown],
            jump: vec![KeyCode::Space],
            sprint: vec![KeyCode::ShiftLeft, KeyCode::ShiftRight],
            walk: vec![KeyCode::ControlLeft, KeyCode::ControlRight],
            center_camera: vec![KeyCode::Home],
            intel_action: vec![],
            intel_action_mouse: vec![MouseButton::Left],
            pull_up: vec![],
            pull_up_mouse: vec![MouseButton::Left],

            pad_jump: GamepadButton::South,
            pad_sprint: GamepadButton::RightTrigger2,
            pad_walk: GamepadButton::LeftTrigger,
            pad_intel_action: GamepadButton::East,
            pad_pull_up: GamepadButton::South,
            pad_center_camera: GamepadButton::RightTrigger,
            pad_recalibrate: GamepadButton::Select,

            deadzone: 0.1,
        }
    }
}

impl InputMap {
    fn any_pressed(&self, keys: &ButtonInput<KeyCode>, bindings: &[KeyCode]) -> bool {
        bindings.iter().any(|key| keys.pressed(*key))
    }

    fn any_mouse_pressed(
        &self,
        buttons: &ButtonInput<MouseButton>,
        bindings: &[MouseButton],
    ) -> bool {
        bindings.iter().any(|button| buttons.pressed(*button))
    }

    /// Build the keyboard/mouse frame from current button state.
    pub fn keyboard_frame(
        &self,
        keys: &ButtonInput<KeyCode>,
        mouse: &ButtonInput<MouseButton>,
    ) -> IntentFrame {
        let mut movement = Vec3::ZERO;
        // Forward wins over backward, left over right, when both are held.
        if self.any_pressed(keys, &self.forward) {
            movement.z = -1.0;
        } else if self.any_pressed(keys, &self.backward) {
            movement.z = 1.0;
        }
        if self.any_pressed(keys, &self.left) {
            movement.x = -1.0;
        } else if self.any_pressed(keys, &self.right) {
            movement.x = 1.0;
        }

        let mut camera = Vec2::ZERO;
        if self.any_pressed(keys, &self.camera_right) {
            camera.x += 1.0;
        }
        if self.any_pressed(keys, &self.camera_left) {
            camera.x -= 1.0;
        }
        if self.any_pressed(keys, &self.camera_up) {
            camera.y += 1.0;
        }
        if self.any_pressed(keys, &self.camera_down) {
            camera.y -= 1.0;
        }

        IntentFrame {
            movement,
            camera,
            jump: self.any_pressed(keys, &self.jump),
            sprint: self.any_pressed(keys, &self.sprint),
            walk: self.any_pressed(keys, &self.walk),
            intel_action: self.any_pressed(keys, &self.intel_action)
                || self.any_mouse_pressed(mouse, &self.intel_action_mouse),
            pull_up: self.any_pressed(keys, &self.pull_up)
                || self.any_mouse_pressed(mouse, &self.pull_up_mouse),
            center_camera: self.any_pressed(keys, &self.center_camera),
        }
    }
}

/// Resting-pose centers for one gamepad's sticks.
#[derive(Debug, Clone, Copy, Default)]
pub struct StickCenters {
    pub left: Vec2,
    pub right: Vec2,
}

/// Per-gamepad axis calibration, captured on the recalibrate action.
#[derive(Resource, Debug, Clone, Default)]
pub struct GamepadCalibration {
    centers: HashMap<Entity, StickCenters>,
}

impl GamepadCalibration {
    pub fn centers(&self, gamepad: Entity) -> StickCenters {
        self.centers.get(&gamepad).copied().unwrap_or_default()
    }

    pub fn set_centers(&mut self, gamepad: Entity, centers: StickCenters) {
        self.centers.insert(gamepad, centers);
    }
}

/// Shift a raw axis reading by its calibration center and cut the deadzone.
pub fn apply_deadzone(raw: f32, center: f32, deadzone: f32) -> f32 {
    let value = raw - center;
    if value.abs() < deadzone {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Stages the keyboard/mouse frame on every player-controlled character.
pub fn read_keyboard_input(
    map: Res<InputMap>,
    keys: Res<ButtonInput<KeyCode>>,
    mouse: Res<ButtonInput<MouseButton>>,
    mut intents: Query<&mut InputIntent, With<PlayerControlled>>,
) {
    let frame = map.keyboard_frame(&keys, &mouse);
    for mut intent in &mut intents {
        intent.push_frame(frame);
    }
}

/// Stages one frame per connected gamepad on every player-controlled
/// character, applying calibration and deadzone to the sticks.
pub fn read_gamepad_input(
    map: Res<InputMap>,
    mut calibration: ResMut<GamepadCalibration>,
    gamepads: Query<(Entity, &Gamepad)>,
    mut intents: Query<&mut InputIntent, With<PlayerControlled>>,
) {
    for (entity, gamepad) in &gamepads {
        let left = Vec2::new(
            gamepad.get(GamepadAxis::LeftStickX).unwrap_or(0.0),
            gamepad.get(GamepadAxis::LeftStickY).unwrap_or(0.0),
        );
        let right = Vec2::new(
            gamepad.get(GamepadAxis::RightStickX).unwrap_or(0.0),
            gamepad.get(GamepadAxis::RightStickY).unwrap_or(0.0),
        );

        if gamepad.just_pressed(map.pad_recalibrate) {
            calibration.set_centers(entity, StickCenters { left, right });
        }
        let centers = calibration.centers(entity);

        // Stick up is forward, forward is -Z.
        let movement = Vec3::new(
            apply_deadzone(left.x, centers.left.x, map.deadzone),
            0.0,
            -apply_deadzone(left.y, centers.left.y, map.deadzone),
        );
        let camera = Vec2::new(
            apply_deadzone(right.x, centers.right.x, map.deadzone),
            apply_deadzone(right.y, centers.right.y, map.deadzone),
        );

        let frame = IntentFrame {
            movement,
            camera,
            jump: gamepad.pressed(map.pad_jump),
            sprint: gamepad.pressed(map.pad_sprint),
            walk: gamepad.pressed(map.pad_walk),
            intel_action: gamepad.pressed(map.pad_intel_action),
            pull_up: gamepad.pressed(map.pad_pull_up),
            center_camera: gamepad.pressed(map.pad_center_camera),
        };
        if frame.is_empty() {
            continue;
        }
        for mut intent in &mut intents {
            intent.push_frame(frame);
        }
    }
}

/// Collapses the staged frames on every character.
pub fn merge_input_intents(mut intents: Query<&mut InputIntent>) {
    for mut intent in &mut intents {
        intent.merge();
    }
}

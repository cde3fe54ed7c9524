//! Sprint stamina pool with refill hysteresis.
//!
//! Sprinting drains the pool while the character is grounded, moving, and
//! in a sprint state; ability plugins can add their own drains (sprint
//! climbing does). Once the pool empties, sprinting stays locked until
//! recovery lifts the value past `min_stamina`, so the sprint gate cannot
//! flicker at the zero boundary.

use bevy::prelude::*;

use crate::config::ControllerConfig;
use crate::state::MotionState;

/// Per-character stamina pool.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Stamina {
    /// Current pool value, kept within `[0, max_stamina]`.
    pub value: f32,
    was_empty: bool,
}

impl Default for Stamina {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl Stamina {
    /// A full pool.
    pub fn new(max: f32) -> Self {
        Self {
            value: max,
            was_empty: false,
        }
    }

    /// Whether the sprint gate is open.
    ///
    /// Closed while the pool is empty and stays closed until recovery
    /// passes the refill threshold.
    pub fn can_sprint(&self) -> bool {
        self.value > 0.0 && !self.was_empty
    }

    /// Whether the base sprint drain applies this frame. Plugins can force
    /// a drain on top of this through their stamina hook.
    pub fn sprint_drains(
        &self,
        state: MotionState,
        airborne: bool,
        sprint_held: bool,
        moving: bool,
    ) -> bool {
        state.is_sprint_state() && !airborne && sprint_held && self.can_sprint() && moving
    }

    /// Advance the pool by one fixed step.
    pub fn update(&mut self, draining: bool, state: MotionState, config: &ControllerConfig, dt: f32) {
        if draining {
            self.value -= config.stamina_usage_per_sec * dt;
            if self.value <= 0.0 {
                self.value = 0.0;
                self.was_empty = true;
            }
        } else if self.value < config.max_stamina {
            self.value += Self::recover_rate(state, config) * dt;
            if self.value > config.max_stamina {
                self.value = config.max_stamina;
            }
            if self.value > config.min_stamina {
                self.was_empty = false;
            }
        }
    }

    /// Recovery rate for the current state. Standing still and falling
    /// refill fastest, the walk family at the middle rate, everything else
    /// at the run rate.
    fn recover_rate(state: MotionState, config: &ControllerConfig) -> f32 {
        if matches!(state, MotionState::Idle | MotionState::Fall) {
            config.stamina_recover_idle
        } else if state.is_walk_state() {
            config.stamina_recover_walk
        } else {
            config.stamina_recover_run
        }
    }
}

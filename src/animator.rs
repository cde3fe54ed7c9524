//! Animation timing and cue events.
//!
//! The crate never loads clip assets. It owns the blend *timing*: which
//! clip slot is active, which crossfade or one-shot is in flight and at
//! what play rate, and emits [`AnimationCommand`] and [`ControllerSound`]
//! events the application binds to an actual rig and sound bed.
//!
//! The animator also closes the state-machine loop: transitional states
//! (`IdleToWalk`, `RunToWallRun`, ...) exist so a blend can play, and once
//! that blend or one-shot completes the animator requests the settled pose
//! through the regular transition table. A settle staged while another
//! request is pending is retried the next tick; one whose source state has
//! moved on is dropped.

use std::collections::HashMap;

use bevy::prelude::*;

use crate::config::{CharacterController, ControllerConfig};
use crate::intent::InputIntent;
use crate::stamina::Stamina;
use crate::state::{MotionState, StateChanged, TransitionTable};
use crate::wall_run::WallSide;

/// Assumed length of a one-shot clip the application has not reported a
/// length for.
const ONE_SHOT_FALLBACK: f32 = 0.5;

/// Clip slot of the character rig. The application maps each slot to an
/// actual animation asset.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ClipId {
    Idle,
    Walk,
    Run,
    Sprint,
    /// Takeoff, played once; the rig holds its last frame while airborne.
    JumpStart,
    Fall,
    Land,
    WallRunUp,
    WallRunLeft,
    WallRunRight,
    LedgeHang,
    LedgeShimmyLeft,
    LedgeShimmyRight,
    LedgePullUp,
    ClimbIdle,
    ClimbUp,
    ClimbDown,
    ClimbLeft,
    ClimbRight,
    ClimbUpLeft,
    ClimbUpRight,
    ClimbDownLeft,
    ClimbDownRight,
    ClimbExitUp,
}

/// What the application rig should do with a clip slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipCommand {
    /// Start the clip looping.
    Loop(ClipId),
    /// Play the clip once; the rig holds the final frame afterwards.
    Play(ClipId),
    /// Stop the clip.
    Stop(ClipId),
    /// Crossfade `from` into `to` over `duration` seconds. The weight
    /// curves are in [`CrossFade::weights`].
    Blend {
        from: ClipId,
        to: ClipId,
        duration: f32,
    },
    /// Scale the playback speed of the active clips.
    Rate(f32),
}

/// Clip instruction for one character, emitted every fixed tick something
/// changes.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct AnimationCommand {
    pub entity: Entity,
    pub command: ClipCommand,
}

/// Audio cue matching a motion-state change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SoundCue {
    Walk,
    Run,
    Sprint,
    Jump,
    Land,
    Fall,
    /// Stop the footstep loop.
    StopWalk,
    /// Footstep loop speed, follows the locomotion play rate.
    WalkRate(f32),
}

/// Sound cue for one character.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ControllerSound {
    pub entity: Entity,
    pub cue: SoundCue,
}

/// A crossfade in flight between two clip slots.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct CrossFade {
    /// Clip fading out.
    pub from: ClipId,
    /// Clip fading in.
    pub to: ClipId,
    /// Seconds since the blend started.
    pub elapsed: f32,
    /// Total blend length in seconds.
    pub duration: f32,
}

impl CrossFade {
    /// Blend weights `(from, to)` at the current point of the fade. Both
    /// ends ease on a quarter sine wave, so the handover is soft on both
    /// clips.
    pub fn weights(self) -> (f32, f32) {
        let t = if self.duration <= f32::EPSILON {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        };
        let angle = t * std::f32::consts::FRAC_PI_2;
        (1.0 - angle.sin(), 1.0 - angle.cos())
    }

    fn finished(self) -> bool {
        self.elapsed >= self.duration
    }
}

/// A one-shot clip in flight.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct OneShot {
    pub clip: ClipId,
    pub elapsed: f32,
    pub duration: f32,
}

impl OneShot {
    fn finished(self) -> bool {
        self.elapsed >= self.duration
    }
}

/// Commands and cues produced by one animator pass, in emission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimatorOutput {
    pub clips: Vec<ClipCommand>,
    pub cues: Vec<SoundCue>,
}

impl AnimatorOutput {
    fn clip(&mut self, command: ClipCommand) {
        self.clips.push(command);
    }

    fn cue(&mut self, cue: SoundCue) {
        self.cues.push(cue);
    }

    /// Emit the batch as events for `entity`.
    pub fn write(
        self,
        entity: Entity,
        clips: &mut EventWriter<AnimationCommand>,
        sounds: &mut EventWriter<ControllerSound>,
    ) {
        for command in self.clips {
            clips.write(AnimationCommand { entity, command });
        }
        for cue in self.cues {
            sounds.write(ControllerSound { entity, cue });
        }
    }
}

/// Per-character animation bookkeeping.
///
/// Holds the active clip slot, the crossfade or one-shot in flight, the
/// locomotion play rate, and the settle request that hands a transitional
/// motion state over to its settled pose once the clip work is done.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct AnimatorState {
    /// Clip slot the rig currently rests on. During a crossfade this is
    /// already the fade target.
    pub active: ClipId,
    /// Playback speed last sent to the rig.
    pub play_rate: f32,
    /// Crossfade in flight, if any.
    pub fade: Option<CrossFade>,
    /// One-shot in flight, if any.
    pub one_shot: Option<OneShot>,
    /// `(valid_while, target)`: once nothing is in flight, request `target`
    /// as long as the committed state is still `valid_while`.
    pending_settle: Option<(MotionState, MotionState)>,
    /// Clip lengths in seconds, reported by the application. One-shots
    /// without an entry assume [`ONE_SHOT_FALLBACK`].
    clip_lengths: HashMap<ClipId, f32>,
}

impl Default for AnimatorState {
    fn default() -> Self {
        Self {
            active: ClipId::Idle,
            play_rate: 1.0,
            fade: None,
            one_shot: None,
            pending_settle: None,
            clip_lengths: HashMap::new(),
        }
    }
}

impl AnimatorState {
    /// Report the length of a clip asset so one-shots settle on time.
    pub fn set_clip_length(&mut self, clip: ClipId, seconds: f32) {
        self.clip_lengths.insert(clip, seconds);
    }

    /// Builder: report a clip length at spawn time.
    pub fn with_clip_length(mut self, clip: ClipId, seconds: f32) -> Self {
        self.set_clip_length(clip, seconds);
        self
    }

    /// Current blend weights `(from, to)`, if a crossfade is in flight.
    pub fn blend_weights(&self) -> Option<(f32, f32)> {
        self.fade.map(CrossFade::weights)
    }

    fn clip_length(&self, clip: ClipId) -> f32 {
        self.clip_lengths
            .get(&clip)
            .copied()
            .unwrap_or(ONE_SHOT_FALLBACK)
    }

    /// Loop `clip` unless it is already the active slot.
    fn start_loop(&mut self, clip: ClipId, out: &mut AnimatorOutput) {
        if self.active == clip {
            return;
        }
        self.active = clip;
        out.clip(ClipCommand::Loop(clip));
    }

    /// Crossfade `from` into `to` and stage the settle that requests
    /// `settle` once the fade completes (checked against `entered` still
    /// being the committed state).
    ///
    /// A fade or one-shot already in flight is cut: its outgoing clip is
    /// stopped and its settle replaced, never fired mid-switch.
    fn start_fade(
        &mut self,
        from: ClipId,
        to: ClipId,
        duration: f32,
        entered: MotionState,
        settle: MotionState,
        out: &mut AnimatorOutput,
    ) {
        if let Some(old) = self.fade.take() {
            out.clip(ClipCommand::Stop(old.from));
        }
        self.one_shot = None;
        self.active = to;
        self.fade = Some(CrossFade {
            from,
            to,
            elapsed: 0.0,
            duration,
        });
        self.pending_settle = Some((entered, settle));
        out.clip(ClipCommand::Loop(to));
        out.clip(ClipCommand::Blend { from, to, duration });
    }

    /// Play `clip` once and stage the settle that requests `settle` when
    /// it finishes.
    fn start_one_shot(
        &mut self,
        clip: ClipId,
        entered: MotionState,
        settle: MotionState,
        out: &mut AnimatorOutput,
    ) {
        if let Some(old) = self.fade.take() {
            out.clip(ClipCommand::Stop(old.from));
        }
        self.active = clip;
        self.one_shot = Some(OneShot {
            clip,
            elapsed: 0.0,
            duration: self.clip_length(clip),
        });
        self.pending_settle = Some((entered, settle));
        out.clip(ClipCommand::Play(clip));
    }

    /// React to a committed state change: pick the clip work and sound
    /// cues for the state being entered.
    pub fn enter_state(
        &mut self,
        to: MotionState,
        controller: &CharacterController,
        config: &ControllerConfig,
    ) -> AnimatorOutput {
        use MotionState::*;
        let mut out = AnimatorOutput::default();
        // Slowing into Idle fades out over however much of the ramp is
        // left, so a gentle stop blends longer than a hard one.
        let slowdown = controller.current_accel / controller.max_accel;
        match to {
            Idle => {
                out.cue(SoundCue::StopWalk);
                self.start_loop(ClipId::Idle, &mut out);
            }
            Walk => self.start_loop(ClipId::Walk, &mut out),
            Run => self.start_loop(ClipId::Run, &mut out),
            Sprint => self.start_loop(ClipId::Sprint, &mut out),
            IdleToWalk => {
                out.cue(SoundCue::Walk);
                self.start_fade(
                    ClipId::Idle,
                    ClipId::Walk,
                    config.enter_walk_duration,
                    to,
                    Walk,
                    &mut out,
                );
            }
            IdleToRun => {
                out.cue(SoundCue::Run);
                self.start_fade(
                    ClipId::Idle,
                    ClipId::Run,
                    config.enter_run_duration,
                    to,
                    Run,
                    &mut out,
                );
            }
            IdleToSprint => {
                out.cue(SoundCue::Sprint);
                self.start_fade(
                    ClipId::Idle,
                    ClipId::Sprint,
                    config.enter_sprint_duration,
                    to,
                    Sprint,
                    &mut out,
                );
            }
            WalkToIdle => {
                out.cue(SoundCue::Walk);
                self.start_fade(ClipId::Walk, ClipId::Idle, slowdown, to, Idle, &mut out);
            }
            WalkToRun => {
                out.cue(SoundCue::Run);
                self.start_fade(
                    ClipId::Walk,
                    ClipId::Run,
                    config.enter_run_duration,
                    to,
                    Run,
                    &mut out,
                );
            }
            RunToIdle => {
                self.start_fade(ClipId::Run, ClipId::Idle, slowdown, to, Idle, &mut out);
            }
            RunToWalk => {
                out.cue(SoundCue::Walk);
                self.start_fade(
                    ClipId::Run,
                    ClipId::Walk,
                    config.enter_walk_duration,
                    to,
                    Walk,
                    &mut out,
                );
            }
            RunToSprint => {
                out.cue(SoundCue::Sprint);
                self.start_fade(
                    ClipId::Run,
                    ClipId::Sprint,
                    config.enter_sprint_duration,
                    to,
                    Sprint,
                    &mut out,
                );
            }
            SprintToIdle => {
                self.start_fade(ClipId::Sprint, ClipId::Idle, slowdown, to, Idle, &mut out);
            }
            SprintToRun => {
                out.cue(SoundCue::Run);
                self.start_fade(
                    ClipId::Sprint,
                    ClipId::Run,
                    config.enter_run_duration,
                    to,
                    Run,
                    &mut out,
                );
            }
            Jump => {
                out.cue(SoundCue::StopWalk);
                out.cue(SoundCue::Jump);
                // Re-entering with the takeoff still playing (quick wall
                // kick-off) keeps the running clip.
                if self.active != ClipId::JumpStart {
                    self.start_one_shot(ClipId::JumpStart, to, Fall, &mut out);
                }
            }
            Fall => {
                out.cue(SoundCue::StopWalk);
                out.cue(SoundCue::Fall);
                // The takeoff clip ends in a falling pose; let it hold
                // instead of snapping to the fall loop.
                if self.active != ClipId::JumpStart {
                    self.start_loop(ClipId::Fall, &mut out);
                }
            }
            Land => {
                out.cue(SoundCue::Land);
                match controller.pre_jump_state {
                    Run | IdleToRun | WalkToRun => {
                        out.cue(SoundCue::Run);
                        self.start_fade(ClipId::Land, ClipId::Run, 0.25, to, Run, &mut out);
                    }
                    Walk | IdleToWalk | RunToWalk => {
                        out.cue(SoundCue::Walk);
                        self.start_fade(ClipId::Land, ClipId::Walk, 0.5, to, Walk, &mut out);
                    }
                    _ => self.start_one_shot(ClipId::Land, to, Idle, &mut out),
                }
            }
            WallRun => {
                self.start_loop(wall_run_clip(controller.wall_run_side), &mut out);
            }
            RunToWallRun => {
                out.cue(SoundCue::Run);
                self.start_fade(
                    ClipId::Run,
                    wall_run_clip(controller.wall_run_side),
                    config.enter_run_duration,
                    to,
                    WallRun,
                    &mut out,
                );
            }
            SprintToWallRun => {
                out.cue(SoundCue::Run);
                self.start_fade(
                    ClipId::Sprint,
                    wall_run_clip(controller.wall_run_side),
                    config.enter_run_duration,
                    to,
                    WallRun,
                    &mut out,
                );
            }
            LedgeGrab => self.start_loop(ClipId::LedgeHang, &mut out),
            LedgeGrabLeft => self.start_loop(ClipId::LedgeShimmyLeft, &mut out),
            LedgeGrabRight => self.start_loop(ClipId::LedgeShimmyRight, &mut out),
            LedgeGrabUp => self.start_one_shot(ClipId::LedgePullUp, to, Idle, &mut out),
            Climb => self.start_loop(ClipId::ClimbIdle, &mut out),
            ClimbUp => self.start_loop(ClipId::ClimbUp, &mut out),
            ClimbDown => self.start_loop(ClipId::ClimbDown, &mut out),
            ClimbLeft => self.start_loop(ClipId::ClimbLeft, &mut out),
            ClimbRight => self.start_loop(ClipId::ClimbRight, &mut out),
            ClimbUpLeft => self.start_loop(ClipId::ClimbUpLeft, &mut out),
            ClimbUpRight => self.start_loop(ClipId::ClimbUpRight, &mut out),
            ClimbDownLeft => self.start_loop(ClipId::ClimbDownLeft, &mut out),
            ClimbDownRight => self.start_loop(ClipId::ClimbDownRight, &mut out),
            ClimbExitUp => self.start_one_shot(ClipId::ClimbExitUp, to, Idle, &mut out),
        }
        out
    }

    /// Advance clocks by `dt`, fire a due settle and track the locomotion
    /// play rate. Runs before the control chain so a staged settle goes
    /// through the same frame's commit.
    pub fn advance(
        &mut self,
        controller: &mut CharacterController,
        table: &TransitionTable,
        intent: &InputIntent,
        stamina: &Stamina,
        config: &ControllerConfig,
        dt: f32,
    ) -> AnimatorOutput {
        let mut out = AnimatorOutput::default();

        if let Some(mut fade) = self.fade {
            fade.elapsed += dt;
            self.fade = if fade.finished() {
                out.clip(ClipCommand::Stop(fade.from));
                None
            } else {
                Some(fade)
            };
        }
        if let Some(mut shot) = self.one_shot {
            shot.elapsed += dt;
            self.one_shot = if shot.finished() { None } else { Some(shot) };
        }

        if let Some((valid_while, target)) = self.pending_settle {
            if controller.state != valid_while {
                // The state moved on while the clip was playing.
                self.pending_settle = None;
            } else if self.fade.is_none()
                && self.one_shot.is_none()
                && !controller.has_request()
            {
                self.pending_settle = None;
                match table.check(controller.state, target) {
                    Ok(()) => controller.request_state(target),
                    Err(rejected) => debug!("animation settle dropped: {rejected}"),
                }
            }
        }

        self.track_play_rate(controller, intent, stamina, config, &mut out);
        out
    }

    /// Locomotion clips play at `current_accel / max_accel`; directional
    /// climbing doubles up under sprint. Everything else runs at full
    /// speed. The idle clip never changes rate.
    fn track_play_rate(
        &mut self,
        controller: &CharacterController,
        intent: &InputIntent,
        stamina: &Stamina,
        config: &ControllerConfig,
        out: &mut AnimatorOutput,
    ) {
        let state = controller.state;
        let climbing_fast = state.is_climb_state()
            && state != MotionState::Climb
            && state != MotionState::ClimbExitUp
            && intent.sprint
            && stamina.can_sprint();
        let rate = if climbing_fast {
            config.climb_sprint_multiplier
        } else if !controller.is_airborne
            && controller.current_accel > 0.0
            && (state.is_walk_state() || state.is_run_state() || state.is_sprint_state())
        {
            controller.current_accel / controller.max_accel
        } else {
            1.0
        };
        if self.active != ClipId::Idle && (rate - self.play_rate).abs() > f32::EPSILON {
            self.play_rate = rate;
            out.clip(ClipCommand::Rate(rate));
            out.cue(SoundCue::WalkRate(rate));
        }
    }
}

/// Clip for the side of the wall the active wall run clings to.
fn wall_run_clip(side: WallSide) -> ClipId {
    match side {
        WallSide::Front => ClipId::WallRunUp,
        WallSide::Left => ClipId::WallRunLeft,
        WallSide::Right => ClipId::WallRunRight,
    }
}

/// Tick every animator. Runs at the top of the fixed step, before the
/// control chain, so settle requests stage alongside plugin requests and
/// go through the same commit.
pub(crate) fn advance_animators(
    time: Res<Time>,
    mut query: Query<(
        Entity,
        &mut AnimatorState,
        &mut CharacterController,
        &TransitionTable,
        &InputIntent,
        &Stamina,
        &ControllerConfig,
    )>,
    mut clips: EventWriter<AnimationCommand>,
    mut sounds: EventWriter<ControllerSound>,
) {
    let dt = time.delta_secs();
    for (entity, mut animator, mut controller, table, intent, stamina, config) in &mut query {
        let out = animator.advance(&mut controller, table, intent, stamina, config, dt);
        out.write(entity, &mut clips, &mut sounds);
    }
}

/// Turn committed state changes into clip work. Runs right after the
/// commit so the clip reacts in the same fixed step.
pub(crate) fn apply_state_clips(
    mut changes: EventReader<StateChanged>,
    mut query: Query<(&mut AnimatorState, &CharacterController, &ControllerConfig)>,
    mut clips: EventWriter<AnimationCommand>,
    mut sounds: EventWriter<ControllerSound>,
) {
    for change in changes.read() {
        let Ok((mut animator, controller, config)) = query.get_mut(change.entity) else {
            continue;
        };
        let out = animator.enter_state(change.to, controller, config);
        out.write(change.entity, &mut clips, &mut sounds);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::state::StateMachineBuilder;

    struct Rig {
        animator: AnimatorState,
        controller: CharacterController,
        config: ControllerConfig,
        table: TransitionTable,
        intent: InputIntent,
        stamina: Stamina,
    }

    impl Rig {
        fn new() -> Self {
            let config = ControllerConfig::default();
            Self {
                animator: AnimatorState::default(),
                controller: CharacterController::new(&config),
                config,
                table: StateMachineBuilder::new().with_core_states().build(),
                intent: InputIntent::default(),
                stamina: Stamina::default(),
            }
        }

        /// Mirror a commit and run the enter hook.
        fn enter(&mut self, state: MotionState) -> AnimatorOutput {
            self.controller.state = state;
            self.animator
                .enter_state(state, &self.controller, &self.config)
        }

        fn advance(&mut self, dt: f32) -> AnimatorOutput {
            self.animator.advance(
                &mut self.controller,
                &self.table,
                &self.intent,
                &self.stamina,
                &self.config,
                dt,
            )
        }
    }

    // ==================== Loops and cues ====================

    #[test]
    fn idle_enter_loops_and_stops_footsteps() {
        let mut rig = Rig::new();
        rig.animator.active = ClipId::Walk;

        let out = rig.enter(MotionState::Idle);
        assert_eq!(out.cues, vec![SoundCue::StopWalk]);
        assert_eq!(out.clips, vec![ClipCommand::Loop(ClipId::Idle)]);
        assert_eq!(rig.animator.active, ClipId::Idle);
    }

    #[test]
    fn reentering_the_active_clip_does_not_restart() {
        let mut rig = Rig::new();
        rig.enter(MotionState::Idle);

        let out = rig.enter(MotionState::Idle);
        // The cue still fires, the loop command does not.
        assert_eq!(out.cues, vec![SoundCue::StopWalk]);
        assert!(out.clips.is_empty());
    }

    #[test]
    fn climb_states_loop_directional_clips() {
        let mut rig = Rig::new();
        assert_eq!(
            rig.enter(MotionState::Climb).clips,
            vec![ClipCommand::Loop(ClipId::ClimbIdle)]
        );
        assert_eq!(
            rig.enter(MotionState::ClimbUpLeft).clips,
            vec![ClipCommand::Loop(ClipId::ClimbUpLeft)]
        );
        assert_eq!(
            rig.enter(MotionState::LedgeGrabLeft).clips,
            vec![ClipCommand::Loop(ClipId::LedgeShimmyLeft)]
        );
    }

    #[test]
    fn wall_run_clip_follows_the_side() {
        let mut rig = Rig::new();
        rig.controller.wall_run_side = WallSide::Left;
        assert_eq!(
            rig.enter(MotionState::WallRun).clips,
            vec![ClipCommand::Loop(ClipId::WallRunLeft)]
        );

        rig.animator = AnimatorState::default();
        rig.controller.wall_run_side = WallSide::Front;
        assert_eq!(
            rig.enter(MotionState::WallRun).clips,
            vec![ClipCommand::Loop(ClipId::WallRunUp)]
        );
    }

    // ==================== Crossfades ====================

    #[test]
    fn speedup_blends_use_the_configured_durations() {
        let mut rig = Rig::new();

        let out = rig.enter(MotionState::IdleToWalk);
        assert_eq!(out.cues, vec![SoundCue::Walk]);
        assert_eq!(
            out.clips,
            vec![
                ClipCommand::Loop(ClipId::Walk),
                ClipCommand::Blend {
                    from: ClipId::Idle,
                    to: ClipId::Walk,
                    duration: rig.config.enter_walk_duration,
                },
            ]
        );

        let out = rig.enter(MotionState::RunToSprint);
        assert_eq!(out.cues, vec![SoundCue::Sprint]);
        assert!(out.clips.contains(&ClipCommand::Blend {
            from: ClipId::Run,
            to: ClipId::Sprint,
            duration: rig.config.enter_sprint_duration,
        }));
    }

    #[test]
    fn slowdown_blends_scale_with_the_ramp() {
        let mut rig = Rig::new();
        rig.controller.current_accel = 5.0;
        rig.controller.max_accel = 10.0;

        let out = rig.enter(MotionState::RunToIdle);
        // Winding down from half speed halves the fade, and is silent.
        assert!(out.cues.is_empty());
        assert!(out.clips.contains(&ClipCommand::Blend {
            from: ClipId::Run,
            to: ClipId::Idle,
            duration: 0.5,
        }));
    }

    #[test]
    fn blend_weights_ease_with_sine() {
        let mut rig = Rig::new();
        rig.enter(MotionState::IdleToRun);
        rig.advance(rig.config.enter_run_duration / 2.0);

        let (from, to) = rig.animator.blend_weights().expect("fade in flight");
        let quarter = std::f32::consts::FRAC_PI_4;
        assert_relative_eq!(from, 1.0 - quarter.sin());
        assert_relative_eq!(to, 1.0 - quarter.cos());
    }

    #[test]
    fn blend_settles_into_the_target_state() {
        let mut rig = Rig::new();
        rig.enter(MotionState::IdleToWalk);

        let out = rig.advance(0.3);
        assert!(out.clips.is_empty());
        assert_eq!(rig.controller.requested_state, None);

        let out = rig.advance(0.3);
        assert!(out.clips.contains(&ClipCommand::Stop(ClipId::Idle)));
        assert_eq!(rig.controller.requested_state, Some(MotionState::Walk));
    }

    #[test]
    fn settle_waits_while_a_request_is_staged() {
        let mut rig = Rig::new();
        rig.enter(MotionState::IdleToWalk);
        rig.controller.request_state(MotionState::Fall);

        rig.advance(0.6);
        assert_eq!(rig.controller.requested_state, Some(MotionState::Fall));

        // Once the slot frees up the settle goes through.
        rig.controller.clear_request();
        rig.advance(1.0 / 60.0);
        assert_eq!(rig.controller.requested_state, Some(MotionState::Walk));
    }

    #[test]
    fn settle_dropped_when_the_state_moved_on() {
        let mut rig = Rig::new();
        rig.enter(MotionState::IdleToWalk);
        // Walked off an edge mid-blend.
        rig.controller.state = MotionState::Fall;

        rig.advance(0.6);
        assert_eq!(rig.controller.requested_state, None);
    }

    #[test]
    fn rejected_settles_only_log() {
        let mut rig = Rig::new();
        rig.table = TransitionTable::default();
        rig.controller.pre_jump_state = MotionState::Sprint;
        rig.enter(MotionState::Land);

        rig.advance(0.6);
        assert_eq!(rig.controller.requested_state, None);
    }

    #[test]
    fn new_blend_cuts_the_old_one() {
        let mut rig = Rig::new();
        rig.enter(MotionState::IdleToWalk);

        let out = rig.enter(MotionState::WalkToRun);
        assert!(out.clips.contains(&ClipCommand::Stop(ClipId::Idle)));
        // Only the new settle survives.
        rig.advance(rig.config.enter_run_duration + 0.1);
        assert_eq!(rig.controller.requested_state, Some(MotionState::Run));
    }

    // ==================== Jump, fall, land ====================

    #[test]
    fn jump_cues_and_plays_the_takeoff() {
        let mut rig = Rig::new();
        let out = rig.enter(MotionState::Jump);

        assert_eq!(out.cues, vec![SoundCue::StopWalk, SoundCue::Jump]);
        assert_eq!(out.clips, vec![ClipCommand::Play(ClipId::JumpStart)]);
        assert!(rig.animator.one_shot.is_some());
    }

    #[test]
    fn takeoff_hands_over_to_fall() {
        let mut rig = Rig::new();
        rig.enter(MotionState::Jump);

        rig.advance(0.6);
        assert_eq!(rig.controller.requested_state, Some(MotionState::Fall));
    }

    #[test]
    fn repeated_jump_entries_keep_the_clip() {
        let mut rig = Rig::new();
        rig.animator.active = ClipId::JumpStart;

        let out = rig.enter(MotionState::Jump);
        assert!(out.clips.is_empty());
    }

    #[test]
    fn fall_keeps_the_takeoff_clip() {
        let mut rig = Rig::new();
        rig.animator.active = ClipId::JumpStart;
        let out = rig.enter(MotionState::Fall);
        assert_eq!(out.cues, vec![SoundCue::StopWalk, SoundCue::Fall]);
        assert!(out.clips.is_empty());

        // Off a ledge without a jump the fall loop does play.
        rig.animator.active = ClipId::Walk;
        let out = rig.enter(MotionState::Fall);
        assert_eq!(out.clips, vec![ClipCommand::Loop(ClipId::Fall)]);
    }

    #[test]
    fn landing_momentum_picks_the_run_blend() {
        let mut rig = Rig::new();
        rig.controller.pre_jump_state = MotionState::WalkToRun;

        let out = rig.enter(MotionState::Land);
        assert_eq!(out.cues, vec![SoundCue::Land, SoundCue::Run]);
        assert!(out.clips.contains(&ClipCommand::Blend {
            from: ClipId::Land,
            to: ClipId::Run,
            duration: 0.25,
        }));

        rig.advance(0.3);
        assert_eq!(rig.controller.requested_state, Some(MotionState::Run));
    }

    #[test]
    fn landing_momentum_picks_the_walk_blend() {
        let mut rig = Rig::new();
        rig.controller.pre_jump_state = MotionState::RunToWalk;

        let out = rig.enter(MotionState::Land);
        assert_eq!(out.cues, vec![SoundCue::Land, SoundCue::Walk]);
        assert!(out.clips.contains(&ClipCommand::Blend {
            from: ClipId::Land,
            to: ClipId::Walk,
            duration: 0.5,
        }));
    }

    #[test]
    fn sprint_landings_settle_through_idle() {
        let mut rig = Rig::new();
        rig.controller.pre_jump_state = MotionState::Sprint;

        let out = rig.enter(MotionState::Land);
        assert_eq!(out.clips, vec![ClipCommand::Play(ClipId::Land)]);

        rig.advance(0.6);
        assert_eq!(rig.controller.requested_state, Some(MotionState::Idle));
    }

    // ==================== One-shots with table extensions ====================

    #[test]
    fn wall_run_blend_settles_on_the_wall() {
        let mut rig = Rig::new();
        rig.table = StateMachineBuilder::new()
            .with_core_states()
            .register(MotionState::RunToWallRun)
            .to(&[MotionState::WallRun])
            .build();
        rig.controller.wall_run_side = WallSide::Right;

        let out = rig.enter(MotionState::RunToWallRun);
        assert_eq!(out.cues, vec![SoundCue::Run]);
        assert!(out.clips.contains(&ClipCommand::Blend {
            from: ClipId::Run,
            to: ClipId::WallRunRight,
            duration: rig.config.enter_run_duration,
        }));

        rig.advance(rig.config.enter_run_duration + 0.1);
        assert_eq!(rig.controller.requested_state, Some(MotionState::WallRun));
    }

    #[test]
    fn pull_up_clips_settle_to_idle() {
        let mut rig = Rig::new();
        rig.table = StateMachineBuilder::new()
            .with_core_states()
            .register(MotionState::LedgeGrabUp)
            .to(&[MotionState::Idle])
            .build();
        rig.animator.set_clip_length(ClipId::LedgePullUp, 0.8);

        let out = rig.enter(MotionState::LedgeGrabUp);
        assert_eq!(out.clips, vec![ClipCommand::Play(ClipId::LedgePullUp)]);

        rig.advance(0.7);
        assert_eq!(rig.controller.requested_state, None);
        rig.advance(0.2);
        assert_eq!(rig.controller.requested_state, Some(MotionState::Idle));
    }

    #[test]
    fn climb_exit_settles_to_idle() {
        let mut rig = Rig::new();
        rig.table = StateMachineBuilder::new()
            .with_core_states()
            .register(MotionState::ClimbExitUp)
            .to_any()
            .build();

        let out = rig.enter(MotionState::ClimbExitUp);
        assert_eq!(out.clips, vec![ClipCommand::Play(ClipId::ClimbExitUp)]);

        rig.advance(0.6);
        assert_eq!(rig.controller.requested_state, Some(MotionState::Idle));
    }

    // ==================== Play rate ====================

    #[test]
    fn locomotion_rate_tracks_the_ramp() {
        let mut rig = Rig::new();
        rig.enter(MotionState::Run);
        rig.controller.current_accel = 5.0;
        rig.controller.max_accel = 10.0;

        let out = rig.advance(1.0 / 60.0);
        assert!(out.clips.contains(&ClipCommand::Rate(0.5)));
        assert!(out.cues.contains(&SoundCue::WalkRate(0.5)));

        // Unchanged rate stays quiet.
        let out = rig.advance(1.0 / 60.0);
        assert!(out.clips.is_empty());
    }

    #[test]
    fn idle_clip_skips_rate_changes() {
        let mut rig = Rig::new();
        rig.controller.state = MotionState::Walk;
        rig.controller.current_accel = 5.0;
        rig.controller.max_accel = 10.0;

        let out = rig.advance(1.0 / 60.0);
        assert!(out.clips.is_empty());
        assert_eq!(rig.animator.play_rate, 1.0);
    }

    #[test]
    fn airborne_clips_run_at_full_speed() {
        let mut rig = Rig::new();
        rig.enter(MotionState::Run);
        rig.controller.current_accel = 5.0;
        rig.controller.max_accel = 10.0;
        rig.advance(1.0 / 60.0);
        assert_relative_eq!(rig.animator.play_rate, 0.5);

        rig.controller.is_airborne = true;
        let out = rig.advance(1.0 / 60.0);
        assert!(out.clips.contains(&ClipCommand::Rate(1.0)));
    }

    #[test]
    fn climb_sprint_doubles_the_clip_rate() {
        let mut rig = Rig::new();
        rig.enter(MotionState::ClimbUp);
        rig.intent.sprint = true;

        let out = rig.advance(1.0 / 60.0);
        assert!(out
            .clips
            .contains(&ClipCommand::Rate(rig.config.climb_sprint_multiplier)));

        // A static hang never speeds up.
        rig.enter(MotionState::Climb);
        let out = rig.advance(1.0 / 60.0);
        assert!(out.clips.contains(&ClipCommand::Rate(1.0)));
    }
}

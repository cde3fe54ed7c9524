//! Motion states and the transition table that governs them.
//!
//! Every character carries a [`MotionState`] (inside
//! [`CharacterController`](crate::config::CharacterController)) plus a
//! [`TransitionTable`] component describing which state changes are legal.
//! The table is immutable after startup: it is assembled once through
//! [`StateMachineBuilder`], control plugins extend it during their
//! registration, and the frame loop only ever reads it. Because plugins
//! extend shared entries, plugin registration order shapes the legality
//! graph and must stay stable.

use std::collections::{HashMap, HashSet};

use bevy::prelude::*;
use thiserror::Error;

/// Locomotion state of a character.
///
/// States come in two flavors: *settled* states (`Idle`, `Walk`, `Run`,
/// `Sprint`, `Fall`, ...) and short *transitional* states (`IdleToWalk`,
/// `RunToSprint`, ...) that exist so the animator can blend between
/// settled poses. Transitional states hand over to their settled target
/// once the corresponding animation finishes.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum MotionState {
    /// Standing still on the ground.
    #[default]
    Idle,
    IdleToWalk,
    IdleToRun,
    IdleToSprint,
    Walk,
    WalkToIdle,
    WalkToRun,
    Run,
    RunToIdle,
    RunToWalk,
    RunToSprint,
    Sprint,
    SprintToIdle,
    SprintToRun,
    /// Airborne from a jump; the press window may still add impulse.
    Jump,
    /// Airborne without an active jump.
    Fall,
    /// Just touched down; hands over to the locomotion chain.
    Land,
    /// Running along or up a wall.
    WallRun,
    RunToWallRun,
    SprintToWallRun,
    /// Hanging from a ledge.
    LedgeGrab,
    /// Pulling up over a grabbed ledge.
    LedgeGrabUp,
    LedgeGrabLeft,
    LedgeGrabRight,
    /// Attached to a climbable surface, not moving.
    Climb,
    ClimbUp,
    ClimbDown,
    ClimbLeft,
    ClimbRight,
    ClimbUpLeft,
    ClimbUpRight,
    ClimbDownLeft,
    ClimbDownRight,
    /// Climbing out over the top edge of a climbable surface.
    ClimbExitUp,
}

impl MotionState {
    /// Walk family, including the blends into and out of it.
    pub fn is_walk_state(self) -> bool {
        matches!(
            self,
            Self::Walk | Self::WalkToIdle | Self::WalkToRun | Self::IdleToWalk | Self::RunToWalk
        )
    }

    /// Run family, including the blends into and out of it.
    ///
    /// Overlaps with the walk and sprint families on the shared
    /// transitional states (`WalkToRun`, `RunToWalk`, `RunToSprint`).
    pub fn is_run_state(self) -> bool {
        matches!(
            self,
            Self::Run
                | Self::RunToIdle
                | Self::RunToSprint
                | Self::RunToWalk
                | Self::IdleToRun
                | Self::WalkToRun
                | Self::SprintToRun
        )
    }

    /// Sprint family, including the blends into and out of it.
    pub fn is_sprint_state(self) -> bool {
        matches!(
            self,
            Self::Sprint
                | Self::SprintToIdle
                | Self::SprintToRun
                | Self::IdleToSprint
                | Self::RunToSprint
        )
    }

    /// Jump or fall, the two states that accumulate `fall_time`.
    pub fn is_jump_or_fall(self) -> bool {
        matches!(self, Self::Jump | Self::Fall)
    }

    pub fn is_wall_run_state(self) -> bool {
        matches!(self, Self::WallRun | Self::RunToWallRun | Self::SprintToWallRun)
    }

    pub fn is_ledge_state(self) -> bool {
        matches!(
            self,
            Self::LedgeGrab | Self::LedgeGrabUp | Self::LedgeGrabLeft | Self::LedgeGrabRight
        )
    }

    pub fn is_climb_state(self) -> bool {
        matches!(
            self,
            Self::Climb
                | Self::ClimbUp
                | Self::ClimbDown
                | Self::ClimbLeft
                | Self::ClimbRight
                | Self::ClimbUpLeft
                | Self::ClimbUpRight
                | Self::ClimbDownLeft
                | Self::ClimbDownRight
                | Self::ClimbExitUp
        )
    }
}

/// A state change request that the [`TransitionTable`] does not allow.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("transition rejected: {from:?} -> {to:?}")]
pub struct TransitionRejected {
    pub from: MotionState,
    pub to: MotionState,
}

/// Group membership queried by the frame loop.
///
/// Groups are filled during registration and frozen afterwards. A state can
/// belong to several groups at once.
#[derive(Debug, Clone, Default)]
pub struct StateGroups {
    /// States in which the character stands on the ground. Anything else
    /// (except flying states) counts as airborne.
    pub on_ground: HashSet<MotionState>,
    /// States that suspend stepping and gravity; the owning control plugin
    /// drives the velocity instead.
    pub flying: HashSet<MotionState>,
    /// States during which player input is discarded entirely.
    pub ignore_input: HashSet<MotionState>,
    /// States during which heading changes from movement input are blocked.
    pub prevent_rotation: HashSet<MotionState>,
    /// States that must not slide down slopes.
    pub prevent_slip: HashSet<MotionState>,
    /// States that skip the ground step/snap entirely.
    pub ignore_step: HashSet<MotionState>,
    /// States during which per-frame translation is not applied.
    pub ignore_position_update: HashSet<MotionState>,
}

/// Immutable transition table plus state groups for one character.
///
/// Lookups follow a fixed precedence: an explicit `from -> to` entry, then
/// a `from -> anywhere` wildcard, then an `anywhere -> to` wildcard, then
/// the global wildcard. Anything else is rejected.
#[derive(Component, Default)]
pub struct TransitionTable {
    transitions: HashMap<MotionState, HashSet<MotionState>>,
    /// States allowed to transition to any other state.
    wildcard_to: HashSet<MotionState>,
    /// States reachable from any other state.
    any_source: HashSet<MotionState>,
    any_to_any: bool,
    pub groups: StateGroups,
}

impl TransitionTable {
    /// Check whether `from -> to` is legal.
    pub fn check(&self, from: MotionState, to: MotionState) -> Result<(), TransitionRejected> {
        if let Some(targets) = self.transitions.get(&from) {
            if targets.contains(&to) {
                return Ok(());
            }
        }
        if self.wildcard_to.contains(&from)
            || self.any_source.contains(&to)
            || self.any_to_any
        {
            return Ok(());
        }
        Err(TransitionRejected { from, to })
    }

    pub fn can_transition(&self, from: MotionState, to: MotionState) -> bool {
        self.check(from, to).is_ok()
    }

    /// Whether a jump may start from `state`.
    ///
    /// This is a direct table lookup: jump initiation requires an explicit
    /// `Jump` entry, wildcards do not apply.
    pub fn can_jump_from(&self, state: MotionState) -> bool {
        self.transitions
            .get(&state)
            .is_some_and(|targets| targets.contains(&MotionState::Jump))
    }

    pub fn is_on_ground_state(&self, state: MotionState) -> bool {
        self.groups.on_ground.contains(&state)
    }

    pub fn is_flying_state(&self, state: MotionState) -> bool {
        self.groups.flying.contains(&state)
    }

    pub fn ignores_input(&self, state: MotionState) -> bool {
        self.groups.ignore_input.contains(&state)
    }

    pub fn prevents_rotation(&self, state: MotionState) -> bool {
        self.groups.prevent_rotation.contains(&state)
    }

    pub fn prevents_slip(&self, state: MotionState) -> bool {
        self.groups.prevent_slip.contains(&state)
    }

    pub fn ignores_step(&self, state: MotionState) -> bool {
        self.groups.ignore_step.contains(&state)
    }

    pub fn ignores_position_update(&self, state: MotionState) -> bool {
        self.groups.ignore_position_update.contains(&state)
    }
}

/// Assembles a [`TransitionTable`].
///
/// [`with_core_states`](Self::with_core_states) installs the default
/// locomotion graph; control plugins chain their own
/// [`register`](Self::register) and [`add_transitions`](Self::add_transitions)
/// calls on top before the final [`build`](StateRegistration::build).
#[derive(Default)]
pub struct StateMachineBuilder {
    table: TransitionTable,
}

impl StateMachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start registering `state`; the returned handle scopes the
    /// follow-up calls to it.
    pub fn register(mut self, state: MotionState) -> StateRegistration {
        self.table.transitions.entry(state).or_default();
        StateRegistration { builder: self, state }
    }

    /// Extend the target set of an already registered state.
    pub fn add_transitions(mut self, from: MotionState, to: &[MotionState]) -> Self {
        self.table
            .transitions
            .entry(from)
            .or_default()
            .extend(to.iter().copied());
        self
    }

    pub fn build(self) -> TransitionTable {
        self.table
    }

    /// Install the default ground locomotion graph: idle, walk, run and
    /// sprint with their transitional blends, plus jump, fall and land.
    pub fn with_core_states(self) -> Self {
        use MotionState::*;
        self.register(Idle)
            .to(&[IdleToWalk, IdleToRun, IdleToSprint, Land, Jump, Fall])
            .on_ground()
            .prevent_slip()
            .register(IdleToWalk)
            .to(&[Idle, Walk, Jump, Fall])
            .on_ground()
            .register(IdleToRun)
            .to(&[Idle, Run, Jump, Fall])
            .on_ground()
            .register(IdleToSprint)
            .to(&[Idle, Sprint, Jump, Fall])
            .on_ground()
            .register(Walk)
            .to(&[Idle, WalkToIdle, WalkToRun, Jump, Fall])
            .on_ground()
            .register(WalkToIdle)
            .to(&[Idle, Run, Walk, Jump, Fall])
            .on_ground()
            .register(WalkToRun)
            .to(&[Idle, Run, Jump, Fall])
            .on_ground()
            .register(Run)
            .to(&[Idle, RunToIdle, RunToWalk, RunToSprint, Jump, Fall])
            .on_ground()
            .register(RunToWalk)
            .to(&[Idle, Walk, Jump, Fall])
            .on_ground()
            .register(RunToIdle)
            .to(&[Idle, Walk, Run, RunToSprint, Jump, Fall])
            .on_ground()
            .register(RunToSprint)
            .to(&[Idle, Run, Sprint, Jump, Fall])
            .on_ground()
            .register(Sprint)
            .to(&[Idle, SprintToIdle, SprintToRun, Jump, Fall])
            .on_ground()
            .register(SprintToIdle)
            .to(&[Idle, Walk, Run, Sprint, SprintToRun, Jump, Fall])
            .on_ground()
            .register(SprintToRun)
            .to(&[Idle, Walk, Run, Sprint, Jump, Fall])
            .on_ground()
            .register(Jump)
            .to(&[Fall, Land])
            .ignore_step()
            .ignore_position_update()
            .register(Fall)
            .to(&[Land, Jump])
            .register(Land)
            .to(&[Idle, Walk, Run, Sprint, Fall, Jump])
            .on_ground()
            .finish()
    }
}

/// Scoped handle for one state's registration; every call applies
/// immediately to the underlying builder.
pub struct StateRegistration {
    builder: StateMachineBuilder,
    state: MotionState,
}

impl StateRegistration {
    fn targets(&mut self) -> &mut HashSet<MotionState> {
        self.builder
            .table
            .transitions
            .entry(self.state)
            .or_default()
    }

    /// Add legal target states.
    pub fn to(mut self, targets: &[MotionState]) -> Self {
        self.targets().extend(targets.iter().copied());
        self
    }

    /// Allow transitioning from this state to any other state.
    pub fn to_any(mut self) -> Self {
        self.builder.table.wildcard_to.insert(self.state);
        self
    }

    /// Add this state to the target sets of the given source states.
    pub fn entered_from(mut self, sources: &[MotionState]) -> Self {
        for source in sources {
            self.builder
                .table
                .transitions
                .entry(*source)
                .or_default()
                .insert(self.state);
        }
        self
    }

    /// Make this state reachable from any other state.
    pub fn from_any_state(mut self) -> Self {
        self.builder.table.any_source.insert(self.state);
        self
    }

    pub fn on_ground(mut self) -> Self {
        self.builder.table.groups.on_ground.insert(self.state);
        self
    }

    /// Mark as flying: no step/snap and no gravity while in this state.
    /// Implies membership in the ignore-step group.
    pub fn flying(mut self) -> Self {
        self.builder.table.groups.flying.insert(self.state);
        self.builder.table.groups.ignore_step.insert(self.state);
        self
    }

    pub fn ignore_input(mut self) -> Self {
        self.builder.table.groups.ignore_input.insert(self.state);
        self
    }

    pub fn prevent_rotation(mut self) -> Self {
        self.builder.table.groups.prevent_rotation.insert(self.state);
        self
    }

    pub fn prevent_slip(mut self) -> Self {
        self.builder.table.groups.prevent_slip.insert(self.state);
        self
    }

    pub fn ignore_step(mut self) -> Self {
        self.builder.table.groups.ignore_step.insert(self.state);
        self
    }

    pub fn ignore_position_update(mut self) -> Self {
        self.builder
            .table
            .groups
            .ignore_position_update
            .insert(self.state);
        self
    }

    /// Finish this state and start registering the next one.
    pub fn register(self, state: MotionState) -> StateRegistration {
        self.finish().register(state)
    }

    /// Extend the target set of an already registered state.
    pub fn add_transitions(self, from: MotionState, to: &[MotionState]) -> StateMachineBuilder {
        self.finish().add_transitions(from, to)
    }

    pub fn finish(self) -> StateMachineBuilder {
        self.builder
    }

    pub fn build(self) -> TransitionTable {
        self.finish().build()
    }
}

/// Marker component indicating the character is grounded.
///
/// Kept in sync with [`CharacterController::is_grounded`]
/// (crate::config::CharacterController) after the integration step so other
/// systems can filter on it. Mutually exclusive with [`Airborne`].
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Grounded;

/// Marker component indicating the character is airborne.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Airborne;

/// Emitted whenever a character commits a state change.
#[derive(Event, Debug, Clone, Copy)]
pub struct StateChanged {
    pub entity: Entity,
    pub from: MotionState,
    pub to: MotionState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use MotionState::*;

    fn core_table() -> TransitionTable {
        StateMachineBuilder::new().with_core_states().build()
    }

    // ==================== Core graph ====================

    #[test]
    fn idle_reaches_locomotion_through_blends() {
        let table = core_table();
        assert!(table.can_transition(Idle, IdleToWalk));
        assert!(table.can_transition(Idle, IdleToRun));
        assert!(table.can_transition(Idle, IdleToSprint));
        // Settled states are only reachable through their blends.
        assert!(!table.can_transition(Idle, Walk));
        assert!(!table.can_transition(Idle, Sprint));
    }

    #[test]
    fn rejected_transition_reports_both_states() {
        let table = core_table();
        let err = table.check(Jump, Idle).unwrap_err();
        assert_eq!(err.from, Jump);
        assert_eq!(err.to, Idle);
    }

    #[test]
    fn jump_only_lands_or_falls() {
        let table = core_table();
        assert!(table.can_transition(Jump, Fall));
        assert!(table.can_transition(Jump, Land));
        assert!(!table.can_transition(Jump, Run));
    }

    #[test]
    fn fall_allows_late_jump() {
        // The coyote-time window relies on Fall -> Jump being legal;
        // the timing gate lives in the frame loop, not the table.
        let table = core_table();
        assert!(table.can_transition(Fall, Jump));
        assert!(table.can_jump_from(Fall));
    }

    #[test]
    fn land_hands_over_to_locomotion() {
        let table = core_table();
        for to in [Idle, Walk, Run, Sprint, Fall, Jump] {
            assert!(table.can_transition(Land, to), "Land -> {to:?}");
        }
    }

    #[test]
    fn sprint_winds_down_through_blend() {
        let table = core_table();
        assert!(table.can_transition(Sprint, SprintToIdle));
        assert!(table.can_transition(SprintToIdle, Sprint));
        assert!(!table.can_transition(Walk, Sprint));
    }

    // ==================== Wildcards ====================

    #[test]
    fn to_any_wildcard_opens_every_target() {
        let table = StateMachineBuilder::new()
            .with_core_states()
            .register(LedgeGrab)
            .to_any()
            .build();
        assert!(table.can_transition(LedgeGrab, Sprint));
        assert!(table.can_transition(LedgeGrab, ClimbUp));
    }

    #[test]
    fn from_any_state_wildcard_opens_every_source() {
        let table = StateMachineBuilder::new()
            .with_core_states()
            .register(LedgeGrab)
            .from_any_state()
            .build();
        assert!(table.can_transition(Fall, LedgeGrab));
        assert!(table.can_transition(Sprint, LedgeGrab));
    }

    #[test]
    fn wildcards_do_not_satisfy_jump_gate() {
        let table = StateMachineBuilder::new()
            .with_core_states()
            .register(WallRun)
            .to_any()
            .build();
        assert!(table.can_transition(WallRun, Jump));
        // Jump initiation needs the explicit entry.
        assert!(!table.can_jump_from(WallRun));
        assert!(table.can_jump_from(Idle));
    }

    // ==================== Registration ====================

    #[test]
    fn entered_from_extends_source_sets() {
        let table = StateMachineBuilder::new()
            .with_core_states()
            .register(WallRun)
            .entered_from(&[Run, Sprint])
            .build();
        assert!(table.can_transition(Run, WallRun));
        assert!(table.can_transition(Sprint, WallRun));
        assert!(!table.can_transition(Walk, WallRun));
    }

    #[test]
    fn add_transitions_extends_existing_entry() {
        let table = StateMachineBuilder::new()
            .with_core_states()
            .add_transitions(Fall, &[LedgeGrab])
            .build();
        assert!(table.can_transition(Fall, LedgeGrab));
        // The original entry survives.
        assert!(table.can_transition(Fall, Land));
    }

    // ==================== Groups ====================

    #[test]
    fn core_group_membership() {
        let table = core_table();
        assert!(table.prevents_slip(Idle));
        // Idle must step so the slip guard can run.
        assert!(!table.ignores_step(Idle));
        assert!(table.ignores_step(Jump));
        assert!(table.ignores_position_update(Jump));
        assert!(table.is_on_ground_state(Run));
        assert!(!table.is_on_ground_state(Jump));
        assert!(!table.is_on_ground_state(Fall));
    }

    #[test]
    fn flying_implies_ignore_step() {
        let table = StateMachineBuilder::new()
            .with_core_states()
            .register(WallRun)
            .flying()
            .build();
        assert!(table.is_flying_state(WallRun));
        assert!(table.ignores_step(WallRun));
        assert!(!table.is_on_ground_state(WallRun));
    }

    // ==================== Families ====================

    #[test]
    fn families_overlap_on_shared_blends() {
        assert!(WalkToRun.is_walk_state());
        assert!(WalkToRun.is_run_state());
        assert!(RunToSprint.is_run_state());
        assert!(RunToSprint.is_sprint_state());
        assert!(!Idle.is_walk_state());
        assert!(Jump.is_jump_or_fall());
        assert!(Fall.is_jump_or_fall());
        assert!(!Land.is_jump_or_fall());
    }

    #[test]
    fn default_state_is_idle() {
        assert_eq!(MotionState::default(), Idle);
    }
}

//! The timer state machine.
//!
//! Owns `PlaybackState` and implements every phase transition, the per-tick
//! computation and roll mode. It never reads a clock itself: the dispatcher
//! passes in the monotonic `now` and the show-day `wall` time, which keeps
//! every transition deterministic and testable.
//!
//! | from                  | command   | to                     |
//! |-----------------------|-----------|------------------------|
//! | stopped               | load(id)  | armed                  |
//! | armed, paused         | start     | playing                |
//! | playing               | pause     | paused                 |
//! | any but stopped       | stop      | stopped                |
//! | playing, paused       | previous  | armed(previous)        |
//! | armed, playing, paused| next      | armed(next)            |
//! | stopped               | roll      | rolling                |
//! | any with a selection  | reload    | armed(same)            |
//! | playing, paused       | addDelay  | unchanged phase        |
//! | stopped, armed, playing, paused | go | playing(next)    |
//!
//! Anything else is rejected without touching the state.

use super::{Command, Phase, PlaybackState};
use crate::common::{EntryId, Millis, DAY_MS};
use crate::error::RejectedCommand;
use crate::events::TimerLifecycle;
use crate::rundown::{EffectiveTiming, RollTarget, RundownView};
use tracing::debug;

/// What a command or tick did to the state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Whether anything beyond the passage of time changed.
    pub changed: bool,
    pub lifecycle: Vec<TimerLifecycle>,
}

impl Outcome {
    fn unchanged() -> Self {
        Self::default()
    }

    fn changed(lifecycle: &[TimerLifecycle]) -> Self {
        Self {
            changed: true,
            lifecycle: lifecycle.to_vec(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TimerStateMachine {
    state: PlaybackState,
}

impl TimerStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Applies `command`. On `Err` the state is exactly as it was.
    pub fn apply(
        &mut self,
        command: &Command,
        view: &RundownView,
        now: Millis,
        wall: Millis,
    ) -> Result<Outcome, RejectedCommand> {
        use TimerLifecycle::*;

        let phase = self.state.phase;
        let outcome = match (command, phase) {
            (Command::Start, Phase::Armed | Phase::Paused) => {
                self.state.phase = Phase::Playing;
                self.state.started_at = Some(now);
                Outcome::changed(&[OnStart])
            }
            (Command::Start, Phase::Playing) => Outcome::unchanged(),

            (Command::Pause, Phase::Playing) => {
                self.state.paused_accumulated_ms = self.elapsed(view, now, wall);
                self.state.started_at = None;
                self.state.phase = Phase::Paused;
                Outcome::changed(&[OnPause])
            }

            (Command::Stop, Phase::Stopped) => return Err(illegal(command, phase)),
            (Command::Stop, _) => {
                self.stop();
                Outcome::changed(&[OnStop])
            }

            (Command::Load(id), Phase::Stopped) => {
                let index = resolve_playable(view, id)?;
                self.arm(view, index);
                Outcome::changed(&[OnLoad])
            }

            (Command::Roll, Phase::Stopped) => self.enter_roll(view, now, wall),

            (Command::Next, Phase::Armed | Phase::Playing | Phase::Paused) => {
                self.step(view, true)
            }
            (Command::Previous, Phase::Playing | Phase::Paused) => self.step(view, false),

            (Command::Reload, _) => {
                let id = self
                    .state
                    .selected_event_id
                    .clone()
                    .ok_or(RejectedCommand::NothingSelected)?;
                let before = self.state.clone();
                self.arm_id(id);
                if before == self.state {
                    Outcome::unchanged()
                } else {
                    Outcome::changed(&[OnLoad])
                }
            }

            (Command::AddDelay(ms), Phase::Playing | Phase::Paused) => {
                if *ms == 0 {
                    Outcome::unchanged()
                } else {
                    let total = checked_added_delay(self.state.added_delay_ms, *ms)?;
                    self.state.added_delay_ms = total;
                    if self.state.finished && self.remaining(view, now, wall) >= 0 {
                        self.state.finished = false;
                    }
                    Outcome::changed(&[])
                }
            }

            (Command::Go, Phase::Stopped) => {
                let index = view.first_playable().ok_or(RejectedCommand::NothingSelected)?;
                self.arm(view, index);
                self.state.phase = Phase::Playing;
                self.state.started_at = Some(now);
                Outcome::changed(&[OnLoad, OnStart])
            }
            (Command::Go, Phase::Armed | Phase::Playing | Phase::Paused) => {
                let mut outcome = self.step(view, true);
                if outcome.lifecycle.contains(&OnLoad) {
                    self.state.phase = Phase::Playing;
                    self.state.started_at = Some(now);
                    outcome.lifecycle.push(OnStart);
                }
                outcome
            }

            (command, phase) => return Err(illegal(command, phase)),
        };
        Ok(outcome)
    }

    /// Advances the timer by one clock tick.
    pub fn tick(&mut self, view: &RundownView, now: Millis, wall: Millis) -> Outcome {
        use TimerLifecycle::*;

        match self.state.phase {
            Phase::Playing => {
                let mut lifecycle = vec![OnUpdate];
                let remaining = self.remaining(view, now, wall);
                if remaining < 0 && !self.state.finished {
                    self.state.finished = true;
                    debug!(id = ?self.state.selected_event_id, remaining, "Event ran into overtime.");
                    lifecycle.push(OnFinish);
                } else if remaining >= 0 && self.state.finished {
                    self.state.finished = false;
                }
                Outcome {
                    changed: false,
                    lifecycle,
                }
            }
            Phase::Rolling => {
                let before = self.state.clone();
                let mut lifecycle = self.follow_roll(view, now, wall);
                if self.state.phase == Phase::Rolling
                    && self.state.selected_event_id.is_some()
                    && !self.state.roll_pending
                {
                    lifecycle.push(OnUpdate);
                }
                Outcome {
                    changed: before != self.state,
                    lifecycle,
                }
            }
            Phase::Stopped | Phase::Armed | Phase::Paused => Outcome::unchanged(),
        }
    }

    /// Reconciles the state with a refreshed rundown view. A selection that
    /// no longer exists stops playback.
    pub fn reconcile(&mut self, view: &RundownView) -> Outcome {
        if let Some(id) = &self.state.selected_event_id {
            if view.index_of(id).is_none() {
                debug!(%id, "Selected event left the rundown, stopping.");
                self.stop();
                return Outcome::changed(&[TimerLifecycle::OnStop]);
            }
        }
        Outcome::unchanged()
    }

    /// Elapsed time on the current event.
    pub fn elapsed(&self, view: &RundownView, now: Millis, wall: Millis) -> Millis {
        let state = &self.state;
        match state.phase {
            Phase::Stopped => 0,
            Phase::Armed | Phase::Paused => state.paused_accumulated_ms,
            Phase::Playing => {
                let segment = state
                    .started_at
                    .map_or(0, |started| now.saturating_sub(started).max(0));
                state.paused_accumulated_ms.saturating_add(segment)
            }
            Phase::Rolling => {
                if state.roll_pending {
                    return 0;
                }
                self.selected_timing(view)
                    .map_or(0, |timing| wall.saturating_sub(timing.start).max(0))
            }
        }
    }

    /// Remaining time on the current event, negative in overtime.
    pub fn remaining(&self, view: &RundownView, now: Millis, wall: Millis) -> Millis {
        let state = &self.state;
        let Some(timing) = self.selected_timing(view) else {
            return 0;
        };
        match state.phase {
            Phase::Stopped => 0,
            Phase::Rolling if state.roll_pending => timing.duration,
            Phase::Rolling => timing.end.saturating_sub(wall),
            Phase::Armed | Phase::Playing | Phase::Paused => {
                timing
                    .duration
                    .saturating_add(state.added_delay_ms)
                    .saturating_sub(self.elapsed(view, now, wall))
            }
        }
    }

    fn selected_timing(&self, view: &RundownView) -> Option<EffectiveTiming> {
        self.state
            .selected_event_id
            .as_ref()
            .and_then(|id| view.effective_timing(id))
    }

    fn stop(&mut self) {
        self.state = PlaybackState::stopped();
    }

    fn arm(&mut self, view: &RundownView, index: usize) {
        if let Some(entry) = view.entry_at(index) {
            self.arm_id(entry.id().clone());
        }
    }

    fn arm_id(&mut self, id: EntryId) {
        self.state = PlaybackState {
            phase: Phase::Armed,
            selected_event_id: Some(id),
            ..PlaybackState::stopped()
        };
    }

    /// Moves the selection one playable event forward or back. At a boundary
    /// nothing changes. With nothing left to play at all, playback stops.
    fn step(&mut self, view: &RundownView, forward: bool) -> Outcome {
        let cursor = self
            .state
            .selected_event_id
            .as_ref()
            .and_then(|id| view.index_of(id));
        let Some(cursor) = cursor.filter(|_| view.playable_count() > 0) else {
            self.stop();
            return Outcome::changed(&[TimerLifecycle::OnStop]);
        };
        let target = if forward {
            view.next_playable(cursor)
        } else {
            view.previous_playable(cursor)
        };
        match target {
            Some(index) => {
                self.arm(view, index);
                Outcome::changed(&[TimerLifecycle::OnLoad])
            }
            None => Outcome::unchanged(),
        }
    }

    fn enter_roll(&mut self, view: &RundownView, now: Millis, wall: Millis) -> Outcome {
        self.state = PlaybackState {
            phase: Phase::Rolling,
            ..PlaybackState::stopped()
        };
        let mut lifecycle = Vec::new();
        // Entering after the last window leaves nothing selected; the next
        // tick finds the rundown exhausted and stops.
        if view.roll_target(wall) != RollTarget::Exhausted {
            lifecycle = self.follow_roll(view, now, wall);
        }
        Outcome {
            changed: true,
            lifecycle,
        }
    }

    /// Points the rolling selection at whatever the wall clock says should be
    /// on air. The current event is kept for as long as its window is open.
    fn follow_roll(&mut self, view: &RundownView, now: Millis, wall: Millis) -> Vec<TimerLifecycle> {
        use TimerLifecycle::*;

        let was_active = self.state.selected_event_id.is_some() && !self.state.roll_pending;
        if was_active {
            let still_open = self
                .state
                .selected_event_id
                .as_ref()
                .and_then(|id| view.index_of(id))
                .filter(|&index| view.entry_at(index).is_some_and(|entry| entry.is_playable()))
                .and_then(|index| view.timing_at(index))
                .is_some_and(|timing| timing.contains(wall));
            if still_open {
                return Vec::new();
            }
        }

        let mut lifecycle = Vec::new();
        if was_active {
            lifecycle.push(OnFinish);
        }
        let id_at = |index: usize| view.entry_at(index).map(|entry| entry.id().clone());

        match view.roll_target(wall) {
            RollTarget::Active(index) => {
                let id = id_at(index);
                if id != self.state.selected_event_id {
                    lifecycle.push(OnLoad);
                }
                self.state.selected_event_id = id;
                self.state.roll_pending = false;
                self.state.started_at = Some(now);
                lifecycle.push(OnStart);
            }
            RollTarget::Pending(index) => {
                let id = id_at(index);
                if id != self.state.selected_event_id || !self.state.roll_pending {
                    if id != self.state.selected_event_id {
                        lifecycle.push(OnLoad);
                    }
                    self.state.selected_event_id = id;
                    self.state.roll_pending = true;
                    self.state.started_at = None;
                }
            }
            RollTarget::BeforeFirst(_) => {
                self.state.selected_event_id = None;
                self.state.roll_pending = false;
                self.state.started_at = None;
            }
            RollTarget::Exhausted => {
                debug!("Roll reached the end of the rundown, stopping.");
                self.stop();
                lifecycle.push(OnStop);
            }
        }
        lifecycle
    }
}

/// Adds `ms` to the running extension. Either the step or the resulting
/// extension reaching a full day or more is refused.
fn checked_added_delay(current: Millis, ms: Millis) -> Result<Millis, RejectedCommand> {
    let within_day = |value: Millis| value > -DAY_MS && value < DAY_MS;
    let out_of_range = || RejectedCommand::InvalidArgument {
        command: "addDelay",
        reason: format!("{ms}ms would push the added delay past a day"),
    };
    if !within_day(ms) {
        return Err(out_of_range());
    }
    current
        .checked_add(ms)
        .filter(|&total| within_day(total))
        .ok_or_else(out_of_range)
}

fn illegal(command: &Command, phase: Phase) -> RejectedCommand {
    RejectedCommand::IllegalTransition {
        command: command.name(),
        phase,
    }
}

/// Looks up `id` and checks it is an event that navigation may select.
fn resolve_playable(view: &RundownView, id: &EntryId) -> Result<usize, RejectedCommand> {
    let index = view
        .index_of(id)
        .ok_or_else(|| RejectedCommand::UnknownEntry(id.clone()))?;
    match view.entry_at(index) {
        Some(entry) if entry.is_playable() => Ok(index),
        _ => Err(RejectedCommand::NotPlayable(id.clone())),
    }
}

//! The command dispatcher.
//!
//! `CommandDispatcher` is the single owner of the clock, the rundown view and
//! the timer state machine. Every command, tick and rundown notification goes
//! through `&mut self`, so whoever owns the dispatcher (the engine actor)
//! provides the serialization: nothing can observe a half-applied transition.

use super::timer::{Outcome, TimerStateMachine};
use super::{Command, PlaybackState};
use crate::common::Millis;
use crate::error::RejectedCommand;
use crate::events::{PlaybackSnapshot, TimerLifecycle};
use crate::rundown::{Rundown, RundownChange, RundownView};
use crate::time::MonotonicClock;
use std::sync::Arc;
use tracing::{debug, info};

/// The result of an accepted command, a tick or a rundown refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub snapshot: PlaybackSnapshot,
    /// `false` means observers need not be told about this transition.
    pub changed: bool,
    /// Lifecycle points crossed, in the order they happened.
    pub lifecycle: Vec<TimerLifecycle>,
}

pub struct CommandDispatcher {
    clock: MonotonicClock,
    view: RundownView,
    timer: TimerStateMachine,
}

impl CommandDispatcher {
    pub fn new(clock: MonotonicClock, rundown: Arc<Rundown>) -> Self {
        Self {
            clock,
            view: RundownView::new(rundown),
            timer: TimerStateMachine::new(),
        }
    }

    pub fn state(&self) -> &PlaybackState {
        self.timer.state()
    }

    pub fn view(&self) -> &RundownView {
        &self.view
    }

    /// Applies one command. A rejected command leaves the state untouched.
    pub fn dispatch(&mut self, command: Command) -> Result<Transition, RejectedCommand> {
        let now = self.clock.now();
        let wall = self.clock.wall();
        let from = self.timer.phase();
        match self.timer.apply(&command, &self.view, now, wall) {
            Ok(outcome) => {
                if outcome.changed {
                    info!(%command, %from, to = %self.timer.phase(), "Command applied.");
                } else {
                    debug!(%command, phase = %from, "Command accepted, nothing to change.");
                }
                Ok(self.transition(outcome, now, wall))
            }
            Err(reason) => {
                debug!(%command, phase = %from, %reason, "Command rejected.");
                Err(reason)
            }
        }
    }

    /// Advances the timer by one clock tick.
    pub fn tick(&mut self) -> Transition {
        let now = self.clock.now();
        let wall = self.clock.wall();
        let outcome = self.timer.tick(&self.view, now, wall);
        if outcome.changed {
            debug!(phase = %self.timer.phase(), selected = ?self.state().selected_event_id, "Roll advanced.");
        }
        self.transition(outcome, now, wall)
    }

    /// Refreshes the rundown cache from an edit notification.
    ///
    /// The transition counts as changed when the edit moved the playback
    /// state or anything a client displays for it (timing, position).
    pub fn apply_rundown_change(&mut self, change: &RundownChange) -> Transition {
        self.refresh_with(|view| view.apply_change(change))
    }

    /// Replaces the whole rundown, used when notifications were missed.
    pub fn resync(&mut self, rundown: Arc<Rundown>) -> Transition {
        self.refresh_with(move |view| view.replace(rundown))
    }

    fn refresh_with(&mut self, edit: impl FnOnce(&mut RundownView)) -> Transition {
        let now = self.clock.now();
        let wall = self.clock.wall();
        let before = self.snapshot_at(now, wall);
        edit(&mut self.view);
        let outcome = self.timer.reconcile(&self.view);
        let mut transition = self.transition(outcome, now, wall);
        transition.changed |= transition.snapshot != before;
        transition
    }

    /// A snapshot of the current state, without changing anything.
    pub fn snapshot(&mut self) -> PlaybackSnapshot {
        let now = self.clock.now();
        let wall = self.clock.wall();
        self.snapshot_at(now, wall)
    }

    fn transition(&self, outcome: Outcome, now: Millis, wall: Millis) -> Transition {
        Transition {
            snapshot: self.snapshot_at(now, wall),
            changed: outcome.changed,
            lifecycle: outcome.lifecycle,
        }
    }

    fn snapshot_at(&self, now: Millis, wall: Millis) -> PlaybackSnapshot {
        let state = self.timer.state();
        let selected_index = state
            .selected_event_id
            .as_ref()
            .and_then(|id| self.view.index_of(id));
        let remaining_ms = self.timer.remaining(&self.view, now, wall);
        PlaybackSnapshot {
            phase: state.phase,
            selected_event_id: state.selected_event_id.clone(),
            elapsed_ms: self.timer.elapsed(&self.view, now, wall),
            remaining_ms,
            added_delay_ms: state.added_delay_ms,
            clock_timestamp: now,
            overtime: remaining_ms < 0,
            selected_index: selected_index.and_then(|index| self.view.playable_position(index)),
            playable_count: self.view.playable_count(),
            timing: selected_index.and_then(|index| self.view.timing_at(index)),
        }
    }
}

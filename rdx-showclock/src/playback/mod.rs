//! Playback: the timer state machine and the dispatcher that serializes
//! commands and ticks into it.

mod command;
mod dispatcher;
mod timer;

#[cfg(test)]
mod timer_tests;

pub use command::Command;
pub use dispatcher::{CommandDispatcher, Transition};
pub use timer::{Outcome, TimerStateMachine};

use crate::common::{EntryId, Millis};
use serde::Serialize;
use std::fmt;

/// The five phases the engine can be in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No event active. Initial phase, re-entered by `stop`.
    #[default]
    Stopped,
    /// An event is selected but its timer has not started.
    Armed,
    Playing,
    Paused,
    /// Following the wall clock against the rundown's effective times.
    Rolling,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Stopped => "stopped",
            Phase::Armed => "armed",
            Phase::Playing => "playing",
            Phase::Paused => "paused",
            Phase::Rolling => "rolling",
        };
        f.write_str(label)
    }
}

/// The engine's own mutable state. One instance per engine, owned by the
/// timer state machine and only touched through the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackState {
    pub phase: Phase,
    pub selected_event_id: Option<EntryId>,
    /// Monotonic timestamp at which the current play segment began.
    pub started_at: Option<Millis>,
    /// Elapsed time banked across pause/resume cycles.
    pub paused_accumulated_ms: Millis,
    /// Ad hoc extension of the current event only. Never touches rundown delays.
    pub added_delay_ms: Millis,
    /// Overtime has already been reported for the current event.
    pub(crate) finished: bool,
    /// Rolling with an event selected whose window has not opened yet.
    pub(crate) roll_pending: bool,
}

impl PlaybackState {
    pub fn stopped() -> Self {
        Self {
            phase: Phase::Stopped,
            selected_event_id: None,
            started_at: None,
            paused_accumulated_ms: 0,
            added_delay_ms: 0,
            finished: false,
            roll_pending: false,
        }
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::stopped()
    }
}

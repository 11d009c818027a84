//! Defines all public event types broadcast by the Showclock engine.
//!
//! This module is the outbound contract of the engine. Observers (on-air
//! displays, stage-manager views, automation) subscribe to these streams;
//! how they are carried over the wire is up to the transport.

use crate::common::{EntryId, ListenerId, Millis};
use crate::playback::Phase;
use crate::rundown::EffectiveTiming;
use serde::Serialize;
use tokio::time::Instant;

/// A read-only picture of the playback state at one instant.
///
/// Pushed after every accepted change and on every tick while not stopped.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub phase: Phase,
    pub selected_event_id: Option<EntryId>,
    pub elapsed_ms: Millis,
    /// Negative while in overtime.
    pub remaining_ms: Millis,
    pub added_delay_ms: Millis,
    /// Monotonic engine time the snapshot was taken at.
    pub clock_timestamp: Millis,
    pub overtime: bool,
    /// Position of the selected event among the playable events. Control
    /// surfaces use it with `playable_count` to grey out first/last navigation.
    pub selected_index: Option<usize>,
    pub playable_count: usize,
    /// Effective timing of the selected event.
    pub timing: Option<EffectiveTiming>,
}

/// Points in an event's life that integrations can hook into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerLifecycle {
    OnLoad,
    OnStart,
    OnPause,
    OnStop,
    /// Every tick while the timer runs.
    OnUpdate,
    /// Fired once when the event runs out of time.
    OnFinish,
}

/// A lifecycle point together with the state that triggered it.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub cycle: TimerLifecycle,
    pub snapshot: PlaybackSnapshot,
}

/// Events related to the lifecycle and health of the engine itself.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Fired once when the engine's actor loop begins.
    EngineStarted { timestamp: Instant },
    /// Fired once when the engine's actor loop has exited.
    EngineShutdown,
    /// Fired when an integration listener is added.
    ListenerAdded { id: ListenerId },
    /// Fired when an integration listener is removed.
    ListenerRemoved { id: ListenerId },
    /// A command was refused. The sender also gets the reason directly.
    CommandRejected { command: String, reason: &'static str },
    /// The engine missed rundown notifications and re-read the whole rundown.
    RundownResynced { entries: usize },
}

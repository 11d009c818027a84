//! # Showclock
//!
//! A playback and timer engine for live show control.
//!
//! Showclock follows an ordered rundown of events, delays and blocks, runs
//! a countdown for the selected event, and tells every observer what the
//! show clock says right now. It is a library: transports (OSC, HTTP,
//! websockets) and persistence live in the application around it.
//!
//! ## Core Concepts
//!
//! - **Rundown**: An ordered list of entries. Delays shift every later
//!   event; blocks are headers and never play. The `RundownStore` owns it
//!   and announces each edit.
//! - **Timer State Machine**: Five phases (stopped, armed, playing, paused,
//!   rolling) and a fixed table of which command is legal where. A rejected
//!   command never changes anything.
//! - **Roll Mode**: The engine follows the wall clock and plays whichever
//!   event's effective window contains the current time of day.
//! - **Single Writer**: One actor task owns all playback state. Commands,
//!   clock ticks and rundown edits are applied one at a time, and each
//!   committed result is broadcast as a `PlaybackSnapshot`.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use showclock::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Build a rundown and a store around it.
//!     let rundown: Rundown = vec![
//!         RundownEntry::from(ShowEvent::new("intro", "Intro", 0, 300_000)),
//!         RundownEntry::from(ShowEvent::new("talk", "Talk", 300_000, 1_800_000)),
//!     ]
//!     .into_iter()
//!     .collect();
//!     let store = Arc::new(RundownStore::new(rundown));
//!
//!     // 2. Create the engine.
//!     let engine = ShowclockEngine::new(ShowclockConfig::default(), store);
//!
//!     // 3. Subscribe before starting the engine.
//!     let mut snapshots = engine.subscribe_snapshots();
//!     tokio::spawn(async move {
//!         while let Ok(snapshot) = snapshots.recv().await {
//!             println!("{:?} {}ms left", snapshot.phase, snapshot.remaining_ms);
//!         }
//!     });
//!
//!     // 4. Hook into the timer lifecycle.
//!     engine
//!         .on_lifecycle(TimerLifecycle::OnFinish, |snapshot| {
//!             println!("{:?} is over time", snapshot.selected_event_id);
//!         })
//!         .await;
//!
//!     // 5. Run the engine. It will shut down on Ctrl+C.
//!     engine.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Showclock Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod playback;
pub mod rundown;
pub mod time;

/// A prelude module for easy importing of the most common Showclock types.
pub mod prelude {
    pub use crate::common::{format_millis, EntryId, ListenerId, Millis};
    pub use crate::config::{ClockResolution, ShowclockConfig};
    pub use crate::engine::ShowclockEngine;
    pub use crate::error::{RejectedCommand, RundownError};
    pub use crate::events::{LifecycleEvent, PlaybackSnapshot, SystemEvent, TimerLifecycle};
    pub use crate::playback::{Command, Phase, Transition};
    pub use crate::rundown::{
        BlockEntry, DelayEntry, Rundown, RundownEntry, RundownStore, ShowEvent,
    };
}

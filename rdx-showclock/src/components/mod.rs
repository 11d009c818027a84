//! Contains the building blocks integrations use to react to playback.
//!
//! The `ShowclockEngine` keeps a registry of these components and drives
//! them from its actor loop, right after each transition is committed.

pub mod watcher;

//! The rundown: the ordered running order of a show.
//!
//! A rundown is a flat list of entries. Show order is array order; the
//! authored times of events do not reorder anything. Three kinds of entry
//! exist:
//!
//! - **Event**: a timed item the engine can play.
//! - **Delay**: a signed shift applied to every event after it.
//! - **Block**: a visual grouping marker with no timing.
//!
//! The engine never edits a rundown. `RundownStore` is the editing side,
//! `RundownView` is the engine's read-only projection of it.

mod store;
mod view;

pub use store::{ChangeKind, RundownChange, RundownStore};
pub use view::{EffectiveTiming, RollTarget, RundownView};

use crate::common::{EntryId, Millis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A timed item in the running order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowEvent {
    pub id: EntryId,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub presenter: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub colour: String,
    /// Authored start, in ms from the nominal day start.
    pub time_start: Millis,
    /// Authored end, in ms from the nominal day start.
    pub time_end: Millis,
    /// Set when the operator typed a duration rather than an end time.
    #[serde(default)]
    pub duration_override: Option<Millis>,
    #[serde(default)]
    pub is_public: bool,
    /// Skipped events stay addressable by id but are never navigated to.
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub revision: u32,
    /// Free-form user columns (`user0`..`user9` in most setups).
    #[serde(default)]
    pub user_fields: BTreeMap<String, String>,
}

impl ShowEvent {
    pub fn new(id: impl Into<EntryId>, title: impl Into<String>, time_start: Millis, time_end: Millis) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subtitle: String::new(),
            presenter: String::new(),
            note: String::new(),
            colour: String::new(),
            time_start,
            time_end,
            duration_override: None,
            is_public: false,
            skip: false,
            revision: 0,
            user_fields: BTreeMap::new(),
        }
    }

    /// Authored duration: the override if present, else `time_end - time_start`.
    /// May be negative for a badly authored event; callers clamp.
    pub fn duration(&self) -> Millis {
        self.duration_override
            .unwrap_or(self.time_end.saturating_sub(self.time_start))
    }

    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }
}

/// Shifts every following event by `duration` ms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayEntry {
    pub id: EntryId,
    pub duration: Millis,
    #[serde(default)]
    pub revision: u32,
}

impl DelayEntry {
    pub fn new(id: impl Into<EntryId>, duration: Millis) -> Self {
        Self {
            id: id.into(),
            duration,
            revision: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub id: EntryId,
    #[serde(default)]
    pub title: String,
}

impl BlockEntry {
    pub fn new(id: impl Into<EntryId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// One row of the running order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RundownEntry {
    Event(ShowEvent),
    Delay(DelayEntry),
    Block(BlockEntry),
}

impl RundownEntry {
    pub fn id(&self) -> &EntryId {
        match self {
            RundownEntry::Event(event) => &event.id,
            RundownEntry::Delay(delay) => &delay.id,
            RundownEntry::Block(block) => &block.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RundownEntry::Event(_) => "event",
            RundownEntry::Delay(_) => "delay",
            RundownEntry::Block(_) => "block",
        }
    }

    /// Events that are not skipped. Only these are reachable by navigation.
    pub fn is_playable(&self) -> bool {
        matches!(self, RundownEntry::Event(event) if !event.skip)
    }

    pub fn as_event(&self) -> Option<&ShowEvent> {
        match self {
            RundownEntry::Event(event) => Some(event),
            _ => None,
        }
    }

    /// Bumps the entry's revision counter. Blocks carry no revision.
    pub(crate) fn bump_revision(&mut self, base: u32) -> Option<u32> {
        match self {
            RundownEntry::Event(event) => {
                event.revision = base + 1;
                Some(event.revision)
            }
            RundownEntry::Delay(delay) => {
                delay.revision = base + 1;
                Some(delay.revision)
            }
            RundownEntry::Block(_) => None,
        }
    }

    pub(crate) fn revision(&self) -> u32 {
        match self {
            RundownEntry::Event(event) => event.revision,
            RundownEntry::Delay(delay) => delay.revision,
            RundownEntry::Block(_) => 0,
        }
    }
}

impl From<ShowEvent> for RundownEntry {
    fn from(event: ShowEvent) -> Self {
        RundownEntry::Event(event)
    }
}

impl From<DelayEntry> for RundownEntry {
    fn from(delay: DelayEntry) -> Self {
        RundownEntry::Delay(delay)
    }
}

impl From<BlockEntry> for RundownEntry {
    fn from(block: BlockEntry) -> Self {
        RundownEntry::Block(block)
    }
}

/// An immutable snapshot of the running order.
///
/// Shared as `Arc<Rundown>`. Edits build a new snapshot and swap it in whole,
/// so a reader never sees a half-applied edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rundown {
    entries: Vec<RundownEntry>,
}

impl Rundown {
    pub fn new(entries: Vec<RundownEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RundownEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RundownEntry> {
        self.entries.get(index)
    }

    pub fn position(&self, id: &EntryId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id() == id)
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<RundownEntry> {
        &mut self.entries
    }
}

impl FromIterator<RundownEntry> for Rundown {
    fn from_iter<I: IntoIterator<Item = RundownEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

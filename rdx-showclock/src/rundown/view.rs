//! The engine's read-only projection of the rundown.
//!
//! `RundownView` holds one `Arc<Rundown>` snapshot plus a cache derived from
//! it: the effective timing of every event after delay accumulation, an
//! id-to-index map and the sorted list of playable indices. The cache is
//! refreshed from change notifications. Structural changes rebuild it;
//! field edits only touch the entries from the edit point onward.

use super::{ChangeKind, Rundown, RundownChange, RundownEntry, ShowEvent};
use crate::common::{EntryId, Millis};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// An event's timing with all preceding delays applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveTiming {
    pub start: Millis,
    pub end: Millis,
    pub duration: Millis,
}

impl EffectiveTiming {
    /// Whether `wall` falls inside `[start, end)`.
    pub fn contains(&self, wall: Millis) -> bool {
        self.start <= wall && wall < self.end
    }
}

/// Where roll mode should be at a given wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollTarget {
    /// The event at this index is on air now.
    Active(usize),
    /// Between two windows; this is the next event to open.
    Pending(usize),
    /// Before the first window of the day; this is the first to open.
    BeforeFirst(usize),
    /// Every window has closed.
    Exhausted,
}

pub struct RundownView {
    rundown: Arc<Rundown>,
    index: HashMap<EntryId, usize>,
    /// Sum of delay durations positioned strictly before each index.
    delay_before: Vec<Millis>,
    timings: Vec<Option<EffectiveTiming>>,
    /// Indices of playable events, ascending.
    playable: Vec<usize>,
}

impl RundownView {
    pub fn new(rundown: Arc<Rundown>) -> Self {
        let mut view = Self {
            rundown,
            index: HashMap::new(),
            delay_before: Vec::new(),
            timings: Vec::new(),
            playable: Vec::new(),
        };
        view.rebuild();
        view
    }

    pub fn rundown(&self) -> &Arc<Rundown> {
        &self.rundown
    }

    pub fn entry_at(&self, index: usize) -> Option<&RundownEntry> {
        self.rundown.get(index)
    }

    pub fn event_at(&self, index: usize) -> Option<&ShowEvent> {
        self.entry_at(index).and_then(RundownEntry::as_event)
    }

    pub fn index_of(&self, id: &EntryId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn first_playable(&self) -> Option<usize> {
        self.playable.first().copied()
    }

    pub fn last_playable(&self) -> Option<usize> {
        self.playable.last().copied()
    }

    /// The first playable index strictly after `index`.
    pub fn next_playable(&self, index: usize) -> Option<usize> {
        let pos = self.playable.partition_point(|&i| i <= index);
        self.playable.get(pos).copied()
    }

    /// The last playable index strictly before `index`.
    pub fn previous_playable(&self, index: usize) -> Option<usize> {
        let pos = self.playable.partition_point(|&i| i < index);
        pos.checked_sub(1).map(|p| self.playable[p])
    }

    pub fn playable_count(&self) -> usize {
        self.playable.len()
    }

    /// Zero-based position of `index` among the playable events.
    pub fn playable_position(&self, index: usize) -> Option<usize> {
        self.playable.binary_search(&index).ok()
    }

    pub fn timing_at(&self, index: usize) -> Option<EffectiveTiming> {
        self.timings.get(index).copied().flatten()
    }

    pub fn effective_timing(&self, id: &EntryId) -> Option<EffectiveTiming> {
        self.index_of(id).and_then(|index| self.timing_at(index))
    }

    /// Resolves which event roll mode should follow at `wall` ms.
    ///
    /// The first playable event (in show order) whose window contains `wall`
    /// wins. Otherwise the earliest window still to open is returned, flagged
    /// as `BeforeFirst` when no window has opened yet today.
    pub fn roll_target(&self, wall: Millis) -> RollTarget {
        let mut upcoming: Option<(usize, Millis)> = None;
        let mut any_opened = false;
        for &index in &self.playable {
            let Some(timing) = self.timing_at(index) else {
                continue;
            };
            if timing.contains(wall) {
                return RollTarget::Active(index);
            }
            if timing.start > wall {
                if upcoming.map_or(true, |(_, start)| timing.start < start) {
                    upcoming = Some((index, timing.start));
                }
            } else {
                any_opened = true;
            }
        }
        match upcoming {
            Some((index, _)) if any_opened => RollTarget::Pending(index),
            Some((index, _)) => RollTarget::BeforeFirst(index),
            None => RollTarget::Exhausted,
        }
    }

    /// Swaps in the rundown carried by `change` and refreshes the cache.
    pub fn apply_change(&mut self, change: &RundownChange) {
        let previous_len = self.rundown.len();
        self.rundown = change.rundown.clone();

        let in_place = change.kind == ChangeKind::Update
            && previous_len == self.rundown.len()
            && self
                .rundown
                .get(change.position)
                .is_some_and(|entry| entry.id() == &change.affected_id);

        if in_place {
            self.refresh_from(change.position);
        } else {
            if !change.kind.is_structural() {
                debug!(id = %change.affected_id, "Stale update notification, rebuilding rundown cache.");
            }
            self.rebuild();
        }
    }

    /// Replaces the whole snapshot, e.g. after missing notifications.
    pub fn replace(&mut self, rundown: Arc<Rundown>) {
        self.rundown = rundown;
        self.rebuild();
    }

    fn rebuild(&mut self) {
        let len = self.rundown.len();
        self.index.clear();
        self.index.reserve(len);
        self.delay_before.clear();
        self.delay_before.reserve(len);
        self.timings.clear();
        self.timings.reserve(len);
        self.playable.clear();

        let rundown = self.rundown.clone();
        let mut accumulated: Millis = 0;
        for (index, entry) in rundown.entries().iter().enumerate() {
            self.index.insert(entry.id().clone(), index);
            self.delay_before.push(accumulated);
            self.timings.push(effective_timing(entry, accumulated));
            if entry.is_playable() {
                self.playable.push(index);
            }
            if let RundownEntry::Delay(delay) = entry {
                accumulated = accumulated.saturating_add(delay.duration);
            }
        }
    }

    /// Recomputes cached values for an in-place edit at `position`.
    fn refresh_from(&mut self, position: usize) {
        let rundown = self.rundown.clone();
        let entries = rundown.entries();

        // A delay edit changes the offset of everything after it; any other
        // edit only changes its own row.
        let end = match entries[position] {
            RundownEntry::Delay(_) => entries.len(),
            _ => position + 1,
        };
        let mut accumulated = self.delay_before[position];
        for (index, entry) in entries.iter().enumerate().take(end).skip(position) {
            self.delay_before[index] = accumulated;
            self.timings[index] = effective_timing(entry, accumulated);
            if let RundownEntry::Delay(delay) = entry {
                accumulated = accumulated.saturating_add(delay.duration);
            }
        }

        let was_playable = self.playable.binary_search(&position).is_ok();
        if was_playable != entries[position].is_playable() {
            let keep = self.playable.partition_point(|&i| i < position);
            self.playable.truncate(keep);
            self.playable.extend(
                entries
                    .iter()
                    .enumerate()
                    .skip(position)
                    .filter(|(_, entry)| entry.is_playable())
                    .map(|(index, _)| index),
            );
        }
    }
}

fn effective_timing(entry: &RundownEntry, delay: Millis) -> Option<EffectiveTiming> {
    let event = entry.as_event()?;
    let mut duration = event.duration();
    if duration < 0 {
        warn!(
            id = %event.id,
            duration,
            "Event has a negative duration, clamping to zero."
        );
        duration = 0;
    }
    let start = event.time_start.saturating_add(delay);
    Some(EffectiveTiming {
        start,
        end: start.saturating_add(duration),
        duration,
    })
}

//! The editing side of the rundown.
//!
//! `RundownStore` owns the current `Arc<Rundown>` and applies edits by
//! copy-on-write: each edit clones the entry list, changes it and swaps the
//! new snapshot in under the write lock. Every successful edit is announced
//! on a broadcast channel as a `RundownChange` carrying the new snapshot, so
//! subscribers never have to read the store again to catch up.

use super::{Rundown, RundownEntry};
use crate::common::EntryId;
use crate::error::RundownError;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// What kind of edit happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Remove,
    Reorder,
}

impl ChangeKind {
    /// Structural changes shift positions and need a full recompute.
    pub fn is_structural(self) -> bool {
        !matches!(self, ChangeKind::Update)
    }
}

/// Notification sent after every applied edit.
#[derive(Debug, Clone)]
pub struct RundownChange {
    pub kind: ChangeKind,
    pub affected_id: EntryId,
    /// Position of the affected entry. For a removal, where it used to be;
    /// for a reorder, where it is now.
    pub position: usize,
    /// The entry's revision after the edit, for optimistic-concurrency editors.
    pub revision: Option<u32>,
    /// The rundown as it stands after this edit.
    pub rundown: Arc<Rundown>,
}

pub struct RundownStore {
    current: RwLock<Arc<Rundown>>,
    change_sender: broadcast::Sender<RundownChange>,
}

impl RundownStore {
    pub fn new(rundown: Rundown) -> Self {
        let (change_sender, _) = broadcast::channel(64);
        Self {
            current: RwLock::new(Arc::new(rundown)),
            change_sender,
        }
    }

    /// The current snapshot.
    pub async fn snapshot(&self) -> Arc<Rundown> {
        self.current.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RundownChange> {
        self.change_sender.subscribe()
    }

    /// Inserts `entry` right after `after`, or at the end when `after` is `None`.
    pub async fn insert(
        &self,
        entry: RundownEntry,
        after: Option<&EntryId>,
    ) -> Result<RundownChange, RundownError> {
        let mut current = self.current.write().await;
        if current.position(entry.id()).is_some() {
            return Err(RundownError::DuplicateId(entry.id().clone()));
        }
        let position = match after {
            Some(anchor) => current
                .position(anchor)
                .map(|index| index + 1)
                .ok_or_else(|| RundownError::UnknownAnchor(anchor.clone()))?,
            None => current.len(),
        };
        let mut next = Rundown::clone(&current);
        let id = entry.id().clone();
        let revision = Some(entry.revision()).filter(|_| !matches!(entry, RundownEntry::Block(_)));
        next.entries_mut().insert(position, entry);
        Ok(self.commit(&mut current, next, ChangeKind::Insert, id, position, revision))
    }

    /// Replaces the entry with the same id in place, bumping its revision.
    /// An entry cannot change kind through an update.
    pub async fn update(&self, entry: RundownEntry) -> Result<RundownChange, RundownError> {
        let mut current = self.current.write().await;
        let id = entry.id().clone();
        let position = current
            .position(&id)
            .ok_or_else(|| RundownError::UnknownEntry(id.clone()))?;
        let previous = &current.entries()[position];
        if previous.kind() != entry.kind() {
            return Err(RundownError::KindMismatch {
                id,
                from: previous.kind(),
                to: entry.kind(),
            });
        }
        let base = previous.revision();
        let mut entry = entry;
        let revision = entry.bump_revision(base);
        let mut next = Rundown::clone(&current);
        next.entries_mut()[position] = entry;
        Ok(self.commit(&mut current, next, ChangeKind::Update, id, position, revision))
    }

    pub async fn remove(&self, id: &EntryId) -> Result<RundownChange, RundownError> {
        let mut current = self.current.write().await;
        let position = current
            .position(id)
            .ok_or_else(|| RundownError::UnknownEntry(id.clone()))?;
        let mut next = Rundown::clone(&current);
        next.entries_mut().remove(position);
        Ok(self.commit(&mut current, next, ChangeKind::Remove, id.clone(), position, None))
    }

    /// Moves an entry to sit right after `after`, or to the front when `after` is `None`.
    pub async fn reorder(
        &self,
        id: &EntryId,
        after: Option<&EntryId>,
    ) -> Result<RundownChange, RundownError> {
        let mut current = self.current.write().await;
        let from = current
            .position(id)
            .ok_or_else(|| RundownError::UnknownEntry(id.clone()))?;
        let mut next = Rundown::clone(&current);
        let entry = next.entries_mut().remove(from);
        let position = match after {
            Some(anchor) => next
                .position(anchor)
                .map(|index| index + 1)
                .ok_or_else(|| RundownError::UnknownAnchor(anchor.clone()))?,
            None => 0,
        };
        next.entries_mut().insert(position, entry);
        Ok(self.commit(&mut current, next, ChangeKind::Reorder, id.clone(), position, None))
    }

    fn commit(
        &self,
        current: &mut Arc<Rundown>,
        next: Rundown,
        kind: ChangeKind,
        affected_id: EntryId,
        position: usize,
        revision: Option<u32>,
    ) -> RundownChange {
        let snapshot = Arc::new(next);
        *current = snapshot.clone();
        debug!(?kind, id = %affected_id, position, "Rundown edited.");
        let change = RundownChange {
            kind,
            affected_id,
            position,
            revision,
            rundown: snapshot,
        };
        self.change_sender.send(change.clone()).ok();
        change
    }
}

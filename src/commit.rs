//! # Commit Batches
//!
//! Staged creations, property sets and deletions accumulate in a
//! [`CommitBatch`] until [`crate::RhythmDb::commit`] takes the batch and
//! applies it to the committed table in one step.
//!
//! Operations on different entries commute, so the batch keeps one record
//! per entry (in first-staged order) and replays that entry's operations in
//! the order they were staged. Repeated sets of one key coalesce: the change
//! reported for the key carries the value before the batch and the value
//! after it, and a key whose final value equals its old value is not
//! reported at all.

use std::collections::HashMap;
use std::sync::Arc;

use crate::entry::{Entry, EntryId, PropKey, Value};

/// One effective property change delivered with `entry-changed`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropChange {
    pub key: PropKey,
    pub old: Value,
    pub new: Value,
}

/// Counts of what a commit made observable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub added: usize,
    pub changed: usize,
    pub deleted: usize,
    /// Entries created and deleted within the same batch.
    pub discarded: usize,
}

impl CommitSummary {
    pub fn is_empty(&self) -> bool {
        self.added + self.changed + self.deleted + self.discarded == 0
    }
}

/// Store notification produced by applying a batch.
#[derive(Debug, Clone)]
pub(crate) enum Notification {
    Added(Arc<Entry>),
    Changed(Arc<Entry>, Vec<PropChange>),
    Deleted(Arc<Entry>),
}

#[derive(Debug, Default)]
struct Pending {
    created: Option<Entry>,
    sets: Vec<(PropKey, Value)>,
    deleted: bool,
}

/// Staged operations since the last commit.
#[derive(Debug, Default)]
pub(crate) struct CommitBatch {
    order: Vec<EntryId>,
    pending: HashMap<EntryId, Pending>,
}

/// Result of [`CommitBatch::apply`].
#[derive(Debug, Default)]
pub(crate) struct Applied {
    pub notifications: Vec<Notification>,
    /// Identity keys of entries whose deletion took effect.
    pub released: Vec<((u32, String), EntryId)>,
    pub summary: CommitSummary,
}

impl CommitBatch {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of entries with staged work.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    fn pending_mut(&mut self, id: EntryId) -> &mut Pending {
        let order = &mut self.order;
        self.pending.entry(id).or_insert_with(|| {
            order.push(id);
            Pending::default()
        })
    }

    pub fn stage_create(&mut self, entry: Entry) {
        let id = entry.id();
        self.pending_mut(id).created = Some(entry);
    }

    pub fn stage_set(&mut self, id: EntryId, key: PropKey, value: Value) {
        self.pending_mut(id).sets.push((key, value));
    }

    pub fn stage_delete(&mut self, id: EntryId) {
        self.pending_mut(id).deleted = true;
    }

    pub fn is_deleted(&self, id: EntryId) -> bool {
        self.pending.get(&id).is_some_and(|pending| pending.deleted)
    }

    /// The creation-time state of an entry created in this batch.
    pub fn created(&self, id: EntryId) -> Option<&Entry> {
        self.pending.get(&id).and_then(|pending| pending.created.as_ref())
    }

    /// Applies every staged operation to `table`.
    pub fn apply(self, table: &mut HashMap<EntryId, Arc<Entry>>) -> Applied {
        let CommitBatch { order, mut pending } = self;
        let mut applied = Applied::default();

        for id in order {
            let Some(Pending {
                created,
                sets,
                deleted,
            }) = pending.remove(&id)
            else {
                continue;
            };

            if let Some(mut entry) = created {
                if deleted {
                    applied.released.push((identity(&entry), id));
                    applied.summary.discarded += 1;
                    continue;
                }
                for (key, value) in sets {
                    entry.set(key, value);
                }
                let entry = Arc::new(entry);
                table.insert(id, Arc::clone(&entry));
                applied.notifications.push(Notification::Added(entry));
                applied.summary.added += 1;
                continue;
            }

            if deleted {
                if let Some(entry) = table.remove(&id) {
                    applied.released.push((identity(&entry), id));
                    applied.notifications.push(Notification::Deleted(entry));
                    applied.summary.deleted += 1;
                } else {
                    log::warn!("dropping staged delete of missing entry {id}");
                }
                continue;
            }

            let Some(current) = table.get(&id) else {
                log::warn!("dropping {} staged sets on missing entry {id}", sets.len());
                continue;
            };
            let mut entry = Entry::clone(current);
            let changes = apply_sets(&mut entry, sets);
            if changes.is_empty() {
                continue;
            }
            let entry = Arc::new(entry);
            table.insert(id, Arc::clone(&entry));
            applied
                .notifications
                .push(Notification::Changed(entry, changes));
            applied.summary.changed += 1;
        }

        applied
    }
}

fn identity(entry: &Entry) -> (u32, String) {
    (entry.entry_type().id(), entry.location().to_string())
}

/// Replays `sets` on `entry`, returning the coalesced effective changes in
/// first-set order.
fn apply_sets(entry: &mut Entry, sets: Vec<(PropKey, Value)>) -> Vec<PropChange> {
    let mut originals: Vec<(PropKey, Value)> = Vec::new();
    for (key, value) in sets {
        if let Some(previous) = entry.set(key, value) {
            if !originals.iter().any(|(seen, _)| *seen == key) {
                originals.push((key, previous));
            }
        }
    }

    originals
        .into_iter()
        .filter_map(|(key, old)| {
            let new = entry.get(key)?;
            (new != old).then_some(PropChange { key, old, new })
        })
        .collect()
}

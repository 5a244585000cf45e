//! Row events emitted by query models.

use std::sync::Arc;

use crate::commit::PropChange;
use crate::entry::Entry;

/// A change to a model's materialized rows. Events arrive in batches, one
/// per update, delivered after the whole update was applied. Deletions and
/// old positions refer to the rows before the update; insertions, changes
/// and new positions to the rows after it.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    RowInserted {
        entry: Arc<Entry>,
        position: usize,
    },
    /// `position` is where the row was before removal.
    RowDeleted {
        entry: Arc<Entry>,
        position: usize,
    },
    RowChanged {
        entry: Arc<Entry>,
        position: usize,
        changes: Vec<PropChange>,
    },
    RowMoved {
        entry: Arc<Entry>,
        old_position: usize,
        new_position: usize,
    },
}

impl ModelEvent {
    pub fn entry(&self) -> &Arc<Entry> {
        match self {
            ModelEvent::RowInserted { entry, .. }
            | ModelEvent::RowDeleted { entry, .. }
            | ModelEvent::RowChanged { entry, .. }
            | ModelEvent::RowMoved { entry, .. } => entry,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelEvent::RowInserted { .. } => "row-inserted",
            ModelEvent::RowDeleted { .. } => "row-deleted",
            ModelEvent::RowChanged { .. } => "row-changed",
            ModelEvent::RowMoved { .. } => "row-moved",
        }
    }
}

/// Subscriber to a model's row events.
///
/// Listeners run after the model has released its state lock, so they may
/// read the model. They must not mutate the model that is notifying them.
pub trait ModelListener: Send + Sync {
    fn row_event(&self, event: &ModelEvent);

    /// Called once after each batch of row events has been delivered.
    fn batch_finished(&self) {}
}

impl<F> ModelListener for F
where
    F: Fn(&ModelEvent) + Send + Sync,
{
    fn row_event(&self, event: &ModelEvent) {
        self(event)
    }
}

/// Handle returned by `QueryModel::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

//! Busy state and progress reporting for long-running bulk operations.
//!
//! Progress is advisory. It exists so a front end can show a status line
//! while an import or rescan stages thousands of changes; nothing in the
//! database depends on it.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Snapshot of the database's progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub text: String,
    /// Completed fraction in `0.0..=1.0`, or negative when indeterminate.
    pub fraction: f64,
}

impl Progress {
    pub fn idle() -> Self {
        Self {
            text: String::new(),
            fraction: 1.0,
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        self.fraction < 0.0
    }
}

#[derive(Debug)]
struct BulkState {
    text: String,
    total: Option<u64>,
    done: u64,
}

#[derive(Debug, Default)]
pub(crate) struct ProgressTracker {
    operations: Mutex<BTreeMap<u64, BulkState>>,
    next_id: Mutex<u64>,
}

impl ProgressTracker {
    pub fn begin(self: &Arc<Self>, text: String, total: Option<u64>) -> BulkOperation {
        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            *next
        };
        log::info!("bulk operation started: {text}");
        self.operations.lock().insert(
            id,
            BulkState {
                text,
                total,
                done: 0,
            },
        );
        BulkOperation {
            tracker: Arc::clone(self),
            id,
        }
    }

    pub fn is_busy(&self) -> bool {
        !self.operations.lock().is_empty()
    }

    /// Combined report over running operations. The most recently started
    /// operation supplies the text; the fraction is indeterminate unless every
    /// running operation knows its total.
    pub fn report(&self) -> Option<Progress> {
        let operations = self.operations.lock();
        let (_, latest) = operations.iter().next_back()?;

        let mut done = 0u64;
        let mut total = 0u64;
        for state in operations.values() {
            let Some(state_total) = state.total else {
                return Some(Progress {
                    text: latest.text.clone(),
                    fraction: -1.0,
                });
            };
            done += state.done.min(state_total);
            total += state_total;
        }

        let fraction = if total == 0 {
            0.0
        } else {
            done as f64 / total as f64
        };
        Some(Progress {
            text: latest.text.clone(),
            fraction,
        })
    }

    fn update(&self, id: u64, apply: impl FnOnce(&mut BulkState)) {
        if let Some(state) = self.operations.lock().get_mut(&id) {
            apply(state);
        }
    }

    fn finish(&self, id: u64) {
        if let Some(state) = self.operations.lock().remove(&id) {
            log::info!("bulk operation finished: {} ({} items)", state.text, state.done);
        }
    }
}

/// Guard for a running bulk operation. Dropping it ends the operation.
#[derive(Debug)]
pub struct BulkOperation {
    tracker: Arc<ProgressTracker>,
    id: u64,
}

impl BulkOperation {
    pub fn advance(&self, items: u64) {
        self.tracker.update(self.id, |state| state.done += items);
    }

    pub fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.tracker.update(self.id, |state| state.text = text);
    }

    pub fn set_total(&self, total: Option<u64>) {
        self.tracker.update(self.id, |state| state.total = total);
    }
}

impl Drop for BulkOperation {
    fn drop(&mut self) {
        self.tracker.finish(self.id);
    }
}

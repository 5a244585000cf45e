//! # Entry Store
//!
//! [`RhythmDb`] owns every entry, the entry-type registry and the staging
//! area. It is a cheap-to-clone handle around shared state, so producers on
//! other threads, query models and the commit worker all hold their own
//! clone.
//!
//! ## Staging and commit
//!
//! `create_entry`, `set_property` and `delete_entry` only stage work.
//! Nothing becomes observable until [`RhythmDb::commit`] applies the batch:
//! readers of committed state (`entry`, `get_property`, query models) keep
//! seeing the previous snapshot until then. Commits are serialized, and
//! observers are notified after the committed table has been updated, one
//! entry at a time and in staging order.
//!
//! Locks are taken staging first, table second. Observer callbacks run with
//! only the commit lock held; they may stage changes and read the store but
//! must not call [`RhythmDb::commit`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::commit::{CommitBatch, CommitSummary, Notification, PropChange};
use crate::config::DbConfig;
use crate::entry::{Entry, EntryId, PropKey, Value};
use crate::entry_type::{EntryType, EntryTypeDef, EntryTypeRegistry};
use crate::error::{DbError, Result};
use crate::progress::{BulkOperation, Progress, ProgressTracker};
use crate::query::Query;

/// Receiver of committed store changes.
///
/// Observers are held weakly and called in registration order.
pub trait EntryObserver: Send + Sync {
    fn entry_added(&self, entry: &Arc<Entry>);
    fn entry_changed(&self, entry: &Arc<Entry>, changes: &[PropChange]);
    fn entry_deleted(&self, entry: &Arc<Entry>);
}

#[derive(Debug, Default)]
struct Staging {
    batch: CommitBatch,
    /// `(type id, location)` of every committed or staged entry.
    identities: HashMap<(u32, String), EntryId>,
}

struct DbInner {
    config: DbConfig,
    types: RwLock<EntryTypeRegistry>,
    table: RwLock<HashMap<EntryId, Arc<Entry>>>,
    staging: Mutex<Staging>,
    next_id: AtomicU64,
    commit_lock: Mutex<()>,
    observers: Mutex<Vec<Weak<dyn EntryObserver>>>,
    progress: Arc<ProgressTracker>,
}

/// Handle to one database context.
#[derive(Clone)]
pub struct RhythmDb {
    inner: Arc<DbInner>,
}

impl std::fmt::Debug for RhythmDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhythmDb")
            .field("entries", &self.entry_count())
            .field("types", &self.inner.types.read().len())
            .finish()
    }
}

impl Default for RhythmDb {
    fn default() -> Self {
        Self::new()
    }
}

impl RhythmDb {
    /// Creates a database with default configuration and the built-in types.
    pub fn new() -> Self {
        Self::with_config(DbConfig::default())
    }

    pub fn with_config(config: DbConfig) -> Self {
        let mut types = EntryTypeRegistry::default();
        if config.register_builtin_types {
            for def in EntryTypeDef::builtins() {
                if let Err(error) = types.register(def) {
                    log::warn!("built-in entry type not registered: {error}");
                }
            }
        }

        Self {
            inner: Arc::new(DbInner {
                config,
                types: RwLock::new(types),
                table: RwLock::new(HashMap::new()),
                staging: Mutex::new(Staging::default()),
                next_id: AtomicU64::new(1),
                commit_lock: Mutex::new(()),
                observers: Mutex::new(Vec::new()),
                progress: Arc::new(ProgressTracker::default()),
            }),
        }
    }

    pub fn config(&self) -> &DbConfig {
        &self.inner.config
    }

    // --- entry types -------------------------------------------------------

    /// Registers an entry type; idempotent for identical definitions.
    pub fn register_type(&self, def: EntryTypeDef) -> Result<EntryType> {
        self.inner.types.write().register(def)
    }

    pub fn entry_type(&self, name: &str) -> Option<EntryType> {
        self.inner.types.read().get(name)
    }

    pub fn entry_types(&self) -> Vec<EntryType> {
        self.inner.types.read().iter().cloned().collect()
    }

    /// Parses a JSON query, resolving entry types against this database.
    pub fn query_from_json(&self, json: &str) -> Result<Query> {
        Query::from_json(json, &self.inner.types.read())
    }

    // --- staging -----------------------------------------------------------

    /// Stages a new entry and returns its identity.
    ///
    /// The entry is visible to readers after the next commit; until then
    /// `get_property` reports its creation defaults.
    pub fn create_entry(
        &self,
        entry_type: &EntryType,
        location: impl Into<String>,
    ) -> Result<EntryId> {
        if !self.inner.types.read().contains(entry_type) {
            return Err(DbError::UnknownEntryType(entry_type.name().to_string()));
        }

        let location = location.into();
        let mut staging = self.inner.staging.lock();
        let key = (entry_type.id(), location);
        if staging.identities.contains_key(&key) {
            return Err(DbError::DuplicateEntry {
                entry_type: entry_type.name().to_string(),
                location: key.1,
            });
        }

        let id = EntryId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Entry::new(id, entry_type.clone(), key.1.clone());
        staging.batch.stage_create(entry);
        staging.identities.insert(key, id);
        log::trace!("staged creation of {id}");
        Ok(id)
    }

    /// Stages a property change.
    pub fn set_property(&self, id: EntryId, key: PropKey, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let mut staging = self.inner.staging.lock();
        let entry_type = self.resolve_type(&staging, id)?;

        if key.is_read_only() {
            return Err(DbError::ReadOnlyProperty(key));
        }
        if !entry_type.defines(key) {
            return Err(DbError::UnknownProperty {
                key,
                entry_type: entry_type.name().to_string(),
            });
        }
        if value.kind() != key.kind() {
            return Err(DbError::TypeMismatch {
                key,
                expected: key.kind(),
                actual: value.kind(),
            });
        }

        staging.batch.stage_set(id, key, value);
        Ok(())
    }

    /// Stages a deletion. Property access fails from now on.
    pub fn delete_entry(&self, id: EntryId) -> Result<()> {
        let mut staging = self.inner.staging.lock();
        self.resolve_type(&staging, id)?;
        staging.batch.stage_delete(id);
        Ok(())
    }

    fn resolve_type(&self, staging: &Staging, id: EntryId) -> Result<EntryType> {
        if staging.batch.is_deleted(id) {
            return Err(DbError::EntryDeleted(id));
        }
        if let Some(entry) = self.inner.table.read().get(&id) {
            return Ok(entry.entry_type().clone());
        }
        if let Some(entry) = staging.batch.created(id) {
            return Ok(entry.entry_type().clone());
        }
        Err(self.missing(id))
    }

    fn missing(&self, id: EntryId) -> DbError {
        if id.0 > 0 && id.0 < self.inner.next_id.load(Ordering::Relaxed) {
            DbError::EntryDeleted(id)
        } else {
            DbError::UnknownEntry(id)
        }
    }

    // --- reading -----------------------------------------------------------

    /// Reads a committed property value.
    pub fn get_property(&self, id: EntryId, key: PropKey) -> Result<Value> {
        let staging = self.inner.staging.lock();
        if staging.batch.is_deleted(id) {
            return Err(DbError::EntryDeleted(id));
        }

        let read = |entry: &Entry| {
            entry.get(key).ok_or_else(|| DbError::UnknownProperty {
                key,
                entry_type: entry.entry_type().name().to_string(),
            })
        };
        if let Some(entry) = self.inner.table.read().get(&id) {
            return read(entry.as_ref());
        }
        match staging.batch.created(id) {
            Some(entry) => read(entry),
            None => Err(self.missing(id)),
        }
    }

    /// The committed snapshot of an entry.
    pub fn entry(&self, id: EntryId) -> Option<Arc<Entry>> {
        self.inner.table.read().get(&id).cloned()
    }

    /// Looks up an entry, committed or staged, by its identity key.
    pub fn lookup(&self, entry_type: &EntryType, location: &str) -> Option<EntryId> {
        self.inner
            .staging
            .lock()
            .identities
            .get(&(entry_type.id(), location.to_string()))
            .copied()
    }

    /// Every committed entry, ordered by identity.
    pub fn snapshot(&self) -> Vec<Arc<Entry>> {
        let mut entries: Vec<Arc<Entry>> = self.inner.table.read().values().cloned().collect();
        entries.sort_unstable_by_key(|entry| entry.id());
        entries
    }

    pub fn entry_count(&self) -> usize {
        self.inner.table.read().len()
    }

    /// Committed entries of one type, ordered by identity.
    pub fn entries_of_type(&self, entry_type: &EntryType) -> Vec<Arc<Entry>> {
        let mut entries: Vec<Arc<Entry>> = self
            .inner
            .table
            .read()
            .values()
            .filter(|entry| entry.entry_type() == entry_type)
            .cloned()
            .collect();
        entries.sort_unstable_by_key(|entry| entry.id());
        entries
    }

    /// Entries matching `query`, ordered by identity.
    pub fn search(&self, query: &Query) -> Vec<Arc<Entry>> {
        self.snapshot()
            .into_iter()
            .filter(|entry| query.evaluate(entry))
            .collect()
    }

    // --- commit ------------------------------------------------------------

    /// Registers an observer of committed changes.
    pub fn add_observer(&self, observer: Weak<dyn EntryObserver>) {
        self.inner.observers.lock().push(observer);
    }

    /// Whether staged work is waiting for a commit.
    pub fn has_pending(&self) -> bool {
        !self.inner.staging.lock().batch.is_empty()
    }

    /// Applies all staged operations and notifies observers.
    pub fn commit(&self) -> CommitSummary {
        let _serial = self.inner.commit_lock.lock();

        let (notifications, summary) = {
            let mut staging = self.inner.staging.lock();
            if staging.batch.is_empty() {
                return CommitSummary::default();
            }
            let batch = std::mem::take(&mut staging.batch);
            let staged = batch.len();
            let applied = batch.apply(&mut self.inner.table.write());
            for (key, id) in applied.released {
                if staging.identities.get(&key) == Some(&id) {
                    staging.identities.remove(&key);
                }
            }
            log::debug!("committing {staged} staged entries: {:?}", applied.summary);
            (applied.notifications, applied.summary)
        };

        let observers = self.live_observers();
        for notification in &notifications {
            for observer in &observers {
                match notification {
                    Notification::Added(entry) => observer.entry_added(entry),
                    Notification::Changed(entry, changes) => observer.entry_changed(entry, changes),
                    Notification::Deleted(entry) => observer.entry_deleted(entry),
                }
            }
        }
        summary
    }

    fn live_observers(&self) -> Vec<Arc<dyn EntryObserver>> {
        let mut observers = self.inner.observers.lock();
        observers.retain(|observer| observer.strong_count() > 0);
        observers.iter().filter_map(Weak::upgrade).collect()
    }

    // --- progress ----------------------------------------------------------

    /// Starts a tracked bulk operation; dropping the guard ends it.
    pub fn begin_bulk(&self, text: impl Into<String>, total: Option<u64>) -> BulkOperation {
        self.inner.progress.begin(text.into(), total)
    }

    /// Whether a bulk operation is running or changes are staged.
    pub fn is_busy(&self) -> bool {
        self.inner.progress.is_busy() || self.has_pending()
    }

    /// Status text and completed fraction; a negative fraction means
    /// indeterminate.
    pub fn progress(&self) -> Progress {
        if let Some(report) = self.inner.progress.report() {
            return report;
        }
        let staged = self.inner.staging.lock().batch.len();
        if staged > 0 {
            Progress {
                text: format!("Saving {staged} changed entries"),
                fraction: -1.0,
            }
        } else {
            Progress::idle()
        }
    }
}

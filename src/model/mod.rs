//! # Query Models
//!
//! A [`QueryModel`] is a live, ordered view over entries. It holds the rows
//! of its source that pass its query and hidden-flag rules, keeps them in
//! sort order (or source order when unsorted), and emits [`ModelEvent`]s as
//! committed changes move entries in and out.
//!
//! ## Sources
//!
//! - [`ModelSource::Store`]: every committed entry of the database.
//! - [`ModelSource::Manual`]: only entries handed to [`QueryModel::add_entry`].
//!   The model still follows the store for changes and deletions of its
//!   members, and remembers members it is currently hiding so they come back
//!   when they match again.
//! - [`ModelSource::Chained`]: the visible rows of another model. A chained
//!   model never talks to the store; it follows its parent's row events, so
//!   filters compose.
//!
//! ## Example
//!
//! ```
//! use rhythmdb::{PropKey, Query, QueryTerm, RhythmDb};
//! use rhythmdb::model::{ModelOptions, ModelSource, QueryModel, SortKey, SortOrder};
//!
//! let db = RhythmDb::new();
//! let song = db.entry_type("song").unwrap();
//! let id = db.create_entry(&song, "file:///music/sin.ogg")?;
//! db.set_property(id, PropKey::Title, "Sin")?;
//! db.commit();
//!
//! let library = QueryModel::new(
//!     &db,
//!     ModelSource::Store,
//!     ModelOptions::new().with_sort(SortOrder::ascending(SortKey::Artist)),
//! );
//! let sin = Query::parse([QueryTerm::like(PropKey::SearchMatch, "sin")])?;
//! let search = QueryModel::new_chained(&library, ModelOptions::new().with_query(sin));
//! assert_eq!(search.entry_to_position(id), Some(0));
//! # Ok::<(), rhythmdb::DbError>(())
//! ```
//!
//! ## Locking
//!
//! Each model serializes its updates and computes them under an internal
//! lock, then delivers events with that lock released. A chained model may
//! read its parent's rows while holding its own lock; parents never lock
//! their children.

mod event;
mod rows;
mod sort;

pub use event::{ListenerId, ModelEvent, ModelListener};
pub use sort::{SortKey, SortOrder};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::commit::PropChange;
use crate::db::{EntryObserver, RhythmDb};
use crate::entry::{Entry, EntryId, PropKey};
use crate::query::Query;
use rows::{Row, RowSet};

/// Where a model takes its candidate entries from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    Store,
    Manual,
    Chained(Arc<QueryModel>),
}

impl ModelSource {
    pub fn name(&self) -> &'static str {
        match self {
            ModelSource::Store => "store",
            ModelSource::Manual => "manual",
            ModelSource::Chained(_) => "chained",
        }
    }
}

/// Construction options shared by every source kind.
#[derive(Debug, Clone, Default)]
pub struct ModelOptions {
    pub query: Option<Query>,
    pub sort: Option<SortOrder>,
    pub show_hidden: bool,
}

impl ModelOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_show_hidden(mut self, show_hidden: bool) -> Self {
        self.show_hidden = show_hidden;
        self
    }
}

/// Whether the model has computed its membership yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPhase {
    Empty,
    Populated,
}

#[derive(Debug)]
struct ModelState {
    query: Option<Query>,
    sort: Option<SortOrder>,
    show_hidden: bool,
    rows: RowSet,
    phase: ModelPhase,
    /// Manual models: every member, in playlist order.
    members: Vec<EntryId>,
    /// Manual models: members currently rejected by the query or hidden.
    parked: HashSet<EntryId>,
    /// Chained models: moves and insertions seen in the current parent batch.
    parent_moves: usize,
    parent_inserts: usize,
}

impl ModelState {
    fn accepts(&self, entry: &Entry) -> bool {
        (self.show_hidden || !entry.is_hidden())
            && self.query.as_ref().map_or(true, |query| query.evaluate(entry))
    }

    /// Whether `changes` can alter membership or order.
    fn affected_by(&self, changes: &[PropChange]) -> bool {
        changes.iter().any(|change| {
            change.key == PropKey::Hidden
                || self
                    .query
                    .as_ref()
                    .is_some_and(|query| query.depends_on(change.key))
                || self.sort.is_some_and(|order| order.depends_on(change.key))
        })
    }

    fn is_member(&self, id: EntryId) -> bool {
        self.rows.contains(id) || self.parked.contains(&id)
    }

    /// Row position of a manual member: the number of visible members that
    /// precede it in playlist order.
    fn member_position(&self, id: EntryId) -> usize {
        self.members
            .iter()
            .take_while(|member| **member != id)
            .filter(|member| self.rows.contains(**member))
            .count()
    }
}

/// A live, incrementally maintained view of entries.
pub struct QueryModel {
    db: RhythmDb,
    source: ModelSource,
    state: Mutex<ModelState>,
    update_lock: Mutex<()>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ModelListener>)>>,
    next_listener: AtomicU64,
    parent_link: Option<ListenerId>,
}

impl fmt::Debug for QueryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryModel")
            .field("source", &self.source.name())
            .field("rows", &self.count())
            .finish()
    }
}

/// Forwards a parent's row events to a chained child.
struct ChainLink(Weak<QueryModel>);

impl ModelListener for ChainLink {
    fn row_event(&self, event: &ModelEvent) {
        if let Some(child) = self.0.upgrade() {
            child.on_parent_event(event);
        }
    }

    fn batch_finished(&self) {
        if let Some(child) = self.0.upgrade() {
            child.on_parent_batch_finished();
        }
    }
}

impl QueryModel {
    /// Creates a model over `source`. Store and chained models are populated
    /// immediately; manual models start empty.
    pub fn new(db: &RhythmDb, source: ModelSource, options: ModelOptions) -> Arc<Self> {
        let populate = match source {
            ModelSource::Chained(parent) => return Self::new_chained(&parent, options),
            ModelSource::Store => true,
            ModelSource::Manual => false,
        };

        let model = Arc::new(Self::build(db.clone(), source, options, None));
        db.add_observer(Arc::downgrade(&model) as Weak<dyn EntryObserver>);
        if populate {
            model.rebuild();
        }
        model
    }

    /// A manual model with no query, no sort and hidden entries excluded.
    pub fn new_empty(db: &RhythmDb) -> Arc<Self> {
        Self::new(db, ModelSource::Manual, ModelOptions::default())
    }

    /// A model filtering the visible rows of `parent`.
    pub fn new_chained(parent: &Arc<QueryModel>, options: ModelOptions) -> Arc<Self> {
        let model = Arc::new_cyclic(|weak: &Weak<QueryModel>| {
            let link = parent.subscribe(ChainLink(weak.clone()));
            Self::build(
                parent.db.clone(),
                ModelSource::Chained(Arc::clone(parent)),
                options,
                Some(link),
            )
        });
        model.rebuild();
        model
    }

    fn build(
        db: RhythmDb,
        source: ModelSource,
        options: ModelOptions,
        parent_link: Option<ListenerId>,
    ) -> Self {
        let query = options.query.map(|mut query| {
            query.preprocess();
            query
        });
        Self {
            db,
            source,
            state: Mutex::new(ModelState {
                query,
                sort: options.sort,
                show_hidden: options.show_hidden,
                rows: RowSet::new(options.sort),
                phase: ModelPhase::Empty,
                members: Vec::new(),
                parked: HashSet::new(),
                parent_moves: 0,
                parent_inserts: 0,
            }),
            update_lock: Mutex::new(()),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            parent_link,
        }
    }

    // --- reading -----------------------------------------------------------

    pub fn db(&self) -> &RhythmDb {
        &self.db
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    pub fn phase(&self) -> ModelPhase {
        self.state.lock().phase
    }

    pub fn count(&self) -> usize {
        self.state.lock().rows.len()
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.state.lock().rows.contains(id)
    }

    pub fn entry_to_position(&self, id: EntryId) -> Option<usize> {
        self.state.lock().rows.position(id)
    }

    pub fn position_to_entry(&self, position: usize) -> Option<Arc<Entry>> {
        self.state
            .lock()
            .rows
            .get(position)
            .map(|row| Arc::clone(&row.entry))
    }

    /// Snapshots of the visible rows, in order.
    pub fn entries(&self) -> Vec<Arc<Entry>> {
        self.state
            .lock()
            .rows
            .iter()
            .map(|row| Arc::clone(&row.entry))
            .collect()
    }

    pub fn entry_ids(&self) -> Vec<EntryId> {
        self.state.lock().rows.iter().map(Row::id).collect()
    }

    pub fn query(&self) -> Option<Query> {
        self.state.lock().query.clone()
    }

    pub fn sort(&self) -> Option<SortOrder> {
        self.state.lock().sort
    }

    pub fn show_hidden(&self) -> bool {
        self.state.lock().show_hidden
    }

    // --- listeners ---------------------------------------------------------

    pub fn subscribe(&self, listener: impl ModelListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);
        listeners.len() != before
    }

    // --- membership --------------------------------------------------------

    /// Adds a committed entry. Sorted models place it by their sort order;
    /// unsorted models at `position` or the end. No-op if already present.
    /// Manual models keep that order across rebuilds, also for members they
    /// are currently hiding. Chained models forward the entry to their parent.
    pub fn add_entry(&self, id: EntryId, position: Option<usize>) {
        if let ModelSource::Chained(parent) = &self.source {
            parent.add_entry(id, None);
            return;
        }
        let Some(entry) = self.db.entry(id) else {
            log::warn!("not adding {id} to model: no committed entry");
            return;
        };
        let manual = matches!(self.source, ModelSource::Manual);

        self.update(|state, events| {
            if state.is_member(id) {
                return;
            }
            state.phase = ModelPhase::Populated;
            if manual {
                let before = position
                    .filter(|_| state.sort.is_none())
                    .and_then(|position| state.rows.get(position))
                    .map(Row::id)
                    .and_then(|next| state.members.iter().position(|member| *member == next));
                match before {
                    Some(index) => state.members.insert(index, id),
                    None => state.members.push(id),
                }
            }
            if state.accepts(&entry) {
                self.insert_row(state, entry, position, events);
            } else if manual {
                log::debug!("parking {id}: hidden or rejected by query");
                state.parked.insert(id);
            }
        });
    }

    /// Removes an entry. No-op if absent. Chained models forward the removal
    /// to their parent.
    pub fn remove_entry(&self, id: EntryId) {
        if let ModelSource::Chained(parent) = &self.source {
            parent.remove_entry(id);
            return;
        }
        self.update(|state, events| {
            state.parked.remove(&id);
            state.members.retain(|member| *member != id);
            if let Some((position, row)) = state.rows.remove(id) {
                events.push(ModelEvent::RowDeleted {
                    entry: row.entry,
                    position,
                });
            }
        });
    }

    // --- reconfiguration ---------------------------------------------------

    pub fn set_query(&self, query: Option<Query>) {
        let query = query.map(|mut query| {
            query.preprocess();
            query
        });
        self.reconfigure(move |state| state.query = query);
    }

    pub fn set_sort(&self, sort: Option<SortOrder>) {
        self.reconfigure(move |state| state.sort = sort);
    }

    pub fn set_show_hidden(&self, show_hidden: bool) {
        self.reconfigure(move |state| state.show_hidden = show_hidden);
    }

    /// Recomputes membership and order from the source, emitting events for
    /// the difference.
    pub fn rebuild(&self) {
        self.update(|state, events| self.rebuild_locked(state, events));
    }

    fn reconfigure(&self, change: impl FnOnce(&mut ModelState)) {
        self.update(|state, events| {
            change(state);
            self.rebuild_locked(state, events);
        });
    }

    fn rebuild_locked(&self, state: &mut ModelState, events: &mut Vec<ModelEvent>) {
        let candidates = match &self.source {
            ModelSource::Store => self.db.snapshot(),
            ModelSource::Manual => state
                .members
                .iter()
                .filter_map(|id| self.db.entry(*id))
                .collect(),
            ModelSource::Chained(parent) => parent.entries(),
        };

        let verdicts: Vec<(Arc<Entry>, bool)> = {
            let view: &ModelState = state;
            if candidates.len() >= self.db.config().parallel_threshold {
                candidates
                    .into_par_iter()
                    .map(|entry| {
                        let accepted = view.accepts(&entry);
                        (entry, accepted)
                    })
                    .collect()
            } else {
                candidates
                    .into_iter()
                    .map(|entry| {
                        let accepted = view.accepts(&entry);
                        (entry, accepted)
                    })
                    .collect()
            }
        };

        let mut desired = Vec::with_capacity(verdicts.len());
        state.parked.clear();
        for (entry, accepted) in verdicts {
            if accepted {
                desired.push(Row::new(entry, state.sort.as_ref()));
            } else if matches!(self.source, ModelSource::Manual) {
                state.parked.insert(entry.id());
            }
        }
        if let Some(order) = &state.sort {
            desired.sort_by(|a, b| order.compare(a, b));
        }
        Self::replace_rows(state, desired, events);

        if state.phase == ModelPhase::Empty {
            log::debug!(
                "{} model populated with {} rows",
                self.source.name(),
                state.rows.len()
            );
        }
        state.phase = ModelPhase::Populated;
    }

    /// Swaps in `desired` as the model's rows and records the difference.
    /// Rows that keep their order relative to the other surviving rows are
    /// not reported as moved.
    fn replace_rows(state: &mut ModelState, desired: Vec<Row>, events: &mut Vec<ModelEvent>) {
        let keep: HashSet<EntryId> = desired.iter().map(Row::id).collect();
        let mut survivors = HashMap::with_capacity(keep.len());
        let mut deleted = Vec::new();
        for (position, row) in state.rows.iter().enumerate() {
            if keep.contains(&row.id()) {
                let rank = survivors.len();
                survivors.insert(row.id(), (position, rank));
            } else {
                deleted.push(ModelEvent::RowDeleted {
                    entry: Arc::clone(&row.entry),
                    position,
                });
            }
        }
        events.extend(deleted.into_iter().rev());

        let mut rank = 0;
        for (target, row) in desired.iter().enumerate() {
            let entry = Arc::clone(&row.entry);
            match survivors.get(&row.id()) {
                Some(&(old_position, old_rank)) => {
                    if old_rank != rank {
                        events.push(ModelEvent::RowMoved {
                            entry,
                            old_position,
                            new_position: target,
                        });
                    }
                    rank += 1;
                }
                None => events.push(ModelEvent::RowInserted {
                    entry,
                    position: target,
                }),
            }
        }
        state.rows = RowSet::from_rows(state.sort, desired);
    }

    // --- source notifications ----------------------------------------------

    /// A new entry appeared upstream.
    pub fn on_source_entry_added(&self, entry: &Arc<Entry>) {
        if matches!(self.source, ModelSource::Manual) {
            return;
        }
        self.update(|state, events| {
            if state.phase == ModelPhase::Empty || state.rows.contains(entry.id()) {
                return;
            }
            if state.accepts(entry) {
                self.insert_row(state, Arc::clone(entry), None, events);
            }
        });
    }

    /// An upstream entry changed. Evaluation is skipped when no changed key
    /// touches the query, the sort order or the hidden flag.
    pub fn on_source_entry_changed(&self, entry: &Arc<Entry>, changes: &[PropChange]) {
        let manual = matches!(self.source, ModelSource::Manual);
        self.update(|state, events| {
            let id = entry.id();
            if state.phase == ModelPhase::Empty || (manual && !state.is_member(id)) {
                return;
            }

            if !state.affected_by(changes) {
                if let Some(position) = state.rows.position(id) {
                    state
                        .rows
                        .replace(position, Row::new(Arc::clone(entry), state.sort.as_ref()));
                    events.push(ModelEvent::RowChanged {
                        entry: Arc::clone(entry),
                        position,
                        changes: changes.to_vec(),
                    });
                }
                return;
            }

            let present = state.rows.contains(id);
            match (present, state.accepts(entry)) {
                (false, true) => {
                    state.parked.remove(&id);
                    self.insert_row(state, Arc::clone(entry), None, events);
                }
                (true, true) => self.update_row(state, entry, changes, events),
                (true, false) => {
                    if let Some((position, _)) = state.rows.remove(id) {
                        if manual {
                            state.parked.insert(id);
                        }
                        log::debug!("{id} no longer matches, removed from position {position}");
                        events.push(ModelEvent::RowDeleted {
                            entry: Arc::clone(entry),
                            position,
                        });
                    }
                }
                (false, false) => {}
            }
        });
    }

    /// An upstream entry went away.
    pub fn on_source_entry_deleted(&self, entry: &Arc<Entry>) {
        self.update(|state, events| {
            let id = entry.id();
            state.parked.remove(&id);
            state.members.retain(|member| *member != id);
            if let Some((position, _)) = state.rows.remove(id) {
                events.push(ModelEvent::RowDeleted {
                    entry: Arc::clone(entry),
                    position,
                });
            }
        });
    }

    fn on_parent_event(&self, event: &ModelEvent) {
        {
            let mut state = self.state.lock();
            match event {
                ModelEvent::RowMoved { .. } => state.parent_moves += 1,
                ModelEvent::RowInserted { .. } => state.parent_inserts += 1,
                _ => {}
            }
        }
        match event {
            ModelEvent::RowInserted { entry, .. } => self.on_source_entry_added(entry),
            ModelEvent::RowDeleted { entry, .. } => self.on_source_entry_deleted(entry),
            ModelEvent::RowChanged { entry, changes, .. } => {
                self.on_source_entry_changed(entry, changes)
            }
            ModelEvent::RowMoved { entry, .. } => self.follow_parent_move(entry),
        }
    }

    /// Placing rows one event at a time keeps the parent's order only while a
    /// batch moves a single row. When a batch reordered more, an unsorted
    /// child sorts its rows by their final parent positions.
    fn on_parent_batch_finished(&self) {
        let ModelSource::Chained(parent) = &self.source else {
            return;
        };
        self.update(|state, events| {
            let moves = std::mem::take(&mut state.parent_moves);
            let inserts = std::mem::take(&mut state.parent_inserts);
            if state.sort.is_some() || moves == 0 || moves + inserts < 2 {
                return;
            }

            let mut desired: Vec<Row> = state.rows.iter().cloned().collect();
            {
                let mut parent_state = parent.state.lock();
                parent_state.rows.settle();
                let parent_rows = &parent_state.rows;
                desired.sort_by_cached_key(|row| {
                    parent_rows.known_position(row.id()).unwrap_or(usize::MAX)
                });
            }
            log::debug!("chained model reordered after {moves} parent moves");
            Self::replace_rows(state, desired, events);
        });
    }

    /// Unsorted chained models mirror their parent's order.
    fn follow_parent_move(&self, entry: &Arc<Entry>) {
        self.update(|state, events| {
            if state.sort.is_some() {
                return;
            }
            let Some(old_position) = state.rows.position(entry.id()) else {
                return;
            };
            let row = state.rows.remove_at(old_position);
            let target = self.insertion_point(state, &row, None);
            let new_position = state.rows.insert(target, row);
            if new_position != old_position {
                events.push(ModelEvent::RowMoved {
                    entry: Arc::clone(entry),
                    old_position,
                    new_position,
                });
            }
        });
    }

    // --- row maintenance ---------------------------------------------------

    fn insert_row(
        &self,
        state: &mut ModelState,
        entry: Arc<Entry>,
        requested: Option<usize>,
        events: &mut Vec<ModelEvent>,
    ) {
        let row = Row::new(entry, state.sort.as_ref());
        let target = self.insertion_point(state, &row, requested);
        let entry = Arc::clone(&row.entry);
        let position = state.rows.insert(target, row);
        log::trace!("{} inserted at {position}", entry.id());
        events.push(ModelEvent::RowInserted { entry, position });
    }

    /// Refreshes a present row, repositioning it when its sort key changed.
    fn update_row(
        &self,
        state: &mut ModelState,
        entry: &Arc<Entry>,
        changes: &[PropChange],
        events: &mut Vec<ModelEvent>,
    ) {
        let Some(old_position) = state.rows.position(entry.id()) else {
            return;
        };
        let row = Row::new(Arc::clone(entry), state.sort.as_ref());
        let resort = state
            .sort
            .is_some_and(|order| changes.iter().any(|change| order.depends_on(change.key)));

        let position = if resort {
            state.rows.remove_at(old_position);
            let target = self.insertion_point(state, &row, None);
            let new_position = state.rows.insert(target, row);
            if new_position != old_position {
                events.push(ModelEvent::RowMoved {
                    entry: Arc::clone(entry),
                    old_position,
                    new_position,
                });
            }
            new_position
        } else {
            state.rows.replace(old_position, row);
            old_position
        };

        events.push(ModelEvent::RowChanged {
            entry: Arc::clone(entry),
            position,
            changes: changes.to_vec(),
        });
    }

    fn insertion_point(&self, state: &ModelState, row: &Row, requested: Option<usize>) -> usize {
        if state.sort.is_some() {
            return state.rows.sorted_position(row);
        }
        match &self.source {
            ModelSource::Chained(parent) => {
                let mut parent_state = parent.state.lock();
                parent_state.rows.settle();
                let parent_rows = &parent_state.rows;
                let rank = |id: EntryId| parent_rows.known_position(id).unwrap_or(usize::MAX);
                let target = rank(row.id());
                state
                    .rows
                    .partition_point(|existing| rank(existing.id()) < target)
            }
            ModelSource::Manual => state.member_position(row.id()),
            ModelSource::Store => requested.unwrap_or(usize::MAX),
        }
    }

    // --- delivery ----------------------------------------------------------

    fn update(&self, apply: impl FnOnce(&mut ModelState, &mut Vec<ModelEvent>)) {
        let _serial = self.update_lock.lock();
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            apply(&mut *state, &mut events);
        }
        self.emit(&events);
    }

    fn emit(&self, events: &[ModelEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners: Vec<Arc<dyn ModelListener>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for event in events {
            log::trace!("{} {}", event.name(), event.entry().id());
            for listener in &listeners {
                listener.row_event(event);
            }
        }
        for listener in &listeners {
            listener.batch_finished();
        }
    }
}

impl EntryObserver for QueryModel {
    fn entry_added(&self, entry: &Arc<Entry>) {
        self.on_source_entry_added(entry);
    }

    fn entry_changed(&self, entry: &Arc<Entry>, changes: &[PropChange]) {
        self.on_source_entry_changed(entry, changes);
    }

    fn entry_deleted(&self, entry: &Arc<Entry>) {
        self.on_source_entry_deleted(entry);
    }
}

impl Drop for QueryModel {
    fn drop(&mut self) {
        if let (ModelSource::Chained(parent), Some(link)) = (&self.source, self.parent_link) {
            parent.unsubscribe(link);
        }
    }
}

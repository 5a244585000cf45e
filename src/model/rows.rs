//! Materialized row storage: an ordered vector plus an entry → position
//! index.
//!
//! Shifting rows does not rewrite the index. Positions are exact below a
//! watermark; above it, sorted sets find a row by binary search on its cached
//! key and unsorted sets reindex the stale tail on demand. Appending keeps
//! the whole index exact.

use std::collections::HashMap;
use std::sync::Arc;

use super::sort::{SortField, SortOrder};
use crate::entry::{Entry, EntryId};

#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub entry: Arc<Entry>,
    /// Cached sort key; empty for unsorted models.
    pub key: Arc<[SortField]>,
}

impl Row {
    pub fn new(entry: Arc<Entry>, sort: Option<&SortOrder>) -> Self {
        let key = match sort {
            Some(order) => Arc::from(order.key_for(&entry)),
            None => Arc::from(Vec::<SortField>::new()),
        };
        Self { entry, key }
    }

    pub fn id(&self) -> EntryId {
        self.entry.id()
    }
}

#[derive(Debug, Clone)]
struct Slot {
    /// Last known position; exact only below `RowSet::clean`.
    position: usize,
    key: Arc<[SortField]>,
}

#[derive(Debug, Default)]
pub(crate) struct RowSet {
    order: Option<SortOrder>,
    rows: Vec<Row>,
    index: HashMap<EntryId, Slot>,
    /// Every row below this position has an exact slot. Rows at or above
    /// it never carry a slot position below it.
    clean: usize,
}

impl RowSet {
    pub fn new(order: Option<SortOrder>) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    /// Takes rows already arranged in their final order.
    pub fn from_rows(order: Option<SortOrder>, rows: Vec<Row>) -> Self {
        let index = rows
            .iter()
            .enumerate()
            .map(|(position, row)| {
                let slot = Slot {
                    position,
                    key: Arc::clone(&row.key),
                };
                (row.id(), slot)
            })
            .collect();
        Self {
            order,
            clean: rows.len(),
            rows,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn position(&mut self, id: EntryId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        if let Some(position) = self.known_position(id) {
            return Some(position);
        }
        self.resolve();
        self.index.get(&id).map(|slot| slot.position)
    }

    /// Position found without reindexing. `None` for absent rows, and for
    /// stale rows of an unsorted set until the index is settled.
    pub fn known_position(&self, id: EntryId) -> Option<usize> {
        let slot = self.index.get(&id)?;
        if slot.position < self.clean {
            return Some(slot.position);
        }
        let order = self.order.as_ref()?;
        let found = self.rows.partition_point(|row| {
            order
                .compare_keys((&row.key[..], row.id()), (&slot.key[..], id))
                .is_lt()
        });
        self.rows
            .get(found)
            .filter(|row| row.id() == id)
            .map(|_| found)
    }

    /// Makes [`RowSet::known_position`] answer for every row. Sorted sets
    /// already can.
    pub fn settle(&mut self) {
        if self.order.is_none() {
            self.resolve();
        }
    }

    /// Rewrites the stale tail of the index.
    fn resolve(&mut self) {
        for (position, row) in self.rows.iter().enumerate().skip(self.clean) {
            if let Some(slot) = self.index.get_mut(&row.id()) {
                slot.position = position;
            }
        }
        self.clean = self.rows.len();
    }

    pub fn get(&self, position: usize) -> Option<&Row> {
        self.rows.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Position at which `row` keeps a sorted set in order; the end for
    /// unsorted sets.
    pub fn sorted_position(&self, row: &Row) -> usize {
        match &self.order {
            Some(order) => self
                .rows
                .partition_point(|existing| order.compare(existing, row).is_lt()),
            None => self.rows.len(),
        }
    }

    pub fn partition_point(&self, pred: impl FnMut(&Row) -> bool) -> usize {
        self.rows.partition_point(pred)
    }

    /// Inserts at `position`, clamped to the end.
    pub fn insert(&mut self, position: usize, row: Row) -> usize {
        let position = position.min(self.rows.len());
        let slot = Slot {
            position,
            key: Arc::clone(&row.key),
        };
        self.index.insert(row.id(), slot);
        self.rows.insert(position, row);
        if position + 1 == self.rows.len() && self.clean == position {
            self.clean = self.rows.len();
        } else {
            self.clean = self.clean.min(position);
        }
        position
    }

    pub fn remove_at(&mut self, position: usize) -> Row {
        let row = self.rows.remove(position);
        self.index.remove(&row.id());
        self.clean = self.clean.min(position);
        row
    }

    pub fn remove(&mut self, id: EntryId) -> Option<(usize, Row)> {
        let position = self.position(id)?;
        Some((position, self.remove_at(position)))
    }

    /// Swaps in a fresh row for the same entry without moving it.
    pub fn replace(&mut self, position: usize, row: Row) {
        if let Some(slot) = self.index.get_mut(&row.id()) {
            slot.key = Arc::clone(&row.key);
        }
        if let Some(existing) = self.rows.get_mut(position) {
            *existing = row;
        }
    }
}

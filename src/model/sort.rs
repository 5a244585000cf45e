//! Sort orders for query models.
//!
//! Each [`SortKey`] expands to a composite of properties, the way a music
//! library browser sorts: by artist means artist, then album, then track
//! number, then title. Text compares case-insensitively. Rows with equal
//! keys fall back to entry identity so every order is total and rebuilds
//! are reproducible.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::rows::Row;
use crate::entry::{Entry, EntryId, PropKey, PropRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    Title,
    Artist,
    Album,
    Genre,
    TrackNumber,
    Duration,
    Rating,
    PlayCount,
    LastPlayed,
    Location,
}

impl SortKey {
    /// Properties compared, most significant first.
    pub const fn props(self) -> &'static [PropKey] {
        match self {
            SortKey::Title => &[PropKey::Title],
            SortKey::Artist => &[
                PropKey::Artist,
                PropKey::Album,
                PropKey::TrackNumber,
                PropKey::Title,
            ],
            SortKey::Album => &[PropKey::Album, PropKey::TrackNumber, PropKey::Title],
            SortKey::Genre => &[
                PropKey::Genre,
                PropKey::Artist,
                PropKey::Album,
                PropKey::TrackNumber,
            ],
            SortKey::TrackNumber => &[PropKey::TrackNumber],
            SortKey::Duration => &[PropKey::Duration],
            SortKey::Rating => &[PropKey::Rating],
            SortKey::PlayCount => &[PropKey::PlayCount],
            SortKey::LastPlayed => &[PropKey::LastPlayed],
            SortKey::Location => &[PropKey::Location],
        }
    }
}

/// A sort key and direction. Descending reverses the key comparison only;
/// the identity tie-break stays ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortOrder {
    pub key: SortKey,
    pub descending: bool,
}

impl SortOrder {
    pub fn ascending(key: SortKey) -> Self {
        Self {
            key,
            descending: false,
        }
    }

    pub fn descending(key: SortKey) -> Self {
        Self {
            key,
            descending: true,
        }
    }

    pub fn depends_on(&self, key: PropKey) -> bool {
        self.key.props().contains(&key)
    }

    pub(crate) fn key_for(&self, entry: &Entry) -> Vec<SortField> {
        self.key
            .props()
            .iter()
            .map(|key| SortField::from_prop(entry.prop(*key)))
            .collect()
    }

    pub(crate) fn compare(&self, a: &Row, b: &Row) -> Ordering {
        self.compare_keys((&a.key[..], a.id()), (&b.key[..], b.id()))
    }

    /// Compares cached keys, breaking ties by ascending identity.
    pub(crate) fn compare_keys(
        &self,
        (a_key, a_id): (&[SortField], EntryId),
        (b_key, b_id): (&[SortField], EntryId),
    ) -> Ordering {
        let primary = a_key.cmp(b_key);
        let primary = if self.descending {
            primary.reverse()
        } else {
            primary
        };
        primary.then_with(|| a_id.cmp(&b_id))
    }
}

/// One component of a cached sort key.
#[derive(Debug, Clone)]
pub(crate) enum SortField {
    /// Undefined for the entry's type; sorts first.
    Missing,
    Text(String),
    UInt(u64),
    Double(f64),
}

impl SortField {
    fn from_prop(prop: Option<PropRef<'_>>) -> Self {
        match prop {
            Some(PropRef::Str(text)) => SortField::Text(text.to_lowercase()),
            Some(PropRef::UInt(value)) => SortField::UInt(value),
            Some(PropRef::Double(value)) => SortField::Double(value),
            Some(PropRef::Bool(value)) => SortField::UInt(u64::from(value)),
            Some(PropRef::EntryType(entry_type)) => SortField::UInt(u64::from(entry_type.id())),
            None => SortField::Missing,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortField::Missing => 0,
            SortField::Text(_) => 1,
            SortField::UInt(_) => 2,
            SortField::Double(_) => 3,
        }
    }
}

impl Ord for SortField {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortField::Text(a), SortField::Text(b)) => a.cmp(b),
            (SortField::UInt(a), SortField::UInt(b)) => a.cmp(b),
            (SortField::Double(a), SortField::Double(b)) => a.total_cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for SortField {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortField {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortField {}

//! # Entries and Properties
//!
//! An [`Entry`] is one library record: a track, a podcast episode, an
//! ignored file. It is identified by an opaque [`EntryId`] and keyed by its
//! `(entry type, location)` pair. Properties are addressed through the closed
//! [`PropKey`] enumeration and hold [`Value`]s whose kind is fixed per key.
//!
//! Committed entries are shared as `Arc<Entry>` snapshots. A snapshot never
//! changes; commit replaces it with a new one, so readers on other threads
//! can evaluate queries against it without locking.
//!
//! ## Search match
//!
//! The derived `search-match` property is a folded blob of title, artist,
//! album and genre: lowercased, split into Unicode words and joined with
//! single spaces. Free-text search compares folded query words against it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use unicode_segmentation::UnicodeSegmentation;

use crate::entry_type::EntryType;

/// Opaque entry identity, assigned at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub(crate) u64);

impl EntryId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of value a property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    UInt,
    Double,
    Bool,
    EntryType,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::UInt => "unsigned integer",
            ValueKind::Double => "double",
            ValueKind::Bool => "boolean",
            ValueKind::EntryType => "entry type",
        };
        f.write_str(name)
    }
}

/// Closed set of entry properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropKey {
    Type,
    Location,
    Title,
    Artist,
    Album,
    Genre,
    TrackNumber,
    Duration,
    FileSize,
    Hidden,
    LastPlayed,
    FirstSeen,
    Rating,
    PlayCount,
    Description,
    PostTime,
    SearchMatch,
}

impl PropKey {
    pub const ALL: [PropKey; 17] = [
        PropKey::Type,
        PropKey::Location,
        PropKey::Title,
        PropKey::Artist,
        PropKey::Album,
        PropKey::Genre,
        PropKey::TrackNumber,
        PropKey::Duration,
        PropKey::FileSize,
        PropKey::Hidden,
        PropKey::LastPlayed,
        PropKey::FirstSeen,
        PropKey::Rating,
        PropKey::PlayCount,
        PropKey::Description,
        PropKey::PostTime,
        PropKey::SearchMatch,
    ];

    /// Properties folded into the search-match blob.
    pub const SEARCH_SOURCES: [PropKey; 4] =
        [PropKey::Title, PropKey::Artist, PropKey::Album, PropKey::Genre];

    pub const fn kind(self) -> ValueKind {
        match self {
            PropKey::Type => ValueKind::EntryType,
            PropKey::Location
            | PropKey::Title
            | PropKey::Artist
            | PropKey::Album
            | PropKey::Genre
            | PropKey::Description
            | PropKey::SearchMatch => ValueKind::String,
            PropKey::TrackNumber
            | PropKey::Duration
            | PropKey::FileSize
            | PropKey::LastPlayed
            | PropKey::FirstSeen
            | PropKey::PlayCount
            | PropKey::PostTime => ValueKind::UInt,
            PropKey::Hidden => ValueKind::Bool,
            PropKey::Rating => ValueKind::Double,
        }
    }

    /// Intrinsic or derived properties that `set_property` refuses.
    pub const fn is_read_only(self) -> bool {
        matches!(self, PropKey::Type | PropKey::Location | PropKey::SearchMatch)
    }

    /// Properties every entry has regardless of its type.
    pub const fn is_intrinsic(self) -> bool {
        self.is_read_only()
    }

    pub const fn name(self) -> &'static str {
        match self {
            PropKey::Type => "type",
            PropKey::Location => "location",
            PropKey::Title => "title",
            PropKey::Artist => "artist",
            PropKey::Album => "album",
            PropKey::Genre => "genre",
            PropKey::TrackNumber => "track-number",
            PropKey::Duration => "duration",
            PropKey::FileSize => "file-size",
            PropKey::Hidden => "hidden",
            PropKey::LastPlayed => "last-played",
            PropKey::FirstSeen => "first-seen",
            PropKey::Rating => "rating",
            PropKey::PlayCount => "play-count",
            PropKey::Description => "description",
            PropKey::PostTime => "post-time",
            PropKey::SearchMatch => "search-match",
        }
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PropKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PropKey::ALL
            .into_iter()
            .find(|key| key.name() == s)
            .ok_or_else(|| format!("unknown property `{s}`"))
    }
}

/// Owned property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    UInt(u64),
    Double(f64),
    Bool(bool),
    EntryType(EntryType),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::UInt(_) => ValueKind::UInt,
            Value::Double(_) => ValueKind::Double,
            Value::Bool(_) => ValueKind::Bool,
            Value::EntryType(_) => ValueKind::EntryType,
        }
    }

    pub fn as_prop(&self) -> PropRef<'_> {
        match self {
            Value::String(s) => PropRef::Str(s),
            Value::UInt(v) => PropRef::UInt(*v),
            Value::Double(v) => PropRef::Double(*v),
            Value::Bool(v) => PropRef::Bool(*v),
            Value::EntryType(t) => PropRef::EntryType(t),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<EntryType> for Value {
    fn from(value: EntryType) -> Self {
        Value::EntryType(value)
    }
}

/// Borrowed view of a property value, used on the evaluation hot path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropRef<'a> {
    Str(&'a str),
    UInt(u64),
    Double(f64),
    Bool(bool),
    EntryType(&'a EntryType),
}

impl PropRef<'_> {
    pub fn to_value(self) -> Value {
        match self {
            PropRef::Str(s) => Value::String(s.to_string()),
            PropRef::UInt(v) => Value::UInt(v),
            PropRef::Double(v) => Value::Double(v),
            PropRef::Bool(v) => Value::Bool(v),
            PropRef::EntryType(t) => Value::EntryType(t.clone()),
        }
    }
}

/// A library record.
#[derive(Debug, Clone)]
pub struct Entry {
    id: EntryId,
    entry_type: EntryType,
    location: String,
    props: BTreeMap<PropKey, Value>,
    search_blob: String,
}

impl Entry {
    /// Builds an entry with the defaults its type prescribes.
    pub(crate) fn new(id: EntryId, entry_type: EntryType, location: String) -> Self {
        let props = entry_type
            .properties()
            .map(|key| (key, entry_type.default_value(key)))
            .collect();
        let mut entry = Self {
            id,
            entry_type,
            location,
            props,
            search_blob: String::new(),
        };
        entry.refresh_search_blob();
        entry
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn entry_type(&self) -> &EntryType {
        &self.entry_type
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Whether the entry's type defines `key`.
    pub fn defines(&self, key: PropKey) -> bool {
        key.is_intrinsic() || self.props.contains_key(&key)
    }

    /// Borrowed property value, `None` when the type does not define `key`.
    pub fn prop(&self, key: PropKey) -> Option<PropRef<'_>> {
        match key {
            PropKey::Type => Some(PropRef::EntryType(&self.entry_type)),
            PropKey::Location => Some(PropRef::Str(&self.location)),
            PropKey::SearchMatch => Some(PropRef::Str(&self.search_blob)),
            _ => self.props.get(&key).map(Value::as_prop),
        }
    }

    pub fn get(&self, key: PropKey) -> Option<Value> {
        self.prop(key).map(PropRef::to_value)
    }

    pub fn string(&self, key: PropKey) -> Option<&str> {
        match self.prop(key)? {
            PropRef::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn uint(&self, key: PropKey) -> Option<u64> {
        match self.prop(key)? {
            PropRef::UInt(v) => Some(v),
            _ => None,
        }
    }

    pub fn title(&self) -> &str {
        self.string(PropKey::Title).unwrap_or_default()
    }

    pub fn artist(&self) -> &str {
        self.string(PropKey::Artist).unwrap_or_default()
    }

    pub fn album(&self) -> &str {
        self.string(PropKey::Album).unwrap_or_default()
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self.prop(PropKey::Hidden), Some(PropRef::Bool(true)))
    }

    pub fn search_match(&self) -> &str {
        &self.search_blob
    }

    /// Stores `value`, returning the previous value.
    ///
    /// Callers validate key and kind beforehand; see `RhythmDb::set_property`.
    pub(crate) fn set(&mut self, key: PropKey, value: Value) -> Option<Value> {
        let previous = self.props.insert(key, value);
        if PropKey::SEARCH_SOURCES.contains(&key) {
            self.refresh_search_blob();
        }
        previous
    }

    fn refresh_search_blob(&mut self) {
        let sources = PropKey::SEARCH_SOURCES
            .iter()
            .filter_map(|key| self.props.get(key).and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        self.search_blob = fold_text(&sources);
    }
}

/// Lowercases `text` and keeps only its Unicode words, space separated.
pub fn fold_text(text: &str) -> String {
    fold_words(text).join(" ")
}

/// Lowercased Unicode words of `text`.
pub fn fold_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .unicode_words()
        .map(str::to_string)
        .collect()
}

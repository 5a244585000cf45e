//! # Entry Types
//!
//! Entry types partition the library: songs, podcast episodes, files the
//! scanner decided to ignore, import errors. Each type declares which
//! optional properties its entries carry and what string placeholder new
//! entries start with.
//!
//! Types live in an [`EntryTypeRegistry`] owned by the database context;
//! registration is idempotent per name and types are never removed.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::entry::{PropKey, Value, ValueKind};
use crate::error::{DbError, Result};

/// Properties every non-intrinsic entry type defines.
const COMMON_PROPERTIES: [PropKey; 12] = [
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
];

/// Declarative description of an entry type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryTypeDef {
    name: String,
    extra_properties: BTreeSet<PropKey>,
    placeholder: Option<String>,
}

impl EntryTypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra_properties: BTreeSet::new(),
            placeholder: None,
        }
    }

    /// Adds an optional property beyond the common set.
    pub fn with_property(mut self, key: PropKey) -> Self {
        if !key.is_intrinsic() && !COMMON_PROPERTIES.contains(&key) {
            self.extra_properties.insert(key);
        }
        self
    }

    /// Default for artist, album and genre on new entries.
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn song() -> Self {
        Self::new("song").with_placeholder("Unknown")
    }

    pub fn ignore() -> Self {
        Self::new("ignore")
    }

    pub fn import_error() -> Self {
        Self::new("import-error")
    }

    pub fn podcast_post() -> Self {
        Self::new("podcast-post")
            .with_placeholder("Unknown")
            .with_property(PropKey::Description)
            .with_property(PropKey::PostTime)
    }

    pub fn podcast_feed() -> Self {
        Self::new("podcast-feed").with_property(PropKey::Description)
    }

    /// Types registered by a database built with default configuration.
    pub fn builtins() -> Vec<Self> {
        vec![
            Self::song(),
            Self::ignore(),
            Self::import_error(),
            Self::podcast_post(),
            Self::podcast_feed(),
        ]
    }
}

#[derive(Debug)]
struct TypeInner {
    id: u32,
    def: EntryTypeDef,
}

/// Handle to a registered entry type. Cheap to clone.
#[derive(Clone)]
pub struct EntryType(Arc<TypeInner>);

impl EntryType {
    pub fn name(&self) -> &str {
        self.0.def.name()
    }

    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn def(&self) -> &EntryTypeDef {
        &self.0.def
    }

    /// Non-intrinsic properties entries of this type carry.
    pub fn properties(&self) -> impl Iterator<Item = PropKey> + '_ {
        COMMON_PROPERTIES
            .iter()
            .copied()
            .chain(self.0.def.extra_properties.iter().copied())
    }

    pub fn defines(&self, key: PropKey) -> bool {
        key.is_intrinsic()
            || COMMON_PROPERTIES.contains(&key)
            || self.0.def.extra_properties.contains(&key)
    }

    /// Value a fresh entry of this type holds for `key`.
    pub fn default_value(&self, key: PropKey) -> Value {
        match key.kind() {
            ValueKind::String => {
                let placeholder = match key {
                    PropKey::Artist | PropKey::Album | PropKey::Genre => {
                        self.0.def.placeholder.clone()
                    }
                    _ => None,
                };
                Value::String(placeholder.unwrap_or_default())
            }
            ValueKind::UInt => Value::UInt(0),
            ValueKind::Double => Value::Double(0.0),
            ValueKind::Bool => Value::Bool(false),
            ValueKind::EntryType => Value::EntryType(self.clone()),
        }
    }
}

impl PartialEq for EntryType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for EntryType {}

impl Hash for EntryType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryType({})", self.name())
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Registry of the entry types known to one database.
#[derive(Debug, Default)]
pub struct EntryTypeRegistry {
    types: Vec<EntryType>,
    by_name: HashMap<String, usize>,
}

impl EntryTypeRegistry {
    /// Registers `def`, or returns the existing handle if an identical
    /// definition is already registered under the same name.
    ///
    /// # Errors
    ///
    /// [`DbError::TypeConflict`] when the name is taken by a different
    /// definition.
    pub fn register(&mut self, def: EntryTypeDef) -> Result<EntryType> {
        if let Some(&index) = self.by_name.get(def.name()) {
            let existing = &self.types[index];
            if existing.def() == &def {
                return Ok(existing.clone());
            }
            return Err(DbError::TypeConflict(def.name().to_string()));
        }

        let entry_type = EntryType(Arc::new(TypeInner {
            id: self.types.len() as u32,
            def,
        }));
        log::debug!("registered entry type `{}`", entry_type.name());
        self.by_name
            .insert(entry_type.name().to_string(), self.types.len());
        self.types.push(entry_type.clone());
        Ok(entry_type)
    }

    pub fn get(&self, name: &str) -> Option<EntryType> {
        self.by_name.get(name).map(|&index| self.types[index].clone())
    }

    /// Whether `entry_type` was issued by this registry.
    pub fn contains(&self, entry_type: &EntryType) -> bool {
        self.types
            .get(entry_type.id() as usize)
            .is_some_and(|known| known == entry_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntryType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

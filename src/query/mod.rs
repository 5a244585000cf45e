//! # Queries
//!
//! A [`Query`] is an immutable disjunction of conjunctions over entry
//! properties. It is built from a flat sequence of [`QueryTerm`]s: terms
//! are ANDed together, and a [`QueryTerm::Disjunction`] marker closes the
//! current group and opens a new one that is ORed with the rest.
//!
//! ```
//! use rhythmdb::entry::PropKey;
//! use rhythmdb::query::{Query, QueryTerm};
//!
//! // (title like "Sin") OR (title like "Son" AND hidden = false)
//! let query = Query::parse([
//!     QueryTerm::like(PropKey::Title, "Sin"),
//!     QueryTerm::Disjunction,
//!     QueryTerm::like(PropKey::Title, "Son"),
//!     QueryTerm::equals(PropKey::Hidden, false),
//!     QueryTerm::End,
//! ])?;
//! assert!(query.depends_on(PropKey::Title));
//! # Ok::<(), rhythmdb::DbError>(())
//! ```
//!
//! Evaluation is a pure function of the query and one entry snapshot, so
//! any number of models may evaluate concurrently.

mod evaluate;
mod json;
mod term;

pub use term::{QueryOp, QueryTerm};

use crate::entry::{Entry, PropKey};
use crate::entry_type::EntryTypeRegistry;
use crate::error::Result;

use evaluate::evaluate_criterion;
use term::Criterion;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    groups: Vec<Vec<Criterion>>,
}

impl Query {
    /// Builds a query from a flat term sequence.
    ///
    /// # Errors
    ///
    /// [`crate::DbError::MalformedQuery`] when an operand's kind disagrees
    /// with its property, an operator does not apply to the property, a
    /// range is inverted, or a disjunction marker does not sit between two
    /// non-empty groups.
    pub fn parse<I>(terms: I) -> Result<Self>
    where
        I: IntoIterator<Item = QueryTerm>,
    {
        term::parse_terms(terms)
    }

    /// The query with no terms. Matches every entry.
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Reads the JSON form produced by [`Query::to_json`], resolving entry
    /// type names against `types`.
    pub fn from_json(json: &str, types: &EntryTypeRegistry) -> Result<Self> {
        json::from_json(json, types)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        json::to_json(self)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Precomputes folded operands for text predicates, including the word
    /// list of `search-match` searches. Idempotent; evaluation results are
    /// unchanged.
    pub fn preprocess(&mut self) {
        self.groups
            .iter_mut()
            .flatten()
            .for_each(Criterion::preprocess);
    }

    /// Whether `entry`'s committed values satisfy the query.
    pub fn evaluate(&self, entry: &Entry) -> bool {
        let matched = self.groups.is_empty()
            || self.groups.iter().any(|group| {
                group
                    .iter()
                    .all(|criterion| evaluate_criterion(criterion, entry))
            });
        log::trace!("query evaluated to {matched} for entry {}", entry.id());
        matched
    }

    /// Whether a change to `key` can change the result of [`Query::evaluate`].
    pub fn depends_on(&self, key: PropKey) -> bool {
        self.groups
            .iter()
            .flatten()
            .any(|criterion| criterion.depends_on(key))
    }
}

//! Query terms and parsing into the disjunction-of-conjunctions form.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::Query;
use crate::entry::{fold_words, PropKey, Value, ValueKind};
use crate::error::{DbError, Result};

/// Predicate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryOp {
    Equals,
    NotEqual,
    /// Case-insensitive substring; word containment on `search-match`.
    Like,
    NotLike,
    Prefix,
    Suffix,
    Greater,
    Less,
}

impl QueryOp {
    const fn is_text(self) -> bool {
        matches!(
            self,
            QueryOp::Like | QueryOp::NotLike | QueryOp::Prefix | QueryOp::Suffix
        )
    }

    const fn is_ordering(self) -> bool {
        matches!(self, QueryOp::Greater | QueryOp::Less)
    }
}

/// One element of the flat term sequence accepted by [`Query::parse`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryTerm {
    Prop { op: QueryOp, key: PropKey, value: Value },
    /// Inclusive range.
    Range { key: PropKey, low: Value, high: Value },
    Subquery(Query),
    /// Closes the current conjunction and opens a new OR-group.
    Disjunction,
    /// Terminates the term list.
    End,
}

impl QueryTerm {
    pub fn equals(key: PropKey, value: impl Into<Value>) -> Self {
        Self::prop(QueryOp::Equals, key, value)
    }

    pub fn not_equal(key: PropKey, value: impl Into<Value>) -> Self {
        Self::prop(QueryOp::NotEqual, key, value)
    }

    pub fn like(key: PropKey, value: impl Into<Value>) -> Self {
        Self::prop(QueryOp::Like, key, value)
    }

    pub fn not_like(key: PropKey, value: impl Into<Value>) -> Self {
        Self::prop(QueryOp::NotLike, key, value)
    }

    pub fn prefix(key: PropKey, value: impl Into<Value>) -> Self {
        Self::prop(QueryOp::Prefix, key, value)
    }

    pub fn suffix(key: PropKey, value: impl Into<Value>) -> Self {
        Self::prop(QueryOp::Suffix, key, value)
    }

    pub fn greater(key: PropKey, value: impl Into<Value>) -> Self {
        Self::prop(QueryOp::Greater, key, value)
    }

    pub fn less(key: PropKey, value: impl Into<Value>) -> Self {
        Self::prop(QueryOp::Less, key, value)
    }

    pub fn range(key: PropKey, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::Range {
            key,
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn prop(op: QueryOp, key: PropKey, value: impl Into<Value>) -> Self {
        Self::Prop {
            op,
            key,
            value: value.into(),
        }
    }
}

/// Operand prepared once by [`Query::preprocess`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Prepared {
    Lowercase(String),
    Words(Vec<String>),
}

/// A validated predicate inside a conjunction.
#[derive(Debug, Clone)]
pub(crate) enum Criterion {
    Prop {
        op: QueryOp,
        key: PropKey,
        value: Value,
        prepared: Option<Prepared>,
    },
    Range {
        key: PropKey,
        low: Value,
        high: Value,
    },
    Subquery(Query),
}

/// Prepared operands are a cache and do not take part in equality.
impl PartialEq for Criterion {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Criterion::Prop { op, key, value, .. },
                Criterion::Prop {
                    op: other_op,
                    key: other_key,
                    value: other_value,
                    ..
                },
            ) => op == other_op && key == other_key && value == other_value,
            (
                Criterion::Range { key, low, high },
                Criterion::Range {
                    key: other_key,
                    low: other_low,
                    high: other_high,
                },
            ) => key == other_key && low == other_low && high == other_high,
            (Criterion::Subquery(a), Criterion::Subquery(b)) => a == b,
            _ => false,
        }
    }
}

impl Criterion {
    pub(crate) fn depends_on(&self, changed: PropKey) -> bool {
        let touches = |key: PropKey| {
            key == changed
                || (key == PropKey::SearchMatch && PropKey::SEARCH_SOURCES.contains(&changed))
        };
        match self {
            Criterion::Prop { key, .. } | Criterion::Range { key, .. } => touches(*key),
            Criterion::Subquery(query) => query.depends_on(changed),
        }
    }

    pub(crate) fn preprocess(&mut self) {
        if let Criterion::Prop {
            op,
            key,
            value: Value::String(operand),
            prepared,
        } = self
        {
            if !op.is_text() {
                return;
            }
            *prepared = Some(if *key == PropKey::SearchMatch {
                Prepared::Words(fold_words(operand))
            } else {
                Prepared::Lowercase(operand.to_lowercase())
            });
        } else if let Criterion::Subquery(query) = self {
            query.preprocess();
        }
    }
}

pub(crate) fn parse_terms<I>(terms: I) -> Result<Query>
where
    I: IntoIterator<Item = QueryTerm>,
{
    let mut groups: Vec<Vec<Criterion>> = Vec::new();
    let mut current: Vec<Criterion> = Vec::new();
    let mut saw_disjunction = false;

    for term in terms {
        match term {
            QueryTerm::End => break,
            QueryTerm::Disjunction => {
                if current.is_empty() {
                    return Err(DbError::malformed(
                        "disjunction must separate two non-empty groups",
                    ));
                }
                groups.push(std::mem::take(&mut current));
                saw_disjunction = true;
            }
            QueryTerm::Prop { op, key, value } => {
                validate_prop(op, key, &value)?;
                current.push(Criterion::Prop {
                    op,
                    key,
                    value,
                    prepared: None,
                });
            }
            QueryTerm::Range { key, low, high } => {
                validate_range(key, &low, &high)?;
                current.push(Criterion::Range { key, low, high });
            }
            QueryTerm::Subquery(query) => current.push(Criterion::Subquery(query)),
        }
    }

    if current.is_empty() {
        if saw_disjunction {
            return Err(DbError::malformed("query ends with a disjunction"));
        }
    } else {
        groups.push(current);
    }

    Ok(Query { groups })
}

fn validate_prop(op: QueryOp, key: PropKey, value: &Value) -> Result<()> {
    check_operand_kind(key, value)?;

    if key == PropKey::SearchMatch && !matches!(op, QueryOp::Like | QueryOp::NotLike) {
        return Err(DbError::malformed(format!(
            "`{key}` only supports like and not-like, got {op:?}"
        )));
    }
    if op.is_text() && key.kind() != ValueKind::String {
        return Err(DbError::malformed(format!(
            "{op:?} needs a string property, `{key}` holds {}",
            key.kind()
        )));
    }
    if op.is_ordering() && !is_ordered(key.kind()) {
        return Err(DbError::malformed(format!(
            "{op:?} is undefined for {} property `{key}`",
            key.kind()
        )));
    }
    Ok(())
}

fn validate_range(key: PropKey, low: &Value, high: &Value) -> Result<()> {
    check_operand_kind(key, low)?;
    check_operand_kind(key, high)?;

    if !is_ordered(key.kind()) || key == PropKey::SearchMatch {
        return Err(DbError::malformed(format!(
            "range is undefined for property `{key}`"
        )));
    }
    if compare_values(low, high) == Some(Ordering::Greater) {
        return Err(DbError::malformed(format!(
            "range on `{key}` has its lower bound above its upper bound"
        )));
    }
    Ok(())
}

fn check_operand_kind(key: PropKey, value: &Value) -> Result<()> {
    if value.kind() == key.kind() {
        Ok(())
    } else {
        Err(DbError::malformed(format!(
            "`{key}` holds {} values, operand is {}",
            key.kind(),
            value.kind()
        )))
    }
}

const fn is_ordered(kind: ValueKind) -> bool {
    matches!(kind, ValueKind::String | ValueKind::UInt | ValueKind::Double)
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::UInt(a), Value::UInt(b)) => Some(a.cmp(b)),
        (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
        _ => None,
    }
}

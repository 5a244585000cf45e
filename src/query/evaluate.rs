//! Query evaluation against a single entry.
//!
//! Evaluation reads nothing but the query and the entry snapshot. A property
//! the entry's type does not define, or a comparison that has no answer
//! (NaN ratings), counts as "no match".

use std::cmp::Ordering;

use super::term::{Criterion, Prepared, QueryOp};
use crate::entry::{fold_words, Entry, PropKey, PropRef, Value};

pub(crate) fn evaluate_criterion(criterion: &Criterion, entry: &Entry) -> bool {
    match criterion {
        Criterion::Prop {
            op,
            key,
            value,
            prepared,
        } => {
            let Some(actual) = entry.prop(*key) else {
                return false;
            };
            evaluate_prop(*op, *key, actual, value, prepared.as_ref())
        }
        Criterion::Range { key, low, high } => {
            let Some(actual) = entry.prop(*key) else {
                return false;
            };
            matches!(
                compare(actual, low),
                Some(Ordering::Greater | Ordering::Equal)
            ) && matches!(compare(actual, high), Some(Ordering::Less | Ordering::Equal))
        }
        Criterion::Subquery(query) => query.evaluate(entry),
    }
}

fn evaluate_prop(
    op: QueryOp,
    key: PropKey,
    actual: PropRef<'_>,
    operand: &Value,
    prepared: Option<&Prepared>,
) -> bool {
    match op {
        QueryOp::Equals => actual == operand.as_prop(),
        QueryOp::NotEqual => actual != operand.as_prop(),
        QueryOp::Greater => compare(actual, operand) == Some(Ordering::Greater),
        QueryOp::Less => compare(actual, operand) == Some(Ordering::Less),
        QueryOp::Like | QueryOp::NotLike | QueryOp::Prefix | QueryOp::Suffix => {
            let (PropRef::Str(haystack), Value::String(needle)) = (actual, operand) else {
                return false;
            };
            let matched = if key == PropKey::SearchMatch {
                search_matches(haystack, needle, prepared)
            } else {
                text_matches(op, haystack, needle, prepared)
            };
            match op {
                QueryOp::NotLike => !matched,
                _ => matched,
            }
        }
    }
}

/// Every folded word of the operand must occur in the folded search blob.
fn search_matches(blob: &str, needle: &str, prepared: Option<&Prepared>) -> bool {
    match prepared {
        Some(Prepared::Words(words)) => words.iter().all(|word| blob.contains(word.as_str())),
        _ => fold_words(needle)
            .iter()
            .all(|word| blob.contains(word.as_str())),
    }
}

fn text_matches(op: QueryOp, haystack: &str, needle: &str, prepared: Option<&Prepared>) -> bool {
    let lowered;
    let needle = match prepared {
        Some(Prepared::Lowercase(value)) => value.as_str(),
        _ => {
            lowered = needle.to_lowercase();
            lowered.as_str()
        }
    };
    let haystack = haystack.to_lowercase();
    match op {
        QueryOp::Prefix => haystack.starts_with(needle),
        QueryOp::Suffix => haystack.ends_with(needle),
        _ => haystack.contains(needle),
    }
}

fn compare(actual: PropRef<'_>, operand: &Value) -> Option<Ordering> {
    match (actual, operand) {
        (PropRef::Str(a), Value::String(b)) => Some(a.cmp(b.as_str())),
        (PropRef::UInt(a), Value::UInt(b)) => Some(a.cmp(b)),
        (PropRef::Double(a), Value::Double(b)) => a.partial_cmp(b),
        _ => None,
    }
}

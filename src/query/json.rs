//! JSON form of queries.
//!
//! Property names travel as strings and entry types by name, so a query
//! saved by one session can be resolved against another session's type
//! registry. Prepared operands are not serialized.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::term::{Criterion, QueryOp, QueryTerm};
use super::Query;
use crate::entry::{PropKey, Value, ValueKind};
use crate::entry_type::EntryTypeRegistry;
use crate::error::{DbError, Result};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "term", rename_all = "kebab-case")]
enum RawTerm {
    Prop {
        op: QueryOp,
        prop: String,
        value: Json,
    },
    Range {
        prop: String,
        low: Json,
        high: Json,
    },
    Subquery {
        terms: Vec<RawTerm>,
    },
    Disjunction,
    End,
}

pub(crate) fn to_json(query: &Query) -> serde_json::Result<String> {
    serde_json::to_string(&raw_terms(query))
}

pub(crate) fn from_json(json: &str, types: &EntryTypeRegistry) -> Result<Query> {
    let raw: Vec<RawTerm> = serde_json::from_str(json)
        .map_err(|error| DbError::malformed(format!("invalid query JSON: {error}")))?;
    let terms = resolve_terms(raw, types)?;
    Query::parse(terms)
}

fn raw_terms(query: &Query) -> Vec<RawTerm> {
    let mut terms = Vec::new();
    for (index, group) in query.groups.iter().enumerate() {
        if index > 0 {
            terms.push(RawTerm::Disjunction);
        }
        terms.extend(group.iter().map(raw_criterion));
    }
    terms
}

fn raw_criterion(criterion: &Criterion) -> RawTerm {
    match criterion {
        Criterion::Prop { op, key, value, .. } => RawTerm::Prop {
            op: *op,
            prop: key.name().to_string(),
            value: value_to_json(value),
        },
        Criterion::Range { key, low, high } => RawTerm::Range {
            prop: key.name().to_string(),
            low: value_to_json(low),
            high: value_to_json(high),
        },
        Criterion::Subquery(query) => RawTerm::Subquery {
            terms: raw_terms(query),
        },
    }
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::String(s) => Json::from(s.as_str()),
        Value::UInt(v) => Json::from(*v),
        Value::Double(v) => Json::from(*v),
        Value::Bool(v) => Json::from(*v),
        Value::EntryType(t) => Json::from(t.name()),
    }
}

fn resolve_terms(raw: Vec<RawTerm>, types: &EntryTypeRegistry) -> Result<Vec<QueryTerm>> {
    raw.into_iter()
        .map(|term| {
            Ok(match term {
                RawTerm::Prop { op, prop, value } => {
                    let key = resolve_key(&prop)?;
                    QueryTerm::Prop {
                        op,
                        key,
                        value: json_to_value(key, value, types)?,
                    }
                }
                RawTerm::Range { prop, low, high } => {
                    let key = resolve_key(&prop)?;
                    QueryTerm::Range {
                        key,
                        low: json_to_value(key, low, types)?,
                        high: json_to_value(key, high, types)?,
                    }
                }
                RawTerm::Subquery { terms } => {
                    QueryTerm::Subquery(Query::parse(resolve_terms(terms, types)?)?)
                }
                RawTerm::Disjunction => QueryTerm::Disjunction,
                RawTerm::End => QueryTerm::End,
            })
        })
        .collect()
}

fn resolve_key(name: &str) -> Result<PropKey> {
    name.parse::<PropKey>().map_err(DbError::MalformedQuery)
}

fn json_to_value(key: PropKey, json: Json, types: &EntryTypeRegistry) -> Result<Value> {
    let mismatch = || DbError::malformed(format!("`{key}` expects a {} operand", key.kind()));
    match key.kind() {
        ValueKind::String => json.as_str().map(Value::from).ok_or_else(mismatch),
        ValueKind::UInt => json.as_u64().map(Value::UInt).ok_or_else(mismatch),
        ValueKind::Double => json.as_f64().map(Value::Double).ok_or_else(mismatch),
        ValueKind::Bool => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
        ValueKind::EntryType => {
            let name = json.as_str().ok_or_else(mismatch)?;
            types
                .get(name)
                .map(Value::EntryType)
                .ok_or_else(|| DbError::malformed(format!("unknown entry type `{name}`")))
        }
    }
}

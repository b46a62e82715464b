//! In-process evaluation of a [`QuerySpec`] against JSON documents.
//!
//! Used by the in-memory store for everything, and by the PostgreSQL store for the
//! projection step, so both backends agree on what a result document looks like.

use crate::query::spec::{
    Comparison, FieldPath, FilterValue, ID_FIELD, Predicate, Projection, SortDirection, SortKey,
};
use serde_json::{Map, Value};
use std::cmp::Ordering;

pub type Document = Map<String, Value>;

/// Resolve a dotted path inside a document.
pub fn resolve<'a>(document: &'a Document, path: &FieldPath) -> Option<&'a Value> {
    let mut segments = path.segments().iter();
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

pub fn matches_all(document: &Document, filter: &[Predicate]) -> bool {
    filter.iter().all(|predicate| matches(document, predicate))
}

pub fn matches(document: &Document, predicate: &Predicate) -> bool {
    let field = resolve(document, &predicate.field);
    match predicate.op {
        // A missing or null field is "not equal" to anything.
        Comparison::Ne => !field.is_some_and(|value| value_equals(value, &predicate.value)),
        Comparison::Eq => field.is_some_and(|value| {
            predicate
                .operands()
                .any(|operand| value_equals(value, operand))
        }),
        op => field.is_some_and(|value| value_satisfies(value, op, &predicate.value)),
    }
}

fn value_equals(value: &Value, operand: &FilterValue) -> bool {
    match value {
        Value::Array(items) => items
            .iter()
            .any(|item| compare_scalar(item, operand) == Some(Ordering::Equal)),
        other => compare_scalar(other, operand) == Some(Ordering::Equal),
    }
}

fn value_satisfies(value: &Value, op: Comparison, operand: &FilterValue) -> bool {
    match value {
        Value::Array(items) => items
            .iter()
            .any(|item| compare_scalar(item, operand).is_some_and(|ord| op.accepts(ord))),
        other => compare_scalar(other, operand).is_some_and(|ord| op.accepts(ord)),
    }
}

/// Compare a stored scalar with an operand cast to the stored value's type.
fn compare_scalar(value: &Value, operand: &FilterValue) -> Option<Ordering> {
    match value {
        Value::Number(number) => {
            let stored = number.as_f64()?;
            let wanted = operand.as_f64()?;
            stored.partial_cmp(&wanted)
        }
        Value::String(text) => Some(text.as_str().cmp(operand.raw())),
        Value::Bool(flag) => operand.as_bool().map(|wanted| flag.cmp(&wanted)),
        _ => None,
    }
}

/// Total order over JSON values: null, numbers, strings, objects, arrays, booleans.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }

    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Array(a)), Some(Value::Array(b))) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ordering = compare_values(Some(x), Some(y));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        }
        (Some(Value::Object(a)), Some(Value::Object(b))) => a.len().cmp(&b.len()),
        (a, b) => rank(a).cmp(&rank(b)),
    }
}

/// Order documents by `keys`, earlier keys taking priority.
pub fn sort_documents(documents: &mut [Document], keys: &[SortKey]) {
    documents.sort_by(|left, right| {
        for key in keys {
            let ordering = compare_values(resolve(left, &key.field), resolve(right, &key.field));
            let ordering = match key.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Apply a projection, always keeping the identifier for inclusion lists.
pub fn project(document: Document, projection: &Projection) -> Document {
    match projection {
        Projection::Exclude(fields) => {
            let mut document = document;
            for field in fields {
                remove_path(&mut document, field);
            }
            document
        }
        Projection::Include(fields) => {
            let mut projected = Document::new();
            if let Some(id) = document.get(ID_FIELD) {
                projected.insert(ID_FIELD.to_string(), id.clone());
            }
            for field in fields {
                if let Some(value) = resolve(&document, field) {
                    insert_path(&mut projected, field, value.clone());
                }
            }
            projected
        }
    }
}

fn remove_path(document: &mut Document, path: &FieldPath) {
    let segments = path.segments();
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return,
    };
    let mut current = document;
    for segment in parents {
        match current.get_mut(segment).and_then(Value::as_object_mut) {
            Some(next) => current = next,
            None => return,
        }
    }
    current.remove(last);
}

fn insert_path(document: &mut Document, path: &FieldPath, value: Value) {
    let segments = path.segments();
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return,
    };
    let mut current = document;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry.as_object_mut() {
            Some(next) => next,
            None => return,
        };
    }
    current.insert(last.clone(), value);
}

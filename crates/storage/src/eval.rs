//! Native filter evaluation and ordering
//!
//! Comparison is strict: a constant only matches field values of the same
//! native type, so an `Int32` constant never matches an `Int64` field. Arrays
//! match when any element matches. Sorting orders mixed types by a fixed type
//! rank, numbers by value.

use crate::query::{CompareOp, NativeExpr, SortKey};
use docshape_core::{Document, NativeValue};
use std::cmp::Ordering;

/// Check whether a document satisfies a filter
pub fn matches(expr: &NativeExpr, document: &Document) -> bool {
    match expr {
        NativeExpr::Const(b) => *b,
        NativeExpr::And(items) => items.iter().all(|e| matches(e, document)),
        NativeExpr::Or(items) => items.iter().any(|e| matches(e, document)),
        NativeExpr::Not(inner) => !matches(inner, document),
        NativeExpr::Compare { path, op, value } => {
            compare_field(document.get_path(path), *op, value)
        }
    }
}

fn compare_field(field: Option<&NativeValue>, op: CompareOp, constant: &NativeValue) -> bool {
    if constant.is_null() {
        let absent = field.map_or(true, NativeValue::is_null);
        return match op {
            CompareOp::Eq => absent,
            CompareOp::Ne => !absent,
            _ => false,
        };
    }
    let Some(value) = field else {
        return op == CompareOp::Ne;
    };
    if let (NativeValue::Array(items), false) = (value, matches!(constant, NativeValue::Array(_))) {
        return match op {
            CompareOp::Ne => !items.iter().any(|v| compare_strict(v, CompareOp::Eq, constant)),
            _ => items.iter().any(|v| compare_strict(v, op, constant)),
        };
    }
    compare_strict(value, op, constant)
}

fn compare_strict(value: &NativeValue, op: CompareOp, constant: &NativeValue) -> bool {
    let ordering = match same_type_cmp(value, constant) {
        Some(o) => o,
        // Different native types never compare equal
        None => return op == CompareOp::Ne,
    };
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

fn same_type_cmp(a: &NativeValue, b: &NativeValue) -> Option<Ordering> {
    use NativeValue as N;
    match (a, b) {
        (N::Null, N::Null) => Some(Ordering::Equal),
        (N::Boolean(x), N::Boolean(y)) => Some(x.cmp(y)),
        (N::Int32(x), N::Int32(y)) => Some(x.cmp(y)),
        (N::Int64(x), N::Int64(y)) => Some(x.cmp(y)),
        (N::Double(x), N::Double(y)) => x.partial_cmp(y),
        (N::String(x), N::String(y)) => Some(x.cmp(y)),
        (N::ObjectId(x), N::ObjectId(y)) => Some(x.cmp(y)),
        (N::DateTime(x), N::DateTime(y)) => Some(x.cmp(y)),
        (
            N::Timestamp {
                seconds: s1,
                increment: i1,
            },
            N::Timestamp {
                seconds: s2,
                increment: i2,
            },
        ) => Some((s1, i1).cmp(&(s2, i2))),
        (N::Binary(x), N::Binary(y)) => Some(x.cmp(y)),
        (N::Array(x), N::Array(y)) => (x == y).then_some(Ordering::Equal),
        (N::Document(x), N::Document(y)) => (x == y).then_some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(value: &NativeValue) -> u8 {
    match value {
        NativeValue::Null => 0,
        NativeValue::Int32(_) | NativeValue::Int64(_) | NativeValue::Double(_) => 1,
        NativeValue::String(_) => 2,
        NativeValue::Document(_) => 3,
        NativeValue::Array(_) => 4,
        NativeValue::Binary(_) => 5,
        NativeValue::ObjectId(_) => 6,
        NativeValue::Boolean(_) => 7,
        NativeValue::DateTime(_) => 8,
        NativeValue::Timestamp { .. } => 9,
    }
}

fn as_f64(value: &NativeValue) -> Option<f64> {
    match value {
        NativeValue::Int32(i) => Some(f64::from(*i)),
        NativeValue::Int64(i) => Some(*i as f64),
        NativeValue::Double(f) => Some(*f),
        _ => None,
    }
}

/// Total order used for sorting
pub fn sort_cmp(a: Option<&NativeValue>, b: Option<&NativeValue>) -> Ordering {
    let a = a.unwrap_or(&NativeValue::Null);
    let b = b.unwrap_or(&NativeValue::Null);
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    if let Some(o) = same_type_cmp(a, b) {
        return o;
    }
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Stable-sort `(position, document)` pairs by sort keys
///
/// `position` is the natural-order index used by `SortKey::Natural`.
pub fn sort_documents(documents: &mut [(usize, Document)], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    documents.sort_by(|(pa, a), (pb, b)| {
        for key in keys {
            let ordering = match key {
                SortKey::Natural { descending } => {
                    let o = pa.cmp(pb);
                    if *descending {
                        o.reverse()
                    } else {
                        o
                    }
                }
                SortKey::Field { path, descending } => {
                    let o = sort_cmp(a.get_path(path), b.get_path(path));
                    if *descending {
                        o.reverse()
                    } else {
                        o
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

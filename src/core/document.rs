use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Kind tag for a JSON value, used by `type` conditions in filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Array => "array",
            ValueType::Object => "object",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "null" => Some(ValueType::Null),
            "bool" | "boolean" => Some(ValueType::Bool),
            "number" => Some(ValueType::Number),
            "string" => Some(ValueType::String),
            "array" => Some(ValueType::Array),
            "object" => Some(ValueType::Object),
            _ => None,
        }
    }
}

pub fn type_name(value: &Value) -> &'static str {
    ValueType::of(value).name()
}

/// Resolve a dot-separated path against a document.
///
/// Returns `None` when any segment is missing or traverses a non-object.
/// Absence is never an error: filters treat it as a failed condition and
/// aggregations as a zero contribution.
pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Set a dot-separated path in a document, creating intermediate objects.
/// Fails (returns false) when an intermediate segment holds a non-object.
pub fn set_path(doc: &mut serde_json::Map<String, Value>, path: &str, value: Value) -> bool {
    let mut parts = path.split('.').peekable();
    let mut current = doc;

    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            current.insert(part.to_string(), value);
            return true;
        }
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        match entry {
            Value::Object(map) => current = map,
            _ => return false,
        }
    }

    false
}

/// Equality with numeric coercion: `5` and `5.0` are the same value.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(fa), Some(fb)) => fa == fb,
        _ => a == b,
    }
}

/// Total order over JSON values, for sorting and range comparisons.
///
/// Values of different kinds order by kind rank:
/// null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(ba), Value::Bool(bb)) => ba.cmp(bb),
        (Value::Number(na), Value::Number(nb)) => {
            let fa = na.as_f64().unwrap_or(0.0);
            let fb = nb.as_f64().unwrap_or(0.0);
            fa.partial_cmp(&fb).unwrap_or(Ordering::Equal)
        }
        (Value::String(sa), Value::String(sb)) => sa.cmp(sb),
        (Value::Array(aa), Value::Array(ab)) => {
            for (item_a, item_b) in aa.iter().zip(ab.iter()) {
                let cmp = compare_values(item_a, item_b);
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            aa.len().cmp(&ab.len())
        }
        (Value::Object(_), Value::Object(_)) => {
            let sa = serde_json::to_string(a).unwrap_or_default();
            let sb = serde_json::to_string(b).unwrap_or_default();
            sa.cmp(&sb)
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Order two optional field values for sorting.
///
/// Policy: a missing field compares greater than any present value, so
/// missing sorts last in ascending order (and first in descending).
pub fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(va), Some(vb)) => compare_values(va, vb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Round to `precision` decimal places, half away from zero
/// (`f64::round` semantics): 0.005 at precision 2 rounds to 0.01.
pub fn round_to_decimals(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

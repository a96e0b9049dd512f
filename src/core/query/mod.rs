pub mod lexer;
pub mod parser;

pub use parser::parse_filter;

use crate::core::document::{compare_values, get_path, values_equal, ValueType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// A filter over documents: a closed AST of field-level conditions.
///
/// Filters are plain data — they serialize as JSON and can be built
/// directly, or parsed from the textual filter language via
/// [`parse_filter`] (e.g. `category is "Electronics" and price < 50000`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    /// Compare the value at `path` against a literal.
    Compare {
        path: String,
        cmp: CompareOp,
        value: Value,
    },
    /// True when `path` resolves to a value (including an explicit null).
    Exists { path: String },
    /// True when the value at `path` has the given kind.
    IsType { path: String, kind: ValueType },
    And { filters: Vec<Filter> },
    Or { filters: Vec<Filter> },
    Not { filter: Box<Filter> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Filter {
    /// Evaluate the filter against a document.
    ///
    /// A condition on an absent field is false — `exists` included — and
    /// never an error. Ordering comparisons apply to two numbers or two
    /// strings; any other pairing is false.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::Compare { path, cmp, value } => match get_path(doc, path) {
                Some(field) => compare(field, *cmp, value),
                None => false,
            },
            Filter::Exists { path } => get_path(doc, path).is_some(),
            Filter::IsType { path, kind } => match get_path(doc, path) {
                Some(field) => ValueType::of(field) == *kind,
                None => false,
            },
            Filter::And { filters } => filters.iter().all(|f| f.matches(doc)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(doc)),
            Filter::Not { filter } => !filter.matches(doc),
        }
    }

    /// Shorthand for an equality condition.
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Compare {
            path: path.into(),
            cmp: CompareOp::Eq,
            value: value.into(),
        }
    }
}

fn compare(field: &Value, cmp: CompareOp, literal: &Value) -> bool {
    match cmp {
        CompareOp::Eq => values_equal(field, literal),
        CompareOp::Ne => !values_equal(field, literal),
        CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte => {
            let ordering = match (field, literal) {
                (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) => {
                    compare_values(field, literal)
                }
                _ => return false,
            };
            match cmp {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Lte => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Gte => ordering != Ordering::Less,
                _ => unreachable!(),
            }
        }
    }
}

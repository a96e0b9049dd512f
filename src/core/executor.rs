use crate::core::document::{compare_for_sort, get_path, round_to_decimals, set_path, type_name};
use crate::core::errors::{Error, Result};
use crate::core::pipeline::{
    validate, Accumulator, AccumulatorOp, ProjectField, ProjectSpec, SortKey, Stage,
};
use crate::core::query::Filter;
use crate::core::query_builder::SortOrder;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Run a pipeline over a document snapshot, strictly left to right.
///
/// No stage reordering, fusion, or partial results: a failing stage
/// aborts the whole run, wrapped in [`Error::PipelineStage`] carrying the
/// stage's index and name.
pub fn execute_pipeline(documents: Vec<Value>, stages: &[Stage]) -> Result<Vec<Value>> {
    validate(stages)?;

    let mut documents = documents;
    for (index, stage) in stages.iter().enumerate() {
        documents = execute_stage(stage, documents).map_err(|e| Error::PipelineStage {
            index,
            stage: stage.name(),
            source: Box::new(e),
        })?;
    }

    Ok(documents)
}

fn execute_stage(stage: &Stage, documents: Vec<Value>) -> Result<Vec<Value>> {
    match stage {
        Stage::Match { filter } => Ok(execute_match(filter, documents)),
        Stage::Unwind { path } => execute_unwind(path, documents),
        Stage::Group {
            by,
            key_as,
            accumulators,
        } => execute_group(by, key_as, accumulators, documents),
        Stage::Project { fields } => Ok(documents
            .into_iter()
            .map(|doc| project_document(&doc, fields))
            .collect()),
        Stage::Sort { keys } => Ok(execute_sort(keys, documents)),
    }
}

fn execute_match(filter: &Filter, documents: Vec<Value>) -> Vec<Value> {
    documents
        .into_iter()
        .filter(|doc| filter.matches(doc))
        .collect()
}

/// Replace the array at `path` element-wise, one output document per
/// element. A missing field or non-array value is a type mismatch;
/// callers guard with a Match stage (`path exists and path type array`).
/// A present empty array contributes zero output documents.
fn execute_unwind(path: &str, documents: Vec<Value>) -> Result<Vec<Value>> {
    let mut output = Vec::with_capacity(documents.len());

    for doc in documents {
        let elements = match get_path(&doc, path) {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(Error::TypeMismatch {
                    path: path.to_string(),
                    expected: "array",
                    found: type_name(other),
                })
            }
            None => {
                return Err(Error::TypeMismatch {
                    path: path.to_string(),
                    expected: "array",
                    found: "missing",
                })
            }
        };

        for element in elements {
            let mut copy = match &doc {
                Value::Object(map) => map.clone(),
                _ => {
                    return Err(Error::TypeMismatch {
                        path: path.to_string(),
                        expected: "object",
                        found: type_name(&doc),
                    })
                }
            };
            set_path(&mut copy, path, element);
            output.push(Value::Object(copy));
        }
    }

    Ok(output)
}

fn execute_group(
    by: &str,
    key_as: &str,
    accumulators: &[Accumulator],
    documents: Vec<Value>,
) -> Result<Vec<Value>> {
    // Partitions keep first-seen key order; the map only deduplicates.
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut partitions: Vec<(Value, Vec<Value>)> = Vec::new();

    for doc in documents {
        let key = get_path(&doc, by).cloned().unwrap_or(Value::Null);
        let canonical = serde_json::to_string(&key)?;

        let next = partitions.len();
        let slot = *seen.entry(canonical).or_insert_with(|| {
            partitions.push((key, Vec::new()));
            next
        });
        partitions[slot].1.push(doc);
    }

    let mut results = Vec::with_capacity(partitions.len());
    for (key, docs) in partitions {
        let mut out = Map::new();
        out.insert(key_as.to_string(), key);
        for accumulator in accumulators {
            out.insert(
                accumulator.field.clone(),
                accumulate(&accumulator.op, &docs),
            );
        }
        results.push(Value::Object(out));
    }

    Ok(results)
}

fn accumulate(op: &AccumulatorOp, docs: &[Value]) -> Value {
    match op {
        AccumulatorOp::Count => Value::from(docs.len() as u64),
        AccumulatorOp::Sum { path } => {
            let sum: f64 = numeric_contributors(docs, path).sum();
            Value::from(sum)
        }
        AccumulatorOp::Avg { path } => {
            let values: Vec<f64> = numeric_contributors(docs, path).collect();
            if values.is_empty() {
                Value::Null
            } else {
                Value::from(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        AccumulatorOp::Min { path } => numeric_contributors(docs, path)
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(Value::from)
            .unwrap_or(Value::Null),
        AccumulatorOp::Max { path } => numeric_contributors(docs, path)
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(Value::from)
            .unwrap_or(Value::Null),
        AccumulatorOp::First { path } => docs
            .first()
            .and_then(|doc| get_path(doc, path))
            .cloned()
            .unwrap_or(Value::Null),
    }
}

/// Numeric values at `path`, skipping missing and non-numeric fields.
/// They count as zero contribution, never as zero.
fn numeric_contributors<'a>(docs: &'a [Value], path: &'a str) -> impl Iterator<Item = f64> + 'a {
    docs.iter()
        .filter_map(move |doc| get_path(doc, path))
        .filter_map(|v| v.as_f64())
}

fn project_document(doc: &Value, fields: &[ProjectField]) -> Value {
    let mut out = Map::new();

    for field in fields {
        match &field.spec {
            ProjectSpec::Include => {
                if let Some(value) = get_path(doc, &field.name) {
                    out.insert(field.name.clone(), value.clone());
                }
            }
            ProjectSpec::Field { path } => {
                if let Some(value) = get_path(doc, path) {
                    out.insert(field.name.clone(), value.clone());
                }
            }
            ProjectSpec::Literal { value } => {
                out.insert(field.name.clone(), value.clone());
            }
            ProjectSpec::Round { path, precision } => {
                let rounded = get_path(doc, path)
                    .and_then(|v| v.as_f64())
                    .map(|v| Value::from(round_to_decimals(v, *precision)))
                    .unwrap_or(Value::Null);
                out.insert(field.name.clone(), rounded);
            }
        }
    }

    Value::Object(out)
}

fn execute_sort(keys: &[SortKey], mut documents: Vec<Value>) -> Vec<Value> {
    // Vec::sort_by is stable: equal documents keep their relative order.
    documents.sort_by(|a, b| {
        for key in keys {
            let cmp = compare_for_sort(get_path(a, &key.path), get_path(b, &key.path));
            let cmp = match key.order {
                SortOrder::Asc => cmp,
                SortOrder::Desc => cmp.reverse(),
            };
            if cmp != std::cmp::Ordering::Equal {
                return cmp;
            }
        }
        std::cmp::Ordering::Equal
    });

    documents
}

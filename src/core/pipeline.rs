use crate::core::errors::{Error, Result};
use crate::core::query::Filter;
use crate::core::query_builder::SortOrder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One stage of an aggregation pipeline.
///
/// A pipeline is a `Vec<Stage>` — plain data, serializable as JSON, owned
/// by the caller and immutable once built. Stages run strictly in order;
/// each stage's output is the next stage's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    /// Keep only documents matching the filter; non-matches drop silently.
    Match { filter: Filter },
    /// Emit one document per element of the array at `path`, with the
    /// array field replaced by the element. The only stage that changes
    /// document count.
    Unwind { path: String },
    /// Partition by the value at `by` and emit one document per distinct
    /// key, in first-seen order. The key lands under `key_as`
    /// (default `_id`) alongside one field per accumulator.
    Group {
        by: String,
        #[serde(default = "default_key_field")]
        key_as: String,
        accumulators: Vec<Accumulator>,
    },
    /// Reshape each document to exactly the declared fields, in declared
    /// order. Fields not listed are dropped.
    Project { fields: Vec<ProjectField> },
    /// Stable multi-key sort; the first key is primary, later keys break
    /// ties. Missing fields sort last in ascending order.
    Sort { keys: Vec<SortKey> },
}

fn default_key_field() -> String {
    "_id".to_string()
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match { .. } => "match",
            Stage::Unwind { .. } => "unwind",
            Stage::Group { .. } => "group",
            Stage::Project { .. } => "project",
            Stage::Sort { .. } => "sort",
        }
    }
}

/// One output field of a Group stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    /// Output field name.
    pub field: String,
    pub op: AccumulatorOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fn", rename_all = "snake_case")]
pub enum AccumulatorOp {
    /// Number of documents in the partition, regardless of field values.
    Count,
    /// Sum of numeric contributors; 0 when the partition has none.
    Sum { path: String },
    /// Mean of numeric contributors. Missing and non-numeric values are
    /// excluded from both sum and count; zero contributors yield null.
    Avg { path: String },
    Min { path: String },
    Max { path: String },
    /// Value from the first document of the partition. Reflects the input
    /// order of the document stream: deterministic only when a Sort stage
    /// precedes the Group or insertion order is meaningful.
    First { path: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectField {
    pub name: String,
    pub spec: ProjectSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum ProjectSpec {
    /// Copy the same-named input field; omitted from the output when the
    /// input lacks it.
    Include,
    /// Copy the value at `path`, renaming it to the output field.
    Field { path: String },
    /// Emit a constant.
    Literal { value: Value },
    /// Round the numeric value at `path` to `precision` decimal places,
    /// half away from zero. Missing or non-numeric values become null.
    Round { path: String, precision: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub path: String,
    pub order: SortOrder,
}

/// Reject structurally invalid pipelines before running any stage.
pub fn validate(stages: &[Stage]) -> Result<()> {
    for (index, stage) in stages.iter().enumerate() {
        let problem = match stage {
            Stage::Unwind { path } if path.is_empty() => Some("unwind path is empty".to_string()),
            Stage::Group { by, accumulators, .. } => {
                if by.is_empty() {
                    Some("group key path is empty".to_string())
                } else {
                    duplicate_output_field(accumulators)
                        .map(|name| format!("group declares output field '{}' twice", name))
                }
            }
            Stage::Project { fields } if fields.is_empty() => {
                Some("project declares no fields".to_string())
            }
            Stage::Sort { keys } if keys.is_empty() => Some("sort declares no keys".to_string()),
            _ => None,
        };

        if let Some(problem) = problem {
            return Err(Error::InvalidPipeline {
                reason: format!("stage {}: {}", index, problem),
            });
        }
    }
    Ok(())
}

fn duplicate_output_field(accumulators: &[Accumulator]) -> Option<&str> {
    for (i, acc) in accumulators.iter().enumerate() {
        if accumulators[..i].iter().any(|a| a.field == acc.field) {
            return Some(&acc.field);
        }
    }
    None
}

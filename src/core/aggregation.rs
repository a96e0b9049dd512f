use crate::core::collection::Collection;
use crate::core::errors::{Error, Result};
use crate::core::executor::execute_pipeline;
use crate::core::pipeline::{Accumulator, AccumulatorOp, ProjectField, ProjectSpec, SortKey, Stage};
use crate::core::query::{parse_filter, Filter};
use crate::core::query_builder::SortOrder;
use serde_json::Value;

/// Fluent builder for aggregation pipelines over a collection.
///
/// Builds a `Vec<Stage>` and runs it over a snapshot of the collection.
/// The built stages are plain data: [`stages`](Self::stages) exposes them
/// for serialization, and a deserialized pipeline runs through
/// [`Collection::aggregate_pipeline`].
///
/// # Example
/// ```
/// # use docmill::{Database, SortOrder};
/// # use serde_json::json;
/// let db = Database::new();
/// let products = db.collection("products");
/// products.insert(json!({"category": "Books", "price": 30.0})).unwrap();
///
/// let by_category = products.aggregate()
///     .group_by("category")
///     .avg("price", "avg_price")
///     .count("product_count")
///     .sort("avg_price", SortOrder::Desc)
///     .execute()
///     .unwrap();
/// assert_eq!(by_category[0]["avg_price"], json!(30.0));
/// ```
pub struct AggregationPipeline<'a> {
    collection: &'a Collection,
    stages: Vec<Stage>,
    build_error: Option<Error>,
}

impl<'a> AggregationPipeline<'a> {
    pub(crate) fn new(collection: &'a Collection) -> Self {
        Self {
            collection,
            stages: Vec::new(),
            build_error: None,
        }
    }

    /// Add a match stage from the textual filter language.
    /// A parse error is reported when the pipeline executes.
    pub fn match_(mut self, filter: &str) -> Self {
        match parse_filter(filter) {
            Ok(parsed) => self.stages.push(Stage::Match { filter: parsed }),
            Err(reason) => {
                self.build_error
                    .get_or_insert(Error::InvalidFilter { reason });
            }
        }
        self
    }

    /// Add a match stage from an already-built [`Filter`].
    pub fn match_filter(mut self, filter: Filter) -> Self {
        self.stages.push(Stage::Match { filter });
        self
    }

    /// Add an unwind stage: one output document per element of the array
    /// at `path`. Guard with a match stage
    /// (`path exists and path type array`) when documents may lack it.
    pub fn unwind(mut self, path: &str) -> Self {
        self.stages.push(Stage::Unwind {
            path: path.to_string(),
        });
        self
    }

    /// Add a group stage partitioning by the value at `by`; the key lands
    /// under `_id`. Accumulators attach via the methods below.
    pub fn group_by(self, by: &str) -> Self {
        self.group_by_as(by, "_id")
    }

    /// Like [`group_by`](Self::group_by), with the key stored under
    /// `key_as` instead of `_id`.
    pub fn group_by_as(mut self, by: &str, key_as: &str) -> Self {
        self.stages.push(Stage::Group {
            by: by.to_string(),
            key_as: key_as.to_string(),
            accumulators: Vec::new(),
        });
        self
    }

    /// Count documents per partition.
    pub fn count(self, output_field: &str) -> Self {
        self.accumulate(output_field, AccumulatorOp::Count)
    }

    /// Sum the numeric values at `path` per partition.
    pub fn sum(self, path: &str, output_field: &str) -> Self {
        self.accumulate(
            output_field,
            AccumulatorOp::Sum {
                path: path.to_string(),
            },
        )
    }

    /// Average the numeric values at `path` per partition; missing and
    /// non-numeric values are excluded, and a partition with none yields
    /// null.
    pub fn avg(self, path: &str, output_field: &str) -> Self {
        self.accumulate(
            output_field,
            AccumulatorOp::Avg {
                path: path.to_string(),
            },
        )
    }

    pub fn min(self, path: &str, output_field: &str) -> Self {
        self.accumulate(
            output_field,
            AccumulatorOp::Min {
                path: path.to_string(),
            },
        )
    }

    pub fn max(self, path: &str, output_field: &str) -> Self {
        self.accumulate(
            output_field,
            AccumulatorOp::Max {
                path: path.to_string(),
            },
        )
    }

    /// Take the value at `path` from the first document of each
    /// partition. Order-dependent: sort before grouping for determinism.
    pub fn first(self, path: &str, output_field: &str) -> Self {
        self.accumulate(
            output_field,
            AccumulatorOp::First {
                path: path.to_string(),
            },
        )
    }

    fn accumulate(mut self, output_field: &str, op: AccumulatorOp) -> Self {
        if let Some(Stage::Group { accumulators, .. }) = self.stages.last_mut() {
            accumulators.push(Accumulator {
                field: output_field.to_string(),
                op,
            });
        } else {
            self.build_error.get_or_insert(Error::InvalidPipeline {
                reason: format!("accumulator '{}' requires a group stage", output_field),
            });
        }
        self
    }

    /// Add a project stage copying the named fields as-is.
    pub fn project(mut self, fields: &[&str]) -> Self {
        self.stages.push(Stage::Project {
            fields: fields
                .iter()
                .map(|name| ProjectField {
                    name: (*name).to_string(),
                    spec: ProjectSpec::Include,
                })
                .collect(),
        });
        self
    }

    /// Add to the trailing project stage a field copied from `path`
    /// (rename), creating the stage when needed.
    pub fn project_as(self, path: &str, name: &str) -> Self {
        self.project_spec(
            name,
            ProjectSpec::Field {
                path: path.to_string(),
            },
        )
    }

    /// Add to the trailing project stage the numeric value at `path`
    /// rounded to `precision` decimals (half away from zero).
    pub fn project_rounded(self, path: &str, name: &str, precision: u32) -> Self {
        self.project_spec(
            name,
            ProjectSpec::Round {
                path: path.to_string(),
                precision,
            },
        )
    }

    /// Add to the trailing project stage a constant field.
    pub fn project_literal(self, name: &str, value: Value) -> Self {
        self.project_spec(name, ProjectSpec::Literal { value })
    }

    fn project_spec(mut self, name: &str, spec: ProjectSpec) -> Self {
        let field = ProjectField {
            name: name.to_string(),
            spec,
        };
        if let Some(Stage::Project { fields }) = self.stages.last_mut() {
            fields.push(field);
        } else {
            self.stages.push(Stage::Project {
                fields: vec![field],
            });
        }
        self
    }

    /// Add a sort key. Consecutive calls extend one stable multi-key sort
    /// stage: the first key is primary, later keys break ties.
    pub fn sort(mut self, path: &str, order: SortOrder) -> Self {
        let key = SortKey {
            path: path.to_string(),
            order,
        };
        if let Some(Stage::Sort { keys }) = self.stages.last_mut() {
            keys.push(key);
        } else {
            self.stages.push(Stage::Sort { keys: vec![key] });
        }
        self
    }

    /// The built stages, for inspection or serialization.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn into_stages(self) -> Vec<Stage> {
        self.stages
    }

    /// Execute the pipeline over a snapshot of the collection.
    pub fn execute(self) -> Result<Vec<Value>> {
        if let Some(error) = self.build_error {
            return Err(error);
        }
        let snapshot = self.collection.find_all()?;
        execute_pipeline(snapshot, &self.stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::database::Database;
    use serde_json::json;

    fn seeded() -> Collection {
        let db = Database::new();
        let products = db.collection("products");
        products
            .insert_many(vec![
                json!({"product_id": "P1", "name": "Amp", "category": "Audio", "price": 100.0}),
                json!({"product_id": "P2", "name": "Mixer", "category": "Audio", "price": 200.0}),
                json!({"product_id": "P3", "name": "Novel", "category": "Books", "price": 30.0}),
            ])
            .unwrap();
        products
    }

    #[test]
    fn test_builder_collapses_sort_keys_into_one_stage() {
        let col = seeded();
        let pipeline = col
            .aggregate()
            .sort("avg_rating", SortOrder::Desc)
            .sort("review_count", SortOrder::Desc);

        assert_eq!(pipeline.stages().len(), 1);
        match &pipeline.stages()[0] {
            Stage::Sort { keys } => assert_eq!(keys.len(), 2),
            other => panic!("expected sort, got {:?}", other),
        }
    }

    #[test]
    fn test_builder_bad_filter_surfaces_at_execute() {
        let col = seeded();
        let err = col.aggregate().match_("price >").execute().unwrap_err();
        assert!(matches!(err, Error::InvalidFilter { .. }));
    }

    #[test]
    fn test_accumulator_without_group_is_an_error() {
        let col = seeded();
        let err = col.aggregate().count("n").execute().unwrap_err();
        assert!(matches!(err, Error::InvalidPipeline { .. }));
    }

    #[test]
    fn test_group_project_sort_end_to_end() {
        let col = seeded();
        let results = col
            .aggregate()
            .group_by("category")
            .avg("price", "avg_price")
            .count("product_count")
            .project_as("_id", "category")
            .project_rounded("avg_price", "avg_price", 2)
            .project_as("product_count", "product_count")
            .sort("avg_price", SortOrder::Desc)
            .execute()
            .unwrap();

        assert_eq!(
            results,
            vec![
                json!({"category": "Audio", "avg_price": 150.0, "product_count": 2}),
                json!({"category": "Books", "avg_price": 30.0, "product_count": 1}),
            ]
        );
    }

    #[test]
    fn test_stages_serialize_and_replay() {
        let col = seeded();
        let pipeline = col
            .aggregate()
            .match_("price >= 50")
            .group_by("category")
            .count("n")
            .into_stages();

        let text = serde_json::to_string(&pipeline).unwrap();
        let back: Vec<Stage> = serde_json::from_str(&text).unwrap();
        let results = col.aggregate_pipeline(&back).unwrap();

        assert_eq!(results, vec![json!({"_id": "Audio", "n": 2})]);
    }
}

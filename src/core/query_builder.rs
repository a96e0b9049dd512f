use crate::core::collection::Collection;
use crate::core::document::{compare_for_sort, get_path, set_path};
use crate::core::errors::{Error, Result};
use crate::core::query::{parse_filter, Filter};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Builder for standalone queries: filter, sort, skip/limit, projection.
///
/// This is the simple read path (equality/range filtering with field
/// projection); reshaping and aggregation go through
/// [`Collection::aggregate`](crate::core::collection::Collection::aggregate).
pub struct QueryBuilder<'a> {
    collection: &'a Collection,
    filter: Option<Filter>,
    parse_error: Option<String>,
    sort_fields: Vec<(String, SortOrder)>,
    limit_count: Option<usize>,
    skip_count: usize,
    projection: Option<Projection>,
}

#[derive(Debug, Clone)]
enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(collection: &'a Collection) -> Self {
        Self {
            collection,
            filter: None,
            parse_error: None,
            sort_fields: Vec::new(),
            limit_count: None,
            skip_count: 0,
            projection: None,
        }
    }

    /// Filter documents using the textual filter language.
    /// A parse error is reported when the query executes.
    pub fn filter(mut self, filter: &str) -> Self {
        match parse_filter(filter) {
            Ok(parsed) => self.filter = Some(parsed),
            Err(reason) => {
                self.parse_error.get_or_insert(reason);
            }
        }
        self
    }

    /// Filter documents using an already-built [`Filter`].
    pub fn filter_with(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sort results by a field. Repeated calls add tie-break keys.
    pub fn sort_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort_fields.push((field.to_string(), order));
        self
    }

    /// Limit the number of results returned.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit_count = Some(n);
        self
    }

    /// Skip the first N results.
    pub fn skip(mut self, n: usize) -> Self {
        self.skip_count = n;
        self
    }

    /// Keep only the named fields. `_id` stays unless explicitly excluded.
    pub fn project(mut self, fields: &[&str]) -> Self {
        self.projection = Some(Projection::Include(
            fields.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Drop the named fields and keep everything else.
    pub fn exclude(mut self, fields: &[&str]) -> Self {
        self.projection = Some(Projection::Exclude(
            fields.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Execute the query and return results.
    pub fn execute(self) -> Result<Vec<Value>> {
        if let Some(reason) = self.parse_error {
            return Err(Error::InvalidFilter { reason });
        }

        let mut results = self.collection.find_all()?;

        if let Some(filter) = &self.filter {
            results.retain(|doc| filter.matches(doc));
        }

        if !self.sort_fields.is_empty() {
            results.sort_by(|a, b| {
                for (field, order) in &self.sort_fields {
                    let cmp = compare_for_sort(get_path(a, field), get_path(b, field));
                    let cmp = match order {
                        SortOrder::Asc => cmp,
                        SortOrder::Desc => cmp.reverse(),
                    };
                    if cmp != std::cmp::Ordering::Equal {
                        return cmp;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let results: Vec<Value> = results
            .into_iter()
            .skip(self.skip_count)
            .take(self.limit_count.unwrap_or(usize::MAX))
            .collect();

        let results = if let Some(projection) = &self.projection {
            results
                .into_iter()
                .map(|doc| apply_projection(doc, projection))
                .collect()
        } else {
            results
        };

        Ok(results)
    }

    /// Execute and return the first result.
    pub fn first(mut self) -> Result<Option<Value>> {
        self.limit_count = Some(1);
        let results = self.execute()?;
        Ok(results.into_iter().next())
    }

    /// Count matching results without projecting them.
    pub fn count(self) -> Result<usize> {
        if let Some(reason) = self.parse_error {
            return Err(Error::InvalidFilter { reason });
        }

        let docs = self.collection.find_all()?;
        let matched = match &self.filter {
            Some(filter) => docs.iter().filter(|doc| filter.matches(doc)).count(),
            None => docs.len(),
        };

        let after_skip = matched.saturating_sub(self.skip_count);
        Ok(self.limit_count.map_or(after_skip, |l| l.min(after_skip)))
    }
}

fn apply_projection(doc: Value, projection: &Projection) -> Value {
    let obj = match doc {
        Value::Object(obj) => obj,
        other => return other,
    };

    match projection {
        Projection::Include(fields) => {
            let mut result = serde_json::Map::new();

            if !fields.iter().any(|f| f == "_id") {
                if let Some(id) = obj.get("_id") {
                    result.insert("_id".to_string(), id.clone());
                }
            }

            let source = Value::Object(obj);
            for field in fields {
                if let Some(value) = get_path(&source, field) {
                    set_path(&mut result, field, value.clone());
                }
            }

            Value::Object(result)
        }
        Projection::Exclude(fields) => {
            let mut result = obj;
            for field in fields {
                remove_path(&mut result, field);
            }
            Value::Object(result)
        }
    }
}

fn remove_path(obj: &mut serde_json::Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            obj.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = obj.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_include_projection_keeps_id_and_drops_rest() {
        let doc = json!({"_id": "x1", "name": "Widget", "price": 10, "stock": 3});
        let projected = apply_projection(doc, &Projection::Include(vec![
            "name".to_string(),
            "price".to_string(),
        ]));
        assert_eq!(projected, json!({"_id": "x1", "name": "Widget", "price": 10}));
    }

    #[test]
    fn test_include_projection_can_drop_id() {
        let doc = json!({"_id": "x1", "name": "Widget"});
        let projected = apply_projection(doc, &Projection::Include(vec!["name".to_string()]));
        // _id kept by default; excluding it means not listing it AND using exclude
        assert_eq!(projected["_id"], json!("x1"));

        let doc = json!({"_id": "x1", "name": "Widget"});
        let projected = apply_projection(doc, &Projection::Exclude(vec!["_id".to_string()]));
        assert_eq!(projected, json!({"name": "Widget"}));
    }

    #[test]
    fn test_exclude_nested_field() {
        let doc = json!({"_id": "x1", "meta": {"secret": 1, "public": 2}});
        let projected = apply_projection(doc, &Projection::Exclude(vec!["meta.secret".to_string()]));
        assert_eq!(projected, json!({"_id": "x1", "meta": {"public": 2}}));
    }

    #[test]
    fn test_include_nested_field() {
        let doc = json!({"_id": "x1", "meta": {"secret": 1, "public": 2}});
        let projected = apply_projection(doc, &Projection::Include(vec!["meta.public".to_string()]));
        assert_eq!(projected, json!({"_id": "x1", "meta": {"public": 2}}));
    }
}

use crate::core::aggregation::AggregationPipeline;
use crate::core::document::type_name;
use crate::core::errors::{Error, Result};
use crate::core::executor::execute_pipeline;
use crate::core::pipeline::Stage;
use crate::core::query::{parse_filter, Filter};
use crate::core::query_builder::QueryBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) type Documents = Arc<RwLock<Vec<Value>>>;

/// Handle to one collection of documents.
///
/// Documents are sparse-schema JSON objects kept in insertion order.
/// Every read takes a snapshot: pipelines and queries run over a clone of
/// the document set as of call start and never observe later mutations.
#[derive(Clone)]
pub struct Collection {
    name: String,
    docs: Documents,
}

/// A partial in-place update, applied to the first matching document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Update {
    /// Append a value to the array at `path`, creating the array when the
    /// field is absent. A present non-array value is a type mismatch.
    Push { path: String, value: Value },
    /// Merge top-level fields into the document. `_id` cannot be changed.
    Set { fields: Map<String, Value> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateResult {
    pub matched: usize,
    pub modified: usize,
}

impl Collection {
    pub(crate) fn new(name: String, docs: Documents) -> Self {
        Self { name, docs }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert a document, assigning a string `_id` when it has none.
    /// Returns the document's id.
    pub fn insert(&self, doc: Value) -> Result<String> {
        let prepared = prepare_document(doc)?;
        let id = document_id(&prepared);

        let mut docs = self.docs.write()?;
        if docs.iter().any(|d| document_id(d) == id) {
            return Err(Error::DuplicateId { id });
        }
        docs.push(prepared);
        Ok(id)
    }

    /// Insert a batch, all or nothing: every document is validated before
    /// any is stored.
    pub fn insert_many(&self, batch: Vec<Value>) -> Result<Vec<String>> {
        let mut prepared = Vec::with_capacity(batch.len());
        let mut ids = Vec::with_capacity(batch.len());
        for doc in batch {
            let doc = prepare_document(doc)?;
            ids.push(document_id(&doc));
            prepared.push(doc);
        }

        let mut docs = self.docs.write()?;
        for id in &ids {
            let clashes = docs.iter().any(|d| document_id(d) == *id)
                || ids.iter().filter(|other| *other == id).count() > 1;
            if clashes {
                return Err(Error::DuplicateId { id: id.clone() });
            }
        }
        docs.extend(prepared);
        Ok(ids)
    }

    /// Snapshot of every document, in insertion order.
    pub fn find_all(&self) -> Result<Vec<Value>> {
        let docs = self.docs.read()?;
        Ok(docs.clone())
    }

    /// Find documents matching a textual filter.
    pub fn find(&self, filter: &str) -> Result<Vec<Value>> {
        let filter = parse_filter(filter).map_err(|reason| Error::InvalidFilter { reason })?;
        self.find_with(&filter)
    }

    pub fn find_with(&self, filter: &Filter) -> Result<Vec<Value>> {
        let docs = self.docs.read()?;
        Ok(docs.iter().filter(|doc| filter.matches(doc)).cloned().collect())
    }

    /// First document matching the filter, or None.
    pub fn find_one(&self, filter: &str) -> Result<Option<Value>> {
        Ok(self.find(filter)?.into_iter().next())
    }

    /// Apply an update to the first document matching the filter.
    ///
    /// Zero matches leave the store untouched and report `{0, 0}`; the
    /// intended usage matches at most one document by a unique business
    /// key, so both counts are 0 or 1.
    pub fn update_one(&self, filter: &str, update: Update) -> Result<UpdateResult> {
        let filter = parse_filter(filter).map_err(|reason| Error::InvalidFilter { reason })?;
        self.update_one_with(&filter, update)
    }

    pub fn update_one_with(&self, filter: &Filter, update: Update) -> Result<UpdateResult> {
        let mut docs = self.docs.write()?;

        let target = docs.iter_mut().find(|doc| filter.matches(doc));
        let Some(target) = target else {
            return Ok(UpdateResult::default());
        };

        let map = target
            .as_object_mut()
            .ok_or_else(|| Error::InvalidDocument {
                reason: "stored document is not an object".to_string(),
            })?;

        let modified = match update {
            Update::Push { path, value } => {
                push_at_path(map, &path, value)?;
                true
            }
            Update::Set { fields } => {
                if fields.contains_key("_id") {
                    return Err(Error::InvalidDocument {
                        reason: "cannot modify _id".to_string(),
                    });
                }
                let mut changed = false;
                for (key, value) in fields {
                    changed |= map.get(&key) != Some(&value);
                    map.insert(key, value);
                }
                changed
            }
        };

        Ok(UpdateResult {
            matched: 1,
            modified: usize::from(modified),
        })
    }

    pub fn count(&self) -> Result<usize> {
        let docs = self.docs.read()?;
        Ok(docs.len())
    }

    pub fn count_with_filter(&self, filter: &str) -> Result<usize> {
        Ok(self.find(filter)?.len())
    }

    /// Clear the collection for repeatable runs.
    pub fn drop(&self) -> Result<()> {
        let mut docs = self.docs.write()?;
        docs.clear();
        Ok(())
    }

    /// Start a standalone query (filter, sort, skip/limit, projection).
    pub fn query(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    /// Start building an aggregation pipeline over this collection.
    pub fn aggregate(&self) -> AggregationPipeline<'_> {
        AggregationPipeline::new(self)
    }

    /// Run an already-built pipeline (e.g. deserialized from JSON) over a
    /// snapshot of this collection.
    pub fn aggregate_pipeline(&self, stages: &[Stage]) -> Result<Vec<Value>> {
        let snapshot = self.find_all()?;
        execute_pipeline(snapshot, stages)
    }

    pub fn insert_typed<T: Serialize>(&self, doc: &T) -> Result<String> {
        self.insert(serde_json::to_value(doc)?)
    }

    pub fn insert_many_typed<T: Serialize>(&self, batch: &[T]) -> Result<Vec<String>> {
        let values = batch
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.insert_many(values)
    }

    pub fn find_all_typed<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.find_all()?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(Error::from))
            .collect()
    }

    pub fn find_typed<T: DeserializeOwned>(&self, filter: &str) -> Result<Vec<T>> {
        self.find(filter)?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(Error::from))
            .collect()
    }
}

fn prepare_document(doc: Value) -> Result<Value> {
    let mut map = match doc {
        Value::Object(map) => map,
        other => {
            return Err(Error::InvalidDocument {
                reason: format!("document must be an object, got {}", type_name(&other)),
            })
        }
    };

    match map.get("_id") {
        Some(Value::String(_)) => {}
        Some(other) => {
            return Err(Error::InvalidDocument {
                reason: format!("_id must be a string, got {}", type_name(other)),
            })
        }
        None => {
            let id = generate_id();
            map.insert("_id".to_string(), Value::String(id));
        }
    }

    Ok(Value::Object(map))
}

fn document_id(doc: &Value) -> String {
    doc.get("_id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn push_at_path(map: &mut Map<String, Value>, path: &str, value: Value) -> Result<()> {
    let mut parts = path.split('.').peekable();
    let mut current = map;

    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            match current.get_mut(part) {
                Some(Value::Array(items)) => items.push(value),
                Some(other) => {
                    return Err(Error::TypeMismatch {
                        path: path.to_string(),
                        expected: "array",
                        found: type_name(other),
                    })
                }
                None => {
                    current.insert(part.to_string(), Value::Array(vec![value]));
                }
            }
            return Ok(());
        }

        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry {
            Value::Object(inner) => current = inner,
            other => {
                return Err(Error::TypeMismatch {
                    path: path.to_string(),
                    expected: "object",
                    found: type_name(other),
                })
            }
        }
    }

    Ok(())
}

fn generate_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hash, Hasher};

    let random_state = RandomState::new();
    let mut hasher = random_state.build_hasher();
    timestamp.hash(&mut hasher);
    let random_part = hasher.finish();

    format!("{}_{:x}", timestamp, random_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::database::Database;
    use serde_json::json;

    fn products() -> Collection {
        let db = Database::new();
        let products = db.collection("products");
        products
            .insert_many(vec![
                json!({"product_id": "ELEC001", "name": "Phone", "category": "Electronics",
                       "price": 30000, "reviews": [{"rating": 5}]}),
                json!({"product_id": "ELEC002", "name": "TV", "category": "Electronics",
                       "price": 60000}),
                json!({"product_id": "BOOK001", "name": "Novel", "category": "Books",
                       "price": 450}),
            ])
            .unwrap();
        products
    }

    #[test]
    fn test_insert_assigns_unique_string_ids() {
        let col = products();
        let id = col.insert(json!({"name": "Pen"})).unwrap();
        let doc = col.find_one("name is 'Pen'").unwrap().expect("inserted doc");
        assert_eq!(doc["_id"], json!(id));
    }

    #[test]
    fn test_insert_rejects_bad_documents() {
        let col = products();
        assert!(matches!(
            col.insert(json!([1, 2])),
            Err(Error::InvalidDocument { .. })
        ));
        assert!(matches!(
            col.insert(json!({"_id": 42})),
            Err(Error::InvalidDocument { .. })
        ));

        col.insert(json!({"_id": "fixed"})).unwrap();
        assert!(matches!(
            col.insert(json!({"_id": "fixed"})),
            Err(Error::DuplicateId { .. })
        ));
    }

    #[test]
    fn test_insert_many_is_all_or_nothing() {
        let col = products();
        let before = col.count().unwrap();
        let result = col.insert_many(vec![
            json!({"_id": "a1", "name": "ok"}),
            json!({"_id": "a1", "name": "duplicate"}),
        ]);
        assert!(matches!(result, Err(Error::DuplicateId { .. })));
        assert_eq!(col.count().unwrap(), before);
    }

    #[test]
    fn test_find_equality_and_range() {
        let col = products();
        let cheap_electronics = col
            .find("category is 'Electronics' and price < 50000")
            .unwrap();
        assert_eq!(cheap_electronics.len(), 1);
        assert_eq!(cheap_electronics[0]["name"], json!("Phone"));
    }

    #[test]
    fn test_update_one_push_appends_review() {
        let col = products();
        let review = json!({"user_id": "U999", "rating": 4, "comment": "Good value"});

        let result = col
            .update_one(
                "product_id is 'ELEC001'",
                Update::Push {
                    path: "reviews".to_string(),
                    value: review.clone(),
                },
            )
            .unwrap();
        assert_eq!(result, UpdateResult { matched: 1, modified: 1 });

        let doc = col.find_one("product_id is 'ELEC001'").unwrap().unwrap();
        let reviews = doc["reviews"].as_array().unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[1], review);
    }

    #[test]
    fn test_update_one_push_creates_missing_array() {
        let col = products();
        col.update_one(
            "product_id is 'ELEC002'",
            Update::Push {
                path: "reviews".to_string(),
                value: json!({"rating": 3}),
            },
        )
        .unwrap();

        let doc = col.find_one("product_id is 'ELEC002'").unwrap().unwrap();
        assert_eq!(doc["reviews"], json!([{"rating": 3}]));
    }

    #[test]
    fn test_update_one_push_into_non_array_fails() {
        let col = products();
        let err = col
            .update_one(
                "product_id is 'ELEC001'",
                Update::Push {
                    path: "name".to_string(),
                    value: json!("x"),
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_update_one_no_match_leaves_store_unchanged() {
        let col = products();
        let before = col.find_all().unwrap();

        let result = col
            .update_one(
                "product_id is 'MISSING'",
                Update::Push {
                    path: "reviews".to_string(),
                    value: json!({"rating": 1}),
                },
            )
            .unwrap();

        assert_eq!(result, UpdateResult { matched: 0, modified: 0 });
        assert_eq!(col.find_all().unwrap(), before);
    }

    #[test]
    fn test_update_one_set_merges_fields() {
        let col = products();
        let result = col
            .update_one(
                "product_id is 'BOOK001'",
                Update::Set {
                    fields: json!({"price": 500, "on_sale": true})
                        .as_object()
                        .unwrap()
                        .clone(),
                },
            )
            .unwrap();
        assert_eq!(result, UpdateResult { matched: 1, modified: 1 });

        let doc = col.find_one("product_id is 'BOOK001'").unwrap().unwrap();
        assert_eq!(doc["price"], json!(500));
        assert_eq!(doc["on_sale"], json!(true));
        assert_eq!(doc["name"], json!("Novel"));
    }

    #[test]
    fn test_drop_clears_collection() {
        let col = products();
        col.drop().unwrap();
        assert_eq!(col.count().unwrap(), 0);
        assert!(col.find_all().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_isolation_of_find_all() {
        let col = products();
        let snapshot = col.find_all().unwrap();
        col.insert(json!({"name": "late arrival"})).unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(col.count().unwrap(), 4);
    }

    #[test]
    fn test_typed_round_trip() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Item {
            name: String,
            price: f64,
        }

        let db = Database::new();
        let col = db.collection("items");
        col.insert_typed(&Item {
            name: "Pen".to_string(),
            price: 1.5,
        })
        .unwrap();

        let items: Vec<Item> = col.find_typed("price > 1").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Pen");
    }
}

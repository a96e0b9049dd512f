use crate::core::collection::{Collection, Documents};
use crate::core::errors::Result;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// An in-memory document database: a registry of named collections.
///
/// There is no persistence layer; a `Database` is cheap to construct and
/// scoped to its owner, so tests build isolated stores without any
/// process-wide setup. Handles are clones of a shared registry.
#[derive(Clone, Default)]
pub struct Database {
    collections: Arc<RwLock<HashMap<String, Documents>>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a handle to a collection, creating it lazily.
    pub fn collection(&self, name: &str) -> Collection {
        let mut collections = match self.collections.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let docs = collections
            .entry(name.to_string())
            .or_default()
            .clone();
        Collection::new(name.to_string(), docs)
    }

    pub fn collection_names(&self) -> Result<Vec<String>> {
        let collections = self.collections.read()?;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Remove a collection entirely. Existing handles keep their (now
    /// detached) document set. Returns whether the collection existed.
    pub fn drop_collection(&self, name: &str) -> Result<bool> {
        let mut collections = self.collections.write()?;
        Ok(collections.remove(name).is_some())
    }
}

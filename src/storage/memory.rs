//! In-memory reference storage backend.
//!
//! Backs a layer with a concurrent map of collections. Useful as a real
//! (if volatile) backend for embedders and as the storage the test suite
//! federates over. Write sessions are transactional: mutations stage in the
//! session and become visible only on `commit`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::feature::{Feature, FeatureId};
use crate::request::{ReadRequest, WriteOp, WriteRequest};
use crate::storage::{
    FeatureCursor, SessionOptions, Storage, StorageError, StorageReadSession,
    StorageWriteSession, WriteResult,
};

type CollectionMap = DashMap<String, BTreeMap<FeatureId, Feature>>;

/// Thread-safe in-memory feature storage.
///
/// # Example
///
/// ```
/// use viewfed::storage::MemoryStorage;
/// use viewfed::feature::Feature;
///
/// let storage = MemoryStorage::new("primary");
/// storage.put_feature("roads", Feature::new("r1"));
/// assert_eq!(storage.feature_count("roads"), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    name: String,
    collections: Arc<CollectionMap>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: Arc::new(DashMap::new()),
        }
    }

    /// Inserts or replaces a feature directly, bypassing write sessions.
    ///
    /// Intended for seeding; concurrent readers observe the change
    /// immediately.
    pub fn put_feature(&self, collection: &str, feature: Feature) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(feature.id.clone(), feature);
    }

    /// Removes a feature directly, bypassing write sessions.
    pub fn remove_feature(&self, collection: &str, id: &FeatureId) -> Option<Feature> {
        self.collections.get_mut(collection)?.remove(id)
    }

    /// Returns a feature by id, if present.
    pub fn feature(&self, collection: &str, id: &FeatureId) -> Option<Feature> {
        self.collections.get(collection)?.get(id).cloned()
    }

    /// Number of features in a collection (0 if the collection is absent).
    pub fn feature_count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn new_read_session(
        &self,
        options: &SessionOptions,
    ) -> Result<Arc<dyn StorageReadSession>, StorageError> {
        Ok(Arc::new(MemoryReadSession {
            collections: Arc::clone(&self.collections),
            statement_timeout: Mutex::new(options.statement_timeout),
            socket_timeout: options.socket_timeout,
        }))
    }

    fn new_write_session(
        &self,
        _options: &SessionOptions,
    ) -> Result<Box<dyn StorageWriteSession>, StorageError> {
        Ok(Box::new(MemoryWriteSession {
            collections: Arc::clone(&self.collections),
            staged: Vec::new(),
            closed: false,
        }))
    }
}

// =============================================================================
// Read Session
// =============================================================================

struct MemoryReadSession {
    collections: Arc<CollectionMap>,
    statement_timeout: Mutex<Option<Duration>>,
    socket_timeout: Option<Duration>,
}

impl MemoryReadSession {
    fn collect_by_id(&self, collection: &str, ids: &[FeatureId]) -> Vec<Feature> {
        let Some(features) = self.collections.get(collection) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| features.get(id).cloned())
            .collect()
    }

    fn collect_matching(
        &self,
        collection: &str,
        predicate: &crate::request::Predicate,
    ) -> Vec<Feature> {
        let Some(features) = self.collections.get(collection) else {
            return Vec::new();
        };
        features
            .values()
            .filter(|f| predicate.matches(f))
            .cloned()
            .collect()
    }
}

impl StorageReadSession for MemoryReadSession {
    fn execute<'a>(
        &'a self,
        request: &'a ReadRequest,
    ) -> BoxFuture<'a, Result<FeatureCursor, StorageError>> {
        Box::pin(async move {
            let features = match request {
                ReadRequest::ByIdLookup { collection, ids } => {
                    self.collect_by_id(collection, ids)
                }
                ReadRequest::PredicateQuery {
                    collection,
                    predicate,
                } => self.collect_matching(collection, predicate),
                ReadRequest::CollectionsQuery {
                    collections,
                    predicate,
                } => collections
                    .iter()
                    .flat_map(|c| self.collect_matching(c, predicate))
                    .collect(),
            };
            Ok(FeatureCursor::from_features(features))
        })
    }

    fn socket_timeout(&self) -> Option<Duration> {
        self.socket_timeout
    }

    fn set_statement_timeout(&self, timeout: Duration) {
        *self.statement_timeout.lock() = Some(timeout);
    }
}

// =============================================================================
// Write Session
// =============================================================================

struct MemoryWriteSession {
    collections: Arc<CollectionMap>,
    /// Mutations staged since the last commit/rollback, in arrival order.
    staged: Vec<(String, WriteOp)>,
    closed: bool,
}

impl MemoryWriteSession {
    /// Whether `id` exists in the effective state: committed data with the
    /// staged mutations applied on top.
    fn effective_contains(&self, collection: &str, id: &FeatureId) -> bool {
        for (staged_collection, op) in self.staged.iter().rev() {
            if staged_collection != collection {
                continue;
            }
            match op {
                WriteOp::Put(feature) if &feature.id == id => return true,
                WriteOp::Delete(deleted) if deleted == id => return false,
                _ => {}
            }
        }
        self.collections
            .get(collection)
            .map(|c| c.contains_key(id))
            .unwrap_or(false)
    }
}

impl StorageWriteSession for MemoryWriteSession {
    fn execute<'a>(
        &'a mut self,
        request: &'a WriteRequest,
    ) -> BoxFuture<'a, Result<WriteResult, StorageError>> {
        Box::pin(async move {
            if self.closed {
                return Err(StorageError::permanent("write session is closed"));
            }
            let mut result = WriteResult::default();
            for op in &request.ops {
                match op {
                    WriteOp::Put(feature) => {
                        if self.effective_contains(&request.collection, &feature.id) {
                            result.updated += 1;
                        } else {
                            result.inserted += 1;
                        }
                    }
                    WriteOp::Delete(id) => {
                        if self.effective_contains(&request.collection, id) {
                            result.deleted += 1;
                        }
                    }
                }
                self.staged.push((request.collection.clone(), op.clone()));
            }
            Ok(result)
        })
    }

    fn commit<'a>(&'a mut self) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            if self.closed {
                return Err(StorageError::permanent("write session is closed"));
            }
            for (collection, op) in self.staged.drain(..) {
                let mut features = self.collections.entry(collection).or_default();
                match op {
                    WriteOp::Put(feature) => {
                        features.insert(feature.id.clone(), feature);
                    }
                    WriteOp::Delete(id) => {
                        features.remove(&id);
                    }
                }
            }
            Ok(())
        })
    }

    fn rollback<'a>(&'a mut self) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.staged.clear();
            Ok(())
        })
    }

    fn close(&mut self) {
        self.staged.clear();
        self.closed = true;
    }
}

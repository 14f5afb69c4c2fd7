//! Read and write request shapes.
//!
//! Requests are tagged unions matched exhaustively throughout the engine, so
//! adding a request kind is a compile-time-checked exercise. The predicate
//! tree is produced by an upstream query parser and consumed opaquely here;
//! the engine only clones it per layer and hands it to the backing storage.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::feature::{Feature, FeatureId};

// =============================================================================
// Predicates
// =============================================================================

/// A pre-built property/spatial predicate tree.
///
/// Opaque to the federation algorithm; evaluated only by backing storages
/// (see [`MemoryStorage`](crate::storage::MemoryStorage)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches every feature.
    All,
    /// Matches features whose property at `path` equals `value`.
    PropertyEquals { path: String, value: Value },
    /// Matches point features inside the axis-aligned box (inclusive).
    BoundingBox {
        west: f64,
        south: f64,
        east: f64,
        north: f64,
    },
    /// Conjunction.
    And(Vec<Predicate>),
    /// Disjunction.
    Or(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Evaluates the predicate against a feature.
    pub fn matches(&self, feature: &Feature) -> bool {
        match self {
            Predicate::All => true,
            Predicate::PropertyEquals { path, value } => {
                feature.property(path) == Some(value)
            }
            Predicate::BoundingBox {
                west,
                south,
                east,
                north,
            } => match feature.point_coordinates() {
                Some((lon, lat)) => {
                    lon >= *west && lon <= *east && lat >= *south && lat <= *north
                }
                None => false,
            },
            Predicate::And(parts) => parts.iter().all(|p| p.matches(feature)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(feature)),
            Predicate::Not(inner) => !inner.matches(feature),
        }
    }
}

// =============================================================================
// Read Requests
// =============================================================================

/// A logical read request against a view or a single storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReadRequest {
    /// Exact lookup of features by id. Never triggers a second federation
    /// round: a by-id fetch cannot be improved by re-fetching by id.
    ByIdLookup {
        collection: String,
        ids: Vec<FeatureId>,
    },

    /// Features of one collection matching a predicate tree.
    PredicateQuery {
        collection: String,
        predicate: Predicate,
    },

    /// Predicate query addressed at explicit collection names. Federation
    /// supports exactly one distinct name per request.
    CollectionsQuery {
        collections: Vec<String>,
        predicate: Predicate,
    },
}

impl ReadRequest {
    /// Convenience constructor for a by-id lookup.
    pub fn by_id_lookup(
        collection: impl Into<String>,
        ids: impl IntoIterator<Item = impl Into<FeatureId>>,
    ) -> Self {
        ReadRequest::ByIdLookup {
            collection: collection.into(),
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Convenience constructor for a predicate query.
    pub fn predicate_query(collection: impl Into<String>, predicate: Predicate) -> Self {
        ReadRequest::PredicateQuery {
            collection: collection.into(),
            predicate,
        }
    }

    /// Collection names the request addresses.
    pub fn collections(&self) -> Vec<&str> {
        match self {
            ReadRequest::ByIdLookup { collection, .. }
            | ReadRequest::PredicateQuery { collection, .. } => vec![collection.as_str()],
            ReadRequest::CollectionsQuery { collections, .. } => {
                collections.iter().map(String::as_str).collect()
            }
        }
    }

    /// Whether this is an exact by-id lookup.
    pub fn is_by_id(&self) -> bool {
        matches!(self, ReadRequest::ByIdLookup { .. })
    }

    /// Request kind name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ReadRequest::ByIdLookup { .. } => "by_id_lookup",
            ReadRequest::PredicateQuery { .. } => "predicate_query",
            ReadRequest::CollectionsQuery { .. } => "collections_query",
        }
    }

    /// The same request retargeted at another collection.
    ///
    /// Used for per-layer translation: every layer addresses its own
    /// collection id within its own storage.
    pub fn with_collection(&self, collection_id: &str) -> ReadRequest {
        match self {
            ReadRequest::ByIdLookup { ids, .. } => ReadRequest::ByIdLookup {
                collection: collection_id.to_string(),
                ids: ids.clone(),
            },
            ReadRequest::PredicateQuery { predicate, .. } => ReadRequest::PredicateQuery {
                collection: collection_id.to_string(),
                predicate: predicate.clone(),
            },
            ReadRequest::CollectionsQuery { predicate, .. } => ReadRequest::CollectionsQuery {
                collections: vec![collection_id.to_string()],
                predicate: predicate.clone(),
            },
        }
    }
}

// =============================================================================
// Write Requests
// =============================================================================

/// One mutation inside a write request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Insert or replace a feature.
    Put(Feature),
    /// Delete a feature by id. Deleting a missing id is not an error.
    Delete(FeatureId),
}

/// A logical write request: an ordered batch of mutations against one
/// collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Target collection as named by the caller. The write session rewrites
    /// this to the bound layer's collection id before delegation.
    pub collection: String,
    /// Mutations, applied in order.
    pub ops: Vec<WriteOp>,
}

impl WriteRequest {
    /// Creates a write request.
    pub fn new(collection: impl Into<String>, ops: Vec<WriteOp>) -> Self {
        Self {
            collection: collection.into(),
            ops,
        }
    }

    /// The same request retargeted at another collection.
    pub fn with_collection(&self, collection_id: &str) -> WriteRequest {
        WriteRequest {
            collection: collection_id.to_string(),
            ops: self.ops.clone(),
        }
    }
}

//! Error taxonomy for the federation engine.
//!
//! Callers see either a fully merged [`Response`](crate::response::Response)
//! or one of these typed errors. Partial-layer degradation (best-effort mode)
//! is reported in response metadata, never silently folded into the merged
//! feature list.

use std::time::Duration;

use thiserror::Error;

use crate::storage::StorageError;

/// One layer's failure during a query round.
///
/// Carried inside [`FederationError::AllLayersFailed`] and, in best-effort
/// mode, in [`Response::failed_layers`](crate::response::Response).
#[derive(Debug, Clone)]
pub struct LayerFailure {
    /// Index of the failing layer in its collection (0 = highest priority).
    pub layer: usize,
    /// Collection id addressed within the failing layer's storage.
    pub collection: String,
    /// The underlying storage error.
    pub error: StorageError,
}

impl std::fmt::Display for LayerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "layer {} ({}): {}",
            self.layer, self.collection, self.error
        )
    }
}

/// Errors surfaced by views and federation sessions.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Invalid configuration: empty layer collection, out-of-range layer
    /// index, and similar. Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request shape cannot be federated (e.g. one request spanning
    /// more than one logical collection).
    #[error("unsupported request: {0}")]
    UnsupportedRequest(String),

    /// One layer's underlying execute failed and the session runs in
    /// fail-fast mode; the whole round is aborted.
    #[error("query against layer {layer} ({collection}) failed: {source}")]
    LayerQueryFailure {
        layer: usize,
        collection: String,
        source: StorageError,
    },

    /// Every layer queried in a round failed. Raised even in best-effort
    /// mode: an all-layers-failed round is an error, not an empty success.
    #[error("all {} queried layers failed", failures.len())]
    AllLayersFailed { failures: Vec<LayerFailure> },

    /// The round's join barrier did not complete within the configured
    /// deadline. In-flight layer tasks are abandoned.
    #[error("federation round timed out after {timeout:?}")]
    FederationTimeout { timeout: Duration },

    /// A spawned layer task panicked.
    #[error("layer task panicked: {0}")]
    TaskPanicked(String),

    /// `bind_write_layer` called twice, or after the underlying write
    /// session was created. Fatal to the session.
    #[error("write layer already bound")]
    AlreadyBound,

    /// The session was closed and can accept no further requests.
    #[error("session is closed")]
    SessionClosed,

    /// A storage operation outside a query round failed (session open,
    /// write delegation, commit/rollback).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

//! Storage abstraction consumed by the federation engine.
//!
//! Each [`Layer`](crate::layer::Layer) references one [`Storage`]. The engine
//! never touches storage internals: it opens per-layer sessions, executes
//! translated requests against them, and drains the returned cursors. The
//! traits box their futures so sessions can be held as trait objects and
//! moved into spawned layer tasks.

mod memory;

pub use memory::MemoryStorage;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::feature::{Feature, FeatureId};
use crate::request::{ReadRequest, WriteRequest};

// =============================================================================
// Errors
// =============================================================================

/// Error raised by a backing storage.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StorageError {
    /// Human-readable error message.
    pub message: String,
    /// Whether the failure is transient (e.g. a network timeout) or
    /// permanent (won't succeed on retry).
    pub retryable: bool,
}

impl StorageError {
    /// Creates a retryable (transient) error.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a permanent error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

// =============================================================================
// Session Options
// =============================================================================

/// Options passed to a storage when opening a session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Per-statement execution deadline, if the storage supports one.
    pub statement_timeout: Option<Duration>,
    /// Socket-level timeout, if the storage supports one.
    pub socket_timeout: Option<Duration>,
    /// Name reported to the storage for diagnostics.
    pub application_name: Option<String>,
}

impl SessionOptions {
    /// Sets the statement timeout (builder style).
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Sets the application name (builder style).
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }
}

// =============================================================================
// Cursors
// =============================================================================

/// One-shot cursor over a read result.
///
/// Finite and not restartable; the engine drains it fully before the round's
/// join barrier is crossed.
#[derive(Debug, Default)]
pub struct FeatureCursor {
    rows: VecDeque<(FeatureId, Feature)>,
}

impl FeatureCursor {
    /// Creates a cursor over the given rows.
    pub fn new(rows: Vec<(FeatureId, Feature)>) -> Self {
        Self { rows: rows.into() }
    }

    /// Creates a cursor from features, keying each row by the feature's id.
    pub fn from_features(features: impl IntoIterator<Item = Feature>) -> Self {
        Self {
            rows: features
                .into_iter()
                .map(|f| (f.id.clone(), f))
                .collect(),
        }
    }

    /// Number of rows remaining.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the cursor is exhausted.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Iterator for FeatureCursor {
    type Item = (FeatureId, Feature);

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.pop_front()
    }
}

// =============================================================================
// Write Results
// =============================================================================

/// Counts of mutations a write session accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// Features created.
    pub inserted: usize,
    /// Features replaced.
    pub updated: usize,
    /// Features removed.
    pub deleted: usize,
}

impl WriteResult {
    /// Total mutations applied.
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

// =============================================================================
// Storage Traits
// =============================================================================

/// A backing storage able to open read and write sessions.
///
/// Implementations wrap whatever engine actually holds the features
/// (PostgreSQL, an HTTP remote, the in-memory reference backend). Sessions
/// handed out here are exclusively owned by one federation session; the
/// engine never shares them.
pub trait Storage: Send + Sync + 'static {
    /// Storage name, for logging and diagnostics.
    fn name(&self) -> &str;

    /// Opens a read session.
    fn new_read_session(
        &self,
        options: &SessionOptions,
    ) -> Result<Arc<dyn StorageReadSession>, StorageError>;

    /// Opens a write session.
    fn new_write_session(
        &self,
        options: &SessionOptions,
    ) -> Result<Box<dyn StorageWriteSession>, StorageError>;
}

/// A read session against one storage.
pub trait StorageReadSession: Send + Sync {
    /// Executes a read request and returns a cursor over matching rows.
    fn execute<'a>(
        &'a self,
        request: &'a ReadRequest,
    ) -> BoxFuture<'a, Result<FeatureCursor, StorageError>>;

    /// Socket timeout in effect, if the storage exposes one.
    fn socket_timeout(&self) -> Option<Duration> {
        None
    }

    /// Adjusts the statement timeout for subsequent requests. No-op for
    /// storages without statement deadlines.
    fn set_statement_timeout(&self, _timeout: Duration) {}

    /// Releases the session's resources. Idempotent.
    fn close(&self) {}
}

/// A write session against one storage.
///
/// Mutations accumulate until `commit`; `rollback` discards them.
pub trait StorageWriteSession: Send + Sync {
    /// Stages the request's mutations and reports what they would change.
    fn execute<'a>(
        &'a mut self,
        request: &'a WriteRequest,
    ) -> BoxFuture<'a, Result<WriteResult, StorageError>>;

    /// Makes all staged mutations visible.
    fn commit<'a>(&'a mut self) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Discards all staged mutations.
    fn rollback<'a>(&'a mut self) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Releases the session's resources without committing. Idempotent.
    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_retryable_flag() {
        assert!(StorageError::retryable("timeout").retryable);
        assert!(!StorageError::permanent("bad collection").retryable);
        assert_eq!(format!("{}", StorageError::permanent("bad")), "bad");
    }

    #[test]
    fn test_cursor_drains_in_order() {
        let mut cursor = FeatureCursor::new(vec![
            (FeatureId::new("a"), Feature::new("a")),
            (FeatureId::new("b"), Feature::new("b")),
        ]);
        assert_eq!(cursor.len(), 2);
        assert_eq!(cursor.next().map(|(id, _)| id), Some(FeatureId::new("a")));
        assert_eq!(cursor.next().map(|(id, _)| id), Some(FeatureId::new("b")));
        assert!(cursor.next().is_none());
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_write_result_total() {
        let result = WriteResult {
            inserted: 2,
            updated: 1,
            deleted: 3,
        };
        assert_eq!(result.total(), 6);
    }

    #[test]
    fn test_session_options_builder() {
        let options = SessionOptions::default()
            .with_statement_timeout(Duration::from_secs(5))
            .with_application_name("viewfed-test");
        assert_eq!(options.statement_timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.application_name.as_deref(), Some("viewfed-test"));
        assert_eq!(options.socket_timeout, None);
    }
}

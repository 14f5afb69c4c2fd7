//! Views: one logical storage composed of prioritized layers.

use std::sync::Arc;
use std::time::Duration;

use crate::error::FederationError;
use crate::executor::FailureMode;
use crate::layer::LayerCollection;
use crate::merge::{ByStoragePriority, MergeOperation};
use crate::resolver::{MissingIdResolver, ObligatoryLayers};
use crate::runner::{ConcurrentRunner, Timer, TokioRunner};
use crate::session::{ReadSession, WriteSession};
use crate::storage::SessionOptions;

/// Default deadline for one query round's join barrier.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Federation behavior knobs.
///
/// The fan-out runner is injected per session, not configured here, so a
/// test can swap in a deterministic serial runner without touching the
/// view's configuration.
#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// Deadline for each query round. On expiry, in-flight layer tasks are
    /// abandoned and the request fails.
    pub query_timeout: Duration,
    /// Per-layer failure policy for query rounds.
    pub failure_mode: FailureMode,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            failure_mode: FailureMode::default(),
        }
    }
}

/// A logical storage composed of an ordered set of layers.
///
/// Mutable only at configuration time: swapping the layer collection or the
/// strategies requires `&mut View`, while open sessions hold a snapshot of
/// the collection they were created with. The view is the factory for
/// [`ReadSession`]s and [`WriteSession`]s.
pub struct View {
    collection: Arc<LayerCollection>,
    config: ViewConfig,
    merge: Arc<dyn MergeOperation>,
    resolver: Arc<dyn MissingIdResolver>,
}

impl View {
    /// Creates a view with default configuration and strategies.
    pub fn new(collection: LayerCollection) -> Self {
        Self::with_config(collection, ViewConfig::default())
    }

    /// Creates a view with the given configuration.
    pub fn with_config(collection: LayerCollection, config: ViewConfig) -> Self {
        Self {
            collection: Arc::new(collection),
            config,
            merge: Arc::new(ByStoragePriority),
            resolver: Arc::new(ObligatoryLayers::default()),
        }
    }

    /// The layer collection in effect.
    pub fn layer_collection(&self) -> &Arc<LayerCollection> {
        &self.collection
    }

    /// The federation configuration.
    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Replaces the layer collection. Existing sessions keep the collection
    /// they were opened with.
    pub fn set_layer_collection(&mut self, collection: LayerCollection) {
        self.collection = Arc::new(collection);
    }

    /// Replaces the merge strategy for sessions opened afterwards.
    pub fn set_merge_operation(&mut self, merge: Arc<dyn MergeOperation>) {
        self.merge = merge;
    }

    /// Replaces the missing-id resolver for sessions opened afterwards.
    pub fn set_missing_id_resolver(&mut self, resolver: Arc<dyn MissingIdResolver>) {
        self.resolver = resolver;
    }

    /// Opens a read session on the default Tokio runner.
    pub fn new_read_session(
        &self,
        options: &SessionOptions,
    ) -> Result<ReadSession, FederationError> {
        self.new_read_session_with_runner(options, Arc::new(TokioRunner::new()))
    }

    /// Opens a read session on an injected runner.
    pub fn new_read_session_with_runner<R>(
        &self,
        options: &SessionOptions,
        runner: Arc<R>,
    ) -> Result<ReadSession<R>, FederationError>
    where
        R: ConcurrentRunner + Timer,
    {
        ReadSession::open(
            Arc::clone(&self.collection),
            &self.config,
            Arc::clone(&self.merge),
            Arc::clone(&self.resolver),
            runner,
            options,
        )
    }

    /// Opens a write session on the default Tokio runner.
    pub fn new_write_session(
        &self,
        options: &SessionOptions,
    ) -> Result<WriteSession, FederationError> {
        self.new_write_session_with_runner(options, Arc::new(TokioRunner::new()))
    }

    /// Opens a write session on an injected runner.
    pub fn new_write_session_with_runner<R>(
        &self,
        options: &SessionOptions,
        runner: Arc<R>,
    ) -> Result<WriteSession<R>, FederationError>
    where
        R: ConcurrentRunner + Timer,
    {
        let read = self.new_read_session_with_runner(options, runner)?;
        Ok(WriteSession::open(read, options.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Feature;
    use crate::layer::Layer;
    use crate::request::{Predicate, ReadRequest};
    use crate::runner::SerialRunner;
    use crate::storage::MemoryStorage;

    fn collection(name: &str, storages: &[MemoryStorage]) -> LayerCollection {
        LayerCollection::new(
            name,
            storages
                .iter()
                .map(|s| Layer::new(Arc::new(s.clone()), "c"))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ViewConfig::default();
        assert_eq!(config.query_timeout, DEFAULT_QUERY_TIMEOUT);
        assert_eq!(config.failure_mode, FailureMode::FailFast);
    }

    #[tokio::test]
    async fn test_sessions_keep_their_collection_across_a_swap() {
        let old = MemoryStorage::new("old");
        old.put_feature("c", Feature::new("from-old"));
        let new = MemoryStorage::new("new");
        new.put_feature("c", Feature::new("from-new"));

        let mut view = View::new(collection("v", &[old.clone()]));
        let session = view.new_read_session(&SessionOptions::default()).unwrap();

        view.set_layer_collection(collection("v", &[new.clone()]));

        // The open session still reads the collection it was created with.
        let response = session
            .execute(&ReadRequest::predicate_query("v", Predicate::All))
            .await
            .unwrap();
        assert_eq!(response.features[0].id.as_str(), "from-old");

        // New sessions see the swapped collection.
        let fresh = view.new_read_session(&SessionOptions::default()).unwrap();
        let response = fresh
            .execute(&ReadRequest::predicate_query("v", Predicate::All))
            .await
            .unwrap();
        assert_eq!(response.features[0].id.as_str(), "from-new");
    }

    #[tokio::test]
    async fn test_injected_serial_runner() {
        let storage = MemoryStorage::new("s");
        storage.put_feature("c", Feature::new("f1"));
        let view = View::new(collection("v", &[storage]));

        let session = view
            .new_read_session_with_runner(&SessionOptions::default(), Arc::new(SerialRunner::new()))
            .unwrap();
        let response = session
            .execute(&ReadRequest::predicate_query("v", Predicate::All))
            .await
            .unwrap();
        assert_eq!(response.len(), 1);
    }
}

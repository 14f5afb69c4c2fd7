//! Read sessions: the two-round query + merge algorithm.
//!
//! Per request:
//! 1. Reject shapes that cannot be federated (more than one logical
//!    collection).
//! 2. Fan the request out to every layer (round one).
//! 3. Unless the request is a by-id lookup or the resolver skips, ask the
//!    missing-id resolver for gaps and close them with one batched by-id
//!    request per implicated layer (round two).
//! 4. Merge every feature's cross-layer rows and return the ordered
//!    response.
//!
//! Rounds are strictly sequential; the second depends on the first's
//! output. The engine holds no cross-request state.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::FederationError;
use crate::executor::{FeatureRowGroup, LayerRequest, ParallelQueryExecutor};
use crate::layer::LayerCollection;
use crate::merge::MergeOperation;
use crate::request::ReadRequest;
use crate::resolver::MissingIdResolver;
use crate::response::Response;
use crate::runner::{ConcurrentRunner, Timer, TokioRunner};
use crate::storage::{SessionOptions, StorageReadSession};
use crate::view::ViewConfig;

/// A read session federating one view's layers.
pub struct ReadSession<R = TokioRunner> {
    collection: Arc<LayerCollection>,
    /// One underlying session per layer, index-aligned with the collection.
    sessions: Vec<Arc<dyn StorageReadSession>>,
    executor: ParallelQueryExecutor<R>,
    merge: Arc<dyn MergeOperation>,
    resolver: Arc<dyn MissingIdResolver>,
    closed: bool,
}

impl<R> ReadSession<R>
where
    R: ConcurrentRunner + Timer,
{
    /// Opens a session: eagerly creates one underlying read session per
    /// layer. Sessions are exclusively owned until [`close`](Self::close).
    pub(crate) fn open(
        collection: Arc<LayerCollection>,
        config: &ViewConfig,
        merge: Arc<dyn MergeOperation>,
        resolver: Arc<dyn MissingIdResolver>,
        runner: Arc<R>,
        options: &SessionOptions,
    ) -> Result<Self, FederationError> {
        let mut sessions = Vec::with_capacity(collection.len());
        for layer in collection.layers() {
            sessions.push(layer.storage().new_read_session(options)?);
        }
        Ok(Self {
            collection,
            sessions,
            executor: ParallelQueryExecutor::new(runner, config.query_timeout, config.failure_mode),
            merge,
            resolver,
            closed: false,
        })
    }

    /// The layer collection in effect for this session's lifetime.
    pub(crate) fn layer_collection(&self) -> &Arc<LayerCollection> {
        &self.collection
    }

    /// Whether the session was closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Executes one logical read request and returns the merged response.
    pub async fn execute(&self, request: &ReadRequest) -> Result<Response, FederationError> {
        if self.closed {
            return Err(FederationError::SessionClosed);
        }
        self.validate(request)?;

        tracing::debug!(
            view = %self.collection.name(),
            kind = request.kind(),
            layers = self.collection.len(),
            "federating read request"
        );

        let mut group = FeatureRowGroup::new();
        let mut failed_layers = Vec::new();

        // Round one: every layer, concurrently.
        let mut round = self.executor.execute(self.layer_requests(request)).await?;
        failed_layers.append(&mut round.failures);
        round.absorb_into(&mut group);

        // Round two: close per-layer gaps by id, batched per layer. A by-id
        // request cannot be improved by another by-id fetch.
        if !request.is_by_id() && !self.resolver.skip() {
            let missing = self.resolver.resolve(&group, self.collection.len());
            if !missing.is_empty() {
                tracing::debug!(
                    view = %self.collection.name(),
                    layers = missing.len(),
                    ids = missing.values().map(BTreeSet::len).sum::<usize>(),
                    "closing result gaps with by-id round"
                );
                let mut requests = Vec::with_capacity(missing.len());
                for (layer_index, ids) in missing {
                    let layer = self.collection.layer(layer_index).ok_or_else(|| {
                        FederationError::Configuration(format!(
                            "resolver addressed layer {} but the view has {} layers",
                            layer_index,
                            self.collection.len()
                        ))
                    })?;
                    requests.push(LayerRequest {
                        layer_index,
                        collection_id: layer.collection_id().to_string(),
                        session: Arc::clone(&self.sessions[layer_index]),
                        request: ReadRequest::ByIdLookup {
                            collection: layer.collection_id().to_string(),
                            ids: ids.into_iter().collect(),
                        },
                    });
                }
                match self.executor.execute(requests).await {
                    Ok(mut second) => {
                        failed_layers.append(&mut second.failures);
                        second.absorb_into(&mut group);
                    }
                    // Round one already produced rows (the resolver only
                    // finds gaps in a non-empty group), so a fully failed
                    // gap-closing round degrades to metadata instead of
                    // failing the rows the caller opted to keep.
                    Err(FederationError::AllLayersFailed { failures }) => {
                        failed_layers.extend(failures);
                    }
                    Err(error) => return Err(error),
                }
            }
        }

        // A layer can fail in both rounds; report it once.
        failed_layers.sort_by_key(|f| f.layer);
        failed_layers.dedup_by_key(|f| f.layer);

        // Merge each feature's rows; response order is the group's
        // first-seen key order.
        let mut features = Vec::with_capacity(group.len());
        for (_, rows) in group.iter() {
            if let Some(feature) = self.merge.apply(rows) {
                features.push(feature);
            }
        }

        Ok(Response {
            features,
            failed_layers,
        })
    }

    /// Forwards a statement timeout to every per-layer session.
    pub fn set_statement_timeout(&self, timeout: Duration) {
        for session in &self.sessions {
            session.set_statement_timeout(timeout);
        }
    }

    /// Minimum socket timeout across layers that expose one.
    pub fn socket_timeout(&self) -> Option<Duration> {
        self.sessions
            .iter()
            .filter_map(|session| session.socket_timeout())
            .min()
    }

    /// Releases every per-layer session. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        for session in &self.sessions {
            session.close();
        }
        self.closed = true;
    }

    fn validate(&self, request: &ReadRequest) -> Result<(), FederationError> {
        let distinct: BTreeSet<&str> = request.collections().into_iter().collect();
        match distinct.len() {
            0 => Err(FederationError::UnsupportedRequest(
                "request addresses no collection".to_string(),
            )),
            1 => Ok(()),
            n => Err(FederationError::UnsupportedRequest(format!(
                "a federated request must address one collection, got {}",
                n
            ))),
        }
    }

    fn layer_requests(&self, request: &ReadRequest) -> Vec<LayerRequest> {
        self.collection
            .layers()
            .iter()
            .enumerate()
            .map(|(layer_index, layer)| LayerRequest {
                layer_index,
                collection_id: layer.collection_id().to_string(),
                session: Arc::clone(&self.sessions[layer_index]),
                request: request.with_collection(layer.collection_id()),
            })
            .collect()
    }
}

impl<R> Drop for ReadSession<R> {
    fn drop(&mut self) {
        if !self.closed {
            for session in &self.sessions {
                session.close();
            }
            self.closed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Feature, FeatureId};
    use crate::layer::Layer;
    use crate::request::Predicate;
    use crate::storage::MemoryStorage;
    use crate::view::View;

    fn two_layer_view() -> (View, MemoryStorage, MemoryStorage) {
        let a = MemoryStorage::new("a");
        let b = MemoryStorage::new("b");
        let layers = LayerCollection::new(
            "view",
            vec![
                Layer::new(Arc::new(a.clone()), "head"),
                Layer::new(Arc::new(b.clone()), "archive"),
            ],
        )
        .unwrap();
        (View::new(layers), a, b)
    }

    #[tokio::test]
    async fn test_merge_prefers_higher_priority_layer() {
        let (view, a, b) = two_layer_view();
        a.put_feature("head", Feature::new("id1").with_property("v", "x"));
        b.put_feature("archive", Feature::new("id1").with_property("v", "y"));
        b.put_feature("archive", Feature::new("id2").with_property("v", "z"));

        let session = view.new_read_session(&SessionOptions::default()).unwrap();
        let response = session
            .execute(&ReadRequest::predicate_query("view", Predicate::All))
            .await
            .unwrap();

        let values: Vec<_> = response
            .iter()
            .map(|f| (f.id.as_str().to_string(), f.property("v").cloned()))
            .collect();
        assert_eq!(
            values,
            vec![
                ("id1".to_string(), Some(serde_json::json!("x"))),
                ("id2".to_string(), Some(serde_json::json!("z"))),
            ]
        );
    }

    #[tokio::test]
    async fn test_multi_collection_request_is_unsupported() {
        let (view, _, _) = two_layer_view();
        let session = view.new_read_session(&SessionOptions::default()).unwrap();

        let request = ReadRequest::CollectionsQuery {
            collections: vec!["one".to_string(), "two".to_string()],
            predicate: Predicate::All,
        };
        assert!(matches!(
            session.execute(&request).await,
            Err(FederationError::UnsupportedRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_single_collection_collections_query_is_federated() {
        let (view, a, _) = two_layer_view();
        a.put_feature("head", Feature::new("id1"));

        let session = view.new_read_session(&SessionOptions::default()).unwrap();
        let request = ReadRequest::CollectionsQuery {
            // Duplicated names still address one logical collection.
            collections: vec!["view".to_string(), "view".to_string()],
            predicate: Predicate::All,
        };
        let response = session.execute(&request).await.unwrap();
        assert_eq!(response.len(), 1);
    }

    #[tokio::test]
    async fn test_second_round_restores_obligatory_layer_version() {
        let (view, a, b) = two_layer_view();
        // Layer 0 has id2 but its properties don't match the predicate;
        // layer 1's copy does. The gap-closing by-id round must pull layer
        // 0's version, which then wins the merge.
        a.put_feature(
            "head",
            Feature::new("id2").with_property("kind", "river").with_property("v", "head"),
        );
        b.put_feature(
            "archive",
            Feature::new("id2").with_property("kind", "road").with_property("v", "archive"),
        );

        let session = view.new_read_session(&SessionOptions::default()).unwrap();
        let request = ReadRequest::predicate_query(
            "view",
            Predicate::PropertyEquals {
                path: "kind".to_string(),
                value: serde_json::json!("road"),
            },
        );
        let response = session.execute(&request).await.unwrap();

        assert_eq!(response.len(), 1);
        assert_eq!(
            response.features[0].property("v"),
            Some(&serde_json::json!("head"))
        );
    }

    #[tokio::test]
    async fn test_by_id_lookup_merges_without_second_round() {
        let (view, a, b) = two_layer_view();
        a.put_feature("head", Feature::new("id1").with_property("v", "x"));
        b.put_feature("archive", Feature::new("id2"));

        let session = view.new_read_session(&SessionOptions::default()).unwrap();
        let response = session
            .execute(&ReadRequest::by_id_lookup("view", ["id1", "id2"]))
            .await
            .unwrap();

        let ids: Vec<_> = response.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["id1", "id2"]);
    }

    #[tokio::test]
    async fn test_same_request_twice_yields_same_order() {
        let (view, a, b) = two_layer_view();
        for id in ["id3", "id1", "id5"] {
            a.put_feature("head", Feature::new(id));
        }
        for id in ["id2", "id4"] {
            b.put_feature("archive", Feature::new(id));
        }

        let session = view.new_read_session(&SessionOptions::default()).unwrap();
        let request = ReadRequest::predicate_query("view", Predicate::All);
        let first: Vec<_> = session
            .execute(&request)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        let second: Vec<_> = session
            .execute(&request)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_requests() {
        let (view, _, _) = two_layer_view();
        let mut session = view.new_read_session(&SessionOptions::default()).unwrap();
        session.close();
        assert!(session.is_closed());
        assert!(matches!(
            session
                .execute(&ReadRequest::predicate_query("view", Predicate::All))
                .await,
            Err(FederationError::SessionClosed)
        ));
        // Close is idempotent.
        session.close();
    }

    #[tokio::test]
    async fn test_socket_timeout_is_minimum_across_layers() {
        let (view, _, _) = two_layer_view();
        let options = SessionOptions {
            socket_timeout: Some(Duration::from_secs(9)),
            ..SessionOptions::default()
        };
        let session = view.new_read_session(&options).unwrap();
        assert_eq!(session.socket_timeout(), Some(Duration::from_secs(9)));
    }

    #[tokio::test]
    async fn test_empty_view_read_is_empty_not_an_error() {
        let (view, _, _) = two_layer_view();
        let session = view.new_read_session(&SessionOptions::default()).unwrap();
        let response = session
            .execute(&ReadRequest::by_id_lookup("view", Vec::<FeatureId>::new()))
            .await
            .unwrap();
        assert!(response.is_empty());
    }
}

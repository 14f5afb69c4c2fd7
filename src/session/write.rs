//! Write sessions: single-layer routing for mutations.
//!
//! A write session still federates reads (verification reads may precede a
//! write) but binds all mutations to exactly one layer. The underlying write
//! session is created lazily on the first write, bound permanently to the
//! chosen layer; rebinding afterwards fails. Writes are never split or
//! duplicated across layers.

use std::sync::Arc;
use std::time::Duration;

use crate::error::FederationError;
use crate::request::{ReadRequest, WriteRequest};
use crate::response::Response;
use crate::runner::{ConcurrentRunner, Timer, TokioRunner};
use crate::session::ReadSession;
use crate::storage::{SessionOptions, StorageWriteSession, WriteResult};

/// A write session against one view.
pub struct WriteSession<R = TokioRunner> {
    read: ReadSession<R>,
    options: SessionOptions,
    /// Bound write layer. Assigned once: explicitly via
    /// [`bind_write_layer`](Self::bind_write_layer) or defaulted to the
    /// top-priority layer on the first write.
    bound_layer: Option<usize>,
    /// Lazily created on first write, bound permanently to `bound_layer`.
    write_session: Option<Box<dyn StorageWriteSession>>,
}

impl<R> WriteSession<R>
where
    R: ConcurrentRunner + Timer,
{
    pub(crate) fn open(read: ReadSession<R>, options: SessionOptions) -> Self {
        Self {
            read,
            options,
            bound_layer: None,
            write_session: None,
        }
    }

    /// Binds all writes to the layer at `layer_index`.
    ///
    /// Settable exactly once, before the first write. Fails with
    /// [`FederationError::AlreadyBound`] on a second call or once the
    /// underlying write session exists.
    pub fn bind_write_layer(&mut self, layer_index: usize) -> Result<(), FederationError> {
        if self.bound_layer.is_some() || self.write_session.is_some() {
            return Err(FederationError::AlreadyBound);
        }
        if self.read.layer_collection().layer(layer_index).is_none() {
            return Err(FederationError::Configuration(format!(
                "write layer {} out of range ({} layers)",
                layer_index,
                self.read.layer_collection().len()
            )));
        }
        self.bound_layer = Some(layer_index);
        Ok(())
    }

    /// The bound write layer, if one was assigned yet.
    pub fn bound_layer(&self) -> Option<usize> {
        self.bound_layer
    }

    /// Executes a federated read (see [`ReadSession::execute`]).
    pub async fn execute_read(&self, request: &ReadRequest) -> Result<Response, FederationError> {
        self.read.execute(request).await
    }

    /// Routes a write request to the bound layer.
    ///
    /// Rewrites the request's collection id to the bound layer's collection
    /// and delegates the request verbatim to that layer's write session.
    /// No fan-out, no merge.
    pub async fn execute_write(
        &mut self,
        request: &WriteRequest,
    ) -> Result<WriteResult, FederationError> {
        if self.read.is_closed() {
            return Err(FederationError::SessionClosed);
        }

        let layer_index = self.bound_layer.unwrap_or(0);
        let (storage, collection_id) = {
            let collection = self.read.layer_collection();
            let layer = collection.layer(layer_index).ok_or_else(|| {
                FederationError::Configuration(format!(
                    "bound write layer {} out of range ({} layers)",
                    layer_index,
                    collection.len()
                ))
            })?;
            (Arc::clone(layer.storage()), layer.collection_id().to_string())
        };

        if self.write_session.is_none() {
            self.bound_layer = Some(layer_index);
            self.write_session = Some(storage.new_write_session(&self.options)?);
            tracing::debug!(
                layer = layer_index,
                collection = %collection_id,
                "created write session for bound layer"
            );
        }
        let session = match self.write_session.as_mut() {
            Some(session) => session,
            None => return Err(FederationError::SessionClosed),
        };

        let translated = request.with_collection(&collection_id);
        session
            .execute(&translated)
            .await
            .map_err(|source| FederationError::LayerQueryFailure {
                layer: layer_index,
                collection: collection_id,
                source,
            })
    }

    /// Commits the bound layer's write session. No-op when no write was
    /// executed yet.
    pub async fn commit(&mut self) -> Result<(), FederationError> {
        if let Some(session) = self.write_session.as_mut() {
            session.commit().await?;
        }
        Ok(())
    }

    /// Rolls back the bound layer's write session. No-op when no write was
    /// executed yet.
    pub async fn rollback(&mut self) -> Result<(), FederationError> {
        if let Some(session) = self.write_session.as_mut() {
            session.rollback().await?;
        }
        Ok(())
    }

    /// Forwards a statement timeout to every per-layer read session.
    pub fn set_statement_timeout(&self, timeout: Duration) {
        self.read.set_statement_timeout(timeout);
    }

    /// Minimum socket timeout across layers that expose one.
    pub fn socket_timeout(&self) -> Option<Duration> {
        self.read.socket_timeout()
    }

    /// Closes the write session without committing, then releases every
    /// per-layer read session.
    pub fn close(&mut self) {
        if let Some(mut session) = self.write_session.take() {
            session.close();
        }
        self.read.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Feature, FeatureId};
    use crate::layer::{Layer, LayerCollection};
    use crate::request::{Predicate, WriteOp};
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
    async fn test_writes_default_to_top_priority_layer() {
        let (view, a, b) = two_layer_view();
        let mut session = view.new_write_session(&SessionOptions::default()).unwrap();

        // Caller-side collection name is rewritten to the bound layer's.
        let request = WriteRequest::new("whatever", vec![WriteOp::Put(Feature::new("f1"))]);
        let result = session.execute_write(&request).await.unwrap();
        assert_eq!(result.inserted, 1);
        assert_eq!(session.bound_layer(), Some(0));

        session.commit().await.unwrap();
        assert!(a.feature("head", &FeatureId::new("f1")).is_some());
        assert_eq!(b.feature_count("archive"), 0);
    }

    #[tokio::test]
    async fn test_bind_routes_writes_to_chosen_layer() {
        let (view, a, b) = two_layer_view();
        let mut session = view.new_write_session(&SessionOptions::default()).unwrap();
        session.bind_write_layer(1).unwrap();

        let request = WriteRequest::new("view", vec![WriteOp::Put(Feature::new("f1"))]);
        session.execute_write(&request).await.unwrap();
        session.commit().await.unwrap();

        assert!(b.feature("archive", &FeatureId::new("f1")).is_some());
        assert_eq!(a.feature_count("head"), 0);
    }

    #[tokio::test]
    async fn test_rebind_fails() {
        let (view, _, _) = two_layer_view();
        let mut session = view.new_write_session(&SessionOptions::default()).unwrap();
        session.bind_write_layer(1).unwrap();
        assert!(matches!(
            session.bind_write_layer(0),
            Err(FederationError::AlreadyBound)
        ));
    }

    #[tokio::test]
    async fn test_bind_after_first_write_fails() {
        let (view, _, _) = two_layer_view();
        let mut session = view.new_write_session(&SessionOptions::default()).unwrap();

        let request = WriteRequest::new("view", vec![WriteOp::Put(Feature::new("f1"))]);
        session.execute_write(&request).await.unwrap();
        assert!(matches!(
            session.bind_write_layer(1),
            Err(FederationError::AlreadyBound)
        ));
    }

    #[tokio::test]
    async fn test_bind_out_of_range_is_a_configuration_error() {
        let (view, _, _) = two_layer_view();
        let mut session = view.new_write_session(&SessionOptions::default()).unwrap();
        assert!(matches!(
            session.bind_write_layer(7),
            Err(FederationError::Configuration(_))
        ));
        // A failed bind does not consume the single bind.
        session.bind_write_layer(1).unwrap();
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let (view, a, _) = two_layer_view();
        let mut session = view.new_write_session(&SessionOptions::default()).unwrap();

        let request = WriteRequest::new("view", vec![WriteOp::Put(Feature::new("f1"))]);
        session.execute_write(&request).await.unwrap();
        session.rollback().await.unwrap();
        session.commit().await.unwrap();
        assert_eq!(a.feature_count("head"), 0);
    }

    #[tokio::test]
    async fn test_commit_without_writes_is_a_noop() {
        let (view, _, _) = two_layer_view();
        let mut session = view.new_write_session(&SessionOptions::default()).unwrap();
        session.commit().await.unwrap();
        session.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_session_still_federates_reads() {
        let (view, a, b) = two_layer_view();
        a.put_feature("head", Feature::new("id1").with_property("v", "x"));
        b.put_feature("archive", Feature::new("id1").with_property("v", "y"));

        let session = view.new_write_session(&SessionOptions::default()).unwrap();
        let response = session
            .execute_read(&ReadRequest::predicate_query("view", Predicate::All))
            .await
            .unwrap();
        assert_eq!(
            response.features[0].property("v"),
            Some(&serde_json::json!("x"))
        );
    }

    #[tokio::test]
    async fn test_close_releases_everything() {
        let (view, _, _) = two_layer_view();
        let mut session = view.new_write_session(&SessionOptions::default()).unwrap();
        let request = WriteRequest::new("view", vec![WriteOp::Put(Feature::new("f1"))]);
        session.execute_write(&request).await.unwrap();
        session.close();

        assert!(matches!(
            session.execute_write(&request).await,
            Err(FederationError::SessionClosed)
        ));
        assert!(matches!(
            session
                .execute_read(&ReadRequest::predicate_query("view", Predicate::All))
                .await,
            Err(FederationError::SessionClosed)
        ));
    }
}

//! Fan-out of one logical request across layers.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::{FederationError, LayerFailure};
use crate::feature::{Feature, FeatureId};
use crate::request::ReadRequest;
use crate::runner::{ConcurrentRunner, RunnerError, Timer};
use crate::storage::{StorageError, StorageReadSession};

use super::rows::FeatureRowGroup;

/// What the executor does when one layer's query fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Abort the whole round on the first layer failure. Default: silently
    /// dropping a layer could present incomplete merged data as
    /// authoritative.
    #[default]
    FailFast,
    /// Record the failure, continue with the remaining layers, and report
    /// the failed layers in the response metadata. An all-layers-failed
    /// round is still an error.
    BestEffort,
}

/// One unit of fan-out: a layer, its exclusively-owned session, and the
/// layer-local translation of the caller's request.
pub struct LayerRequest {
    /// Index of the layer in its collection.
    pub layer_index: usize,
    /// Collection id the request addresses, for diagnostics.
    pub collection_id: String,
    /// The layer's underlying read session.
    pub session: Arc<dyn StorageReadSession>,
    /// Request already translated to the layer's collection id.
    pub request: ReadRequest,
}

/// One layer's drained result rows.
#[derive(Debug)]
pub struct LayerRows {
    /// Index of the source layer.
    pub layer_index: usize,
    /// Rows in the order the layer returned them.
    pub rows: Vec<(FeatureId, Feature)>,
}

/// Outcome of one query round.
#[derive(Debug, Default)]
pub struct RoundResult {
    /// Per-layer rows, sorted by layer priority.
    pub layers: Vec<LayerRows>,
    /// Layers that failed (best-effort mode only), sorted by layer priority.
    pub failures: Vec<LayerFailure>,
}

impl RoundResult {
    /// Folds this round's rows into a row group, scanning layers in
    /// priority order.
    pub fn absorb_into(self, group: &mut FeatureRowGroup) {
        for layer in self.layers {
            group.absorb_layer(layer.layer_index, layer.rows);
        }
    }
}

type TaskOutput = (usize, String, Result<Vec<(FeatureId, Feature)>, StorageError>);

/// Executes a batch of layer requests concurrently.
///
/// Submits one task per [`LayerRequest`], joins them all (the round
/// barrier), and assembles results by layer priority regardless of task
/// completion order. The whole barrier runs under one deadline; on expiry
/// in-flight tasks are abandoned and the round fails with
/// [`FederationError::FederationTimeout`].
pub struct ParallelQueryExecutor<R> {
    runner: Arc<R>,
    query_timeout: Duration,
    failure_mode: FailureMode,
}

impl<R> ParallelQueryExecutor<R>
where
    R: ConcurrentRunner + Timer,
{
    /// Creates an executor.
    pub fn new(runner: Arc<R>, query_timeout: Duration, failure_mode: FailureMode) -> Self {
        Self {
            runner,
            query_timeout,
            failure_mode,
        }
    }

    /// Runs one round.
    pub async fn execute(&self, requests: Vec<LayerRequest>) -> Result<RoundResult, FederationError> {
        if requests.is_empty() {
            return Ok(RoundResult::default());
        }
        let total = requests.len();

        let tasks: Vec<BoxFuture<'static, TaskOutput>> = requests
            .into_iter()
            .map(|layer_request| {
                let LayerRequest {
                    layer_index,
                    collection_id,
                    session,
                    request,
                } = layer_request;
                Box::pin(async move {
                    tracing::trace!(
                        layer = layer_index,
                        collection = %collection_id,
                        kind = request.kind(),
                        "dispatching layer query"
                    );
                    let result = session
                        .execute(&request)
                        .await
                        .map(|cursor| cursor.collect::<Vec<_>>());
                    (layer_index, collection_id, result)
                }) as BoxFuture<'static, TaskOutput>
            })
            .collect();

        let joined = self
            .runner
            .timeout(self.query_timeout, self.runner.run_concurrent(tasks))
            .await;
        let outcomes = match joined {
            Ok(outcomes) => outcomes,
            Err(RunnerError::Timeout) => {
                tracing::warn!(
                    layers = total,
                    timeout = ?self.query_timeout,
                    "federation round timed out, abandoning in-flight layer tasks"
                );
                return Err(FederationError::FederationTimeout {
                    timeout: self.query_timeout,
                });
            }
            Err(RunnerError::TaskPanicked(message)) => {
                return Err(FederationError::TaskPanicked(message));
            }
        };

        let mut layers = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok((layer_index, _, Ok(rows))) => layers.push(LayerRows { layer_index, rows }),
                Ok((layer_index, collection_id, Err(error))) => {
                    tracing::warn!(
                        layer = layer_index,
                        collection = %collection_id,
                        error = %error,
                        "layer query failed"
                    );
                    failures.push(LayerFailure {
                        layer: layer_index,
                        collection: collection_id,
                        error,
                    });
                }
                Err(RunnerError::TaskPanicked(message)) => {
                    return Err(FederationError::TaskPanicked(message));
                }
                Err(RunnerError::Timeout) => {
                    return Err(FederationError::FederationTimeout {
                        timeout: self.query_timeout,
                    });
                }
            }
        }

        // Deterministic assembly order, independent of completion order.
        layers.sort_by_key(|l| l.layer_index);
        failures.sort_by_key(|f| f.layer);

        match self.failure_mode {
            FailureMode::FailFast => {
                if !failures.is_empty() {
                    let failure = failures.remove(0);
                    return Err(FederationError::LayerQueryFailure {
                        layer: failure.layer,
                        collection: failure.collection,
                        source: failure.error,
                    });
                }
            }
            FailureMode::BestEffort => {
                if layers.is_empty() {
                    return Err(FederationError::AllLayersFailed { failures });
                }
            }
        }

        Ok(RoundResult { layers, failures })
    }
}

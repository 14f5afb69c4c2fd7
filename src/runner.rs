//! Concurrent task running abstraction.
//!
//! The fan-out pool is explicit configuration passed into the engine, not
//! process-wide global state: [`TokioRunner`] is the production runner, and
//! [`SerialRunner`] executes tasks one at a time in submission order so tests
//! can make round assembly deterministic.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;

/// Errors raised by a runner, as opposed to the tasks it runs.
#[derive(Debug, Clone, Error)]
pub enum RunnerError {
    /// A spawned task panicked.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
    /// The deadline elapsed before the wrapped future completed.
    #[error("operation timed out")]
    Timeout,
}

/// Type alias for concurrent execution results to reduce type complexity.
pub type ConcurrentResults<R> = BoxFuture<'static, Vec<Result<R, RunnerError>>>;

/// Runs multiple futures concurrently and collects their results.
///
/// Results are returned in completion order, which is non-deterministic for
/// concurrent runners; callers that need an order must carry an index in the
/// task output.
pub trait ConcurrentRunner: Send + Sync + 'static {
    fn run_concurrent<F, R>(&self, futures: Vec<F>) -> ConcurrentResults<R>
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static;
}

/// Wraps futures with deadlines.
pub trait Timer: Send + Sync + 'static {
    /// Returns `Err(RunnerError::Timeout)` if the future does not complete
    /// within `duration`. Dropping the wrapped future cancels whatever work
    /// it owns.
    fn timeout<F, R>(&self, duration: Duration, future: F) -> BoxFuture<'static, Result<R, RunnerError>>
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static;
}

// =============================================================================
// Tokio Runner
// =============================================================================

/// Production runner backed by the Tokio runtime.
///
/// Tasks run on the runtime's worker pool via `JoinSet`; dropping the
/// returned future (e.g. on timeout) aborts every in-flight task.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioRunner;

impl TokioRunner {
    /// Creates a new Tokio runner.
    pub fn new() -> Self {
        Self
    }
}

impl ConcurrentRunner for TokioRunner {
    fn run_concurrent<F, R>(&self, futures: Vec<F>) -> ConcurrentResults<R>
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        Box::pin(async move {
            let mut set = tokio::task::JoinSet::new();
            for fut in futures {
                set.spawn(fut);
            }

            let mut results = Vec::with_capacity(set.len());
            while let Some(result) = set.join_next().await {
                results.push(result.map_err(|e| RunnerError::TaskPanicked(e.to_string())));
            }
            results
        })
    }
}

impl Timer for TokioRunner {
    fn timeout<F, R>(&self, duration: Duration, future: F) -> BoxFuture<'static, Result<R, RunnerError>>
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        Box::pin(async move {
            tokio::time::timeout(duration, future)
                .await
                .map_err(|_| RunnerError::Timeout)
        })
    }
}

// =============================================================================
// Serial Runner
// =============================================================================

/// Deterministic runner: tasks run sequentially, in submission order, on the
/// current task. Intended for tests and debugging.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialRunner;

impl SerialRunner {
    /// Creates a new serial runner.
    pub fn new() -> Self {
        Self
    }
}

impl ConcurrentRunner for SerialRunner {
    fn run_concurrent<F, R>(&self, futures: Vec<F>) -> ConcurrentResults<R>
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        Box::pin(async move {
            let mut results = Vec::with_capacity(futures.len());
            for fut in futures {
                results.push(Ok(fut.await));
            }
            results
        })
    }
}

impl Timer for SerialRunner {
    fn timeout<F, R>(&self, duration: Duration, future: F) -> BoxFuture<'static, Result<R, RunnerError>>
    where
        F: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        Box::pin(async move {
            tokio::time::timeout(duration, future)
                .await
                .map_err(|_| RunnerError::Timeout)
        })
    }
}

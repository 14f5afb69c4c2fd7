//! Parallel per-layer query execution.
//!
//! One logical request becomes one task per layer; the executor joins all
//! tasks (the round barrier), applies the failure policy, and assembles the
//! per-layer rows into a [`FeatureRowGroup`] keyed by feature id.

mod parallel;
mod rows;

pub use parallel::{
    FailureMode, LayerRequest, LayerRows, ParallelQueryExecutor, RoundResult,
};
pub use rows::{FeatureRowGroup, LayerRow};

//! Missing-id resolution: deciding which gaps are worth a second round.
//!
//! After round one, some feature ids have rows from only a subset of layers.
//! A resolver decides which (layer, id) pairs get a follow-up by-id fetch.
//! The session batches the result into one by-id request per implicated
//! layer, never one request per feature.

use std::collections::{BTreeMap, BTreeSet};

use crate::executor::FeatureRowGroup;
use crate::feature::FeatureId;

/// Decides which per-layer result gaps to close with a by-id fetch.
///
/// Implementations must be deterministic and side-effect-free.
pub trait MissingIdResolver: Send + Sync {
    /// When true, no second round is attempted regardless of gaps.
    ///
    /// The session additionally short-circuits by-id lookups on its own: a
    /// by-id round cannot add information to a by-id request.
    fn skip(&self) -> bool {
        false
    }

    /// Maps each layer worth re-querying to the feature ids to fetch.
    ///
    /// `layer_count` is the number of layers in the collection; returned
    /// keys must be valid layer indices.
    fn resolve(
        &self,
        rows: &FeatureRowGroup,
        layer_count: usize,
    ) -> BTreeMap<usize, BTreeSet<FeatureId>>;
}

/// Default policy: re-query only obligatory layers.
///
/// A feature absent from an obligatory layer but present elsewhere gets a
/// by-id follow-up against that layer. This guards against the common case
/// where a positional predicate misses a feature in one layer (e.g. the
/// geometry drifted) even though the feature still exists there under its
/// id. By default only the top-priority layer is obligatory.
#[derive(Debug, Clone)]
pub struct ObligatoryLayers {
    obligatory: BTreeSet<usize>,
}

impl ObligatoryLayers {
    /// Declares the given layer indices obligatory.
    pub fn new(obligatory: impl IntoIterator<Item = usize>) -> Self {
        Self {
            obligatory: obligatory.into_iter().collect(),
        }
    }

    /// Only the top-priority layer is obligatory.
    pub fn top_priority_only() -> Self {
        Self::new([0])
    }
}

impl Default for ObligatoryLayers {
    fn default() -> Self {
        Self::top_priority_only()
    }
}

impl MissingIdResolver for ObligatoryLayers {
    fn resolve(
        &self,
        rows: &FeatureRowGroup,
        layer_count: usize,
    ) -> BTreeMap<usize, BTreeSet<FeatureId>> {
        let mut missing: BTreeMap<usize, BTreeSet<FeatureId>> = BTreeMap::new();
        for (id, _) in rows.iter() {
            let present = rows.layers_present(id);
            if present.is_empty() {
                continue;
            }
            for &layer in &self.obligatory {
                if layer < layer_count && !present.contains(&layer) {
                    missing.entry(layer).or_default().insert(id.clone());
                }
            }
        }
        missing
    }
}

/// Resolver that never requests a second round.
///
/// For views whose layers are known to be id-consistent, skipping gap
/// resolution saves the extra fetch entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverResolve;

impl MissingIdResolver for NeverResolve {
    fn skip(&self) -> bool {
        true
    }

    fn resolve(
        &self,
        _rows: &FeatureRowGroup,
        _layer_count: usize,
    ) -> BTreeMap<usize, BTreeSet<FeatureId>> {
        BTreeMap::new()
    }
}

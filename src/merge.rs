//! Merge strategies: reducing cross-layer candidates to one feature.

use crate::executor::LayerRow;
use crate::feature::Feature;

/// Reduces the per-layer rows of one feature id to the final feature.
///
/// Implementations must be pure and deterministic: merging the same row
/// group twice yields identical output, so repeating a merge after a retry
/// is idempotent. Returns `None` only for an empty row slice, which the
/// session never produces.
pub trait MergeOperation: Send + Sync {
    fn apply(&self, rows: &[LayerRow]) -> Option<Feature>;
}

/// Default merge: the feature from the highest-priority layer present wins.
///
/// Ties cannot occur; a layer contributes at most one row per feature id and
/// priorities are unique per layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByStoragePriority;

impl MergeOperation for ByStoragePriority {
    fn apply(&self, rows: &[LayerRow]) -> Option<Feature> {
        rows.iter()
            .min_by_key(|row| row.priority())
            .map(|row| row.feature.clone())
    }
}

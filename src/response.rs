//! Merged federation responses.

use crate::error::LayerFailure;
use crate::feature::Feature;

/// The merged result of one logical read request.
///
/// Finite and one-shot: re-running federation requires a new request.
/// Feature order is the deterministic first-seen key order of row-group
/// assembly, not the completion order of layer tasks.
#[derive(Debug, Default)]
pub struct Response {
    /// Merged features.
    pub features: Vec<Feature>,
    /// Layers that failed during the rounds. Empty in fail-fast mode (a
    /// failure aborts the request instead); populated in best-effort mode
    /// so degradation is visible, never hidden in the feature list.
    pub failed_layers: Vec<LayerFailure>,
}

impl Response {
    /// Number of merged features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the response carries no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Whether any layer was dropped from the merge.
    pub fn is_degraded(&self) -> bool {
        !self.failed_layers.is_empty()
    }

    /// Iterates merged features in response order.
    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

impl IntoIterator for Response {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;

    #[test]
    fn test_empty_response() {
        let response = Response::default();
        assert!(response.is_empty());
        assert!(!response.is_degraded());
        assert_eq!(response.len(), 0);
    }

    #[test]
    fn test_degraded_response_is_visible() {
        let response = Response {
            features: vec![Feature::new("f1")],
            failed_layers: vec![LayerFailure {
                layer: 1,
                collection: "c".to_string(),
                error: StorageError::retryable("down"),
            }],
        };
        assert!(response.is_degraded());
        assert_eq!(response.into_iter().count(), 1);
    }
}

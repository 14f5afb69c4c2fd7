//! Request-scoped row groups.
//!
//! A round of per-layer queries produces one [`LayerRow`] per (layer,
//! feature) hit. The [`FeatureRowGroup`] collects them keyed by feature id,
//! preserving first-seen key order while scanning layers in priority order —
//! the order the merged response will use. Groups are built fresh per request
//! and discarded after merge.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::feature::{Feature, FeatureId};

/// One layer's hit for one feature.
#[derive(Debug, Clone)]
pub struct LayerRow {
    /// The feature as stored in the source layer.
    pub feature: Feature,
    /// Index of the source layer in its collection (0 = highest priority).
    pub layer_index: usize,
}

impl LayerRow {
    /// Priority of the source layer; lower wins.
    pub fn priority(&self) -> usize {
        self.layer_index
    }
}

/// Map from feature id to the rows each layer returned for it.
#[derive(Debug, Default)]
pub struct FeatureRowGroup {
    groups: IndexMap<FeatureId, Vec<LayerRow>>,
}

impl FeatureRowGroup {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one layer's rows.
    ///
    /// Callers must absorb layers in priority order within a round so that
    /// first-seen key order matches the ordering guarantee of the response.
    pub fn absorb_layer(
        &mut self,
        layer_index: usize,
        rows: impl IntoIterator<Item = (FeatureId, Feature)>,
    ) {
        for (id, feature) in rows {
            self.groups.entry(id).or_default().push(LayerRow {
                feature,
                layer_index,
            });
        }
    }

    /// Number of distinct feature ids.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no rows were absorbed.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Rows for one feature id.
    pub fn rows(&self, id: &FeatureId) -> Option<&[LayerRow]> {
        self.groups.get(id).map(Vec::as_slice)
    }

    /// Layer indices that returned a row for `id`.
    pub fn layers_present(&self, id: &FeatureId) -> BTreeSet<usize> {
        self.groups
            .get(id)
            .map(|rows| rows.iter().map(|r| r.layer_index).collect())
            .unwrap_or_default()
    }

    /// Iterates groups in first-seen key order.
    pub fn iter(&self) -> impl Iterator<Item = (&FeatureId, &[LayerRow])> {
        self.groups.iter().map(|(id, rows)| (id, rows.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str) -> (FeatureId, Feature) {
        (FeatureId::new(id), Feature::new(id))
    }

    #[test]
    fn test_first_seen_key_order_across_layers() {
        let mut group = FeatureRowGroup::new();
        group.absorb_layer(0, vec![row("id1")]);
        group.absorb_layer(1, vec![row("id1"), row("id2")]);

        let keys: Vec<_> = group.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(keys, vec!["id1", "id2"]);
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_rows_accumulate_per_key() {
        let mut group = FeatureRowGroup::new();
        group.absorb_layer(0, vec![row("id1")]);
        group.absorb_layer(2, vec![row("id1")]);

        let rows = group.rows(&FeatureId::new("id1")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].priority(), 0);
        assert_eq!(rows[1].priority(), 2);
        assert!(group.rows(&FeatureId::new("id9")).is_none());
    }

    #[test]
    fn test_layers_present() {
        let mut group = FeatureRowGroup::new();
        group.absorb_layer(0, vec![row("id1")]);
        group.absorb_layer(2, vec![row("id1")]);

        let present = group.layers_present(&FeatureId::new("id1"));
        assert_eq!(present, BTreeSet::from([0, 2]));
        assert!(group.layers_present(&FeatureId::new("id9")).is_empty());
    }

    #[test]
    fn test_second_round_appends_new_keys_at_the_end() {
        let mut group = FeatureRowGroup::new();
        group.absorb_layer(0, vec![row("id1")]);
        group.absorb_layer(1, vec![row("id2")]);
        // Round two: a by-id fetch adds id3 and closes a gap on id2.
        group.absorb_layer(0, vec![row("id2"), row("id3")]);

        let keys: Vec<_> = group.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(keys, vec!["id1", "id2", "id3"]);
        assert_eq!(group.layers_present(&FeatureId::new("id2")), BTreeSet::from([0, 1]));
    }
}

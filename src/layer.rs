//! Layers and layer collections.
//!
//! A [`Layer`] binds one backing storage to the collection name addressed
//! within it. A [`LayerCollection`] is the ordered, non-empty set of layers
//! composing one logical view; a layer's priority is its index (0 = highest).
//! Both are immutable after construction: changing the composition of a view
//! means building a new collection and assigning it to the view.

use std::sync::Arc;

use crate::error::FederationError;
use crate::storage::Storage;

/// One backing storage plus the collection to address within it.
#[derive(Clone)]
pub struct Layer {
    storage: Arc<dyn Storage>,
    collection_id: String,
}

impl Layer {
    /// Creates a layer.
    pub fn new(storage: Arc<dyn Storage>, collection_id: impl Into<String>) -> Self {
        Self {
            storage,
            collection_id: collection_id.into(),
        }
    }

    /// The backing storage.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// The collection id addressed within the backing storage.
    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("storage", &self.storage.name())
            .field("collection_id", &self.collection_id)
            .finish()
    }
}

/// Ordered, immutable, non-empty set of layers belonging to one view.
#[derive(Debug, Clone)]
pub struct LayerCollection {
    name: String,
    layers: Vec<Layer>,
}

impl LayerCollection {
    /// Creates a layer collection.
    ///
    /// Fails with [`FederationError::Configuration`] when `layers` is empty;
    /// the non-empty invariant is enforced here once so every accessor can
    /// rely on it.
    pub fn new(name: impl Into<String>, layers: Vec<Layer>) -> Result<Self, FederationError> {
        let name = name.into();
        if layers.is_empty() {
            return Err(FederationError::Configuration(format!(
                "layer collection '{}' has no layers",
                name
            )));
        }
        Ok(Self { name, layers })
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All layers in priority order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Layer at `index`, if in range.
    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false; kept for API symmetry with slice types.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The highest-priority layer.
    pub fn top_priority_layer(&self) -> &Layer {
        // Non-empty invariant enforced in `new`.
        &self.layers[0]
    }
}

//! ViewFed - priority-ordered view federation for geospatial feature storages.
//!
//! This library presents several independent backing storages as one logical
//! feature storage. A [`View`](view::View) binds an ordered set of
//! [`Layer`](layer::Layer)s (lowest index = highest priority); read sessions
//! fan a single logical request out to every layer concurrently, close
//! per-layer result gaps with a second by-id round, and merge the per-layer
//! candidates into one feature per id. Write sessions bind to exactly one
//! layer and route every mutation there.
//!
//! # High-Level API
//!
//! ```ignore
//! use std::sync::Arc;
//! use viewfed::prelude::*;
//!
//! let primary = Arc::new(MemoryStorage::new("primary"));
//! let archive = Arc::new(MemoryStorage::new("archive"));
//!
//! let layers = LayerCollection::new(
//!     "topology",
//!     vec![
//!         Layer::new(primary, "topology_head"),
//!         Layer::new(archive, "topology_2024"),
//!     ],
//! )?;
//!
//! let view = View::new(layers);
//! let session = view.new_read_session(&SessionOptions::default())?;
//! let response = session
//!     .execute(&ReadRequest::predicate_query("topology", Predicate::All))
//!     .await?;
//! ```

pub mod error;
pub mod executor;
pub mod feature;
pub mod layer;
pub mod merge;
pub mod request;
pub mod resolver;
pub mod response;
pub mod runner;
pub mod session;
pub mod storage;
pub mod view;

pub use error::{FederationError, LayerFailure};
pub use executor::{FailureMode, FeatureRowGroup, LayerRequest, LayerRow, ParallelQueryExecutor};
pub use feature::{Feature, FeatureId};
pub use layer::{Layer, LayerCollection};
pub use merge::{ByStoragePriority, MergeOperation};
pub use request::{Predicate, ReadRequest, WriteOp, WriteRequest};
pub use resolver::{MissingIdResolver, NeverResolve, ObligatoryLayers};
pub use response::Response;
pub use runner::{ConcurrentRunner, SerialRunner, Timer, TokioRunner};
pub use session::{ReadSession, WriteSession};
pub use storage::{
    FeatureCursor, MemoryStorage, SessionOptions, Storage, StorageError, StorageReadSession,
    StorageWriteSession, WriteResult,
};
pub use view::{View, ViewConfig};

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::error::{FederationError, LayerFailure};
    pub use crate::executor::FailureMode;
    pub use crate::feature::{Feature, FeatureId};
    pub use crate::layer::{Layer, LayerCollection};
    pub use crate::request::{Predicate, ReadRequest, WriteOp, WriteRequest};
    pub use crate::response::Response;
    pub use crate::storage::{MemoryStorage, SessionOptions, Storage};
    pub use crate::view::{View, ViewConfig};
}

/// Version of the ViewFed library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

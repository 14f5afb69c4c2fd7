//! Federation sessions.
//!
//! A session is one logical unit of work against a view. It eagerly opens
//! one underlying session per layer at construction, owns them exclusively
//! for its whole lifetime, and releases all of them on close regardless of
//! how the work went.

mod read;
mod write;

pub use read::ReadSession;
pub use write::WriteSession;

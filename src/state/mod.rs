//! Persistent sync state.
//!
//! A single JSON document records which albums have been fully downloaded
//! and which feed posts have already been dispatched. It is loaded once at
//! the start of a run, passed by `&mut` to each step, and rewritten as a
//! whole after every unit of progress. The document is meant to be safe to
//! hand-edit, e.g. to mark a problematic post as already dispatched.

pub mod error;
pub mod store;
pub mod types;

pub use error::StateError;
pub use store::{JsonStateStore, StateLock, StateStore};
pub use types::{is_plain_root_id, Attachment, CollectionRecord, RecordSnapshot, StateSummary, SyncState};

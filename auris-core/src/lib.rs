//! Core engine of the Auris ingest daemon.
//!
//! The pipeline for a single ingest runs: watcher discovery, duplicate
//! pre-check, archive extraction, metadata resolution, rename, filter,
//! flatten, prune, duplicate post-check, classification into the library,
//! and archival of the source. Conflicts never fail a task; they produce a
//! pending [`auris_model::ConflictRecord`] for the operator and the task
//! completes waiting on a manual decision.
//!
//! Components are plain values wired together by a composition root; there
//! is no global state. Everything that can block takes the task's
//! checkpoint so pause and cancel are honoured cooperatively.

pub mod archive;
pub mod catalog;
pub mod classify;
pub mod companion;
pub mod db;
pub mod dedupe;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fsutil;
pub mod metadata;
pub mod sweep;
pub mod transform;
pub mod watcher;

pub use db::Database;
pub use engine::{IngestTask, TaskEngine, TaskSubmission};
pub use error::{IngestError, Result};

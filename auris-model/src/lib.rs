//! Shared data models for the Auris ingest pipeline.
//!
//! Everything in here is plain data: work codes, task lifecycle enums,
//! catalog metadata, conflict bookkeeping, and the persisted record shapes
//! the repositories in `auris-core` read and write. No I/O lives here.

pub mod conflict;
pub mod lang;
pub mod metadata;
pub mod records;
pub mod task;
pub mod work;

pub use conflict::{ConflictKind, ConflictRecord, ResolutionAction, ResolutionOption};
pub use lang::{lang_name, lang_priority};
pub use metadata::{AgeCategory, WorkMetadata};
pub use records::{
    ArchiveSweepLog, ArchivedSource, ArchivedSourceStatus, FolderScanCacheEntry, LinkRelation,
    LinkageEdge, LibrarySnapshot, PasswordEntry, PasswordSource, PasswordSweepLog,
};
pub use task::{TaskId, TaskKind, TaskStatus};
pub use work::{WorkCode, WorkCodeError};

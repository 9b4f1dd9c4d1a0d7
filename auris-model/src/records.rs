//! Persisted record shapes shared between the repositories and the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::work::WorkCode;

/// One row of the library ledger: where a work currently lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarySnapshot {
    pub work: WorkCode,
    pub folder_path: String,
    pub folder_size: i64,
    pub file_count: i64,
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchivedSourceStatus {
    Completed,
    Reprocessing,
}

impl ArchivedSourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchivedSourceStatus::Completed => "completed",
            ArchivedSourceStatus::Reprocessing => "reprocessing",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "reprocessing" => ArchivedSourceStatus::Reprocessing,
            _ => ArchivedSourceStatus::Completed,
        }
    }
}

/// A source archive that has been ingested and moved to the archived pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedSource {
    pub id: String,
    pub original_path: String,
    pub current_path: String,
    /// Uniqueness key within the pool.
    pub filename: String,
    pub work: Option<WorkCode>,
    pub file_size: i64,
    pub processed_at: DateTime<Utc>,
    pub process_count: i64,
    pub task_id: Option<String>,
    pub status: ArchivedSourceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordSource {
    Manual,
    Batch,
    Auto,
}

impl PasswordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PasswordSource::Manual => "manual",
            PasswordSource::Batch => "batch",
            PasswordSource::Auto => "auto",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "batch" => PasswordSource::Batch,
            "auto" => PasswordSource::Auto,
            _ => PasswordSource::Manual,
        }
    }
}

/// A vault entry. Work code and filename scope the password to a specific
/// archive; entries with neither are generic candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordEntry {
    pub id: String,
    pub work: Option<WorkCode>,
    pub filename: Option<String>,
    pub password: String,
    pub description: Option<String>,
    pub source: PasswordSource,
    pub use_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How a linked work relates to the origin of its edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkRelation {
    Original,
    Parent,
    Child,
}

impl LinkRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkRelation::Original => "original",
            LinkRelation::Parent => "parent",
            LinkRelation::Child => "child",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "parent" => LinkRelation::Parent,
            "child" => LinkRelation::Child,
            _ => LinkRelation::Original,
        }
    }
}

/// Cached translation-linkage edge between two works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkageEdge {
    pub origin: WorkCode,
    pub linked: WorkCode,
    pub relation: LinkRelation,
    pub lang: String,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Cached scan result for a folder in the existing-folders staging area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderScanCacheEntry {
    pub folder_path: String,
    pub folder_name: String,
    pub work: Option<WorkCode>,
    pub duplicate_info: Option<Value>,
    pub file_count: i64,
    pub folder_size: i64,
    pub cached_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub needs_refresh: bool,
}

/// Audit row written by the password-vault sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordSweepLog {
    pub id: String,
    pub deleted_count: i64,
    pub config_snapshot: Value,
    pub deleted_summary: Value,
    pub created_at: DateTime<Utc>,
}

/// Audit row written by the archived-source sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSweepLog {
    pub id: String,
    pub deleted_count: i64,
    pub freed_bytes: i64,
    pub config_snapshot: Value,
    pub deleted_summary: Value,
    pub created_at: DateTime<Utc>,
}

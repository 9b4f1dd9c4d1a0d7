use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque task identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a task does end to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Full pipeline: extract, resolve metadata, rename, filter, flatten,
    /// prune, classify, archive the source.
    AutoIngest,
    /// Same pipeline without the extraction stage; the source is a folder
    /// the operator dropped in by hand.
    ExistingFolder,
    ExtractOnly,
    MetadataOnly,
    FilterOnly,
    RenameOnly,
}

impl TaskKind {
    /// Wire name used by the submission contract.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::AutoIngest => "auto_process",
            TaskKind::ExistingFolder => "process_existing_folder",
            TaskKind::ExtractOnly => "extract",
            TaskKind::MetadataOnly => "metadata",
            TaskKind::FilterOnly => "filter",
            TaskKind::RenameOnly => "rename",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "auto_process" => Some(TaskKind::AutoIngest),
            "process_existing_folder" => Some(TaskKind::ExistingFolder),
            "extract" => Some(TaskKind::ExtractOnly),
            "metadata" => Some(TaskKind::MetadataOnly),
            "filter" => Some(TaskKind::FilterOnly),
            "rename" => Some(TaskKind::RenameOnly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    /// A duplicate or linked-work conflict was recorded; the operator has to
    /// pick a resolution before anything else happens for this work.
    WaitingManual,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for kind in [
            TaskKind::AutoIngest,
            TaskKind::ExistingFolder,
            TaskKind::ExtractOnly,
            TaskKind::MetadataOnly,
            TaskKind::FilterOnly,
            TaskKind::RenameOnly,
        ] {
            assert_eq!(TaskKind::from_wire(kind.as_str()), Some(kind));
        }
        assert_eq!(TaskKind::from_wire("transcode"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::WaitingManual.is_terminal());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::TaskId;
use crate::work::WorkCode;

/// Why a work could not be filed automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    #[serde(rename = "DUPLICATE")]
    Duplicate,
    /// The Japanese original of an incoming translation is already shelved.
    #[serde(rename = "LINKED_WORK_ORIGINAL")]
    LinkedOriginal,
    /// A translation parent of the incoming work is already shelved.
    #[serde(rename = "LINKED_WORK_TRANSLATION")]
    LinkedTranslation,
    /// A translated child edition is already shelved.
    #[serde(rename = "LINKED_WORK_CHILD")]
    LinkedChild,
    #[serde(rename = "LANGUAGE_VARIANT")]
    LanguageVariant,
    #[serde(rename = "MULTIPLE_VERSIONS")]
    MultipleVersions,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::Duplicate => "DUPLICATE",
            ConflictKind::LinkedOriginal => "LINKED_WORK_ORIGINAL",
            ConflictKind::LinkedTranslation => "LINKED_WORK_TRANSLATION",
            ConflictKind::LinkedChild => "LINKED_WORK_CHILD",
            ConflictKind::LanguageVariant => "LANGUAGE_VARIANT",
            ConflictKind::MultipleVersions => "MULTIPLE_VERSIONS",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DUPLICATE" => Some(ConflictKind::Duplicate),
            "LINKED_WORK_ORIGINAL" => Some(ConflictKind::LinkedOriginal),
            "LINKED_WORK_TRANSLATION" => Some(ConflictKind::LinkedTranslation),
            "LINKED_WORK_CHILD" => Some(ConflictKind::LinkedChild),
            "LANGUAGE_VARIANT" => Some(ConflictKind::LanguageVariant),
            "MULTIPLE_VERSIONS" => Some(ConflictKind::MultipleVersions),
            _ => None,
        }
    }

    /// Operator-facing label.
    pub fn display_name(&self) -> &'static str {
        match self {
            ConflictKind::Duplicate => "直接重复",
            ConflictKind::LinkedOriginal => "原作已存在",
            ConflictKind::LinkedTranslation => "翻译版已存在",
            ConflictKind::LinkedChild => "子版本已存在",
            ConflictKind::LanguageVariant => "语言变体",
            ConflictKind::MultipleVersions => "多版本",
        }
    }
}

/// Operator decision applied to a pending conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionAction {
    #[serde(rename = "KEEP_NEW")]
    KeepNew,
    #[serde(rename = "KEEP_OLD")]
    KeepOld,
    #[serde(rename = "MERGE")]
    Merge,
    #[serde(rename = "SKIP")]
    Skip,
    #[serde(rename = "KEEP_BOTH")]
    KeepBoth,
    #[serde(rename = "MERGE_LANG")]
    MergeLanguage,
}

impl ResolutionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionAction::KeepNew => "KEEP_NEW",
            ResolutionAction::KeepOld => "KEEP_OLD",
            ResolutionAction::Merge => "MERGE",
            ResolutionAction::Skip => "SKIP",
            ResolutionAction::KeepBoth => "KEEP_BOTH",
            ResolutionAction::MergeLanguage => "MERGE_LANG",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "KEEP_NEW" => Some(ResolutionAction::KeepNew),
            "KEEP_OLD" => Some(ResolutionAction::KeepOld),
            "MERGE" => Some(ResolutionAction::Merge),
            "SKIP" => Some(ResolutionAction::Skip),
            "KEEP_BOTH" => Some(ResolutionAction::KeepBoth),
            "MERGE_LANG" => Some(ResolutionAction::MergeLanguage),
            _ => None,
        }
    }
}

/// One selectable choice offered to the operator for a conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionOption {
    pub action: ResolutionAction,
    pub label: String,
    pub description: String,
    #[serde(default)]
    pub recommend: bool,
}

/// A quarantined work waiting on an operator decision.
///
/// `new_path` can point at the source archive (pre-check conflicts) or at an
/// extracted directory (post-check conflicts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: String,
    pub task_id: TaskId,
    pub work: WorkCode,
    pub kind: ConflictKind,
    pub existing_path: String,
    pub new_path: String,
    pub new_metadata: Value,
    /// `PENDING` or a [`ResolutionAction`] wire name once resolved.
    pub status: String,
    pub linked_works_info: Value,
    pub analysis_info: Value,
    pub related_works: Vec<WorkCode>,
    pub created_at: DateTime<Utc>,
}

impl ConflictRecord {
    pub const STATUS_PENDING: &'static str = "PENDING";

    pub fn is_pending(&self) -> bool {
        self.status == Self::STATUS_PENDING
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            ConflictKind::Duplicate,
            ConflictKind::LinkedOriginal,
            ConflictKind::LinkedTranslation,
            ConflictKind::LinkedChild,
            ConflictKind::LanguageVariant,
            ConflictKind::MultipleVersions,
        ] {
            assert_eq!(ConflictKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_action_round_trip() {
        for action in [
            ResolutionAction::KeepNew,
            ResolutionAction::KeepOld,
            ResolutionAction::Merge,
            ResolutionAction::Skip,
            ResolutionAction::KeepBoth,
            ResolutionAction::MergeLanguage,
        ] {
            assert_eq!(ResolutionAction::from_str(action.as_str()), Some(action));
        }
        assert_eq!(ResolutionAction::from_str("RETRY"), None);
    }
}

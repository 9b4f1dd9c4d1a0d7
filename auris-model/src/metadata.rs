use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::work::WorkCode;

/// Age rating bucket assigned by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeCategory {
    All,
    R15,
    Adult,
}

impl AgeCategory {
    /// Catalog encodes the rating as a small integer: 1 = all ages,
    /// 2 = R15, anything else adult.
    pub fn from_catalog(raw: i64) -> Self {
        match raw {
            1 => AgeCategory::All,
            2 => AgeCategory::R15,
            _ => AgeCategory::Adult,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeCategory::All => "GEN",
            AgeCategory::R15 => "R15",
            AgeCategory::Adult => "ADL",
        }
    }
}

/// Authoritative catalog record for a single work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkMetadata {
    pub work: WorkCode,
    pub work_name: String,
    pub maker_id: String,
    pub maker_name: String,
    /// `YYYY-MM-DD`.
    pub release_date: String,
    pub series_id: Option<String>,
    pub series_name: Option<String>,
    pub age_category: AgeCategory,
    pub tags: Vec<String>,
    /// Voice actors, in catalog order.
    pub cvs: Vec<String>,
    pub cover_url: String,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl WorkMetadata {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_category_mapping() {
        assert_eq!(AgeCategory::from_catalog(1), AgeCategory::All);
        assert_eq!(AgeCategory::from_catalog(2), AgeCategory::R15);
        assert_eq!(AgeCategory::from_catalog(3), AgeCategory::Adult);
        assert_eq!(AgeCategory::from_catalog(0), AgeCategory::Adult);
    }
}

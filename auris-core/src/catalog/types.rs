use std::collections::HashMap;

use serde::Deserialize;

use auris_model::{LinkRelation, WorkCode};

/// Per-language availability of an open translation request.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TranslationStatus {
    #[serde(default)]
    pub is_available: bool,
    /// The catalog omits this field for denied languages more often than it
    /// sets it, so absence means denied.
    #[serde(default = "TranslationStatus::default_denied")]
    pub is_denied: bool,
}

impl TranslationStatus {
    fn default_denied() -> bool {
        true
    }

    pub fn usable(&self) -> bool {
        self.is_available && !self.is_denied
    }
}

/// `translation_info` block of a product record.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TranslationInfo {
    #[serde(default)]
    pub is_original: bool,
    #[serde(default)]
    pub is_parent: bool,
    #[serde(default)]
    pub is_child: bool,
    #[serde(default)]
    pub parent_workno: Option<String>,
    #[serde(default)]
    pub original_workno: Option<String>,
    #[serde(default = "TranslationInfo::default_lang")]
    pub lang: String,
    #[serde(default)]
    pub is_translation_agree: bool,
    #[serde(default)]
    pub translation_status_for_translator: HashMap<String, TranslationStatus>,
}

impl TranslationInfo {
    fn default_lang() -> String {
        "JPN".to_string()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ImageMain {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Genre {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credit {
    #[serde(default)]
    pub name: String,
}

/// `creaters` block. The field name is the catalog's own spelling.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Creators {
    #[serde(default)]
    pub voice_by: Vec<Credit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LanguageEdition {
    #[serde(default)]
    pub workno: Option<String>,
    #[serde(default = "TranslationInfo::default_lang")]
    pub lang: String,
}

/// The catalog serialises `language_editions` as a list normally but as an
/// object keyed by language when the record came through certain locales.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LanguageEditions {
    List(Vec<LanguageEdition>),
    Map(HashMap<String, LanguageEdition>),
}

impl Default for LanguageEditions {
    fn default() -> Self {
        LanguageEditions::List(Vec::new())
    }
}

impl LanguageEditions {
    pub fn into_vec(self) -> Vec<LanguageEdition> {
        match self {
            LanguageEditions::List(list) => list,
            LanguageEditions::Map(map) => map.into_values().collect(),
        }
    }

    pub fn to_vec(&self) -> Vec<LanguageEdition> {
        self.clone().into_vec()
    }
}

/// The subset of a catalog product record the pipeline consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductRecord {
    #[serde(default)]
    pub workno: String,
    #[serde(default)]
    pub work_name: String,
    #[serde(default)]
    pub maker_id: String,
    #[serde(default)]
    pub maker_name: String,
    #[serde(default)]
    pub regist_date: String,
    #[serde(default)]
    pub series_id: Option<String>,
    #[serde(default)]
    pub series_name: Option<String>,
    #[serde(default = "ProductRecord::default_age_category")]
    pub age_category: i64,
    #[serde(default)]
    pub image_main: ImageMain,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub creaters: Creators,
    #[serde(default)]
    pub translation_info: Option<TranslationInfo>,
    #[serde(default)]
    pub language_editions: LanguageEditions,
    #[serde(default)]
    pub child_worknos: Vec<String>,
}

impl ProductRecord {
    fn default_age_category() -> i64 {
        3
    }
}

/// A node of the translation-linkage graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedWork {
    pub work: WorkCode,
    pub relation: LinkRelation,
    pub lang: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_record_minimal() {
        let record: ProductRecord = serde_json::from_str(
            r#"{"workno": "RJ123456", "work_name": "作品"}"#,
        )
        .unwrap();
        assert_eq!(record.workno, "RJ123456");
        assert_eq!(record.age_category, 3);
        assert!(record.translation_info.is_none());
        assert!(record.language_editions.to_vec().is_empty());
    }

    #[test]
    fn test_language_editions_list_or_map() {
        let list: LanguageEditions = serde_json::from_str(
            r#"[{"workno": "RJ111111", "lang": "CHI_HANS"}]"#,
        )
        .unwrap();
        assert_eq!(list.to_vec().len(), 1);

        let map: LanguageEditions = serde_json::from_str(
            r#"{"CHI_HANS": {"workno": "RJ111111", "lang": "CHI_HANS"}}"#,
        )
        .unwrap();
        assert_eq!(map.to_vec().len(), 1);
    }

    #[test]
    fn test_translation_status_defaults_to_denied() {
        let status: TranslationStatus = serde_json::from_str(r#"{"is_available": true}"#).unwrap();
        assert!(!status.usable());

        let open: TranslationStatus =
            serde_json::from_str(r#"{"is_available": true, "is_denied": false}"#).unwrap();
        assert!(open.usable());
    }
}

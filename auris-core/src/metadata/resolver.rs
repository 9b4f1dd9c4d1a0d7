use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use auris_config::MetadataConfig;
use auris_model::{AgeCategory, WorkCode, WorkMetadata};

use crate::catalog::{CatalogClient, ProductRecord, TranslationInfo};
use crate::db::MetadataCacheRepo;
use crate::error::{IngestError, Result};

const CACHE_TTL_DAYS: i64 = 30;

/// Kana ratio above which a title is treated as Japanese rather than a
/// Chinese translation.
const KANA_REJECT_RATIO: f64 = 0.05;

/// Catalog language code -> request locale for translated-title fetches.
fn locale_for(lang: &str) -> &str {
    match lang {
        "CHI_HANS" => "zh-CN",
        "CHI_HANT" => "zh-TW",
        "ENG" => "en-US",
        "KOR" => "ko-KR",
        "SPA" => "es-ES",
        "DEU" => "de-DE",
        "FRA" => "fr-FR",
        "IND" => "id-ID",
        "ITA" => "it-IT",
        "POR" => "pt-PT",
        "SWE" => "sv-SE",
        "THA" => "th-TH",
        "VIE" => "vi-VN",
        other => other,
    }
}

/// True when the share of kana among non-space characters exceeds the
/// rejection threshold. Chinese translation titles carry next to no kana;
/// a kana-heavy title is the Japanese original leaking through.
pub fn kana_ratio_exceeded(text: &str) -> bool {
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    if total == 0 {
        return false;
    }
    let kana = text
        .chars()
        .filter(|c| matches!(*c, '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}'))
        .count();
    kana as f64 / total as f64 > KANA_REJECT_RATIO
}

/// Resolves authoritative metadata for a work from path, cache, and
/// catalog, preferring community-translated Chinese titles.
#[derive(Debug)]
pub struct MetadataResolver {
    catalog: Arc<CatalogClient>,
    cache: MetadataCacheRepo,
}

impl MetadataResolver {
    pub fn new(catalog: Arc<CatalogClient>, cache: MetadataCacheRepo) -> Self {
        Self { catalog, cache }
    }

    /// Resolve metadata for the work named by `path`.
    ///
    /// A path without a work code is fatal, as is a catalog miss. The
    /// 30-day cache short-circuits the catalog entirely.
    pub async fn resolve(&self, path: &Path, config: &MetadataConfig) -> Result<WorkMetadata> {
        let work = WorkCode::find_in_path(path)
            .ok_or_else(|| IngestError::NoWorkCode(path.to_path_buf()))?;
        self.resolve_work(&work, config).await
    }

    pub async fn resolve_work(
        &self,
        work: &WorkCode,
        config: &MetadataConfig,
    ) -> Result<WorkMetadata> {
        if config.cache_enabled
            && let Some(cached) = self.cache.get_fresh(work, Utc::now()).await?
        {
            info!(work = %work, "metadata cache hit");
            return Ok(cached);
        }

        let metadata = self.fetch(work, config).await?;

        if config.cache_enabled {
            self.cache.put(&metadata).await?;
        }
        Ok(metadata)
    }

    /// Drop the cached record; the next resolve refetches.
    pub async fn invalidate(&self, work: &WorkCode) -> Result<()> {
        self.cache.invalidate(work).await
    }

    async fn fetch(&self, work: &WorkCode, config: &MetadataConfig) -> Result<WorkMetadata> {
        let record = self
            .catalog
            .product(work, Some(&config.locale))
            .await?
            .ok_or_else(|| IngestError::CatalogMiss(work.to_string()))?;

        let mut metadata = map_record(work, &record);

        if let Some(trans) = &record.translation_info
            && let Some(translated) = self.translated_title(work, trans).await?
        {
            metadata.work_name = translated;
        }

        Ok(metadata)
    }

    /// Preferred translated title, or `None` to keep the record's own name.
    async fn translated_title(
        &self,
        work: &WorkCode,
        trans: &TranslationInfo,
    ) -> Result<Option<String>> {
        if !trans.is_original {
            // Translated child: Simplified first, Traditional next, then the
            // record's own language.
            if trans.lang != "CHI_HANS"
                && let Some(title) = self.fetch_title(work, "zh-CN", true).await?
            {
                return Ok(Some(title));
            }
            if trans.lang != "CHI_HANT"
                && let Some(title) = self.fetch_title(work, "zh-TW", true).await?
            {
                return Ok(Some(title));
            }
            let validate = trans.lang == "CHI_HANS" || trans.lang == "CHI_HANT";
            return self.fetch_title(work, locale_for(&trans.lang), validate).await;
        }

        if trans.is_translation_agree {
            // Original with open translation requests: take an available
            // Chinese edition when the request status allows it.
            let status = &trans.translation_status_for_translator;
            if status.get("CHI_HANS").map(|s| s.usable()).unwrap_or(false)
                && let Some(title) = self.fetch_title(work, "zh-CN", true).await?
            {
                return Ok(Some(title));
            }
            if status.get("CHI_HANT").map(|s| s.usable()).unwrap_or(false)
                && let Some(title) = self.fetch_title(work, "zh-TW", true).await?
            {
                return Ok(Some(title));
            }
        }

        Ok(None)
    }

    async fn fetch_title(
        &self,
        work: &WorkCode,
        locale: &str,
        validate_chinese: bool,
    ) -> Result<Option<String>> {
        let record = match self.catalog.product(work, Some(locale)).await {
            Ok(record) => record,
            Err(err) => {
                warn!(work = %work, locale, "translated title fetch failed: {err}");
                return Ok(None);
            }
        };

        let Some(title) = record.map(|r| r.work_name).filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        if validate_chinese && kana_ratio_exceeded(&title) {
            warn!(work = %work, locale, %title, "title is kana-heavy, rejecting as untranslated");
            return Ok(None);
        }

        info!(work = %work, locale, %title, "using translated title");
        Ok(Some(title))
    }
}

fn map_record(work: &WorkCode, record: &ProductRecord) -> WorkMetadata {
    let now = Utc::now();

    let release_date = record.regist_date.chars().take(10).collect::<String>();

    let cover_url = record
        .image_main
        .url
        .as_deref()
        .map(|url| {
            if url.starts_with("http") {
                url.to_string()
            } else {
                format!("https:{url}")
            }
        })
        .unwrap_or_default();

    WorkMetadata {
        work: WorkCode::parse(&record.workno).unwrap_or_else(|_| work.clone()),
        work_name: record.work_name.clone(),
        maker_id: record.maker_id.clone(),
        maker_name: record.maker_name.clone(),
        release_date,
        series_id: record.series_id.clone(),
        series_name: record.series_name.clone(),
        age_category: AgeCategory::from_catalog(record.age_category),
        tags: record.genres.iter().map(|g| g.name.clone()).collect(),
        cvs: record.creaters.voice_by.iter().map(|c| c.name.clone()).collect(),
        cover_url,
        cached_at: now,
        expires_at: now + Duration::days(CACHE_TTL_DAYS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kana_ratio_filter() {
        // Pure Chinese title passes.
        assert!(!kana_ratio_exceeded("心肺复苏指南"));
        // Japanese title with kana is rejected.
        assert!(kana_ratio_exceeded("耳かきとささやきの音声"));
        // Empty and whitespace-only strings pass.
        assert!(!kana_ratio_exceeded(""));
        assert!(!kana_ratio_exceeded("   "));
        // A single kana in a long Chinese title stays under the threshold.
        let mostly_chinese = format!("{}の", "字".repeat(40));
        assert!(!kana_ratio_exceeded(&mostly_chinese));
    }

    #[test]
    fn test_locale_mapping() {
        assert_eq!(locale_for("CHI_HANS"), "zh-CN");
        assert_eq!(locale_for("CHI_HANT"), "zh-TW");
        assert_eq!(locale_for("ENG"), "en-US");
        assert_eq!(locale_for("XYZ"), "XYZ");
    }

    #[test]
    fn test_map_record_fields() {
        let work = WorkCode::parse("RJ123456").unwrap();
        let record: ProductRecord = serde_json::from_str(
            r#"{
                "workno": "RJ123456",
                "work_name": "作品名",
                "maker_id": "RG001",
                "maker_name": "社团",
                "regist_date": "2024-03-05 00:00:00",
                "age_category": 2,
                "image_main": {"url": "//img.example/main.jpg"},
                "genres": [{"name": "t1"}, {"name": "t2"}],
                "creaters": {"voice_by": [{"name": "cv1"}]}
            }"#,
        )
        .unwrap();

        let metadata = map_record(&work, &record);
        assert_eq!(metadata.release_date, "2024-03-05");
        assert_eq!(metadata.age_category, AgeCategory::R15);
        assert_eq!(metadata.cover_url, "https://img.example/main.jpg");
        assert_eq!(metadata.tags, vec!["t1".to_string(), "t2".to_string()]);
        assert_eq!(metadata.cvs, vec!["cv1".to_string()]);
        assert!(metadata.expires_at > metadata.cached_at);
    }

    #[test]
    fn test_map_record_missing_cover() {
        let work = WorkCode::parse("RJ123456").unwrap();
        let record: ProductRecord =
            serde_json::from_str(r#"{"workno": "RJ123456", "work_name": "x"}"#).unwrap();
        assert_eq!(map_record(&work, &record).cover_url, "");
    }
}

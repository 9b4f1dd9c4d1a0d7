use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use auris_config::MetadataConfig;
use auris_model::{LinkRelation, WorkCode};

use crate::error::Result;

use super::types::{LinkedWork, ProductRecord, TranslationInfo};

const DEFAULT_BASE_URL: &str = "https://www.dlsite.com/maniax/api/=";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.0";
const MEMO_TTL_HOURS: i64 = 24;

struct CachedProduct {
    record: Option<ProductRecord>,
    fetched_at: DateTime<Utc>,
}

/// Client for the remote work catalog with a 24-hour response memo.
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    polite_delay: Duration,
    memo: DashMap<String, CachedProduct>,
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("base_url", &self.base_url)
            .field("memo_entries", &self.memo.len())
            .finish()
    }
}

impl CatalogClient {
    pub fn new(config: &MetadataConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .timeout(Duration::from_secs(config.connect_timeout + config.read_timeout));

        if let Some(proxy) = &config.http_proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: DEFAULT_BASE_URL.to_string(),
            polite_delay: Duration::from_secs(config.sleep_interval),
            memo: DashMap::new(),
        })
    }

    /// Point the client at a different catalog root (tests, mirrors).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn product_url(&self, work: &WorkCode, locale: Option<&str>) -> String {
        match locale {
            Some(locale) => format!(
                "{}/product.json?workno={}&locale={}",
                self.base_url, work, locale
            ),
            None => format!("{}/product.json?workno={}", self.base_url, work),
        }
    }

    /// Fetch the product record, memoised per URL for 24 hours.
    ///
    /// `Ok(None)` is a catalog miss (404 or empty array); transport errors
    /// bubble so the caller can fail without poisoning the memo.
    pub async fn product(
        &self,
        work: &WorkCode,
        locale: Option<&str>,
    ) -> Result<Option<ProductRecord>> {
        let url = self.product_url(work, locale);

        if let Some(cached) = self.memo.get(&url) {
            let age = Utc::now() - cached.fetched_at;
            if age < chrono::Duration::hours(MEMO_TTL_HOURS) {
                debug!(%url, "catalog memo hit");
                return Ok(cached.record.clone());
            }
        }

        // Politeness: never hammer the catalog, even across workers.
        tokio::time::sleep(self.polite_delay).await;

        debug!(%url, "fetching catalog record");
        let response = self.http.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!(work = %work, "catalog returned 404");
            self.memo.insert(
                url,
                CachedProduct {
                    record: None,
                    fetched_at: Utc::now(),
                },
            );
            return Ok(None);
        }

        let response = response.error_for_status()?;
        let records: Vec<ProductRecord> = response.json().await?;
        let record = records.into_iter().next();

        if record.is_none() {
            warn!(work = %work, "catalog returned empty record array");
        }

        self.memo.insert(
            url,
            CachedProduct {
                record: record.clone(),
                fetched_at: Utc::now(),
            },
        );
        Ok(record)
    }

    /// Translation block for a work; absent blocks mean "original".
    pub async fn translation_info(&self, work: &WorkCode) -> Result<TranslationInfo> {
        let record = self.product(work, None).await?;
        Ok(record
            .and_then(|r| r.translation_info)
            .unwrap_or(TranslationInfo {
                is_original: true,
                ..TranslationInfo::default()
            }))
    }

    /// Immediate relatives of a work: the original, its translation parent
    /// and the translated children, without cross-language recursion.
    pub async fn linked_works(&self, work: &WorkCode) -> Result<HashMap<WorkCode, LinkedWork>> {
        let mut result = HashMap::new();

        let Some(record) = self.product(work, None).await? else {
            result.insert(
                work.clone(),
                LinkedWork {
                    work: work.clone(),
                    relation: LinkRelation::Original,
                    lang: "JPN".to_string(),
                },
            );
            return Ok(result);
        };

        let trans = record
            .translation_info
            .clone()
            .unwrap_or(TranslationInfo {
                is_original: true,
                ..TranslationInfo::default()
            });

        if trans.is_original {
            insert_link(
                &mut result,
                Some(work.as_str()),
                LinkRelation::Original,
                "JPN",
            );
            for edition in record.language_editions.to_vec() {
                insert_link(
                    &mut result,
                    edition.workno.as_deref(),
                    LinkRelation::Parent,
                    &edition.lang,
                );
            }
        } else if trans.is_parent {
            let original = trans.original_workno.as_deref().unwrap_or(work.as_str());
            insert_link(&mut result, Some(original), LinkRelation::Original, "JPN");
            insert_link(
                &mut result,
                Some(work.as_str()),
                LinkRelation::Parent,
                &trans.lang,
            );
            for child in &record.child_worknos {
                insert_link(&mut result, Some(child), LinkRelation::Child, &trans.lang);
            }
        } else if trans.is_child {
            let original = trans.original_workno.as_deref().unwrap_or(work.as_str());
            insert_link(&mut result, Some(original), LinkRelation::Original, "JPN");
            insert_link(
                &mut result,
                trans.parent_workno.as_deref(),
                LinkRelation::Parent,
                &trans.lang,
            );
            insert_link(
                &mut result,
                Some(work.as_str()),
                LinkRelation::Child,
                &trans.lang,
            );
        } else {
            insert_link(
                &mut result,
                Some(work.as_str()),
                LinkRelation::Original,
                "JPN",
            );
        }

        Ok(result)
    }

    /// Full linkage graph: the original's relatives plus, for each requested
    /// language edition, that edition's own relatives.
    pub async fn full_linkage(
        &self,
        work: &WorkCode,
        languages: &[String],
    ) -> Result<HashMap<WorkCode, LinkedWork>> {
        let trans = self.translation_info(work).await?;

        // Start graph expansion from the original so every sibling is seen.
        let origin = if !trans.is_original {
            trans
                .original_workno
                .as_deref()
                .and_then(|code| WorkCode::parse(code).ok())
                .unwrap_or_else(|| work.clone())
        } else {
            work.clone()
        };

        let mut result = self.linked_works(&origin).await?;

        if let Some(record) = self.product(&origin, None).await? {
            for edition in record.language_editions.to_vec() {
                if !languages.iter().any(|lang| lang == &edition.lang) {
                    continue;
                }
                let Some(code) = edition
                    .workno
                    .as_deref()
                    .and_then(|code| WorkCode::parse(code).ok())
                else {
                    continue;
                };
                if result.contains_key(&code) {
                    continue;
                }
                let edition_links = self.linked_works(&code).await?;
                for (linked_code, linked) in edition_links {
                    result.entry(linked_code).or_insert(linked);
                }
            }
        }

        info!(
            work = %work,
            graph_size = result.len(),
            "expanded translation linkage"
        );
        Ok(result)
    }

    /// Lightweight title lookup used when describing linked works.
    pub async fn work_title(&self, work: &WorkCode) -> Result<Option<String>> {
        Ok(self
            .product(work, None)
            .await?
            .map(|record| record.work_name))
    }
}

fn insert_link(
    map: &mut HashMap<WorkCode, LinkedWork>,
    code: Option<&str>,
    relation: LinkRelation,
    lang: &str,
) {
    if let Some(code) = code
        && let Ok(parsed) = WorkCode::parse(code)
    {
        map.insert(
            parsed.clone(),
            LinkedWork {
                work: parsed,
                relation,
                lang: lang.to_string(),
            },
        );
    }
}

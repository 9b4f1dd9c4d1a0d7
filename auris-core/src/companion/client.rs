use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use auris_config::CompanionConfig;
use auris_model::WorkCode;

use crate::catalog::CatalogClient;
use crate::error::Result;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Deserialize, Default)]
struct SearchCircle {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct SearchTag {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchWork {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    circle: SearchCircle,
    #[serde(default)]
    tags: Vec<SearchTag>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    works: Vec<SearchWork>,
}

/// Outcome of one companion lookup.
#[derive(Debug, Clone)]
pub struct CompanionCheck {
    pub found: bool,
    pub work: WorkCode,
    pub work_id: u64,
    pub title: String,
    pub circle_name: String,
    pub tags: Vec<String>,
    pub total_count: usize,
    /// `companion`, `companion_disabled`, `companion_auth_error`,
    /// `companion_timeout`, `companion_error_<status>`, or
    /// `companion_exception`.
    pub source: String,
    pub checked_at: DateTime<Utc>,
}

impl CompanionCheck {
    fn miss(work: &WorkCode, source: &str) -> Self {
        Self {
            found: false,
            work: work.clone(),
            work_id: 0,
            title: String::new(),
            circle_name: String::new(),
            tags: Vec::new(),
            total_count: 0,
            source: source.to_string(),
            checked_at: Utc::now(),
        }
    }
}

/// Client for the companion server's search API, with a short TTL cache.
pub struct CompanionClient {
    http: reqwest::Client,
    config: CompanionConfig,
    cache: DashMap<WorkCode, CompanionCheck>,
}

impl std::fmt::Debug for CompanionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompanionClient")
            .field("enabled", &self.config.enabled)
            .field("cache_entries", &self.cache.len())
            .finish()
    }
}

impl CompanionClient {
    pub fn new(config: &CompanionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        let mut config = config.clone();
        config.server_url = config.server_url.trim_end_matches('/').to_string();

        Ok(Self {
            http,
            config,
            cache: DashMap::new(),
        })
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled && !self.config.server_url.is_empty()
    }

    fn search_url(&self, work: &WorkCode) -> String {
        format!(
            "{}/api/search?page=1&sort=desc&order=release&nsfw=0&keyword={}",
            self.config.server_url, work
        )
    }

    fn cached(&self, work: &WorkCode) -> Option<CompanionCheck> {
        let entry = self.cache.get(work)?;
        let age = Utc::now() - entry.checked_at;
        if age > chrono::Duration::seconds(self.config.cache_ttl as i64) {
            drop(entry);
            self.cache.remove(work);
            return None;
        }
        Some(entry.clone())
    }

    /// Look the work up by numeric id; never fails the caller.
    pub async fn check(&self, work: &WorkCode) -> CompanionCheck {
        if let Some(hit) = self.cached(work) {
            debug!(work = %work, "companion cache hit");
            return hit;
        }

        if !self.enabled() {
            return CompanionCheck::miss(work, "companion_disabled");
        }

        let result = self.fetch(work).await;
        self.cache.insert(work.clone(), result.clone());
        result
    }

    async fn fetch(&self, work: &WorkCode) -> CompanionCheck {
        let url = self.search_url(work);
        debug!(%url, "querying companion server");

        let mut request = self.http.get(&url).header("Accept", "application/json, text/plain, */*");
        if !self.config.api_token.is_empty() {
            request = request.header(
                "Authorization",
                format!("Bearer {}", self.config.api_token),
            );
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                warn!(work = %work, "companion server timed out");
                return CompanionCheck::miss(work, "companion_timeout");
            }
            Err(err) => {
                error!(work = %work, "companion request failed: {err}");
                return CompanionCheck::miss(work, "companion_exception");
            }
        };

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                error!(work = %work, "companion server rejected the API token");
                return CompanionCheck::miss(work, "companion_auth_error");
            }
            status if !status.is_success() => {
                warn!(work = %work, %status, "companion server returned an error");
                return CompanionCheck::miss(work, &format!("companion_error_{}", status.as_u16()));
            }
            _ => {}
        }

        let body: SearchResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                error!(work = %work, "companion response was not valid JSON: {err}");
                return CompanionCheck::miss(work, "companion_exception");
            }
        };

        let mut result = CompanionCheck::miss(work, "companion");
        result.total_count = body.works.len();

        let wanted = work.numeric();
        if let Some(hit) = body.works.iter().find(|w| w.id == wanted) {
            result.found = true;
            result.work_id = hit.id;
            result.title = hit.title.clone();
            result.circle_name = hit.circle.name.clone();
            result.tags = hit.tags.iter().map(|t| t.name.clone()).collect();
            info!(work = %work, title = %result.title, "companion server holds this work");
        } else {
            debug!(work = %work, "companion server does not hold this work");
        }

        result
    }

    /// Query many codes concurrently.
    pub async fn check_batch(&self, works: &[WorkCode]) -> Vec<CompanionCheck> {
        futures::future::join_all(works.iter().map(|work| self.check(work))).await
    }

    /// Check the work plus every related code from its linkage graph.
    pub async fn check_with_linkage(
        &self,
        work: &WorkCode,
        catalog: &CatalogClient,
        languages: &[String],
    ) -> Vec<CompanionCheck> {
        let mut results = vec![self.check(work).await];

        if !self.enabled() {
            return results;
        }

        match catalog.full_linkage(work, languages).await {
            Ok(graph) => {
                let related: Vec<WorkCode> = graph
                    .keys()
                    .filter(|code| *code != work)
                    .cloned()
                    .collect();
                if !related.is_empty() {
                    debug!(work = %work, related = related.len(), "querying companion for linked works");
                    results.extend(self.check_batch(&related).await);
                }
            }
            Err(err) => {
                warn!(work = %work, "linkage expansion for companion lookup failed: {err}");
            }
        }

        results
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_client() -> CompanionClient {
        CompanionClient::new(&CompanionConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_disabled_client_reports_source() {
        let client = disabled_client();
        let work = WorkCode::parse("RJ123456").unwrap();
        let result = client.check(&work).await;
        assert!(!result.found);
        assert_eq!(result.source, "companion_disabled");
    }

    #[test]
    fn test_search_url_shape() {
        let mut config = CompanionConfig::default();
        config.enabled = true;
        config.server_url = "http://192.168.1.100:8088/".to_string();
        let client = CompanionClient::new(&config).unwrap();

        let work = WorkCode::parse("RJ01011249").unwrap();
        assert_eq!(
            client.search_url(&work),
            "http://192.168.1.100:8088/api/search?page=1&sort=desc&order=release&nsfw=0&keyword=RJ01011249"
        );
    }

    #[test]
    fn test_numeric_match_logic() {
        let body: SearchResponse = serde_json::from_str(
            r#"{"works": [
                {"id": 1011249, "title": "t", "circle": {"name": "c"}, "tags": [{"name": "x"}]},
                {"id": 999, "title": "other"}
            ]}"#,
        )
        .unwrap();
        let wanted = WorkCode::parse("RJ01011249").unwrap().numeric();
        assert!(body.works.iter().any(|w| w.id == wanted));
    }
}

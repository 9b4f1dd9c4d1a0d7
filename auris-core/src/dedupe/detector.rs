use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use auris_model::{ConflictKind, LinkRelation, LinkageEdge, WorkCode};

use crate::catalog::{CatalogClient, LinkedWork};
use crate::companion::{CompanionCheck, CompanionClient};
use crate::db::{LibraryRepo, LinkageRepo};
use crate::error::Result;
use crate::fsutil;

const EDGE_TTL_HOURS: i64 = 24;

/// A shelved work matching the incoming code directly.
#[derive(Debug, Clone)]
pub struct DuplicateHit {
    pub work: WorkCode,
    pub path: String,
    pub size: i64,
    pub file_count: i64,
}

/// A shelved work reachable through the translation-linkage graph.
#[derive(Debug, Clone)]
pub struct LinkedLibraryHit {
    pub work: WorkCode,
    pub relation: LinkRelation,
    pub lang: String,
    pub path: String,
    pub size: i64,
    pub file_count: i64,
    pub work_name: String,
}

/// Combined outcome of the three duplicate checks.
#[derive(Debug, Clone, Default)]
pub struct DuplicateCheckResult {
    pub is_duplicate: bool,
    pub direct: Option<DuplicateHit>,
    pub linked_found: Vec<LinkedLibraryHit>,
    pub kind: Option<ConflictKind>,
    pub related_works: Vec<WorkCode>,
    pub analysis: serde_json::Value,
    /// Companion-server lookup for the incoming code itself.
    pub companion: Option<CompanionCheck>,
    /// Companion hits across the whole linkage graph.
    pub companion_hits: Vec<CompanionCheck>,
}

impl DuplicateCheckResult {
    /// Language of the incoming work according to the linkage analysis.
    pub fn incoming_lang(&self) -> String {
        self.analysis
            .get("current_work")
            .and_then(|w| w.get("lang"))
            .and_then(|l| l.as_str())
            .unwrap_or("JPN")
            .to_string()
    }
}

/// Three-stage duplicate detector over the local library and the
/// companion server.
pub struct DuplicateDetector {
    library: LibraryRepo,
    linkage: LinkageRepo,
    catalog: Arc<CatalogClient>,
    companion: Arc<CompanionClient>,
}

impl std::fmt::Debug for DuplicateDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateDetector").finish_non_exhaustive()
    }
}

impl DuplicateDetector {
    pub fn new(
        library: LibraryRepo,
        linkage: LinkageRepo,
        catalog: Arc<CatalogClient>,
        companion: Arc<CompanionClient>,
    ) -> Self {
        Self {
            library,
            linkage,
            catalog,
            companion,
        }
    }

    /// Direct hit: ledger row with a live path, else a scan of the library
    /// root for a directory carrying the code. Stale ledger rows are purged
    /// on sight.
    pub async fn check_direct(
        &self,
        work: &WorkCode,
        library_root: &Path,
    ) -> Result<Option<DuplicateHit>> {
        if let Some(snapshot) = self.library.get(work).await? {
            if Path::new(&snapshot.folder_path).exists() {
                debug!(work = %work, path = %snapshot.folder_path, "direct hit from ledger");
                return Ok(Some(DuplicateHit {
                    work: work.clone(),
                    path: snapshot.folder_path,
                    size: snapshot.folder_size,
                    file_count: snapshot.file_count,
                }));
            }
            warn!(work = %work, path = %snapshot.folder_path, "purging stale ledger row");
            self.library.delete(work).await?;
        }

        Ok(scan_for_code(library_root, work))
    }

    /// Full check: direct, then linkage graph, then companion server.
    pub async fn check_enhanced(
        &self,
        work: &WorkCode,
        library_root: &Path,
        check_linked: bool,
        languages: &[String],
    ) -> Result<DuplicateCheckResult> {
        let mut result = DuplicateCheckResult {
            related_works: vec![work.clone()],
            ..Default::default()
        };

        if let Some(direct) = self.check_direct(work, library_root).await? {
            info!(work = %work, path = %direct.path, "direct duplicate");
            result.is_duplicate = true;
            result.direct = Some(direct);
            result.kind = Some(ConflictKind::Duplicate);
            return Ok(result);
        }

        if check_linked {
            match self.linkage_graph(work, languages).await {
                Ok(graph) if graph.len() > 1 => {
                    debug!(
                        work = %work,
                        codes = ?graph.keys().map(WorkCode::as_str).collect::<Vec<_>>(),
                        "linkage graph expanded"
                    );
                    let found = self
                        .linked_hits_in_library(&graph, work, library_root)
                        .await?;
                    result.related_works = graph.keys().cloned().collect();
                    result.related_works.sort();

                    if !found.is_empty() {
                        result.is_duplicate = true;
                        result.kind = Some(linked_conflict_kind(&found));
                        result.analysis = analyse(work, &graph, &found);
                        result.linked_found = found;
                        info!(
                            work = %work,
                            kind = result.kind.map(|k| k.as_str()).unwrap_or(""),
                            hits = result.linked_found.len(),
                            "linked-work conflict"
                        );
                    }
                }
                Ok(_) => {}
                Err(err) => warn!(work = %work, "linkage check failed: {err}"),
            }
        }

        if self.companion.enabled() {
            let checks = self
                .companion
                .check_with_linkage(work, &self.catalog, languages)
                .await;
            let primary = checks.iter().find(|c| &c.work == work).cloned();
            let hits: Vec<CompanionCheck> =
                checks.into_iter().filter(|c| c.found).collect();

            if let Some(primary) = &primary
                && primary.found
                && !result.is_duplicate
            {
                result.analysis["in_companion_server"] = json!({
                    "title": primary.title,
                    "circle": primary.circle_name,
                    "tags": primary.tags,
                });
            }
            result.companion = primary;
            result.companion_hits = hits;
        }

        Ok(result)
    }

    /// Linkage graph with read-through persistence: cached edges when
    /// fresh, otherwise a catalog expansion persisted for 24 hours.
    async fn linkage_graph(
        &self,
        work: &WorkCode,
        languages: &[String],
    ) -> Result<HashMap<WorkCode, LinkedWork>> {
        let edges = self.linkage.edges_from(work, Utc::now()).await?;
        if !edges.is_empty() {
            debug!(work = %work, edges = edges.len(), "linkage cache hit");
            let mut graph = HashMap::new();
            for edge in edges {
                graph.insert(
                    edge.linked.clone(),
                    LinkedWork {
                        work: edge.linked,
                        relation: edge.relation,
                        lang: edge.lang,
                    },
                );
            }
            return Ok(graph);
        }

        let graph = self.catalog.full_linkage(work, languages).await?;

        let now = Utc::now();
        let edges: Vec<LinkageEdge> = graph
            .values()
            .map(|linked| LinkageEdge {
                origin: work.clone(),
                linked: linked.work.clone(),
                relation: linked.relation,
                lang: linked.lang.clone(),
                cached_at: now,
                expires_at: now + Duration::hours(EDGE_TTL_HOURS),
            })
            .collect();
        self.linkage.replace_edges(work, &edges).await?;

        Ok(graph)
    }

    async fn linked_hits_in_library(
        &self,
        graph: &HashMap<WorkCode, LinkedWork>,
        exclude: &WorkCode,
        library_root: &Path,
    ) -> Result<Vec<LinkedLibraryHit>> {
        let mut found = Vec::new();

        for (code, linked) in graph {
            if code == exclude {
                continue;
            }
            let Some(hit) = self.check_direct(code, library_root).await? else {
                continue;
            };

            let work_name = self
                .catalog
                .work_title(code)
                .await
                .ok()
                .flatten()
                .unwrap_or_default();

            found.push(LinkedLibraryHit {
                work: code.clone(),
                relation: linked.relation,
                lang: linked.lang.clone(),
                path: hit.path,
                size: hit.size,
                file_count: hit.file_count,
                work_name,
            });
        }

        Ok(found)
    }
}

/// Scan the library root for a directory whose name carries the code.
/// Reserved names (prefixed `_` or `.`) never count.
fn scan_for_code(library_root: &Path, work: &WorkCode) -> Option<DuplicateHit> {
    let mut stack = vec![library_root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('_') || name.starts_with('.') {
                continue;
            }
            if name.contains(work.as_str()) {
                let (size, file_count) = fsutil::dir_stats(&path);
                debug!(work = %work, path = %path.display(), "direct hit from library scan");
                return Some(DuplicateHit {
                    work: work.clone(),
                    path: path.to_string_lossy().to_string(),
                    size,
                    file_count,
                });
            }
            stack.push(path);
        }
    }

    None
}

/// Conflict kind derived from which relations were found shelved.
fn linked_conflict_kind(found: &[LinkedLibraryHit]) -> ConflictKind {
    if found.len() == 1 && found[0].relation == LinkRelation::Original {
        ConflictKind::LinkedOriginal
    } else if found.iter().any(|hit| hit.relation == LinkRelation::Parent) {
        ConflictKind::LinkedTranslation
    } else if found.iter().any(|hit| hit.relation == LinkRelation::Child) {
        ConflictKind::LinkedChild
    } else {
        ConflictKind::LinkedOriginal
    }
}

/// Analysis blob stored on the conflict record: what the incoming work is,
/// which relations exist, language statistics, and the shelved summary.
fn analyse(
    work: &WorkCode,
    graph: &HashMap<WorkCode, LinkedWork>,
    found: &[LinkedLibraryHit],
) -> serde_json::Value {
    let current = graph.get(work);

    let mut lang_stats: HashMap<String, usize> = HashMap::new();
    let mut has_original = false;
    let mut has_parent = false;
    let mut has_child = false;
    for linked in graph.values() {
        match linked.relation {
            LinkRelation::Original => has_original = true,
            LinkRelation::Parent => has_parent = true,
            LinkRelation::Child => has_child = true,
        }
        *lang_stats.entry(linked.lang.clone()).or_insert(0) += 1;
    }

    json!({
        "current_work": {
            "rjcode": work.as_str(),
            "work_type": current.map(|c| c.relation.as_str()).unwrap_or("original"),
            "lang": current.map(|c| c.lang.as_str()).unwrap_or("JPN"),
        },
        "has_original": has_original,
        "has_parent": has_parent,
        "has_child": has_child,
        "has_translation": has_parent || has_child,
        "lang_stats": lang_stats,
        "library_summary": found
            .iter()
            .map(|hit| {
                json!({
                    "rjcode": hit.work.as_str(),
                    "work_type": hit.relation.as_str(),
                    "lang": hit.lang,
                    "work_name": hit.work_name,
                    "path": hit.path,
                })
            })
            .collect::<Vec<_>>(),
    })
}

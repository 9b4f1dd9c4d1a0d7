use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::archive::{ArchiveKind, SevenZip, probe_with_retries};
use crate::error::Result;
use crate::fsutil::unique_path;

fn part_suffix_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.part\d+\.(rar|zip|7z)$").unwrap())
}

fn kind_from_tool_listing(listing: &str) -> Option<ArchiveKind> {
    if listing.contains("Type = 7z") {
        Some(ArchiveKind::SevenZ)
    } else if listing.contains("Type = zip") {
        Some(ArchiveKind::Zip)
    } else if listing.contains("Type = rar") || listing.contains("Type = Rar") {
        Some(ArchiveKind::Rar)
    } else {
        None
    }
}

async fn detect_real_kind(path: &Path, driver: &SevenZip, retries: u32) -> Option<ArchiveKind> {
    if let Some(kind) = probe_with_retries(path, retries).await {
        return Some(kind);
    }

    match driver.list_verbose(path).await {
        Ok(Some(listing)) => kind_from_tool_listing(&listing),
        _ => None,
    }
}

/// Rename a mis-extensioned archive to the extension its contents demand.
///
/// Self-extractors and volume members keep their names; both carry
/// extensions the rest of the pipeline keys on. Returns the path all
/// subsequent stages must use.
pub async fn repair_extension(path: &Path, driver: &SevenZip, retries: u32) -> Result<PathBuf> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if filename.to_lowercase().ends_with(".exe") {
        info!(path = %path.display(), "skipping extension repair for self-extractor");
        return Ok(path.to_path_buf());
    }
    if part_suffix_pattern().is_match(&filename) {
        info!(path = %path.display(), "skipping extension repair for volume member");
        return Ok(path.to_path_buf());
    }

    let Some(kind) = detect_real_kind(path, driver, retries).await else {
        warn!(path = %path.display(), "could not determine archive type");
        return Ok(path.to_path_buf());
    };

    let correct_ext = kind.extension();
    let current_ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if current_ext == correct_ext {
        return Ok(path.to_path_buf());
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let target = unique_path(&parent.join(format!("{stem}.{correct_ext}")));

    std::fs::rename(path, &target)?;
    info!(from = %path.display(), to = %target.display(), "repaired archive extension");
    Ok(target)
}

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::engine::task::IngestTask;
use crate::error::{IngestError, Result};

use super::stability::is_stable_quick;

/// The ordered members of a multi-part archive.
#[derive(Debug, Clone)]
pub struct VolumeSet {
    pub base_name: String,
    pub volumes: Vec<PathBuf>,
}

impl VolumeSet {
    /// The volume handed to the archive tool.
    pub fn first(&self) -> &Path {
        &self.volumes[0]
    }
}

/// Volume naming patterns, most specific first.
fn volume_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (
                Regex::new(r"(?i)\.part(\d+)\.(rar|zip|7z)$").unwrap(),
                "part",
            ),
            (Regex::new(r"(?i)\.z(\d{2})$").unwrap(), "zip_volume"),
            (Regex::new(r"(?i)\.(\d{3})$").unwrap(), "7z_volume"),
            (Regex::new(r"(?i)\.(\d{2})$").unwrap(), "generic"),
        ]
    })
}

fn part_number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.part(\d+)\.").unwrap())
}

fn z_volume_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.z\d{2}$").unwrap())
}

/// Non-first members of a volume set must never start an ingest of their
/// own; only `.part1` (or `.part01`) and the plain `.zip`/`.rar` lead.
pub fn is_non_first_volume(filename: &str) -> bool {
    if let Some(caps) = part_number_pattern().captures(filename) {
        let number: u32 = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(1);
        return number > 1;
    }
    z_volume_pattern().is_match(filename)
}

/// Detect whether `path` leads a multi-volume set and enumerate the
/// siblings. A single matching file is not a set.
pub fn detect_volume_set(path: &Path) -> Option<VolumeSet> {
    let directory = path.parent()?;
    let filename = path.file_name()?.to_string_lossy();

    for (pattern, kind) in volume_patterns() {
        if !pattern.is_match(&filename) {
            continue;
        }
        let base_name = pattern.replace(&filename, "").to_string();

        let mut volumes: Vec<PathBuf> = std::fs::read_dir(directory)
            .ok()?
            .flatten()
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                name.starts_with(&base_name) && pattern.is_match(&name)
            })
            .map(|entry| entry.path())
            .collect();
        volumes.sort();

        if volumes.len() > 1 {
            debug!(
                base = %base_name,
                kind,
                count = volumes.len(),
                "detected multi-volume set"
            );
            return Some(VolumeSet { base_name, volumes });
        }
    }

    None
}

/// Wait until every member of the set exists and holds a steady size.
pub async fn wait_for_complete_set(
    set: &VolumeSet,
    task: &IngestTask,
    max_wait: Duration,
) -> Result<()> {
    let started = Instant::now();
    let check_interval = Duration::from_secs(5);

    while started.elapsed() < max_wait {
        task.checkpoint().await?;

        let mut all_stable = true;
        for volume in &set.volumes {
            if !volume.exists() || !is_stable_quick(volume).await {
                all_stable = false;
                break;
            }
        }

        if all_stable {
            info!(base = %set.base_name, count = set.volumes.len(), "volume set complete");
            return Ok(());
        }

        tokio::time::sleep(check_interval).await;
    }

    Err(IngestError::VolumeIncomplete)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_first_volume_rejection() {
        assert!(!is_non_first_volume("work.part1.rar"));
        assert!(!is_non_first_volume("work.part01.rar"));
        assert!(is_non_first_volume("work.part2.rar"));
        assert!(is_non_first_volume("work.PART3.RAR"));
        assert!(is_non_first_volume("work.z01"));
        assert!(is_non_first_volume("work.z99"));
        assert!(!is_non_first_volume("work.zip"));
        assert!(!is_non_first_volume("work.7z"));
    }

    #[test]
    fn test_detect_part_set() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=3 {
            std::fs::write(dir.path().join(format!("work.part{i}.rar")), b"x").unwrap();
        }

        let set = detect_volume_set(&dir.path().join("work.part1.rar")).unwrap();
        assert_eq!(set.volumes.len(), 3);
        assert_eq!(set.base_name, "work");
        assert!(set.first().to_string_lossy().ends_with("work.part1.rar"));
    }

    #[test]
    fn test_detect_numeric_7z_set() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=2 {
            std::fs::write(dir.path().join(format!("work.7z.{i:03}")), b"x").unwrap();
        }

        let set = detect_volume_set(&dir.path().join("work.7z.001")).unwrap();
        assert_eq!(set.volumes.len(), 2);
    }

    #[test]
    fn test_single_file_is_not_a_set() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("work.part1.rar"), b"x").unwrap();
        assert!(detect_volume_set(&dir.path().join("work.part1.rar")).is_none());
    }

    #[test]
    fn test_plain_archive_is_not_a_set() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("work.zip"), b"x").unwrap();
        assert!(detect_volume_set(&dir.path().join("work.zip")).is_none());
    }
}

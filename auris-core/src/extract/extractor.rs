use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use encoding_rs::SHIFT_JIS;
use regex::Regex;
use tracing::{debug, error, info, warn};

use auris_config::AppConfig;

use crate::archive::{ArchiveEntry, SevenZip, detect_by_magic};
use crate::db::PasswordRepo;
use crate::engine::task::IngestTask;
use crate::error::{IngestError, Result};
use crate::fsutil;

use super::passwords::{gather_candidates, nested_candidates};
use super::repair::repair_extension;
use super::stability::wait_stable;
use super::volume::{detect_volume_set, is_non_first_volume, wait_for_complete_set};

const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z", "tar", "gz", "bz2", "xz"];

fn forbidden_stem_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"|?*]"#).unwrap())
}

/// Output directory stem: archive filename without extension, trimmed and
/// stripped of characters Windows forbids.
pub(crate) fn output_stem(archive: &Path) -> String {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    forbidden_stem_chars()
        .replace_all(stem.trim(), "")
        .to_string()
}

/// Archive extraction engine. One instance serves all workers.
#[derive(Debug, Clone)]
pub struct Extractor {
    driver: SevenZip,
    vault: PasswordRepo,
}

impl Extractor {
    pub fn new(driver: SevenZip, vault: PasswordRepo) -> Self {
        Self { driver, vault }
    }

    /// Run the full state machine for the task's source archive.
    ///
    /// Returns the extraction output directory. On password exhaustion the
    /// partial output is deleted and the error message carries the word
    /// "password" so terminal cleanup can recognise the failure mode.
    pub async fn extract(&self, task: &IngestTask, config: &AppConfig) -> Result<PathBuf> {
        let mut archive_path = task.source_path.clone();
        let processing = &config.processing;

        task.update_progress(5, "等待文件写入完成");
        wait_stable(
            &archive_path,
            task,
            processing.file_stable_checks,
            Duration::from_secs(processing.file_stable_interval),
            Duration::from_secs(processing.max_wait_time),
        )
        .await?;

        task.checkpoint().await?;
        task.update_progress(10, "检测文件类型");
        if config.extract.auto_repair_extension {
            archive_path =
                repair_extension(&archive_path, &self.driver, processing.retry_count).await?;
        }

        if let Some(set) = detect_volume_set(&archive_path) {
            task.update_progress(15, "等待分卷组完整");
            wait_for_complete_set(&set, task, Duration::from_secs(processing.max_wait_time))
                .await?;
            archive_path = set.first().to_path_buf();
        }

        task.checkpoint().await?;
        task.update_progress(20, "读取压缩包内容");
        let Some((entries, _listing_password)) =
            self.read_contents(&archive_path, config).await?
        else {
            return Err(IngestError::PasswordExhausted);
        };
        debug!(
            archive = %archive_path.display(),
            entries = entries.len(),
            "listing readable under candidate password"
        );

        let output_path = config.storage.temp_path.join(output_stem(&archive_path));
        std::fs::create_dir_all(&output_path)?;

        task.checkpoint().await?;
        task.update_progress(30, "开始解压");
        let Some(working_password) = self
            .try_extract(&archive_path, &output_path, task, config)
            .await?
        else {
            task.update_progress(30, "解压失败");
            fsutil::remove_dir_with_retries(&output_path, 3, Duration::from_secs(1)).await;
            return Err(IngestError::PasswordExhausted);
        };
        info!(
            archive = %archive_path.display(),
            "archive extracted (password {})",
            if working_password.is_empty() { "empty" } else { "set" }
        );

        task.checkpoint().await?;
        if config.extract.verify_after_extract {
            task.update_progress(90, "验证解压完整性");
            if let Err(err) = self.verify(&entries, &output_path) {
                fsutil::remove_dir_with_retries(&output_path, 3, Duration::from_secs(1)).await;
                return Err(err);
            }
        }

        if config.extract.extract_nested_archives {
            task.update_progress(95, "检查嵌套压缩包");
            let mut visited = std::collections::HashSet::new();
            let nested = self
                .extract_nested(
                    &output_path,
                    task,
                    config,
                    config.extract.max_nested_depth,
                    0,
                    &mut visited,
                    Some(working_password.as_str()),
                )
                .await?;
            if nested > 0 {
                info!(count = nested, "extracted nested archives");
            }
        } else {
            debug!("nested extraction disabled");
        }

        Ok(output_path)
    }

    /// Find any password under which the listing succeeds. The winner is
    /// not necessarily the one that can extract.
    async fn read_contents(
        &self,
        archive: &Path,
        config: &AppConfig,
    ) -> Result<Option<(Vec<ArchiveEntry>, String)>> {
        let candidates = gather_candidates(archive, &self.vault, &config.extract).await?;

        for password in candidates {
            if let Some(entries) = self.driver.list(archive, &password).await? {
                return Ok(Some((entries, password)));
            }
        }
        Ok(None)
    }

    /// Cycle the candidate list (re-queried, so vault entries added while
    /// the listing ran are picked up) until one password extracts.
    async fn try_extract(
        &self,
        archive: &Path,
        output: &Path,
        task: &IngestTask,
        config: &AppConfig,
    ) -> Result<Option<String>> {
        let candidates = gather_candidates(archive, &self.vault, &config.extract).await?;

        for password in candidates {
            task.checkpoint().await?;
            task.update_progress(40, "尝试解压");

            if self.driver.extract(archive, output, &password).await? {
                if !password.is_empty() {
                    // No-op for passwords outside the vault.
                    self.vault.record_use(&password, chrono::Utc::now()).await?;
                }
                return Ok(Some(password));
            }
        }

        Ok(None)
    }

    /// Compare the extracted tree against the listing.
    ///
    /// Missing files are tolerated with a warning (filesystem encoding
    /// mismatches produce false negatives); size mismatches are fatal.
    /// Directory entries never participate.
    fn verify(&self, entries: &[ArchiveEntry], output: &Path) -> Result<()> {
        let mut missing = Vec::new();
        let mut mismatched = Vec::new();

        for entry in entries {
            if entry.is_dir || entry.name.ends_with('/') {
                continue;
            }

            let mut found = false;
            for candidate in candidate_paths(&entry.name) {
                let path = output.join(&candidate);
                if let Ok(meta) = std::fs::metadata(&path) {
                    found = true;
                    if meta.len() != entry.size {
                        mismatched.push((entry.name.clone(), entry.size, meta.len()));
                    }
                    break;
                }
            }

            if !found {
                missing.push(entry.name.clone());
            }
        }

        if !missing.is_empty() {
            warn!(
                count = missing.len(),
                sample = ?missing.iter().take(5).collect::<Vec<_>>(),
                "listed files not found on disk (possible encoding mismatch)"
            );
        }

        if !mismatched.is_empty() {
            for (name, expected, actual) in mismatched.iter().take(5) {
                error!(name, expected, actual, "size mismatch after extraction");
            }
            return Err(IngestError::IntegrityFailure);
        }

        Ok(())
    }

    /// Walk the output tree and extract any archive found inside it.
    ///
    /// `visited` is keyed by canonicalised path to survive self-referential
    /// archive loops. The working password of each level seeds the
    /// candidate list of the next.
    #[allow(clippy::too_many_arguments)]
    async fn extract_nested(
        &self,
        directory: &Path,
        task: &IngestTask,
        config: &AppConfig,
        max_depth: u32,
        current_depth: u32,
        visited: &mut std::collections::HashSet<PathBuf>,
        outer_password: Option<&str>,
    ) -> Result<u32> {
        if current_depth >= max_depth {
            warn!(max_depth, "nested extraction depth limit reached");
            return Ok(0);
        }

        task.checkpoint().await?;

        let mut extracted = 0u32;
        let files = collect_files(directory);

        for file_path in files {
            task.checkpoint().await?;

            let real_path = file_path.canonicalize().unwrap_or_else(|_| file_path.clone());
            if visited.contains(&real_path) {
                continue;
            }

            if !is_nested_archive(&file_path) {
                continue;
            }

            let filename = file_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if is_non_first_volume(&filename) {
                continue;
            }

            info!(
                file = %filename,
                depth = current_depth + 1,
                "found nested archive"
            );

            let nested_dir = nested_output_dir(&file_path);
            std::fs::create_dir_all(&nested_dir)?;

            task.update_progress(
                95,
                &format!("解压嵌套压缩包 {filename} (层{})", current_depth + 1),
            );

            match self
                .extract_one_nested(&file_path, &nested_dir, config, outer_password)
                .await?
            {
                Some(nested_password) => {
                    extracted += 1;
                    visited.insert(real_path);

                    if let Err(err) = std::fs::remove_file(&file_path) {
                        warn!(file = %file_path.display(), "failed to delete nested archive: {err}");
                    }

                    extracted += Box::pin(self.extract_nested(
                        &nested_dir,
                        task,
                        config,
                        max_depth,
                        current_depth + 1,
                        visited,
                        Some(nested_password.as_str()),
                    ))
                    .await?;
                }
                None => {
                    warn!(file = %filename, "nested archive resisted every password");
                    fsutil::remove_dir_with_retries(&nested_dir, 3, Duration::from_secs(1)).await;
                }
            }
        }

        Ok(extracted)
    }

    /// Try the inherited candidates first; fall back to the vault.
    async fn extract_one_nested(
        &self,
        archive: &Path,
        output: &Path,
        config: &AppConfig,
        outer_password: Option<&str>,
    ) -> Result<Option<String>> {
        let mut candidates = nested_candidates(outer_password, &config.extract);

        for password in &candidates {
            if self.driver.extract(archive, output, password).await? {
                return Ok(Some(password.clone()));
            }
        }

        debug!(archive = %archive.display(), "inherited passwords failed, consulting vault");
        let vault_candidates = gather_candidates(archive, &self.vault, &config.extract).await?;
        for password in vault_candidates {
            if candidates.contains(&password) {
                continue;
            }
            candidates.push(password.clone());
            if self.driver.extract(archive, output, &password).await? {
                if !password.is_empty() {
                    self.vault.record_use(&password, chrono::Utc::now()).await?;
                }
                return Ok(Some(password));
            }
        }

        Ok(None)
    }
}

/// Files (not directories) under `root`, recursively.
fn collect_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }

    files
}

fn is_nested_archive(path: &Path) -> bool {
    let by_extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| ARCHIVE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false);
    by_extension || detect_by_magic(path).is_some()
}

/// Sibling directory named after the nested archive's stem, with `_N`
/// suffixes on collision.
fn nested_output_dir(archive: &Path) -> PathBuf {
    let parent = archive.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let base = parent.join(&stem);
    if !base.exists() {
        return base;
    }
    let mut counter = 1;
    loop {
        let candidate = parent.join(format!("{stem}_{counter}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Candidate on-disk spellings of a listed name: the decoded name itself,
/// a UTF-8 round trip, and a Shift-JIS round trip. Tool builds and
/// filesystems disagree about legacy encodings often enough that any of
/// the three may be the one that exists.
fn candidate_paths(name: &str) -> Vec<String> {
    let mut candidates = vec![name.to_string()];

    let utf8_round_trip = String::from_utf8_lossy(name.as_bytes()).to_string();
    if !candidates.contains(&utf8_round_trip) {
        candidates.push(utf8_round_trip);
    }

    let (encoded, _, _) = SHIFT_JIS.encode(name);
    let (decoded, _, _) = SHIFT_JIS.decode(&encoded);
    let sjis_round_trip = decoded.into_owned();
    if !candidates.contains(&sjis_round_trip) {
        candidates.push(sjis_round_trip);
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_stem_sanitising() {
        assert_eq!(output_stem(Path::new("/input/RJ123456.zip")), "RJ123456");
        assert_eq!(
            output_stem(Path::new("/input/ work: \"best\"?.zip")),
            "work best"
        );
    }

    #[test]
    fn test_nested_output_dir_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("inner.zip");
        std::fs::write(&archive, b"x").unwrap();

        assert_eq!(nested_output_dir(&archive), dir.path().join("inner"));

        std::fs::create_dir(dir.path().join("inner")).unwrap();
        assert_eq!(nested_output_dir(&archive), dir.path().join("inner_1"));

        std::fs::create_dir(dir.path().join("inner_1")).unwrap();
        assert_eq!(nested_output_dir(&archive), dir.path().join("inner_2"));
    }

    #[test]
    fn test_candidate_paths_include_raw_name() {
        let candidates = candidate_paths("voice/トラック01.wav");
        assert_eq!(candidates[0], "voice/トラック01.wav");
        assert!(!candidates.is_empty());
    }

    #[test]
    fn test_is_nested_archive() {
        let dir = tempfile::tempdir().unwrap();

        let by_ext = dir.path().join("inner.rar");
        std::fs::write(&by_ext, b"not actually rar").unwrap();
        assert!(is_nested_archive(&by_ext));

        let by_magic = dir.path().join("mystery.bin");
        std::fs::write(&by_magic, b"PK\x03\x04content").unwrap();
        assert!(is_nested_archive(&by_magic));

        let plain = dir.path().join("track.wav");
        std::fs::write(&plain, b"RIFFdata").unwrap();
        assert!(!is_nested_archive(&plain));
    }

    #[tokio::test]
    async fn test_verify_tolerates_missing_fails_on_size() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.wav"), vec![0u8; 10]).unwrap();
        std::fs::write(dir.path().join("short.wav"), vec![0u8; 3]).unwrap();

        let db = crate::db::Database::open_in_memory().await.unwrap();
        let extractor = Extractor::new(SevenZip::new("7z"), db.passwords());

        let ok = vec![
            ArchiveEntry {
                name: "ok.wav".to_string(),
                size: 10,
                is_dir: false,
            },
            ArchiveEntry {
                name: "gone.wav".to_string(),
                size: 99,
                is_dir: false,
            },
            ArchiveEntry {
                name: "somedir".to_string(),
                size: 0,
                is_dir: true,
            },
        ];
        assert!(extractor.verify(&ok, dir.path()).is_ok());

        let bad = vec![ArchiveEntry {
            name: "short.wav".to_string(),
            size: 10,
            is_dir: false,
        }];
        assert!(matches!(
            extractor.verify(&bad, dir.path()),
            Err(IngestError::IntegrityFailure)
        ));
    }
}

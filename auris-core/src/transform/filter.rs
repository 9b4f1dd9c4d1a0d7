use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::RegexBuilder;
use tracing::{debug, error, info};

use auris_config::{FilterConfig, FilterRule};

const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "m4a", "ogg", "wma", "aac"];

/// What a filter pass removed.
#[derive(Debug, Default, Clone)]
pub struct FilterOutcome {
    pub files_removed: Vec<String>,
    pub dirs_removed: Vec<String>,
}

struct CompiledRule {
    name: String,
    regex: regex::Regex,
    matches_files: bool,
    matches_folders: bool,
}

fn compile_rules(rules: &[FilterRule]) -> Vec<CompiledRule> {
    rules
        .iter()
        .filter(|rule| rule.enabled)
        .filter_map(|rule| {
            match RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .build()
            {
                Ok(regex) => Some(CompiledRule {
                    name: rule.name.clone(),
                    regex,
                    matches_files: rule.target.matches_files(),
                    matches_folders: rule.target.matches_folders(),
                }),
                Err(err) => {
                    error!(rule = %rule.name, pattern = %rule.pattern, "invalid filter pattern: {err}");
                    None
                }
            }
        })
        .collect()
}

/// Count audio files per extension under `root`.
fn audio_format_tally(root: &Path) -> HashMap<String, usize> {
    let mut tally = HashMap::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Some(ext) = path.extension() {
                let ext = ext.to_string_lossy().to_lowercase();
                if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
                    *tally.entry(ext).or_insert(0) += 1;
                }
            }
        }
    }

    tally
}

/// When the tree holds nothing but MP3 audio, rules that target MP3 files
/// would empty it; disable them for this pass.
fn drop_mp3_rules(rules: Vec<FilterRule>) -> Vec<FilterRule> {
    rules
        .into_iter()
        .map(|mut rule| {
            if rule.enabled
                && rule.target.matches_files()
                && rule.pattern.to_lowercase().contains("mp3")
            {
                info!(rule = %rule.name, "only MP3 audio present, disabling MP3 rule for this pass");
                rule.enabled = false;
            }
            rule
        })
        .collect()
}

fn walk_bottom_up(root: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path.clone());
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }

    // Deepest entries first so directory deletion sees final contents.
    dirs.reverse();
    (files, dirs)
}

/// Apply the delete-on-match rule set to a directory tree.
///
/// Rules match basenames only, case-insensitively. Files are filtered
/// before folders; a folder match deletes the whole subtree.
pub fn apply_filters(root: &Path, config: &FilterConfig) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();

    if !config.enabled {
        debug!("filtering disabled");
        return outcome;
    }

    let mut rules = if config.rules.is_empty() {
        FilterConfig::default_rules()
    } else {
        config.rules.clone()
    };

    let tally = audio_format_tally(root);
    debug!(?tally, "audio format distribution");
    if tally.len() == 1 && tally.contains_key("mp3") {
        rules = drop_mp3_rules(rules);
    }

    let compiled = compile_rules(&rules);
    let (files, dirs) = walk_bottom_up(root);

    for file in files {
        let Some(name) = file.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        if let Some(rule) = compiled
            .iter()
            .find(|rule| rule.matches_files && rule.regex.is_match(&name))
        {
            match std::fs::remove_file(&file) {
                Ok(()) => {
                    info!(file = %name, rule = %rule.name, "filtered file");
                    outcome.files_removed.push(name);
                }
                Err(err) => error!(file = %file.display(), "failed to delete: {err}"),
            }
        }
    }

    if config.filter_dir {
        for dir in dirs {
            if !dir.exists() {
                continue;
            }
            let Some(name) = dir.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            if let Some(rule) = compiled
                .iter()
                .find(|rule| rule.matches_folders && rule.regex.is_match(&name))
            {
                match std::fs::remove_dir_all(&dir) {
                    Ok(()) => {
                        info!(dir = %name, rule = %rule.name, "filtered directory");
                        outcome.dirs_removed.push(name);
                    }
                    Err(err) => error!(dir = %dir.display(), "failed to delete: {err}"),
                }
            }
        }
    }

    info!(
        files = outcome.files_removed.len(),
        dirs = outcome.dirs_removed.len(),
        "filter pass complete"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use auris_config::FilterTarget;

    fn write(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    fn config_with(rules: Vec<FilterRule>) -> FilterConfig {
        FilterConfig {
            enabled: true,
            filter_dir: true,
            rules,
        }
    }

    #[test]
    fn test_file_rule_matches_basename_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "voice/SEなしCUT track.WAV");
        write(dir.path(), "voice/track.wav");

        let config = config_with(vec![FilterRule::new(
            "drop-se-less",
            r"(?:SE|音|音效)(?:[な無]し|CUT).*\.WAV$",
            FilterTarget::File,
            true,
        )]);

        let outcome = apply_filters(dir.path(), &config);
        assert_eq!(outcome.files_removed.len(), 1);
        assert!(!dir.path().join("voice/SEなしCUT track.WAV").exists());
        assert!(dir.path().join("voice/track.wav").exists());
    }

    #[test]
    fn test_folder_rule_removes_subtree() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "mp3版/track.mp3");
        write(dir.path(), "wav/track.wav");

        let config = config_with(vec![FilterRule::new(
            "drop-mp3-dir",
            r"^mp3版$",
            FilterTarget::Folder,
            true,
        )]);

        let outcome = apply_filters(dir.path(), &config);
        assert_eq!(outcome.dirs_removed, vec!["mp3版".to_string()]);
        assert!(!dir.path().join("mp3版").exists());
        assert!(dir.path().join("wav/track.wav").exists());
    }

    #[test]
    fn test_mp3_rule_disabled_when_only_mp3() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.mp3");
        write(dir.path(), "b.mp3");

        let config = config_with(vec![FilterRule::new(
            "drop-mp3",
            r"\.mp3$",
            FilterTarget::File,
            true,
        )]);

        let outcome = apply_filters(dir.path(), &config);
        assert!(outcome.files_removed.is_empty());
        assert!(dir.path().join("a.mp3").exists());
    }

    #[test]
    fn test_mp3_rule_active_when_other_audio_present() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.mp3");
        write(dir.path(), "a.wav");

        let config = config_with(vec![FilterRule::new(
            "drop-mp3",
            r"\.mp3$",
            FilterTarget::File,
            true,
        )]);

        let outcome = apply_filters(dir.path(), &config);
        assert_eq!(outcome.files_removed, vec!["a.mp3".to_string()]);
        assert!(dir.path().join("a.wav").exists());
    }

    #[test]
    fn test_disabled_rules_and_disabled_config() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.mp3");

        let mut config = config_with(vec![FilterRule::new(
            "drop-mp3",
            r"\.mp3$",
            FilterTarget::File,
            false,
        )]);
        assert!(apply_filters(dir.path(), &config).files_removed.is_empty());

        config.enabled = false;
        assert!(apply_filters(dir.path(), &config).files_removed.is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.wav");

        let config = config_with(vec![FilterRule::new(
            "broken",
            r"([unclosed",
            FilterTarget::File,
            true,
        )]);
        let outcome = apply_filters(dir.path(), &config);
        assert!(outcome.files_removed.is_empty());
        assert!(dir.path().join("a.wav").exists());
    }
}

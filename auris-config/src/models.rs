use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Storage roots the pipeline moves files between.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Watched drop directory for incoming archives.
    pub input_path: PathBuf,
    /// Extraction scratch; each job gets `temp/<stem>`.
    pub temp_path: PathBuf,
    /// Final library root. `_conflicts/` underneath is the quarantine.
    pub library_path: PathBuf,
    /// Pool of already-ingested source archives.
    pub processed_archives_path: PathBuf,
    /// Staging area for folders ingested via the existing-folder flow.
    pub existing_folders_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("/input"),
            temp_path: PathBuf::from("/temp"),
            library_path: PathBuf::from("/library"),
            processed_archives_path: PathBuf::from("/processed"),
            existing_folders_path: PathBuf::from("/existing"),
        }
    }
}

/// Worker counts and file-stability tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Upper bound on concurrently running ingest workers.
    pub max_concurrent: usize,
    /// Retries for transient I/O (magic probe, type detection).
    pub retry_count: u32,
    /// Consecutive equal size readings required before a file counts as
    /// fully copied.
    pub file_stable_checks: u32,
    /// Seconds between size readings.
    pub file_stable_interval: u64,
    /// Overall cap in seconds on any stability or volume-set wait.
    pub max_wait_time: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            retry_count: 3,
            file_stable_checks: 3,
            file_stable_interval: 2,
            max_wait_time: 3600,
        }
    }
}

/// Input watcher behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub enabled: bool,
    /// Seconds between periodic rescans of the input tree. Event APIs miss
    /// changes on network mounts; the sweep catches what they drop.
    pub scan_interval: u64,
    /// Submit detected archives automatically.
    pub auto_start: bool,
    /// Submitted tasks run the classifier at the end of the pipeline.
    pub auto_classify: bool,
    /// Remove the input file after a successful ingest that did not archive
    /// it. Normally a no-op because archival moves the file first.
    pub delete_after_process: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval: 30,
            auto_start: true,
            auto_classify: true,
            delete_after_process: false,
        }
    }
}

/// Archive-tool and extraction behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Path to a 7z-compatible binary; bare `7z` means "find it on PATH".
    pub seven_zip_path: String,
    /// Rename mis-extensioned archives to their magic-byte type.
    pub auto_repair_extension: bool,
    /// Compare extracted files against the listing after extraction.
    pub verify_after_extract: bool,
    /// Default passwords tried after the vault candidates.
    pub password_list: Vec<String>,
    /// Recurse into archives found inside the extracted tree.
    pub extract_nested_archives: bool,
    /// Recursion bound for nested extraction.
    pub max_nested_depth: u32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            seven_zip_path: "7z".to_string(),
            auto_repair_extension: true,
            verify_after_extract: true,
            password_list: Vec::new(),
            extract_nested_archives: true,
            max_nested_depth: 5,
        }
    }
}

/// What a filter rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterTarget {
    File,
    Folder,
    All,
}

impl FilterTarget {
    pub fn matches_files(&self) -> bool {
        matches!(self, FilterTarget::File | FilterTarget::All)
    }

    pub fn matches_folders(&self) -> bool {
        matches!(self, FilterTarget::Folder | FilterTarget::All)
    }
}

/// A single delete-on-match rule applied to basenames.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterRule {
    pub name: String,
    /// Case-insensitive regex matched against the basename only.
    pub pattern: String,
    #[serde(default = "FilterRule::default_target")]
    pub target: FilterTarget,
    #[serde(default = "FilterRule::default_enabled")]
    pub enabled: bool,
}

impl FilterRule {
    fn default_target() -> FilterTarget {
        FilterTarget::File
    }

    fn default_enabled() -> bool {
        true
    }

    pub fn new(name: &str, pattern: &str, target: FilterTarget, enabled: bool) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            target,
            enabled,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    /// Also evaluate folder-targeted rules.
    pub filter_dir: bool,
    pub rules: Vec<FilterRule>,
}

impl FilterConfig {
    /// Rules applied when none are configured.
    pub fn default_rules() -> Vec<FilterRule> {
        vec![
            FilterRule::new(
                "过滤无SE的WAV文件",
                r"(?:SE|音|音效)(?:[な無]し|CUT).*\.WAV$",
                FilterTarget::File,
                true,
            ),
            FilterRule::new("过滤MP3文件", r"\.mp3$", FilterTarget::File, false),
        ]
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filter_dir: true,
            rules: Self::default_rules(),
        }
    }
}

/// Catalog lookups.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Locale sent with every product request.
    pub locale: String,
    pub connect_timeout: u64,
    pub read_timeout: u64,
    /// Polite delay in seconds before each catalog request.
    pub sleep_interval: u64,
    pub http_proxy: Option<String>,
    /// Consult and populate the 30-day metadata cache.
    pub cache_enabled: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            locale: "zh_cn".to_string(),
            connect_timeout: 10,
            read_timeout: 10,
            sleep_interval: 3,
            http_proxy: None,
            cache_enabled: true,
        }
    }
}

/// Directory-name compilation after metadata resolution.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenameConfig {
    /// Tokens: `{rjcode}`, `{work_name}`, `{maker_id}`, `{maker_name}`,
    /// `{release_date}`, `{cvs}`, `{tags}`.
    pub template: String,
    /// strftime-style format applied to `{release_date}`.
    pub date_format: String,
    /// Joiner for CV and tag lists.
    pub delimiter: String,
    pub cv_list_left: String,
    pub cv_list_right: String,
    /// Strip `【...】` segments from the compiled name.
    pub exclude_square_brackets: bool,
    /// Replace reserved characters with full-width forms instead of
    /// stripping them.
    pub illegal_char_to_full_width: bool,
    pub tags_max_number: usize,
    pub flatten_single_subfolder: bool,
    /// How many consecutive single-subfolder levels may collapse per branch.
    pub flatten_depth: u32,
    pub remove_empty_folders: bool,
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            template: "{rjcode} {work_name}".to_string(),
            date_format: "%y%m%d".to_string(),
            delimiter: " ".to_string(),
            cv_list_left: "(CV ".to_string(),
            cv_list_right: ")".to_string(),
            exclude_square_brackets: false,
            illegal_char_to_full_width: false,
            tags_max_number: 5,
            flatten_single_subfolder: true,
            flatten_depth: 3,
            remove_empty_folders: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationKind {
    None,
    Maker,
    Series,
    Rjcode,
    Date,
}

/// One entry of the ordered classification rule list. The first enabled
/// rule that produces a path wins; an empty path means the library root.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassificationRule {
    #[serde(rename = "type")]
    pub kind: ClassificationKind,
    #[serde(default = "ClassificationRule::default_enabled")]
    pub enabled: bool,
    /// Template with `{maker_name}` / `{series_name}` / `{year}` / `{month}`
    /// depending on the rule kind. Empty means the kind's default template.
    #[serde(default)]
    pub path_template: String,
    /// Fixed directory name for `rjcode` rules.
    #[serde(default)]
    pub custom_name: Option<String>,
    /// Rule kind to fall through to when a `series` rule has no series.
    #[serde(default)]
    pub fallback: Option<ClassificationKind>,
    /// Inclusive code range for `rjcode` rules, e.g. `RJ01400000-RJ01499999`.
    #[serde(default)]
    pub rjcode_range: Option<String>,
}

impl ClassificationRule {
    fn default_enabled() -> bool {
        true
    }

    pub fn none() -> Self {
        Self {
            kind: ClassificationKind::None,
            enabled: true,
            path_template: String::new(),
            custom_name: None,
            fallback: None,
            rjcode_range: None,
        }
    }
}

/// Password-vault sweeper policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PasswordSweepConfig {
    pub enabled: bool,
    /// Entries used at most this many times are eligible.
    pub max_use_count: i64,
    pub cron_expression: String,
    /// Entries younger than this many days are kept regardless.
    pub preserve_days: i64,
    /// Password sources never swept, e.g. `manual`.
    pub exclude_sources: Vec<String>,
}

impl Default for PasswordSweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_use_count: 1,
            cron_expression: "0 0 * * 0".to_string(),
            preserve_days: 30,
            exclude_sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveSweepStrategy {
    Age,
    Count,
    Size,
}

/// Archived-source sweeper policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchiveSweepConfig {
    pub enabled: bool,
    pub cron_expression: String,
    pub strategy: ArchiveSweepStrategy,
    /// `age` strategy: delete entries processed longer ago than this.
    pub preserve_days: i64,
    /// `count` strategy: keep at most this many entries.
    pub max_count: usize,
    /// `size` strategy: keep total pool size under this many GiB.
    pub max_size_gb: f64,
    /// Skip entries currently being reprocessed.
    pub exclude_reprocessing: bool,
}

impl Default for ArchiveSweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron_expression: "0 1 * * 0".to_string(),
            strategy: ArchiveSweepStrategy::Age,
            preserve_days: 30,
            max_count: 1000,
            max_size_gb: 50.0,
            exclude_reprocessing: true,
        }
    }
}

/// External companion library server used for duplicate lookups.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub enabled: bool,
    /// Base URL, e.g. `http://192.168.1.100:8088`.
    pub server_url: String,
    /// Bearer token; empty means unauthenticated requests.
    pub api_token: String,
    /// Total request timeout in seconds.
    pub timeout: u64,
    /// Per-code result cache TTL in seconds.
    pub cache_ttl: u64,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: String::new(),
            api_token: String::new(),
            timeout: 10,
            cache_ttl: 300,
        }
    }
}

/// Complete daemon configuration snapshot.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub processing: ProcessingConfig,
    pub watcher: WatcherConfig,
    pub extract: ExtractConfig,
    pub filter: FilterConfig,
    pub metadata: MetadataConfig,
    pub rename: RenameConfig,
    pub classification: Vec<ClassificationRule>,
    pub password_cleanup: PasswordSweepConfig,
    pub processed_archive_cleanup: ArchiveSweepConfig,
    pub companion_server: CompanionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            processing: ProcessingConfig::default(),
            watcher: WatcherConfig::default(),
            extract: ExtractConfig::default(),
            filter: FilterConfig::default(),
            metadata: MetadataConfig::default(),
            rename: RenameConfig::default(),
            classification: vec![ClassificationRule::none()],
            password_cleanup: PasswordSweepConfig::default(),
            processed_archive_cleanup: ArchiveSweepConfig::default(),
            companion_server: CompanionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.processing.max_concurrent, 2);
        assert_eq!(config.rename.flatten_depth, 3);
        assert_eq!(config.extract.max_nested_depth, 5);
        assert_eq!(config.classification.len(), 1);
        assert_eq!(config.classification[0].kind, ClassificationKind::None);
        assert_eq!(config.password_cleanup.cron_expression, "0 0 * * 0");
        assert_eq!(config.processed_archive_cleanup.cron_expression, "0 1 * * 0");
    }

    #[test]
    fn test_partial_yaml_fills_from_defaults() {
        let yaml = r#"
storage:
  input_path: /data/in
processing:
  max_concurrent: 4
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage.input_path, PathBuf::from("/data/in"));
        assert_eq!(config.storage.temp_path, PathBuf::from("/temp"));
        assert_eq!(config.processing.max_concurrent, 4);
        assert_eq!(config.processing.file_stable_checks, 3);
    }

    #[test]
    fn test_filter_rule_targets() {
        assert!(FilterTarget::All.matches_files());
        assert!(FilterTarget::All.matches_folders());
        assert!(FilterTarget::File.matches_files());
        assert!(!FilterTarget::File.matches_folders());
        assert!(!FilterTarget::Folder.matches_files());
    }

    #[test]
    fn test_classification_rule_yaml() {
        let yaml = r#"
- type: series
  fallback: maker
- type: rjcode
  rjcode_range: "RJ01400000-RJ01499999"
  custom_name: new-era
- type: none
"#;
        let rules: Vec<ClassificationRule> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].kind, ClassificationKind::Series);
        assert_eq!(rules[0].fallback, Some(ClassificationKind::Maker));
        assert_eq!(rules[1].custom_name.as_deref(), Some("new-era"));
        assert!(rules[2].enabled);
    }
}

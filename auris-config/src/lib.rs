//! Configuration for the Auris ingest daemon.
//!
//! The whole configuration is one immutable [`AppConfig`] snapshot loaded
//! from a YAML file. Components never read the file themselves; the daemon
//! loads once at startup and hands out `Arc<AppConfig>` clones. A
//! [`ConfigHandle`] supports swap-on-reload: the dispatcher re-reads the
//! handle per task, so a running task keeps the snapshot it started with.

pub mod handle;
pub mod loader;
pub mod models;

pub use handle::ConfigHandle;
pub use loader::{ConfigError, load_config};
pub use models::{
    AppConfig, ArchiveSweepConfig, ArchiveSweepStrategy, ClassificationRule, ClassificationKind,
    CompanionConfig, ExtractConfig, FilterConfig, FilterRule, FilterTarget, MetadataConfig,
    PasswordSweepConfig, ProcessingConfig, RenameConfig, StorageConfig, WatcherConfig,
};

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::models::AppConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Resolve the config file location: `CONFIG_PATH` wins, otherwise
/// `./config/config.yaml` relative to the working directory.
pub fn default_config_path() -> PathBuf {
    match env::var("CONFIG_PATH") {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from("./config/config.yaml"),
    }
}

/// Load the configuration snapshot.
///
/// A missing file is not an error: the daemon starts on full defaults so a
/// fresh deployment works before anyone writes a config. Malformed YAML is
/// an error; silently falling back would mask operator typos.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    if !path.exists() {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    let config: AppConfig =
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

    info!(
        path = %path.display(),
        classification_rules = config.classification.len(),
        "configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.processing.max_concurrent, 2);
    }

    #[test]
    fn test_loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "watcher:\n  scan_interval: 90").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.watcher.scan_interval, 90);
        assert!(config.watcher.enabled);
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "watcher: [not a map").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkCodeError {
    #[error("not a valid work code: {0}")]
    Invalid(String),

    #[error("no work code found in path: {0}")]
    NotFound(String),
}

/// Canonical catalog id of a work, e.g. `RJ123456` or `VJ01234567`.
///
/// Always stored upper case. The numeric part is either six or eight digits;
/// a trailing ninth digit disqualifies the match so `RJ123456789` is never
/// truncated into a shorter code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkCode(String);

fn exact_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[RVB]J(\d{6}|\d{8})$").unwrap())
}

fn search_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)[RVB]J(\d{8}|\d{6})(\d)?").unwrap())
}

impl WorkCode {
    /// Parse an exact work code, normalising case.
    pub fn parse(raw: &str) -> Result<Self, WorkCodeError> {
        let upper = raw.trim().to_uppercase();
        if exact_pattern().is_match(&upper) {
            Ok(Self(upper))
        } else {
            Err(WorkCodeError::Invalid(raw.to_string()))
        }
    }

    /// Find the first work code embedded in an arbitrary string.
    ///
    /// Matches are case-insensitive and rejected when followed by another
    /// digit, mirroring the catalog's own id grammar.
    pub fn find_in(text: &str) -> Option<Self> {
        for caps in search_pattern().captures_iter(text) {
            // A trailing digit means the numeric run is longer than the code
            // grammar allows; skip this candidate.
            if caps.get(2).is_some() {
                continue;
            }
            return Some(Self(caps.get(0).unwrap().as_str().to_uppercase()));
        }
        None
    }

    /// Find the first work code in a filesystem path.
    pub fn find_in_path(path: &Path) -> Option<Self> {
        Self::find_in(&path.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-letter prefix (`RJ`, `VJ`, `BJ`).
    pub fn prefix(&self) -> &str {
        &self.0[..2]
    }

    /// Numeric suffix as an integer, e.g. `RJ01011249` -> `1011249`.
    ///
    /// This is the id form used by the companion server.
    pub fn numeric(&self) -> u64 {
        self.0[2..].parse().unwrap_or(0)
    }
}

impl fmt::Display for WorkCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorkCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_codes() {
        assert_eq!(WorkCode::parse("RJ123456").unwrap().as_str(), "RJ123456");
        assert_eq!(WorkCode::parse("rj123456").unwrap().as_str(), "RJ123456");
        assert_eq!(
            WorkCode::parse("VJ12345678").unwrap().as_str(),
            "VJ12345678"
        );
        assert_eq!(WorkCode::parse("BJ654321").unwrap().as_str(), "BJ654321");
    }

    #[test]
    fn test_parse_rejects_wrong_lengths() {
        assert!(WorkCode::parse("RJ12345").is_err());
        assert!(WorkCode::parse("RJ1234567").is_err());
        assert!(WorkCode::parse("RJ123456789").is_err());
        assert!(WorkCode::parse("XJ123456").is_err());
        assert!(WorkCode::parse("").is_err());
    }

    #[test]
    fn test_find_in_path() {
        let found = WorkCode::find_in_path(Path::new("/input/RJ01234567.zip")).unwrap();
        assert_eq!(found.as_str(), "RJ01234567");

        let found = WorkCode::find_in("some [rj123456] work name").unwrap();
        assert_eq!(found.as_str(), "RJ123456");

        // Nine digits is not a valid code and must not be shortened.
        assert!(WorkCode::find_in("RJ123456789.zip").is_none());
        assert!(WorkCode::find_in("plain-folder").is_none());
    }

    #[test]
    fn test_numeric_suffix() {
        assert_eq!(WorkCode::parse("RJ01011249").unwrap().numeric(), 1_011_249);
        assert_eq!(WorkCode::parse("RJ123456").unwrap().numeric(), 123_456);
        assert_eq!(WorkCode::parse("RJ123456").unwrap().prefix(), "RJ");
    }
}

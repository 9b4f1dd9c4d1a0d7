use std::path::Path;

use tracing::debug;

use crate::archive::detect_by_magic;
use crate::extract::is_non_first_volume;

const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "exe"];

/// Keywords that qualify an `.exe` as a self-extracting archive.
const SELF_EXTRACT_KEYWORDS: &[&str] = &[
    "rar",
    "zip",
    "7z",
    "archive",
    "setup",
    "install",
    "self-extract",
];

/// Should the watcher treat this path as an ingestable archive?
///
/// Known extensions qualify directly (with a keyword whitelist for `.exe`
/// self-extractors); unknown extensions fall back to a magic-byte probe.
/// Non-first members of a volume set never qualify.
pub fn is_archive_candidate(path: &Path) -> bool {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if is_non_first_volume(&filename) {
        debug!(file = %filename, "skipping non-first volume member");
        return false;
    }

    if ARCHIVE_EXTENSIONS.contains(&extension.as_str()) {
        if extension == "exe" {
            return SELF_EXTRACT_KEYWORDS
                .iter()
                .any(|keyword| filename.contains(keyword));
        }
        return true;
    }

    detect_by_magic(path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_known_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.zip", "b.rar", "c.7z", "d.tar", "e.gz"] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"irrelevant").unwrap();
            assert!(is_archive_candidate(&path), "{name} should qualify");
        }
    }

    #[test]
    fn test_exe_needs_keyword() {
        let dir = tempfile::tempdir().unwrap();

        let setup = dir.path().join("work-setup.exe");
        std::fs::write(&setup, b"MZ").unwrap();
        assert!(is_archive_candidate(&setup));

        let game = dir.path().join("game.exe");
        std::fs::write(&game, b"MZ").unwrap();
        assert!(!is_archive_candidate(&game));
    }

    #[test]
    fn test_volume_members_rejected() {
        // Extension checks alone; the files need not exist.
        assert!(!is_archive_candidate(&PathBuf::from("work.part2.rar")));
        assert!(!is_archive_candidate(&PathBuf::from("work.z01")));
    }

    #[test]
    fn test_first_volume_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("work.part1.rar");
        std::fs::write(&first, b"Rar!").unwrap();
        assert!(is_archive_candidate(&first));
    }

    #[test]
    fn test_magic_probe_fallback() {
        let dir = tempfile::tempdir().unwrap();

        let disguised = dir.path().join("work.dat");
        std::fs::write(&disguised, b"PK\x03\x04archive-data").unwrap();
        assert!(is_archive_candidate(&disguised));

        let plain = dir.path().join("notes.txt");
        std::fs::write(&plain, b"just text").unwrap();
        assert!(!is_archive_candidate(&plain));
    }
}

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use tracing::{error, warn};

/// Archive container formats recognised by the magic-byte probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Rar,
    SevenZ,
    Gzip,
    Bzip2,
    Xz,
}

impl ArchiveKind {
    /// Canonical file extension for the format.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::Rar => "rar",
            ArchiveKind::SevenZ => "7z",
            ArchiveKind::Gzip => "gz",
            ArchiveKind::Bzip2 => "bz2",
            ArchiveKind::Xz => "xz",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "zip" => Some(ArchiveKind::Zip),
            "rar" => Some(ArchiveKind::Rar),
            "7z" => Some(ArchiveKind::SevenZ),
            "gz" => Some(ArchiveKind::Gzip),
            "bz2" => Some(ArchiveKind::Bzip2),
            "xz" => Some(ArchiveKind::Xz),
            _ => None,
        }
    }
}

/// Known archive signatures in the first eight bytes.
const SIGNATURES: &[(&[u8], ArchiveKind)] = &[
    (b"PK\x03\x04", ArchiveKind::Zip),
    (b"PK\x05\x06", ArchiveKind::Zip), // empty zip
    (b"PK\x07\x08", ArchiveKind::Zip), // zip64
    (b"Rar!", ArchiveKind::Rar),
    (b"7z\xBC\xAF\x27\x1C", ArchiveKind::SevenZ),
    (b"\x1f\x8b", ArchiveKind::Gzip),
    (b"BZh", ArchiveKind::Bzip2),
    (b"\xFD7zXZ", ArchiveKind::Xz),
];

/// Probe the first eight bytes of a file for an archive signature.
pub fn detect_by_magic(path: &Path) -> Option<ArchiveKind> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut header = [0u8; 8];
    let read = file.read(&mut header).ok()?;
    if read < 4 {
        return None;
    }

    SIGNATURES
        .iter()
        .find(|(magic, _)| header[..read].starts_with(magic))
        .map(|(_, kind)| *kind)
}

/// Magic probe with retries for files a copy job may still hold locked.
pub async fn probe_with_retries(path: &Path, attempts: u32) -> Option<ArchiveKind> {
    for attempt in 1..=attempts {
        match std::fs::File::open(path) {
            Ok(mut file) => {
                let mut header = [0u8; 8];
                match file.read(&mut header) {
                    Ok(read) if read >= 4 => {
                        return SIGNATURES
                            .iter()
                            .find(|(magic, _)| header[..read].starts_with(magic))
                            .map(|(_, kind)| *kind);
                    }
                    Ok(_) => return None,
                    Err(err) => {
                        error!(path = %path.display(), "magic probe read failed: {err}");
                        return None;
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                if attempt < attempts {
                    warn!(
                        path = %path.display(),
                        attempt,
                        "file locked during magic probe, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(2)).await;
                } else {
                    error!(path = %path.display(), "file stayed locked, giving up probe");
                }
            }
            Err(_) => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_detects_known_signatures() {
        let dir = tempfile::tempdir().unwrap();

        let zip = write_file(dir.path(), "a.bin", b"PK\x03\x04rest-of-file");
        assert_eq!(detect_by_magic(&zip), Some(ArchiveKind::Zip));

        let rar = write_file(dir.path(), "b.bin", b"Rar!\x1a\x07\x01\x00");
        assert_eq!(detect_by_magic(&rar), Some(ArchiveKind::Rar));

        let seven = write_file(dir.path(), "c.bin", b"7z\xBC\xAF\x27\x1C\x00\x04");
        assert_eq!(detect_by_magic(&seven), Some(ArchiveKind::SevenZ));

        let plain = write_file(dir.path(), "d.bin", b"hello world");
        assert_eq!(detect_by_magic(&plain), None);
    }

    #[test]
    fn test_too_short_file_is_not_an_archive() {
        let dir = tempfile::tempdir().unwrap();
        let tiny = write_file(dir.path(), "t.bin", b"PK");
        assert_eq!(detect_by_magic(&tiny), None);
    }

    #[test]
    fn test_extension_round_trip() {
        for kind in [
            ArchiveKind::Zip,
            ArchiveKind::Rar,
            ArchiveKind::SevenZ,
            ArchiveKind::Gzip,
            ArchiveKind::Bzip2,
            ArchiveKind::Xz,
        ] {
            assert_eq!(ArchiveKind::from_extension(kind.extension()), Some(kind));
        }
        assert_eq!(ArchiveKind::from_extension("mp3"), None);
    }
}

use std::sync::OnceLock;

use regex::Regex;

/// One entry of a bare archive listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// `l -ba` lines look like:
/// `2024-03-01 12:34:56 ....A       123456       98765  dir/file.wav`
/// The five-character attribute column starts with `D` for directories;
/// the packed-size column may be blank.
fn line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d{4}-\d{2}-\d{2})\s+(\d{2}:\d{2}:\d{2})\s+([D.][R.][H.][S.][A.])\s+(\d+)\s+(\d+)?\s+(.+)$",
        )
        .unwrap()
    })
}

/// Parse bare-mode listing output. Non-matching lines (banners, blanks)
/// are skipped.
pub fn parse_bare_listing(output: &str) -> Vec<ArchiveEntry> {
    let mut entries = Vec::new();

    for line in output.lines() {
        let Some(caps) = line_pattern().captures(line.trim_end()) else {
            continue;
        };

        let attrs = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        let size = caps
            .get(4)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0);
        let name = caps.get(6).map(|m| m.as_str().to_string()).unwrap_or_default();

        entries.push(ArchiveEntry {
            name,
            size,
            is_dir: attrs.starts_with('D'),
        });
    }

    entries
}

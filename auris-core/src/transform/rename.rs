use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::{info, warn};

use auris_config::RenameConfig;
use auris_model::WorkMetadata;

use crate::error::Result;
use crate::fsutil;

fn square_bracket_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"【.*?】").unwrap())
}

fn reserved_char_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap())
}

const FULL_WIDTH_MAP: &[(char, char)] = &[
    ('<', '＜'),
    ('>', '＞'),
    (':', '：'),
    ('"', '＂'),
    ('/', '／'),
    ('\\', '＼'),
    ('|', '｜'),
    ('?', '？'),
    ('*', '＊'),
];

/// Compile the target directory name from the rename template.
pub fn compile_name(metadata: &WorkMetadata, config: &RenameConfig) -> String {
    let mut name = config.template.clone();

    name = name.replace("{rjcode}", metadata.work.as_str());
    name = name.replace("{work_name}", &metadata.work_name);
    name = name.replace("{maker_id}", &metadata.maker_id);
    name = name.replace("{maker_name}", &metadata.maker_name);

    if name.contains("{release_date}") {
        let formatted = NaiveDate::parse_from_str(&metadata.release_date, "%Y-%m-%d")
            .map(|date| date.format(&config.date_format).to_string())
            .unwrap_or_default();
        name = name.replace("{release_date}", &formatted);
    }

    if name.contains("{cvs}") {
        let replacement = if metadata.cvs.is_empty() {
            String::new()
        } else {
            format!(
                "{}{}{}",
                config.cv_list_left,
                metadata.cvs.join(&config.delimiter),
                config.cv_list_right
            )
        };
        name = name.replace("{cvs}", &replacement);
    }

    if name.contains("{tags}") {
        let replacement = if metadata.tags.is_empty() {
            String::new()
        } else {
            metadata
                .tags
                .iter()
                .take(config.tags_max_number)
                .cloned()
                .collect::<Vec<_>>()
                .join(&config.delimiter)
        };
        name = name.replace("{tags}", &replacement);
    }

    if config.exclude_square_brackets {
        name = square_bracket_pattern().replace_all(&name, "").to_string();
    }

    name.trim().to_string()
}

/// Strip or full-width-replace reserved characters, drop trailing spaces
/// and dots, cap at 200 characters.
pub fn sanitize_filename(name: &str, config: &RenameConfig) -> String {
    let mut sanitized = if config.illegal_char_to_full_width {
        name.chars()
            .map(|c| {
                FULL_WIDTH_MAP
                    .iter()
                    .find(|(from, _)| *from == c)
                    .map(|(_, to)| *to)
                    .unwrap_or(c)
            })
            .collect::<String>()
    } else {
        reserved_char_pattern().replace_all(name, "").to_string()
    };

    sanitized = sanitized
        .trim_matches(|c: char| c == ' ' || c == '.')
        .to_string();

    if sanitized.chars().count() > 200 {
        sanitized = sanitized.chars().take(200).collect();
    }

    sanitized
}

/// Rename the extracted directory in place to the compiled name.
///
/// A same-name result is a no-op; collisions append `(N)` to the whole
/// name. Returns the directory's final path.
pub fn rename_directory(
    path: &Path,
    metadata: &WorkMetadata,
    config: &RenameConfig,
) -> Result<PathBuf> {
    let new_name = sanitize_filename(&compile_name(metadata, config), config);
    if new_name.is_empty() {
        warn!(path = %path.display(), "compiled name is empty, keeping directory name");
        return Ok(path.to_path_buf());
    }

    let current_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if current_name == new_name {
        info!(name = %new_name, "directory already carries the target name");
        return Ok(path.to_path_buf());
    }

    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut target = parent.join(&new_name);
    let mut counter = 1;
    while target.exists() {
        target = parent.join(format!("{new_name}({counter})"));
        counter += 1;
    }

    fsutil::move_path(path, &target)?;
    info!(from = %path.display(), to = %target.display(), "directory renamed");
    Ok(target)
}

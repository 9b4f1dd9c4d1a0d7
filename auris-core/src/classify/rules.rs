use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use auris_config::{ClassificationKind, ClassificationRule};
use auris_model::WorkMetadata;

fn reserved_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap())
}

/// Sanitize one path segment: strip reserved characters, cap at 100
/// characters, trim surrounding whitespace.
pub fn sanitize_segment(segment: &str) -> String {
    let stripped = reserved_chars().replace_all(segment, "").to_string();
    let capped: String = stripped.chars().take(100).collect();
    capped.trim().to_string()
}

/// Relative classification path for a work. Empty string means the
/// library root. Pure: same metadata and rules always give the same path.
pub fn classification_path(metadata: &WorkMetadata, rules: &[ClassificationRule]) -> String {
    for rule in rules {
        if !rule.enabled {
            continue;
        }
        if let Some(path) = apply_rule(rule, metadata, rules) {
            return path;
        }
    }
    String::new()
}

fn apply_rule(
    rule: &ClassificationRule,
    metadata: &WorkMetadata,
    all_rules: &[ClassificationRule],
) -> Option<String> {
    match rule.kind {
        ClassificationKind::None => Some(String::new()),

        ClassificationKind::Maker => {
            if metadata.maker_name.is_empty() {
                return None;
            }
            let template = if rule.path_template.is_empty() {
                "{maker_name}"
            } else {
                &rule.path_template
            };
            Some(template.replace("{maker_name}", &sanitize_segment(&metadata.maker_name)))
        }

        ClassificationKind::Series => {
            let Some(series_name) = metadata
                .series_name
                .as_deref()
                .filter(|name| !name.is_empty())
            else {
                // Fall through to the configured fallback rule kind.
                let fallback = rule.fallback?;
                let fallback_rule = all_rules.iter().find(|r| r.kind == fallback)?;
                return apply_rule(fallback_rule, metadata, all_rules);
            };
            let template = if rule.path_template.is_empty() {
                "{series_name}"
            } else {
                &rule.path_template
            };
            Some(template.replace("{series_name}", &sanitize_segment(series_name)))
        }

        ClassificationKind::Rjcode => {
            if let Some(range) = &rule.rjcode_range
                && !code_in_range(metadata, range)
            {
                return None;
            }
            match &rule.custom_name {
                Some(name) if !name.is_empty() => Some(name.clone()),
                _ => {
                    let code = metadata.work.as_str();
                    let prefix: String = code.chars().take(5).collect();
                    Some(format!("{prefix}系列"))
                }
            }
        }

        ClassificationKind::Date => {
            let date = &metadata.release_date;
            if date.len() < 7 {
                return None;
            }
            let year = &date[0..4];
            let month = &date[5..7];
            let template = if rule.path_template.is_empty() {
                "{year}/{month}"
            } else {
                &rule.path_template
            };
            Some(template.replace("{year}", year).replace("{month}", month))
        }
    }
}

/// Inclusive numeric comparison against a range like
/// `RJ01400000-RJ01499999`. A malformed range never blocks the rule.
fn code_in_range(metadata: &WorkMetadata, range: &str) -> bool {
    let cleaned = range.replace(' ', "").to_uppercase();
    let Some((start, end)) = cleaned.split_once('-') else {
        warn!(range, "unparseable work-code range");
        return true;
    };

    let digits = |s: &str| -> Option<u64> {
        let numeric: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
        numeric.parse().ok()
    };

    match (digits(start), digits(end)) {
        (Some(start), Some(end)) => {
            let value = metadata.work.numeric();
            value >= start && value <= end
        }
        _ => {
            warn!(range, "unparseable work-code range");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auris_model::{AgeCategory, WorkCode};
    use chrono::Utc;

    fn metadata(code: &str) -> WorkMetadata {
        WorkMetadata {
            work: WorkCode::parse(code).unwrap(),
            work_name: "作品".to_string(),
            maker_id: "RG001".to_string(),
            maker_name: "社团/A".to_string(),
            release_date: "2024-03-05".to_string(),
            series_id: None,
            series_name: None,
            age_category: AgeCategory::Adult,
            tags: vec![],
            cvs: vec![],
            cover_url: String::new(),
            cached_at: Utc::now(),
            expires_at: Utc::now(),
        }
    }

    fn rule(kind: ClassificationKind) -> ClassificationRule {
        ClassificationRule {
            kind,
            enabled: true,
            path_template: String::new(),
            custom_name: None,
            fallback: None,
            rjcode_range: None,
        }
    }

    #[test]
    fn test_none_rule_targets_root() {
        assert_eq!(
            classification_path(&metadata("RJ123456"), &[rule(ClassificationKind::None)]),
            ""
        );
    }

    #[test]
    fn test_maker_rule_sanitizes_segment() {
        assert_eq!(
            classification_path(&metadata("RJ123456"), &[rule(ClassificationKind::Maker)]),
            "社团A"
        );
    }

    #[test]
    fn test_series_falls_back() {
        let mut series = rule(ClassificationKind::Series);
        series.fallback = Some(ClassificationKind::Maker);
        let rules = vec![series, rule(ClassificationKind::Maker)];

        // No series name: falls through to the maker rule.
        assert_eq!(classification_path(&metadata("RJ123456"), &rules), "社团A");

        let mut with_series = metadata("RJ123456");
        with_series.series_name = Some("シリーズ".to_string());
        assert_eq!(classification_path(&with_series, &rules), "シリーズ");
    }

    #[test]
    fn test_rjcode_range_and_custom_name() {
        let mut rj = rule(ClassificationKind::Rjcode);
        rj.rjcode_range = Some("RJ01400000-RJ01499999".to_string());
        rj.custom_name = Some("new-era".to_string());
        let rules = vec![rj, rule(ClassificationKind::None)];

        assert_eq!(classification_path(&metadata("RJ01450000"), &rules), "new-era");
        // Out of range: the rule yields nothing and the next rule applies.
        assert_eq!(classification_path(&metadata("RJ123456"), &rules), "");
    }

    #[test]
    fn test_rjcode_default_prefix_name() {
        let rules = vec![rule(ClassificationKind::Rjcode)];
        assert_eq!(
            classification_path(&metadata("RJ01450000"), &rules),
            "RJ014系列"
        );
    }

    #[test]
    fn test_date_rule() {
        let rules = vec![rule(ClassificationKind::Date)];
        assert_eq!(classification_path(&metadata("RJ123456"), &rules), "2024/03");
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let mut maker = rule(ClassificationKind::Maker);
        maker.enabled = false;
        let rules = vec![maker, rule(ClassificationKind::Date)];
        assert_eq!(classification_path(&metadata("RJ123456"), &rules), "2024/03");
    }

    #[test]
    fn test_classification_is_deterministic() {
        let rules = vec![rule(ClassificationKind::Maker)];
        let first = classification_path(&metadata("RJ123456"), &rules);
        let second = classification_path(&metadata("RJ123456"), &rules);
        assert_eq!(first, second);
    }

    #[test]
    fn test_segment_cap() {
        let long = "字".repeat(150);
        assert_eq!(sanitize_segment(&long).chars().count(), 100);
    }
}

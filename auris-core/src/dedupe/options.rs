use auris_model::{
    ConflictKind, ResolutionAction, ResolutionOption, lang_name, lang_priority,
};

use super::detector::DuplicateCheckResult;

fn option(
    action: ResolutionAction,
    label: String,
    description: String,
    recommend: bool,
) -> ResolutionOption {
    ResolutionOption {
        action,
        label,
        description,
        recommend,
    }
}

/// Synthesise the operator's choices for a detected conflict.
///
/// Direct duplicates get the four standard actions with KeepNew
/// recommended. Linked conflicts rank by language priority: an incoming
/// higher-priority language recommends KeepNew, a lower one recommends
/// Skip, and equals recommend KeepBoth with MergeLanguage offered beside
/// it.
pub fn resolution_options(result: &DuplicateCheckResult) -> Vec<ResolutionOption> {
    match result.kind {
        Some(ConflictKind::Duplicate) => duplicate_options(result),
        Some(
            ConflictKind::LinkedOriginal
            | ConflictKind::LinkedTranslation
            | ConflictKind::LinkedChild,
        ) => linked_options(result),
        _ => Vec::new(),
    }
}

fn duplicate_options(result: &DuplicateCheckResult) -> Vec<ResolutionOption> {
    if result.direct.is_none() {
        return vec![option(
            ResolutionAction::Skip,
            "抛弃新版".to_string(),
            "删除新版本，不做任何更改".to_string(),
            true,
        )];
    }

    vec![
        option(
            ResolutionAction::KeepNew,
            "保留新版".to_string(),
            "删除旧版本，保留新版本（通常新版质量更好）".to_string(),
            true,
        ),
        option(
            ResolutionAction::KeepOld,
            "保留旧版".to_string(),
            "删除新版本，保留现有版本（如果对当前版本满意）".to_string(),
            false,
        ),
        option(
            ResolutionAction::Merge,
            "合并保留".to_string(),
            "保留两个版本，新版本添加编号后缀".to_string(),
            false,
        ),
        option(
            ResolutionAction::Skip,
            "抛弃新版".to_string(),
            "删除新版本，不做任何更改（跳过处理）".to_string(),
            false,
        ),
    ]
}

fn linked_options(result: &DuplicateCheckResult) -> Vec<ResolutionOption> {
    let incoming_lang = result.incoming_lang();
    let incoming_priority = lang_priority(&incoming_lang);
    let incoming_name = lang_name(&incoming_lang);

    let Some(best_existing) = result
        .linked_found
        .iter()
        .min_by_key(|hit| lang_priority(&hit.lang))
    else {
        return vec![
            option(
                ResolutionAction::KeepNew,
                format!("保留新版（{incoming_name}）"),
                "保留当前版本".to_string(),
                true,
            ),
            option(
                ResolutionAction::Skip,
                "抛弃新版".to_string(),
                "删除新版本".to_string(),
                false,
            ),
        ];
    };

    let existing_priority = lang_priority(&best_existing.lang);
    let existing_name = lang_name(&best_existing.lang);

    let mut options = Vec::new();

    if incoming_priority < existing_priority {
        options.push(option(
            ResolutionAction::KeepNew,
            format!("保留新版（{incoming_name}）"),
            format!("新版语言({incoming_name})优先级更高，建议保留"),
            true,
        ));
        options.push(option(
            ResolutionAction::Skip,
            format!("抛弃新版（保留{existing_name}）"),
            format!("保留库中的{existing_name}版本，删除新版"),
            false,
        ));
    } else if incoming_priority > existing_priority {
        options.push(option(
            ResolutionAction::Skip,
            format!("抛弃新版（保留{existing_name}）"),
            format!("库中已存在更高优先级语言版本({existing_name})，建议抛弃新版"),
            true,
        ));
        options.push(option(
            ResolutionAction::KeepNew,
            format!("保留新版（{incoming_name}）"),
            format!("用新版{incoming_name}替换{existing_name}（不推荐）"),
            false,
        ));
    } else {
        options.push(option(
            ResolutionAction::KeepBoth,
            "保留两者".to_string(),
            "同一语言版本，建议保留两者作为备份".to_string(),
            true,
        ));
    }

    if incoming_priority != existing_priority {
        options.push(option(
            ResolutionAction::KeepBoth,
            "保留两者".to_string(),
            "同时保留两个语言版本（占用更多空间）".to_string(),
            false,
        ));
    }

    if incoming_priority == existing_priority {
        options.push(option(
            ResolutionAction::MergeLanguage,
            "合并语言版本".to_string(),
            "合并到同一文件夹，保留最新文件".to_string(),
            false,
        ));
    }

    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedupe::detector::{DuplicateHit, LinkedLibraryHit};
    use auris_model::{LinkRelation, WorkCode};
    use serde_json::json;

    fn direct_result() -> DuplicateCheckResult {
        DuplicateCheckResult {
            is_duplicate: true,
            direct: Some(DuplicateHit {
                work: WorkCode::parse("RJ123456").unwrap(),
                path: "/library/RJ123456 A".to_string(),
                size: 1,
                file_count: 1,
            }),
            kind: Some(ConflictKind::Duplicate),
            ..Default::default()
        }
    }

    fn linked_result(incoming_lang: &str, existing_lang: &str) -> DuplicateCheckResult {
        DuplicateCheckResult {
            is_duplicate: true,
            kind: Some(ConflictKind::LinkedOriginal),
            linked_found: vec![LinkedLibraryHit {
                work: WorkCode::parse("RJ111111").unwrap(),
                relation: LinkRelation::Original,
                lang: existing_lang.to_string(),
                path: "/library/RJ111111".to_string(),
                size: 1,
                file_count: 1,
                work_name: String::new(),
            }],
            analysis: json!({
                "current_work": {"rjcode": "RJ222222", "work_type": "parent", "lang": incoming_lang}
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_direct_duplicate_recommends_keep_new() {
        let options = resolution_options(&direct_result());
        assert_eq!(options.len(), 4);
        assert_eq!(options[0].action, ResolutionAction::KeepNew);
        assert!(options[0].recommend);
        assert!(options.iter().filter(|o| o.recommend).count() == 1);
    }

    #[test]
    fn test_higher_priority_incoming_recommends_keep_new() {
        // Incoming Simplified Chinese against a shelved Japanese original.
        let options = resolution_options(&linked_result("CHI_HANS", "JPN"));
        assert_eq!(options[0].action, ResolutionAction::KeepNew);
        assert!(options[0].recommend);
        assert!(
            options
                .iter()
                .any(|o| o.action == ResolutionAction::KeepBoth)
        );
    }

    #[test]
    fn test_lower_priority_incoming_recommends_skip() {
        let options = resolution_options(&linked_result("ENG", "CHI_HANS"));
        assert_eq!(options[0].action, ResolutionAction::Skip);
        assert!(options[0].recommend);
    }

    #[test]
    fn test_equal_priority_recommends_keep_both_with_merge_lang() {
        let options = resolution_options(&linked_result("CHI_HANS", "CHI_HANS"));
        assert_eq!(options[0].action, ResolutionAction::KeepBoth);
        assert!(options[0].recommend);
        assert!(
            options
                .iter()
                .any(|o| o.action == ResolutionAction::MergeLanguage)
        );
    }

    #[test]
    fn test_non_linked_kinds_have_no_options() {
        let result = DuplicateCheckResult::default();
        assert!(resolution_options(&result).is_empty());
    }
}

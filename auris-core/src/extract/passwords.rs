use std::path::Path;

use auris_config::ExtractConfig;
use auris_model::WorkCode;

use crate::db::PasswordRepo;
use crate::error::Result;

fn push_unique(list: &mut Vec<String>, candidate: String) {
    if !list.contains(&candidate) {
        list.push(candidate);
    }
}

/// Candidate passwords for an archive, in trial order:
/// vault entries scoped to the archive's work code, vault entries scoped to
/// its filename, the empty password, the configured defaults, and finally
/// the generic vault entries. Duplicates collapse to their first position.
pub async fn gather_candidates(
    archive: &Path,
    vault: &PasswordRepo,
    config: &ExtractConfig,
) -> Result<Vec<String>> {
    let filename = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let work = WorkCode::find_in(&filename);

    let mut candidates = Vec::new();

    if let Some(work) = &work {
        for entry in vault.for_work(work).await? {
            push_unique(&mut candidates, entry.password);
        }
    }

    for entry in vault.for_filename(&filename).await? {
        push_unique(&mut candidates, entry.password);
    }

    push_unique(&mut candidates, String::new());

    for password in &config.password_list {
        push_unique(&mut candidates, password.clone());
    }

    for entry in vault.generic().await? {
        push_unique(&mut candidates, entry.password);
    }

    Ok(candidates)
}

/// Candidate passwords for a nested archive: the outer archive's working
/// password first, then empty, then the configured defaults. The vault is
/// consulted separately only after these fail.
pub fn nested_candidates(outer_password: Option<&str>, config: &ExtractConfig) -> Vec<String> {
    let mut candidates = Vec::new();

    if let Some(outer) = outer_password {
        push_unique(&mut candidates, outer.to_string());
    }
    push_unique(&mut candidates, String::new());
    for password in &config.password_list {
        push_unique(&mut candidates, password.clone());
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use auris_model::PasswordSource;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_candidate_order() {
        let db = Database::open_in_memory().await.unwrap();
        let vault = db.passwords();
        let work = WorkCode::parse("RJ123456").unwrap();

        vault
            .insert(None, None, "generic", None, PasswordSource::Auto)
            .await
            .unwrap();
        vault
            .insert(
                None,
                Some("RJ123456.zip"),
                "by-name",
                None,
                PasswordSource::Batch,
            )
            .await
            .unwrap();
        vault
            .insert(Some(&work), None, "by-code", None, PasswordSource::Manual)
            .await
            .unwrap();

        let mut config = ExtractConfig::default();
        config.password_list = vec!["default1".to_string()];

        let candidates = gather_candidates(
            &PathBuf::from("/input/RJ123456.zip"),
            &vault,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(
            candidates,
            vec![
                "by-code".to_string(),
                "by-name".to_string(),
                String::new(),
                "default1".to_string(),
                "generic".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicates_collapse_to_first_position() {
        let db = Database::open_in_memory().await.unwrap();
        let vault = db.passwords();
        let work = WorkCode::parse("RJ123456").unwrap();

        vault
            .insert(Some(&work), None, "shared", None, PasswordSource::Manual)
            .await
            .unwrap();
        vault
            .insert(None, None, "shared", None, PasswordSource::Auto)
            .await
            .unwrap();

        let config = ExtractConfig::default();
        let candidates = gather_candidates(
            &PathBuf::from("/input/RJ123456.zip"),
            &vault,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(candidates, vec!["shared".to_string(), String::new()]);
    }

    #[test]
    fn test_nested_candidates() {
        let mut config = ExtractConfig::default();
        config.password_list = vec!["default1".to_string(), "".to_string()];

        let candidates = nested_candidates(Some("outer"), &config);
        assert_eq!(
            candidates,
            vec!["outer".to_string(), String::new(), "default1".to_string()]
        );

        let without_outer = nested_candidates(None, &config);
        assert_eq!(without_outer, vec![String::new(), "default1".to_string()]);
    }
}

use std::path::Path;

use tracing::{info, warn};

use crate::fsutil;

fn entries_of(path: &Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(path)
        .map(|entries| entries.flatten().map(|e| e.path()).collect())
        .unwrap_or_default()
}

/// Free temporary sibling name used while swapping a directory with its
/// only child.
fn swap_name(path: &Path) -> std::path::PathBuf {
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut counter = 0;
    loop {
        let candidate = parent.join(format!("{name}_tmp{counter}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Collapse `current` when its only entry is a subdirectory: the child's
/// contents move up and take over the parent's name. Counts consecutive
/// collapses on this chain against `max_depth`.
fn flatten_chain(current: &Path, depth: u32, max_depth: u32) -> bool {
    if depth >= max_depth || !current.is_dir() {
        return false;
    }

    let entries = entries_of(current);
    let [only] = entries.as_slice() else {
        return false;
    };
    if !only.is_dir() {
        return false;
    }

    info!(
        level = depth + 1,
        max = max_depth,
        dir = %current.display(),
        child = %only.display(),
        "collapsing single-subfolder level"
    );

    let temp = swap_name(current);
    if let Err(err) = fsutil::move_path(only, &temp) {
        warn!(dir = %current.display(), "flatten move failed: {err}");
        return false;
    }
    if let Err(err) = std::fs::remove_dir(current) {
        warn!(dir = %current.display(), "flatten rmdir failed: {err}");
        // Put the child back; a half-swapped tree is worse than none.
        let _ = fsutil::move_path(&temp, only);
        return false;
    }
    if let Err(err) = fsutil::move_path(&temp, current) {
        warn!(dir = %current.display(), "flatten rename-back failed: {err}");
        return false;
    }

    flatten_chain(current, depth + 1, max_depth);
    true
}

fn flatten_recursive(current: &Path, max_depth: u32) {
    if !current.is_dir() {
        return;
    }

    // Each branch restarts its collapse budget at zero.
    flatten_chain(current, 0, max_depth);

    for entry in entries_of(current) {
        if entry.is_dir() {
            flatten_recursive(&entry, max_depth);
        }
    }
}

/// Flatten every single-subfolder chain under `root`, bounded per branch
/// by `max_depth`. Returns the root, which never moves.
pub fn flatten_single_subfolder(root: &Path, max_depth: u32) -> std::path::PathBuf {
    flatten_recursive(root, max_depth);
    root.to_path_buf()
}

/// Remove empty directories bottom-up. The root itself is only removed
/// when `remove_root` is set.
pub fn remove_empty_dirs(path: &Path, remove_root: bool) {
    if !path.is_dir() {
        return;
    }

    for entry in entries_of(path) {
        if entry.is_dir() {
            remove_empty_dirs(&entry, true);
        }
    }

    if remove_root && entries_of(path).is_empty() {
        match std::fs::remove_dir(path) {
            Ok(()) => info!(dir = %path.display(), "removed empty directory"),
            Err(err) => warn!(dir = %path.display(), "failed to remove empty directory: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mkdirs(root: &Path, rel: &str) {
        std::fs::create_dir_all(root.join(rel)).unwrap();
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_flatten_promotes_single_chain() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "work/a/b/track.wav");

        flatten_single_subfolder(&dir.path().join("work"), 3);
        assert!(dir.path().join("work/track.wav").exists());
        assert!(!dir.path().join("work/a").exists());
    }

    #[test]
    fn test_flatten_respects_depth_bound() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "work/a/b/c/d/track.wav");

        flatten_single_subfolder(&dir.path().join("work"), 2);
        // The top chain collapses twice (a and b), then stops; the surviving
        // subdirectory collapses under its own branch budget.
        assert!(dir.path().join("work/c/track.wav").exists());
        assert!(!dir.path().join("work/c/d").exists());
    }

    #[test]
    fn test_flatten_leaves_mixed_content_alone() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "work/sub/track.wav");
        touch(dir.path(), "work/readme.txt");

        flatten_single_subfolder(&dir.path().join("work"), 3);
        assert!(dir.path().join("work/sub/track.wav").exists());
        assert!(dir.path().join("work/readme.txt").exists());
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "work/a/track.wav");

        flatten_single_subfolder(&dir.path().join("work"), 3);
        let (_, count_first) = crate::fsutil::dir_stats(&dir.path().join("work"));

        flatten_single_subfolder(&dir.path().join("work"), 3);
        let (_, count_second) = crate::fsutil::dir_stats(&dir.path().join("work"));

        assert!(dir.path().join("work/track.wav").exists());
        assert_eq!(count_first, count_second);
    }

    #[test]
    fn test_each_branch_gets_own_budget() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "work/x/only/track1.wav");
        touch(dir.path(), "work/y/only/track2.wav");

        flatten_single_subfolder(&dir.path().join("work"), 3);
        assert!(dir.path().join("work/x/track1.wav").exists());
        assert!(dir.path().join("work/y/track2.wav").exists());
    }

    #[test]
    fn test_remove_empty_dirs_preserves_root() {
        let dir = tempfile::tempdir().unwrap();
        mkdirs(dir.path(), "work/empty1/empty2");
        touch(dir.path(), "work/keep/track.wav");

        remove_empty_dirs(&dir.path().join("work"), false);
        assert!(!dir.path().join("work/empty1").exists());
        assert!(dir.path().join("work/keep/track.wav").exists());
        assert!(dir.path().join("work").exists());

        // An entirely empty tree keeps its root too.
        let lone = dir.path().join("lone");
        std::fs::create_dir(&lone).unwrap();
        remove_empty_dirs(&lone, false);
        assert!(lone.exists());
    }
}

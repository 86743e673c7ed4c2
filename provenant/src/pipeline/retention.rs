//! Best-effort retention of prior releases' artifacts.

use crate::config::RetentionConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Removes prior release directories beyond the configured count or age.
///
/// Applied only after a fully successful write; the current run's directory
/// is never touched. Failures surface as `Err` for the caller to log, never
/// to fail the run.
pub fn prune_releases(
    root: &Path,
    pipeline: &str,
    current_dir: &Path,
    config: &RetentionConfig,
) -> std::io::Result<Vec<PathBuf>> {
    let prefix = format!("{pipeline}-");
    let mut candidates: Vec<(PathBuf, SystemTime)> = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() || path == current_dir {
            continue;
        }
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push((path, modified));
    }

    // Newest first; the current run occupies one retention slot.
    candidates.sort_by(|a, b| b.1.cmp(&a.1));
    let keep_prior = config.keep_releases.saturating_sub(1);

    let max_age = config
        .max_age_days
        .map(|days| Duration::from_secs(u64::from(days) * 24 * 60 * 60));
    let now = SystemTime::now();

    let mut removed = Vec::new();
    for (index, (path, modified)) in candidates.into_iter().enumerate() {
        let beyond_count = index >= keep_prior;
        let beyond_age = max_age.is_some_and(|limit| {
            now.duration_since(modified)
                .map_or(false, |age| age > limit)
        });
        if beyond_count || beyond_age {
            fs::remove_dir_all(&path)?;
            removed.push(path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release_dir(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("data.tsv"), b"x\n").unwrap();
        dir
    }

    #[test]
    fn keeps_newest_releases_within_count() {
        let root = tempfile::tempdir().unwrap();
        let old_a = release_dir(root.path(), "proteins-2025_01");
        let old_b = release_dir(root.path(), "proteins-2025_02");
        let current = release_dir(root.path(), "proteins-2025_03");

        let removed = prune_releases(
            root.path(),
            "proteins",
            &current,
            &RetentionConfig {
                keep_releases: 2,
                max_age_days: None,
            },
        )
        .unwrap();

        // Current plus one prior survive; the oldest prior goes.
        assert_eq!(removed.len(), 1);
        assert!(current.exists());
        assert!(old_a.exists() != old_b.exists());
    }

    #[test]
    fn unrelated_directories_are_untouched() {
        let root = tempfile::tempdir().unwrap();
        let other = release_dir(root.path(), "genes-2025_01");
        let current = release_dir(root.path(), "proteins-2025_03");

        let removed = prune_releases(
            root.path(),
            "proteins",
            &current,
            &RetentionConfig {
                keep_releases: 1,
                max_age_days: None,
            },
        )
        .unwrap();

        assert!(removed.is_empty());
        assert!(other.exists());
    }

    #[test]
    fn current_release_is_never_pruned() {
        let root = tempfile::tempdir().unwrap();
        let current = release_dir(root.path(), "proteins-2025_03");

        let removed = prune_releases(
            root.path(),
            "proteins",
            &current,
            &RetentionConfig {
                keep_releases: 1,
                max_age_days: Some(0),
            },
        )
        .unwrap();

        assert!(removed.is_empty());
        assert!(current.exists());
    }
}

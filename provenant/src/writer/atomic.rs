//! Atomic artifact publication.
//!
//! Bytes are staged into a temporary file in the destination directory,
//! flushed and forced to durable storage, then renamed into place. A crash
//! at any point leaves, at worst, a stray temporary file and the previous
//! artifact (or nothing) at the final path, never a truncated file.

use crate::errors::WriteError;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

/// Publishes `bytes` at `path` atomically.
pub fn publish_atomic(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let io_err = |source: std::io::Error| WriteError::Io {
        path: path.display().to_string(),
        source,
    };

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(io_err)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let staging = parent.join(format!(".{file_name}.tmp-{}", Uuid::new_v4()));

    let staged = (|| -> std::io::Result<()> {
        let mut file = File::create(&staging)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();
    if let Err(source) = staged {
        let _ = fs::remove_file(&staging);
        return Err(io_err(source));
    }

    if let Err(source) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(io_err(source));
    }

    // Make the rename itself durable where the platform allows it.
    #[cfg(unix)]
    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_bytes_at_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.tsv");

        publish_atomic(&path, b"a\tb\n1\t2\n").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"a\tb\n1\t2\n");
    }

    #[test]
    fn overwrite_replaces_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.tsv");

        publish_atomic(&path, b"old\n").unwrap();
        publish_atomic(&path, b"new\n").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new\n");
    }

    #[test]
    fn no_staging_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.tsv");

        publish_atomic(&path, b"x\n").unwrap();

        let stray: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(stray.is_empty());
    }

    #[test]
    fn failure_leaves_prior_artifact_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.tsv");
        publish_atomic(&path, b"prior\n").unwrap();

        // A directory squatting on the staging rename target makes the
        // rename fail without touching the published artifact.
        let blocked = dir.path().join("blocked");
        fs::create_dir_all(blocked.join("data.tsv")).unwrap();
        let result = publish_atomic(&blocked.join("data.tsv"), b"new\n");
        assert!(result.is_err());

        assert_eq!(fs::read(&path).unwrap(), b"prior\n");
    }
}

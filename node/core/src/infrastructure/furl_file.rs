// Copyright (c) 2026 capgrid developers
// SPDX-License-Identifier: AGPL-3.0

// Durable files under a node's private directory
//
// Writes land in a temp file beside the target, are fsynced, then renamed
// into place, so a crash leaves either the old content or the new content.

use crate::domain::furl::FurlError;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Create `dir` (mode 0700 on unix) if it is missing
pub fn ensure_private_dir(dir: &Path) -> Result<(), FurlError> {
    std::fs::create_dir_all(dir).map_err(|e| persist_error(dir, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
            .map_err(|e| persist_error(dir, e))?;
    }

    Ok(())
}

/// Atomically replace `path` with `content`
pub fn write_durably(path: &Path, content: &[u8]) -> Result<(), FurlError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = parent.join(format!(".{}.tmp", file_name));

    let mut file = std::fs::File::create(&tmp_path).map_err(|e| persist_error(&tmp_path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(|e| persist_error(&tmp_path, e))?;
    }

    file.write_all(content).map_err(|e| persist_error(&tmp_path, e))?;
    file.sync_all().map_err(|e| persist_error(&tmp_path, e))?;
    drop(file);

    std::fs::rename(&tmp_path, path).map_err(|e| persist_error(path, e))?;

    sync_dir(parent)?;

    debug!(path = %path.display(), "Persisted private file");
    Ok(())
}

/// Flush `dir` so a rename inside it survives a crash
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> Result<(), FurlError> {
    let handle = std::fs::File::open(dir).map_err(|e| persist_error(dir, e))?;
    handle.sync_all().map_err(|e| persist_error(dir, e))
}

#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> Result<(), FurlError> {
    Ok(())
}

/// Read `path` as text, `None` if it does not exist
pub fn read_optional(path: &Path) -> Result<Option<String>, FurlError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FurlError::Read {
            path: path.display().to_string(),
            error: e.to_string(),
        }),
    }
}

fn persist_error(path: &Path, error: std::io::Error) -> FurlError {
    FurlError::Persist {
        path: path.display().to_string(),
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("private");
        ensure_private_dir(&private).unwrap();

        let target = private.join("storage.furl");
        assert_eq!(read_optional(&target).unwrap(), None);

        write_durably(&target, b"first\n").unwrap();
        write_durably(&target, b"second\n").unwrap();
        assert_eq!(read_optional(&target).unwrap().as_deref(), Some("second\n"));
        assert!(!private.join(".storage.furl.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_private_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("private");
        ensure_private_dir(&private).unwrap();
        let target = private.join("node.privkey");
        write_durably(&target, b"secret").unwrap();

        let dir_mode = std::fs::metadata(&private).unwrap().permissions().mode() & 0o777;
        let file_mode = std::fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
        assert_eq!(file_mode, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_sync_dir_failure_is_persist_error() {
        let dir = tempfile::tempdir().unwrap();
        sync_dir(dir.path()).unwrap();

        let err = sync_dir(&dir.path().join("gone")).unwrap_err();
        assert!(matches!(err, FurlError::Persist { .. }));
    }

    #[test]
    fn test_missing_parent_is_persist_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_durably(&dir.path().join("absent/file"), b"x").unwrap_err();
        assert!(matches!(err, FurlError::Persist { .. }));
    }
}

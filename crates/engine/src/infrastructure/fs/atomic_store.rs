//! Atomic File Store (C2): the only file-writing primitive used by the core.
//!
//! Every mutation is write-temp-then-rename so a reader racing a writer
//! never observes a partially-written file.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    fn at(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Create `dir` (and any missing parents) with mode `0o700`.
pub fn create_dir_all_restricted(dir: &Path) -> Result<(), FsError> {
    std::fs::create_dir_all(dir).map_err(|e| FsError::at(dir, e))?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| FsError::at(dir, e))?;
    Ok(())
}

fn tmp_path_for(dest: &Path) -> PathBuf {
    let file_name = dest
        .file_name()
        .map(|n| format!(".{}.tmp", n.to_string_lossy()))
        .unwrap_or_else(|| ".tmp".to_string());
    dest.with_file_name(file_name)
}

/// Atomically write `contents` to `dest`: write to `<dir>/.<name>.tmp` with
/// mode `0o600`, then rename over the destination. On any failure the temp
/// file is removed best-effort so it never lingers as a half-written
/// lookalike of `dest`.
pub fn write_atomic(dest: &Path, contents: &[u8]) -> Result<(), FsError> {
    let tmp = tmp_path_for(dest);
    let result = (|| -> Result<(), FsError> {
        std::fs::write(&tmp, contents).map_err(|e| FsError::at(&tmp, e))?;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| FsError::at(&tmp, e))?;
        std::fs::rename(&tmp, dest).map_err(|e| FsError::at(dest, e))?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Read the full contents of `path`, if it exists.
pub fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, FsError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FsError::at(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_leaves_no_tmp_file_on_success() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("state.json");
        write_atomic(&dest, b"{}").unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"{}");
        assert!(!dir.path().join(".state.json.tmp").exists());
    }

    #[test]
    fn write_atomic_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("state.json");
        write_atomic(&dest, b"{\"a\":1}").unwrap();
        write_atomic(&dest, b"{\"a\":2}").unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"{\"a\":2}");
    }

    #[test]
    fn read_if_exists_returns_none_for_missing_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(read_if_exists(&missing).unwrap().is_none());
    }

    #[test]
    fn create_dir_all_restricted_sets_mode_0700() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b");
        create_dir_all_restricted(&nested).unwrap();
        let mode = std::fs::metadata(&nested).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }
}

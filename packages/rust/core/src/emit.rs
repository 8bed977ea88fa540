//! Atomic output emission.
//!
//! The rendered document is written to a hidden temp file next to the
//! target and renamed into place, so readers never observe a partially
//! written output and a crashed run never leaves a truncated file under
//! the final name.

use std::path::Path;

use lectern_shared::{LecternError, Result};
use tracing::debug;

/// Write `bytes` to `target` atomically (write to temp, then rename).
///
/// Parent directories are created as needed. An existing file at `target`
/// is replaced.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| LecternError::io(parent, e))?;
        }
    }

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            LecternError::validation(format!("output path {} has no file name", target.display()))
        })?;
    let temp = target.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| LecternError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| LecternError::io(target, e))?;

    debug!(path = %target.display(), size = bytes.len(), "wrote output");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("lectern_emit_test_{}", Uuid::now_v7()))
    }

    #[test]
    fn writes_bytes_to_target() {
        let dir = temp_dir();
        let target = dir.join("calculus_All.md");

        write_atomic(&target, b"# Calculus\n").unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"# Calculus\n");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = temp_dir();
        let target = dir.join("nested").join("deeper").join("out.tex");

        write_atomic(&target, b"\\documentclass{article}").unwrap();

        assert!(target.is_file());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn replaces_an_existing_file() {
        let dir = temp_dir();
        let target = dir.join("out.md");

        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn leaves_no_temp_file_behind() {
        let dir = temp_dir();
        let target = dir.join("out.docx");

        write_atomic(&target, b"PK").unwrap();

        let names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["out.docx"]);
        let _ = std::fs::remove_dir_all(&dir);
    }
}

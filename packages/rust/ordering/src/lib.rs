//! Fragment discovery and ordering for an input directory.
//!
//! Before anything is sent to the transformation service, Lectern scans the
//! input directory's immediate children, keeps eligible text files, and puts
//! them in a strict total order. Filenames carrying dotted numeric keys
//! (`3.7.1_intro.txt`) order by that key; the rest order by modification
//! time. Ties always resolve deterministically, never arbitrarily.

mod order_key;

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use lectern_shared::{Fragment, LecternError, Result};
use tracing::{debug, info, instrument};

pub use order_key::order_key;

/// File extensions eligible as input fragments (lowercase, without dot).
pub const SUPPORTED_EXTS: [&str; 4] = ["txt", "md", "srt", "vtt"];

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Scan `dir` and return its eligible fragments in a strict total order.
///
/// Immediate children only; subdirectories are not descended into. Files with
/// unsupported extensions and files that are empty after trimming are skipped
/// with a debug log. A scan that yields nothing is an
/// [`LecternError::EmptyInput`].
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn resolve_fragments(dir: &Path) -> Result<Vec<Fragment>> {
    let entries = fs::read_dir(dir).map_err(|e| LecternError::io(dir, e))?;
    let mut fragments: Vec<Fragment> = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| LecternError::io(dir, e))?;
        let path = entry.path();
        let metadata = fs::metadata(&path).map_err(|e| LecternError::io(&path, e))?;
        if !metadata.is_file() {
            continue;
        }
        if !has_supported_extension(&path) {
            debug!(path = %path.display(), "skipping unsupported extension");
            continue;
        }

        let bytes = fs::read(&path).map_err(|e| LecternError::io(&path, e))?;
        let raw_text = String::from_utf8_lossy(&bytes).trim().to_string();
        if raw_text.is_empty() {
            debug!(path = %path.display(), "skipping empty file");
            continue;
        }

        let modified_time: DateTime<Utc> = metadata
            .modified()
            .map_err(|e| LecternError::io(&path, e))?
            .into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        fragments.push(Fragment {
            order_key: order_key(&file_name, modified_time),
            path,
            raw_text,
            size_bytes: metadata.len(),
            modified_time,
        });
    }

    if fragments.is_empty() {
        return Err(LecternError::empty_input(dir));
    }

    fragments.sort_by(|a, b| a.order_key.cmp(&b.order_key));

    info!(count = fragments.len(), "fragments resolved");
    Ok(fragments)
}

/// Whether the path's extension is one of [`SUPPORTED_EXTS`], case-insensitive.
fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

//! Pure order-key extraction for fragment filenames.
//!
//! Filenames like `3.7.1_intro.txt` carry an explicit position; the dotted
//! numeric run is the primary sort key. Filenames without one fall back to
//! modification time. The full tie-break chain lives in the field order of
//! [`OrderKey`]: key presence, numeric segments, mtime, lowercased name,
//! raw name.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use lectern_shared::OrderKey;
use regex::Regex;

/// Matches the first dotted numeric run anywhere in a file stem,
/// e.g. `3`, `3.7`, `3.7.1`, also `lecture_3.7` (the `3.7` part).
static NUM_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)*").expect("valid regex"));

/// Build the [`OrderKey`] for a file name and modification time.
///
/// Pure function of its inputs; the resolver calls it once per scanned file.
pub fn order_key(file_name: &str, modified: DateTime<Utc>) -> OrderKey {
    let stem = file_stem(file_name);
    let numeric = extract_numeric(stem);
    let rank = if numeric.is_some() { 0 } else { 1 };
    // Dates past 2262 overflow the i64 nanosecond range; those files all
    // collapse onto the same timestamp and fall through to the name.
    let modified_ns = modified.timestamp_nanos_opt().unwrap_or(i64::MAX);

    OrderKey {
        rank,
        numeric: numeric.unwrap_or_default(),
        modified_ns,
        lexical: file_name.to_lowercase(),
        file_name: file_name.to_string(),
    }
}

/// File name without its final extension.
fn file_stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// Extract the dotted numeric segments from a stem, if any.
fn extract_numeric(stem: &str) -> Option<Vec<u64>> {
    let m = NUM_KEY_RE.find(stem)?;
    m.as_str()
        .split('.')
        .map(|seg| seg.parse::<u64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .ok()
}

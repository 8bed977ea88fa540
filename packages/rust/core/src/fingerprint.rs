//! Run identity fingerprint.
//!
//! The fingerprint keys the checkpoint cache: two runs share cached chunk
//! outputs only when everything that shapes those outputs is identical. It
//! covers the module name, model id, chunk budget, output format, the full
//! instruction text, and every fragment's path, size, and modification time
//! in resolved order.

use lectern_shared::{Fragment, OutputFormat};
use sha2::{Digest, Sha256};

/// Hex length of the reported fingerprint.
const FINGERPRINT_LEN: usize = 12;

/// Compute the fingerprint for one compile run.
pub fn run_fingerprint(
    module: &str,
    model: &str,
    chunk_chars: usize,
    format: OutputFormat,
    instructions: &str,
    fragments: &[Fragment],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(module.as_bytes());
    hasher.update([0]);
    hasher.update(model.as_bytes());
    hasher.update([0]);
    hasher.update(chunk_chars.to_le_bytes());
    hasher.update(format.extension().as_bytes());
    hasher.update([0]);
    hasher.update(instructions.as_bytes());

    for fragment in fragments {
        hasher.update([0]);
        hasher.update(fragment.path.to_string_lossy().as_bytes());
        hasher.update(fragment.size_bytes.to_le_bytes());
        let modified_ns = fragment
            .modified_time
            .timestamp_nanos_opt()
            .unwrap_or_default();
        hasher.update(modified_ns.to_le_bytes());
    }

    let digest = format!("{:x}", hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use chrono::{TimeZone, Utc};
    use lectern_shared::OrderKey;

    fn fragment(name: &str, size: u64, mtime_secs: i64) -> Fragment {
        Fragment {
            path: PathBuf::from(format!("/in/{name}")),
            raw_text: String::new(),
            size_bytes: size,
            modified_time: Utc.timestamp_opt(mtime_secs, 0).unwrap(),
            order_key: OrderKey {
                rank: 1,
                numeric: vec![],
                modified_ns: mtime_secs * 1_000_000_000,
                lexical: name.to_lowercase(),
                file_name: name.to_string(),
            },
        }
    }

    fn baseline() -> String {
        run_fingerprint(
            "calculus",
            "gpt-4.1-mini",
            120_000,
            OutputFormat::Md,
            "rewrite into markdown",
            &[fragment("1_a.txt", 100, 1_700_000_000)],
        )
    }

    #[test]
    fn stable_for_identical_inputs() {
        assert_eq!(baseline(), baseline());
    }

    #[test]
    fn twelve_lowercase_hex_chars() {
        let fp = baseline();
        assert_eq!(fp.len(), 12);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn every_identity_field_changes_the_fingerprint() {
        let frags = [fragment("1_a.txt", 100, 1_700_000_000)];
        let base = baseline();

        let variants = [
            run_fingerprint(
                "algebra",
                "gpt-4.1-mini",
                120_000,
                OutputFormat::Md,
                "rewrite into markdown",
                &frags,
            ),
            run_fingerprint(
                "calculus",
                "gpt-4.1",
                120_000,
                OutputFormat::Md,
                "rewrite into markdown",
                &frags,
            ),
            run_fingerprint(
                "calculus",
                "gpt-4.1-mini",
                60_000,
                OutputFormat::Md,
                "rewrite into markdown",
                &frags,
            ),
            run_fingerprint(
                "calculus",
                "gpt-4.1-mini",
                120_000,
                OutputFormat::Tex,
                "rewrite into markdown",
                &frags,
            ),
            run_fingerprint(
                "calculus",
                "gpt-4.1-mini",
                120_000,
                OutputFormat::Md,
                "different rules",
                &frags,
            ),
        ];

        for variant in variants {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn fragment_identity_changes_the_fingerprint() {
        let base = baseline();

        let renamed = run_fingerprint(
            "calculus",
            "gpt-4.1-mini",
            120_000,
            OutputFormat::Md,
            "rewrite into markdown",
            &[fragment("1_b.txt", 100, 1_700_000_000)],
        );
        let resized = run_fingerprint(
            "calculus",
            "gpt-4.1-mini",
            120_000,
            OutputFormat::Md,
            "rewrite into markdown",
            &[fragment("1_a.txt", 101, 1_700_000_000)],
        );
        let touched = run_fingerprint(
            "calculus",
            "gpt-4.1-mini",
            120_000,
            OutputFormat::Md,
            "rewrite into markdown",
            &[fragment("1_a.txt", 100, 1_700_000_001)],
        );

        assert_ne!(base, renamed);
        assert_ne!(base, resized);
        assert_ne!(base, touched);
    }

    #[test]
    fn fragment_order_changes_the_fingerprint() {
        let a = fragment("1_a.txt", 100, 1_700_000_000);
        let b = fragment("2_b.txt", 200, 1_700_000_500);

        let forward = run_fingerprint(
            "calculus",
            "gpt-4.1-mini",
            120_000,
            OutputFormat::Md,
            "rules",
            &[a.clone(), b.clone()],
        );
        let reversed = run_fingerprint(
            "calculus",
            "gpt-4.1-mini",
            120_000,
            OutputFormat::Md,
            "rules",
            &[b, a],
        );
        assert_ne!(forward, reversed);
    }
}

//! Schema migrations for the Lectern database.
//!
//! Applied on read-write open, in version order, each as one batch. The
//! stored schema version in `schema_migrations` decides what still runs.

pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Every known migration, ascending by version.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: runs, chunk_cache",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Compile run history
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL,
    module      TEXT NOT NULL,
    model       TEXT NOT NULL,
    format      TEXT NOT NULL,
    chunk_count INTEGER NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_fingerprint ON runs(fingerprint);

-- Per-chunk transformation outputs, reused on resume
CREATE TABLE IF NOT EXISTS chunk_cache (
    id          TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL,
    chunk_id    INTEGER NOT NULL,
    model       TEXT NOT NULL,
    result_json TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE(fingerprint, chunk_id, model)
);

CREATE INDEX IF NOT EXISTS idx_chunk_cache_fingerprint ON chunk_cache(fingerprint);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}

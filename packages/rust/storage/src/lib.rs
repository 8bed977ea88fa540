//! libSQL storage layer for run history and the chunk checkpoint cache.
//!
//! The [`Storage`] struct wraps a local libSQL database holding two tables:
//! compile run history (for `lectern doctor`) and cached per-chunk
//! transformation outputs keyed by run fingerprint, chunk id, and model.
//! A cached chunk survives a failed run, so a resumed compile only pays for
//! the chunks that never finished.

mod migrations;

use std::path::Path;

use chrono::Utc;
use lectern_shared::{LecternError, Result};
use libsql::{Connection, Database, params};
use uuid::Uuid;

/// Handle over the local database file.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LecternError::io(parent, e))?;
        }
        let (db, conn) = Self::connect(path).await?;
        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.apply_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode (for `doctor` probes).
    /// Writes are rejected and no migrations run.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let (db, conn) = Self::connect(path).await?;
        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn connect(path: &Path) -> Result<(Database, Connection)> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LecternError::Storage(e.to_string()))?;
        let conn = db
            .connect()
            .map_err(|e| LecternError::Storage(e.to_string()))?;
        Ok((db, conn))
    }

    /// Apply any migrations newer than the stored schema version.
    async fn apply_migrations(&self) -> Result<()> {
        let current = self.schema_version().await;
        for migration in migrations::all_migrations() {
            if migration.version <= current {
                continue;
            }
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );
            self.conn.execute_batch(migration.sql).await.map_err(|e| {
                LecternError::Storage(format!("migration v{} failed: {e}", migration.version))
            })?;
        }
        Ok(())
    }

    /// Stored schema version, 0 before the first migration has run.
    async fn schema_version(&self) -> u32 {
        let Ok(mut rows) = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await
        else {
            // First open: the migrations table itself does not exist yet.
            return 0;
        };
        match rows.next().await {
            Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
            _ => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LecternError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Record the start of a compile run. Returns the generated run ID.
    pub async fn insert_run(
        &self,
        fingerprint: &str,
        module: &str,
        model: &str,
        format: &str,
        chunk_count: usize,
    ) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, fingerprint, module, model, format, chunk_count, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.as_str(),
                    fingerprint,
                    module,
                    model,
                    format,
                    chunk_count as i64,
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| LecternError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Mark a run finished and attach summary statistics.
    pub async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(|e| LecternError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Most recently started run, if any.
    pub async fn last_run(&self) -> Result<Option<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT module, model, format, chunk_count, started_at, finished_at
                 FROM runs ORDER BY started_at DESC LIMIT 1",
                params![],
            )
            .await
            .map_err(|e| LecternError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(RunRecord {
                module: row
                    .get::<String>(0)
                    .map_err(|e| LecternError::Storage(e.to_string()))?,
                model: row
                    .get::<String>(1)
                    .map_err(|e| LecternError::Storage(e.to_string()))?,
                format: row
                    .get::<String>(2)
                    .map_err(|e| LecternError::Storage(e.to_string()))?,
                chunk_count: row.get::<i64>(3).unwrap_or(0) as usize,
                started_at: row
                    .get::<String>(4)
                    .map_err(|e| LecternError::Storage(e.to_string()))?,
                finished_at: row.get::<String>(5).ok(),
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(LecternError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Chunk checkpoint cache
    // -----------------------------------------------------------------------

    /// Get a cached chunk output for `(fingerprint, chunk_id, model)`.
    pub async fn get_cached_chunk(
        &self,
        fingerprint: &str,
        chunk_id: usize,
        model: &str,
    ) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT result_json FROM chunk_cache
                 WHERE fingerprint = ?1 AND chunk_id = ?2 AND model = ?3",
                params![fingerprint, chunk_id as i64, model],
            )
            .await
            .map_err(|e| LecternError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let result: String = row
                    .get(0)
                    .map_err(|e| LecternError::Storage(e.to_string()))?;
                Ok(Some(result))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(LecternError::Storage(e.to_string())),
        }
    }

    /// Store a chunk output in the cache (upserts).
    pub async fn set_cached_chunk(
        &self,
        fingerprint: &str,
        chunk_id: usize,
        model: &str,
        result_json: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO chunk_cache (id, fingerprint, chunk_id, model, result_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(fingerprint, chunk_id, model) DO UPDATE SET
                   result_json = excluded.result_json,
                   created_at = excluded.created_at",
                params![
                    id.as_str(),
                    fingerprint,
                    chunk_id as i64,
                    model,
                    result_json,
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| LecternError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete all cached chunks for a run fingerprint.
    pub async fn invalidate_fingerprint(&self, fingerprint: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM chunk_cache WHERE fingerprint = ?1",
                params![fingerprint],
            )
            .await
            .map_err(|e| LecternError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Total number of cached chunk outputs across all fingerprints.
    pub async fn count_cached_chunks(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM chunk_cache", params![])
            .await
            .map_err(|e| LecternError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<u64>(0).unwrap_or(0)),
            Ok(None) => Ok(0),
            Err(e) => Err(LecternError::Storage(e.to_string())),
        }
    }
}

/// A row from the run history table.
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// Module name the run compiled.
    pub module: String,
    /// Model used for transformation.
    pub model: String,
    /// Output format.
    pub format: String,
    /// Number of chunks planned.
    pub chunk_count: usize,
    /// RFC 3339 start timestamp.
    pub started_at: String,
    /// RFC 3339 finish timestamp, absent for interrupted runs.
    pub finished_at: Option<String>,
}

//! Bounded-concurrency transformation dispatch.
//!
//! The orchestrator runs every chunk through a [`Transformer`] with a
//! semaphore bounding parallelism, retries transient failures with
//! exponential backoff, and reassembles results in chunk order. A failed
//! chunk aborts the remaining in-flight work: the run produces either a
//! complete set of results or an error naming the chunk that sank it.

use std::sync::Arc;
use std::time::Duration;

use lectern_shared::{Chunk, ChunkResult, LecternError, Result, RetryConfig};
use lectern_storage::Storage;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::{TransformError, Transformer};

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Access to the chunk checkpoint cache for one run.
///
/// Lookups are scoped by run fingerprint and model. With `read` false the
/// cache is write-only: existing rows are ignored but fresh outputs still
/// overwrite them.
pub struct Checkpoint<'a> {
    pub storage: &'a Storage,
    pub fingerprint: &'a str,
    pub model: &'a str,
    pub read: bool,
}

impl Checkpoint<'_> {
    /// Fetch a cached result, treating corrupt or unreadable rows as misses.
    async fn lookup(&self, chunk_id: usize) -> Option<ChunkResult> {
        if !self.read {
            return None;
        }
        match self
            .storage
            .get_cached_chunk(self.fingerprint, chunk_id, self.model)
            .await
        {
            Ok(Some(json)) => match serde_json::from_str::<ChunkResult>(&json) {
                Ok(mut result) => {
                    // Retries stay accounted to the run that performed them.
                    result.retries = 0;
                    result.from_cache = true;
                    Some(result)
                }
                Err(e) => {
                    warn!(chunk_id, error = %e, "ignoring corrupt cache row");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(chunk_id, error = %e, "cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Persist a fresh result. Cache write failures are logged, not fatal:
    /// the run already holds the output in memory.
    async fn store(&self, result: &ChunkResult) {
        let json = match serde_json::to_string(result) {
            Ok(json) => json,
            Err(e) => {
                warn!(chunk_id = result.chunk_id, error = %e, "failed to serialize chunk output");
                return;
            }
        };
        if let Err(e) = self
            .storage
            .set_cached_chunk(self.fingerprint, result.chunk_id, self.model, &json)
            .await
        {
            warn!(chunk_id = result.chunk_id, error = %e, "failed to cache chunk output");
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Observer of per-chunk dispatch events, for progress reporting.
///
/// Every chunk produces exactly one `chunk_finished` call; chunks served
/// from the checkpoint skip `chunk_started`. All calls happen on the
/// dispatching task, never concurrently.
pub trait ChunkObserver: Send + Sync {
    fn chunk_started(&self, chunk_id: usize, total: usize);
    fn chunk_finished(&self, chunk_id: usize, total: usize, from_cache: bool);
}

/// Dispatches chunk transformations with bounded parallelism.
pub struct Orchestrator {
    transformer: Arc<dyn Transformer>,
    retry: RetryConfig,
    concurrency: u32,
}

impl Orchestrator {
    pub fn new(transformer: Arc<dyn Transformer>, retry: RetryConfig, concurrency: u32) -> Self {
        Self {
            transformer,
            retry,
            concurrency: concurrency.max(1),
        }
    }

    /// Transform every chunk and return results in chunk order.
    ///
    /// Chunks must carry dense ids starting at zero, as the planner produces
    /// them. The first chunk to exhaust its attempts (or hit a fatal error)
    /// aborts the remaining in-flight work and fails the whole call. Chunks
    /// that completed before the failure are still checkpointed, so a
    /// resumed run does not repeat them.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn transform_chunks(
        &self,
        chunks: &[Chunk],
        instructions: &str,
        checkpoint: Option<&Checkpoint<'_>>,
        observer: Option<&dyn ChunkObserver>,
    ) -> Result<Vec<ChunkResult>> {
        debug_assert!(chunks.iter().enumerate().all(|(i, c)| c.id == i));

        let total = chunks.len();
        let mut slots: Vec<Option<ChunkResult>> = Vec::new();
        slots.resize_with(total, || None);

        // Serve whatever the checkpoint already holds.
        let mut pending: Vec<Chunk> = Vec::new();
        for chunk in chunks {
            let cached = match checkpoint {
                Some(cp) => cp.lookup(chunk.id).await,
                None => None,
            };
            match cached {
                Some(result) => {
                    debug!(chunk_id = chunk.id, "reusing cached chunk output");
                    if let Some(obs) = observer {
                        obs.chunk_finished(chunk.id, total, true);
                    }
                    slots[chunk.id] = Some(result);
                }
                None => pending.push(chunk.clone()),
            }
        }
        let cache_hits = chunks.len() - pending.len();
        info!(
            total = chunks.len(),
            cache_hits,
            concurrency = self.concurrency,
            "dispatching chunk transformations"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency as usize));
        let mut join_set: JoinSet<Result<ChunkResult>> = JoinSet::new();

        for chunk in pending {
            if let Some(obs) = observer {
                obs.chunk_started(chunk.id, total);
            }
            let sem = Arc::clone(&semaphore);
            let transformer = Arc::clone(&self.transformer);
            let retry = self.retry.clone();
            let instructions = instructions.to_string();
            join_set.spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                transform_one(transformer.as_ref(), &chunk, &instructions, &retry).await
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(result)) => {
                    if let Some(cp) = checkpoint {
                        cp.store(&result).await;
                    }
                    if let Some(obs) = observer {
                        obs.chunk_finished(result.chunk_id, total, false);
                    }
                    let chunk_id = result.chunk_id;
                    slots[chunk_id] = Some(result);
                }
                Ok(Err(e)) => {
                    join_set.abort_all();
                    return Err(e);
                }
                Err(join_error) => {
                    if join_error.is_cancelled() {
                        continue;
                    }
                    join_set.abort_all();
                    return Err(LecternError::Internal(format!(
                        "transformation task join error: {join_error}"
                    )));
                }
            }
        }

        let results: Vec<ChunkResult> = slots.into_iter().flatten().collect();
        if results.len() != chunks.len() {
            return Err(LecternError::Internal(format!(
                "expected {} chunk results, collected {}",
                chunks.len(),
                results.len()
            )));
        }

        info!(chunks = results.len(), cache_hits, "transformation complete");
        Ok(results)
    }
}

/// Run one chunk through the transformer with bounded attempts.
///
/// Transient failures sleep with exponential backoff between attempts.
/// Fatal failures give up immediately, reporting the attempts spent so far.
async fn transform_one(
    transformer: &dyn Transformer,
    chunk: &Chunk,
    instructions: &str,
    retry: &RetryConfig,
) -> Result<ChunkResult> {
    let text = chunk.concatenated_text();
    let mut last_message = String::new();

    for attempt in 0..retry.max_attempts {
        if attempt > 0 {
            let delay = backoff_interval(retry, attempt - 1);
            debug!(
                chunk_id = chunk.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying after transient failure"
            );
            tokio::time::sleep(delay).await;
        }

        match transformer.transform(&text, instructions).await {
            Ok(output) => {
                if attempt > 0 {
                    info!(chunk_id = chunk.id, retries = attempt, "chunk transformed after retries");
                }
                let mut result = ChunkResult::new(chunk.id, output);
                result.retries = attempt;
                return Ok(result);
            }
            Err(e) if e.is_transient() => {
                warn!(chunk_id = chunk.id, attempt, error = %e, "transient transformation failure");
                last_message = e.to_string();
            }
            Err(e) => {
                return Err(LecternError::chunk_transformation(
                    chunk.id,
                    chunk.fragment_range(),
                    attempt + 1,
                    e.to_string(),
                ));
            }
        }
    }

    Err(LecternError::chunk_transformation(
        chunk.id,
        chunk.fragment_range(),
        retry.max_attempts,
        last_message,
    ))
}

/// Backoff before the nth retry: `initial * 2^n` plus up to 10% jitter,
/// capped at the configured maximum.
fn backoff_interval(retry: &RetryConfig, retry_index: u32) -> Duration {
    let base = retry.initial_interval_ms as f64;
    let multiplied = base * 2f64.powi(retry_index as i32);
    let jitter = rand::random::<f64>() * multiplied * 0.1;
    let capped = (multiplied + jitter).min(retry.max_interval_ms as f64);
    Duration::from_millis(capped as u64)
}

//! End-to-end `compile` pipeline: input directory → fragments → chunks →
//! transformed markdown → merged document → rendered output file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use lectern_chunker::plan_chunks;
use lectern_merge::merge;
use lectern_ordering::resolve_fragments;
use lectern_render::render;
use lectern_shared::{Block, OutputFormat, Result, RetryConfig, sanitize_module_name};
use lectern_storage::Storage;
use lectern_transform::{Checkpoint, ChunkObserver, Orchestrator, Transformer};

use crate::emit;
use crate::fingerprint::run_fingerprint;

/// Configuration for the `compile` pipeline.
#[derive(Debug, Clone)]
pub struct CompileConfig {
    /// Directory holding the input fragments.
    pub input_dir: PathBuf,
    /// Module name, used in the output file name and the run identity.
    pub module: String,
    /// Directory the output file is written into.
    pub output_dir: PathBuf,
    /// Output container format.
    pub format: OutputFormat,
    /// Model identifier, part of the cache key.
    pub model: String,
    /// Full instruction set sent with every chunk.
    pub instructions: String,
    /// Chunk budget in characters.
    pub chunk_chars: usize,
    /// Maximum concurrent transformation requests.
    pub concurrency: u32,
    /// Reuse checkpointed chunk outputs from earlier runs.
    pub resume: bool,
    /// Path of the checkpoint database.
    pub db_path: PathBuf,
    /// Retry policy for transient transformation failures.
    pub retry: RetryConfig,
}

/// Result of the `compile` pipeline.
#[derive(Debug)]
pub struct CompileResult {
    /// Path of the written output file.
    pub output_path: PathBuf,
    /// Run identity fingerprint.
    pub fingerprint: String,
    /// Number of input fragments resolved.
    pub fragments: usize,
    /// Number of chunks planned.
    pub chunks: usize,
    /// Chunks served from the checkpoint cache.
    pub cache_hits: usize,
    /// Transient retries spent across all chunks.
    pub retries: u32,
    /// Heading blocks in the merged document.
    pub headings: usize,
    /// Table-of-contents entries in the merged document.
    pub toc_entries: usize,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a chunk is dispatched for transformation.
    fn chunk_started(&self, chunk_id: usize, total: usize);
    /// Called when a chunk's output is ready; `from_cache` marks checkpoint reuse.
    fn chunk_finished(&self, chunk_id: usize, total: usize, from_cache: bool);
    /// Called when the pipeline completes.
    fn done(&self, result: &CompileResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn chunk_started(&self, _chunk_id: usize, _total: usize) {}
    fn chunk_finished(&self, _chunk_id: usize, _total: usize, _from_cache: bool) {}
    fn done(&self, _result: &CompileResult) {}
}

/// Run the full `compile` pipeline.
///
/// 1. Resolve input fragments in reading order
/// 2. Pack fragments into chunks
/// 3. Open the checkpoint store and record the run
/// 4. Transform every chunk (bounded concurrency, retries, checkpoint reuse)
/// 5. Merge the outputs into one document
/// 6. Render and write the output file atomically
///
/// The run is all-or-nothing: any failed chunk fails the whole call and no
/// output file is written. Chunks that completed before the failure stay
/// checkpointed for the next resumed run.
#[instrument(skip_all, fields(module = %config.module, input = %config.input_dir.display()))]
pub async fn compile(
    config: &CompileConfig,
    transformer: Arc<dyn Transformer>,
    progress: &dyn ProgressReporter,
) -> Result<CompileResult> {
    let start = Instant::now();
    let module = sanitize_module_name(&config.module);

    info!(module = %module, format = %config.format, model = %config.model, "starting compile");

    // --- Phase 1: Resolve input ---
    progress.phase("Resolving input");
    let fragments = resolve_fragments(&config.input_dir)?;
    let fragment_count = fragments.len();

    // --- Phase 2: Plan chunks ---
    // Identity first; packing consumes the fragment list.
    progress.phase("Planning chunks");
    let fingerprint = run_fingerprint(
        &module,
        &config.model,
        config.chunk_chars,
        config.format,
        &config.instructions,
        &fragments,
    );
    let chunks = plan_chunks(fragments, config.chunk_chars);
    let chunk_count = chunks.len();

    info!(
        fragments = fragment_count,
        chunks = chunk_count,
        %fingerprint,
        "planned compile run"
    );

    // --- Phase 3: Checkpoint store ---
    progress.phase("Opening checkpoint store");
    let storage = Storage::open(&config.db_path).await?;
    let run_id = storage
        .insert_run(
            &fingerprint,
            &module,
            &config.model,
            config.format.extension(),
            chunk_count,
        )
        .await?;
    if !config.resume {
        // A partial non-resumed run must not leave stale rows behind for a
        // later resumed run to pick up.
        storage.invalidate_fingerprint(&fingerprint).await?;
    }

    // --- Phase 4: Transform ---
    progress.phase("Transforming chunks");
    let orchestrator = Orchestrator::new(transformer, config.retry.clone(), config.concurrency);
    let checkpoint = Checkpoint {
        storage: &storage,
        fingerprint: &fingerprint,
        model: &config.model,
        read: config.resume,
    };
    let observer = PipelineChunkObserver { inner: progress };
    let results = orchestrator
        .transform_chunks(
            &chunks,
            &config.instructions,
            Some(&checkpoint),
            Some(&observer),
        )
        .await?;

    let cache_hits = results.iter().filter(|r| r.from_cache).count();
    let retries: u32 = results.iter().map(|r| r.retries).sum();

    // --- Phase 5: Merge ---
    progress.phase("Merging chunk outputs");
    let document = merge(&results);
    let headings = document
        .body_blocks
        .iter()
        .filter(|b| matches!(b, Block::Heading { .. }))
        .count();

    // --- Phase 6: Render ---
    progress.phase("Rendering output");
    let bytes = render(&document, config.format)?;

    // --- Phase 7: Emit ---
    progress.phase("Writing output");
    let output_path = config
        .output_dir
        .join(format!("{module}_All.{}", config.format.extension()));
    emit::write_atomic(&output_path, &bytes)?;

    // --- Phase 8: Record run ---
    let stats = serde_json::json!({
        "fragments": fragment_count,
        "chunks": chunk_count,
        "cache_hits": cache_hits,
        "retries": retries,
        "headings": headings,
        "toc_entries": document.toc.len(),
        "elapsed_ms": start.elapsed().as_millis() as u64,
        "output": output_path.display().to_string(),
    });
    if let Err(e) = storage.finish_run(&run_id, &stats.to_string()).await {
        // The output is already on disk; history bookkeeping is best effort.
        warn!(error = %e, "failed to record run completion");
    }

    let result = CompileResult {
        output_path,
        fingerprint,
        fragments: fragment_count,
        chunks: chunk_count,
        cache_hits,
        retries,
        headings,
        toc_entries: document.toc.len(),
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        fragments = result.fragments,
        chunks = result.chunks,
        cache_hits = result.cache_hits,
        retries = result.retries,
        output = %result.output_path.display(),
        elapsed_ms = result.elapsed.as_millis() as u64,
        "compile complete"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Chunk observer adapter
// ---------------------------------------------------------------------------

/// Adapts a `ProgressReporter` to the orchestrator's `ChunkObserver` interface.
struct PipelineChunkObserver<'a> {
    inner: &'a dyn ProgressReporter,
}

impl ChunkObserver for PipelineChunkObserver<'_> {
    fn chunk_started(&self, chunk_id: usize, total: usize) {
        self.inner.chunk_started(chunk_id, total);
    }

    fn chunk_finished(&self, chunk_id: usize, total: usize, from_cache: bool) {
        self.inner.chunk_finished(chunk_id, total, from_cache);
    }
}

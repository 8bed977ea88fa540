//! Chunk transformation through an OpenAI-compatible service.
//!
//! This crate provides:
//! - [`Transformer`] — The capability seam: rewrite text under an instruction set
//! - [`client`] — `/chat/completions` implementation of the seam
//! - [`orchestrator`] — Bounded-concurrency dispatch with retries and checkpointing

pub mod client;
pub mod orchestrator;

use async_trait::async_trait;

pub use client::OpenAiTransformer;
pub use orchestrator::{Checkpoint, ChunkObserver, Orchestrator};

/// Failure modes for a single transformation request.
///
/// The orchestrator retries [`Transient`](TransformError::Transient) failures
/// with backoff and gives up immediately on
/// [`Fatal`](TransformError::Fatal) ones.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Retryable: timeouts, connection resets, rate limits, server errors.
    #[error("{0}")]
    Transient(String),

    /// Not retryable: rejected requests, auth failures, malformed responses.
    #[error("{0}")]
    Fatal(String),
}

impl TransformError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A service that rewrites text under a fixed instruction set.
///
/// Implementations must tolerate concurrent calls; the orchestrator shares
/// one instance across every in-flight chunk.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Rewrite `text` according to `instructions` and return the result.
    async fn transform(
        &self,
        text: &str,
        instructions: &str,
    ) -> std::result::Result<String, TransformError>;
}

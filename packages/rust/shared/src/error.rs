//! Error types for Lectern.
//!
//! Library crates use [`LecternError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Lectern operations.
#[derive(Debug, thiserror::Error)]
pub enum LecternError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// No eligible input files were found in the given directory.
    #[error("no eligible input files found in {dir:?}")]
    EmptyInput { dir: PathBuf },

    /// The transformation service failed for one chunk after exhausting retries.
    /// Carries the chunk's fragment range so the user can isolate the cause.
    #[error("chunk {chunk_id} ({fragments}) failed after {attempts} attempts: {message}")]
    ChunkTransformation {
        chunk_id: usize,
        fragments: String,
        attempts: u32,
        message: String,
    },

    /// Network/HTTP error talking to the transformation service.
    #[error("network error: {0}")]
    Network(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem failure, carrying the offending path.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad flag value, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Output rendering error.
    #[error("render error: {0}")]
    Render(String),

    /// Unexpected internal failure (task panic, poisoned state).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LecternError>;

impl LecternError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an empty-input error for a scanned directory.
    pub fn empty_input(dir: impl Into<PathBuf>) -> Self {
        Self::EmptyInput { dir: dir.into() }
    }

    /// Create a chunk transformation failure carrying the failing chunk's
    /// identity and the retry count exhausted.
    pub fn chunk_transformation(
        chunk_id: usize,
        fragments: impl Into<String>,
        attempts: u32,
        msg: impl Into<String>,
    ) -> Self {
        Self::ChunkTransformation {
            chunk_id,
            fragments: fragments.into(),
            attempts,
            message: msg.into(),
        }
    }

    /// Attach the offending path to an I/O failure.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_carry_context() {
        let err = LecternError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = LecternError::chunk_transformation(3, "07_a.txt..09_c.txt", 5, "HTTP 500");
        let msg = err.to_string();
        assert!(msg.contains("chunk 3"));
        assert!(msg.contains("07_a.txt..09_c.txt"));
        assert!(msg.contains("after 5 attempts"));
    }

    #[test]
    fn empty_input_names_directory() {
        let err = LecternError::empty_input("/tmp/transcripts");
        assert!(err.to_string().contains("transcripts"));
    }
}

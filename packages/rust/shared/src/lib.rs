//! Shared types, error model, and configuration for Lectern.
//!
//! This crate is the foundation depended on by all other Lectern crates.
//! It provides:
//! - [`LecternError`] — the unified error type
//! - Domain types ([`Fragment`], [`Chunk`], [`ChunkResult`], [`MergedDocument`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, OpenAiConfig, RetryConfig, config_dir, config_file_path,
    db_file_path, init_config, load_config, load_config_from, validate, validate_api_key,
};
pub use error::{LecternError, Result};
pub use types::{
    Block, Chunk, ChunkResult, Fragment, Heading, MergedDocument, OrderKey, OutputFormat,
    TocEntry, sanitize_module_name, scan_headings,
};

//! Core pipeline orchestration for Lectern.
//!
//! This crate ties together fragment resolution, chunk planning,
//! transformation, merging, and rendering into the end-to-end `compile`
//! workflow.

pub mod emit;
pub mod fingerprint;
pub mod pipeline;

pub use pipeline::{CompileConfig, CompileResult, ProgressReporter, SilentProgress, compile};

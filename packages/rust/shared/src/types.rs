//! Core domain types for the Lectern compile pipeline.
//!
//! A run flows strictly forward: discovered [`Fragment`]s are packed into
//! [`Chunk`]s, each chunk is transformed into a [`ChunkResult`], and the
//! results are merged into one [`MergedDocument`] of typed [`Block`]s.

use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LecternError;

// ---------------------------------------------------------------------------
// OrderKey
// ---------------------------------------------------------------------------

/// Sort key placing a fragment in the global input sequence.
///
/// The derived ordering compares fields top to bottom, which encodes the
/// whole tie-break chain: files carrying a dotted numeric filename key sort
/// before files without one, numeric keys compare segment-wise, then
/// modification time ascending, then the lowercased file name, then the raw
/// file name. Distinct files never compare equal because the raw name is
/// unique within a directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderKey {
    /// 0 when a numeric key was extracted from the filename, 1 otherwise.
    pub rank: u8,
    /// Dotted numeric segments from the filename (`3.7.1` becomes `[3, 7, 1]`).
    /// Empty when the filename carries no key.
    pub numeric: Vec<u64>,
    /// File modification time in nanoseconds since the epoch.
    pub modified_ns: i64,
    /// Lowercased file name.
    pub lexical: String,
    /// Raw file name, the final tie-break.
    pub file_name: String,
}

// ---------------------------------------------------------------------------
// Fragment
// ---------------------------------------------------------------------------

/// One discovered input file, treated as an atomic unit of content.
///
/// Created at directory scan, read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    /// Absolute or caller-relative path to the source file.
    pub path: PathBuf,
    /// Full file contents.
    pub raw_text: String,
    /// File size in bytes at scan time.
    pub size_bytes: u64,
    /// File modification time at scan time.
    pub modified_time: DateTime<Utc>,
    /// Position of this fragment in the global sequence.
    pub order_key: OrderKey,
}

impl Fragment {
    /// File name component of the path, lossily decoded.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// A maximal run of consecutive fragments sized to fit one transformation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequence index, dense from 0.
    pub id: usize,
    /// Fragments in global order.
    pub fragments: Vec<Fragment>,
    /// Sum of fragment text lengths in characters.
    pub estimated_size: usize,
}

impl Chunk {
    /// The fragment text concatenated in order, each piece preceded by a
    /// boundary marker so cross-fragment references survive transformation.
    pub fn concatenated_text(&self) -> String {
        let mut out = String::with_capacity(self.estimated_size + self.fragments.len() * 48);
        for fragment in &self.fragments {
            out.push_str("\n\n---\n\n## SOURCE FILE: ");
            out.push_str(&fragment.file_name());
            out.push_str("\n\n");
            out.push_str(&fragment.raw_text);
        }
        out
    }

    /// Human-readable fragment range for logs and error messages,
    /// e.g. `3.7.1_intro.txt..3.7.3_outro.txt`.
    pub fn fragment_range(&self) -> String {
        match self.fragments.as_slice() {
            [] => "no fragments".to_string(),
            [only] => only.file_name(),
            [first, .., last] => format!("{}..{}", first.file_name(), last.file_name()),
        }
    }
}

// ---------------------------------------------------------------------------
// Heading / ChunkResult
// ---------------------------------------------------------------------------

/// A heading observed in transformed output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Depth as emitted, 1-based.
    pub level: usize,
    /// Title text with markers stripped.
    pub title: String,
}

impl Heading {
    /// Parse a single line as an ATX-style heading. Requires one to six `#`
    /// followed by a space and a non-empty title.
    pub fn parse_line(line: &str) -> Option<Heading> {
        let trimmed = line.trim();
        let level = trimmed.bytes().take_while(|b| *b == b'#').count();
        if level == 0 || level > 6 {
            return None;
        }
        let rest = &trimmed[level..];
        if !rest.starts_with(' ') {
            return None;
        }
        let title = rest.trim();
        if title.is_empty() {
            return None;
        }
        Some(Heading {
            level,
            title: title.to_string(),
        })
    }
}

/// Scan text line by line and collect every heading, in order.
pub fn scan_headings(text: &str) -> Vec<Heading> {
    text.lines().filter_map(Heading::parse_line).collect()
}

/// The transformed output for one chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResult {
    /// Id of the chunk this output belongs to.
    pub chunk_id: usize,
    /// Raw model output, untouched.
    pub raw_output_text: String,
    /// Headings observed in the output, in order.
    pub extracted_headings: Vec<Heading>,
    /// Transient retries spent before success.
    #[serde(default)]
    pub retries: u32,
    /// Whether the output was served from the checkpoint cache.
    #[serde(default)]
    pub from_cache: bool,
}

impl ChunkResult {
    /// Build a result from raw output, extracting its headings.
    pub fn new(chunk_id: usize, raw_output_text: String) -> Self {
        let extracted_headings = scan_headings(&raw_output_text);
        Self {
            chunk_id,
            raw_output_text,
            extracted_headings,
            retries: 0,
            from_cache: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Block / TocEntry / MergedDocument
// ---------------------------------------------------------------------------

/// One classified unit of merged output content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Section heading at a (renumbered) level.
    Heading { level: usize, title: String },
    /// Plain prose.
    Paragraph { text: String },
    /// One list item; `ordered` distinguishes numbered from bulleted lists.
    ListItem { text: String, ordered: bool },
    /// Blockquote line.
    Quote { text: String },
}

/// One table-of-contents row, in 1:1 correspondence with a `Block::Heading`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Heading level after renumbering.
    pub level: usize,
    /// Heading title.
    pub title: String,
    /// Slug anchor derived from the title.
    pub anchor: String,
}

/// The single logical document assembled from all chunk results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedDocument {
    /// Table of contents, one entry per heading block.
    pub toc: Vec<TocEntry>,
    /// Ordered body blocks. The synthesis section's heading and body are the
    /// final blocks.
    pub body_blocks: Vec<Block>,
    /// Consolidated synthesis text, empty when no chunk produced one.
    pub synthesis_summary: String,
}

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// Supported output containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain structured Markdown.
    #[default]
    Md,
    /// Styled OOXML word-processing document.
    Docx,
    /// Standalone LaTeX article.
    Tex,
}

impl OutputFormat {
    /// File extension for this format, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Md => "md",
            OutputFormat::Docx => "docx",
            OutputFormat::Tex => "tex",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = LecternError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(OutputFormat::Md),
            "docx" => Ok(OutputFormat::Docx),
            "tex" | "latex" => Ok(OutputFormat::Tex),
            other => Err(LecternError::validation(format!(
                "unknown output format {other:?}, expected md, docx, or tex"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Module names
// ---------------------------------------------------------------------------

/// Sanitize a module name for use in file names and cache keys.
pub fn sanitize_module_name(name: &str) -> String {
    static UNSAFE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));

    let cleaned = UNSAFE_RE.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_matches(|c| matches!(c, '.' | '_' | '-'));
    if cleaned.is_empty() {
        "module".to_string()
    } else {
        cleaned.to_string()
    }
}

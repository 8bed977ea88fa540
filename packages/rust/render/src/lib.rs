//! Output writers over the merged document.
//!
//! The merge produces a [`MergedDocument`]; this crate turns it into bytes
//! for each supported container:
//!
//! - [`DocumentView`] — read-only adapter over blocks and TOC, the only
//!   surface the writers consume
//! - `markdown` — plain structured Markdown with a Contents section
//! - `docx` — minimal OOXML package (styled headings, lists, quotes)
//! - `latex` — standalone `article` document
//!
//! Writers hold no merge logic. They map [`Block`] variants to container
//! syntax and nothing else.

mod docx;
mod latex;
mod markdown;

use lectern_shared::{Block, MergedDocument, OutputFormat, Result, TocEntry};
use tracing::{debug, instrument};

// ---------------------------------------------------------------------------
// Renderer adapter
// ---------------------------------------------------------------------------

/// Read-only view of a merged document, handed to output writers.
#[derive(Debug, Clone, Copy)]
pub struct DocumentView<'a> {
    doc: &'a MergedDocument,
}

impl<'a> DocumentView<'a> {
    pub fn new(doc: &'a MergedDocument) -> Self {
        Self { doc }
    }

    /// Ordered body blocks, synthesis section last.
    pub fn blocks(&self) -> &'a [Block] {
        &self.doc.body_blocks
    }

    /// Table of contents, one entry per heading block.
    pub fn toc(&self) -> &'a [TocEntry] {
        &self.doc.toc
    }

    /// The document title, when the body opens with a level-1 heading.
    pub fn title(&self) -> Option<&'a str> {
        match self.doc.body_blocks.first() {
            Some(Block::Heading { level: 1, title }) => Some(title),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Render a merged document to bytes in the requested container format.
#[instrument(skip_all, fields(format = %format, blocks = doc.body_blocks.len()))]
pub fn render(doc: &MergedDocument, format: OutputFormat) -> Result<Vec<u8>> {
    let view = DocumentView::new(doc);
    let bytes = match format {
        OutputFormat::Md => markdown::write(&view).into_bytes(),
        OutputFormat::Docx => docx::write(&view)?,
        OutputFormat::Tex => latex::write(&view).into_bytes(),
    };
    debug!(bytes = bytes.len(), "render complete");
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Line-scan parser classifying chunk output into structural blocks.
//!
//! This is deliberately not a markdown parser. The merge step only needs
//! headings, list items, and blockquotes told apart from prose; everything
//! else rides along as paragraph text. Fenced code blocks are kept verbatim
//! inside paragraphs so their contents never get misclassified.

use std::sync::LazyLock;

use lectern_shared::{Block, Heading};
use regex::Regex;

/// Chunk output the structural scan cannot walk.
///
/// Never fatal: the merger keeps the raw text as a verbatim paragraph.
#[derive(Debug, thiserror::Error)]
#[error("malformed chunk output: {0}")]
pub struct MalformedChunkOutput(pub String);

static ORDERED_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,4}[.)]\s+(.*)$").expect("valid regex"));

/// Parse one chunk's raw output into an ordered block sequence.
pub fn parse_blocks(text: &str) -> Result<Vec<Block>, MalformedChunkOutput> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            paragraph.push(line);
            continue;
        }
        if in_fence {
            paragraph.push(line);
            continue;
        }

        if trimmed.is_empty() {
            flush_paragraph(&mut paragraph, &mut blocks);
            continue;
        }

        if let Some(heading) = Heading::parse_line(line) {
            flush_paragraph(&mut paragraph, &mut blocks);
            blocks.push(Block::Heading {
                level: heading.level,
                title: heading.title,
            });
            continue;
        }

        if let Some(rest) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
            .or_else(|| trimmed.strip_prefix("+ "))
        {
            flush_paragraph(&mut paragraph, &mut blocks);
            blocks.push(Block::ListItem {
                text: rest.trim().to_string(),
                ordered: false,
            });
            continue;
        }

        if let Some(caps) = ORDERED_ITEM_RE.captures(trimmed) {
            flush_paragraph(&mut paragraph, &mut blocks);
            blocks.push(Block::ListItem {
                text: caps[1].trim().to_string(),
                ordered: true,
            });
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix('>') {
            flush_paragraph(&mut paragraph, &mut blocks);
            blocks.push(Block::Quote {
                text: rest.trim_start().to_string(),
            });
            continue;
        }

        paragraph.push(line);
    }

    if in_fence {
        return Err(MalformedChunkOutput("unterminated code fence".into()));
    }
    flush_paragraph(&mut paragraph, &mut blocks);
    Ok(blocks)
}

fn flush_paragraph(lines: &mut Vec<&str>, blocks: &mut Vec<Block>) {
    if lines.is_empty() {
        return;
    }
    let text = lines.join("\n").trim().to_string();
    lines.clear();
    if !text.is_empty() {
        blocks.push(Block::Paragraph { text });
    }
}

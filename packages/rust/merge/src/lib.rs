//! Merges independently transformed chunk outputs into one document.
//!
//! Each chunk was rewritten without sight of its neighbors, so outputs
//! arrive with clashing heading hierarchies, duplicated section boundaries,
//! and per-chunk summary sections. The merge walks the chunk results in
//! order and produces a single [`MergedDocument`]: one heading hierarchy,
//! one table of contents, one synthesis section at the end.

mod parser;

pub use parser::{MalformedChunkOutput, parse_blocks};

use std::collections::HashMap;
use std::sync::LazyLock;

use lectern_shared::{Block, ChunkResult, MergedDocument, TocEntry};
use regex::Regex;
use tracing::{debug, instrument, warn};

/// Title of the consolidated synthesis section.
pub const SYNTHESIS_TITLE: &str = "Synthesis";

// ---------------------------------------------------------------------------
// Summary detection
// ---------------------------------------------------------------------------

/// Decides whether a heading title announces a summary-like section.
///
/// Injectable so the vocabulary can evolve without touching merge logic.
pub trait SummaryMatcher: Send + Sync {
    fn is_summary(&self, title: &str) -> bool;
}

/// Default matcher over common summary vocabulary.
#[derive(Debug, Default)]
pub struct VocabularyMatcher;

impl SummaryMatcher for VocabularyMatcher {
    fn is_summary(&self, title: &str) -> bool {
        static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(
                r"(?i)\b(summary|synthesis|conclusion|conclusions|recap|takeaways|wrap[- ]?up)\b",
            )
            .expect("valid regex")
        });
        SUMMARY_RE.is_match(title)
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge chunk results with the default summary vocabulary.
pub fn merge(results: &[ChunkResult]) -> MergedDocument {
    merge_with(results, &VocabularyMatcher)
}

/// Merge chunk results using a caller-supplied summary matcher.
///
/// Results must already be sorted by ascending chunk id; the orchestrator
/// guarantees this regardless of completion order.
#[instrument(skip_all, fields(chunks = results.len()))]
pub fn merge_with(results: &[ChunkResult], summary: &dyn SummaryMatcher) -> MergedDocument {
    // Walk each chunk's output into blocks. Unparsable output degrades to a
    // verbatim paragraph; content loss is worse than structure loss.
    let mut chunk_blocks: Vec<Vec<Block>> = results
        .iter()
        .map(|result| match parse_blocks(&result.raw_output_text) {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(chunk_id = result.chunk_id, error = %e, "keeping malformed chunk output verbatim");
                vec![Block::Paragraph {
                    text: result.raw_output_text.trim().to_string(),
                }]
            }
        })
        .collect();

    // Pull every chunk's trailing summary section into the synthesis pool.
    // A chunk that opens by re-announcing a summary right after one was
    // extracted is the same section split by the chunk boundary; its body
    // joins the pool instead of surviving as a stray heading.
    let mut synthesis_parts: Vec<String> = Vec::new();
    let mut boundary_open = false;
    for (i, blocks) in chunk_blocks.iter_mut().enumerate() {
        if boundary_open {
            if let Some(part) = extract_leading_summary(blocks, summary) {
                debug!(chunk = i, "extracted boundary summary continuation");
                synthesis_parts.push(part);
            }
        }
        boundary_open = match extract_trailing_summary(blocks, summary) {
            Some(part) => {
                debug!(chunk = i, "extracted trailing summary section");
                synthesis_parts.push(part);
                true
            }
            None => blocks.is_empty(),
        };
    }

    renumber_headings(&mut chunk_blocks);

    let mut body_blocks: Vec<Block> = chunk_blocks.into_iter().flatten().collect();
    collapse_duplicate_headings(&mut body_blocks);

    // Exactly one synthesis section, always last. With nothing to say it
    // stays a bare heading for the writer to fill or omit.
    let synthesis_summary = synthesis_parts.join("\n\n");
    body_blocks.push(Block::Heading {
        level: 2,
        title: SYNTHESIS_TITLE.to_string(),
    });
    if !synthesis_summary.is_empty() {
        body_blocks.push(Block::Paragraph {
            text: synthesis_summary.clone(),
        });
    }

    let toc = build_toc(&body_blocks);
    debug!(
        headings = toc.len(),
        blocks = body_blocks.len(),
        "merge complete"
    );

    MergedDocument {
        toc,
        body_blocks,
        synthesis_summary,
    }
}

// ---------------------------------------------------------------------------
// Trailing summary extraction
// ---------------------------------------------------------------------------

/// Split off a chunk's trailing summary-like section, the last heading and
/// everything after it, when its title matches. Returns the section body.
fn extract_trailing_summary(
    blocks: &mut Vec<Block>,
    summary: &dyn SummaryMatcher,
) -> Option<String> {
    let idx = blocks
        .iter()
        .rposition(|b| matches!(b, Block::Heading { .. }))?;
    let matches_summary = match &blocks[idx] {
        Block::Heading { title, .. } => summary.is_summary(title),
        _ => false,
    };
    if !matches_summary {
        return None;
    }

    let body = section_body(blocks.split_off(idx).into_iter().skip(1));
    (!body.is_empty()).then_some(body)
}

/// Split off a chunk's leading summary-like section, its first heading up to
/// the next heading, when the chunk opens with a matching heading.
fn extract_leading_summary(
    blocks: &mut Vec<Block>,
    summary: &dyn SummaryMatcher,
) -> Option<String> {
    let matches_summary = match blocks.first() {
        Some(Block::Heading { title, .. }) => summary.is_summary(title),
        _ => false,
    };
    if !matches_summary {
        return None;
    }

    let end = blocks[1..]
        .iter()
        .position(|b| matches!(b, Block::Heading { .. }))
        .map_or(blocks.len(), |i| i + 1);
    let body = section_body(blocks.drain(..end).skip(1));
    (!body.is_empty()).then_some(body)
}

/// Flatten a summary section's content blocks into plain text.
fn section_body(blocks: impl Iterator<Item = Block>) -> String {
    blocks
        .filter_map(|block| match block {
            Block::Paragraph { text } | Block::Quote { text } => Some(text),
            Block::ListItem { text, .. } => Some(format!("- {text}")),
            Block::Heading { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ---------------------------------------------------------------------------
// Heading renumbering
// ---------------------------------------------------------------------------

/// Remap heading levels into a single valid hierarchy.
///
/// The first heading overall becomes the document title at level 1. A later
/// chunk whose first heading restarts at level 1 is shifted down one level.
/// Every heading is then clamped so the sequence never jumps more than one
/// level deeper than the previous heading, and level 1 stays unique.
fn renumber_headings(chunks: &mut [Vec<Block>]) {
    let mut prev_level: Option<usize> = None;

    for blocks in chunks.iter_mut() {
        let restarts = blocks
            .iter()
            .find_map(|b| match b {
                Block::Heading { level, .. } => Some(*level == 1),
                _ => None,
            })
            .unwrap_or(false);
        let offset = usize::from(prev_level.is_some() && restarts);

        for block in blocks.iter_mut() {
            if let Block::Heading { level, .. } = block {
                let mapped = match prev_level {
                    None => 1,
                    Some(prev) => (*level + offset).clamp(2, prev + 1),
                };
                *level = mapped;
                prev_level = Some(mapped);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Duplicate heading collapse
// ---------------------------------------------------------------------------

/// Drop a heading that near-duplicates the immediately preceding heading at
/// the same level, keeping the first occurrence's title. Body blocks of the
/// dropped heading stay, merged under the survivor.
fn collapse_duplicate_headings(blocks: &mut Vec<Block>) {
    let mut prev: Option<(usize, String)> = None;
    let mut keep: Vec<Block> = Vec::with_capacity(blocks.len());

    for block in blocks.drain(..) {
        if let Block::Heading { level, title } = &block {
            let norm = normalize_title(title);
            if let Some((prev_level, prev_norm)) = &prev {
                if prev_level == level && *prev_norm == norm {
                    debug!(%title, level, "collapsing duplicated heading");
                    continue;
                }
            }
            prev = Some((*level, norm));
        }
        keep.push(block);
    }

    *blocks = keep;
}

/// Normalized form for near-duplicate comparison: lowercased alphanumerics.
fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

// ---------------------------------------------------------------------------
// TOC
// ---------------------------------------------------------------------------

/// One TOC row per heading block, with duplicate anchors counter-suffixed.
fn build_toc(blocks: &[Block]) -> Vec<TocEntry> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    blocks
        .iter()
        .filter_map(|block| match block {
            Block::Heading { level, title } => {
                let base = slugify(title);
                let count = seen.entry(base.clone()).or_insert(0);
                let anchor = if *count == 0 {
                    base.clone()
                } else {
                    format!("{base}-{count}")
                };
                *count += 1;
                Some(TocEntry {
                    level: *level,
                    title: title.clone(),
                    anchor,
                })
            }
            _ => None,
        })
        .collect()
}

/// Anchor slug: lowercased, runs of non-alphanumerics become single hyphens.
fn slugify(title: &str) -> String {
    static NON_SLUG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

    let lowered = title.to_lowercase();
    let replaced = NON_SLUG_RE.replace_all(&lowered, "-");
    replaced.trim_matches('-').to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn result(chunk_id: usize, text: &str) -> ChunkResult {
        ChunkResult::new(chunk_id, text.to_string())
    }

    fn heading_levels(doc: &MergedDocument) -> Vec<usize> {
        doc.body_blocks
            .iter()
            .filter_map(|b| match b {
                Block::Heading { level, .. } => Some(*level),
                _ => None,
            })
            .collect()
    }

    fn heading_titles(doc: &MergedDocument) -> Vec<&str> {
        doc.body_blocks
            .iter()
            .filter_map(|b| match b {
                Block::Heading { title, .. } => Some(title.as_str()),
                _ => None,
            })
            .collect()
    }

    /// No heading may sit more than one level below its predecessor.
    fn assert_valid_nesting(doc: &MergedDocument) {
        let levels = heading_levels(doc);
        for pair in levels.windows(2) {
            assert!(
                pair[1] <= pair[0] + 1,
                "level jump in heading sequence: {levels:?}"
            );
        }
    }

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/chunks/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    // -----------------------------------------------------------------------
    // Renumbering
    // -----------------------------------------------------------------------

    #[test]
    fn first_heading_becomes_document_title() {
        let results = [result(0, "## Opening Remarks\n\nWelcome.")];
        let doc = merge(&results);
        assert_eq!(heading_levels(&doc)[0], 1);
    }

    #[test]
    fn restarted_chunks_nest_below_the_title() {
        let results = [
            result(0, "# Calculus\n\n## Limits\n\nIntro."),
            result(1, "# Continuity\n\n## Definition\n\nFormal."),
        ];
        let doc = merge(&results);

        // The second chunk restarted at level 1; it shifts down one level.
        // Trailing synthesis heading is level 2.
        assert_eq!(heading_levels(&doc), vec![1, 2, 2, 3, 2]);
        assert_eq!(
            heading_titles(&doc),
            vec![
                "Calculus",
                "Limits",
                "Continuity",
                "Definition",
                SYNTHESIS_TITLE
            ]
        );
        assert_valid_nesting(&doc);
    }

    #[test]
    fn continued_numbering_is_left_alone() {
        let results = [
            result(0, "# Course\n\n## Part One\n\ntext"),
            result(1, "## Part Two\n\ntext\n\n### Detail\n\nmore"),
        ];
        let doc = merge(&results);
        assert_eq!(heading_levels(&doc), vec![1, 2, 2, 3, 2]);
        assert_valid_nesting(&doc);
    }

    #[test]
    fn level_jumps_are_clamped() {
        let results = [result(0, "# Title\n\n#### Way Too Deep\n\ntext")];
        let doc = merge(&results);
        assert_eq!(heading_levels(&doc), vec![1, 2, 2]);
        assert_valid_nesting(&doc);
    }

    #[test]
    fn single_document_title_survives_extra_h1s() {
        let results = [result(
            0,
            "# Title\n\ntext\n\n# Second Title\n\nmore\n\n# Third\n\nlast",
        )];
        let doc = merge(&results);
        let levels = heading_levels(&doc);
        assert_eq!(levels.iter().filter(|l| **l == 1).count(), 1);
        assert_valid_nesting(&doc);
    }

    // -----------------------------------------------------------------------
    // Duplicate collapse
    // -----------------------------------------------------------------------

    #[test]
    fn boundary_duplicate_headings_collapse_keeping_first_title() {
        let results = [
            result(0, "# Notes\n\n## Key Definitions\n\nA limit is local."),
            result(1, "## Key definitions!\n\nContinuity is pointwise."),
        ];
        let doc = merge(&results);

        let dup_count = heading_titles(&doc)
            .iter()
            .filter(|t| normalize_title(t) == "keydefinitions")
            .count();
        assert_eq!(dup_count, 1);
        assert!(heading_titles(&doc).contains(&"Key Definitions"));

        // Both bodies survive under the surviving heading.
        let body: Vec<&str> = doc
            .body_blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(body.contains(&"A limit is local."));
        assert!(body.contains(&"Continuity is pointwise."));
    }

    #[test]
    fn same_title_at_different_levels_is_not_collapsed() {
        let results = [result(
            0,
            "# Graphs\n\n## Trees\n\nprose\n\n### Trees\n\ndeeper prose",
        )];
        let doc = merge(&results);
        let trees = heading_titles(&doc)
            .iter()
            .filter(|t| **t == "Trees")
            .count();
        assert_eq!(trees, 2);
    }

    // -----------------------------------------------------------------------
    // Synthesis
    // -----------------------------------------------------------------------

    #[test]
    fn trailing_summaries_consolidate_into_one_synthesis() {
        let results = [
            result(
                0,
                "# Week One\n\n## Limits\n\nprose\n\n## Summary\n\nLimits are local.",
            ),
            result(
                1,
                "## Continuity\n\nprose\n\n## Summary\n\nContinuity everywhere.",
            ),
        ];
        let doc = merge(&results);

        // Per-chunk summaries left the body; one synthesis holds both.
        assert!(!heading_titles(&doc).contains(&"Summary"));
        assert!(doc.synthesis_summary.contains("Limits are local."));
        assert!(doc.synthesis_summary.contains("Continuity everywhere."));

        let last_heading = heading_titles(&doc).last().copied().unwrap();
        assert_eq!(last_heading, SYNTHESIS_TITLE);
        assert_valid_nesting(&doc);
    }

    #[test]
    fn boundary_straddling_summary_joins_the_synthesis() {
        let results = [
            result(
                0,
                "# Notes\n\n## Limits\n\nprose\n\n## Summary\n\nLimits are local.",
            ),
            result(
                1,
                "## Summary\n\nContinuity is pointwise.\n\n## Continuity\n\nprose",
            ),
        ];
        let doc = merge(&results);

        // The re-announced summary must not survive as a stray body heading.
        assert!(!heading_titles(&doc).contains(&"Summary"));
        assert!(doc.synthesis_summary.contains("Limits are local."));
        assert!(doc.synthesis_summary.contains("Continuity is pointwise."));

        let summary_like = heading_titles(&doc)
            .iter()
            .filter(|t| VocabularyMatcher.is_summary(t))
            .count();
        assert_eq!(summary_like, 1);
        assert_valid_nesting(&doc);
    }

    #[test]
    fn leading_summary_without_a_preceding_one_stays_in_the_body() {
        let results = [
            result(0, "# Notes\n\n## Limits\n\nprose"),
            result(1, "## Summary of Last Week\n\nrecap\n\n## New Topic\n\nprose"),
        ];
        let doc = merge(&results);

        // Chunk 0 contributed no trailing summary, so chunk 1's opening
        // recap is ordinary content.
        assert!(heading_titles(&doc).contains(&"Summary of Last Week"));
        assert_eq!(doc.synthesis_summary, "");
    }

    #[test]
    fn mid_chunk_summary_sections_stay_in_the_body() {
        let results = [result(
            0,
            "# Notes\n\n## Summary\n\nEarly recap.\n\n## Next Topic\n\nprose",
        )];
        let doc = merge(&results);
        assert!(heading_titles(&doc).contains(&"Summary"));
        assert_eq!(doc.synthesis_summary, "");
    }

    #[test]
    fn no_summaries_yield_a_bare_synthesis_heading() {
        let results = [result(0, "# Notes\n\n## Topic\n\nprose")];
        let doc = merge(&results);

        assert_eq!(doc.synthesis_summary, "");
        let last = doc.body_blocks.last().unwrap();
        assert_eq!(
            *last,
            Block::Heading {
                level: 2,
                title: SYNTHESIS_TITLE.into()
            }
        );
    }

    #[test]
    fn summary_matcher_is_injectable() {
        struct Never;
        impl SummaryMatcher for Never {
            fn is_summary(&self, _title: &str) -> bool {
                false
            }
        }

        let results = [result(0, "# Notes\n\n## Summary\n\nrecap text")];
        let doc = merge_with(&results, &Never);
        assert!(heading_titles(&doc).contains(&"Summary"));
        assert_eq!(doc.synthesis_summary, "");
    }

    // -----------------------------------------------------------------------
    // TOC
    // -----------------------------------------------------------------------

    #[test]
    fn toc_matches_heading_blocks_one_to_one() {
        let results = [
            result(0, "# Title\n\n## One\n\ntext\n\n## Two\n\ntext"),
            result(1, "## Three\n\ntext\n\n### Deep\n\ntext"),
        ];
        let doc = merge(&results);

        let headings = heading_levels(&doc);
        assert_eq!(doc.toc.len(), headings.len());
        for (entry, level) in doc.toc.iter().zip(headings) {
            assert_eq!(entry.level, level);
        }
    }

    #[test]
    fn duplicate_titles_get_distinct_anchors() {
        let results = [result(
            0,
            "# Title\n\n## Exercises\n\nset one\n\n### Exercises\n\nset two",
        )];
        let doc = merge(&results);
        let anchors: Vec<&str> = doc.toc.iter().map(|e| e.anchor.as_str()).collect();
        let mut unique = anchors.to_vec();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(anchors.len(), unique.len());
    }

    #[test]
    fn slugify_flattens_punctuation() {
        assert_eq!(
            slugify("Week 3: Sorting & Searching"),
            "week-3-sorting-searching"
        );
        assert_eq!(slugify("  Limits  "), "limits");
    }

    // -----------------------------------------------------------------------
    // Robustness
    // -----------------------------------------------------------------------

    #[test]
    fn malformed_output_is_kept_verbatim() {
        let raw = "# Title\n\n```python\nprint('unclosed fence'";
        let results = [result(0, raw)];
        let doc = merge(&results);

        let verbatim = doc.body_blocks.iter().any(|b| match b {
            Block::Paragraph { text } => text.contains("unclosed fence"),
            _ => false,
        });
        assert!(verbatim, "malformed content must never be dropped");
    }

    #[test]
    fn merge_is_deterministic() {
        let results = [
            result(0, "# A\n\n## B\n\ntext\n\n## Summary\n\nrecap"),
            result(1, "## C\n\n- item\n\n> quote"),
        ];
        assert_eq!(merge(&results), merge(&results));
    }

    #[test]
    fn fixture_chunks_merge_cleanly() {
        let results = [
            result(0, &load_fixture("lecture_chunk_0.md")),
            result(1, &load_fixture("lecture_chunk_1.md")),
        ];
        let doc = merge(&results);

        assert_eq!(heading_levels(&doc)[0], 1);
        assert_eq!(doc.toc.len(), heading_levels(&doc).len());
        assert!(!doc.synthesis_summary.is_empty());
        assert_valid_nesting(&doc);
    }
}

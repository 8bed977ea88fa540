//! Plain structured Markdown writer.

use lectern_shared::Block;

use crate::DocumentView;

/// Render the document as Markdown: title, Contents section, then body.
pub(crate) fn write(view: &DocumentView) -> String {
    let mut out = String::new();

    let mut blocks = view.blocks();
    if let Some(title) = view.title() {
        out.push_str(&format!("# {title}\n\n"));
        blocks = &blocks[1..];
    }
    write_contents(&mut out, view);
    write_blocks(&mut out, blocks);

    // Exactly one trailing newline.
    out.truncate(out.trim_end().len());
    out.push('\n');
    out
}

/// Contents section listing TOC entries as an indented link list. The
/// document title's own entry is omitted; linking a page to its top is noise.
fn write_contents(out: &mut String, view: &DocumentView) {
    let entries = if view.title().is_some() {
        view.toc().get(1..).unwrap_or_default()
    } else {
        view.toc()
    };
    if entries.is_empty() {
        return;
    }

    out.push_str("## Contents\n\n");
    for entry in entries {
        let indent = "  ".repeat(entry.level.saturating_sub(2));
        out.push_str(&format!("{indent}- [{}](#{})\n", entry.title, entry.anchor));
    }
    out.push('\n');
}

fn write_blocks(out: &mut String, blocks: &[Block]) {
    let mut i = 0;
    while i < blocks.len() {
        match &blocks[i] {
            Block::Heading { level, title } => {
                out.push_str(&"#".repeat(*level));
                out.push(' ');
                out.push_str(title);
                out.push_str("\n\n");
                i += 1;
            }
            Block::Paragraph { text } => {
                out.push_str(text);
                out.push_str("\n\n");
                i += 1;
            }
            Block::ListItem { ordered, .. } => {
                let run_ordered = *ordered;
                let mut n = 0;
                while let Some(Block::ListItem { text, ordered }) = blocks.get(i) {
                    if *ordered != run_ordered {
                        break;
                    }
                    n += 1;
                    if run_ordered {
                        out.push_str(&format!("{n}. {text}\n"));
                    } else {
                        out.push_str(&format!("- {text}\n"));
                    }
                    i += 1;
                }
                out.push('\n');
            }
            Block::Quote { .. } => {
                while let Some(Block::Quote { text }) = blocks.get(i) {
                    out.push_str(&format!("> {text}\n"));
                    i += 1;
                }
                out.push('\n');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_shared::{MergedDocument, TocEntry};

    fn entry(level: usize, title: &str, anchor: &str) -> TocEntry {
        TocEntry {
            level,
            title: title.into(),
            anchor: anchor.into(),
        }
    }

    fn doc(body_blocks: Vec<Block>, toc: Vec<TocEntry>) -> MergedDocument {
        MergedDocument {
            toc,
            body_blocks,
            synthesis_summary: String::new(),
        }
    }

    fn render(doc: &MergedDocument) -> String {
        write(&DocumentView::new(doc))
    }

    #[test]
    fn title_then_contents_then_body() {
        let doc = doc(
            vec![
                Block::Heading {
                    level: 1,
                    title: "Calculus".into(),
                },
                Block::Heading {
                    level: 2,
                    title: "Limits".into(),
                },
                Block::Paragraph {
                    text: "A limit is local.".into(),
                },
            ],
            vec![
                entry(1, "Calculus", "calculus"),
                entry(2, "Limits", "limits"),
            ],
        );

        let md = render(&doc);
        let title_at = md.find("# Calculus").unwrap();
        let contents_at = md.find("## Contents").unwrap();
        let body_at = md.find("## Limits").unwrap();
        assert!(title_at < contents_at);
        assert!(contents_at < body_at);
    }

    #[test]
    fn contents_links_entries_by_anchor_with_indentation() {
        let doc = doc(
            vec![
                Block::Heading {
                    level: 1,
                    title: "Notes".into(),
                },
                Block::Heading {
                    level: 2,
                    title: "Limits".into(),
                },
                Block::Heading {
                    level: 3,
                    title: "One-Sided".into(),
                },
            ],
            vec![
                entry(1, "Notes", "notes"),
                entry(2, "Limits", "limits"),
                entry(3, "One-Sided", "one-sided"),
            ],
        );

        let md = render(&doc);
        assert!(md.contains("- [Limits](#limits)\n"));
        assert!(md.contains("  - [One-Sided](#one-sided)\n"));
        // The title does not link to itself.
        assert!(!md.contains("[Notes](#notes)"));
    }

    #[test]
    fn ordered_items_number_sequentially() {
        let doc = doc(
            vec![
                Block::ListItem {
                    text: "statement".into(),
                    ordered: true,
                },
                Block::ListItem {
                    text: "hypotheses".into(),
                    ordered: true,
                },
                Block::ListItem {
                    text: "proof sketch".into(),
                    ordered: true,
                },
            ],
            vec![],
        );

        let md = render(&doc);
        assert!(md.contains("1. statement\n2. hypotheses\n3. proof sketch"));
    }

    #[test]
    fn adjacent_lists_of_different_kinds_stay_separate() {
        let doc = doc(
            vec![
                Block::ListItem {
                    text: "bullet".into(),
                    ordered: false,
                },
                Block::ListItem {
                    text: "first".into(),
                    ordered: true,
                },
                Block::ListItem {
                    text: "second".into(),
                    ordered: true,
                },
            ],
            vec![],
        );

        let md = render(&doc);
        assert!(md.contains("- bullet\n"));
        // Numbering restarts in the ordered run.
        assert!(md.contains("1. first\n2. second"));
    }

    #[test]
    fn consecutive_quotes_share_one_blockquote() {
        let doc = doc(
            vec![
                Block::Quote {
                    text: "first line".into(),
                },
                Block::Quote {
                    text: "second line".into(),
                },
            ],
            vec![],
        );

        let md = render(&doc);
        assert!(md.contains("> first line\n> second line\n"));
    }

    #[test]
    fn document_without_title_still_renders() {
        let doc = doc(
            vec![
                Block::Paragraph {
                    text: "prose first".into(),
                },
                Block::Heading {
                    level: 2,
                    title: "Synthesis".into(),
                },
            ],
            vec![entry(2, "Synthesis", "synthesis")],
        );

        let md = render(&doc);
        assert!(md.starts_with("## Contents"));
        assert!(md.contains("- [Synthesis](#synthesis)"));
        assert!(md.contains("prose first"));
    }

    #[test]
    fn output_ends_with_a_single_newline() {
        let doc = doc(
            vec![Block::Paragraph {
                text: "just text".into(),
            }],
            vec![],
        );

        let md = render(&doc);
        assert!(md.ends_with("just text\n"));
        assert!(!md.ends_with("\n\n"));
    }
}

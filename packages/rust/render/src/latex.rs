//! Standalone LaTeX article writer.

use std::sync::LazyLock;

use lectern_shared::Block;
use regex::Regex;

use crate::DocumentView;

const PREAMBLE: &str = r"\documentclass[11pt]{article}
\usepackage[utf8]{inputenc}
\usepackage[T1]{fontenc}
\usepackage{lmodern}
\usepackage[margin=1in]{geometry}
\usepackage{enumitem}
\usepackage{parskip}
\usepackage{hyperref}
";

/// Render the document as a standalone LaTeX article.
pub(crate) fn write(view: &DocumentView) -> String {
    let mut out = String::from(PREAMBLE);
    out.push_str("\n\\begin{document}\n\n");
    out.push_str("\\tableofcontents\n\n");
    write_blocks(&mut out, view.blocks());
    out.push_str("\\end{document}\n");
    out
}

fn write_blocks(out: &mut String, blocks: &[Block]) {
    let mut i = 0;
    while i < blocks.len() {
        match &blocks[i] {
            Block::Heading { level, title } => {
                out.push_str(&format!(
                    "\\{}{{{}}}\n\n",
                    heading_command(*level),
                    inline(title)
                ));
                i += 1;
            }
            Block::Paragraph { text } => {
                out.push_str(&inline(text));
                out.push_str("\n\n");
                i += 1;
            }
            Block::ListItem { ordered, .. } => {
                let run_ordered = *ordered;
                let env = if run_ordered { "enumerate" } else { "itemize" };
                out.push_str(&format!("\\begin{{{env}}}\n"));
                while let Some(Block::ListItem { text, ordered }) = blocks.get(i) {
                    if *ordered != run_ordered {
                        break;
                    }
                    out.push_str(&format!("  \\item {}\n", inline(text)));
                    i += 1;
                }
                out.push_str(&format!("\\end{{{env}}}\n\n"));
            }
            Block::Quote { .. } => {
                out.push_str("\\begin{quote}\n");
                while let Some(Block::Quote { text }) = blocks.get(i) {
                    out.push_str(&inline(text));
                    out.push('\n');
                    i += 1;
                }
                out.push_str("\\end{quote}\n\n");
            }
        }
    }
}

fn heading_command(level: usize) -> &'static str {
    match level {
        1 => "section",
        2 => "subsection",
        3 => "subsubsection",
        _ => "paragraph",
    }
}

/// Escape LaTeX-reserved characters, then convert markdown emphasis markers
/// to their LaTeX commands. Escaping runs first so converted commands keep
/// their backslashes.
fn inline(text: &str) -> String {
    static CODE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("valid regex"));
    static BOLD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("valid regex"));
    static ITALIC_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*([^*]+)\*").expect("valid regex"));

    let escaped = escape(text);
    let code = CODE_RE.replace_all(&escaped, r"\texttt{${1}}");
    let bold = BOLD_RE.replace_all(&code, r"\textbf{${1}}");
    ITALIC_RE.replace_all(&bold, r"\textit{${1}}").into_owned()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str(r"\textbackslash{}"),
            '#' => out.push_str(r"\#"),
            '$' => out.push_str(r"\$"),
            '%' => out.push_str(r"\%"),
            '&' => out.push_str(r"\&"),
            '_' => out.push_str(r"\_"),
            '{' => out.push_str(r"\{"),
            '}' => out.push_str(r"\}"),
            '~' => out.push_str(r"\textasciitilde{}"),
            '^' => out.push_str(r"\textasciicircum{}"),
            _ => out.push(c),
        }
    }
    out
}

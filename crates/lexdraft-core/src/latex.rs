//! Best-effort LaTeX subset to HTML conversion for document previews.
//!
//! This is an ordered list of textual substitutions, not a parser. Each pass
//! assumes the earlier ones already normalised the text, so the order below
//! must not change. Unbalanced braces or unknown environments produce
//! whatever the passes make of them.

use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::warn;

use crate::state::{DiffEntry, StructuredDiff};

/// Diff entries at or below this many characters are too ambiguous to highlight.
pub const MIN_HIGHLIGHT_LEN: usize = 3;

/// Delay before the print page opens the print dialog, in milliseconds.
pub const PRINT_DELAY_MS: u64 = 500;

// Angle brackets in the source are parked on private-use code points so the
// table pass can split on `&` without tripping over `&lt;`.
const LT: char = '\u{E000}';
const GT: char = '\u{E001}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Inline preview pane
    Preview,
    /// Standalone page sent to the browser print dialog
    Print,
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| re($re));
    };
}

// 1. preamble
pattern!(PREAMBLE, r"(?s)\A.*?\\begin\{document\}");
pattern!(DOCUMENT_END, r"(?s)\\end\{document\}.*\z");
pattern!(DOCUMENTCLASS, r"(?m)^[ \t]*\\documentclass(?:\[[^\]]*\])?\{[^}]*\}[ \t]*\r?\n?");
pattern!(USEPACKAGE, r"(?m)^[ \t]*\\usepackage(?:\[[^\]]*\])?\{[^}]*\}[ \t]*\r?\n?");

// 2. tables
pattern!(TABLE_WRAPPER, r"\\(?:begin\{table\}(?:\[[^\]]*\])?|end\{table\})");
pattern!(TABULAR, r"(?s)\\begin\{tabular\*?\}(?:\{[^}]*\})?(?:\{(?:[^{}]|\{[^}]*\})*\})(.*?)\\end\{tabular\*?\}");
pattern!(HLINE, r"\\(?:hline|toprule|midrule|bottomrule|cline\{[^}]*\})");

// 3. residual column specs
pattern!(COLUMN_SPEC_WIDTH, r"\{\s*\|?\s*(?:[pmb]\{[^}]*\}\s*\|?\s*)+\}");
pattern!(COLUMN_SPEC_ALIGN, r"\{\s*\|?(?:\s*[lcr]\s*\|?)+\s*\}");
pattern!(COLUMN_SPEC_AT, r"@\{\}");

// 4. structure and inline markup
pattern!(TITLE, r"\\title\{([^}]*)\}");
pattern!(AUTHOR, r"\\author\{([^}]*)\}");
pattern!(DATE, r"\\date\{([^}]*)\}");
pattern!(MAKETITLE, r"\\maketitle\b");
pattern!(SECTION, r"\\section\*?\{([^}]*)\}");
pattern!(SUBSECTION, r"\\subsection\*?\{([^}]*)\}");
pattern!(SUBSUBSECTION, r"\\subsubsection\*?\{([^}]*)\}");
pattern!(BOLD, r"\\textbf\{([^}]*)\}");
pattern!(ITALIC, r"\\(?:textit|emph)\{([^}]*)\}");
pattern!(UNDERLINE, r"\\underline\{([^}]*)\}");
pattern!(CENTER_BEGIN, r"\\begin\{center\}");
pattern!(CENTER_END, r"\\end\{center\}");
pattern!(ITEMIZE_BEGIN, r"\\begin\{itemize\}(?:\[[^\]]*\])?");
pattern!(ITEMIZE_END, r"\\end\{itemize\}");
pattern!(ENUMERATE_BEGIN, r"\\begin\{enumerate\}(?:\[[^\]]*\])?");
pattern!(ENUMERATE_END, r"\\end\{enumerate\}");
pattern!(ITEM_LABELLED, r"\\item\s*\[([^\]]*)\]\s*");
pattern!(ITEM, r"\\item\b\s*");

// 5. spacing and rules
pattern!(VSPACE, r"\\vspace\*?\{[^}]*\}");
pattern!(HSPACE, r"\\hspace\*?\{[^}]*\}");
pattern!(SKIP, r"\\(?:bigskip|medskip|smallskip)\b");
pattern!(QUAD, r"\\q?quad\b");
pattern!(LINE_BREAK, r"\\\\(?:\[[^\]]*\])?|\\newline\b|\\linebreak\b");
pattern!(RULE, r"\\rule\{[^}]*\}\{[^}]*\}|\\hrule\b|\\hline\b");
pattern!(PAGE_BREAK, r"\\(?:newpage|clearpage|pagebreak)\b");
pattern!(NOINDENT, r"\\noindent\b\s*");
pattern!(PAR, r"\\par\b");

// 7. leftovers
pattern!(NON_CONTENT, r"\\(?:label|pagestyle|thispagestyle|geometry|hypersetup)\{[^}]*\}|\\(?:setlength|addtolength)\{[^}]*\}\{[^}]*\}");
pattern!(COMMAND_WITH_ARG, r"\\[a-zA-Z]+\*?(?:\[[^\]]*\])?\{([^{}]*)\}");
pattern!(COMMAND, r"\\[a-zA-Z]+\*?");
pattern!(BRACE_GROUP, r"\{([^{}]*)\}");

// 8. paragraphs
pattern!(BLANK_RUN, r"\n(?:[ \t]*\n)+");
pattern!(EMPTY_PARAGRAPH, r"<p>\s*</p>");

/// Render a LaTeX document body to an HTML fragment.
///
/// When `diff` is given and has changes, literal occurrences of its entries
/// are wrapped in highlight spans.
pub fn render(source: &str, mode: RenderMode, diff: Option<&StructuredDiff>) -> String {
    let mut html = source.replace('<', &LT.to_string()).replace('>', &GT.to_string());

    html = strip_preamble(&html);
    html = convert_tables(&html);
    html = strip_column_specs(&html);
    html = convert_structure(&html, mode);
    html = convert_spacing(&html);
    html = unescape_specials(&html);
    html = strip_leftover_commands(&html);
    html = build_paragraphs(&html);

    html = html.replace(LT, "&lt;").replace(GT, "&gt;");

    match diff {
        Some(d) if d.has_changes => highlight_changes(&html, d),
        _ => html,
    }
}

fn strip_preamble(text: &str) -> String {
    let body = if PREAMBLE.is_match(text) {
        PREAMBLE.replace(text, "").into_owned()
    } else {
        DOCUMENTCLASS.replace_all(text, "").into_owned()
    };
    let body = DOCUMENT_END.replace(&body, "");
    USEPACKAGE.replace_all(&body, "").into_owned()
}

fn convert_tables(text: &str) -> String {
    let text = TABLE_WRAPPER.replace_all(text, "");
    TABULAR
        .replace_all(&text, |caps: &Captures| signature_block(&caps[1]))
        .into_owned()
}

/// Lay out tabular rows as a two-column signature block.
fn signature_block(body: &str) -> String {
    let body = HLINE.replace_all(body, "");
    let mut html = String::from("\n<div class=\"signature-block\">");

    for row in body.split("\\\\") {
        let cells: Vec<&str> = split_columns(row)
            .into_iter()
            .map(str::trim)
            .collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        match cells.as_slice() {
            [single] => {
                html.push_str("<div class=\"signature-row\"><div class=\"signature-cell single\">");
                html.push_str(single);
                html.push_str("</div></div>");
            }
            [left, rest @ ..] => {
                html.push_str("<div class=\"signature-row\"><div class=\"signature-cell\">");
                html.push_str(left);
                html.push_str("</div><div class=\"signature-cell\">");
                html.push_str(&rest.join(" "));
                html.push_str("</div></div>");
            }
            [] => {}
        }
    }

    html.push_str("</div>\n");
    html
}

/// Split a table row on `&`, leaving escaped `\&` inside the cell.
fn split_columns(row: &str) -> Vec<&str> {
    let mut cells = Vec::new();
    let mut start = 0;
    let mut prev = '\0';
    for (i, c) in row.char_indices() {
        if c == '&' && prev != '\\' {
            cells.push(&row[start..i]);
            start = i + 1;
        }
        prev = c;
    }
    cells.push(&row[start..]);
    cells
}

fn strip_column_specs(text: &str) -> String {
    let text = COLUMN_SPEC_WIDTH.replace_all(text, "");
    let text = COLUMN_SPEC_ALIGN.replace_all(&text, "");
    COLUMN_SPEC_AT.replace_all(&text, "").into_owned()
}

fn convert_structure(text: &str, mode: RenderMode) -> String {
    let (title, section, subsection, subsubsection) = match mode {
        RenderMode::Preview => (
            "<h1>$1</h1>",
            "<h2>$1</h2>",
            "<h3>$1</h3>",
            "<h4>$1</h4>",
        ),
        RenderMode::Print => (
            "<h1 class=\"doc-title\">$1</h1>",
            "<h2 class=\"section\">$1</h2>",
            "<h3 class=\"subsection\">$1</h3>",
            "<h4 class=\"subsection\">$1</h4>",
        ),
    };

    let mut out = TITLE.replace_all(text, title).into_owned();
    out = match mode {
        RenderMode::Preview => {
            let out = AUTHOR.replace_all(&out, "<p class=\"meta\">$1</p>");
            DATE.replace_all(&out, "<p class=\"meta\">$1</p>").into_owned()
        }
        RenderMode::Print => {
            let out = AUTHOR.replace_all(&out, "<div class=\"doc-meta\">$1</div>");
            DATE.replace_all(&out, "<div class=\"doc-meta\">$1</div>").into_owned()
        }
    };
    out = MAKETITLE.replace_all(&out, "").into_owned();

    // Longest name first so \subsection is not eaten by \section.
    out = SUBSUBSECTION.replace_all(&out, subsubsection).into_owned();
    out = SUBSECTION.replace_all(&out, subsection).into_owned();
    out = SECTION.replace_all(&out, section).into_owned();

    out = BOLD.replace_all(&out, "<strong>$1</strong>").into_owned();
    out = ITALIC.replace_all(&out, "<em>$1</em>").into_owned();
    out = UNDERLINE.replace_all(&out, "<u>$1</u>").into_owned();

    out = CENTER_BEGIN.replace_all(&out, "<div class=\"center\">").into_owned();
    out = CENTER_END.replace_all(&out, "</div>").into_owned();
    out = ITEMIZE_BEGIN.replace_all(&out, "<ul>").into_owned();
    out = ITEMIZE_END.replace_all(&out, "</ul>").into_owned();
    out = ENUMERATE_BEGIN.replace_all(&out, "<ol>").into_owned();
    out = ENUMERATE_END.replace_all(&out, "</ol>").into_owned();
    out = ITEM_LABELLED.replace_all(&out, "<li><strong>$1</strong> ").into_owned();
    ITEM.replace_all(&out, "<li>").into_owned()
}

fn convert_spacing(text: &str) -> String {
    let mut out = VSPACE.replace_all(text, "<br>").into_owned();
    out = HSPACE.replace_all(&out, "&nbsp;").into_owned();
    out = SKIP.replace_all(&out, "<br>").into_owned();
    out = QUAD.replace_all(&out, "&nbsp;&nbsp;").into_owned();
    out = LINE_BREAK.replace_all(&out, "<br>").into_owned();
    out = RULE.replace_all(&out, "<hr>").into_owned();
    out = PAGE_BREAK.replace_all(&out, "<hr class=\"page-break\">").into_owned();
    out = NOINDENT.replace_all(&out, "").into_owned();
    out = PAR.replace_all(&out, "\n\n").into_owned();
    out.replace('~', "&nbsp;")
}

fn unescape_specials(text: &str) -> String {
    text.replace("\\&", "&amp;")
        .replace("---", "&mdash;")
        .replace("--", "&ndash;")
        .replace("``", "&ldquo;")
        .replace("''", "&rdquo;")
        .replace("\\%", "%")
        .replace("\\$", "$")
        .replace("\\#", "#")
        .replace("\\_", "_")
}

fn strip_leftover_commands(text: &str) -> String {
    let mut out = NON_CONTENT.replace_all(text, "").into_owned();
    // Innermost groups unwrap first; repeat so nested arguments flatten too.
    loop {
        let next = COMMAND_WITH_ARG.replace_all(&out, "$1").into_owned();
        if next == out {
            break;
        }
        out = next;
    }
    out = COMMAND.replace_all(&out, "").into_owned();
    loop {
        let next = BRACE_GROUP.replace_all(&out, "$1").into_owned();
        if next == out {
            break;
        }
        out = next;
    }
    out.replace(['{', '}'], "")
}

fn build_paragraphs(text: &str) -> String {
    let body = BLANK_RUN.replace_all(text.trim(), "</p>\n<p>");
    let wrapped = format!("<p>{}</p>", body);
    EMPTY_PARAGRAPH.replace_all(&wrapped, "").into_owned()
}

/// Wrap literal occurrences of changed text in the rendered HTML.
///
/// Additions are marked before deletions, and every occurrence of an entry
/// is wrapped, not just the one that actually changed. Markup is never
/// matched, only the text between tags.
pub fn highlight_changes(html: &str, diff: &StructuredDiff) -> String {
    let mut out = mark_entries(html, &diff.additions, "diff-added");
    out = mark_entries(&out, &diff.deletions, "diff-deleted");
    out
}

fn mark_entries(html: &str, entries: &[DiffEntry], class: &str) -> String {
    let mut out = html.to_string();
    for entry in entries {
        let needle = entry.content.trim();
        if needle.chars().count() <= MIN_HIGHLIGHT_LEN {
            continue;
        }
        let needle = needle.replace('<', "&lt;").replace('>', "&gt;");
        let pattern = match Regex::new(&regex::escape(&needle)) {
            Ok(p) => p,
            Err(e) => {
                warn!("skipping diff highlight: {}", e);
                continue;
            }
        };
        out = mark_text_runs(&out, &pattern, class);
    }
    out
}

/// Apply one highlight to the text between tags only.
///
/// Tags and text already inside a diff span are copied through untouched.
fn mark_text_runs(html: &str, pattern: &Regex, class: &str) -> String {
    let replacement = format!("<span class=\"{}\">$0</span>", class);
    let mut out = String::with_capacity(html.len());
    let mut marked_depth = 0usize;
    let mut rest = html;

    while !rest.is_empty() {
        if rest.starts_with('<') {
            let end = rest.find('>').map_or(rest.len(), |i| i + 1);
            let tag = &rest[..end];
            if tag.starts_with("<span class=\"diff-") {
                marked_depth += 1;
            } else if tag == "</span>" && marked_depth > 0 {
                marked_depth -= 1;
            }
            out.push_str(tag);
            rest = &rest[end..];
        } else {
            let end = rest.find('<').unwrap_or(rest.len());
            let text = &rest[..end];
            if marked_depth > 0 {
                out.push_str(text);
            } else {
                out.push_str(&pattern.replace_all(text, replacement.as_str()));
            }
            rest = &rest[end..];
        }
    }
    out
}

const PREVIEW_STYLE: &str = r#"
body { font-family: Georgia, 'Times New Roman', serif; line-height: 1.6; max-width: 46rem; margin: 2rem auto; color: #1a1a1a; }
h1 { text-align: center; font-size: 1.6rem; }
h2 { font-size: 1.2rem; margin-top: 1.6rem; }
h3, h4 { font-size: 1.05rem; }
.meta, .doc-meta { text-align: center; color: #555; }
.center { text-align: center; }
.signature-block { margin-top: 2.5rem; }
.signature-row { display: flex; gap: 3rem; margin-bottom: 1.2rem; }
.signature-cell { flex: 1; }
.signature-cell.single { flex: 0 0 100%; }
.diff-added { background: #d4f8d4; }
.diff-deleted { background: #f8d4d4; text-decoration: line-through; }
hr.page-break { border: none; page-break-after: always; }
"#;

const PRINT_STYLE: &str = r#"
@page { margin: 2.5cm; }
body { font-family: 'Times New Roman', serif; font-size: 12pt; line-height: 1.5; color: #000; }
h1.doc-title { text-align: center; font-size: 18pt; text-transform: uppercase; margin-bottom: 0.4cm; }
.doc-meta { text-align: center; margin-bottom: 0.2cm; }
h2.section { font-size: 13pt; margin-top: 0.8cm; }
h3.subsection, h4.subsection { font-size: 12pt; }
.center { text-align: center; }
.signature-block { margin-top: 1.5cm; page-break-inside: avoid; }
.signature-row { display: flex; gap: 2cm; margin-bottom: 0.8cm; }
.signature-cell { flex: 1; }
.signature-cell.single { flex: 0 0 100%; }
hr.page-break { border: none; page-break-after: always; }
"#;

/// Standalone HTML page around a rendered document.
///
/// The print variant never highlights changes and schedules the browser
/// print dialog once layout has settled.
pub fn render_page(source: &str, mode: RenderMode, diff: Option<&StructuredDiff>) -> String {
    let (style, diff, script) = match mode {
        RenderMode::Preview => (PREVIEW_STYLE, diff, String::new()),
        RenderMode::Print => (
            PRINT_STYLE,
            None,
            format!(
                "<script>window.addEventListener('load', function () {{ setTimeout(function () {{ window.print(); }}, {}); }});</script>\n",
                PRINT_DELAY_MS
            ),
        ),
    };
    let body = render(source, mode, diff);
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Document</title>\n<style>{}</style>\n</head>\n<body>\n{}\n{}</body>\n</html>\n",
        style, body, script
    )
}

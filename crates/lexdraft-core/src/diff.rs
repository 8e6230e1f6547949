//! Index-aligned line comparison between two document versions.
//!
//! Lines are compared by position only. An insertion near the top shifts every
//! later line and marks all of them modified; this is the intended coarse
//! behaviour, not an edit-distance diff.

use crate::markup::escape_html;
use crate::state::StructuredDiff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineChange {
    Unchanged,
    Added,
    Modified,
}

impl LineChange {
    pub fn css_class(&self) -> &'static str {
        match self {
            LineChange::Unchanged => "line",
            LineChange::Added => "line added",
            LineChange::Modified => "line modified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine<'a> {
    pub number: usize,
    pub text: &'a str,
    pub change: LineChange,
}

fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l))
}

/// Mark every line of `current` against the line at the same index in `previous`.
pub fn line_diff<'a>(previous: &str, current: &'a str) -> Vec<DiffLine<'a>> {
    let old: Vec<&str> = split_lines(previous).collect();

    split_lines(current)
        .enumerate()
        .map(|(i, text)| {
            let change = match old.get(i) {
                None => LineChange::Added,
                Some(prev) if *prev != text => LineChange::Modified,
                Some(_) => LineChange::Unchanged,
            };
            DiffLine {
                number: i + 1,
                text,
                change,
            }
        })
        .collect()
}

/// Render a line diff as an HTML line list.
pub fn line_diff_html(previous: &str, current: &str) -> String {
    let mut html = String::from("<div class=\"line-diff\">\n");
    for line in line_diff(previous, current) {
        html.push_str(&format!(
            "<div class=\"{}\"><span class=\"line-no\">{}</span>{}</div>\n",
            line.change.css_class(),
            line.number,
            escape_html(line.text)
        ));
    }
    html.push_str("</div>\n");
    html
}

/// Short human summary of a structured diff, e.g. "+3 / -1".
pub fn summarize(diff: &StructuredDiff) -> String {
    if !diff.has_changes {
        return "no changes".to_string();
    }
    format!("+{} / -{}", diff.additions.len(), diff.deletions.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DiffEntry;
    use pretty_assertions::assert_eq;

    fn changes(previous: &str, current: &str) -> Vec<LineChange> {
        line_diff(previous, current).into_iter().map(|l| l.change).collect()
    }

    #[test]
    fn test_identical_documents_are_unchanged() {
        assert_eq!(
            changes("a\nb", "a\nb"),
            vec![LineChange::Unchanged, LineChange::Unchanged]
        );
    }

    #[test]
    fn test_extra_lines_are_added_never_modified() {
        assert_eq!(
            changes("a\nb", "a\nB\nc\nd"),
            vec![
                LineChange::Unchanged,
                LineChange::Modified,
                LineChange::Added,
                LineChange::Added,
            ]
        );
    }

    #[test]
    fn test_insertion_cascades_modified() {
        assert_eq!(
            changes("one\ntwo\nthree", "zero\none\ntwo\nthree"),
            vec![
                LineChange::Modified,
                LineChange::Modified,
                LineChange::Modified,
                LineChange::Added,
            ]
        );
    }

    #[test]
    fn test_shorter_current_reports_only_its_lines() {
        let diff = line_diff("a\nb\nc", "a");
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].change, LineChange::Unchanged);
    }

    #[test]
    fn test_crlf_matches_lf() {
        assert_eq!(changes("a\r\nb", "a\nb"), vec![LineChange::Unchanged; 2]);
    }

    #[test]
    fn test_html_escapes_and_numbers_lines() {
        let html = line_diff_html("x", "x\n<b>");
        assert!(html.contains("<div class=\"line\"><span class=\"line-no\">1</span>x</div>"));
        assert!(html.contains(
            "<div class=\"line added\"><span class=\"line-no\">2</span>&lt;b&gt;</div>"
        ));
    }

    #[test]
    fn test_summarize() {
        let diff = StructuredDiff {
            has_changes: true,
            additions: vec![DiffEntry { content: "a".into() }],
            deletions: vec![],
        };
        assert_eq!(summarize(&diff), "+1 / -0");
        assert_eq!(summarize(&StructuredDiff::default()), "no changes");
    }
}

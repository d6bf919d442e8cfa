//! Word-level diff of rich-text bodies, rendered as HTML for review.

use similar::{Algorithm, ChangeTag, TextDiff};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Same(String),
    Removed(String),
    Added(String),
}

/// Diff `old` against `new` word by word.
///
/// Whitespace that only separates two edits is folded into them, and every
/// edit block lists its removals before its additions, so a rewritten
/// sentence reads as one removal and one addition rather than a word-by-word
/// interleaving.
pub fn segments(old: &str, new: &str) -> Vec<Segment> {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Patience)
        .diff_words(old, new);

    let mut runs: Vec<(ChangeTag, String)> = Vec::new();
    for change in diff.iter_all_changes() {
        match runs.last_mut() {
            Some((tag, text)) if *tag == change.tag() => text.push_str(change.value()),
            _ => runs.push((change.tag(), change.value().to_string())),
        }
    }

    let mut out = Vec::new();
    let mut removed = String::new();
    let mut added = String::new();
    let last = runs.len().saturating_sub(1);
    for (i, (tag, text)) in runs.into_iter().enumerate() {
        match tag {
            ChangeTag::Delete => removed.push_str(&text),
            ChangeTag::Insert => added.push_str(&text),
            ChangeTag::Equal => {
                let pending = !removed.is_empty() || !added.is_empty();
                if pending && i < last && text.trim().is_empty() {
                    removed.push_str(&text);
                    added.push_str(&text);
                } else {
                    flush(&mut out, &mut removed, &mut added);
                    out.push(Segment::Same(text));
                }
            }
        }
    }
    flush(&mut out, &mut removed, &mut added);
    out
}

fn flush(out: &mut Vec<Segment>, removed: &mut String, added: &mut String) {
    if !removed.is_empty() {
        out.push(Segment::Removed(std::mem::take(removed)));
    }
    if !added.is_empty() {
        out.push(Segment::Added(std::mem::take(added)));
    }
}

/// Render the diff as escaped HTML with `<del>` / `<ins>` markup.
pub fn render_html(old: &str, new: &str) -> String {
    let mut html = String::with_capacity(old.len().max(new.len()) + 64);
    for segment in segments(old, new) {
        match segment {
            Segment::Same(text) => html.push_str(&escape_html(&text)),
            Segment::Removed(text) => {
                html.push_str("<del class=\"diff-removed\">");
                html.push_str(&escape_html(&text));
                html.push_str("</del>");
            }
            Segment::Added(text) => {
                html.push_str("<ins class=\"diff-added\">");
                html.push_str(&escape_html(&text));
                html.push_str("</ins>");
            }
        }
    }
    html
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

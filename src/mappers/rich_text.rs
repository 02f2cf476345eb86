// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Rich text conversion: structured blocks → the target's inline HTML.
//!
//! Only bold, italic and links survive; unknown marks are ignored. Links
//! wrap outermost so formatting nests inside the anchor. Text and href
//! values are HTML-escaped.

use crate::record::{Mark, RichTextBlock, Span};

/// Render blocks as paragraphs of inline HTML. Empty input yields an
/// empty string, which mappers treat as "omit the field".
pub fn to_html(blocks: &[RichTextBlock]) -> String {
    blocks
        .iter()
        .map(|block| format!("<p>{}</p>", render_spans(&block.spans)))
        .collect::<Vec<_>>()
        .join("")
}

fn render_spans(spans: &[Span]) -> String {
    spans.iter().map(render_span).collect()
}

fn render_span(span: &Span) -> String {
    let mut html = escape(&span.text);
    if span.marks.contains(&Mark::Italic) {
        html = format!("<em>{html}</em>");
    }
    if span.marks.contains(&Mark::Bold) {
        html = format!("<strong>{html}</strong>");
    }
    // Link wraps last so it ends up outermost
    if let Some(href) = span.marks.iter().find_map(|m| match m {
        Mark::Link { href } => Some(href),
        _ => None,
    }) {
        html = format!("<a href=\"{}\">{}</a>", escape(href), html);
    }
    html
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

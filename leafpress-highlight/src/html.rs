//! HTML emission for classified tokens.

use crate::classify::Classifier;
use crate::lexer::Token;

/// Render `tokens` as HTML, wrapping classified runs in `<span class="..">`.
///
/// Consecutive tokens with the same class share one span. Whitespace-only
/// tokens are held back until the next visible token, so they never split
/// a span and never end up inside one that closes right after them.
pub fn write_html(tokens: &[Token], classify: Classifier) -> String {
    let mut out = String::new();
    let mut class: Option<&'static str> = None;
    let mut space = String::new();

    for (i, token) in tokens.iter().enumerate() {
        if token.is_whitespace() {
            space.push_str(&token.text);
            continue;
        }

        let prev = i.checked_sub(1).map(|p| &tokens[p]);
        let next = tokens.get(i + 1);
        let current = classify(prev, token, next);

        if current != class {
            close_span(&mut out, &mut class);
            out.push_str(&space);
            space.clear();
            if let Some(name) = current {
                out.push_str("<span class=\"");
                out.push_str(name);
                out.push_str("\">");
                class = Some(name);
            }
        } else {
            out.push_str(&space);
            space.clear();
        }

        escape_into(&mut out, &token.text);
    }

    close_span(&mut out, &mut class);
    out.push_str(&space);
    out
}

fn close_span(out: &mut String, class: &mut Option<&'static str>) {
    if class.take().is_some() {
        out.push_str("</span>");
    }
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(c),
        }
    }
}

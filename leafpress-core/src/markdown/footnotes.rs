//! Footnote references (`[^id]`) and definition lists.

use once_cell::sync::Lazy;
use pulldown_cmark::{CowStr, Event, Tag, TagEnd};
use regex::Regex;

use super::html_escape;

static REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\^([^\]\s]+)\]").expect("valid footnote reference regex"));

/// A piece of running text, split around footnote references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineToken<'a> {
    Text(&'a str),
    FootnoteReference { raw: &'a str, id: &'a str },
}

pub fn split_references(text: &str) -> Vec<InlineToken<'_>> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for caps in REFERENCE_RE.captures_iter(text) {
        let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            tokens.push(InlineToken::Text(&text[last..whole.start()]));
        }
        tokens.push(InlineToken::FootnoteReference {
            raw: whole.as_str(),
            id: id.as_str(),
        });
        last = whole.end();
    }
    if last < text.len() {
        tokens.push(InlineToken::Text(&text[last..]));
    }
    tokens
}

/// Replace `[^id]` in text events with reference markup.
///
/// pulldown-cmark splits text at brackets, so adjacent text events are
/// merged first. Code blocks are left alone.
pub fn expand_references(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut result = Vec::with_capacity(events.len());
    let mut in_code_block = false;
    let mut events = events.into_iter().peekable();

    while let Some(event) = events.next() {
        match event {
            Event::Start(Tag::CodeBlock(_)) => {
                in_code_block = true;
                result.push(event);
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                result.push(event);
            }
            Event::Text(text) if !in_code_block => {
                let mut merged = text.into_string();
                while let Some(Event::Text(next)) = events.peek() {
                    merged.push_str(next);
                    events.next();
                }

                if !merged.contains("[^") {
                    result.push(Event::Text(CowStr::from(merged)));
                    continue;
                }
                for token in split_references(&merged) {
                    result.push(match token {
                        InlineToken::Text(text) => Event::Text(CowStr::from(text.to_string())),
                        InlineToken::FootnoteReference { id, .. } => {
                            Event::InlineHtml(CowStr::from(reference_html(id)))
                        }
                    });
                }
            }
            other => result.push(other),
        }
    }

    result
}

pub fn reference_html(id: &str) -> String {
    let id = html_escape(id);
    format!(r##"<sup class="footnote-ref"><a href="#fn-{id}" id="fnref-{id}">{id}</a></sup>"##)
}

/// Definition list from `(id, rendered body)` pairs, in source order.
pub fn definitions_html<'a>(items: impl IntoIterator<Item = (&'a str, String)>) -> String {
    let mut html = String::from("<div class=\"footnotes\">\n<ol>\n");
    for (id, body) in items {
        let id = html_escape(id);
        html.push_str(&format!(
            r##"<li id="fn-{id}">{body} <a href="#fnref-{id}" class="footnote-backref">↩</a></li>"##
        ));
        html.push('\n');
    }
    html.push_str("</ol>\n</div>\n");
    html
}

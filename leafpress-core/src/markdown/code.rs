//! Fenced code blocks.

use crate::highlight::{HighlightError, Highlighter};

use super::html_escape;

/// A `<pre>` block; with a language the body comes from `highlighter`.
pub async fn render(
    highlighter: &dyn Highlighter,
    language: Option<&str>,
    code: &str,
) -> Result<String, HighlightError> {
    match language {
        Some(language) => {
            let body = highlighter.highlight(language, code).await?;
            Ok(format!(
                "<pre><code class=\"language-{}\">{}</code></pre>\n",
                html_escape(language),
                body
            ))
        }
        None => Ok(format!("<pre><code>{}</code></pre>\n", html_escape(code))),
    }
}

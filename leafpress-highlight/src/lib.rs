//! # leafpress-highlight
//!
//! Syntax highlighting service for leafpress.
//!
//! Pages are generated by a separate process that sends code blocks here over
//! a Unix domain socket (see [`protocol`]) and receives classified HTML back.
//! Keeping the grammars loaded in one long-lived process avoids paying their
//! startup cost for every document.

pub mod classify;
pub mod html;
pub mod lexer;
pub mod protocol;
pub mod server;
pub mod shutdown;

use thiserror::Error;

pub use lexer::{Lexer, Token, TokenKind};
pub use protocol::{ProtocolError, Response};
pub use server::{signal_ready, Server, ServerError};

/// Failure to answer one request. Sent back to the client as an error frame;
/// the connection stays usable.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invalid request: not valid UTF-8")]
    InvalidUtf8,

    #[error("{0:?}: unsupported language")]
    UnsupportedLanguage(String),

    #[error("lexing code: {0}")]
    Lexing(#[from] lexer::LexError),
}

/// Highlight `code` written in `language`, returning an HTML fragment.
pub fn highlight(language: &str, code: &str) -> Result<String, RequestError> {
    let lexer = Lexer::for_language(language)
        .ok_or_else(|| RequestError::UnsupportedLanguage(language.to_string()))?;
    let tokens = lexer.tokenize(code)?;
    Ok(html::write_html(&tokens, classify::classifier_for(language)))
}

/// Answer a raw request frame (terminator already stripped).
pub fn handle_request(frame: &[u8]) -> Result<String, RequestError> {
    let frame = std::str::from_utf8(frame).map_err(|_| RequestError::InvalidUtf8)?;
    let (language, code) = protocol::parse_request(frame)?;
    highlight(language, code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_language_names_the_language() {
        let err = handle_request(b"nonexistent:foo").unwrap_err();
        assert!(matches!(err, RequestError::UnsupportedLanguage(_)));
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn missing_separator_is_malformed() {
        let err = handle_request(b"rust fn main() {}").unwrap_err();
        assert_eq!(err.to_string(), "invalid request: no ':' found");
    }

    #[test]
    fn rejects_invalid_utf8() {
        let err = handle_request(b"rust:\xff\xfe").unwrap_err();
        assert!(matches!(err, RequestError::InvalidUtf8));
    }

    #[test]
    fn highlights_rust() {
        let html = handle_request(b"rust:// hello\nfn main() {}\n").unwrap();
        assert!(html.contains(r#"<span class="at">"#), "{html}");
        assert!(html.contains("main"));
        assert!(html.ends_with('\n'));
    }

    #[test]
    fn ruby_hash_keys_stay_unstyled() {
        let html = highlight("ruby", "h = { key: 1 }").unwrap();
        assert!(html.contains(r#"key: <span class="cn">1</span>"#), "{html}");
    }

    #[test]
    fn code_may_contain_separator() {
        let html = handle_request(b"python:x = {'a': 1}").unwrap();
        assert!(html.contains(':'));
        assert!(html.contains("'a'"), "{html}");
    }
}

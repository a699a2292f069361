//! Mapping from tokens to the small set of CSS classes the site styles.
//!
//! | class | used for                              |
//! |-------|---------------------------------------|
//! | `fu`  | type keywords, builtins               |
//! | `cn`  | constants and literals                |
//! | `at`  | comments                              |
//! | `kw`  | other keywords                        |

use crate::lexer::{Token, TokenKind};

/// Returns the CSS class for `token`, given its neighbours.
pub type Classifier = fn(prev: Option<&Token>, token: &Token, next: Option<&Token>) -> Option<&'static str>;

pub fn classifier_for(language: &str) -> Classifier {
    match language.to_ascii_lowercase().as_str() {
        "ruby" | "rb" => ruby_token_class,
        _ => token_class,
    }
}

pub fn token_class(
    _prev: Option<&Token>,
    token: &Token,
    _next: Option<&Token>,
) -> Option<&'static str> {
    match token.kind {
        TokenKind::KeywordType | TokenKind::Builtin => Some("fu"),
        TokenKind::KeywordConstant | TokenKind::Constant => Some("cn"),
        TokenKind::Comment => Some("at"),
        TokenKind::Keyword => Some("kw"),
        TokenKind::Literal | TokenKind::Symbol => Some("cn"),
        TokenKind::InstanceVariable | TokenKind::Other => None,
    }
}

pub fn ruby_token_class(
    prev: Option<&Token>,
    token: &Token,
    next: Option<&Token>,
) -> Option<&'static str> {
    match token.kind {
        TokenKind::Constant => None,
        TokenKind::InstanceVariable => Some("fu"),
        TokenKind::Builtin if token.text == "test" => Some("kw"),
        TokenKind::Builtin => None,
        // Hash keys like `key:` read better unstyled, colon included.
        TokenKind::Symbol if next.is_some_and(|n| n.text == ":") => None,
        TokenKind::Symbol
            if token.text == ":" && prev.is_some_and(|p| p.kind == TokenKind::Symbol) =>
        {
            None
        }
        _ => token_class(prev, token, next),
    }
}

//! Source tokenization on top of syntect's grammars.

use std::sync::OnceLock;
use syntect::easy::ScopeRangeIterator;
use syntect::parsing::{ParseState, ScopeStack, SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;
use thiserror::Error;

static SYNTAX_SET: OnceLock<SyntaxSet> = OnceLock::new();

fn syntax_set() -> &'static SyntaxSet {
    SYNTAX_SET.get_or_init(SyntaxSet::load_defaults_newlines)
}

#[derive(Error, Debug)]
#[error("{0}")]
pub struct LexError(String);

/// Coarse token category, derived from the innermost meaningful scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Comment,
    Keyword,
    /// Type keywords such as `int` or `struct`.
    KeywordType,
    /// Language constants such as `true` or `nil`.
    KeywordConstant,
    Builtin,
    Constant,
    /// Strings, numbers, characters.
    Literal,
    Symbol,
    InstanceVariable,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn is_whitespace(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A grammar for one language.
#[derive(Clone, Copy)]
pub struct Lexer {
    syntax: &'static SyntaxReference,
}

impl Lexer {
    /// Look up a lexer by language name, alias or file extension.
    pub fn for_language(language: &str) -> Option<Self> {
        if language.trim().is_empty() {
            return None;
        }
        syntax_set()
            .find_syntax_by_token(language)
            .map(|syntax| Self { syntax })
    }

    pub fn tokenize(&self, code: &str) -> Result<Vec<Token>, LexError> {
        let ss = syntax_set();
        let mut state = ParseState::new(self.syntax);
        let mut stack = ScopeStack::new();
        let mut tokens = Vec::new();

        for line in LinesWithEndings::from(code) {
            let ops = state
                .parse_line(line, ss)
                .map_err(|err| LexError(err.to_string()))?;
            for (range, op) in ScopeRangeIterator::new(&ops, line) {
                stack.apply(op).map_err(|err| LexError(err.to_string()))?;
                if range.is_empty() {
                    continue;
                }
                tokens.push(Token::new(kind_of(&stack), &line[range]));
            }
        }

        Ok(tokens)
    }
}

fn kind_of(stack: &ScopeStack) -> TokenKind {
    stack
        .as_slice()
        .iter()
        .rev()
        .find_map(|scope| kind_of_scope(&scope.build_string()))
        .unwrap_or(TokenKind::Other)
}

/// `None` means the scope says nothing and the enclosing scope decides.
fn kind_of_scope(scope: &str) -> Option<TokenKind> {
    let starts = |prefix: &str| scope.starts_with(prefix);

    let kind = if starts("comment") {
        TokenKind::Comment
    } else if starts("constant.other.symbol") {
        TokenKind::Symbol
    } else if starts("variable.other.readwrite.instance") {
        TokenKind::InstanceVariable
    } else if starts("constant.language") {
        TokenKind::KeywordConstant
    } else if starts("storage.type") {
        TokenKind::KeywordType
    } else if starts("keyword.operator") {
        TokenKind::Other
    } else if starts("keyword") || starts("storage") {
        TokenKind::Keyword
    } else if starts("support.function")
        || starts("support.type")
        || starts("support.class")
        || starts("variable.language")
    {
        TokenKind::Builtin
    } else if starts("constant.other") || starts("variable.other.constant") {
        TokenKind::Constant
    } else if starts("string") || starts("constant.numeric") || starts("constant.character") {
        TokenKind::Literal
    } else {
        return None;
    };

    Some(kind)
}

//! Line-based tokenizer for the custom block constructs.
//!
//! Anything that is not one of our constructs is collected into
//! [`Token::Markdown`] runs and handed to pulldown-cmark unchanged.

use regex::Regex;

/// A block-level unit of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Plain Markdown, rendered by pulldown-cmark.
    Markdown { raw: String },
    /// Fenced code block.
    Code {
        raw: String,
        language: Option<String>,
        code: String,
    },
    Image(Image),
    /// `$$ ... $$` on lines of its own.
    DisplayMath { raw: String, tex: String },
    /// `:::class` ... `:::`
    Div {
        raw: String,
        class: String,
        children: Vec<Token>,
    },
    /// A run of consecutive `[^id]: text` lines.
    FootnoteDefinitionBlock {
        raw: String,
        items: Vec<FootnoteDefinitionItem>,
    },
}

/// `![caption](path)`, or `![@above caption](path)` to put the caption first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub raw: String,
    pub caption: String,
    pub path: String,
    pub caption_above: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootnoteDefinitionItem {
    pub raw: String,
    pub id: String,
    /// Inline Markdown body.
    pub text: String,
}

/// Recognizes block constructs. Each renderer owns its own instance.
#[derive(Debug, Clone)]
pub struct BlockTokenizer {
    image: Regex,
    footnote: Regex,
    div_open: Regex,
    div_close: Regex,
}

impl Default for BlockTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTokenizer {
    pub fn new() -> Self {
        Self {
            image: Regex::new(r"^!\[(@above\b)?\s*(.*)\]\(\s*([^\s()]+)\s*\)$")
                .expect("valid image regex"),
            footnote: Regex::new(r"^\[\^([^\]\s]+)\]:\s?(.*)$").expect("valid footnote regex"),
            div_open: Regex::new(r"^:::\s*([A-Za-z0-9_-]+)\s*$").expect("valid div regex"),
            div_close: Regex::new(r"^:::\s*$").expect("valid div close regex"),
        }
    }

    pub fn tokenize(&self, source: &str) -> Vec<Token> {
        let lines: Vec<&str> = source.lines().collect();
        self.tokenize_lines(&lines)
    }

    fn tokenize_lines(&self, lines: &[&str]) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut markdown: Vec<&str> = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];

            let matched = if let Some(fence) = Fence::open(line) {
                let end = fence.find_close(lines, i + 1);
                let body = &lines[i + 1..end.min(lines.len())];
                let mut code = body.join("\n");
                if !body.is_empty() {
                    code.push('\n');
                }
                let consumed = (end + 1).min(lines.len());
                Some((
                    Token::Code {
                        raw: lines[i..consumed].join("\n"),
                        language: fence.language,
                        code,
                    },
                    consumed,
                ))
            } else if let Some((tex, consumed)) = display_math(lines, i) {
                Some((
                    Token::DisplayMath {
                        raw: lines[i..consumed].join("\n"),
                        tex,
                    },
                    consumed,
                ))
            } else if let Some(caps) = self.div_open.captures(line) {
                let end = self.find_div_close(lines, i + 1);
                let consumed = (end + 1).min(lines.len());
                Some((
                    Token::Div {
                        raw: lines[i..consumed].join("\n"),
                        class: caps[1].to_string(),
                        children: self.tokenize_lines(&lines[i + 1..end.min(lines.len())]),
                    },
                    consumed,
                ))
            } else if self.footnote.is_match(line) {
                let mut items = Vec::new();
                let mut j = i;
                while let Some(caps) = lines.get(j).and_then(|l| self.footnote.captures(l)) {
                    items.push(FootnoteDefinitionItem {
                        raw: lines[j].to_string(),
                        id: caps[1].to_string(),
                        text: caps[2].trim().to_string(),
                    });
                    j += 1;
                }
                Some((
                    Token::FootnoteDefinitionBlock {
                        raw: lines[i..j].join("\n"),
                        items,
                    },
                    j,
                ))
            } else if let Some(caps) = self.image.captures(line.trim()) {
                Some((
                    Token::Image(Image {
                        raw: line.to_string(),
                        caption: caps[2].trim().to_string(),
                        path: caps[3].to_string(),
                        caption_above: caps.get(1).is_some(),
                    }),
                    i + 1,
                ))
            } else {
                None
            };

            match matched {
                Some((token, next)) => {
                    flush_markdown(&mut markdown, &mut tokens);
                    tokens.push(token);
                    i = next;
                }
                None => {
                    markdown.push(line);
                    i += 1;
                }
            }
        }

        flush_markdown(&mut markdown, &mut tokens);
        tokens
    }

    /// Index of the `:::` closing the div opened just before `start`, or
    /// `lines.len()` if it is never closed. Nested divs and fenced code are
    /// skipped over.
    fn find_div_close(&self, lines: &[&str], start: usize) -> usize {
        let mut depth = 0usize;
        let mut i = start;
        while i < lines.len() {
            let line = lines[i];
            if let Some(fence) = Fence::open(line) {
                i = fence.find_close(lines, i + 1) + 1;
                continue;
            }
            if self.div_open.is_match(line) {
                depth += 1;
            } else if self.div_close.is_match(line) {
                if depth == 0 {
                    return i;
                }
                depth -= 1;
            }
            i += 1;
        }
        lines.len()
    }
}

/// Each line keeps its terminator; indented code at the end of a run needs
/// its final newline.
fn flush_markdown(markdown: &mut Vec<&str>, tokens: &mut Vec<Token>) {
    if markdown.iter().any(|l| !l.trim().is_empty()) {
        let raw = markdown.iter().flat_map(|line| [*line, "\n"]).collect();
        tokens.push(Token::Markdown { raw });
    }
    markdown.clear();
}

struct Fence {
    marker: char,
    len: usize,
    language: Option<String>,
}

impl Fence {
    fn open(line: &str) -> Option<Self> {
        let trimmed = line.trim_start();
        if line.len() - trimmed.len() > 3 {
            return None;
        }
        let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
        let len = trimmed.chars().take_while(|c| *c == marker).count();
        if len < 3 {
            return None;
        }
        let info = trimmed[len..].trim();
        if marker == '`' && info.contains('`') {
            return None;
        }
        let language = info
            .split_whitespace()
            .next()
            .map(|word| word.to_string());
        Some(Self {
            marker,
            len,
            language,
        })
    }

    /// Index of the closing fence, or `lines.len()` if unterminated.
    fn find_close(&self, lines: &[&str], start: usize) -> usize {
        lines[start.min(lines.len())..]
            .iter()
            .position(|line| {
                let trimmed = line.trim();
                trimmed.len() >= self.len && trimmed.chars().all(|c| c == self.marker)
            })
            .map(|offset| start + offset)
            .unwrap_or(lines.len())
    }
}

/// Display math starting at `lines[start]`: the formula and the index of the
/// first line after it. Unterminated `$$` is left to the Markdown parser.
fn display_math(lines: &[&str], start: usize) -> Option<(String, usize)> {
    let first = lines[start].trim();
    let rest = first.strip_prefix("$$")?;

    if let Some(tex) = rest.strip_suffix("$$") {
        return Some((tex.trim().to_string(), start + 1));
    }

    let mut tex = vec![rest];
    for (offset, line) in lines[start + 1..].iter().enumerate() {
        let trimmed = line.trim_end();
        if let Some(last) = trimmed.strip_suffix("$$") {
            tex.push(last);
            return Some((tex.join("\n").trim().to_string(), start + offset + 2));
        }
        tex.push(line);
    }
    None
}

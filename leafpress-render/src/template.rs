//! Parsing and interpreting templates.
//!
//! Three directive shapes are recognised:
//!
//! - `{{ name }}` prints a value,
//! - `{{ if name }}` / `{{ range name }}` open a block,
//! - `{{ end }}` closes the innermost block.
//!
//! Names may contain dots to reach into nested maps (`{{ post.title }}`);
//! `{{ . }}` is the element of the enclosing block.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TemplateError;
use crate::value::Value;

static DIRECTIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\s*)\{\{\s*(?:(if|range)\s+)?([A-Za-z0-9_.\-]+)\s*\}\}")
        .expect("valid directive regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    If,
    Range,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Text(String),
    /// Whitespace before the directive is only printed along with a
    /// non-empty value.
    Var { name: String, leading: String },
    Begin { kind: BlockKind, name: String },
    End,
}

/// A parsed template. Blocks are known to be balanced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    commands: Vec<Command>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut commands = Vec::new();
        let mut open = Vec::new();
        let mut last = 0;

        for caps in DIRECTIVE_RE.captures_iter(source) {
            let (Some(whole), Some(leading), Some(name)) = (caps.get(0), caps.get(1), caps.get(3))
            else {
                continue;
            };
            if whole.start() > last {
                commands.push(Command::Text(source[last..whole.start()].to_string()));
            }
            last = whole.end();

            let name = name.as_str().to_string();
            let kind = caps.get(2).map(|kind| match kind.as_str() {
                "if" => BlockKind::If,
                _ => BlockKind::Range,
            });
            match kind {
                Some(kind) => {
                    open.push(name.clone());
                    commands.push(Command::Begin { kind, name });
                }
                None if name == "end" => {
                    if open.pop().is_none() {
                        return Err(TemplateError::UnmatchedEnd {
                            index: leading.end(),
                        });
                    }
                    commands.push(Command::End);
                }
                None => commands.push(Command::Var {
                    name,
                    leading: leading.as_str().to_string(),
                }),
            }
        }

        if last < source.len() {
            commands.push(Command::Text(source[last..].to_string()));
        }
        if let Some(name) = open.pop() {
            return Err(TemplateError::UnterminatedBlock { name });
        }

        Ok(Self { commands })
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Interpret against fully resolved variables.
    pub fn render(&self, vars: &BTreeMap<String, Value>) -> String {
        let mut out = String::new();
        let root = Scope {
            fields: Some(vars),
            dot: None,
            parent: None,
        };
        self.run(0, self.commands.len(), &root, &mut out);
        out
    }

    fn run(&self, start: usize, end: usize, scope: &Scope<'_>, out: &mut String) {
        let mut pc = start;
        while pc < end {
            match &self.commands[pc] {
                Command::Text(text) => out.push_str(text),
                Command::Var { name, leading } => {
                    let printed = scope.lookup(name).map(Value::to_string).unwrap_or_default();
                    if !printed.is_empty() {
                        out.push_str(leading);
                        out.push_str(&printed);
                    }
                }
                Command::Begin { name, .. } => {
                    let block_end = self.skip_to_matching_end(pc);
                    if let Some(value) = scope.lookup(name).filter(|v| v.is_truthy()) {
                        for element in value.elements() {
                            let child = Scope {
                                fields: element.as_map(),
                                dot: Some(element),
                                parent: Some(scope),
                            };
                            self.run(pc + 1, block_end, &child, out);
                        }
                    }
                    pc = block_end;
                }
                Command::End => {}
            }
            pc += 1;
        }
    }

    /// Index of the `End` matching the `Begin` at `begin`.
    fn skip_to_matching_end(&self, begin: usize) -> usize {
        let mut depth = 0usize;
        for (i, command) in self.commands.iter().enumerate().skip(begin + 1) {
            match command {
                Command::Begin { .. } => depth += 1,
                Command::End if depth == 0 => return i,
                Command::End => depth -= 1,
                _ => {}
            }
        }
        self.commands.len()
    }
}

/// One level of variable lookup; inner scopes shadow outer ones.
struct Scope<'a> {
    fields: Option<&'a BTreeMap<String, Value>>,
    dot: Option<&'a Value>,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    fn lookup(&self, name: &str) -> Option<&'a Value> {
        if name == "." {
            return self.dot();
        }
        if let Some(value) = self.get(name) {
            return Some(value);
        }

        let (head, path) = name.split_once('.')?;
        let mut value = self.get(head)?;
        for key in path.split('.') {
            value = value.field(key)?;
        }
        Some(value)
    }

    fn get(&self, name: &str) -> Option<&'a Value> {
        self.fields
            .and_then(|fields| fields.get(name))
            .or_else(|| self.parent.and_then(|parent| parent.get(name)))
    }

    fn dot(&self) -> Option<&'a Value> {
        self.dot.or_else(|| self.parent.and_then(|parent| parent.dot()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(source: &str, vars: &[(&str, Value)]) -> String {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Template::parse(source).unwrap().render(&vars)
    }

    #[test]
    fn parses_commands() {
        let template = Template::parse("a {{ x }}{{if y}}b{{ end }}").unwrap();
        assert_eq!(
            template.commands(),
            &[
                Command::Text("a".into()),
                Command::Var {
                    name: "x".into(),
                    leading: " ".into()
                },
                Command::Begin {
                    kind: BlockKind::If,
                    name: "y".into()
                },
                Command::Text("b".into()),
                Command::End,
            ]
        );
    }

    #[test]
    fn range_over_list() {
        let items = Value::from(vec!["a", "b"]);
        assert_eq!(
            render("{{ range items }}{{ . }},{{ end }}", &[("items", items)]),
            "a,b,"
        );
        assert_eq!(
            render(
                "{{ range items }}{{ . }},{{ end }}",
                &[("items", Value::List(vec![]))]
            ),
            ""
        );
    }

    #[test]
    fn if_on_present_and_missing_values() {
        let source = "<head>{{ if extra }}{{ extra }}{{ end }}</head>";
        assert_eq!(
            render(source, &[("extra", Value::from("<x>"))]),
            "<head><x></head>"
        );
        assert_eq!(render(source, &[]), "<head></head>");
        assert_eq!(render(source, &[("extra", Value::Bool(false))]), "<head></head>");
    }

    #[test]
    fn blank_variables_take_their_indent_with_them() {
        let source = "<head>\n  {{ a }}\n  {{ b }}\n</head>";
        assert_eq!(
            render(source, &[("a", Value::from("A")), ("b", Value::from(""))]),
            "<head>\n  A\n</head>"
        );
    }

    #[test]
    fn block_directives_drop_leading_whitespace() {
        let source = "<ul>\n  {{ range xs }}\n  <li>{{ . }}</li>\n  {{ end }}\n</ul>";
        assert_eq!(
            render(source, &[("xs", Value::from(vec!["1", "2"]))]),
            "<ul>\n  <li>1</li>\n  <li>2</li>\n</ul>"
        );
    }

    #[test]
    fn map_elements_overlay_outer_scope() {
        let posts = Value::from(vec![
            Value::from_iter([("title", "One"), ("url", "/1.html")]),
            Value::from_iter([("title", "Two")]),
        ]);
        let source = "{{ range posts }}[{{ title }}|{{ url }}|{{ site }}]{{ end }}";
        assert_eq!(
            render(source, &[("posts", posts), ("site", Value::from("S")), ("url", Value::from("/"))]),
            "[One|/1.html|S][Two|/|S]"
        );
    }

    #[test]
    fn nested_blocks_and_dot_paths() {
        let page = Value::from_iter([
            ("title", Value::from("T")),
            ("tags", Value::from(vec!["x", "y"])),
        ]);
        let source = "{{ page.title }}:{{ range page.tags }}{{ if . }}<{{ . }}>{{ end }}{{ end }}";
        assert_eq!(render(source, &[("page", page)]), "T:<x><y>");
    }

    #[test]
    fn skipped_block_skips_nested_blocks() {
        let source = "{{ if no }}{{ if yes }}A{{ end }}B{{ end }}C";
        assert_eq!(render(source, &[("yes", Value::from(true))]), "C");
    }

    #[test]
    fn scalar_iterates_once() {
        assert_eq!(
            render("{{ range x }}({{ . }}){{ end }}", &[("x", Value::from("v"))]),
            "(v)"
        );
    }

    #[test]
    fn unmatched_end_is_an_error() {
        let err = Template::parse("ab {{ end }}").unwrap_err();
        assert!(matches!(err, TemplateError::UnmatchedEnd { index: 3 }));
    }

    #[test]
    fn unterminated_block_is_an_error() {
        let err = Template::parse("{{ range a }}{{ if b }}{{ end }}").unwrap_err();
        match err {
            TemplateError::UnterminatedBlock { name } => assert_eq!(name, "a"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn text_without_directives_is_untouched() {
        assert_eq!(render("plain {{ not a directive! }}", &[]), "plain {{ not a directive! }}");
    }
}

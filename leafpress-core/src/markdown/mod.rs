//! Markdown to HTML with leafpress's block and inline extensions.
//!
//! A document is first split by [`BlockTokenizer`] into our own block
//! constructs (fenced code, figures, display math, divs, footnote lists) and
//! runs of ordinary Markdown. The runs go through pulldown-cmark, whose event
//! stream is rewritten for footnote references, math and local links before
//! HTML is emitted.

pub mod code;
pub mod footnotes;
pub mod images;
pub mod links;
pub mod tokenizer;
pub mod typst_math;

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};
use thiserror::Error;
use tracing::debug;

use crate::highlight::{HighlightError, Highlighter};
use crate::slug::slugify;
use links::Target;
use tokenizer::{BlockTokenizer, FootnoteDefinitionItem, Image, Token};
use typst_math::MathMode;

/// Maps a local file to its URL on the site; `None` means the file is not
/// part of the site.
pub type UrlResolver = Arc<dyn Fn(&Path) -> Option<String> + Send + Sync>;

#[derive(Error, Debug)]
pub enum MarkdownError {
    #[error("{0} is not allowed in inline content")]
    Disallowed(String),

    #[error("invalid local reference: {0}")]
    InvalidLocalReference(String),

    #[error("local reference {0} needs a source directory")]
    NoSourceDirectory(String),

    #[error("referenced file does not exist: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid math {tex:?}: {message}")]
    Math { tex: String, message: String },

    #[error(transparent)]
    Highlight(#[from] HighlightError),
}

/// How much of Markdown a piece of source may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// The body of a document.
    Block,
    /// Captions and footnote bodies inside a document.
    Nested,
    /// Titles and descriptions: a single paragraph, no local references.
    Inline,
}

/// Renders documents for one generator run.
///
/// Not shared between tasks: the tokenizer, the math flag and the
/// dependency set belong to this instance.
pub struct MarkdownRenderer {
    options: Options,
    tokenizer: BlockTokenizer,
    highlighter: Arc<dyn Highlighter>,
    resolver: UrlResolver,
    has_math: bool,
    dependencies: BTreeSet<PathBuf>,
    /// Heading ids handed out in the current document, with how often.
    heading_ids: HashMap<String, usize>,
}

impl MarkdownRenderer {
    pub fn new(highlighter: Arc<dyn Highlighter>, resolver: UrlResolver) -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
        options.insert(Options::ENABLE_MATH);

        Self {
            options,
            tokenizer: BlockTokenizer::new(),
            highlighter,
            resolver,
            has_math: false,
            dependencies: BTreeSet::new(),
            heading_ids: HashMap::new(),
        }
    }

    /// Render a document body. Local references are resolved against
    /// `source_dir`.
    pub async fn render_block(
        &mut self,
        source: &str,
        source_dir: Option<&Path>,
    ) -> Result<String, MarkdownError> {
        let tokens = self.tokenizer.tokenize(source);
        self.render_tokens(&tokens, source_dir).await
    }

    /// Render a single paragraph of inline Markdown without the `<p>`.
    pub async fn render_inline(&mut self, source: &str) -> Result<String, MarkdownError> {
        self.render_markdown(source, None, Mode::Inline).await
    }

    /// Whether any math has been rendered since the last [`reset`](Self::reset).
    pub fn has_math(&self) -> bool {
        self.has_math
    }

    /// Files embedded into the output so far.
    pub fn dependencies(&self) -> &BTreeSet<PathBuf> {
        &self.dependencies
    }

    pub fn take_dependencies(&mut self) -> BTreeSet<PathBuf> {
        std::mem::take(&mut self.dependencies)
    }

    /// Forget side outputs before starting the next document.
    pub fn reset(&mut self) {
        self.has_math = false;
        self.dependencies.clear();
        self.heading_ids.clear();
    }

    fn render_tokens<'a>(
        &'a mut self,
        tokens: &'a [Token],
        dir: Option<&'a Path>,
    ) -> BoxFuture<'a, Result<String, MarkdownError>> {
        async move {
            let mut html = String::new();
            for token in tokens {
                match token {
                    Token::Markdown { raw } => {
                        html.push_str(&self.render_markdown(raw, dir, Mode::Block).await?);
                    }
                    Token::Code { language, code, .. } => {
                        debug!(language = language.as_deref(), "rendering code block");
                        let block =
                            code::render(self.highlighter.as_ref(), language.as_deref(), code)
                                .await?;
                        html.push_str(&block);
                    }
                    Token::Image(image) => {
                        html.push_str(&self.render_image(image, dir).await?);
                    }
                    Token::DisplayMath { tex, .. } => {
                        html.push_str(&self.render_math(tex, MathMode::Display).await?);
                        html.push('\n');
                    }
                    Token::Div {
                        class, children, ..
                    } => {
                        let inner = self.render_tokens(children, dir).await?;
                        html.push_str(&format!(
                            "<div class=\"{}\">\n{}</div>\n",
                            html_escape(class),
                            inner
                        ));
                    }
                    Token::FootnoteDefinitionBlock { items, .. } => {
                        html.push_str(&self.render_footnotes(items, dir).await?);
                    }
                }
            }
            Ok(html)
        }
        .boxed()
    }

    async fn render_markdown(
        &mut self,
        source: &str,
        dir: Option<&Path>,
        mode: Mode,
    ) -> Result<String, MarkdownError> {
        let events: Vec<Event<'_>> = Parser::new_ext(source, self.options).collect();
        if mode == Mode::Inline {
            check_inline_structure(&events)?;
        }
        let events = footnotes::expand_references(events);

        let mut rewritten = Vec::with_capacity(events.len());
        for event in events {
            rewritten.push(match event {
                Event::InlineMath(tex) => {
                    Event::InlineHtml(self.render_math(&tex, MathMode::Inline).await?.into())
                }
                Event::DisplayMath(tex) => {
                    Event::InlineHtml(self.render_math(&tex, MathMode::Display).await?.into())
                }
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    let dest_url = self.resolve_link(&dest_url, dir, mode)?;
                    Event::Start(Tag::Link {
                        link_type,
                        dest_url: dest_url.into(),
                        title,
                        id,
                    })
                }
                Event::Start(Tag::Image {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    let dest_url = self.resolve_image(&dest_url, dir).await?;
                    Event::Start(Tag::Image {
                        link_type,
                        dest_url: dest_url.into(),
                        title,
                        id,
                    })
                }
                other => other,
            });
        }

        let events = match mode {
            Mode::Block => attach_heading_ids(rewritten, &mut self.heading_ids),
            Mode::Nested | Mode::Inline => unwrap_paragraph(rewritten),
        };

        let mut html_output = String::new();
        html::push_html(&mut html_output, events.into_iter());
        Ok(html_output)
    }

    async fn render_image(
        &mut self,
        image: &Image,
        dir: Option<&Path>,
    ) -> Result<String, MarkdownError> {
        let caption = if image.caption.is_empty() {
            None
        } else {
            Some(self.render_markdown(&image.caption, dir, Mode::Nested).await?)
        };

        let body = match links::classify(&image.path) {
            Target::Passthrough => images::img_tag(&image.path, &image.caption),
            Target::Local { path, .. } => {
                let file = local_path(&image.path, path, dir)?;
                if images::is_vector(&file) {
                    let svg = read_embedded(&file).await?;
                    debug!("embedding {}", file.display());
                    self.dependencies.insert(file);
                    svg.trim().to_string()
                } else {
                    ensure_exists(&file).await?;
                    images::img_tag(&self.url_for(&file, &image.path)?, &image.caption)
                }
            }
        };

        Ok(images::figure(&body, caption.as_deref(), image.caption_above))
    }

    async fn render_footnotes(
        &mut self,
        items: &[FootnoteDefinitionItem],
        dir: Option<&Path>,
    ) -> Result<String, MarkdownError> {
        let mut bodies = Vec::with_capacity(items.len());
        for item in items {
            let body = self.render_markdown(&item.text, dir, Mode::Nested).await?;
            bodies.push((item.id.as_str(), body));
        }
        Ok(footnotes::definitions_html(bodies))
    }

    async fn render_math(&mut self, tex: &str, mode: MathMode) -> Result<String, MarkdownError> {
        self.has_math = true;
        typst_math::render_on_blocking_pool(tex.to_string(), mode)
            .await
            .map_err(|err| MarkdownError::Math {
                tex: tex.to_string(),
                message: format!("{err:#}"),
            })
    }

    fn resolve_link(
        &self,
        target: &str,
        dir: Option<&Path>,
        mode: Mode,
    ) -> Result<String, MarkdownError> {
        let Target::Local { path, fragment } = links::classify(target) else {
            return Ok(target.to_string());
        };
        if mode == Mode::Inline {
            return Err(MarkdownError::Disallowed(format!(
                "local reference {target:?}"
            )));
        }

        let url = self.url_for(&local_path(target, path, dir)?, target)?;
        Ok(match fragment {
            Some(fragment) => format!("{url}#{fragment}"),
            None => url,
        })
    }

    /// Images inside paragraphs are linked, never embedded.
    async fn resolve_image(
        &self,
        target: &str,
        dir: Option<&Path>,
    ) -> Result<String, MarkdownError> {
        let Target::Local { path, .. } = links::classify(target) else {
            return Ok(target.to_string());
        };
        let file = local_path(target, path, dir)?;
        ensure_exists(&file).await?;
        self.url_for(&file, target)
    }

    fn url_for(&self, file: &Path, target: &str) -> Result<String, MarkdownError> {
        (self.resolver)(file)
            .ok_or_else(|| MarkdownError::InvalidLocalReference(target.to_string()))
    }
}

impl std::fmt::Debug for MarkdownRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkdownRenderer")
            .field("has_math", &self.has_math)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Every local target, `/about.md` included, is relative to the document.
fn local_path(target: &str, path: &str, dir: Option<&Path>) -> Result<PathBuf, MarkdownError> {
    let dir = dir.ok_or_else(|| MarkdownError::NoSourceDirectory(target.to_string()))?;
    Ok(dir.join(path.trim_start_matches('/')))
}

async fn ensure_exists(file: &Path) -> Result<(), MarkdownError> {
    match tokio::fs::metadata(file).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(MarkdownError::MissingFile(file.to_path_buf()))
        }
        Err(source) => Err(MarkdownError::Io {
            path: file.to_path_buf(),
            source,
        }),
    }
}

async fn read_embedded(file: &Path) -> Result<String, MarkdownError> {
    match tokio::fs::read_to_string(file).await {
        Ok(contents) => Ok(contents),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(MarkdownError::MissingFile(file.to_path_buf()))
        }
        Err(source) => Err(MarkdownError::Io {
            path: file.to_path_buf(),
            source,
        }),
    }
}

/// Inline content is one paragraph of text-level markup.
fn check_inline_structure(events: &[Event<'_>]) -> Result<(), MarkdownError> {
    let mut paragraphs = 0;
    for event in events {
        let disallowed = match event {
            Event::Start(Tag::Paragraph) => {
                paragraphs += 1;
                (paragraphs > 1).then_some("more than one paragraph")
            }
            Event::Start(Tag::CodeBlock(_)) => Some("code block"),
            Event::Start(Tag::Image { .. }) => Some("image"),
            Event::DisplayMath(_) => Some("display math"),
            Event::Start(Tag::Heading { .. }) => Some("heading"),
            Event::Start(Tag::BlockQuote(_)) => Some("block quote"),
            Event::Start(Tag::List(_)) => Some("list"),
            Event::Start(Tag::Table(_)) => Some("table"),
            Event::Start(Tag::HtmlBlock) => Some("HTML block"),
            Event::Rule => Some("horizontal rule"),
            _ => None,
        };
        if let Some(what) = disallowed {
            return Err(MarkdownError::Disallowed(what.to_string()));
        }
    }
    Ok(())
}

/// Drop the `<p>` around content that is exactly one paragraph.
fn unwrap_paragraph(mut events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let paragraphs = events
        .iter()
        .filter(|e| matches!(e, Event::Start(Tag::Paragraph)))
        .count();
    let wrapped = matches!(events.first(), Some(Event::Start(Tag::Paragraph)))
        && matches!(events.last(), Some(Event::End(TagEnd::Paragraph)));

    if paragraphs == 1 && wrapped {
        events.pop();
        events.remove(0);
    }
    events
}

/// Give every heading without an explicit `{#id}` the slug of its text.
///
/// Repeated slugs get `-1`, `-2`, ... appended in document order.
fn attach_heading_ids<'a>(
    events: Vec<Event<'a>>,
    seen: &mut HashMap<String, usize>,
) -> Vec<Event<'a>> {
    let mut slugs = Vec::new();
    let mut current: Option<String> = None;
    for event in &events {
        match event {
            Event::Start(Tag::Heading { .. }) => current = Some(String::new()),
            Event::Text(text) | Event::Code(text) => {
                if let Some(title) = current.as_mut() {
                    title.push_str(text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(title) = current.take() {
                    slugs.push(slugify(&title));
                }
            }
            _ => {}
        }
    }

    let mut slugs = slugs.into_iter();
    events
        .into_iter()
        .map(|event| match event {
            Event::Start(Tag::Heading {
                level,
                id,
                classes,
                attrs,
            }) => {
                let slug = slugs.next().filter(|s| !s.is_empty());
                let id = match id {
                    Some(id) => Some(id),
                    None => slug.map(|slug| CowStr::from(unique_id(slug, seen))),
                };
                Event::Start(Tag::Heading {
                    level,
                    id,
                    classes,
                    attrs,
                })
            }
            other => other,
        })
        .collect()
}

fn unique_id(slug: String, seen: &mut HashMap<String, usize>) -> String {
    let count = seen.entry(slug.clone()).or_insert(0);
    *count += 1;
    match *count {
        1 => slug,
        n => format!("{slug}-{}", n - 1),
    }
}

pub(crate) fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

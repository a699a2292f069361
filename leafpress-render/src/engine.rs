//! Loading and caching templates.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::context::Context;
use crate::error::TemplateError;
use crate::template::Template;

type Slot = Arc<OnceCell<Arc<Template>>>;

/// Renders templates from a directory, parsing each one once.
///
/// Concurrent first renders of the same template share one read and parse.
#[derive(Debug)]
pub struct TemplateEngine {
    root: PathBuf,
    cache: Mutex<BTreeMap<String, Slot>>,
    #[cfg(test)]
    parses: AtomicUsize,
}

impl TemplateEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(BTreeMap::new()),
            #[cfg(test)]
            parses: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Render the template at `root/name`.
    ///
    /// The file is read the first time `name` is used; later renders reuse
    /// the parsed template even if the file has changed since.
    pub async fn render(&self, name: &str, context: Context) -> Result<String, TemplateError> {
        let (template, vars) = tokio::try_join!(self.load(name), context.resolve())?;
        Ok(template.render(&vars))
    }

    /// Render an in-memory template, cached under `identity`.
    pub async fn render_source(
        &self,
        identity: &str,
        source: &str,
        context: Context,
    ) -> Result<String, TemplateError> {
        let template = self
            .slot(identity)
            .get_or_try_init(|| async { self.parse(identity, source) })
            .await?
            .clone();
        let vars = context.resolve().await?;
        Ok(template.render(&vars))
    }

    /// Every template identity parsed so far, sorted.
    pub fn templates_used(&self) -> Vec<String> {
        self.cache
            .lock()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    async fn load(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        let slot = self.slot(name);
        let template = slot
            .get_or_try_init(|| async {
                let path = self.root.join(name);
                let source = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| TemplateError::Io { path, source })?;
                self.parse(name, &source)
            })
            .await?;
        Ok(template.clone())
    }

    /// The cache entry for `identity`. A failed parse leaves it empty, so
    /// the next render tries again.
    fn slot(&self, identity: &str) -> Slot {
        self.cache
            .lock()
            .entry(identity.to_string())
            .or_default()
            .clone()
    }

    fn parse(&self, identity: &str, source: &str) -> Result<Arc<Template>, TemplateError> {
        debug!(template = identity, "parsing template");
        #[cfg(test)]
        self.parses.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Template::parse(source)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[tokio::test]
    async fn second_render_uses_cached_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<h1>{{ title }}</h1>").unwrap();
        let engine = TemplateEngine::new(dir.path());

        let first = engine
            .render("page.html", Context::new().with("title", "A"))
            .await
            .unwrap();
        assert_eq!(first, "<h1>A</h1>");

        std::fs::write(&path, "changed").unwrap();
        let second = engine
            .render("page.html", Context::new().with("title", "B"))
            .await
            .unwrap();
        assert_eq!(second, "<h1>B</h1>");
    }

    #[tokio::test]
    async fn concurrent_first_renders_parse_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.html"), "<p>{{ n }}</p>").unwrap();
        let engine = TemplateEngine::new(dir.path());

        let renders = (0..8).map(|n| {
            engine.render("page.html", Context::new().with("n", n.to_string()))
        });
        let pages = futures::future::try_join_all(renders).await.unwrap();

        assert_eq!(pages[3], "<p>3</p>");
        assert_eq!(engine.parses.load(Ordering::SeqCst), 1);
        assert_eq!(engine.templates_used(), ["page.html"]);
    }

    #[tokio::test]
    async fn same_inputs_render_identically() {
        let engine = TemplateEngine::new("unused");
        let source = "{{ range xs }}<i>{{ . }}</i>{{ end }}{{ if t }} {{ t }}{{ end }}";
        let context = || {
            Context::new()
                .with("xs", vec!["a", "b"])
                .with("t", "T")
                .with_pending("late", async { Ok(Value::from("x")) })
        };

        let first = engine.render_source("s", source, context()).await.unwrap();
        let second = engine.render_source("s", source, context()).await.unwrap();
        assert_eq!(first, "<i>a</i><i>b</i> T");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TemplateEngine::new(dir.path());
        let err = engine.render("nope.html", Context::new()).await.unwrap_err();
        match err {
            TemplateError::Io { path, .. } => assert!(path.ends_with("nope.html")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(engine.templates_used().is_empty());
    }

    #[tokio::test]
    async fn tracks_templates_used() {
        let engine = TemplateEngine::new("unused");
        for identity in ["post", "index", "post"] {
            engine
                .render_source(identity, "x", Context::new())
                .await
                .unwrap();
        }
        assert_eq!(engine.templates_used(), ["index", "post"]);
    }

    #[tokio::test]
    async fn malformed_source_is_not_cached() {
        let engine = TemplateEngine::new("unused");
        let err = engine
            .render_source("bad", "{{ end }}", Context::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::UnmatchedEnd { index: 0 }));
        assert!(engine.templates_used().is_empty());
    }
}

//! Mapping source paths to site URLs.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::markdown::UrlResolver;

/// Default path-to-URL mapping: the site mirrors the content directory, with
/// Markdown documents published as HTML.
#[derive(Debug, Clone)]
pub struct SiteUrls {
    content_dir: PathBuf,
    base_url: String,
}

impl SiteUrls {
    /// `base_url` must already be normalized (leading and trailing slash).
    pub fn new(content_dir: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            content_dir: content_dir.into(),
            base_url: base_url.to_string(),
        }
    }

    /// URL for `path`, or `None` if it lies outside the content directory.
    pub fn url_for(&self, path: &Path) -> Option<String> {
        let root = normalize(&self.content_dir)?;
        let path = normalize(path)?;
        let relative = path.strip_prefix(&root).ok()?;

        let relative = match relative.extension() {
            Some(ext) if ext == "md" => relative.with_extension("html"),
            _ => relative.to_path_buf(),
        };

        let segments = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;

        Some(format!("{}{}", self.base_url, segments.join("/")))
    }

    pub fn into_resolver(self) -> UrlResolver {
        Arc::new(move |path: &Path| self.url_for(path))
    }
}

/// Lexically resolve `.` and `..`; `None` if `..` climbs above the start.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    return None;
                }
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

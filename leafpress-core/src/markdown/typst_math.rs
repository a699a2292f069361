//! Typst-based math rendering to inline SVG.
//!
//! Compilation is synchronous and CPU-bound; callers on the async runtime
//! should go through [`render_on_blocking_pool`].

use std::num::NonZeroUsize;

use anyhow::{anyhow, Result};
use lru::LruCache;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, warn};
use typst::diag::SourceDiagnostic;
use typst::layout::{Abs, PagedDocument};
use typst_as_lib::TypstEngine;

const MATH_CACHE_CAPACITY: usize = 512;

/// Whether a formula is set inline or on its own line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathMode {
    Inline,
    Display,
}

/// Compiles formulas to SVG, remembering recent results.
pub struct TypstMathRenderer {
    fonts: Vec<&'static [u8]>,
    cache: Mutex<LruCache<(String, MathMode), String>>,
}

impl TypstMathRenderer {
    pub fn new() -> Self {
        Self {
            fonts: typst_assets::fonts().collect(),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(MATH_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Render `math` to an HTML fragment wrapping an SVG.
    ///
    /// Fails if Typst reports an error; warnings are only logged.
    pub fn render(&self, math: &str, mode: MathMode) -> Result<String> {
        let key = (math.to_string(), mode);
        if let Some(svg) = self.cache.lock().get(&key) {
            return Ok(wrap_svg(svg, math, mode));
        }

        let engine = TypstEngine::builder()
            .main_file(build_source(math, mode))
            .fonts(self.fonts.iter().copied())
            .build();

        let warned = engine.compile::<PagedDocument>();
        log_warnings(&warned.warnings);
        let doc = warned.output.map_err(|err| anyhow!("{err}"))?;

        let svg = normalize_svg(&typst_svg::svg_merged(&doc, Abs::pt(0.5)));
        debug!(bytes = svg.len(), "compiled math");
        self.cache.lock().put(key, svg.clone());

        Ok(wrap_svg(&svg, math, mode))
    }
}

impl Default for TypstMathRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypstMathRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypstMathRenderer")
            .field("fonts", &self.fonts.len())
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}

/// Shared renderer; the cache is process-wide.
pub static MATH_RENDERER: Lazy<TypstMathRenderer> = Lazy::new(TypstMathRenderer::new);

/// Run [`MATH_RENDERER`] off the async runtime.
pub async fn render_on_blocking_pool(math: String, mode: MathMode) -> Result<String> {
    tokio::task::spawn_blocking(move || MATH_RENDERER.render(&math, mode))
        .await
        .map_err(|err| anyhow!("math renderer task failed: {err}"))?
}

fn build_source(math: &str, mode: MathMode) -> String {
    // Typst treats `$ x $` (inner spaces) as a block equation.
    let equation = match mode {
        MathMode::Display => format!("$ {math} $"),
        MathMode::Inline => format!("${}$", math.trim()),
    };
    format!(
        r#"
#set page(width: auto, height: auto, margin: 0pt, fill: none)
#set text(font: "New Computer Modern", size: 15pt, weight: "medium", fill: black)
#set math.equation(numbering: none)

{equation}
"#
    )
}

fn wrap_svg(svg: &str, math: &str, mode: MathMode) -> String {
    let alt = super::html_escape(math);
    match mode {
        MathMode::Display => format!(
            r#"<div class="math math-display" role="math" aria-label="{alt}">{svg}</div>"#
        ),
        MathMode::Inline => format!(
            r#"<span class="math math-inline" role="math" aria-label="{alt}">{svg}</span>"#
        ),
    }
}

fn log_warnings(warnings: &[SourceDiagnostic]) {
    for warning in warnings {
        warn!("Typst warning: {}", warning.message);
    }
}

fn normalize_svg(svg: &str) -> String {
    hide_from_a11y(&use_current_color(svg))
}

/// Typst paints glyphs black; let the page's text color through instead.
fn use_current_color(svg: &str) -> String {
    static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?i)(fill|stroke)=["']\s*(black|#000(?:000)?|rgb\(\s*0\s*,\s*0\s*,\s*0\s*\))\s*["']"#)
            .expect("valid color attribute regex")
    });
    static STYLE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r#"(?i)(fill|stroke)\s*:\s*(black|#000(?:000)?|rgb\(\s*0\s*,\s*0\s*,\s*0\s*\))"#,
        )
        .expect("valid color style regex")
    });

    let svg = ATTR_RE.replace_all(svg, r#"$1="currentColor""#);
    STYLE_RE
        .replace_all(&svg, "$1:currentColor")
        .into_owned()
}

/// The wrapper carries the accessible label, so the SVG itself is hidden.
fn hide_from_a11y(svg: &str) -> String {
    if svg.contains("aria-hidden") {
        return svg.to_string();
    }
    svg.replacen("<svg ", "<svg aria-hidden=\"true\" focusable=\"false\" ", 1)
}

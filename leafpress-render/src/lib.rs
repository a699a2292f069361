//! # leafpress-render
//!
//! Template rendering for leafpress.
//!
//! Templates are HTML with `{{ ... }}` directives for printing values and
//! for conditional or repeated blocks. Values in a [`Context`] may be
//! futures (for example a page body still being rendered); they are all
//! awaited together before the template runs.

pub mod context;
pub mod engine;
pub mod error;
pub mod template;
pub mod value;

pub use context::{Context, PendingValue};
pub use engine::TemplateEngine;
pub use error::TemplateError;
pub use template::Template;
pub use value::Value;

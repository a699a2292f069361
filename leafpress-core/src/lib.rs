//! # leafpress-core
//!
//! Core library for the leafpress page generator.
//!
//! This crate turns Markdown into HTML fragments, talks to the
//! `leafpress-highlight` service for code blocks, and loads site
//! configuration.

pub mod config;
pub mod highlight;
pub mod markdown;
pub mod slug;
pub mod urls;

pub use config::Config;
pub use highlight::{HighlightClient, HighlightError, Highlighter};
pub use markdown::{MarkdownError, MarkdownRenderer, UrlResolver};
pub use slug::slugify;
pub use urls::SiteUrls;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    /// `index` is the byte offset of the directive in the template source.
    #[error("{{{{ end }}}} at byte {index} closes no block")]
    UnmatchedEnd { index: usize },

    #[error("block {name:?} is never closed with {{{{ end }}}}")]
    UnterminatedBlock { name: String },

    #[error("failed to read template {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Resolve(#[from] anyhow::Error),
}

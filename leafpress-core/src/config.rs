//! Configuration parsing and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::highlight::{HighlightClient, HighlightError};
use crate::urls::SiteUrls;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Failed to connect to highlighter: {0}")]
    Highlighter(#[from] HighlightError),
}

/// Main configuration struct matching leafpress.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,

    pub paths: PathsConfig,

    #[serde(default)]
    pub highlighter: HighlighterConfig,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    String::from("/")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the source documents
    pub content: PathBuf,

    /// Root of the page templates
    pub templates: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HighlighterConfig {
    /// Socket of a running `leafpress-highlight` server
    #[serde(default)]
    pub socket: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Get the content directory, resolved relative to config file
    pub fn content_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.content)
    }

    /// Get the templates directory, resolved relative to config file
    pub fn templates_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.templates)
    }

    /// Get the highlighter socket, resolved relative to config file
    pub fn highlighter_socket(&self) -> Option<PathBuf> {
        self.highlighter
            .socket
            .as_ref()
            .map(|p| self.resolve_path(p))
    }

    /// Normalized base URL with leading and trailing slash ("/foo/" or "/")
    pub fn normalized_base_url(&self) -> String {
        normalize_base_url(&self.site.base_url)
    }

    /// Path-to-URL mapping for documents under the content directory
    pub fn site_urls(&self) -> SiteUrls {
        SiteUrls::new(self.content_dir(), &self.normalized_base_url())
    }

    /// Connect to the configured highlighter
    pub async fn connect_highlighter(&self) -> Result<HighlightClient, ConfigError> {
        let socket = self
            .highlighter_socket()
            .ok_or_else(|| ConfigError::MissingField("highlighter.socket".into()))?;
        Ok(HighlightClient::connect(&socket).await?)
    }

    /// Resolve a path relative to the config file location
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(config_path) = &self.config_path {
            if let Some(parent) = config_path.parent() {
                parent.join(path)
            } else {
                path.to_path_buf()
            }
        } else {
            path.to_path_buf()
        }
    }
}

/// Ensure base URLs have a leading and trailing slash
pub fn normalize_base_url(raw: &str) -> String {
    let mut s = raw.trim().to_string();
    if !s.starts_with('/') {
        s.insert(0, '/');
    }
    if !s.ends_with('/') {
        s.push('/');
    }

    while s.contains("//") {
        s = s.replace("//", "/");
    }

    s
}

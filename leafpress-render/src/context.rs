//! Render contexts whose entries may still be computing.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use anyhow::Context as _;
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;

use crate::error::TemplateError;
use crate::value::Value;

/// A value that becomes available later, e.g. rendered Markdown.
pub type PendingValue = BoxFuture<'static, anyhow::Result<Value>>;

enum Entry {
    Ready(Value),
    Pending(PendingValue),
}

/// Named values for one render.
///
/// Entries can be inserted before they are computed; [`Context::resolve`]
/// waits for all of them at once before the template runs.
#[derive(Default)]
pub struct Context {
    entries: BTreeMap<String, Entry>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.entries
            .insert(name.into(), Entry::Ready(value.into()));
        self
    }

    pub fn insert_pending<F>(&mut self, name: impl Into<String>, value: F) -> &mut Self
    where
        F: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.entries
            .insert(name.into(), Entry::Pending(value.boxed()));
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn with_pending<F>(mut self, name: impl Into<String>, value: F) -> Self
    where
        F: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.insert_pending(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wait for every pending entry concurrently. The first failure wins and
    /// names the entry it came from.
    pub async fn resolve(self) -> Result<BTreeMap<String, Value>, TemplateError> {
        let mut resolved = BTreeMap::new();
        let mut pending = Vec::new();
        for (name, entry) in self.entries {
            match entry {
                Entry::Ready(value) => {
                    resolved.insert(name, value);
                }
                Entry::Pending(future) => pending.push(async move {
                    let value = future
                        .await
                        .with_context(|| format!("resolving template variable {name:?}"))?;
                    Ok::<_, anyhow::Error>((name, value))
                }),
            }
        }

        resolved.extend(try_join_all(pending).await?);
        Ok(resolved)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, entry) in &self.entries {
            match entry {
                Entry::Ready(value) => map.entry(name, value),
                Entry::Pending(_) => map.entry(name, &format_args!("<pending>")),
            };
        }
        map.finish()
    }
}

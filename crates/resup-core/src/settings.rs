//! Immutable per-controller settings shared by files and chunks.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::UploadConfig;
use crate::events::EventBus;
use crate::file::FileMeta;
use crate::identifier::derive_identifier;
use crate::retry::RetryPolicy;

/// File-derived headers or query data.
pub type MetaHook = Arc<dyn Fn(&FileMeta) -> BTreeMap<String, String> + Send + Sync>;

/// Custom identifier generator: `(path, size) -> identifier`.
pub type IdentifierHook = Arc<dyn Fn(&Path, u64) -> String + Send + Sync>;

/// Callbacks that can't live in the TOML config.
#[derive(Clone, Default)]
pub struct Hooks {
    pub headers: Option<MetaHook>,
    pub query: Option<MetaHook>,
    pub identifier: Option<IdentifierHook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("headers", &self.headers.is_some())
            .field("query", &self.query.is_some())
            .field("identifier", &self.identifier.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub(crate) struct Settings {
    pub config: UploadConfig,
    pub policy: RetryPolicy,
    pub hooks: Hooks,
    pub events: EventBus,
}

impl Settings {
    pub fn new(config: UploadConfig, hooks: Hooks) -> Self {
        Self {
            policy: RetryPolicy::from_config(&config),
            config,
            hooks,
            events: EventBus::new(),
        }
    }

    pub fn identifier(&self, path: &Path, size: u64) -> String {
        match &self.hooks.identifier {
            Some(hook) => hook(path, size),
            None => derive_identifier(path, size),
        }
    }

    /// Static headers merged with the file-derived ones (hook wins).
    pub fn headers(&self, meta: &FileMeta) -> Vec<(String, String)> {
        merge(&self.config.headers, self.hooks.headers.as_ref(), meta)
    }

    /// Static query data merged with the file-derived one (hook wins).
    pub fn query(&self, meta: &FileMeta) -> Vec<(String, String)> {
        merge(&self.config.query, self.hooks.query.as_ref(), meta)
    }
}

fn merge(
    base: &BTreeMap<String, String>,
    hook: Option<&MetaHook>,
    meta: &FileMeta,
) -> Vec<(String, String)> {
    let mut out = base.clone();
    if let Some(hook) = hook {
        out.extend(hook(meta));
    }
    out.into_iter().collect()
}

//! Upload controller: file registry, worker pool, batch-level controls.
//!
//! All registry state sits behind one `std::sync::Mutex`. It is only held
//! for short synchronous sections (scan, state transition, event fire) and
//! never across an `.await`.

mod registry;
mod stats;
mod worker;


use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::events::UploadEvent;
use crate::file::{FileMeta, FileSnapshot, FileUnit};
use crate::identifier::display_file_name;
use crate::settings::{Hooks, Settings};
use crate::transport::{CurlTransport, Transport};

pub(crate) use registry::Registry;
pub use stats::UploadStats;
pub use worker::{NextChunk, UploadOutcome};

/// State shared between the controller handle and its workers.
pub(crate) struct Shared {
    pub settings: Arc<Settings>,
    pub transport: Arc<dyn Transport>,
    state: Mutex<Registry>,
}

impl Shared {
    pub fn lock(&self) -> MutexGuard<'_, Registry> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result of a registration call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddedFiles {
    /// Identifiers of newly registered files, in order.
    pub added: Vec<String>,
    /// Paths whose identifier was already registered.
    pub skipped: Vec<PathBuf>,
}

/// Handle to an upload session. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct UploadController {
    shared: Arc<Shared>,
}

/// Builder for controllers that need hooks or a custom transport.
pub struct UploadControllerBuilder {
    config: UploadConfig,
    transport: Option<Arc<dyn Transport>>,
    hooks: Hooks,
}

impl UploadControllerBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// File-derived headers added to every request of that file.
    pub fn headers_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&FileMeta) -> BTreeMap<String, String> + Send + Sync + 'static,
    {
        self.hooks.headers = Some(Arc::new(f));
        self
    }

    /// File-derived query data added to every request of that file.
    pub fn query_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&FileMeta) -> BTreeMap<String, String> + Send + Sync + 'static,
    {
        self.hooks.query = Some(Arc::new(f));
        self
    }

    /// Replace the default `"{size}-{sanitized path}"` identifier.
    pub fn identifier_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Path, u64) -> String + Send + Sync + 'static,
    {
        self.hooks.identifier = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Result<UploadController, UploadError> {
        self.config.validate()?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(CurlTransport::new()));
        Ok(UploadController {
            shared: Arc::new(Shared {
                settings: Arc::new(Settings::new(self.config, self.hooks)),
                transport,
                state: Mutex::new(Registry::default()),
            }),
        })
    }
}

impl UploadController {
    pub fn builder(config: UploadConfig) -> UploadControllerBuilder {
        UploadControllerBuilder {
            config,
            transport: None,
            hooks: Hooks::default(),
        }
    }

    pub fn new(config: UploadConfig, transport: Arc<dyn Transport>) -> Result<Self, UploadError> {
        Self::builder(config).transport(transport).build()
    }

    /// Controller using the libcurl transport.
    pub fn with_curl(config: UploadConfig) -> Result<Self, UploadError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &UploadConfig {
        &self.shared.settings.config
    }

    /// Receive every event fired from now on.
    pub fn subscribe(&self) -> UnboundedReceiver<UploadEvent> {
        self.shared.settings.events.subscribe()
    }

    fn fire(&self, event: UploadEvent) {
        self.shared.settings.events.fire(event);
    }

    /// Register files. The whole batch is validated first; any failure
    /// (count, missing file, size, type) registers nothing. Duplicates of an
    /// already registered identifier are skipped, not an error.
    pub async fn add_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<AddedFiles, UploadError> {
        let settings = Arc::clone(&self.shared.settings);
        let cfg = &settings.config;
        let existing = self.shared.lock().files.len();
        registry::check_count(cfg, existing, paths.len())?;

        let mut candidates = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let stat = tokio::fs::metadata(path)
                .await
                .map_err(|source| UploadError::Stat {
                    path: path.to_path_buf(),
                    source,
                })?;
            if !stat.is_file() {
                return Err(UploadError::Stat {
                    path: path.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
                });
            }
            registry::check_candidate(cfg, path, stat.len())?;
            candidates.push((path.to_path_buf(), stat.len()));
        }

        let mut result = AddedFiles::default();
        {
            let mut registry = self.shared.lock();
            registry::check_count(cfg, registry.files.len(), candidates.len())?;
            for (path, size) in candidates {
                let identifier = settings.identifier(&path, size);
                if registry.find(&identifier).is_some() {
                    tracing::debug!(file = %identifier, "already registered, skipped");
                    result.skipped.push(path);
                    continue;
                }
                let meta = FileMeta {
                    identifier: identifier.clone(),
                    file_name: display_file_name(&path),
                    path,
                    size,
                };
                registry.files.push(FileUnit::new(meta, Arc::clone(&settings)));
                tracing::info!(file = %identifier, size, "file added");
                self.fire(UploadEvent::FileAdded {
                    file: identifier.clone(),
                });
                result.added.push(identifier);
            }
        }
        if !result.added.is_empty() || !result.skipped.is_empty() {
            self.fire(UploadEvent::FilesAdded {
                added: result.added.clone(),
                skipped: result.skipped.clone(),
            });
        }
        Ok(result)
    }

    pub async fn add_file(&self, path: impl AsRef<Path>) -> Result<AddedFiles, UploadError> {
        self.add_files(&[path.as_ref()]).await
    }

    /// Unregister a file, aborting its in-flight chunks.
    pub fn remove_file(&self, identifier: &str) -> bool {
        let removed = self.shared.lock().remove(identifier);
        match removed {
            Some(mut file) => {
                file.cancel();
                tracing::info!(file = %identifier, "file removed");
                true
            }
            None => false,
        }
    }

    pub fn file(&self, identifier: &str) -> Option<FileSnapshot> {
        self.shared.lock().find(identifier).map(FileUnit::snapshot)
    }

    pub fn files(&self) -> Vec<FileSnapshot> {
        self.shared
            .lock()
            .files
            .iter()
            .map(FileUnit::snapshot)
            .collect()
    }

    pub fn is_uploading(&self) -> bool {
        self.shared.lock().is_uploading()
    }

    /// Stop the worker pool and return in-flight chunks to pending.
    pub fn pause(&self) {
        {
            let mut registry = self.shared.lock();
            registry.batch.epoch += 1;
            for file in &mut registry.files {
                file.abort();
            }
        }
        tracing::info!("upload paused");
        self.fire(UploadEvent::Pause);
    }

    /// Drop every file's chunk list. Workers move on and find nothing left.
    pub fn cancel(&self) {
        self.fire(UploadEvent::BeforeCancel);
        {
            let mut registry = self.shared.lock();
            for file in &mut registry.files {
                file.cancel();
            }
        }
        tracing::info!("upload cancelled");
        self.fire(UploadEvent::Cancel);
    }

    /// Size-weighted progress over all files, in [0, 1].
    pub fn progress(&self) -> f64 {
        let mut registry = self.shared.lock();
        let mut done = 0.0;
        let mut total = 0u64;
        for file in &mut registry.files {
            done += file.progress() * file.size() as f64;
            total += file.size();
        }
        if total == 0 {
            0.0
        } else {
            done / total as f64
        }
    }

    /// Total bytes of all registered files.
    pub fn size(&self) -> u64 {
        self.shared.lock().files.iter().map(FileUnit::size).sum()
    }

    pub fn stats(&self) -> UploadStats {
        let fraction = self.progress();
        let registry = self.shared.lock();
        UploadStats {
            files: registry.files.len(),
            files_complete: registry
                .files
                .iter()
                .filter(|f| !f.is_errored() && !f.is_cancelled() && f.is_complete())
                .count(),
            files_errored: registry.files.iter().filter(|f| f.is_errored()).count(),
            files_cancelled: registry.files.iter().filter(|f| f.is_cancelled()).count(),
            total_bytes: registry.files.iter().map(FileUnit::size).sum(),
            bytes_acknowledged: registry.files.iter().map(FileUnit::acked_bytes).sum(),
            fraction,
        }
    }

    fn with_file<T>(
        &self,
        identifier: &str,
        f: impl FnOnce(&mut FileUnit) -> T,
    ) -> Result<T, UploadError> {
        let mut registry = self.shared.lock();
        let file = registry
            .find_mut(identifier)
            .ok_or_else(|| UploadError::UnknownFile(identifier.to_string()))?;
        Ok(f(file))
    }

    /// A paused file is skipped by the scheduler; in-flight chunks finish.
    pub fn pause_file(&self, identifier: &str, paused: bool) -> Result<(), UploadError> {
        self.with_file(identifier, |file| file.pause(paused))
    }

    pub fn is_file_paused(&self, identifier: &str) -> Result<bool, UploadError> {
        self.with_file(identifier, |file| file.is_paused())
    }

    /// Return the file's uploading chunks to pending. Unless the file is
    /// also paused, running workers pick them up again.
    pub fn abort_file(&self, identifier: &str) -> Result<usize, UploadError> {
        self.with_file(identifier, FileUnit::abort)
    }

    /// Drop the file's chunk list; its worker slots move to other files.
    pub fn cancel_file(&self, identifier: &str) -> Result<usize, UploadError> {
        self.with_file(identifier, FileUnit::cancel)
    }

    /// Rebuild the file's chunk plan (clearing an error) and upload again.
    pub async fn retry_file(&self, identifier: &str) -> Result<UploadOutcome, UploadError> {
        self.with_file(identifier, FileUnit::bootstrap)?;
        tracing::info!(file = %identifier, "retrying file");
        Ok(self.upload().await)
    }

    pub fn file_progress(&self, identifier: &str) -> Result<f64, UploadError> {
        self.with_file(identifier, FileUnit::progress)
    }

    pub fn is_file_uploading(&self, identifier: &str) -> Result<bool, UploadError> {
        self.with_file(identifier, |file| file.is_uploading())
    }

    pub fn is_file_complete(&self, identifier: &str) -> Result<bool, UploadError> {
        self.with_file(identifier, |file| file.is_complete())
    }
}

//! `resup upload` – register files and run the worker pool to completion.

use anyhow::{bail, Result};
use resup_core::{UploadConfig, UploadController, UploadEvent, UploadOutcome};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Command-line overrides on top of the loaded config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOverrides {
    pub target: Option<String>,
    pub test_target: Option<String>,
    pub chunk_size: Option<u64>,
    pub simultaneous: Option<usize>,
    pub no_test: bool,
}

impl UploadOverrides {
    pub fn apply(self, cfg: &mut UploadConfig) {
        if let Some(target) = self.target {
            cfg.target = target;
        }
        if let Some(test_target) = self.test_target {
            cfg.test_target = Some(test_target);
        }
        if let Some(size) = self.chunk_size {
            cfg.chunk_size = size;
        }
        if let Some(n) = self.simultaneous {
            cfg.simultaneous_uploads = n;
        }
        if self.no_test {
            cfg.test_chunks = false;
        }
    }
}

pub async fn run_upload(cfg: UploadConfig, files: &[PathBuf]) -> Result<()> {
    let throttle = cfg.progress_throttle();
    let controller = UploadController::with_curl(cfg)?;
    let mut events = controller.subscribe();

    let added = controller.add_files(files).await?;
    for path in &added.skipped {
        println!("skipped (already added): {}", path.display());
    }
    if added.added.is_empty() {
        println!("Nothing to upload.");
        return Ok(());
    }

    let mut report = Reporter::new(throttle);
    let upload = controller.upload();
    tokio::pin!(upload);
    let outcome = loop {
        tokio::select! {
            outcome = &mut upload => break outcome,
            Some(event) = events.recv() => report.event(&controller, event),
        }
    };
    while let Ok(event) = events.try_recv() {
        report.event(&controller, event);
    }
    if outcome == UploadOutcome::AlreadyUploading {
        bail!("an upload is already running");
    }

    let stats = controller.stats();
    println!(
        "{} file(s): {} complete, {} failed, {} cancelled, {} / {} bytes acknowledged",
        stats.files,
        stats.files_complete,
        stats.files_errored,
        stats.files_cancelled,
        stats.bytes_acknowledged,
        stats.total_bytes
    );
    for file in controller.files() {
        let state = if file.errored {
            "failed"
        } else if file.cancelled {
            "cancelled"
        } else if file.complete {
            "done"
        } else {
            "incomplete"
        };
        println!("  {:<10} {}", state, file.meta.path.display());
    }
    if stats.files_errored > 0 {
        bail!("{} file(s) failed to upload", stats.files_errored);
    }
    Ok(())
}

/// Prints file outcomes as they happen and overall progress at most once
/// per throttle interval.
struct Reporter {
    throttle: Duration,
    last_print: Option<Instant>,
}

impl Reporter {
    fn new(throttle: Duration) -> Self {
        Self {
            throttle,
            last_print: None,
        }
    }

    fn event(&mut self, controller: &UploadController, event: UploadEvent) {
        match event {
            UploadEvent::Progress => {
                let now = Instant::now();
                if self
                    .last_print
                    .is_some_and(|t| now.duration_since(t) < self.throttle)
                {
                    return;
                }
                self.last_print = Some(now);
                let stats = controller.stats();
                println!(
                    "  {:.1}%  {:.1} / {:.1} MiB  {}/{} files",
                    stats.percent(),
                    stats.bytes_acknowledged as f64 / 1_048_576.0,
                    stats.total_bytes as f64 / 1_048_576.0,
                    stats.files_complete,
                    stats.files
                );
            }
            UploadEvent::FileSuccess { file, .. } => println!("  uploaded {}", file),
            UploadEvent::FileError { file, message } => {
                eprintln!("  failed   {}: {}", file, message)
            }
            UploadEvent::FileRetry { file } => tracing::debug!(file = %file, "chunk retry"),
            _ => {}
        }
    }
}

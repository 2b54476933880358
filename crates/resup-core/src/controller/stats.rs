//! Batch-level progress snapshot (CLI-friendly).

/// Snapshot of the registry for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadStats {
    /// Registered files.
    pub files: usize,
    /// Files whose every chunk was acknowledged.
    pub files_complete: usize,
    pub files_errored: usize,
    /// Files whose chunk list was dropped by a cancel.
    pub files_cancelled: usize,
    /// Sum of registered file sizes.
    pub total_bytes: u64,
    /// Bytes in chunks the server acknowledged.
    pub bytes_acknowledged: u64,
    /// Size-weighted progress in [0.0, 1.0].
    pub fraction: f64,
}

impl UploadStats {
    /// No file left to work on (errored and cancelled files count as finished).
    pub fn is_finished(&self) -> bool {
        self.files_complete + self.files_errored + self.files_cancelled == self.files
    }

    pub fn percent(&self) -> f64 {
        (self.fraction * 100.0).clamp(0.0, 100.0)
    }
}

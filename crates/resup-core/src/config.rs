use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::UploadError;

/// How a chunk payload is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMethod {
    /// Metadata as form fields, payload as a file part.
    #[default]
    Multipart,
    /// Metadata in the query string, raw payload as the request body.
    Octet,
}

/// HTTP verb used for probe or upload requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}

/// Wire names for every metadata field sent with a probe or chunk upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterNames {
    pub file: String,
    pub chunk_number: String,
    pub chunk_size: String,
    pub current_chunk_size: String,
    pub total_size: String,
    pub identifier: String,
    pub file_name: String,
    pub relative_path: String,
    pub total_chunks: String,
}

impl Default for ParameterNames {
    fn default() -> Self {
        Self {
            file: "file".to_string(),
            chunk_number: "resumableChunkNumber".to_string(),
            chunk_size: "resumableChunkSize".to_string(),
            current_chunk_size: "resumableCurrentChunkSize".to_string(),
            total_size: "resumableTotalSize".to_string(),
            identifier: "resumableIdentifier".to_string(),
            file_name: "resumableFilename".to_string(),
            relative_path: "resumableRelativePath".to_string(),
            total_chunks: "resumableTotalChunks".to_string(),
        }
    }
}

/// Upload configuration loaded from `~/.config/resup/config.toml`.
///
/// Immutable once handed to an `UploadController`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Endpoint receiving chunk uploads.
    pub target: String,
    /// Endpoint for existence probes; falls back to `target` when unset.
    pub test_target: Option<String>,
    /// Nominal chunk size in bytes. The last chunk absorbs the remainder.
    pub chunk_size: u64,
    /// Number of concurrent chunk requests (worker count).
    pub simultaneous_uploads: usize,
    /// Probe the server for each chunk before sending it.
    pub test_chunks: bool,
    /// Maximum number of registered files (None = unlimited).
    pub max_files: Option<usize>,
    /// Minimum accepted file size in bytes.
    pub min_file_size: Option<u64>,
    /// Maximum accepted file size in bytes.
    pub max_file_size: Option<u64>,
    /// Allowed file extensions (case-insensitive, without dot). Empty = any.
    pub file_types: Vec<String>,
    /// Re-sends allowed per chunk before a transient failure becomes final.
    pub max_chunk_retries: u32,
    /// Flat delay before a re-send, in milliseconds (None = immediate).
    pub chunk_retry_interval_ms: Option<u64>,
    /// Response codes that end a chunk (and its file) without retry.
    pub permanent_errors: Vec<u16>,
    /// Per-request timeout in milliseconds (None = no timeout).
    pub timeout_ms: Option<u64>,
    /// Minimum interval between chunk progress events, in milliseconds.
    pub throttle_progress_ms: u64,
    pub method: SendMethod,
    pub upload_method: HttpMethod,
    pub test_method: HttpMethod,
    /// Prefix prepended to every wire parameter name.
    pub parameter_namespace: String,
    pub params: ParameterNames,
    /// Static headers added to every request.
    pub headers: BTreeMap<String, String>,
    /// Static query data added to every request.
    pub query: BTreeMap<String, String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            target: "http://127.0.0.1:3000/upload".to_string(),
            test_target: None,
            chunk_size: 1024 * 1024,
            simultaneous_uploads: 3,
            test_chunks: true,
            max_files: None,
            min_file_size: Some(1),
            max_file_size: None,
            file_types: Vec::new(),
            max_chunk_retries: 100,
            chunk_retry_interval_ms: None,
            permanent_errors: vec![400, 404, 415, 500, 501],
            timeout_ms: None,
            throttle_progress_ms: 500,
            method: SendMethod::Multipart,
            upload_method: HttpMethod::Post,
            test_method: HttpMethod::Get,
            parameter_namespace: String::new(),
            params: ParameterNames::default(),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
        }
    }
}

impl UploadConfig {
    /// Rejects values the scheduler cannot work with.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.chunk_size == 0 {
            return Err(UploadError::InvalidConfig("chunk_size must be > 0".into()));
        }
        if self.simultaneous_uploads == 0 {
            return Err(UploadError::InvalidConfig(
                "simultaneous_uploads must be > 0".into(),
            ));
        }
        if self.target.trim().is_empty() {
            return Err(UploadError::InvalidConfig("target must not be empty".into()));
        }
        Ok(())
    }

    /// Probe endpoint: `test_target` if set, else `target`.
    pub fn probe_target(&self) -> &str {
        self.test_target.as_deref().unwrap_or(&self.target)
    }

    pub fn retry_interval(&self) -> Option<Duration> {
        self.chunk_retry_interval_ms.map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn progress_throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_progress_ms)
    }

    /// Wire name for a parameter, with the namespace prefix applied.
    pub fn param(&self, name: &str) -> String {
        format!("{}{}", self.parameter_namespace, name)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("resup")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<UploadConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = UploadConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: UploadConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = UploadConfig::default();
        assert_eq!(cfg.chunk_size, 1024 * 1024);
        assert_eq!(cfg.simultaneous_uploads, 3);
        assert_eq!(cfg.max_chunk_retries, 100);
        assert_eq!(cfg.permanent_errors, vec![400, 404, 415, 500, 501]);
        assert_eq!(cfg.throttle_progress_ms, 500);
        assert!(cfg.test_chunks);
        assert!(cfg.chunk_retry_interval_ms.is_none());
        assert_eq!(cfg.min_file_size, Some(1));
        assert_eq!(cfg.params.chunk_number, "resumableChunkNumber");
        assert_eq!(cfg.params.file, "file");
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = UploadConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: UploadConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.target, cfg.target);
        assert_eq!(parsed.chunk_size, cfg.chunk_size);
        assert_eq!(parsed.permanent_errors, cfg.permanent_errors);
        assert_eq!(parsed.params, cfg.params);
    }

    #[test]
    fn config_toml_partial_uses_defaults() {
        let toml = r#"
            target = "https://files.example.com/upload"
            chunk_size = 4096
            simultaneous_uploads = 8
            chunk_retry_interval_ms = 250
            method = "octet"
            upload_method = "PUT"
            parameter_namespace = "r_"

            [params]
            file = "blob"

            [headers]
            Authorization = "Bearer abc"
        "#;
        let cfg: UploadConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.target, "https://files.example.com/upload");
        assert_eq!(cfg.chunk_size, 4096);
        assert_eq!(cfg.simultaneous_uploads, 8);
        assert_eq!(cfg.retry_interval(), Some(Duration::from_millis(250)));
        assert_eq!(cfg.method, SendMethod::Octet);
        assert_eq!(cfg.upload_method, HttpMethod::Put);
        assert_eq!(cfg.test_method, HttpMethod::Get);
        assert_eq!(cfg.params.file, "blob");
        assert_eq!(cfg.params.identifier, "resumableIdentifier");
        assert_eq!(cfg.param(&cfg.params.identifier), "r_resumableIdentifier");
        assert_eq!(cfg.headers.get("Authorization").map(String::as_str), Some("Bearer abc"));
        assert_eq!(cfg.max_chunk_retries, 100);
    }

    #[test]
    fn probe_target_falls_back_to_target() {
        let mut cfg = UploadConfig::default();
        assert_eq!(cfg.probe_target(), cfg.target);
        cfg.test_target = Some("http://127.0.0.1:3000/exists".into());
        assert_eq!(cfg.probe_target(), "http://127.0.0.1:3000/exists");
    }

    #[test]
    fn zero_timeout_means_none() {
        let mut cfg = UploadConfig::default();
        cfg.timeout_ms = Some(0);
        assert!(cfg.request_timeout().is_none());
        cfg.timeout_ms = Some(1500);
        assert_eq!(cfg.request_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn validate_rejects_zero_chunk_size_and_workers() {
        let mut cfg = UploadConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.chunk_size = 0;
        assert!(matches!(cfg.validate(), Err(UploadError::InvalidConfig(_))));
        cfg.chunk_size = 10;
        cfg.simultaneous_uploads = 0;
        assert!(matches!(cfg.validate(), Err(UploadError::InvalidConfig(_))));
    }
}

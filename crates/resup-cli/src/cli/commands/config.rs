//! `resup config` – show where the config lives and what it resolves to.

use anyhow::Result;
use resup_core::config::{self, UploadConfig};

pub fn run_config(cfg: &UploadConfig) -> Result<()> {
    let path = config::config_path()?;
    println!("config file: {}", path.display());
    println!("target:               {}", cfg.target);
    println!("test target:          {}", cfg.probe_target());
    println!("chunk size:           {} bytes", cfg.chunk_size);
    println!("simultaneous uploads: {}", cfg.simultaneous_uploads);
    println!("test chunks:          {}", cfg.test_chunks);
    println!("max chunk retries:    {}", cfg.max_chunk_retries);
    println!(
        "retry interval:       {}",
        cfg.chunk_retry_interval_ms
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_else(|| "immediate".to_string())
    );
    println!("permanent errors:     {:?}", cfg.permanent_errors);
    println!(
        "timeout:              {}",
        cfg.timeout_ms
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_else(|| "none".to_string())
    );
    println!("send method:          {:?}", cfg.method);
    println!(
        "methods:              upload {} / probe {}",
        cfg.upload_method.as_str(),
        cfg.test_method.as_str()
    );
    if !cfg.file_types.is_empty() {
        println!("file types:           {}", cfg.file_types.join(", "));
    }
    Ok(())
}

//! `resup plan` – print each file's identifier and chunk ranges.

use anyhow::{bail, Context, Result};
use resup_core::chunk::plan_chunks;
use resup_core::identifier::derive_identifier;
use std::path::PathBuf;

pub fn run_plan(chunk_size: u64, files: &[PathBuf]) -> Result<()> {
    if chunk_size == 0 {
        bail!("chunk size must be greater than zero");
    }
    for path in files {
        let size = std::fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .len();
        let chunks = plan_chunks(size, chunk_size);
        println!(
            "{}  {} bytes, {} chunk(s)",
            derive_identifier(path, size),
            size,
            chunks.len()
        );
        for (i, c) in chunks.iter().enumerate() {
            println!("  {:>5}  {:>12}..{:<12} {:>10}", i + 1, c.start, c.end, c.len());
        }
    }
    Ok(())
}

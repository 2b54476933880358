//! CLI for the resup chunked uploader.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use resup_core::config;
use std::path::PathBuf;

use commands::{run_config, run_plan, run_upload, UploadOverrides};

/// Top-level CLI for the resup uploader.
#[derive(Debug, Parser)]
#[command(name = "resup")]
#[command(about = "resup: resumable chunked file uploader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Upload files in chunks, skipping chunks the server already has.
    Upload {
        /// Files to upload.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Upload endpoint (overrides config).
        #[arg(long, value_name = "URL")]
        target: Option<String>,

        /// Existence-probe endpoint (defaults to the upload endpoint).
        #[arg(long, value_name = "URL")]
        test_target: Option<String>,

        /// Chunk size in bytes.
        #[arg(long, value_name = "BYTES")]
        chunk_size: Option<u64>,

        /// Number of chunks in flight at once.
        #[arg(long, value_name = "N")]
        simultaneous: Option<usize>,

        /// Skip the existence probe and send every chunk.
        #[arg(long)]
        no_test: bool,
    },

    /// Show identifiers and chunk ranges without uploading.
    Plan {
        /// Files to plan.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Chunk size in bytes (defaults to config).
        #[arg(long, value_name = "BYTES")]
        chunk_size: Option<u64>,
    },

    /// Print the config file path and effective settings.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Upload {
                files,
                target,
                test_target,
                chunk_size,
                simultaneous,
                no_test,
            } => {
                UploadOverrides {
                    target,
                    test_target,
                    chunk_size,
                    simultaneous,
                    no_test,
                }
                .apply(&mut cfg);
                run_upload(cfg, &files).await?;
            }
            CliCommand::Plan { files, chunk_size } => {
                run_plan(chunk_size.unwrap_or(cfg.chunk_size), &files)?;
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;

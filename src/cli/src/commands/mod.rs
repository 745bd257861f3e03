//! CLI command definitions and dispatch.

mod apply;
mod generate;
mod version;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use a3s_delta_core::config::{DeltaConfig, LogLevel};
use a3s_delta_core::worklist::WorkList;
use a3s_delta_runtime::{DeltaPipeline, DockerCli, Mode};
use clap::{Args, Parser, Subcommand};

use crate::output;

/// Default worklist file name.
const DEFAULT_WORKLIST: &str = "image_list.json";

/// A3S Delta - ship container image upgrades as layer diffs.
#[derive(Parser)]
#[command(name = "a3s-delta", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command. Flags override the config file.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Configuration file (YAML or JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding diff archives
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Directory receiving reconstructed images
    #[arg(long, global = true)]
    pub release_dir: Option<PathBuf>,

    /// Number of entries processed concurrently
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Replace existing archives whose content differs
    #[arg(long, global = true)]
    pub overwrite: bool,

    /// Log level (debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,
}

impl GlobalArgs {
    /// Load the config file (or defaults) and apply flag overrides.
    pub fn load_config(&self) -> Result<DeltaConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => DeltaConfig::from_file(path)?,
            None => DeltaConfig::default(),
        };

        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.release_dir {
            config.release_dir = dir.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.overwrite {
            config.overwrite = true;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Build diff archives for every worklist entry (connected side)
    #[command(alias = "dev")]
    Generate(generate::GenerateArgs),
    /// Reconstruct new images from diff archives (target side)
    #[command(alias = "target")]
    Apply(apply::ApplyArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Dispatch a parsed command to the appropriate handler.
pub async fn dispatch(
    command: Command,
    config: DeltaConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Generate(args) => generate::execute(args, config).await,
        Command::Apply(args) => apply::execute(args, config).await,
        Command::Version(args) => version::execute(args).await,
    }
}

/// Run a worklist through the docker-backed pipeline and print the summary.
///
/// Ctrl-C stops the run at the next step boundary; entries not yet finished
/// are reported as cancelled.
pub(crate) async fn run_worklist(
    mode: Mode,
    worklist: &Path,
    config: DeltaConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if !worklist.is_file() {
        return Err(format!("Worklist file {} does not exist", worklist.display()).into());
    }
    let worklist = WorkList::from_file(worklist)?;

    let engine = Arc::new(DockerCli::new(&config.engine_binary));
    let pipeline = DeltaPipeline::new(config, engine);

    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current step");
            cancel.cancel();
        }
    });

    let summary = pipeline.run(mode, &worklist).await?;
    println!("{}", output::summary_table(&summary));

    if !summary.is_success() {
        return Err(format!(
            "{} of {} entries failed",
            summary.failed_count(),
            summary.reports.len()
        )
        .into());
    }
    Ok(())
}

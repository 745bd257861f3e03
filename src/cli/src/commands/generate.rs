//! `a3s-delta generate` command.

use std::path::PathBuf;

use a3s_delta_core::config::DeltaConfig;
use a3s_delta_runtime::Mode;
use clap::Args;

use super::DEFAULT_WORKLIST;

#[derive(Args)]
pub struct GenerateArgs {
    /// Worklist file listing image, old version and new version
    #[arg(default_value = DEFAULT_WORKLIST)]
    pub worklist: PathBuf,
}

pub async fn execute(
    args: GenerateArgs,
    config: DeltaConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    super::run_worklist(Mode::Generate, &args.worklist, config).await
}

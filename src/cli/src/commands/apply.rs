//! `a3s-delta apply` command.

use std::path::PathBuf;

use a3s_delta_core::config::DeltaConfig;
use a3s_delta_runtime::Mode;
use clap::Args;

use super::DEFAULT_WORKLIST;

#[derive(Args)]
pub struct ApplyArgs {
    /// Worklist file listing image, old version and new version
    #[arg(default_value = DEFAULT_WORKLIST)]
    pub worklist: PathBuf,

    /// Load each reconstructed image into the container engine
    #[arg(long)]
    pub load: bool,
}

pub async fn execute(
    args: ApplyArgs,
    mut config: DeltaConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if args.load {
        config.load_after_apply = true;
    }
    super::run_worklist(Mode::Apply, &args.worklist, config).await
}

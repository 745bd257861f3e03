//! `a3s-delta version` command.

use clap::Args;

#[derive(Args)]
pub struct VersionArgs;

pub async fn execute(_args: VersionArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("a3s-delta version {}", a3s_delta_core::VERSION);
    println!("runtime {}", a3s_delta_runtime::VERSION);
    Ok(())
}

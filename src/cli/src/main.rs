//! A3S Delta CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use a3s_delta_cli::commands::{dispatch, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.global.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    // --log-level wins over RUST_LOG, which wins over the config file
    let filter = match cli.global.log_level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string())),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = dispatch(cli.command, config).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

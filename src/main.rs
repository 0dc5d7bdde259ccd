// moscript - command-line runner for the covenant engine

use std::process::exit;

use clap::Parser;
use tracing::error;

use moscript_covenant::cli::{dispatch, load_engine_config, Cli};
use moscript_covenant::log_sink::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_engine_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e:#}");
            exit(1);
        }
    };

    init_logging(&config.log_level);

    if let Err(e) = dispatch(cli, &config).await {
        error!("{e:#}");
        eprintln!("{e:#}");
        exit(1);
    }
}

use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::Parser;
use reimburse_cli::Cli;
use reimburse_core::config::{AppConfig, LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|error| anyhow!("invalid log level `{}`: {error}", config.level))?;
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let initialized = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    initialized.map_err(|error| anyhow!("failed to initialize logging: {error}"))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Commands report configuration problems themselves; logging falls back to defaults.
    let config = AppConfig::load(cli.load_options()).unwrap_or_default();
    init_logging(&config.logging)?;

    Ok(reimburse_cli::run(cli))
}

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use taskdash::cli::{self, Cli, Commands};
use taskdash::config::{get_data_dir, Config};

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// The board owns the terminal, so its logs go to a file and only when asked for.
fn init_board_logging() -> Result<()> {
    if std::env::var_os("TASKDASH_DEBUG").is_none() {
        return Ok(());
    }
    let dir = get_data_dir();
    std::fs::create_dir_all(&dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("taskdash.log"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter("taskdash=debug"))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Show) => init_board_logging()?,
        Some(Commands::Serve { .. }) => tracing_subscriber::fmt()
            .with_env_filter(filter("taskdash=info,tower_http=info"))
            .init(),
        Some(_) => tracing_subscriber::fmt()
            .with_env_filter(filter("taskdash=warn"))
            .with_writer(std::io::stderr)
            .init(),
    }

    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    cli::run(cli, config).await
}

mod cli;
mod dispatcher;

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use dispatcher::Context;
use holdings::config::{default_config_path, Config};

fn main() -> Result<()> {
    // Logs go to stderr so table and JSON output stay clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = match cli.config.clone().or_else(default_config_path) {
        Some(path) => {
            debug!("Loading config from {:?}", path);
            Config::load_or_default(&path)?
        }
        None => Config::default(),
    };

    let ctx = Context {
        db_path: cli.db.clone().or(config.database_path),
        thresholds: config.classification,
        json: cli.json,
    };

    dispatcher::dispatch_command(cli.command, &ctx)
}

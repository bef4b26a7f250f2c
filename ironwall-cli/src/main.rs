//! `ironwall` -- offline front end for the rule-chain evaluation engine.
//!
//! Loads a TOML ruleset fixture into a table, evaluates packets against it
//! and reports configuration. No packets are captured from the network.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::path::Path;

use clap::Parser;
use colored::Colorize;

use ironwall_core::config::IronwallConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            e.exit_code()
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // `config` inspects the file itself, so it must not fail before the handler runs.
    let mut config = match cli.command {
        Commands::Config(_) => IronwallConfig::default(),
        _ => load_config(&cli.config).await?,
    };
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    logging::init_tracing(&config.general)?;
    ironwall_core::metrics::describe_all();

    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Eval(args) => commands::eval::execute(args, &config.engine, &writer).await,
        Commands::Check(args) => commands::check::execute(args, &config.engine, &writer).await,
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    }
}

/// Load the configuration file if it exists, otherwise defaults plus env overrides.
async fn load_config(path: &Path) -> Result<IronwallConfig, CliError> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(IronwallConfig::load(path).await?);
    }

    let mut config = IronwallConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

//! CLI for the dlfleet download coordinator.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dlfleet_core::config;

use commands::{run_fetch, run_serve};

/// Top-level CLI for dlfleet.
#[derive(Debug, Parser)]
#[command(name = "dlfleet")]
#[command(about = "dlfleet: distributed download coordinator and agents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the coordinator API with in-process agents until Ctrl-C.
    Serve {
        /// Address for the HTTP API (overrides `coordinator.listen_addr`).
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
        /// Number of download agents to start alongside the coordinator.
        #[arg(long, default_value = "1", value_name = "N")]
        agents: usize,
    },

    /// Download one URL with a local agent and print its progress.
    Fetch {
        /// Direct HTTP/HTTPS URL to download (the body is discarded).
        url: String,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Serve { listen, agents } => run_serve(&cfg, listen, agents).await?,
            CliCommand::Fetch { url } => run_fetch(&cfg.agent, &url).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;

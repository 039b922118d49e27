//! kscale CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// kscale - Kubernetes control-plane scale testing
#[derive(Parser, Debug)]
#[command(name = "kscale")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "KSCALE_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create, wait for and delete a batch of pause pods
    Pods(commands::pods::PodsArgs),
    /// Create OpenShift projects through project requests, then delete them
    Projects(commands::projects::ProjectsArgs),
    /// Wait until API server requests for a resource kind go idle
    WaitIdle(commands::idle::WaitIdleArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Pods(args) => commands::pods::run(args).await,
            Commands::Projects(args) => commands::projects::run(args).await,
            Commands::WaitIdle(args) => commands::idle::run(args).await,
        }
    }
}

//! kscale
//!
//! Runs Kubernetes control-plane scale tests.

use clap::Parser;

use kscale_cli::{Cli, Result};
use kscale_common::telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_telemetry(TelemetryConfig::default().with_json(cli.log_json))?;
    cli.run().await
}

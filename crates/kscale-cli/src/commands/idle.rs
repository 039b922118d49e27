//! Wait-idle command - block until API server requests for a kind settle

use std::time::Duration;

use clap::Args;

use kscale_monitoring::{ApiServerRequestMonitor, IdleMonitorConfig};

use super::PrometheusArgs;
use crate::Result;

/// Wait until API server requests for a resource kind drop below a threshold
#[derive(Args, Debug)]
pub struct WaitIdleArgs {
    /// Resource kind (e.g., Pod, Project)
    #[arg(long)]
    pub kind: String,

    /// API group of the kind ("" for the core group)
    #[arg(long, default_value = "")]
    pub api_group: String,

    /// Request rate below which the API server counts as idle
    #[arg(long)]
    pub threshold: f64,

    /// Rate window in seconds; the wait gives up after twice this
    #[arg(long, default_value = "300")]
    pub window_secs: u64,

    /// Seconds between samples
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_secs: u64,

    #[command(flatten)]
    pub prometheus: PrometheusArgs,
}

/// Run the wait-idle command
pub async fn run(args: WaitIdleArgs) -> Result<()> {
    let config = IdleMonitorConfig {
        window: Duration::from_secs(args.window_secs),
        sample_interval: Duration::from_secs(args.interval_secs),
        ..Default::default()
    };
    let monitor = ApiServerRequestMonitor::new(
        args.prometheus.source()?,
        args.api_group,
        &args.kind,
        args.threshold,
    )
    .with_config(config);

    monitor.wait_for_idle().await?;
    println!("idle: {}", monitor.query());
    Ok(())
}

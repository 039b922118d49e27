//! CLI commands

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use kube::Client;
use tracing::info;

use kscale_common::cache::{JsonFileCache, ResultCache};
use kscale_common::kube_utils::create_client;
use kscale_monitoring::{ApiServerRequestMonitor, MetricsSource, PrometheusClient};
use kscale_threaded::{ResourceStatus, ScaleFlags, ScaleResources, SharedRequest, SharedResource};

use crate::{Error, Result};

pub mod idle;
pub mod pods;
pub mod projects;

/// Prometheus connection settings
#[derive(Args, Debug, Clone)]
pub struct PrometheusArgs {
    /// Prometheus (or thanos-querier) base URL
    #[arg(long, env = "KSCALE_PROMETHEUS_URL")]
    pub prometheus_url: Option<String>,

    /// Bearer token for Prometheus
    #[arg(long, env = "KSCALE_PROMETHEUS_TOKEN", hide_env_values = true)]
    pub prometheus_token: Option<String>,

    /// Skip TLS certificate verification for Prometheus
    #[arg(long)]
    pub prometheus_insecure: bool,
}

impl PrometheusArgs {
    /// Metrics source for the configured Prometheus
    pub fn source(&self) -> Result<Arc<dyn MetricsSource>> {
        let url = self.prometheus_url.as_deref().ok_or_else(|| {
            Error::validation("--prometheus-url (or KSCALE_PROMETHEUS_URL) is required to wait for idle")
        })?;
        let client = PrometheusClient::new(url, self.prometheus_token.clone(), !self.prometheus_insecure)?;
        Ok(Arc::new(client))
    }
}

/// Options shared by every scale command
#[derive(Args, Debug, Clone)]
pub struct ScaleArgs {
    /// Path to kubeconfig (defaults to the standard kubeconfig resolution)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Do not create resources; adopt an existing batch
    #[arg(long)]
    pub no_create: bool,

    /// Do not delete resources when done
    #[arg(long)]
    pub no_delete: bool,

    /// Leave partially created resources in place when a phase fails
    #[arg(long)]
    pub no_cleanup_on_error: bool,

    /// Seconds each resource may take to reach its target status
    #[arg(long, default_value = "120")]
    pub status_timeout_secs: u64,

    /// Seconds each resource may take to disappear after deletion
    #[arg(long, default_value = "240")]
    pub delete_timeout_secs: u64,

    /// Directory to write phase timings to, one JSON file per key
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Prefix of the timing keys (defaults to the command name)
    #[arg(long)]
    pub cache_key_prefix: Option<String>,

    /// After the run, wait until API server requests for the kind drop below this rate
    #[arg(long)]
    pub wait_idle_threshold: Option<f64>,

    #[command(flatten)]
    pub prometheus: PrometheusArgs,
}

impl ScaleArgs {
    /// Orchestration flags selected on the command line
    pub fn flags(&self) -> ScaleFlags {
        ScaleFlags {
            create: !self.no_create,
            delete: !self.no_delete,
            cleanup_on_error: !self.no_cleanup_on_error,
        }
    }

    /// Kubernetes client for the selected kubeconfig
    pub async fn client(&self) -> Result<Client> {
        Ok(create_client(self.kubeconfig.as_deref()).await?)
    }

    fn cache(&self) -> Result<Option<Arc<dyn ResultCache>>> {
        match &self.cache_dir {
            Some(dir) => Ok(Some(Arc::new(JsonFileCache::open(dir.clone())?))),
            None => Ok(None),
        }
    }
}

/// The resource kind a scale command drives, for idle monitoring
pub struct IdleTarget {
    /// API group ("" for core)
    pub api_group: &'static str,
    /// Resource kind
    pub kind: &'static str,
}

/// One batch to push through a scale cycle
pub struct ScaleRun {
    /// Command name, used as the default cache key prefix
    pub name: &'static str,
    /// The batch
    pub resources: Vec<SharedResource>,
    /// Paired request resources, if the batch is created through requests
    pub requests: Option<Vec<SharedRequest>>,
    /// Status every resource must reach after creation
    pub status: ResourceStatus,
    /// Kind to watch when waiting for idle
    pub idle: IdleTarget,
}

/// Run one scale cycle and optionally wait for the API server to settle
pub async fn run_scale(args: &ScaleArgs, run: ScaleRun) -> Result<()> {
    // Fail fast on a missing Prometheus before touching the cluster
    let monitor = match args.wait_idle_threshold {
        Some(threshold) => Some(ApiServerRequestMonitor::new(
            args.prometheus.source()?,
            run.idle.api_group,
            run.idle.kind,
            threshold,
        )),
        None => None,
    };

    let mut scale = ScaleResources::new(run.resources)
        .with_flags(args.flags())
        .with_wait_for_status(run.status)
        .with_status_timeout(Duration::from_secs(args.status_timeout_secs))
        .with_delete_timeout(Duration::from_secs(args.delete_timeout_secs));
    if let Some(requests) = run.requests {
        scale = scale.with_request_resources(requests);
    }
    if let Some(cache) = args.cache()? {
        let prefix = args
            .cache_key_prefix
            .clone()
            .unwrap_or_else(|| run.name.to_string());
        scale = scale.with_cache(cache, prefix);
    }

    scale.enter().await?;
    scale.exit().await?;

    let mut left = scale.take_unwind_stack();
    if !left.is_empty() {
        info!(count = left.len(), "leaving resources in the cluster");
        left.clear();
    }

    println!("{}", serde_json::to_string_pretty(scale.timing())?);

    if let Some(monitor) = monitor {
        info!(query = %monitor.query(), "waiting for api server to go idle");
        monitor.wait_for_idle().await?;
    }
    Ok(())
}

//! Pods command - scale a batch of pause pods
//!
//! Ensures the target namespace exists, creates `count` pause pods in
//! parallel, waits for every pod to be Running, then deletes them all and
//! waits until they are gone.

use clap::Args;
use tracing::info;

use kscale_common::kube_utils::ensure_namespace;
use kscale_threaded::objects::pause_pods;
use kscale_threaded::ResourceStatus;

use super::{run_scale, IdleTarget, ScaleArgs, ScaleRun};
use crate::Result;

/// Scale a batch of pause pods
#[derive(Args, Debug)]
pub struct PodsArgs {
    /// Number of pods
    #[arg(long, default_value = "10")]
    pub count: usize,

    /// Namespace to create the pods in
    #[arg(short, long, default_value = "kscale-test")]
    pub namespace: String,

    /// Pod name prefix; pods are named `{prefix}-{index}`
    #[arg(long, default_value = "kscale-pod")]
    pub name_prefix: String,

    #[command(flatten)]
    pub scale: ScaleArgs,
}

/// Run the pods command
pub async fn run(args: PodsArgs) -> Result<()> {
    let client = args.scale.client().await?;
    if args.scale.flags().create {
        ensure_namespace(&client, &args.namespace).await?;
    }

    let pods = pause_pods(&client, &args.namespace, &args.name_prefix, args.count)?;
    info!(count = pods.len(), namespace = %args.namespace, "scaling pods");

    run_scale(
        &args.scale,
        ScaleRun {
            name: "pods",
            resources: pods,
            requests: None,
            status: ResourceStatus::Running,
            idle: IdleTarget {
                api_group: "",
                kind: "Pod",
            },
        },
    )
    .await
}

//! Projects command - scale OpenShift projects
//!
//! Projects cannot be created directly; each one is requested through a
//! `ProjectRequest` and the resulting `Project` is what gets waited on and
//! deleted.

use clap::Args;
use tracing::info;

use kscale_threaded::objects::{project_pairs, PROJECT_API_GROUP};
use kscale_threaded::ResourceStatus;

use super::{run_scale, IdleTarget, ScaleArgs, ScaleRun};
use crate::Result;

/// Scale OpenShift projects
#[derive(Args, Debug)]
pub struct ProjectsArgs {
    /// Number of projects
    #[arg(long, default_value = "10")]
    pub count: usize,

    /// Project name prefix; projects are named `{prefix}-{index}`
    #[arg(long, default_value = "kscale-project")]
    pub name_prefix: String,

    #[command(flatten)]
    pub scale: ScaleArgs,
}

/// Run the projects command
pub async fn run(args: ProjectsArgs) -> Result<()> {
    let client = args.scale.client().await?;
    let (projects, requests) = project_pairs(&client, &args.name_prefix, args.count);
    info!(count = projects.len(), "scaling projects");

    run_scale(
        &args.scale,
        ScaleRun {
            name: "projects",
            resources: projects,
            requests: Some(requests),
            status: ResourceStatus::Active,
            idle: IdleTarget {
                api_group: PROJECT_API_GROUP,
                kind: "Project",
            },
        },
    )
    .await
}

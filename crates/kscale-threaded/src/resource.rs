//! Managed cluster objects and their lifecycle operations
//!
//! A [`ResourceHandle`] is one object the scale run creates and deletes. The
//! orchestrator never constructs or destroys handles; it only invokes these
//! operations, and the cluster mutates the object as a side effect.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kscale_common::{Result, TIMEOUT_4MIN};

/// Observed lifecycle status of a cluster object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceStatus {
    /// Status not reported (yet)
    Unknown,
    /// Accepted but not yet running (e.g., pod scheduling, image pull)
    Pending,
    /// Workload running (pods)
    Running,
    /// Object active (namespaces, projects)
    Active,
    /// Workload ran to completion
    Succeeded,
    /// Deletion requested, finalizers still running
    Deleting,
    /// Object no longer exists
    Deleted,
    /// Object failed and will not recover on its own
    Failed,
}

impl ResourceStatus {
    /// Map a Kubernetes `status.phase` string onto a status
    pub fn from_phase(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Active" => Self::Active,
            "Succeeded" => Self::Succeeded,
            "Terminating" => Self::Deleting,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Kubernetes-style name of this status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Active => "Active",
            Self::Succeeded => "Succeeded",
            Self::Deleting => "Terminating",
            Self::Deleted => "Deleted",
            Self::Failed => "Failed",
        }
    }

    /// Whether the object can no longer reach any other status by itself
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted | Self::Failed | Self::Succeeded)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceStatus {
    type Err = kscale_common::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Deleted" => Ok(Self::Deleted),
            "Deleting" => Ok(Self::Deleting),
            "Unknown" => Ok(Self::Unknown),
            other => match Self::from_phase(other) {
                Self::Unknown => Err(kscale_common::Error::validation(format!(
                    "unknown resource status: {}",
                    other
                ))),
                status => Ok(status),
            },
        }
    }
}

/// One managed cluster object
///
/// Handles are shared across worker tasks (`Arc<dyn ResourceHandle>`); each
/// handle is driven by at most one worker at a time and handles do not share
/// mutable state, so implementations need no cross-handle coordination.
#[async_trait]
pub trait ResourceHandle: Send + Sync {
    /// Object name
    fn name(&self) -> &str;

    /// Object namespace, `None` for cluster-scoped objects
    fn namespace(&self) -> Option<&str>;

    /// Object kind (e.g., "Pod")
    fn kind(&self) -> &str;

    /// Create the object in the cluster
    async fn deploy(&self) -> Result<()>;

    /// Request deletion of the object. Deleting a missing object succeeds.
    async fn delete(&self) -> Result<()>;

    /// Wait until the object reports `status`
    async fn wait_for_status(&self, status: ResourceStatus, timeout: Duration) -> Result<()>;

    /// Wait until the object no longer exists
    async fn wait_deleted(&self, timeout: Duration) -> Result<()>;

    /// Whether the object currently exists
    async fn exists(&self) -> Result<bool>;

    /// Current observed status
    async fn status(&self) -> Result<ResourceStatus>;

    /// Delete the object and wait for it to be gone
    async fn clean_up(&self) -> Result<()> {
        self.delete().await?;
        self.wait_deleted(TIMEOUT_4MIN).await
    }

    /// Scoped acquisition: create on entry
    async fn enter(&self) -> Result<()> {
        self.deploy().await
    }

    /// Scoped release: tear down on exit
    async fn exit(&self) -> Result<()> {
        self.clean_up().await
    }

    /// "Kind namespace/name" label for logs and errors
    fn display_name(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{} {}/{}", self.kind(), ns, self.name()),
            None => format!("{} {}", self.kind(), self.name()),
        }
    }
}

/// A provisioning proxy whose deployment makes a paired [`ResourceHandle`] exist
///
/// The canonical example is an OpenShift `ProjectRequest`, which produces a
/// `Project` of the same name.
#[async_trait]
pub trait RequestResource: Send + Sync {
    /// Object name
    fn name(&self) -> &str;

    /// Submit the request
    async fn deploy(&self) -> Result<()>;
}

/// Resource handle shared between the caller and fan-out workers
pub type SharedResource = Arc<dyn ResourceHandle>;

/// Request resource shared between the caller and fan-out workers
pub type SharedRequest = Arc<dyn RequestResource>;

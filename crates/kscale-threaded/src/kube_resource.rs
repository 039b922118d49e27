//! kube-rs backed resource handles

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, DynamicObject, PostParams};
use kube::discovery::ApiResource;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use kscale_common::kube_utils::{is_not_found, poll_until, DEFAULT_POLL_INTERVAL};
use kscale_common::{Error, Result};

use crate::resource::{RequestResource, ResourceHandle, ResourceStatus};

/// A single Kubernetes object managed through the API server
///
/// Holds the desired object and an `Api` scoped to where it lives. All
/// observed state (existence, phase) is read back from the API server on
/// demand, so the handle itself is immutable and freely shareable.
pub struct KubeResource<K>
where
    K: Resource,
{
    api: Api<K>,
    desired: K,
    name: String,
    namespace: Option<String>,
    kind: String,
    poll_interval: Duration,
}

impl<K> KubeResource<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// Wrap a desired object with an explicit `Api` and kind
    pub fn new(api: Api<K>, desired: K, kind: impl Into<String>) -> Self {
        let name = desired.name_any();
        let namespace = desired.namespace();
        Self {
            api,
            desired,
            name,
            namespace,
            kind: kind.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override how often waits poll the API server
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The object this handle creates
    pub fn desired(&self) -> &K {
        &self.desired
    }

    /// Fetch the live object, `None` if it doesn't exist
    pub async fn get(&self) -> Result<Option<K>> {
        Ok(self.api.get_opt(&self.name).await?)
    }

    fn observed_status(&self, live: &K) -> Result<ResourceStatus> {
        if live.meta().deletion_timestamp.is_some() {
            return Ok(ResourceStatus::Deleting);
        }
        let value = serde_json::to_value(live)?;
        Ok(value
            .pointer("/status/phase")
            .and_then(|p| p.as_str())
            .map(ResourceStatus::from_phase)
            .unwrap_or(ResourceStatus::Unknown))
    }
}

impl<K> KubeResource<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Serialize
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    /// Handle for a namespaced typed object; the namespace comes from its metadata
    pub fn namespaced(client: Client, desired: K) -> Result<Self> {
        let namespace = desired.namespace().ok_or_else(|| {
            Error::validation(format!(
                "{} {} has no namespace",
                K::kind(&()),
                desired.name_any()
            ))
        })?;
        let api = Api::namespaced(client, &namespace);
        Ok(Self::new(api, desired, K::kind(&())))
    }
}

impl<K> KubeResource<K>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// Handle for a cluster-scoped typed object (e.g., Namespace)
    pub fn cluster(client: Client, desired: K) -> Self {
        Self::new(Api::all(client), desired, K::kind(&()))
    }
}

impl KubeResource<DynamicObject> {
    /// Handle for an untyped object described by `ar` (e.g., OpenShift Projects)
    pub fn dynamic(client: Client, ar: &ApiResource, desired: DynamicObject) -> Self {
        let api = match desired.namespace() {
            Some(ns) => Api::namespaced_with(client, &ns, ar),
            None => Api::all_with(client, ar),
        };
        Self::new(api, desired, ar.kind.clone())
    }
}

#[async_trait]
impl<K> ResourceHandle for KubeResource<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    async fn deploy(&self) -> Result<()> {
        debug!(resource = %self.display_name(), "creating resource");
        self.api
            .create(&PostParams::default(), &self.desired)
            .await
            .map_err(|e| Error::operation(self.display_name(), "deploy", e.to_string()))?;
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        debug!(resource = %self.display_name(), "deleting resource");
        match self.api.delete(&self.name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                trace!(resource = %self.display_name(), "already gone");
                Ok(())
            }
            Err(e) => Err(Error::operation(
                self.display_name(),
                "delete",
                e.to_string(),
            )),
        }
    }

    async fn wait_for_status(&self, status: ResourceStatus, timeout: Duration) -> Result<()> {
        let display = self.display_name();
        let display = display.as_str();
        poll_until(
            timeout,
            self.poll_interval,
            "wait_for_status",
            format!("{} did not reach status {}", display, status),
            || async move {
                let Some(live) = self.get().await? else {
                    return Ok(false);
                };
                let observed = self.observed_status(&live)?;
                if observed == ResourceStatus::Failed && status != ResourceStatus::Failed {
                    return Err(Error::operation(
                        display,
                        "wait_for_status",
                        format!("resource failed while waiting for {}", status),
                    ));
                }
                Ok(observed == status)
            },
        )
        .await
    }

    async fn wait_deleted(&self, timeout: Duration) -> Result<()> {
        poll_until(
            timeout,
            self.poll_interval,
            "wait_deleted",
            format!("{} still exists", self.display_name()),
            || async move { Ok(!self.exists().await?) },
        )
        .await
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.get().await?.is_some())
    }

    async fn status(&self) -> Result<ResourceStatus> {
        match self.get().await? {
            Some(live) => self.observed_status(&live),
            None => Ok(ResourceStatus::Deleted),
        }
    }
}

#[async_trait]
impl<K> RequestResource for KubeResource<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn deploy(&self) -> Result<()> {
        ResourceHandle::deploy(self).await
    }
}

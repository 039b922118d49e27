//! Builders for the objects scale runs create
//!
//! Pods use the pause image so the scheduler and kubelet do real work while
//! the node does almost none. Projects are OpenShift's namespace wrapper and
//! are only creatable through a `ProjectRequest`.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Container, Namespace, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use kube::Client;

use kscale_common::Result;

use crate::kube_resource::KubeResource;
use crate::resource::{SharedRequest, SharedResource};

/// Image used for scale-test pods
pub const PAUSE_IMAGE: &str = "registry.k8s.io/pause:3.9";

/// API group of OpenShift projects
pub const PROJECT_API_GROUP: &str = "project.openshift.io";

/// Label marking objects created by kscale
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(
            [(LABEL_MANAGED_BY.to_string(), kscale_common::FIELD_MANAGER.to_string())]
                .into_iter()
                .collect(),
        ),
        ..Default::default()
    }
}

fn project_api_resource(kind: &str, plural: &str) -> ApiResource {
    ApiResource {
        group: PROJECT_API_GROUP.to_string(),
        version: "v1".to_string(),
        api_version: format!("{}/v1", PROJECT_API_GROUP),
        kind: kind.to_string(),
        plural: plural.to_string(),
    }
}

/// A single-container pause pod
pub fn pause_pod(client: Client, namespace: &str, name: &str) -> Result<KubeResource<Pod>> {
    let pod = Pod {
        metadata: meta(name, Some(namespace)),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "pause".to_string(),
                image: Some(PAUSE_IMAGE.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    };
    KubeResource::namespaced(client, pod)
}

/// A namespace
pub fn namespace(client: Client, name: &str) -> KubeResource<Namespace> {
    let ns = Namespace {
        metadata: meta(name, None),
        ..Default::default()
    };
    KubeResource::cluster(client, ns)
}

/// An OpenShift `Project` (read/delete only; create it with [`project_request`])
pub fn project(client: Client, name: &str) -> KubeResource<DynamicObject> {
    let ar = project_api_resource("Project", "projects");
    let mut obj = DynamicObject::new(name, &ar);
    obj.metadata = meta(name, None);
    KubeResource::dynamic(client, &ar, obj)
}

/// An OpenShift `ProjectRequest` producing the [`project`] of the same name
pub fn project_request(client: Client, name: &str) -> KubeResource<DynamicObject> {
    let ar = project_api_resource("ProjectRequest", "projectrequests");
    let mut obj = DynamicObject::new(name, &ar);
    obj.metadata = ObjectMeta {
        name: Some(name.to_string()),
        ..Default::default()
    };
    KubeResource::dynamic(client, &ar, obj)
}

/// `count` pause pods named `{prefix}-{index}`
pub fn pause_pods(
    client: &Client,
    namespace: &str,
    prefix: &str,
    count: usize,
) -> Result<Vec<SharedResource>> {
    (0..count)
        .map(|i| {
            pause_pod(client.clone(), namespace, &format!("{}-{}", prefix, i))
                .map(|p| Arc::new(p) as SharedResource)
        })
        .collect()
}

/// `count` paired (project, project request) handles named `{prefix}-{index}`
pub fn project_pairs(
    client: &Client,
    prefix: &str,
    count: usize,
) -> (Vec<SharedResource>, Vec<SharedRequest>) {
    (0..count)
        .map(|i| {
            let name = format!("{}-{}", prefix, i);
            (
                Arc::new(project(client.clone(), &name)) as SharedResource,
                Arc::new(project_request(client.clone(), &name)) as SharedRequest,
            )
        })
        .unzip()
}

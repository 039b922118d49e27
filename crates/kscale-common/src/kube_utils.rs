//! Shared Kubernetes utilities using kube-rs
//!
//! Client construction, polling and small naming helpers used by the
//! resource handles and the API server monitor.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::trace;

use crate::Error;

/// Default interval between polls while waiting on a resource
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll until a condition is met or timeout is reached
///
/// Repeatedly calls `check_fn` until it returns `Ok(true)`. `Ok(false)` keeps
/// polling. Errors are returned immediately; callers that want to ride out
/// transient failures map them to `Ok(false)` themselves.
///
/// # Arguments
/// * `timeout` - Maximum time to wait for the condition
/// * `poll_interval` - Time between polling attempts
/// * `operation` - Operation name reported in the timeout error
/// * `timeout_msg` - Error message to use on timeout
/// * `check_fn` - Async check returning whether the condition holds
pub async fn poll_until<F, Fut>(
    timeout: Duration,
    poll_interval: Duration,
    operation: &str,
    timeout_msg: impl Into<String>,
    mut check_fn: F,
) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    let start = tokio::time::Instant::now();
    let timeout_msg = timeout_msg.into();

    loop {
        if check_fn().await? {
            return Ok(());
        }
        trace!(operation, "Polling condition not yet met, retrying...");

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(Error::timeout(operation, timeout_msg));
        }
        tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
    }
}

/// Whether a kube error is an API 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Ensure a namespace exists (idempotent).
///
/// Uses server-side apply so it never fails on "already exists" and doesn't
/// race with concurrent creators.
pub async fn ensure_namespace(client: &Client, name: &str) -> Result<(), Error> {
    let api: Api<Namespace> = Api::all(client.clone());
    let ns = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": name }
    });
    api.patch(
        name,
        &PatchParams::apply(crate::FIELD_MANAGER),
        &Patch::Apply(&ns),
    )
    .await?;
    Ok(())
}

/// Irregular plurals of kinds commonly scale tested
const KIND_PLURALS: &[(&str, &str)] = &[
    ("endpoints", "endpoints"),
    ("ingress", "ingresses"),
    ("networkpolicy", "networkpolicies"),
    ("podsecuritypolicy", "podsecuritypolicies"),
    ("storageclass", "storageclasses"),
];

/// Pluralize a Kubernetes resource kind into its API resource name
///
/// Uses a lookup table for known irregular kinds, falling back to simple
/// pluralization rules. This is the `resource` label the API server reports
/// in `apiserver_request_total`.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    for (singular, plural) in KIND_PLURALS {
        if *singular == lower {
            return (*plural).to_string();
        }
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

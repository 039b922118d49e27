//! Test helpers for cluster-backed tests

use kube::Client;
use tokio::sync::OnceCell;

use kscale_common::kube_utils::{create_client, ensure_namespace};

/// Namespace scale pods are created in
pub const TEST_NAMESPACE: &str = "kscale-test";

static NAMESPACE_READY: OnceCell<Result<(), String>> = OnceCell::const_new();

/// Client for the current kubeconfig context
pub async fn client() -> Client {
    create_client(None)
        .await
        .expect("failed to create client, is a cluster reachable?")
}

/// Client with the test namespace created once per run
pub async fn client_with_namespace() -> Client {
    let client = client().await;
    NAMESPACE_READY
        .get_or_init(|| async {
            ensure_namespace(&client, TEST_NAMESPACE)
                .await
                .map_err(|e| e.to_string())
        })
        .await
        .as_ref()
        .expect("failed to create test namespace");
    client
}

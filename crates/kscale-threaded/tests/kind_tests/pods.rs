//! Pause pod scale stories

use std::sync::Arc;

use kscale_common::cache::{MemoryCache, ResultCache};
use kscale_threaded::objects::pause_pods;
use kscale_threaded::{ResourceHandle, ResourceStatus, ScaleFlags, ScaleResources};

use super::helpers::{client_with_namespace, TEST_NAMESPACE};

#[tokio::test]
#[ignore]
async fn test_scaled_pods_run_then_disappear() {
    let client = client_with_namespace().await;
    let pods = pause_pods(&client, TEST_NAMESPACE, "test-pod", 10).unwrap();
    let cache = Arc::new(MemoryCache::new());

    let mut scale = ScaleResources::new(pods.clone())
        .with_wait_for_status(ResourceStatus::Running)
        .with_cache(cache.clone(), "kind-pods");

    scale.enter().await.unwrap();
    for pod in &pods {
        assert!(pod.exists().await.unwrap());
        assert_eq!(pod.status().await.unwrap(), ResourceStatus::Running);
    }

    scale.exit().await.unwrap();
    for pod in &pods {
        assert!(!pod.exists().await.unwrap());
    }
    assert!(cache.get("kind-pods-deploy-elapsed").unwrap().is_some());
    assert!(cache.get("kind-pods-delete-elapsed").unwrap().is_some());
}

#[tokio::test]
#[ignore]
async fn test_pods_created_in_one_scope_deleted_in_another() {
    let client = client_with_namespace().await;
    let pods = pause_pods(&client, TEST_NAMESPACE, "test-split-pod", 5).unwrap();

    let mut create = ScaleResources::new(pods.clone())
        .with_flags(ScaleFlags::create_only())
        .with_wait_for_status(ResourceStatus::Running);
    create.enter().await.unwrap();
    create.exit().await.unwrap();
    create.take_unwind_stack().clear();

    for pod in &pods {
        assert!(pod.exists().await.unwrap());
    }

    let mut delete = ScaleResources::new(pods.clone()).with_flags(ScaleFlags::delete_only());
    delete.enter().await.unwrap();
    delete.exit().await.unwrap();

    for pod in &pods {
        assert!(!pod.exists().await.unwrap());
    }
}

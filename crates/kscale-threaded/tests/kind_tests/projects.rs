//! OpenShift project scale stories

use kscale_threaded::objects::project_pairs;
use kscale_threaded::{ResourceHandle, ResourceStatus, ScaleResources};

use super::helpers::client;

#[tokio::test]
#[ignore]
async fn test_project_requests_produce_active_projects() {
    let client = client().await;
    let (projects, requests) = project_pairs(&client, "test-scale-projects", 3);

    let mut scale = ScaleResources::new(projects.clone())
        .with_request_resources(requests)
        .with_wait_for_status(ResourceStatus::Active);

    scale.enter().await.unwrap();
    for project in &projects {
        assert_eq!(project.status().await.unwrap(), ResourceStatus::Active);
    }

    scale.exit().await.unwrap();
    for project in &projects {
        assert!(!project.exists().await.unwrap());
    }
}

//! Lifecycle stories for ScaleResources over in-memory resources
//!
//! Each fake records what happened to it in a shared event log so the tests
//! can assert on creation and teardown order without a cluster.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use kscale_common::cache::{MemoryCache, ResultCache};
use kscale_common::{Error, Result};
use kscale_threaded::{
    RequestResource, ResourceHandle, ResourceStatus, ScaleFlags, ScalePhase, ScaleResources,
    SharedRequest, SharedResource,
};

// =============================================================================
// Fakes
// =============================================================================

type EventLog = Arc<Mutex<Vec<String>>>;

struct FakeResource {
    name: String,
    log: EventLog,
    exists: AtomicBool,
    deploy_delay: Duration,
    fail_deploy: bool,
    fail_delete: bool,
    never_ready: bool,
}

impl FakeResource {
    fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            exists: AtomicBool::new(false),
            deploy_delay: Duration::ZERO,
            fail_deploy: false,
            fail_delete: false,
            never_ready: false,
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.deploy_delay = delay;
        self
    }

    fn failing_deploy(mut self) -> Self {
        self.fail_deploy = true;
        self
    }

    fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    fn existing(self) -> Self {
        self.exists.store(true, Ordering::SeqCst);
        self
    }

    fn mark_created(&self) {
        self.exists.store(true, Ordering::SeqCst);
        self.log.lock().push(format!("create {}", self.name));
    }
}

#[async_trait]
impl ResourceHandle for FakeResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        Some("scale")
    }

    fn kind(&self) -> &str {
        "Pod"
    }

    async fn deploy(&self) -> Result<()> {
        tokio::time::sleep(self.deploy_delay).await;
        if self.fail_deploy {
            return Err(Error::operation(self.display_name(), "deploy", "quota exceeded"));
        }
        self.mark_created();
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        if self.fail_delete {
            return Err(Error::operation(self.display_name(), "delete", "forbidden"));
        }
        if self.exists.swap(false, Ordering::SeqCst) {
            self.log.lock().push(format!("delete {}", self.name));
        }
        Ok(())
    }

    async fn wait_for_status(&self, status: ResourceStatus, _timeout: Duration) -> Result<()> {
        if self.never_ready || !self.exists.load(Ordering::SeqCst) {
            return Err(Error::timeout(
                "wait_for_status",
                format!("{} did not reach status {}", self.display_name(), status),
            ));
        }
        Ok(())
    }

    async fn wait_deleted(&self, _timeout: Duration) -> Result<()> {
        if self.exists.load(Ordering::SeqCst) {
            return Err(Error::timeout(
                "wait_deleted",
                format!("{} still exists", self.display_name()),
            ));
        }
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.exists.load(Ordering::SeqCst))
    }

    async fn status(&self) -> Result<ResourceStatus> {
        Ok(if self.exists.load(Ordering::SeqCst) {
            ResourceStatus::Running
        } else {
            ResourceStatus::Deleted
        })
    }
}

/// Request whose deployment makes its paired resource exist
struct FakeRequest {
    target: Arc<FakeResource>,
}

#[async_trait]
impl RequestResource for FakeRequest {
    fn name(&self) -> &str {
        &self.target.name
    }

    async fn deploy(&self) -> Result<()> {
        self.target.deploy().await
    }
}

fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn shared(fakes: &[Arc<FakeResource>]) -> Vec<SharedResource> {
    fakes.iter().map(|f| f.clone() as SharedResource).collect()
}

fn batch(log: &EventLog, count: usize) -> Vec<Arc<FakeResource>> {
    (0..count)
        .map(|i| Arc::new(FakeResource::new(&format!("test-pod-{}", i), log)))
        .collect()
}

fn events_with(log: &EventLog, prefix: &str) -> Vec<String> {
    log.lock()
        .iter()
        .filter(|e| e.starts_with(prefix))
        .map(|e| e[prefix.len()..].to_string())
        .collect()
}

fn all_exist(fakes: &[Arc<FakeResource>]) -> bool {
    fakes.iter().all(|f| f.exists.load(Ordering::SeqCst))
}

fn none_exist(fakes: &[Arc<FakeResource>]) -> bool {
    fakes.iter().all(|f| !f.exists.load(Ordering::SeqCst))
}

// =============================================================================
// Create / delete stories
// =============================================================================

#[tokio::test]
async fn test_full_cycle_creates_and_deletes_everything() {
    let log = event_log();
    let fakes = batch(&log, 10);
    let mut scale = ScaleResources::new(shared(&fakes)).with_wait_for_status(ResourceStatus::Running);

    scale.enter().await.unwrap();
    assert!(all_exist(&fakes));
    assert_eq!(scale.phase(), ScalePhase::Ready);

    scale.exit().await.unwrap();
    assert!(none_exist(&fakes));
    assert_eq!(scale.phase(), ScalePhase::Closed);
    assert_eq!(events_with(&log, "create ").len(), 10);
    assert_eq!(events_with(&log, "delete ").len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_failed_deploy_unwinds_in_reverse_creation_order() {
    let log = event_log();
    // Higher indices finish first; index 2 fails
    let fakes: Vec<Arc<FakeResource>> = (0..5)
        .map(|i| {
            let fake = FakeResource::new(&format!("test-pod-{}", i), &log)
                .delayed(Duration::from_millis(100 * (5 - i as u64)));
            Arc::new(if i == 2 { fake.failing_deploy() } else { fake })
        })
        .collect();
    let mut scale = ScaleResources::new(shared(&fakes));

    let err = scale.enter().await.unwrap_err();

    assert!(err.to_string().contains("quota exceeded"));
    assert_eq!(scale.phase(), ScalePhase::Failed);

    let created = events_with(&log, "create ");
    assert_eq!(created, vec!["test-pod-4", "test-pod-3", "test-pod-1", "test-pod-0"]);

    let mut expected_teardown = created.clone();
    expected_teardown.reverse();
    assert_eq!(events_with(&log, "delete "), expected_teardown);
    assert!(none_exist(&fakes));
}

#[tokio::test]
async fn test_failed_deploy_without_cleanup_leaves_resources() {
    let log = event_log();
    let fakes: Vec<Arc<FakeResource>> = vec![
        Arc::new(FakeResource::new("test-pod-0", &log)),
        Arc::new(FakeResource::new("test-pod-1", &log).failing_deploy()),
        Arc::new(FakeResource::new("test-pod-2", &log)),
    ];
    let mut scale = ScaleResources::new(shared(&fakes))
        .with_flags(ScaleFlags::default().without_cleanup_on_error());

    assert!(scale.enter().await.is_err());

    assert!(events_with(&log, "delete ").is_empty());
    assert!(fakes[0].exists.load(Ordering::SeqCst));
    assert!(fakes[2].exists.load(Ordering::SeqCst));

    // The caller can still release what was created
    scale.take_unwind_stack().unwind().await.unwrap();
    assert!(none_exist(&fakes));
}

#[tokio::test]
async fn test_status_wait_failure_unwinds_everything() {
    let log = event_log();
    let fakes: Vec<Arc<FakeResource>> = vec![
        Arc::new(FakeResource::new("test-pod-0", &log)),
        Arc::new(FakeResource::new("test-pod-1", &log).never_ready()),
    ];
    let mut scale = ScaleResources::new(shared(&fakes)).with_wait_for_status(ResourceStatus::Running);

    let err = scale.enter().await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(events_with(&log, "delete ").len(), 2);
    assert!(none_exist(&fakes));
    assert!(scale.timing().deploy.is_none());
}

#[tokio::test]
async fn test_delete_only_deletes_without_creating() {
    let log = event_log();
    let fakes: Vec<Arc<FakeResource>> = (0..4)
        .map(|i| Arc::new(FakeResource::new(&format!("test-pod-{}", i), &log).existing()))
        .collect();
    let mut scale = ScaleResources::new(shared(&fakes)).with_flags(ScaleFlags::delete_only());

    scale.enter().await.unwrap();
    scale.exit().await.unwrap();

    assert!(events_with(&log, "create ").is_empty());
    assert_eq!(events_with(&log, "delete ").len(), 4);
    for fake in &fakes {
        assert!(!fake.exists().await.unwrap());
    }
}

#[tokio::test]
async fn test_create_only_then_delete_only_matches_combined_scope() {
    let split_log = event_log();
    let split = batch(&split_log, 6);

    let mut create = ScaleResources::new(shared(&split)).with_flags(ScaleFlags::create_only());
    create.enter().await.unwrap();
    create.exit().await.unwrap();
    assert!(all_exist(&split));
    // Resources are handed to the delete scope; drop the stale teardowns
    create.take_unwind_stack().clear();

    let mut delete = ScaleResources::new(shared(&split)).with_flags(ScaleFlags::delete_only());
    delete.enter().await.unwrap();
    delete.exit().await.unwrap();

    let combined_log = event_log();
    let combined = batch(&combined_log, 6);
    let mut scale = ScaleResources::new(shared(&combined));
    scale.enter().await.unwrap();
    scale.exit().await.unwrap();

    let sorted = |log: &EventLog, prefix: &str| {
        let mut v = events_with(log, prefix);
        v.sort();
        v
    };
    assert_eq!(sorted(&split_log, "create "), sorted(&combined_log, "create "));
    assert_eq!(sorted(&split_log, "delete "), sorted(&combined_log, "delete "));
    assert!(none_exist(&split));
    assert!(none_exist(&combined));
}

#[tokio::test]
async fn test_create_only_keeps_teardowns_for_caller() {
    let log = event_log();
    let fakes = batch(&log, 3);
    let mut scale = ScaleResources::new(shared(&fakes)).with_flags(ScaleFlags::create_only());

    scale.enter().await.unwrap();
    scale.exit().await.unwrap();

    let mut stack = scale.take_unwind_stack();
    assert_eq!(stack.len(), 3);
    stack.unwind().await.unwrap();
    assert!(none_exist(&fakes));
}

#[tokio::test]
async fn test_failed_delete_unwinds_remaining() {
    let log = event_log();
    let fakes: Vec<Arc<FakeResource>> = vec![
        Arc::new(FakeResource::new("test-pod-0", &log)),
        Arc::new(FakeResource::new("test-pod-1", &log).failing_delete()),
    ];
    let mut scale = ScaleResources::new(shared(&fakes));
    scale.enter().await.unwrap();

    let err = scale.exit().await.unwrap_err();

    assert!(err.to_string().contains("forbidden"));
    assert_eq!(scale.phase(), ScalePhase::Failed);
    assert!(!fakes[0].exists.load(Ordering::SeqCst));
    assert!(scale.timing().delete.is_none());
}

// =============================================================================
// Request resources
// =============================================================================

#[tokio::test]
async fn test_request_resources_create_paired_batch() {
    let log = event_log();
    let fakes = batch(&log, 3);
    let requests: Vec<SharedRequest> = fakes
        .iter()
        .map(|f| Arc::new(FakeRequest { target: f.clone() }) as SharedRequest)
        .collect();
    let mut scale = ScaleResources::new(shared(&fakes))
        .with_request_resources(requests)
        .with_wait_for_status(ResourceStatus::Active);

    scale.enter().await.unwrap();
    assert!(all_exist(&fakes));

    scale.exit().await.unwrap();
    assert!(none_exist(&fakes));
}

#[tokio::test]
async fn test_mismatched_request_resources_rejected() {
    let log = event_log();
    let fakes = batch(&log, 3);
    let requests: Vec<SharedRequest> = vec![Arc::new(FakeRequest {
        target: fakes[0].clone(),
    })];
    let mut scale = ScaleResources::new(shared(&fakes)).with_request_resources(requests);

    let err = scale.enter().await.unwrap_err();

    assert!(matches!(err, Error::Validation { .. }));
    assert!(log.lock().is_empty());
}

// =============================================================================
// Timing records
// =============================================================================

const PHASE_KEYS: [&str; 4] = ["count", "start", "stop", "elapsed"];

fn phase_keys_present(cache: &MemoryCache, prefix: &str, phase: &str) -> Vec<bool> {
    PHASE_KEYS
        .iter()
        .map(|suffix| {
            cache
                .get(&format!("{}-{}-{}", prefix, phase, suffix))
                .unwrap()
                .is_some()
        })
        .collect()
}

#[tokio::test]
async fn test_timing_keys_follow_executed_phases() {
    let log = event_log();
    let fakes = batch(&log, 2);

    let create_cache = Arc::new(MemoryCache::new());
    let mut create = ScaleResources::new(shared(&fakes))
        .with_flags(ScaleFlags::create_only())
        .with_cache(create_cache.clone(), "pods");
    create.enter().await.unwrap();
    create.exit().await.unwrap();
    create.take_unwind_stack().clear();

    assert_eq!(phase_keys_present(&create_cache, "pods", "deploy"), vec![true; 4]);
    assert_eq!(phase_keys_present(&create_cache, "pods", "delete"), vec![false; 4]);
    assert_eq!(
        create_cache.get("pods-deploy-count").unwrap(),
        Some(serde_json::json!(2))
    );

    let delete_cache = Arc::new(MemoryCache::new());
    let mut delete = ScaleResources::new(shared(&fakes))
        .with_flags(ScaleFlags::delete_only())
        .with_cache(delete_cache.clone(), "pods");
    delete.enter().await.unwrap();
    delete.exit().await.unwrap();

    assert_eq!(phase_keys_present(&delete_cache, "pods", "deploy"), vec![false; 4]);
    assert_eq!(phase_keys_present(&delete_cache, "pods", "delete"), vec![true; 4]);

    let timing = delete.timing();
    assert!(timing.deploy.is_none());
    let deleted = timing.delete.unwrap();
    assert!(deleted.stop >= deleted.start);
}

#[tokio::test]
async fn test_failed_phase_writes_no_timing() {
    let log = event_log();
    let fakes = vec![Arc::new(FakeResource::new("test-pod-0", &log).failing_deploy())];
    let cache = Arc::new(MemoryCache::new());
    let mut scale = ScaleResources::new(shared(&fakes)).with_cache(cache.clone(), "pods");

    assert!(scale.enter().await.is_err());
    assert!(cache.is_empty());
}

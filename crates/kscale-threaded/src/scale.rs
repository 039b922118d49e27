//! Scoped create/wait/delete orchestration of a resource batch
//!
//! [`ScaleResources`] drives a batch through one scale cycle. Entering the
//! scope deploys every resource in parallel (optionally waiting for a target
//! status); exiting deletes them in parallel and waits until they are gone.
//! Each successful deploy registers its teardown on an [`UnwindStack`], so a
//! failure part way through a phase can release exactly what was created, in
//! reverse order of creation.
//!
//! ```text
//! Idle -> Deploying -> [AwaitingStatus] -> Ready -> Deleting -> AwaitingDeletion -> Closed
//!            \______________\___________________________\_______________\__> Failed
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use kscale_common::cache::ResultCache;
use kscale_common::{Result, TIMEOUT_2MIN, TIMEOUT_4MIN};

use crate::resource::{ResourceStatus, SharedRequest, SharedResource};
use crate::runner::{
    delete_resources, deploy_requested_resources_onto, deploy_resources_onto,
    wait_deleted_resources, wait_for_resources_status,
};
use crate::unwind::UnwindStack;

/// Which parts of the scale cycle a [`ScaleResources`] performs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScaleFlags {
    /// Deploy (and optionally wait) on entry
    pub create: bool,
    /// Delete and wait for deletion on exit
    pub delete: bool,
    /// Unwind everything created so far when a phase fails
    pub cleanup_on_error: bool,
}

impl Default for ScaleFlags {
    fn default() -> Self {
        Self {
            create: true,
            delete: true,
            cleanup_on_error: true,
        }
    }
}

impl ScaleFlags {
    /// Create on entry, leave resources in place on exit
    pub fn create_only() -> Self {
        Self {
            delete: false,
            ..Self::default()
        }
    }

    /// Adopt an existing batch on entry, delete it on exit
    pub fn delete_only() -> Self {
        Self {
            create: false,
            ..Self::default()
        }
    }

    /// Leave partially created resources in place when a phase fails
    pub fn without_cleanup_on_error(mut self) -> Self {
        self.cleanup_on_error = false;
        self
    }
}

/// Where a scale scope currently is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalePhase {
    /// Not entered yet
    Idle,
    /// Deploy fan-out in flight
    Deploying,
    /// Waiting for the target status
    AwaitingStatus,
    /// Entered; resources exist
    Ready,
    /// Delete fan-out in flight
    Deleting,
    /// Waiting for every resource to be gone
    AwaitingDeletion,
    /// Exited after deleting everything
    Closed,
    /// A phase failed
    Failed,
}

/// Wall-clock boundaries of one phase, in Unix seconds
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PhaseTiming {
    /// Phase start
    pub start: f64,
    /// Phase end
    pub stop: f64,
    /// `stop - start`
    pub elapsed: f64,
}

impl PhaseTiming {
    fn new(start: f64, stop: f64) -> Self {
        Self {
            start,
            stop,
            elapsed: stop - start,
        }
    }
}

/// Timing of every phase a scope actually executed
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TimingRecord {
    /// Number of resources in the batch
    pub count: usize,
    /// Deploy phase, `None` if it never completed
    pub deploy: Option<PhaseTiming>,
    /// Delete phase, `None` if it never completed
    pub delete: Option<PhaseTiming>,
}

/// Point in the scale cycle where data collection runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectPoint {
    /// Right after a successful deploy phase
    PostEnter,
    /// Right before the delete phase
    PreExit,
    /// A phase failed and the unwind stack is about to run
    CleanupOnError,
}

impl CollectPoint {
    /// Identifier passed to collectors and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostEnter => "post-enter",
            Self::PreExit => "pre-exit",
            Self::CleanupOnError => "cleanup-on-error",
        }
    }
}

/// Hook for gathering measurements (metrics, events, logs) around a scale cycle
#[async_trait]
pub trait DataCollector: Send + Sync {
    /// Collect data covering `start` (Unix seconds) up to now
    async fn collect(&self, point: CollectPoint, start: f64) -> Result<()>;
}

/// Collector that gathers nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCollector;

#[async_trait]
impl DataCollector for NoopCollector {
    async fn collect(&self, point: CollectPoint, _start: f64) -> Result<()> {
        warn!(point = point.as_str(), "no data collected, no collector configured");
        Ok(())
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

/// One scale cycle over a batch of resources
///
/// The batch is owned by the caller; the scope only invokes lifecycle
/// operations on it. Several scopes may share one batch, e.g. a
/// [`ScaleFlags::create_only`] scope followed later by a
/// [`ScaleFlags::delete_only`] one.
pub struct ScaleResources {
    resources: Vec<SharedResource>,
    request_resources: Option<Vec<SharedRequest>>,
    cache: Option<(Arc<dyn ResultCache>, String)>,
    wait_for_status: Option<ResourceStatus>,
    status_timeout: Duration,
    delete_timeout: Duration,
    flags: ScaleFlags,
    collector: Arc<dyn DataCollector>,
    stack: UnwindStack,
    phase: ScalePhase,
    timing: TimingRecord,
    collect_start: f64,
}

impl ScaleResources {
    /// Scope over `resources` with every flag enabled
    pub fn new(resources: Vec<SharedResource>) -> Self {
        let count = resources.len();
        Self {
            resources,
            request_resources: None,
            cache: None,
            wait_for_status: None,
            status_timeout: TIMEOUT_2MIN,
            delete_timeout: TIMEOUT_4MIN,
            flags: ScaleFlags::default(),
            collector: Arc::new(NoopCollector),
            stack: UnwindStack::new(),
            phase: ScalePhase::Idle,
            timing: TimingRecord {
                count,
                ..Default::default()
            },
            collect_start: unix_now(),
        }
    }

    /// Create the batch through paired request resources (same order as the batch)
    pub fn with_request_resources(mut self, request_resources: Vec<SharedRequest>) -> Self {
        self.request_resources = Some(request_resources);
        self
    }

    /// Write phase timings to `cache` under keys starting with `prefix`
    ///
    /// An empty prefix disables cache writes.
    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>, prefix: impl Into<String>) -> Self {
        self.cache = Some((cache, prefix.into()));
        self
    }

    /// Wait for every resource to reach `status` after deploying
    pub fn with_wait_for_status(mut self, status: ResourceStatus) -> Self {
        self.wait_for_status = Some(status);
        self
    }

    /// Per-resource timeout for the status wait
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Per-resource timeout for the deletion wait
    pub fn with_delete_timeout(mut self, timeout: Duration) -> Self {
        self.delete_timeout = timeout;
        self
    }

    /// Select which parts of the cycle run
    pub fn with_flags(mut self, flags: ScaleFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Gather data at the collection points of the cycle
    pub fn with_collector(mut self, collector: Arc<dyn DataCollector>) -> Self {
        self.collector = collector;
        self
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> ScalePhase {
        self.phase
    }

    /// Timings recorded so far
    pub fn timing(&self) -> &TimingRecord {
        &self.timing
    }

    /// The managed batch
    pub fn resources(&self) -> &[SharedResource] {
        &self.resources
    }

    /// Take over the pending teardowns, leaving this scope with none
    pub fn take_unwind_stack(&mut self) -> UnwindStack {
        self.stack.pop_all()
    }

    /// Enter the scope
    ///
    /// With `create` set, deploys the batch and waits for the target status.
    /// Otherwise adopts the batch as already existing and registers each
    /// resource's teardown.
    pub async fn enter(&mut self) -> Result<()> {
        if !self.flags.create {
            debug!(count = self.resources.len(), "create disabled, adopting resources");
            for resource in &self.resources {
                self.stack.push_resource(resource.clone());
            }
            self.phase = ScalePhase::Ready;
            return Ok(());
        }

        match self.create().await {
            Ok(()) => {
                self.phase = ScalePhase::Ready;
                Ok(())
            }
            Err(e) => self.fail(e).await,
        }
    }

    /// Exit the scope
    ///
    /// With `delete` set, deletes the batch and waits until every resource is
    /// gone. Otherwise leaves the batch and its pending teardowns in place for
    /// [`take_unwind_stack`](Self::take_unwind_stack).
    pub async fn exit(&mut self) -> Result<()> {
        if !self.flags.delete {
            debug!(
                pending = self.stack.len(),
                "delete disabled, leaving resources in place"
            );
            return Ok(());
        }

        match self.destroy().await {
            Ok(()) => {
                // Deleted directly, the registered teardowns are moot
                self.stack.clear();
                self.phase = ScalePhase::Closed;
                Ok(())
            }
            Err(e) => self.fail(e).await,
        }
    }

    /// Enter, run `body` over the batch, then always exit
    ///
    /// A failing body's error is returned even if exit also fails.
    pub async fn scoped<F, Fut, T>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(Vec<SharedResource>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.enter().await?;
        let outcome = body(self.resources.clone()).await;
        let exited = self.exit().await;

        match outcome {
            Ok(value) => exited.map(|_| value),
            Err(e) => {
                if let Err(exit_err) = exited {
                    warn!(error = %exit_err, "scope exit failed after body failure");
                }
                Err(e)
            }
        }
    }

    async fn create(&mut self) -> Result<()> {
        let start = unix_now();
        self.phase = ScalePhase::Deploying;
        info!(count = self.resources.len(), "deploying resources");

        match &self.request_resources {
            Some(requests) if !requests.is_empty() => {
                deploy_requested_resources_onto(&self.resources, requests, &mut self.stack)
                    .await?
            }
            _ => deploy_resources_onto(&self.resources, &mut self.stack).await?,
        }

        if let Some(status) = self.wait_for_status {
            self.phase = ScalePhase::AwaitingStatus;
            wait_for_resources_status(&self.resources, status, self.status_timeout).await?;
        }

        let stop = unix_now();
        self.collect_start = stop;
        let timing = PhaseTiming::new(start, stop);
        self.timing.deploy = Some(timing);
        self.record("deploy", timing);
        info!(
            count = self.resources.len(),
            elapsed_secs = timing.elapsed,
            "resources deployed"
        );

        self.collector.collect(CollectPoint::PostEnter, start).await
    }

    async fn destroy(&mut self) -> Result<()> {
        self.collector
            .collect(CollectPoint::PreExit, self.collect_start)
            .await?;

        let start = unix_now();
        self.phase = ScalePhase::Deleting;
        info!(count = self.resources.len(), "deleting resources");
        delete_resources(&self.resources).await?;

        self.phase = ScalePhase::AwaitingDeletion;
        wait_deleted_resources(&self.resources, self.delete_timeout).await?;

        let stop = unix_now();
        let timing = PhaseTiming::new(start, stop);
        self.timing.delete = Some(timing);
        self.record("delete", timing);
        info!(
            count = self.resources.len(),
            elapsed_secs = timing.elapsed,
            "resources deleted"
        );
        Ok(())
    }

    async fn fail<T>(&mut self, err: kscale_common::Error) -> Result<T> {
        self.phase = ScalePhase::Failed;
        if !self.flags.cleanup_on_error {
            warn!(
                error = %err,
                pending = self.stack.len(),
                "scale phase failed, cleanup on error disabled, leaving resources in place"
            );
            return Err(err);
        }

        warn!(error = %err, pending = self.stack.len(), "scale phase failed, unwinding");
        if let Err(e) = self
            .collector
            .collect(CollectPoint::CleanupOnError, self.collect_start)
            .await
        {
            warn!(error = %e, "data collection failed during cleanup");
        }
        if let Err(e) = self.stack.unwind().await {
            error!(error = %e, "cleanup after failure incomplete");
        }
        Err(err)
    }

    fn record(&self, phase: &str, timing: PhaseTiming) {
        let Some((cache, prefix)) = &self.cache else {
            return;
        };
        if prefix.is_empty() {
            return;
        }

        let entries: [(&str, Value); 4] = [
            ("count", json!(self.resources.len())),
            ("start", json!(timing.start)),
            ("stop", json!(timing.stop)),
            ("elapsed", json!(timing.elapsed)),
        ];
        for (suffix, value) in entries {
            let key = format!("{}-{}-{}", prefix, phase, suffix);
            if let Err(e) = cache.set(&key, value) {
                warn!(key = %key, error = %e, "failed to write result cache");
            }
        }
    }
}

impl std::fmt::Debug for ScaleResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScaleResources")
            .field("count", &self.resources.len())
            .field("flags", &self.flags)
            .field("phase", &self.phase)
            .field("pending", &self.stack.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kscale_common::cache::MemoryCache;
    use kscale_common::Error;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingCollector {
        points: Mutex<Vec<CollectPoint>>,
        fail_on: Option<CollectPoint>,
    }

    #[async_trait]
    impl DataCollector for RecordingCollector {
        async fn collect(&self, point: CollectPoint, _start: f64) -> Result<()> {
            self.points.lock().push(point);
            if self.fail_on == Some(point) {
                return Err(Error::internal("collector failed"));
            }
            Ok(())
        }
    }

    struct FailingCache;

    impl ResultCache for FailingCache {
        fn set(&self, key: &str, _value: Value) -> Result<()> {
            Err(Error::cache(key, "read-only"))
        }

        fn get(&self, _key: &str) -> Result<Option<Value>> {
            Ok(None)
        }
    }

    #[test]
    fn test_default_flags_enable_everything() {
        let flags = ScaleFlags::default();
        assert!(flags.create && flags.delete && flags.cleanup_on_error);

        let create_only = ScaleFlags::create_only();
        assert!(create_only.create && !create_only.delete);

        let delete_only = ScaleFlags::delete_only().without_cleanup_on_error();
        assert!(!delete_only.create && delete_only.delete && !delete_only.cleanup_on_error);
    }

    #[test]
    fn test_phase_timing_elapsed() {
        let t = PhaseTiming::new(100.0, 112.5);
        assert_eq!(t.elapsed, 12.5);
    }

    #[tokio::test]
    async fn test_empty_batch_full_cycle() {
        let cache = Arc::new(MemoryCache::new());
        let collector = Arc::new(RecordingCollector::default());
        let mut scale = ScaleResources::new(Vec::new())
            .with_cache(cache.clone(), "empty")
            .with_collector(collector.clone());

        assert_eq!(scale.phase(), ScalePhase::Idle);
        scale.enter().await.unwrap();
        assert_eq!(scale.phase(), ScalePhase::Ready);
        scale.exit().await.unwrap();
        assert_eq!(scale.phase(), ScalePhase::Closed);

        assert_eq!(cache.len(), 8);
        assert_eq!(cache.get("empty-deploy-count").unwrap(), Some(json!(0)));
        assert!(scale.timing().deploy.is_some());
        assert!(scale.timing().delete.is_some());
        assert_eq!(
            *collector.points.lock(),
            vec![CollectPoint::PostEnter, CollectPoint::PreExit]
        );
    }

    #[tokio::test]
    async fn test_empty_prefix_skips_cache() {
        let cache = Arc::new(MemoryCache::new());
        let mut scale = ScaleResources::new(Vec::new()).with_cache(cache.clone(), "");
        scale.enter().await.unwrap();
        scale.exit().await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_failures_are_not_fatal() {
        let mut scale = ScaleResources::new(Vec::new()).with_cache(Arc::new(FailingCache), "ro");
        scale.enter().await.unwrap();
        scale.exit().await.unwrap();
        assert_eq!(scale.phase(), ScalePhase::Closed);
    }

    #[tokio::test]
    async fn test_collector_failure_triggers_cleanup() {
        let collector = Arc::new(RecordingCollector {
            fail_on: Some(CollectPoint::PostEnter),
            ..Default::default()
        });
        let mut scale = ScaleResources::new(Vec::new()).with_collector(collector.clone());

        let err = scale.enter().await.unwrap_err();

        assert!(err.to_string().contains("collector failed"));
        assert_eq!(scale.phase(), ScalePhase::Failed);
        assert_eq!(
            *collector.points.lock(),
            vec![CollectPoint::PostEnter, CollectPoint::CleanupOnError]
        );
    }

    #[tokio::test]
    async fn test_delete_disabled_exit_is_noop() {
        let collector = Arc::new(RecordingCollector::default());
        let mut scale = ScaleResources::new(Vec::new())
            .with_flags(ScaleFlags::create_only())
            .with_collector(collector.clone());

        scale.enter().await.unwrap();
        scale.exit().await.unwrap();

        assert_eq!(scale.phase(), ScalePhase::Ready);
        assert!(scale.timing().delete.is_none());
        assert_eq!(*collector.points.lock(), vec![CollectPoint::PostEnter]);
    }

    #[tokio::test]
    async fn test_scoped_body_error_wins() {
        let mut scale = ScaleResources::new(Vec::new());
        let result: Result<()> = scale
            .scoped(|_| async { Err(Error::validation("body failed")) })
            .await;

        assert!(matches!(result, Err(Error::Validation { .. })));
        assert_eq!(scale.phase(), ScalePhase::Closed);
    }

    #[tokio::test]
    async fn test_scoped_returns_body_value() {
        let mut scale = ScaleResources::new(Vec::new());
        let n = scale.scoped(|rs| async move { Ok(rs.len()) }).await.unwrap();
        assert_eq!(n, 0);
    }
}

//! Parallel fan-out of one operation across a batch of resources
//!
//! Every item gets its own tokio task, so a batch of N resources runs N
//! operations at once; callers that need to bound concurrency chunk the batch
//! themselves. Results come back in input order regardless of completion
//! order. A failing item never cancels its siblings: the runner waits for all
//! of them to settle and then reports the first failure in input order,
//! unmodified. Dropping a fan-out before it settles aborts every operation
//! still in flight.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error};

use kscale_common::{Error, Result, TIMEOUT_2MIN, TIMEOUT_4MIN};

use crate::resource::{ResourceStatus, SharedRequest, SharedResource};
use crate::unwind::UnwindStack;

/// Aborts the wrapped tasks when dropped; finished tasks are unaffected
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Run `op` on every item concurrently and return each item's outcome in input order
pub async fn run_parallel_settled<T, F, Fut, O>(items: &[T], op: F) -> Vec<Result<O>>
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<O>> + Send + 'static,
    O: Send + 'static,
{
    let handles: Vec<JoinHandle<Result<O>>> = items
        .iter()
        .cloned()
        .map(|item| tokio::spawn(op(item)))
        .collect();
    let _abort = AbortOnDrop(handles.iter().map(JoinHandle::abort_handle).collect());

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| {
            joined.unwrap_or_else(|e| {
                Err(Error::internal_with_context(
                    "runner",
                    format!("worker task failed: {}", e),
                ))
            })
        })
        .collect()
}

/// Run `op` on every item concurrently
///
/// Returns the per-item results in input order, or the first failure in input
/// order once every operation has settled. All failures are logged.
pub async fn run_parallel<T, F, Fut, O>(items: &[T], op: F) -> Result<Vec<O>>
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<O>> + Send + 'static,
    O: Send + 'static,
{
    first_error(run_parallel_settled(items, op).await)
}

fn first_error<O>(outcomes: Vec<Result<O>>) -> Result<Vec<O>> {
    let mut values = Vec::with_capacity(outcomes.len());
    let mut errors = Vec::new();

    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(v) => values.push(v),
            Err(e) => {
                error!(index, error = %e, "parallel operation failed");
                errors.push(e);
            }
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors.swap_remove(0))
    }
}

/// Deploy every resource
pub async fn deploy_resources(resources: &[SharedResource]) -> Result<Vec<()>> {
    debug!(count = resources.len(), "deploying resources");
    run_parallel(resources, |r| async move { r.deploy().await }).await
}

/// Enter every resource's scope, registering each success's exit on `stack`
///
/// Teardowns are pushed as the deploys complete, so unwinding tears resources
/// down in reverse order of creation. Successes are registered even when a
/// sibling fails, before the failure is returned. If this future is dropped
/// early, the resources created so far are already on `stack`.
pub async fn deploy_resources_onto(
    resources: &[SharedResource],
    stack: &mut UnwindStack,
) -> Result<()> {
    debug!(count = resources.len(), "deploying resources onto unwind stack");
    run_registering(resources, |r| async move { r.enter().await }, resources, stack).await
}

/// Deploy every request resource (the paired resources come into existence as a result)
pub async fn deploy_requested_resources(
    resources: &[SharedResource],
    request_resources: &[SharedRequest],
) -> Result<Vec<()>> {
    check_pairing(resources, request_resources)?;
    debug!(count = request_resources.len(), "deploying request resources");
    run_parallel(request_resources, |req| async move { req.deploy().await }).await
}

/// Deploy every request resource, registering the paired resource's exit on `stack`
pub async fn deploy_requested_resources_onto(
    resources: &[SharedResource],
    request_resources: &[SharedRequest],
    stack: &mut UnwindStack,
) -> Result<()> {
    check_pairing(resources, request_resources)?;
    debug!(
        count = request_resources.len(),
        "deploying request resources onto unwind stack"
    );
    run_registering(
        request_resources,
        |req| async move { req.deploy().await },
        resources,
        stack,
    )
    .await
}

/// Run `op` on every item, pushing `resources[i]` onto `stack` as item `i` succeeds
async fn run_registering<T, F, Fut>(
    items: &[T],
    op: F,
    resources: &[SharedResource],
    stack: &mut UnwindStack,
) -> Result<()>
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let indexed: Vec<(usize, T)> = items.iter().cloned().enumerate().collect();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let settled = run_parallel_settled(&indexed, |(index, item)| {
        let tx = tx.clone();
        let done = op(item);
        async move {
            done.await?;
            let _ = tx.send(index);
            Ok(())
        }
    });
    tokio::pin!(settled);

    let outcomes = loop {
        tokio::select! {
            biased;
            Some(index) = rx.recv() => stack.push_resource(resources[index].clone()),
            outcomes = &mut settled => break outcomes,
        }
    };
    while let Ok(index) = rx.try_recv() {
        stack.push_resource(resources[index].clone());
    }

    first_error(outcomes).map(|_| ())
}

fn check_pairing(resources: &[SharedResource], request_resources: &[SharedRequest]) -> Result<()> {
    if resources.len() != request_resources.len() {
        return Err(Error::validation(format!(
            "{} request resources cannot be paired with {} resources",
            request_resources.len(),
            resources.len()
        )));
    }
    Ok(())
}

/// Delete every resource
pub async fn delete_resources(resources: &[SharedResource]) -> Result<Vec<()>> {
    debug!(count = resources.len(), "deleting resources");
    run_parallel(resources, |r| async move { r.delete().await }).await
}

/// Wait for every resource to reach `status`, each with its own `timeout`
pub async fn wait_for_resources_status(
    resources: &[SharedResource],
    status: ResourceStatus,
    timeout: Duration,
) -> Result<Vec<()>> {
    debug!(count = resources.len(), %status, "waiting for resources status");
    run_parallel(resources, |r| async move {
        r.wait_for_status(status, timeout).await
    })
    .await
}

/// [`wait_for_resources_status`] with the default two minute timeout
pub async fn wait_for_resources_status_default(
    resources: &[SharedResource],
    status: ResourceStatus,
) -> Result<Vec<()>> {
    wait_for_resources_status(resources, status, TIMEOUT_2MIN).await
}

/// Wait for every resource to be gone, each with its own `timeout`
pub async fn wait_deleted_resources(
    resources: &[SharedResource],
    timeout: Duration,
) -> Result<Vec<()>> {
    debug!(count = resources.len(), "waiting for resources deletion");
    run_parallel(resources, |r| async move { r.wait_deleted(timeout).await }).await
}

/// [`wait_deleted_resources`] with the default four minute timeout
pub async fn wait_deleted_resources_default(resources: &[SharedResource]) -> Result<Vec<()>> {
    wait_deleted_resources(resources, TIMEOUT_4MIN).await
}

/// Delete every resource and wait for each to be gone
pub async fn clean_up_resources(resources: &[SharedResource]) -> Result<Vec<()>> {
    debug!(count = resources.len(), "cleaning up resources");
    run_parallel(resources, |r| async move { r.clean_up().await }).await
}

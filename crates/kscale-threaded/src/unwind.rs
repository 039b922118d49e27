//! Ordered teardown stack
//!
//! Every successfully created resource pushes its teardown here. Unwinding
//! pops and runs the teardowns strictly in reverse order of registration, the
//! way nested scoped acquisitions release. The stack is owned by the
//! orchestrating task and is never touched from fan-out workers.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, error, warn};

use kscale_common::Result;

use crate::resource::SharedResource;

type TeardownFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type TeardownFn = Box<dyn FnOnce() -> TeardownFuture + Send>;

struct Teardown {
    label: String,
    action: TeardownFn,
}

/// Stack of pending teardown actions
#[derive(Default)]
pub struct UnwindStack {
    entries: Vec<Teardown>,
}

impl UnwindStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a teardown action
    pub fn push<F, Fut>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.entries.push(Teardown {
            label: label.into(),
            action: Box::new(move || Box::pin(action())),
        });
    }

    /// Register a resource's scoped exit as its teardown
    pub fn push_resource(&mut self, resource: SharedResource) {
        let label = resource.display_name();
        self.push(label, move || async move { resource.exit().await });
    }

    /// Number of pending teardowns
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels of pending teardowns in registration order
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|t| t.label.as_str()).collect()
    }

    /// Move every pending teardown into a new stack, leaving this one empty
    pub fn pop_all(&mut self) -> UnwindStack {
        UnwindStack {
            entries: std::mem::take(&mut self.entries),
        }
    }

    /// Discard every pending teardown without running it
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Run all pending teardowns, most recent first
    ///
    /// Makes exactly one pass: a failing teardown is logged and the rest still
    /// run. Returns the first failure encountered.
    pub async fn unwind(&mut self) -> Result<()> {
        let mut first_error = None;
        let total = self.entries.len();
        debug!(count = total, "unwinding teardown stack");

        while let Some(Teardown { label, action }) = self.entries.pop() {
            debug!(resource = %label, "tearing down");
            if let Err(e) = action().await {
                error!(resource = %label, error = %e, "teardown failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for UnwindStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnwindStack")
            .field("labels", &self.labels())
            .finish()
    }
}

impl Drop for UnwindStack {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            warn!(
                count = self.entries.len(),
                resources = ?self.labels(),
                "teardown stack dropped without unwinding, resources left in the cluster"
            );
        }
    }
}

//! Repeated sampling with a time budget

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use kscale_common::Result;

/// How a sampling run ended
#[derive(Clone, Debug, PartialEq)]
pub enum SampleOutcome<R, T> {
    /// The check accepted a sample
    Done(R),
    /// Time ran out; carries the last sample taken
    TimedOut(T),
}

/// Takes a sample immediately, then every `sleep` while `wait_timeout` has not elapsed
#[derive(Clone, Copy, Debug)]
pub struct TimeoutSampler {
    /// Total time budget
    pub wait_timeout: Duration,
    /// Pause between samples
    pub sleep: Duration,
}

impl TimeoutSampler {
    /// Sampler with the given budget and interval
    pub fn new(wait_timeout: Duration, sleep: Duration) -> Self {
        Self {
            wait_timeout,
            sleep,
        }
    }

    /// Sample until `check` returns `Some` or the budget runs out
    ///
    /// Sampling errors end the run immediately.
    pub async fn run<T, R, F, Fut, C>(&self, mut sample: F, mut check: C) -> Result<SampleOutcome<R, T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: FnMut(&T) -> Option<R>,
    {
        let start = Instant::now();

        loop {
            let value = sample().await?;
            if let Some(accepted) = check(&value) {
                return Ok(SampleOutcome::Done(accepted));
            }

            tokio::time::sleep(self.sleep).await;
            if start.elapsed() >= self.wait_timeout {
                trace!(elapsed = ?start.elapsed(), "sampler timed out");
                return Ok(SampleOutcome::TimedOut(value));
            }
        }
    }
}

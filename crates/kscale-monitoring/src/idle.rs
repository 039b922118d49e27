//! Waiting for the API server to go quiet
//!
//! Request rates are noisy, so a single low reading says little. The monitor
//! first spends a short budget classifying the current state: six quiet
//! samples in a row mean the cluster is already idle, three noisy ones mean a
//! burst is under way. Either way (or if the budget runs out) it then samples
//! until the rate drops below the idle threshold, for at most twice the rate
//! window.

use std::sync::Arc;
use std::time::Duration;

use kube::Resource;
use tracing::{debug, error, info};

use kscale_common::kube_utils::pluralize_kind;
use kscale_common::{Error, Result, TIMEOUT_30SEC, TIMEOUT_5MIN};

use crate::prometheus::MetricsSource;
use crate::sampler::{SampleOutcome, TimeoutSampler};

/// Consecutive quiet samples needed to call the initial state idle (strictly more than)
const SILENCE_LIMIT: u32 = 5;
/// Consecutive noisy samples needed to call the initial state busy (strictly more than)
const NOISE_LIMIT: u32 = 2;

/// Timing knobs for [`ApiServerRequestMonitor`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdleMonitorConfig {
    /// Rate window of the query; the idle wait is bounded by twice this
    pub window: Duration,
    /// Pause between samples
    pub sample_interval: Duration,
    /// Budget for the initial classification
    pub initial_timeout: Duration,
}

impl Default for IdleMonitorConfig {
    fn default() -> Self {
        Self {
            window: TIMEOUT_5MIN,
            sample_interval: Duration::from_secs(5),
            initial_timeout: TIMEOUT_30SEC,
        }
    }
}

/// Watches `apiserver_request_total` for one resource until it is idle
pub struct ApiServerRequestMonitor {
    source: Arc<dyn MetricsSource>,
    api_group: String,
    resource: String,
    idle_threshold: f64,
    config: IdleMonitorConfig,
    query: String,
}

fn build_query(api_group: &str, resource: &str, window: Duration) -> String {
    format!(
        "sum by (resource) (rate(apiserver_request_total{{group=\"{}\",resource=\"{}\"}}[{}s]))",
        api_group,
        resource,
        window.as_secs()
    )
}

impl ApiServerRequestMonitor {
    /// Monitor requests for `kind` in `api_group` (empty for the core group)
    ///
    /// The cluster counts as idle once the request rate is below `idle_threshold`.
    pub fn new(
        source: Arc<dyn MetricsSource>,
        api_group: impl Into<String>,
        kind: &str,
        idle_threshold: f64,
    ) -> Self {
        let api_group = api_group.into();
        let resource = pluralize_kind(kind);
        let config = IdleMonitorConfig::default();
        let query = build_query(&api_group, &resource, config.window);
        Self {
            source,
            api_group,
            resource,
            idle_threshold,
            config,
            query,
        }
    }

    /// Monitor requests for the kube type `K`
    pub fn for_resource<K>(source: Arc<dyn MetricsSource>, idle_threshold: f64) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self::new(source, K::group(&()), &K::kind(&()), idle_threshold)
    }

    /// Override the timing knobs
    pub fn with_config(mut self, config: IdleMonitorConfig) -> Self {
        self.query = build_query(&self.api_group, &self.resource, config.window);
        self.config = config;
        self
    }

    /// The query being sampled
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Threshold below which the rate counts as idle
    pub fn idle_threshold(&self) -> f64 {
        self.idle_threshold
    }

    async fn sample_value(&self) -> Result<Option<f64>> {
        let samples = self.source.query_sample(&self.query).await?;
        match samples.first() {
            Some(sample) => sample.numeric_value().map(Some),
            None => Ok(None),
        }
    }

    /// Classify the starting state within the initial budget
    ///
    /// Running out of time here is not an error.
    pub async fn initial_wait(&self) -> Result<()> {
        let threshold = self.idle_threshold;
        let mut silence = 0u32;
        let mut noise = 0u32;

        let sampler = TimeoutSampler::new(self.config.initial_timeout, self.config.sample_interval);
        let outcome = sampler
            .run(
                || self.sample_value(),
                |value: &Option<f64>| {
                    let value = (*value)?;
                    if value < threshold {
                        noise = 0;
                        silence += 1;
                    } else {
                        silence = 0;
                        noise += 1;
                    }
                    if silence > SILENCE_LIMIT {
                        Some("idle")
                    } else if noise > NOISE_LIMIT {
                        Some("busy")
                    } else {
                        None
                    }
                },
            )
            .await?;

        match outcome {
            SampleOutcome::Done(state) => {
                debug!(query = %self.query, state, "initial api server state classified")
            }
            SampleOutcome::TimedOut(last) => {
                debug!(query = %self.query, last = ?last, "initial classification inconclusive")
            }
        }
        Ok(())
    }

    /// Sample until the rate drops below the idle threshold
    ///
    /// Fails with [`Error::IdleTimeout`] carrying the last observed value if
    /// that doesn't happen within twice the rate window.
    pub async fn wait_until_idle(&self) -> Result<()> {
        let threshold = self.idle_threshold;
        let sampler = TimeoutSampler::new(self.config.window * 2, self.config.sample_interval);

        let outcome = sampler
            .run(
                || self.sample_value(),
                |value: &Option<f64>| value.filter(|v| *v < threshold),
            )
            .await?;

        match outcome {
            SampleOutcome::Done(value) => {
                info!(query = %self.query, value, threshold, "api server idle");
                Ok(())
            }
            SampleOutcome::TimedOut(last) => {
                let err = Error::IdleTimeout {
                    query: self.query.clone(),
                    last_value: last,
                    threshold,
                };
                error!(error = %err, "api server did not become idle");
                Err(err)
            }
        }
    }

    /// Classify the starting state, then wait until idle
    pub async fn wait_for_idle(&self) -> Result<()> {
        self.initial_wait().await?;
        self.wait_until_idle().await
    }
}

impl std::fmt::Debug for ApiServerRequestMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiServerRequestMonitor")
            .field("query", &self.query)
            .field("idle_threshold", &self.idle_threshold)
            .field("config", &self.config)
            .finish()
    }
}

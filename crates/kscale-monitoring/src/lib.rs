//! API server monitoring for kscale
//!
//! Samples request-rate metrics from Prometheus to tell when the control
//! plane has settled back to an idle baseline after a scale burst.

#![deny(missing_docs)]

pub mod idle;
pub mod prometheus;
pub mod sampler;

pub use idle::{ApiServerRequestMonitor, IdleMonitorConfig};
pub use prometheus::{MetricsSource, PrometheusClient, Sample};
pub use sampler::{SampleOutcome, TimeoutSampler};

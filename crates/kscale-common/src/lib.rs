//! Common types for kscale: errors, Kubernetes helpers, result caches and telemetry

#![deny(missing_docs)]

pub mod cache;
pub mod error;
pub mod kube_utils;
pub mod telemetry;

use std::time::Duration;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// 30 second timeout (initial idle classification)
pub const TIMEOUT_30SEC: Duration = Duration::from_secs(30);

/// 2 minute timeout (default wait for a resource status)
pub const TIMEOUT_2MIN: Duration = Duration::from_secs(2 * 60);

/// 4 minute timeout (default wait for a resource deletion)
pub const TIMEOUT_4MIN: Duration = Duration::from_secs(4 * 60);

/// 5 minute timeout (default metrics window for idle detection)
pub const TIMEOUT_5MIN: Duration = Duration::from_secs(5 * 60);

/// Field manager used for server-side apply patches issued by kscale
pub const FIELD_MANAGER: &str = "kscale";

//! Error types for kscale
//!
//! Errors are structured with fields to aid debugging a failed scale run.
//! Per-resource failures carry the resource and the operation that failed so
//! a batch-level failure still points at its root cause.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for kscale operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A single resource operation failed
    #[error("{operation} failed for {resource}: {message}")]
    Operation {
        /// Resource the operation ran against (e.g., "Pod test-ns/test-pod-3")
        resource: String,
        /// Operation name (deploy, delete, wait_for_status, ...)
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// A wait exceeded its time budget
    #[error("timeout in {operation}: {message}")]
    Timeout {
        /// Operation that was waiting
        operation: String,
        /// Description of what was being waited for
        message: String,
    },

    /// The API server never returned to its idle request rate
    #[error(
        "metric value {} of {query:?} is not below minimum: {threshold}",
        .last_value.map(|v| v.to_string()).unwrap_or_else(|| "<no sample>".to_string())
    )]
    IdleTimeout {
        /// Query that was sampled
        query: String,
        /// Last observed sample value, if any sample returned data
        last_value: Option<f64>,
        /// Idle threshold the value had to drop below
        threshold: f64,
    },

    /// Invalid orchestration input
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
    },

    /// Metrics source failure or malformed metrics response
    #[error("metrics error: {message}")]
    Metrics {
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Result cache write failure
    #[error("cache error for key {key}: {message}")]
    Cache {
        /// Key being written
        key: String,
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "runner", "unwind")
        context: String,
    },
}

impl Error {
    /// Create an operation failure for a resource
    pub fn operation(
        resource: impl Into<String>,
        operation: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Operation {
            resource: resource.into(),
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a metrics error with the given message
    pub fn metrics(msg: impl Into<String>) -> Self {
        Self::Metrics {
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a cache error for a key
    pub fn cache(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Cache {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether this error is a wait that ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::IdleTimeout { .. })
    }

    /// Whether this error is a Kubernetes 404
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == 404
        )
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            Error::Operation { operation, .. } | Error::Timeout { operation, .. } => {
                Some(operation)
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}

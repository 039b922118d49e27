//! Prometheus instant queries
//!
//! [`MetricsSource`] is the seam the idle monitor samples through;
//! [`PrometheusClient`] implements it against the Prometheus HTTP API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use kscale_common::{Error, Result};

/// Timeout for a single Prometheus query
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// One series of an instant-vector query result
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Sample {
    /// Series labels
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    /// `(unix timestamp, numeric string)` as Prometheus reports it
    pub value: (f64, String),
}

impl Sample {
    /// Build a sample (mostly useful for tests and fakes)
    pub fn new(timestamp: f64, value: impl Into<String>) -> Self {
        Self {
            metric: BTreeMap::new(),
            value: (timestamp, value.into()),
        }
    }

    /// The sample value as a number
    pub fn numeric_value(&self) -> Result<f64> {
        self.value.1.parse().map_err(|e| {
            Error::metrics(format!("sample value {:?} is not numeric: {}", self.value.1, e))
        })
    }
}

/// Source of point-in-time metric samples
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Evaluate `query` now and return every series it produced
    async fn query_sample(&self, query: &str) -> Result<Vec<Sample>>;
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: Value,
}

/// Parse a `/api/v1/query` response body into its vector samples
pub(crate) fn parse_query_response(body: &str) -> Result<Vec<Sample>> {
    let response: QueryResponse = serde_json::from_str(body)?;

    if response.status != "success" {
        return Err(Error::metrics(format!(
            "query failed ({}): {}",
            response.error_type.as_deref().unwrap_or("unknown"),
            response.error.as_deref().unwrap_or("no error message")
        )));
    }

    let data = response
        .data
        .ok_or_else(|| Error::metrics("successful query response has no data"))?;
    if data.result_type != "vector" {
        return Err(Error::metrics(format!(
            "expected a vector result, got {}",
            data.result_type
        )));
    }
    Ok(serde_json::from_value(data.result)?)
}

/// Prometheus HTTP API client
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl PrometheusClient {
    /// Client for the Prometheus at `base_url`
    ///
    /// `token` is sent as a bearer token (e.g., a service account token for
    /// an OpenShift thanos-querier route). `verify_tls = false` accepts any
    /// server certificate.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        verify_tls: bool,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(QUERY_TIMEOUT)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| Error::metrics(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url, token))
    }

    /// Client using a preconfigured HTTP client
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn query_url(&self) -> String {
        format!("{}/api/v1/query", self.base_url)
    }
}

#[async_trait]
impl MetricsSource for PrometheusClient {
    async fn query_sample(&self, query: &str) -> Result<Vec<Sample>> {
        debug!(query = %query, "querying prometheus");

        let mut request = self.client.get(self.query_url()).query(&[("query", query)]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::metrics(format!("request failed: {}", e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::metrics(format!("failed to read response: {}", e)))?;

        // Prometheus reports query errors as JSON with a 4xx/5xx status
        if !status.is_success() && serde_json::from_str::<QueryResponse>(&body).is_err() {
            return Err(Error::metrics(format!("HTTP {}", status)));
        }

        let samples = parse_query_response(&body)?;
        trace!(count = samples.len(), "prometheus samples");
        Ok(samples)
    }
}

// HTTP latency measurement service adapter.
//
// The service is asked with one GET per measurement. Its JSON answer is
// either one object or an array of per-node objects:
//
//   {"status": "ok", "latency": "123ms"}
//   [{"node": "Beijing", "status": "ok", "latency": "88ms"}, ...]
//
// Field names and failure markers are configurable. Arrays are reduced
// conservatively: any failed node fails the measurement, otherwise the
// slowest node's latency is reported.

use std::time::Duration;

use async_trait::async_trait;
use dnspool_core::config::ProbeConfig;
use dnspool_core::traits::{
    LatencyProbe, LatencyProbeFactory, ProbeResult, ProbeStatus, parse_latency,
};
use dnspool_core::{Error, Result};
use serde_json::Value;

const TARGET_PLACEHOLDER: &str = "{target}";

/// Client-side safety net; the prober applies its own, usually shorter,
/// per-request timeout
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Latency probe backed by an HTTP measurement service
#[derive(Debug)]
pub struct HttpLatencyProbe {
    endpoint: String,
    status_field: String,
    latency_field: String,
    /// Lowercased
    failure_statuses: Vec<String>,
    client: reqwest::Client,
}

impl HttpLatencyProbe {
    /// Create a probe
    ///
    /// # Parameters
    ///
    /// - `endpoint`: URL of the service; `{target}` is replaced by the
    ///   candidate, otherwise the candidate is sent as `?target=`
    /// - `status_field` / `latency_field`: JSON field names in the reply
    /// - `failure_statuses`: status values marking a failed measurement
    pub fn new(
        endpoint: impl Into<String>,
        status_field: impl Into<String>,
        latency_field: impl Into<String>,
        failure_statuses: &[String],
    ) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(Error::config("Latency probe endpoint cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            status_field: status_field.into(),
            latency_field: latency_field.into(),
            failure_statuses: failure_statuses
                .iter()
                .map(|s| s.trim().to_lowercase())
                .collect(),
            client,
        })
    }

    fn request(&self, candidate: &str) -> reqwest::RequestBuilder {
        if self.endpoint.contains(TARGET_PLACEHOLDER) {
            self.client
                .get(self.endpoint.replace(TARGET_PLACEHOLDER, candidate))
        } else {
            self.client
                .get(&self.endpoint)
                .query(&[("target", candidate)])
        }
    }

    /// Normalize a reply body into a result for `candidate`
    fn interpret(&self, candidate: &str, body: &Value) -> Result<ProbeResult> {
        match body {
            Value::Array(nodes) => {
                if nodes.is_empty() {
                    return Err(Error::probe(format!(
                        "Measurement of {} returned no nodes",
                        candidate
                    )));
                }

                let mut slowest: f64 = 0.0;
                for node in nodes {
                    let (status, latency) = self.read_node(node);
                    match (status, latency) {
                        (ProbeStatus::Ok, Some(ms)) => slowest = slowest.max(ms),
                        (ProbeStatus::Timeout, _) => return Ok(ProbeResult::timeout(candidate)),
                        _ => return Ok(ProbeResult::error(candidate)),
                    }
                }
                Ok(ProbeResult::ok(candidate, slowest))
            }
            Value::Object(_) => {
                let (status, latency_ms) = self.read_node(body);
                Ok(ProbeResult {
                    candidate: candidate.to_string(),
                    latency_ms,
                    status,
                })
            }
            other => Err(Error::probe(format!(
                "Unexpected measurement reply for {}: {}",
                candidate, other
            ))),
        }
    }

    fn read_node(&self, node: &Value) -> (ProbeStatus, Option<f64>) {
        let status = match node.get(&self.status_field).and_then(Value::as_str) {
            Some(raw) => {
                let raw = raw.trim().to_lowercase();
                if !self.failure_statuses.contains(&raw) {
                    ProbeStatus::Ok
                } else if raw == "timeout" {
                    ProbeStatus::Timeout
                } else {
                    ProbeStatus::Error
                }
            }
            None => ProbeStatus::Ok,
        };

        let latency = match node.get(&self.latency_field) {
            Some(Value::String(raw)) => parse_latency(raw),
            Some(Value::Number(n)) => n.as_f64().filter(|ms| *ms >= 0.0),
            _ => None,
        };

        (status, latency)
    }
}

#[async_trait]
impl LatencyProbe for HttpLatencyProbe {
    async fn measure(&self, candidate: &str) -> Result<ProbeResult> {
        let response = self
            .request(candidate)
            .send()
            .await
            .map_err(|e| Error::probe(format!("Measurement request for {} failed: {}", candidate, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::probe(format!(
                "Measurement service returned HTTP {} for {}",
                status, candidate
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            Error::probe(format!("Unparseable measurement reply for {}: {}", candidate, e))
        })?;

        let result = self.interpret(candidate, &body)?;
        tracing::debug!(
            "Measured {}: {:?} {:?}",
            candidate,
            result.status,
            result.latency_ms
        );
        Ok(result)
    }

    fn probe_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for [`HttpLatencyProbe`]
pub struct HttpProbeFactory;

impl LatencyProbeFactory for HttpProbeFactory {
    fn create(&self, config: &ProbeConfig) -> Result<Box<dyn LatencyProbe>> {
        match config {
            ProbeConfig::Http {
                endpoint,
                status_field,
                latency_field,
                failure_statuses,
            } => Ok(Box::new(HttpLatencyProbe::new(
                endpoint.clone(),
                status_field.clone(),
                latency_field.clone(),
                failure_statuses,
            )?)),
            _ => Err(Error::config("Invalid config for HTTP latency probe")),
        }
    }
}

// Per-line packet loss reports fetched over HTTP.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dnspool_core::config::{LossCriterion, RoutingLine, SourceConfig};
use dnspool_core::traits::{CandidateSet, CandidateSource, CandidateSourceFactory};
use dnspool_core::{Error, Result};
use serde_json::Value;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Assign the addresses of a loss report to lines
///
/// Entries without an `ip` string are skipped. An address listed in several
/// groups is judged on its last entry. A missing or non-numeric loss field
/// counts as total loss.
pub fn select_by_loss(
    report: &Value,
    lines: &HashMap<RoutingLine, LossCriterion>,
) -> Result<CandidateSet> {
    let groups = report
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::collection("Loss report has no `data` object"))?;

    let mut entries: Vec<(&str, &Value)> = Vec::new();
    for entry in groups.values().filter_map(Value::as_array).flatten() {
        let Some(ip) = entry.get("ip").and_then(Value::as_str) else {
            continue;
        };
        match entries.iter_mut().find(|(existing, _)| *existing == ip) {
            Some(slot) => slot.1 = entry,
            None => entries.push((ip, entry)),
        }
    }

    let mut set = CandidateSet::new();
    for (ip, entry) in entries {
        for (line, criterion) in lines {
            let loss = entry
                .get(&criterion.field)
                .and_then(Value::as_f64)
                .unwrap_or(f64::INFINITY);
            if loss < criterion.max_loss {
                set.insert(*line, ip);
            }
        }
    }
    Ok(set)
}

/// Candidate source reading a JSON loss report from a URL
#[derive(Debug)]
pub struct HttpJsonCandidateSource {
    url: String,
    lines: HashMap<RoutingLine, LossCriterion>,
    client: reqwest::Client,
}

impl HttpJsonCandidateSource {
    /// Create a source for `url` with one loss criterion per line
    pub fn new(url: impl Into<String>, lines: HashMap<RoutingLine, LossCriterion>) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(Error::config("HTTP candidate source URL cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { url, lines, client })
    }
}

#[async_trait]
impl CandidateSource for HttpJsonCandidateSource {
    async fn fetch(&self) -> Result<CandidateSet> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::collection(format!("Request to {} failed: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(Error::collection(format!(
                "{} returned HTTP {}",
                self.url,
                response.status()
            )));
        }

        let report: Value = response
            .json()
            .await
            .map_err(|e| Error::collection(format!("Invalid JSON from {}: {}", self.url, e)))?;

        let set = select_by_loss(&report, &self.lines)?;
        tracing::debug!("{} yielded {} line entries", self.url, set.len());
        Ok(set)
    }

    fn source_name(&self) -> &str {
        &self.url
    }
}

/// Factory for [`HttpJsonCandidateSource`]
pub struct HttpJsonSourceFactory;

impl CandidateSourceFactory for HttpJsonSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn CandidateSource>> {
        match config {
            SourceConfig::HttpJson { url, lines } => Ok(Box::new(HttpJsonCandidateSource::new(
                url.clone(),
                lines.clone(),
            )?)),
            _ => Err(Error::config("Invalid config for HTTP JSON candidate source")),
        }
    }
}

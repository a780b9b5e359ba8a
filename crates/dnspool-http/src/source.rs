// Plain-text candidate lists fetched over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use dnspool_core::config::{RoutingLine, SourceConfig};
use dnspool_core::traits::{CandidateSet, CandidateSource, CandidateSourceFactory};
use dnspool_core::{Error, Result};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Split a comma and/or whitespace separated address list
pub fn split_addresses(text: &str) -> Vec<&str> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Candidate source reading an address list from a URL
///
/// Every address is assigned to each configured line. Validation of the
/// addresses themselves happens later, when the engine refines the merged
/// set.
#[derive(Debug)]
pub struct HttpTextCandidateSource {
    url: String,
    lines: Vec<RoutingLine>,
    client: reqwest::Client,
}

impl HttpTextCandidateSource {
    /// Create a source for `url`, assigning its addresses to `lines`
    pub fn new(url: impl Into<String>, lines: Vec<RoutingLine>) -> Result<Self> {
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
impl CandidateSource for HttpTextCandidateSource {
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

        let text = response
            .text()
            .await
            .map_err(|e| Error::collection(format!("Failed to read {}: {}", self.url, e)))?;

        let addresses = split_addresses(&text);
        tracing::debug!("{} listed {} addresses", self.url, addresses.len());
        Ok(CandidateSet::for_lines(&self.lines, addresses))
    }

    fn source_name(&self) -> &str {
        &self.url
    }
}

/// Factory for [`HttpTextCandidateSource`]
pub struct HttpTextSourceFactory;

impl CandidateSourceFactory for HttpTextSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn CandidateSource>> {
        match config {
            SourceConfig::HttpText { url, lines } => Ok(Box::new(HttpTextCandidateSource::new(
                url.clone(),
                lines.clone(),
            )?)),
            _ => Err(Error::config("Invalid config for HTTP text candidate source")),
        }
    }
}

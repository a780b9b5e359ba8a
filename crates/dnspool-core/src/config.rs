//! Configuration types for the DNS pool
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Main pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Root domain managed at the provider (e.g. "example.com")
    pub domain: String,

    /// Host record (RR) whose buckets are maintained (e.g. "www", "@")
    pub host_record: String,

    /// Routing lines to maintain, processed in this order
    #[serde(default = "default_lines")]
    pub lines: Vec<RoutingLine>,

    /// Record store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Latency measurement configuration
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Candidate sources, merged in order
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Post-processing applied to merged candidates
    #[serde(default)]
    pub candidates: CandidateFilterConfig,

    /// Prober tuning
    #[serde(default)]
    pub prober: ProberConfig,

    /// Synchronizer tuning
    #[serde(default)]
    pub sync: SyncConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl PoolConfig {
    /// Create a new configuration with defaults
    pub fn new(domain: impl Into<String>, host_record: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            host_record: host_record.into(),
            lines: default_lines(),
            store: StoreConfig::default(),
            probe: ProbeConfig::default(),
            sources: Vec::new(),
            candidates: CandidateFilterConfig::default(),
            prober: ProberConfig::default(),
            sync: SyncConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    ///
    /// Store credentials are deliberately not checked here: a store that
    /// cannot be built only disables the write path.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.domain.trim().is_empty() {
            return Err(crate::Error::config("Domain cannot be empty"));
        }
        if self.host_record.trim().is_empty() {
            return Err(crate::Error::config("Host record cannot be empty"));
        }
        if self.lines.is_empty() {
            return Err(crate::Error::config("At least one routing line is required"));
        }

        self.prober.validate()?;
        self.sync.validate()?;
        for source in &self.sources {
            source.validate()?;
        }

        Ok(())
    }
}

/// Traffic-steering category under which a host record holds its own records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingLine {
    /// Default line (all resolvers not matched elsewhere)
    Default,
    /// China Telecom
    Telecom,
    /// China Unicom
    Unicom,
    /// China Mobile
    Mobile,
    /// Resolvers outside mainland China
    Oversea,
}

impl RoutingLine {
    /// The three carrier lines maintained by default
    pub const CARRIERS: [RoutingLine; 3] =
        [RoutingLine::Mobile, RoutingLine::Unicom, RoutingLine::Telecom];

    /// Line code as understood by the provider
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingLine::Default => "default",
            RoutingLine::Telecom => "telecom",
            RoutingLine::Unicom => "unicom",
            RoutingLine::Mobile => "mobile",
            RoutingLine::Oversea => "oversea",
        }
    }
}

impl std::fmt::Display for RoutingLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingLine {
    type Err = crate::Error;

    /// Accepts provider codes and the short carrier codes (CM/CU/CT/AB/DEF)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" | "def" => Ok(RoutingLine::Default),
            "telecom" | "ct" => Ok(RoutingLine::Telecom),
            "unicom" | "cu" => Ok(RoutingLine::Unicom),
            "mobile" | "cm" => Ok(RoutingLine::Mobile),
            "oversea" | "ab" => Ok(RoutingLine::Oversea),
            other => Err(crate::Error::config(format!("Unknown routing line: {}", other))),
        }
    }
}

fn default_lines() -> Vec<RoutingLine> {
    RoutingLine::CARRIERS.to_vec()
}

/// DNS record type written by the synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    /// A record (IPv4)
    #[default]
    A,
    /// AAAA record (IPv6)
    Aaaa,
}

impl RecordType {
    /// Record type as understood by the provider
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record store configuration
///
/// The Debug implementation redacts the access key secret.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Alibaba Cloud DNS
    Alidns {
        /// Access key id
        access_key_id: String,
        /// Access key secret
        access_key_secret: String,
        /// API endpoint host (optional, defaults to the public endpoint)
        endpoint: Option<String>,
    },

    /// In-memory store (not persistent, for testing and dry runs)
    Memory,

    /// Custom record store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StoreConfig {
    /// Get the store type name used for registry lookups
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::Alidns { .. } => "alidns",
            StoreConfig::Memory => "memory",
            StoreConfig::Custom { factory, .. } => factory,
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreConfig::Alidns {
                access_key_id,
                endpoint,
                ..
            } => f
                .debug_struct("Alidns")
                .field("access_key_id", access_key_id)
                .field("access_key_secret", &"<REDACTED>")
                .field("endpoint", endpoint)
                .finish(),
            StoreConfig::Memory => f.write_str("Memory"),
            StoreConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .finish_non_exhaustive(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Alidns {
            access_key_id: String::new(),
            access_key_secret: String::new(),
            endpoint: None,
        }
    }
}

/// Latency measurement service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeConfig {
    /// HTTP measurement service
    Http {
        /// Endpoint URL; `{target}` is replaced by the candidate, otherwise
        /// the candidate is sent as the `target` query parameter
        endpoint: String,
        /// JSON field holding the status flag
        #[serde(default = "default_status_field")]
        status_field: String,
        /// JSON field holding the latency (e.g. "123ms", "1.2s")
        #[serde(default = "default_latency_field")]
        latency_field: String,
        /// Status values that mark a failed measurement (case-insensitive)
        #[serde(default = "default_failure_statuses")]
        failure_statuses: Vec<String>,
    },

    /// Custom measurement service
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProbeConfig {
    /// Get the probe type name used for registry lookups
    pub fn type_name(&self) -> &str {
        match self {
            ProbeConfig::Http { .. } => "http",
            ProbeConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig::Http {
            endpoint: String::new(),
            status_field: default_status_field(),
            latency_field: default_latency_field(),
            failure_statuses: default_failure_statuses(),
        }
    }
}

fn default_status_field() -> String {
    "status".to_string()
}

fn default_latency_field() -> String {
    "latency".to_string()
}

fn default_failure_statuses() -> Vec<String> {
    vec![
        "failed".to_string(),
        "error".to_string(),
        "timeout".to_string(),
        "访问失败".to_string(),
    ]
}

/// Candidate source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Plain-text address list fetched over HTTP
    HttpText {
        /// URL to fetch
        url: String,
        /// Lines the fetched addresses are assigned to
        #[serde(default = "default_lines")]
        lines: Vec<RoutingLine>,
    },

    /// JSON report of per-line packet loss fetched over HTTP
    ///
    /// The report is `{"data": {<group>: [{"ip": .., <loss field>: ..}, ..]}}`.
    /// An address is assigned to a line when its loss for that line is below
    /// the line's threshold.
    HttpJson {
        /// URL to fetch
        url: String,
        /// Loss criterion per line
        lines: HashMap<RoutingLine, LossCriterion>,
    },

    /// Fixed candidates, mostly for testing
    Static {
        /// Candidates per line
        candidates: HashMap<RoutingLine, Vec<String>>,
    },
}

impl SourceConfig {
    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::HttpText { url, lines } => {
                if url.is_empty() {
                    return Err(crate::Error::config("HTTP candidate source URL cannot be empty"));
                }
                if lines.is_empty() {
                    return Err(crate::Error::config(format!(
                        "HTTP candidate source {} has no routing lines",
                        url
                    )));
                }
                Ok(())
            }
            SourceConfig::HttpJson { url, lines } => {
                if url.is_empty() {
                    return Err(crate::Error::config("HTTP candidate source URL cannot be empty"));
                }
                if lines.is_empty() {
                    return Err(crate::Error::config(format!(
                        "HTTP candidate source {} has no routing lines",
                        url
                    )));
                }
                for (line, criterion) in lines {
                    if criterion.field.is_empty() {
                        return Err(crate::Error::config(format!(
                            "Loss field for line {} cannot be empty",
                            line
                        )));
                    }
                    if criterion.max_loss.is_nan() || criterion.max_loss <= 0.0 {
                        return Err(crate::Error::config(format!(
                            "Loss threshold for line {} must be positive",
                            line
                        )));
                    }
                }
                Ok(())
            }
            SourceConfig::Static { .. } => Ok(()),
        }
    }
}

/// Which report field carries a line's packet loss, and how much is tolerated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossCriterion {
    /// Field holding the loss percentage
    pub field: String,
    /// Addresses with loss at or above this are left out
    pub max_loss: f64,
}

impl LossCriterion {
    /// Create a criterion
    pub fn new(field: impl Into<String>, max_loss: f64) -> Self {
        Self {
            field: field.into(),
            max_loss,
        }
    }
}

/// Candidate post-processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFilterConfig {
    /// Address prefixes that are never probed (e.g. "172.65.")
    #[serde(default)]
    pub excluded_prefixes: Vec<String>,

    /// Maximum candidates kept per line after sorting; `None` keeps all
    #[serde(default = "default_max_per_line")]
    pub max_per_line: Option<usize>,
}

impl Default for CandidateFilterConfig {
    fn default() -> Self {
        Self {
            excluded_prefixes: Vec::new(),
            max_per_line: default_max_per_line(),
        }
    }
}

fn default_max_per_line() -> Option<usize> {
    Some(50)
}

/// Prober configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProberConfig {
    /// Maximum number of measurements in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Delay inserted before each candidate dispatch (in milliseconds)
    ///
    /// 83 ms keeps the aggregate rate near 12 requests per second.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Maximum measurement attempts per candidate
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay between attempts for the same candidate (in milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Latencies below this are treated as anomalous (in milliseconds)
    #[serde(default = "default_lower_ms")]
    pub lower_ms: f64,

    /// Latencies at or above this are rejected as too slow (in milliseconds)
    #[serde(default = "default_upper_ms")]
    pub upper_ms: f64,

    /// Timeout for a single measurement request (in milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Extra time granted to a whole batch on top of its computed budget
    /// (in milliseconds)
    #[serde(default = "default_batch_slack_ms")]
    pub batch_slack_ms: u64,
}

impl ProberConfig {
    /// Validate the prober configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.concurrency == 0 {
            return Err(crate::Error::config("Prober concurrency must be > 0"));
        }
        if self.max_attempts == 0 {
            return Err(crate::Error::config("Prober max_attempts must be > 0"));
        }
        if !(self.lower_ms >= 0.0 && self.lower_ms < self.upper_ms) {
            return Err(crate::Error::config(format!(
                "Invalid acceptance window [{}, {})",
                self.lower_ms, self.upper_ms
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(crate::Error::config("Prober request timeout must be > 0"));
        }
        Ok(())
    }

    /// Delay before each dispatch
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Delay between attempts
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Timeout for one measurement
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Deadline for a batch of `candidates` measurements
    ///
    /// Every wave of `concurrency` candidates may use all attempts, timeouts
    /// and backoffs; dispatch pacing is added per candidate.
    pub fn batch_timeout(&self, candidates: usize) -> Duration {
        let attempts = self.max_attempts as u32;
        let per_candidate = self.request_timeout() * attempts
            + self.retry_backoff() * attempts.saturating_sub(1);
        let waves = candidates.div_ceil(self.concurrency.max(1)) as u32;
        per_candidate * waves
            + self.pacing() * candidates as u32
            + Duration::from_millis(self.batch_slack_ms)
    }
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            pacing_ms: default_pacing_ms(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            lower_ms: default_lower_ms(),
            upper_ms: default_upper_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            batch_slack_ms: default_batch_slack_ms(),
        }
    }
}

fn default_concurrency() -> usize {
    15
}

fn default_pacing_ms() -> u64 {
    83
}

fn default_max_attempts() -> usize {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_lower_ms() -> f64 {
    70.0
}

fn default_upper_ms() -> f64 {
    300.0
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_batch_slack_ms() -> u64 {
    5_000
}

/// Synchronizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum records per (host record, routing line) bucket
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Page size used when listing records (provider maximum)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Hard cap on pages fetched by one listing
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Record type written
    #[serde(default)]
    pub record_type: RecordType,

    /// TTL for created records (in seconds)
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

impl SyncConfig {
    /// Validate the synchronizer configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.capacity == 0 {
            return Err(crate::Error::config("Bucket capacity must be > 0"));
        }
        if self.page_size == 0 {
            return Err(crate::Error::config("Page size must be > 0"));
        }
        if self.max_pages == 0 {
            return Err(crate::Error::config("max_pages must be > 0"));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            record_type: RecordType::default(),
            ttl: default_ttl(),
        }
    }
}

fn default_capacity() -> usize {
    100
}

fn default_page_size() -> usize {
    500
}

fn default_max_pages() -> usize {
    100
}

fn default_ttl() -> u32 {
    600
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between runs (in seconds); 0 runs once
    #[serde(default)]
    pub run_interval_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_interval_secs: 0,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

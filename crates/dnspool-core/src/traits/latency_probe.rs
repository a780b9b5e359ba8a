// # Latency Probe Trait
//
// Defines the interface to an external reachability measurement service.
//
// ## Implementations
//
// - HTTP measurement service: `dnspool-http` crate
//
// Adapters normalize whatever the service returns into a [`ProbeResult`], so
// the prober never branches on service-specific payloads.

use async_trait::async_trait;

/// Status of a single measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeStatus {
    /// The service measured the candidate
    Ok,
    /// The service reported the candidate as timed out or unavailable
    Timeout,
    /// The service reported a failure
    Error,
}

/// Normalized result of one measurement attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    /// The candidate address
    pub candidate: String,
    /// Measured latency in milliseconds, when one could be parsed
    pub latency_ms: Option<f64>,
    /// Measurement status
    pub status: ProbeStatus,
}

impl ProbeResult {
    /// A successful measurement
    pub fn ok(candidate: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            candidate: candidate.into(),
            latency_ms: Some(latency_ms),
            status: ProbeStatus::Ok,
        }
    }

    /// A measurement the service reported as timed out
    pub fn timeout(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            latency_ms: None,
            status: ProbeStatus::Timeout,
        }
    }

    /// A measurement the service reported as failed
    pub fn error(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            latency_ms: None,
            status: ProbeStatus::Error,
        }
    }

    /// Latency usable for classification
    ///
    /// Only `Ok` results carry a usable latency.
    pub fn usable_latency(&self) -> Option<f64> {
        match self.status {
            ProbeStatus::Ok => self.latency_ms.filter(|ms| ms.is_finite() && *ms >= 0.0),
            ProbeStatus::Timeout | ProbeStatus::Error => None,
        }
    }
}

/// Parse a latency string into milliseconds
///
/// Accepts a number followed by `ms` or `s` (`"123ms"`, `"1.2s"`, `"0.5 s"`);
/// a bare number is taken as milliseconds. Sentinels such as `"--"` or
/// `"timeout"` yield `None`.
pub fn parse_latency(raw: &str) -> Option<f64> {
    let text = raw.trim().to_ascii_lowercase();
    let (number, scale) = if let Some(ms) = text.strip_suffix("ms") {
        (ms, 1.0)
    } else if let Some(secs) = text.strip_suffix('s') {
        (secs, 1000.0)
    } else {
        (text.as_str(), 1.0)
    };

    let value: f64 = number.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(value * scale)
}

/// Trait for latency measurement services
///
/// One call is one measurement request. Timeouts, retries and pacing are
/// owned by the `ReachabilityProber`.
#[async_trait]
pub trait LatencyProbe: Send + Sync {
    /// Measure a candidate
    ///
    /// # Returns
    ///
    /// - `Ok(ProbeResult)`: The service answered (possibly with a failure status)
    /// - `Err(Error)`: Transport failure or unparseable response
    async fn measure(&self, candidate: &str) -> Result<ProbeResult, crate::Error>;

    /// Get the probe name (for logging/debugging)
    fn probe_name(&self) -> &'static str;
}

/// Helper trait for constructing latency probes from configuration
pub trait LatencyProbeFactory: Send + Sync {
    /// Create a LatencyProbe instance from configuration
    fn create(
        &self,
        config: &crate::config::ProbeConfig,
    ) -> Result<Box<dyn LatencyProbe>, crate::Error>;
}

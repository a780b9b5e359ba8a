//! Reachability prober
//!
//! Measures candidates through a [`LatencyProbe`] and keeps those whose
//! latency falls inside the acceptance window `[lower_ms, upper_ms)`.
//!
//! ## Scheduling
//!
//! ```text
//! candidates ──► dispatch loop ──► permit (C wide) ──► pacing sleep ──► spawn
//!                                                                        │
//!                       ┌────────────────────────────────────────────────┘
//!                       ▼
//!              attempt ──► latency >= lower? ──► done
//!                 ▲              │ no
//!                 └── backoff ◄──┘ (while attempts remain)
//! ```
//!
//! A permit is held for the whole life of a candidate, retries included, so
//! no more than `concurrency` measurements are ever in flight. The whole batch
//! runs under a deadline derived from [`ProberConfig::batch_timeout`], or a
//! caller-chosen one via [`ReachabilityProber::probe_batch_until`]; on expiry
//! the finished outcomes are returned and the rest are aborted.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, error, info, warn};

use crate::config::ProberConfig;
use crate::traits::{LatencyProbe, dedup_candidates};

/// Final classification of a candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeVerdict {
    /// Latency inside `[lower_ms, upper_ms)`
    Pass {
        /// Accepted latency in milliseconds
        latency_ms: f64,
    },
    /// Latency at or above `upper_ms`
    TooSlow {
        /// Measured latency in milliseconds
        latency_ms: f64,
    },
    /// Latency stayed below `lower_ms` on every attempt
    Anomalous {
        /// Last measured latency in milliseconds
        latency_ms: f64,
    },
    /// No attempt produced a usable latency
    Unreachable,
}

impl ProbeVerdict {
    /// Classify the last usable latency against the acceptance window
    pub fn classify(latency_ms: Option<f64>, config: &ProberConfig) -> Self {
        match latency_ms {
            None => ProbeVerdict::Unreachable,
            Some(ms) if ms < config.lower_ms => ProbeVerdict::Anomalous { latency_ms: ms },
            Some(ms) if ms >= config.upper_ms => ProbeVerdict::TooSlow { latency_ms: ms },
            Some(ms) => ProbeVerdict::Pass { latency_ms: ms },
        }
    }

    /// Whether the candidate is accepted
    pub fn is_pass(&self) -> bool {
        matches!(self, ProbeVerdict::Pass { .. })
    }

    /// Latency backing the verdict, if any
    pub fn latency_ms(&self) -> Option<f64> {
        match self {
            ProbeVerdict::Pass { latency_ms }
            | ProbeVerdict::TooSlow { latency_ms }
            | ProbeVerdict::Anomalous { latency_ms } => Some(*latency_ms),
            ProbeVerdict::Unreachable => None,
        }
    }
}

/// Verdict for one candidate together with the attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    /// The candidate address
    pub candidate: String,
    /// Final classification
    pub verdict: ProbeVerdict,
    /// Number of measurement attempts made
    pub attempts: usize,
}

/// Result of probing a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    /// Outcomes of every candidate that finished, in completion order
    pub outcomes: Vec<ProbeOutcome>,
    /// Whether the batch deadline expired before all candidates finished
    pub timed_out: bool,
}

impl ProbeReport {
    /// Accepted candidates, without duplicates
    pub fn passed(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.verdict.is_pass())
            .map(|outcome| outcome.candidate.clone())
            .collect()
    }

    /// Number of outcomes matching a predicate
    pub fn count(&self, predicate: impl Fn(&ProbeVerdict) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| predicate(&outcome.verdict))
            .count()
    }
}

/// Next step of the per-candidate retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Back off, then measure again
    Retry,
    /// Classify now
    Finish,
}

/// Decide what to do after an attempt
///
/// `latency_ms` is the usable latency of the attempt just made (`None` for a
/// failed attempt).
fn next_step(latency_ms: Option<f64>, attempts: usize, config: &ProberConfig) -> Step {
    if latency_ms.is_some_and(|ms| ms >= config.lower_ms) {
        return Step::Finish;
    }
    if attempts >= config.max_attempts {
        Step::Finish
    } else {
        Step::Retry
    }
}

/// Bounded-concurrency latency prober
pub struct ReachabilityProber {
    probe: Arc<dyn LatencyProbe>,
    config: ProberConfig,
}

impl ReachabilityProber {
    /// Create a prober over a measurement service
    pub fn new(probe: Arc<dyn LatencyProbe>, config: ProberConfig) -> Self {
        Self { probe, config }
    }

    /// Get the prober configuration
    pub fn config(&self) -> &ProberConfig {
        &self.config
    }

    /// Probe a batch and return the accepted candidates
    pub async fn filter(&self, candidates: &[String]) -> Vec<String> {
        self.probe_batch(candidates).await.passed()
    }

    /// Probe a batch of candidates
    ///
    /// Never fails: measurement errors only shape individual verdicts. An
    /// empty batch returns immediately without touching the service.
    pub async fn probe_batch(&self, candidates: &[String]) -> ProbeReport {
        let candidates = dedup_candidates(candidates);
        if candidates.is_empty() {
            return ProbeReport::default();
        }

        let deadline = Instant::now() + self.config.batch_timeout(candidates.len());
        self.run_batch(candidates, deadline).await
    }

    /// Probe a batch that must finish by `deadline`
    ///
    /// Like [`ReachabilityProber::probe_batch`], but with a caller-chosen
    /// deadline instead of the one derived from the configuration. Candidates
    /// still running at the deadline are aborted and left out of the report.
    pub async fn probe_batch_until(&self, candidates: &[String], deadline: Instant) -> ProbeReport {
        let candidates = dedup_candidates(candidates);
        if candidates.is_empty() {
            return ProbeReport::default();
        }
        self.run_batch(candidates, deadline).await
    }

    async fn run_batch(&self, candidates: Vec<String>, deadline: Instant) -> ProbeReport {
        let batch_timeout = deadline.saturating_duration_since(Instant::now());
        debug!(
            "Probing {} candidates via {} (concurrency {}, deadline {:?})",
            candidates.len(),
            self.probe.probe_name(),
            self.config.concurrency,
            batch_timeout
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut join_set: JoinSet<ProbeOutcome> = JoinSet::new();
        let mut outcomes = Vec::with_capacity(candidates.len());

        let dispatch_and_collect = async {
            for candidate in candidates.iter() {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!("Prober semaphore closed: {}", e);
                        break;
                    }
                };
                sleep(self.config.pacing()).await;

                let probe = Arc::clone(&self.probe);
                let config = self.config.clone();
                let candidate = candidate.clone();
                join_set.spawn(async move {
                    let _permit = permit;
                    probe_candidate(probe.as_ref(), &candidate, &config).await
                });

                while let Some(joined) = join_set.try_join_next() {
                    collect(joined, &mut outcomes);
                }
            }

            while let Some(joined) = join_set.join_next().await {
                collect(joined, &mut outcomes);
            }
        };

        let timed_out = timeout_at(deadline, dispatch_and_collect).await.is_err();
        if timed_out {
            while let Some(joined) = join_set.try_join_next() {
                collect(joined, &mut outcomes);
            }
            join_set.abort_all();
            warn!(
                "Probe batch deadline of {:?} expired; {} of {} candidates finished",
                batch_timeout,
                outcomes.len(),
                candidates.len()
            );
        }

        let report = ProbeReport { outcomes, timed_out };
        info!(
            "Probe batch done: {} passed, {} too slow, {} anomalous, {} unreachable",
            report.count(ProbeVerdict::is_pass),
            report.count(|v| matches!(v, ProbeVerdict::TooSlow { .. })),
            report.count(|v| matches!(v, ProbeVerdict::Anomalous { .. })),
            report.count(|v| matches!(v, ProbeVerdict::Unreachable)),
        );
        report
    }
}

fn collect(joined: Result<ProbeOutcome, JoinError>, outcomes: &mut Vec<ProbeOutcome>) {
    match joined {
        Ok(outcome) => outcomes.push(outcome),
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!("Probe task panicked: {}", e),
    }
}

/// Run the retry loop for one candidate and classify it
async fn probe_candidate(
    probe: &dyn LatencyProbe,
    candidate: &str,
    config: &ProberConfig,
) -> ProbeOutcome {
    let mut attempts = 0;
    let mut last_latency = None;

    loop {
        attempts += 1;
        let latency = measure_once(probe, candidate, config).await;
        if latency.is_some() {
            last_latency = latency;
        }

        match next_step(latency, attempts, config) {
            Step::Finish => break,
            Step::Retry => {
                debug!(
                    "{}: attempt {}/{} gave {:?}, retrying in {:?}",
                    candidate,
                    attempts,
                    config.max_attempts,
                    latency,
                    config.retry_backoff()
                );
                sleep(config.retry_backoff()).await;
            }
        }
    }

    let verdict = ProbeVerdict::classify(last_latency, config);
    match verdict {
        ProbeVerdict::Pass { latency_ms } => {
            info!("{} accepted at {:.1}ms after {} attempt(s)", candidate, latency_ms, attempts);
        }
        ProbeVerdict::TooSlow { latency_ms } => {
            warn!("{} rejected: {:.1}ms is too slow", candidate, latency_ms);
        }
        ProbeVerdict::Anomalous { latency_ms } => {
            warn!(
                "{} rejected: {:.1}ms is below {}ms after {} attempts",
                candidate, latency_ms, config.lower_ms, attempts
            );
        }
        ProbeVerdict::Unreachable => {
            warn!("{} rejected: unreachable after {} attempts", candidate, attempts);
        }
    }

    ProbeOutcome {
        candidate: candidate.to_string(),
        verdict,
        attempts,
    }
}

/// One measurement under the request timeout
///
/// Returns the usable latency, or `None` for a failed attempt.
async fn measure_once(probe: &dyn LatencyProbe, candidate: &str, config: &ProberConfig) -> Option<f64> {
    match timeout(config.request_timeout(), probe.measure(candidate)).await {
        Ok(Ok(result)) => {
            let latency = result.usable_latency();
            if latency.is_none() {
                debug!("{}: measurement returned {:?}", candidate, result.status);
            }
            latency
        }
        Ok(Err(e)) => {
            debug!("{}: measurement failed: {}", candidate, e);
            None
        }
        Err(_) => {
            debug!("{}: measurement timed out after {:?}", candidate, config.request_timeout());
            None
        }
    }
}

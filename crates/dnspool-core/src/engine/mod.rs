//! Pool engine
//!
//! The PoolEngine drives one maintenance pass end to end:
//! - Collects candidates from every CandidateSource and merges them
//! - Probes each routing line through the ReachabilityProber
//! - Adds the accepted candidates through the RecordPoolSynchronizer
//! - Emits events for monitoring/logging
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ CandidateSources │─── CandidateSet (merged, refined) ───┐
//! └──────────────────┘                                      │
//!                                                           ▼
//!                                                  ┌──────────────┐
//!                                                  │  PoolEngine  │  per line, in order
//!                                                  └──────────────┘
//!                                                           │
//!         ┌─────────────────────────────┬───────────────────┴─────────┐
//!         ▼                             ▼                             ▼
//! ┌────────────────────┐   ┌────────────────────────┐         ┌─────────────┐
//! │ ReachabilityProber │──►│ RecordPoolSynchronizer │         │   Events    │
//! │ (filter)           │   │ (add, evict)           │         │  (notify)   │
//! └────────────────────┘   └────────────────────────┘         └─────────────┘
//! ```
//!
//! A pass never fails as a whole: collection, probe and provider errors are
//! contained, logged and counted in the [`RunReport`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::config::{CandidateFilterConfig, PoolConfig, RecordType, RoutingLine};
use crate::error::Result;
use crate::prober::{ProbeReport, ReachabilityProber};
use crate::sync::{LineReport, RecordPoolSynchronizer, SyncReport};
use crate::traits::{CandidateSet, CandidateSource, LatencyProbe, NoopCandidateSource, RecordStore};

/// Events emitted by the PoolEngine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A pass started
    RunStarted {
        /// Lines to process
        lines: Vec<RoutingLine>,
    },

    /// Candidates were collected and refined
    CandidatesCollected {
        /// Total (line, candidate) entries after refinement
        total: usize,
        /// Sources that failed
        failed_sources: usize,
    },

    /// A line's candidates were probed
    LineProbed {
        /// Line that was probed
        line: RoutingLine,
        /// Candidates submitted to the prober
        candidates: usize,
        /// Candidates inside the acceptance window
        passed: usize,
        /// Whether the batch deadline cut the probe short
        timed_out: bool,
    },

    /// A line's accepted candidates were written
    LineSynchronized {
        /// Line that was synchronized
        line: RoutingLine,
        /// Records added
        created: usize,
        /// Records deleted to make room
        evicted: usize,
        /// Store operations that failed
        failed: usize,
    },

    /// A pass finished
    RunFinished {
        /// Records added across all lines
        created: usize,
        /// Records evicted across all lines
        evicted: usize,
        /// Failed store operations across all lines
        failed: usize,
    },

    /// Engine stopped
    Stopped {
        /// Why the engine stopped
        reason: String,
    },
}

/// Probe and sync result of one line
#[derive(Debug, Clone, PartialEq)]
pub struct LineRun {
    /// Routing line
    pub line: RoutingLine,
    /// Prober report
    pub probe: ProbeReport,
    /// Synchronizer report
    pub sync: LineReport,
}

/// Result of one maintenance pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Candidate sources that failed to deliver
    pub collection_failures: usize,
    /// Per-line results, in configuration order
    pub lines: Vec<LineRun>,
}

impl RunReport {
    /// Synchronizer view of the pass
    pub fn sync_report(&self) -> SyncReport {
        SyncReport {
            lines: self.lines.iter().map(|run| run.sync.clone()).collect(),
        }
    }

    /// Candidates accepted across all lines
    pub fn passed(&self) -> usize {
        self.lines.iter().map(|run| run.probe.passed().len()).sum()
    }
}

/// Orchestrator of candidate collection, probing and synchronization
///
/// ## Lifecycle
///
/// 1. Create with [`PoolEngine::new()`]
/// 2. Call [`PoolEngine::run_once()`] for a single pass, or
///    [`PoolEngine::run()`] to repeat every `run_interval_secs`
/// 3. `run()` returns on Ctrl-C
///
/// The event channel is bounded; when it is full, events are dropped with a
/// warning rather than blocking a pass.
pub struct PoolEngine {
    /// Candidate sources, merged in order
    sources: Vec<Box<dyn CandidateSource>>,

    /// Latency filter
    prober: ReachabilityProber,

    /// Record writer
    synchronizer: RecordPoolSynchronizer,

    /// Host record to maintain
    host_record: String,

    /// Lines to maintain, in order
    lines: Vec<RoutingLine>,

    /// Candidate post-processing
    filter: CandidateFilterConfig,

    /// Record type, also selects the address family of candidates
    record_type: RecordType,

    /// Interval between passes; zero runs once
    run_interval: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl PoolEngine {
    /// Create a new pool engine
    ///
    /// # Parameters
    ///
    /// - `sources`: Candidate sources (empty means a no-op source)
    /// - `probe`: Measurement service
    /// - `store`: Record store, `None` when credentials are missing
    /// - `config`: Pool configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        mut sources: Vec<Box<dyn CandidateSource>>,
        probe: Arc<dyn LatencyProbe>,
        store: Option<Arc<dyn RecordStore>>,
        config: PoolConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        if sources.is_empty() {
            sources.push(Box::new(NoopCandidateSource));
        }
        if store.is_none() {
            error!("No record store configured; accepted candidates will not be written");
        }

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity.max(1));

        let engine = Self {
            sources,
            prober: ReachabilityProber::new(probe, config.prober),
            synchronizer: RecordPoolSynchronizer::new(store, config.domain, config.sync.clone()),
            host_record: config.host_record,
            lines: config.lines,
            filter: config.candidates,
            record_type: config.sync.record_type,
            run_interval: Duration::from_secs(config.engine.run_interval_secs),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run a single maintenance pass
    pub async fn run_once(&self) -> RunReport {
        self.emit_event(EngineEvent::RunStarted {
            lines: self.lines.clone(),
        });

        let (candidates, collection_failures) = self.collect().await;
        self.emit_event(EngineEvent::CandidatesCollected {
            total: candidates.len(),
            failed_sources: collection_failures,
        });

        let mut report = RunReport {
            collection_failures,
            lines: Vec::with_capacity(self.lines.len()),
        };

        for &line in &self.lines {
            let line_candidates = candidates.get(line);
            if line_candidates.is_empty() {
                warn!("No candidates for line {}", line);
            }

            let probe = self.prober.probe_batch(line_candidates).await;
            let passed = probe.passed();
            self.emit_event(EngineEvent::LineProbed {
                line,
                candidates: line_candidates.len(),
                passed: passed.len(),
                timed_out: probe.timed_out,
            });

            let sync = self
                .synchronizer
                .sync_line(&self.host_record, line, &passed)
                .await;
            self.emit_event(EngineEvent::LineSynchronized {
                line,
                created: sync.created,
                evicted: sync.evicted,
                failed: sync.failed(),
            });

            report.lines.push(LineRun { line, probe, sync });
        }

        let totals = report.sync_report();
        info!(
            "Pass finished: {} accepted, {} created, {} evicted, {} failed",
            report.passed(),
            totals.created(),
            totals.evicted(),
            totals.failed()
        );
        self.emit_event(EngineEvent::RunFinished {
            created: totals.created(),
            evicted: totals.evicted(),
            failed: totals.failed(),
        });

        report
    }

    /// Fetch and merge every source, then refine
    async fn collect(&self) -> (CandidateSet, usize) {
        let mut merged = CandidateSet::new();
        let mut failures = 0;

        for source in &self.sources {
            match source.fetch().await {
                Ok(set) => {
                    info!("Source {} returned {} candidates", source.source_name(), set.len());
                    merged = merged.merge(set);
                }
                Err(e) => {
                    error!("Candidate source {} failed: {}", source.source_name(), e);
                    failures += 1;
                }
            }
        }

        (merged.refine(&self.filter, self.record_type), failures)
    }

    /// Run the engine
    ///
    /// Runs one pass, then repeats every `run_interval_secs` until Ctrl-C.
    /// With an interval of zero it returns after the first pass.
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine with a controlled shutdown signal
    ///
    /// Behaves like [`PoolEngine::run()`] but stops when `shutdown_rx`
    /// resolves instead of on Ctrl-C. Intended for tests and embedding.
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        if self.run_interval.is_zero() {
            self.run_once().await;
            self.emit_event(EngineEvent::Stopped {
                reason: "Single run completed".to_string(),
            });
            return Ok(());
        }

        let mut interval = tokio::time::interval(self.run_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        if let Some(mut rx) = shutdown_rx {
            // Test mode: wait for provided shutdown signal
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.run_once().await;
                    }
                    _ = &mut rx => {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        } else {
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.run_once().await;
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
        Ok(())
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_event_serialization() {
        let event = EngineEvent::LineProbed {
            line: RoutingLine::Mobile,
            candidates: 10,
            passed: 9,
            timed_out: false,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "line_probed");
        assert_eq!(json["line"], "mobile");
        assert_eq!(event.clone(), event);
    }

    #[test]
    fn test_run_report_totals() {
        let report = RunReport::default();
        assert_eq!(report.passed(), 0);
        assert_eq!(report.sync_report().created(), 0);
    }
}

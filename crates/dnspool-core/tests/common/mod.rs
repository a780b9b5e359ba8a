//! Test doubles and common utilities for contract tests
//!
//! The doubles record every call so tests can assert on remote traffic
//! (call counts, concurrency, order) as well as on results.

#![allow(dead_code)]

use async_trait::async_trait;
use dnspool_core::config::{ProberConfig, RoutingLine, SyncConfig};
use dnspool_core::error::{Error, Result};
use dnspool_core::store::MemoryRecordStore;
use dnspool_core::traits::{
    CandidateSet, CandidateSource, DnsRecord, LatencyProbe, ListQuery, NewRecord, ProbeResult,
    RecordPage, RecordStore,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted answer of the measurement service
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    /// Measured latency in milliseconds
    Latency(f64),
    /// Service reports the candidate as failed
    Failed,
    /// Transport error
    Error,
    /// Never answers within any reasonable timeout
    Hang,
}

/// A LatencyProbe answering from per-candidate scripts
///
/// Each call consumes the next reply of the candidate's script; the last
/// reply repeats once the script is exhausted.
pub struct ScriptedProbe {
    scripts: HashMap<String, Vec<Reply>>,
    default: Reply,
    delay: Duration,
    calls: Mutex<HashMap<String, usize>>,
    total_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProbe {
    /// Every candidate answers `default` unless scripted otherwise
    pub fn new(default: Reply) -> Self {
        Self {
            scripts: HashMap::new(),
            default,
            delay: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            total_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Script the replies of one candidate
    pub fn script(mut self, candidate: &str, replies: Vec<Reply>) -> Self {
        self.scripts.insert(candidate.to_string(), replies);
        self
    }

    /// Hold every call for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Total measure() calls
    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// measure() calls for one candidate
    pub fn calls_for(&self, candidate: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(candidate)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of concurrent measure() calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, candidate: &str) -> Reply {
        let mut calls = self.calls.lock().unwrap();
        let count = calls.entry(candidate.to_string()).or_insert(0);
        let index = *count;
        *count += 1;

        match self.scripts.get(candidate) {
            Some(script) if !script.is_empty() => script[index.min(script.len() - 1)],
            _ => self.default,
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LatencyProbe for ScriptedProbe {
    async fn measure(&self, candidate: &str) -> Result<ProbeResult> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let reply = self.next_reply(candidate);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match reply {
            Reply::Latency(ms) => Ok(ProbeResult::ok(candidate, ms)),
            Reply::Failed => Ok(ProbeResult::error(candidate)),
            Reply::Error => Err(Error::probe("connection refused")),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ProbeResult::timeout(candidate))
            }
        }
    }

    fn probe_name(&self) -> &'static str {
        "scripted"
    }
}

/// A remote call observed by [`RecordingStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List { page_number: usize, record_type: Option<String> },
    Create { value: String, line: RoutingLine },
    Delete { record_id: String },
}

/// A RecordStore backed by [`MemoryRecordStore`] that logs every call
///
/// Individual operations can be made to fail.
pub struct RecordingStore {
    inner: MemoryRecordStore,
    calls: Mutex<Vec<StoreCall>>,
    fail_create: Mutex<HashSet<String>>,
    fail_delete: bool,
    fail_list: bool,
}

impl RecordingStore {
    pub fn new(inner: MemoryRecordStore) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            fail_create: Mutex::new(HashSet::new()),
            fail_delete: false,
            fail_list: false,
        }
    }

    /// Make create_record() fail for this value
    pub fn failing_create(self, value: &str) -> Self {
        self.fail_create.lock().unwrap().insert(value.to_string());
        self
    }

    /// Make every delete_record() fail
    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    /// Make every list_records() fail
    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Mutating calls only, in order
    pub fn writes(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, StoreCall::List { .. }))
            .collect()
    }

    pub fn memory(&self) -> &MemoryRecordStore {
        &self.inner
    }

    fn log(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn list_records(&self, query: &ListQuery) -> Result<RecordPage> {
        self.log(StoreCall::List {
            page_number: query.page_number,
            record_type: query.record_type.map(|t| t.as_str().to_string()),
        });
        if self.fail_list {
            return Err(Error::http("HTTP 503: service unavailable"));
        }
        self.inner.list_records(query).await
    }

    async fn create_record(&self, record: &NewRecord) -> Result<String> {
        self.log(StoreCall::Create {
            value: record.value.clone(),
            line: record.line,
        });
        if self.fail_create.lock().unwrap().contains(&record.value) {
            return Err(Error::provider("recording", "QuotaExceeded"));
        }
        self.inner.create_record(record).await
    }

    async fn delete_record(&self, domain: &str, record_id: &str) -> Result<()> {
        self.log(StoreCall::Delete {
            record_id: record_id.to_string(),
        });
        if self.fail_delete {
            return Err(Error::provider("recording", "Forbidden.RAM"));
        }
        self.inner.delete_record(domain, record_id).await
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// A RecordStore whose listing never ends
///
/// Every page is full and the reported total is unbounded; records are
/// fresh on every page.
pub struct EndlessStore {
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
}

impl EndlessStore {
    pub fn new() -> Self {
        Self {
            list_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for EndlessStore {
    async fn list_records(&self, query: &ListQuery) -> Result<RecordPage> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
        let records = (0..query.page_size)
            .map(|i| {
                record(
                    &format!("{}-{}", call, i),
                    query.host_record.as_deref().unwrap_or("cf"),
                    &format!("10.{}.0.{}", call % 250, i % 250),
                    "mobile",
                    Some((call * 1000 + i) as i64),
                )
            })
            .collect();
        Ok(RecordPage {
            records,
            total_count: usize::MAX,
        })
    }

    async fn create_record(&self, _record: &NewRecord) -> Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok("endless".to_string())
    }

    async fn delete_record(&self, _domain: &str, _record_id: &str) -> Result<()> {
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "endless"
    }
}

/// A CandidateSource that always fails
pub struct FailingSource;

#[async_trait]
impl CandidateSource for FailingSource {
    async fn fetch(&self) -> Result<CandidateSet> {
        Err(Error::collection("HTTP 502 from upstream list"))
    }

    fn source_name(&self) -> &str {
        "failing"
    }
}

/// Build a provider record
pub fn record(id: &str, host: &str, value: &str, line: &str, ts: Option<i64>) -> DnsRecord {
    DnsRecord {
        record_id: id.to_string(),
        host_record: host.to_string(),
        record_type: "A".to_string(),
        value: value.to_string(),
        line: line.to_string(),
        create_timestamp: ts,
    }
}

/// Prober settings scaled down for tests
pub fn fast_prober_config() -> ProberConfig {
    ProberConfig {
        concurrency: 4,
        pacing_ms: 1,
        max_attempts: 3,
        retry_backoff_ms: 5,
        request_timeout_ms: 200,
        batch_slack_ms: 2_000,
        ..ProberConfig::default()
    }
}

/// Synchronizer settings with a given capacity
pub fn sync_config(capacity: usize) -> SyncConfig {
    SyncConfig {
        capacity,
        ..SyncConfig::default()
    }
}

/// Candidate strings 10.0.0.1 .. 10.0.0.n
pub fn candidates(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("10.0.0.{}", i)).collect()
}

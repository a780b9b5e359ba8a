//! Record pool synchronizer
//!
//! Keeps each (host record, routing line) bucket at the provider within
//! capacity while adding accepted values:
//!
//! 1. **Existence check**: list (host record, type) and look for the exact
//!    (host record, type, value, line) tuple; present means nothing to do
//! 2. **Bucket listing**: every record of the host record, across all pages,
//!    narrowed to the routing line
//! 3. **Capacity enforcement**: evict the oldest records until one slot is free
//! 4. **Insertion**: create the record
//!
//! Buckets are re-derived from the provider on every call; nothing is cached.
//! Every remote failure is contained in the returned [`SyncOutcome`].

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{RoutingLine, SyncConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::traits::{DnsRecord, ListQuery, NewRecord, RecordStore};

/// Step of an add-value cycle that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    /// Existence check listing
    Lookup,
    /// Full bucket listing
    Listing,
    /// Deleting the oldest record
    Eviction,
    /// Creating the new record
    Creation,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncStage::Lookup => "lookup",
            SyncStage::Listing => "listing",
            SyncStage::Eviction => "eviction",
            SyncStage::Creation => "creation",
        };
        f.write_str(name)
    }
}

/// A contained failure of one add-value cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    /// Error classification
    pub kind: ErrorKind,
    /// Step that failed
    pub stage: SyncStage,
    /// Error message
    pub message: String,
}

impl SyncFailure {
    fn new(stage: SyncStage, err: &Error) -> Self {
        Self {
            kind: err.kind(),
            stage,
            message: err.to_string(),
        }
    }
}

/// Result of adding one value to a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The exact record already exists
    AlreadyPresent,
    /// The record was created
    Created {
        /// Provider-assigned id of the new record
        record_id: String,
        /// Records evicted to make room, oldest first
        evicted: Vec<DnsRecord>,
    },
    /// No record store is configured
    Skipped,
    /// A remote call failed
    Failed(SyncFailure),
}

/// Per-line aggregate of add-value outcomes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineReport {
    /// Routing line
    pub line: RoutingLine,
    /// Values submitted
    pub attempted: usize,
    /// Records created
    pub created: usize,
    /// Values already present
    pub already_present: usize,
    /// Records evicted
    pub evicted: usize,
    /// Values skipped for lack of a store
    pub skipped: usize,
    /// Failures, in submission order
    pub failures: Vec<SyncFailure>,
}

impl LineReport {
    fn new(line: RoutingLine) -> Self {
        Self {
            line,
            attempted: 0,
            created: 0,
            already_present: 0,
            evicted: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, outcome: SyncOutcome) {
        self.attempted += 1;
        match outcome {
            SyncOutcome::AlreadyPresent => self.already_present += 1,
            SyncOutcome::Created { evicted, .. } => {
                self.created += 1;
                self.evicted += evicted.len();
            }
            SyncOutcome::Skipped => self.skipped += 1,
            SyncOutcome::Failed(failure) => self.failures.push(failure),
        }
    }

    /// Number of failed values
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Failures of a given kind
    pub fn failed_with(&self, kind: ErrorKind) -> usize {
        self.failures.iter().filter(|f| f.kind == kind).count()
    }
}

/// Aggregate over every synchronized line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// One report per line, in processing order
    pub lines: Vec<LineReport>,
}

impl SyncReport {
    /// Total records created
    pub fn created(&self) -> usize {
        self.lines.iter().map(|l| l.created).sum()
    }

    /// Total records evicted
    pub fn evicted(&self) -> usize {
        self.lines.iter().map(|l| l.evicted).sum()
    }

    /// Total failed values
    pub fn failed(&self) -> usize {
        self.lines.iter().map(LineReport::failed).sum()
    }
}

/// Capacity-aware record pool writer
pub struct RecordPoolSynchronizer {
    store: Option<Arc<dyn RecordStore>>,
    domain: String,
    config: SyncConfig,
}

impl RecordPoolSynchronizer {
    /// Create a synchronizer
    ///
    /// A `None` store turns every operation into a logged no-op.
    pub fn new(
        store: Option<Arc<dyn RecordStore>>,
        domain: impl Into<String>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            domain: domain.into(),
            config,
        }
    }

    /// Whether a record store is configured
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Get the synchronizer configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Add every value to a line's bucket, in order
    pub async fn sync_line(&self, host_record: &str, line: RoutingLine, values: &[String]) -> LineReport {
        let mut report = LineReport::new(line);
        for value in values {
            let outcome = self.add_value(host_record, line, value).await;
            report.record(outcome);
        }
        info!(
            "{} {}: {} created, {} present, {} evicted, {} failed",
            host_record,
            line,
            report.created,
            report.already_present,
            report.evicted,
            report.failed()
        );
        report
    }

    /// Synchronize several lines sequentially
    pub async fn sync_all<'a, I>(&self, host_record: &str, lines: I) -> SyncReport
    where
        I: IntoIterator<Item = (RoutingLine, &'a [String])>,
    {
        let mut report = SyncReport::default();
        for (line, values) in lines {
            report.lines.push(self.sync_line(host_record, line, values).await);
        }
        report
    }

    /// Add one value to the (host record, line) bucket
    pub async fn add_value(&self, host_record: &str, line: RoutingLine, value: &str) -> SyncOutcome {
        let Some(store) = self.store.as_deref() else {
            error!(
                "No record store configured, cannot add {} ({} {})",
                value, host_record, line
            );
            return SyncOutcome::Skipped;
        };

        let record_type = self.config.record_type;

        let typed = ListQuery::new(self.domain.clone(), 1, self.config.page_size)
            .with_host_record(host_record)
            .with_record_type(record_type);
        match self.collect_pages(store, typed).await {
            Ok(records) => {
                if records
                    .iter()
                    .any(|r| r.matches(host_record, record_type, value, line))
                {
                    info!("Record {} {} {} already exists", host_record, value, line);
                    return SyncOutcome::AlreadyPresent;
                }
            }
            Err(e) => return self.fail(SyncStage::Lookup, &e, host_record, value, line),
        }

        let bucket = match self.list_bucket(host_record, line).await {
            Ok(bucket) => bucket,
            Err(e) => return self.fail(SyncStage::Listing, &e, host_record, value, line),
        };

        let evicted = match self.make_room(store, bucket, host_record, line).await {
            Ok(evicted) => evicted,
            Err(e) => return self.fail(SyncStage::Eviction, &e, host_record, value, line),
        };

        let new_record = NewRecord {
            domain: self.domain.clone(),
            host_record: host_record.to_string(),
            record_type,
            value: value.to_string(),
            line,
            ttl: self.config.ttl,
        };
        match store.create_record(&new_record).await {
            Ok(record_id) => {
                info!(
                    "Added {} record {} -> {} on {} (id {})",
                    record_type, host_record, value, line, record_id
                );
                SyncOutcome::Created { record_id, evicted }
            }
            Err(e) => self.fail(SyncStage::Creation, &e, host_record, value, line),
        }
    }

    /// Every record of a (host record, line) bucket, all types
    pub async fn list_bucket(&self, host_record: &str, line: RoutingLine) -> Result<Vec<DnsRecord>> {
        let query = ListQuery::new(self.domain.clone(), 1, self.config.page_size)
            .with_host_record(host_record);
        let records = self.list_all(query).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.in_bucket(host_record, line))
            .collect())
    }

    /// List every page matching a query
    ///
    /// The query's `page_number` is ignored. A host record filter is applied
    /// exactly, whatever the provider does with it.
    pub async fn list_all(&self, query: ListQuery) -> Result<Vec<DnsRecord>> {
        let Some(store) = self.store.as_deref() else {
            error!("No record store configured, cannot list {}", query.domain);
            return Err(Error::config("No record store configured"));
        };
        self.collect_pages(store, query).await
    }

    async fn collect_pages(&self, store: &dyn RecordStore, mut query: ListQuery) -> Result<Vec<DnsRecord>> {
        let page_size = query.page_size.max(1);
        query.page_size = page_size;

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut fetched = 0;

        for page_number in 1..=self.config.max_pages {
            query.page_number = page_number;
            let page = store.list_records(&query).await?;
            let page_len = page.records.len();
            fetched += page_len;
            debug!(
                "Listed page {} of {}: {} records (total {})",
                page_number, query.domain, page_len, page.total_count
            );

            records.extend(page.records.into_iter().filter(|r| {
                seen.insert(r.record_id.clone())
                    && query.host_record.as_deref().is_none_or(|host| r.host_record == host)
            }));

            if page_len < page_size || fetched >= page.total_count {
                return Ok(records);
            }
            if page_number == self.config.max_pages {
                warn!(
                    "Stopped listing {} after {} pages; {} of {} records seen",
                    query.domain, page_number, fetched, page.total_count
                );
            }
        }

        Ok(records)
    }

    /// Evict the oldest records until the bucket has a free slot
    async fn make_room(
        &self,
        store: &dyn RecordStore,
        mut bucket: Vec<DnsRecord>,
        host_record: &str,
        line: RoutingLine,
    ) -> Result<Vec<DnsRecord>> {
        let mut evicted = Vec::new();
        while bucket.len() >= self.config.capacity {
            let Some(index) = oldest_index(&bucket) else {
                break;
            };
            let oldest = bucket.remove(index);
            warn!(
                "Bucket {} {} is full ({} >= {}), deleting oldest record {} ({}, created {:?})",
                host_record,
                line,
                bucket.len() + 1,
                self.config.capacity,
                oldest.record_id,
                oldest.value,
                oldest.create_timestamp
            );
            store.delete_record(&self.domain, &oldest.record_id).await?;
            evicted.push(oldest);
        }
        Ok(evicted)
    }

    fn fail(
        &self,
        stage: SyncStage,
        err: &Error,
        host_record: &str,
        value: &str,
        line: RoutingLine,
    ) -> SyncOutcome {
        error!(
            "Failed to add {} {} {} during {}: {}",
            host_record, value, line, stage, err
        );
        SyncOutcome::Failed(SyncFailure::new(stage, err))
    }
}

/// Index of the record with the smallest creation timestamp
///
/// Records without a timestamp count as oldest; ties go to the first one.
fn oldest_index(records: &[DnsRecord]) -> Option<usize> {
    records
        .iter()
        .enumerate()
        .min_by_key(|(_, r)| r.create_timestamp.unwrap_or(i64::MIN))
        .map(|(index, _)| index)
}

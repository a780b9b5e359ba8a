// # Memory Record Store
//
// In-memory implementation of RecordStore.
//
// ## Purpose
//
// Behaves like a paginated provider record store without any network:
// - host record filters are keyword (substring) matches, as at Alibaba Cloud
// - listings report the total number of matching records
// - identical (host record, type, value, line) records are rejected
//
// Useful for testing and for dry runs of the whole pipeline.
//
// ## Crash Behavior
//
// - All records are lost on restart

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::traits::record_store::{
    DnsRecord, ListQuery, NewRecord, RecordPage, RecordStore, RecordStoreFactory,
};
use crate::Error;

#[derive(Debug, Default)]
struct Inner {
    /// Records per domain, in creation order
    domains: HashMap<String, Vec<DnsRecord>>,
    /// Last issued creation timestamp
    last_timestamp: i64,
}

/// In-memory record store implementation
///
/// Creation timestamps are wall-clock milliseconds, forced to be strictly
/// increasing so that "oldest" is always well defined.
///
/// # Example
///
/// ```rust,no_run
/// use dnspool_core::store::MemoryRecordStore;
/// use dnspool_core::traits::{ListQuery, RecordStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryRecordStore::new();
///     let page = store.list_records(&ListQuery::new("example.com", 1, 500)).await?;
///     assert_eq!(page.total_count, 0);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<Inner>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryRecordStore {
    /// Create a new empty memory record store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records for one domain
    ///
    /// Records keep their ids and timestamps.
    pub fn with_records(domain: &str, records: Vec<DnsRecord>) -> Self {
        let last_timestamp = records
            .iter()
            .filter_map(|record| record.create_timestamp)
            .max()
            .unwrap_or(0);
        let max_id = records
            .iter()
            .filter_map(|record| record.record_id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        let mut domains = HashMap::new();
        domains.insert(domain.to_string(), records);

        Self {
            inner: Arc::new(RwLock::new(Inner {
                domains,
                last_timestamp,
            })),
            next_id: Arc::new(AtomicU64::new(max_id + 1)),
        }
    }

    /// Snapshot of all records of a domain, in creation order
    pub async fn records(&self, domain: &str) -> Vec<DnsRecord> {
        let guard = self.inner.read().await;
        guard.domains.get(domain).cloned().unwrap_or_default()
    }

    /// Get the number of records of a domain
    pub async fn len(&self, domain: &str) -> usize {
        let guard = self.inner.read().await;
        guard.domains.get(domain).map(Vec::len).unwrap_or(0)
    }

    /// Check if a domain has no records
    pub async fn is_empty(&self, domain: &str) -> bool {
        self.len(domain).await == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list_records(&self, query: &ListQuery) -> Result<RecordPage, Error> {
        if query.page_number == 0 || query.page_size == 0 {
            return Err(Error::invalid_input("page number and page size start at 1"));
        }

        let guard = self.inner.read().await;
        let matching: Vec<&DnsRecord> = guard
            .domains
            .get(&query.domain)
            .into_iter()
            .flatten()
            .filter(|record| {
                query
                    .host_record
                    .as_deref()
                    .is_none_or(|keyword| record.host_record.contains(keyword))
            })
            .filter(|record| {
                query
                    .record_type
                    .is_none_or(|record_type| record.record_type == record_type.as_str())
            })
            .collect();

        let records = matching
            .iter()
            .skip((query.page_number - 1) * query.page_size)
            .take(query.page_size)
            .map(|record| (*record).clone())
            .collect();

        Ok(RecordPage {
            records,
            total_count: matching.len(),
        })
    }

    async fn create_record(&self, record: &NewRecord) -> Result<String, Error> {
        let mut guard = self.inner.write().await;

        let duplicate = guard
            .domains
            .get(&record.domain)
            .into_iter()
            .flatten()
            .any(|existing| {
                existing.matches(&record.host_record, record.record_type, &record.value, record.line)
            });
        if duplicate {
            return Err(Error::provider("memory", "DomainRecordDuplicate"));
        }

        let timestamp = chrono::Utc::now()
            .timestamp_millis()
            .max(guard.last_timestamp + 1);
        guard.last_timestamp = timestamp;

        let record_id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        guard
            .domains
            .entry(record.domain.clone())
            .or_default()
            .push(DnsRecord {
                record_id: record_id.clone(),
                host_record: record.host_record.clone(),
                record_type: record.record_type.as_str().to_string(),
                value: record.value.clone(),
                line: record.line.as_str().to_string(),
                create_timestamp: Some(timestamp),
            });

        Ok(record_id)
    }

    async fn delete_record(&self, domain: &str, record_id: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let records = guard
            .domains
            .get_mut(domain)
            .ok_or_else(|| Error::not_found(format!("domain {}", domain)))?;

        let position = records
            .iter()
            .position(|record| record.record_id == record_id)
            .ok_or_else(|| Error::not_found(format!("record {}", record_id)))?;
        records.remove(position);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for creating memory record stores
pub struct MemoryStoreFactory;

impl RecordStoreFactory for MemoryStoreFactory {
    fn create(&self, config: &StoreConfig) -> Result<Box<dyn RecordStore>, Error> {
        match config {
            StoreConfig::Memory => Ok(Box::new(MemoryRecordStore::new())),
            _ => Err(Error::config("Invalid config for memory record store")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecordType, RoutingLine};
    use tokio_test::{assert_err, assert_ok};

    fn new_record(host: &str, value: &str, line: RoutingLine) -> NewRecord {
        NewRecord {
            domain: "example.com".to_string(),
            host_record: host.to_string(),
            record_type: RecordType::A,
            value: value.to_string(),
            line,
            ttl: 600,
        }
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryRecordStore::new();
        assert!(store.is_empty("example.com").await);

        let id = assert_ok!(
            store
                .create_record(&new_record("cf", "1.1.1.1", RoutingLine::Mobile))
                .await
        );
        assert_eq!(store.len("example.com").await, 1);

        assert_ok!(store.delete_record("example.com", &id).await);
        assert!(store.is_empty("example.com").await);
        let missing = assert_err!(store.delete_record("example.com", &id).await);
        assert!(matches!(missing, crate::Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_store_rejects_duplicates() {
        let store = MemoryRecordStore::new();
        let record = new_record("cf", "1.1.1.1", RoutingLine::Mobile);

        assert_ok!(store.create_record(&record).await);
        let duplicate = assert_err!(store.create_record(&record).await);
        assert!(duplicate.to_string().contains("DomainRecordDuplicate"));

        // same value on another line is a different record
        store
            .create_record(&new_record("cf", "1.1.1.1", RoutingLine::Unicom))
            .await
            .unwrap();
        assert_eq!(store.len("example.com").await, 2);
    }

    #[tokio::test]
    async fn test_memory_store_pagination_and_keyword_filter() {
        let store = MemoryRecordStore::new();
        for i in 0..5 {
            store
                .create_record(&new_record("cf", &format!("1.1.1.{}", i), RoutingLine::Mobile))
                .await
                .unwrap();
        }
        store
            .create_record(&new_record("cf-api", "2.2.2.2", RoutingLine::Mobile))
            .await
            .unwrap();

        let query = ListQuery::new("example.com", 3, 2).with_host_record("cf");
        let page = store.list_records(&query).await.unwrap();
        assert_eq!(page.total_count, 6, "keyword filter also matches cf-api");
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[1].host_record, "cf-api");

        let beyond = store
            .list_records(&ListQuery::new("example.com", 4, 2))
            .await
            .unwrap();
        assert!(beyond.records.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_timestamps_increase() {
        let store = MemoryRecordStore::new();
        for i in 0..3 {
            store
                .create_record(&new_record("cf", &format!("1.1.1.{}", i), RoutingLine::Telecom))
                .await
                .unwrap();
        }

        let timestamps: Vec<i64> = store
            .records("example.com")
            .await
            .iter()
            .filter_map(|record| record.create_timestamp)
            .collect();
        assert!(timestamps.windows(2).all(|pair| pair[0] < pair[1]));
    }
}

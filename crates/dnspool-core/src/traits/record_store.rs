// # Record Store Trait
//
// Defines the interface to the remote DNS provider's record store.
//
// ## Implementations
//
// - Alibaba Cloud DNS: `dnspool-provider-alidns` crate
// - In-memory: `dnspool_core::store::MemoryRecordStore`
//
// ## Usage
//
// ```rust,ignore
// use dnspool_core::RecordStore;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* RecordStore implementation */;
//
//     let page = store
//         .list_records(&ListQuery::new("example.com", 1, 500).with_host_record("cf"))
//         .await?;
//     println!("{} of {} records", page.records.len(), page.total_count);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::config::{RecordType, RoutingLine};

/// An address record as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DnsRecord {
    /// Provider-assigned record id
    pub record_id: String,
    /// Host record (RR), e.g. "www" or "@"
    pub host_record: String,
    /// Record type as reported by the provider (e.g. "A")
    pub record_type: String,
    /// Record value (the address)
    pub value: String,
    /// Routing line code as reported by the provider (e.g. "mobile")
    pub line: String,
    /// Creation time in milliseconds since the epoch, when the provider reports it
    pub create_timestamp: Option<i64>,
}

impl DnsRecord {
    /// Whether this record belongs to the (host record, routing line) bucket
    pub fn in_bucket(&self, host_record: &str, line: RoutingLine) -> bool {
        self.host_record == host_record && self.line == line.as_str()
    }

    /// Whether this record is exactly the (host record, type, value, line) tuple
    pub fn matches(
        &self,
        host_record: &str,
        record_type: RecordType,
        value: &str,
        line: RoutingLine,
    ) -> bool {
        self.in_bucket(host_record, line)
            && self.record_type.eq_ignore_ascii_case(record_type.as_str())
            && self.value == value
    }
}

/// One page of a record listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPage {
    /// Records on this page
    pub records: Vec<DnsRecord>,
    /// Total number of matching records reported by the provider
    pub total_count: usize,
}

/// Parameters of a single list request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Root domain
    pub domain: String,
    /// 1-based page number
    pub page_number: usize,
    /// Requested page size
    pub page_size: usize,
    /// Host record filter (providers may treat it as a keyword, not an exact match)
    pub host_record: Option<String>,
    /// Record type filter
    pub record_type: Option<RecordType>,
}

impl ListQuery {
    /// Create an unfiltered query
    pub fn new(domain: impl Into<String>, page_number: usize, page_size: usize) -> Self {
        Self {
            domain: domain.into(),
            page_number,
            page_size,
            host_record: None,
            record_type: None,
        }
    }

    /// Filter by host record
    pub fn with_host_record(mut self, host_record: impl Into<String>) -> Self {
        self.host_record = Some(host_record.into());
        self
    }

    /// Filter by record type
    pub fn with_record_type(mut self, record_type: RecordType) -> Self {
        self.record_type = Some(record_type);
        self
    }
}

/// A record to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    /// Root domain
    pub domain: String,
    /// Host record (RR)
    pub host_record: String,
    /// Record type
    pub record_type: RecordType,
    /// Record value
    pub value: String,
    /// Routing line
    pub line: RoutingLine,
    /// Time-to-live in seconds
    pub ttl: u32,
}

/// Trait for record store clients
///
/// Each method is a single remote call. Clients do not retry, cache, or
/// decide anything: capacity handling, idempotency and pagination loops are
/// owned by the `RecordPoolSynchronizer`.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// List one page of records
    async fn list_records(&self, query: &ListQuery) -> Result<RecordPage, crate::Error>;

    /// Create a record, returning the provider-assigned record id
    async fn create_record(&self, record: &NewRecord) -> Result<String, crate::Error>;

    /// Delete a record by id
    async fn delete_record(&self, domain: &str, record_id: &str) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing record stores from configuration
pub trait RecordStoreFactory: Send + Sync {
    /// Create a RecordStore instance from configuration
    ///
    /// Fails with a configuration error when credentials are missing.
    fn create(
        &self,
        config: &crate::config::StoreConfig,
    ) -> Result<Box<dyn RecordStore>, crate::Error>;
}

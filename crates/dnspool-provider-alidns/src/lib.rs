// # Alibaba Cloud DNS Record Store
//
// RecordStore implementation backed by the Alibaba Cloud DNS OpenAPI
// (version 2015-01-09).
//
// - One HTTP request per trait call; no retries, no caching
// - Requests signed with ACS3-HMAC-SHA256
// - HTTP timeout configured (30 seconds)
// - Status codes and API error codes mapped onto core error variants
// - Dry-run mode: listings are real, writes are logged and skipped
//
// ## Security Requirements
//
// - The access key secret NEVER appears in logs or Debug output
// - Credentials come from configuration only
// - The factory fails fast when either credential is empty
//
// ## API Reference
//
// - DescribeDomainRecords: DomainName, PageNumber, PageSize (max 500),
//   RRKeyWord (keyword match), Type
// - AddDomainRecord: DomainName, RR, Type, Value, Line, TTL
// - DeleteDomainRecord: RecordId

mod response;
mod sign;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dnspool_core::config::StoreConfig;
use dnspool_core::traits::{
    DnsRecord, ListQuery, NewRecord, RecordPage, RecordStore, RecordStoreFactory,
};
use dnspool_core::{Error, ProviderRegistry, Result};

use response::{AddDomainRecordResponse, ApiError, DescribeDomainRecordsResponse};
use sign::{RequestContext, sign_request};

/// Public API endpoint
pub const DEFAULT_ENDPOINT: &str = "alidns.aliyuncs.com";

/// API version of the DNS OpenAPI
pub const API_VERSION: &str = "2015-01-09";

/// Largest page the API accepts
pub const MAX_PAGE_SIZE: usize = 500;

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER: &str = "alidns";

/// Alibaba Cloud DNS record store
///
/// # Dry-Run Mode
///
/// When `dry_run` is true the store still lists records, but create and
/// delete calls only log the request they would have made.
///
/// # Security
///
/// The Debug implementation does NOT expose the access key secret.
pub struct AliDnsRecordStore {
    /// Access key id
    access_key_id: String,

    /// Access key secret
    /// ⚠️ NEVER log this value
    access_key_secret: String,

    /// Scheme and authority, e.g. "https://alidns.aliyuncs.com"
    base_url: String,

    /// Authority signed as the `host` header
    host: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// If true, perform listings but skip writes
    dry_run: bool,
}

impl std::fmt::Debug for AliDnsRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliDnsRecordStore")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl AliDnsRecordStore {
    /// Create a new store
    ///
    /// # Parameters
    ///
    /// - `endpoint`: API host (`alidns.cn-hangzhou.aliyuncs.com`) or a full
    ///   base URL (`http://127.0.0.1:8080`); `None` uses [`DEFAULT_ENDPOINT`]
    /// - `dry_run`: If true, skip writes
    pub fn new(
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
        endpoint: Option<&str>,
        dry_run: bool,
    ) -> Result<Self> {
        let access_key_id = access_key_id.into();
        let access_key_secret = access_key_secret.into();
        if access_key_id.is_empty() || access_key_secret.is_empty() {
            return Err(Error::config(
                "Alibaba Cloud access key id and secret are required",
            ));
        }

        let (base_url, host) = parse_endpoint(endpoint.unwrap_or(DEFAULT_ENDPOINT))?;

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            access_key_id,
            access_key_secret,
            base_url,
            host,
            client,
            dry_run,
        })
    }

    /// Whether writes are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Send one signed RPC call and return the response body
    async fn call(
        &self,
        method: reqwest::Method,
        action: &str,
        params: BTreeMap<&str, String>,
    ) -> Result<String> {
        let date = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let nonce = uuid::Uuid::new_v4().to_string();
        let ctx = RequestContext {
            method: method.as_str(),
            host: &self.host,
            action,
            version: API_VERSION,
            date: &date,
            nonce: &nonce,
        };
        let signed = sign_request(&self.access_key_id, &self.access_key_secret, &ctx, &params)?;

        let url = format!("{}/?{}", self.base_url, signed.query);
        tracing::debug!("{} {} ({})", method, action, self.base_url);

        let mut request = self.client.request(method, &url);
        for (name, value) in &signed.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("{} request failed: {}", action, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read {} response: {}", action, e)))?;

        if !status.is_success() {
            return Err(map_api_error(action, status.as_u16(), &body));
        }
        Ok(body)
    }
}

/// Split an endpoint into (base URL, signed host)
fn parse_endpoint(endpoint: &str) -> Result<(String, String)> {
    let endpoint = endpoint.trim();
    let (scheme, authority) = match endpoint.split_once("://") {
        Some((scheme, authority)) if scheme == "http" || scheme == "https" => (scheme, authority),
        Some((scheme, _)) => {
            return Err(Error::config(format!("Unsupported endpoint scheme: {}", scheme)));
        }
        None => ("https", endpoint),
    };

    let host = authority.trim_end_matches('/');
    if host.is_empty() || host.contains('/') || host.contains("://") || host.ends_with(':') {
        return Err(Error::config(format!("Invalid endpoint: {}", endpoint)));
    }
    Ok((format!("{}://{}", scheme, host), host.to_string()))
}

/// Map a failed response onto a core error
///
/// The API reports most failures as HTTP 400 with a `Code`, so the code is
/// consulted before the status.
fn map_api_error(action: &str, status: u16, body: &str) -> Error {
    let api_error = serde_json::from_str::<ApiError>(body).ok();
    let code = api_error.as_ref().map(|e| e.code.as_str()).unwrap_or("");
    let detail = match &api_error {
        Some(e) => format!("{}: {}", e.code, e.message),
        None => format!("HTTP {}", status),
    };

    if status == 401
        || status == 403
        || code.starts_with("InvalidAccessKeyId")
        || code.starts_with("SignatureDoesNotMatch")
        || code.starts_with("Forbidden")
    {
        return Error::auth(format!("{} rejected credentials ({})", action, detail));
    }
    if status == 429 || code.starts_with("Throttling") {
        return Error::rate_limited(format!("{} throttled ({})", action, detail));
    }
    if status == 404 || code == "DomainRecordNotBelongToUser" || code == "InvalidRR.NoExist" {
        return Error::not_found(format!("{} ({})", action, detail));
    }
    if (500..=599).contains(&status) {
        return Error::provider(PROVIDER, format!("{} server error (transient): {}", action, detail));
    }
    Error::provider(PROVIDER, format!("{} failed: {}", action, detail))
}

#[async_trait]
impl RecordStore for AliDnsRecordStore {
    /// DescribeDomainRecords
    async fn list_records(&self, query: &ListQuery) -> Result<RecordPage> {
        if query.page_size == 0 || query.page_size > MAX_PAGE_SIZE {
            return Err(Error::invalid_input(format!(
                "Page size must be within 1..={}, got {}",
                MAX_PAGE_SIZE, query.page_size
            )));
        }

        let mut params = BTreeMap::new();
        params.insert("DomainName", query.domain.clone());
        params.insert("PageNumber", query.page_number.to_string());
        params.insert("PageSize", query.page_size.to_string());
        if let Some(host) = &query.host_record {
            params.insert("RRKeyWord", host.clone());
        }
        if let Some(record_type) = query.record_type {
            params.insert("Type", record_type.as_str().to_string());
        }

        let body = self
            .call(reqwest::Method::GET, "DescribeDomainRecords", params)
            .await?;
        let parsed: DescribeDomainRecordsResponse = serde_json::from_str(&body).map_err(|e| {
            Error::provider(PROVIDER, format!("Invalid DescribeDomainRecords response: {}", e))
        })?;

        Ok(RecordPage {
            total_count: parsed.total_count,
            records: parsed
                .domain_records
                .record
                .into_iter()
                .map(DnsRecord::from)
                .collect(),
        })
    }

    /// AddDomainRecord
    async fn create_record(&self, record: &NewRecord) -> Result<String> {
        let mut params = BTreeMap::new();
        params.insert("DomainName", record.domain.clone());
        params.insert("RR", record.host_record.clone());
        params.insert("Type", record.record_type.as_str().to_string());
        params.insert("Value", record.value.clone());
        params.insert("Line", record.line.as_str().to_string());
        params.insert("TTL", record.ttl.to_string());

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would add {} record {}.{} -> {} on {}",
                record.record_type,
                record.host_record,
                record.domain,
                record.value,
                record.line
            );
            return Ok(format!("dry-run-{}", uuid::Uuid::new_v4()));
        }

        let body = self
            .call(reqwest::Method::POST, "AddDomainRecord", params)
            .await?;
        let parsed: AddDomainRecordResponse = serde_json::from_str(&body).map_err(|e| {
            Error::provider(PROVIDER, format!("Invalid AddDomainRecord response: {}", e))
        })?;
        Ok(parsed.record_id)
    }

    /// DeleteDomainRecord
    async fn delete_record(&self, domain: &str, record_id: &str) -> Result<()> {
        if self.dry_run {
            tracing::info!("[DRY-RUN] Would delete record {} of {}", record_id, domain);
            return Ok(());
        }

        let mut params = BTreeMap::new();
        params.insert("RecordId", record_id.to_string());
        self.call(reqwest::Method::POST, "DeleteDomainRecord", params)
            .await?;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating Alibaba Cloud DNS record stores
///
/// Dry-run mode is enabled by `DNSPOOL_MODE=dry-run`.
pub struct AliDnsFactory;

impl RecordStoreFactory for AliDnsFactory {
    fn create(&self, config: &StoreConfig) -> Result<Box<dyn RecordStore>> {
        match config {
            StoreConfig::Alidns {
                access_key_id,
                access_key_secret,
                endpoint,
            } => {
                let dry_run = std::env::var("DNSPOOL_MODE")
                    .unwrap_or_default()
                    .eq_ignore_ascii_case("dry-run");

                if dry_run {
                    tracing::warn!("Alibaba Cloud DNS store running in DRY-RUN mode - no changes will be made");
                }

                Ok(Box::new(AliDnsRecordStore::new(
                    access_key_id.clone(),
                    access_key_secret.clone(),
                    endpoint.as_deref(),
                    dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Alibaba Cloud DNS store")),
        }
    }
}

/// Register the Alibaba Cloud DNS store with a registry
///
/// # Example
///
/// ```rust
/// use dnspool_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// dnspool_provider_alidns::register(&registry);
/// assert!(registry.has_record_store("alidns"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_record_store(PROVIDER, Box::new(AliDnsFactory));
}

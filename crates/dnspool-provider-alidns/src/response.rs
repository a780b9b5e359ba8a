// Response bodies of the DNS OpenAPI.

use dnspool_core::traits::DnsRecord;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DescribeDomainRecordsResponse {
    #[serde(default)]
    pub total_count: usize,
    #[serde(default)]
    pub domain_records: DomainRecords,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DomainRecords {
    #[serde(default)]
    pub record: Vec<ApiRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ApiRecord {
    pub record_id: String,
    #[serde(rename = "RR")]
    pub rr: String,
    #[serde(rename = "Type")]
    pub record_type: String,
    pub value: String,
    #[serde(default)]
    pub line: String,
    #[serde(default)]
    pub create_timestamp: Option<i64>,
}

impl From<ApiRecord> for DnsRecord {
    fn from(record: ApiRecord) -> Self {
        DnsRecord {
            record_id: record.record_id,
            host_record: record.rr,
            record_type: record.record_type,
            value: record.value,
            line: record.line,
            create_timestamp: record.create_timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AddDomainRecordResponse {
    pub record_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ApiError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

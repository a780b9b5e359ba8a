//! Core traits for the DNS pool
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`CandidateSource`]: Discover candidate addresses
//! - [`LatencyProbe`]: Measure a candidate through an external service
//! - [`RecordStore`]: List, create and delete records at the DNS provider

pub mod candidate_source;
pub mod latency_probe;
pub mod record_store;

pub use candidate_source::{
    CandidateSet, CandidateSource, CandidateSourceFactory, NoopCandidateSource,
    StaticCandidateSource, StaticSourceFactory, dedup_candidates,
};
pub use latency_probe::{
    LatencyProbe, LatencyProbeFactory, ProbeResult, ProbeStatus, parse_latency,
};
pub use record_store::{DnsRecord, ListQuery, NewRecord, RecordPage, RecordStore, RecordStoreFactory};

// # dnspool-core
//
// Core library for a capacity-bounded DNS record pool.
//
// ## Architecture Overview
//
// Candidate addresses are collected, filtered by measured latency, and added
// to per-line record buckets at a DNS provider whose plan caps the number of
// records per bucket:
// - **CandidateSource**: Trait for collaborators that discover candidates
// - **LatencyProbe**: Trait for the external latency measurement service
// - **RecordStore**: Trait for the provider's paginated record API
// - **ReachabilityProber**: Bounded-concurrency latency filter with retries
// - **RecordPoolSynchronizer**: Idempotent insert with oldest-first eviction
// - **PoolEngine**: Orchestrates collect → probe → synchronize per line
// - **ProviderRegistry**: Plugin-based registry for adapters
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from adapters
// 2. **Contained Failures**: Errors stop at one candidate or one record
// 3. **Plugin-Based**: Adapters are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod engine;
pub mod error;
pub mod prober;
pub mod registry;
pub mod store;
pub mod sync;
pub mod traits;

// Re-export core types for convenience
pub use config::{
    LossCriterion, PoolConfig, ProbeConfig, ProberConfig, RecordType, RoutingLine, SourceConfig,
    StoreConfig, SyncConfig,
};
pub use engine::{EngineEvent, PoolEngine, RunReport};
pub use error::{Error, ErrorKind, Result};
pub use prober::{ProbeOutcome, ProbeReport, ProbeVerdict, ReachabilityProber};
pub use registry::ProviderRegistry;
pub use store::MemoryRecordStore;
pub use sync::{LineReport, RecordPoolSynchronizer, SyncFailure, SyncOutcome, SyncReport, SyncStage};
pub use traits::{CandidateSet, CandidateSource, DnsRecord, LatencyProbe, ProbeResult, RecordStore};

//! Plugin-based provider registry
//!
//! Record stores, latency probes and candidate sources are registered by name
//! at startup and instantiated from configuration, so the daemon never
//! branches on adapter types itself.
//!
//! ## Registration
//!
//! Adapter crates expose a `register` function:
//!
//! ```rust,ignore
//! // In dnspool-provider-alidns
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_record_store("alidns", Box::new(AliDnsFactory));
//! }
//! ```
//!
//! The in-memory store and the static candidate source are built in.

use crate::config::{ProbeConfig, SourceConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::store::MemoryStoreFactory;
use crate::traits::{
    CandidateSource, CandidateSourceFactory, LatencyProbe, LatencyProbeFactory, RecordStore,
    RecordStoreFactory, StaticSourceFactory,
};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Factories<F> = RwLock<HashMap<String, Box<F>>>;

fn read<F: ?Sized>(map: &Factories<F>) -> RwLockReadGuard<'_, HashMap<String, Box<F>>> {
    map.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<F: ?Sized>(map: &Factories<F>) -> RwLockWriteGuard<'_, HashMap<String, Box<F>>> {
    map.write().unwrap_or_else(PoisonError::into_inner)
}

fn sorted_names<F: ?Sized>(map: &Factories<F>) -> Vec<String> {
    let mut names: Vec<String> = read(map).keys().cloned().collect();
    names.sort();
    names
}

/// Registry of adapter factories keyed by type name
///
/// ## Thread Safety
///
/// Interior mutability through `RwLock`: concurrent lookups, exclusive
/// registration.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered record store factories
    record_stores: Factories<dyn RecordStoreFactory>,

    /// Registered latency probe factories
    probes: Factories<dyn LatencyProbeFactory>,

    /// Registered candidate source factories
    sources: Factories<dyn CandidateSourceFactory>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in `memory` store and `static` source
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_record_store("memory", Box::new(MemoryStoreFactory));
        registry.register_candidate_source("static", Box::new(StaticSourceFactory));
        registry
    }

    /// Register a record store factory
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use dnspool_core::registry::ProviderRegistry;
    /// # use dnspool_core::store::MemoryStoreFactory;
    /// let registry = ProviderRegistry::new();
    /// registry.register_record_store("memory", Box::new(MemoryStoreFactory));
    /// assert!(registry.has_record_store("memory"));
    /// ```
    pub fn register_record_store(
        &self,
        name: impl Into<String>,
        factory: Box<dyn RecordStoreFactory>,
    ) {
        write(&self.record_stores).insert(name.into(), factory);
    }

    /// Register a latency probe factory
    pub fn register_probe(&self, name: impl Into<String>, factory: Box<dyn LatencyProbeFactory>) {
        write(&self.probes).insert(name.into(), factory);
    }

    /// Register a candidate source factory
    pub fn register_candidate_source(
        &self,
        name: impl Into<String>,
        factory: Box<dyn CandidateSourceFactory>,
    ) {
        write(&self.sources).insert(name.into(), factory);
    }

    /// Create a record store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn RecordStore>)`: Created store
    /// - `Err(Error)`: Unknown store type, or the factory rejected the
    ///   configuration (e.g. missing credentials)
    pub fn create_record_store(&self, config: &StoreConfig) -> Result<Box<dyn RecordStore>> {
        let store_type = config.type_name();
        let stores = read(&self.record_stores);
        let factory = stores
            .get(store_type)
            .ok_or_else(|| Error::config(format!("Unknown record store type: {}", store_type)))?;
        factory.create(config)
    }

    /// Create a latency probe from configuration
    pub fn create_probe(&self, config: &ProbeConfig) -> Result<Box<dyn LatencyProbe>> {
        let probe_type = config.type_name();
        let probes = read(&self.probes);
        let factory = probes
            .get(probe_type)
            .ok_or_else(|| Error::config(format!("Unknown probe type: {}", probe_type)))?;
        factory.create(config)
    }

    /// Create a candidate source from configuration
    pub fn create_candidate_source(&self, config: &SourceConfig) -> Result<Box<dyn CandidateSource>> {
        let source_type = match config {
            SourceConfig::HttpText { .. } => "http_text",
            SourceConfig::HttpJson { .. } => "http_json",
            SourceConfig::Static { .. } => "static",
        };
        let sources = read(&self.sources);
        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown candidate source type: {}", source_type)))?;
        factory.create(config)
    }

    /// List registered record store types, sorted
    pub fn list_record_stores(&self) -> Vec<String> {
        sorted_names(&self.record_stores)
    }

    /// List registered probe types, sorted
    pub fn list_probes(&self) -> Vec<String> {
        sorted_names(&self.probes)
    }

    /// List registered candidate source types, sorted
    pub fn list_candidate_sources(&self) -> Vec<String> {
        sorted_names(&self.sources)
    }

    /// Check if a record store type is registered
    pub fn has_record_store(&self, name: &str) -> bool {
        read(&self.record_stores).contains_key(name)
    }

    /// Check if a probe type is registered
    pub fn has_probe(&self, name: &str) -> bool {
        read(&self.probes).contains_key(name)
    }

    /// Check if a candidate source type is registered
    pub fn has_candidate_source(&self, name: &str) -> bool {
        read(&self.sources).contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectingProbeFactory;

    impl LatencyProbeFactory for RejectingProbeFactory {
        fn create(&self, _config: &ProbeConfig) -> Result<Box<dyn LatencyProbe>> {
            Err(Error::config("probe endpoint missing"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = ProviderRegistry::new();
        assert!(!registry.has_probe("http"));

        registry.register_probe("http", Box::new(RejectingProbeFactory));
        assert!(registry.has_probe("http"));
        assert_eq!(registry.list_probes(), vec!["http".to_string()]);
        assert!(registry.create_probe(&ProbeConfig::default()).is_err());
    }

    #[test]
    fn test_builtins() {
        let registry = ProviderRegistry::with_builtins();
        assert!(registry.has_record_store("memory"));
        assert!(registry.has_candidate_source("static"));

        let store = registry.create_record_store(&StoreConfig::Memory).unwrap();
        assert_eq!(store.provider_name(), "memory");
    }

    #[test]
    fn test_unknown_type_is_config_error() {
        let registry = ProviderRegistry::new();
        let err = registry
            .create_record_store(&StoreConfig::default())
            .err()
            .unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}

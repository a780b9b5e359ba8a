// # HTTP Adapters
//
// This crate provides the HTTP-facing collaborators of the DNS pool:
//
// - [`HttpLatencyProbe`]: asks an external measurement service how fast a
//   candidate answers, and normalizes the reply into a `ProbeResult`
// - [`HttpTextCandidateSource`]: fetches a plain-text address list and
//   assigns it to the configured routing lines
// - [`HttpJsonCandidateSource`]: fetches a JSON packet loss report and keeps,
//   per line, the addresses under that line's loss threshold
//
// None of the adapters retries or paces requests; the prober and the engine own
// that policy.

mod json_source;
mod probe;
mod source;

pub use json_source::{HttpJsonCandidateSource, HttpJsonSourceFactory, select_by_loss};
pub use probe::{HttpLatencyProbe, HttpProbeFactory};
pub use source::{HttpTextCandidateSource, HttpTextSourceFactory, split_addresses};

use dnspool_core::ProviderRegistry;

/// Register the HTTP probe (`http`) and the HTTP sources (`http_text`, `http_json`)
pub fn register(registry: &ProviderRegistry) {
    registry.register_probe("http", Box::new(HttpProbeFactory));
    registry.register_candidate_source("http_text", Box::new(HttpTextSourceFactory));
    registry.register_candidate_source("http_json", Box::new(HttpJsonSourceFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register() {
        let registry = ProviderRegistry::with_builtins();
        register(&registry);

        assert!(registry.has_probe("http"));
        assert!(registry.has_candidate_source("http_text"));
        assert!(registry.has_candidate_source("http_json"));
        assert!(registry.has_candidate_source("static"));
    }
}

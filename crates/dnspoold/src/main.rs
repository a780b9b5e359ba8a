// # dnspoold - DNS Pool Daemon
//
// A THIN integration layer: no probing, pagination or eviction logic lives
// here. The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering adapters and instantiating them from configuration
// 4. Running the pool engine once, or periodically until Ctrl-C
//
// ## Configuration
//
// ### Pool
// - `DNSPOOL_DOMAIN`: Root domain at the provider (required)
// - `DNSPOOL_HOST_RECORD`: Host record whose buckets are maintained (required)
// - `DNSPOOL_LINES`: Routing lines, comma-separated (default: mobile,unicom,telecom)
// - `DNSPOOL_CAPACITY`: Records per bucket (fallback `ALIYUN_PACKAGE_NUM`, default 100)
// - `DNSPOOL_RECORD_TYPE`: A or AAAA (default A)
// - `DNSPOOL_TTL`: TTL of created records in seconds (default 600)
//
// ### Record store
// - `DNSPOOL_STORE_TYPE`: alidns or memory (default alidns)
// - `DNSPOOL_ACCESS_KEY_ID` / `DNSPOOL_ACCESS_KEY_SECRET`
//   (fallbacks `ALIYUN_ACCESS_KEY_ID` / `ALIYUN_ACCESS_KEY_SECRET`)
// - `DNSPOOL_ALIDNS_ENDPOINT`: API endpoint (optional)
// - `DNSPOOL_MODE=dry-run`: list records but skip writes
//
// ### Probing
// - `DNSPOOL_PROBE_ENDPOINT`: Measurement service URL, `{target}` placeholder
//   or `?target=` (required)
// - `DNSPOOL_PROBE_STATUS_FIELD` / `DNSPOOL_PROBE_LATENCY_FIELD`
// - `DNSPOOL_CONCURRENCY`: Measurements in flight (default 15)
//
// ### Candidates
// - `DNSPOOL_SOURCE_URLS`: Plain-text address lists, comma-separated
// - `DNSPOOL_LOSS_REPORT_URLS`: JSON packet loss reports, comma-separated;
//   carrier lines keep addresses under 3.5% (mobile, telecom) or 0.5% (unicom)
// - `DNSPOOL_EXCLUDED_PREFIXES`: Address prefixes never probed
//
// ### Engine
// - `DNSPOOL_INTERVAL_SECS`: Seconds between passes; 0 runs once (default 0)
// - `DNSPOOL_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export DNSPOOL_DOMAIN=example.com
// export DNSPOOL_HOST_RECORD=cf
// export ALIYUN_ACCESS_KEY_ID=LTAI...
// export ALIYUN_ACCESS_KEY_SECRET=...
// export DNSPOOL_PROBE_ENDPOINT='https://probe.example/check/{target}'
// export DNSPOOL_SOURCE_URLS=https://ips.example/v4.txt
//
// dnspoold
// ```

use anyhow::{Context, Result};
use dnspool_core::config::{
    CandidateFilterConfig, LossCriterion, PoolConfig, ProbeConfig, RecordType, RoutingLine,
    SourceConfig, StoreConfig,
};
use std::collections::HashMap;
use dnspool_core::{CandidateSource, EngineEvent, PoolEngine, ProviderRegistry, RecordStore};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum PoolExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<PoolExitCode> for ExitCode {
    fn from(code: PoolExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
///
/// Not `Debug`: it holds the access key secret.
struct Config {
    pool: PoolConfig,
    log_level: Level,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    /// Build the configuration from a variable lookup
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let first = |keys: &[&str]| keys.iter().find_map(|&key| var(key));

        let domain = var("DNSPOOL_DOMAIN").context("DNSPOOL_DOMAIN is required")?;
        let host_record = var("DNSPOOL_HOST_RECORD").context("DNSPOOL_HOST_RECORD is required")?;
        let mut pool = PoolConfig::new(domain.trim(), host_record.trim());

        if let Some(lines) = var("DNSPOOL_LINES") {
            pool.lines = split_list(&lines)
                .iter()
                .map(|line| line.parse::<RoutingLine>())
                .collect::<Result<Vec<_>, _>>()?;
        }

        if let Some(capacity) = first(&["DNSPOOL_CAPACITY", "ALIYUN_PACKAGE_NUM"]) {
            pool.sync.capacity = parse_number("DNSPOOL_CAPACITY", &capacity)?;
        }
        if let Some(record_type) = var("DNSPOOL_RECORD_TYPE") {
            pool.sync.record_type = match record_type.trim().to_uppercase().as_str() {
                "A" => RecordType::A,
                "AAAA" => RecordType::Aaaa,
                other => anyhow::bail!("DNSPOOL_RECORD_TYPE '{}' is not valid. Valid: A, AAAA", other),
            };
        }
        if let Some(ttl) = var("DNSPOOL_TTL") {
            pool.sync.ttl = parse_number("DNSPOOL_TTL", &ttl)?;
        }

        pool.store = match var("DNSPOOL_STORE_TYPE").as_deref().map(str::trim) {
            None | Some("alidns") => StoreConfig::Alidns {
                access_key_id: first(&["DNSPOOL_ACCESS_KEY_ID", "ALIYUN_ACCESS_KEY_ID"])
                    .unwrap_or_default(),
                access_key_secret: first(&["DNSPOOL_ACCESS_KEY_SECRET", "ALIYUN_ACCESS_KEY_SECRET"])
                    .unwrap_or_default(),
                endpoint: var("DNSPOOL_ALIDNS_ENDPOINT"),
            },
            Some("memory") => StoreConfig::Memory,
            Some(other) => anyhow::bail!(
                "DNSPOOL_STORE_TYPE '{}' is not supported. Supported types: alidns, memory",
                other
            ),
        };

        let endpoint = var("DNSPOOL_PROBE_ENDPOINT").context("DNSPOOL_PROBE_ENDPOINT is required")?;
        if let ProbeConfig::Http {
            endpoint: configured,
            status_field,
            latency_field,
            ..
        } = &mut pool.probe
        {
            *configured = endpoint;
            if let Some(field) = var("DNSPOOL_PROBE_STATUS_FIELD") {
                *status_field = field;
            }
            if let Some(field) = var("DNSPOOL_PROBE_LATENCY_FIELD") {
                *latency_field = field;
            }
        }
        if let Some(concurrency) = var("DNSPOOL_CONCURRENCY") {
            pool.prober.concurrency = parse_number("DNSPOOL_CONCURRENCY", &concurrency)?;
        }

        pool.sources = var("DNSPOOL_SOURCE_URLS")
            .map(|urls| {
                split_list(&urls)
                    .into_iter()
                    .map(|url| SourceConfig::HttpText {
                        url,
                        lines: pool.lines.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        if let Some(urls) = var("DNSPOOL_LOSS_REPORT_URLS") {
            let criteria = carrier_loss_criteria(&pool.lines);
            pool.sources.extend(split_list(&urls).into_iter().map(|url| SourceConfig::HttpJson {
                url,
                lines: criteria.clone(),
            }));
        }

        if let Some(prefixes) = var("DNSPOOL_EXCLUDED_PREFIXES") {
            pool.candidates = CandidateFilterConfig {
                excluded_prefixes: split_list(&prefixes),
                ..CandidateFilterConfig::default()
            };
        }

        if let Some(interval) = var("DNSPOOL_INTERVAL_SECS") {
            pool.engine.run_interval_secs = parse_number("DNSPOOL_INTERVAL_SECS", &interval)?;
        }

        let log_level = match var("DNSPOOL_LOG_LEVEL")
            .unwrap_or_else(|| "info".to_string())
            .to_lowercase()
            .as_str()
        {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            other => anyhow::bail!(
                "DNSPOOL_LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                other
            ),
        };

        pool.validate()?;
        Ok(Self { pool, log_level })
    }
}

/// Split a comma-separated variable, dropping empty entries
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Loss thresholds of the carrier lines among `lines`
fn carrier_loss_criteria(lines: &[RoutingLine]) -> HashMap<RoutingLine, LossCriterion> {
    lines
        .iter()
        .filter_map(|line| {
            let criterion = match line {
                RoutingLine::Mobile => LossCriterion::new("ydPkgLostRateAvg", 3.5),
                RoutingLine::Unicom => LossCriterion::new("ltPkgLostRateAvg", 0.5),
                RoutingLine::Telecom => LossCriterion::new("dxPkgLostRateAvg", 3.5),
                RoutingLine::Default | RoutingLine::Oversea => return None,
            };
            Some((*line, criterion))
        })
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer. Got: {}", key, raw))
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return PoolExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return PoolExitCode::ConfigError.into();
    }

    info!("Starting dnspoold");
    info!(
        "Maintaining {}.{} on lines {:?}, capacity {}",
        config.pool.host_record, config.pool.domain, config.pool.lines, config.pool.sync.capacity
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return PoolExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let engine = match build_engine(config.pool) {
            Ok(engine) => engine,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return PoolExitCode::ConfigError;
            }
        };

        match engine.run().await {
            Ok(()) => {
                info!("Shutting down dnspoold");
                PoolExitCode::CleanShutdown
            }
            Err(e) => {
                error!("Daemon error: {}", e);
                PoolExitCode::RuntimeError
            }
        }
    })
    .into()
}

fn registry() -> ProviderRegistry {
    let registry = ProviderRegistry::with_builtins();

    #[cfg(feature = "alidns")]
    dnspool_provider_alidns::register(&registry);

    #[cfg(feature = "http")]
    dnspool_http::register(&registry);

    info!(
        "Registered stores {:?}, probes {:?}, sources {:?}",
        registry.list_record_stores(),
        registry.list_probes(),
        registry.list_candidate_sources()
    );
    registry
}

/// Instantiate adapters and the engine, and start logging engine events
fn build_engine(pool: PoolConfig) -> Result<PoolEngine> {
    let registry = registry();

    let probe = registry
        .create_probe(&pool.probe)
        .context("Failed to create latency probe")?;

    let mut sources: Vec<Box<dyn CandidateSource>> = Vec::with_capacity(pool.sources.len());
    for source in &pool.sources {
        sources.push(
            registry
                .create_candidate_source(source)
                .context("Failed to create candidate source")?,
        );
    }
    if sources.is_empty() {
        warn!("No candidate sources configured; passes will be empty");
    }

    // A store that cannot be built disables the write path only
    let store: Option<Arc<dyn RecordStore>> = match registry.create_record_store(&pool.store) {
        Ok(store) => Some(Arc::from(store)),
        Err(e) => {
            error!(
                "Record store {} unavailable, records will not be written: {}",
                pool.store.type_name(),
                e
            );
            None
        }
    };

    let (engine, event_rx) = PoolEngine::new(sources, Arc::from(probe), store, pool)?;

    tokio::spawn(async move {
        let mut events = ReceiverStream::new(event_rx);
        while let Some(event) = events.next().await {
            log_event(&event);
        }
    });

    Ok(engine)
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::RunFinished {
            created,
            evicted,
            failed,
        } if *failed > 0 => warn!(
            "Pass finished with {} failure(s): {} created, {} evicted",
            failed, created, evicted
        ),
        other => info!("Engine event: {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DNSPOOL_DOMAIN", "example.com"),
        ("DNSPOOL_HOST_RECORD", "cf"),
        ("DNSPOOL_PROBE_ENDPOINT", "https://probe.example/{target}"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.pool.sync.capacity, 100);
        assert_eq!(config.pool.lines, RoutingLine::CARRIERS.to_vec());
        assert_eq!(config.pool.store.type_name(), "alidns");
        assert_eq!(config.pool.engine.run_interval_secs, 0);
        assert!(config.pool.sources.is_empty());
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn test_legacy_fallbacks() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("ALIYUN_PACKAGE_NUM", "10"));
        vars.push(("ALIYUN_ACCESS_KEY_ID", "LTAI-legacy"));
        vars.push(("DNSPOOL_ACCESS_KEY_SECRET", "secret"));

        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.pool.sync.capacity, 10);
        match config.pool.store {
            StoreConfig::Alidns {
                access_key_id,
                access_key_secret,
                ..
            } => {
                assert_eq!(access_key_id, "LTAI-legacy");
                assert_eq!(access_key_secret, "secret");
            }
            other => panic!("unexpected store {:?}", other),
        }
    }

    #[test]
    fn test_lines_and_sources() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("DNSPOOL_LINES", "CM, ct"));
        vars.push(("DNSPOOL_SOURCE_URLS", "https://a.example/ips.txt,,https://b.example/ips.txt"));
        vars.push(("DNSPOOL_EXCLUDED_PREFIXES", "172.65."));

        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.pool.lines, vec![RoutingLine::Mobile, RoutingLine::Telecom]);
        assert_eq!(config.pool.sources.len(), 2);
        assert_eq!(config.pool.candidates.excluded_prefixes, vec!["172.65.".to_string()]);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&REQUIRED[..2])).is_err());

        for (key, value) in [
            ("DNSPOOL_CAPACITY", "0"),
            ("DNSPOOL_CAPACITY", "many"),
            ("DNSPOOL_LINES", "satellite"),
            ("DNSPOOL_RECORD_TYPE", "CNAME"),
            ("DNSPOOL_STORE_TYPE", "route53"),
            ("DNSPOOL_LOG_LEVEL", "loud"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.push((key, value));
            assert!(
                Config::from_lookup(lookup(&vars)).is_err(),
                "{}={} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn test_loss_report_sources() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("DNSPOOL_LINES", "unicom,oversea"));
        vars.push(("DNSPOOL_LOSS_REPORT_URLS", "https://report.example/api"));

        let config = Config::from_lookup(lookup(&vars)).unwrap();
        match config.pool.sources.as_slice() {
            [SourceConfig::HttpJson { url, lines }] => {
                assert_eq!(url, "https://report.example/api");
                assert_eq!(lines.len(), 1);
                assert_eq!(lines[&RoutingLine::Unicom], LossCriterion::new("ltPkgLostRateAvg", 0.5));
            }
            other => panic!("unexpected sources {:?}", other),
        }
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" a, ,b,"), vec!["a".to_string(), "b".to_string()]);
        assert!(split_list("").is_empty());
    }
}

// # Candidate Source Trait
//
// Defines the interface for collaborators that discover candidate addresses.
//
// Sources return fresh `CandidateSet`s; the engine merges them explicitly.
// A source that is not configured is represented by `NoopCandidateSource`
// rather than by a missing value.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;

use crate::config::{CandidateFilterConfig, RecordType, RoutingLine};

/// Candidate addresses grouped by routing line
///
/// Each line keeps insertion order and never holds the same address twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    lines: BTreeMap<RoutingLine, Vec<String>>,
}

impl CandidateSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set assigning the same candidates to several lines
    pub fn for_lines<I, S>(lines: &[RoutingLine], candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let candidates: Vec<String> = candidates.into_iter().map(Into::into).collect();
        let mut set = Self::new();
        for line in lines {
            set.extend_line(*line, candidates.iter().cloned());
        }
        set
    }

    /// Add one candidate to a line (ignored if already present)
    pub fn insert(&mut self, line: RoutingLine, candidate: impl Into<String>) {
        let candidate = candidate.into();
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return;
        }
        let entries = self.lines.entry(line).or_default();
        if !entries.iter().any(|existing| existing == candidate) {
            entries.push(candidate.to_string());
        }
    }

    /// Add several candidates to a line
    pub fn extend_line<I, S>(&mut self, line: RoutingLine, candidates: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for candidate in candidates {
            self.insert(line, candidate);
        }
    }

    /// Candidates of one line, in insertion order
    pub fn get(&self, line: RoutingLine) -> &[String] {
        self.lines.get(&line).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Lines that hold at least one candidate
    pub fn lines(&self) -> impl Iterator<Item = RoutingLine> + '_ {
        self.lines
            .iter()
            .filter(|(_, candidates)| !candidates.is_empty())
            .map(|(line, _)| *line)
    }

    /// Total number of (line, candidate) entries
    pub fn len(&self) -> usize {
        self.lines.values().map(Vec::len).sum()
    }

    /// Whether no line holds a candidate
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Union of two sets; `self`'s candidates come first on every line
    pub fn merge(mut self, other: CandidateSet) -> CandidateSet {
        for (line, candidates) in other.lines {
            self.extend_line(line, candidates);
        }
        self
    }

    /// Apply the candidate filter, returning a new set
    ///
    /// Drops entries that are not addresses of the configured record type or
    /// that start with an excluded prefix, sorts each line by address and keeps
    /// the last `max_per_line` entries.
    pub fn refine(&self, filter: &CandidateFilterConfig, record_type: RecordType) -> CandidateSet {
        let mut refined = CandidateSet::new();
        for (line, candidates) in &self.lines {
            let mut kept: Vec<(IpAddr, &String)> = candidates
                .iter()
                .filter(|candidate| {
                    !filter
                        .excluded_prefixes
                        .iter()
                        .any(|prefix| candidate.starts_with(prefix.as_str()))
                })
                .filter_map(|candidate| {
                    let addr: IpAddr = candidate.parse().ok()?;
                    let family_matches = match record_type {
                        RecordType::A => addr.is_ipv4(),
                        RecordType::Aaaa => addr.is_ipv6(),
                    };
                    family_matches.then_some((addr, candidate))
                })
                .collect();

            kept.sort_by_key(|(addr, _)| *addr);
            if let Some(max) = filter.max_per_line {
                let skip = kept.len().saturating_sub(max);
                kept.drain(..skip);
            }
            refined.extend_line(*line, kept.into_iter().map(|(_, candidate)| candidate.clone()));
        }
        refined
    }
}

/// Trait for candidate source collaborators
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Fetch a fresh candidate set
    ///
    /// # Returns
    ///
    /// - `Ok(CandidateSet)`: Possibly empty
    /// - `Err(Error)`: A collection error; the engine logs it and continues
    async fn fetch(&self) -> Result<CandidateSet, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &str;
}

/// Source used when nothing is configured; always yields an empty set
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCandidateSource;

#[async_trait]
impl CandidateSource for NoopCandidateSource {
    async fn fetch(&self) -> Result<CandidateSet, crate::Error> {
        Ok(CandidateSet::new())
    }

    fn source_name(&self) -> &str {
        "noop"
    }
}

/// Source returning a fixed candidate set
#[derive(Debug, Clone)]
pub struct StaticCandidateSource {
    candidates: CandidateSet,
}

impl StaticCandidateSource {
    /// Create a source from a prepared set
    pub fn new(candidates: CandidateSet) -> Self {
        Self { candidates }
    }

    /// Create a source from a per-line map
    pub fn from_map(map: &HashMap<RoutingLine, Vec<String>>) -> Self {
        let mut lines: Vec<_> = map.iter().collect();
        lines.sort_by_key(|(line, _)| **line);

        let mut candidates = CandidateSet::new();
        for (line, entries) in lines {
            candidates.extend_line(*line, entries.iter().cloned());
        }
        Self { candidates }
    }
}

#[async_trait]
impl CandidateSource for StaticCandidateSource {
    async fn fetch(&self) -> Result<CandidateSet, crate::Error> {
        Ok(self.candidates.clone())
    }

    fn source_name(&self) -> &str {
        "static"
    }
}

/// Helper trait for constructing candidate sources from configuration
pub trait CandidateSourceFactory: Send + Sync {
    /// Create a CandidateSource instance from configuration
    fn create(
        &self,
        config: &crate::config::SourceConfig,
    ) -> Result<Box<dyn CandidateSource>, crate::Error>;
}

/// Factory for [`StaticCandidateSource`]
pub struct StaticSourceFactory;

impl CandidateSourceFactory for StaticSourceFactory {
    fn create(
        &self,
        config: &crate::config::SourceConfig,
    ) -> Result<Box<dyn CandidateSource>, crate::Error> {
        match config {
            crate::config::SourceConfig::Static { candidates } => {
                Ok(Box::new(StaticCandidateSource::from_map(candidates)))
            }
            _ => Err(crate::Error::config("Invalid config for static candidate source")),
        }
    }
}

/// Deduplicate candidates keeping the first occurrence
pub fn dedup_candidates<I, S>(candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter_map(|candidate| {
            let candidate = candidate.as_ref().trim();
            (!candidate.is_empty() && seen.insert(candidate.to_string()))
                .then(|| candidate.to_string())
        })
        .collect()
}

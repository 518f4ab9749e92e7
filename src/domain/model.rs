use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::utils::error::{PsicquicError, Result};

/// Last-known reachability of a service, updated only by status checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Reachable,
    Unreachable,
    Unknown,
}

/// One entry in the service registry. Identity is the endpoint URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub url: String,
    pub name: String,
    pub active: bool,
    pub status: ServiceStatus,
    /// MITAB format capability tag advertised by the service.
    pub format_tag: String,
}

impl ServiceEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            active: true,
            status: ServiceStatus::Unknown,
            format_tag: "tab25".to_string(),
        }
    }
}

/// A search query in one of the three PSICQUIC query languages.
///
/// Each variant carries its own payload and knows how to render itself into
/// the query expression sent to a service's `query/` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Raw MIQL expression, passed through as-is.
    Miql(String),
    /// A list of interactor identifiers, OR-combined.
    Interactors(Vec<String>),
    /// Interactions between two species, by taxonomy identifier.
    SpeciesPair { taxon_a: String, taxon_b: String },
}

impl Query {
    /// Renders the query expression. Empty or blank payloads are rejected
    /// here, before any network call is made.
    pub fn to_expression(&self) -> Result<String> {
        match self {
            Query::Miql(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Err(PsicquicError::InvalidQuery {
                        reason: "MIQL query is empty".to_string(),
                    });
                }
                Ok(trimmed.to_string())
            }
            Query::Interactors(ids) => {
                let ids: Vec<&str> = ids
                    .iter()
                    .map(|id| id.trim())
                    .filter(|id| !id.is_empty())
                    .collect();
                if ids.is_empty() {
                    return Err(PsicquicError::InvalidQuery {
                        reason: "interactor list contains no identifiers".to_string(),
                    });
                }
                Ok(ids.join(" OR "))
            }
            Query::SpeciesPair { taxon_a, taxon_b } => {
                if taxon_a.trim().is_empty() || taxon_b.trim().is_empty() {
                    return Err(PsicquicError::InvalidQuery {
                        reason: "species pair requires two taxonomy identifiers".to_string(),
                    });
                }
                Ok(format!(
                    "species:{} AND species:{}",
                    taxon_a.trim(),
                    taxon_b.trim()
                ))
            }
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            Query::Miql(_) => "miql",
            Query::Interactors(_) => "interactors",
            Query::SpeciesPair { .. } => "species-pair",
        }
    }
}

/// Classification of a single target's failure during count or fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    Timeout,
    Http { status: u16 },
    Transport,
    MalformedCount,
    StreamCorrupt,
    Canceled,
}

/// Per-target failure entry, accumulated alongside partial results.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceFailure {
    pub url: String,
    pub kind: FailureKind,
    pub detail: String,
}

impl ServiceFailure {
    pub fn new(url: impl Into<String>, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            detail: detail.into(),
        }
    }
}

/// Result of the count stage: one entry per requested target, either a
/// count or a failure, never fewer, never extras.
#[derive(Debug, Clone, Default)]
pub struct CountReport {
    pub counts: BTreeMap<String, u64>,
    pub failures: BTreeMap<String, ServiceFailure>,
    pub canceled: bool,
}

impl CountReport {
    pub fn entry_count(&self) -> usize {
        self.counts.len() + self.failures.len()
    }

    pub fn total_hits(&self) -> u64 {
        self.counts.values().sum()
    }

    /// URLs of targets that reported at least one matching record. This is
    /// the default selection for the fetch stage.
    pub fn targets_with_hits(&self) -> Vec<String> {
        self.counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(url, _)| url.clone())
            .collect()
    }
}

/// A single normalized interaction record, immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub interactor_a: String,
    pub interactor_b: String,
    pub interaction_type: String,
    /// Name of the service this record came from.
    pub source_service: String,
    /// Opaque bag of secondary MITAB fields (aliases, detection method,
    /// publication, taxons, confidence, ...).
    pub attributes: BTreeMap<String, String>,
}

impl InteractionRecord {
    /// Canonical pair key: interactor ids in sorted order, so A-B and B-A
    /// records land in the same cluster bucket.
    pub fn pair_key(&self) -> String {
        if self.interactor_a <= self.interactor_b {
            format!("{}|{}", self.interactor_a, self.interactor_b)
        } else {
            format!("{}|{}", self.interactor_b, self.interactor_a)
        }
    }

    pub fn is_self_interaction(&self) -> bool {
        self.interactor_a == self.interactor_b
    }
}

/// Accumulating collection of interaction records keyed by canonical pair.
///
/// Records sharing a pair key are all retained, each with its own source
/// tag; de-duplication across services is a documented non-goal. Iteration
/// order is deterministic (sorted pair key, then arrival order).
#[derive(Debug, Clone, Default)]
pub struct InteractionCluster {
    records: BTreeMap<String, Vec<InteractionRecord>>,
    len: usize,
}

impl InteractionCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: InteractionRecord) {
        self.records
            .entry(record.pair_key())
            .or_default()
            .push(record);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn records(&self) -> impl Iterator<Item = &InteractionRecord> {
        self.records.values().flatten()
    }

    /// Distinct interactor identifiers across all records.
    pub fn interactor_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        for record in self.records() {
            ids.insert(record.interactor_a.clone());
            ids.insert(record.interactor_b.clone());
        }
        ids
    }

    /// Distinct source-service tags across all records.
    pub fn source_services(&self) -> BTreeSet<String> {
        self.records()
            .map(|r| r.source_service.clone())
            .collect()
    }
}

/// Whether fetched records are merged into one cluster or kept per service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterMode {
    Separate,
    Merged,
}

/// Result of the fetch stage: zero or more tagged clusters plus per-target
/// failures. An outcome with no clusters and all targets failed is still a
/// valid result.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub clusters: Vec<(String, InteractionCluster)>,
    pub failures: BTreeMap<String, ServiceFailure>,
    pub canceled: bool,
    /// Count of malformed records skipped across all targets.
    pub skipped_records: usize,
}

impl FetchOutcome {
    pub fn record_total(&self) -> usize {
        self.clusters.iter().map(|(_, c)| c.len()).sum()
    }
}

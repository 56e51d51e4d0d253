use crate::{Category, Finding, FindingKind, Metric, Repository, Severity};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdapterStatus {
    Ok,
    /// Some targets analyzed, some failed; findings are kept.
    Partial,
    Failed,
    Timeout,
    /// Probe reported the adapter unavailable.
    Skipped,
}

impl AdapterStatus {
    /// The adapter produced usable findings.
    pub fn produced_output(self) -> bool {
        matches!(self, AdapterStatus::Ok | AdapterStatus::Partial)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AdapterStatus::Ok => "ok",
            AdapterStatus::Partial => "partial",
            AdapterStatus::Failed => "failed",
            AdapterStatus::Timeout => "timeout",
            AdapterStatus::Skipped => "skipped",
        }
    }
}

/// Error taxonomy as recorded on an adapter result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unavailable,
    ConfigMissing,
    Timeout,
    ExternalError,
    Partial,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AdapterFailure {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AdapterCounters {
    /// Findings dropped because their path could not be canonicalized.
    #[serde(default)]
    pub dropped_unresolved_paths: usize,
    /// Findings dropped because they failed schema validation.
    #[serde(default)]
    pub invariant_violations: usize,
    #[serde(default)]
    pub targets_ok: usize,
    #[serde(default)]
    pub targets_failed: usize,
}

impl AdapterCounters {
    pub fn dropped(&self) -> usize {
        self.dropped_unresolved_paths + self.invariant_violations
    }
}

/// Result of an availability probe. Probes never fail; an unavailable
/// adapter is reported here and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AvailabilityReport {
    pub adapter: String,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

impl AvailabilityReport {
    pub fn available(adapter: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            available: true,
            reason: None,
            missing: Vec::new(),
        }
    }

    pub fn unavailable(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            available: false,
            reason: Some(reason.into()),
            missing: Vec::new(),
        }
    }

    pub fn with_missing(mut self, missing: impl Into<String>) -> Self {
        self.missing.push(missing.into());
        self
    }
}

/// One adapter's output for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AdapterResult {
    /// Configured instance id.
    pub adapter_id: String,
    /// Registry key the instance was constructed from.
    pub adapter_type: String,
    pub status: AdapterStatus,
    pub duration_ms: u64,
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AdapterFailure>,
    #[serde(default)]
    pub counters: AdapterCounters,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

impl AdapterResult {
    pub fn empty(
        adapter_id: impl Into<String>,
        adapter_type: impl Into<String>,
        status: AdapterStatus,
    ) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            adapter_type: adapter_type.into(),
            status,
            duration_ms: 0,
            cache_hit: false,
            error: None,
            counters: AdapterCounters::default(),
            findings: Vec::new(),
            metrics: Vec::new(),
        }
    }

    pub fn with_error(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.error = Some(AdapterFailure {
            kind,
            message: message.into(),
        });
        self
    }

    pub fn by_severity(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.severity).or_insert(0) += 1;
        }
        counts
    }

    pub fn by_kind(&self) -> BTreeMap<FindingKind, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn by_category(&self) -> BTreeMap<Category, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.category).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every configured adapter finished with `ok`.
    Clean,
    /// At least one adapter did not finish with `ok`, or none were configured.
    Degraded,
    /// Caller cancellation or configuration error.
    Aborted,
}

impl RunStatus {
    pub fn from_results(results: &[AdapterResult]) -> Self {
        if !results.is_empty() && results.iter().all(|r| r.status == AdapterStatus::Ok) {
            RunStatus::Clean
        } else {
            RunStatus::Degraded
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Clean => "clean",
            RunStatus::Degraded => "degraded",
            RunStatus::Aborted => "aborted",
        }
    }
}

/// One orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisRun {
    pub id: String,
    pub started_at_unix_ms: u64,
    pub finished_at_unix_ms: u64,
    /// Adapter instance ids in declaration order.
    pub adapters: Vec<String>,
    pub options_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_commit: Option<String>,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BundleTotals {
    pub findings: usize,
    pub metrics: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub adapters_ok: usize,
    pub adapters_partial: usize,
    pub adapters_failed: usize,
    pub adapters_timeout: usize,
    pub adapters_skipped: usize,
    pub dropped_findings: usize,
    pub cache_hits: usize,
}

impl BundleTotals {
    pub fn from_results(results: &[AdapterResult]) -> Self {
        let mut totals = BundleTotals::default();
        for result in results {
            totals.findings += result.findings.len();
            totals.metrics += result.metrics.len();
            totals.dropped_findings += result.counters.dropped();
            if result.cache_hit {
                totals.cache_hits += 1;
            }
            for (severity, count) in result.by_severity() {
                *totals.by_severity.entry(severity).or_insert(0) += count;
            }
            match result.status {
                AdapterStatus::Ok => totals.adapters_ok += 1,
                AdapterStatus::Partial => totals.adapters_partial += 1,
                AdapterStatus::Failed => totals.adapters_failed += 1,
                AdapterStatus::Timeout => totals.adapters_timeout += 1,
                AdapterStatus::Skipped => totals.adapters_skipped += 1,
            }
        }
        totals
    }
}

/// The ordered per-adapter output of one run, before correlation.
#[derive(Debug, Clone)]
pub struct AnalysisBundle {
    pub run: AnalysisRun,
    pub repository: Arc<Repository>,
    pub probes: Vec<AvailabilityReport>,
    /// Results in adapter-declaration order.
    pub adapters: Vec<AdapterResult>,
    pub totals: BundleTotals,
}

impl AnalysisBundle {
    pub fn new(
        run: AnalysisRun,
        repository: Arc<Repository>,
        probes: Vec<AvailabilityReport>,
        adapters: Vec<AdapterResult>,
    ) -> Self {
        let totals = BundleTotals::from_results(&adapters);
        Self {
            run,
            repository,
            probes,
            adapters,
            totals,
        }
    }

    /// Findings merged in adapter-declaration order, intra-adapter order kept.
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.adapters.iter().flat_map(|r| r.findings.iter())
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.adapters.iter().flat_map(|r| r.metrics.iter())
    }

    /// Number of adapters whose findings are usable.
    pub fn productive_adapters(&self) -> usize {
        self.adapters
            .iter()
            .filter(|r| r.status.produced_output())
            .count()
    }

    pub fn result(&self, adapter_id: &str) -> Option<&AdapterResult> {
        self.adapters.iter().find(|r| r.adapter_id == adapter_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_run_is_degraded() {
        assert_eq!(RunStatus::from_results(&[]), RunStatus::Degraded);
    }

    #[test]
    fn single_failure_degrades_run() {
        let ok = AdapterResult::empty("a", "a", AdapterStatus::Ok);
        let timeout = AdapterResult::empty("b", "b", AdapterStatus::Timeout);
        assert_eq!(RunStatus::from_results(&[ok.clone()]), RunStatus::Clean);
        assert_eq!(RunStatus::from_results(&[ok, timeout]), RunStatus::Degraded);
    }

    #[test]
    fn totals_count_statuses() {
        let results = vec![
            AdapterResult::empty("a", "a", AdapterStatus::Ok),
            AdapterResult::empty("b", "b", AdapterStatus::Skipped),
            AdapterResult::empty("c", "c", AdapterStatus::Failed),
        ];
        let totals = BundleTotals::from_results(&results);
        assert_eq!(totals.adapters_ok, 1);
        assert_eq!(totals.adapters_skipped, 1);
        assert_eq!(totals.adapters_failed, 1);
        assert_eq!(totals.findings, 0);
    }
}

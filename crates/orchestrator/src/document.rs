use codecity_correlate::{
    CorrelatedModel, Correlation, CorrelationSummary, DeploymentRecommendation, RiskAssessment,
};
use codecity_model::{
    AdapterResult, AdapterStatus, AnalysisRun, AvailabilityReport, FindingKind, RunStatus,
    Severity, Vcs, SCHEMA_VERSION,
};
use codecity_projection::{severity_weight, City, BYTES_PER_LINE};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Overall quality band derived from severity-weighted findings per KLOC.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum Rating {
    A,
    B,
    C,
    D,
    E,
}

impl Rating {
    #[must_use]
    pub fn from_density(density: f64) -> Self {
        if density <= 5.0 {
            Rating::A
        } else if density <= 15.0 {
            Rating::B
        } else if density <= 40.0 {
            Rating::C
        } else if density <= 100.0 {
            Rating::D
        } else {
            Rating::E
        }
    }
}

/// Weighted findings per thousand estimated lines. Repositories smaller than
/// one KLOC are scored as one KLOC.
#[must_use]
pub fn weighted_density(by_severity: &BTreeMap<Severity, usize>, total_bytes: u64) -> f64 {
    let weighted: u64 = by_severity
        .iter()
        .map(|(severity, count)| severity_weight(*severity) * *count as u64)
        .sum();
    let kloc = (total_bytes.div_ceil(BYTES_PER_LINE) as f64 / 1000.0).max(1.0);
    weighted as f64 / kloc
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RepositoryInfo {
    pub root: String,
    pub vcs: Vcs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub dirty: bool,
    pub file_count: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AdapterBlock {
    #[serde(flatten)]
    pub result: AdapterResult,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_kind: BTreeMap<FindingKind, usize>,
}

impl From<AdapterResult> for AdapterBlock {
    fn from(result: AdapterResult) -> Self {
        Self {
            by_severity: result.by_severity(),
            by_kind: result.by_kind(),
            result,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Aggregate {
    pub total_findings: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub rating: Rating,
    pub weighted_density: f64,
    pub correlations: Vec<Correlation>,
    pub correlation_summary: CorrelationSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAssessment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentRecommendation>,
    pub projection: City,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AdapterLine {
    pub id: String,
    pub status: AdapterStatus,
    pub findings: usize,
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl std::fmt::Display for AdapterLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<24} {:<8} {:>6} findings",
            self.id,
            self.status.as_str(),
            self.findings
        )?;
        if self.cache_hit {
            f.write_str(" (cached)")?;
        }
        if let Some(reason) = &self.reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunSummary {
    pub status: RunStatus,
    pub adapters: Vec<AdapterLine>,
}

/// The single self-contained output of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunDocument {
    pub schema_version: String,
    pub run: AnalysisRun,
    pub repository: RepositoryInfo,
    pub probes: Vec<AvailabilityReport>,
    pub adapters: Vec<AdapterBlock>,
    pub aggregate: Aggregate,
    pub summary: RunSummary,
}

impl RunDocument {
    pub fn build(model: &CorrelatedModel, projection: City) -> Self {
        let bundle = &model.bundle;
        let repo = &bundle.repository;
        let by_severity = bundle.totals.by_severity.clone();
        let density = weighted_density(&by_severity, repo.total_bytes());

        let summary = RunSummary {
            status: bundle.run.status,
            adapters: bundle
                .adapters
                .iter()
                .map(|r| AdapterLine {
                    id: r.adapter_id.clone(),
                    status: r.status,
                    findings: r.findings.len(),
                    cache_hit: r.cache_hit,
                    reason: r.error.as_ref().map(|e| e.message.clone()),
                })
                .collect(),
        };

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run: bundle.run.clone(),
            repository: RepositoryInfo {
                root: repo.root_display(),
                vcs: repo.vcs,
                commit: repo.commit.clone(),
                branch: repo.branch.clone(),
                dirty: repo.dirty,
                file_count: repo.files.len(),
                total_bytes: repo.total_bytes(),
            },
            probes: bundle.probes.clone(),
            adapters: bundle.adapters.iter().cloned().map(AdapterBlock::from).collect(),
            aggregate: Aggregate {
                total_findings: bundle.totals.findings,
                by_severity,
                rating: Rating::from_density(density),
                weighted_density: density,
                correlations: model.correlations.clone(),
                correlation_summary: model.summary(),
                risk: model.risk.clone(),
                deployment: model.deployment.clone(),
                projection,
            },
            summary,
        }
    }

    /// Drops wall-clock data so identical inputs serialize identically.
    pub fn zero_times(&mut self) {
        self.run.started_at_unix_ms = 0;
        self.run.finished_at_unix_ms = 0;
        for block in &mut self.adapters {
            block.result.duration_ms = 0;
        }
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// JSON Schema of [`RunDocument`].
pub fn run_document_schema() -> schemars::Schema {
    schemars::schema_for!(RunDocument)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rating_bands() {
        assert_eq!(Rating::from_density(0.0), Rating::A);
        assert_eq!(Rating::from_density(5.0), Rating::A);
        assert_eq!(Rating::from_density(5.1), Rating::B);
        assert_eq!(Rating::from_density(40.0), Rating::C);
        assert_eq!(Rating::from_density(99.0), Rating::D);
        assert_eq!(Rating::from_density(250.0), Rating::E);
    }

    #[test]
    fn density_floors_small_repositories_at_one_kloc() {
        let by_severity = BTreeMap::from([(Severity::Critical, 1), (Severity::Low, 2)]);
        // 27 weighted findings in a 4 KiB repository.
        assert_eq!(weighted_density(&by_severity, 4096), 27.0);
        // 10_000 lines -> 10 KLOC.
        assert_eq!(weighted_density(&by_severity, 400_000), 2.7);
    }

    #[test]
    fn adapter_lines_render_reason_and_cache() {
        let line = AdapterLine {
            id: "slither".to_string(),
            status: AdapterStatus::Timeout,
            findings: 0,
            cache_hit: false,
            reason: Some("adapter timeout exceeded".to_string()),
        };
        let rendered = line.to_string();
        assert!(rendered.starts_with("slither"));
        assert!(rendered.contains("timeout"));
        assert!(rendered.ends_with(": adapter timeout exceeded"));
    }

    #[test]
    fn schema_names_the_document_sections() {
        let schema = serde_json::to_value(run_document_schema()).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        for section in ["schema_version", "run", "adapters", "aggregate", "summary"] {
            assert!(properties.contains_key(section), "missing {section}");
        }
    }
}

use codecity_correlate::CorrelatedModel;
use codecity_model::{Category, Language, Metric, Repository, Severity};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Average bytes per source line, used when no adapter measured the file.
pub const BYTES_PER_LINE: u64 = 40;

const LOC_KEYS: &[&str] = &["loc", "ncloc", "lines", "lines_of_code"];
const COMPLEXITY_KEYS: &[&str] = &["complexity", "cyclomatic", "cognitive_complexity"];

/// Everything the projection knows about one file. A building is a pure
/// function of its facts, so facts recovered from a city project back to the
/// same city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FileFacts {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    pub findings: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    /// Findings in the security category or of vulnerability kind.
    pub security_findings: usize,
    pub estimated_loc: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u64>,
    /// Findings in the complexity category; the fallback complexity signal.
    #[serde(default)]
    pub complexity_findings: usize,
    pub debt_minutes: u64,
    /// `category/sub_kind` labels seen in this file.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub kinds: BTreeSet<String>,
}

impl FileFacts {
    fn new(path: &str, repository: &Repository) -> Self {
        let file = repository.file(path);
        Self {
            path: path.to_string(),
            language: file.map(|f| f.language),
            findings: 0,
            by_severity: BTreeMap::new(),
            security_findings: 0,
            estimated_loc: file.map_or(0, |f| f.size_bytes.div_ceil(BYTES_PER_LINE)),
            complexity: None,
            complexity_findings: 0,
            debt_minutes: 0,
            kinds: BTreeSet::new(),
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }

    /// Top-level directory segment, `.` for files at the root.
    pub fn district(&self) -> &str {
        district_key(&self.path)
    }

    fn absorb_metric(&mut self, metric: &Metric) {
        if metric.value < 0.0 || !metric.value.is_finite() {
            return;
        }
        let value = metric.value.round() as u64;
        let key = metric.key.as_str();
        if LOC_KEYS.contains(&key) {
            self.estimated_loc = value;
        } else if COMPLEXITY_KEYS.contains(&key) {
            self.complexity = Some(self.complexity.map_or(value, |c| c.max(value)));
        }
    }
}

#[must_use]
pub fn district_key(path: &str) -> &str {
    match path.split_once('/') {
        Some((top, _)) if !top.is_empty() => top,
        _ => ".",
    }
}

/// Collect facts for every repository file carrying at least one finding.
pub fn collect_facts(model: &CorrelatedModel) -> BTreeMap<String, FileFacts> {
    let repository = &model.bundle.repository;
    let mut facts: BTreeMap<String, FileFacts> = BTreeMap::new();

    for (path, findings) in model.findings_by_file() {
        if !repository.contains(path) {
            log::debug!("Skipping building for {path}: not in repository tree");
            continue;
        }
        let entry = facts
            .entry(path.to_string())
            .or_insert_with(|| FileFacts::new(path, repository));
        for finding in findings {
            entry.findings += 1;
            *entry.by_severity.entry(finding.severity).or_insert(0) += 1;
            if finding.is_security() {
                entry.security_findings += 1;
            }
            if finding.category == Category::Complexity {
                entry.complexity_findings += 1;
            }
            entry.debt_minutes += u64::from(finding.effort_minutes.unwrap_or(0));
            if let Some(kind) = finding.qualified_kind() {
                entry.kinds.insert(kind);
            }
        }
    }

    // Metric-based LOC and complexity override the size estimate, but only
    // for files that already have a building.
    for metric in model.bundle.metrics() {
        if let Some(entry) = metric.file_path().and_then(|p| facts.get_mut(p)) {
            entry.absorb_metric(metric);
        }
    }
    facts
}

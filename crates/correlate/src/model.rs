use crate::{Correlation, CorrelationSummary, DeploymentRecommendation, RiskAssessment};
use codecity_model::{AnalysisBundle, Finding};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Position of a finding inside the bundle: (adapter index, finding index).
type FindingRef = (usize, usize);

/// The bundle plus its correlations. Findings are never copied or rewritten;
/// correlations refer to them by id, and reverse views (file -> findings,
/// finding -> correlation) are rebuilt on demand.
#[derive(Debug, Clone)]
pub struct CorrelatedModel {
    pub bundle: Arc<AnalysisBundle>,
    pub correlations: Vec<Correlation>,
    pub risk: Option<RiskAssessment>,
    pub deployment: Option<DeploymentRecommendation>,
    index: BTreeMap<String, FindingRef>,
}

impl CorrelatedModel {
    pub fn new(
        bundle: Arc<AnalysisBundle>,
        correlations: Vec<Correlation>,
        risk: Option<RiskAssessment>,
        deployment: Option<DeploymentRecommendation>,
    ) -> Self {
        let mut index = BTreeMap::new();
        for (a, result) in bundle.adapters.iter().enumerate() {
            for (f, finding) in result.findings.iter().enumerate() {
                index.entry(finding.id.clone()).or_insert((a, f));
            }
        }
        Self {
            bundle,
            correlations,
            risk,
            deployment,
            index,
        }
    }

    pub fn finding(&self, id: &str) -> Option<&Finding> {
        let &(a, f) = self.index.get(id)?;
        self.bundle.adapters.get(a)?.findings.get(f)
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.bundle.findings()
    }

    pub fn participants<'a>(&'a self, correlation: &'a Correlation) -> impl Iterator<Item = &'a Finding> + 'a {
        correlation
            .participants
            .iter()
            .filter_map(move |id| self.finding(id))
    }

    /// Reverse view: canonical file -> its findings, in bundle order.
    pub fn findings_by_file(&self) -> BTreeMap<&str, Vec<&Finding>> {
        let mut by_file: BTreeMap<&str, Vec<&Finding>> = BTreeMap::new();
        for finding in self.bundle.findings() {
            if let Some(file) = finding.file() {
                by_file.entry(file).or_default().push(finding);
            }
        }
        by_file
    }

    /// Reverse view: finding id -> index into `correlations`.
    pub fn correlation_index(&self) -> BTreeMap<&str, usize> {
        let mut index = BTreeMap::new();
        for (i, c) in self.correlations.iter().enumerate() {
            for id in &c.participants {
                index.insert(id.as_str(), i);
            }
        }
        index
    }

    pub fn summary(&self) -> CorrelationSummary {
        CorrelationSummary::from_correlations(&self.correlations)
    }
}

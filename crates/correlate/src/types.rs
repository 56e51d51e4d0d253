use crate::SeverityPenalties;
use codecity_model::{Category, Confidence, FindingKind, Severity, Verdict};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgreementLevel {
    /// One participant; nothing to agree on.
    Single,
    /// Every participant reports the consensus severity.
    Unanimous,
    /// More than half report the consensus severity.
    Majority,
    Split,
}

/// Outcome of merging the participants' property verdicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VerdictResolution {
    pub verdict: Verdict,
    /// Adapter whose verdict won a verified-vs-violated conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    pub conflicting: bool,
}

/// A cross-adapter grouping of findings about the same underlying defect.
/// Participants are finding ids; the findings themselves stay in the bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Correlation {
    pub id: String,
    /// Finding ids in bundle order.
    pub participants: Vec<String>,
    /// Distinct adapter instance ids, in participant order.
    pub adapters: Vec<String>,
    pub kind: FindingKind,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Smallest non-zero participant line, `0` when all are file-level.
    pub line: u32,
    pub consensus_severity: Severity,
    pub disagreement: bool,
    pub agreement: AgreementLevel,
    pub fp_probability: f64,
    pub max_confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<VerdictResolution>,
}

impl Correlation {
    pub fn detecting_adapters(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_cross_adapter(&self) -> bool {
        self.adapters.len() > 1
    }

    pub fn resolved_verdict(&self) -> Option<Verdict> {
        self.verdict.as_ref().map(|v| v.verdict)
    }

    /// Security-relevant and not discharged by a `verified` verdict.
    pub fn is_vulnerability(&self) -> bool {
        let security = self.kind == FindingKind::Vulnerability || self.category == Category::Security;
        security && self.resolved_verdict() != Some(Verdict::Verified)
    }

    /// `sub_kind`, `category/sub_kind` and the category name.
    pub fn kind_labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(3);
        if let Some(sub) = &self.sub_kind {
            labels.push(sub.clone());
            labels.push(format!("{}/{sub}", self.category));
        }
        labels.push(self.category.to_string());
        labels
    }

    /// Reduction of the safety score attributed to this correlation. Never
    /// negative.
    #[must_use]
    pub fn safety_deduction(&self, penalties: &SeverityPenalties) -> f64 {
        (penalties.penalty(self.consensus_severity) * (1.0 - self.fp_probability)).max(0.0)
    }

    pub fn display_location(&self) -> String {
        match (&self.file, self.line) {
            (Some(file), 0) => file.clone(),
            (Some(file), line) => format!("{file}:{line}"),
            (None, _) => "<repository>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CorrelationSummary {
    pub total: usize,
    pub cross_adapter: usize,
    pub disagreements: usize,
    pub verdict_conflicts: usize,
}

impl CorrelationSummary {
    pub fn from_correlations(correlations: &[Correlation]) -> Self {
        let mut summary = Self {
            total: correlations.len(),
            ..Self::default()
        };
        for c in correlations {
            if c.is_cross_adapter() {
                summary.cross_adapter += 1;
            }
            if c.disagreement {
                summary.disagreements += 1;
            }
            if c.verdict.as_ref().is_some_and(|v| v.conflicting) {
                summary.verdict_conflicts += 1;
            }
        }
        summary
    }
}

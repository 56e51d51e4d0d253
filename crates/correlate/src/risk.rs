use crate::{Correlation, RiskPolicy};
use codecity_model::Severity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RiskContribution {
    pub correlation_id: String,
    pub severity: Severity,
    pub detecting_adapters: usize,
    pub adjusted_risk: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RiskAssessment {
    pub total_potential_loss: f64,
    pub level: RiskLevel,
    /// Adapters that produced output this run; the denominator of every
    /// detection ratio.
    pub total_adapters: usize,
    pub contributions: Vec<RiskContribution>,
}

impl RiskPolicy {
    pub fn classify(&self, total: f64) -> RiskLevel {
        let t = &self.thresholds;
        if total >= t.critical {
            RiskLevel::Critical
        } else if total >= t.high {
            RiskLevel::High
        } else if total >= t.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// `baseImpact · multiplier(s) · detecting/total · (1 − fp)` per correlated
/// vulnerability, summed.
#[must_use]
pub fn assess_risk(
    correlations: &[Correlation],
    total_adapters: usize,
    policy: &RiskPolicy,
) -> RiskAssessment {
    let denominator = total_adapters.max(1) as f64;
    let contributions: Vec<RiskContribution> = correlations
        .iter()
        .filter(|c| c.is_vulnerability())
        .map(|c| {
            let ratio = (c.detecting_adapters() as f64 / denominator).min(1.0);
            RiskContribution {
                correlation_id: c.id.clone(),
                severity: c.consensus_severity,
                detecting_adapters: c.detecting_adapters(),
                adjusted_risk: policy.base_impact
                    * policy.multiplier(c.consensus_severity)
                    * ratio
                    * (1.0 - c.fp_probability),
            }
        })
        .collect();
    let total_potential_loss: f64 = contributions.iter().map(|c| c.adjusted_risk).sum();

    RiskAssessment {
        total_potential_loss,
        level: policy.classify(total_potential_loss),
        total_adapters,
        contributions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::correlation;
    use crate::VerdictResolution;
    use codecity_model::{Category, FindingKind, Verdict};
    use pretty_assertions::assert_eq;

    #[test]
    fn loss_scales_with_detection_ratio_and_fp() {
        let policy = RiskPolicy::default();
        let both = correlation("c1", &["x", "y"], Severity::Critical);
        let mut one = correlation("c2", &["x"], Severity::High);
        one.fp_probability = 0.5;

        let assessment = assess_risk(&[both, one], 2, &policy);
        assert_eq!(assessment.contributions.len(), 2);
        assert_eq!(assessment.contributions[0].adjusted_risk, 1_000_000.0);
        assert_eq!(assessment.contributions[1].adjusted_risk, 1_000_000.0 * 0.7 * 0.5 * 0.5);
        assert_eq!(assessment.total_potential_loss, 1_175_000.0);
        assert_eq!(assessment.level, RiskLevel::Critical);
    }

    #[test]
    fn verified_and_non_security_correlations_carry_no_risk() {
        let mut verified = correlation("c1", &["prover"], Severity::Critical);
        verified.verdict = Some(VerdictResolution {
            verdict: Verdict::Verified,
            decided_by: None,
            conflicting: false,
        });
        let mut smell = correlation("c2", &["lint"], Severity::Critical);
        smell.kind = FindingKind::Issue;
        smell.category = Category::Maintainability;

        let assessment = assess_risk(&[verified, smell], 2, &RiskPolicy::default());
        assert!(assessment.contributions.is_empty());
        assert_eq!(assessment.total_potential_loss, 0.0);
        assert_eq!(assessment.level, RiskLevel::Low);
    }

    #[test]
    fn zero_adapters_does_not_divide_by_zero() {
        let c = correlation("c1", &["x"], Severity::Low);
        let assessment = assess_risk(&[c], 0, &RiskPolicy::default());
        assert_eq!(assessment.total_potential_loss, 100_000.0);
        assert_eq!(assessment.level, RiskLevel::High);
    }

    #[test]
    fn thresholds_are_inclusive() {
        let policy = RiskPolicy::default();
        assert_eq!(policy.classify(9_999.0), RiskLevel::Low);
        assert_eq!(policy.classify(10_000.0), RiskLevel::Medium);
        assert_eq!(policy.classify(100_000.0), RiskLevel::High);
        assert_eq!(policy.classify(1_000_000.0), RiskLevel::Critical);
    }
}

use crate::FileFacts;
use codecity_model::Severity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Building condition, ordered best to worst.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Condition {
    /// From the number of critical findings in the file.
    #[must_use]
    pub fn from_critical(critical: usize) -> Self {
        match critical {
            0 => Condition::Excellent,
            1 => Condition::Good,
            2..=3 => Condition::Fair,
            _ => Condition::Poor,
        }
    }
}

/// Ordered best to worst.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Secure,
    Moderate,
    AtRisk,
}

impl SecurityLevel {
    #[must_use]
    pub fn from_security_findings(count: usize) -> Self {
        match count {
            0 => SecurityLevel::Secure,
            1..=2 => SecurityLevel::Moderate,
            _ => SecurityLevel::AtRisk,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Traffic {
    Low,
    Medium,
    High,
}

impl Traffic {
    /// Findings per hundred estimated lines; tiny files count as one hundred.
    #[must_use]
    pub fn density(findings: usize, estimated_loc: u64) -> f64 {
        findings as f64 * 100.0 / estimated_loc.max(100) as f64
    }

    #[must_use]
    pub fn from_density(density: f64) -> Self {
        if density >= 3.0 {
            Traffic::High
        } else if density >= 1.0 {
            Traffic::Medium
        } else {
            Traffic::Low
        }
    }
}

/// `log10(max(100, findings · 20 + loc)) · 25`; at least 50.
#[must_use]
pub fn building_height(findings: usize, estimated_loc: u64) -> f64 {
    let mass = (findings as u64)
        .saturating_mul(20)
        .saturating_add(estimated_loc)
        .max(100);
    (mass as f64).log10() * 25.0
}

/// Severity weights shared by the quality overlay and the district score.
#[must_use]
pub fn severity_weight(severity: Severity) -> u64 {
    match severity {
        Severity::Critical => 25,
        Severity::High => 10,
        Severity::Medium => 4,
        Severity::Low => 1,
        Severity::Info => 0,
    }
}

pub(crate) fn weighted_findings(facts: &FileFacts) -> u64 {
    facts
        .by_severity
        .iter()
        .map(|(s, n)| severity_weight(*s) * *n as u64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn height_has_a_floor() {
        assert_eq!(building_height(0, 0), 50.0);
        assert_eq!(building_height(1, 10), 50.0);
        assert_eq!(building_height(0, 1000), 75.0);
        assert_eq!(building_height(45, 100), 75.0);
    }

    #[test]
    fn bands_follow_counts() {
        assert_eq!(Condition::from_critical(0), Condition::Excellent);
        assert_eq!(Condition::from_critical(3), Condition::Fair);
        assert_eq!(Condition::from_critical(9), Condition::Poor);
        assert_eq!(SecurityLevel::from_security_findings(2), SecurityLevel::Moderate);
        assert_eq!(SecurityLevel::from_security_findings(3), SecurityLevel::AtRisk);
        assert_eq!(Traffic::from_density(Traffic::density(1, 50)), Traffic::Medium);
        assert_eq!(Traffic::from_density(Traffic::density(2, 400)), Traffic::Low);
        assert_eq!(Traffic::from_density(Traffic::density(12, 400)), Traffic::High);
    }
}

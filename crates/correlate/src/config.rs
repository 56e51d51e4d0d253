use codecity_model::{Category, Severity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_LOCATION_TOLERANCE: u32 = 5;
pub const DEFAULT_RELIABILITY: f64 = 0.8;

/// `[correlation]` table of the run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorrelationConfig {
    /// Maximum line distance for two findings to be considered co-located.
    pub location_tolerance: u32,
    /// External rule key -> canonical rule.
    pub rule_equivalences: BTreeMap<String, String>,
    pub base_fp_rates: BTreeMap<Category, f64>,
    /// Per adapter instance id, in `[0, 1]`. Filled from the adapter entries.
    pub reliability: BTreeMap<String, f64>,
    pub default_reliability: f64,
    /// Adapter instance ids, most trusted first, for verdict conflicts.
    pub trust_ranking: Vec<String>,
    pub risk: RiskPolicy,
    pub deployment: DeploymentPolicy,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            location_tolerance: DEFAULT_LOCATION_TOLERANCE,
            rule_equivalences: BTreeMap::new(),
            base_fp_rates: default_base_fp_rates(),
            reliability: BTreeMap::new(),
            default_reliability: DEFAULT_RELIABILITY,
            trust_ranking: Vec::new(),
            risk: RiskPolicy::default(),
            deployment: DeploymentPolicy::default(),
        }
    }
}

impl CorrelationConfig {
    pub fn base_fp(&self, category: Category) -> f64 {
        self.base_fp_rates
            .get(&category)
            .copied()
            .unwrap_or_else(|| default_base_fp(category))
    }

    pub fn reliability_of(&self, adapter: &str) -> f64 {
        self.reliability
            .get(adapter)
            .copied()
            .unwrap_or(self.default_reliability)
            .clamp(0.0, 1.0)
    }

    /// Position in the trust ranking; unranked adapters sort last.
    pub fn trust_rank(&self, adapter: &str) -> usize {
        self.trust_ranking
            .iter()
            .position(|a| a == adapter)
            .unwrap_or(usize::MAX)
    }

    pub fn canonical_rule(&self, rule_key: &str) -> Option<&str> {
        self.rule_equivalences.get(rule_key).map(String::as_str)
    }

    /// Configuration problems, as human-readable messages.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        for (category, rate) in &self.base_fp_rates {
            if !in_unit(*rate) {
                problems.push(format!("base FP rate for {category} must be in [0, 1]"));
            }
        }
        for (adapter, value) in &self.reliability {
            if !in_unit(*value) {
                problems.push(format!("reliability of {adapter} must be in [0, 1]"));
            }
        }
        if !in_unit(self.default_reliability) {
            problems.push("default_reliability must be in [0, 1]".to_string());
        }
        if !in_unit(self.deployment.safety_threshold) {
            problems.push("deployment.safety_threshold must be in [0, 1]".to_string());
        }
        let t = &self.risk.thresholds;
        if !(t.medium <= t.high && t.high <= t.critical) {
            problems.push("risk thresholds must be ordered medium <= high <= critical".to_string());
        }
        problems
    }
}

/// Categories missing from a configured table keep these rates.
#[must_use]
pub fn default_base_fp(category: Category) -> f64 {
    match category {
        Category::Security => 0.25,
        Category::Bug => 0.20,
        Category::Performance => 0.30,
        Category::Style => 0.35,
        Category::Maintainability => 0.30,
        Category::Complexity => 0.20,
        Category::Duplication => 0.10,
        Category::Documentation => 0.40,
        Category::Type => 0.15,
        Category::Other => 0.30,
    }
}

pub fn default_base_fp_rates() -> BTreeMap<Category, f64> {
    Category::ALL
        .into_iter()
        .map(|c| (c, default_base_fp(c)))
        .collect()
}

/// Financial risk aggregation for the smart-contract specialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskPolicy {
    pub enabled: bool,
    pub base_impact: f64,
    pub severity_multipliers: BTreeMap<Severity, f64>,
    pub thresholds: RiskThresholds,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            base_impact: 1_000_000.0,
            severity_multipliers: [
                (Severity::Info, 0.0),
                (Severity::Low, 0.1),
                (Severity::Medium, 0.3),
                (Severity::High, 0.7),
                (Severity::Critical, 1.0),
            ]
            .into_iter()
            .collect(),
            thresholds: RiskThresholds::default(),
        }
    }
}

impl RiskPolicy {
    pub fn multiplier(&self, severity: Severity) -> f64 {
        self.severity_multipliers
            .get(&severity)
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: 10_000.0,
            high: 100_000.0,
            critical: 1_000_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploymentPolicy {
    pub enabled: bool,
    pub safety_threshold: f64,
    /// Kinds (`sub_kind`, `category/sub_kind` or category name) whose
    /// critical correlations block deployment.
    pub blocker_kinds: BTreeSet<String>,
    /// Property kinds that must carry a `verified` verdict.
    pub required_verification_kinds: BTreeSet<String>,
    pub max_acceptable_risk: f64,
    pub penalties: SeverityPenalties,
}

impl Default for DeploymentPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            safety_threshold: 0.8,
            blocker_kinds: BTreeSet::new(),
            required_verification_kinds: BTreeSet::new(),
            max_acceptable_risk: 50_000.0,
            penalties: SeverityPenalties::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeverityPenalties {
    pub per_severity: BTreeMap<Severity, f64>,
    pub max_confidence_bonus: f64,
    pub max_consensus_bonus: f64,
}

impl Default for SeverityPenalties {
    fn default() -> Self {
        Self {
            per_severity: [
                (Severity::Info, 0.0),
                (Severity::Low, 0.01),
                (Severity::Medium, 0.05),
                (Severity::High, 0.15),
                (Severity::Critical, 0.30),
            ]
            .into_iter()
            .collect(),
            max_confidence_bonus: 0.05,
            max_consensus_bonus: 0.05,
        }
    }
}

impl SeverityPenalties {
    pub fn penalty(&self, severity: Severity) -> f64 {
        self.per_severity.get(&severity).copied().unwrap_or(0.0)
    }
}

use crate::conflict::resolve_verdicts;
use crate::consensus::consensus;
use crate::deployment::recommend;
use crate::fp::false_positive_probability;
use crate::group::group_findings;
use crate::risk::assess_risk;
use crate::{Correlation, CorrelatedModel, CorrelationConfig, CorrelationSummary};
use codecity_model::{AnalysisBundle, Confidence, Finding, FindingKind};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Deterministic given a fixed bundle order and configuration.
#[derive(Debug, Clone, Default)]
pub struct CorrelationEngine {
    config: CorrelationConfig,
}

impl CorrelationEngine {
    pub fn new(config: CorrelationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    pub fn correlate(&self, bundle: Arc<AnalysisBundle>) -> CorrelatedModel {
        let findings: Vec<&Finding> = bundle.findings().collect();
        let groups = group_findings(&findings, &self.config);
        let correlations: Vec<Correlation> = groups
            .iter()
            .filter_map(|group| {
                let members: Vec<&Finding> = group.iter().map(|&i| findings[i]).collect();
                self.build(&members)
            })
            .collect();

        let risk = self
            .config
            .risk
            .enabled
            .then(|| assess_risk(&correlations, bundle.productive_adapters(), &self.config.risk));
        let deployment = self.config.deployment.enabled.then(|| {
            let loss = risk.as_ref().map_or(0.0, |r| r.total_potential_loss);
            recommend(&correlations, loss, &self.config.deployment)
        });

        let summary = CorrelationSummary::from_correlations(&correlations);
        log::info!(
            "Correlated {} findings into {} groups ({} cross-adapter, {} disagreements)",
            findings.len(),
            summary.total,
            summary.cross_adapter,
            summary.disagreements
        );

        CorrelatedModel::new(bundle, correlations, risk, deployment)
    }

    fn build(&self, members: &[&Finding]) -> Option<Correlation> {
        let first = *members.first()?;
        let severities: Vec<_> = members.iter().map(|f| f.severity).collect();
        let agreed = consensus(&severities)?;

        let mut adapters: Vec<String> = Vec::with_capacity(members.len());
        for f in members {
            if !adapters.contains(&f.adapter) {
                adapters.push(f.adapter.clone());
            }
        }
        let mean_reliability = adapters
            .iter()
            .map(|a| self.config.reliability_of(a))
            .sum::<f64>()
            / adapters.len() as f64;
        let fp_probability = false_positive_probability(
            self.config.base_fp(first.category),
            adapters.len(),
            mean_reliability,
        );

        let verdict = resolve_verdicts(members, &self.config);
        let conflicting = verdict.as_ref().is_some_and(|v| v.conflicting);

        let kind = if members.iter().any(|f| f.kind == FindingKind::Vulnerability) {
            FindingKind::Vulnerability
        } else {
            first.kind
        };
        let line = members
            .iter()
            .map(|f| f.location.line)
            .filter(|&l| l > 0)
            .min()
            .unwrap_or(0);
        let canonical_rule = members.iter().find_map(|f| {
            f.rule_key
                .as_deref()
                .and_then(|r| self.config.canonical_rule(r))
                .map(str::to_string)
        });
        let max_confidence = members
            .iter()
            .map(|f| f.confidence)
            .max()
            .unwrap_or(Confidence::Low);
        let participants: Vec<String> = members.iter().map(|f| f.id.clone()).collect();

        Some(Correlation {
            id: correlation_id(&participants),
            participants,
            adapters,
            kind,
            category: first.category,
            sub_kind: first.sub_kind.clone(),
            canonical_rule,
            file: first.location.file.clone(),
            line,
            consensus_severity: agreed.severity,
            disagreement: agreed.disagreement || conflicting,
            agreement: agreed.agreement,
            fp_probability,
            max_confidence,
            verdict,
        })
    }
}

fn correlation_id(participants: &[String]) -> String {
    let mut hasher = Sha256::new();
    for id in participants {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("corr:{hex}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bundle, finding};
    use codecity_model::{Severity, Verdict};
    use pretty_assertions::assert_eq;

    #[test]
    fn two_adapter_consensus() {
        let bundle = bundle(vec![
            ("x", vec![finding("x", "contracts/Vault.sol", 120, "reentrancy", Severity::High)]),
            ("y", vec![finding("y", "contracts/Vault.sol", 122, "reentrancy", Severity::Critical)]),
        ]);
        let model = CorrelationEngine::default().correlate(bundle);
        assert_eq!(model.correlations.len(), 1);
        let c = &model.correlations[0];
        assert_eq!(c.participants.len(), 2);
        assert_eq!(c.adapters, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(c.consensus_severity, Severity::Critical);
        assert!(!c.disagreement);
        assert_eq!(c.line, 120);
    }

    #[test]
    fn two_adapter_disagreement() {
        let bundle = bundle(vec![
            ("x", vec![finding("x", "contracts/Vault.sol", 120, "reentrancy", Severity::High)]),
            ("y", vec![finding("y", "contracts/Vault.sol", 122, "reentrancy", Severity::Low)]),
        ]);
        let model = CorrelationEngine::default().correlate(bundle);
        assert_eq!(model.correlations.len(), 1);
        let c = &model.correlations[0];
        assert!(c.disagreement);
        assert_eq!(c.consensus_severity, Severity::Medium);

        let severities: Vec<Severity> = c
            .participants
            .iter()
            .filter_map(|id| model.finding(id))
            .map(|f| f.severity)
            .collect();
        assert_eq!(severities, vec![Severity::High, Severity::Low]);
    }

    #[test]
    fn verdict_conflict_marks_disagreement() {
        let mut verified = finding("prover", "a.sol", 10, "reentrancy", Severity::Info);
        verified.kind = FindingKind::Verification;
        verified.verdict = Some(Verdict::Verified);
        let mut violated = finding("fuzzer", "a.sol", 11, "reentrancy", Severity::High);
        violated.verdict = Some(Verdict::Violated);
        let bundle = bundle(vec![("prover", vec![verified]), ("fuzzer", vec![violated])]);

        let config = CorrelationConfig {
            trust_ranking: vec!["prover".to_string()],
            ..CorrelationConfig::default()
        };
        let model = CorrelationEngine::new(config).correlate(bundle);
        let c = &model.correlations[0];
        assert!(c.disagreement);
        assert_eq!(c.resolved_verdict(), Some(Verdict::Verified));
        assert!(!c.is_vulnerability());
    }

    #[test]
    fn ids_are_stable_and_ordered_by_first_participant() {
        let make = || {
            bundle(vec![
                ("x", vec![
                    finding("x", "b.sol", 1, "overflow", Severity::Low),
                    finding("x", "a.sol", 1, "overflow", Severity::Low),
                ]),
            ])
        };
        let engine = CorrelationEngine::default();
        let first = engine.correlate(make());
        let second = engine.correlate(make());
        assert_eq!(first.correlations, second.correlations);
        assert_eq!(first.correlations[0].file.as_deref(), Some("b.sol"));
    }

    #[test]
    fn removing_an_adapter_only_removes_its_participation() {
        let x = vec![
            finding("x", "a.sol", 10, "reentrancy", Severity::High),
            finding("x", "b.sol", 3, "overflow", Severity::Low),
        ];
        let y = vec![finding("y", "a.sol", 12, "reentrancy", Severity::Critical)];
        let engine = CorrelationEngine::default();

        let with_y = engine.correlate(bundle(vec![("x", x.clone()), ("y", y)]));
        let without_y = engine.correlate(bundle(vec![("x", x.clone())]));

        assert_eq!(with_y.correlations.len(), 2);
        assert_eq!(without_y.correlations.len(), 2);
        assert_eq!(without_y.bundle.adapters[0].findings, x);

        let stripped: Vec<Vec<String>> = with_y
            .correlations
            .iter()
            .map(|c| {
                c.participants
                    .iter()
                    .filter(|id| !id.starts_with("y:"))
                    .cloned()
                    .collect()
            })
            .collect();
        let remaining: Vec<Vec<String>> = without_y
            .correlations
            .iter()
            .map(|c| c.participants.clone())
            .collect();
        assert_eq!(stripped, remaining);
    }

    #[test]
    fn reverse_views_are_rebuilt_from_ids() {
        let model = CorrelationEngine::default().correlate(bundle(vec![
            ("x", vec![finding("x", "a.sol", 10, "reentrancy", Severity::High)]),
            ("y", vec![finding("y", "a.sol", 11, "reentrancy", Severity::High)]),
        ]));
        let by_file = model.findings_by_file();
        assert_eq!(by_file["a.sol"].len(), 2);
        let index = model.correlation_index();
        assert_eq!(index.get("y:a.sol:11:reentrancy"), Some(&0));
        assert_eq!(model.participants(&model.correlations[0]).count(), 2);
        assert_eq!(model.summary().cross_adapter, 1);
    }

    #[test]
    fn risk_and_deployment_only_when_enabled() {
        let make = || {
            bundle(vec![(
                "x",
                vec![finding("x", "a.sol", 1, "reentrancy", Severity::Critical)],
            )])
        };
        let model = CorrelationEngine::default().correlate(make());
        assert!(model.risk.is_none() && model.deployment.is_none());

        let mut config = CorrelationConfig::default();
        config.risk.enabled = true;
        config.deployment.enabled = true;
        config.deployment.blocker_kinds.insert("reentrancy".to_string());
        let model = CorrelationEngine::new(config).correlate(make());
        let risk = model.risk.as_ref().unwrap();
        assert!(risk.total_potential_loss > 0.0);
        let deployment = model.deployment.as_ref().unwrap();
        assert!(!deployment.safe);
        assert_eq!(deployment.blockers, vec![model.correlations[0].id.clone()]);
    }
}

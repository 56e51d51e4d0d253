use crate::{Correlation, DeploymentPolicy, SeverityPenalties};
use codecity_model::{Confidence, FindingKind, Severity, Verdict};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeploymentRecommendation {
    pub safe: bool,
    pub safety_score: f64,
    pub total_potential_loss: f64,
    /// One entry per failed predicate.
    pub risk_factors: Vec<String>,
    pub mitigations: Vec<String>,
    /// Critical correlations of a blocker kind.
    pub blockers: Vec<String>,
    pub uncovered_verification_kinds: Vec<String>,
}

/// Start at 1, subtract each correlation's deduction, then add confidence and
/// consensus bonuses scaled by the remaining headroom. Clamped to `[0, 1]`.
#[must_use]
pub fn safety_score(correlations: &[Correlation], penalties: &SeverityPenalties) -> f64 {
    if correlations.is_empty() {
        return 1.0;
    }
    let deducted: f64 = correlations
        .iter()
        .map(|c| c.safety_deduction(penalties))
        .sum();
    let score = (1.0 - deducted).clamp(0.0, 1.0);
    let headroom = 1.0 - score;

    let n = correlations.len() as f64;
    let confident = correlations
        .iter()
        .filter(|c| c.max_confidence >= Confidence::High)
        .count() as f64;
    let corroborated = correlations.iter().filter(|c| c.is_cross_adapter()).count() as f64;

    let bonus = penalties.max_confidence_bonus * (confident / n) * headroom
        + penalties.max_consensus_bonus * (corroborated / n) * headroom;
    (score + bonus).clamp(0.0, 1.0)
}

/// Property kinds with at least one `verified` verdict and no `violated` or
/// `partial` one.
fn verified_kinds(correlations: &[Correlation]) -> BTreeSet<String> {
    let mut verified = BTreeSet::new();
    let mut refuted = BTreeSet::new();
    for c in correlations {
        let (Some(kind), Some(verdict)) = (&c.sub_kind, c.resolved_verdict()) else {
            continue;
        };
        match verdict {
            Verdict::Verified => {
                verified.insert(kind.clone());
            }
            Verdict::Violated | Verdict::Partial => {
                refuted.insert(kind.clone());
            }
            Verdict::Unknown => {}
        }
    }
    verified.difference(&refuted).cloned().collect()
}

#[must_use]
pub fn mitigation_for(kind: &str) -> String {
    let normalized = kind.to_ascii_lowercase().replace('_', "-");
    let text = match normalized.as_str() {
        "reentrancy" => "Apply checks-effects-interactions ordering and a reentrancy guard on external calls",
        "access-control" | "authorization" => "Restrict privileged functions with explicit role checks",
        "overflow" | "underflow" | "integer-overflow" | "arithmetic" => {
            "Use checked arithmetic for value computations"
        }
        "oracle" | "price-manipulation" => "Use time-weighted or multi-source price oracles",
        "unchecked-call" | "unchecked-return" => "Check the return value of every low-level call",
        "front-running" => "Bound slippage or use commit-reveal for order-sensitive operations",
        "denial-of-service" | "dos" => "Avoid unbounded loops and external calls in critical paths",
        _ => return format!("Resolve outstanding {kind} findings before deployment"),
    };
    text.to_string()
}

fn push_unique(kind: &str, kinds: &mut Vec<String>) {
    if !kinds.iter().any(|k| k == kind) {
        kinds.push(kind.to_string());
    }
}

/// Binary safety verdict plus the predicates that failed.
#[must_use]
pub fn recommend(
    correlations: &[Correlation],
    total_potential_loss: f64,
    policy: &DeploymentPolicy,
) -> DeploymentRecommendation {
    let safety_score = safety_score(correlations, &policy.penalties);
    let mut risk_factors = Vec::new();
    let mut mitigation_kinds: Vec<String> = Vec::new();

    if safety_score < policy.safety_threshold {
        risk_factors.push(format!(
            "safety score {safety_score:.2} is below the threshold {:.2}",
            policy.safety_threshold
        ));
    }

    let mut blockers = Vec::new();
    for c in correlations {
        if c.consensus_severity != Severity::Critical || !c.is_vulnerability() {
            continue;
        }
        let labels = c.kind_labels();
        if labels.iter().any(|l| policy.blocker_kinds.contains(l)) {
            risk_factors.push(format!(
                "critical {} at {}",
                labels.first().map(String::as_str).unwrap_or("finding"),
                c.display_location()
            ));
            push_unique(labels[0].as_str(), &mut mitigation_kinds);
            blockers.push(c.id.clone());
        }
    }

    if total_potential_loss > policy.max_acceptable_risk {
        risk_factors.push(format!(
            "potential loss {total_potential_loss:.0} exceeds the acceptable {:.0}",
            policy.max_acceptable_risk
        ));
        for c in correlations
            .iter()
            .filter(|c| c.is_vulnerability() && c.consensus_severity >= Severity::High)
        {
            if let Some(sub) = &c.sub_kind {
                push_unique(sub, &mut mitigation_kinds);
            }
        }
    }

    let verified = verified_kinds(correlations);
    let uncovered: Vec<String> = policy
        .required_verification_kinds
        .iter()
        .filter(|kind| !verified.contains(*kind))
        .cloned()
        .collect();
    for kind in &uncovered {
        risk_factors.push(format!("no verified property covers {kind}"));
    }

    let mut mitigations: Vec<String> = mitigation_kinds.iter().map(|k| mitigation_for(k)).collect();
    mitigations.extend(
        uncovered
            .iter()
            .map(|kind| format!("Add a formal property proving the absence of {kind}")),
    );
    if safety_score < policy.safety_threshold && mitigations.is_empty() {
        let worst = correlations
            .iter()
            .filter(|c| c.kind != FindingKind::Verification)
            .max_by_key(|c| c.consensus_severity);
        if let Some(c) = worst {
            mitigations.push(mitigation_for(
                c.sub_kind.as_deref().unwrap_or(c.category.as_str()),
            ));
        }
    }

    DeploymentRecommendation {
        safe: risk_factors.is_empty(),
        safety_score,
        total_potential_loss,
        risk_factors,
        mitigations,
        blockers,
        uncovered_verification_kinds: uncovered,
    }
}

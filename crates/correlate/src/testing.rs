use crate::{AgreementLevel, Correlation};
use codecity_model::{
    AdapterResult, AdapterStatus, AnalysisBundle, AnalysisRun, Category, Confidence, Finding,
    FindingKind, Location, Repository, RunStatus, Severity,
};
use std::sync::Arc;

pub(crate) fn finding(
    adapter: &str,
    file: &str,
    line: u32,
    sub_kind: &str,
    severity: Severity,
) -> Finding {
    Finding {
        id: format!("{adapter}:{file}:{line}:{sub_kind}"),
        adapter: adapter.to_string(),
        kind: FindingKind::Vulnerability,
        category: Category::Security,
        sub_kind: Some(sub_kind.to_string()),
        severity,
        confidence: Confidence::Medium,
        location: Location::file(file, line),
        rule_key: None,
        message: format!("{sub_kind} in {file}"),
        effort_minutes: None,
        tags: Vec::new(),
        verdict: None,
    }
}

pub(crate) fn bundle(adapters: Vec<(&str, Vec<Finding>)>) -> Arc<AnalysisBundle> {
    let results: Vec<AdapterResult> = adapters
        .into_iter()
        .map(|(id, findings)| {
            let mut result = AdapterResult::empty(id, "command", AdapterStatus::Ok);
            result.findings = findings;
            result
        })
        .collect();
    let run = AnalysisRun {
        id: "run-1".to_string(),
        started_at_unix_ms: 0,
        finished_at_unix_ms: 0,
        adapters: results.iter().map(|r| r.adapter_id.clone()).collect(),
        options_hash: String::new(),
        base_commit: None,
        target_commit: None,
        status: RunStatus::Clean,
    };
    Arc::new(AnalysisBundle::new(
        run,
        Arc::new(Repository::new("/repo")),
        Vec::new(),
        results,
    ))
}

pub(crate) fn correlation(id: &str, adapters: &[&str], severity: Severity) -> Correlation {
    Correlation {
        id: id.to_string(),
        participants: adapters.iter().map(|a| format!("{a}:{id}")).collect(),
        adapters: adapters.iter().map(|a| a.to_string()).collect(),
        kind: FindingKind::Vulnerability,
        category: Category::Security,
        sub_kind: Some("reentrancy".to_string()),
        canonical_rule: None,
        file: Some("contracts/Vault.sol".to_string()),
        line: 10,
        consensus_severity: severity,
        disagreement: false,
        agreement: if adapters.len() > 1 {
            AgreementLevel::Unanimous
        } else {
            AgreementLevel::Single
        },
        fp_probability: 0.0,
        max_confidence: Confidence::Medium,
        verdict: None,
    }
}

use super::reports::{probe_reports, read_reports, report_paths, REPORTS_OPTION};
use crate::{
    Adapter, AdapterDescriptor, AdapterKind, AdapterOptions, Capabilities, OptionKind, OptionSpec,
    RepoContext, Result,
};
use async_trait::async_trait;
use codecity_model::{AvailabilityReport, FindingKind, Language};
use codecity_normalize::{NativeOutput, SeverityScheme, VerificationDocument};
use std::path::{Path, PathBuf};

/// Imports formal verification results (`{ properties: [...] }` documents).
pub struct VerificationReportAdapter;

#[async_trait]
impl Adapter for VerificationReportAdapter {
    fn describe(&self) -> AdapterDescriptor {
        AdapterDescriptor {
            id: "verification-report",
            name: "Formal verification report import",
            kind: AdapterKind::FormalVerification,
            languages_supported: vec![
                Language::Solidity,
                Language::Vyper,
                Language::Move,
                Language::Cairo,
            ],
            inputs: vec!["verification result documents"],
            produced_finding_kinds: vec![FindingKind::Verification],
            options: vec![
                OptionSpec::required(REPORTS_OPTION, OptionKind::StringList, "result documents, relative to the repository root"),
                OptionSpec::optional("tool", OptionKind::String, "prover name for documents that omit it"),
            ],
            severity_scheme: SeverityScheme::Generic,
            max_execution_secs: Some(120),
        }
    }

    async fn probe(&self, root: &Path, options: &AdapterOptions) -> AvailabilityReport {
        probe_reports("verification-report", root, options).await
    }

    async fn analyze(&self, ctx: &RepoContext, options: &AdapterOptions) -> Result<NativeOutput> {
        let (mut docs, ok, failed) = read_reports::<VerificationDocument>(ctx, options).await?;
        if let Some(tool) = options.get_str("tool") {
            for doc in docs.iter_mut().filter(|d| d.tool.is_none()) {
                doc.tool = Some(tool.to_string());
            }
        }
        Ok(NativeOutput::verification(docs).with_targets(ok, failed))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            finding_kinds: vec![FindingKind::Verification],
            metrics: Vec::new(),
            delta: false,
            formal_evidence: true,
        }
    }

    fn cache_inputs(&self, root: &Path, options: &AdapterOptions) -> Vec<PathBuf> {
        report_paths(root, options)
    }
}

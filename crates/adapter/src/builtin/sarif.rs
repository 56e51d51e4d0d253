use super::reports::{probe_reports, read_reports, report_paths, REPORTS_OPTION};
use crate::{
    Adapter, AdapterDescriptor, AdapterKind, AdapterOptions, Capabilities, OptionKind, OptionSpec,
    RepoContext, Result,
};
use async_trait::async_trait;
use codecity_model::{AvailabilityReport, FindingKind};
use codecity_normalize::{NativeOutput, SeverityScheme};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Imports SARIF 2.1 logs written by any external tool.
pub struct SarifAdapter;

/// Fill in `tool.driver.name` where a run omits it.
fn name_tool(doc: &mut Value, tool: &str) {
    let Some(runs) = doc.get_mut("runs").and_then(Value::as_array_mut) else {
        return;
    };
    for run in runs {
        if run.pointer("/tool/driver/name").is_some() {
            continue;
        }
        if let Some(obj) = run.as_object_mut() {
            obj.insert(
                "tool".to_string(),
                serde_json::json!({ "driver": { "name": tool } }),
            );
        }
    }
}

#[async_trait]
impl Adapter for SarifAdapter {
    fn describe(&self) -> AdapterDescriptor {
        AdapterDescriptor {
            id: "sarif",
            name: "SARIF report import",
            kind: AdapterKind::ReportImport,
            languages_supported: Vec::new(),
            inputs: vec!["SARIF 2.1 report files"],
            produced_finding_kinds: vec![FindingKind::Issue, FindingKind::Vulnerability],
            options: vec![
                OptionSpec::required(REPORTS_OPTION, OptionKind::StringList, "SARIF files, relative to the repository root"),
                OptionSpec::optional("tool", OptionKind::String, "tool name for runs that omit it"),
            ],
            severity_scheme: SeverityScheme::Sarif,
            max_execution_secs: Some(120),
        }
    }

    async fn probe(&self, root: &Path, options: &AdapterOptions) -> AvailabilityReport {
        probe_reports("sarif", root, options).await
    }

    async fn analyze(&self, ctx: &RepoContext, options: &AdapterOptions) -> Result<NativeOutput> {
        let (mut docs, ok, failed) = read_reports::<Value>(ctx, options).await?;
        if let Some(tool) = options.get_str("tool") {
            for doc in &mut docs {
                name_tool(doc, tool);
            }
        }
        Ok(NativeOutput::sarif(docs).with_targets(ok, failed))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            finding_kinds: vec![FindingKind::Issue, FindingKind::Vulnerability],
            metrics: Vec::new(),
            delta: false,
            formal_evidence: false,
        }
    }

    fn cache_inputs(&self, root: &Path, options: &AdapterOptions) -> Vec<PathBuf> {
        report_paths(root, options)
    }
}

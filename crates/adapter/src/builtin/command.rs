use crate::process::{find_program, run_bounded, ProcessSpec};
use crate::{
    Adapter, AdapterDescriptor, AdapterError, AdapterKind, AdapterOptions, Capabilities,
    OptionKind, OptionSpec, RepoContext, Result,
};
use async_trait::async_trait;
use codecity_model::{AvailabilityReport, FindingKind};
use codecity_normalize::{
    NativeMetric, NativeOutput, NativeRecord, SeverityScheme, VerificationDocument,
};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const FORMATS: &[&str] = &["records", "sarif", "verification"];
const SCHEMES: &[&str] = &["sonar", "sarif", "slither", "generic", "cvss"];

/// Runs an external analyzer binary inside its scratch directory and parses
/// its stdout.
///
/// Arguments may reference `{repo}`, `{scratch}` and `{base}` (the last
/// analyzed commit, empty on a first run).
pub struct CommandAdapter;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordEnvelope {
    #[serde(default)]
    records: Vec<NativeRecord>,
    #[serde(default)]
    metrics: Vec<NativeMetric>,
}

fn expand(arg: &str, ctx: &RepoContext) -> String {
    arg.replace("{repo}", &ctx.root().to_string_lossy())
        .replace("{scratch}", &ctx.scratch_dir.to_string_lossy())
        .replace("{base}", ctx.base_commit.as_deref().unwrap_or(""))
}

/// Accepts a JSON array of records, a `{records, metrics}` envelope, or JSON
/// lines. Lines that are not records are counted, not fatal.
fn parse_records(stdout: &[u8]) -> (Vec<NativeRecord>, Vec<NativeMetric>, usize) {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return (Vec::new(), Vec::new(), 0);
    }
    if let Ok(records) = serde_json::from_str::<Vec<NativeRecord>>(trimmed) {
        return (records, Vec::new(), 0);
    }
    if let Ok(envelope) = serde_json::from_str::<RecordEnvelope>(trimmed) {
        return (envelope.records, envelope.metrics, 0);
    }

    let mut records = Vec::new();
    let mut rejected = 0usize;
    for line in trimmed.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<NativeRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                log::debug!("Rejecting output line: {e}");
                rejected += 1;
            }
        }
    }
    (records, Vec::new(), rejected)
}

fn parse_output(format: &str, stdout: &[u8]) -> Result<NativeOutput> {
    match format {
        "sarif" => {
            let doc: Value = serde_json::from_slice(stdout)?;
            Ok(NativeOutput::sarif(vec![doc]))
        }
        "verification" => {
            let doc: VerificationDocument = serde_json::from_slice(stdout)?;
            Ok(NativeOutput::verification(vec![doc]))
        }
        _ => {
            let (records, metrics, rejected) = parse_records(stdout);
            Ok(NativeOutput::records(records)
                .with_metrics(metrics)
                .with_rejected(rejected))
        }
    }
}

#[async_trait]
impl Adapter for CommandAdapter {
    fn describe(&self) -> AdapterDescriptor {
        AdapterDescriptor {
            id: "command",
            name: "External analyzer command",
            kind: AdapterKind::StaticAnalysis,
            languages_supported: Vec::new(),
            inputs: vec!["repository tree", "analyzer binary on PATH"],
            produced_finding_kinds: vec![
                FindingKind::Issue,
                FindingKind::Vulnerability,
                FindingKind::Verification,
            ],
            options: vec![
                OptionSpec::required("program", OptionKind::String, "binary name or path"),
                OptionSpec::optional("args", OptionKind::StringList, "arguments"),
                OptionSpec::optional("format", OptionKind::Choice(FORMATS), "stdout format"),
                OptionSpec::optional(
                    "severity_scheme",
                    OptionKind::Choice(SCHEMES),
                    "native severity scheme",
                ),
                OptionSpec::optional("max_memory_mb", OptionKind::Integer, "address-space limit"),
            ],
            severity_scheme: SeverityScheme::Generic,
            max_execution_secs: None,
        }
    }

    async fn probe(&self, _root: &Path, options: &AdapterOptions) -> AvailabilityReport {
        let Some(program) = options.get_str("program") else {
            return AvailabilityReport::unavailable("command", "no program configured");
        };
        match find_program(program) {
            Some(_) => AvailabilityReport::available("command"),
            None => AvailabilityReport::unavailable(
                "command",
                format!("{program} not found on PATH"),
            )
            .with_missing(program),
        }
    }

    async fn analyze(&self, ctx: &RepoContext, options: &AdapterOptions) -> Result<NativeOutput> {
        let program = options.require_str("program")?;
        let format = options.get_str("format").unwrap_or("records");
        let scheme = options
            .get_str("severity_scheme")
            .map(str::parse::<SeverityScheme>)
            .transpose()
            .map_err(AdapterError::ConfigMissing)?;

        let args: Vec<String> = options
            .get_str_list("args")
            .iter()
            .map(|arg| expand(arg, ctx))
            .collect();
        let spec = ProcessSpec::new(program, &ctx.scratch_dir)
            .args(args)
            .env("CODECITY_REPO_ROOT", ctx.root().to_string_lossy())
            .env("CODECITY_SCRATCH", ctx.scratch_dir.to_string_lossy())
            .max_memory_mb(options.get_u64("max_memory_mb"));

        let output = run_bounded(&spec, &ctx.cancel, ctx.deadline).await?;
        if !output.success() && output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(AdapterError::External(format!(
                "{program} exited with {}: {}",
                output.status,
                output.stderr_tail()
            )));
        }
        if !output.success() {
            log::debug!("{program} exited with {} but produced output", output.status);
        }

        let mut native = parse_output(format, &output.stdout)
            .map_err(|e| AdapterError::External(format!("unparseable {format} output: {e}")))?;
        if let Some(scheme) = scheme {
            native = native.with_scheme(scheme);
        }
        Ok(native)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            finding_kinds: vec![
                FindingKind::Issue,
                FindingKind::Vulnerability,
                FindingKind::Verification,
            ],
            metrics: Vec::new(),
            delta: true,
            formal_evidence: false,
        }
    }

    /// The resolved binary, so an upgraded analyzer misses the cache.
    fn cache_inputs(&self, _root: &Path, options: &AdapterOptions) -> Vec<PathBuf> {
        options
            .get_str("program")
            .and_then(find_program)
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_array_envelope_and_lines() {
        let (records, _, rejected) =
            parse_records(br#"[{"message": "a", "file": "x.c", "line": 1}]"#);
        assert_eq!((records.len(), rejected), (1, 0));

        let (records, metrics, _) = parse_records(
            br#"{"records": [{"message": "a"}], "metrics": [{"key": "loc", "value": 3.0}]}"#,
        );
        assert_eq!((records.len(), metrics.len()), (1, 1));

        let (records, _, rejected) =
            parse_records(b"{\"message\": \"a\"}\nnot json\n{\"message\": \"b\"}\n");
        assert_eq!((records.len(), rejected), (2, 1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_program_and_parses_records() {
        use codecity_model::Repository;
        use std::collections::BTreeMap;
        use std::sync::Arc;
        use tokio_util::sync::CancellationToken;

        let repo_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let ctx = RepoContext {
            repository: Arc::new(Repository::new(repo_dir.path())),
            target_commit: None,
            base_commit: None,
            changed_paths: None,
            previous_state: None,
            scratch_dir: scratch.path().to_path_buf(),
            cancel: CancellationToken::new(),
            deadline: tokio::time::Instant::now() + std::time::Duration::from_secs(10),
        };
        let raw: BTreeMap<String, Value> = serde_json::from_value(serde_json::json!({
            "program": "sh",
            "args": ["-c", "echo '{\"message\":\"m\",\"severity\":\"blocker\"}'; exit 1"],
            "severity_scheme": "sonar"
        }))
        .unwrap();
        let options = CommandAdapter.describe().validate_options(&raw).unwrap();
        let output = CommandAdapter.analyze(&ctx, &options).await.unwrap();
        assert_eq!(output.scheme, Some(SeverityScheme::Sonar));
        match output.payload {
            codecity_normalize::NativePayload::Records(records) => {
                assert_eq!(records.len(), 1)
            }
            other => panic!("unexpected payload {}", other.family()),
        }
    }
}

use crate::error::{OptionError, Result};
use async_trait::async_trait;
use codecity_model::{AvailabilityReport, FindingKind, Language, Repository};
use codecity_normalize::{NativeOutput, SeverityScheme};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    VersionControl,
    Syntax,
    StaticAnalysis,
    FormalVerification,
    Runtime,
    DependencyAudit,
    Service,
    ReportImport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    String,
    Integer,
    Float,
    Bool,
    StringList,
    /// A string restricted to the listed values.
    Choice(&'static [&'static str]),
}

impl OptionKind {
    fn expected(self) -> &'static str {
        match self {
            OptionKind::String => "a string",
            OptionKind::Integer => "a non-negative integer",
            OptionKind::Float => "a number",
            OptionKind::Bool => "a boolean",
            OptionKind::StringList => "a list of strings",
            OptionKind::Choice(_) => "one of the documented values",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            OptionKind::String => value.is_string(),
            OptionKind::Integer => value.is_u64(),
            OptionKind::Float => value.is_number(),
            OptionKind::Bool => value.is_boolean(),
            OptionKind::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            OptionKind::Choice(allowed) => value
                .as_str()
                .is_some_and(|v| allowed.contains(&v)),
        }
    }
}

/// One recognized option key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionSpec {
    pub key: &'static str,
    pub kind: OptionKind,
    pub required: bool,
    pub description: &'static str,
}

impl OptionSpec {
    pub const fn required(key: &'static str, kind: OptionKind, description: &'static str) -> Self {
        Self {
            key,
            kind,
            required: true,
            description,
        }
    }

    pub const fn optional(key: &'static str, kind: OptionKind, description: &'static str) -> Self {
        Self {
            key,
            kind,
            required: false,
            description,
        }
    }
}

/// Static self-description of an adapter type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterDescriptor {
    /// Registry key.
    pub id: &'static str,
    pub name: &'static str,
    pub kind: AdapterKind,
    /// Empty means language-agnostic.
    pub languages_supported: Vec<Language>,
    pub inputs: Vec<&'static str>,
    pub produced_finding_kinds: Vec<FindingKind>,
    pub options: Vec<OptionSpec>,
    /// Scheme the normalizer applies unless the output overrides it.
    pub severity_scheme: SeverityScheme,
    /// Adapter-declared resource budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_execution_secs: Option<u64>,
}

impl AdapterDescriptor {
    pub fn max_execution(&self) -> Option<Duration> {
        self.max_execution_secs.map(Duration::from_secs)
    }

    /// Check a raw option bag against the declared schema.
    pub fn validate_options(
        &self,
        raw: &BTreeMap<String, Value>,
    ) -> std::result::Result<AdapterOptions, OptionError> {
        for key in raw.keys() {
            if !self.options.iter().any(|spec| spec.key == key.as_str()) {
                return Err(OptionError::Unknown { key: key.clone() });
            }
        }
        for spec in &self.options {
            match raw.get(spec.key) {
                None if spec.required => {
                    return Err(OptionError::Missing {
                        key: spec.key.to_string(),
                    })
                }
                Some(value) if !spec.kind.accepts(value) => {
                    return Err(OptionError::Mismatch {
                        key: spec.key.to_string(),
                        expected: spec.kind.expected(),
                    })
                }
                _ => {}
            }
        }
        Ok(AdapterOptions(raw.clone()))
    }
}

/// Feature map: what an adapter populates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub finding_kinds: Vec<FindingKind>,
    pub metrics: Vec<&'static str>,
    /// Can bound its work to the delta since the last analyzed commit.
    pub delta: bool,
    /// Findings are backed by formal verification evidence.
    pub formal_evidence: bool,
}

/// Options validated against the adapter's schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdapterOptions(BTreeMap<String, Value>);

impl AdapterOptions {
    pub fn raw(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key)
            .ok_or_else(|| crate::AdapterError::ConfigMissing(key.to_string()))
    }
}

/// Everything an adapter may look at during `analyze`.
#[derive(Debug, Clone)]
pub struct RepoContext {
    /// Read-only for the whole run.
    pub repository: Arc<Repository>,
    pub target_commit: Option<String>,
    /// Commit of this adapter's last successful run, for delta-capable
    /// adapters.
    pub base_commit: Option<String>,
    /// Files changed between `base_commit` and `target_commit`, when known.
    pub changed_paths: Option<Vec<String>>,
    /// State this adapter returned at `base_commit`.
    pub previous_state: Option<Value>,
    /// Private to this adapter; removed after the run.
    pub scratch_dir: PathBuf,
    pub cancel: CancellationToken,
    pub deadline: Instant,
}

impl RepoContext {
    pub fn root(&self) -> &Path {
        &self.repository.root
    }

    /// Resolve a user-supplied path against the repository root.
    pub fn resolve_input(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root().join(path)
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The single contract between the core and an external analyzer.
///
/// Adapters return errors, never panic across this boundary, and honor the
/// context's cancellation token and deadline at every suspension point.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn describe(&self) -> AdapterDescriptor;

    /// Never fails: problems are reported as an unavailable report.
    async fn probe(&self, root: &Path, options: &AdapterOptions) -> AvailabilityReport;

    async fn analyze(&self, ctx: &RepoContext, options: &AdapterOptions) -> Result<NativeOutput>;

    fn capabilities(&self) -> Capabilities;

    /// Files read by `analyze` that the repository snapshot does not cover,
    /// such as imported reports. Their size and mtime are part of the cache
    /// key.
    fn cache_inputs(&self, _root: &Path, _options: &AdapterOptions) -> Vec<PathBuf> {
        Vec::new()
    }
}

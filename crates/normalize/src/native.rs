use crate::severity_map::{NativeSeverity, SeverityScheme};
use serde::{Deserialize, Serialize};

/// What an adapter hands back from `analyze`: tool-shaped data that only the
/// normalizer interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeOutput {
    pub payload: NativePayload,
    #[serde(default)]
    pub metrics: Vec<NativeMetric>,
    /// Overrides the adapter's declared severity scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<SeverityScheme>,
    #[serde(default)]
    pub targets_ok: usize,
    #[serde(default)]
    pub targets_failed: usize,
    /// Native items the adapter could not parse into the payload shape.
    #[serde(default)]
    pub rejected: usize,
    /// Opaque state persisted in the incremental marker after a successful
    /// run and handed back with the next delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<serde_json::Value>,
}

impl NativeOutput {
    pub fn records(records: Vec<NativeRecord>) -> Self {
        Self::from_payload(NativePayload::Records(records))
    }

    pub fn sarif(documents: Vec<serde_json::Value>) -> Self {
        Self::from_payload(NativePayload::Sarif(documents))
    }

    pub fn verification(documents: Vec<VerificationDocument>) -> Self {
        Self::from_payload(NativePayload::Verification(documents))
    }

    pub fn from_payload(payload: NativePayload) -> Self {
        Self {
            payload,
            metrics: Vec::new(),
            scheme: None,
            targets_ok: 0,
            targets_failed: 0,
            rejected: 0,
            state: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Vec<NativeMetric>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_scheme(mut self, scheme: SeverityScheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn with_targets(mut self, ok: usize, failed: usize) -> Self {
        self.targets_ok = ok;
        self.targets_failed = failed;
        self
    }

    pub fn with_rejected(mut self, rejected: usize) -> Self {
        self.rejected = rejected;
        self
    }

    pub fn with_state(mut self, state: serde_json::Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Some targets analyzed, some failed.
    pub fn is_partial(&self) -> bool {
        self.targets_failed > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "data", rename_all = "snake_case")]
pub enum NativePayload {
    /// The generic record schema.
    Records(Vec<NativeRecord>),
    /// SARIF 2.1 log documents.
    Sarif(Vec<serde_json::Value>),
    /// Formal verification result documents.
    Verification(Vec<VerificationDocument>),
}

impl NativePayload {
    pub fn family(&self) -> &'static str {
        match self {
            NativePayload::Records(_) => "records",
            NativePayload::Sarif(_) => "sarif",
            NativePayload::Verification(_) => "verification",
        }
    }
}

/// Generic record schema accepted from `command` adapters and in-process
/// wrappers. Anything not matching this shape is rejected by serde before
/// it reaches the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NativeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<NativeSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    /// Path as the tool printed it; `None` for repo-scope records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
}

impl NativeRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    pub fn severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(NativeSeverity::Label(severity.into()));
        self
    }

    pub fn category(mut self, category: impl Into<String>, sub_kind: Option<&str>) -> Self {
        self.category = Some(category.into());
        self.sub_kind = sub_kind.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeMetric {
    /// `None` for repo-scope metrics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub key: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl NativeMetric {
    pub fn file(file: impl Into<String>, key: impl Into<String>, value: f64) -> Self {
        Self {
            file: Some(file.into()),
            entity: None,
            key: key.into(),
            value,
            unit: None,
        }
    }

    pub fn repo(key: impl Into<String>, value: f64) -> Self {
        Self {
            file: None,
            entity: None,
            key: key.into(),
            value,
            unit: None,
        }
    }
}

/// `{ tool?, properties: [{ name, kind, status, file, line }] }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub properties: Vec<PropertyRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub name: String,
    /// Canonical property kind, e.g. `reentrancy` or `access-control`.
    pub kind: String,
    /// `verified`, `violated`, `partial`, `unknown` (or `timeout`).
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<NativeSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

use crate::{Category, Confidence, Severity};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// A quality or correctness problem.
    Issue,
    /// A security weakness with a potential exploit.
    Vulnerability,
    /// The outcome of checking a property (formal or dynamic).
    Verification,
    /// A location that deserves attention because of its history or shape.
    Hotspot,
}

impl FindingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FindingKind::Issue => "issue",
            FindingKind::Vulnerability => "vulnerability",
            FindingKind::Verification => "verification",
            FindingKind::Hotspot => "hotspot",
        }
    }
}

/// Binary-ish outcome of a property check.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Verified,
    Violated,
    /// Some obligations discharged, others not (timeouts, bounded checks).
    Partial,
    Unknown,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Function,
    Class,
    Contract,
    Module,
}

/// Reference from a finding to a named entity inside its file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub name: String,
}

/// A named location finer than a file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Entity {
    pub file: String,
    pub kind: EntityKind,
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Location {
    /// Canonical repository-relative path, `None` for repo-scope findings.
    #[serde(default)]
    pub file: Option<String>,
    /// 1-based line; `0` means the whole file.
    #[serde(default)]
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityRef>,
}

impl Location {
    pub fn repo() -> Self {
        Self {
            file: None,
            line: 0,
            end_line: None,
            entity: None,
        }
    }

    pub fn file(path: impl Into<String>, line: u32) -> Self {
        Self {
            file: Some(path.into()),
            line,
            end_line: None,
            entity: None,
        }
    }

    pub fn with_end_line(mut self, end_line: u32) -> Self {
        self.end_line = Some(end_line);
        self
    }

    pub fn with_entity(mut self, kind: EntityKind, name: impl Into<String>) -> Self {
        self.entity = Some(EntityRef {
            kind,
            name: name.into(),
        });
        self
    }

    pub fn is_file_level(&self) -> bool {
        self.line == 0
    }
}

/// One atomic, normalized observation about code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Finding {
    pub id: String,
    /// Instance id of the adapter that produced the finding.
    pub adapter: String,
    pub kind: FindingKind,
    pub category: Category,
    /// Canonical sub-kind within the category, e.g. `reentrancy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_kind: Option<String>,
    pub severity: Severity,
    pub confidence: Confidence,
    pub location: Location,
    /// External rule identifier, preserved verbatim across runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_key: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}

impl Finding {
    pub fn file(&self) -> Option<&str> {
        self.location.file.as_deref()
    }

    pub fn is_security(&self) -> bool {
        self.category == Category::Security || self.kind == FindingKind::Vulnerability
    }

    /// `category/sub_kind` when a sub-kind is known.
    pub fn qualified_kind(&self) -> Option<String> {
        self.sub_kind
            .as_ref()
            .map(|sub| format!("{}/{}", self.category.as_str(), sub))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum MetricScope {
    Repo,
    File { path: String },
    Entity { file: String, name: String },
}

/// One quantitative reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Metric {
    #[serde(flatten)]
    pub scope: MetricScope,
    pub key: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Metric {
    pub fn file(path: impl Into<String>, key: impl Into<String>, value: f64) -> Self {
        Self {
            scope: MetricScope::File { path: path.into() },
            key: key.into(),
            value,
            unit: None,
        }
    }

    pub fn repo(key: impl Into<String>, value: f64) -> Self {
        Self {
            scope: MetricScope::Repo,
            key: key.into(),
            value,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn file_path(&self) -> Option<&str> {
        match &self.scope {
            MetricScope::Repo => None,
            MetricScope::File { path } => Some(path),
            MetricScope::Entity { file, .. } => Some(file),
        }
    }
}

/// Stable finding id: the same adapter reporting the same rule at the same
/// place with the same message yields the same id on every run. `ordinal`
/// disambiguates exact duplicates within one adapter result.
#[must_use]
pub fn finding_id(
    adapter: &str,
    rule_key: Option<&str>,
    location: &Location,
    message: &str,
    ordinal: usize,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(adapter.as_bytes());
    hasher.update(b"|");
    hasher.update(rule_key.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(location.file.as_deref().unwrap_or("").as_bytes());
    hasher.update(location.line.to_be_bytes());
    hasher.update(location.end_line.unwrap_or(0).to_be_bytes());
    hasher.update(b"|");
    hasher.update(message.as_bytes());
    hasher.update((ordinal as u64).to_be_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(16);
    for byte in &digest[..8] {
        hex.push_str(&format!("{byte:02x}"));
    }
    format!("{adapter}:{hex}")
}

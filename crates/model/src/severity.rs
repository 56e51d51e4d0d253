use crate::{ModelError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Numeric index in `0..=4`.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Severity::Info => 0,
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    /// Inverse of [`Severity::rank`]; values above 4 saturate to `Critical`.
    #[must_use]
    pub fn from_rank(rank: u8) -> Self {
        match rank {
            0 => Severity::Info,
            1 => Severity::Low,
            2 => Severity::Medium,
            3 => Severity::High,
            _ => Severity::Critical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self> {
        Severity::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| ModelError::UnknownValue {
                field: "severity",
                value: raw.to_string(),
            })
    }
}

/// How much a normalizer trusts a finding. `Proof` is reserved for findings
/// backed by formal verification evidence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
    Proof,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
            Confidence::Proof => "proof",
        }
    }
}

impl FromStr for Confidence {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            "proof" => Ok(Confidence::Proof),
            _ => Err(ModelError::UnknownValue {
                field: "confidence",
                value: raw.to_string(),
            }),
        }
    }
}

/// Closed category domain. Anything unrecognized maps to [`Category::Other`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Bug,
    Security,
    Performance,
    Style,
    Maintainability,
    Complexity,
    Duplication,
    Documentation,
    Type,
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Bug,
        Category::Security,
        Category::Performance,
        Category::Style,
        Category::Maintainability,
        Category::Complexity,
        Category::Duplication,
        Category::Documentation,
        Category::Type,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Bug => "bug",
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Style => "style",
            Category::Maintainability => "maintainability",
            Category::Complexity => "complexity",
            Category::Duplication => "duplication",
            Category::Documentation => "documentation",
            Category::Type => "type",
            Category::Other => "other",
        }
    }

    /// Lenient parse used by normalizers: accepts the canonical names plus
    /// the spellings common across analyzers, and never fails.
    #[must_use]
    pub fn parse_lossy(raw: &str) -> Self {
        let lowered = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match lowered.as_str() {
            "bug" | "bugs" | "correctness" | "error" | "reliability" => Category::Bug,
            "security" | "vulnerability" | "vulnerabilities" | "security-hotspot" | "vuln" => {
                Category::Security
            }
            "performance" | "perf" | "efficiency" | "gas" | "optimization" => {
                Category::Performance
            }
            "style" | "lint" | "formatting" | "convention" | "naming" => Category::Style,
            "maintainability" | "code-smell" | "smell" | "design" | "hotspot" => {
                Category::Maintainability
            }
            "complexity" | "cognitive-complexity" | "cyclomatic-complexity" => {
                Category::Complexity
            }
            "duplication" | "duplicate" | "duplicated-code" | "clone" => Category::Duplication,
            "documentation" | "docs" | "doc" | "comments" => Category::Documentation,
            "type" | "types" | "typing" | "type-check" => Category::Type,
            _ => Category::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

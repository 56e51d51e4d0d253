use codecity_model::{Confidence, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A native severity as reported by a tool: a label or a numeric score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NativeSeverity {
    Score(f64),
    Label(String),
}

impl From<&str> for NativeSeverity {
    fn from(value: &str) -> Self {
        NativeSeverity::Label(value.to_string())
    }
}

/// Documented, monotone maps from a tool family's native levels to
/// [`Severity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityScheme {
    /// blocker → critical, critical → high, major → medium, minor → low,
    /// info → info.
    Sonar,
    /// error → high, warning → medium, note → low, none → info.
    Sarif,
    /// high/medium/low as-is; informational and optimization → info.
    Slither,
    /// Canonical names plus common synonyms.
    Generic,
    /// Numeric CVSS base score.
    Cvss,
}

impl SeverityScheme {
    pub const ALL: [SeverityScheme; 5] = [
        SeverityScheme::Sonar,
        SeverityScheme::Sarif,
        SeverityScheme::Slither,
        SeverityScheme::Generic,
        SeverityScheme::Cvss,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SeverityScheme::Sonar => "sonar",
            SeverityScheme::Sarif => "sarif",
            SeverityScheme::Slither => "slither",
            SeverityScheme::Generic => "generic",
            SeverityScheme::Cvss => "cvss",
        }
    }

    /// `None` when the native value is not recognized by this scheme.
    #[must_use]
    pub fn map(self, native: &NativeSeverity) -> Option<Severity> {
        match native {
            NativeSeverity::Score(score) => cvss(*score),
            NativeSeverity::Label(label) => {
                let label = label.trim().to_ascii_lowercase();
                if self == SeverityScheme::Cvss {
                    return label.parse::<f64>().ok().and_then(cvss);
                }
                self.map_label(&label)
            }
        }
    }

    fn map_label(self, label: &str) -> Option<Severity> {
        match self {
            SeverityScheme::Sonar => match label {
                "blocker" => Some(Severity::Critical),
                "critical" => Some(Severity::High),
                "major" => Some(Severity::Medium),
                "minor" => Some(Severity::Low),
                "info" => Some(Severity::Info),
                _ => None,
            },
            SeverityScheme::Sarif => match label {
                "error" => Some(Severity::High),
                "warning" => Some(Severity::Medium),
                "note" => Some(Severity::Low),
                "none" => Some(Severity::Info),
                _ => None,
            },
            SeverityScheme::Slither => match label {
                "high" => Some(Severity::High),
                "medium" => Some(Severity::Medium),
                "low" => Some(Severity::Low),
                "informational" | "optimization" => Some(Severity::Info),
                _ => None,
            },
            SeverityScheme::Generic => match label {
                "critical" | "blocker" | "fatal" => Some(Severity::Critical),
                "high" | "error" | "severe" => Some(Severity::High),
                "medium" | "moderate" | "warning" | "warn" | "major" => Some(Severity::Medium),
                "low" | "minor" | "note" => Some(Severity::Low),
                "info" | "informational" | "hint" | "none" | "optimization" => {
                    Some(Severity::Info)
                }
                _ => None,
            },
            SeverityScheme::Cvss => None,
        }
    }

    /// Severity plus the confidence cap it implies: missing or ambiguous
    /// native severity maps to `medium` with `confidence = low`.
    #[must_use]
    pub fn resolve(self, native: Option<&NativeSeverity>) -> (Severity, Option<Confidence>) {
        match native.and_then(|n| self.map(n)) {
            Some(severity) => (severity, None),
            None => (Severity::Medium, Some(Confidence::Low)),
        }
    }
}

fn cvss(score: f64) -> Option<Severity> {
    if !score.is_finite() || !(0.0..=10.0).contains(&score) {
        return None;
    }
    Some(if score >= 9.0 {
        Severity::Critical
    } else if score >= 7.0 {
        Severity::High
    } else if score >= 4.0 {
        Severity::Medium
    } else if score > 0.0 {
        Severity::Low
    } else {
        Severity::Info
    })
}

impl fmt::Display for SeverityScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeverityScheme {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        SeverityScheme::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| format!("unknown severity scheme {raw:?}"))
    }
}

use crate::bands::weighted_findings;
use crate::FileFacts;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayKind {
    Quality,
    Security,
    Complexity,
    TechnicalDebt,
}

impl OverlayKind {
    pub const ALL: [OverlayKind; 4] = [
        OverlayKind::Quality,
        OverlayKind::Security,
        OverlayKind::Complexity,
        OverlayKind::TechnicalDebt,
    ];

    /// Scalar reading for one building.
    #[must_use]
    pub fn value(self, facts: &FileFacts) -> f64 {
        match self {
            // 100 for a clean file, falling with weighted severity.
            OverlayKind::Quality => 100u64.saturating_sub(weighted_findings(facts)) as f64,
            OverlayKind::Security => facts.security_findings as f64,
            OverlayKind::Complexity => facts
                .complexity
                .unwrap_or(facts.complexity_findings as u64) as f64,
            OverlayKind::TechnicalDebt => facts.debt_minutes as f64,
        }
    }

    /// Band boundaries (yellow, orange, red), compared with `>=` on the
    /// "badness" axis.
    fn thresholds(self) -> [f64; 3] {
        match self {
            OverlayKind::Quality => [10.0, 40.0, 75.0],
            OverlayKind::Security => [1.0, 3.0, 6.0],
            OverlayKind::Complexity => [10.0, 20.0, 50.0],
            OverlayKind::TechnicalDebt => [30.0, 120.0, 480.0],
        }
    }

    #[must_use]
    pub fn band(self, value: f64) -> Band {
        let badness = match self {
            OverlayKind::Quality => 100.0 - value,
            _ => value,
        };
        let [yellow, orange, red] = self.thresholds();
        if badness >= red {
            Band::Red
        } else if badness >= orange {
            Band::Orange
        } else if badness >= yellow {
            Band::Yellow
        } else {
            Band::Green
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Green,
    Yellow,
    Orange,
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OverlayReading {
    pub value: f64,
    pub band: Band,
}

/// Per-building readings of one overlay, keyed by file path.
pub type Overlay = BTreeMap<String, OverlayReading>;

pub(crate) fn build_overlays<'a>(
    facts: impl Iterator<Item = &'a FileFacts> + Clone,
) -> BTreeMap<OverlayKind, Overlay> {
    OverlayKind::ALL
        .into_iter()
        .map(|kind| {
            let readings = facts
                .clone()
                .map(|f| {
                    let value = kind.value(f);
                    (
                        f.path.clone(),
                        OverlayReading {
                            value,
                            band: kind.band(value),
                        },
                    )
                })
                .collect();
            (kind, readings)
        })
        .collect()
}

use crate::bands::{building_height, Condition, SecurityLevel, Traffic};
use crate::facts::{collect_facts, district_key};
use crate::overlay::{build_overlays, Overlay, OverlayKind};
use crate::FileFacts;
use codecity_correlate::CorrelatedModel;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Side of one building lot.
pub const LOT_SIZE: u32 = 10;
/// Gap between adjacent districts.
pub const ROAD_WIDTH: u32 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

/// One file with at least one finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Building {
    #[serde(flatten)]
    pub facts: FileFacts,
    pub district: String,
    pub height: f64,
    pub condition: Condition,
    pub security: SecurityLevel,
    pub traffic: Traffic,
    pub position: Position,
}

impl Building {
    pub fn path(&self) -> &str {
        &self.facts.path
    }

    fn from_facts(facts: FileFacts, position: Position) -> Self {
        let critical = facts.count(codecity_model::Severity::Critical);
        Self {
            district: facts.district().to_string(),
            height: building_height(facts.findings, facts.estimated_loc),
            condition: Condition::from_critical(critical),
            security: SecurityLevel::from_security_findings(facts.security_findings),
            traffic: Traffic::from_density(Traffic::density(facts.findings, facts.estimated_loc)),
            position,
            facts,
        }
    }
}

/// One top-level directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct District {
    pub path: String,
    /// Member file paths, sorted.
    pub members: Vec<String>,
    /// Most common member condition; ties resolve to the worse one.
    pub condition: Condition,
    /// Worst member security level.
    pub security: SecurityLevel,
    pub findings: usize,
    pub origin: Position,
    /// Lots per row.
    pub columns: u32,
    pub rows: u32,
}

/// Two districts that share at least one finding kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Road {
    pub from: String,
    pub to: String,
    pub shared_kinds: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct City {
    pub districts: BTreeMap<String, District>,
    pub buildings: BTreeMap<String, Building>,
    pub roads: Vec<Road>,
    pub overlays: BTreeMap<OverlayKind, Overlay>,
}

impl City {
    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    /// Recover the facts the city was projected from.
    pub fn facts(&self) -> BTreeMap<String, FileFacts> {
        self.buildings
            .iter()
            .map(|(path, b)| (path.clone(), b.facts.clone()))
            .collect()
    }

    pub fn district_of(&self, path: &str) -> Option<&District> {
        self.districts.get(district_key(path))
    }
}

/// Project a correlated model onto a city.
#[must_use]
pub fn project(model: &CorrelatedModel) -> City {
    let city = project_facts(&collect_facts(model));
    log::debug!(
        "Projected {} buildings into {} districts",
        city.buildings.len(),
        city.districts.len()
    );
    city
}

fn grid(members: usize) -> (u32, u32) {
    if members == 0 {
        return (0, 0);
    }
    let mut columns = 1usize;
    while columns * columns < members {
        columns += 1;
    }
    let rows = members.div_ceil(columns);
    (columns as u32, rows as u32)
}

fn mode(conditions: &[Condition]) -> Condition {
    let mut counts: BTreeMap<Condition, usize> = BTreeMap::new();
    for c in conditions {
        *counts.entry(*c).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(condition, count)| (*count, *condition))
        .map_or(Condition::Excellent, |(condition, _)| condition)
}

/// Pure projection over per-file facts.
#[must_use]
pub fn project_facts(facts: &BTreeMap<String, FileFacts>) -> City {
    let mut by_district: BTreeMap<&str, Vec<&FileFacts>> = BTreeMap::new();
    for f in facts.values() {
        by_district.entry(f.district()).or_default().push(f);
    }

    let mut city = City::default();
    let mut cursor_x = 0u32;
    let mut district_kinds: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for (name, members) in &by_district {
        let (columns, rows) = grid(members.len());
        let origin = Position { x: cursor_x, y: 0 };
        cursor_x += columns * LOT_SIZE + ROAD_WIDTH;

        let mut conditions = Vec::with_capacity(members.len());
        let mut security = SecurityLevel::Secure;
        let mut findings = 0;
        for (i, f) in members.iter().enumerate() {
            let slot = i as u32;
            let position = Position {
                x: origin.x + (slot % columns) * LOT_SIZE,
                y: origin.y + (slot / columns) * LOT_SIZE,
            };
            let building = Building::from_facts((*f).clone(), position);
            conditions.push(building.condition);
            security = security.max(building.security);
            findings += f.findings;
            district_kinds
                .entry(*name)
                .or_default()
                .extend(f.kinds.iter().map(String::as_str));
            city.buildings.insert(f.path.clone(), building);
        }

        city.districts.insert(
            name.to_string(),
            District {
                path: name.to_string(),
                members: members.iter().map(|f| f.path.clone()).collect(),
                condition: mode(&conditions),
                security,
                findings,
                origin,
                columns,
                rows,
            },
        );
    }

    let names: Vec<&str> = district_kinds.keys().copied().collect();
    for (i, a) in names.iter().enumerate() {
        for b in &names[i + 1..] {
            let shared: Vec<String> = district_kinds[a]
                .intersection(&district_kinds[b])
                .map(|k| k.to_string())
                .collect();
            if !shared.is_empty() {
                city.roads.push(Road {
                    from: a.to_string(),
                    to: b.to_string(),
                    shared_kinds: shared,
                });
            }
        }
    }

    city.overlays = build_overlays(facts.values());
    city
}

#[cfg(test)]
mod tests {
    use super::*;
    use codecity_model::Severity;
    use pretty_assertions::assert_eq;

    fn facts(path: &str, critical: usize, security: usize, kinds: &[&str]) -> FileFacts {
        FileFacts {
            path: path.to_string(),
            language: None,
            findings: critical + 1,
            by_severity: [(Severity::Critical, critical), (Severity::Low, 1)]
                .into_iter()
                .filter(|(_, n)| *n > 0)
                .collect(),
            security_findings: security,
            estimated_loc: 120,
            complexity: None,
            complexity_findings: 0,
            debt_minutes: 0,
            kinds: kinds.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn city(all: Vec<FileFacts>) -> City {
        project_facts(&all.into_iter().map(|f| (f.path.clone(), f)).collect())
    }

    #[test]
    fn empty_facts_make_an_empty_city() {
        let c = city(Vec::new());
        assert!(c.is_empty());
        assert!(c.districts.is_empty());
        assert!(c.roads.is_empty());
        assert!(c.overlays.values().all(|o| o.is_empty()));
    }

    #[test]
    fn districts_aggregate_members() {
        let c = city(vec![
            facts("contracts/A.sol", 0, 0, &[]),
            facts("contracts/B.sol", 0, 4, &[]),
            facts("contracts/C.sol", 5, 1, &[]),
            facts("README.md", 0, 0, &[]),
        ]);
        let d = &c.districts["contracts"];
        assert_eq!(d.members, vec!["contracts/A.sol", "contracts/B.sol", "contracts/C.sol"]);
        assert_eq!(d.condition, Condition::Excellent);
        assert_eq!(d.security, SecurityLevel::AtRisk);
        assert_eq!((d.columns, d.rows), (2, 2));
        assert_eq!(c.districts["."].members, vec!["README.md"]);
        assert_eq!(c.district_of("contracts/C.sol").map(|d| d.path.as_str()), Some("contracts"));
        for (path, building) in &c.buildings {
            assert!(path.starts_with(&building.district) || building.district == ".");
        }
    }

    #[test]
    fn condition_mode_ties_go_worse() {
        assert_eq!(mode(&[Condition::Good, Condition::Poor]), Condition::Poor);
        assert_eq!(
            mode(&[Condition::Good, Condition::Good, Condition::Poor]),
            Condition::Good
        );
    }

    #[test]
    fn roads_join_districts_with_shared_kinds() {
        let c = city(vec![
            facts("lib/a.rs", 0, 0, &["security/reentrancy", "bug/null"]),
            facts("src/b.rs", 0, 0, &["security/reentrancy"]),
            facts("tests/c.rs", 0, 0, &["style/naming"]),
        ]);
        assert_eq!(
            c.roads,
            vec![Road {
                from: "lib".to_string(),
                to: "src".to_string(),
                shared_kinds: vec!["security/reentrancy".to_string()],
            }]
        );
    }

    #[test]
    fn lots_do_not_overlap() {
        let c = city(vec![
            facts("a/1.rs", 0, 0, &[]),
            facts("a/2.rs", 0, 0, &[]),
            facts("b/1.rs", 0, 0, &[]),
        ]);
        let positions: BTreeSet<(u32, u32)> = c
            .buildings
            .values()
            .map(|b| (b.position.x, b.position.y))
            .collect();
        assert_eq!(positions.len(), 3);
        assert_eq!(c.districts["b"].origin.x, 2 * LOT_SIZE + ROAD_WIDTH);
    }
}

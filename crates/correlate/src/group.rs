use crate::CorrelationConfig;
use codecity_model::Finding;
use std::collections::{BTreeMap, BTreeSet};

/// Keys under which two findings are rule-equivalent: the canonical rule
/// their rule key maps to, and `category/sub_kind`.
fn equivalence_keys(finding: &Finding, config: &CorrelationConfig) -> Vec<String> {
    let mut keys = Vec::with_capacity(2);
    if let Some(canonical) = finding
        .rule_key
        .as_deref()
        .and_then(|rule| config.canonical_rule(rule))
    {
        keys.push(format!("rule:{canonical}"));
    }
    if let Some(kind) = finding.qualified_kind() {
        keys.push(format!("kind:{kind}"));
    }
    keys
}

/// Same file is implied by the neighborhood; a file-level finding (line 0)
/// is close to every line.
fn proximate(a: &Finding, b: &Finding, tolerance: u32) -> bool {
    let (la, lb) = (a.location.line, b.location.line);
    la == 0 || lb == 0 || la.abs_diff(lb) <= tolerance
}

struct DisjointSets<'a> {
    parent: Vec<usize>,
    adapters: Vec<BTreeSet<&'a str>>,
}

impl<'a> DisjointSets<'a> {
    fn new(findings: &[&'a Finding]) -> Self {
        Self {
            parent: (0..findings.len()).collect(),
            adapters: findings
                .iter()
                .map(|f| BTreeSet::from([f.adapter.as_str()]))
                .collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Merge unless the two sets share an adapter. The smaller index stays
    /// root so groups are keyed by their first member.
    fn union_disjoint(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb || !self.adapters[ra].is_disjoint(&self.adapters[rb]) {
            return false;
        }
        let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
        let moved = std::mem::take(&mut self.adapters[child]);
        self.adapters[root].extend(moved);
        self.parent[child] = root;
        true
    }
}

/// Partition `findings` into correlation groups.
///
/// Candidates are bucketed by canonical file. Within a bucket, pairs are
/// visited in input order and merged when they are rule-equivalent, within
/// the location tolerance, and the merge keeps every adapter distinct.
/// Returned groups hold input indices, ascending, ordered by first member.
#[must_use]
pub fn group_findings(findings: &[&Finding], config: &CorrelationConfig) -> Vec<Vec<usize>> {
    let keys: Vec<Vec<String>> = findings
        .iter()
        .map(|f| equivalence_keys(f, config))
        .collect();

    let mut neighborhoods: BTreeMap<Option<&str>, Vec<usize>> = BTreeMap::new();
    for (i, finding) in findings.iter().enumerate() {
        neighborhoods.entry(finding.file()).or_default().push(i);
    }

    let mut sets = DisjointSets::new(findings);
    for members in neighborhoods.values() {
        for (pos, &i) in members.iter().enumerate() {
            if keys[i].is_empty() {
                continue;
            }
            for &j in &members[pos + 1..] {
                let equivalent = keys[i].iter().any(|k| keys[j].contains(k));
                if equivalent && proximate(findings[i], findings[j], config.location_tolerance) {
                    sets.union_disjoint(i, j);
                }
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..findings.len() {
        let root = sets.find(i);
        groups.entry(root).or_default().push(i);
    }
    groups.into_values().collect()
}

use crate::canonicalize::{MountMapping, PathCanonicalizer};
use crate::native::{NativeMetric, NativeOutput, NativePayload};
use crate::normalizer::{
    DraftFinding, Drafts, Normalizer, RecordNormalizer, SarifNormalizer, VerificationNormalizer,
};
use crate::severity_map::SeverityScheme;
use codecity_model::{
    finding_id, validate_finding, AdapterCounters, Finding, Location, Metric, MetricScope,
    Repository,
};
use std::collections::HashMap;

/// Normalized output of one adapter, ready to become its `AdapterResult`.
#[derive(Debug, Default)]
pub struct Normalized {
    pub findings: Vec<Finding>,
    pub metrics: Vec<Metric>,
    pub counters: AdapterCounters,
}

/// The membrane between adapter-native output and the unified model:
/// dispatches to the family normalizer, canonicalizes locations, assigns
/// stable ids and validates every finding. Adapter order is preserved.
pub struct FindingNormalizer<'a> {
    canonicalizer: &'a PathCanonicalizer,
    repository: &'a Repository,
}

impl<'a> FindingNormalizer<'a> {
    pub fn new(canonicalizer: &'a PathCanonicalizer, repository: &'a Repository) -> Self {
        Self {
            canonicalizer,
            repository,
        }
    }

    pub fn normalize(
        &self,
        adapter_id: &str,
        mounts: &[MountMapping],
        default_scheme: SeverityScheme,
        output: NativeOutput,
    ) -> Normalized {
        let scheme = output.scheme.unwrap_or(default_scheme);
        let mut drafts = Drafts::default();
        let family = output.payload.family();
        match &output.payload {
            NativePayload::Records(records) => {
                RecordNormalizer.normalize(records, scheme, &mut drafts)
            }
            NativePayload::Sarif(docs) => SarifNormalizer.normalize(docs, scheme, &mut drafts),
            NativePayload::Verification(docs) => {
                VerificationNormalizer.normalize(docs, scheme, &mut drafts)
            }
        }

        let mut normalized = Normalized {
            counters: AdapterCounters {
                invariant_violations: drafts.rejected + output.rejected,
                targets_ok: output.targets_ok,
                targets_failed: output.targets_failed,
                ..AdapterCounters::default()
            },
            ..Normalized::default()
        };

        let mut ordinals: HashMap<String, usize> = HashMap::new();
        for draft in drafts.findings {
            let Some(location) = self.locate(adapter_id, mounts, &draft) else {
                normalized.counters.dropped_unresolved_paths += 1;
                continue;
            };
            let finding = self.finish(adapter_id, draft, location, &mut ordinals);
            match validate_finding(&finding, self.repository) {
                Ok(()) => normalized.findings.push(finding),
                Err(e) => {
                    log::debug!("Dropping finding from {adapter_id}: {e}");
                    normalized.counters.invariant_violations += 1;
                }
            }
        }

        for metric in output.metrics {
            if let Some(metric) = self.metric(adapter_id, mounts, metric) {
                normalized.metrics.push(metric);
            }
        }

        let dropped = normalized.counters.dropped();
        if dropped > 0 {
            log::info!(
                "{adapter_id} ({family}): kept {} findings, dropped {dropped} ({} unresolved paths, {} invariant violations)",
                normalized.findings.len(),
                normalized.counters.dropped_unresolved_paths,
                normalized.counters.invariant_violations
            );
        }
        normalized
    }

    fn locate(
        &self,
        adapter_id: &str,
        mounts: &[MountMapping],
        draft: &DraftFinding,
    ) -> Option<Location> {
        let Some(raw) = draft.raw_path.as_deref() else {
            return Some(Location::repo());
        };
        let resolved = match self.canonicalizer.resolve(adapter_id, mounts, raw) {
            Ok(resolved) => resolved,
            Err(e) => {
                log::debug!("{adapter_id}: cannot resolve {raw:?}: {e}");
                return None;
            }
        };
        if !self.repository.contains(&resolved.path) {
            log::debug!(
                "{adapter_id}: {} is not a repository file",
                resolved.path
            );
            return None;
        }

        let line = draft.line.or(resolved.line).unwrap_or(0);
        let mut location = Location::file(resolved.path, line);
        location.end_line = draft.end_line.filter(|_| line > 0);
        location.entity = draft.entity.clone();
        Some(location)
    }

    fn finish(
        &self,
        adapter_id: &str,
        draft: DraftFinding,
        location: Location,
        ordinals: &mut HashMap<String, usize>,
    ) -> Finding {
        let base = finding_id(
            adapter_id,
            draft.rule_key.as_deref(),
            &location,
            &draft.message,
            0,
        );
        let ordinal = ordinals.entry(base.clone()).or_insert(0);
        let id = if *ordinal == 0 {
            base
        } else {
            finding_id(
                adapter_id,
                draft.rule_key.as_deref(),
                &location,
                &draft.message,
                *ordinal,
            )
        };
        *ordinal += 1;

        Finding {
            id,
            adapter: adapter_id.to_string(),
            kind: draft.kind,
            category: draft.category,
            sub_kind: draft.sub_kind,
            severity: draft.severity,
            confidence: draft.confidence,
            location,
            rule_key: draft.rule_key,
            message: draft.message,
            effort_minutes: draft.effort_minutes,
            tags: draft.tags,
            verdict: draft.verdict,
        }
    }

    fn metric(
        &self,
        adapter_id: &str,
        mounts: &[MountMapping],
        metric: NativeMetric,
    ) -> Option<Metric> {
        if !metric.value.is_finite() {
            log::debug!("{adapter_id}: non-finite metric {}", metric.key);
            return None;
        }
        let scope = match metric.file.as_deref() {
            None => MetricScope::Repo,
            Some(raw) => {
                let path = self
                    .canonicalizer
                    .resolve(adapter_id, mounts, raw)
                    .ok()
                    .map(|r| r.path)
                    .filter(|p| self.repository.contains(p));
                let Some(path) = path else {
                    log::debug!("{adapter_id}: dropping metric {} for {raw:?}", metric.key);
                    return None;
                };
                match metric.entity {
                    Some(name) => MetricScope::Entity { file: path, name },
                    None => MetricScope::File { path },
                }
            }
        };
        Some(Metric {
            scope,
            key: metric.key,
            value: metric.value,
            unit: metric.unit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeRecord;
    use codecity_model::{Confidence, FileCategory, Language, RepoFile, Severity};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Repository) {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/a.c"), b"int a;").unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();
        let repo = Repository::new(root).with_files([RepoFile {
            path: "src/a.c".to_string(),
            language: Language::C,
            category: FileCategory::Source,
            size_bytes: 6,
            mtime_ms: 0,
        }]);
        (temp, repo)
    }

    #[test]
    fn blocker_record_becomes_one_critical_finding() {
        let (_temp, repo) = setup();
        let canon = PathCanonicalizer::new(&repo.root).unwrap();
        let output = NativeOutput::records(vec![NativeRecord::new("overflow")
            .at("src/a.c", 42)
            .rule("c:S3519")
            .severity("blocker")]);

        let normalized = FindingNormalizer::new(&canon, &repo).normalize(
            "sonar",
            &[],
            SeverityScheme::Sonar,
            output,
        );
        assert_eq!(normalized.findings.len(), 1);
        let finding = &normalized.findings[0];
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.location.file.as_deref(), Some("src/a.c"));
        assert_eq!(finding.location.line, 42);
        assert_eq!(finding.adapter, "sonar");
    }

    #[test]
    fn unresolved_and_invalid_findings_are_counted() {
        let (_temp, repo) = setup();
        let canon = PathCanonicalizer::new(&repo.root).unwrap();
        let proof_issue = NativeRecord {
            confidence: Some("proof".to_string()),
            ..NativeRecord::new("claims proof").at("src/a.c", 1).severity("low")
        };
        let output = NativeOutput::records(vec![
            NativeRecord::new("outside").at("../../etc/passwd", 1),
            NativeRecord::new("missing").at("src/gone.c", 1),
            proof_issue,
            NativeRecord::new("repo scope").severity("info"),
        ])
        .with_metrics(vec![
            NativeMetric::file("src/a.c", "loc", 120.0),
            NativeMetric::file("nowhere.c", "loc", 1.0),
        ]);

        let normalized = FindingNormalizer::new(&canon, &repo).normalize(
            "tool",
            &[],
            SeverityScheme::Generic,
            output,
        );
        assert_eq!(normalized.counters.dropped_unresolved_paths, 2);
        assert_eq!(normalized.counters.invariant_violations, 1);
        assert_eq!(normalized.findings.len(), 1);
        assert_eq!(normalized.findings[0].location, Location::repo());
        assert_eq!(normalized.findings[0].confidence, Confidence::Medium);
        assert_eq!(normalized.metrics, vec![Metric::file("src/a.c", "loc", 120.0)]);
    }

    #[test]
    fn duplicate_records_get_distinct_ids() {
        let (_temp, repo) = setup();
        let canon = PathCanonicalizer::new(&repo.root).unwrap();
        let record = NativeRecord::new("dup").at("src/a.c", 3).severity("low");
        let output = NativeOutput::records(vec![record.clone(), record]);
        let normalized = FindingNormalizer::new(&canon, &repo).normalize(
            "tool",
            &[],
            SeverityScheme::Generic,
            output,
        );
        assert_eq!(normalized.findings.len(), 2);
        assert_ne!(normalized.findings[0].id, normalized.findings[1].id);
    }
}

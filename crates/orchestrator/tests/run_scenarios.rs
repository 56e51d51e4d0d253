use async_trait::async_trait;
use codecity_adapter::{
    Adapter, AdapterDescriptor, AdapterError, AdapterKind, AdapterOptions, AdapterRegistry,
    Capabilities, RepoContext,
};
use codecity_incremental::StateStore;
use codecity_model::{
    AdapterStatus, AvailabilityReport, ErrorKind, FindingKind, RunStatus, Severity,
};
use codecity_normalize::{NativeOutput, NativeRecord, SeverityScheme};
use codecity_orchestrator::{
    AdapterConfig, Environment, Orchestrator, OrchestratorError, RunConfig, RunOutcome,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct FakeAdapter {
    records: Vec<NativeRecord>,
    scheme: SeverityScheme,
    delay: Option<Duration>,
    check_delay: Option<Duration>,
    available: bool,
    targets_failed: usize,
    executions: Arc<AtomicUsize>,
}

impl FakeAdapter {
    fn new(records: Vec<NativeRecord>) -> Self {
        Self {
            records,
            scheme: SeverityScheme::Generic,
            delay: None,
            check_delay: None,
            available: true,
            targets_failed: 0,
            executions: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn scheme(mut self, scheme: SeverityScheme) -> Self {
        self.scheme = scheme;
        self
    }

    fn sleeping(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn slow_to_check(mut self, delay: Duration) -> Self {
        self.check_delay = Some(delay);
        self
    }

    fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    fn failing_targets(mut self, failed: usize) -> Self {
        self.targets_failed = failed;
        self
    }
}

#[async_trait]
impl Adapter for FakeAdapter {
    fn describe(&self) -> AdapterDescriptor {
        AdapterDescriptor {
            id: "fake",
            name: "Fake analyzer",
            kind: AdapterKind::StaticAnalysis,
            languages_supported: Vec::new(),
            inputs: vec!["source tree"],
            produced_finding_kinds: vec![FindingKind::Issue, FindingKind::Vulnerability],
            options: Vec::new(),
            severity_scheme: self.scheme,
            max_execution_secs: None,
        }
    }

    async fn probe(&self, _root: &Path, _options: &AdapterOptions) -> AvailabilityReport {
        if let Some(delay) = self.check_delay {
            tokio::time::sleep(delay).await;
        }
        if self.available {
            AvailabilityReport::available("fake")
        } else {
            AvailabilityReport::unavailable("fake", "binary not installed").with_missing("fake-bin")
        }
    }

    async fn analyze(&self, ctx: &RepoContext, _options: &AdapterOptions) -> Result<NativeOutput, AdapterError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = ctx.cancel.cancelled() => return Err(AdapterError::Cancelled),
            }
        }
        Ok(NativeOutput::records(self.records.clone()).with_targets(1, self.targets_failed))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            finding_kinds: vec![FindingKind::Issue, FindingKind::Vulnerability],
            ..Capabilities::default()
        }
    }
}

struct Fixture {
    repo: TempDir,
    temp: TempDir,
    registry: AdapterRegistry,
    config: RunConfig,
}

impl Fixture {
    fn new() -> Self {
        let repo = TempDir::new().expect("repo dir");
        let lines = |n: usize| "x\n".repeat(n);
        std::fs::create_dir_all(repo.path().join("src")).expect("mkdir src");
        std::fs::create_dir_all(repo.path().join("contracts")).expect("mkdir contracts");
        std::fs::write(repo.path().join("src/a.c"), lines(80)).expect("write a.c");
        std::fs::write(repo.path().join("contracts/Vault.sol"), lines(200)).expect("write sol");
        Self {
            repo,
            temp: TempDir::new().expect("temp dir"),
            registry: AdapterRegistry::new(),
            config: RunConfig {
                grace_secs: 1,
                ..RunConfig::default()
            },
        }
    }

    /// Registers `adapter` under `id` and adds an instance of it.
    fn adapter(mut self, id: &str, adapter: FakeAdapter) -> Self {
        self.registry
            .register(id, move || Arc::new(adapter.clone()) as Arc<dyn Adapter>);
        self.config.adapters.push(AdapterConfig::new(id));
        self
    }

    fn env(&self, cache: bool) -> Environment {
        Environment {
            temp_dir: Some(self.temp.path().to_path_buf()),
            cache_dir: Some(self.temp.path().join("cache")),
            cache_enabled: Some(cache),
            concurrency: Some("2".to_string()),
        }
    }

    fn orchestrator(&self, cache: bool) -> Orchestrator {
        Orchestrator::new(self.config.clone(), &self.registry, self.env(cache)).expect("config")
    }

    async fn run(&self) -> RunOutcome {
        self.orchestrator(false)
            .run(self.repo.path(), CancellationToken::new())
            .await
            .expect("run")
    }
}

fn reentrancy(line: u32, severity: &str) -> NativeRecord {
    NativeRecord::new("external call before state update")
        .at("contracts/Vault.sol", line)
        .severity(severity)
        .category("security", Some("reentrancy"))
}

#[tokio::test]
async fn zero_adapter_run_is_degraded_and_empty() {
    let outcome = Fixture::new().run().await;

    assert_eq!(outcome.status(), RunStatus::Degraded);
    assert!(outcome.document.adapters.is_empty());
    assert!(outcome.document.aggregate.correlations.is_empty());
    assert!(outcome.city.buildings.is_empty());
    assert_eq!(outcome.document.aggregate.total_findings, 0);
}

#[tokio::test]
async fn native_blocker_maps_to_critical() {
    let sonar = FakeAdapter::new(vec![NativeRecord::new("null dereference")
        .at("src/a.c", 42)
        .rule("c:S2259")
        .severity("blocker")])
    .scheme(SeverityScheme::Sonar);
    let outcome = Fixture::new().adapter("sonar", sonar).run().await;

    let findings: Vec<_> = outcome.model.findings().collect();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, Severity::Critical);
    assert_eq!(findings[0].location.file.as_deref(), Some("src/a.c"));
    assert_eq!(findings[0].location.line, 42);
    assert_eq!(outcome.status(), RunStatus::Clean);
}

#[tokio::test]
async fn two_adapters_reach_consensus() {
    let outcome = Fixture::new()
        .adapter("x", FakeAdapter::new(vec![reentrancy(120, "high")]))
        .adapter("y", FakeAdapter::new(vec![reentrancy(122, "critical")]))
        .run()
        .await;

    let correlations = &outcome.document.aggregate.correlations;
    assert_eq!(correlations.len(), 1);
    let c = &correlations[0];
    assert_eq!(c.participants.len(), 2);
    assert_eq!(c.adapters, vec!["x".to_string(), "y".to_string()]);
    // Mean rank 3.5 rounds up.
    assert_eq!(c.consensus_severity, Severity::Critical);
    assert!(!c.disagreement);
}

#[tokio::test]
async fn two_adapters_disagree() {
    let outcome = Fixture::new()
        .adapter("x", FakeAdapter::new(vec![reentrancy(120, "high")]))
        .adapter("y", FakeAdapter::new(vec![reentrancy(122, "low")]))
        .run()
        .await;

    let correlations = &outcome.document.aggregate.correlations;
    assert_eq!(correlations.len(), 1);
    let c = &correlations[0];
    assert!(c.disagreement);
    assert_eq!(c.consensus_severity, Severity::Medium);

    let severities: Vec<Severity> = outcome
        .model
        .participants(c)
        .map(|f| f.severity)
        .collect();
    assert_eq!(severities, vec![Severity::High, Severity::Low]);
}

#[tokio::test]
async fn adapter_timeout_does_not_abort_run() {
    let three = (1..=3)
        .map(|line| NativeRecord::new("unused variable").at("src/a.c", line).severity("low"))
        .collect();
    let mut fixture = Fixture::new()
        .adapter("slow", FakeAdapter::new(Vec::new()).sleeping(Duration::from_secs(30)))
        .adapter("fast", FakeAdapter::new(three));
    fixture.config.adapters[0].timeout_secs = Some(1);

    let outcome = fixture.run().await;
    let results = outcome.results();
    assert_eq!(results[0].adapter_id, "slow");
    assert_eq!(results[0].status, AdapterStatus::Timeout);
    assert_eq!(results[1].status, AdapterStatus::Ok);
    assert_eq!(results[1].findings.len(), 3);
    assert_eq!(outcome.status(), RunStatus::Degraded);
}

#[tokio::test]
async fn hung_availability_check_times_out() {
    let mut fixture = Fixture::new()
        .adapter("stuck", FakeAdapter::new(Vec::new()).slow_to_check(Duration::from_secs(30)))
        .adapter("fast", FakeAdapter::new(vec![reentrancy(3, "low")]));
    fixture.config.adapters[0].timeout_secs = Some(1);

    let outcome = fixture.run().await;
    let stuck = &outcome.results()[0];
    assert_eq!(stuck.status, AdapterStatus::Timeout);
    assert_eq!(stuck.error.as_ref().map(|e| e.kind), Some(ErrorKind::Timeout));
    assert!(!outcome.model.bundle.probes[0].available);
    assert_eq!(outcome.results()[1].status, AdapterStatus::Ok);
    assert_eq!(outcome.status(), RunStatus::Degraded);
}

fn sarif_log(lines: &[u32]) -> String {
    let results: Vec<serde_json::Value> = lines
        .iter()
        .map(|line| {
            serde_json::json!({
                "ruleId": "c/unused",
                "level": "warning",
                "message": { "text": "unused value" },
                "locations": [{ "physicalLocation": {
                    "artifactLocation": { "uri": "src/a.c" },
                    "region": { "startLine": line }
                }}]
            })
        })
        .collect();
    serde_json::json!({
        "version": "2.1.0",
        "runs": [{ "tool": { "driver": { "name": "lint" } }, "results": results }]
    })
    .to_string()
}

#[tokio::test]
async fn rewritten_report_outside_repo_misses_cache() {
    let mut fixture = Fixture::new();
    let report = fixture.temp.path().join("reports/scan.sarif");
    std::fs::create_dir_all(report.parent().expect("parent")).expect("mkdir reports");
    std::fs::write(&report, sarif_log(&[1])).expect("write report");
    fixture.registry = AdapterRegistry::with_builtins();
    fixture.config.adapters.push(AdapterConfig::new("sarif").with_option(
        "reports",
        toml::Value::Array(vec![report.to_string_lossy().into_owned().into()]),
    ));
    fixture.config.cache.allow_list = vec!["sarif".to_string()];

    let fixture = &fixture;
    let run = || async move {
        fixture
            .orchestrator(true)
            .run(fixture.repo.path(), CancellationToken::new())
            .await
            .expect("run")
    };
    let first = run().await;
    assert_eq!(first.results()[0].findings.len(), 1);

    std::fs::write(&report, sarif_log(&[1, 2, 3])).expect("rewrite report");
    let second = run().await;
    assert!(!second.results()[0].cache_hit);
    assert_eq!(second.results()[0].findings.len(), 3);

    let third = run().await;
    assert!(third.results()[0].cache_hit);
    assert_eq!(third.results()[0].findings, second.results()[0].findings);
}

#[tokio::test]
async fn second_run_is_served_from_cache() {
    let fake = FakeAdapter::new(vec![reentrancy(10, "high"), reentrancy(40, "medium")]);
    let executions = fake.executions.clone();
    let mut fixture = Fixture::new().adapter("scanner", fake);
    fixture.config.cache.allow_list = vec!["scanner".to_string()];

    let first = fixture
        .orchestrator(true)
        .run(fixture.repo.path(), CancellationToken::new())
        .await
        .expect("first run");
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert!(!first.results()[0].cache_hit);

    // A fresh orchestrator has an empty memory tier, so this hit comes from disk.
    let second = fixture
        .orchestrator(true)
        .run(fixture.repo.path(), CancellationToken::new())
        .await
        .expect("second run");
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert!(second.results()[0].cache_hit);
    assert_eq!(second.results()[0].findings, first.results()[0].findings);
}

#[tokio::test]
async fn unavailable_adapter_is_skipped() {
    let outcome = Fixture::new()
        .adapter("missing", FakeAdapter::new(Vec::new()).unavailable())
        .adapter("present", FakeAdapter::new(vec![reentrancy(5, "high")]))
        .run()
        .await;

    assert_eq!(outcome.results()[0].status, AdapterStatus::Skipped);
    assert!(!outcome.model.bundle.probes[0].available);
    assert_eq!(outcome.model.bundle.probes[0].missing, vec!["fake-bin".to_string()]);
    assert_eq!(outcome.results()[1].status, AdapterStatus::Ok);
    assert_eq!(outcome.status(), RunStatus::Degraded);
}

#[tokio::test]
async fn failed_targets_make_a_partial_result() {
    let outcome = Fixture::new()
        .adapter(
            "flaky",
            FakeAdapter::new(vec![reentrancy(5, "high")]).failing_targets(2),
        )
        .run()
        .await;

    let result = &outcome.results()[0];
    assert_eq!(result.status, AdapterStatus::Partial);
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.counters.targets_failed, 2);
}

#[tokio::test]
async fn findings_outside_the_repository_are_dropped() {
    let outcome = Fixture::new()
        .adapter(
            "wild",
            FakeAdapter::new(vec![
                reentrancy(5, "high"),
                NativeRecord::new("ghost").at("src/missing.c", 1).severity("low"),
            ]),
        )
        .run()
        .await;

    let result = &outcome.results()[0];
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.counters.dropped(), 1);
}

#[tokio::test]
async fn removing_an_adapter_leaves_the_others_untouched() {
    let x = FakeAdapter::new(vec![reentrancy(120, "high")]);
    let y = FakeAdapter::new(vec![reentrancy(121, "critical")]);
    let z = FakeAdapter::new(vec![NativeRecord::new("magic number").at("src/a.c", 7).severity("low")]);

    let all = Fixture::new()
        .adapter("x", x.clone())
        .adapter("y", y)
        .adapter("z", z.clone())
        .run()
        .await;
    let without_y = Fixture::new().adapter("x", x).adapter("z", z).run().await;

    for id in ["x", "z"] {
        assert_eq!(
            all.model.bundle.result(id).map(|r| &r.findings),
            without_y.model.bundle.result(id).map(|r| &r.findings)
        );
    }
    assert_eq!(all.document.aggregate.correlations[0].participants.len(), 2);
    assert!(without_y
        .document
        .aggregate
        .correlations
        .iter()
        .all(|c| c.adapters.iter().all(|a| a != "y")));
}

#[tokio::test]
async fn seeded_runs_serialize_identically() {
    let mut fixture = Fixture::new()
        .adapter("x", FakeAdapter::new(vec![reentrancy(120, "high")]))
        .adapter("y", FakeAdapter::new(vec![reentrancy(122, "low")]));
    fixture.config.seed = Some(7);

    let first = fixture.run().await.document.to_json_pretty().expect("json");
    let second = fixture.run().await.document.to_json_pretty().expect("json");
    assert_eq!(first, second);
}

#[tokio::test]
async fn caller_cancellation_aborts_without_marking() {
    let fixture = Fixture::new().adapter("x", FakeAdapter::new(vec![reentrancy(1, "low")]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = fixture
        .orchestrator(false)
        .run(fixture.repo.path(), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Cancelled));

    let store = StateStore::for_root(fixture.repo.path());
    assert!(store.load().await.expect("load").is_none());
}

#[tokio::test]
async fn completed_run_marks_state_once() {
    let fixture = Fixture::new().adapter("x", FakeAdapter::new(vec![reentrancy(1, "low")]));
    let outcome = fixture.run().await;

    let marker = StateStore::for_root(fixture.repo.path())
        .load()
        .await
        .expect("load")
        .expect("marker");
    assert_eq!(marker.total_runs, 1);
    assert_eq!(marker.last_run_id.as_deref(), Some(outcome.model.bundle.run.id.as_str()));
    assert_eq!(marker.adapters["x"].status, "ok");
}

use async_trait::async_trait;
use codecity_adapter::{
    find_program, Adapter, AdapterDescriptor, AdapterError, AdapterKind, AdapterOptions,
    AdapterRegistry, Capabilities, RepoContext,
};
use codecity_incremental::StateStore;
use codecity_model::{AdapterResult, AdapterStatus, AvailabilityReport, Metric, MetricScope};
use codecity_normalize::{NativeOutput, SeverityScheme};
use codecity_orchestrator::{AdapterConfig, Environment, Orchestrator, RunConfig, RunOutcome};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args([
            "-c",
            "user.name=Dev",
            "-c",
            "user.email=dev@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {args:?}: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Appends a line to `file` and commits it; returns the new HEAD.
fn commit(dir: &Path, file: &str, n: usize) -> String {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    let mut body = std::fs::read_to_string(&path).unwrap_or_default();
    body.push_str(&format!("line {n}\n"));
    std::fs::write(&path, body).expect("write");
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", &format!("{file} {n}")]);
    git(dir, &["rev-parse", "HEAD"])
}

struct Workspace {
    repo: TempDir,
    temp: TempDir,
}

impl Workspace {
    /// `None` when git is not installed.
    fn new() -> Option<Self> {
        if find_program("git").is_none() {
            eprintln!("git not on PATH; skipping");
            return None;
        }
        let repo = TempDir::new().expect("repo dir");
        git(repo.path(), &["init", "-q"]);
        Some(Self {
            repo,
            temp: TempDir::new().expect("temp dir"),
        })
    }

    fn env(&self) -> Environment {
        Environment {
            temp_dir: Some(self.temp.path().to_path_buf()),
            cache_dir: Some(self.temp.path().join("cache")),
            cache_enabled: Some(false),
            concurrency: Some("1".to_string()),
        }
    }

    async fn run(&self, registry: &AdapterRegistry, adapters: Vec<AdapterConfig>) -> RunOutcome {
        let config = RunConfig {
            adapters,
            grace_secs: 1,
            ..RunConfig::default()
        };
        Orchestrator::new(config, registry, self.env())
            .expect("config")
            .run(self.repo.path(), CancellationToken::new())
            .await
            .expect("run")
    }
}

fn repo_metric(result: &AdapterResult, key: &str) -> Option<f64> {
    result
        .metrics
        .iter()
        .find(|m: &&Metric| m.scope == MetricScope::Repo && m.key == key)
        .map(|m| m.value)
}

#[tokio::test]
async fn history_delta_run_keeps_accumulated_churn() {
    let Some(ws) = Workspace::new() else {
        return;
    };
    let root = ws.repo.path();
    let registry = AdapterRegistry::with_builtins();
    for n in 0..12 {
        commit(root, "hot.rs", n);
    }
    let first = ws.run(&registry, vec![AdapterConfig::new("git-history")]).await;
    assert_eq!(first.results()[0].status, AdapterStatus::Ok);
    assert_eq!(repo_metric(&first.results()[0], "history.commits"), Some(12.0));

    let head = commit(root, "other.rs", 0);
    let second = ws.run(&registry, vec![AdapterConfig::new("git-history")]).await;
    let delta = &second.results()[0];
    assert_eq!(delta.status, AdapterStatus::Ok);
    assert_eq!(repo_metric(delta, "history.commits"), Some(13.0));
    assert!(delta
        .findings
        .iter()
        .any(|f| f.file() == Some("hot.rs") && f.rule_key.as_deref() == Some("git-history/hotspot")));

    let full = ws
        .run(
            &registry,
            vec![AdapterConfig::new("git-history").with_option("full_history", true)],
        )
        .await;
    let full = &full.results()[0];
    assert_eq!(delta.metrics, full.metrics);
    let messages = |r: &AdapterResult| -> Vec<(Option<String>, String)> {
        r.findings
            .iter()
            .map(|f| (f.location.file.clone(), f.message.clone()))
            .collect()
    };
    assert_eq!(messages(delta), messages(full));

    let marker = StateStore::for_root(root)
        .load()
        .await
        .expect("load")
        .expect("marker");
    assert_eq!(marker.adapters["git-history"].commit.as_deref(), Some(head.as_str()));
}

/// Delta-capable adapter that records where it was asked to resume from.
#[derive(Clone, Default)]
struct Resumable {
    fail: Arc<AtomicBool>,
    seen: Arc<Mutex<Vec<(Option<String>, Option<Value>)>>>,
}

#[async_trait]
impl Adapter for Resumable {
    fn describe(&self) -> AdapterDescriptor {
        AdapterDescriptor {
            id: "resumable",
            name: "Resumable scanner",
            kind: AdapterKind::StaticAnalysis,
            languages_supported: Vec::new(),
            inputs: vec!["source tree"],
            produced_finding_kinds: Vec::new(),
            options: Vec::new(),
            severity_scheme: SeverityScheme::Generic,
            max_execution_secs: None,
        }
    }

    async fn probe(&self, _root: &Path, _options: &AdapterOptions) -> AvailabilityReport {
        AvailabilityReport::available("resumable")
    }

    async fn analyze(&self, ctx: &RepoContext, _options: &AdapterOptions) -> Result<NativeOutput, AdapterError> {
        self.seen
            .lock()
            .expect("seen")
            .push((ctx.base_commit.clone(), ctx.previous_state.clone()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(AdapterError::External("scanner crashed".to_string()));
        }
        Ok(NativeOutput::records(Vec::new()).with_state(json!({ "at": ctx.target_commit })))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            delta: true,
            ..Capabilities::default()
        }
    }
}

#[tokio::test]
async fn failed_run_does_not_advance_adapter_base() {
    let Some(ws) = Workspace::new() else {
        return;
    };
    let root = ws.repo.path();
    let adapter = Resumable::default();
    let mut registry = AdapterRegistry::new();
    let shared = adapter.clone();
    registry.register("resumable", move || Arc::new(shared.clone()) as Arc<dyn Adapter>);
    let adapters = || vec![AdapterConfig::new("resumable")];
    let store = StateStore::for_root(root);

    let c1 = commit(root, "src/lib.rs", 1);
    let first = ws.run(&registry, adapters()).await;
    assert_eq!(first.results()[0].status, AdapterStatus::Ok);

    commit(root, "src/lib.rs", 2);
    adapter.fail.store(true, Ordering::SeqCst);
    let second = ws.run(&registry, adapters()).await;
    assert_eq!(second.results()[0].status, AdapterStatus::Failed);
    let marker = store.load().await.expect("load").expect("marker");
    let mark = &marker.adapters["resumable"];
    assert_eq!(mark.status, "failed");
    assert_eq!(mark.commit.as_deref(), Some(c1.as_str()));
    assert_eq!(mark.state(), Some(&json!({ "at": c1 })));

    let c3 = commit(root, "src/lib.rs", 3);
    adapter.fail.store(false, Ordering::SeqCst);
    let third = ws.run(&registry, adapters()).await;
    assert_eq!(third.results()[0].status, AdapterStatus::Ok);

    let from_c1 = (Some(c1.clone()), Some(json!({ "at": c1 })));
    assert_eq!(
        *adapter.seen.lock().expect("seen"),
        vec![(None, None), from_c1.clone(), from_c1]
    );
    let marker = store.load().await.expect("load").expect("marker");
    assert_eq!(marker.adapters["resumable"].commit.as_deref(), Some(c3.as_str()));
    assert_eq!(marker.adapters["resumable"].state(), Some(&json!({ "at": c3 })));
}

use crate::config::{Environment, RunConfig};
use crate::document::RunDocument;
use crate::limits::WorkerPool;
use crate::runner::{run_adapter, AdapterInstance, AdapterRun, DeltaBase, RunScope};
use crate::scratch::ScratchSpace;
use crate::{OrchestratorError, Result};
use codecity_adapter::AdapterRegistry;
use codecity_cache::CacheLayer;
use codecity_correlate::{CorrelatedModel, CorrelationEngine};
use codecity_incremental::{AdapterMark, IncrementalMarker, MarkMetadata, StateStore};
use codecity_model::{
    AdapterResult, AdapterStatus, AnalysisBundle, AnalysisRun, AvailabilityReport, ErrorKind,
    Repository, RunStatus,
};
use codecity_normalize::PathCanonicalizer;
use codecity_projection::{project, City};
use codecity_repo::{changed_paths_between, RepositoryLoader};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Delta runs fall back to a full pass above this many changed files.
const MAX_CHANGED_PATHS: usize = 10_000;

fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

fn hex16(digest: &[u8]) -> String {
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub model: CorrelatedModel,
    pub city: City,
    pub document: RunDocument,
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        self.model.bundle.run.status
    }

    pub fn results(&self) -> &[AdapterResult] {
        &self.model.bundle.adapters
    }
}

enum Pending {
    Spawned(JoinHandle<AdapterRun>),
    Ready(AdapterRun),
}

/// What `collect` hands back, in declaration order.
struct Collected {
    probes: Vec<AvailabilityReport>,
    results: Vec<AdapterResult>,
    states: Vec<Option<Value>>,
}

/// Collection orchestrator: validated adapter set, shared cache and
/// correlation engine for any number of runs.
#[derive(Debug)]
pub struct Orchestrator {
    config: RunConfig,
    env: Environment,
    instances: Vec<Arc<AdapterInstance>>,
    cache: Arc<CacheLayer>,
    engine: CorrelationEngine,
    concurrency: usize,
    options_hash: String,
}

impl Orchestrator {
    /// Validates the configuration against the registry. Every failure here
    /// is a configuration error and nothing has run yet.
    pub fn new(config: RunConfig, registry: &AdapterRegistry, env: Environment) -> Result<Self> {
        config.validate()?;

        let mut instances = Vec::new();
        for entry in &config.adapters {
            let type_id = entry.type_id();
            let Some(adapter) = registry.create(type_id) else {
                return Err(OrchestratorError::config(format!(
                    "adapter {:?}: unknown adapter type {type_id:?}",
                    entry.id
                )));
            };
            let descriptor = adapter.describe();
            let options = descriptor
                .validate_options(&entry.json_options()?)
                .map_err(|source| OrchestratorError::InvalidOptions {
                    adapter: entry.id.clone(),
                    source,
                })?;
            if !entry.enabled {
                log::debug!("Adapter {} disabled in configuration", entry.id);
                continue;
            }
            instances.push(Arc::new(AdapterInstance {
                id: entry.id.clone(),
                type_id: type_id.to_string(),
                capabilities: adapter.capabilities(),
                adapter,
                descriptor,
                options,
                mounts: entry.mounts.clone(),
                timeout: entry
                    .timeout_secs
                    .map_or_else(|| config.adapter_timeout(), Duration::from_secs),
            }));
        }

        let cache = Arc::new(CacheLayer::new(config.cache_config(&env)));
        let engine = CorrelationEngine::new(config.correlation_config());
        let concurrency = config.effective_concurrency(&env);
        let options_hash = options_hash(&instances, &engine);

        Ok(Self {
            config,
            env,
            instances,
            cache,
            engine,
            concurrency,
            options_hash,
        })
    }

    /// Shares an existing cache instead of the one built from configuration.
    pub fn with_cache(mut self, cache: Arc<CacheLayer>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn instances(&self) -> &[Arc<AdapterInstance>] {
        &self.instances
    }

    pub fn cache(&self) -> &Arc<CacheLayer> {
        &self.cache
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn options_hash(&self) -> &str {
        &self.options_hash
    }

    fn reproducible(&self) -> bool {
        self.config.seed.is_some()
    }

    /// Probes every enabled adapter without running it.
    pub async fn probe_all(&self, root: &Path) -> Vec<AvailabilityReport> {
        let mut reports = Vec::with_capacity(self.instances.len());
        for instance in &self.instances {
            let mut report = instance.adapter.probe(root, &instance.options).await;
            report.adapter = instance.id.clone();
            reports.push(report);
        }
        reports
    }

    fn run_id(&self, started_ms: u64, target_commit: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        match self.config.seed {
            Some(seed) => hasher.update(seed.to_le_bytes()),
            None => {
                hasher.update(started_ms.to_le_bytes());
                hasher.update(std::process::id().to_le_bytes());
            }
        }
        hasher.update(self.options_hash.as_bytes());
        hasher.update(target_commit.unwrap_or("").as_bytes());
        format!("run-{}", hex16(&hasher.finalize()))
    }

    /// Previous progress for this repository. Reproducible runs always do a
    /// full pass so the marker cannot change their output.
    async fn marker(&self, store: &StateStore) -> Option<IncrementalMarker> {
        if self.reproducible() {
            return None;
        }
        match store.load().await {
            Ok(marker) => marker,
            Err(e) => {
                log::warn!("Ignoring incremental marker: {e}");
                None
            }
        }
    }

    /// One delta base per instance. Each delta-capable adapter resumes from
    /// its own last successful commit; the rest get a full pass.
    async fn delta_bases(
        &self,
        marker: Option<&IncrementalMarker>,
        repository: &Repository,
    ) -> Vec<DeltaBase> {
        let target = repository.commit.as_deref();
        let mut changed: BTreeMap<String, Option<Vec<String>>> = BTreeMap::new();
        let mut bases = Vec::with_capacity(self.instances.len());
        for instance in &self.instances {
            let base = match (marker, target) {
                (Some(marker), Some(target)) if instance.capabilities.delta => {
                    marker.adapter_base(&instance.id, Some(target))
                }
                _ => None,
            };
            let Some((commit, state)) = base else {
                bases.push(DeltaBase::default());
                continue;
            };
            let changed_paths = match changed.get(commit) {
                Some(paths) => paths.clone(),
                None => {
                    let paths = match target {
                        Some(target) => {
                            changed_paths_between(&repository.root, commit, target, MAX_CHANGED_PATHS)
                                .await
                        }
                        None => None,
                    };
                    changed.insert(commit.to_string(), paths.clone());
                    paths
                }
            };
            bases.push(DeltaBase {
                commit: Some(commit.to_string()),
                changed_paths,
                state: state.cloned(),
            });
        }
        bases
    }

    /// Runs every enabled adapter over `root`, then correlates and projects.
    ///
    /// Only configuration errors and `cancel` firing abort the run; adapter
    /// failures are recorded on their results.
    pub async fn run(&self, root: &Path, cancel: CancellationToken) -> Result<RunOutcome> {
        let started_ms = unix_ms_now();
        let run_deadline = Instant::now() + self.config.run_deadline();

        let repository = Arc::new(RepositoryLoader::new()?.load(root).await?);
        let canonicalizer = PathCanonicalizer::new(&repository.root)?;
        let store = StateStore::for_root(&repository.root);
        let target_commit = repository.commit.clone();
        let marker = self.marker(&store).await;
        let base_commit = marker
            .as_ref()
            .and_then(|m| m.last_commit.clone())
            .filter(|last| Some(last) != target_commit.as_ref());
        let deltas = self.delta_bases(marker.as_ref(), &repository).await;

        let run_id = self.run_id(started_ms, target_commit.as_deref());
        log::info!(
            "Run {run_id}: {} adapters over {} files (concurrency {})",
            self.instances.len(),
            repository.files.len(),
            self.concurrency
        );

        let scope = Arc::new(RunScope {
            repository: repository.clone(),
            canonicalizer,
            cache: self.cache.clone(),
            target_commit: target_commit.clone(),
            run_deadline,
            grace: self.config.grace(),
        });

        let scratch = ScratchSpace::create(&self.env.temp_root(), &run_id).await?;
        let collected = self.collect(&scope, deltas, &scratch, &cancel).await;
        scratch.remove().await;
        let Collected {
            probes,
            results,
            states,
        } = collected.ok_or(OrchestratorError::Cancelled)?;

        let status = RunStatus::from_results(&results);
        let run = AnalysisRun {
            id: run_id.clone(),
            started_at_unix_ms: started_ms,
            finished_at_unix_ms: unix_ms_now(),
            adapters: self.instances.iter().map(|i| i.id.clone()).collect(),
            options_hash: self.options_hash.clone(),
            base_commit,
            target_commit,
            status,
        };
        let bundle = Arc::new(AnalysisBundle::new(run, repository.clone(), probes, results));
        log_summary(&bundle);

        let model = self.engine.correlate(bundle);
        let city = project(&model);
        let mut document = RunDocument::build(&model, city.clone());
        if self.reproducible() {
            document.zero_times();
        }

        record_marker(&store, &repository, &run_id, &model.bundle.adapters, states).await;

        Ok(RunOutcome {
            model,
            city,
            document,
        })
    }

    /// Launches adapters in declaration order under the worker pool and
    /// collects their results in the same order. `None` on cancellation.
    async fn collect(
        &self,
        scope: &Arc<RunScope>,
        deltas: Vec<DeltaBase>,
        scratch: &ScratchSpace,
        cancel: &CancellationToken,
    ) -> Option<Collected> {
        let pool = WorkerPool::new(self.concurrency);
        let mut pending = Vec::with_capacity(self.instances.len());

        for (instance, delta) in self.instances.iter().zip(deltas) {
            let permit = pool.acquire(cancel).await?;
            let scratch_dir = match scratch.for_adapter(&instance.id).await {
                Ok(dir) => dir,
                Err(e) => {
                    let report = AvailabilityReport::available(instance.id.as_str());
                    let result = AdapterResult::empty(
                        instance.id.as_str(),
                        instance.type_id.as_str(),
                        AdapterStatus::Failed,
                    )
                    .with_error(ErrorKind::ExternalError, format!("scratch directory: {e}"));
                    let run = AdapterRun {
                        report,
                        result,
                        state: None,
                    };
                    pending.push((instance, Pending::Ready(run)));
                    continue;
                }
            };
            let task = run_adapter(
                scope.clone(),
                instance.clone(),
                delta,
                scratch_dir,
                cancel.child_token(),
            );
            let handle = tokio::spawn(async move {
                let _permit = permit;
                task.await
            });
            pending.push((instance, Pending::Spawned(handle)));
        }

        let mut collected = Collected {
            probes: Vec::with_capacity(pending.len()),
            results: Vec::with_capacity(pending.len()),
            states: Vec::with_capacity(pending.len()),
        };
        for (instance, entry) in pending {
            let run = match entry {
                Pending::Ready(run) => run,
                Pending::Spawned(handle) => match handle.await {
                    Ok(done) => done,
                    Err(e) => {
                        log::warn!("Adapter {} task failed: {e}", instance.id);
                        AdapterRun {
                            report: AvailabilityReport::available(instance.id.as_str()),
                            result: AdapterResult::empty(
                                instance.id.as_str(),
                                instance.type_id.as_str(),
                                AdapterStatus::Failed,
                            )
                            .with_error(ErrorKind::ExternalError, format!("adapter task: {e}")),
                            state: None,
                        }
                    }
                },
            };
            collected.probes.push(run.report);
            collected.results.push(run.result);
            collected.states.push(run.state);
        }

        if cancel.is_cancelled() {
            log::warn!("Run cancelled by caller");
            return None;
        }
        Some(collected)
    }
}

fn options_hash(instances: &[Arc<AdapterInstance>], engine: &CorrelationEngine) -> String {
    let mut hasher = Sha256::new();
    for instance in instances {
        hasher.update(instance.id.as_bytes());
        hasher.update([0]);
        hasher.update(instance.type_id.as_bytes());
        hasher.update([0]);
        hasher.update(serde_json::to_vec(instance.options.raw()).unwrap_or_default());
        for mount in &instance.mounts {
            hasher.update(mount.from.as_bytes());
            hasher.update(b"=");
            hasher.update(mount.to.as_bytes());
        }
        hasher.update(b"\n");
    }
    hasher.update(serde_json::to_vec(engine.config()).unwrap_or_default());
    hex16(&hasher.finalize())
}

fn log_summary(bundle: &AnalysisBundle) {
    let totals = &bundle.totals;
    log::info!(
        "Run {} {}: {} findings; adapters ok={} partial={} failed={} timeout={} skipped={}; cache hits={}",
        bundle.run.id,
        bundle.run.status.as_str(),
        totals.findings,
        totals.adapters_ok,
        totals.adapters_partial,
        totals.adapters_failed,
        totals.adapters_timeout,
        totals.adapters_skipped,
        totals.cache_hits
    );
}

/// Written once, after every adapter finished. A failed write costs the next
/// run its delta base, nothing more. Only `ok` results move an adapter's
/// commit; the store carries the previous one forward for the rest.
async fn record_marker(
    store: &StateStore,
    repository: &Repository,
    run_id: &str,
    results: &[AdapterResult],
    states: Vec<Option<Value>>,
) {
    let adapters: BTreeMap<String, AdapterMark> = results
        .iter()
        .zip(states)
        .map(|(r, state)| {
            let ok = r.status == AdapterStatus::Ok;
            let mut mark = AdapterMark {
                status: r.status.as_str().to_string(),
                findings: r.findings.len(),
                duration_ms: r.duration_ms,
                commit: ok.then(|| repository.commit.clone()).flatten(),
                extra: BTreeMap::new(),
            };
            if let Some(state) = state.filter(|_| ok) {
                mark.set_state(state);
            }
            (r.adapter_id.clone(), mark)
        })
        .collect();
    let metadata = MarkMetadata {
        run_id: Some(run_id.to_string()),
        adapters,
    };
    if let Err(e) = store
        .mark_analyzed(repository.commit.as_deref(), metadata)
        .await
    {
        log::warn!("Failed to update incremental marker: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterConfig;
    use pretty_assertions::assert_eq;

    fn env(temp: &Path) -> Environment {
        Environment {
            temp_dir: Some(temp.to_path_buf()),
            cache_dir: Some(temp.join("cache")),
            cache_enabled: Some(false),
            concurrency: None,
        }
    }

    #[test]
    fn unknown_adapter_type_is_a_config_error() {
        let temp = tempfile::tempdir().unwrap();
        let config = RunConfig {
            adapters: vec![AdapterConfig::new("mystery")],
            ..RunConfig::default()
        };
        let err = Orchestrator::new(config, &AdapterRegistry::with_builtins(), env(temp.path()))
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("unknown adapter type"));
    }

    #[test]
    fn unknown_option_is_rejected_before_running() {
        let temp = tempfile::tempdir().unwrap();
        let config = RunConfig {
            adapters: vec![AdapterConfig::new("sarif")
                .with_option("reports", toml::Value::Array(vec!["out.sarif".into()]))
                .with_option("colour", "always")],
            ..RunConfig::default()
        };
        let err = Orchestrator::new(config, &AdapterRegistry::with_builtins(), env(temp.path()))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidOptions { ref adapter, .. } if adapter == "sarif"));
    }

    #[test]
    fn disabled_adapters_are_validated_but_not_run() {
        let temp = tempfile::tempdir().unwrap();
        let mut disabled = AdapterConfig::new("git-history");
        disabled.enabled = false;
        let config = RunConfig {
            adapters: vec![disabled],
            ..RunConfig::default()
        };
        let orchestrator =
            Orchestrator::new(config, &AdapterRegistry::with_builtins(), env(temp.path())).unwrap();
        assert!(orchestrator.instances().is_empty());
    }

    #[test]
    fn seeded_run_ids_are_stable() {
        let temp = tempfile::tempdir().unwrap();
        let config = RunConfig {
            seed: Some(42),
            ..RunConfig::default()
        };
        let orchestrator =
            Orchestrator::new(config, &AdapterRegistry::new(), env(temp.path())).unwrap();
        let a = orchestrator.run_id(1, Some("abc"));
        let b = orchestrator.run_id(2, Some("abc"));
        assert_eq!(a, b);
        assert_ne!(a, orchestrator.run_id(1, Some("def")));
        assert!(a.starts_with("run-"));
        assert_eq!(a.len(), "run-".len() + 16);
    }
}

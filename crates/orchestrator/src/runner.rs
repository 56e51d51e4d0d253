use codecity_adapter::{
    Adapter, AdapterDescriptor, AdapterError, AdapterOptions, Capabilities, RepoContext,
};
use codecity_cache::{CacheKey, CacheLayer, SetOptions};
use codecity_model::{
    AdapterCounters, AdapterResult, AdapterStatus, AvailabilityReport, ErrorKind, Finding, Metric,
    Repository,
};
use codecity_normalize::{FindingNormalizer, MountMapping, NativeOutput, PathCanonicalizer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A configured adapter, validated and ready to run.
pub struct AdapterInstance {
    pub id: String,
    pub type_id: String,
    pub adapter: Arc<dyn Adapter>,
    pub descriptor: AdapterDescriptor,
    pub capabilities: Capabilities,
    pub options: AdapterOptions,
    pub mounts: Vec<MountMapping>,
    pub timeout: Duration,
}

impl std::fmt::Debug for AdapterInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterInstance")
            .field("id", &self.id)
            .field("type_id", &self.type_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Read-only state shared by every adapter task of one run.
pub(crate) struct RunScope {
    pub repository: Arc<Repository>,
    pub canonicalizer: PathCanonicalizer,
    pub cache: Arc<CacheLayer>,
    pub target_commit: Option<String>,
    pub run_deadline: Instant,
    pub grace: Duration,
}

/// Where one adapter resumes from: the commit of its last successful run and
/// the state it returned there. Empty for a full pass.
#[derive(Debug, Clone, Default)]
pub(crate) struct DeltaBase {
    pub commit: Option<String>,
    pub changed_paths: Option<Vec<String>>,
    pub state: Option<Value>,
}

/// One adapter's contribution to a run.
#[derive(Debug)]
pub(crate) struct AdapterRun {
    pub report: AvailabilityReport,
    pub result: AdapterResult,
    /// State to persist when the result is `ok`.
    pub state: Option<Value>,
}

impl AdapterRun {
    fn stateless(report: AvailabilityReport, result: AdapterResult) -> Self {
        Self {
            report,
            result,
            state: None,
        }
    }
}

/// What the cache stores per adapter: the normalized result, never the
/// tool's native output.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedOutcome {
    status: AdapterStatus,
    findings: Vec<Finding>,
    metrics: Vec<Metric>,
    counters: AdapterCounters,
    #[serde(default)]
    state: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    AdapterTimeout,
    RunDeadline,
    DeclaredBudget,
}

impl Bound {
    fn describe(self) -> &'static str {
        match self {
            Bound::AdapterTimeout => "adapter timeout",
            Bound::RunDeadline => "run deadline",
            Bound::DeclaredBudget => "declared execution budget",
        }
    }
}

/// Earliest of the three bounds, measured from `started`.
fn effective_deadline(
    started: Instant,
    timeout: Duration,
    run_deadline: Instant,
    budget: Option<Duration>,
) -> (Instant, Bound) {
    let mut deadline = (started + timeout, Bound::AdapterTimeout);
    if run_deadline < deadline.0 {
        deadline = (run_deadline, Bound::RunDeadline);
    }
    if let Some(budget) = budget {
        if started + budget < deadline.0 {
            deadline = (started + budget, Bound::DeclaredBudget);
        }
    }
    deadline
}

/// Why an adapter did not run to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    TimedOut(Bound),
    Cancelled,
}

enum Outcome {
    Finished(codecity_adapter::Result<NativeOutput>),
    Stopped(Stop),
}

/// Path, size and mtime of every declared cache input. Missing files are
/// keyed as such.
async fn input_fingerprints(paths: Vec<PathBuf>) -> Value {
    let mut fingerprints = Vec::with_capacity(paths.len());
    for path in paths {
        let shown = path.to_string_lossy().into_owned();
        let fingerprint = match tokio::fs::metadata(&path).await {
            Ok(meta) => {
                let mtime_ns = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
                json!({ "path": shown, "size": meta.len(), "mtime_ns": mtime_ns })
            }
            Err(_) => json!({ "path": shown, "missing": true }),
        };
        fingerprints.push(fingerprint);
    }
    Value::Array(fingerprints)
}

fn cache_key(
    scope: &RunScope,
    instance: &AdapterInstance,
    delta: &DeltaBase,
    inputs: Value,
) -> CacheKey {
    let options: serde_json::Map<String, Value> = instance
        .options
        .raw()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let mounts: Vec<Value> = instance
        .mounts
        .iter()
        .map(|m| Value::String(format!("{}={}", m.from, m.to)))
        .collect();
    let mut key = CacheKey::new(
        instance.type_id.as_str(),
        scope.repository.root_display(),
        scope.repository.freshness_token(),
    )
    .option("instance", Value::String(instance.id.clone()))
    .option("options", Value::Object(options))
    .option("mounts", Value::Array(mounts))
    .option("inputs", inputs);
    if instance.capabilities.delta {
        let base = delta.commit.clone().map_or(Value::Null, Value::String);
        key = key.option("base", base);
    }
    key
}

fn status_for_error(error: &AdapterError) -> AdapterStatus {
    match error {
        AdapterError::Timeout(_) => AdapterStatus::Timeout,
        AdapterError::Unavailable(_) => AdapterStatus::Skipped,
        _ => AdapterStatus::Failed,
    }
}

/// Probe, consult the cache, run under the three bounds, normalize. Every
/// failure ends up on the returned result.
pub(crate) async fn run_adapter(
    scope: Arc<RunScope>,
    instance: Arc<AdapterInstance>,
    delta: DeltaBase,
    scratch_dir: PathBuf,
    cancel: CancellationToken,
) -> AdapterRun {
    let id = instance.id.as_str();
    let started = Instant::now();
    let (deadline, bound) = effective_deadline(
        started,
        instance.timeout,
        scope.run_deadline,
        instance.descriptor.max_execution(),
    );

    let probe = tokio::select! {
        report = instance.adapter.probe(&scope.repository.root, &instance.options) => Ok(report),
        () = tokio::time::sleep_until(deadline) => Err(Stop::TimedOut(bound)),
        () = cancel.cancelled() => Err(Stop::Cancelled),
    };
    let mut report = match probe {
        Ok(report) => report,
        Err(stop) => {
            let report = AvailabilityReport::unavailable(id, "availability check did not finish");
            let result = stopped(&instance, stop, started.elapsed());
            return AdapterRun::stateless(report, result);
        }
    };
    report.adapter = instance.id.clone();
    if !report.available {
        let reason = report.reason.clone().unwrap_or_else(|| "unavailable".to_string());
        log::warn!("Skipping adapter {id}: {reason}");
        let result = AdapterResult::empty(id, instance.type_id.as_str(), AdapterStatus::Skipped)
            .with_error(ErrorKind::Unavailable, reason);
        return AdapterRun::stateless(report, result);
    }

    let cache_enabled =
        scope.cache.is_enabled() && scope.cache.policy().covers_repo(scope.repository.total_bytes());
    let key = if cache_enabled {
        let inputs = instance
            .adapter
            .cache_inputs(&scope.repository.root, &instance.options);
        let inputs = input_fingerprints(inputs).await;
        Some(cache_key(&scope, &instance, &delta, inputs))
    } else {
        None
    };
    if let Some(key) = &key {
        if let Some(cached) = scope.cache.get::<CachedOutcome>(key).await {
            log::info!(
                "Adapter {id} served from cache ({} findings)",
                cached.findings.len()
            );
            let mut result = AdapterResult::empty(id, instance.type_id.as_str(), cached.status);
            result.cache_hit = true;
            result.findings = cached.findings;
            result.metrics = cached.metrics;
            result.counters = cached.counters;
            return AdapterRun {
                report,
                result,
                state: cached.state,
            };
        }
    }

    if let Some(base) = &delta.commit {
        log::debug!("Adapter {id} resumes from {base}");
    }
    let ctx = RepoContext {
        repository: scope.repository.clone(),
        target_commit: scope.target_commit.clone(),
        base_commit: delta.commit,
        changed_paths: delta.changed_paths,
        previous_state: delta.state,
        scratch_dir,
        cancel: cancel.clone(),
        deadline,
    };

    let analysis = instance.adapter.analyze(&ctx, &instance.options);
    tokio::pin!(analysis);
    let outcome = tokio::select! {
        output = &mut analysis => Outcome::Finished(output),
        () = tokio::time::sleep_until(deadline) => Outcome::Stopped(Stop::TimedOut(bound)),
        () = cancel.cancelled() => Outcome::Stopped(Stop::Cancelled),
    };
    if !matches!(outcome, Outcome::Finished(_)) {
        ctx.cancel.cancel();
        if tokio::time::timeout(scope.grace, &mut analysis).await.is_err() {
            log::debug!("Adapter {id} ignored cancellation for the whole grace window");
        }
    }
    let elapsed = started.elapsed();

    let mut result = AdapterResult::empty(id, instance.type_id.as_str(), AdapterStatus::Ok);
    let mut state = None;
    match outcome {
        Outcome::Finished(Ok(mut output)) => {
            state = output.state.take();
            let partial = output.is_partial();
            let normalizer = FindingNormalizer::new(&scope.canonicalizer, &scope.repository);
            let normalized = normalizer.normalize(
                id,
                &instance.mounts,
                instance.descriptor.severity_scheme,
                output,
            );
            result.findings = normalized.findings;
            result.metrics = normalized.metrics;
            result.counters = normalized.counters;
            if partial {
                result.status = AdapterStatus::Partial;
                let message = format!(
                    "{} of {} targets failed",
                    result.counters.targets_failed,
                    result.counters.targets_ok + result.counters.targets_failed
                );
                result = result.with_error(ErrorKind::Partial, message);
            }
        }
        Outcome::Finished(Err(e)) => {
            result.status = status_for_error(&e);
            result = result.with_error(e.kind(), e.to_string());
        }
        Outcome::Stopped(stop) => result = stopped(&instance, stop, elapsed),
    }
    result.duration_ms = elapsed.as_millis() as u64;

    log::info!(
        "Adapter {id} finished: {} in {}ms ({} findings)",
        result.status.as_str(),
        result.duration_ms,
        result.findings.len()
    );

    if let Some(key) = &key {
        store(&scope, &instance, key, &result, state.as_ref(), elapsed).await;
    }
    AdapterRun {
        report,
        result,
        state,
    }
}

/// Result for an adapter stopped by a bound or by the caller, during the
/// availability check or during analysis.
fn stopped(instance: &AdapterInstance, stop: Stop, elapsed: Duration) -> AdapterResult {
    let id = instance.id.as_str();
    let mut result = AdapterResult::empty(id, instance.type_id.as_str(), AdapterStatus::Failed);
    match stop {
        Stop::TimedOut(bound) => {
            log::warn!(
                "Adapter {id} hit the {} after {}ms",
                bound.describe(),
                elapsed.as_millis()
            );
            result.status = AdapterStatus::Timeout;
            result = result.with_error(ErrorKind::Timeout, format!("{} exceeded", bound.describe()));
        }
        Stop::Cancelled => {
            result = result.with_error(ErrorKind::Cancelled, "run cancelled");
        }
    }
    result.duration_ms = elapsed.as_millis() as u64;
    result
}

async fn store(
    scope: &RunScope,
    instance: &AdapterInstance,
    key: &CacheKey,
    result: &AdapterResult,
    state: Option<&Value>,
    elapsed: Duration,
) {
    if !matches!(result.status, AdapterStatus::Ok | AdapterStatus::Partial) {
        return;
    }
    let admitted = scope.cache.policy().admits(
        &instance.type_id,
        0,
        scope.repository.total_bytes(),
        elapsed,
    );
    if !admitted {
        return;
    }
    let cached = CachedOutcome {
        status: result.status,
        findings: result.findings.clone(),
        metrics: result.metrics.clone(),
        counters: result.counters.clone(),
        state: state.cloned(),
    };
    if let Err(e) = scope
        .cache
        .set(key, &cached, SetOptions::persistent())
        .await
    {
        log::debug!("Failed to cache {} result: {e}", instance.id);
    }
}

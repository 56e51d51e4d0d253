use crate::limits::{default_concurrency, parse_concurrency};
use crate::{OrchestratorError, Result};
use codecity_cache::{CacheConfig, CachePolicy};
use codecity_correlate::CorrelationConfig;
use codecity_normalize::MountMapping;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_RUN_DEADLINE_SECS: u64 = 3600;
pub const DEFAULT_GRACE_SECS: u64 = 5;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;

/// Run configuration, usually read from `codecity.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub concurrency: Option<usize>,
    pub adapter_timeout_secs: u64,
    pub run_deadline_secs: u64,
    pub grace_secs: u64,
    /// Enables reproducible mode.
    pub seed: Option<u64>,
    #[serde(rename = "adapter")]
    pub adapters: Vec<AdapterConfig>,
    pub cache: CacheSection,
    pub correlation: CorrelationConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            adapter_timeout_secs: DEFAULT_ADAPTER_TIMEOUT_SECS,
            run_deadline_secs: DEFAULT_RUN_DEADLINE_SECS,
            grace_secs: DEFAULT_GRACE_SECS,
            seed: None,
            adapters: Vec::new(),
            cache: CacheSection::default(),
            correlation: CorrelationConfig::default(),
        }
    }
}

/// One `[[adapter]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterConfig {
    /// Instance id, unique within the run.
    pub id: String,
    /// Registry key; defaults to `id`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub adapter_type: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reliability: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<MountMapping>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, toml::Value>,
}

fn default_true() -> bool {
    true
}

impl AdapterConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            adapter_type: None,
            enabled: true,
            timeout_secs: None,
            reliability: None,
            mounts: Vec::new(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_type(mut self, adapter_type: impl Into<String>) -> Self {
        self.adapter_type = Some(adapter_type.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn type_id(&self) -> &str {
        self.adapter_type.as_deref().unwrap_or(&self.id)
    }

    /// Options as JSON values, the shape adapters validate against.
    pub fn json_options(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        self.options
            .iter()
            .map(|(key, value)| -> Result<(String, serde_json::Value)> {
                Ok((key.clone(), serde_json::to_value(value)?))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
    pub ttl_secs: u64,
    pub memory_capacity: usize,
    /// Adapter types cached regardless of how long they took.
    pub allow_list: Vec<String>,
    pub min_exec_ms: u64,
    pub max_disk_entries: Option<usize>,
}

impl Default for CacheSection {
    fn default() -> Self {
        let policy = CachePolicy::default();
        Self {
            enabled: None,
            dir: None,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            memory_capacity: 256,
            allow_list: Vec::new(),
            min_exec_ms: policy.min_exec.as_millis() as u64,
            max_disk_entries: Some(10_000),
        }
    }
}

/// The environment recognized by the core. Captured once so runs never read
/// process state mid-flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub temp_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub cache_enabled: Option<bool>,
    pub concurrency: Option<String>,
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Environment {
    pub fn from_env() -> Self {
        let path = |var: &str| {
            std::env::var_os(var)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            temp_dir: path("TEMP_DIR"),
            cache_dir: path("CACHE_DIR"),
            cache_enabled: std::env::var("CACHE_ENABLED")
                .ok()
                .and_then(|v| parse_bool(&v)),
            concurrency: std::env::var("CODECITY_CONCURRENCY").ok(),
        }
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.temp_root().join("codecity-cache"))
    }
}

impl RunConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Worker pool size: environment, then file, then the default.
    pub fn effective_concurrency(&self, env: &Environment) -> usize {
        let fallback = parse_concurrency(
            self.concurrency.map(|c| c.to_string()).as_deref(),
            default_concurrency(),
        );
        parse_concurrency(env.concurrency.as_deref(), fallback)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    /// `CACHE_ENABLED` wins over the file; `CACHE_DIR` only fills a missing
    /// `dir`.
    pub fn cache_config(&self, env: &Environment) -> CacheConfig {
        let section = &self.cache;
        CacheConfig {
            enabled: env.cache_enabled.or(section.enabled).unwrap_or(true),
            dir: Some(section.dir.clone().unwrap_or_else(|| env.cache_root())),
            ttl: (section.ttl_secs > 0).then(|| Duration::from_secs(section.ttl_secs)),
            memory_capacity: section.memory_capacity,
            max_disk_entries: section.max_disk_entries,
            policy: CachePolicy {
                allow_list: section.allow_list.iter().cloned().collect(),
                min_exec: Duration::from_millis(section.min_exec_ms),
                ..CachePolicy::default()
            },
        }
    }

    /// Checks that need no registry: timeouts, reliabilities, duplicate ids
    /// and the correlation tables.
    pub fn validate(&self) -> Result<()> {
        if self.adapter_timeout_secs == 0 || self.run_deadline_secs == 0 {
            return Err(OrchestratorError::config(
                "adapter_timeout_secs and run_deadline_secs must be positive",
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        for adapter in &self.adapters {
            if adapter.id.trim().is_empty() {
                return Err(OrchestratorError::config("adapter id must not be empty"));
            }
            if !seen.insert(adapter.id.as_str()) {
                return Err(OrchestratorError::config(format!(
                    "duplicate adapter id {:?}",
                    adapter.id
                )));
            }
            if let Some(r) = adapter.reliability {
                if !(0.0..=1.0).contains(&r) {
                    return Err(OrchestratorError::config(format!(
                        "adapter {:?}: reliability {r} is outside [0, 1]",
                        adapter.id
                    )));
                }
            }
            if adapter.timeout_secs == Some(0) {
                return Err(OrchestratorError::config(format!(
                    "adapter {:?}: timeout_secs must be positive",
                    adapter.id
                )));
            }
        }
        if let Some(problem) = self.correlation.problems().into_iter().next() {
            return Err(OrchestratorError::config(format!("correlation: {problem}")));
        }
        Ok(())
    }

    /// Correlation settings with per-adapter reliabilities folded in.
    pub fn correlation_config(&self) -> CorrelationConfig {
        let mut config = self.correlation.clone();
        for adapter in &self.adapters {
            if let Some(r) = adapter.reliability {
                config.reliability.insert(adapter.id.clone(), r);
            }
        }
        config
    }
}

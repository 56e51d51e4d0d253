use crate::{load_config, AdaptersCommand, CacheCommand, StateCommand};
use anyhow::{Context, Result};
use codecity_adapter::AdapterRegistry;
use codecity_cache::CacheLayer;
use codecity_incremental::StateStore;
use codecity_model::Repository;
use codecity_orchestrator::{run_document_schema, Environment, Orchestrator};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn canonical_root(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).with_context(|| format!("Cannot resolve {}", path.display()))
}

pub(crate) async fn state(cmd: StateCommand) -> Result<()> {
    match cmd {
        StateCommand::Show { path } => {
            let store = StateStore::for_root(&canonical_root(&path)?);
            let marker = store
                .read()
                .await
                .with_context(|| format!("Failed to read {}", store.path().display()))?;
            print_json(&marker)
        }
        StateCommand::Clear { path } => {
            let store = StateStore::for_root(&canonical_root(&path)?);
            let cleared = store.clear().await?;
            print_json(&json!({ "cleared": cleared, "path": store.path() }))
        }
    }
}

pub(crate) fn cache(cmd: CacheCommand, env: Environment) -> Result<()> {
    match cmd {
        CacheCommand::Stats { config } => {
            let config = load_config(&config, None)?.cache_config(&env);
            let enabled = config.enabled;
            let dir = config.dir.clone();
            let usage = CacheLayer::new(config).disk_usage()?;
            print_json(&json!({ "enabled": enabled, "dir": dir, "disk": usage }))
        }
        CacheCommand::Clear { config } => {
            let layer = CacheLayer::new(load_config(&config, None)?.cache_config(&env));
            let removed = layer.clear()?;
            print_json(&json!({ "removed": removed }))
        }
        CacheCommand::Invalidate { path, config } => {
            let root = canonical_root(&path)?;
            let layer = CacheLayer::new(load_config(&config, Some(&root))?.cache_config(&env));
            let repo = Repository::new(root).root_display();
            let removed = layer.invalidate_repo(&repo)?;
            print_json(&json!({ "repository": repo, "removed": removed }))
        }
    }
}

pub(crate) async fn adapters(cmd: AdaptersCommand, env: Environment) -> Result<()> {
    let registry = AdapterRegistry::with_builtins();
    match cmd {
        AdaptersCommand::List => print_json(&registry.descriptors()),
        AdaptersCommand::Probe { path, config } => {
            let root = canonical_root(&path)?;
            let config = load_config(&config, Some(&root))?;
            let orchestrator = Orchestrator::new(config, &registry, env)?;
            print_json(&orchestrator.probe_all(&root).await)
        }
    }
}

pub(crate) fn schema() -> Result<()> {
    print_json(&run_document_schema())
}

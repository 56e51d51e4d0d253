use crate::{load_config, RunArgs};
use anyhow::{Context, Result};
use codecity_adapter::AdapterRegistry;
use codecity_orchestrator::{Environment, Orchestrator, RunDocument};
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub(crate) async fn run(args: RunArgs, mut env: Environment) -> Result<()> {
    let mut config = load_config(&args.config, Some(&args.path))?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.no_cache {
        env.cache_enabled = Some(false);
    }

    let orchestrator = Orchestrator::new(config, &AdapterRegistry::with_builtins(), env)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; cancelling adapters");
            on_signal.cancel();
        }
    });

    let outcome = orchestrator.run(&args.path, cancel).await?;
    print_summary(&outcome.document);

    let json = outcome.document.to_json_pretty()?;
    match &args.output {
        Some(path) => write_atomically(path, &json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn print_summary(document: &RunDocument) {
    let aggregate = &document.aggregate;
    eprintln!(
        "Run {} {}: {} findings, {} correlations, rating {:?}",
        document.run.id,
        document.summary.status.as_str(),
        aggregate.total_findings,
        aggregate.correlations.len(),
        aggregate.rating
    );
    for line in &document.summary.adapters {
        eprintln!("  {line}");
    }
    if let Some(deployment) = &aggregate.deployment {
        eprintln!(
            "  deployment: {} (safety {:.2})",
            if deployment.safe { "safe" } else { "unsafe" },
            deployment.safety_score
        );
    }
}

fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move run document to {}", path.display()))?;
    Ok(())
}

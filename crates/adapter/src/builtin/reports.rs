use crate::{AdapterError, AdapterOptions, RepoContext, Result};
use codecity_model::AvailabilityReport;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

pub(crate) const REPORTS_OPTION: &str = "reports";

fn resolve(root: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Configured report files, resolved against `root`.
pub(crate) fn report_paths(root: &Path, options: &AdapterOptions) -> Vec<PathBuf> {
    options
        .get_str_list(REPORTS_OPTION)
        .iter()
        .map(|raw| resolve(root, raw))
        .collect()
}

/// Available when at least one configured report file exists.
pub(crate) async fn probe_reports(
    adapter: &str,
    root: &Path,
    options: &AdapterOptions,
) -> AvailabilityReport {
    let reports = options.get_str_list(REPORTS_OPTION);
    if reports.is_empty() {
        return AvailabilityReport::unavailable(adapter, "no report files configured");
    }
    let mut missing = Vec::new();
    for raw in &reports {
        if !tokio::fs::try_exists(resolve(root, raw))
            .await
            .unwrap_or(false)
        {
            missing.push(raw.clone());
        }
    }
    if missing.len() == reports.len() {
        let mut report = AvailabilityReport::unavailable(adapter, "no report file exists");
        for raw in missing {
            report = report.with_missing(raw);
        }
        return report;
    }
    AvailabilityReport::available(adapter)
}

/// Parsed documents plus per-file success counts. Unreadable or malformed
/// files are counted as failed targets; if none parse, the adapter fails.
pub(crate) async fn read_reports<T: DeserializeOwned>(
    ctx: &RepoContext,
    options: &AdapterOptions,
) -> Result<(Vec<T>, usize, usize)> {
    let reports = options.get_str_list(REPORTS_OPTION);
    if reports.is_empty() {
        return Err(AdapterError::ConfigMissing(REPORTS_OPTION.to_string()));
    }

    let mut docs = Vec::with_capacity(reports.len());
    let mut failed = 0usize;
    for raw in &reports {
        if ctx.is_cancelled() {
            return Err(AdapterError::Cancelled);
        }
        let path = ctx.resolve_input(raw);
        let parsed = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<T>(&bytes).map_err(AdapterError::from),
            Err(e) => Err(AdapterError::from(e)),
        };
        match parsed {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                log::warn!("Skipping report {}: {e}", path.display());
                failed += 1;
            }
        }
    }

    if docs.is_empty() {
        return Err(AdapterError::External(format!(
            "none of {} report file(s) could be read",
            reports.len()
        )));
    }
    let ok = docs.len();
    Ok((docs, ok, failed))
}

use crate::process::{find_program, run_bounded, ProcessSpec};
use crate::{
    Adapter, AdapterDescriptor, AdapterError, AdapterKind, AdapterOptions, Capabilities,
    OptionKind, OptionSpec, RepoContext, Result,
};
use async_trait::async_trait;
use codecity_model::{AvailabilityReport, FindingKind};
use codecity_normalize::{NativeMetric, NativeOutput, NativeRecord, SeverityScheme};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const DEFAULT_MAX_COMMITS: u64 = 1_000;
const DEFAULT_HOTSPOT_COMMITS: u64 = 10;
const RECORD_SEP: char = '\u{1e}';
const FIELD_SEP: char = '\u{1f}';

/// Commit history: per-file churn metrics plus `maintainability/hotspot`
/// findings for files changed unusually often.
///
/// The accumulated history is returned as adapter state. When the previous
/// successful run left one, only `base..target` is read and folded into it,
/// so a delta run reports the same totals as a full pass.
pub struct GitHistoryAdapter;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FileChurn {
    commits: u64,
    added: u64,
    deleted: u64,
    authors: BTreeSet<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct History {
    commits: u64,
    files: BTreeMap<String, FileChurn>,
}

impl History {
    /// Fold in a later range of commits disjoint from this one.
    fn merge(&mut self, later: History) {
        self.commits += later.commits;
        for (path, churn) in later.files {
            let entry = self.files.entry(path).or_default();
            entry.commits += churn.commits;
            entry.added += churn.added;
            entry.deleted += churn.deleted;
            entry.authors.extend(churn.authors);
        }
    }
}

/// `src/{old => new}/a.rs` and `old => new` resolve to the new path.
fn renamed_target(path: &str) -> String {
    if let (Some(open), Some(close)) = (path.find('{'), path.find('}')) {
        if open < close {
            let inner = &path[open + 1..close];
            if let Some((_, new)) = inner.split_once(" => ") {
                let joined = format!("{}{}{}", &path[..open], new, &path[close + 1..]);
                return joined.replace("//", "/");
            }
        }
    }
    match path.split_once(" => ") {
        Some((_, new)) => new.to_string(),
        None => path.to_string(),
    }
}

fn parse_log(stdout: &str) -> History {
    let mut history = History::default();
    for chunk in stdout.split(RECORD_SEP).filter(|c| !c.trim().is_empty()) {
        let mut lines = chunk.lines();
        let Some(header) = lines.next() else {
            continue;
        };
        let author = header.split(FIELD_SEP).nth(1).unwrap_or("").to_string();
        history.commits += 1;

        for line in lines.filter(|l| !l.trim().is_empty()) {
            let mut parts = line.splitn(3, '\t');
            let (Some(added), Some(deleted), Some(path)) = (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            let entry = history.files.entry(renamed_target(path)).or_default();
            entry.commits += 1;
            entry.added += added.parse::<u64>().unwrap_or(0);
            entry.deleted += deleted.parse::<u64>().unwrap_or(0);
            if !author.is_empty() {
                entry.authors.insert(author.clone());
            }
        }
    }
    history
}

async fn git_log(ctx: &RepoContext, range: Option<String>, max_commits: u64) -> Result<String> {
    let mut spec = ProcessSpec::new("git", ctx.root())
        .arg("log")
        .arg("--no-merges")
        .arg("--numstat")
        .arg(format!("--format={RECORD_SEP}%H{FIELD_SEP}%ae{FIELD_SEP}%at"))
        .arg(format!("--max-count={max_commits}"));
    if let Some(range) = range {
        spec = spec.arg(range);
    }
    let output = run_bounded(&spec, &ctx.cancel, ctx.deadline).await?;
    if !output.success() {
        return Err(AdapterError::External(format!(
            "git log failed: {}",
            output.stderr_tail()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl Adapter for GitHistoryAdapter {
    fn describe(&self) -> AdapterDescriptor {
        AdapterDescriptor {
            id: "git-history",
            name: "Git history churn",
            kind: AdapterKind::VersionControl,
            languages_supported: Vec::new(),
            inputs: vec!["git history"],
            produced_finding_kinds: vec![FindingKind::Hotspot],
            options: vec![
                OptionSpec::optional("max_commits", OptionKind::Integer, "history depth"),
                OptionSpec::optional(
                    "hotspot_commits",
                    OptionKind::Integer,
                    "commits touching a file before it is a hotspot",
                ),
                OptionSpec::optional("full_history", OptionKind::Bool, "ignore the incremental marker"),
            ],
            severity_scheme: SeverityScheme::Generic,
            max_execution_secs: Some(300),
        }
    }

    async fn probe(&self, root: &Path, _options: &AdapterOptions) -> AvailabilityReport {
        if find_program("git").is_none() {
            return AvailabilityReport::unavailable("git-history", "git not found on PATH")
                .with_missing("git");
        }
        if !tokio::fs::try_exists(root.join(".git")).await.unwrap_or(false) {
            return AvailabilityReport::unavailable("git-history", "not a git repository");
        }
        AvailabilityReport::available("git-history")
    }

    async fn analyze(&self, ctx: &RepoContext, options: &AdapterOptions) -> Result<NativeOutput> {
        let max_commits = options.get_u64("max_commits").unwrap_or(DEFAULT_MAX_COMMITS);
        let threshold = options
            .get_u64("hotspot_commits")
            .unwrap_or(DEFAULT_HOTSPOT_COMMITS)
            .max(1);
        let full = options.get_bool("full_history").unwrap_or(false);

        let previous = ctx
            .previous_state
            .as_ref()
            .filter(|_| !full)
            .and_then(|state| serde_json::from_value::<History>(state.clone()).ok());
        let delta = match (previous, &ctx.base_commit, &ctx.target_commit) {
            (Some(previous), Some(base), Some(target)) if base != target => {
                Some((previous, format!("{base}..{target}")))
            }
            _ => None,
        };
        let history = match delta {
            Some((mut history, range)) => match git_log(ctx, Some(range.clone()), max_commits).await {
                Ok(out) => {
                    history.merge(parse_log(&out));
                    history
                }
                Err(AdapterError::External(e)) => {
                    log::debug!("Delta history {range} unavailable ({e}); reading full history");
                    parse_log(&git_log(ctx, None, max_commits).await?)
                }
                Err(e) => return Err(e),
            },
            None => parse_log(&git_log(ctx, None, max_commits).await?),
        };

        let mut records = Vec::new();
        let mut metrics = vec![NativeMetric::repo("history.commits", history.commits as f64)];
        for (path, churn) in &history.files {
            if !ctx.repository.contains(path) {
                continue;
            }
            metrics.push(NativeMetric::file(path, "churn.commits", churn.commits as f64));
            metrics.push(NativeMetric::file(path, "churn.lines_added", churn.added as f64));
            metrics.push(NativeMetric::file(path, "churn.lines_deleted", churn.deleted as f64));
            metrics.push(NativeMetric::file(path, "churn.authors", churn.authors.len() as f64));

            if churn.commits >= threshold {
                let severity = if churn.commits >= threshold.saturating_mul(3) {
                    "medium"
                } else {
                    "low"
                };
                let mut record = NativeRecord::new(format!(
                    "changed in {} commits by {} author(s) (+{}/-{} lines)",
                    churn.commits,
                    churn.authors.len(),
                    churn.added,
                    churn.deleted
                ))
                .rule("git-history/hotspot")
                .severity(severity)
                .category("maintainability", Some("hotspot"));
                record.kind = Some("hotspot".to_string());
                record.file = Some(path.clone());
                record.confidence = Some("high".to_string());
                records.push(record);
            }
        }

        let state = serde_json::to_value(&history)?;
        Ok(NativeOutput::records(records)
            .with_metrics(metrics)
            .with_state(state))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            finding_kinds: vec![FindingKind::Hotspot],
            metrics: vec![
                "history.commits",
                "churn.commits",
                "churn.lines_added",
                "churn.lines_deleted",
                "churn.authors",
            ],
            delta: true,
            formal_evidence: false,
        }
    }
}

use std::collections::BTreeSet;
use std::path::Path;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

// Probes must stay cheap: repositories with huge untracked trees can make
// `git status` slow, in which case the tree is treated as dirty.
const GIT_HEAD_TIMEOUT: Duration = Duration::from_millis(1_000);
const GIT_STATUS_TIMEOUT: Duration = Duration::from_millis(2_000);
const GIT_DIFF_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitState {
    pub head: String,
    pub branch: Option<String>,
    pub dirty: bool,
}

async fn git_output(root: &Path, args: &[&str], limit: Duration) -> Option<Vec<u8>> {
    let output = timeout(
        limit,
        Command::new("git")
            .arg("-C")
            .arg(root)
            .args(args)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .ok()?
    .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(output.stdout)
}

/// HEAD, branch and dirtiness of the working tree, or `None` when `root` is
/// not a git checkout (or git is unavailable).
pub async fn probe_git_state(root: &Path) -> Option<GitState> {
    let head = git_output(root, &["rev-parse", "HEAD"], GIT_HEAD_TIMEOUT).await?;
    let head = String::from_utf8_lossy(&head).trim().to_string();
    if head.is_empty() {
        return None;
    }

    let branch = git_output(root, &["rev-parse", "--abbrev-ref", "HEAD"], GIT_HEAD_TIMEOUT)
        .await
        .map(|out| String::from_utf8_lossy(&out).trim().to_string())
        .filter(|b| !b.is_empty() && b != "HEAD");

    let dirty = match git_output(root, &["status", "--porcelain", "-z"], GIT_STATUS_TIMEOUT).await
    {
        Some(out) => !out.is_empty(),
        None => {
            log::debug!("git status unavailable for {}; assuming dirty", root.display());
            true
        }
    };

    Some(GitState {
        head,
        branch,
        dirty,
    })
}

/// Paths changed between two commits (both sides of renames/copies), or
/// `None` when the diff is unavailable or larger than `max_paths`.
pub async fn changed_paths_between(
    root: &Path,
    old_head: &str,
    new_head: &str,
    max_paths: usize,
) -> Option<Vec<String>> {
    let old_head = old_head.trim();
    let new_head = new_head.trim();
    if old_head.is_empty() || new_head.is_empty() {
        return None;
    }
    if old_head == new_head {
        return Some(Vec::new());
    }

    let stdout = git_output(
        root,
        &["diff", "--name-status", "-z", old_head, new_head],
        GIT_DIFF_TIMEOUT,
    )
    .await?;

    let tokens: Vec<&[u8]> = stdout
        .split(|b| *b == 0)
        .filter(|s| !s.is_empty())
        .collect();

    let mut changed: BTreeSet<String> = BTreeSet::new();
    let mut idx = 0usize;
    while idx < tokens.len() {
        let status = tokens[idx];
        idx = idx.saturating_add(1);

        if idx >= tokens.len() {
            break;
        }
        let path1 = String::from_utf8_lossy(tokens[idx]);
        idx = idx.saturating_add(1);
        if !path1.is_empty() {
            changed.insert(path1.into_owned());
        }

        let Some(first) = status.first() else {
            continue;
        };
        // Renames and copies carry a second path: `R100\0old\0new\0`.
        if *first == b'R' || *first == b'C' {
            if idx >= tokens.len() {
                break;
            }
            let path2 = String::from_utf8_lossy(tokens[idx]);
            idx = idx.saturating_add(1);
            if !path2.is_empty() {
                changed.insert(path2.into_owned());
            }
        }

        if changed.len() > max_paths {
            return None;
        }
    }

    Some(changed.into_iter().collect())
}

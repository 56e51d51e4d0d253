use crate::classify::FileClassifier;
use crate::git::probe_git_state;
use crate::scanner::FileScanner;
use crate::{RepoError, Result};
use codecity_model::{RepoFile, Repository, Vcs};
use std::path::Path;

/// Builds the shared [`Repository`] view for a run.
pub struct RepositoryLoader {
    classifier: std::sync::Arc<FileClassifier>,
}

impl RepositoryLoader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            classifier: std::sync::Arc::new(FileClassifier::new()?),
        })
    }

    pub async fn load(&self, root: &Path) -> Result<Repository> {
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| RepoError::InvalidPath(format!("{}: {e}", root.display())))?;
        let meta = tokio::fs::metadata(&root).await?;
        if !meta.is_dir() {
            return Err(RepoError::InvalidPath(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut repo = Repository::new(root.clone());
        if tokio::fs::symlink_metadata(root.join(".git")).await.is_ok() {
            repo.vcs = Vcs::Git;
            match probe_git_state(&root).await {
                Some(state) => {
                    repo.commit = Some(state.head);
                    repo.branch = state.branch;
                    repo.dirty = state.dirty;
                }
                None => {
                    log::warn!(
                        "{} looks like a git checkout but HEAD is unavailable",
                        root.display()
                    );
                }
            }
        }

        let classifier = self.classifier.clone();
        let scan_root = root.clone();
        let files = tokio::task::spawn_blocking(move || {
            FileScanner::new(&scan_root)
                .scan()
                .into_iter()
                .map(|scanned| {
                    let (language, category) = classifier.classify(&scanned.relative);
                    RepoFile {
                        path: scanned.relative,
                        language,
                        category,
                        size_bytes: scanned.size_bytes,
                        mtime_ms: scanned.mtime_ms,
                    }
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| RepoError::Other(format!("repository scan task failed: {e}")))?;

        let repo = repo.with_files(files);
        log::debug!(
            "Loaded repository {} (vcs={:?}, commit={:?}, dirty={}, files={})",
            repo.root_display(),
            repo.vcs,
            repo.commit,
            repo.dirty,
            repo.files.len()
        );
        Ok(repo)
    }
}

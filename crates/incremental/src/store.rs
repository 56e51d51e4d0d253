use crate::lock::acquire_state_lock;
use crate::{IncrementalMarker, MarkMetadata, Result, StateError, MARKER_VERSION};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const STATE_DIR_NAME: &str = "codecity";
const STATE_FILE_NAME: &str = "state.json";
const LOCK_FILE_NAME: &str = "state.lock";
const FALLBACK_DIR_NAME: &str = ".codecity";

/// Marker file location: inside `.git/` when the repository has a git
/// directory, otherwise under `.codecity/` at the root.
#[must_use]
pub fn marker_path_for_root(root: &Path) -> PathBuf {
    let git_dir = root.join(".git");
    if git_dir.is_dir() {
        git_dir.join(STATE_DIR_NAME).join(STATE_FILE_NAME)
    } else {
        root.join(FALLBACK_DIR_NAME).join(STATE_FILE_NAME)
    }
}

/// Owner of one repository's incremental marker. Adapters only read it; the
/// orchestrator writes it once per run.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn for_root(root: &Path) -> Self {
        Self {
            path: marker_path_for_root(root),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_file_name(LOCK_FILE_NAME)
    }

    /// Strict read: `Err(Corrupt)` for an unparseable marker.
    pub async fn read(&self) -> Result<Option<IncrementalMarker>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StateError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    /// Lenient read used on the run path: a corrupt marker is discarded.
    pub async fn load(&self) -> Result<Option<IncrementalMarker>> {
        match self.read().await {
            Err(StateError::Corrupt { path, reason }) => {
                log::debug!("Discarding corrupt state file {}: {reason}", path.display());
                let _ = tokio::fs::remove_file(&path).await;
                Ok(None)
            }
            other => other,
        }
    }

    pub async fn last_analyzed(&self) -> Result<Option<String>> {
        Ok(self.load().await?.and_then(|m| m.last_commit))
    }

    pub async fn first_run(&self) -> Result<bool> {
        Ok(self.load().await?.map_or(true, |m| m.total_runs == 0))
    }

    /// Atomically replace the marker, bumping the run counter.
    pub async fn mark_analyzed(
        &self,
        commit: Option<&str>,
        metadata: MarkMetadata,
    ) -> Result<IncrementalMarker> {
        let _lock = acquire_state_lock(self.lock_path()).await?;

        let previous = self.load().await?.unwrap_or_default();
        let mut adapters = metadata.adapters;
        for (id, mark) in &mut adapters {
            if let Some(before) = previous.adapters.get(id) {
                mark.inherit(before);
            }
        }
        let marker = IncrementalMarker {
            version: MARKER_VERSION,
            last_commit: commit.map(str::to_string).or(previous.last_commit),
            last_run_id: metadata.run_id.or(previous.last_run_id),
            last_analyzed_unix_ms: unix_ms_now(),
            total_runs: previous.total_runs.saturating_add(1),
            adapters,
        };

        let bytes = serde_json::to_vec_pretty(&marker)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        log::debug!(
            "Marked {} analyzed at {:?} (run #{})",
            self.path.display(),
            marker.last_commit,
            marker.total_runs
        );
        Ok(marker)
    }

    /// Forces a full reanalysis on the next run. Returns whether a marker
    /// existed.
    pub async fn clear(&self) -> Result<bool> {
        let _lock = acquire_state_lock(self.lock_path()).await?;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

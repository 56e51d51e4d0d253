use crate::{CacheDigest, CacheEntry, CacheError, EntryHeader, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const ENTRY_EXTENSION: &str = "json";

/// File-per-entry tier under the cache directory. Files are named by digest
/// and replaced atomically (temp file, then rename).
#[derive(Debug, Clone)]
pub(crate) struct DiskTier {
    dir: PathBuf,
}

/// Header-only view used by walks; the payload is skipped.
#[derive(Deserialize)]
struct HeaderOnly {
    header: EntryHeader,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    pub entries: usize,
    pub bytes: u64,
}

impl DiskTier {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, digest: &CacheDigest) -> PathBuf {
        self.dir.join(format!("{digest}.{ENTRY_EXTENSION}"))
    }

    /// `Ok(None)` when absent; `Err(Corrupt)` when present but unreadable.
    pub(crate) async fn read(&self, digest: &CacheDigest) -> Result<Option<CacheEntry>> {
        let path = self.path_for(digest);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        entry
            .verify(digest)
            .map_err(|reason| CacheError::Corrupt { path, reason })?;
        Ok(Some(entry))
    }

    pub(crate) async fn write(&self, digest: &CacheDigest, entry: &CacheEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(digest);
        let tmp = self
            .dir
            .join(format!(".{digest}.tmp-{}", std::process::id()));
        let bytes = serde_json::to_vec(entry)?;
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    pub(crate) async fn remove(&self, digest: &CacheDigest) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(digest)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Entry files with their headers. Unreadable entries are reported with
    /// `None` so callers can discard them.
    fn walk(&self) -> Result<Vec<(PathBuf, u64, Option<EntryHeader>)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for item in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let item = item?;
            let path = item.path();
            let is_entry = item.file_type().is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION)
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(CacheDigest::parse)
                    .is_some();
            if !is_entry {
                continue;
            }
            let size = item.metadata().map(|m| m.len()).unwrap_or(0);
            let header = std::fs::read(path)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<HeaderOnly>(&bytes).ok())
                .map(|h| h.header);
            out.push((path.to_path_buf(), size, header));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    /// Remove entries whose header names `repo`, plus any unreadable ones.
    pub(crate) fn remove_repo(&self, repo: &str) -> Result<usize> {
        let mut removed = 0;
        for (path, _, header) in self.walk()? {
            let doomed = match &header {
                Some(header) => header.repo == repo,
                None => {
                    log::debug!("Discarding unreadable cache entry {}", path.display());
                    true
                }
            };
            if doomed && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub(crate) fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for (path, _, _) in self.walk()? {
            if std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Keep at most `max_entries`, dropping the oldest by creation time.
    pub(crate) fn prune(&self, max_entries: usize) -> Result<usize> {
        let mut entries = self.walk()?;
        if entries.len() <= max_entries {
            return Ok(0);
        }
        entries.sort_by_key(|(path, _, header)| {
            (header.as_ref().map_or(0, |h| h.created_ms), path.clone())
        });
        let excess = entries.len() - max_entries;
        let mut removed = 0;
        for (path, _, _) in entries.into_iter().take(excess) {
            if std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub(crate) fn usage(&self) -> Result<DiskUsage> {
        let entries = self.walk()?;
        Ok(DiskUsage {
            entries: entries.len(),
            bytes: entries.iter().map(|(_, size, _)| size).sum(),
        })
    }
}

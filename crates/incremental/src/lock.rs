use crate::{Result, StateError};
use fs2::FileExt;
use std::path::PathBuf;
use std::time::Instant;

/// Exclusive advisory lock on the marker directory, released on drop.
pub(crate) struct StateLock {
    file: std::fs::File,
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

pub(crate) async fn acquire_state_lock(path: PathBuf) -> Result<StateLock> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::task::spawn_blocking(move || -> Result<StateLock> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| StateError::Lock(format!("open {}: {err}", path.display())))?;

        let start = Instant::now();
        file.lock_exclusive()
            .map_err(|err| StateError::Lock(format!("acquire {}: {err}", path.display())))?;
        let waited = start.elapsed();
        if waited.as_millis() > 100 {
            log::debug!("Waited {waited:?} for state lock {}", path.display());
        }
        Ok(StateLock { file })
    })
    .await
    .map_err(|err| StateError::Lock(format!("join lock task: {err}")))?
}

use crate::Result;
use std::path::{Path, PathBuf};

/// Per-run scratch tree: `<temp>/codecity-runs/<run id>/<adapter id>`.
#[derive(Debug)]
pub struct ScratchSpace {
    root: PathBuf,
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl ScratchSpace {
    pub async fn create(temp_root: &Path, run_id: &str) -> Result<Self> {
        let root = temp_root.join("codecity-runs").join(sanitize(run_id));
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn for_adapter(&self, adapter_id: &str) -> Result<PathBuf> {
        let dir = self.root.join(sanitize(adapter_id));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Best effort; leftovers are only disk noise.
    pub async fn remove(self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.root).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::debug!("Failed to remove scratch {}: {e}", self.root.display());
            }
        }
    }
}

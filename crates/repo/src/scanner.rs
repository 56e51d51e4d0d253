use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// A file found under the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub absolute: PathBuf,
    /// Root-relative, forward-slash.
    pub relative: String,
    pub size_bytes: u64,
    pub mtime_ms: u64,
}

/// Scanner for repository files (.gitignore aware)
pub struct FileScanner {
    root: PathBuf,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn scan(&self) -> Vec<ScannedFile> {
        let mut files = Vec::new();

        let root = self.root.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(false);
        builder.filter_entry(move |entry| !FileScanner::is_ignored_scope(entry.path(), &root));

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }

                    let path = entry.path();
                    let Some(relative) = normalize_relative_path(&self.root, path) else {
                        continue;
                    };
                    let (size_bytes, mtime_ms) = match entry.metadata() {
                        Ok(meta) => (meta.len(), mtime_ms(&meta)),
                        Err(e) => {
                            log::debug!("No metadata for {}: {e}", path.display());
                            (0, 0)
                        }
                    };

                    files.push(ScannedFile {
                        absolute: path.to_path_buf(),
                        relative,
                        size_bytes,
                        mtime_ms,
                    });
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        log::info!("Found {} repository files", files.len());
        files
    }

    fn is_ignored_scope(path: &Path, root: &Path) -> bool {
        if let Ok(relative) = path.strip_prefix(root) {
            for component in relative.components() {
                if let std::path::Component::Normal(name) = component {
                    let lowered = name.to_string_lossy().to_lowercase();
                    if IGNORED_SCOPES.iter().any(|ignored| ignored == &lowered) {
                        return true;
                    }
                }
            }
        }
        false
    }
}

fn normalize_relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let rel = rel.to_string_lossy().into_owned();
    let rel = rel.replace('\\', "/");
    if rel.is_empty() {
        None
    } else {
        Some(rel)
    }
}

fn mtime_ms(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

const IGNORED_SCOPES: &[&str] = &[
    // VCS / tooling
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    ".codecity",
    // caches / builds
    ".cache",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    ".tox",
    ".next",
    ".turbo",
];

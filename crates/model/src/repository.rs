use crate::Language;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Vcs {
    Git,
    None,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Source,
    Test,
    Config,
    Docs,
    Build,
    Asset,
    Dependency,
}

/// A repository file at the run commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RepoFile {
    /// Canonical path: repository-root-relative, forward-slash.
    pub path: String,
    pub language: Language,
    pub category: FileCategory,
    pub size_bytes: u64,
    #[serde(default)]
    pub mtime_ms: u64,
}

/// Cheap filesystem fingerprint used when no commit identifies the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RepoFingerprint {
    pub file_count: u64,
    pub total_bytes: u64,
    pub max_mtime_ms: u64,
}

/// The subject of analysis. Shared read-only by every component for the
/// duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Repository {
    pub root: PathBuf,
    pub vcs: Vcs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub dirty: bool,
    pub files: BTreeMap<String, RepoFile>,
}

impl Repository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            vcs: Vcs::None,
            commit: None,
            branch: None,
            dirty: false,
            files: BTreeMap::new(),
        }
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = RepoFile>) -> Self {
        for file in files {
            self.files.insert(file.path.clone(), file);
        }
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn file(&self, path: &str) -> Option<&RepoFile> {
        self.files.get(path)
    }

    pub fn total_bytes(&self) -> u64 {
        self.files
            .values()
            .fold(0u64, |acc, f| acc.saturating_add(f.size_bytes))
    }

    pub fn fingerprint(&self) -> RepoFingerprint {
        RepoFingerprint {
            file_count: self.files.len() as u64,
            total_bytes: self.total_bytes(),
            max_mtime_ms: self.files.values().map(|f| f.mtime_ms).max().unwrap_or(0),
        }
    }

    /// Token identifying the analyzed tree: the commit for clean git trees,
    /// otherwise (or additionally, when dirty) the filesystem fingerprint.
    pub fn freshness_token(&self) -> String {
        let fp = self.fingerprint();
        let fs_token = format!(
            "fs:{}:{}:{}",
            fp.file_count, fp.total_bytes, fp.max_mtime_ms
        );
        match (&self.commit, self.dirty) {
            (Some(commit), false) => commit.clone(),
            (Some(commit), true) => format!("{commit}+{fs_token}"),
            (None, _) => fs_token,
        }
    }

    pub fn root_display(&self) -> String {
        self.root.to_string_lossy().replace('\\', "/")
    }
}

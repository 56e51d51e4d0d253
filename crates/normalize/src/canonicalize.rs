use crate::{NormalizeError, Result};
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// Prefix rewrite applied to an adapter's paths before resolution, e.g.
/// `/opt/analysis/workspace` (container interior) → `` (repository root).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountMapping {
    pub from: String,
    pub to: String,
}

impl MountMapping {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Plain path named by a `file://` URI or an RFC 3986 relative reference.
/// Percent escapes that do not decode to UTF-8 are kept as written.
#[must_use]
pub fn uri_to_path(uri: &str) -> String {
    let rest = match uri.strip_prefix("file://") {
        Some(local) if local.starts_with("localhost/") => &local["localhost".len()..],
        Some(local) => local,
        None => uri,
    };
    match percent_decode_str(rest).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => rest.to_string(),
    }
}

/// A canonical repository-relative path, plus the line when the adapter
/// emitted `path:line[:col]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: String,
    pub line: Option<u32>,
}

/// Process-wide path resolution service.
///
/// Accepts host paths, container-interior paths (via per-adapter
/// [`MountMapping`]s), `file://` URIs, backslash paths and `path:line:col`
/// suffixes, and returns forward-slash, root-relative paths with `..` and
/// symlinks resolved. Anything outside the root is rejected. Resolutions are
/// cached per adapter scope and input string.
pub struct PathCanonicalizer {
    root: PathBuf,
    /// The root as given, for adapters that report the non-canonical form.
    alias_root: Option<PathBuf>,
    line_suffix: Regex,
    cache: Mutex<HashMap<(String, String), std::result::Result<ResolvedPath, String>>>,
}

impl PathCanonicalizer {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let given = root.as_ref().to_path_buf();
        let root = std::fs::canonicalize(&given).unwrap_or_else(|_| given.clone());
        let alias_root = (given != root && given.is_absolute()).then_some(given);
        Ok(Self {
            root,
            alias_root,
            line_suffix: Regex::new(r"^(?P<path>.+?):(?P<line>\d+)(?::\d+)?$")?,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Resolve `raw` as reported by the adapter instance `scope`.
    pub fn resolve(&self, scope: &str, mounts: &[MountMapping], raw: &str) -> Result<ResolvedPath> {
        let key = (scope.to_string(), raw.to_string());
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit.clone().map_err(|reason| NormalizeError::Unresolvable {
                    path: raw.to_string(),
                    reason,
                });
            }
        }

        let resolved = self.resolve_uncached(mounts, raw);
        if let Ok(mut cache) = self.cache.lock() {
            let entry = match &resolved {
                Ok(path) => Ok(path.clone()),
                Err(err) => Err(err.to_string()),
            };
            cache.insert(key, entry);
        }
        resolved
    }

    fn resolve_uncached(&self, mounts: &[MountMapping], raw: &str) -> Result<ResolvedPath> {
        let mut value = raw.trim().to_string();
        if value.is_empty() {
            return Err(NormalizeError::EmptyPath);
        }
        if value.starts_with("file://") {
            value = uri_to_path(&value);
        }
        value = value.replace('\\', "/");

        let mut line = None;
        if !self.root.join(&value).exists() {
            if let Some(caps) = self.line_suffix.captures(&value) {
                line = caps["line"].parse::<u32>().ok();
                value = caps["path"].to_string();
            }
        }

        let value = apply_mounts(mounts, &value);
        let path = self.relativize(&value, raw)?;
        Ok(ResolvedPath { path, line })
    }

    fn relativize(&self, value: &str, raw: &str) -> Result<String> {
        let candidate = Path::new(value);
        let absolute = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            let relative = lexical_normalize(candidate)
                .ok_or_else(|| NormalizeError::OutsideRoot(raw.to_string()))?;
            self.root.join(relative)
        };

        let resolved = match std::fs::canonicalize(&absolute) {
            Ok(real) => real,
            Err(_) => lexical_normalize(&absolute)
                .ok_or_else(|| NormalizeError::OutsideRoot(raw.to_string()))?,
        };

        let relative = resolved
            .strip_prefix(&self.root)
            .ok()
            .or_else(|| {
                self.alias_root
                    .as_ref()
                    .and_then(|alias| resolved.strip_prefix(alias).ok())
            })
            .ok_or_else(|| NormalizeError::OutsideRoot(raw.to_string()))?;

        let text = relative.to_string_lossy().replace('\\', "/");
        if text.is_empty() {
            return Err(NormalizeError::Unresolvable {
                path: raw.to_string(),
                reason: "names the repository root".to_string(),
            });
        }
        Ok(text)
    }
}

/// Longest matching prefix wins; a prefix only matches at a `/` boundary.
fn apply_mounts(mounts: &[MountMapping], value: &str) -> String {
    let mut best: Option<(&MountMapping, &str)> = None;
    for mount in mounts {
        let from = mount.from.trim_end_matches('/');
        if from.is_empty() {
            continue;
        }
        let rest = if value == from {
            Some("")
        } else {
            value
                .strip_prefix(from)
                .filter(|rest| rest.starts_with('/'))
        };
        if let Some(rest) = rest {
            if best.map_or(true, |(b, _)| b.from.trim_end_matches('/').len() < from.len()) {
                best = Some((mount, rest));
            }
        }
    }

    match best {
        None => value.to_string(),
        Some((mount, rest)) => {
            let rest = rest.trim_start_matches('/');
            let to = mount.to.trim_end_matches('/');
            match (to.is_empty(), rest.is_empty()) {
                (true, _) => rest.to_string(),
                (false, true) => to.to_string(),
                (false, false) => format!("{to}/{rest}"),
            }
        }
    }
}

/// Resolve `.` and `..` without touching the filesystem. Returns `None` when
/// a relative path climbs above its start.
fn lexical_normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(name) => {
                out.push(name);
                depth += 1;
            }
        }
    }
    Some(out)
}

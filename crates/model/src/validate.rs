use crate::{Confidence, Finding, FindingKind, ModelError, Repository, Result};

/// A canonical path is repository-relative, forward-slash, free of `.`/`..`
/// segments and of empty segments.
#[must_use]
pub fn is_canonical_path(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return false;
    }
    path.split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// Schema validation applied to every normalized finding before it enters an
/// adapter result.
pub fn validate_finding(finding: &Finding, repository: &Repository) -> Result<()> {
    let id = finding.id.as_str();
    if id.trim().is_empty() {
        return Err(ModelError::violation("<empty>", "finding id is empty"));
    }
    if finding.adapter.trim().is_empty() {
        return Err(ModelError::violation(id, "adapter id is empty"));
    }
    if finding.message.trim().is_empty() {
        return Err(ModelError::violation(id, "message is empty"));
    }

    let location = &finding.location;
    match location.file.as_deref() {
        Some(path) => {
            if !is_canonical_path(path) {
                return Err(ModelError::violation(
                    id,
                    format!("path {path:?} is not canonical"),
                ));
            }
            if !repository.contains(path) {
                return Err(ModelError::violation(
                    id,
                    format!("path {path:?} is not part of the repository"),
                ));
            }
        }
        None => {
            if location.line != 0 || location.end_line.is_some() || location.entity.is_some() {
                return Err(ModelError::violation(
                    id,
                    "repo-scope finding carries a line span or entity",
                ));
            }
        }
    }

    if let Some(end_line) = location.end_line {
        if location.line == 0 || end_line < location.line {
            return Err(ModelError::violation(
                id,
                format!("invalid line span {}..{}", location.line, end_line),
            ));
        }
    }

    if finding.confidence == Confidence::Proof && finding.kind != FindingKind::Verification {
        return Err(ModelError::violation(
            id,
            "proof confidence requires a verification finding",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Category, FileCategory, Language, Location, RepoFile, Severity, Verdict,
    };

    fn repo() -> Repository {
        Repository::new("/repo").with_files([RepoFile {
            path: "src/a.c".to_string(),
            language: Language::C,
            category: FileCategory::Source,
            size_bytes: 100,
            mtime_ms: 0,
        }])
    }

    fn finding(location: Location) -> Finding {
        Finding {
            id: "x:1".to_string(),
            adapter: "x".to_string(),
            kind: FindingKind::Issue,
            category: Category::Bug,
            sub_kind: None,
            severity: Severity::Low,
            confidence: Confidence::Medium,
            location,
            rule_key: None,
            message: "m".to_string(),
            effort_minutes: None,
            tags: Vec::new(),
            verdict: None,
        }
    }

    #[test]
    fn canonical_path_rules() {
        assert!(is_canonical_path("src/a.c"));
        assert!(!is_canonical_path("/src/a.c"));
        assert!(!is_canonical_path("src/../a.c"));
        assert!(!is_canonical_path("./src/a.c"));
        assert!(!is_canonical_path("src\\a.c"));
        assert!(!is_canonical_path("src//a.c"));
    }

    #[test]
    fn accepts_known_file_and_repo_scope() {
        assert!(validate_finding(&finding(Location::file("src/a.c", 42)), &repo()).is_ok());
        assert!(validate_finding(&finding(Location::repo()), &repo()).is_ok());
    }

    #[test]
    fn rejects_unknown_file_and_bad_span() {
        assert!(validate_finding(&finding(Location::file("src/b.c", 1)), &repo()).is_err());
        let span = Location::file("src/a.c", 10).with_end_line(3);
        assert!(validate_finding(&finding(span), &repo()).is_err());
    }

    #[test]
    fn proof_requires_verification_kind() {
        let mut f = finding(Location::file("src/a.c", 1));
        f.confidence = Confidence::Proof;
        assert!(validate_finding(&f, &repo()).is_err());
        f.kind = FindingKind::Verification;
        f.verdict = Some(Verdict::Verified);
        assert!(validate_finding(&f, &repo()).is_ok());
    }
}

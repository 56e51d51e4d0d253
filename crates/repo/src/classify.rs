use crate::Result;
use codecity_model::{FileCategory, Language};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Assigns a [`FileCategory`] to canonical paths. Rules are evaluated in a
/// fixed order; the first matching set wins and unmatched files fall back to
/// `source` (known language) or `asset`.
pub struct FileClassifier {
    rules: Vec<(FileCategory, GlobSet)>,
}

impl FileClassifier {
    pub fn new() -> Result<Self> {
        let mut rules = Vec::with_capacity(6);
        for (category, patterns) in [
            (FileCategory::Dependency, DEPENDENCY_PATTERNS),
            (FileCategory::Test, TEST_PATTERNS),
            (FileCategory::Build, BUILD_PATTERNS),
            (FileCategory::Docs, DOCS_PATTERNS),
            (FileCategory::Config, CONFIG_PATTERNS),
            (FileCategory::Asset, ASSET_PATTERNS),
        ] {
            let mut builder = GlobSetBuilder::new();
            for pattern in patterns {
                builder.add(Glob::new(pattern)?);
            }
            rules.push((category, builder.build()?));
        }
        Ok(Self { rules })
    }

    pub fn classify(&self, path: &str) -> (Language, FileCategory) {
        let language = Language::from_path(path);
        for (category, set) in &self.rules {
            if set.is_match(path) {
                return (language, *category);
            }
        }
        let category = if language == Language::Unknown {
            FileCategory::Asset
        } else {
            FileCategory::Source
        };
        (language, category)
    }
}

const DEPENDENCY_PATTERNS: &[&str] = &[
    "**/Cargo.lock",
    "**/package-lock.json",
    "**/yarn.lock",
    "**/pnpm-lock.yaml",
    "**/go.sum",
    "**/Gemfile.lock",
    "**/poetry.lock",
    "**/composer.lock",
    "**/vendor/**",
    "**/third_party/**",
    "**/third-party/**",
    "**/lib/forge-std/**",
    "**/lib/openzeppelin-contracts/**",
];

const TEST_PATTERNS: &[&str] = &[
    "**/test/**",
    "**/tests/**",
    "**/__tests__/**",
    "**/spec/**",
    "**/*_test.*",
    "**/*.test.*",
    "**/*.spec.*",
    "**/test_*.py",
    "**/*Test.java",
    "**/*.t.sol",
];

const BUILD_PATTERNS: &[&str] = &[
    "**/Makefile",
    "**/makefile",
    "**/Justfile",
    "**/CMakeLists.txt",
    "**/*.cmake",
    "**/build.rs",
    "**/Dockerfile",
    "**/docker-compose.yml",
    "**/build.gradle",
    "**/build.gradle.kts",
    "**/pom.xml",
    "**/Cargo.toml",
    "**/package.json",
    "**/go.mod",
    "**/setup.py",
    "**/pyproject.toml",
    "**/foundry.toml",
    "**/hardhat.config.*",
    "**/.github/workflows/**",
];

const DOCS_PATTERNS: &[&str] = &[
    "**/docs/**",
    "**/doc/**",
    "**/*.md",
    "**/*.mdx",
    "**/*.rst",
    "**/*.adoc",
    "**/*.txt",
    "**/LICENSE*",
];

const CONFIG_PATTERNS: &[&str] = &[
    "**/*.toml",
    "**/*.yaml",
    "**/*.yml",
    "**/*.json",
    "**/*.ini",
    "**/*.cfg",
    "**/*.conf",
    "**/*.properties",
    "**/.env*",
    "**/.*rc",
];

const ASSET_PATTERNS: &[&str] = &[
    "**/*.png", "**/*.jpg", "**/*.jpeg", "**/*.gif", "**/*.svg", "**/*.ico", "**/*.webp",
    "**/*.woff", "**/*.woff2", "**/*.ttf", "**/*.eot", "**/*.mp3", "**/*.mp4", "**/*.wav",
    "**/*.pdf", "**/*.zip",
];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_common_layouts() {
        let classifier = FileClassifier::new().expect("classifier");
        let cases = [
            ("src/main.rs", FileCategory::Source),
            ("contracts/Vault.sol", FileCategory::Source),
            ("test/Vault.t.sol", FileCategory::Test),
            ("pkg/server_test.go", FileCategory::Test),
            ("Cargo.toml", FileCategory::Build),
            ("Cargo.lock", FileCategory::Dependency),
            ("vendor/lib/x.c", FileCategory::Dependency),
            ("README.md", FileCategory::Docs),
            ("config/app.yaml", FileCategory::Config),
            ("web/logo.png", FileCategory::Asset),
            ("bin/blob", FileCategory::Asset),
        ];
        for (path, expected) in cases {
            assert_eq!(classifier.classify(path).1, expected, "{path}");
        }
    }
}

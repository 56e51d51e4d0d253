use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Language tag attached to every repository file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Ruby,
    Swift,
    Kotlin,
    Php,
    Shell,
    Solidity,
    Vyper,
    Move,
    Cairo,
    Markdown,
    Toml,
    Yaml,
    Json,
    Unknown,
}

impl Language {
    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyw" => Language::Python,
            "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
            "ts" | "tsx" => Language::TypeScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Language::Cpp,
            "cs" => Language::CSharp,
            "rb" => Language::Ruby,
            "swift" => Language::Swift,
            "kt" | "kts" => Language::Kotlin,
            "php" => Language::Php,
            "sh" | "bash" | "zsh" => Language::Shell,
            "sol" => Language::Solidity,
            "vy" => Language::Vyper,
            "move" => Language::Move,
            "cairo" => Language::Cairo,
            "md" | "mdx" | "rst" | "adoc" => Language::Markdown,
            "toml" => Language::Toml,
            "yaml" | "yml" => Language::Yaml,
            "json" => Language::Json,
            _ => Language::Unknown,
        }
    }

    /// Detect language from file path
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Ruby => "ruby",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Php => "php",
            Language::Shell => "shell",
            Language::Solidity => "solidity",
            Language::Vyper => "vyper",
            Language::Move => "move",
            Language::Cairo => "cairo",
            Language::Markdown => "markdown",
            Language::Toml => "toml",
            Language::Yaml => "yaml",
            Language::Json => "json",
            Language::Unknown => "unknown",
        }
    }

    /// Languages whose programs hold on-chain value.
    pub fn is_smart_contract(self) -> bool {
        matches!(
            self,
            Language::Solidity | Language::Vyper | Language::Move | Language::Cairo
        )
    }
}

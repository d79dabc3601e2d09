use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Every language the runner can dispatch to a container image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Java,
    C,
    Cpp,
    JavaScript,
    Ruby,
    Rust,
    Go,
    Php,
    Elixir,
    CHash,
}

/// What the container image for a language expects to find in its mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    pub language: Language,
    pub source_name: &'static str,
    pub image: &'static str,
}

impl Language {
    pub const ALL: [Language; 11] = [
        Language::Python,
        Language::Java,
        Language::C,
        Language::Cpp,
        Language::JavaScript,
        Language::Ruby,
        Language::Rust,
        Language::Go,
        Language::Php,
        Language::Elixir,
        Language::CHash,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::JavaScript => "javascript",
            Language::Ruby => "ruby",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Php => "php",
            Language::Elixir => "elixir",
            Language::CHash => "chash",
        }
    }

    /// Case-insensitive lookup of a caller-supplied identifier. Anything else,
    /// surrounding whitespace included, must match exactly.
    pub fn resolve(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.id().eq_ignore_ascii_case(raw))
    }

    pub fn profile(self) -> LanguageProfile {
        let (source_name, image) = match self {
            Language::Python => ("program.py", "python-app"),
            Language::Java => ("Main.java", "java-app"),
            Language::C => ("program.c", "c-app"),
            Language::Cpp => ("program.cpp", "cpp-app"),
            Language::JavaScript => ("program.js", "node-app"),
            Language::Ruby => ("program.rb", "ruby-app"),
            Language::Rust => ("program.rs", "rust-app"),
            Language::Go => ("program.go", "go-app"),
            Language::Php => ("program.php", "php-app"),
            Language::Elixir => ("elixir.ex", "elixir-app"),
            Language::CHash => ("program.c", "chash-app"),
        };
        LanguageProfile {
            language: self,
            source_name,
            image,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl LanguageProfile {
    pub fn source_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(self.source_name)
    }
}

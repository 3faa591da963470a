//! The closed set of languages the visualizer accepts
//!
//! Each language knows how blocks are delimited (indentation or braces), how
//! comments and strings look for the pre-flight check, and which execution
//! backend plays it by default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a language delimits scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scoping {
    Indentation,
    Braces,
}

/// Which execution strategy produces snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Real interpreter on a worker thread, stepped cooperatively
    Sandbox,
    /// External interpreter traced once, then replayed
    FullTrace,
    /// Text-pattern line simulation
    Simulator,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BackendKind::Sandbox => "sandbox",
            BackendKind::FullTrace => "full trace",
            BackendKind::Simulator => "simulator",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Java,
    C,
    Cpp,
    CSharp,
    Go,
    Kotlin,
    Swift,
    Php,
    Rust,
}

impl Language {
    pub const ALL: [Language; 12] = [
        Language::JavaScript,
        Language::TypeScript,
        Language::Python,
        Language::Java,
        Language::C,
        Language::Cpp,
        Language::CSharp,
        Language::Go,
        Language::Kotlin,
        Language::Swift,
        Language::Php,
        Language::Rust,
    ];

    /// Stable lowercase tag, used for the CLI and the source cache
    pub fn tag(self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Python => "python",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Go => "go",
            Language::Kotlin => "kotlin",
            Language::Swift => "swift",
            Language::Php => "php",
            Language::Rust => "rust",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
            Language::Python => "Python",
            Language::Java => "Java",
            Language::C => "C",
            Language::Cpp => "C++",
            Language::CSharp => "C#",
            Language::Go => "Go",
            Language::Kotlin => "Kotlin",
            Language::Swift => "Swift",
            Language::Php => "PHP",
            Language::Rust => "Rust",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let lang = match ext.to_ascii_lowercase().as_str() {
            "js" | "mjs" | "cjs" => Language::JavaScript,
            "ts" => Language::TypeScript,
            "py" => Language::Python,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" => Language::Cpp,
            "cs" => Language::CSharp,
            "go" => Language::Go,
            "kt" | "kts" => Language::Kotlin,
            "swift" => Language::Swift,
            "php" => Language::Php,
            "rs" => Language::Rust,
            _ => return None,
        };
        Some(lang)
    }

    pub fn scoping(self) -> Scoping {
        match self {
            Language::Python => Scoping::Indentation,
            _ => Scoping::Braces,
        }
    }

    pub fn default_backend(self) -> BackendKind {
        match self {
            Language::JavaScript => BackendKind::Sandbox,
            Language::Python => BackendKind::FullTrace,
            _ => BackendKind::Simulator,
        }
    }

    /// Prefixes that start a comment running to end of line
    pub fn line_comments(self) -> &'static [&'static str] {
        match self {
            Language::Python => &["#"],
            Language::Php => &["//", "#"],
            _ => &["//"],
        }
    }

    /// Whether `/* ... */` comments exist
    pub fn has_block_comments(self) -> bool {
        !matches!(self, Language::Python)
    }

    /// Whether `'` delimits character literals rather than strings.
    ///
    /// In these languages a lone `'` (Rust lifetimes, Kotlin/Swift oddities)
    /// must not be treated as an unterminated string.
    pub fn single_quote_is_char(self) -> bool {
        matches!(
            self,
            Language::C
                | Language::Cpp
                | Language::Java
                | Language::CSharp
                | Language::Go
                | Language::Kotlin
                | Language::Rust
        )
    }

    /// Whether parameter lists are written `name type` (or `name: type`)
    /// rather than C-style `type name`
    pub fn param_name_first(self) -> bool {
        !matches!(
            self,
            Language::C | Language::Cpp | Language::Java | Language::CSharp
        )
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lang = match s.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" | "node" => Language::JavaScript,
            "typescript" | "ts" => Language::TypeScript,
            "python" | "py" | "python3" => Language::Python,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" | "c++" | "cxx" => Language::Cpp,
            "csharp" | "c#" | "cs" => Language::CSharp,
            "go" | "golang" => Language::Go,
            "kotlin" | "kt" => Language::Kotlin,
            "swift" => Language::Swift,
            "php" => Language::Php,
            "rust" | "rs" => Language::Rust,
            other => return Err(format!("unknown language '{}'", other)),
        };
        Ok(lang)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip_through_from_str() {
        for lang in Language::ALL {
            assert_eq!(lang.tag().parse::<Language>(), Ok(lang));
        }
    }

    #[test]
    fn test_default_backends() {
        assert_eq!(Language::JavaScript.default_backend(), BackendKind::Sandbox);
        assert_eq!(Language::Python.default_backend(), BackendKind::FullTrace);
        assert_eq!(Language::Java.default_backend(), BackendKind::Simulator);
    }

    #[test]
    fn test_aliases() {
        assert_eq!("c++".parse::<Language>(), Ok(Language::Cpp));
        assert_eq!("PY".parse::<Language>(), Ok(Language::Python));
        assert!("cobol".parse::<Language>().is_err());
    }
}

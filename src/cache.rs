//! Per-language source buffers
//!
//! Switching languages in the TUI swaps the editor contents; the previous
//! language's text is kept here and persisted as JSON so it survives
//! restarts.

use crate::language::Language;
use eyre::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct SourceCache {
    path: Option<PathBuf>,
    sources: BTreeMap<Language, String>,
}

impl SourceCache {
    /// `<data dir>/stepviz/sources.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("stepviz").join("sources.json"))
    }

    /// A cache that is never written to disk
    pub fn in_memory() -> Self {
        SourceCache {
            path: None,
            sources: BTreeMap::new(),
        }
    }

    /// Open the cache at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sources = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring corrupt source cache");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        debug!(path = %path.display(), entries = sources.len(), "source cache opened");
        SourceCache {
            path: Some(path),
            sources,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, language: Language) -> Option<&str> {
        self.sources.get(&language).map(String::as_str)
    }

    /// Cached text for `language`, or its starter program
    pub fn source_or_starter(&self, language: Language) -> String {
        self.get(language)
            .map(str::to_string)
            .unwrap_or_else(|| starter(language).to_string())
    }

    pub fn set(&mut self, language: Language, source: impl Into<String>) {
        self.sources.insert(language, source.into());
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.sources)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write source cache: {}", path.display()))?;
        debug!(path = %path.display(), "source cache saved");
        Ok(())
    }
}

/// Small program shown for a language with nothing cached
pub fn starter(language: Language) -> &'static str {
    match language {
        Language::JavaScript => {
            "function sum(items) {\n  let total = 0;\n  for (const x of items) {\n    total += x;\n  }\n  return total;\n}\n\nconst nums = [1, 2, 3];\nconst s = sum(nums);\nconsole.log(\"sum:\", s);\n"
        }
        Language::TypeScript => {
            "let count: number = 0;\nconst names = [\"ada\", \"alan\"];\ncount += names.length;\nconsole.log(count);\n"
        }
        Language::Python => {
            "def square(n):\n    return n * n\n\nnums = [1, 2, 3]\nnums.append(square(4))\nprint(nums)\n"
        }
        Language::Java => {
            "public class Main {\n    public static void main(String[] args) {\n        int[] nums = new int[]{1, 2, 3};\n        nums[0] = 10;\n        System.out.println(nums[0]);\n    }\n}\n"
        }
        Language::C => {
            "#include <stdio.h>\n\nint main() {\n    int x = 4;\n    x *= 2;\n    printf(\"x=%d\\n\", x);\n    return 0;\n}\n"
        }
        Language::Cpp => {
            "#include <iostream>\n\nint main() {\n    int total = 0;\n    total += 5;\n    std::cout << \"total=\" << total << std::endl;\n    return 0;\n}\n"
        }
        Language::CSharp => {
            "int hits = 1;\nhits++;\nConsole.WriteLine(hits);\n"
        }
        Language::Go => {
            "package main\n\nimport \"fmt\"\n\nfunc main() {\n    nums := []int{1, 2, 3}\n    n := 7\n    fmt.Println(n, nums)\n}\n"
        }
        Language::Kotlin => "val xs = listOf(1, 2)\nvar n = 3\nn += 1\nprintln(n)\n",
        Language::Swift => "var greeting = \"hi\"\ngreeting += \"!\"\nprint(greeting)\n",
        Language::Php => "<?php\n$items = [1, 2];\n$count = 2;\necho $count;\n",
        Language::Rust => {
            "fn main() {\n    let mut v = vec![1, 2];\n    let n = 3;\n    println!(\"{} {:?}\", n, v);\n}\n"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::preflight;

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("sources.json");
        let mut cache = SourceCache::open(&path);
        assert!(cache.get(Language::Go).is_none());

        cache.set(Language::Go, "x := 1");
        cache.set(Language::Python, "y = 2");
        cache.save().expect("saved");

        let reopened = SourceCache::open(&path);
        assert_eq!(reopened.get(Language::Go), Some("x := 1"));
        assert_eq!(reopened.get(Language::Python), Some("y = 2"));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("sources.json");
        fs::write(&path, "{ not json").expect("write");
        let cache = SourceCache::open(&path);
        assert!(cache.get(Language::C).is_none());
    }

    #[test]
    fn test_starters_pass_preflight() {
        for lang in Language::ALL {
            let cache = SourceCache::in_memory();
            let source = cache.source_or_starter(lang);
            assert!(preflight::check(&source, lang).is_ok(), "{} starter", lang);
        }
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let mut cache = SourceCache::in_memory();
        cache.set(Language::Rust, "fn main() {}");
        assert!(cache.save().is_ok());
        assert!(cache.path().is_none());
    }
}

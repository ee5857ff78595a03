//! Source file selection with gulp-style glob lists
//!
//! A list such as `["src/style/**/*.scss", "!src/style/lib/*"]` selects files
//! matching any positive pattern and no negated one. Each positive pattern
//! has a base (its wildcard-free directory prefix); a file's output path is its
//! path relative to that base.

use crate::error::{ConfigError, ConfigResult, TaskError, TaskResult};
use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A selected source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute (root-joined) path
    pub path: PathBuf,

    /// Path relative to the glob base, used for output placement
    pub relative: PathBuf,
}

#[derive(Debug, Clone)]
struct Include {
    base: PathBuf,
    matcher: GlobMatcher,
}

/// A compiled glob list
#[derive(Debug, Clone)]
pub struct FileSet {
    patterns: Vec<String>,
    includes: Vec<Include>,
    excludes: GlobSet,
}

/// Compile one glob with path-aware `*` (never crosses `/`)
pub fn compile_glob(pattern: &str) -> ConfigResult<globset::Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| ConfigError::InvalidGlob {
            pattern: pattern.to_string(),
            error: e.to_string(),
        })
}

/// The wildcard-free directory prefix of a pattern
pub fn glob_base(pattern: &str) -> PathBuf {
    let segments: Vec<&str> = pattern.split('/').collect();
    let mut base = PathBuf::new();

    for (index, segment) in segments.iter().enumerate() {
        let is_last = index + 1 == segments.len();
        if is_last || segment.contains(['*', '?', '[', '{']) {
            break;
        }
        base.push(segment);
    }

    base
}

/// Root-relative path with `/` separators, as globs expect
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl FileSet {
    pub fn new(patterns: &[String]) -> ConfigResult<Self> {
        let mut includes = Vec::new();
        let mut excludes = GlobSetBuilder::new();

        for pattern in patterns {
            if let Some(negated) = pattern.strip_prefix('!') {
                excludes.add(compile_glob(negated)?);
            } else {
                includes.push(Include {
                    base: glob_base(pattern),
                    matcher: compile_glob(pattern)?.compile_matcher(),
                });
            }
        }

        let excludes = excludes.build().map_err(|e| ConfigError::InvalidGlob {
            pattern: patterns.join(", "),
            error: e.to_string(),
        })?;

        Ok(FileSet {
            patterns: patterns.to_vec(),
            includes,
            excludes,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether a root-relative `/`-separated path is selected
    pub fn matches(&self, relative: &str) -> bool {
        !self.excludes.is_match(relative)
            && self.includes.iter().any(|inc| inc.matcher.is_match(relative))
    }

    /// Collect the selected files under `root`, sorted by path
    pub fn collect(&self, root: &Path) -> TaskResult<Vec<SourceFile>> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for include in &self.includes {
            let base_dir = root.join(&include.base);
            if !base_dir.is_dir() {
                continue;
            }

            for entry in WalkDir::new(&base_dir).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| base_dir.clone());
                    TaskError::Read {
                        path,
                        source: io::Error::from(e),
                    }
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }

                let path = entry.path();
                let rel_to_root = match path.strip_prefix(root) {
                    Ok(rel) => slash_path(rel),
                    Err(_) => continue,
                };

                if !include.matcher.is_match(&rel_to_root) || self.excludes.is_match(&rel_to_root) {
                    continue;
                }
                if !seen.insert(path.to_path_buf()) {
                    continue;
                }

                let relative = path
                    .strip_prefix(&base_dir)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| PathBuf::from(entry.file_name()));

                files.push(SourceFile {
                    path: path.to_path_buf(),
                    relative,
                });
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    fn set(patterns: &[&str]) -> FileSet {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        FileSet::new(&patterns).unwrap()
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("src/views/**/*.html"), PathBuf::from("src/views"));
        assert_eq!(glob_base("src/style/lib/*"), PathBuf::from("src/style/lib"));
        assert_eq!(glob_base("src/image/**/*.{jpg,png}"), PathBuf::from("src/image"));
        assert_eq!(glob_base("src/a.js"), PathBuf::from("src"));
        assert_eq!(glob_base("*.html"), PathBuf::new());
    }

    #[test]
    fn test_negation_excludes_vendor() {
        let files = set(&["src/style/**/*.scss", "!src/style/lib/*"]);
        assert!(files.matches("src/style/main.scss"));
        assert!(files.matches("src/style/pages/home.scss"));
        assert!(!files.matches("src/style/lib/reset.scss"));
        assert!(!files.matches("src/style/main.css"));
    }

    #[test]
    fn test_star_does_not_cross_directories() {
        let files = set(&["src/style/lib/*"]);
        assert!(files.matches("src/style/lib/reset.css"));
        assert!(!files.matches("src/style/lib/nested/x.css"));
    }

    #[test]
    fn test_collect_relative_to_base() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "src/javascript/b.js");
        touch(temp.path(), "src/javascript/a.js");
        touch(temp.path(), "src/javascript/pages/home.js");
        touch(temp.path(), "src/javascript/lib/jquery.js");
        touch(temp.path(), "src/javascript/notes.txt");

        let files = set(&["src/javascript/**/*.js", "!src/javascript/lib/*"])
            .collect(temp.path())
            .unwrap();

        let relative: Vec<_> = files.iter().map(|f| slash_path(&f.relative)).collect();
        assert_eq!(relative, vec!["a.js", "b.js", "pages/home.js"]);
    }

    #[test]
    fn test_collect_dedups_overlapping_patterns() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "src/views/index.html");

        let files = set(&["src/views/**/*.html", "src/**/*.html"])
            .collect(temp.path())
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, PathBuf::from("index.html"));
    }

    #[test]
    fn test_collect_missing_base_is_empty() {
        let temp = TempDir::new().unwrap();
        let files = set(&["src/image/**/*.png"]).collect(temp.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        let result = FileSet::new(&["src/**/*.{js".to_string()]);
        assert!(matches!(result, Err(ConfigError::InvalidGlob { .. })));
    }
}

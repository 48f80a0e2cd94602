//! Go source header scanning.
//!
//! Parses a single source file far enough to learn its package clause and
//! import list, plus the classification flags allocation needs. A full
//! syntax parse is not required; tree-sitter gives us the header even when
//! later parts of the file are in flux.

use std::path::Path;

use thiserror::Error;
use tracing::warn;
use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator};

/// Embedded header query, compiled once per scanner.
const GO_HEADER_QUERY: &str = include_str!("../queries/go-header.scm");

/// Errors from scanning source files.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The file is not parseable Go source
    #[error("Failed to parse {file}: {detail}")]
    Parse { file: String, detail: String },

    /// Reading the file or listing the directory failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to set the parser language
    #[error("Failed to set parser language: {0}")]
    LanguageSetFailed(String),

    /// Failed to compile the header query
    #[error("Failed to compile header query: {0}")]
    QueryCompileFailed(String),
}

/// The scanned header of one source file. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// File name within its directory, e.g. `main.go`
    pub name: String,

    /// Declared package name
    pub package: String,

    /// Import paths in declaration order, deduplicated
    pub imports: Vec<String>,

    /// File name ends in `_test.go`
    pub is_test: bool,

    /// Declared package is `main`
    pub is_command: bool,

    /// Imports the pseudo-package `"C"`
    pub uses_cgo: bool,
}

impl SourceDescriptor {
    /// Whether this file's package marks it as an external test package for
    /// a directory whose own package is `own_package`.
    pub fn is_external_test(&self, own_package: &str) -> bool {
        self.is_test && self.package == format!("{own_package}_test")
    }
}

/// Scans Go source files for their headers.
pub struct SourceScanner {
    parser: Parser,
    query: Query,
}

impl SourceScanner {
    /// Create a scanner with the Go grammar and header query loaded.
    pub fn new() -> Result<Self, ScanError> {
        let language: tree_sitter::Language = tree_sitter_go::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| ScanError::LanguageSetFailed(e.to_string()))?;
        let query = Query::new(&language, GO_HEADER_QUERY)
            .map_err(|e| ScanError::QueryCompileFailed(format!("{e:?}")))?;
        Ok(Self { parser, query })
    }

    /// Scan a single source file into its descriptor.
    pub fn scan_file(&mut self, path: &Path) -> Result<SourceDescriptor, ScanError> {
        let content = std::fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.scan_source(&name, &content)
    }

    /// Scan source text under a given file name.
    pub fn scan_source(&mut self, name: &str, content: &str) -> Result<SourceDescriptor, ScanError> {
        let tree = self
            .parser
            .parse(content, None)
            .ok_or_else(|| ScanError::Parse {
                file: name.to_string(),
                detail: "tree-sitter parse returned no tree".to_string(),
            })?;

        let source_bytes = content.as_bytes();
        let capture_names = self.query.capture_names();

        let mut package = None;
        let mut imports: Vec<String> = Vec::new();

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.query, tree.root_node(), source_bytes);
        while let Some(match_) = matches.next() {
            for capture in match_.captures {
                let capture_name = capture_names[capture.index as usize];
                let text = capture.node.utf8_text(source_bytes).unwrap_or("");
                match capture_name {
                    "package.name" => {
                        if package.is_none() {
                            package = Some(text.to_string());
                        }
                    }
                    "import.path" => {
                        let path = text.trim_matches(|c| c == '"' || c == '`').to_string();
                        if !imports.contains(&path) {
                            imports.push(path);
                        }
                    }
                    _ => {}
                }
            }
        }

        let package = package.ok_or_else(|| ScanError::Parse {
            file: name.to_string(),
            detail: "missing package clause".to_string(),
        })?;

        let uses_cgo = imports.iter().any(|i| i == "C");
        Ok(SourceDescriptor {
            name: name.to_string(),
            is_test: name.ends_with("_test.go"),
            is_command: package == "main",
            package,
            imports,
            uses_cgo,
        })
    }

    /// Scan every `.go` file in `dir`, in sorted name order. Files that
    /// fail to parse are skipped with a warning; stray non-source files are
    /// common and must not abort the run.
    pub fn scan_dir(&mut self, dir: &Path) -> Result<Vec<SourceDescriptor>, ScanError> {
        let mut names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".go") && entry.file_type()?.is_file() {
                names.push(name);
            }
        }
        names.sort();

        let mut descriptors = Vec::new();
        for name in names {
            match self.scan_file(&dir.join(&name)) {
                Ok(desc) => descriptors.push(desc),
                Err(ScanError::Parse { file, detail }) => {
                    warn!("Skipping unparseable source {file}: {detail}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scanner() -> SourceScanner {
        SourceScanner::new().unwrap()
    }

    #[test]
    fn test_scan_library_file() {
        let desc = scanner()
            .scan_source(
                "foo.go",
                "package foo\n\nimport (\n\t\"fmt\"\n\t\"github.com/bar/baz\"\n)\n\nfunc F() {}\n",
            )
            .unwrap();
        assert_eq!(desc.package, "foo");
        assert_eq!(desc.imports, vec!["fmt", "github.com/bar/baz"]);
        assert!(!desc.is_test);
        assert!(!desc.is_command);
        assert!(!desc.uses_cgo);
    }

    #[test]
    fn test_scan_single_import() {
        let desc = scanner()
            .scan_source("foo.go", "package foo\n\nimport \"fmt\"\n")
            .unwrap();
        assert_eq!(desc.imports, vec!["fmt"]);
    }

    #[test]
    fn test_scan_command_file() {
        let desc = scanner()
            .scan_source("main.go", "package main\n\nfunc main() {}\n")
            .unwrap();
        assert!(desc.is_command);
    }

    #[test]
    fn test_scan_test_file_classification() {
        let desc = scanner()
            .scan_source("foo_test.go", "package foo\n\nimport \"testing\"\n")
            .unwrap();
        assert!(desc.is_test);
        assert!(!desc.is_external_test("foo"));

        let desc = scanner()
            .scan_source("foo_test.go", "package foo_test\n\nimport \"testing\"\n")
            .unwrap();
        assert!(desc.is_external_test("foo"));
    }

    #[test]
    fn test_scan_cgo_file() {
        let desc = scanner()
            .scan_source("cgo.go", "package foo\n\nimport \"C\"\n")
            .unwrap();
        assert!(desc.uses_cgo);
    }

    #[test]
    fn test_named_and_duplicate_imports() {
        let desc = scanner()
            .scan_source(
                "foo.go",
                "package foo\n\nimport (\n\tx \"example.com/a\"\n\t_ \"example.com/a\"\n\t. \"example.com/b\"\n)\n",
            )
            .unwrap();
        assert_eq!(desc.imports, vec!["example.com/a", "example.com/b"]);
    }

    #[test]
    fn test_missing_package_clause_fails() {
        let err = scanner().scan_source("junk.go", "this is not go\n").unwrap_err();
        assert!(matches!(err, ScanError::Parse { .. }));
    }

    #[test]
    fn test_scan_dir_skips_unparseable() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("good.go"), "package foo\n").unwrap();
        std::fs::write(temp.path().join("bad.go"), "!!!\n").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "not source\n").unwrap();

        let descs = scanner().scan_dir(temp.path()).unwrap();
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].name, "good.go");
    }

    #[test]
    fn test_scan_dir_sorted_order() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("b.go"), "package foo\n").unwrap();
        std::fs::write(temp.path().join("a.go"), "package foo\n").unwrap();

        let descs = scanner().scan_dir(temp.path()).unwrap();
        let names: Vec<_> = descs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a.go", "b.go"]);
    }
}

//! Rule allocation: partitioning a directory's source files across its
//! build rules.
//!
//! Each scanned file must end up in exactly one rule. Files already named
//! by a rule's declared sources stay put; the rest are matched against
//! existing rules by kind and package identity, in declaration order, and
//! only when nothing matches is a new rule synthesized.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::build::{BinOp, BuildFile, CallExpr, Expr};
use crate::glob::{GlobError, GlobEvaluator};
use crate::kinds::{Kind, KindType};
use crate::label;
use crate::scan::{ScanError, SourceDescriptor, SourceScanner};
use depsync_config::ConfigLayers;

/// Errors from allocation.
#[derive(Debug, Error)]
pub enum AllocateError {
    /// A computed source list failed to materialize
    #[error(transparent)]
    Glob(#[from] GlobError),

    /// Reading a declared source failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The outcome of allocating one directory.
#[derive(Debug)]
pub struct AllocationResult {
    /// Every rule in the file after allocation, in declaration order
    pub rules: Vec<(usize, Kind)>,

    /// Whether any source list was mutated or a rule created
    pub modified: bool,
}

/// Allocate `sources` across the rules of `file`.
pub fn allocate(
    file: &mut BuildFile,
    sources: &[SourceDescriptor],
    dir: &Path,
    config: &ConfigLayers,
    glob: &mut GlobEvaluator,
    scanner: &mut SourceScanner,
) -> Result<AllocationResult, AllocateError> {
    let mut modified = false;
    let mut claimed: HashSet<String> = HashSet::new();
    // Rule package names, derived lazily from each rule's first scannable
    // declared source. None = still unknown.
    let mut rule_pkgs: HashMap<usize, Option<String>> = HashMap::new();

    let mut rules = file.rules(config);

    // First pass: collect what the existing rules already cover, dropping
    // declared sources that no longer exist on disk.
    for (idx, kind) in &rules {
        if kind.non_go_sources {
            continue;
        }
        let call = file.call_mut(*idx);
        match call.attr(&kind.srcs_attr).cloned() {
            Some(Expr::List(_)) => {
                let declared = call.str_list_attr(&kind.srcs_attr).unwrap_or_default();
                let mut kept = Vec::new();
                for entry in declared {
                    if label::looks_like_build_label(&entry) {
                        kept.push(entry);
                    } else if dir.join(&entry).is_file() {
                        claimed.insert(entry.clone());
                        kept.push(entry);
                    } else {
                        debug!("dropping vanished source {entry} from {}", call.rule_name());
                        modified = true;
                    }
                }
                call.set_attr(&kind.srcs_attr, Expr::str_list(kept));
            }
            Some(expr) => {
                claimed.extend(glob.evaluate(dir, &expr)?);
            }
            None => {}
        }
    }

    // The directory's own (non-test) package name, for spotting external
    // test packages. Falls back to the directory base name.
    let own_package = sources
        .iter()
        .find(|s| !s.is_test)
        .map(|s| s.package.clone())
        .unwrap_or_else(|| dir_base(dir));

    for source in sources {
        if claimed.contains(&source.name) {
            continue;
        }
        let wanted = classify(source);

        let mut target = None;
        for (idx, kind) in &rules {
            if kind.kind_type != wanted || kind.non_go_sources {
                continue;
            }
            let pkg = rule_package(file, *idx, kind, dir, scanner, &mut rule_pkgs)?;
            match pkg {
                Some(pkg) if pkg != source.package => continue,
                // First match wins; later candidates are never preferred.
                _ => {
                    target = Some((*idx, kind.clone()));
                    break;
                }
            }
        }

        match target {
            Some((idx, kind)) => {
                debug!("allocating {} to {}", source.name, file.call(idx).rule_name());
                add_source(file.call_mut(idx), &kind, &source.name);
                rule_pkgs.insert(idx, Some(source.package.clone()));
            }
            None => {
                let idx = synthesize_rule(file, source, &own_package, dir);
                rule_pkgs.insert(idx, Some(source.package.clone()));
                rules.push((idx, Kind::default_for(wanted).clone()));
            }
        }
        claimed.insert(source.name.clone());
        modified = true;
    }

    Ok(AllocationResult {
        rules: file.rules(config),
        modified,
    })
}

fn classify(source: &SourceDescriptor) -> KindType {
    if source.is_test {
        KindType::Test
    } else if source.is_command {
        KindType::Bin
    } else {
        KindType::Lib
    }
}

/// The package name of a rule, derived from its first declared source that
/// scans successfully. Cached per rule; unparseable or label entries leave
/// it unknown.
fn rule_package(
    file: &BuildFile,
    idx: usize,
    kind: &Kind,
    dir: &Path,
    scanner: &mut SourceScanner,
    cache: &mut HashMap<usize, Option<String>>,
) -> Result<Option<String>, AllocateError> {
    if let Some(pkg) = cache.get(&idx) {
        return Ok(pkg.clone());
    }

    let mut pkg = None;
    let declared = file.call(idx).str_list_attr(&kind.srcs_attr).unwrap_or_default();
    for entry in declared {
        if label::looks_like_build_label(&entry) {
            continue;
        }
        match scanner.scan_file(&dir.join(&entry)) {
            Ok(desc) => {
                pkg = Some(desc.package);
                break;
            }
            Err(ScanError::Parse { .. }) => continue,
            Err(ScanError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(ScanError::Io(e)) => return Err(e.into()),
            Err(_) => continue,
        }
    }

    cache.insert(idx, pkg.clone());
    Ok(pkg)
}

/// Add a file to a rule's sources. Literal lists are extended in place; a
/// computed expression keeps its shape and gains the file via set union.
fn add_source(call: &mut CallExpr, kind: &Kind, name: &str) {
    match call.attr_mut(&kind.srcs_attr) {
        None => call.set_attr(&kind.srcs_attr, Expr::str_list([name])),
        Some(Expr::List(items)) => items.push(Expr::Str(name.to_string())),
        Some(expr) => {
            let existing = expr.clone();
            *expr = Expr::Binary {
                op: BinOp::Add,
                lhs: Box::new(existing),
                rhs: Box::new(Expr::str_list([name])),
            };
        }
    }
}

/// Create a new rule for a file nothing existing can hold.
fn synthesize_rule(
    file: &mut BuildFile,
    source: &SourceDescriptor,
    own_package: &str,
    dir: &Path,
) -> usize {
    let base = dir_base(dir);
    let (kind_name, mut name) = match classify(source) {
        KindType::Test => ("go_test", format!("{base}_test")),
        KindType::Bin => ("go_binary", base.clone()),
        KindType::Lib => ("go_library", base.clone()),
    };
    // Names must stay unique within the file.
    if file.find_rule(&name).is_some() {
        let mut n = 2;
        while file.find_rule(&format!("{name}_{n}")).is_some() {
            n += 1;
        }
        name = format!("{name}_{n}");
    }

    debug!("creating {kind_name} rule {name} for {}", source.name);
    let mut call = CallExpr::new(kind_name)
        .with_attr("name", Expr::Str(name))
        .with_attr("srcs", Expr::str_list([source.name.as_str()]));
    if source.is_external_test(own_package) {
        call = call.with_attr("external", Expr::Bool(true));
    }
    file.push_call(call)
}

fn dir_base(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Fixture {
        temp: tempfile::TempDir,
        scanner: SourceScanner,
        glob: GlobEvaluator,
        config: ConfigLayers,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                temp: tempfile::TempDir::new().unwrap(),
                scanner: SourceScanner::new().unwrap(),
                glob: GlobEvaluator::new(),
                config: ConfigLayers::default(),
            }
        }

        fn dir(&self) -> std::path::PathBuf {
            self.temp.path().join("foo")
        }

        fn write(&self, name: &str, content: &str) {
            std::fs::create_dir_all(self.dir()).unwrap();
            std::fs::write(self.dir().join(name), content).unwrap();
        }

        fn scan(&mut self) -> Vec<SourceDescriptor> {
            self.scanner.scan_dir(&self.dir()).unwrap()
        }

        fn allocate(&mut self, file: &mut BuildFile) -> AllocationResult {
            let sources = self.scan();
            let dir = self.dir();
            allocate(
                file,
                &sources,
                &dir,
                &self.config,
                &mut self.glob,
                &mut self.scanner,
            )
            .unwrap()
        }
    }

    fn build_file(content: &str) -> BuildFile {
        BuildFile::parse("foo/BUILD", "foo", content).unwrap()
    }

    // The canonical allocation scenario: one library file joins the
    // existing library, an internal test joins the existing test rule, and
    // an external test package gets a rule of its own.
    #[test]
    fn test_allocation_scenario() {
        let mut fx = Fixture::new();
        fx.write("foo.go", "package foo\n");
        fx.write("foo_test.go", "package foo\n");
        fx.write("bar.go", "package foo\n");
        fx.write("bar_test.go", "package foo\n");
        fx.write("external_test.go", "package foo_test\n");

        let mut file = build_file(
            "go_library(name = \"foo\", srcs = [\"foo.go\"])\n\
             go_test(name = \"foo_test\", srcs = [\"foo_test.go\"])\n",
        );
        let result = fx.allocate(&mut file);
        assert!(result.modified);
        assert_eq!(result.rules.len(), 3);

        let lib = file.find_rule("foo").unwrap();
        assert_eq!(
            file.call(lib).str_list_attr("srcs"),
            Some(vec!["foo.go".to_string(), "bar.go".to_string()])
        );

        let test = file.find_rule("foo_test").unwrap();
        assert_eq!(
            file.call(test).str_list_attr("srcs"),
            Some(vec!["foo_test.go".to_string(), "bar_test.go".to_string()])
        );

        // The external test package got its own rule containing only
        // itself, marked external.
        let (ext_idx, _) = result.rules[2];
        let ext = file.call(ext_idx);
        assert_eq!(
            ext.str_list_attr("srcs"),
            Some(vec!["external_test.go".to_string()])
        );
        assert!(ext.bool_attr("external"));
    }

    #[test]
    fn test_vanished_sources_dropped() {
        let mut fx = Fixture::new();
        fx.write("foo.go", "package foo\n");

        let mut file = build_file("go_library(name = \"foo\", srcs = [\"foo.go\", \"gone.go\"])\n");
        let result = fx.allocate(&mut file);
        assert!(result.modified);

        let lib = file.find_rule("foo").unwrap();
        assert_eq!(
            file.call(lib).str_list_attr("srcs"),
            Some(vec!["foo.go".to_string()])
        );
    }

    #[test]
    fn test_label_sources_kept_and_never_claimed() {
        let mut fx = Fixture::new();
        fx.write("foo.go", "package foo\n");

        let mut file = build_file("go_library(name = \"foo\", srcs = [\":gen\", \"foo.go\"])\n");
        let result = fx.allocate(&mut file);
        assert!(!result.modified);

        let lib = file.find_rule("foo").unwrap();
        assert_eq!(
            file.call(lib).str_list_attr("srcs"),
            Some(vec![":gen".to_string(), "foo.go".to_string()])
        );
    }

    #[test]
    fn test_no_rules_synthesizes_library() {
        let mut fx = Fixture::new();
        fx.write("foo.go", "package foo\n");

        let mut file = build_file("");
        let result = fx.allocate(&mut file);
        assert!(result.modified);
        assert_eq!(result.rules.len(), 1);

        let (idx, kind) = &result.rules[0];
        assert_eq!(kind.name, "go_library");
        assert_eq!(file.call(*idx).rule_name(), "foo");
    }

    #[test]
    fn test_command_files_get_binary_rule() {
        let mut fx = Fixture::new();
        fx.write("main.go", "package main\n");

        let mut file = build_file("");
        let result = fx.allocate(&mut file);
        let (idx, kind) = &result.rules[0];
        assert_eq!(kind.name, "go_binary");
        assert_eq!(file.call(*idx).rule_name(), "foo");
    }

    #[test]
    fn test_package_mismatch_creates_second_rule() {
        let mut fx = Fixture::new();
        fx.write("foo.go", "package foo\n");
        fx.write("other.go", "package other\n");

        let mut file = build_file("go_library(name = \"foo\", srcs = [\"foo.go\"])\n");
        let result = fx.allocate(&mut file);
        assert_eq!(result.rules.len(), 2);

        // The synthesized name avoids the existing rule's.
        let (idx, _) = result.rules[1];
        assert_eq!(file.call(idx).rule_name(), "foo_2");
        assert_eq!(
            file.call(idx).str_list_attr("srcs"),
            Some(vec!["other.go".to_string()])
        );
    }

    #[test]
    fn test_rule_with_unknown_package_claims_first_match() {
        let mut fx = Fixture::new();
        fx.write("new.go", "package foo\n");

        // The empty rule's package is unknown, so the first unallocated
        // file of matching classification joins it.
        let mut file = build_file("go_library(name = \"foo\", srcs = [])\n");
        let result = fx.allocate(&mut file);
        assert_eq!(result.rules.len(), 1);

        let lib = file.find_rule("foo").unwrap();
        assert_eq!(
            file.call(lib).str_list_attr("srcs"),
            Some(vec!["new.go".to_string()])
        );
    }

    #[test]
    fn test_glob_covered_files_not_reallocated() {
        let mut fx = Fixture::new();
        fx.write("foo.go", "package foo\n");
        fx.write("bar.go", "package foo\n");

        let mut file = build_file("go_library(name = \"foo\", srcs = glob([\"*.go\"]))\n");
        let result = fx.allocate(&mut file);
        assert!(!result.modified);
        // The computed expression is untouched.
        let lib = file.find_rule("foo").unwrap();
        assert!(matches!(file.call(lib).attr("srcs"), Some(Expr::Call(_))));
    }

    #[test]
    fn test_glob_miss_appends_via_union() {
        let mut fx = Fixture::new();
        fx.write("foo.go", "package foo\n");
        fx.write("excluded.go", "package foo\n");

        let mut file = build_file(
            "go_library(name = \"foo\", srcs = glob([\"*.go\"], exclude = [\"excluded.go\"]))\n",
        );
        let result = fx.allocate(&mut file);
        assert!(result.modified);

        let lib = file.find_rule("foo").unwrap();
        let Some(Expr::Binary { op, rhs, .. }) = file.call(lib).attr("srcs") else {
            panic!("expected union expression");
        };
        assert_eq!(*op, BinOp::Add);
        assert_eq!(rhs.as_str_list(), Some(vec!["excluded.go".to_string()]));
    }

    #[test]
    fn test_generated_kinds_ignored() {
        let mut fx = Fixture::new();
        fx.write("foo.go", "package foo\n");

        let mut file = build_file(
            "proto_library(name = \"foo_proto\", srcs = [\"foo.proto\"])\n\
             go_library(name = \"foo\", srcs = [\"foo.go\"])\n",
        );
        let result = fx.allocate(&mut file);
        assert!(!result.modified);
        // proto_library srcs were neither claimed nor pruned.
        let proto = file.find_rule("foo_proto").unwrap();
        assert_eq!(
            file.call(proto).str_list_attr("srcs"),
            Some(vec!["foo.proto".to_string()])
        );
    }
}

//! Build-file parsing, inspection and serialization.
//!
//! The original system hands this work to an external parser/formatter; no
//! Rust equivalent exists, so the consumed subset lives here: rule calls
//! with attributes, `package(...)`, `subinclude(...)`, assignments, and
//! glob/set-algebra source expressions. Serialization is canonical, not
//! comment-preserving.

pub mod ast;
mod lexer;
mod parser;
mod printer;

pub use ast::{Arg, BinOp, CallExpr, Expr, Stmt};
pub use parser::parse as parse_statements;

use std::path::PathBuf;

use thiserror::Error;

use crate::kinds::{self, Kind};
use depsync_config::ConfigLayers;

/// Errors from reading build files.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Unrecognized characters in the file
    #[error("lex error at line {line}")]
    Lex { line: usize },

    /// The file's statements did not parse
    #[error("parse error at line {line}: {detail}")]
    Parse { line: usize, detail: String },
}

/// One build file: its on-disk location, owning package directory, and
/// parsed statement list. Mutations stay in memory until the graph flushes.
#[derive(Debug, Clone)]
pub struct BuildFile {
    /// On-disk path of the file
    pub path: PathBuf,

    /// Package directory relative to the repository root; `""` at the root
    pub pkg_dir: String,

    /// Top-level statements in declaration order
    pub stmts: Vec<Stmt>,
}

impl BuildFile {
    /// Parse file content into a build file.
    pub fn parse(
        path: impl Into<PathBuf>,
        pkg_dir: impl Into<String>,
        content: &str,
    ) -> Result<Self, BuildError> {
        Ok(Self {
            path: path.into(),
            pkg_dir: pkg_dir.into(),
            stmts: parser::parse(content)?,
        })
    }

    /// A file with no statements yet, to be created on flush if populated.
    pub fn empty(path: impl Into<PathBuf>, pkg_dir: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            pkg_dir: pkg_dir.into(),
            stmts: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Canonical serialization of the whole file.
    pub fn serialize(&self) -> String {
        printer::print_file(&self.stmts)
    }

    /// The call statement at `idx`. Panics if the statement is not a call;
    /// callers hold indices produced by [`BuildFile::rules`].
    pub fn call(&self, idx: usize) -> &CallExpr {
        match &self.stmts[idx] {
            Stmt::Call(call) => call,
            other => panic!("statement {idx} is not a call: {other:?}"),
        }
    }

    pub fn call_mut(&mut self, idx: usize) -> &mut CallExpr {
        match &mut self.stmts[idx] {
            Stmt::Call(call) => call,
            other => panic!("statement {idx} is not a call: {other:?}"),
        }
    }

    /// Indices and kinds of every statement that is a known rule call,
    /// in declaration order.
    pub fn rules(&self, config: &ConfigLayers) -> Vec<(usize, Kind)> {
        self.stmts
            .iter()
            .enumerate()
            .filter_map(|(idx, stmt)| match stmt {
                Stmt::Call(call) => kinds::lookup(config, &call.name).map(|kind| (idx, kind)),
                _ => None,
            })
            .collect()
    }

    /// Find a rule call by its `name` attribute.
    pub fn find_rule(&self, name: &str) -> Option<usize> {
        self.stmts.iter().position(|stmt| {
            matches!(stmt, Stmt::Call(call) if call.rule_name() == name && call.name != "package")
        })
    }

    /// Append a call statement, returning its index.
    pub fn push_call(&mut self, call: CallExpr) -> usize {
        self.stmts.push(Stmt::Call(call));
        self.stmts.len() - 1
    }

    /// Ensure a `subinclude(...)` statement mentions `target`: appends the
    /// argument to an existing statement, or inserts a fresh statement at
    /// the top. Never duplicates. Returns whether the file changed.
    pub fn ensure_subinclude(&mut self, target: &str) -> bool {
        for stmt in &mut self.stmts {
            let Stmt::Call(call) = stmt else { continue };
            if call.name != "subinclude" {
                continue;
            }
            let already = call
                .args
                .iter()
                .any(|a| a.value.as_str() == Some(target));
            if already {
                return false;
            }
            call.args.push(Arg {
                name: None,
                value: Expr::Str(target.to_string()),
            });
            return true;
        }

        let mut call = CallExpr::new("subinclude");
        call.args.push(Arg {
            name: None,
            value: Expr::Str(target.to_string()),
        });
        self.stmts.insert(0, Stmt::Call(call));
        true
    }

    /// The file's package-level default visibility, from a
    /// `package(default_visibility = [...])` statement.
    pub fn default_visibility(&self) -> Option<Vec<String>> {
        self.stmts.iter().find_map(|stmt| match stmt {
            Stmt::Call(call) if call.name == "package" => {
                call.str_list_attr("default_visibility")
            }
            _ => None,
        })
    }
}

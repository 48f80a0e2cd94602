//! Evaluation of computed source-list expressions.
//!
//! Build files may declare sources as `glob(...)` calls combined with `+`
//! (union) and `-` (difference). Expressions are first lowered into a
//! closed variant type so the evaluator is exhaustive; any shape outside
//! the subset lowers to `Opaque`, which evaluates to the empty set — build
//! files routinely contain constructs irrelevant to source computation.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;

use crate::build::{BinOp, Expr};

/// Errors from materializing a source-list expression.
#[derive(Debug, Error)]
pub enum GlobError {
    /// A glob pattern did not compile
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),

    /// Listing the directory failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A source-list expression in closed form.
#[derive(Debug, Clone, PartialEq)]
pub enum SetExpr {
    /// A literal list of file names
    Literal(Vec<String>),
    /// A `glob(include, exclude)` call
    Glob {
        include: Vec<String>,
        exclude: Vec<String>,
    },
    /// Set union (`+`)
    Union(Box<SetExpr>, Box<SetExpr>),
    /// Set difference (`-`)
    Difference(Box<SetExpr>, Box<SetExpr>),
    /// Anything outside the subset; evaluates to the empty set
    Opaque,
}

/// Lower a build expression into closed set-algebra form.
pub fn lower(expr: &Expr) -> SetExpr {
    match expr {
        Expr::List(_) => match expr.as_str_list() {
            Some(items) => SetExpr::Literal(items),
            None => SetExpr::Opaque,
        },
        Expr::Call(call) if call.name == "glob" => {
            // Arguments may be positional or keyword; unrelated keywords
            // (allow_empty and friends) are ignored without error.
            let include = call
                .attr("include")
                .or_else(|| call.positional(0))
                .and_then(Expr::as_str_list)
                .unwrap_or_default();
            let exclude = call
                .attr("exclude")
                .or_else(|| call.positional(1))
                .and_then(Expr::as_str_list)
                .unwrap_or_default();
            SetExpr::Glob { include, exclude }
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = Box::new(lower(lhs));
            let rhs = Box::new(lower(rhs));
            match op {
                BinOp::Add => SetExpr::Union(lhs, rhs),
                BinOp::Sub => SetExpr::Difference(lhs, rhs),
            }
        }
        _ => SetExpr::Opaque,
    }
}

/// Evaluates source-list expressions against real directories.
///
/// Glob results are cached per (directory, include, exclude) for the
/// lifetime of the evaluator instance.
#[derive(Debug, Default)]
pub struct GlobEvaluator {
    cache: HashMap<(PathBuf, Vec<String>, Vec<String>), BTreeSet<String>>,
}

impl GlobEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize the file-name set a build expression denotes in `dir`.
    pub fn evaluate(&mut self, dir: &Path, expr: &Expr) -> Result<BTreeSet<String>, GlobError> {
        self.eval_set(dir, &lower(expr))
    }

    fn eval_set(&mut self, dir: &Path, set: &SetExpr) -> Result<BTreeSet<String>, GlobError> {
        match set {
            SetExpr::Literal(items) => Ok(items.iter().cloned().collect()),
            SetExpr::Glob { include, exclude } => self.glob(dir, include, exclude),
            SetExpr::Union(lhs, rhs) => {
                let mut out = self.eval_set(dir, lhs)?;
                out.extend(self.eval_set(dir, rhs)?);
                Ok(out)
            }
            SetExpr::Difference(lhs, rhs) => {
                let mut out = self.eval_set(dir, lhs)?;
                let minus = self.eval_set(dir, rhs)?;
                out.retain(|f| !minus.contains(f));
                Ok(out)
            }
            SetExpr::Opaque => Ok(BTreeSet::new()),
        }
    }

    fn glob(
        &mut self,
        dir: &Path,
        include: &[String],
        exclude: &[String],
    ) -> Result<BTreeSet<String>, GlobError> {
        let key = (dir.to_path_buf(), include.to_vec(), exclude.to_vec());
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        let include_set = build_globset(include)?;
        let exclude_set = build_globset(exclude)?;

        let mut out = BTreeSet::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if include_set.is_match(&name) && !exclude_set.is_match(&name) {
                out.insert(name);
            }
        }

        self.cache.insert(key, out.clone());
        Ok(out)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, GlobError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

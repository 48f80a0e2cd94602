//! The build graph: loaded build files and cross-package dependency edges.
//!
//! Build files are loaded at most once per run and cached by package
//! directory. Every dependency a rule gains on another package's rule is
//! recorded as an edge; before flushing, a best-effort repair pass extends
//! target rules' visibility so each recorded edge stays legal.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn};

use crate::build::{BuildError, BuildFile, Expr};
use crate::kinds;
use crate::label;
use depsync_config::{ConfigError, ConfigLoader};

/// Errors from loading or flushing build files.
#[derive(Debug, Error)]
pub enum GraphError {
    /// More than one accepted build file name is taken by a directory
    #[error("ambiguous build files in {dir}: {names:?} exist as directories")]
    AmbiguousBuildFiles { dir: PathBuf, names: Vec<String> },

    /// Several accepted build files exist side by side
    #[error("conflicting build files in {dir}: {names:?} all exist")]
    ConflictingBuildFiles { dir: PathBuf, names: Vec<String> },

    /// No build file exists and every accepted name is taken
    #[error("no build file in {dir} and none of {names:?} can be created")]
    NoCreatableBuildFile { dir: PathBuf, names: Vec<String> },

    /// A build file failed to parse
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: BuildError,
    },

    /// Directory configuration failed to load
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns every loaded build file and the recorded dependency edges.
#[derive(Debug)]
pub struct BuildGraph {
    repo_root: PathBuf,

    /// Accepted build file names, in preference order
    build_file_names: Vec<String>,

    /// Package-directory prefixes exempt from visibility bookkeeping
    experimental_dirs: Vec<String>,

    /// Loaded files keyed by package directory
    files: HashMap<String, BuildFile>,

    /// Dependency edges in recording order
    edges: Vec<(String, String)>,
    edge_set: HashSet<(String, String)>,

    /// (from_pkg, to_pkg) pairs already resolved to a grant this run
    resolved: HashSet<(String, String)>,
}

impl BuildGraph {
    pub fn new(
        repo_root: impl Into<PathBuf>,
        build_file_names: Vec<String>,
        experimental_dirs: Vec<String>,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            build_file_names,
            experimental_dirs,
            files: HashMap::new(),
            edges: Vec::new(),
            edge_set: HashSet::new(),
            resolved: HashSet::new(),
        }
    }

    /// Load the build file owning `pkg_dir`, or synthesize an empty one
    /// keyed to the first creatable accepted name.
    pub fn load_file(&mut self, pkg_dir: &str) -> Result<&mut BuildFile, GraphError> {
        if !self.files.contains_key(pkg_dir) {
            let file = self.read_file(pkg_dir)?;
            self.files.insert(pkg_dir.to_string(), file);
        }
        Ok(self.files.get_mut(pkg_dir).expect("file just cached"))
    }

    fn read_file(&self, pkg_dir: &str) -> Result<BuildFile, GraphError> {
        let dir = self.repo_root.join(pkg_dir);
        let mut as_file = Vec::new();
        let mut as_dir = Vec::new();
        for name in &self.build_file_names {
            let candidate = dir.join(name);
            if candidate.is_file() {
                as_file.push(name.clone());
            } else if candidate.is_dir() {
                as_dir.push(name.clone());
            }
        }

        if as_file.len() > 1 {
            return Err(GraphError::ConflictingBuildFiles {
                dir,
                names: as_file,
            });
        }
        if as_dir.len() > 1 {
            return Err(GraphError::AmbiguousBuildFiles { dir, names: as_dir });
        }

        if let Some(name) = as_file.first() {
            let path = dir.join(name);
            debug!("Loading build file {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            return BuildFile::parse(&path, pkg_dir, &content)
                .map_err(|source| GraphError::Parse { path, source });
        }

        let name = self
            .build_file_names
            .iter()
            .find(|n| !as_dir.contains(n))
            .ok_or_else(|| GraphError::NoCreatableBuildFile {
                dir: dir.clone(),
                names: self.build_file_names.clone(),
            })?;
        Ok(BuildFile::empty(dir.join(name), pkg_dir))
    }

    /// The cached file for `pkg_dir`, if loaded.
    pub fn file(&self, pkg_dir: &str) -> Option<&BuildFile> {
        self.files.get(pkg_dir)
    }

    /// Record the dependency edge `from` → `to` unless the target cannot or
    /// need not be granted visibility: subrepo targets are never mutated
    /// from here, local/same-package references are always legal, and
    /// experimental packages opt out of bookkeeping entirely.
    pub fn ensure_visibility(&mut self, from: &str, to: &str) {
        if to.starts_with("///") || to.starts_with(':') {
            return;
        }
        let Some(from_pkg) = label::label_package(from) else {
            return;
        };
        let Some(to_pkg) = label::label_package(to) else {
            return;
        };
        if from_pkg == to_pkg {
            return;
        }
        if self.is_experimental(&from_pkg) {
            return;
        }
        let edge = (from.to_string(), to.to_string());
        if self.edge_set.insert(edge.clone()) {
            self.edges.push(edge);
        }
    }

    fn is_experimental(&self, pkg: &str) -> bool {
        self.experimental_dirs
            .iter()
            .any(|dir| pkg == dir || pkg.starts_with(&format!("{dir}/")))
    }

    /// Repair pass: extend target rules' visibility so every recorded edge
    /// is legal. Best-effort — an edge whose target rule no longer exists
    /// is reported and skipped. Idempotent: a second run over its own
    /// output performs no further mutation.
    pub fn repair_visibility(&mut self, configs: &mut ConfigLoader) -> Result<(), GraphError> {
        let edges = self.edges.clone();
        for (from, to) in edges {
            let Some(from_pkg) = label::label_package(&from) else {
                continue;
            };
            let Some((to_pkg, to_name)) = label::split_label(&to) else {
                continue;
            };
            // At most one grant per package pair per run.
            if !self.resolved.insert((from_pkg.clone(), to_pkg.clone())) {
                continue;
            }

            let chain = configs.chain(&self.repo_root, &self.repo_root.join(&to_pkg))?;
            let file = self.load_file(&to_pkg)?;
            let Some(idx) = file.find_rule(&to_name) else {
                warn!("visibility edge {from} -> {to}: no rule named {to_name} in //{to_pkg}");
                continue;
            };

            let call = file.call(idx);
            let explicit = call.str_list_attr("visibility");
            let effective = match explicit {
                Some(list) => list,
                None => {
                    let kind_default = kinds::lookup(&chain, &call.name)
                        .map(|k| k.default_visibility)
                        .filter(|v| !v.is_empty());
                    match kind_default {
                        Some(list) => list,
                        None => file.default_visibility().unwrap_or_default(),
                    }
                }
            };

            if covers(&effective, &from_pkg) {
                continue;
            }

            debug!("granting //{from_pkg} visibility on {to}");
            let mut extended = effective;
            extended.push(format!("//{from_pkg}:all"));
            file.call_mut(idx)
                .set_attr("visibility", Expr::str_list(extended));
        }
        Ok(())
    }

    /// Serialize every loaded, non-empty file. With `write` set, changed
    /// files replace their on-disk content; otherwise differences are
    /// reported to `out` and the disk is left untouched.
    pub fn format_files(&self, write: bool, out: &mut dyn Write) -> Result<(), GraphError> {
        let mut dirs: Vec<&String> = self.files.keys().collect();
        dirs.sort();
        for dir in dirs {
            let file = &self.files[dir];
            if file.is_empty() {
                continue;
            }
            let serialized = file.serialize();
            let on_disk = match std::fs::read_to_string(&file.path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(e.into()),
            };
            if serialized == on_disk {
                continue;
            }
            if write {
                debug!("Writing {}", file.path.display());
                // The third-party directory may not exist yet when its
                // first module is materialized.
                if let Some(parent) = file.path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&file.path, serialized)?;
            } else {
                writeln!(out, "--- {}", file.path.display())?;
                out.write_all(serialized.as_bytes())?;
            }
        }
        Ok(())
    }
}

/// Whether a visibility list already covers `from_pkg`.
fn covers(entries: &[String], from_pkg: &str) -> bool {
    entries.iter().any(|entry| {
        if entry == "PUBLIC" {
            return true;
        }
        if let Some(prefix) = entry.strip_suffix("/...").and_then(|e| e.strip_prefix("//")) {
            return from_pkg == prefix || from_pkg.starts_with(&format!("{prefix}/"));
        }
        if entry == "//..." {
            return true;
        }
        match label::split_label(entry) {
            Some((pkg, _)) => pkg == from_pkg,
            None => false,
        }
    })
}

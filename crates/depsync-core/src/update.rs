//! The update orchestrator.
//!
//! Walks a set of target directories strictly sequentially, driving
//! allocation and dependency resolution per directory, then flushes newly
//! discovered modules into the third-party build file, repairs visibility,
//! and serializes every touched build file. All session caches live on the
//! [`Updater`] instance; two updaters never share state.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::allocate::{self, AllocateError};
use crate::build::{CallExpr, Expr, Stmt};
use crate::glob::{GlobError, GlobEvaluator};
use crate::graph::{BuildGraph, GraphError};
use crate::kinds::{self, Kind};
use crate::label;
use crate::please::{Please, PleaseError};
use crate::resolve::{resolve_import, ResolveContext};
use crate::scan::{ScanError, SourceScanner};
use crate::trie::Trie;
use depsync_config::{ConfigError, ConfigLoader};
use depsync_proxy::{resolve_deps, version, Module, ProxyClient, ProxyError};

/// The subinclude every file with Go rules must carry.
const GO_SUBINCLUDE: &str = "///go//build_defs:go";

/// Where module archives are extracted, beneath the build output root.
const MODULE_CACHE_DIR: &str = "plz-out/depsync/modcache";

/// Errors that abort an update run.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Allocate(#[from] AllocateError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Please(#[from] PleaseError),

    #[error(transparent)]
    Glob(#[from] GlobError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One rule awaiting dependency computation, captured while its file was
/// borrowed.
struct PendingRule {
    idx: usize,
    kind: Kind,
    from_label: String,
    imports: Vec<String>,
}

/// Drives a whole sync run. Owns every per-run cache: loaded build files,
/// parsed configs, glob results, module lookups.
pub struct Updater {
    repo_root: PathBuf,
    configs: ConfigLoader,
    graph: BuildGraph,
    glob: GlobEvaluator,
    scanner: SourceScanner,
    proxy: ProxyClient,
    please: Please,

    /// The repository's own module path
    module_path: String,

    third_party_dir: String,

    /// Declared install paths from the third-party file
    trie: Trie,

    /// Modules resolvable as subrepos (declared or discovered this run)
    known_modules: Vec<String>,

    /// Requirements already materialized in the third-party file
    existing_modules: Vec<Module>,

    /// Requirements discovered this run, flushed at the end
    new_modules: Vec<Module>,
}

impl Updater {
    /// Create an updater rooted at `repo_root`, reading the root
    /// configuration and seeding third-party state from the build file.
    pub fn new(repo_root: impl Into<PathBuf>, plz_tool: &str) -> Result<Self, UpdateError> {
        let repo_root = repo_root.into();
        let mut configs = ConfigLoader::new();
        let root_chain = configs.chain(&repo_root, &repo_root)?;

        let module_path = root_chain.module_path().unwrap_or_default().to_string();
        let third_party_dir = root_chain.third_party_dir().to_string();
        let proxy_url = root_chain.module_proxy().to_string();
        let build_file_names = root_chain.build_file_names();
        let experimental: Vec<String> = root_chain
            .experimental_dirs()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut updater = Self {
            graph: BuildGraph::new(&repo_root, build_file_names, experimental),
            glob: GlobEvaluator::new(),
            scanner: SourceScanner::new()?,
            proxy: ProxyClient::new(proxy_url, repo_root.join(MODULE_CACHE_DIR)),
            please: Please::new(plz_tool, &repo_root),
            configs,
            repo_root,
            module_path,
            third_party_dir,
            trie: Trie::new(),
            known_modules: Vec::new(),
            existing_modules: Vec::new(),
            new_modules: Vec::new(),
        };
        updater.seed_third_party()?;
        Ok(updater)
    }

    /// Sync `paths` (repo-relative directories, `dir/...` for a subtree).
    /// With `write` unset, differences go to `out` and the disk is left
    /// untouched.
    pub fn update(
        &mut self,
        paths: &[String],
        write: bool,
        out: &mut dyn Write,
    ) -> Result<(), UpdateError> {
        let dirs = self.expand_paths(paths)?;
        for dir in &dirs {
            self.sync_dir(dir)?;
        }
        self.flush_modules()?;
        self.graph.repair_visibility(&mut self.configs)?;
        self.graph.format_files(write, out)?;
        Ok(())
    }

    /// Expand target paths: a trailing `/...` walks the subtree. Hidden
    /// directories and build output are never targets.
    fn expand_paths(&mut self, paths: &[String]) -> Result<Vec<String>, UpdateError> {
        let mut dirs: Vec<String> = Vec::new();
        for path in paths {
            let normalized = path.trim_matches('/');
            if let Some(base) = normalized
                .strip_suffix("...")
                .map(|b| b.trim_end_matches('/'))
            {
                let root = self.repo_root.join(base);
                for entry in WalkDir::new(&root).into_iter().filter_entry(|e| {
                    // The walk root itself is always accepted; only
                    // children are filtered by name.
                    if e.depth() == 0 {
                        return true;
                    }
                    let name = e.file_name().to_string_lossy();
                    !name.starts_with('.') && name != "plz-out"
                }) {
                    let entry = entry.map_err(|e| {
                        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
                    })?;
                    if !entry.file_type().is_dir() {
                        continue;
                    }
                    let rel = entry
                        .path()
                        .strip_prefix(&self.repo_root)
                        .unwrap_or(entry.path())
                        .to_string_lossy()
                        .into_owned();
                    push_unique(&mut dirs, rel);
                }
            } else {
                let rel = if normalized == "." { "" } else { normalized };
                push_unique(&mut dirs, rel.to_string());
            }
        }
        Ok(dirs)
    }

    /// Sync one directory: load, allocate, resolve, record edges.
    fn sync_dir(&mut self, pkg_dir: &str) -> Result<(), UpdateError> {
        let abs_dir = self.repo_root.join(pkg_dir);
        let chain = self.configs.chain(&self.repo_root, &abs_dir)?;
        if chain.stop() {
            debug!("skipping //{pkg_dir}: configured to stop");
            return Ok(());
        }

        let sources = self.scanner.scan_dir(&abs_dir)?;
        let file = self.graph.load_file(pkg_dir)?;
        if sources.is_empty() && file.is_empty() {
            return Ok(());
        }

        info!("syncing //{pkg_dir}");
        let result = allocate::allocate(
            file,
            &sources,
            &abs_dir,
            &chain,
            &mut self.glob,
            &mut self.scanner,
        )?;
        if result.modified {
            debug!("//{pkg_dir}: source lists updated");
        }

        // Capture each rule's imports, then release the file borrow before
        // resolution needs the graph again.
        let mut pending: Vec<PendingRule> = Vec::new();
        let from_dir = if pkg_dir.is_empty() { "." } else { pkg_dir };
        for (idx, kind) in result.rules {
            if kind.non_go_sources {
                continue;
            }
            let call = file.call(idx);
            let srcs: BTreeSet<String> = match call.attr(&kind.srcs_attr) {
                Some(Expr::List(_)) => call
                    .str_list_attr(&kind.srcs_attr)
                    .unwrap_or_default()
                    .into_iter()
                    .collect(),
                Some(expr) => {
                    let expr = expr.clone();
                    self.glob.evaluate(&abs_dir, &expr)?
                }
                None => BTreeSet::new(),
            };
            let mut imports = Vec::new();
            for source in sources.iter().filter(|s| srcs.contains(&s.name)) {
                for import in &source.imports {
                    if !imports.contains(import) {
                        imports.push(import.clone());
                    }
                }
            }
            pending.push(PendingRule {
                idx,
                from_label: label::build_target(call.rule_name(), from_dir, ""),
                kind,
                imports,
            });
        }

        let has_rules = !pending.is_empty();

        // Resolve every rule's dependency set.
        for rule in &pending {
            let own_target = format!(":{}", rule_name_of(&rule.from_label));
            let mut deps: BTreeSet<String> = BTreeSet::new();
            for import in &rule.imports {
                let resolved = {
                    let mut ctx = ResolveContext {
                        module_path: &self.module_path,
                        third_party_dir: &self.third_party_dir,
                        config: &chain,
                        pkg_dir,
                        trie: &mut self.trie,
                        proxy: &mut self.proxy,
                        known_modules: &mut self.known_modules,
                        new_modules: &mut self.new_modules,
                    };
                    resolve_import(&mut ctx, import)?
                };
                let Some(target) = resolved else { continue };
                let target = self.shorten_local(&target, pkg_dir);
                // A rule never depends on itself.
                if target == own_target {
                    continue;
                }
                if rule.kind.provided_deps.contains(&target) {
                    continue;
                }
                let target = self.redirect_non_go(&target)?;
                self.graph.ensure_visibility(&rule.from_label, &target);
                deps.insert(target);
            }

            let file = self.graph.load_file(pkg_dir)?;
            let call = file.call_mut(rule.idx);
            if deps.is_empty() {
                call.remove_attr("deps");
            } else {
                call.set_attr("deps", Expr::str_list(deps));
            }
        }

        if has_rules && chain.ensure_subincludes() {
            self.graph.load_file(pkg_dir)?.ensure_subinclude(GO_SUBINCLUDE);
        }
        Ok(())
    }

    /// Shorten an in-repo label to its local form when it lands in the
    /// importing package.
    fn shorten_local(&self, target: &str, pkg_dir: &str) -> String {
        match label::split_label(target) {
            Some((pkg, name)) if target.starts_with("//") && pkg == pkg_dir => format!(":{name}"),
            _ => target.to_string(),
        }
    }

    /// If a local dependency's rule kind cannot be scanned for Go sources
    /// (generated-source rules), ask the build tool what it provides for
    /// the `go` requirement and substitute that target.
    fn redirect_non_go(&mut self, target: &str) -> Result<String, UpdateError> {
        if !target.starts_with("//") || target.starts_with("///") {
            return Ok(target.to_string());
        }
        let Some((pkg, name)) = label::split_label(target) else {
            return Ok(target.to_string());
        };
        let chain = self.configs.chain(&self.repo_root, &self.repo_root.join(&pkg))?;
        let file = self.graph.load_file(&pkg)?;
        let Some(idx) = file.find_rule(&name) else {
            return Ok(target.to_string());
        };
        let Some(kind) = kinds::lookup(&chain, &file.call(idx).name) else {
            return Ok(target.to_string());
        };
        if !kind.non_go_sources {
            return Ok(target.to_string());
        }
        let redirected = self.please.resolve_provides(&[target.to_string()])?;
        Ok(redirected
            .into_iter()
            .next()
            .unwrap_or_else(|| target.to_string()))
    }

    /// Read the third-party build file, seeding known modules, pinned
    /// requirements and declared install paths.
    fn seed_third_party(&mut self) -> Result<(), UpdateError> {
        let third_party_dir = self.third_party_dir.clone();
        let file = self.graph.load_file(&third_party_dir)?;
        let calls: Vec<CallExpr> = file
            .stmts
            .iter()
            .filter_map(|s| match s {
                Stmt::Call(call) => Some(call.clone()),
                _ => None,
            })
            .collect();

        for call in calls {
            let Some(module) = call.str_attr("module").map(str::to_string) else {
                continue;
            };
            match call.name.as_str() {
                "go_repo" => {
                    self.known_modules.push(module.clone());
                    self.push_existing(&call, module);
                }
                "go_module" => {
                    let target =
                        label::build_target(call.rule_name(), &self.third_party_dir, "");
                    match call.str_list_attr("install") {
                        Some(install) if !install.is_empty() => {
                            for sub in install {
                                let path = if sub == "." {
                                    module.clone()
                                } else {
                                    format!("{module}/{sub}")
                                };
                                self.trie.add(&path, &target);
                            }
                        }
                        _ => self.trie.add(&module, &target),
                    }
                    self.push_existing(&call, module);
                }
                "go_mod_download" => {
                    self.push_existing(&call, module);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn push_existing(&mut self, call: &CallExpr, module: String) {
        let entry = match (call.str_attr("version"), call.str_attr("download")) {
            (_, Some(download)) => Module::with_download(module.clone(), download),
            (Some(version), None) => Module::with_version(module.clone(), version),
            (None, None) => return,
        };
        // Download pins win over plain version requirements.
        match self.existing_modules.iter_mut().find(|m| m.module == module) {
            Some(existing) => {
                if existing.download.is_none() && entry.download.is_some() {
                    *existing = entry;
                }
            }
            None => self.existing_modules.push(entry),
        }
    }

    /// Materialize newly discovered modules: run version selection over the
    /// merged requirement set and rewrite the third-party build file.
    fn flush_modules(&mut self) -> Result<(), UpdateError> {
        if self.new_modules.is_empty() {
            return Ok(());
        }
        info!(
            "resolving versions for {} new module(s)",
            self.new_modules.len()
        );
        let resolved = resolve_deps(&mut self.proxy, &self.existing_modules, &self.new_modules)?;

        let third_party_dir = self.third_party_dir.clone();
        let file = self.graph.load_file(&third_party_dir)?;
        for module in &resolved {
            let declared = file.stmts.iter_mut().find_map(|s| match s {
                Stmt::Call(call)
                    if matches!(
                        call.name.as_str(),
                        "go_repo" | "go_module" | "go_mod_download"
                    ) && call.str_attr("module") == Some(&module.module) =>
                {
                    Some(call)
                }
                _ => None,
            });
            match declared {
                Some(call) => {
                    // Selection never lowers a version already declared.
                    if let (Some(selected), Some(current)) =
                        (&module.version, call.str_attr("version"))
                    {
                        if version::compare(selected, current) == std::cmp::Ordering::Greater {
                            debug!("raising {} to {selected}", module.module);
                            call.set_attr("version", Expr::Str(selected.clone()));
                        }
                    }
                }
                None => {
                    debug!("adding module {}", module.module);
                    let mut call = CallExpr::new("go_repo")
                        .with_attr("module", Expr::Str(module.module.clone()));
                    match (&module.version, &module.download) {
                        (_, Some(download)) => {
                            call = call.with_attr("download", Expr::Str(download.clone()));
                        }
                        (Some(ver), None) => {
                            call = call.with_attr("version", Expr::Str(ver.clone()));
                        }
                        (None, None) => continue,
                    }
                    file.push_call(call);
                }
            }
        }

        self.new_modules.clear();
        self.existing_modules = resolved;
        Ok(())
    }

    /// The updater's graph, for inspection after a run.
    pub fn graph(&self) -> &BuildGraph {
        &self.graph
    }
}

fn push_unique(dirs: &mut Vec<String>, dir: String) {
    if !dirs.contains(&dir) {
        dirs.push(dir);
    }
}

fn rule_name_of(label: &str) -> String {
    label::split_label(label)
        .map(|(_, name)| name)
        .unwrap_or_default()
}

//! Import resolution.
//!
//! Maps one Go import path to the build label supplying it, trying in
//! fixed order: standard library (no dependency), explicit configuration
//! override, local in-module label, declared third-party install paths,
//! and finally the module proxy. A proxy hit registers the module as a
//! pending requirement to be materialized into the third-party build file
//! at the end of the run.

use tracing::warn;

use crate::label;
use crate::trie::Trie;
use depsync_config::ConfigLayers;
use depsync_proxy::{Module, ProxyClient, ProxyError};

/// Everything import resolution reads or updates. All mutable state is
/// owned by the enclosing session and passed by reference.
pub struct ResolveContext<'a> {
    /// The repository's own module path; empty when unconfigured
    pub module_path: &'a str,

    /// Directory holding third-party rules, e.g. `third_party/go`
    pub third_party_dir: &'a str,

    /// Configuration chain of the importing directory
    pub config: &'a ConfigLayers,

    /// Package directory of the importing rule
    pub pkg_dir: &'a str,

    /// Declared install paths from the third-party build file
    pub trie: &'a mut Trie,

    pub proxy: &'a mut ProxyClient,

    /// Module paths already materialized or discovered this run
    pub known_modules: &'a mut Vec<String>,

    /// Requirements discovered this run, flushed after all directories
    pub new_modules: &'a mut Vec<Module>,
}

/// Resolve one import for a rule in `ctx.pkg_dir`.
///
/// `Ok(None)` means no dependency is needed — either the import is
/// compiler-provided, or it could not be resolved at all; the latter is
/// logged and leaves a gap for the build tool to report, never a broken
/// edit.
pub fn resolve_import(ctx: &mut ResolveContext, import: &str) -> Result<Option<String>, ProxyError> {
    // 1. Standard library and compiler-provided pseudo-packages.
    if is_in_goroot(import) {
        return Ok(None);
    }

    // 2. Explicit per-import override from the directory config chain.
    if let Some(target) = ctx.config.known_target(import) {
        return Ok(Some(target.to_string()));
    }

    // 3. A subpath of our own module is an in-repo label.
    if let Some(target) = local_target(ctx, import) {
        return Ok(Some(target));
    }

    // 4. Declared third-party install paths.
    let hit = ctx.trie.get(import);
    if !hit.is_empty() {
        return Ok(Some(hit.to_string()));
    }

    // 5. A module we already know about, else ask the proxy.
    if let Some(module) = owning_module(ctx.known_modules, import) {
        let module = module.to_string();
        return Ok(Some(dep_target(ctx.third_party_dir, &module, import)));
    }
    match ctx.proxy.resolve_module_for_package(import) {
        Ok((module, version)) => {
            ctx.known_modules.push(module.clone());
            ctx.new_modules.push(Module::with_version(&module, version));
            let target = dep_target(ctx.third_party_dir, &module, import);
            ctx.trie.add(import, &target);
            Ok(Some(target))
        }
        // 6. Unresolved: the importing rule will surface a clear build-time
        // error; nothing is added or removed here.
        Err(e) if e.is_not_found() => {
            warn!("unable to resolve import {import} in //{}", ctx.pkg_dir);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Standard-library and always-present imports need no dependency. The
/// first path segment of every addressable module contains a dot; anything
/// else ships with the toolchain.
fn is_in_goroot(import: &str) -> bool {
    if import == "C" || import == "unsafe" {
        return true;
    }
    let first = import.split('/').next().unwrap_or(import);
    !first.contains('.')
}

/// The in-repo label for an import under our own module path, shortened to
/// its local `:name` form when it lands in the importing package.
fn local_target(ctx: &ResolveContext, import: &str) -> Option<String> {
    if ctx.module_path.is_empty() {
        return None;
    }
    let rel = if import == ctx.module_path {
        ""
    } else {
        import.strip_prefix(&format!("{}/", ctx.module_path))?
    };

    if rel.is_empty() {
        let name = label::last_segment(ctx.module_path);
        return Some(label::build_target(name, ".", ""));
    }
    let name = label::last_segment(rel);
    if rel == ctx.pkg_dir {
        return Some(label::build_target(name, "", ""));
    }
    Some(label::build_target(name, rel, ""))
}

/// The longest known module path owning `import`, if any.
fn owning_module<'m>(known: &'m [String], import: &str) -> Option<&'m str> {
    known
        .iter()
        .filter(|m| import == m.as_str() || import.starts_with(&format!("{m}/")))
        .max_by_key(|m| m.len())
        .map(String::as_str)
}

/// The external label for `import` inside `module`'s subrepo.
fn dep_target(third_party_dir: &str, module: &str, import: &str) -> String {
    let subrepo = format!("{third_party_dir}/{}", module.replace('/', "_"));
    let suffix = import
        .strip_prefix(module)
        .unwrap_or("")
        .trim_start_matches('/');
    let name = if suffix.is_empty() {
        label::last_segment(module)
    } else {
        label::last_segment(suffix)
    };
    label::build_target(name, suffix, &subrepo)
}

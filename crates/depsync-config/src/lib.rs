//! depsync Configuration Management
//!
//! Provides per-directory configuration via `depsync.json` files. A file may
//! appear in any directory between the repository root and the directory
//! being synced; lookups consult the chain as an explicit ordered list of
//! layers, deepest directory first. The first layer that defines a key wins.
//!
//! ```json
//! {
//!     "modulePath": "github.com/acme/repo",
//!     "thirdPartyDir": "third_party/go",
//!     "knownTargets": {"github.com/acme/legacy": "//legacy:go"},
//!     "libKinds": {"my_go_library": {"providedDeps": ["//common:lib"]}}
//! }
//! ```

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::{ConfigLoader, CONFIG_FILE_NAME};

use std::collections::HashMap;
use std::rc::Rc;

use serde::Deserialize;

/// Default directory for third-party build rules.
pub const DEFAULT_THIRD_PARTY_DIR: &str = "third_party/go";

/// Default module proxy endpoint.
pub const DEFAULT_MODULE_PROXY: &str = "https://proxy.golang.org";

/// Default accepted build file names, in preference order.
pub const DEFAULT_BUILD_FILE_NAMES: &[&str] = &["BUILD", "BUILD.plz"];

/// Category of a user-defined rule kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindCategory {
    /// Library rules (compile to an importable package)
    Lib,
    /// Test rules
    Test,
    /// Binary rules
    Bin,
}

/// A user-defined rule kind, as declared in `libKinds`/`testKinds`/`binKinds`.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct KindSpec {
    /// Dependencies the kind provides implicitly; never auto-inserted
    pub provided_deps: Vec<String>,

    /// Default visibility applied when a rule has no explicit attribute
    pub default_visibility: Vec<String>,

    /// Sources are not Go and must not be scanned for imports
    pub non_go_sources: bool,

    /// Attribute holding the rule's sources, when not `srcs`
    pub srcs_attr: Option<String>,
}

/// One parsed `depsync.json` file.
///
/// Every field is optional; absent fields defer to shallower layers and
/// finally to the built-in defaults.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DirConfig {
    /// The repository's Go module path (usually set at the root)
    pub module_path: Option<String>,

    /// Directory containing third-party build rules
    pub third_party_dir: Option<String>,

    /// Module proxy base URL
    pub module_proxy: Option<String>,

    /// Explicit import-path → build-label overrides
    pub known_targets: HashMap<String, String>,

    /// User-defined library kinds
    pub lib_kinds: HashMap<String, KindSpec>,

    /// User-defined test kinds
    pub test_kinds: HashMap<String, KindSpec>,

    /// User-defined binary kinds
    pub bin_kinds: HashMap<String, KindSpec>,

    /// Built-in kinds to ignore in this subtree
    pub exclude_builtin_kinds: Vec<String>,

    /// Directory prefixes exempt from visibility bookkeeping
    pub experimental_dirs: Vec<String>,

    /// Accepted build file names, in preference order
    pub build_file_names: Option<Vec<String>>,

    /// Keep `subinclude(...)` statements up to date in rewritten files
    pub ensure_subincludes: Option<bool>,

    /// Skip this directory and everything beneath it
    pub stop: Option<bool>,
}

/// The configuration chain for one directory: an ordered list of layers,
/// deepest directory first. The first layer defining a key wins.
#[derive(Debug, Clone, Default)]
pub struct ConfigLayers {
    layers: Vec<Rc<DirConfig>>,
}

impl ConfigLayers {
    /// Build a chain from pre-parsed layers, deepest first.
    pub fn new(layers: Vec<Rc<DirConfig>>) -> Self {
        Self { layers }
    }

    /// The repository's Go module path, if configured anywhere in the chain.
    pub fn module_path(&self) -> Option<&str> {
        self.first(|c| c.module_path.as_deref())
    }

    /// Directory containing third-party build rules.
    pub fn third_party_dir(&self) -> &str {
        self.first(|c| c.third_party_dir.as_deref())
            .unwrap_or(DEFAULT_THIRD_PARTY_DIR)
    }

    /// Module proxy base URL.
    pub fn module_proxy(&self) -> &str {
        self.first(|c| c.module_proxy.as_deref())
            .unwrap_or(DEFAULT_MODULE_PROXY)
    }

    /// Explicit label override for an import path, if any layer declares one.
    pub fn known_target(&self, import_path: &str) -> Option<&str> {
        self.first(|c| c.known_targets.get(import_path).map(String::as_str))
    }

    /// Look up a user-defined kind by rule name.
    pub fn custom_kind(&self, name: &str) -> Option<(KindCategory, &KindSpec)> {
        self.first(|c| {
            if let Some(spec) = c.lib_kinds.get(name) {
                return Some((KindCategory::Lib, spec));
            }
            if let Some(spec) = c.test_kinds.get(name) {
                return Some((KindCategory::Test, spec));
            }
            c.bin_kinds.get(name).map(|spec| (KindCategory::Bin, spec))
        })
    }

    /// Whether a built-in kind is excluded for this directory.
    pub fn excludes_builtin_kind(&self, name: &str) -> bool {
        self.layers
            .iter()
            .any(|c| c.exclude_builtin_kinds.iter().any(|k| k == name))
    }

    /// Directory prefixes exempt from visibility bookkeeping.
    pub fn experimental_dirs(&self) -> Vec<&str> {
        let mut dirs = Vec::new();
        for layer in &self.layers {
            for dir in &layer.experimental_dirs {
                if !dirs.contains(&dir.as_str()) {
                    dirs.push(dir.as_str());
                }
            }
        }
        dirs
    }

    /// Accepted build file names, in preference order.
    pub fn build_file_names(&self) -> Vec<String> {
        self.first(|c| c.build_file_names.clone())
            .unwrap_or_else(|| {
                DEFAULT_BUILD_FILE_NAMES
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            })
    }

    /// Whether rewritten files should have their `subinclude` kept current.
    pub fn ensure_subincludes(&self) -> bool {
        self.first(|c| c.ensure_subincludes).unwrap_or(true)
    }

    /// Whether this directory is excluded from syncing entirely.
    pub fn stop(&self) -> bool {
        self.first(|c| c.stop).unwrap_or(false)
    }

    fn first<'a, T>(&'a self, f: impl Fn(&'a DirConfig) -> Option<T>) -> Option<T> {
        self.layers.iter().find_map(|c| f(c))
    }
}

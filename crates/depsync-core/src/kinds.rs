//! Rule-kind classification.
//!
//! A kind describes how a rule's attributes are interpreted: whether it
//! builds a library, test or binary, which dependencies it provides
//! implicitly, its default visibility, and whether its sources can be
//! scanned for imports at all.
//!
//! Lookup is a single ordered chain: user-defined kinds from the directory
//! configuration, then an explicit exclusion set, then the built-in table.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use depsync_config::{ConfigLayers, KindCategory, KindSpec};

/// What a rule kind produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindType {
    /// An importable library package
    Lib,
    /// A test
    Test,
    /// A command binary
    Bin,
}

impl KindType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KindType::Lib => "lib",
            KindType::Test => "test",
            KindType::Bin => "bin",
        }
    }
}

/// Classification metadata for one rule kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kind {
    /// Rule function name, e.g. `go_library`
    pub name: String,

    pub kind_type: KindType,

    /// Labels the kind supplies implicitly; never auto-inserted as deps
    pub provided_deps: Vec<String>,

    /// Visibility applied when a rule carries no explicit attribute
    pub default_visibility: Vec<String>,

    /// Sources are not Go source files; dependency inference is skipped
    pub non_go_sources: bool,

    /// Attribute holding the rule's sources
    pub srcs_attr: String,
}

impl Kind {
    fn builtin(name: &str, kind_type: KindType) -> Self {
        Self {
            name: name.to_string(),
            kind_type,
            provided_deps: Vec::new(),
            default_visibility: Vec::new(),
            non_go_sources: false,
            srcs_attr: "srcs".to_string(),
        }
    }

    fn generated(name: &str, default_visibility: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind_type: KindType::Lib,
            provided_deps: Vec::new(),
            default_visibility: default_visibility.iter().map(|s| s.to_string()).collect(),
            non_go_sources: true,
            srcs_attr: "srcs".to_string(),
        }
    }

    fn from_spec(name: &str, category: KindCategory, spec: &KindSpec) -> Self {
        Self {
            name: name.to_string(),
            kind_type: match category {
                KindCategory::Lib => KindType::Lib,
                KindCategory::Test => KindType::Test,
                KindCategory::Bin => KindType::Bin,
            },
            provided_deps: spec.provided_deps.clone(),
            default_visibility: spec.default_visibility.clone(),
            non_go_sources: spec.non_go_sources,
            srcs_attr: spec
                .srcs_attr
                .clone()
                .unwrap_or_else(|| "srcs".to_string()),
        }
    }

    /// The default kind a newly synthesized rule of `kind_type` gets.
    pub fn default_for(kind_type: KindType) -> &'static Kind {
        match kind_type {
            KindType::Lib => &BUILTIN_KINDS["go_library"],
            KindType::Test => &BUILTIN_KINDS["go_test"],
            KindType::Bin => &BUILTIN_KINDS["go_binary"],
        }
    }
}

/// Built-in kinds understood without configuration.
static BUILTIN_KINDS: Lazy<HashMap<&'static str, Kind>> = Lazy::new(|| {
    let mut kinds = HashMap::new();
    kinds.insert("go_library", Kind::builtin("go_library", KindType::Lib));
    kinds.insert("cgo_library", Kind::builtin("cgo_library", KindType::Lib));
    kinds.insert("go_binary", Kind::builtin("go_binary", KindType::Bin));
    kinds.insert("go_test", Kind::builtin("go_test", KindType::Test));
    kinds.insert("go_benchmark", Kind::builtin("go_benchmark", KindType::Test));
    // Generated-source kinds: their srcs are not Go and are never scanned.
    kinds.insert("proto_library", Kind::generated("proto_library", &["PUBLIC"]));
    kinds.insert("grpc_library", Kind::generated("grpc_library", &["PUBLIC"]));
    kinds
});

/// Resolve the kind for a rule function name under the given configuration
/// chain: user-defined kinds win, excluded built-ins resolve to nothing,
/// everything else falls through to the built-in table.
pub fn lookup(config: &ConfigLayers, name: &str) -> Option<Kind> {
    if let Some((category, spec)) = config.custom_kind(name) {
        return Some(Kind::from_spec(name, category, spec));
    }
    if config.excludes_builtin_kind(name) {
        return None;
    }
    BUILTIN_KINDS.get(name).cloned()
}

//! Minimum version selection over the transitive module requirement graph.
//!
//! Despite the traditional name, the policy is maximum-required-wins: for a
//! module required at several versions, the highest semantic version is
//! selected, and a selected version is never lowered once raised.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::client::{ProxyClient, ProxyError};
use crate::version;

/// A third-party module requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Module path, e.g. `github.com/stretchr/testify`
    pub module: String,

    /// Selected version; absent when the module is pinned via `download`
    pub version: Option<String>,

    /// Label of a download rule supplying the sources (pinned/patched/
    /// replaced modules). A pinned module is never re-versioned.
    pub download: Option<String>,
}

impl Module {
    /// A plain versioned requirement.
    pub fn with_version(module: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            version: Some(version.into()),
            download: None,
        }
    }

    /// A requirement satisfied by a download rule instead of a version.
    pub fn with_download(module: impl Into<String>, download: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            version: None,
            download: Some(download.into()),
        }
    }
}

/// Merge `existing` and `newly_added` requirements and every transitive
/// requirement reachable from the newly added ones, keeping the highest
/// version seen for each module.
///
/// Returns the full module set in first-seen order.
pub fn resolve_deps(
    client: &mut ProxyClient,
    existing: &[Module],
    newly_added: &[Module],
) -> Result<Vec<Module>, ProxyError> {
    let mut order: Vec<String> = Vec::new();
    let mut selected: HashMap<String, Module> = HashMap::new();
    let mut queue: Vec<(String, String)> = Vec::new();
    let mut visited: HashSet<(String, String)> = HashSet::new();

    let mut merge = |m: &Module,
                     order: &mut Vec<String>,
                     selected: &mut HashMap<String, Module>,
                     queue: &mut Vec<(String, String)>| {
        match selected.get_mut(&m.module) {
            None => {
                order.push(m.module.clone());
                selected.insert(m.module.clone(), m.clone());
                if let Some(v) = &m.version {
                    queue.push((m.module.clone(), v.clone()));
                }
            }
            Some(current) => {
                // Download pins are authoritative; a version requirement
                // never displaces one.
                if current.download.is_some() {
                    return;
                }
                let (Some(new), Some(old)) = (&m.version, &current.version) else {
                    return;
                };
                if version::compare(new, old) == std::cmp::Ordering::Greater {
                    debug!("raising {} {} -> {}", m.module, old, new);
                    current.version = Some(new.clone());
                    queue.push((m.module.clone(), new.clone()));
                }
            }
        }
    };

    for m in existing {
        merge(m, &mut order, &mut selected, &mut queue);
    }
    // Existing requirements are already materialized in the build file;
    // only the newly added ones (and anything they raise) are walked.
    queue.clear();
    for m in newly_added {
        merge(m, &mut order, &mut selected, &mut queue);
        if let (Some(v), None) = (&m.version, &m.download) {
            queue.push((m.module.clone(), v.clone()));
        }
    }

    while let Some((module, ver)) = queue.pop() {
        if !visited.insert((module.clone(), ver.clone())) {
            continue;
        }
        let manifest = client.mod_file(&module, &ver)?;
        for req in &manifest.requires {
            let m = Module::with_version(&req.module, &req.version);
            merge(&m, &mut order, &mut selected, &mut queue);
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|name| selected.remove(&name))
        .collect())
}

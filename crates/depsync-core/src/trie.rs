//! Prefix trie mapping declared install paths to build labels.
//!
//! Third-party rules declare the sub-packages they install, possibly with a
//! trailing `...` wildcard covering everything beneath a prefix. Lookups
//! are longest-prefix: a wildcard node answers for any deeper path, and a
//! literal entry only answers for an exact match.

use std::collections::HashMap;

/// Wildcard path segment covering a prefix and everything beneath it.
const WILDCARD: &str = "...";

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    value: Option<String>,
    wildcard: bool,
}

/// Maps slash-delimited install paths to build-target labels.
#[derive(Debug, Default)]
pub struct Trie {
    root: TrieNode,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `path`. A `...` segment converts the node at
    /// that point into a wildcard terminal, discarding anything previously
    /// added beneath it.
    pub fn add(&mut self, path: &str, value: &str) {
        let mut node = &mut self.root;
        for segment in path.split('/') {
            if segment == WILDCARD {
                node.wildcard = true;
                node.children.clear();
                node.value = Some(value.to_string());
                return;
            }
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.value = Some(value.to_string());
    }

    /// Look up the label registered for `path`, or `""` when nothing
    /// matches. A wildcard node short-circuits any deeper lookup beneath
    /// it.
    pub fn get(&self, path: &str) -> &str {
        let mut node = &self.root;
        for segment in path.split('/') {
            if node.wildcard {
                return node.value.as_deref().unwrap_or("");
            }
            match node.children.get(segment) {
                Some(child) => node = child,
                None => return "",
            }
        }
        if node.wildcard || node.value.is_some() {
            node.value.as_deref().unwrap_or("")
        } else {
            ""
        }
    }
}

//! Configuration loader with per-directory caching.
//!
//! `depsync.json` files are parsed at most once per loader instance. The
//! loader walks from a target directory up to the repository root collecting
//! the layer chain, deepest directory first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::{ConfigLayers, DirConfig};

/// Configuration file name looked for in every directory.
pub const CONFIG_FILE_NAME: &str = "depsync.json";

/// Loads and caches `depsync.json` files for the lifetime of a sync run.
///
/// The cache is owned by the loader instance; two loaders never share state,
/// so sequential runs (watch mode, tests) always observe the filesystem
/// fresh.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Parsed config per directory; `None` records an absent file.
    cache: HashMap<PathBuf, Option<Rc<DirConfig>>>,
}

impl ConfigLoader {
    /// Create a new loader with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the configuration chain for `dir`, which must be at or beneath
    /// `root`. Layers are ordered deepest directory first; directories
    /// without a config file contribute nothing.
    pub fn chain(&mut self, root: &Path, dir: &Path) -> Result<ConfigLayers, ConfigError> {
        let mut layers = Vec::new();
        let mut current = dir;
        loop {
            if let Some(config) = self.load_dir(current)? {
                layers.push(config);
            }
            if current == root {
                break;
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(ConfigLayers::new(layers))
    }

    /// Load the config file of a single directory, consulting the cache.
    fn load_dir(&mut self, dir: &Path) -> Result<Option<Rc<DirConfig>>, ConfigError> {
        if let Some(cached) = self.cache.get(dir) {
            trace!("Config cache hit for {}", dir.display());
            return Ok(cached.clone());
        }

        let path = dir.join(CONFIG_FILE_NAME);
        let parsed = if path.is_file() {
            debug!("Loading config from {}", path.display());
            let content =
                std::fs::read_to_string(&path).map_err(|e| ConfigError::read_file(&path, e))?;
            let config: DirConfig =
                serde_json::from_str(&content).map_err(|e| ConfigError::parse_json(&path, e))?;
            Some(Rc::new(config))
        } else {
            None
        };

        self.cache.insert(dir.to_path_buf(), parsed.clone());
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(CONFIG_FILE_NAME), content).unwrap();
    }

    #[test]
    fn test_chain_orders_deepest_first() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_config(root, r#"{"thirdPartyDir": "root_tp"}"#);
        write_config(&root.join("a/b"), r#"{"thirdPartyDir": "deep_tp"}"#);

        let mut loader = ConfigLoader::new();
        let chain = loader.chain(root, &root.join("a/b")).unwrap();
        assert_eq!(chain.third_party_dir(), "deep_tp");

        // A directory without its own file inherits from shallower layers.
        let chain = loader.chain(root, &root.join("a")).unwrap();
        assert_eq!(chain.third_party_dir(), "root_tp");
    }

    #[test]
    fn test_missing_files_contribute_nothing() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("x/y")).unwrap();

        let mut loader = ConfigLoader::new();
        let chain = loader.chain(root, &root.join("x/y")).unwrap();
        assert_eq!(chain.third_party_dir(), crate::DEFAULT_THIRD_PARTY_DIR);
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_config(root, "{not valid json");

        let mut loader = ConfigLoader::new();
        let err = loader.chain(root, root).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_cache_survives_file_deletion() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_config(root, r#"{"thirdPartyDir": "cached_tp"}"#);

        let mut loader = ConfigLoader::new();
        let chain = loader.chain(root, root).unwrap();
        assert_eq!(chain.third_party_dir(), "cached_tp");

        // The parse is cached for the loader's lifetime.
        std::fs::remove_file(root.join(CONFIG_FILE_NAME)).unwrap();
        let chain = loader.chain(root, root).unwrap();
        assert_eq!(chain.third_party_dir(), "cached_tp");
    }
}

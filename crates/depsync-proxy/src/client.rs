//! HTTP client for the Go module proxy protocol.
//!
//! Three endpoints are consumed:
//! - `GET {proxy}/{module}/@latest` → JSON `{"Version": "..."}`
//! - `GET {proxy}/{module}/@v/{version}.mod` → go.mod manifest text
//! - `GET {proxy}/{module}/@v/{version}.zip` → module archive
//!
//! Every result is cached on the client instance for the lifetime of a run,
//! including negative "not found" results, so repeated misses never repeat
//! network calls. The engine is strictly sequential, so the blocking
//! reqwest API is used throughout.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::modfile::{self, ModFile};

/// Errors from module proxy interactions.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No module owns the queried path. Callers may test for this variant
    /// and choose to skip rather than abort.
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    /// The proxy answered with an unexpected status.
    #[error("module proxy request {url} failed with status {status}: {body}")]
    Http {
        url: String,
        status: StatusCode,
        body: String,
    },

    /// Transport-level failure.
    #[error("module proxy request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The manifest could not be fetched under either path casing.
    #[error("failed to fetch manifest for {module}@{version}: {detail}")]
    ManifestFetch {
        module: String,
        version: String,
        detail: String,
    },

    /// The manifest payload did not parse.
    #[error("invalid manifest for {module}@{version}: {source}")]
    ModFile {
        module: String,
        version: String,
        #[source]
        source: modfile::ModFileError,
    },

    /// The module archive was not a readable zip.
    #[error("invalid module archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Filesystem failure while extracting an archive.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Whether this error is the distinguishable "module not found" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProxyError::ModuleNotFound(_))
    }
}

#[derive(Debug, Deserialize)]
struct LatestInfo {
    #[serde(rename = "Version")]
    version: String,
}

/// Client for one module proxy endpoint.
///
/// All caches live on the instance; two clients never share state.
pub struct ProxyClient {
    base_url: String,
    http: reqwest::blocking::Client,
    /// Directory module archives are extracted beneath.
    cache_dir: PathBuf,
    /// module → latest version, or None for a cached miss.
    latest: HashMap<String, Option<String>>,
    /// package-path prefix → owning (module, version), or None for a miss.
    prefixes: HashMap<String, Option<(String, String)>>,
    /// "{module}@{version}" → parsed manifest.
    manifests: HashMap<String, Rc<ModFile>>,
}

impl ProxyClient {
    /// Create a client for `base_url`, extracting archives under `cache_dir`.
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::blocking::Client::new(),
            cache_dir: cache_dir.into(),
            latest: HashMap::new(),
            prefixes: HashMap::new(),
            manifests: HashMap::new(),
        }
    }

    /// The latest published version of `module`.
    ///
    /// 404/410 mean the proxy knows no such module and map to
    /// [`ProxyError::ModuleNotFound`]; that outcome is cached like a hit.
    pub fn latest_version(&mut self, module: &str) -> Result<String, ProxyError> {
        if let Some(cached) = self.latest.get(module) {
            debug!("@latest cache hit for {module}");
            return cached
                .clone()
                .ok_or_else(|| ProxyError::ModuleNotFound(module.to_string()));
        }

        let url = format!("{}/{}/@latest", self.base_url, module.to_lowercase());
        let resp = self.http.get(&url).send()?;
        let status = resp.status();

        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            self.latest.insert(module.to_string(), None);
            return Err(ProxyError::ModuleNotFound(module.to_string()));
        }
        if !status.is_success() {
            return Err(ProxyError::Http {
                url,
                status,
                body: resp.text().unwrap_or_default(),
            });
        }

        let info: LatestInfo = resp.json()?;
        self.latest
            .insert(module.to_string(), Some(info.version.clone()));
        Ok(info.version)
    }

    /// Find the module owning `import_path` by stripping path segments until
    /// a prefix answers `@latest` successfully. Every prefix tried along the
    /// way is memoized to the discovered module and version, so repeated
    /// lookups under the same module are O(1).
    pub fn resolve_module_for_package(
        &mut self,
        import_path: &str,
    ) -> Result<(String, String), ProxyError> {
        let mut tried = Vec::new();
        let mut prefix = import_path;

        loop {
            if let Some(cached) = self.prefixes.get(prefix) {
                match cached {
                    Some((module, version)) => {
                        let found = (module.clone(), version.clone());
                        self.memoize_prefixes(&tried, Some(&found));
                        return Ok(found);
                    }
                    None => {}
                }
            } else {
                match self.latest_version(prefix) {
                    Ok(version) => {
                        let found = (prefix.to_string(), version);
                        tried.push(prefix.to_string());
                        self.memoize_prefixes(&tried, Some(&found));
                        return Ok(found);
                    }
                    Err(e) if e.is_not_found() => {
                        tried.push(prefix.to_string());
                    }
                    Err(e) => return Err(e),
                }
            }

            match prefix.rsplit_once('/') {
                Some((shorter, _)) => prefix = shorter,
                None => {
                    // Search exhausted down to the path root.
                    self.memoize_prefixes(&tried, None);
                    return Err(ProxyError::ModuleNotFound(import_path.to_string()));
                }
            }
        }
    }

    fn memoize_prefixes(&mut self, tried: &[String], found: Option<&(String, String)>) {
        for prefix in tried {
            self.prefixes.insert(prefix.clone(), found.cloned());
        }
    }

    /// Fetch and parse the go.mod manifest for `module@version`.
    ///
    /// The exact module path is tried first, then a lower-cased variant for
    /// case-insensitive proxy namespaces; the error reports both failures.
    pub fn mod_file(&mut self, module: &str, version: &str) -> Result<Rc<ModFile>, ProxyError> {
        let key = format!("{module}@{version}");
        if let Some(cached) = self.manifests.get(&key) {
            debug!("manifest cache hit for {key}");
            return Ok(cached.clone());
        }

        let text = match self.fetch_mod_text(module, version) {
            Ok(text) => text,
            Err(first) => {
                let lowered = module.to_lowercase();
                if lowered == module {
                    return Err(ProxyError::ManifestFetch {
                        module: module.to_string(),
                        version: version.to_string(),
                        detail: first.to_string(),
                    });
                }
                warn!("manifest fetch for {key} failed, retrying as {lowered}");
                self.fetch_mod_text(&lowered, version).map_err(|second| {
                    ProxyError::ManifestFetch {
                        module: module.to_string(),
                        version: version.to_string(),
                        detail: format!("{first}; lowercased: {second}"),
                    }
                })?
            }
        };

        let parsed = modfile::parse(&text).map_err(|source| ProxyError::ModFile {
            module: module.to_string(),
            version: version.to_string(),
            source,
        })?;
        let parsed = Rc::new(parsed);
        self.manifests.insert(key, parsed.clone());
        Ok(parsed)
    }

    fn fetch_mod_text(&self, module: &str, version: &str) -> Result<String, ProxyError> {
        let url = format!("{}/{}/@v/{}.mod", self.base_url, module, version);
        let resp = self.http.get(&url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProxyError::Http {
                url,
                status,
                body: resp.text().unwrap_or_default(),
            });
        }
        Ok(resp.text()?)
    }

    /// Download and extract `module@version`, returning the extraction root.
    ///
    /// Idempotent: an existing extraction directory is reused without any
    /// network traffic.
    pub fn ensure_downloaded(&mut self, module: &str, version: &str) -> Result<PathBuf, ProxyError> {
        let dest = self.cache_dir.join(format!("{module}@{version}"));
        if dest.is_dir() {
            debug!("module {module}@{version} already extracted");
            return Ok(dest);
        }

        let url = format!("{}/{}/@v/{}.zip", self.base_url, module, version);
        let resp = self.http.get(&url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProxyError::Http {
                url,
                status,
                body: resp.text().unwrap_or_default(),
            });
        }

        let bytes = resp.bytes()?;
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.as_ref()))?;
        // Archive entries are prefixed "{module}@{version}/", so extracting
        // at the cache root produces the keyed directory.
        archive.extract(&self.cache_dir)?;
        Ok(dest)
    }

    /// The extraction directory a module would occupy, without downloading.
    pub fn download_dir(&self, module: &str, version: &str) -> PathBuf {
        self.cache_dir.join(format!("{module}@{version}"))
    }
}

impl std::fmt::Debug for ProxyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyClient")
            .field("base_url", &self.base_url)
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Start a mock server on a runtime the blocking client can talk to.
    fn start_server() -> (tokio::runtime::Runtime, MockServer) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let server = rt.block_on(MockServer::start());
        (rt, server)
    }

    fn mount(rt: &tokio::runtime::Runtime, server: &MockServer, mock: Mock) {
        rt.block_on(mock.mount(server));
    }

    fn request_count(rt: &tokio::runtime::Runtime, server: &MockServer) -> usize {
        rt.block_on(server.received_requests())
            .map(|r| r.len())
            .unwrap_or(0)
    }

    fn latest_response(version: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "Version": version }))
    }

    #[test]
    fn test_latest_version_and_cache() {
        let (rt, server) = start_server();
        mount(
            &rt,
            &server,
            Mock::given(method("GET"))
                .and(path("/example.com/foo/@latest"))
                .respond_with(latest_response("v1.2.3")),
        );

        let temp = tempfile::TempDir::new().unwrap();
        let mut client = ProxyClient::new(server.uri(), temp.path());

        assert_eq!(client.latest_version("example.com/foo").unwrap(), "v1.2.3");
        assert_eq!(client.latest_version("example.com/foo").unwrap(), "v1.2.3");
        assert_eq!(request_count(&rt, &server), 1);
    }

    #[test]
    fn test_latest_version_lowercases_module() {
        let (rt, server) = start_server();
        mount(
            &rt,
            &server,
            Mock::given(method("GET"))
                .and(path("/github.com/acme/camelcase/@latest"))
                .respond_with(latest_response("v0.1.0")),
        );

        let temp = tempfile::TempDir::new().unwrap();
        let mut client = ProxyClient::new(server.uri(), temp.path());
        assert_eq!(
            client.latest_version("github.com/Acme/CamelCase").unwrap(),
            "v0.1.0"
        );
    }

    #[test]
    fn test_not_found_is_typed_and_cached() {
        let (rt, server) = start_server();
        mount(
            &rt,
            &server,
            Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)),
        );

        let temp = tempfile::TempDir::new().unwrap();
        let mut client = ProxyClient::new(server.uri(), temp.path());

        let err = client.latest_version("example.com/absent").unwrap_err();
        assert!(err.is_not_found());
        let err = client.latest_version("example.com/absent").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(request_count(&rt, &server), 1);
    }

    #[test]
    fn test_server_error_includes_body() {
        let (rt, server) = start_server();
        mount(
            &rt,
            &server,
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(500).set_body_string("proxy on fire")),
        );

        let temp = tempfile::TempDir::new().unwrap();
        let mut client = ProxyClient::new(server.uri(), temp.path());

        let err = client.latest_version("example.com/foo").unwrap_err();
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("proxy on fire"));
    }

    #[test]
    fn test_resolve_module_for_package_strips_segments() {
        let (rt, server) = start_server();
        mount(
            &rt,
            &server,
            Mock::given(method("GET"))
                .and(path("/example.com/foo/bar/pkg/@latest"))
                .respond_with(ResponseTemplate::new(404)),
        );
        mount(
            &rt,
            &server,
            Mock::given(method("GET"))
                .and(path("/example.com/foo/bar/@latest"))
                .respond_with(latest_response("v2.0.0")),
        );

        let temp = tempfile::TempDir::new().unwrap();
        let mut client = ProxyClient::new(server.uri(), temp.path());

        let (module, version) = client
            .resolve_module_for_package("example.com/foo/bar/pkg")
            .unwrap();
        assert_eq!(module, "example.com/foo/bar");
        assert_eq!(version, "v2.0.0");

        // Every prefix tried is memoized; a sibling package under the same
        // module resolves without further traffic.
        let before = request_count(&rt, &server);
        let (module, _) = client
            .resolve_module_for_package("example.com/foo/bar/pkg")
            .unwrap();
        assert_eq!(module, "example.com/foo/bar");
        assert_eq!(request_count(&rt, &server), before);
    }

    #[test]
    fn test_resolve_module_exhausted_search() {
        let (rt, server) = start_server();
        mount(
            &rt,
            &server,
            Mock::given(method("GET")).respond_with(ResponseTemplate::new(410)),
        );

        let temp = tempfile::TempDir::new().unwrap();
        let mut client = ProxyClient::new(server.uri(), temp.path());

        let err = client
            .resolve_module_for_package("example.com/nowhere/pkg")
            .unwrap_err();
        assert!(err.is_not_found());

        // The whole failed chain is cached as misses.
        let before = request_count(&rt, &server);
        let err = client
            .resolve_module_for_package("example.com/nowhere/pkg")
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(request_count(&rt, &server), before);
    }

    #[test]
    fn test_mod_file_falls_back_to_lowercase() {
        let (rt, server) = start_server();
        mount(
            &rt,
            &server,
            Mock::given(method("GET"))
                .and(path("/github.com/Acme/Dep/@v/v1.0.0.mod"))
                .respond_with(ResponseTemplate::new(404)),
        );
        mount(
            &rt,
            &server,
            Mock::given(method("GET"))
                .and(path("/github.com/acme/dep/@v/v1.0.0.mod"))
                .respond_with(ResponseTemplate::new(200).set_body_string("module github.com/Acme/Dep\n")),
        );

        let temp = tempfile::TempDir::new().unwrap();
        let mut client = ProxyClient::new(server.uri(), temp.path());

        let parsed = client.mod_file("github.com/Acme/Dep", "v1.0.0").unwrap();
        assert_eq!(parsed.module, "github.com/Acme/Dep");
    }

    #[test]
    fn test_mod_file_reports_both_failures() {
        let (rt, server) = start_server();
        mount(
            &rt,
            &server,
            Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)),
        );

        let temp = tempfile::TempDir::new().unwrap();
        let mut client = ProxyClient::new(server.uri(), temp.path());

        let err = client.mod_file("github.com/Acme/Dep", "v1.0.0").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("github.com/Acme/Dep@v1.0.0"));
        assert!(msg.contains("lowercased"));
    }

    fn module_zip(prefix: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            writer
                .start_file(format!("{prefix}/go.mod"), options)
                .unwrap();
            writer.write_all(b"module example.com/foo\n").unwrap();
            writer
                .start_file(format!("{prefix}/foo.go"), options)
                .unwrap();
            writer.write_all(b"package foo\n").unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_ensure_downloaded_extracts_archive() {
        let (rt, server) = start_server();
        mount(
            &rt,
            &server,
            Mock::given(method("GET"))
                .and(path("/example.com/foo/@v/v1.0.0.zip"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_bytes(module_zip("example.com/foo@v1.0.0")),
                ),
        );

        let temp = tempfile::TempDir::new().unwrap();
        let mut client = ProxyClient::new(server.uri(), temp.path());

        let root = client.ensure_downloaded("example.com/foo", "v1.0.0").unwrap();
        assert!(root.join("go.mod").is_file());
        assert!(root.join("foo.go").is_file());
    }

    #[test]
    fn test_ensure_downloaded_is_idempotent() {
        let (rt, server) = start_server();
        let temp = tempfile::TempDir::new().unwrap();
        let mut client = ProxyClient::new(server.uri(), temp.path());

        // Pre-existing extraction directory short-circuits the fetch.
        let dest = client.download_dir("example.com/foo", "v1.0.0");
        std::fs::create_dir_all(&dest).unwrap();

        let root = client.ensure_downloaded("example.com/foo", "v1.0.0").unwrap();
        assert_eq!(root, dest);
        assert_eq!(request_count(&rt, &server), 0);
    }
}

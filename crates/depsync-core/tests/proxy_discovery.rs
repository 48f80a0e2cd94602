//! End-to-end tests for third-party module discovery: an unresolved import
//! is attributed to its owning module through the proxy, the module lands
//! in the third-party build file with a version selected over the merged
//! requirement set, and repeated runs are quiet.

use std::path::Path;

use depsync_core::Updater;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Run the mock server on a dedicated runtime; the engine's HTTP client is
/// blocking and must live outside any async context.
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

fn latest(version: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({ "Version": version }))
}

fn repo(proxy_url: &str) -> tempfile::TempDir {
    let temp = tempfile::TempDir::new().unwrap();
    write(temp.path(), ".plzconfig", "");
    write(
        temp.path(),
        "depsync.json",
        &format!(
            r#"{{"modulePath": "github.com/acme/repo", "moduleProxy": "{proxy_url}"}}"#
        ),
    );
    temp
}

#[test]
fn discovers_module_and_materializes_go_repo() {
    let (rt, server) = start_server();
    // The import's full path is not a module; its parent is.
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/github.com/foo/bar/assert/@latest"))
            .respond_with(ResponseTemplate::new(404)),
    );
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/github.com/foo/bar/@latest"))
            .respond_with(latest("v1.4.0")),
    );
    // The new module's manifest pulls a transitive requirement.
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/github.com/foo/bar/@v/v1.4.0.mod"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "module github.com/foo/bar\nrequire github.com/foo/dep v0.2.0\n",
            )),
    );
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/github.com/foo/dep/@v/v0.2.0.mod"))
            .respond_with(ResponseTemplate::new(200).set_body_string("module github.com/foo/dep\n")),
    );

    let temp = repo(&server.uri());
    write(
        temp.path(),
        "app/app.go",
        "package app\n\nimport \"github.com/foo/bar/assert\"\n",
    );

    let mut updater = Updater::new(temp.path(), "plz").unwrap();
    let mut out = Vec::new();
    updater
        .update(&["app".to_string()], true, &mut out)
        .unwrap();

    let app = std::fs::read_to_string(temp.path().join("app/BUILD")).unwrap();
    assert!(
        app.contains("deps = [\"///third_party/go/github.com_foo_bar//assert\"]"),
        "{app}"
    );

    let third_party = std::fs::read_to_string(temp.path().join("third_party/go/BUILD")).unwrap();
    assert!(third_party.contains("module = \"github.com/foo/bar\""), "{third_party}");
    assert!(third_party.contains("version = \"v1.4.0\""), "{third_party}");
    // The transitive requirement was merged in as well.
    assert!(third_party.contains("module = \"github.com/foo/dep\""), "{third_party}");
    assert!(third_party.contains("version = \"v0.2.0\""), "{third_party}");
}

#[test]
fn second_run_resolves_from_declared_state() {
    let (rt, server) = start_server();
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/github.com/foo/bar/@latest"))
            .respond_with(latest("v1.4.0")),
    );
    mount(
        &rt,
        &server,
        Mock::given(method("GET"))
            .and(path("/github.com/foo/bar/@v/v1.4.0.mod"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("module github.com/foo/bar\n"),
            ),
    );

    let temp = repo(&server.uri());
    write(
        temp.path(),
        "app/app.go",
        "package app\n\nimport \"github.com/foo/bar\"\n",
    );

    let mut updater = Updater::new(temp.path(), "plz").unwrap();
    let mut out = Vec::new();
    updater
        .update(&["app".to_string()], true, &mut out)
        .unwrap();

    let requests_after_first = rt
        .block_on(server.received_requests())
        .map(|r| r.len())
        .unwrap_or(0);
    assert!(requests_after_first > 0);

    // A fresh session reads the go_repo declaration and needs no network.
    let mut updater = Updater::new(temp.path(), "plz").unwrap();
    let mut diff = Vec::new();
    updater
        .update(&["app".to_string()], false, &mut diff)
        .unwrap();
    assert!(diff.is_empty(), "{}", String::from_utf8_lossy(&diff));

    let requests_after_second = rt
        .block_on(server.received_requests())
        .map(|r| r.len())
        .unwrap_or(0);
    assert_eq!(requests_after_first, requests_after_second);
}

#[test]
fn unresolvable_import_leaves_a_gap() {
    let (rt, server) = start_server();
    mount(
        &rt,
        &server,
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)),
    );

    let temp = repo(&server.uri());
    write(
        temp.path(),
        "app/app.go",
        "package app\n\nimport (\n\t\"fmt\"\n\t\"example.com/gone/pkg\"\n)\n",
    );

    let mut updater = Updater::new(temp.path(), "plz").unwrap();
    let mut out = Vec::new();
    // The run succeeds; the import simply contributes no dependency.
    updater
        .update(&["app".to_string()], true, &mut out)
        .unwrap();

    let app = std::fs::read_to_string(temp.path().join("app/BUILD")).unwrap();
    assert!(!app.contains("deps"), "{app}");
    assert!(!temp.path().join("third_party/go/BUILD").exists());
}

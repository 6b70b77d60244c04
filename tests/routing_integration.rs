//! End-to-end tests of the routing chain: server selection, location
//! precedence, method/body checks and filesystem resolution against real
//! directories.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use indexmap::IndexMap;
use tempfile::TempDir;

use webforge::config::{HttpConfig, LocationConfig, ServerConfig, Size, UploadConfig};
use webforge::http::status::HttpStatus;
use webforge::http::HttpMethod;
use webforge::routing::{route_request, HandlerType, ResolveError, RouteError};

fn write_file(path: &Path, contents: &[u8]) {
    let mut file = File::create(path).unwrap();
    file.write_all(contents).unwrap();
}

/// A docroot with an index, an images subdirectory and a sibling media tree
/// for alias tests.
fn site() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let www = dir.path().join("www");
    fs::create_dir(&www).unwrap();
    write_file(&www.join("index.html"), b"<h1>home</h1>");
    fs::create_dir(www.join("images")).unwrap();
    write_file(&www.join("images/cat.png"), b"png");
    let media = dir.path().join("media");
    fs::create_dir(&media).unwrap();
    write_file(&media.join("logo.svg"), b"svg");
    dir
}

fn no_params() -> IndexMap<String, String> {
    IndexMap::new()
}

fn basic_server(root: &Path, port: u16) -> ServerConfig {
    let mut server = ServerConfig::new();
    server.add_listen(&format!("0.0.0.0:{}", port)).unwrap();
    server.set_root(root);
    server
}

fn single_server_config(server: ServerConfig) -> HttpConfig {
    let mut config = HttpConfig::new();
    config.add_server(server).unwrap();
    config.validate().unwrap();
    config
}

#[test]
fn resolves_static_file_through_the_full_chain() {
    let dir = site();
    let www = dir.path().join("www");

    let mut server = basic_server(&www, 8080);
    let mut images = LocationConfig::new("/images/").unwrap();
    images.set_root(&www);
    server.add_location(images).unwrap();
    let config = single_server_config(server);

    let routed = route_request(
        &config,
        "localhost",
        8080,
        HttpMethod::Get,
        "/images/cat.png",
        no_params(),
        0,
    )
    .unwrap();

    assert_eq!(routed.location.unwrap().pattern(), "/images/");
    assert_eq!(routed.route.handler(), HandlerType::Static);
    assert_eq!(routed.match_info.resolved_path(), www.join("images/cat.png"));
    assert_eq!(routed.match_info.file_to_serve(), "cat.png");
    assert!(!routed.match_info.is_directory());
}

#[test]
fn alias_strips_the_location_prefix() {
    let dir = site();
    let www = dir.path().join("www");
    let media = dir.path().join("media");

    let mut server = basic_server(&www, 8080);
    let mut assets = LocationConfig::new("/assets/").unwrap();
    assets.set_alias(&media);
    server.add_location(assets).unwrap();
    let config = single_server_config(server);

    let routed = route_request(
        &config,
        "localhost",
        8080,
        HttpMethod::Get,
        "/assets/logo.svg",
        no_params(),
        0,
    )
    .unwrap();

    // /assets/ is gone from the final path; root would have kept it
    assert_eq!(routed.match_info.resolved_path(), media.join("logo.svg"));
}

#[test]
fn virtual_host_selection_scenario() {
    let dir = site();
    let www = dir.path().join("www");

    let mut config = HttpConfig::new();

    let mut server_a = ServerConfig::new();
    server_a.add_listen("0.0.0.0:8080 default_server").unwrap();
    server_a.add_server_name("localhost").unwrap();
    server_a.set_root(&www);
    config.add_server(server_a).unwrap();

    let mut server_b = ServerConfig::new();
    server_b.add_listen("0.0.0.0:8080").unwrap();
    server_b.add_server_name("api.local").unwrap();
    server_b.set_root(&www);
    config.add_server(server_b).unwrap();

    config.validate().unwrap();

    let routed = route_request(
        &config,
        "api.local",
        8080,
        HttpMethod::Get,
        "/",
        no_params(),
        0,
    )
    .unwrap();
    assert_eq!(routed.server.server_names(), ["api.local"]);

    let routed = route_request(
        &config,
        "unknown.local",
        8080,
        HttpMethod::Get,
        "/",
        no_params(),
        0,
    )
    .unwrap();
    assert_eq!(routed.server.server_names(), ["localhost"]);

    let err = route_request(
        &config,
        "api.local",
        9090,
        HttpMethod::Get,
        "/",
        no_params(),
        0,
    )
    .unwrap_err();
    assert!(matches!(err, RouteError::NoServer { .. }));
    assert_eq!(err.status(), HttpStatus::MisdirectedRequest);
}

#[test]
fn method_not_allowed_carries_the_allowed_set() {
    let dir = site();
    let www = dir.path().join("www");

    let mut server = basic_server(&www, 8080);
    let mut api = LocationConfig::new("/images/").unwrap();
    api.allow_method(HttpMethod::Get);
    api.set_root(&www);
    server.add_location(api).unwrap();
    let config = single_server_config(server);

    let err = route_request(
        &config,
        "localhost",
        8080,
        HttpMethod::Delete,
        "/images/cat.png",
        no_params(),
        0,
    )
    .unwrap_err();

    match &err {
        RouteError::MethodNotAllowed { allowed, .. } => {
            assert_eq!(*allowed, vec![HttpMethod::Get])
        }
        other => panic!("expected MethodNotAllowed, got {:?}", other),
    }
    assert_eq!(err.status(), HttpStatus::MethodNotAllowed);
}

#[test]
fn oversized_body_is_rejected_before_resolution() {
    let dir = site();
    let www = dir.path().join("www");

    let mut server = basic_server(&www, 8080);
    let mut upload = LocationConfig::new("/upload").unwrap();
    upload.allow_method(HttpMethod::Post);
    upload.set_root(&www);
    upload
        .set_client_max_body_size(Size::from_kilobytes(1))
        .unwrap();
    server.add_location(upload).unwrap();
    let config = single_server_config(server);

    let err = route_request(
        &config,
        "localhost",
        8080,
        HttpMethod::Post,
        "/upload",
        no_params(),
        4096,
    )
    .unwrap_err();

    assert!(matches!(err, RouteError::BodyTooLarge { .. }));
    assert_eq!(err.status(), HttpStatus::PayloadTooLarge);
}

#[test]
fn redirects_short_circuit_without_touching_disk() {
    let dir = site();
    let www = dir.path().join("www");

    let mut server = basic_server(&www, 8080);
    let mut old = LocationConfig::new("/old").unwrap();
    old.set_return_redirect("/new", 301).unwrap();
    server.add_location(old).unwrap();
    let config = single_server_config(server);

    let routed = route_request(
        &config,
        "localhost",
        8080,
        HttpMethod::Get,
        "/old",
        no_params(),
        0,
    )
    .unwrap();

    assert!(routed.route.is_redirect());
    assert_eq!(routed.route.redirect(), Some(("/new", 301)));
    assert!(routed.match_info.is_empty());
}

#[test]
fn traversal_attempts_map_to_forbidden() {
    let dir = site();
    let www = dir.path().join("www");
    let config = single_server_config(basic_server(&www, 8080));

    let err = route_request(
        &config,
        "localhost",
        8080,
        HttpMethod::Get,
        "/../../etc/passwd",
        no_params(),
        0,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        RouteError::Resolve(ResolveError::Traversal(_))
    ));
    assert_eq!(err.status(), HttpStatus::Forbidden);
}

#[test]
fn directory_requests_fall_back_to_index_files() {
    let dir = site();
    let www = dir.path().join("www");
    let config = single_server_config(basic_server(&www, 8080));

    let routed = route_request(
        &config,
        "localhost",
        8080,
        HttpMethod::Get,
        "/",
        no_params(),
        0,
    )
    .unwrap();
    assert_eq!(routed.match_info.resolved_path(), www.join("index.html"));

    // a directory with no index resolves to the directory itself
    let routed = route_request(
        &config,
        "localhost",
        8080,
        HttpMethod::Get,
        "/images",
        no_params(),
        0,
    )
    .unwrap();
    assert!(routed.match_info.is_directory());
}

#[test]
fn upload_locations_route_to_their_directory() {
    let dir = site();
    let www = dir.path().join("www");
    let uploads = dir.path().join("uploads");
    fs::create_dir(&uploads).unwrap();

    let mut server = basic_server(&www, 8080);
    let mut upload = LocationConfig::new("/upload").unwrap();
    upload.allow_method(HttpMethod::Post);
    upload.enable_upload(UploadConfig::new(&uploads)).unwrap();
    server.add_location(upload).unwrap();
    let config = single_server_config(server);

    let routed = route_request(
        &config,
        "localhost",
        8080,
        HttpMethod::Post,
        "/upload",
        no_params(),
        128,
    )
    .unwrap();

    assert_eq!(routed.route.handler(), HandlerType::Upload);
    assert!(routed.match_info.is_directory());
    assert_eq!(routed.match_info.resolved_path(), uploads);
}

#[test]
fn query_params_travel_with_the_match() {
    let dir = site();
    let www = dir.path().join("www");
    let config = single_server_config(basic_server(&www, 8080));

    let mut params = IndexMap::new();
    params.insert("q".to_string(), "cats".to_string());

    let routed = route_request(
        &config,
        "localhost",
        8080,
        HttpMethod::Get,
        "/index.html",
        params,
        0,
    )
    .unwrap();

    assert_eq!(routed.match_info.query_param("q"), Some("cats"));
}

#[test]
fn missing_files_map_to_not_found() {
    let dir = site();
    let www = dir.path().join("www");
    let config = single_server_config(basic_server(&www, 8080));

    let err = route_request(
        &config,
        "localhost",
        8080,
        HttpMethod::Get,
        "/no-such-page.html",
        no_params(),
        0,
    )
    .unwrap_err();

    assert!(matches!(err, RouteError::Resolve(ResolveError::NotFound(_))));
    assert_eq!(err.status(), HttpStatus::NotFound);
}

//! Loading full configurations from TOML files on disk.

use std::fs;

use webforge::config::{ConfigError, HttpConfig};

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("webforge.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn loads_and_validates_a_complete_file() {
    let dir = tempfile::tempdir().unwrap();
    let www = dir.path().join("www");
    fs::create_dir(&www).unwrap();

    let contents = format!(
        r#"
keepalive_timeout = 30.0

[[server]]
listen = ["0.0.0.0:8080 default_server"]
server_names = ["localhost"]
root = "{root}"
index = ["index.html"]
client_max_body_size = "10m"

[server.error_pages]
404 = "/errors/404.html"

[[server.location]]
path = "/images/"
methods = ["GET", "HEAD"]
root = "{root}"
"#,
        root = www.display()
    );
    let (_dir, path) = write_config(&contents);

    let config = HttpConfig::from_file(&path).unwrap();
    assert_eq!(config.servers().len(), 1);
    let server = config.select_server("localhost", 8080).unwrap();
    assert_eq!(server.locations().len(), 1);
}

#[test]
fn missing_file_is_fatal() {
    assert!(matches!(
        HttpConfig::from_file("/no/such/webforge.toml"),
        Err(ConfigError::ReadFile { .. })
    ));
}

#[test]
fn server_without_listen_fails_validation() {
    let (_dir, path) = write_config(
        r#"
[[server]]
listen = []
root = "/var/www"
"#,
    );
    assert!(matches!(
        HttpConfig::from_file(&path),
        Err(ConfigError::MissingListenDirective)
    ));
}

#[test]
fn conflicting_anonymous_servers_fail_validation() {
    let (_dir, path) = write_config(
        r#"
[[server]]
listen = ["8080"]
root = "/var/www"

[[server]]
listen = ["0.0.0.0:8080"]
root = "/var/www"
"#,
    );
    assert!(matches!(
        HttpConfig::from_file(&path),
        Err(ConfigError::PortConflict(_))
    ));
}

#[test]
fn invalid_regex_location_fails_load() {
    let (_dir, path) = write_config(
        r#"
[[server]]
listen = ["8080"]
root = "/var/www"

[[server.location]]
path = "~ ([broken"
"#,
    );
    assert!(matches!(
        HttpConfig::from_file(&path),
        Err(ConfigError::InvalidRegexPattern { .. })
    ));
}

#[test]
fn duplicate_locations_fail_load() {
    let (_dir, path) = write_config(
        r#"
[[server]]
listen = ["8080"]
root = "/var/www"

[[server.location]]
path = "/api/"

[[server.location]]
path = "/api/"
"#,
    );
    assert!(matches!(
        HttpConfig::from_file(&path),
        Err(ConfigError::DuplicateLocation(_))
    ));
}

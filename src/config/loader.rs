//! TOML configuration loading.
//!
//! Deserializes the file into raw mirror structs, then feeds everything
//! through the entity builders so every value passes the same validation a
//! hand-built configuration would. Shape:
//!
//! ```toml
//! keepalive_timeout = 65.0
//!
//! [[server]]
//! listen = ["0.0.0.0:8080 default_server"]
//! server_names = ["localhost"]
//! root = "/var/www/html"
//! index = ["index.html"]
//! client_max_body_size = "10m"
//!
//! [server.error_pages]
//! 404 = "/errors/404.html"
//!
//! [[server.location]]
//! path = "/images/"
//! methods = ["GET", "HEAD"]
//! root = "/var/www/media"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::config::error::ConfigError;
use crate::config::location::{CgiConfig, LocationConfig, UploadConfig};
use crate::config::server::ServerConfig;
use crate::config::size::Size;
use crate::config::HttpConfig;
use crate::http::HttpMethod;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    keepalive_timeout: Option<f64>,
    send_timeout: Option<f64>,
    worker_connections: Option<u32>,
    buffer_size: Option<usize>,
    max_body_size: Option<usize>,
    server_name: Option<String>,
    #[serde(default)]
    mime_types: IndexMap<String, String>,
    #[serde(default)]
    error_pages: IndexMap<String, String>,
    #[serde(default, rename = "server")]
    servers: Vec<RawServer>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServer {
    listen: Vec<String>,
    #[serde(default)]
    server_names: Vec<String>,
    root: Option<String>,
    #[serde(default)]
    index: Vec<String>,
    client_max_body_size: Option<Size>,
    #[serde(default)]
    error_pages: IndexMap<String, String>,
    #[serde(rename = "return")]
    redirect: Option<RawReturn>,
    #[serde(default, rename = "location")]
    locations: Vec<RawLocation>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLocation {
    path: String,
    #[serde(default)]
    methods: Vec<HttpMethod>,
    root: Option<String>,
    alias: Option<String>,
    #[serde(default)]
    index: Vec<String>,
    #[serde(default)]
    try_files: Vec<String>,
    #[serde(default)]
    autoindex: bool,
    client_max_body_size: Option<Size>,
    client_body_buffer_size: Option<Size>,
    #[serde(default)]
    error_pages: IndexMap<String, String>,
    #[serde(default)]
    headers: IndexMap<String, String>,
    upload: Option<RawUpload>,
    cgi: Option<RawCgi>,
    #[serde(rename = "return")]
    redirect: Option<RawReturn>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUpload {
    directory: String,
    max_file_size: Option<Size>,
    max_total_size: Option<Size>,
    #[serde(default)]
    allowed_extensions: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCgi {
    interpreters: IndexMap<String, String>,
    working_directory: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReturn {
    code: u16,
    target: String,
}

pub(super) fn load(path: &Path) -> Result<HttpConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::ParseFile {
        path: path.to_path_buf(),
        source,
    })?;
    build(raw)
}

fn build(raw: RawConfig) -> Result<HttpConfig, ConfigError> {
    let mut config = HttpConfig::new();

    if let Some(secs) = raw.keepalive_timeout {
        config.set_keepalive_timeout(Duration::from_secs_f64(secs));
    }
    if let Some(secs) = raw.send_timeout {
        config.set_send_timeout(Duration::from_secs_f64(secs));
    }
    if let Some(connections) = raw.worker_connections {
        config.set_worker_connections(connections);
    }
    if let Some(size) = raw.buffer_size {
        config.set_buffer_size(size);
    }
    if let Some(size) = raw.max_body_size {
        config.set_max_body_size(size);
    }
    if let Some(name) = raw.server_name {
        config.set_server_name(name);
    }
    for (extension, mime_type) in &raw.mime_types {
        config.add_mime_type(extension, mime_type);
    }
    for (code, uri) in &raw.error_pages {
        config.add_error_page(parse_error_code(code)?, uri)?;
    }

    for raw_server in raw.servers {
        config.add_server(build_server(raw_server)?)?;
    }
    Ok(config)
}

fn build_server(raw: RawServer) -> Result<ServerConfig, ConfigError> {
    let mut server = ServerConfig::new();

    for directive in &raw.listen {
        server.add_listen(directive)?;
    }
    for name in &raw.server_names {
        server.add_server_name(name)?;
    }
    if let Some(root) = raw.root {
        server.set_root(root);
    }
    for index in &raw.index {
        server.add_index_file(index)?;
    }
    if let Some(size) = raw.client_max_body_size {
        server.set_client_max_body_size(size)?;
    }
    for (code, uri) in &raw.error_pages {
        server.add_error_page(parse_error_code(code)?, uri)?;
    }
    if let Some(redirect) = raw.redirect {
        server.set_return_redirect(&redirect.target, redirect.code)?;
    }
    for raw_location in raw.locations {
        server.add_location(build_location(raw_location)?)?;
    }
    Ok(server)
}

fn build_location(raw: RawLocation) -> Result<LocationConfig, ConfigError> {
    let mut location = LocationConfig::new(&raw.path)?;

    for method in raw.methods {
        location.allow_method(method);
    }
    if let Some(root) = raw.root {
        location.set_root(root);
    }
    if let Some(alias) = raw.alias {
        location.set_alias(alias);
    }
    for index in &raw.index {
        location.add_index_file(index)?;
    }
    for entry in &raw.try_files {
        location.add_try_file(entry)?;
    }
    location.set_autoindex(raw.autoindex);
    if let Some(size) = raw.client_max_body_size {
        location.set_client_max_body_size(size)?;
    }
    if let Some(size) = raw.client_body_buffer_size {
        location.set_client_body_buffer_size(size)?;
    }
    for (code, uri) in &raw.error_pages {
        location.add_error_page(parse_error_code(code)?, uri)?;
    }
    for (name, value) in &raw.headers {
        location.add_custom_header(name, value)?;
    }
    if let Some(upload) = raw.upload {
        let mut upload_config = UploadConfig::new(upload.directory);
        if let Some(size) = upload.max_file_size {
            upload_config.set_max_file_size(size);
        }
        if let Some(size) = upload.max_total_size {
            upload_config.set_max_total_size(size);
        }
        for extension in upload.allowed_extensions {
            upload_config.allow_extension(extension);
        }
        location.enable_upload(upload_config)?;
    }
    if let Some(cgi) = raw.cgi {
        let mut cgi_config = CgiConfig::new();
        for (extension, interpreter) in &cgi.interpreters {
            cgi_config.add_interpreter(extension.clone(), interpreter.clone())?;
        }
        if let Some(dir) = cgi.working_directory {
            cgi_config.set_working_directory(dir);
        }
        location.set_cgi(cgi_config)?;
    }
    if let Some(redirect) = raw.redirect {
        location.set_return_redirect(&redirect.target, redirect.code)?;
    }
    Ok(location)
}

/// TOML table keys are always strings, even `[server.error_pages] 404 = ...`.
fn parse_error_code(key: &str) -> Result<u16, ConfigError> {
    key.parse()
        .map_err(|_| ConfigError::InvalidErrorCode(key.parse().unwrap_or(0)))
}

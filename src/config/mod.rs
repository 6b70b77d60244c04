//! Configuration entities.
//!
//! The graph is `HttpConfig` → `ServerConfig[]` → `LocationConfig[]`, built
//! once by the loader, validated once, then published process-wide through
//! [`set_config`]/[`config`] and treated as read-only for the life of the
//! process. Selection APIs hand out borrowed references into the graph.

use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;

pub mod error;
mod loader;
pub mod location;
pub mod server;
pub mod size;

pub use error::ConfigError;
pub use location::{CgiConfig, LocationConfig, LocationMatch, ReturnRedirect, UploadConfig};
pub use server::{ListenDirective, ServerConfig};
pub use size::Size;

use crate::http::HttpVersion;

static CONFIG: OnceCell<HttpConfig> = OnceCell::new();

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";
const MIN_WORKER_CONNECTIONS: u32 = 1;
const MAX_WORKER_CONNECTIONS: u32 = 65536;
const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

pub struct HttpConfig {
    servers: Vec<ServerConfig>,

    keepalive_timeout: Duration,
    send_timeout: Duration,
    worker_connections: u32,

    buffer_size: usize,
    max_path_size: usize,
    max_header_size: usize,
    max_body_size: usize,
    http_version: HttpVersion,
    server_name: String,

    mime_types: IndexMap<String, String>,
    error_pages: IndexMap<u16, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),

            keepalive_timeout: Duration::from_secs(65),
            send_timeout: Duration::from_secs(5),
            worker_connections: 1024,

            buffer_size: 4096,
            max_path_size: 1024,
            max_header_size: 8192,
            max_body_size: 1024 * 1024, // 1 MB
            http_version: HttpVersion::V1_1,
            server_name: "webforge/0.1".to_string(),

            mime_types: default_mime_types(),
            error_pages: IndexMap::new(),
        }
    }
}

impl HttpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads and fully validates a TOML configuration file.
    ///
    /// Unlike a single-server toy there is no fallback to defaults: broken
    /// config means the process must not start serving.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = loader::load(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    pub fn keepalive_timeout(&self) -> Duration {
        self.keepalive_timeout
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    pub fn worker_connections(&self) -> u32 {
        self.worker_connections
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn max_path_size(&self) -> usize {
        self.max_path_size
    }

    pub fn max_header_size(&self) -> usize {
        self.max_header_size
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    pub fn http_version(&self) -> &HttpVersion {
        &self.http_version
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn error_page(&self, code: u16) -> Option<&str> {
        self.error_pages.get(&code).map(String::as_str)
    }

    // -- builder surface -------------------------------------------------

    /// Validates the server immediately; cross-server conflicts are checked
    /// by [`HttpConfig::validate`] once the whole set is known.
    pub fn add_server(&mut self, server: ServerConfig) -> Result<(), ConfigError> {
        server.validate()?;
        self.servers.push(server);
        Ok(())
    }

    pub fn set_keepalive_timeout(&mut self, timeout: Duration) {
        self.keepalive_timeout = timeout.min(MAX_TIMEOUT);
    }

    pub fn set_send_timeout(&mut self, timeout: Duration) {
        self.send_timeout = timeout.min(MAX_TIMEOUT);
    }

    pub fn set_worker_connections(&mut self, connections: u32) {
        self.worker_connections = connections.clamp(MIN_WORKER_CONNECTIONS, MAX_WORKER_CONNECTIONS);
    }

    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size;
    }

    pub fn set_max_body_size(&mut self, size: usize) {
        self.max_body_size = size;
    }

    pub fn set_server_name(&mut self, name: impl Into<String>) {
        self.server_name = name.into();
    }

    pub fn add_mime_type(&mut self, extension: &str, mime_type: &str) {
        let key = normalize_extension(extension);
        self.mime_types.insert(key, mime_type.to_string());
    }

    pub fn add_error_page(&mut self, code: u16, uri: &str) -> Result<(), ConfigError> {
        if !(400..600).contains(&code) {
            return Err(ConfigError::InvalidErrorCode(code));
        }
        let trimmed = uri.trim();
        if trimmed.is_empty() || !trimmed.starts_with('/') {
            return Err(ConfigError::InvalidErrorPageUri(uri.to_string()));
        }
        self.error_pages.insert(code, trimmed.to_string());
        Ok(())
    }

    // -- server selection ------------------------------------------------

    /// Picks the virtual server for a request, in declaration order.
    ///
    /// The first server matching host and port wins. When nothing matches
    /// by name, the first `default_server` on that port is the fallback.
    /// `None` means the connection layer must answer with its own error;
    /// there is no implicit server.
    pub fn select_server(&self, host: &str, port: u16) -> Option<&ServerConfig> {
        self.servers
            .iter()
            .find(|server| server.matches_request(host, port))
            .or_else(|| {
                self.servers.iter().find(|server| {
                    server.is_default_server()
                        && server
                            .listen_directives()
                            .iter()
                            .any(|directive| directive.port() == port)
                })
            })
    }

    /// MIME type for a file extension, with or without the leading dot,
    /// case-insensitive.
    pub fn get_mime_type(&self, extension: &str) -> &str {
        let key = normalize_extension(extension);
        self.mime_types
            .get(&key)
            .map(String::as_str)
            .unwrap_or(FALLBACK_MIME_TYPE)
    }

    pub fn has_mime_type(&self, extension: &str) -> bool {
        self.mime_types.contains_key(&normalize_extension(extension))
    }

    /// MIME type for a filesystem path, by extension.
    pub fn mime_type_for(&self, path: &Path) -> &str {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.get_mime_type(ext))
            .unwrap_or(FALLBACK_MIME_TYPE)
    }

    // -- validation ------------------------------------------------------

    /// All checks are pure reads; validating an already-valid configuration
    /// any number of times succeeds and changes nothing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        for server in &self.servers {
            server.validate()?;
        }
        self.validate_no_port_conflicts()?;
        self.validate_no_address_conflicts()?;
        self.validate_default_servers()?;
        Ok(())
    }

    /// Two servers claiming the same binding with nothing to tell them
    /// apart: neither declares any server name.
    fn validate_no_port_conflicts(&self) -> Result<(), ConfigError> {
        for (i, first) in self.servers.iter().enumerate() {
            for second in &self.servers[i + 1..] {
                if !first.server_names().is_empty() || !second.server_names().is_empty() {
                    continue;
                }
                for a in first.listen_directives() {
                    for b in second.listen_directives() {
                        if a.conflicts_with(b) {
                            return Err(ConfigError::PortConflict(a.binding_key()));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// The same (or wildcard-overlapping) server name on two servers that
    /// share a binding makes selection order-dependent.
    fn validate_no_address_conflicts(&self) -> Result<(), ConfigError> {
        for (i, first) in self.servers.iter().enumerate() {
            for second in &self.servers[i + 1..] {
                let share_binding = first.listen_directives().iter().any(|a| {
                    second
                        .listen_directives()
                        .iter()
                        .any(|b| a.conflicts_with(b))
                });
                if !share_binding {
                    continue;
                }
                for name_a in first.server_names() {
                    for name_b in second.server_names() {
                        if server_names_overlap(name_a, name_b) {
                            return Err(ConfigError::AddressConflict(name_a.clone()));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_default_servers(&self) -> Result<(), ConfigError> {
        let mut seen: IndexMap<String, u32> = IndexMap::new();
        for server in &self.servers {
            for directive in server.listen_directives() {
                if directive.is_default() {
                    let count = seen.entry(directive.binding_key()).or_insert(0);
                    *count += 1;
                    if *count > 1 {
                        return Err(ConfigError::MultipleDefaultServers(directive.binding_key()));
                    }
                }
            }
        }
        Ok(())
    }
}

fn server_names_overlap(a: &str, b: &str) -> bool {
    ServerConfig::matches_server_name(a, b) || ServerConfig::matches_server_name(b, a)
}

fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim().to_ascii_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{}", trimmed)
    }
}

fn default_mime_types() -> IndexMap<String, String> {
    let entries = [
        (".html", "text/html"),
        (".htm", "text/html"),
        (".css", "text/css"),
        (".js", "application/javascript"),
        (".json", "application/json"),
        (".xml", "application/xml"),
        (".txt", "text/plain"),
        (".jpg", "image/jpeg"),
        (".jpeg", "image/jpeg"),
        (".png", "image/png"),
        (".gif", "image/gif"),
        (".svg", "image/svg+xml"),
        (".ico", "image/x-icon"),
        (".pdf", "application/pdf"),
        (".zip", "application/zip"),
        (".tar", "application/x-tar"),
        (".gz", "application/gzip"),
    ];
    entries
        .iter()
        .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
        .collect()
}

/// Publishes the validated configuration for the life of the process.
pub fn set_config(cfg: HttpConfig) {
    CONFIG.set(cfg).unwrap_or_else(|_| panic!("Config already set"));
}

pub fn config() -> &'static HttpConfig {
    CONFIG.get().expect("Config not initialized")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_server(port: u16, names: &[&str], default: bool) -> ServerConfig {
        let mut server = ServerConfig::new();
        let directive = if default {
            format!("0.0.0.0:{} default_server", port)
        } else {
            format!("0.0.0.0:{}", port)
        };
        server.add_listen(&directive).unwrap();
        server.set_root("/var/www/html");
        for name in names {
            server.add_server_name(name).unwrap();
        }
        server
    }

    #[test]
    fn select_server_scenario() {
        // server A: default on 8080, names ["localhost"]
        // server B: 8080, names ["api.local"]
        let mut config = HttpConfig::new();
        config
            .add_server(named_server(8080, &["localhost"], true))
            .unwrap();
        config
            .add_server(named_server(8080, &["api.local"], false))
            .unwrap();
        config.validate().unwrap();

        let b = config.select_server("api.local", 8080).unwrap();
        assert_eq!(b.server_names(), ["api.local"]);

        // unknown name falls back to the default server on that port
        let a = config.select_server("unknown.local", 8080).unwrap();
        assert_eq!(a.server_names(), ["localhost"]);

        assert!(config.select_server("api.local", 9090).is_none());
    }

    #[test]
    fn selection_is_deterministic() {
        let mut config = HttpConfig::new();
        config
            .add_server(named_server(8080, &["localhost"], true))
            .unwrap();
        config
            .add_server(named_server(8080, &["api.local"], false))
            .unwrap();

        let first = config.select_server("api.local", 8080).unwrap() as *const _;
        for _ in 0..3 {
            let again = config.select_server("api.local", 8080).unwrap() as *const _;
            assert_eq!(first, again);
        }
    }

    #[test]
    fn empty_configuration_is_fatal() {
        let config = HttpConfig::new();
        assert!(matches!(config.validate(), Err(ConfigError::NoServers)));
    }

    #[test]
    fn anonymous_servers_on_same_binding_conflict() {
        let mut config = HttpConfig::new();
        config.add_server(named_server(8080, &[], false)).unwrap();
        config.add_server(named_server(8080, &[], false)).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PortConflict(_))
        ));
    }

    #[test]
    fn shared_name_on_shared_binding_conflicts() {
        let mut config = HttpConfig::new();
        config
            .add_server(named_server(8080, &["example.com"], false))
            .unwrap();
        config
            .add_server(named_server(8080, &["example.com"], false))
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AddressConflict(_))
        ));
    }

    #[test]
    fn wildcard_overlap_counts_as_address_conflict() {
        let mut config = HttpConfig::new();
        config
            .add_server(named_server(8080, &["*.example.com"], false))
            .unwrap();
        config
            .add_server(named_server(8080, &["api.example.com"], false))
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AddressConflict(_))
        ));
    }

    #[test]
    fn same_name_on_different_ports_is_fine() {
        let mut config = HttpConfig::new();
        config
            .add_server(named_server(8080, &["example.com"], false))
            .unwrap();
        config
            .add_server(named_server(9090, &["example.com"], false))
            .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn two_defaults_on_one_binding_conflict() {
        let mut config = HttpConfig::new();
        config
            .add_server(named_server(8080, &["a.local"], true))
            .unwrap();
        config
            .add_server(named_server(8080, &["b.local"], true))
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MultipleDefaultServers(_))
        ));
    }

    #[test]
    fn validate_twice_is_a_noop() {
        let mut config = HttpConfig::new();
        config
            .add_server(named_server(8080, &["localhost"], false))
            .unwrap();
        assert!(config.validate().is_ok());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn mime_lookup() {
        let config = HttpConfig::new();
        assert_eq!(config.get_mime_type("html"), "text/html");
        assert_eq!(config.get_mime_type(".PNG"), "image/png");
        assert_eq!(config.get_mime_type(".weird"), "application/octet-stream");
        assert_eq!(
            config.mime_type_for(Path::new("/var/www/a.css")),
            "text/css"
        );
        assert_eq!(
            config.mime_type_for(Path::new("/var/www/noext")),
            "application/octet-stream"
        );
    }
}

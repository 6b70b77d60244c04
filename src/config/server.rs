//! Virtual servers.
//!
//! A [`ServerConfig`] is one `server {}` block: its listen bindings, server
//! names, and the ordered list of locations. Request matching
//! ([`ServerConfig::matches_request`]) and the three-tier location lookup
//! ([`ServerConfig::find_location`]) both live here.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::config::error::ConfigError;
use crate::config::location::{LocationConfig, LocationMatch, ReturnRedirect, MAX_CLIENT_BODY_SIZE};
use crate::config::size::Size;

const DEFAULT_PORT: u16 = 80;
const WILDCARD_HOST: &str = "0.0.0.0";
const DEFAULT_CLIENT_BODY_SIZE: Size = Size::from_megabytes(1);

/// One `host:port` binding, optionally flagged as the default server for
/// that binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenDirective {
    host: String,
    port: u16,
    is_default: bool,
}

impl ListenDirective {
    pub fn new(host: &str, port: u16, is_default: bool) -> Result<Self, ConfigError> {
        let host = host.trim().to_ascii_lowercase();
        if host.is_empty() || port == 0 {
            return Err(ConfigError::InvalidListenDirective(format!(
                "{}:{}",
                host, port
            )));
        }
        let host = if host == "*" {
            WILDCARD_HOST.to_string()
        } else {
            host
        };
        Ok(Self {
            host,
            port,
            is_default,
        })
    }

    /// Parses `"8080"`, `"example.com"`, `"127.0.0.1:8080"`, each optionally
    /// followed by `default_server` (nginx spelling) or `;default`.
    pub fn parse(directive: &str) -> Result<Self, ConfigError> {
        let normalized = directive.replace(';', " ");
        let mut tokens = normalized.split_whitespace();
        let address = tokens
            .next()
            .ok_or_else(|| ConfigError::InvalidListenDirective(directive.to_string()))?;

        let mut is_default = false;
        for token in tokens {
            match token {
                "default_server" | "default" => is_default = true,
                _ => return Err(ConfigError::InvalidListenDirective(directive.to_string())),
            }
        }

        let (host, port) = if address.chars().all(|c| c.is_ascii_digit()) {
            let port = address
                .parse()
                .map_err(|_| ConfigError::InvalidListenDirective(directive.to_string()))?;
            (WILDCARD_HOST, port)
        } else if let Some((host, port)) = address.rsplit_once(':') {
            let port = port
                .parse()
                .map_err(|_| ConfigError::InvalidListenDirective(directive.to_string()))?;
            (host, port)
        } else {
            (address, DEFAULT_PORT)
        };

        Self::new(host, port, is_default)
            .map_err(|_| ConfigError::InvalidListenDirective(directive.to_string()))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn is_wildcard(&self) -> bool {
        self.host == WILDCARD_HOST
    }

    pub fn is_localhost(&self) -> bool {
        self.host == "localhost" || self.host == "127.0.0.1"
    }

    /// Whether a request that arrived for `host` can be served by this
    /// binding. A wildcard binding accepts any host; `localhost` and
    /// `127.0.0.1` are interchangeable.
    pub fn matches_host(&self, host: &str) -> bool {
        if self.is_wildcard() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.host == host || (self.is_localhost() && (host == "localhost" || host == "127.0.0.1"))
    }

    /// Same `(host, port)` address, default flag ignored.
    pub fn same_address(&self, other: &ListenDirective) -> bool {
        self.host == other.host && self.port == other.port
    }

    /// Two bindings collide when a socket could not be bound for both.
    pub fn conflicts_with(&self, other: &ListenDirective) -> bool {
        self.port == other.port
            && (self.is_wildcard()
                || other.is_wildcard()
                || self.host == other.host
                || (self.is_localhost() && other.is_localhost()))
    }

    /// Canonical `host:port` key used to count default servers per binding.
    pub fn binding_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ListenDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)?;
        if self.is_default {
            write!(f, " default_server")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ServerConfig {
    listen: Vec<ListenDirective>,
    server_names: Vec<String>,
    root: Option<PathBuf>,
    index_files: Vec<String>,
    error_pages: IndexMap<u16, String>,
    locations: Vec<LocationConfig>,
    client_max_body_size: Size,
    redirect: Option<ReturnRedirect>,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            listen: Vec::new(),
            server_names: Vec::new(),
            root: None,
            index_files: Vec::new(),
            error_pages: IndexMap::new(),
            locations: Vec::new(),
            client_max_body_size: DEFAULT_CLIENT_BODY_SIZE,
            redirect: None,
        }
    }

    pub fn listen_directives(&self) -> &[ListenDirective] {
        &self.listen
    }

    pub fn server_names(&self) -> &[String] {
        &self.server_names
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn index_files(&self) -> &[String] {
        &self.index_files
    }

    pub fn error_page(&self, code: u16) -> Option<&str> {
        self.error_pages.get(&code).map(String::as_str)
    }

    pub fn locations(&self) -> &[LocationConfig] {
        &self.locations
    }

    pub fn client_max_body_size(&self) -> Size {
        self.client_max_body_size
    }

    pub fn redirect(&self) -> Option<&ReturnRedirect> {
        self.redirect.as_ref()
    }

    /// True when any listen directive carries the `default_server` flag.
    pub fn is_default_server(&self) -> bool {
        self.listen.iter().any(ListenDirective::is_default)
    }

    // -- builder surface -------------------------------------------------

    pub fn add_listen(&mut self, directive: &str) -> Result<(), ConfigError> {
        self.add_listen_directive(ListenDirective::parse(directive)?)
    }

    pub fn add_listen_directive(&mut self, directive: ListenDirective) -> Result<(), ConfigError> {
        if self
            .listen
            .iter()
            .any(|existing| existing.same_address(&directive))
        {
            return Err(ConfigError::DuplicateListen(directive.to_string()));
        }
        self.listen.push(directive);
        Ok(())
    }

    pub fn add_server_name(&mut self, name: &str) -> Result<(), ConfigError> {
        let trimmed = name.trim().to_ascii_lowercase();
        if !Self::is_valid_server_name(&trimmed) {
            return Err(ConfigError::InvalidServerName(name.to_string()));
        }
        if self.server_names.contains(&trimmed) {
            return Err(ConfigError::DuplicateServerName(trimmed));
        }
        self.server_names.push(trimmed);
        Ok(())
    }

    pub fn set_root(&mut self, root: impl Into<PathBuf>) {
        self.root = Some(root.into());
    }

    pub fn add_index_file(&mut self, index: &str) -> Result<(), ConfigError> {
        let trimmed = index.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyIndexFile);
        }
        if self.index_files.iter().any(|existing| existing == trimmed) {
            return Err(ConfigError::DuplicateIndexFile(trimmed.to_string()));
        }
        self.index_files.push(trimmed.to_string());
        Ok(())
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

    pub fn set_client_max_body_size(&mut self, size: Size) -> Result<(), ConfigError> {
        if size > MAX_CLIENT_BODY_SIZE {
            return Err(ConfigError::BodySizeTooLarge {
                got: size,
                limit: MAX_CLIENT_BODY_SIZE,
            });
        }
        self.client_max_body_size = size;
        Ok(())
    }

    pub fn set_return_redirect(&mut self, target: &str, code: u16) -> Result<(), ConfigError> {
        self.redirect = Some(ReturnRedirect::new(target, code)?);
        Ok(())
    }

    /// Validates the location and rejects a second location with the same
    /// `(pattern, match type)`.
    pub fn add_location(&mut self, location: LocationConfig) -> Result<(), ConfigError> {
        location.validate()?;
        if self
            .locations
            .iter()
            .any(|existing| existing.matcher() == location.matcher())
        {
            return Err(ConfigError::DuplicateLocation(
                location.pattern().to_string(),
            ));
        }
        self.locations.push(location);
        Ok(())
    }

    // -- request matching ------------------------------------------------

    /// True when some listen directive matches the port and bind address,
    /// and either no server names are configured or one of them matches the
    /// request host.
    pub fn matches_request(&self, host: &str, port: u16) -> bool {
        let binding_matches = self
            .listen
            .iter()
            .any(|directive| directive.port() == port && directive.matches_host(host));
        if !binding_matches {
            return false;
        }
        if self.server_names.is_empty() {
            return true;
        }
        self.server_names
            .iter()
            .any(|name| Self::matches_server_name(name, host))
    }

    /// nginx-style server-name matching, case-insensitive.
    ///
    /// `_` matches anything. A leading `*.` matches any subdomain but never
    /// the bare domain; a trailing `.*` matches any suffix but never the
    /// bare prefix.
    pub fn matches_server_name(config_name: &str, request_name: &str) -> bool {
        let config_name = config_name.to_ascii_lowercase();
        let request_name = request_name.to_ascii_lowercase();

        if config_name == request_name {
            return true;
        }
        if config_name == "_" {
            return true;
        }
        if let Some(domain) = config_name.strip_prefix('*') {
            // keep the dot: "*.example.com" -> ".example.com"
            return request_name.len() > domain.len() && request_name.ends_with(domain);
        }
        if let Some(prefix) = config_name.strip_suffix('*') {
            return request_name.len() > prefix.len() && request_name.starts_with(prefix);
        }
        false
    }

    /// Three-tier location lookup:
    ///
    /// 1. any exact location equal to the path wins immediately (first
    ///    declared on ties),
    /// 2. else the longest matching prefix location (first declared on
    ///    ties),
    /// 3. else the first matching regex location in declaration order.
    pub fn find_location(&self, uri_path: &str) -> Option<&LocationConfig> {
        for location in &self.locations {
            if let LocationMatch::Exact(path) = location.matcher() {
                if path == uri_path {
                    return Some(location);
                }
            }
        }

        let mut best: Option<&LocationConfig> = None;
        let mut best_len = 0;
        for location in &self.locations {
            if let LocationMatch::Prefix(prefix) = location.matcher() {
                if uri_path.starts_with(prefix.as_str()) && prefix.len() > best_len {
                    best_len = prefix.len();
                    best = Some(location);
                }
            }
        }
        if best.is_some() {
            return best;
        }

        for location in &self.locations {
            if let LocationMatch::Regex { compiled, .. } = location.matcher() {
                if compiled.is_match(uri_path) {
                    return Some(location);
                }
            }
        }
        None
    }

    // -- validation ------------------------------------------------------

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_listen_directives()?;
        self.validate_server_names()?;
        self.validate_root()?;
        self.validate_error_pages()?;
        for location in &self.locations {
            location.validate()?;
        }
        self.validate_client_max_body_size()?;

        if self.locations.is_empty() && self.root.is_none() && self.redirect.is_none() {
            return Err(ConfigError::MissingConfiguration);
        }
        Ok(())
    }

    fn validate_listen_directives(&self) -> Result<(), ConfigError> {
        if self.listen.is_empty() {
            return Err(ConfigError::MissingListenDirective);
        }
        Ok(())
    }

    fn validate_server_names(&self) -> Result<(), ConfigError> {
        for name in &self.server_names {
            if !Self::is_valid_server_name(name) {
                return Err(ConfigError::InvalidServerName(name.clone()));
            }
        }
        Ok(())
    }

    /// The server needs its own root whenever some location could fall back
    /// to it.
    fn validate_root(&self) -> Result<(), ConfigError> {
        if self.root.is_some() {
            return Ok(());
        }
        let all_covered = self
            .locations
            .iter()
            .all(|location| location.root().is_some() || location.alias().is_some());
        if !all_covered {
            return Err(ConfigError::MissingRoot);
        }
        Ok(())
    }

    fn validate_error_pages(&self) -> Result<(), ConfigError> {
        for uri in self.error_pages.values() {
            if uri.is_empty() || !uri.starts_with('/') {
                return Err(ConfigError::InvalidErrorPageUri(uri.clone()));
            }
        }
        Ok(())
    }

    fn validate_client_max_body_size(&self) -> Result<(), ConfigError> {
        if self.client_max_body_size > MAX_CLIENT_BODY_SIZE {
            return Err(ConfigError::BodySizeTooLarge {
                got: self.client_max_body_size,
                limit: MAX_CLIENT_BODY_SIZE,
            });
        }
        Ok(())
    }

    fn is_valid_server_name(name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        if name == "_" {
            return true;
        }
        let bare = name
            .strip_prefix("*.")
            .or_else(|| name.strip_suffix(".*"))
            .unwrap_or(name);
        if bare.is_empty() || bare.contains('*') {
            return false;
        }
        if bare.starts_with('.') || bare.ends_with('.') || bare.contains("..") {
            return false;
        }
        bare.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_on(port: u16) -> ServerConfig {
        let mut server = ServerConfig::new();
        server.add_listen(&format!("0.0.0.0:{}", port)).unwrap();
        server.set_root("/var/www/html");
        server
    }

    #[test]
    fn listen_parse_forms() {
        let bare_port = ListenDirective::parse("8080").unwrap();
        assert_eq!(bare_port.host(), "0.0.0.0");
        assert_eq!(bare_port.port(), 8080);
        assert!(bare_port.is_wildcard());

        let bare_host = ListenDirective::parse("example.com").unwrap();
        assert_eq!(bare_host.port(), 80);

        let full = ListenDirective::parse("127.0.0.1:9090 default_server").unwrap();
        assert_eq!(full.host(), "127.0.0.1");
        assert_eq!(full.port(), 9090);
        assert!(full.is_default());

        let semi = ListenDirective::parse("127.0.0.1:9090;default").unwrap();
        assert!(semi.is_default());

        assert!(ListenDirective::parse("").is_err());
        assert!(ListenDirective::parse("host:notaport").is_err());
        assert!(ListenDirective::parse("8080 bogus_flag").is_err());
    }

    #[test]
    fn duplicate_listen_rejected() {
        let mut server = ServerConfig::new();
        server.add_listen("0.0.0.0:8080").unwrap();
        assert!(server.add_listen("8080").is_err());
    }

    #[test]
    fn wildcard_server_names() {
        assert!(ServerConfig::matches_server_name(
            "*.example.com",
            "a.example.com"
        ));
        assert!(ServerConfig::matches_server_name(
            "*.example.com",
            "a.b.example.com"
        ));
        assert!(!ServerConfig::matches_server_name(
            "*.example.com",
            "example.com"
        ));
        assert!(ServerConfig::matches_server_name(
            "www.example.*",
            "www.example.org"
        ));
        assert!(!ServerConfig::matches_server_name(
            "www.example.*",
            "www.example."
        ));
        assert!(ServerConfig::matches_server_name("_", "anything.at.all"));
        assert!(ServerConfig::matches_server_name(
            "Example.COM",
            "example.com"
        ));
    }

    #[test]
    fn matches_request_checks_port_host_and_names() {
        let mut server = server_on(8080);
        server.add_server_name("api.local").unwrap();

        assert!(server.matches_request("api.local", 8080));
        assert!(server.matches_request("API.LOCAL", 8080));
        assert!(!server.matches_request("api.local", 9090));
        assert!(!server.matches_request("other.local", 8080));
    }

    #[test]
    fn empty_server_names_match_by_listen_alone() {
        let server = server_on(8080);
        assert!(server.matches_request("whatever.host", 8080));
        assert!(!server.matches_request("whatever.host", 8081));
    }

    #[test]
    fn longest_prefix_wins() {
        let mut server = server_on(8080);

        let mut root = LocationConfig::new("/").unwrap();
        root.set_root("/var/www");
        server.add_location(root).unwrap();

        let mut images = LocationConfig::new("/images/").unwrap();
        images.set_root("/var/media");
        server.add_location(images).unwrap();

        let found = server.find_location("/images/cat.png").unwrap();
        assert_eq!(found.pattern(), "/images/");

        let fallback = server.find_location("/index.html").unwrap();
        assert_eq!(fallback.pattern(), "/");
    }

    #[test]
    fn exact_beats_prefix() {
        let mut server = server_on(8080);

        let mut catchall = LocationConfig::new("/").unwrap();
        catchall.set_root("/var/www");
        server.add_location(catchall).unwrap();

        let mut exact = LocationConfig::new("= /exact").unwrap();
        exact.set_root("/var/special");
        server.add_location(exact).unwrap();

        let found = server.find_location("/exact").unwrap();
        assert_eq!(found.pattern(), "/exact");
        assert!(matches!(found.matcher(), LocationMatch::Exact(_)));

        // one path component deeper, the exact match no longer applies
        let deeper = server.find_location("/exact/sub").unwrap();
        assert_eq!(deeper.pattern(), "/");
    }

    #[test]
    fn prefix_beats_regex_and_regexes_go_in_declaration_order() {
        let mut server = server_on(8080);

        let mut first_regex = LocationConfig::new(r"~ \.(png|jpg)$").unwrap();
        first_regex.set_root("/var/regex-one");
        server.add_location(first_regex).unwrap();

        let mut second_regex = LocationConfig::new(r"~* \.png$").unwrap();
        second_regex.set_root("/var/regex-two");
        server.add_location(second_regex).unwrap();

        // no prefix matches /data -> first declared matching regex wins
        let found = server.find_location("/data/cat.png").unwrap();
        assert_eq!(found.root().unwrap(), Path::new("/var/regex-one"));

        let mut images = LocationConfig::new("/images/").unwrap();
        images.set_root("/var/media");
        server.add_location(images).unwrap();

        // a matching prefix outranks both regexes
        let found = server.find_location("/images/cat.png").unwrap();
        assert_eq!(found.pattern(), "/images/");
    }

    #[test]
    fn duplicate_location_pattern_rejected() {
        let mut server = server_on(8080);
        let mut a = LocationConfig::new("/api/").unwrap();
        a.set_root("/srv/a");
        server.add_location(a).unwrap();

        let mut b = LocationConfig::new("/api/").unwrap();
        b.set_root("/srv/b");
        assert!(matches!(
            server.add_location(b),
            Err(ConfigError::DuplicateLocation(_))
        ));

        // same pattern under a different match type is a different location
        let mut exact = LocationConfig::new("= /api/").unwrap();
        exact.set_root("/srv/c");
        assert!(server.add_location(exact).is_ok());
    }

    #[test]
    fn root_required_when_a_location_has_none() {
        let mut server = ServerConfig::new();
        server.add_listen("8080").unwrap();
        let location = LocationConfig::new("/").unwrap();
        server.add_location(location).unwrap();
        assert!(matches!(server.validate(), Err(ConfigError::MissingRoot)));

        server.set_root("/var/www");
        assert!(server.validate().is_ok());
    }

    #[test]
    fn validate_is_idempotent() {
        let server = server_on(8080);
        assert!(server.validate().is_ok());
        assert!(server.validate().is_ok());
    }
}

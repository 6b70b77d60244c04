//! Route values handed to the dispatch layer.
//!
//! [`Route`] is what the handler layer consumes: the winning pattern, its
//! primary handler type and the knobs that handler needs. [`RouteMatchInfo`]
//! carries the filesystem outcome of resolution. Both are plain values; the
//! borrowed config references travel next to them in
//! [`RoutedRequest`](crate::routing::RoutedRequest).

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::config::location::LocationConfig;
use crate::config::server::ServerConfig;
use crate::config::size::Size;
use crate::routing::RouteError;

/// The single primary behavior of a matched location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Static,
    Cgi,
    Upload,
    Redirect,
}

/// Immutable result of a successful resolution.
///
/// Invariant: a non-directory match with a non-empty `file_to_serve` always
/// carries a non-empty `resolved_path`. The constructors are the only way to
/// build one, so the invariant holds by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatchInfo {
    resolved_path: PathBuf,
    is_directory: bool,
    file_to_serve: String,
    query_params: IndexMap<String, String>,
}

impl RouteMatchInfo {
    pub fn empty() -> Self {
        Self {
            resolved_path: PathBuf::new(),
            is_directory: false,
            file_to_serve: String::new(),
            query_params: IndexMap::new(),
        }
    }

    pub fn for_file(
        resolved_path: PathBuf,
        query_params: IndexMap<String, String>,
    ) -> Result<Self, RouteError> {
        let file_to_serve = resolved_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                RouteError::InvalidMatchInfo(format!(
                    "resolved file has no name: {}",
                    resolved_path.display()
                ))
            })?;
        if resolved_path.as_os_str().is_empty() {
            return Err(RouteError::InvalidMatchInfo(
                "resolved path cannot be empty when a file is served".to_string(),
            ));
        }
        Ok(Self {
            resolved_path,
            is_directory: false,
            file_to_serve,
            query_params,
        })
    }

    pub fn for_directory(
        resolved_path: PathBuf,
        query_params: IndexMap<String, String>,
    ) -> Self {
        Self {
            resolved_path,
            is_directory: true,
            file_to_serve: String::new(),
            query_params,
        }
    }

    pub fn resolved_path(&self) -> &Path {
        &self.resolved_path
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn file_to_serve(&self) -> &str {
        &self.file_to_serve
    }

    pub fn query_params(&self) -> &IndexMap<String, String> {
        &self.query_params
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.resolved_path.as_os_str().is_empty()
            && self.file_to_serve.is_empty()
            && self.query_params.is_empty()
    }
}

/// Everything the dispatcher needs to run the matched handler.
#[derive(Debug, Clone)]
pub struct Route {
    pattern: String,
    handler: HandlerType,
    root: Option<PathBuf>,
    index_file: Option<String>,
    upload_directory: Option<PathBuf>,
    redirect: Option<(String, u16)>,
    max_body_size: Size,
    autoindex: bool,
}

impl Route {
    /// Packages a matched location, filling root and index from the server
    /// where the location leaves them unset.
    pub fn for_location(location: &LocationConfig, server: &ServerConfig) -> Self {
        let root = location
            .alias()
            .or_else(|| location.root())
            .or_else(|| server.root())
            .map(Path::to_path_buf);
        let index_file = location
            .index_files()
            .first()
            .or_else(|| server.index_files().first())
            .cloned();
        Self {
            pattern: location.pattern().to_string(),
            handler: location.handler_type(),
            root,
            index_file,
            upload_directory: location
                .upload()
                .map(|upload| upload.directory().to_path_buf()),
            redirect: location
                .redirect()
                .map(|r| (r.target().to_string(), r.code())),
            max_body_size: location.client_max_body_size(),
            autoindex: location.autoindex(),
        }
    }

    /// Server-root fallback when no location matched.
    pub fn for_server(server: &ServerConfig) -> Self {
        Self {
            pattern: "/".to_string(),
            handler: if server.redirect().is_some() {
                HandlerType::Redirect
            } else {
                HandlerType::Static
            },
            root: server.root().map(Path::to_path_buf),
            index_file: server.index_files().first().cloned(),
            upload_directory: None,
            redirect: server
                .redirect()
                .map(|r| (r.target().to_string(), r.code())),
            max_body_size: server.client_max_body_size(),
            autoindex: false,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn handler(&self) -> HandlerType {
        self.handler
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn index_file(&self) -> Option<&str> {
        self.index_file.as_deref()
    }

    pub fn upload_directory(&self) -> Option<&Path> {
        self.upload_directory.as_deref()
    }

    pub fn redirect(&self) -> Option<(&str, u16)> {
        self.redirect
            .as_ref()
            .map(|(target, code)| (target.as_str(), *code))
    }

    pub fn max_body_size(&self) -> Size {
        self.max_body_size
    }

    pub fn autoindex(&self) -> bool {
        self.autoindex
    }

    pub fn is_cgi(&self) -> bool {
        self.handler == HandlerType::Cgi
    }

    pub fn is_upload(&self) -> bool {
        self.handler == HandlerType::Upload
    }

    pub fn is_redirect(&self) -> bool {
        self.handler == HandlerType::Redirect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_info_requires_a_file_name() {
        let info =
            RouteMatchInfo::for_file(PathBuf::from("/var/www/index.html"), IndexMap::new())
                .unwrap();
        assert_eq!(info.file_to_serve(), "index.html");
        assert!(!info.is_directory());
        assert!(RouteMatchInfo::for_file(PathBuf::from("/"), IndexMap::new()).is_err());
    }

    #[test]
    fn directory_info_has_no_file() {
        let info = RouteMatchInfo::for_directory(PathBuf::from("/var/www"), IndexMap::new());
        assert!(info.is_directory());
        assert!(info.file_to_serve().is_empty());
    }

    #[test]
    fn empty_info() {
        let info = RouteMatchInfo::empty();
        assert!(info.is_empty());
    }

    #[test]
    fn route_inherits_server_root_and_index() {
        let mut server = ServerConfig::new();
        server.add_listen("8080").unwrap();
        server.set_root("/var/www");
        server.add_index_file("home.html").unwrap();

        let location = LocationConfig::new("/docs/").unwrap();
        server.add_location(location).unwrap();

        let route = Route::for_location(&server.locations()[0], &server);
        assert_eq!(route.root().unwrap(), Path::new("/var/www"));
        assert_eq!(route.index_file(), Some("home.html"));
        assert_eq!(route.handler(), HandlerType::Static);
    }
}

//! The request routing engine.
//!
//! For every inbound request this module decides which virtual server and
//! which location govern it, enforces the location's method and body-size
//! rules, and computes a filesystem target that is provably contained inside
//! the configured root. Pure, synchronous computation: the only syscalls are
//! the `stat`-style existence checks inside the resolver.
//!
//! Chain per request:
//!
//! `HttpConfig::select_server` → `ServerConfig::find_location` →
//! method / body-size checks → `PathResolver::resolve` → [`RoutedRequest`].

pub mod path;
pub mod resolver;
pub mod route;

use std::path::PathBuf;

use indexmap::IndexMap;
use log::debug;

use crate::config::location::LocationConfig;
use crate::config::server::ServerConfig;
use crate::config::size::Size;
use crate::config::HttpConfig;
use crate::http::status::HttpStatus;
use crate::http::HttpMethod;

pub use resolver::{PathResolver, ResolveError, DEFAULT_INDEX_FILE};
pub use route::{HandlerType, Route, RouteMatchInfo};

/// Recoverable per-request routing failures. Each maps to one HTTP status;
/// none of them may take the process down.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("no virtual server for {host}:{port}")]
    NoServer { host: String, port: u16 },

    #[error("no route for path: {0}")]
    RouteNotFound(String),

    #[error("method {method} not allowed")]
    MethodNotAllowed {
        method: HttpMethod,
        allowed: Vec<HttpMethod>,
    },

    #[error("request body of {size} bytes exceeds limit of {limit}")]
    BodyTooLarge { size: u64, limit: Size },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("invalid route match: {0}")]
    InvalidMatchInfo(String),
}

impl RouteError {
    pub fn status(&self) -> HttpStatus {
        match self {
            RouteError::NoServer { .. } => HttpStatus::MisdirectedRequest,
            RouteError::RouteNotFound(_) => HttpStatus::NotFound,
            RouteError::MethodNotAllowed { .. } => HttpStatus::MethodNotAllowed,
            RouteError::BodyTooLarge { .. } => HttpStatus::PayloadTooLarge,
            RouteError::Resolve(err) => err.status(),
            RouteError::InvalidMatchInfo(_) => HttpStatus::InternalServerError,
        }
    }
}

/// Outcome of a routed request: borrowed references into the config graph
/// plus the computed route and match-info values.
#[derive(Debug)]
pub struct RoutedRequest<'a> {
    pub server: &'a ServerConfig,
    pub location: Option<&'a LocationConfig>,
    pub route: Route,
    pub match_info: RouteMatchInfo,
}

/// Routes one request through the full chain.
///
/// `body_len` is the declared request body size; the check runs before any
/// filesystem work so oversized uploads fail fast.
pub fn route_request<'a>(
    config: &'a HttpConfig,
    host: &str,
    port: u16,
    method: HttpMethod,
    uri_path: &str,
    query_params: IndexMap<String, String>,
    body_len: u64,
) -> Result<RoutedRequest<'a>, RouteError> {
    let server = config
        .select_server(host, port)
        .ok_or_else(|| RouteError::NoServer {
            host: host.to_string(),
            port,
        })?;

    let location = server.find_location(uri_path);
    debug!(
        "route {} {} -> server {:?}, location {:?}",
        method,
        uri_path,
        server.server_names(),
        location.map(|l| l.pattern())
    );

    check_method(location, method)?;
    check_body_size(server, location, body_len)?;

    match location {
        Some(location) => route_location(server, location, method, uri_path, query_params),
        None => route_server_fallback(server, uri_path, query_params),
    }
}

fn check_method(location: Option<&LocationConfig>, method: HttpMethod) -> Result<(), RouteError> {
    match location {
        Some(location) if !location.is_method_allowed(method) => {
            Err(RouteError::MethodNotAllowed {
                method,
                allowed: location.allowed_methods(),
            })
        }
        // the server-root fallback only ever serves static files
        None if !matches!(method, HttpMethod::Get | HttpMethod::Head) => {
            Err(RouteError::MethodNotAllowed {
                method,
                allowed: vec![HttpMethod::Get, HttpMethod::Head],
            })
        }
        _ => Ok(()),
    }
}

fn check_body_size(
    server: &ServerConfig,
    location: Option<&LocationConfig>,
    body_len: u64,
) -> Result<(), RouteError> {
    let limit = location
        .map(|l| l.client_max_body_size())
        .unwrap_or_else(|| server.client_max_body_size());
    if body_len > limit.bytes() {
        return Err(RouteError::BodyTooLarge {
            size: body_len,
            limit,
        });
    }
    Ok(())
}

fn route_location<'a>(
    server: &'a ServerConfig,
    location: &'a LocationConfig,
    method: HttpMethod,
    uri_path: &str,
    query_params: IndexMap<String, String>,
) -> Result<RoutedRequest<'a>, RouteError> {
    // return directives short-circuit before any filesystem access
    if location.redirect().is_some() {
        return Ok(RoutedRequest {
            server,
            location: Some(location),
            route: Route::for_location(location, server),
            match_info: RouteMatchInfo::empty(),
        });
    }

    // uploads target their configured directory, not the docroot
    if method == HttpMethod::Post {
        if let Some(upload) = location.upload() {
            return Ok(RoutedRequest {
                server,
                location: Some(location),
                route: Route::for_location(location, server),
                match_info: RouteMatchInfo::for_directory(
                    upload.directory().to_path_buf(),
                    query_params,
                ),
            });
        }
    }

    let (effective_request, effective_root) = match location.alias() {
        Some(alias) => {
            let remainder = uri_path
                .strip_prefix(location.pattern())
                .unwrap_or(uri_path);
            (path::normalize_request(remainder), alias.to_path_buf())
        }
        None => {
            let root = location
                .root()
                .or_else(|| server.root())
                .ok_or_else(|| RouteError::RouteNotFound(uri_path.to_string()))?;
            (uri_path.to_string(), root.to_path_buf())
        }
    };

    let index_file = location
        .index_files()
        .first()
        .or_else(|| server.index_files().first())
        .map(String::as_str)
        .unwrap_or(DEFAULT_INDEX_FILE);

    let resolved = PathResolver::resolve(&effective_request, &effective_root, index_file)?;
    Ok(RoutedRequest {
        server,
        location: Some(location),
        route: Route::for_location(location, server),
        match_info: build_match_info(resolved, query_params)?,
    })
}

fn route_server_fallback<'a>(
    server: &'a ServerConfig,
    uri_path: &str,
    query_params: IndexMap<String, String>,
) -> Result<RoutedRequest<'a>, RouteError> {
    if server.redirect().is_some() {
        return Ok(RoutedRequest {
            server,
            location: None,
            route: Route::for_server(server),
            match_info: RouteMatchInfo::empty(),
        });
    }

    let root = server
        .root()
        .ok_or_else(|| RouteError::RouteNotFound(uri_path.to_string()))?;
    let index_file = server
        .index_files()
        .first()
        .map(String::as_str)
        .unwrap_or(DEFAULT_INDEX_FILE);

    let resolved = PathResolver::resolve(uri_path, root, index_file)?;
    Ok(RoutedRequest {
        server,
        location: None,
        route: Route::for_server(server),
        match_info: build_match_info(resolved, query_params)?,
    })
}

fn build_match_info(
    resolved: PathBuf,
    query_params: IndexMap<String, String>,
) -> Result<RouteMatchInfo, RouteError> {
    if resolved.is_dir() {
        Ok(RouteMatchInfo::for_directory(resolved, query_params))
    } else {
        RouteMatchInfo::for_file(resolved, query_params)
    }
}

use std::fs;

use crate::config::config;
use crate::config::server::ServerConfig;
use crate::http::response::{HttpResponse, ResponseHeader};
use crate::http::status::HttpStatus;
use crate::routing::{PathResolver, Route, RouteError, DEFAULT_INDEX_FILE};

/// Canned HTML error body, used when no error page is configured or the
/// configured one cannot be served.
pub fn canned_error(status: HttpStatus) -> HttpResponse {
    let mut res = HttpResponse::with_status(status);
    let body = format!("<h1>{} {}</h1>", status.code(), status.reason()).into_bytes();
    res.set_body(body, "text/html");
    res
}

pub fn not_implemented() -> HttpResponse {
    canned_error(HttpStatus::NotImplemented)
}

/// Error response honoring the server's `error_page` table (then the global
/// one) before falling back to the canned body. Never leaks filesystem
/// details: a page that fails to resolve silently degrades to the canned
/// error.
pub fn error_response(status: HttpStatus, server: Option<&ServerConfig>) -> HttpResponse {
    let page_uri = server
        .and_then(|s| s.error_page(status.code()))
        .or_else(|| config().error_page(status.code()));

    if let (Some(uri), Some(root)) = (page_uri, server.and_then(ServerConfig::root)) {
        if let Ok(resolved) = PathResolver::resolve(uri, root, DEFAULT_INDEX_FILE) {
            if let Ok(body) = fs::read(&resolved) {
                let mut res = HttpResponse::with_status(status);
                let mime = config().mime_type_for(&resolved).to_string();
                res.set_body(body, &mime);
                return res;
            }
        }
    }
    canned_error(status)
}

/// Maps a routing failure to its HTTP response, with the `Allow` header on
/// 405s.
pub fn routing_error(err: &RouteError, server: Option<&ServerConfig>) -> HttpResponse {
    let mut res = error_response(err.status(), server);
    if let RouteError::MethodNotAllowed { allowed, .. } = err {
        let list = allowed
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        res.set_header(ResponseHeader::Allow, &list);
    }
    res
}

/// Response for a `return <code> <target>;` route.
pub fn redirect(route: &Route) -> HttpResponse {
    let Some((target, code)) = route.redirect() else {
        return canned_error(HttpStatus::InternalServerError);
    };
    let status = HttpStatus::from_redirect_code(code).unwrap_or(HttpStatus::Found);
    let mut res = HttpResponse::with_status(status);
    res.set_header(ResponseHeader::Location, target);
    res.set_header(ResponseHeader::ContentLength, "0");
    res
}

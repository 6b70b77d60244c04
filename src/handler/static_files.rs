use std::fs;
use std::io::ErrorKind::*;

use log::debug;

use crate::config::config;
use crate::http::response::HttpResponse;
use crate::http::status::HttpStatus;
use crate::routing::RoutedRequest;

/// Serves the filesystem target the routing engine resolved.
pub fn serve(routed: &RoutedRequest) -> HttpResponse {
    let info = &routed.match_info;

    if info.is_directory() {
        // the resolver found no index file; listing is opt-in
        if routed.route.autoindex() {
            return listing(routed);
        }
        return HttpResponse::with_status(HttpStatus::Forbidden);
    }

    let path = info.resolved_path();
    debug!("serving static file: {}", path.display());

    let body = match fs::read(path) {
        Ok(body) => body,
        Err(err) => {
            return HttpResponse::with_status(match err.kind() {
                NotFound => HttpStatus::NotFound,
                PermissionDenied => HttpStatus::Forbidden,
                _ => HttpStatus::InternalServerError,
            });
        }
    };

    let mut res = HttpResponse::new();
    let mime = config().mime_type_for(path).to_string();
    res.set_body(body, &mime);
    res
}

/// Minimal autoindex: entry names only, nothing about the filesystem layout
/// beyond the requested directory.
fn listing(routed: &RoutedRequest) -> HttpResponse {
    let dir = routed.match_info.resolved_path();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return HttpResponse::with_status(HttpStatus::Forbidden),
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    let mut body = String::from("<html><body><ul>\n");
    for name in names {
        body.push_str(&format!("<li>{}</li>\n", name));
    }
    body.push_str("</ul></body></html>\n");

    let mut res = HttpResponse::new();
    res.set_body(body.into_bytes(), "text/html");
    res
}

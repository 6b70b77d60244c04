use log::debug;

use crate::config::config;
use crate::handler::responses;
use crate::handler::static_files;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::routing::{self, HandlerType};

/// Hands the request to the routing engine and dispatches on the handler
/// type it picked.
pub fn route(req: &HttpRequest, port: u16) -> HttpResponse {
    let host = req.host().unwrap_or_default();

    let routed = match routing::route_request(
        config(),
        &host,
        port,
        req.method,
        &req.path,
        req.query_params.clone(),
        req.body.len() as u64,
    ) {
        Ok(routed) => routed,
        Err(err) => {
            debug!("routing failed for {} {}: {}", req.method, req.path, err);
            // re-select the server so its error_page table can be honored
            let server = config().select_server(&host, port);
            return responses::routing_error(&err, server);
        }
    };

    let mut res = match routed.route.handler() {
        HandlerType::Static => static_files::serve(&routed),
        HandlerType::Redirect => responses::redirect(&routed.route),
        // execution of CGI scripts and upload storage live outside this
        // server; the engine still routed and validated the request
        HandlerType::Cgi | HandlerType::Upload => responses::not_implemented(),
    };

    if res.status.is_error() {
        return responses::error_response(res.status, Some(routed.server));
    }
    if let Some(location) = routed.location {
        for (name, value) in location.custom_headers() {
            res.headers.set_raw(name, value);
        }
    }
    res
}

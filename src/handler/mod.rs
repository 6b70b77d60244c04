mod middleware;
mod responses;
mod router;
mod static_files;

use crate::config::config;
use crate::http::request::HttpRequest;
use crate::http::response::{HttpResponse, ResponseHeader};
use crate::http::status::HttpStatus;

/// Routes the request and decorates the response with the ambient headers
/// every reply carries.
pub fn handle_request(req: &HttpRequest, port: u16) -> HttpResponse {
    let mut res = router::route(req, port);
    middleware::apply(req, &mut res);
    finalize(&mut res);
    res
}

pub fn handle_error(err: HttpStatus) -> HttpResponse {
    let mut res = responses::canned_error(err);
    finalize(&mut res);
    res
}

fn finalize(res: &mut HttpResponse) {
    res.set_header(
        ResponseHeader::Date,
        &httpdate::fmt_http_date(std::time::SystemTime::now()),
    );
    res.set_header(ResponseHeader::Server, config().server_name());
}

//! An nginx-style HTTP server built around a request routing and path
//! resolution engine.
//!
//! The heart of the crate is the chain
//! [`config::HttpConfig::select_server`] →
//! [`config::ServerConfig::find_location`] →
//! [`routing::route_request`] → [`routing::PathResolver`]: for every inbound
//! request it deterministically decides which virtual server and which
//! location govern the request, then computes a filesystem target that is
//! provably contained inside the configured root.

pub mod config;
pub mod handler;
pub mod http;
pub mod net;
pub mod routing;

//! Core HTTP server implementation.
//!
//! This module implements the low-level HTTP server runtime.
//! It is responsible only for networking concerns such as:
//! - accepting TCP connections on every configured listen binding,
//! - reading raw bytes from the network,
//! - writing raw bytes back to the client.
//!
//! Higher-level HTTP semantics—request parsing, validation, routing through
//! the virtual-server engine, and response generation—are intentionally
//! delegated to other modules in the `http`, `routing` and `handler`
//! namespaces.
//!
//! The server is fully asynchronous and leverages the `async-std` crate
//! to provide non-blocking I/O and concurrent client handling.
//!
//! ## Request handling flow
//!
//! The typical lifecycle of a client connection is as follows:
//!
//! 1. Accept a TCP connection on one of the bound listeners
//! 2. Read raw data from the stream
//! 3. Incrementally parse the data into an [`HttpRequest`]
//!    (delegated to [`http::parser::RequestParser`](crate::http::parser::RequestParser))
//! 4. Validate the request
//!    (delegated to [`http::validator::Validator`](crate::http::validator::Validator))
//! 5. Route and generate an [`HttpResponse`]
//!    (delegated to [`handler::handle_request`](crate::handler::handle_request),
//!    which drives the routing engine with the listener's port and the
//!    request's Host header)
//! 6. Serialize and write the response back to the client
//!
//! Errors at any stage result in appropriate HTTP error responses
//! being generated and sent back to the client.

use async_std::net::{TcpListener, TcpStream};
use async_std::prelude::*;
use async_std::task;
use indexmap::IndexSet;
use log::{debug, info, warn};

use crate::config::config;
use crate::handler;
use crate::http::parser::{ParseError, ParseOutcome, RequestParser};
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::validator::{Validator, ValidatorError};

pub struct Server;

/// Errors that can occur while reading and parsing an HTTP request from the stream
/// used to interrupt the flow and return appropriate responses.
enum ReadError {
    Io(std::io::Error),
    ConnectionClosed,
    Parser(ParseError),
    Validator(ValidatorError),
}

impl Server {
    /// Starts the HTTP server: one listener per unique binding across all
    /// configured virtual servers, each accepting indefinitely.
    pub async fn run() -> std::io::Result<()> {
        let mut bindings: IndexSet<(String, u16)> = IndexSet::new();
        for server in config().servers() {
            for directive in server.listen_directives() {
                bindings.insert((directive.host().to_string(), directive.port()));
            }
        }

        let mut listeners = Vec::new();
        for (host, port) in bindings {
            let listener = TcpListener::bind((host.as_str(), port)).await?;
            info!("listening on {}:{}", host, port);
            listeners.push(task::spawn(Self::accept_loop(listener, port)));
        }

        for listener in listeners {
            listener.await?;
        }
        Ok(())
    }

    async fn accept_loop(listener: TcpListener, port: u16) -> std::io::Result<()> {
        while let Ok((stream, _addr)) = listener.accept().await {
            task::spawn(Self::handle_client(stream, port));
        }
        Ok(())
    }

    /// Reads and incrementally parses an HTTP request from the TCP stream.
    ///
    /// The request is parsed as data becomes available. Once all headers are
    /// read, the request is validated. If a body is expected, it is read
    /// until completion.
    ///
    /// Returns a fully constructed [`HttpRequest`] or a [`ReadError`] in case
    /// of I/O, parsing, or validation failure.
    async fn read_request(stream: &mut TcpStream) -> Result<HttpRequest, ReadError> {
        let mut parser = RequestParser::new();
        let mut req = HttpRequest::new();
        let mut buffer = vec![0; config().buffer_size()];

        loop {
            let outcome = if parser.is_buffer_empty() && !parser.is_done() {
                let n = match stream.read(&mut buffer).await {
                    Ok(0) => return Err(ReadError::ConnectionClosed),
                    Ok(n) => n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(ReadError::Io(e)),
                };
                parser.feed(&buffer[..n], &mut req).map_err(ReadError::Parser)?
            } else {
                // Continue parsing using any remaining buffered data.
                // Feeding an empty slice allows the parser to progress
                // without requiring a new network read.
                parser.feed(&[], &mut req).map_err(ReadError::Parser)?
            };

            match outcome {
                ParseOutcome::Incomplete => continue,
                ParseOutcome::HeadersDone => {
                    // All headers have been parsed.
                    // Validate the request early, before reading the body.
                    Validator::validate_request(&req).map_err(ReadError::Validator)?;

                    if parser.is_done() {
                        break; // no body expected
                    }
                    // Continue the loop to read and parse the request body.
                    continue;
                }
                ParseOutcome::Done => break, // request is fully parsed
            }
        }

        Ok(req)
    }

    /// Writes the given `HttpResponse` back to the TCP stream.
    /// Serializes the response headers and body appropriately.
    async fn write_response(
        stream: &mut TcpStream,
        response: &HttpResponse,
    ) -> std::io::Result<()> {
        let headers = response.build_headers();
        stream.write_all(headers.as_bytes()).await?;
        stream.write_all(&response.body).await?;
        Ok(())
    }

    /// Handles a single client connection.
    /// Reads the HTTP request, processes it via the handler, and writes back
    /// the response.
    async fn handle_client(mut stream: TcpStream, port: u16) -> std::io::Result<()> {
        let response = match Self::read_request(&mut stream).await {
            Ok(req) => {
                debug!("{} {} on port {}", req.method, req.path, port);
                handler::handle_request(&req, port)
            }
            Err(ReadError::Io(err)) => {
                warn!("I/O error while reading request: {:?}", err);
                return Ok(());
            }
            Err(ReadError::ConnectionClosed) => return Ok(()),
            Err(ReadError::Parser(err)) => handler::handle_error(err.into_http_status()),
            Err(ReadError::Validator(err)) => handler::handle_error(err.into_http_status()),
        };

        Self::write_response(&mut stream, &response).await
    }
}

use indexmap::IndexMap;

use crate::config::config;
use crate::http::request::*;
use crate::http::status::HttpStatus;
use crate::http::*;

const PARSER_BUF_CAP: usize = 16384;
const HTTP_METHOD_MAX_LEN: usize = 7;

/// Parse errors mapped to HTTP statuses at the connection layer.
///
/// To keep parser logic separate from HTTP status codes, direct http error
/// codes are not used here but mapped later.
#[derive(PartialEq, Debug)]
pub enum ParseError {
    // 400 Bad Request
    Malformed,

    // 413 Payload Too Large
    PayloadTooLarge,

    // 414 URI Too Long
    TooLongUri,

    // 505 HTTP Version Not Supported
    HttpVersionNotSupported,
}

impl ParseError {
    pub fn into_http_status(self) -> HttpStatus {
        match self {
            ParseError::Malformed => HttpStatus::BadRequest,
            ParseError::PayloadTooLarge => HttpStatus::PayloadTooLarge,
            ParseError::TooLongUri => HttpStatus::UriTooLong,
            ParseError::HttpVersionNotSupported => HttpStatus::HttpVersionNotSupported,
        }
    }
}

#[derive(PartialEq, Debug)]
pub enum ParseOutcome {
    /// Progress was made, keep feeding.
    Incomplete,
    /// All headers are parsed; the request line and headers are usable.
    HeadersDone,
    /// The full request, body included, is parsed.
    Done,
}

#[derive(PartialEq, PartialOrd)]
enum ParserState {
    RequestLine,
    Headers,
    Body,
    Done,
}

pub struct RequestParser {
    buf: [u8; PARSER_BUF_CAP],
    buf_len: usize,
    state: ParserState,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            buf: [0; PARSER_BUF_CAP],
            buf_len: 0,
            state: ParserState::RequestLine,
        }
    }

    pub fn is_buffer_empty(&self) -> bool {
        self.buf_len == 0
    }

    pub fn is_done(&self) -> bool {
        self.state == ParserState::Done
    }

    /// Feeds newly read bytes and advances the state machine as far as the
    /// buffered data allows.
    pub fn feed(
        &mut self,
        buf: &[u8],
        req: &mut HttpRequest,
    ) -> Result<ParseOutcome, ParseError> {
        // Basic overflow check for request line and headers
        if self.state < ParserState::Body && self.buf_len + buf.len() >= PARSER_BUF_CAP {
            return Err(ParseError::Malformed);
        }
        if !buf.is_empty() {
            self.buf[self.buf_len..self.buf_len + buf.len()].copy_from_slice(buf);
            self.buf_len += buf.len();
        }

        loop {
            match self.state {
                ParserState::RequestLine => {
                    match self.parse_request_line(req)? {
                        ParseOutcome::Incomplete if self.state == ParserState::RequestLine => {
                            return Ok(ParseOutcome::Incomplete);
                        }
                        _ => continue,
                    }
                }
                ParserState::Headers => {
                    match self.parse_headers(req)? {
                        ParseOutcome::Incomplete if self.state == ParserState::Headers => {
                            return Ok(ParseOutcome::Incomplete);
                        }
                        _ => return Ok(ParseOutcome::HeadersDone),
                    }
                }
                ParserState::Body => return self.parse_body(req),
                ParserState::Done => return Ok(ParseOutcome::Done),
            }
        }
    }

    fn parse_request_line(&mut self, req: &mut HttpRequest) -> Result<ParseOutcome, ParseError> {
        // Look for end of request line \r\n
        let Some(mut request_line_end) = find_crlf(&self.buf[..self.buf_len]) else {
            return Ok(ParseOutcome::Incomplete);
        };

        // Request line: METHOD TARGET HTTP/VERSION
        let request_line = &self.buf[..request_line_end];
        let parts: Vec<&[u8]> = request_line.split(|&b| b == b' ').collect();
        if parts.len() != 3 {
            return Err(ParseError::Malformed);
        }

        if parts[0].len() > HTTP_METHOD_MAX_LEN {
            return Err(ParseError::Malformed);
        }

        let method = std::str::from_utf8(parts[0]).unwrap_or("").to_uppercase();
        let method = match http_method_from_str(&method) {
            HttpMethod::Unknown => return Err(ParseError::Malformed),
            m => m,
        };

        let target = std::str::from_utf8(parts[1]).unwrap_or("");
        if target.len() > config().max_path_size() {
            return Err(ParseError::TooLongUri);
        }

        let version = std::str::from_utf8(parts[2]).unwrap_or("");
        let (major, minor) = version
            .strip_prefix("HTTP/")
            .and_then(|v| v.split_once('.'))
            .and_then(|(maj, min)| Some((maj.parse::<u8>().ok()?, min.parse::<u8>().ok()?)))
            .ok_or(ParseError::Malformed)?;
        if !(major == 1 && (minor == 0 || minor == 1)) {
            return Err(ParseError::HttpVersionNotSupported);
        }

        req.method = method;
        parse_target(target, req)?;
        req.http_version = (major, minor);

        // Adjust request line end to point after \r\n
        request_line_end += 2;
        let remaining = self.buf_len - request_line_end;

        // Successfully parsed request line
        // Update parser state and remove parsed line from the buffer
        self.state = ParserState::Headers;
        self.buf.copy_within(request_line_end..self.buf_len, 0);
        self.buf_len = remaining;

        Ok(ParseOutcome::Incomplete)
    }

    fn parse_headers(&mut self, req: &mut HttpRequest) -> Result<ParseOutcome, ParseError> {
        // Look for end of headers \r\n\r\n
        let Some(mut headers_end) = find_double_crlf(&self.buf[..self.buf_len]) else {
            return Ok(ParseOutcome::Incomplete);
        };

        if headers_end > config().max_header_size() {
            return Err(ParseError::Malformed);
        }

        // Parse headers line by line
        let headers = &self.buf[..headers_end];
        for line in headers.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let mut it = line.splitn(2, |&b| b == b':');
            let name = it.next().unwrap_or(b"");
            let value = it.next().ok_or(ParseError::Malformed)?;

            let name = std::str::from_utf8(name).unwrap_or("").trim();
            let value = std::str::from_utf8(value).unwrap_or("").trim();
            match name.to_lowercase().as_str() {
                "host" => req.set_header(RequestHeader::Host, value),
                "content-length" => {
                    let content_len: usize =
                        value.parse().map_err(|_| ParseError::Malformed)?;
                    if content_len > config().max_body_size() {
                        return Err(ParseError::PayloadTooLarge);
                    }
                    req.set_header(RequestHeader::ContentLength, value);
                }
                "content-type" => req.set_header(RequestHeader::ContentType, value),
                _ => {}
            }
        }

        if !req.headers.contains("Host") {
            return Err(ParseError::Malformed);
        }

        // Adjust headers end to point after \r\n\r\n
        headers_end += 4;
        let remaining = self.buf_len - headers_end;

        // Successfully parsed headers
        // Update parser state and remove parsed headers from the buffer
        self.state = if req.headers.contains("Content-Length") {
            ParserState::Body
        } else {
            ParserState::Done
        };
        self.buf.copy_within(headers_end..self.buf_len, 0);
        self.buf_len = remaining;
        Ok(ParseOutcome::HeadersDone)
    }

    fn parse_body(&mut self, req: &mut HttpRequest) -> Result<ParseOutcome, ParseError> {
        let content_length = req.content_length().unwrap_or(0);
        let to_copy = std::cmp::min(self.buf_len, content_length - req.body.len());

        req.body.extend_from_slice(&self.buf[..to_copy]);
        self.buf.copy_within(to_copy..self.buf_len, 0);
        self.buf_len -= to_copy;

        if req.body.len() == content_length {
            self.state = ParserState::Done;
            return Ok(ParseOutcome::Done);
        }

        Ok(ParseOutcome::Incomplete)
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == b"\r\n")
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|quad| quad == b"\r\n\r\n")
}

/// Splits the request target into a decoded path and parsed query params.
fn parse_target(target: &str, req: &mut HttpRequest) -> Result<(), ParseError> {
    let (path_part, query_part) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    req.path = percent_decode(path_part)?;
    if let Some(query) = query_part {
        req.query_params = parse_query(query)?;
    }
    Ok(())
}

fn parse_query(query: &str) -> Result<IndexMap<String, String>, ParseError> {
    let mut params = IndexMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = percent_decode(key)?;
        if key.is_empty() {
            continue;
        }
        params.insert(key, percent_decode(value)?);
    }
    Ok(params)
}

fn percent_decode(input: &str) -> Result<String, ParseError> {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3).ok_or(ParseError::Malformed)?;
            let hex = std::str::from_utf8(hex).map_err(|_| ParseError::Malformed)?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| ParseError::Malformed)?;
            decoded.push(byte);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).map_err(|_| ParseError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_percent_sequences() {
        assert_eq!(percent_decode("/a%20b").unwrap(), "/a b");
        assert_eq!(percent_decode("plain").unwrap(), "plain");
        assert!(percent_decode("/bad%2").is_err());
        assert!(percent_decode("/bad%zz").is_err());
    }

    #[test]
    fn splits_query_params() {
        let params = parse_query("a=1&b=two&flag").unwrap();
        assert_eq!(params.get("a").unwrap(), "1");
        assert_eq!(params.get("b").unwrap(), "two");
        assert_eq!(params.get("flag").unwrap(), "");
    }

    #[test]
    fn target_split() {
        let mut req = HttpRequest::new();
        parse_target("/search%20page?q=cats&page=2", &mut req).unwrap();
        assert_eq!(req.path, "/search page");
        assert_eq!(req.query_params.get("q").unwrap(), "cats");
        assert_eq!(req.query_params.get("page").unwrap(), "2");
    }
}

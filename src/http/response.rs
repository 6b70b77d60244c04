use crate::http::headers::HttpHeaders;
use crate::http::status::HttpStatus;

pub enum ResponseHeader {
    ContentLength,
    ContentType,
    ContentEncoding,
    Connection,
    Location,
    Allow,
    Date,
    Server,
}

pub struct HttpResponse {
    pub status: HttpStatus,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self {
            status: HttpStatus::Ok,
            headers: HttpHeaders::new(),
            body: Vec::new(),
        }
    }

    pub fn with_status(status: HttpStatus) -> Self {
        let mut res = Self::new();
        res.status = status;
        res
    }

    pub fn set_header(&mut self, h: ResponseHeader, value: &str) {
        let name = match h {
            ResponseHeader::ContentType => "Content-Type",
            ResponseHeader::ContentLength => "Content-Length",
            ResponseHeader::ContentEncoding => "Content-Encoding",
            ResponseHeader::Connection => "Connection",
            ResponseHeader::Location => "Location",
            ResponseHeader::Allow => "Allow",
            ResponseHeader::Date => "Date",
            ResponseHeader::Server => "Server",
        };

        self.headers.set_raw(name, value);
    }

    pub fn set_body(&mut self, body: Vec<u8>, content_type: &str) {
        self.set_header(ResponseHeader::ContentLength, &body.len().to_string());
        self.set_header(ResponseHeader::ContentType, content_type);
        self.body = body;
    }

    /// Serializes the status line and headers.
    ///
    /// HTTP <major>.<minor> <status> <reason>\r\n
    /// <header_name>: <header_value>\r\n
    /// ...
    /// \r\n
    pub fn build_headers(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\n{}\r\n",
            self.status.code(),
            self.status.reason(),
            self.headers.stringify(),
        )
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

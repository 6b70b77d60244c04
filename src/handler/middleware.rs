use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use std::io::Write;

use crate::http::request::HttpRequest;
use crate::http::response::{HttpResponse, ResponseHeader};

// Algorithms for body compression as listed in MDN
#[allow(dead_code)]
pub enum CompressionAlgorithm {
    Gzip,
    Compress,
    Deflate,
    Br,
    Zstd,
    Identity,
}

impl CompressionAlgorithm {
    pub fn as_str(&self) -> &str {
        match self {
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Compress => "compress",
            CompressionAlgorithm::Deflate => "deflate",
            CompressionAlgorithm::Br => "br",
            CompressionAlgorithm::Zstd => "zstd",
            CompressionAlgorithm::Identity => "identity",
        }
    }
}

#[allow(dead_code)]
pub enum CompressionError {
    Io(std::io::Error),
    UnsupportedAlgorithm,
}

/// Compresses the response body when the client advertises gzip support.
pub fn apply(req: &HttpRequest, res: &mut HttpResponse) {
    if res.body.is_empty() {
        return;
    }
    let accepts_gzip = req
        .headers
        .get("Accept-Encoding")
        .map(|value| value.contains("gzip"))
        .unwrap_or(false);
    if !accepts_gzip {
        return;
    }
    match compress_body(res, CompressionAlgorithm::Gzip) {
        Ok(_) => (),
        Err(CompressionError::Io(err)) => log::warn!("compression IO error: {}", err),
        Err(CompressionError::UnsupportedAlgorithm) => {
            log::warn!("unsupported compression algorithm")
        }
    }
}

fn compress_body(
    res: &mut HttpResponse,
    algo: CompressionAlgorithm,
) -> Result<(), CompressionError> {
    match algo {
        CompressionAlgorithm::Gzip => {
            let mut e = GzEncoder::new(Vec::new(), Compression::default());
            e.write_all(&res.body).map_err(CompressionError::Io)?;
            res.body = e.finish().map_err(CompressionError::Io)?;
        }
        CompressionAlgorithm::Deflate => {
            let mut e = DeflateEncoder::new(Vec::new(), Compression::default());
            e.write_all(&res.body).map_err(CompressionError::Io)?;
            res.body = e.finish().map_err(CompressionError::Io)?;
        }
        _ => return Err(CompressionError::UnsupportedAlgorithm),
    }

    res.set_header(ResponseHeader::ContentEncoding, algo.as_str());
    res.set_header(ResponseHeader::ContentLength, &res.body.len().to_string());
    Ok(())
}

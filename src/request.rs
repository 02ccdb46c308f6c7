use std::io::{self, BufRead, Read};

use headers::HeaderMapExt;
use http::{Method, Request, Version};
use thiserror::Error;

use crate::body::Body;

/// Request bodies above this size are refused.
pub const MAX_BODY_SIZE: u64 = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("io error")]
    Io(#[from] io::Error),
    #[error("invalid request")]
    Invalid(#[from] httparse::Error),
    #[error("incomplete request")]
    IncompleteRequest,
    #[error("unsupported http version: {0}")]
    UnsupportedHttpVersion(u8),
    #[error("unsupported Transfer-Encoding")]
    UnsupportedTransferEncoding,
    #[error("request body of {0} bytes is too large")]
    BodyTooLarge(u64),
    #[error("invalid header")]
    InvalidHeader(#[from] headers::Error),
    #[error("failed to parse http request")]
    Unknown,
}

impl ParseError {
    /// Whether the client deserves a `400 Bad Request` before we hang up.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ParseError::ConnectionClosed | ParseError::Io(_))
    }
}

fn is_idle_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

pub(crate) fn parse_request(stream: &mut impl BufRead) -> Result<Request<Body>, ParseError> {
    let mut buf = Vec::with_capacity(800);

    loop {
        match stream.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            // Idle keep-alive connections are closed quietly
            Err(err) if buf.is_empty() && is_idle_timeout(&err) => {
                return Err(ParseError::ConnectionClosed)
            }
            Err(err) => return Err(err.into()),
        }

        match buf.as_slice() {
            [.., b'\r', b'\n', b'\r', b'\n'] => break,
            [.., b'\n', b'\n'] => break,
            _ => continue,
        }
    }

    if buf.is_empty() {
        return Err(ParseError::ConnectionClosed);
    }

    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut headers);

    if req.parse(&buf)?.is_partial() {
        return Err(ParseError::IncompleteRequest);
    }

    let method = req
        .method
        .map(|method| method.as_bytes())
        .ok_or(ParseError::IncompleteRequest)?;

    let path = req.path.ok_or(ParseError::IncompleteRequest)?;

    let version = match req.version.ok_or(ParseError::IncompleteRequest)? {
        0 => Version::HTTP_10,
        1 => Version::HTTP_11,
        version => return Err(ParseError::UnsupportedHttpVersion(version)),
    };

    let request = Request::builder()
        .method(Method::from_bytes(method).map_err(|_| ParseError::IncompleteRequest)?)
        .uri(path)
        .version(version);

    let request = req
        .headers
        .iter()
        .fold(request, |request, header| request.header(header.name, header.value));

    let headers = request.headers_ref().ok_or(ParseError::Unknown)?;

    if headers.contains_key(http::header::TRANSFER_ENCODING) {
        return Err(ParseError::UnsupportedTransferEncoding);
    }

    let body = match headers.typed_try_get::<headers::ContentLength>()? {
        Some(len) if len.0 > MAX_BODY_SIZE => return Err(ParseError::BodyTooLarge(len.0)),
        Some(len) if len.0 > 0 => {
            let mut buf = vec![0_u8; len.0 as usize];
            stream.read_exact(&mut buf)?;
            Body::from(buf)
        }
        _ => Body::empty(),
    };

    request.body(body).map_err(|_| ParseError::Unknown)
}

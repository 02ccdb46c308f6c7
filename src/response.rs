use std::io::{self, Write};

use headers::HeaderMapExt;
use http::{Response, Version};

use crate::body::Body;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    KeepAlive,
    Close,
}

pub(crate) fn write_response(res: Response<Body>, stream: &mut impl Write) -> io::Result<Outcome> {
    let (mut parts, body) = res.into_parts();

    let version = match parts.version {
        Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    };

    // Informational responses never carry a body
    if !parts.status.is_informational() {
        parts
            .headers
            .typed_insert(headers::ContentLength(body.len() as u64));
    }

    let outcome = match parts.headers.typed_get::<headers::Connection>() {
        Some(conn) if conn.contains("close") => Outcome::Close,
        _ => Outcome::KeepAlive,
    };

    stream.write_all(format!("{version} {}\r\n", parts.status).as_bytes())?;

    for (name, val) in parts.headers.iter() {
        stream.write_all(&[format!("{name}: ").as_bytes(), val.as_bytes(), b"\r\n"].concat())?;
    }

    stream.write_all(b"\r\n")?;
    stream.write_all(body.as_bytes())?;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use http::StatusCode;

    #[test]
    fn writes_responses_without_bodies() {
        let res = Response::builder()
            .status(StatusCode::OK)
            .header("some", "header")
            .body(Body::empty())
            .unwrap();

        let mut output: Cursor<Vec<u8>> = Cursor::new(Vec::new());
        let outcome = write_response(res, &mut output).unwrap();

        assert_eq!(outcome, Outcome::KeepAlive);
        assert_eq!(
            output.get_ref(),
            b"HTTP/1.1 200 OK\r\nsome: header\r\ncontent-length: 0\r\n\r\n"
        );
    }

    #[test]
    fn writes_responses_with_bodies() {
        let res = Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(42_u64))
            .unwrap();

        let mut output: Cursor<Vec<u8>> = Cursor::new(Vec::new());
        write_response(res, &mut output).unwrap();

        assert_eq!(
            output.get_ref(),
            b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\n42"
        );
    }

    #[test]
    fn keeps_the_request_version() {
        let res = Response::builder()
            .version(Version::HTTP_10)
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap();

        let mut output: Cursor<Vec<u8>> = Cursor::new(Vec::new());
        write_response(res, &mut output).unwrap();

        assert!(output.get_ref().starts_with(b"HTTP/1.0 404 Not Found\r\n"));
    }

    #[test]
    fn closes_when_asked_to() {
        let res = Response::builder()
            .header("connection", "close")
            .body(Body::from("bye"))
            .unwrap();

        let outcome = write_response(res, &mut Cursor::new(Vec::new())).unwrap();

        assert_eq!(outcome, Outcome::Close);
    }
}

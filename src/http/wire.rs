//! HTTP/1.x request head parser and response encoder
//!
//! # Request head
//!
//! ```text
//! [METHOD] SP [TARGET] SP "HTTP/" [VERSION] CRLF
//! ([NAME] ":" [VALUE] CRLF)*
//! CRLF
//! ```
//!
//! Lines must end with exactly `CRLF` and the head must be valid `UTF-8`.
//! The body is not part of the head: its length is reported by
//! [`RequestHead::content_length`] and read by the transport.
//!
//! # Response
//!
//! Responses are written with a `content-length` header, or with
//! `transfer-encoding: chunked` for chunked responses.

use crate::http::types::{StatusCode, Version};
use memchr::{memchr, memmem};
use thiserror::Error;

/// Errors found while parsing a request head.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("request head is incomplete")]
    Incomplete,

    #[error("invalid request line")]
    InvalidRequestLine,

    #[error("unsupported HTTP version")]
    UnsupportedVersion,

    #[error("invalid header line")]
    InvalidHeader,

    #[error("too many headers (limit {0})")]
    TooManyHeaders(usize),

    #[error("invalid content-length")]
    InvalidContentLength,

    #[error("request head is not valid UTF-8")]
    NotUtf8,
}

/// Parsed request line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub version: Version,
    /// Header lines in arrival order, names as sent.
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Parses a request head from the start of `buf`.
    ///
    /// Returns the head and the number of bytes it occupied, so the caller
    /// can hand the rest of the buffer to the body reader.
    ///
    /// # Examples
    /// ```
    /// use maker_conn::http::wire::{RequestHead, WireError};
    ///
    /// let raw = b"GET /users?page=2 HTTP/1.1\r\nHost: example.com\r\n\r\nrest";
    /// let (head, len) = RequestHead::parse(raw, 16).unwrap();
    ///
    /// assert_eq!(head.method, "GET");
    /// assert_eq!(head.target, "/users?page=2");
    /// assert_eq!(&raw[len..], b"rest");
    ///
    /// assert_eq!(RequestHead::parse(b"GET / HTTP/1.1\r\n", 16), Err(WireError::Incomplete));
    /// ```
    pub fn parse(buf: &[u8], header_limit: usize) -> Result<(Self, usize), WireError> {
        let end = memmem::find(buf, b"\r\n\r\n").ok_or(WireError::Incomplete)?;
        let head = simdutf8::basic::from_utf8(&buf[..end]).map_err(|_| WireError::NotUtf8)?;

        let mut lines = head.split("\r\n");
        let (method, target, version) = Self::parse_request_line(lines.next().unwrap_or(""))?;

        let mut headers = Vec::new();
        for line in lines {
            if headers.len() >= header_limit {
                return Err(WireError::TooManyHeaders(header_limit));
            }
            if line.contains('\r') || line.contains('\n') {
                return Err(WireError::InvalidHeader);
            }

            let colon = memchr(b':', line.as_bytes()).ok_or(WireError::InvalidHeader)?;
            let name = &line[..colon];
            if name.is_empty() || name.contains(' ') {
                return Err(WireError::InvalidHeader);
            }
            headers.push((name.to_owned(), line[colon + 1..].trim().to_owned()));
        }

        let head = RequestHead {
            method: method.to_owned(),
            target: target.to_owned(),
            version,
            headers,
        };
        Ok((head, end + 4))
    }

    fn parse_request_line(line: &str) -> Result<(&str, &str, Version), WireError> {
        let mut parts = line.split(' ');
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(WireError::InvalidRequestLine);
        };

        if method.is_empty() || !method.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(WireError::InvalidRequestLine);
        }
        if !target.starts_with('/') {
            return Err(WireError::InvalidRequestLine);
        }
        let version = Version::from_bytes(version.as_bytes()).ok_or(WireError::UnsupportedVersion)?;

        Ok((method, target, version))
    }

    /// Length of the request body announced by the head.
    pub fn content_length(&self) -> Result<Option<usize>, WireError> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .map(|(_, value)| value.parse().map_err(|_| WireError::InvalidContentLength))
            .transpose()
    }
}

/// Writes a complete response with a `content-length` header.
pub(crate) fn encode_response(
    out: &mut Vec<u8>,
    version: Version,
    status: u16,
    headers: &[(String, String)],
    body: &[u8],
) {
    encode_head(out, version, status, headers);
    out.extend_from_slice(b"content-length: ");
    out.extend_from_slice(body.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n\r\n");
    out.extend_from_slice(body);
}

/// Writes the head of a chunked response.
pub(crate) fn encode_chunked_head(
    out: &mut Vec<u8>,
    version: Version,
    status: u16,
    headers: &[(String, String)],
) {
    encode_head(out, version, status, headers);
    out.extend_from_slice(b"transfer-encoding: chunked\r\n\r\n");
}

/// Writes one chunk. Empty data writes nothing, the empty chunk ends the body.
pub(crate) fn encode_chunk(out: &mut Vec<u8>, data: &[u8]) {
    if data.is_empty() {
        return;
    }
    out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

#[inline(always)]
pub(crate) fn encode_last_chunk(out: &mut Vec<u8>) {
    out.extend_from_slice(b"0\r\n\r\n");
}

fn encode_head(out: &mut Vec<u8>, version: Version, status: u16, headers: &[(String, String)]) {
    out.extend_from_slice(version.as_str().as_bytes());
    out.extend_from_slice(format!(" {status} ").as_bytes());
    out.extend_from_slice(StatusCode::reason(status).unwrap_or("").as_bytes());
    out.extend_from_slice(b"\r\n");

    for (name, value) in headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
}

#[cfg(test)]
mod parse_tests {
    use super::*;

    #[test]
    fn valid() {
        let raw = b"POST /api/users?x=1 HTTP/1.0\r\nContent-Type: text/plain\r\nContent-Length: 5\r\nX-Empty:\r\n\r\nhello";
        let (head, len) = RequestHead::parse(raw, 8).unwrap();

        assert_eq!(head.method, "POST");
        assert_eq!(head.target, "/api/users?x=1");
        assert_eq!(head.version, Version::Http10);
        assert_eq!(
            head.headers,
            [
                ("Content-Type".to_owned(), "text/plain".to_owned()),
                ("Content-Length".to_owned(), "5".to_owned()),
                ("X-Empty".to_owned(), String::new()),
            ]
        );
        assert_eq!(head.content_length(), Ok(Some(5)));
        assert_eq!(&raw[len..], b"hello");
    }

    #[test]
    fn invalid() {
        #[rustfmt::skip]
        let cases: [(&[u8], WireError); 9] = [
            (b"GET / HTTP/1.1\r\nHost: a\r\n",            WireError::Incomplete),
            (b"GET /\r\n\r\n",                             WireError::InvalidRequestLine),
            (b"get / HTTP/1.1\r\n\r\n",                    WireError::InvalidRequestLine),
            (b"GET  / HTTP/1.1\r\n\r\n",                   WireError::InvalidRequestLine),
            (b"GET api HTTP/1.1\r\n\r\n",                  WireError::InvalidRequestLine),
            (b"GET / HTTP/2.0\r\n\r\n",                    WireError::UnsupportedVersion),
            (b"GET / HTTP/1.1\r\nNoColon\r\n\r\n",         WireError::InvalidHeader),
            (b"GET / HTTP/1.1\r\nBad Name: x\r\n\r\n",     WireError::InvalidHeader),
            (b"GET / HTTP/1.1\r\nA: \xff\r\n\r\n",         WireError::NotUtf8),
        ];

        for (raw, err) in cases {
            assert_eq!(RequestHead::parse(raw, 8), Err(err), "{:?}", String::from_utf8_lossy(raw));
        }
    }

    #[test]
    fn header_limit() {
        let raw = b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nC: 3\r\n\r\n";

        assert!(RequestHead::parse(raw, 3).is_ok());
        assert_eq!(RequestHead::parse(raw, 2), Err(WireError::TooManyHeaders(2)));
    }

    #[test]
    fn content_length() {
        let cases = [
            ("GET / HTTP/1.1\r\n\r\n", Ok(None)),
            ("GET / HTTP/1.1\r\ncontent-length: 0\r\n\r\n", Ok(Some(0))),
            ("GET / HTTP/1.1\r\nContent-Length: abc\r\n\r\n", Err(WireError::InvalidContentLength)),
        ];

        for (raw, expected) in cases {
            let (head, _) = RequestHead::parse(raw.as_bytes(), 8).unwrap();
            assert_eq!(head.content_length(), expected);
        }
    }
}

//! `multipart/form-data` body parser

use crate::{
    errors::{ConnError, ConnResult},
    http::{
        params::{self, Param, Params, UploadedFile},
        query,
    },
    limits::FetchLimits,
};
use bytes::Bytes;
use memchr::memmem;

/// Extracts the boundary from a `multipart/form-data` content type.
pub(crate) fn boundary(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        match name.trim().eq_ignore_ascii_case("boundary") {
            true => Some(value.trim().trim_matches('"')).filter(|b| !b.is_empty()),
            false => None,
        }
    })
}

/// Parses every part of `body` into `params`.
///
/// Parts with a `filename` become [`Param::File`], other parts become plain
/// values. Part data is sliced out of `body` without copying.
pub(crate) fn parse_multipart(
    params: &mut Params,
    body: &Bytes,
    boundary: &str,
    limits: &FetchLimits,
) -> ConnResult<()> {
    let delimiter = format!("--{boundary}");
    let finder = memmem::Finder::new(delimiter.as_bytes());
    let close = format!("\r\n--{boundary}");
    let close_finder = memmem::Finder::new(close.as_bytes());

    let mut pos = finder
        .find(body)
        .map(|start| start + delimiter.len())
        .ok_or_else(|| malformed("missing opening boundary"))?;

    let mut count = 0;
    loop {
        match body.get(pos..pos + 2) {
            Some(b"--") => return Ok(()),
            Some(b"\r\n") => pos += 2,
            _ => return Err(malformed("boundary must be followed by CRLF")),
        }

        if count >= limits.multipart_parts {
            return Err(query::Error::OverLimit(limits.multipart_parts).into());
        }
        count += 1;

        let head_end = memmem::find(&body[pos..], b"\r\n\r\n")
            .map(|i| pos + i)
            .ok_or_else(|| malformed("unterminated part headers"))?;
        let head = simdutf8::basic::from_utf8(&body[pos..head_end])
            .map_err(|_| malformed("part headers are not UTF-8"))?;
        let part = PartHead::parse(head)?;

        let data_start = head_end + 4;
        let data_end = close_finder
            .find(&body[data_start..])
            .map(|i| data_start + i)
            .ok_or_else(|| malformed("missing closing boundary"))?;
        let data = body.slice(data_start..data_end);

        let value = match part.filename {
            Some(filename) => Param::File(UploadedFile {
                filename,
                content_type: part.content_type,
                data,
            }),
            None => Param::Value(String::from_utf8_lossy(&data).into_owned()),
        };
        params::insert(params, &part.name, value, limits.nesting_depth)?;

        pos = data_end + close.len();
    }
}

#[derive(Debug, Default, PartialEq)]
struct PartHead {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
}

impl PartHead {
    fn parse(head: &str) -> ConnResult<Self> {
        let mut part = PartHead::default();
        let mut name = None;

        for line in head.split("\r\n") {
            let (header, value) = line
                .split_once(':')
                .ok_or_else(|| malformed("invalid part header"))?;

            if header.trim().eq_ignore_ascii_case("content-type") {
                part.content_type = Some(value.trim().to_owned());
            } else if header.trim().eq_ignore_ascii_case("content-disposition") {
                for param in value.split(';').skip(1) {
                    let Some((key, value)) = param.trim().split_once('=') else {
                        continue;
                    };
                    let value = value.trim().trim_matches('"').to_owned();
                    match key.trim() {
                        "name" => name = Some(value),
                        "filename" => part.filename = Some(value),
                        _ => {}
                    }
                }
            }
        }

        part.name = name.ok_or_else(|| malformed("part without a name"))?;
        Ok(part)
    }
}

#[inline]
fn malformed(reason: &str) -> ConnError {
    ConnError::MalformedBody(format!("multipart: {reason}"))
}

#[cfg(test)]
mod multipart_tests {
    use super::*;

    const BODY: &str = concat!(
        "preamble\r\n",
        "--XyZ\r\n",
        "Content-Disposition: form-data; name=\"title\"\r\n",
        "\r\n",
        "Hello\r\n",
        "--XyZ\r\n",
        "Content-Disposition: form-data; name=\"doc[file]\"; filename=\"a.txt\"\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "line 1\r\nline 2\r\n",
        "--XyZ--\r\n",
    );

    #[test]
    fn boundary_from_content_type() {
        let cases = [
            ("multipart/form-data; boundary=XyZ", Some("XyZ")),
            ("multipart/form-data; charset=utf-8; Boundary=\"a b\"", Some("a b")),
            ("multipart/form-data; boundary=", None),
            ("multipart/form-data", None),
        ];

        for (content_type, expected) in cases {
            assert_eq!(boundary(content_type), expected);
        }
    }

    #[test]
    fn values_and_files() {
        let mut params = Params::new();
        let body = Bytes::from_static(BODY.as_bytes());
        parse_multipart(&mut params, &body, "XyZ", &FetchLimits::default()).unwrap();

        assert_eq!(params["title"], Param::from("Hello"));

        let file = params["doc"].get("file").and_then(Param::as_file).unwrap();
        assert_eq!(file.filename, "a.txt");
        assert_eq!(file.content_type.as_deref(), Some("text/plain"));
        assert_eq!(file.data, "line 1\r\nline 2");
    }

    #[test]
    fn part_limit() {
        let limits = FetchLimits {
            multipart_parts: 1,
            ..FetchLimits::default()
        };
        let body = Bytes::from_static(BODY.as_bytes());

        assert!(matches!(
            parse_multipart(&mut Params::new(), &body, "XyZ", &limits),
            Err(ConnError::Params(query::Error::OverLimit(1)))
        ));
    }

    #[test]
    fn malformed_bodies() {
        let cases = [
            "no boundary at all",
            "--XyZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nunterminated",
            "--XyZ\r\nContent-Disposition: form-data\r\n\r\nx\r\n--XyZ--",
            "--XyZ\r\nbroken header\r\n\r\nx\r\n--XyZ--",
            "--XyZ garbage",
        ];

        for body in cases {
            let body = Bytes::from_static(body.as_bytes());
            let result = parse_multipart(&mut Params::new(), &body, "XyZ", &FetchLimits::default());
            assert!(matches!(result, Err(ConnError::MalformedBody(_))), "{body:?}");
        }
    }
}

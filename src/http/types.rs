//! Core HTTP protocol types and utilities

use std::fmt;

// VERSION

/// HTTP protocol version
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Version {
    /// HTTP/1.0 - [RFC 1945](https://tools.ietf.org/html/rfc1945)
    Http10,

    /// HTTP/1.1 - [RFC 9112](https://www.rfc-editor.org/rfc/rfc9112)
    #[default]
    Http11,
}

impl Version {
    #[inline(always)]
    pub(crate) fn from_bytes(src: &[u8]) -> Option<Self> {
        match src {
            b"HTTP/1.1" => Some(Self::Http11),
            b"HTTP/1.0" => Some(Self::Http10),
            _ => None,
        }
    }

    /// Returns the version as a `(major, minor)` tuple.
    #[inline(always)]
    pub const fn tuple(&self) -> (u8, u8) {
        match self {
            Self::Http10 => (1, 0),
            Self::Http11 => (1, 1),
        }
    }

    #[inline(always)]
    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
        }
    }
}

// STATUS_CODE

macro_rules! set_status_codes {
    ($( $name:ident = ($num:expr, $str:expr); )+) => {
        /// Well-known HTTP status codes
        ///
        /// Connection setters take any `u16`; this enum only exists so that
        /// call sites can name the common codes and so that the wire encoder
        /// can find a reason phrase.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum StatusCode { $(
            #[doc = concat!(stringify!($num), " ", $str)]
            $name = $num,
        )+ }

        impl StatusCode {
            /// Returns the reason phrase registered for `code`, if any.
            #[inline]
            pub const fn reason(code: u16) -> Option<&'static str> {
                match code { $(
                    $num => Some($str),
                )+
                    _ => None,
                }
            }
        }
    }
}

set_status_codes! {
    Continue = (100, "Continue");
    SwitchingProtocols = (101, "Switching Protocols");

    Ok = (200, "OK");
    Created = (201, "Created");
    Accepted = (202, "Accepted");
    NoContent = (204, "No Content");
    PartialContent = (206, "Partial Content");

    MovedPermanently = (301, "Moved Permanently");
    Found = (302, "Found");
    SeeOther = (303, "See Other");
    NotModified = (304, "Not Modified");
    TemporaryRedirect = (307, "Temporary Redirect");
    PermanentRedirect = (308, "Permanent Redirect");

    BadRequest = (400, "Bad Request");
    Unauthorized = (401, "Unauthorized");
    Forbidden = (403, "Forbidden");
    NotFound = (404, "Not Found");
    MethodNotAllowed = (405, "Method Not Allowed");
    NotAcceptable = (406, "Not Acceptable");
    RequestTimeout = (408, "Request Timeout");
    Conflict = (409, "Conflict");
    Gone = (410, "Gone");
    PayloadTooLarge = (413, "Payload Too Large");
    UnsupportedMediaType = (415, "Unsupported Media Type");
    ImaTeapot = (418, "I'm a teapot");
    UnprocessableEntity = (422, "Unprocessable Entity");
    TooManyRequests = (429, "Too Many Requests");

    InternalServerError = (500, "Internal Server Error");
    NotImplemented = (501, "Not Implemented");
    BadGateway = (502, "Bad Gateway");
    ServiceUnavailable = (503, "Service Unavailable");
    GatewayTimeout = (504, "Gateway Timeout");
}

impl From<StatusCode> for u16 {
    #[inline(always)]
    fn from(status: StatusCode) -> Self {
        status as u16
    }
}

// HEADER MAP

/// Case-insensitive header map where every name appears at most once.
///
/// Names are stored downcased, in first-insertion order. Inserting a name
/// that is already present replaces its value in place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `name`, ignoring ASCII case.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets `name` to `value`, replacing any previous value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_ascii_lowercase(), value)),
        }
    }

    /// Appends `value` to an existing entry using `separator`, or inserts it.
    pub(crate) fn merge(&mut self, name: &str, value: &str, separator: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => {
                existing.push_str(separator);
                existing.push_str(value);
            }
            None => self.entries.push((name.to_ascii_lowercase(), value.to_owned())),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index).1)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

//! Lazily fetched request aspects

use crate::{
    errors::{ConnError, ConnResult, UnfetchedError},
    http::{cookies, multipart, params::{self, Params}, wire::WireError},
    Conn, HeaderMap,
};
use bytes::Bytes;
use std::{collections::BTreeMap, fmt, sync::Arc};

/// A part of the request that is computed on demand.
///
/// Fetching an aspect stores its result in the connection; fetching it
/// again returns the connection unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Aspect {
    /// Request headers, see [`Conn::req_headers`].
    Headers = 1 << 0,
    /// Query and body params, see [`Conn::params`].
    Params = 1 << 1,
    /// Request cookies, see [`Conn::req_cookies`].
    Cookies = 1 << 2,
    /// The request body, see [`Conn::req_body`].
    Body = 1 << 3,
    /// Session data, see [`Conn::session`].
    Session = 1 << 4,
}

impl Aspect {
    pub const ALL: [Aspect; 5] = [
        Aspect::Headers,
        Aspect::Params,
        Aspect::Cookies,
        Aspect::Body,
        Aspect::Session,
    ];

    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Aspect::Headers => "headers",
            Aspect::Params => "params",
            Aspect::Cookies => "cookies",
            Aspect::Body => "body",
            Aspect::Session => "session",
        }
    }
}

/// Set of fetched aspects.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Fetched(u8);

impl Fetched {
    #[inline(always)]
    pub(crate) const fn contains(self, aspect: Aspect) -> bool {
        self.0 & aspect as u8 != 0
    }

    #[inline(always)]
    pub(crate) fn insert(&mut self, aspect: Aspect) {
        self.0 |= aspect as u8;
    }
}

impl fmt::Debug for Fetched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(Aspect::ALL.iter().filter(|a| self.contains(**a)).map(|a| a.name()))
            .finish()
    }
}

impl Conn {
    /// Computes `aspect` and caches it in the returned connection.
    ///
    /// # Errors
    /// - too many raw headers when fetching [`Aspect::Headers`]
    /// - params over the [limits](crate::limits::FetchLimits) or a malformed
    ///   multipart body when fetching [`Aspect::Params`]
    /// - a body over [`FetchLimits::body_size`](crate::limits::FetchLimits::body_size)
    ///   or a transport failure when reading it
    /// - [`ConnError::SessionNotConfigured`] when fetching
    ///   [`Aspect::Session`] without a [`SessionFilter`](crate::SessionFilter)
    ///
    /// # Examples
    /// ```
    /// use maker_conn::{test::TestRequest, Aspect};
    ///
    /// let conn = TestRequest::get("/")
    ///     .header("Accept", "text/html")
    ///     .header("accept", "application/json")
    ///     .into_conn()
    ///     .fetch(Aspect::Headers)
    ///     .unwrap();
    ///
    /// let headers = conn.req_headers().unwrap();
    /// assert_eq!(headers.get("accept"), Some("text/html, application/json"));
    /// assert_eq!(headers.get("host"), Some("www.example.com:80"));
    /// ```
    pub fn fetch(self, aspect: Aspect) -> ConnResult {
        if self.fetched.contains(aspect) {
            return Ok(self);
        }

        let mut conn = match aspect {
            Aspect::Headers => self.fetch_headers()?,
            Aspect::Params => self.fetch_params()?,
            Aspect::Cookies => self.fetch_cookies(),
            Aspect::Body => self.fetch_body()?,
            Aspect::Session => self.fetch_session()?,
        };
        conn.fetched.insert(aspect);
        Ok(conn)
    }

    /// Whether `aspect` was already fetched.
    #[inline(always)]
    pub fn fetched(&self, aspect: Aspect) -> bool {
        self.fetched.contains(aspect)
    }

    #[inline(always)]
    pub(crate) fn require(&self, aspect: Aspect) -> Result<(), UnfetchedError> {
        match self.fetched.contains(aspect) {
            true => Ok(()),
            false => Err(UnfetchedError::new(aspect)),
        }
    }

    /// Request headers: names downcased, repeated headers merged.
    #[inline]
    pub fn req_headers(&self) -> Result<&HeaderMap, UnfetchedError> {
        self.require(Aspect::Headers)?;
        Ok(&self.req_headers)
    }

    /// Query string params merged with form body params.
    #[inline]
    pub fn params(&self) -> Result<&Params, UnfetchedError> {
        self.require(Aspect::Params)?;
        Ok(&self.params)
    }

    #[inline]
    pub fn req_cookies(&self) -> Result<&BTreeMap<String, String>, UnfetchedError> {
        self.require(Aspect::Cookies)?;
        Ok(&self.req_cookies)
    }

    #[inline]
    pub fn req_body(&self) -> Result<&Bytes, UnfetchedError> {
        self.require(Aspect::Body)?;
        Ok(&self.req_body)
    }

    /// Host name from the `host` header, without the port.
    pub fn host(&self) -> Result<&str, UnfetchedError> {
        let host = self.req_headers()?.get("host").unwrap_or("");
        Ok(match host.rsplit_once(':') {
            Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
            _ => host,
        })
    }

    /// First raw header named `name`, whether or not headers were fetched.
    pub(crate) fn raw_header(&self, name: &str) -> Option<&str> {
        self.adapter
            .raw_headers()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn fetch_headers(mut self) -> ConnResult {
        let raw = self.adapter.raw_headers();
        if raw.len() > self.limits.header_count {
            return Err(WireError::TooManyHeaders(self.limits.header_count).into());
        }

        let mut headers = HeaderMap::new();
        for (name, value) in raw {
            let separator = match name.eq_ignore_ascii_case("cookie") {
                true => "; ",
                false => ", ",
            };
            headers.merge(name, value, separator);
        }

        if !headers.contains("host") {
            let (host, port) = self.adapter.local_addr();
            headers.insert("host", format!("{host}:{port}"));
        }

        self.req_headers = Arc::new(headers);
        Ok(self)
    }

    fn fetch_params(self) -> ConnResult {
        let mut params = Params::new();
        params::parse_urlencoded(&mut params, self.query_string.as_bytes(), &self.limits)?;

        let content_type = self.raw_header("content-type").map(str::to_owned);
        let mime = content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .unwrap_or("");

        let mut conn = self;
        let mut body_params = Params::new();
        if mime.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            conn = conn.fetch(Aspect::Body)?;
            params::parse_urlencoded(&mut body_params, &conn.req_body, &conn.limits)?;
        } else if mime.eq_ignore_ascii_case("multipart/form-data") {
            let boundary = content_type
                .as_deref()
                .and_then(multipart::boundary)
                .ok_or_else(|| ConnError::MalformedBody("multipart: missing boundary".into()))?;

            conn = conn.fetch(Aspect::Body)?;
            multipart::parse_multipart(&mut body_params, &conn.req_body, boundary, &conn.limits)?;
        }

        params.extend(body_params);
        conn.params = Arc::new(params);
        Ok(conn)
    }

    fn fetch_cookies(mut self) -> Self {
        let mut jar = BTreeMap::new();
        self.adapter
            .raw_headers()
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("cookie"))
            .for_each(|(_, value)| cookies::parse_cookie_header(value, &mut jar));

        self.req_cookies = Arc::new(jar);
        self
    }

    fn fetch_body(mut self) -> ConnResult {
        self.req_body = self.adapter.read_body(self.limits.body_size)?;
        Ok(self)
    }
}

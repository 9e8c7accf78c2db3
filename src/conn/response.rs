//! Response state machine, headers and cookies

use crate::{
    conn::fetch::Aspect,
    errors::{ConnError, ConnResult, UnfetchedError},
    http::cookies::{cookie_header, CookieOptions},
    Conn, HeaderMap,
};
use bytes::Bytes;
use chrono::Utc;
use std::{collections::BTreeMap, fs, io, mem, path::Path, sync::Arc};

/// Response state of a connection.
///
/// ```text
/// Unset --put_status/put_resp_body/resp--> Set
/// Unset|Set --send/send_resp/sendfile--> Sent
/// Unset|Set --send_chunked--> Chunked --end_chunked--> Sent
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Unset,
    Set,
    Chunked,
    Sent,
}

/// A cookie to be sent with the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespCookie {
    pub name: String,
    pub value: String,
    pub options: CookieOptions,
}

// STATE MACHINE

impl Conn {
    #[inline(always)]
    pub fn state(&self) -> State {
        self.state
    }

    /// Whether the response went out, through this value or any clone of it.
    #[inline]
    pub fn already_sent(&self) -> bool {
        self.state == State::Sent || self.adapter.delivered()
    }

    #[inline(always)]
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    #[inline(always)]
    pub fn resp_body(&self) -> &Bytes {
        &self.resp_body
    }

    /// Sets the response status.
    ///
    /// # Errors
    /// [`ConnError::AlreadySent`] once the response (or its chunked head) was
    /// delivered.
    #[inline]
    pub fn put_status(mut self, status: impl Into<u16>) -> ConnResult {
        self.ensure_unsent()?;
        self.status = Some(status.into());
        self.state = State::Set;
        Ok(self)
    }

    #[inline]
    pub fn put_resp_body(mut self, body: impl Into<Bytes>) -> ConnResult {
        self.ensure_unsent()?;
        self.resp_body = body.into();
        self.state = State::Set;
        Ok(self)
    }

    /// Sets status and body without sending.
    #[inline]
    pub fn resp(self, status: impl Into<u16>, body: impl Into<Bytes>) -> ConnResult {
        self.put_status(status)?.put_resp_body(body)
    }

    /// Sets status and body and delivers the response.
    ///
    /// # Errors
    /// - [`ConnError::AlreadySent`]
    /// - [`ConnError::InvalidSendOnHead`] for a non-empty body on a request
    ///   that arrived as `HEAD`
    /// - errors returned by `before_send` hooks or by the adapter
    ///
    /// # Examples
    /// ```
    /// use maker_conn::{test, ConnError, StatusCode};
    ///
    /// assert!(test::req("HEAD", "/", "").send(StatusCode::Ok, "").is_ok());
    ///
    /// let result = test::req("HEAD", "/", "").send(StatusCode::Ok, "body");
    /// assert!(matches!(result, Err(ConnError::InvalidSendOnHead { len: 4 })));
    /// ```
    #[inline]
    pub fn send(self, status: impl Into<u16>, body: impl Into<Bytes>) -> ConnResult {
        self.resp(status, body)?.send_resp()
    }

    /// Delivers the current status and body.
    ///
    /// `before_send` hooks run first, in registration order. A missing
    /// status or a body on a `HEAD` request fails before any hook runs. A
    /// `HEAD` served under another method (see [`Head`](crate::filters::Head))
    /// is checked after the hooks, which may still drop its body.
    pub fn send_resp(self) -> ConnResult {
        self.ensure_unsent()?;
        if self.status.is_none() {
            return Err(ConnError::MissingStatus);
        }
        if self.method == "HEAD" {
            self.ensure_no_head_body()?;
        }

        let mut conn = self.run_before_send()?;
        let status = conn.status.ok_or(ConnError::MissingStatus)?;
        conn.ensure_no_head_body()?;

        let headers = conn.wire_headers();
        conn.adapter.send(status, &headers, &conn.resp_body)?;
        conn.state = State::Sent;
        Ok(conn)
    }

    /// Sends the file at `path` with status `200`.
    ///
    /// The file is read into memory in full.
    pub fn sendfile(self, path: impl AsRef<Path>) -> ConnResult {
        self.ensure_unsent()?;

        let path = path.as_ref();
        let metadata = fs::metadata(path).map_err(|err| sendfile_error(path, err))?;
        if !metadata.is_file() {
            let err = io::Error::new(io::ErrorKind::InvalidInput, "not a regular file");
            return Err(sendfile_error(path, err));
        }

        let data = fs::read(path).map_err(|err| sendfile_error(path, err))?;
        self.send(200_u16, data)
    }

    /// Starts a chunked response with `status`.
    ///
    /// # Examples
    /// ```
    /// use maker_conn::{test, State};
    ///
    /// let conn = test::req("GET", "/events", "")
    ///     .send_chunked(200_u16)
    ///     .and_then(|conn| conn.chunk("one"))
    ///     .and_then(|conn| conn.chunk("two"))
    ///     .and_then(|conn| conn.end_chunked())
    ///     .unwrap();
    ///
    /// assert_eq!(conn.state(), State::Sent);
    /// assert_eq!(test::chunks(&conn), ["one", "two"]);
    /// ```
    pub fn send_chunked(mut self, status: impl Into<u16>) -> ConnResult {
        self.ensure_unsent()?;
        self.status = Some(status.into());

        let mut conn = self.run_before_send()?;
        let status = conn.status.ok_or(ConnError::MissingStatus)?;
        let headers = conn.wire_headers();
        conn.adapter.send_chunked(status, &headers)?;
        conn.state = State::Chunked;
        conn.resp_body = Bytes::new();
        Ok(conn)
    }

    /// Writes one chunk. Chunks of a `HEAD` request are dropped.
    pub fn chunk(self, data: impl Into<Bytes>) -> ConnResult {
        if self.state != State::Chunked {
            return Err(ConnError::NotChunked);
        }

        if self.original_method.as_ref() != "HEAD" {
            self.adapter.chunk(&data.into())?;
        }
        Ok(self)
    }

    pub fn end_chunked(mut self) -> ConnResult {
        if self.state != State::Chunked {
            return Err(ConnError::NotChunked);
        }

        self.adapter.end_chunked()?;
        self.state = State::Sent;
        Ok(self)
    }

    /// Registers `hook` to run right before the response is delivered.
    ///
    /// Hooks run in registration order, each at most once. A hook failing
    /// aborts the delivery.
    ///
    /// # Examples
    /// ```
    /// use maker_conn::test;
    ///
    /// let conn = test::req("GET", "/", "")
    ///     .before_send(|conn| Ok(conn.set_resp_header("x-request-id", "1")))
    ///     .send(200_u16, "")
    ///     .unwrap();
    ///
    /// assert_eq!(test::sent(&conn).unwrap().header("x-request-id"), Some("1"));
    /// ```
    #[inline]
    pub fn before_send<F>(mut self, hook: F) -> Self
    where
        F: Fn(Conn) -> ConnResult + Send + Sync + 'static,
    {
        self.before_send.push(Arc::new(hook));
        self
    }

    #[inline]
    fn ensure_unsent(&self) -> ConnResult<()> {
        match self.state {
            State::Chunked | State::Sent => Err(ConnError::AlreadySent),
            _ if self.adapter.delivered() => Err(ConnError::AlreadySent),
            _ => Ok(()),
        }
    }

    #[inline]
    fn ensure_no_head_body(&self) -> ConnResult<()> {
        match self.original_method.as_ref() == "HEAD" && !self.resp_body.is_empty() {
            true => Err(ConnError::InvalidSendOnHead {
                len: self.resp_body.len(),
            }),
            false => Ok(()),
        }
    }

    fn run_before_send(mut self) -> ConnResult {
        let hooks = mem::take(&mut self.before_send);
        hooks.into_iter().try_fold(self, |conn, hook| hook(conn))
    }

    /// Headers as they go on the wire.
    fn wire_headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .resp_headers
            .iter()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect();

        if let (Some(content_type), false) = (&self.resp_content_type, self.resp_headers.contains("content-type")) {
            let value = match self.resp_charset.is_empty() {
                true => content_type.clone(),
                false => format!("{content_type}; charset={}", self.resp_charset),
            };
            headers.push(("content-type".to_owned(), value));
        }

        let now = Utc::now();
        for cookie in &self.resp_cookies {
            let value = cookie_header(&cookie.name, &cookie.value, &cookie.options, now);
            headers.push(("set-cookie".to_owned(), value));
        }
        headers
    }
}

fn sendfile_error(path: &Path, source: io::Error) -> ConnError {
    ConnError::Sendfile {
        path: path.to_owned(),
        source,
    }
}

// HEADERS

impl Conn {
    #[inline(always)]
    pub fn resp_headers(&self) -> &HeaderMap {
        &self.resp_headers
    }

    #[inline]
    pub fn set_resp_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.resp_headers.insert(name, value);
        self
    }

    #[inline]
    pub fn delete_resp_header(mut self, name: &str) -> Self {
        self.resp_headers.remove(name);
        self
    }

    #[inline]
    pub fn resp_content_type(&self) -> Option<&str> {
        self.resp_content_type.as_deref()
    }

    /// Sets the content type sent as `content-type: <type>; charset=<charset>`,
    /// unless a `content-type` header is set explicitly.
    #[inline]
    pub fn put_resp_content_type(mut self, content_type: &str) -> Self {
        self.resp_content_type = Some(content_type.to_owned());
        self
    }

    /// Charset appended to the content type, `utf-8` by default.
    #[inline(always)]
    pub fn resp_charset(&self) -> &str {
        &self.resp_charset
    }

    /// An empty charset sends the content type alone.
    #[inline]
    pub fn put_resp_charset(mut self, charset: &str) -> Self {
        self.resp_charset = charset.to_owned();
        self
    }
}

// COOKIES

impl Conn {
    #[inline(always)]
    pub fn resp_cookies(&self) -> &[RespCookie] {
        &self.resp_cookies
    }

    /// Request cookies updated with the response cookies set so far.
    ///
    /// # Examples
    /// ```
    /// use maker_conn::{test::TestRequest, Aspect};
    ///
    /// let conn = TestRequest::get("/")
    ///     .cookie("theme", "dark")
    ///     .cookie("lang", "en")
    ///     .into_conn()
    ///     .fetch(Aspect::Cookies)
    ///     .unwrap()
    ///     .set_cookie("theme", "light")
    ///     .delete_cookie("lang");
    ///
    /// let cookies = conn.cookies().unwrap();
    /// assert_eq!(cookies.get("theme").map(String::as_str), Some("light"));
    /// assert_eq!(cookies.get("lang"), None);
    /// ```
    pub fn cookies(&self) -> Result<BTreeMap<String, String>, UnfetchedError> {
        self.require(Aspect::Cookies)?;

        let mut cookies = (*self.req_cookies).clone();
        for cookie in &self.resp_cookies {
            match cookie.options.max_age {
                Some(age) if age <= 0 => cookies.remove(&cookie.name),
                _ => cookies.insert(cookie.name.clone(), cookie.value.clone()),
            };
        }
        Ok(cookies)
    }

    #[inline]
    pub fn set_cookie(self, name: &str, value: impl Into<String>) -> Self {
        self.set_cookie_with(name, value, CookieOptions::default())
    }

    /// Sets a response cookie, replacing an earlier one with the same name.
    pub fn set_cookie_with(mut self, name: &str, value: impl Into<String>, options: CookieOptions) -> Self {
        let cookie = RespCookie {
            name: name.to_owned(),
            value: value.into(),
            options,
        };

        match self.resp_cookies.iter_mut().find(|c| c.name == name) {
            Some(existing) => *existing = cookie,
            None => self.resp_cookies.push(cookie),
        }
        self
    }

    #[inline]
    pub fn delete_cookie(self, name: &str) -> Self {
        self.delete_cookie_with(name, CookieOptions::default())
    }

    /// Expires the cookie on the client. `options` should match the path and
    /// domain the cookie was set with.
    #[inline]
    pub fn delete_cookie_with(self, name: &str, options: CookieOptions) -> Self {
        let options = CookieOptions {
            max_age: Some(0),
            ..options
        };
        self.set_cookie_with(name, "", options)
    }
}

#[cfg(test)]
mod state_tests {
    use crate::{test, ConnError, State, StatusCode};

    #[test]
    fn transitions() {
        let conn = test::req("GET", "/", "");
        assert_eq!(conn.state(), State::Unset);
        assert!(!conn.already_sent());

        let conn = conn.put_status(StatusCode::Created).unwrap();
        assert_eq!((conn.state(), conn.status()), (State::Set, Some(201)));

        let conn = conn.put_resp_body("created").unwrap();
        assert_eq!(conn.resp_body(), "created");

        let conn = conn.send_resp().unwrap();
        assert_eq!(conn.state(), State::Sent);
        assert!(conn.already_sent());

        let sent = test::sent(&conn).unwrap();
        assert_eq!((sent.status, sent.body.as_ref()), (201, &b"created"[..]));
    }

    #[test]
    fn setters_after_send_fail() {
        let sent = test::req("GET", "/", "").send(200_u16, "ok").unwrap();

        let cases: [fn(crate::Conn) -> crate::ConnResult; 6] = [
            |conn| conn.put_status(404_u16),
            |conn| conn.put_resp_body("again"),
            |conn| conn.resp(500_u16, ""),
            |conn| conn.send(200_u16, "again"),
            |conn| conn.send_resp(),
            |conn| conn.send_chunked(200_u16),
        ];

        for op in cases {
            assert!(matches!(op(sent.clone()), Err(ConnError::AlreadySent)));
        }

        // headers and cookies are accepted but change nothing on the wire
        let conn = sent.set_resp_header("x-late", "1").set_cookie("late", "1");
        assert_eq!(test::sent(&conn).unwrap().header("x-late"), None);
    }

    #[test]
    fn stale_clone_cannot_send_twice() {
        let conn = test::req("GET", "/", "");
        let stale = conn.clone();

        conn.send(200_u16, "first").unwrap();
        assert!(stale.already_sent());
        assert!(matches!(stale.send(200_u16, "second"), Err(ConnError::AlreadySent)));
    }

    #[test]
    fn missing_status() {
        let conn = test::req("GET", "/", "").put_resp_body("body").unwrap();
        assert!(matches!(conn.send_resp(), Err(ConnError::MissingStatus)));
    }

    #[test]
    fn head_requests() {
        let conn = test::req("HEAD", "/", "").send(200_u16, "").unwrap();
        assert_eq!(conn.state(), State::Sent);

        // the original method decides, not the overridden one
        let conn = test::req("HEAD", "/", "").put_method("GET");
        assert!(matches!(
            conn.send(200_u16, "body"),
            Err(ConnError::InvalidSendOnHead { len: 4 })
        ));

        let conn = test::req("GET", "/", "").put_method("HEAD");
        assert!(conn.send(200_u16, "body").is_ok());
    }

    #[test]
    fn chunked() {
        let conn = test::req("GET", "/", "");
        assert!(matches!(conn.clone().chunk("x"), Err(ConnError::NotChunked)));
        assert!(matches!(conn.clone().end_chunked(), Err(ConnError::NotChunked)));

        let conn = conn.send_chunked(200_u16).unwrap();
        assert_eq!(conn.state(), State::Chunked);
        assert!(matches!(conn.clone().put_status(500_u16), Err(ConnError::AlreadySent)));

        let conn = conn.chunk("a").unwrap().chunk("b").unwrap().end_chunked().unwrap();
        assert_eq!(conn.state(), State::Sent);
        assert_eq!(test::chunks(&conn), ["a", "b"]);
        assert!(matches!(conn.chunk("c"), Err(ConnError::NotChunked)));
    }

    #[test]
    fn chunks_on_head_are_dropped() {
        let conn = test::req("HEAD", "/", "")
            .send_chunked(200_u16)
            .and_then(|conn| conn.chunk("data"))
            .and_then(|conn| conn.end_chunked())
            .unwrap();

        assert!(test::chunks(&conn).is_empty());
    }
}


#[cfg(test)]
mod resp_headers_tests {
    use crate::test;

    #[test]
    fn content_type_composition() {
        let cases = [
            (None, None, None, None),
            (Some("text/html"), None, None, Some("text/html; charset=utf-8")),
            (Some("application/json"), Some(""), None, Some("application/json")),
            (Some("text/plain"), Some("latin1"), None, Some("text/plain; charset=latin1")),
            (Some("text/html"), None, Some("text/x-custom"), Some("text/x-custom")),
        ];

        for (content_type, charset, header, expected) in cases {
            let mut conn = test::req("GET", "/", "");
            if let Some(content_type) = content_type {
                conn = conn.put_resp_content_type(content_type);
            }
            if let Some(charset) = charset {
                conn = conn.put_resp_charset(charset);
            }
            if let Some(header) = header {
                conn = conn.set_resp_header("Content-Type", header);
            }

            let conn = conn.send(200_u16, "").unwrap();
            let sent = test::sent(&conn).unwrap();
            assert_eq!(sent.header("content-type"), expected);
            assert_eq!(sent.headers.iter().filter(|(k, _)| k == "content-type").count(), expected.is_some() as usize);
        }
    }

    #[test]
    fn set_and_delete() {
        let conn = test::req("GET", "/", "")
            .set_resp_header("X-A", "1")
            .set_resp_header("x-b", "2")
            .set_resp_header("x-a", "3")
            .delete_resp_header("X-B");

        assert_eq!(conn.resp_headers().iter().collect::<Vec<_>>(), [("x-a", "3")]);
        assert_eq!(conn.resp_charset(), "utf-8");
        assert_eq!(conn.resp_content_type(), None);
    }
}

#[cfg(test)]
mod cookies_tests {
    use crate::{http::cookies::CookieOptions, test, test::TestRequest, Aspect};

    #[test]
    fn override_and_delete() {
        let conn = TestRequest::get("/")
            .cookie("a", "req")
            .cookie("b", "req")
            .into_conn()
            .fetch(Aspect::Cookies)
            .unwrap()
            .set_cookie("c", "1")
            .set_cookie("a", "1")
            .set_cookie("a", "2")
            .delete_cookie("b")
            .set_cookie("d", "1")
            .delete_cookie("d");

        let names: Vec<_> = conn.resp_cookies().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["c", "a", "b", "d"]);

        let cookies = conn.cookies().unwrap();
        assert_eq!(cookies.get("a").map(String::as_str), Some("2"));
        assert_eq!(cookies.get("c").map(String::as_str), Some("1"));
        assert!(!cookies.contains_key("b"));
        assert!(!cookies.contains_key("d"));

        // request cookies are untouched
        assert_eq!(conn.req_cookies().unwrap().get("b").map(String::as_str), Some("req"));
    }

    #[test]
    fn set_cookie_headers() {
        let options = CookieOptions {
            path: Some("/app".into()),
            http_only: Some(false),
            ..CookieOptions::default()
        };
        let conn = test::req("GET", "/", "")
            .set_cookie_with("k", "v", options)
            .delete_cookie("old")
            .send(200_u16, "")
            .unwrap();

        let sent = test::sent(&conn).unwrap();
        let cookies: Vec<_> = sent
            .headers
            .iter()
            .filter(|(k, _)| k == "set-cookie")
            .map(|(_, v)| v.as_str())
            .collect();

        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0], "k=v; path=/app");
        assert!(cookies[1].starts_with("old=; path=/; expires=Thu, 01 Jan 1970 00:00:00 GMT; max-age=0"));
    }
}

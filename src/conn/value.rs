use crate::{
    adapter::Adapter,
    conn::{
        fetch::Fetched,
        response::{RespCookie, State},
        session::Session,
    },
    errors::ConnResult,
    http::{params::Params, types::Version},
    limits::FetchLimits,
    HeaderMap,
};
use bytes::Bytes;
use std::{any::Any, collections::BTreeMap, fmt, sync::Arc};

/// Callback run right before a response is delivered.
pub type BeforeSend = Arc<dyn Fn(Conn) -> ConnResult + Send + Sync>;

/// One request/response exchange.
///
/// A `Conn` is an immutable value: every operation consumes it and returns
/// the next value, so a handler is a function `Conn -> ConnResult`. Cloning
/// is cheap, the request parts are reference counted and shared between
/// clones.
///
/// Request data is fetched lazily. Until an [`Aspect`](crate::Aspect) is
/// fetched, the fields derived from it are unavailable and reading them fails
/// with an [`UnfetchedError`](crate::UnfetchedError):
///
/// ```
/// use maker_conn::{test, Aspect};
///
/// let conn = test::req("GET", "/hello?name=bob", "");
/// assert!(conn.params().is_err());
///
/// let conn = conn.fetch(Aspect::Params).unwrap();
/// assert_eq!(conn.params().unwrap()["name"].as_str(), Some("bob"));
/// ```
///
/// The response side follows [`State`]: `Unset -> Set -> (Chunked) -> Sent`.
///
/// ```
/// use maker_conn::{test, State, StatusCode};
///
/// let conn = test::req("GET", "/", "")
///     .put_resp_content_type("text/plain")
///     .send(StatusCode::Ok, "Hello World!")
///     .unwrap();
///
/// assert_eq!(conn.state(), State::Sent);
/// assert_eq!(test::sent(&conn).unwrap().body, "Hello World!");
/// ```
#[derive(Clone)]
pub struct Conn {
    pub(crate) adapter: Arc<dyn Adapter>,
    pub(crate) limits: Arc<FetchLimits>,
    pub(crate) app: Option<Arc<str>>,

    pub(crate) method: String,
    pub(crate) original_method: Arc<str>,
    pub(crate) version: Version,
    pub(crate) path_segments: Arc<[String]>,
    pub(crate) script_name_len: usize,
    pub(crate) query_string: Arc<str>,

    pub(crate) fetched: Fetched,
    pub(crate) req_headers: Arc<HeaderMap>,
    pub(crate) params: Arc<Params>,
    pub(crate) req_cookies: Arc<BTreeMap<String, String>>,
    pub(crate) req_body: Bytes,
    pub(crate) session: Arc<Session>,

    pub(crate) state: State,
    pub(crate) status: Option<u16>,
    pub(crate) resp_body: Bytes,
    pub(crate) resp_headers: HeaderMap,
    pub(crate) resp_cookies: Vec<RespCookie>,
    pub(crate) resp_charset: String,
    pub(crate) resp_content_type: Option<String>,

    pub(crate) assigns: Assigns,
    pub(crate) private: Assigns,
    pub(crate) before_send: Vec<BeforeSend>,
}

impl Conn {
    /// Builds a connection for a request received through `adapter`.
    ///
    /// `target` is the request target as sent (`/path?query`). Empty path
    /// segments are dropped, so `/a//b/` has the segments `["a", "b"]`.
    pub fn new(
        adapter: Arc<dyn Adapter>,
        method: &str,
        target: &str,
        version: Version,
        limits: Arc<FetchLimits>,
    ) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let path_segments: Arc<[String]> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_owned)
            .collect();

        Self {
            adapter,
            limits,
            app: None,

            method: method.to_owned(),
            original_method: Arc::from(method),
            version,
            path_segments,
            script_name_len: 0,
            query_string: Arc::from(query),

            fetched: Fetched::default(),
            req_headers: Arc::default(),
            params: Arc::default(),
            req_cookies: Arc::default(),
            req_body: Bytes::new(),
            session: Arc::default(),

            state: State::Unset,
            status: None,
            resp_body: Bytes::new(),
            resp_headers: HeaderMap::new(),
            resp_cookies: Vec::new(),
            resp_charset: String::from("utf-8"),
            resp_content_type: None,

            assigns: Assigns::default(),
            private: Assigns::default(),
            before_send: Vec::new(),
        }
    }

    #[inline(always)]
    pub fn adapter(&self) -> &dyn Adapter {
        &*self.adapter
    }

    #[inline(always)]
    pub fn limits(&self) -> &FetchLimits {
        &self.limits
    }

    /// Name of the application that dispatched this connection.
    #[inline]
    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    #[inline]
    pub(crate) fn with_app(mut self, app: Arc<str>) -> Self {
        self.app = Some(app);
        self
    }

    #[inline]
    pub(crate) fn with_limits(mut self, limits: Arc<FetchLimits>) -> Self {
        self.limits = limits;
        self
    }

    #[inline(always)]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Overrides the request method seen by the rest of the chain.
    ///
    /// [`original_method`](Conn::original_method) is unchanged.
    #[inline]
    pub fn put_method(mut self, method: &str) -> Self {
        self.method = method.to_owned();
        self
    }

    /// The method the request arrived with.
    #[inline(always)]
    pub fn original_method(&self) -> &str {
        &self.original_method
    }

    #[inline(always)]
    pub fn version(&self) -> Version {
        self.version
    }

    /// The raw query string, without the leading `?`.
    #[inline(always)]
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    #[inline(always)]
    pub fn assigns(&self) -> &Assigns {
        &self.assigns
    }

    /// Stores `value` under `key` for later filters and the endpoint.
    ///
    /// # Examples
    /// ```
    /// use maker_conn::test;
    ///
    /// let conn = test::req("GET", "/", "")
    ///     .assign("user_id", 42_u64)
    ///     .assign("user_id", 7_u64);
    ///
    /// assert_eq!(conn.assigns().get::<u64>("user_id"), Some(&7));
    /// assert_eq!(conn.assigns().get::<String>("user_id"), None);
    /// ```
    #[inline]
    pub fn assign<V: Any + Send + Sync>(mut self, key: &str, value: V) -> Self {
        self.assigns.insert(key, Arc::new(value));
        self
    }

    /// Storage reserved for filters and the framework itself.
    #[inline(always)]
    pub fn private(&self) -> &Assigns {
        &self.private
    }

    #[inline]
    pub fn put_private<V: Any + Send + Sync>(mut self, key: &str, value: V) -> Self {
        self.private.insert(key, Arc::new(value));
        self
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("app", &self.app)
            .field("method", &self.method)
            .field("original_method", &self.original_method)
            .field("path_segments", &self.path_segments)
            .field("script_name_len", &self.script_name_len)
            .field("query_string", &self.query_string)
            .field("fetched", &self.fetched)
            .field("state", &self.state)
            .field("status", &self.status)
            .field("resp_headers", &self.resp_headers)
            .field("resp_cookies", &self.resp_cookies)
            .field("assigns", &self.assigns)
            .field("private", &self.private)
            .field("before_send", &self.before_send.len())
            .finish_non_exhaustive()
    }
}

// ASSIGNS

/// Insertion-ordered values of arbitrary types, keyed by name.
#[derive(Clone, Default)]
pub struct Assigns {
    entries: Vec<(String, Arc<dyn Any + Send + Sync>)>,
}

impl Assigns {
    /// Returns the value under `key` if it exists and has type `T`.
    #[inline]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, value)| value.downcast_ref::<T>())
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    #[inline]
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Replaces in place, so a key keeps its first position.
    pub(crate) fn insert(&mut self, key: &str, value: Arc<dyn Any + Send + Sync>) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_owned(), value)),
        }
    }
}

impl fmt::Debug for Assigns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

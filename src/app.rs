//! Applications: a compiled filter chain in front of an endpoint
//!
//! An [`App`] is built once from an [`AppBuilder`] and then shared by every
//! request. Building resolves each filter specification against a
//! [`FilterRegistry`] and folds the list into a single function, so the
//! per-request cost is a chain of calls with no lookups.
//!
//! # Examples
//!
//! ```
//! use maker_conn::{test, App, Aspect, Conn, ConnResult, FilterRegistry};
//!
//! fn hello(conn: Conn) -> ConnResult {
//!     let conn = conn.fetch(Aspect::Params)?;
//!     let name = conn.params()?.get("name").and_then(|p| p.as_str()).unwrap_or("world");
//!     let body = format!("Hello, {name}!");
//!     conn.send(200_u16, body)
//! }
//!
//! let app = App::builder("hello")
//!     .filter("request_log")
//!     .endpoint(hello)
//!     .build(&FilterRegistry::with_defaults())
//!     .unwrap();
//!
//! let conn = app.handle(test::req("GET", "/?name=maker", ""));
//! assert_eq!(test::sent(&conn).unwrap().body, "Hello, maker!");
//! ```

use crate::{
    config::AppConfig,
    errors::{ConnResult, FilterError},
    filters::{
        compiler::{compile, Chain},
        FilterMatch, FilterRegistry, FilterSpec,
    },
    limits::FetchLimits,
    Conn,
};
use std::{fmt, sync::Arc};
use tracing::{debug, error};

/// The last step of a chain, run once every filter let the request through.
///
/// Implemented for every `Fn(Conn) -> ConnResult`.
pub trait Endpoint: Send + Sync + 'static {
    fn call(&self, conn: Conn) -> ConnResult;
}

impl<F> Endpoint for F
where
    F: Fn(Conn) -> ConnResult + Send + Sync + 'static,
{
    #[inline(always)]
    fn call(&self, conn: Conn) -> ConnResult {
        self(conn)
    }
}

/// A named, compiled request pipeline.
///
/// Cloning is cheap and every clone runs the same chain.
#[derive(Clone)]
pub struct App {
    name: Arc<str>,
    chain: Chain,
    limits: Arc<FetchLimits>,
}

impl App {
    /// Starts building an application called `name`.
    #[inline]
    pub fn builder(name: &str) -> AppBuilder {
        AppBuilder::new(name)
    }

    /// Same as [`AppBuilder::from_config`].
    #[inline]
    pub fn from_config(config: &AppConfig) -> AppBuilder {
        AppBuilder::from_config(config)
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Limits applied to every connection this application runs.
    ///
    /// They replace whatever limits the adapter created the connection with.
    #[inline]
    pub fn limits(&self) -> Arc<FetchLimits> {
        Arc::clone(&self.limits)
    }

    /// Runs the chain on `conn`.
    ///
    /// A connection that was not dispatched by another application is
    /// tagged with this application's name and gets its limits. Errors are
    /// returned as is, see [`handle`](Self::handle) for the error boundary.
    pub fn service(&self, conn: Conn) -> ConnResult {
        (self.chain)(self.enter(conn))
    }

    /// Forwards `conn` to this application, which sees `segments` as its
    /// path info and applies its own limits.
    ///
    /// # Errors
    /// [`ConnError::Forward`](crate::ConnError::Forward) when `segments` is
    /// not a suffix of the current path info, and whatever the chain returns.
    pub fn forward<S: AsRef<str>>(&self, conn: Conn, segments: &[S]) -> ConnResult {
        let conn = conn.forward_to(segments, &self.name)?.with_limits(self.limits());
        (self.chain)(conn)
    }

    fn enter(&self, conn: Conn) -> Conn {
        match conn.app() {
            Some(_) => conn,
            None => conn.with_app(Arc::clone(&self.name)).with_limits(self.limits()),
        }
    }

    /// Runs the chain and never fails.
    ///
    /// An error is logged and, when nothing was delivered yet, answered
    /// with `500 Internal Server Error`. The returned connection is then
    /// the one the request started with.
    pub fn handle(&self, conn: Conn) -> Conn {
        let conn = self.enter(conn);
        let fallback = conn.clone();

        let err = match (self.chain)(conn) {
            Ok(conn) => return conn,
            Err(err) => err,
        };
        error!(
            app = %self.name,
            method = %fallback.method(),
            path = %fallback.path(),
            error = %err,
            "request failed"
        );

        if fallback.already_sent() {
            return fallback;
        }

        let body = match fallback.original_method() {
            "HEAD" => "",
            _ => "Internal Server Error",
        };
        match fallback.clone().send(500_u16, body) {
            Ok(conn) => conn,
            Err(err) => {
                error!(app = %self.name, error = %err, "could not send the error response");
                fallback
            }
        }
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("name", &self.name)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// Collects the filter list and the endpoint of an [`App`].
///
/// List operations only rearrange specifications. Nothing is resolved
/// before [`build`](Self::build).
pub struct AppBuilder {
    name: String,
    filters: Vec<FilterSpec>,
    endpoint: Option<Arc<dyn Endpoint>>,
    limits: Option<FetchLimits>,
}

impl AppBuilder {
    #[inline]
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            filters: Vec::new(),
            endpoint: None,
            limits: None,
        }
    }

    /// Starts from a loaded config: its name, limits and filters.
    ///
    /// # Examples
    /// ```
    /// use maker_conn::{config::AppConfig, App};
    ///
    /// let config = AppConfig::from_toml(r#"
    ///     name = "blog"
    ///
    ///     [[filters]]
    ///     name = "head"
    /// "#).unwrap();
    ///
    /// let builder = App::from_config(&config);
    /// assert_eq!(builder.filters()[0].name(), "head");
    /// ```
    pub fn from_config(config: &AppConfig) -> Self {
        let mut builder = Self::new(&config.name).limits(config.limits.clone());
        builder.filters = config.filters.iter().map(|filter| filter.spec()).collect();
        builder
    }

    /// Appends a filter.
    #[inline]
    pub fn filter(mut self, spec: impl Into<FilterSpec>) -> Self {
        self.filters.push(spec.into());
        self
    }

    /// Inserts a filter in front of the others.
    #[inline]
    pub fn prepend_filter(mut self, spec: impl Into<FilterSpec>) -> Self {
        self.filters.insert(0, spec.into());
        self
    }

    /// Removes every filter matching `filter`.
    ///
    /// A name removes all specifications with that name, a
    /// [`FilterSpec`] only the equal ones.
    #[inline]
    pub fn delete_filter(mut self, filter: impl Into<FilterMatch>) -> Self {
        let filter = filter.into();
        self.filters.retain(|spec| !filter.matches(spec));
        self
    }

    #[inline]
    pub fn endpoint(mut self, endpoint: impl Endpoint) -> Self {
        self.endpoint = Some(Arc::new(endpoint));
        self
    }

    #[inline]
    pub fn limits(mut self, limits: FetchLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// The filter list as it stands.
    #[inline(always)]
    pub fn filters(&self) -> &[FilterSpec] {
        &self.filters
    }

    /// Resolves the filters and compiles the chain.
    ///
    /// # Errors
    /// The first [`FilterError`] met: an unknown name, a bad filter config
    /// or a filter without capabilities.
    ///
    /// # Panics
    /// If [`endpoint`](Self::endpoint) was never called.
    #[track_caller]
    pub fn build(self, registry: &FilterRegistry) -> Result<App, FilterError> {
        let endpoint = self
            .endpoint
            .expect("The `endpoint` method must be called to create");

        let filters = self
            .filters
            .iter()
            .map(|spec| Ok((spec.name().to_owned(), registry.resolve(spec)?)))
            .collect::<Result<Vec<_>, FilterError>>()?;
        let count = filters.len();

        let chain = compile(filters, Arc::new(move |conn| endpoint.call(conn)))?;
        debug!(app = %self.name, filters = count, "app built");

        Ok(App {
            name: Arc::from(self.name),
            chain,
            limits: Arc::new(self.limits.unwrap_or_default()),
        })
    }
}

impl fmt::Debug for AppBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppBuilder")
            .field("name", &self.name)
            .field("filters", &self.filters)
            .field("endpoint", &self.endpoint.is_some())
            .field("limits", &self.limits)
            .finish()
    }
}

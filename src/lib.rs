//! maker_conn - Immutable connection values and compiled filter pipelines
//!
//! A request and the response being built for it live in one value, the
//! [`Conn`]. Every operation takes the connection and returns a new one, so
//! handlers are plain functions `Conn -> ConnResult` that compose with `?`.
//! Applications put a list of [`Filter`]s in front of an endpoint and
//! compile it once into a single call chain.
//!
//! # Features
//!
//! - **Lazy request aspects** - headers, params, cookies, body and session are
//!   fetched on demand with [`Conn::fetch`]; reading one before fetching it is
//!   an [`UnfetchedError`] naming the aspect
//! - **Response state machine** - `Unset`, `Set`, `Chunked`, `Sent`, with
//!   `before_send` hooks and cookie handling
//! - **Path forwarding** - mount applications under a prefix with
//!   [`Conn::forward_to`] and [`App::forward`]
//! - **Compiled filters** - prepare, service and finalize steps resolved
//!   from code or from a [TOML config](config)
//! - **Two adapters, one behaviour** - the [`HttpAdapter`](adapter::http::HttpAdapter)
//!   speaks HTTP/1.x over any byte stream and the [test adapter](test)
//!   records what would have been sent
//!
//! # Examples
//!
//! Quick start:
//! ```
//! use maker_conn::{test, App, Conn, ConnResult, FilterRegistry};
//!
//! fn greet(conn: Conn) -> ConnResult {
//!     let name = match conn.path_segments() {
//!         [hello, name] if hello == "hello" => Some(name.clone()),
//!         _ => None,
//!     };
//!
//!     match name {
//!         Some(name) => conn
//!             .put_resp_content_type("text/plain")
//!             .send(200_u16, format!("Hello, {name}!")),
//!         None => conn.send(404_u16, "not found"),
//!     }
//! }
//!
//! let app = App::builder("greeter")
//!     .filter("head")
//!     .filter("request_log")
//!     .endpoint(greet)
//!     .build(&FilterRegistry::with_defaults())
//!     .unwrap();
//!
//! let conn = app.handle(test::req("GET", "/hello/world", ""));
//! let sent = test::sent(&conn).unwrap();
//!
//! assert_eq!(sent.status, 200);
//! assert_eq!(sent.header("content-type"), Some("text/plain; charset=utf-8"));
//! assert_eq!(sent.body, "Hello, world!");
//! ```
//! A filter of your own:
//! ```
//! use maker_conn::{test, App, Capabilities, Conn, ConnResult, Filter, FilterRegistry, FilterSpec};
//!
//! struct PoweredBy;
//!
//! impl Filter for PoweredBy {
//!     fn capabilities(&self) -> Capabilities {
//!         Capabilities::PREPARE
//!     }
//!
//!     fn prepare(&self, conn: Conn) -> ConnResult {
//!         Ok(conn.set_resp_header("x-powered-by", "maker_conn"))
//!     }
//! }
//!
//! let app = App::builder("site")
//!     .filter(FilterSpec::instance("powered_by", PoweredBy))
//!     .endpoint(|conn: Conn| conn.send(204_u16, ""))
//!     .build(&FilterRegistry::new())
//!     .unwrap();
//!
//! let conn = app.handle(test::req("GET", "/", ""));
//! assert_eq!(test::sent(&conn).unwrap().header("x-powered-by"), Some("maker_conn"));
//! ```
//!
//! # Errors
//!
//! Handlers return [`ConnResult`]. [`App::handle`] is the error boundary:
//! it logs the failure through `tracing` and answers `500` when nothing was
//! delivered yet. Problems in the filter list are [`FilterError`]s reported
//! by [`AppBuilder::build`], before any request is served.

pub mod http {
    pub mod cookies;
    pub(crate) mod multipart;
    pub mod params;
    pub mod query;
    pub mod types;
    pub mod wire;
}
pub(crate) mod conn {
    pub mod fetch;
    pub mod path;
    pub mod response;
    pub mod session;
    pub mod value;
}
pub mod adapter {
    pub mod http;
    pub mod test;
    mod traits;

    pub use traits::Adapter;
}
pub mod filters {
    pub(crate) mod compiler;
    mod filter;
    mod head;
    mod registry;
    mod request_log;
    mod session;

    pub use self::{
        filter::{Capabilities, Filter, FilterMatch, FilterSpec, Next},
        head::Head,
        registry::{FilterFactory, FilterRegistry},
        request_log::{LogLevel, RequestLog},
        session::SessionFilter,
    };
}
pub mod app;
pub mod config;
pub(crate) mod errors;
pub mod hibernate;
pub mod limits;
pub mod templates;

pub use crate::{
    adapter::test,
    app::{App, AppBuilder, Endpoint},
    conn::{
        fetch::Aspect,
        response::{RespCookie, State},
        session::{Session, SessionData, SessionStore},
        value::{Assigns, BeforeSend, Conn},
    },
    errors::{ConfigError, ConnError, ConnResult, FilterError, TemplateNotFound, UnfetchedError},
    filters::{Capabilities, Filter, FilterMatch, FilterRegistry, FilterSpec, Next, SessionFilter},
    http::{
        cookies::CookieOptions,
        params::{Param, Params, UploadedFile},
        query,
        types::{HeaderMap, StatusCode, Version},
    },
};

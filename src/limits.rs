//! Limits applied while fetching request aspects
//!
//! # Security-First Defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Parameter flooding through huge query strings or form bodies
//! - Deeply nested bracket keys (`a[b][c][d]...`) blowing up params
//! - Multipart bodies with an unbounded number of parts
//! - Request bodies larger than the application is willing to buffer
//!
//! Limits travel with every [`Conn`](crate::Conn) and are checked when the
//! corresponding aspect is fetched, not when the request is read.
//!
//! # Examples
//!
//! ```
//! use maker_conn::{limits::FetchLimits, test::TestRequest, Aspect};
//!
//! let limits = FetchLimits {
//!     query_params: 2,
//!     ..FetchLimits::default()
//! };
//!
//! let conn = TestRequest::get("/search?q=rust&page=1&sort=asc")
//!     .limits(limits)
//!     .into_conn();
//!
//! assert!(conn.fetch(Aspect::Params).is_err());
//! ```

use serde::Deserialize;

/// Controls how much work fetching params, headers and multipart bodies
/// may do for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchLimits {
    /// Maximum number of `key=value` pairs accepted from the query string
    /// and from a url-encoded body, each counted separately (default: `128`).
    pub query_params: usize,

    /// Maximum number of bracket levels in a param key (default: `8`).
    ///
    /// `user[address][city]` has two levels. Keys nested deeper than this
    /// fail the params fetch.
    pub nesting_depth: usize,

    /// Maximum number of parts in a `multipart/form-data` body (default: `32`).
    pub multipart_parts: usize,

    /// Maximum number of raw header lines accepted when fetching headers
    /// and when parsing a request head (default: `64`).
    pub header_count: usize,

    /// Maximum request body size in bytes (default: `1MB`).
    ///
    /// Checked against the announced length before anything is read.
    pub body_size: usize,

    #[doc(hidden)]
    #[serde(skip)]
    pub _priv: (),
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            query_params: 128,
            nesting_depth: 8,
            multipart_parts: 32,
            header_count: 64,
            body_size: 1024 * 1024,

            _priv: (),
        }
    }
}

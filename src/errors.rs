use crate::{conn::fetch::Aspect, http::wire::WireError, query};
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// Result of every fallible connection operation.
pub type ConnResult<T = crate::Conn> = Result<T, ConnError>;

/// Errors raised while a request is being handled.
///
/// All of them are precondition or resource failures for a single request:
/// they are raised at the point of violation and travel up the filter chain
/// with `?` until [`App::handle`](crate::App::handle) turns them into a `500`.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error(transparent)]
    Unfetched(#[from] UnfetchedError),

    #[error("cannot send a body on a HEAD request (got {len} bytes)")]
    InvalidSendOnHead { len: usize },

    #[error("{segments:?} is not a suffix of the current path info {path_info:?}")]
    Forward {
        segments: Vec<String>,
        path_info: Vec<String>,
    },

    #[error("cannot send a response without a status")]
    MissingStatus,

    #[error("the response was already sent")]
    AlreadySent,

    #[error("chunks can only be written after `send_chunked`")]
    NotChunked,

    #[error("no session store was registered, add a `SessionFilter` to the app")]
    SessionNotConfigured,

    #[error("could not send file {path:?}: {source}")]
    Sendfile { path: PathBuf, source: io::Error },

    #[error("invalid params: {0}")]
    Params(#[from] query::Error),

    #[error("request body of {len} bytes exceeds the limit of {limit} bytes")]
    BodyTooLarge { len: usize, limit: usize },

    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// A field derived from a lazily fetched aspect was read before the
/// aspect was fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("the {} aspect was not fetched, call `conn.fetch(Aspect::{:?})` first", .aspect.name(), .aspect)]
pub struct UnfetchedError {
    pub aspect: Aspect,
}

impl UnfetchedError {
    #[inline(always)]
    pub(crate) const fn new(aspect: Aspect) -> Self {
        Self { aspect }
    }
}

/// Errors found while compiling a filter chain.
///
/// These are configuration mistakes: they stop the application from being
/// built and never happen while serving a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("could not find filter `{0}` to be used as filter")]
    NotFound(String),

    #[error("filter `{0}` does not implement any of the required functions (prepare, service, finalize)")]
    NoCapabilities(String),

    #[error("invalid configuration for filter `{name}`: {reason}")]
    InvalidConfig { name: String, reason: String },
}

/// No template finder knew about the requested template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not find template {query:?} in any of the paths: {}", JoinPaths(.paths))]
pub struct TemplateNotFound {
    pub query: String,
    pub paths: Vec<String>,
}

struct JoinPaths<'a>(&'a [String]);

impl fmt::Display for JoinPaths<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(none)");
        }
        for (i, path) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{path:?}")?;
        }
        Ok(())
    }
}

/// Errors produced while loading an [`AppConfig`](crate::config::AppConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Io(#[from] io::Error),

    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod errors_tests {
    use super::*;

    #[test]
    fn unfetched_names_the_fetch_call() {
        let cases = [
            (Aspect::Headers, "the headers aspect was not fetched, call `conn.fetch(Aspect::Headers)` first"),
            (Aspect::Params, "the params aspect was not fetched, call `conn.fetch(Aspect::Params)` first"),
            (Aspect::Cookies, "the cookies aspect was not fetched, call `conn.fetch(Aspect::Cookies)` first"),
            (Aspect::Body, "the body aspect was not fetched, call `conn.fetch(Aspect::Body)` first"),
            (Aspect::Session, "the session aspect was not fetched, call `conn.fetch(Aspect::Session)` first"),
        ];

        for (aspect, message) in cases {
            assert_eq!(UnfetchedError::new(aspect).to_string(), message);
        }
    }

    #[test]
    fn template_not_found_lists_paths() {
        let err = TemplateNotFound {
            query: "posts/index".into(),
            paths: vec!["web/templates".into(), "lib/templates".into()],
        };
        assert_eq!(
            err.to_string(),
            r#"could not find template "posts/index" in any of the paths: "web/templates", "lib/templates""#
        );

        let err = TemplateNotFound {
            query: "x".into(),
            paths: vec![],
        };
        assert!(err.to_string().ends_with("(none)"));
    }

    #[test]
    fn filter_error_messages() {
        assert_eq!(
            FilterError::NotFound("auth".into()).to_string(),
            "could not find filter `auth` to be used as filter"
        );
        assert!(FilterError::NoCapabilities("noop".into())
            .to_string()
            .contains("does not implement any of the required functions"));
    }
}

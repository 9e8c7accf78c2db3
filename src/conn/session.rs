//! Session data and the store contract
//!
//! Session storage is pluggable: a [`SessionFilter`](crate::SessionFilter)
//! registers a [`SessionStore`] on the connection, fetching
//! [`Aspect::Session`] loads the data keyed by the session cookie, and the
//! data is written back right before the response is sent if it changed.

use crate::{
    conn::fetch::Aspect,
    errors::{ConnError, ConnResult, UnfetchedError},
    http::cookies::CookieOptions,
    Conn,
};
use std::{collections::BTreeMap, sync::Arc};

pub type SessionData = BTreeMap<String, String>;

/// A backend that keeps session data between requests.
pub trait SessionStore: Send + Sync + 'static {
    /// Loads the data stored under `id`.
    fn get(&self, id: &str) -> Option<SessionData>;

    /// Stores `data` and returns the id to send to the client.
    ///
    /// `id` is `None` for a session that has not been stored yet.
    fn put(&self, id: Option<&str>, data: &SessionData) -> String;

    fn delete(&self, id: &str);
}

/// Session data of the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    id: Option<String>,
    data: SessionData,
    dirty: bool,
}

impl Session {
    #[inline]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    #[inline(always)]
    pub fn data(&self) -> &SessionData {
        &self.data
    }

    /// Whether the data changed during this request.
    #[inline(always)]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

pub(crate) const SESSION_CONFIG: &str = "maker_conn.session";

#[derive(Clone)]
pub(crate) struct SessionConfig {
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) cookie: String,
    pub(crate) options: CookieOptions,
}

impl Conn {
    pub(crate) fn fetch_session(self) -> ConnResult {
        let Some(config) = self.private.get::<SessionConfig>(SESSION_CONFIG).cloned() else {
            return Err(ConnError::SessionNotConfigured);
        };

        let mut conn = self.fetch(Aspect::Cookies)?;
        let id = conn.req_cookies.get(&config.cookie).cloned();
        let stored = id.as_deref().and_then(|id| config.store.get(id));
        let session = match stored {
            Some(data) => Session {
                id,
                data,
                dirty: false,
            },
            // unknown ids start over with a fresh session
            None => Session::default(),
        };

        conn.session = Arc::new(session);
        Ok(conn)
    }

    /// Session data, available after fetching [`Aspect::Session`].
    #[inline]
    pub fn session(&self) -> Result<&Session, UnfetchedError> {
        self.require(Aspect::Session)?;
        Ok(&self.session)
    }

    #[inline]
    pub fn put_session(mut self, key: &str, value: impl Into<String>) -> ConnResult {
        self.require(Aspect::Session)?;

        let session = Arc::make_mut(&mut self.session);
        session.data.insert(key.to_owned(), value.into());
        session.dirty = true;
        Ok(self)
    }

    #[inline]
    pub fn delete_session(mut self, key: &str) -> ConnResult {
        self.require(Aspect::Session)?;

        let session = Arc::make_mut(&mut self.session);
        if session.data.remove(key).is_some() {
            session.dirty = true;
        }
        Ok(self)
    }

    /// Removes all session data.
    pub fn clear_session(mut self) -> ConnResult {
        self.require(Aspect::Session)?;

        let session = Arc::make_mut(&mut self.session);
        session.dirty |= !session.data.is_empty();
        session.data.clear();
        Ok(self)
    }
}

/// Writes a changed session back to the store and sends its cookie.
pub(crate) fn persist(conn: Conn, config: &SessionConfig) -> ConnResult {
    if !conn.fetched(Aspect::Session) || !conn.session.dirty {
        return Ok(conn);
    }

    let id = config.store.put(conn.session.id(), conn.session.data());
    Ok(conn.set_cookie_with(&config.cookie, id, config.options.clone()))
}

#[cfg(test)]
mod session_tests {
    use crate::{test, Aspect, ConnError};

    #[test]
    fn requires_a_store() {
        let conn = test::req("GET", "/", "");
        assert!(matches!(conn.fetch(Aspect::Session), Err(ConnError::SessionNotConfigured)));
    }

    #[test]
    fn unfetched_writes_fail() {
        let cases: [fn(crate::Conn) -> crate::ConnResult; 3] = [
            |conn| conn.put_session("a", "1"),
            |conn| conn.delete_session("a"),
            |conn| conn.clear_session(),
        ];

        for op in cases {
            let err = op(test::req("GET", "/", "")).unwrap_err();
            assert!(matches!(err, ConnError::Unfetched(e) if e.aspect == Aspect::Session));
        }
    }
}

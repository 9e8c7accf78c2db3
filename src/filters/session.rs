use crate::{
    conn::session::{persist, SessionConfig, SessionStore, SESSION_CONFIG},
    errors::ConnResult,
    filters::filter::{Capabilities, Filter},
    http::cookies::CookieOptions,
    Conn,
};
use std::{fmt, sync::Arc};

/// Enables sessions backed by `store`.
///
/// Registers the store on every connection so that
/// [`Aspect::Session`](crate::Aspect::Session) can be fetched, and writes
/// changed sessions back right before the response is sent, setting the
/// session cookie to the id returned by the store.
pub struct SessionFilter {
    config: SessionConfig,
}

impl SessionFilter {
    /// Sessions in `store`, with the id in the `_session` cookie.
    pub fn new(store: impl SessionStore) -> Self {
        Self {
            config: SessionConfig {
                store: Arc::new(store),
                cookie: String::from("_session"),
                options: CookieOptions::default(),
            },
        }
    }

    pub fn cookie(mut self, name: &str) -> Self {
        self.config.cookie = name.to_owned();
        self
    }

    pub fn cookie_options(mut self, options: CookieOptions) -> Self {
        self.config.options = options;
        self
    }
}

impl Filter for SessionFilter {
    fn capabilities(&self) -> Capabilities {
        Capabilities::PREPARE
    }

    fn prepare(&self, conn: Conn) -> ConnResult {
        let config = self.config.clone();
        Ok(conn
            .put_private(SESSION_CONFIG, self.config.clone())
            .before_send(move |conn| persist(conn, &config)))
    }
}

impl fmt::Debug for SessionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFilter")
            .field("cookie", &self.config.cookie)
            .field("options", &self.config.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod session_filter_tests {
    use super::*;
    use crate::{conn::session::SessionData, test, test::TestRequest, tools::MemoryStore, Aspect};

    fn login(store: &MemoryStore, request: TestRequest) -> Conn {
        SessionFilter::new(store.clone())
            .prepare(request.into_conn())
            .and_then(|conn| conn.fetch(Aspect::Session))
            .and_then(|conn| conn.put_session("user", "bob"))
            .and_then(|conn| conn.send(200_u16, ""))
            .unwrap()
    }

    #[test]
    fn new_session_is_stored_and_sent() {
        let store = MemoryStore::default();
        let conn = login(&store, TestRequest::get("/login"));

        let cookie = test::sent(&conn).unwrap().header("set-cookie").unwrap().to_owned();
        assert!(cookie.starts_with("_session=1; path=/"), "{cookie}");
        assert_eq!(store.get("1").unwrap()["user"], "bob");
    }

    #[test]
    fn session_survives_requests() {
        let store = MemoryStore::default();
        let first = login(&store, TestRequest::get("/login"));

        let conn = SessionFilter::new(store.clone())
            .prepare(test::recycle(&first, TestRequest::get("/me")).into_conn())
            .and_then(|conn| conn.fetch(Aspect::Session))
            .unwrap();

        let session = conn.session().unwrap();
        assert_eq!(session.id(), Some("1"));
        assert_eq!(session.get("user"), Some("bob"));
        assert!(!session.is_dirty());

        // unchanged sessions are not written back
        let conn = conn.send(200_u16, "").unwrap();
        assert_eq!(test::sent(&conn).unwrap().header("set-cookie"), None);
    }

    #[test]
    fn changes_reuse_the_id() {
        let store = MemoryStore::default();
        store.put(Some("abc"), &SessionData::from([("user".to_owned(), "bob".to_owned())]));

        let conn = SessionFilter::new(store.clone())
            .cookie("sid")
            .prepare(TestRequest::get("/logout").cookie("sid", "abc").into_conn())
            .and_then(|conn| conn.fetch(Aspect::Session))
            .and_then(|conn| conn.delete_session("user"))
            .and_then(|conn| conn.send(200_u16, ""))
            .unwrap();

        assert!(store.get("abc").unwrap().is_empty());
        assert!(test::sent(&conn).unwrap().header("set-cookie").unwrap().starts_with("sid=abc;"));
    }

    #[test]
    fn unknown_ids_start_fresh() {
        let store = MemoryStore::default();
        let conn = SessionFilter::new(store)
            .prepare(TestRequest::get("/").cookie("_session", "forged").into_conn())
            .and_then(|conn| conn.fetch(Aspect::Session))
            .unwrap();

        assert_eq!(conn.session().unwrap().id(), None);
        assert!(conn.session().unwrap().data().is_empty());
    }

    #[test]
    fn failed_sends_leave_the_store_alone() {
        let store = MemoryStore::default();
        let sends: [fn(Conn) -> ConnResult; 2] = [
            |conn| conn.send(200_u16, "body"),
            |conn| conn.send_resp(),
        ];
        let methods = ["HEAD", "GET"];

        for (method, send) in methods.into_iter().zip(sends) {
            let result = SessionFilter::new(store.clone())
                .prepare(TestRequest::new(method, "/").into_conn())
                .and_then(|conn| conn.fetch(Aspect::Session))
                .and_then(|conn| conn.put_session("user", "bob"))
                .and_then(send);

            assert!(result.is_err(), "{method}");
            assert_eq!(store.len(), 0, "{method}");
        }
    }

    #[test]
    fn unfetched_sessions_are_left_alone() {
        let store = MemoryStore::default();
        let conn = SessionFilter::new(store.clone())
            .prepare(test::req("GET", "/", ""))
            .and_then(|conn| conn.send(200_u16, ""))
            .unwrap();

        assert_eq!(store.len(), 0);
        assert_eq!(test::sent(&conn).unwrap().header("set-cookie"), None);
    }
}

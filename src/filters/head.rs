use crate::{
    errors::ConnResult,
    filters::filter::{Capabilities, Filter, Next},
    Conn,
};
use bytes::Bytes;

/// Serves `HEAD` requests with the `GET` handlers.
///
/// The rest of the chain sees a `GET`. Right before the response goes out
/// its body is dropped, so handlers do not need to care about `HEAD`.
///
/// # Examples
/// ```
/// use maker_conn::{filters::Head, test, App, FilterRegistry};
///
/// let app = App::builder("site")
///     .filter("head")
///     .endpoint(|conn: maker_conn::Conn| match conn.method() {
///         "GET" => conn.send(200_u16, "<h1>Hello</h1>"),
///         _ => conn.send(405_u16, ""),
///     })
///     .build(&FilterRegistry::with_defaults())
///     .unwrap();
///
/// let conn = app.service(test::req("HEAD", "/", "")).unwrap();
/// let sent = test::sent(&conn).unwrap();
/// assert_eq!((sent.status, sent.body.len()), (200, 0));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Head;

impl Filter for Head {
    fn capabilities(&self) -> Capabilities {
        Capabilities::SERVICE
    }

    fn service(&self, conn: Conn, next: &Next<'_>) -> ConnResult {
        if conn.method() != "HEAD" {
            return next(conn);
        }

        next(conn.put_method("GET").before_send(drop_body))
    }
}

fn drop_body(conn: Conn) -> ConnResult {
    match conn.resp_body().is_empty() {
        true => Ok(conn),
        false => conn.put_resp_body(Bytes::new()),
    }
}

#[cfg(test)]
mod head_tests {
    use super::*;
    use crate::{test, State};

    fn endpoint(conn: Conn) -> ConnResult {
        assert_eq!(conn.method(), "GET");
        conn.set_resp_header("x-method", "seen").send(200_u16, "full body")
    }

    #[test]
    fn head_runs_as_get_without_body() {
        let conn = Head.service(test::req("HEAD", "/", ""), &endpoint).unwrap();

        assert_eq!(conn.state(), State::Sent);
        assert_eq!(conn.original_method(), "HEAD");

        let sent = test::sent(&conn).unwrap();
        assert_eq!(sent.status, 200);
        assert_eq!(sent.header("x-method"), Some("seen"));
        assert!(sent.body.is_empty());
    }

    #[test]
    fn other_methods_pass_through() {
        let conn = Head.service(test::req("GET", "/", ""), &endpoint).unwrap();
        assert_eq!(test::sent(&conn).unwrap().body, "full body");
    }
}

//! Path segments and forwarding
//!
//! The request path is split once into segments. Forwarding moves a
//! boundary over those segments: everything before it is the script name
//! (where the current application is mounted), everything after it is the
//! path info (what the application still has to route).

use crate::{
    errors::{ConnError, ConnResult},
    Conn,
};
use std::sync::Arc;

impl Conn {
    /// All segments of the request path.
    #[inline(always)]
    pub fn path_segments(&self) -> &[String] {
        &self.path_segments
    }

    /// The request path, `"/"` for the root.
    #[inline]
    pub fn path(&self) -> String {
        render_or_root(&self.path_segments)
    }

    /// Segments still to be routed by the current application.
    #[inline(always)]
    pub fn path_info_segments(&self) -> &[String] {
        &self.path_segments[self.script_name_len..]
    }

    #[inline]
    pub fn path_info(&self) -> String {
        render_or_root(self.path_info_segments())
    }

    /// Segments consumed by the applications this request was forwarded
    /// through.
    #[inline(always)]
    pub fn script_name_segments(&self) -> &[String] {
        &self.path_segments[..self.script_name_len]
    }

    /// The script name, `""` when nothing was forwarded yet.
    #[inline]
    pub fn script_name(&self) -> String {
        render(self.script_name_segments())
    }

    /// Forwards the connection to `app`, which will see `segments` as its
    /// path info.
    ///
    /// `segments` must be a suffix of the current path info. Forwards
    /// compose: forwarding again moves the boundary further right.
    ///
    /// # Examples
    /// ```
    /// use maker_conn::test;
    ///
    /// let conn = test::req("GET", "/forward_to/foo/bar/baz", "")
    ///     .forward_to(&["bar", "baz"], "admin")
    ///     .unwrap();
    ///
    /// assert_eq!(conn.script_name(), "/forward_to/foo");
    /// assert_eq!(conn.path_info(), "/bar/baz");
    /// assert_eq!(conn.path(), "/forward_to/foo/bar/baz");
    /// assert_eq!(conn.app(), Some("admin"));
    ///
    /// assert!(conn.forward_to(&["nope"], "admin").is_err());
    /// ```
    pub fn forward_to<S: AsRef<str>>(mut self, segments: &[S], app: &str) -> ConnResult {
        let path_info = self.path_info_segments();
        let is_suffix = segments.len() <= path_info.len()
            && path_info[path_info.len() - segments.len()..]
                .iter()
                .zip(segments)
                .all(|(current, next)| current == next.as_ref());

        if !is_suffix {
            return Err(ConnError::Forward {
                segments: segments.iter().map(|s| s.as_ref().to_owned()).collect(),
                path_info: path_info.to_vec(),
            });
        }

        self.script_name_len = self.path_segments.len() - segments.len();
        self.app = Some(Arc::from(app));
        Ok(self)
    }
}

fn render(segments: &[String]) -> String {
    let mut path = String::with_capacity(segments.iter().map(|s| s.len() + 1).sum());
    for segment in segments {
        path.push('/');
        path.push_str(segment);
    }
    path
}

#[inline]
fn render_or_root(segments: &[String]) -> String {
    match segments.is_empty() {
        true => String::from("/"),
        false => render(segments),
    }
}

#[cfg(test)]
mod path_tests {
    use crate::{test, ConnError};
    use proptest::prelude::*;

    #[test]
    fn rendering() {
        let cases = [
            ("/", "/", 0),
            ("/foo", "/foo", 1),
            ("/foo/bar/", "/foo/bar", 2),
        ];

        for (target, path, len) in cases {
            let conn = test::req("GET", target, "");

            assert_eq!(conn.path(), path);
            assert_eq!(conn.path_info(), path);
            assert_eq!(conn.script_name(), "");
            assert_eq!(conn.path_segments().len(), len);
            assert!(conn.script_name_segments().is_empty());
        }
    }

    #[test]
    fn forward_edges() {
        let conn = test::req("GET", "/a/b", "");

        let same = conn.clone().forward_to(&["a", "b"], "app").unwrap();
        assert_eq!(same.script_name(), "");
        assert_eq!(same.path_info(), "/a/b");

        let root = conn.clone().forward_to::<&str>(&[], "app").unwrap();
        assert_eq!(root.script_name(), "/a/b");
        assert_eq!(root.path_info(), "/");
        assert_eq!(root.path_info_segments(), &[] as &[String]);

        let twice = conn
            .forward_to(&["b"], "first")
            .and_then(|conn| conn.forward_to::<&str>(&[], "second"))
            .unwrap();
        assert_eq!(twice.script_name(), "/a/b");
        assert_eq!(twice.app(), Some("second"));

        let conn = test::req("GET", "/forward_to/foo/bar/baz", "")
            .forward_to(&["foo", "bar", "baz"], "outer")
            .unwrap();
        assert_eq!(conn.script_name(), "/forward_to");
        assert_eq!(conn.path_info(), "/foo/bar/baz");

        let conn = conn.forward_to(&["bar", "baz"], "inner").unwrap();
        assert_eq!(conn.script_name(), "/forward_to/foo");
        assert_eq!(conn.path_info(), "/bar/baz");
        assert_eq!(conn.path_info_segments(), ["bar", "baz"]);
        assert_eq!(conn.app(), Some("inner"));
    }

    #[test]
    fn forward_rejects_non_suffix() {
        let conn = test::req("GET", "/a/b", "");
        let cases: [&[&str]; 3] = [&["a"], &["x", "a", "b"], &["c"]];

        for segments in cases {
            let err = conn.clone().forward_to(segments, "app").unwrap_err();
            assert!(matches!(err, ConnError::Forward { .. }), "{segments:?}");
        }

        // the boundary never moves left
        let conn = conn.forward_to(&["b"], "app").unwrap();
        let err = conn.forward_to(&["a", "b"], "app").unwrap_err().to_string();
        assert_eq!(err, r#"["a", "b"] is not a suffix of the current path info ["b"]"#);
    }

    fn segments() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-z0-9_.-]{1,8}", 0..6)
    }

    proptest! {
        #[test]
        fn path_round_trip(segments in segments()) {
            let path = format!("/{}", segments.join("/"));
            let conn = test::req("GET", &path, "");

            prop_assert_eq!(conn.path_segments(), &segments[..]);
            prop_assert_eq!(conn.path(), path);
        }

        #[test]
        fn forwarding_keeps_segments(segments in segments(), cuts in prop::collection::vec(0..6_usize, 1..4)) {
            let mut conn = test::req("GET", &format!("/{}", segments.join("/")), "");

            for cut in cuts {
                let info = conn.path_info_segments().to_vec();
                let suffix = &info[cut.min(info.len())..];
                conn = conn.forward_to(suffix, "app").unwrap();

                let joined = [conn.script_name_segments(), conn.path_info_segments()].concat();
                prop_assert_eq!(&joined[..], conn.path_segments());
                prop_assert_eq!(conn.path_info_segments(), suffix);
            }
        }
    }
}

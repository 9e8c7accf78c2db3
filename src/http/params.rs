//! Nested request parameters
//!
//! Keys use bracket notation: `user[name]=bob` builds a map, `tags[]=a`
//! appends to a list and `users[][name]=bob` builds a list of maps.

use crate::{
    http::query::{self, Query},
    limits::FetchLimits,
};
use bytes::Bytes;
use memchr::memchr;
use std::{borrow::Cow, collections::BTreeMap};

/// Decoded parameters, keyed by their top-level name.
pub type Params = BTreeMap<String, Param>;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Value(String),
    List(Vec<Param>),
    Map(Params),
    File(UploadedFile),
}

/// A file uploaded through a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Param {
    /// Returns the string value, if this is a plain value.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Param::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Looks up `key` when this is a map.
    ///
    /// # Examples
    /// ```
    /// use maker_conn::{test, Aspect};
    ///
    /// let conn = test::req("GET", "/?user[name]=bob", "").fetch(Aspect::Params).unwrap();
    /// let user = &conn.params().unwrap()["user"];
    ///
    /// assert_eq!(user.get("name").and_then(|p| p.as_str()), Some("bob"));
    /// assert_eq!(user.get("age"), None);
    /// ```
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Param> {
        match self {
            Param::Map(map) => map.get(key),
            _ => None,
        }
    }

    #[inline]
    pub fn as_list(&self) -> Option<&[Param]> {
        match self {
            Param::List(list) => Some(list),
            _ => None,
        }
    }

    #[inline]
    pub fn as_file(&self) -> Option<&UploadedFile> {
        match self {
            Param::File(file) => Some(file),
            _ => None,
        }
    }
}

impl From<&str> for Param {
    #[inline]
    fn from(value: &str) -> Self {
        Param::Value(value.to_owned())
    }
}

/// Parses an url-encoded string (query string or form body) into `params`.
///
/// Keys and values are percent-decoded with `+` meaning space. Later keys
/// replace earlier ones.
pub(crate) fn parse_urlencoded(
    params: &mut Params,
    src: &[u8],
    limits: &FetchLimits,
) -> Result<(), query::Error> {
    let pairs: Vec<(&[u8], &[u8])> = Query::parse(src, limits.query_params)?;

    for (key, value) in pairs {
        let value = Param::Value(decode(value));
        insert(params, &decode(key), value, limits.nesting_depth)?;
    }
    Ok(())
}

/// Inserts `value` under a (possibly bracketed) `key`.
pub(crate) fn insert(
    params: &mut Params,
    key: &str,
    value: Param,
    depth_limit: usize,
) -> Result<(), query::Error> {
    let (root, parts) = split_key(key);
    if parts.len() > depth_limit {
        return Err(query::Error::TooDeep(depth_limit));
    }

    insert_into(params, root, &parts, value);
    Ok(())
}

fn decode(raw: &[u8]) -> String {
    let raw: Cow<[u8]> = match memchr(b'+', raw) {
        Some(_) => raw
            .iter()
            .map(|&b| if b == b'+' { b' ' } else { b })
            .collect(),
        None => Cow::Borrowed(raw),
    };

    String::from_utf8_lossy(&urlencoding::decode_binary(&raw)).into_owned()
}

// `a[b][]` => ("a", ["b", ""]). Malformed brackets keep the key literal.
fn split_key(key: &str) -> (&str, Vec<&str>) {
    let Some(open) = key.find('[').filter(|&i| i > 0) else {
        return (key, Vec::new());
    };

    let mut parts = Vec::new();
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            return (key, Vec::new());
        };
        parts.push(&inner[..close]);
        rest = &inner[close + 1..];
    }

    match rest.is_empty() {
        true => (&key[..open], parts),
        false => (key, Vec::new()),
    }
}

fn insert_into(map: &mut Params, key: &str, rest: &[&str], value: Param) {
    match rest.split_first() {
        None => {
            map.insert(key.to_owned(), value);
        }
        Some((&"", tail)) => {
            let entry = map
                .entry(key.to_owned())
                .or_insert_with(|| Param::List(Vec::new()));
            if !matches!(entry, Param::List(_)) {
                *entry = Param::List(Vec::new());
            }
            if let Param::List(list) = entry {
                push_into(list, tail, value);
            }
        }
        Some((next, tail)) => {
            let entry = map
                .entry(key.to_owned())
                .or_insert_with(|| Param::Map(Params::new()));
            if !matches!(entry, Param::Map(_)) {
                *entry = Param::Map(Params::new());
            }
            if let Param::Map(inner) = entry {
                insert_into(inner, next, tail, value);
            }
        }
    }
}

// `users[][name]=a&users[][age]=1` fills the last map until a key repeats.
fn push_into(list: &mut Vec<Param>, rest: &[&str], value: Param) {
    let Some(&first) = rest.first() else {
        list.push(value);
        return;
    };

    if let Some(Param::Map(map)) = list.last_mut() {
        if !map.contains_key(first) {
            insert_into(map, first, &rest[1..], value);
            return;
        }
    }

    let mut map = Params::new();
    insert_into(&mut map, first, &rest[1..], value);
    list.push(Param::Map(map));
}

#[cfg(test)]
mod params_tests {
    use super::*;

    fn parse(src: &str) -> Params {
        let mut params = Params::new();
        parse_urlencoded(&mut params, src.as_bytes(), &FetchLimits::default()).unwrap();
        params
    }

    #[test]
    fn decoding() {
        let cases = [
            ("q=hello+world", "q", "hello world"),
            ("q=a%2Bb", "q", "a+b"),
            ("na%20me=x", "na me", "x"),
            ("q=%E2%9C%93", "q", "\u{2713}"),
            ("flag", "flag", ""),
        ];

        for (src, key, value) in cases {
            assert_eq!(parse(src)[key], Param::from(value), "{src}");
        }
    }

    #[test]
    fn nested() {
        let params = parse("hello=world&foo[name]=bar&foo[deep][x]=1");

        assert_eq!(params["hello"].as_str(), Some("world"));
        assert_eq!(params["foo"].get("name"), Some(&Param::from("bar")));
        assert_eq!(
            params["foo"].get("deep").and_then(|d| d.get("x")),
            Some(&Param::from("1"))
        );
    }

    #[test]
    fn lists() {
        let params = parse("tags[]=a&tags[]=b&users[][name]=x&users[][age]=1&users[][name]=y");

        assert_eq!(
            params["tags"].as_list(),
            Some(&[Param::from("a"), Param::from("b")][..])
        );

        let users = params["users"].as_list().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].get("age"), Some(&Param::from("1")));
        assert_eq!(users[1].get("name"), Some(&Param::from("y")));
    }

    #[test]
    fn malformed_keys_stay_literal() {
        let cases = ["a[b", "a[b]c", "[a]"];

        for key in cases {
            assert_eq!(split_key(key), (key, vec![]));
        }
        assert_eq!(split_key("a[]"), ("a", vec![""]));
    }

    #[test]
    fn last_shape_wins() {
        let params = parse("a=1&a[b]=2");
        assert_eq!(params["a"].get("b"), Some(&Param::from("2")));

        let params = parse("a[b]=2&a=1");
        assert_eq!(params["a"], Param::from("1"));
    }

    #[test]
    fn limits() {
        let limits = FetchLimits {
            nesting_depth: 2,
            query_params: 3,
            ..FetchLimits::default()
        };
        let mut params = Params::new();

        assert!(parse_urlencoded(&mut params, b"a[b][c]=1", &limits).is_ok());
        assert_eq!(
            parse_urlencoded(&mut params, b"a[b][c][d]=1", &limits),
            Err(query::Error::TooDeep(2))
        );
        assert_eq!(
            parse_urlencoded(&mut params, b"a=1&b=2&c=3&d=4", &limits),
            Err(query::Error::OverLimit(3))
        );
    }
}

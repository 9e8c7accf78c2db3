//! Request cookie parsing and `set-cookie` formatting

use chrono::{DateTime, TimeDelta, Utc};
use std::{collections::BTreeMap, fmt::Write};

/// Options of a response cookie.
///
/// `path` defaults to `/` when formatted and `http_only` defaults to `true`
/// unless explicitly set to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CookieOptions {
    pub path: Option<String>,
    pub domain: Option<String>,
    /// Lifetime in seconds. Also emits an `expires` attribute.
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: Option<bool>,
}

/// Parses a `Cookie` request header into `jar`.
///
/// Pairs are separated by `;`, surrounding whitespace and double quotes
/// around values are dropped. When a name repeats the first value is kept,
/// since browsers send the most specific cookie first.
pub(crate) fn parse_cookie_header(header: &str, jar: &mut BTreeMap<String, String>) {
    for pair in header.split(';') {
        let pair = pair.trim();
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = name.trim();
        if name.is_empty() {
            continue;
        }

        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);

        jar.entry(name.to_owned())
            .or_insert_with(|| value.to_owned());
    }
}

/// Formats a `set-cookie` header value.
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use maker_conn::http::cookies::{cookie_header, CookieOptions};
///
/// let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
/// let options = CookieOptions {
///     max_age: Some(60),
///     secure: true,
///     ..CookieOptions::default()
/// };
///
/// assert_eq!(
///     cookie_header("id", "42", &options, now),
///     "id=42; path=/; expires=Fri, 01 Mar 2024 12:01:00 GMT; max-age=60; secure; HttpOnly"
/// );
/// ```
pub fn cookie_header(key: &str, value: &str, options: &CookieOptions, now: DateTime<Utc>) -> String {
    let mut header = format!(
        "{key}={value}; path={}",
        options.path.as_deref().unwrap_or("/")
    );

    if let Some(domain) = &options.domain {
        let _ = write!(header, "; domain={domain}");
    }

    if let Some(max_age) = options.max_age {
        // Non positive lifetimes expire at the epoch.
        let expires = match max_age > 0 {
            true => TimeDelta::try_seconds(max_age).and_then(|age| now.checked_add_signed(age)),
            false => None,
        }
        .unwrap_or(DateTime::UNIX_EPOCH);

        let _ = write!(
            header,
            "; expires={}; max-age={max_age}",
            expires.format("%a, %d %b %Y %H:%M:%S GMT")
        );
    }

    if options.secure {
        header.push_str("; secure");
    }

    if options.http_only != Some(false) {
        header.push_str("; HttpOnly");
    }

    header
}

//! URL query string parser with pluggable collectors.
//!
//! The same parser handles query strings and
//! `application/x-www-form-urlencoded` bodies.

use memchr::memchr;
use std::{error, fmt};

/// URL query string parser.
///
/// Splits a query string into raw `key`/`value` byte pairs and hands them to
/// a [`QueryCollector`]. The parser does not decode anything: collectors
/// decide what to do with the raw bytes. [`Params`](crate::Params) collection
/// decodes `%XX` escapes and `+`.
///
/// # Examples
/// ```rust
/// use maker_conn::query::Query;
///
/// // Parse into Vec (preserves order)
/// let query = b"name=john&age=25&city";
/// let params: Vec<(&[u8], &[u8])> = Query::parse(query, 10).unwrap();
/// assert_eq!(params.len(), 3);
/// assert_eq!(params[2], (&b"city"[..], &b""[..]));
///
/// // Handle limits
/// let result = Query::parse::<Vec<(&[u8], &[u8])>>(b"a=1&b=2", 1);
/// assert!(result.is_err()); // Exceeds limit of 1 parameter
/// ```
pub struct Query;

impl Query {
    /// Parses a query string into a new collection.
    ///
    /// A leading `?` is skipped, so `?a=1` and `a=1` are equivalent.
    /// Empty segments (`a=1&&b=2`) are skipped.
    #[inline(always)]
    pub fn parse<'a, C: QueryCollector<'a>>(query: &'a [u8], limit: usize) -> Result<C, Error> {
        let mut result = C::with_capacity(limit.min(16));
        Self::parse_into(&mut result, query, limit)?;
        Ok(result)
    }

    /// Parses a query string into an existing collection.
    ///
    /// # Examples
    /// ```
    /// use maker_conn::query::Query;
    ///
    /// let mut collector = Vec::new();
    ///
    /// Query::parse_into(&mut collector, b"a=1&b=2", 10).unwrap();
    /// Query::parse_into(&mut collector, b"c=3", 10).unwrap();
    /// assert_eq!(collector.len(), 3); // parameters are appended
    /// ```
    #[inline]
    pub fn parse_into<'a, C: QueryCollector<'a>>(
        result: &mut C,
        query: &'a [u8],
        limit: usize,
    ) -> Result<(), Error> {
        let data = match query.first() {
            Some(b'?') => &query[1..],
            _ => query,
        };

        let mut count = 0;
        let mut start = 0;
        while start < data.len() {
            let end = memchr(b'&', &data[start..])
                .map(|pos| start + pos)
                .unwrap_or(data.len());

            if start != end {
                if count >= limit {
                    return Err(Error::OverLimit(limit));
                }
                count += 1;

                let index = memchr(b'=', &data[start..end]).unwrap_or(end - start);
                let split_index = start + index;

                let key = &data[start..split_index];
                let value = match split_index < end {
                    true => &data[split_index + 1..end],
                    false => b"",
                };

                result.add_param(key, value)?;
            }

            start = end + 1;
        }

        Ok(())
    }
}

/// A trait for types that can collect parsed query parameters.
///
/// # Examples
/// ```rust
/// use maker_conn::query::{Error, QueryCollector};
///
/// struct Keys(Vec<String>);
///
/// impl<'a> QueryCollector<'a> for Keys {
///     fn add_param(&mut self, key: &'a [u8], _: &'a [u8]) -> Result<(), Error> {
///         self.0.push(String::from_utf8_lossy(key).into_owned());
///         Ok(())
///     }
///
///     fn with_capacity(capacity: usize) -> Self {
///         Keys(Vec::with_capacity(capacity))
///     }
/// }
/// ```
pub trait QueryCollector<'a>
where
    Self: Sized,
{
    /// Adds a parsed parameter to the collection.
    fn add_param(&mut self, key: &'a [u8], value: &'a [u8]) -> Result<(), Error>;

    /// Creates a new collection with the specified capacity.
    fn with_capacity(capacity: usize) -> Self;
}

// Preserves parameter order
impl<'a> QueryCollector<'a> for Vec<(&'a [u8], &'a [u8])> {
    #[inline(always)]
    fn add_param(&mut self, key: &'a [u8], value: &'a [u8]) -> Result<(), Error> {
        self.push((key, value));
        Ok(())
    }

    #[inline(always)]
    fn with_capacity(capacity: usize) -> Self {
        Vec::with_capacity(capacity)
    }
}

/// Error types that can occur during query parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The number of parameters exceeded the specified limit.
    OverLimit(usize),

    /// A bracketed key is nested deeper than the configured limit.
    TooDeep(usize),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OverLimit(limit) => {
                write!(f, "Query parameter limit exceeded: limit={}", limit)
            }
            Error::TooDeep(limit) => {
                write!(f, "Query key nested too deep: limit={}", limit)
            }
        }
    }
}

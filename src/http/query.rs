//! URL query-string decoding for request targets.
//!
//! Gateway request targets routinely carry a query string the embedder
//! never asked for — tracking params, cache-busters, forwarded auth state —
//! so parsing is zero-copy and zero-alloc: every key/value borrows directly
//! from the request buffer. There is no percent-decoding; a key or value
//! containing `%20` is handed to the caller exactly as written.

use memchr::memchr;
use std::{collections::HashMap, error, fmt};

/// Splits a query string into raw `key=value` segments, stripping a leading
/// `?` if present.
///
/// Each segment is `&`-delimited; a segment with no `=` yields an empty
/// value, and a segment starting with `=` yields an empty key. Does not
/// allocate — every yielded slice borrows from `data`.
struct Segments<'a> {
    /// `None` once the final segment has been yielded. A trailing `&` with
    /// nothing after it ends iteration rather than yielding one last empty
    /// segment — only `&` pairs with something *between* them (`a&&b`) do.
    rest: Option<&'a [u8]>,
}

impl<'a> Segments<'a> {
    /// `data` must already be non-empty and stripped of a leading `?`.
    fn new(data: &'a [u8]) -> Self {
        Segments { rest: Some(data) }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.rest.take()?;

        let segment = match memchr(b'&', data) {
            Some(pos) => {
                let remainder = &data[pos + 1..];
                if !remainder.is_empty() {
                    self.rest = Some(remainder);
                }
                &data[..pos]
            }
            None => data,
        };

        Some(match memchr(b'=', segment) {
            Some(pos) => (&segment[..pos], &segment[pos + 1..]),
            None => (segment, &segment[segment.len()..]),
        })
    }
}

/// Parses URL query strings (and `application/x-www-form-urlencoded`
/// bodies, which share the same grammar) into a caller-chosen collection.
pub struct Query;

impl Query {
    /// Parses `query` into a fresh `C`, rejecting input with more than
    /// `limit` parameters.
    ///
    /// ```
    /// use reqgate::query::Query;
    ///
    /// let params: Vec<(&[u8], &[u8])> = Query::parse(b"name=john&age=25", 10).unwrap();
    /// assert_eq!(params.len(), 2);
    /// ```
    #[inline(always)]
    pub fn parse<'a, C: QueryCollector<'a>>(query: &'a [u8], limit: usize) -> Result<C, Error> {
        let mut collector = C::with_capacity(limit);
        Self::parse_into(&mut collector, query, limit)?;
        Ok(collector)
    }

    /// Parses `query` into an existing collection, appending to whatever it
    /// already holds — lets a connection reuse one `Vec` across requests
    /// instead of allocating per parse.
    ///
    /// An empty query string is [`Error::Empty`]; a bare `?` with nothing
    /// after it parses to zero parameters rather than erroring, since a
    /// request target like `/path?` is otherwise well-formed. Exceeding
    /// `limit` parameters is [`Error::OverLimit`] as soon as the limit
    /// would be crossed, without scanning the rest of the string.
    ///
    /// ```
    /// use reqgate::query::Query;
    ///
    /// let mut collector = Vec::new();
    /// Query::parse_into(&mut collector, b"a=1&b=2", 10).unwrap();
    /// Query::parse_into(&mut collector, b"c=3", 10).unwrap();
    /// assert_eq!(collector.len(), 3);
    ///
    /// assert!(Query::parse_into(&mut Vec::new(), b"a=1&b=2&c=3", 2).is_err());
    /// ```
    pub fn parse_into<'a, C: QueryCollector<'a>>(
        collector: &mut C,
        query: &'a [u8],
        limit: usize,
    ) -> Result<(), Error> {
        if query.is_empty() {
            return Err(Error::Empty);
        }

        let data = match query.first() {
            Some(b'?') => &query[1..],
            _ => query,
        };
        if data.is_empty() {
            return Ok(());
        }

        for (key, value) in Segments::new(data) {
            if collector.length() >= limit {
                return Err(Error::OverLimit(limit));
            }
            collector.add_param(key, value);
        }

        Ok(())
    }
}

/// Storage for parsed query parameters, chosen by the caller.
///
/// [`Request::url`](crate::Request::url) stores its query parameters in a
/// `Vec` (order matters for a gateway that forwards the query string
/// upstream); an embedder parsing its own data separately can implement
/// this for a `HashMap` or any other shape it needs.
pub trait QueryCollector<'a>
where
    Self: Sized,
{
    /// Records one parsed `key`/`value` pair. Either may be empty.
    fn add_param(&mut self, key: &'a [u8], value: &'a [u8]);

    /// Current number of recorded parameters.
    fn length(&self) -> usize;

    /// Builds an empty collection sized for `capacity` parameters.
    fn with_capacity(capacity: usize) -> Self;
}

impl<'a> QueryCollector<'a> for Vec<(&'a [u8], &'a [u8])> {
    #[inline(always)]
    fn add_param(&mut self, key: &'a [u8], value: &'a [u8]) {
        self.push((key, value));
    }

    #[inline(always)]
    fn length(&self) -> usize {
        self.len()
    }

    #[inline(always)]
    fn with_capacity(capacity: usize) -> Self {
        Vec::with_capacity(capacity)
    }
}

/// Deduplicates on key; the last occurrence of a repeated key wins, matching
/// how most upstreams resolve repeated form fields.
impl<'a> QueryCollector<'a> for HashMap<&'a [u8], &'a [u8]> {
    #[inline(always)]
    fn add_param(&mut self, key: &'a [u8], value: &'a [u8]) {
        self.insert(key, value);
    }

    #[inline(always)]
    fn length(&self) -> usize {
        self.len()
    }

    #[inline(always)]
    fn with_capacity(capacity: usize) -> Self {
        HashMap::with_capacity(capacity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The query string carries more parameters than the caller's `limit`.
    OverLimit(usize),
    /// The query string was empty, or just a lone `?`.
    Empty,
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OverLimit(limit) => write!(f, "query has more than {limit} parameters"),
            Error::Empty => write!(f, "query string is empty"),
        }
    }
}

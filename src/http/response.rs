//! A zero-allocation HTTP/1.x response builder.

use crate::{
    http::types::{StatusCode, Version},
    limits::RespLimits,
    BodyWriter, WriteBuffer,
};
use std::{borrow::Cow, rc::Rc, sync::Arc, time::Duration};

/// Value of the auto-added `Server` header when a handler doesn't set one.
const SERVER_NAME: &str = "reqgate";

#[derive(Debug)]
/// HTTP response builder for constructing server responses.
///
/// Provides a fluent interface for building HTTP responses with status codes,
/// headers, and body content. Automatically handles content-length (or
/// chunked transfer-encoding), the `connection` header, and fills in
/// `server`/`date` (plus `keep-alive: timeout=<n>` when the connection is
/// persistent) if the handler didn't set them.
///
/// Build responses by chaining methods in strict order:
/// [`status()`](Response::status) -> headers -> exactly one body-finalizing
/// method ([`body()`](Response::body), [`body_with()`](Response::body_with),
/// or [`body_chunked_with()`](Response::body_chunked_with)).
///
/// Instances are created automatically by the connection loop and passed to
/// [`Handler::handle`](crate::Handler::handle).
///
/// # Examples
/// ```
/// use reqgate::{Handled, Request, Response, StatusCode};
///
/// async fn handle(_req: &Request, resp: &mut Response) -> Handled {
///     resp
///         .status(StatusCode::Ok)
///         .header("content-type", "text/html")
///         .body("<h1>Hello World</h1>")
/// }
/// ```
///
/// # Panics
/// All methods perform validity checks in `debug` mode that panic on
/// violations. In `release` mode these checks are omitted, which may produce
/// an invalid HTTP response. Test in `debug` mode before deploying.
pub struct Response {
    buffer: Vec<u8>,
    pub(crate) version: Version,
    pub(crate) keep_alive: bool,
    posit_length: usize,
    start_body: usize,
    state: ResponseState,
    keep_alive_timeout: Duration,
    has_server_header: bool,
    has_date_header: bool,
}

#[doc(hidden)]
pub struct Handled(());

#[derive(Debug, Clone, Copy, PartialEq)]
enum ResponseState {
    Clean,
    Headers,
    Complete,
}

impl Response {
    #[inline(always)]
    pub(crate) fn new(limits: &RespLimits) -> Self {
        Self {
            buffer: Vec::with_capacity(limits.default_capacity),
            version: Version::Http11,
            keep_alive: true,
            posit_length: 0,
            start_body: 0,
            state: ResponseState::Clean,
            keep_alive_timeout: limits.keep_alive_timeout,
            has_server_header: false,
            has_date_header: false,
        }
    }

    #[inline(always)]
    pub(crate) fn reset(&mut self, limits: &RespLimits) {
        if self.buffer.capacity() > limits.max_capacity {
            self.buffer = Vec::with_capacity(limits.default_capacity);
        } else {
            self.buffer.clear();
        }

        self.version = Version::Http11;
        self.keep_alive = true;
        self.posit_length = 0;
        self.start_body = 0;
        self.state = ResponseState::Clean;
        self.keep_alive_timeout = limits.keep_alive_timeout;
        self.has_server_header = false;
        self.has_date_header = false;
    }

    #[inline(always)]
    pub(crate) fn buffer(&self) -> &Vec<u8> {
        &self.buffer
    }
}

impl Response {
    /// Forces the connection to close after this response.
    ///
    /// # Panics
    /// Panics in `debug` mode if called after a finalizing body method.
    #[inline]
    #[track_caller]
    pub fn close(&mut self) -> &mut Self {
        debug_assert!(
            self.state != ResponseState::Complete,
            "Must be called before any finalizing method",
        );

        self.keep_alive = false;
        self
    }
}

impl Response {
    /// Sets the HTTP status code for the response.
    ///
    /// # Examples
    /// ```
    /// # reqgate::run_test(|_, resp| {
    /// use reqgate::StatusCode;
    ///
    /// resp.status(StatusCode::NotFound)
    ///     .body(r#"{"status": "not found", "code": 404}"#)
    /// # });
    /// ```
    ///
    /// # Panics
    /// Panics in `debug` mode if called more than once.
    #[inline]
    #[track_caller]
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        debug_assert!(
            self.state == ResponseState::Clean,
            "Must be first and called only once"
        );

        self.buffer
            .extend_from_slice(status.into_first_line(self.version));
        self.state = ResponseState::Headers;
        self
    }

    /// Adds a header to the response.
    ///
    /// PLEASE DO NOT ADD THE FOLLOWING HEADERS:
    /// - `content-length` / `transfer-encoding` — set automatically
    /// - `connection` — use [`close()`](Response::close)
    ///
    /// `server` and `date` are filled in automatically too, but only if
    /// still missing once the body-finalizing method runs — set either one
    /// here to override it.
    ///
    /// # Panics
    /// Panics in `debug` mode if called before [`status()`](Response::status)
    /// or after a finalizing body method.
    #[inline]
    #[track_caller]
    pub fn header<N: WriteBuffer, V: WriteBuffer>(&mut self, name: N, value: V) -> &mut Self {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and before any body method"
        );

        let name_start = self.buffer.len();
        name.write_to(&mut self.buffer);
        self.note_auto_header(name_start);

        self.buffer.extend_from_slice(b": ");
        value.write_to(&mut self.buffer);
        self.buffer.extend_from_slice(b"\r\n");
        self
    }

    /// Adds a multi-value header to the response.
    ///
    /// # Examples
    /// ```
    /// # reqgate::run_test(|_, resp| {
    /// use reqgate::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header_multi("accept", "; ", ["text/html", "text/plain"])
    ///     .body("Done")
    /// # });
    /// ```
    ///
    /// # Panics
    /// Panics in `debug` mode if called before [`status()`](Response::status)
    /// or after a finalizing body method.
    #[inline]
    #[track_caller]
    pub fn header_multi<N, S, I, V>(&mut self, name: N, split: S, values: I) -> &mut Self
    where
        N: WriteBuffer,
        S: WriteBuffer,
        I: IntoIterator<Item = V>,
        V: WriteBuffer,
    {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and before any body method"
        );

        let name_start = self.buffer.len();
        name.write_to(&mut self.buffer);
        self.note_auto_header(name_start);
        self.buffer.extend_from_slice(b": ");

        let mut iter = values.into_iter();
        if let Some(first) = iter.next() {
            first.write_to(&mut self.buffer);

            for value in iter {
                split.write_to(&mut self.buffer);
                value.write_to(&mut self.buffer);
            }
        }

        self.buffer.extend_from_slice(b"\r\n");
        self
    }

    /// Adds a header with parameters to the response.
    ///
    /// # Examples
    /// ```
    /// # reqgate::run_test(|_, resp| {
    /// use reqgate::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header_params("cache-control", ", ", [
    ///         ("max-age", Some("3600")),
    ///         ("must-revalidate", None),
    ///     ])
    ///     .body("Done")
    /// # });
    /// ```
    ///
    /// # Panics
    /// Panics in `debug` mode if called before [`status()`](Response::status)
    /// or after a finalizing body method.
    #[inline]
    #[track_caller]
    pub fn header_params<N, S, I, K, V>(&mut self, name: N, split: S, params: I) -> &mut Self
    where
        N: WriteBuffer,
        S: WriteBuffer,
        I: IntoIterator<Item = (K, Option<V>)>,
        K: WriteBuffer,
        V: WriteBuffer,
    {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and before any body method"
        );

        let name_start = self.buffer.len();
        name.write_to(&mut self.buffer);
        self.note_auto_header(name_start);
        self.buffer.extend_from_slice(b": ");

        let mut iter = params.into_iter();
        if let Some((first_key, first_val)) = iter.next() {
            first_key.write_to(&mut self.buffer);
            if let Some(val) = first_val {
                self.buffer.extend_from_slice(b"=");
                val.write_to(&mut self.buffer);
            }

            for (key, value) in iter {
                split.write_to(&mut self.buffer);
                key.write_to(&mut self.buffer);
                if let Some(val) = value {
                    self.buffer.extend_from_slice(b"=");
                    val.write_to(&mut self.buffer);
                }
            }
        }

        self.buffer.extend_from_slice(b"\r\n");
        self
    }

    /// Sets a known-length response body and finalizes the response.
    ///
    /// # Side Effects
    /// - Adds a `connection` header if necessary
    /// - Calculates and sets the `content-length` header
    ///
    /// # Panics
    /// Panics in `debug` mode if called before [`status()`](Response::status)
    /// or more than once.
    #[inline]
    #[track_caller]
    pub fn body<T: WriteBuffer>(&mut self, data: T) -> Handled {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and any header methods"
        );

        self.start_body();
        data.write_to(&mut self.buffer);
        self.end_body()
    }

    /// Writes the response body via closure and finalizes the response.
    ///
    /// # Side Effects
    /// - Adds a `connection` header if necessary
    /// - Calculates and sets the `content-length` header
    ///
    /// # Examples
    /// ```
    /// # reqgate::run_test(|_, resp| {
    /// use reqgate::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header("content-type", "application/octet-stream")
    ///     .body_with(|writer| {
    ///         writer.write(b"lib: ");
    ///         writer.write("reqgate");
    ///     })
    /// # });
    /// ```
    ///
    /// # Panics
    /// Panics in `debug` mode if called before [`status()`](Response::status)
    /// or more than once.
    #[inline]
    #[track_caller]
    pub fn body_with<F: FnOnce(&mut BodyWriter)>(&mut self, f: F) -> Handled {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and any header methods"
        );

        self.start_body();
        f(&mut BodyWriter(&mut self.buffer));
        self.end_body()
    }

    /// Writes the response body as a `Transfer-Encoding: chunked` stream and
    /// finalizes the response.
    ///
    /// Use this when the body length isn't known up front — each call to
    /// [`ChunkWriter::write_chunk`] emits one wire chunk. A zero-length chunk
    /// is silently dropped rather than terminating the stream early; the
    /// terminating `0\r\n\r\n` is always written once the closure returns.
    ///
    /// # Side Effects
    /// - Adds a `connection` header if necessary
    /// - Sets `transfer-encoding: chunked` instead of `content-length`
    ///
    /// # Examples
    /// ```
    /// # reqgate::run_test(|_, resp| {
    /// use reqgate::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .header("content-type", "text/plain")
    ///     .body_chunked_with(|w| {
    ///         w.write_chunk("first\n");
    ///         w.write_chunk("second\n");
    ///     })
    /// # });
    /// ```
    ///
    /// # Panics
    /// Panics in `debug` mode if called before [`status()`](Response::status),
    /// more than once, or for an HTTP/1.0 response (HTTP/1.0 has no chunked
    /// transfer-coding; callers on that version must use [`body()`](Response::body)).
    #[inline]
    #[track_caller]
    pub fn body_chunked_with<F: FnOnce(&mut write::ChunkWriter)>(&mut self, f: F) -> Handled {
        debug_assert!(
            self.state == ResponseState::Headers,
            "Must be called after status() and any header methods"
        );
        debug_assert!(
            self.version != Version::Http10,
            "HTTP/1.0 has no chunked transfer-coding"
        );

        self.write_auto_headers();
        self.buffer
            .extend_from_slice(b"transfer-encoding: chunked\r\n\r\n");
        self.start_body = self.buffer.len();

        let mut writer = write::ChunkWriter(&mut self.buffer);
        f(&mut writer);

        self.buffer.extend_from_slice(b"0\r\n\r\n");
        self.state = ResponseState::Complete;
        Handled(())
    }
}

impl Response {
    /// Records whether the header name just written at `self.buffer[name_start..]`
    /// is `server` or `date`, so [`write_auto_headers`](Self::write_auto_headers)
    /// knows not to add its own.
    #[inline(always)]
    fn note_auto_header(&mut self, name_start: usize) {
        let name = &self.buffer[name_start..];
        if name.eq_ignore_ascii_case(b"server") {
            self.has_server_header = true;
        } else if name.eq_ignore_ascii_case(b"date") {
            self.has_date_header = true;
        }
    }

    /// Adds the headers every response gets unless the handler already set
    /// them: `connection` (or `keep-alive` timeout on a persistent HTTP/1.1
    /// response), `server`, and `date`.
    #[inline(always)]
    fn write_auto_headers(&mut self) {
        if let Some(value) = self.connection_header() {
            self.header("connection", value);
        } else if self.version == Version::Http11 && self.keep_alive {
            self.header_params("keep-alive", ", ", [("timeout", Some(self.keep_alive_timeout.as_secs()))]);
        }

        if !self.has_server_header {
            self.header("server", SERVER_NAME);
        }
        if !self.has_date_header {
            self.header("date", httpdate::fmt_http_date(std::time::SystemTime::now()));
        }
    }

    #[inline(always)]
    #[track_caller]
    fn start_body(&mut self) -> &mut Self {
        self.write_auto_headers();

        self.buffer.extend_from_slice(b"content-length: ");
        self.posit_length = self.buffer.len();
        self.buffer.extend_from_slice(b"0000000000\r\n\r\n");
        self.start_body = self.buffer.len();
        self
    }

    #[inline(always)]
    fn end_body(&mut self) -> Handled {
        let body_len = self.buffer.len() - self.start_body;
        let (arr, _) = Response::number_to_bytes(body_len as u128);

        let target_range = self.posit_length..self.posit_length + 10;
        self.buffer[target_range].copy_from_slice(&arr[29..39]);
        self.state = ResponseState::Complete;

        Handled(())
    }

    #[inline(always)]
    const fn connection_header(&self) -> Option<&'static [u8]> {
        match (self.version, self.keep_alive) {
            (Version::Http11, true) => None,
            (Version::Http11, false) => Some(b"close"),
            (Version::Http10, true) => Some(b"keep-alive"),
            (Version::Http10, false) => Some(b"close"),
        }
    }

    #[inline]
    const fn number_to_bytes(mut n: u128) -> ([u8; 39], usize) {
        let mut buffer = [b'0'; 39];
        let mut i = 39;

        if n == 0 {
            return (buffer, 38);
        }

        while n > 0 {
            i -= 1;
            buffer[i] = b'0' + (n % 10) as u8;
            n /= 10;
        }

        (buffer, i)
    }

    #[inline]
    const fn number_to_hex_bytes(mut n: u64) -> [u8; 8] {
        const DIGITS: &[u8; 16] = b"0123456789abcdef";
        let mut out = [b'0'; 8];
        let mut i = 8;

        while i > 0 {
            i -= 1;
            out[i] = DIGITS[(n & 0xf) as usize];
            n >>= 4;
        }

        out
    }
}

pub mod write {
    use super::*;

    /// Writer for constructing the HTTP response body.
    /// Used in [body_with](Response::body_with).
    ///
    /// # Examples
    ///
    /// With [WriteBuffer]:
    /// ```
    /// # reqgate::run_test(|_, resp| {
    /// use reqgate::StatusCode;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .body_with(|w| {
    ///         w.write("This goes in the response body");
    ///         w.write(true);
    ///     })
    /// # });
    /// ```
    /// With [std::io::Write]:
    /// ```
    /// # reqgate::run_test(|_, resp| {
    /// use reqgate::StatusCode;
    /// use std::io::Write;
    ///
    /// resp.status(StatusCode::Ok)
    ///     .body_with(|w| {
    ///         write!(w, "{} - {} = {}", 6, 2, 4);
    ///     })
    /// # });
    /// ```
    #[derive(Debug)]
    pub struct BodyWriter<'a>(pub(crate) &'a mut Vec<u8>);

    impl BodyWriter<'_> {
        /// Appends content to the response body.
        #[inline]
        pub fn write<T: WriteBuffer>(&mut self, value: T) {
            value.write_to(self.0);
        }
    }

    impl std::io::Write for BodyWriter<'_> {
        #[inline]
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        #[inline]
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Writer for emitting individual `Transfer-Encoding: chunked` wire
    /// chunks. Used in [body_chunked_with](Response::body_chunked_with).
    #[derive(Debug)]
    pub struct ChunkWriter<'a>(pub(crate) &'a mut Vec<u8>);

    impl ChunkWriter<'_> {
        /// Writes one wire chunk: a hex-length prefix, the data, and a
        /// trailing CRLF. A chunk with no bytes is dropped rather than
        /// emitted, since a zero-size chunk is the stream terminator and
        /// `body_chunked_with` writes that itself after the closure returns.
        #[inline]
        pub fn write_chunk<T: WriteBuffer>(&mut self, data: T) {
            let pos = self.0.len();
            self.0.extend_from_slice(b"00000000\r\n");
            let body_start = self.0.len();
            data.write_to(self.0);
            let len = self.0.len() - body_start;

            if len == 0 {
                self.0.truncate(pos);
                return;
            }

            let hex = Response::number_to_hex_bytes(len as u64);
            self.0[pos..pos + 8].copy_from_slice(&hex);
            self.0.extend_from_slice(b"\r\n");
        }
    }

    /// Trait for writing data to the [`Response`] buffer.
    ///
    /// Implemented for common types like strings, bytes, booleans
    /// and numeric types (excluding floating-point numbers)
    ///
    /// # Note on Floating-Point
    /// Floating-point numbers are not implemented to avoid locale-dependent
    /// formatting and precision issues in protocol headers.
    ///
    /// For explicit float serialization, consider using the
    /// [`ryu`](https://crates.io/crates/ryu)
    /// crate or formatting to string with controlled precision.
    ///
    /// # Example
    /// ```
    /// use reqgate::WriteBuffer;
    ///
    /// struct MyString(String);
    ///
    /// impl WriteBuffer for MyString {
    ///     fn write_to(&self, buffer: &mut Vec<u8>) {
    ///         buffer.extend_from_slice(self.0.as_bytes())
    ///     }
    /// }
    /// ```
    pub trait WriteBuffer {
        /// Writes the value's representation directly to the buffer.
        ///
        /// This should avoid intermediate allocations and write the
        /// most efficient representation possible.
        fn write_to(&self, buffer: &mut Vec<u8>);
    }

    macro_rules! impl_write_buffer {
        (bytes, $conn:expr => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    let closure = $conn;
                    closure(self, buffer);
                }
            })*
        };
        (number($type:ty), $conn:expr => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    $conn(*self as $type, buffer);
                }
            })*
        };
        (non_zero($type:ty), $conn:expr => $($t:ident),*) => {
            $(impl WriteBuffer for std::num::$t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    $conn(self.get() as $type, buffer);
                }
            })*
        };
    }

    impl<T: WriteBuffer> WriteBuffer for &T {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            T::write_to(*self, buffer);
        }
    }
    impl<T: WriteBuffer> WriteBuffer for &mut T {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            T::write_to(*self, buffer);
        }
    }
    impl_write_buffer! {
        bytes, |value: &str, buffer: &mut Vec<u8>| {
            buffer.extend_from_slice(value.as_bytes());
        } => &str, String, Box<str>, Cow<'_, str>,
        Arc<str>, Rc<str>, Arc<String>, Rc<String>
    }
    impl_write_buffer! {
        bytes, |value: &[u8], buffer: &mut Vec<u8>| {
            buffer.extend_from_slice(value);
        } => &[u8], Vec<u8>, Box<[u8]>, Cow<'_, [u8]>,
        Arc<[u8]>, Rc<[u8]>, Arc<Vec<u8>>, Rc<Vec<u8>>
    }
    impl<const N: usize> WriteBuffer for [u8; N] {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(self);
        }
    }
    impl_write_buffer! {
        number(u128), impl_write_buffer_u128 => u8, u16, u32, u64, u128, usize
    }
    impl_write_buffer! {
        non_zero(u128), impl_write_buffer_u128 => NonZeroU8,
        NonZeroU16, NonZeroU32, NonZeroU64, NonZeroU128, NonZeroUsize
    }
    impl_write_buffer! {
        number(i128), impl_write_buffer_i128 => i8, i16, i32, i64, i128, isize
    }
    impl_write_buffer! {
        non_zero(i128), impl_write_buffer_i128 => NonZeroI8,
        NonZeroI16, NonZeroI32, NonZeroI64, NonZeroI128, NonZeroIsize
    }
    impl WriteBuffer for bool {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(match self {
                true => b"true",
                false => b"false",
            });
        }
    }
    impl WriteBuffer for char {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            let mut buf = [0u8; 4];
            buffer.extend_from_slice(self.encode_utf8(&mut buf).as_bytes());
        }
    }

    #[inline(always)]
    fn impl_write_buffer_u128(value: u128, buffer: &mut Vec<u8>) {
        let (arr, start) = Response::number_to_bytes(value);
        buffer.extend_from_slice(&arr[start..]);
    }

    #[inline(always)]
    fn impl_write_buffer_i128(value: i128, buffer: &mut Vec<u8>) {
        if value < 0 {
            buffer.push(b'-');
        }
        let abs = value.unsigned_abs();

        let (arr, start) = Response::number_to_bytes(abs);
        buffer.extend_from_slice(&arr[start..]);
    }
}



#[cfg(test)]
mod header_tests {
    use super::*;
    use crate::tools::*;

    macro_rules! test_header {
        ($method:ident, $(($name:expr $(, $params:expr)*; $result:expr);)*) => {
           #[test] fn $method() {$(
            let mut resp = Response::new(&RespLimits::default());

            assert_eq!(resp.buffer, []);

            resp.status(StatusCode::Ok);
            assert_eq!(resp.state, ResponseState::Headers);

            resp.$method($name $(, $params)*);
            assert_eq!(str_op(&resp.buffer[17..]), $result);
            assert_eq!(resp.state, ResponseState::Headers);
        )*}};
    }

    test_header! {header,
        ("name", "value"; "name: value\r\n");
        ("", "value"; ": value\r\n");
        ("name", ""; "name: \r\n");

        ("name", 123; "name: 123\r\n");
        ("name", vec![35, 33, 43]; "name: #!+\r\n");
        ("name", false; "name: false\r\n");
        ("name", -123; "name: -123\r\n");
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before any body method")]
    fn header_before_status() {
        Response::new(&RespLimits::default()).header("Name", "value");
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and before any body method")]
    fn header_after_body() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).body("");
        resp.header("Name", "value");
    }

    test_header! {header_multi,
        ("name", ", ", ["q", "w", "e"]; "name: q, w, e\r\n");
        ("name", ",", [true, false]; "name: true,false\r\n");
        ("name", "; ", [-123, 123]; "name: -123; 123\r\n");
    }

    test_header! {header_params,
        ("name", ", ", [("name", Some("value"))]; "name: name=value\r\n");
        (
            "name", ", ", [("q", Some("1")), ("w", Some("2")), ("e", Some("3"))];
            "name: q=1, w=2, e=3\r\n"
        );
        (
            "name", ", ", [("debug", Some(true)), ("doc", Some(false))];
            "name: debug=true, doc=false\r\n"
        );
        (
            "name", "; ", [("debug", None), ("text", Some("asd"))];
            "name: debug; text=asd\r\n"
        );
    }
}

#[cfg(test)]
mod body_tests {
    use super::*;
    use crate::tools::*;

    macro_rules! test_body {
        ($method:ident, $(($data:expr, $len:expr);)*) => {
        #[test] fn $method() {$(
            let mut resp = Response::new(&RespLimits::default());

            let result_data = test_body!{ $method, resp, $data };

            assert_eq!(
                normalize_date(str_op(&resp.buffer)),
                format!(
                    "HTTP/1.1 200 OK\r\nkeep-alive: timeout=2\r\nserver: reqgate\r\ndate: <DATE>\r\ncontent-length: {}\r\n\r\n{}",
                    format!("{:0>10}", $len),
                    str_op(&result_data)
                )
            );
            assert_eq!(resp.state, ResponseState::Complete);
        )*}};

        (body, $resp:expr, $data:expr) => {{
            $resp.status(StatusCode::Ok).body($data);
            let mut expected = Vec::new();
            $data.write_to(&mut expected);
            expected
        }};
        (body_with, $resp:expr, $data:expr) => {{
            $resp.status(StatusCode::Ok).body_with($data);

            let mut vector = Vec::new();
            let mut result_data = BodyWriter(&mut vector);
            $data(&mut result_data);
            vector
        }};
    }

    test_body! {body,
        ("sample body", 11);
        ("{\"debug\": true, \"doc\": false}", 29);
        (true, 4);
        (-1234, 5);
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and any header methods")]
    fn body_before_status() {
        Response::new(&RespLimits::default()).body("Name");
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and any header methods")]
    fn body_double_call() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).body("");
        resp.body("Name");
    }

    test_body! {body_with,
        (|buf: &mut BodyWriter| buf.write("qwe"), 3);
        (|buf: &mut BodyWriter| buf.write(vec![23, 34, 56]), 3);
        (|buf: &mut BodyWriter| buf.write(String::from("body")), 4);
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and any header methods")]
    fn body_with_before_status() {
        Response::new(&RespLimits::default()).body_with(|_| {});
    }

    #[test]
    #[should_panic(expected = "Must be called after status() and any header methods")]
    fn body_with_double_call() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).body_with(|_| {});
        resp.body_with(|_| {});
    }
}

#[cfg(test)]
mod body_chunked_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn single_chunk() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).body_chunked_with(|w| {
            w.write_chunk("hello");
        });

        assert_eq!(
            normalize_date(str_op(&resp.buffer)),
            "HTTP/1.1 200 OK\r\nkeep-alive: timeout=2\r\nserver: reqgate\r\ndate: <DATE>\r\ntransfer-encoding: chunked\r\n\r\n\
             00000005\r\nhello\r\n0\r\n\r\n"
        );
        assert_eq!(resp.state, ResponseState::Complete);
    }

    #[test]
    fn multiple_chunks_and_empty_chunk_is_dropped() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).body_chunked_with(|w| {
            w.write_chunk("ab");
            w.write_chunk("");
            w.write_chunk("cde");
        });

        assert_eq!(
            normalize_date(str_op(&resp.buffer)),
            "HTTP/1.1 200 OK\r\nkeep-alive: timeout=2\r\nserver: reqgate\r\ndate: <DATE>\r\ntransfer-encoding: chunked\r\n\r\n\
             00000002\r\nab\r\n00000003\r\ncde\r\n0\r\n\r\n"
        );
    }

    #[test]
    fn close_adds_connection_header() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).close();
        resp.body_chunked_with(|w| w.write_chunk("x"));

        assert_eq!(
            normalize_date(str_op(&resp.buffer)),
            "HTTP/1.1 200 OK\r\nconnection: close\r\nserver: reqgate\r\ndate: <DATE>\r\ntransfer-encoding: chunked\r\n\r\n\
             00000001\r\nx\r\n0\r\n\r\n"
        );
    }

    #[test]
    #[should_panic(expected = "HTTP/1.0 has no chunked transfer-coding")]
    fn http10_panics() {
        let mut resp = Response::new(&RespLimits::default());
        resp.version = Version::Http10;
        resp.status(StatusCode::Ok);
        resp.body_chunked_with(|_| {});
    }
}


#[cfg(test)]
mod auto_header_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn handler_supplied_server_and_date_are_not_overridden() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok)
            .header("server", "my-proxy")
            .header("date", "Tue, 15 Nov 1994 08:12:31 GMT")
            .body("");

        assert_eq!(
            str_op(&resp.buffer),
            "HTTP/1.1 200 OK\r\nserver: my-proxy\r\ndate: Tue, 15 Nov 1994 08:12:31 GMT\r\n\
             keep-alive: timeout=2\r\ncontent-length: 0000000000\r\n\r\n"
        );
    }

    #[test]
    fn server_header_name_match_is_case_insensitive() {
        let mut resp = Response::new(&RespLimits::default());
        resp.status(StatusCode::Ok).header("Server", "custom").body("");

        assert_eq!(resp.has_server_header, true);
        assert!(!str_op(&resp.buffer).contains("server: reqgate"));
    }

    #[test]
    fn keep_alive_timeout_value_is_configurable() {
        let limits = RespLimits {
            keep_alive_timeout: std::time::Duration::from_secs(30),
            ..RespLimits::default()
        };
        let mut resp = Response::new(&limits);
        resp.status(StatusCode::Ok).body("");

        assert!(str_op(&resp.buffer).contains("keep-alive: timeout=30\r\n"));
    }
}

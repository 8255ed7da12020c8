use crate::{
    errors::*,
    http::types::{self, Header, HeaderMap, RequestTargetForm},
    limits::ReqLimits,
    peer_creds::{PeerCredentials, PeerCredsError},
    query::Query,
    server::connection::HttpConnection,
    server::conn_stream::ConnStream,
    tls::TlsEnviron,
    ConnectionData, Handler, Method, Url, Version,
};
use memchr::memchr;
use std::{
    io, mem,
    net::SocketAddr,
    time::Duration,
};
use tokio::{io::AsyncReadExt, time::sleep};

/// A parsed HTTP request.
///
/// Header names, the URL, and the declared `Content-Length` are zero-copy
/// references into the connection's request buffer; they stay valid for the
/// lifetime of one request/response cycle. The body is owned: known-length
/// and chunked bodies may need reads beyond the buffer that produced the
/// header slices, so it can't alias them.
#[derive(Debug, Clone, PartialEq)]
#[repr(align(128))]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) client_addr: SocketAddr,
    pub(crate) server_addr: SocketAddr,
    pub(crate) peer_creds: Result<PeerCredentials, PeerCredsError>,
    pub(crate) tls_environ: Option<TlsEnviron>,
}

const UNSPECIFIED_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 0);

impl Request {
    #[inline(always)]
    pub(crate) fn new(limits: &ReqLimits) -> Self {
        Request {
            method: Method::Get,
            url: Url::new(limits),
            version: Version::Http11,
            headers: HeaderMap::new(limits.header_count),
            body: None,
            client_addr: UNSPECIFIED_ADDR,
            server_addr: UNSPECIFIED_ADDR,
            peer_creds: Err(PeerCredsError::Unavailable),
            tls_environ: None,
        }
    }

    #[inline(always)]
    pub(crate) fn reset(&mut self) {
        self.method = Method::Get;
        self.url.clear();
        self.version = Version::Http11;
        self.headers.reset();
        self.body = None;
    }
}

// Public API
impl Request {
    #[inline(always)]
    pub const fn method(&self) -> Method {
        self.method
    }

    #[inline(always)]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    #[inline(always)]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Returns the first header value with case-insensitive name matching
    /// (per [RFC 7230](https://tools.ietf.org/html/rfc7230#section-3.2)).
    #[inline(always)]
    pub fn header(&self, name: &[u8]) -> Option<&[u8]> {
        self.headers.get(name)
    }

    /// Returns the value of the `Content-Length` header if present.
    #[inline(always)]
    pub const fn content_length(&self) -> Option<usize> {
        self.headers.content_length
    }

    /// Whether the request declared `Transfer-Encoding: chunked`.
    #[inline(always)]
    pub const fn is_chunked(&self) -> bool {
        self.headers.chunked
    }

    /// Returns the request body if present.
    #[inline(always)]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// The remote peer's socket address.
    #[inline(always)]
    pub const fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// The local socket address the connection was accepted on.
    #[inline(always)]
    pub const fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// PID/UID/GID of the peer, if this connection is local and
    /// `peercreds_enabled` is set.
    ///
    /// Always `Err(PeerCredsError::Unavailable)` for a TCP peer or when the
    /// feature is disabled — this is never surfaced as an HTTP error.
    #[inline(always)]
    pub const fn peer_credentials(&self) -> Result<PeerCredentials, PeerCredsError> {
        self.peer_creds
    }

    /// The certificate/cipher environment a TLS Adapter produced for this
    /// connection, or `None` for a connection that never went through one.
    #[inline(always)]
    pub fn tls_environ(&self) -> Option<&TlsEnviron> {
        self.tls_environ.as_ref()
    }
}

impl<H: Handler<S>, S: ConnectionData> HttpConnection<H, S> {
    #[inline]
    pub(crate) fn parse(&mut self) -> Result<Version, ErrorKind> {
        self.parse_method()?;
        self.parse_url()?;
        self.check_version()?;
        self.parse_headers()?;

        Ok(self.request.version)
    }
}

// Parse first line
impl<H: Handler<S>, S: ConnectionData> HttpConnection<H, S> {
    #[inline]
    fn parse_method(&mut self) -> Result<(), ErrorKind> {
        // "OPTIONS " - the longest method with a trailing space (8 bytes)
        let slice = self
            .parser
            .get_slice(0, 8)
            .ok_or(ErrorKind::InvalidMethod)?;

        (self.request.method, self.parser.position) = Method::from_bytes(slice)?;
        Ok(())
    }

    #[inline]
    fn parse_url(&mut self) -> Result<(), ErrorKind> {
        let posit = self
            .parser
            .find_char(self.req_limits.url_size + 1, b' ')
            .ok_or(ErrorKind::InvalidUrl)?;

        if posit > self.req_limits.url_size {
            return Err(ErrorKind::UriTooLong);
        }

        let start = self.parser.position;
        let raw = self
            .parser
            .get_slice_static(start, posit)
            .ok_or(ErrorKind::InvalidUrl)?;
        self.parser.update_position(posit);

        if raw.is_empty() {
            return Err(ErrorKind::InvalidUrl);
        }

        let url = &mut self.request.url;

        if raw == b"*" {
            if self.request.method != Method::Options {
                return Err(ErrorKind::InvalidUrl);
            }
            url.form = RequestTargetForm::Asterisk;
            url.target = raw;
            return Ok(());
        }

        // No proxy mode is implemented, so the only valid target for CONNECT
        // — authority-form — is never actually serviceable. The method is
        // still recognized (not `InvalidMethod`), so the response is the
        // more informative 405 rather than a blanket 400.
        if self.request.method == Method::Connect {
            return Err(ErrorKind::MethodNotAllowed);
        }

        let (authority, path_and_query) = match raw
            .strip_prefix(b"http://")
            .or_else(|| raw.strip_prefix(b"https://"))
        {
            Some(rest) => {
                let auth_end = memchr(b'/', rest).unwrap_or(rest.len());
                let authority = &rest[..auth_end];
                if authority.is_empty() {
                    return Err(ErrorKind::InvalidUrl);
                }
                url.form = RequestTargetForm::Absolute;
                let path: &'static [u8] = if auth_end == rest.len() {
                    b"/"
                } else {
                    &rest[auth_end..]
                };
                (Some(authority), path)
            }
            None if raw.starts_with(b"/") => {
                url.form = RequestTargetForm::Origin;
                (None, raw)
            }
            None => return Err(ErrorKind::InvalidUrl),
        };

        url.authority = authority;
        url.target = path_and_query;

        let (path, query) = match memchr(b'?', path_and_query) {
            Some(q) => (&path_and_query[..q], Some(&path_and_query[q..])),
            None => (path_and_query, None),
        };
        url.path = path;

        for segment in path.split(|&b| b == b'/') {
            if segment.is_empty() {
                continue;
            }
            if url.parts.len() == self.req_limits.url_parts {
                return Err(ErrorKind::InvalidUrl);
            }
            url.parts.push(segment);
        }

        if let Some(q) = query {
            if q.len() > self.req_limits.url_query_size {
                return Err(ErrorKind::InvalidUrl);
            }
            let limit = url.query_parts.capacity();
            Query::parse_into(&mut url.query_parts, q, limit)?;
            url.query = Some(q);
        }

        Ok(())
    }

    #[inline]
    fn check_version(&mut self) -> Result<(), ErrorKind> {
        // "HTTP/1.X\r\n" - HTTP version with line break (10 bytes)
        let slice = self
            .parser
            .find_slice(10, b'\n')
            .ok_or(ErrorKind::InvalidVersion)?;

        if !matches!(slice.len(), 8 | 9) {
            return Err(ErrorKind::InvalidVersion);
        }

        (self.response.version, self.response.keep_alive) = Version::from_bytes(&slice[..8])?;
        self.request.version = self.response.version;

        self.parser.has_crlf = slice.last() == Some(&b'\r');

        Ok(())
    }
}

/// Outcome of scanning one line inside the header block.
enum HeaderLine {
    Header(Header),
    /// An obsolete line-continuation: a line beginning with SP or HTAB,
    /// folded into the value of the previous header.
    Fold(&'static [u8]),
    /// The blank line terminating the header block.
    End,
}

// Parse headers
impl<H: Handler<S>, S: ConnectionData> HttpConnection<H, S> {
    #[inline]
    fn parse_headers(&mut self) -> Result<(), ErrorKind> {
        // Name of the most recently parsed header line, special or not, so
        // a continuation line can be matched against it and framing headers
        // can refuse to be folded.
        let mut last_name: Option<&'static [u8]> = None;

        for _ in 0..=self.req_limits.header_count {
            match self.parse_header()? {
                HeaderLine::End => return self.finish_headers(),
                HeaderLine::Fold(continuation) => {
                    // Folding a framing header's value across lines would
                    // let its effective value differ from what a
                    // single-line-only reader of the same bytes sees —
                    // exactly the kind of ambiguity request smuggling
                    // exploits, so it's rejected outright.
                    let is_framing = matches!(
                        last_name,
                        Some(b"content-length") | Some(b"connection") | Some(b"transfer-encoding")
                    );
                    if is_framing || !self.request.headers.fold_last(continuation) {
                        return Err(ErrorKind::InvalidHeader);
                    }
                }
                HeaderLine::Header(header) => {
                    if !self.req_limits.header_reader.accept(header.name) {
                        continue;
                    }

                    last_name = Some(header.name);
                    if !self.parse_special_header(&header)? {
                        self.request.headers.insert(header);
                    }
                }
            }
        }

        Err(ErrorKind::TooManyHeaders)
    }

    #[inline]
    fn finish_headers(&mut self) -> Result<(), ErrorKind> {
        // An ambiguous framing (both Content-Length and a chunked
        // Transfer-Encoding) is a hard failure rather than picking one —
        // a request-smuggling-safe default spec.md leaves open.
        if self.request.headers.content_length.is_some() && self.request.headers.chunked {
            return Err(ErrorKind::InvalidContentLength);
        }
        Ok(())
    }

    #[inline]
    fn parse_header(&mut self) -> Result<HeaderLine, ErrorKind> {
        let parser = &mut self.parser;
        // HeaderName: Someone=data\r\n
        //                            |
        let end = parser
            .find_char(self.req_limits.header_name_size + self.req_limits.header_value_size + 4, b'\n')
            .ok_or(ErrorKind::InvalidHeader)?;

        match parser.get_slice(parser.position + end - 1, 2) {
            Some([b'\r', b'\n']) if parser.has_crlf => {}
            Some([_, b'\n']) if !parser.has_crlf => {}
            _ => return Err(ErrorKind::InvalidHeader),
        }

        //  folded-value\r\n
        // |
        if matches!(parser.get_slice(parser.position, 1), Some([b' ' | b'\t'])) {
            let len_value = end - 1 - parser.has_crlf as usize;
            let value = parser
                .get_slice_static(parser.position + 1, len_value)
                .ok_or(ErrorKind::InvalidHeader)?;

            parser.update_position(end);
            return Ok(HeaderLine::Fold(trim_leading_ows(value)));
        }

        // HeaderName: Someone=data\r\n
        //           |
        let Some(split) = parser.find_char(end, b':') else {
            self.check_end_of_headers(end)?;
            return Ok(HeaderLine::End);
        };

        if parser.get_slice(parser.position + split, 2) != Some(b": ") {
            return Err(ErrorKind::InvalidHeader);
        }

        let value_start = split + 2;
        let len_value = end - value_start - parser.has_crlf as usize;

        if split > self.req_limits.header_name_size || len_value > self.req_limits.header_value_size
        {
            return Err(ErrorKind::InvalidHeader);
        }

        let name = {
            let name = parser
                .get_slice_mut(parser.position, split)
                .ok_or(ErrorKind::InvalidHeader)?;

            if name.is_empty() {
                return Err(ErrorKind::InvalidHeader);
            }

            types::to_lower_case(name);
            unsafe { Parser::into_static(name) }
        };

        let value = parser
            .get_slice_static(parser.position + value_start, len_value)
            .ok_or(ErrorKind::InvalidHeader)?;

        parser.update_position(end);

        Ok(HeaderLine::Header(Header::new(name, value)))
    }

    #[inline]
    fn parse_special_header(&mut self, header: &Header) -> Result<bool, ErrorKind> {
        match header.name {
            b"content-length" => self.parse_content_length(header.value),
            b"connection" => self.parse_connection(header.value),
            b"transfer-encoding" => self.parse_transfer_encoding(header.value),
            _ => return Ok(false),
        }
        .map(|_| true)
    }

    #[inline]
    fn check_end_of_headers(&mut self, start: usize) -> Result<(), ErrorKind> {
        let parser = &mut self.parser;
        // [\r, \n, \r, \n] or [x, x, \n, \n]
        let p_end = parser
            .get_slice(parser.position + start - 3, 4)
            .ok_or(ErrorKind::InvalidHeader)?;

        if !match parser.has_crlf {
            true => p_end.ends_with(b"\r\n\r\n"),
            false => p_end.ends_with(b"\n\n"),
        } {
            return Err(ErrorKind::InvalidHeader);
        }

        parser.position += parser.has_crlf as usize + 1;

        Ok(())
    }

    #[inline]
    fn parse_content_length(&mut self, value: &[u8]) -> Result<(), ErrorKind> {
        let len = types::slice_to_usize(value).ok_or(ErrorKind::InvalidContentLength)?;
        if len > self.req_limits.max_request_body_size {
            return Err(ErrorKind::BodyTooLarge);
        }
        self.request.headers.content_length = Some(len);
        Ok(())
    }

    #[inline]
    fn parse_connection(&mut self, value: &[u8]) -> Result<(), ErrorKind> {
        let mut normalized = [0; 10];
        let len = types::into_lower_case(value, &mut normalized);

        match &normalized[..len] {
            b"keep-alive" => self.response.keep_alive = true,
            b"close" => self.response.keep_alive = false,
            _ => return Err(ErrorKind::InvalidConnection),
        }

        Ok(())
    }

    #[inline]
    fn parse_transfer_encoding(&mut self, value: &[u8]) -> Result<(), ErrorKind> {
        let mut normalized = [0; 16];
        let len = types::into_lower_case(value, &mut normalized);

        match &normalized[..len] {
            b"chunked" => {
                self.request.headers.chunked = true;
                Ok(())
            }
            // Any other transfer-coding (gzip, compress, deflate, or a
            // comma-separated list) isn't supported; reject rather than
            // silently misframe the body.
            _ => Err(ErrorKind::InvalidHeader),
        }
    }
}

// Read body
impl<H: Handler<S>, S: ConnectionData> HttpConnection<H, S> {
    #[inline]
    pub(crate) async fn read_body(&mut self, stream: &mut ConnStream) -> Result<(), ErrorKind> {
        if self.request.headers.chunked {
            self.read_chunked_body(stream).await
        } else {
            self.read_known_length_body(stream).await
        }
    }

    async fn read_known_length_body(&mut self, stream: &mut ConnStream) -> Result<(), ErrorKind> {
        let Some(len) = self.request.headers.content_length else {
            let leftover = self.parser.len - self.parser.position;
            return match leftover {
                0 => Ok(()),
                n => Err(ErrorKind::UnexpectedBody(n)),
            };
        };

        if len > self.req_limits.max_request_body_size {
            return Err(ErrorKind::BodyTooLarge);
        }

        let mut body = Vec::with_capacity(len);
        let already = &self.parser.buffer[self.parser.position..self.parser.len];
        body.extend_from_slice(&already[..already.len().min(len)]);

        while body.len() < len {
            let chunk = read_more(stream, self.conn_limits.socket_read_timeout).await?;
            let need = len - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(need)]);
        }

        self.request.body = Some(body);
        Ok(())
    }

    async fn read_chunked_body(&mut self, stream: &mut ConnStream) -> Result<(), ErrorKind> {
        let mut raw = self.parser.buffer[self.parser.position..self.parser.len].to_vec();
        let mut body = Vec::new();
        let mut cursor = 0usize;
        let timeout = self.conn_limits.socket_read_timeout;
        let cap = self.req_limits.max_request_body_size;

        loop {
            let size_line_end = loop {
                if let Some(pos) = memchr(b'\n', &raw[cursor..]) {
                    break cursor + pos;
                }
                if raw.len() - cursor > cap {
                    return Err(ErrorKind::MalformedChunk);
                }
                raw.extend_from_slice(&read_more(stream, timeout).await?);
            };

            let size_line = trim_cr(&raw[cursor..size_line_end]);
            let size_str = memchr(b';', size_line)
                .map(|p| &size_line[..p])
                .unwrap_or(size_line);
            let chunk_size =
                types::hex_to_usize(size_str).ok_or(ErrorKind::MalformedChunk)?;
            cursor = size_line_end + 1;

            if chunk_size == 0 {
                loop {
                    let Some(pos) = memchr(b'\n', &raw[cursor..]) else {
                        raw.extend_from_slice(&read_more(stream, timeout).await?);
                        continue;
                    };
                    let line = trim_cr(&raw[cursor..cursor + pos]);
                    cursor += pos + 1;
                    if line.is_empty() {
                        break;
                    }
                }
                break;
            }

            if body.len() + chunk_size > cap {
                return Err(ErrorKind::BodyTooLarge);
            }

            while raw.len() < cursor + chunk_size + 2 {
                raw.extend_from_slice(&read_more(stream, timeout).await?);
            }

            body.extend_from_slice(&raw[cursor..cursor + chunk_size]);
            if &raw[cursor + chunk_size..cursor + chunk_size + 2] != b"\r\n" {
                return Err(ErrorKind::MalformedChunk);
            }
            cursor += chunk_size + 2;
        }

        self.request.body = Some(body);
        Ok(())
    }
}

#[inline]
fn trim_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

/// Strips the leading run of SP/HTAB from an obs-fold continuation line,
/// leaving the part that gets joined onto the previous header's value.
#[inline]
fn trim_leading_ows(mut value: &'static [u8]) -> &'static [u8] {
    while let [b' ' | b'\t', rest @ ..] = value {
        value = rest;
    }
    value
}

/// Reads one more chunk of body bytes directly off the socket.
///
/// Deliberately bypasses [`Parser::fill_buffer`]: the request/header buffer
/// may still be backing zero-copy header and URL slices the handler reads
/// later, and overwriting it mid-body would dangle them.
async fn read_more(stream: &mut ConnStream, timeout: Duration) -> Result<Vec<u8>, ErrorKind> {
    let mut chunk = [0u8; 8192];
    let n = tokio::select! {
        biased;

        result = stream.read(&mut chunk) => result.map_err(|e| ErrorKind::Io(IoError(e)))?,
        _ = sleep(timeout) => return Err(ErrorKind::RequestTimeout),
    };

    if n == 0 {
        return Err(ErrorKind::Io(IoError(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed mid-body",
        ))));
    }

    Ok(chunk[..n].to_vec())
}

//

#[derive(Debug, Clone, PartialEq)]
#[repr(align(64))]
pub(crate) struct Parser {
    position: usize,
    len: usize,
    has_crlf: bool,
    buffer: Box<[u8]>,
}

impl Parser {
    #[inline(always)]
    pub(crate) fn new(limits: &ReqLimits) -> Self {
        let buffer = vec![0; limits.precalc.buffer].into_boxed_slice();

        Parser {
            position: 0,
            len: 0,
            has_crlf: false,
            buffer,
        }
    }

    #[cfg(test)]
    pub(crate) fn from<V: AsRef<[u8]>>(limits: &ReqLimits, value: V) -> Self {
        let mut buffer = vec![0; limits.precalc.buffer];

        let value = value.as_ref();
        buffer[0..value.len()].copy_from_slice(value);

        Parser {
            position: 0,
            len: value.len(),
            has_crlf: false,
            buffer: buffer.into_boxed_slice(),
        }
    }

    #[inline]
    pub(crate) fn reset(&mut self) {
        self.position = 0;
        self.len = 0;
        self.has_crlf = false;
        self.buffer.fill(0);
    }
}

// Work with Buffer
impl Parser {
    // Reading level
    #[inline]
    pub(crate) async fn fill_buffer(
        &mut self,
        stream: &mut ConnStream,
        time: Duration,
    ) -> Result<usize, io::Error> {
        tokio::select! {
            biased;

            read_result = stream.read(&mut self.buffer) => {
                let n = read_result?;
                self.len = n;
                Ok(n)
            }
            _ = sleep(time) => {
                Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout"))
            },
        }
    }

    // Search level
    #[inline]
    fn find_slice(&mut self, limit: usize, delimiter: u8) -> Option<&[u8]> {
        let step = self.find_char(limit, delimiter)?;
        let last_index = self.update_position(step);
        let slice = self.get_slice(last_index, step)?;
        Some(slice)
    }

    #[inline]
    fn find_char(&self, step: usize, delimiter: u8) -> Option<usize> {
        let slice = self.get_slice(self.position, step)?;
        memchr(delimiter, slice)
    }

    // Low level
    #[inline(always)]
    fn get_slice(&self, start: usize, step: usize) -> Option<&[u8]> {
        self.buffer.get(start..start + step)
    }

    #[inline(always)]
    fn get_slice_mut(&mut self, start: usize, step: usize) -> Option<&mut [u8]> {
        self.buffer.get_mut(start..start + step)
    }

    #[inline(always)]
    fn update_position(&mut self, step: usize) -> usize {
        let old = self.position;
        self.position += step + 1;
        old
    }

    // Unsafe level
    #[inline(always)]
    fn get_slice_static(&self, start: usize, step: usize) -> Option<&'static [u8]> {
        let value = self.get_slice(start, step)?;
        unsafe { Some(Self::into_static(value)) }
    }

    #[inline(always)]
    // SAFETY: these references are only ever handed out for the buffer
    // region holding the request line and headers, which isn't touched
    // again until `Parser::reset()` runs at the start of the next request
    // on this connection — by which point the previous `Request` has
    // already been dropped (or reset) by `HttpConnection::impl_run`. Body
    // reads beyond the initial fill use `read_more`, never this buffer.
    const unsafe fn into_static(src: &[u8]) -> &'static [u8] {
        unsafe { mem::transmute(src) }
    }
}

#[cfg(test)]
mod request_self {
    use super::*;
    use crate::tools::*;

    #[test]
    fn reset() {
        let limits = ReqLimits::default().precalculate();
        let mut t =
            HttpConnection::from_req("OPTIONS /qwe&q=1 HTTP/1.0\r\nHost: 127.0.0.1\r\n\r\n");

        assert_eq!(t.parse(), Ok(Version::Http10));
        t.request.reset();
        assert_eq!(Request::new(&limits), t.request);
    }

    #[test]
    fn parse_method() {
        #[rustfmt::skip]
        let cases = [
            ("GET /url",   Some(Method::Get)),
            ("GET ",       Some(Method::Get)),
            ("PUT ",       Some(Method::Put)),
            ("POST ",      Some(Method::Post)),
            ("HEAD ",      Some(Method::Head)),
            ("PATCH ",     Some(Method::Patch)),
            ("DELETE ",    Some(Method::Delete)),
            ("OPTIONS ",   Some(Method::Options)),
            ("CONNECT ",   Some(Method::Connect)),

            ("GET",        None),
            ("PYU ",       None),
            ("GETGETGET ", None),
        ];

        for (method, expected) in cases {
            let mut t = HttpConnection::from_req(method);

            if let Some(expected) = expected {
                assert_eq!(t.parse_method(), Ok(()));
                assert_eq!(t.request.method(), expected);
            } else {
                assert_eq!(t.parse_method(), Err(ErrorKind::InvalidMethod));
            }
        }
    }

    #[test]
    fn parse_url_origin_form() {
        #[rustfmt::skip]
        let cases = [
            ("/ ",             Some((vec![], vec![]))),
            ("/// ",           Some((vec![], vec![]))),
            ("/api/user ",     Some((vec!["api", "user"], vec![]))),
            ("///api//user ",  Some((vec!["api", "user"], vec![]))),
            (
                "/api/find?user=qwe&id=223 ", Some((vec!["api", "find"],
                    vec![("user", "qwe"), ("id", "223")]
                ))
            ),
            (
                "/?user=qwe&id=223 ", Some((vec![],
                    vec![("user", "qwe"), ("id", "223")]
                ))
            ),

            ("qwe ",           None),
            (" ",              None),
            ("qwe/qwe ",       None),
            ("/qwe",           None),
        ];

        for (url, expected) in cases {
            let mut t = HttpConnection::from_req(url);

            if let Some((parts, query)) = expected {
                assert_eq!(t.parse_url(), Ok(()));

                parts.iter().enumerate().for_each(|(i, value)| {
                    assert_eq!(str(t.request.url().path_segment(i)), Some(*value));
                });
                assert_eq!(str(t.request.url().path_segment(parts.len())), None);

                query.iter().for_each(|(name, value)| {
                    assert_eq!(str(t.request.url().query(name.as_bytes())), Some(*value));
                });
            } else {
                assert_eq!(t.parse_url(), Err(ErrorKind::InvalidUrl));
            }
        }
    }

    #[test]
    fn parse_url_asterisk_form_requires_options() {
        let mut t = HttpConnection::from_req("OPTIONS * HTTP/1.1\r\n\r\n");
        t.parser.position = 8;
        t.request.method = Method::Options;
        assert_eq!(t.parse_url(), Ok(()));
        assert_eq!(t.request.url().form(), RequestTargetForm::Asterisk);

        let mut t = HttpConnection::from_req("* HTTP/1.1\r\n\r\n");
        t.request.method = Method::Get;
        assert_eq!(t.parse_url(), Err(ErrorKind::InvalidUrl));
    }

    #[test]
    fn parse_url_absolute_form_records_authority() {
        let mut t = HttpConnection::from_req("http://example.com/api/x?q=1 ");
        assert_eq!(t.parse_url(), Ok(()));
        assert_eq!(t.request.url().form(), RequestTargetForm::Absolute);
        assert_eq!(t.request.url().authority(), Some(b"example.com".as_ref()));
        assert_eq!(str_op(t.request.url().path()), "/api/x");
    }

    #[test]
    fn connect_method_is_not_allowed() {
        let mut t = HttpConnection::from_req("host.example:443 ");
        t.request.method = Method::Connect;
        assert_eq!(t.parse_url(), Err(ErrorKind::MethodNotAllowed));
    }

    #[test]
    fn check_version() {
        #[rustfmt::skip]
        let cases = [
            ("HTTP/1.1\r\n e", Ok((Version::Http11, true))),
            ("HTTP/1.1\r\n",   Ok((Version::Http11, true))),
            ("HTTP/1.0\r\n",   Ok((Version::Http10, true))),
            ("HTTP/1.1\n",     Ok((Version::Http11, false))),
            ("HTTP/1.0\n",     Ok((Version::Http10, false))),

            ("HTTP/2.0\r\n",   Err(ErrorKind::UnsupportedVersion)),
            ("http/1.1\r\n",   Err(ErrorKind::UnsupportedVersion)),

            ("HTTP/1.15\r\n",  Err(ErrorKind::InvalidVersion)),
            (" HTTP/1.1\r\n",  Err(ErrorKind::InvalidVersion)),
            ("HTTP/1.1\r \n",  Err(ErrorKind::InvalidVersion)),
            ("HTTP/1",         Err(ErrorKind::InvalidVersion)),
            ("\r\n",           Err(ErrorKind::InvalidVersion)),
            ("",               Err(ErrorKind::InvalidVersion)),
        ];

        for (value, expected) in cases {
            let mut t = HttpConnection::from_req(value);

            if let Ok((version, has_crlf)) = expected {
                assert_eq!(t.check_version(), Ok(()));

                assert_eq!(t.request.version, version);
                assert_eq!(t.response.version, version);
                assert_eq!(t.parser.has_crlf, has_crlf);

                match t.request.version {
                    Version::Http11 => assert!(t.response.keep_alive),
                    Version::Http10 => assert!(!t.response.keep_alive),
                }
            } else if let Err(e) = expected {
                assert_eq!(t.check_version(), Err(e));
            }
        }
    }

    #[test]
    fn parse_headers_basic() {
        #[rustfmt::skip]
        let cases = [
            (
                true, "HEADER: value\r\n\r\n",
                Some((vec!["HEADER", "HeAdEr", "header"], "value")),
            ),
            (
                false, "HEADER: value\n\n",
                Some((vec!["HEADER", "HeAdEr", "header"], "value")),
            ),
            (true, ": empty-name\r\n\r\n", None),
            (true, "No-Colon value\r\n\r\n", None),
        ];

        for (has_crlf, headers, expected) in cases {
            let mut t = HttpConnection::from_req(headers);
            t.parser.has_crlf = has_crlf;

            if let Some((names, value)) = expected {
                assert_eq!(t.parse_headers(), Ok(()));

                for name in names {
                    assert_eq!(str(t.request.header(name.as_bytes())), Some(value));
                }
            } else {
                assert_eq!(t.parse_headers(), Err(ErrorKind::InvalidHeader));
            }
        }
    }

    #[test]
    fn duplicate_headers_are_comma_joined() {
        let mut t = HttpConnection::from_req(
            "x-forwarded-for: 10.0.0.1\r\nx-forwarded-for: 10.0.0.2\r\n\r\n",
        );
        t.parser.has_crlf = true;
        assert_eq!(t.parse_headers(), Ok(()));
        assert_eq!(
            str(t.request.header(b"x-forwarded-for")),
            Some("10.0.0.1, 10.0.0.2")
        );
    }

    #[test]
    fn duplicate_set_cookie_headers_stay_separate() {
        let mut t = HttpConnection::from_req(
            "set-cookie: a=1\r\nset-cookie: b=2\r\n\r\n",
        );
        t.parser.has_crlf = true;
        assert_eq!(t.parse_headers(), Ok(()));
        assert_eq!(t.request.headers.headers.len(), 2);
        assert_eq!(str(t.request.header(b"set-cookie")), Some("a=1"));
    }

    #[test]
    fn obs_fold_continuation_joins_with_single_space() {
        let mut t = HttpConnection::from_req(
            "x-custom: first\r\n second\r\n\r\n",
        );
        t.parser.has_crlf = true;
        assert_eq!(t.parse_headers(), Ok(()));
        assert_eq!(str(t.request.header(b"x-custom")), Some("first second"));
    }

    #[test]
    fn obs_fold_on_framing_header_is_rejected() {
        let mut t = HttpConnection::from_req(
            "content-length: 1\r\n 2\r\n\r\nX",
        );
        t.parser.has_crlf = true;
        assert_eq!(t.parse_headers(), Err(ErrorKind::InvalidHeader));
    }

    #[test]
    fn obs_fold_with_no_preceding_header_is_rejected() {
        let mut t = HttpConnection::from_req(" leading-fold\r\n\r\n");
        t.parser.has_crlf = true;
        assert_eq!(t.parse_headers(), Err(ErrorKind::InvalidHeader));
    }

    #[test]
    fn drop_underscore_header_reader_silently_discards_underscored_headers() {
        use crate::http::header_reader::DropUnderscoreHeaderReader;
        use std::sync::Arc;

        let mut t = HttpConnection::from_req(
            "x_forwarded_for: 10.0.0.1\r\nx-real-ip: 10.0.0.2\r\n\r\n",
        );
        t.parser.has_crlf = true;
        t.req_limits.header_reader = Arc::new(DropUnderscoreHeaderReader);

        assert_eq!(t.parse_headers(), Ok(()));
        assert_eq!(t.request.header(b"x_forwarded_for"), None);
        assert_eq!(str(t.request.header(b"x-real-ip")), Some("10.0.0.2"));
    }

    #[test]
    fn content_length_and_chunked_conflict_is_rejected() {
        let mut t = HttpConnection::from_req(
            "content-length: 4\r\ntransfer-encoding: chunked\r\n\r\n",
        );
        assert_eq!(t.parse_headers(), Err(ErrorKind::InvalidContentLength));
    }

    #[test]
    fn unsupported_transfer_coding_is_rejected() {
        let mut t = HttpConnection::from_req("transfer-encoding: gzip\r\n\r\n");
        assert_eq!(t.parse_headers(), Err(ErrorKind::InvalidHeader));
    }

    macro_rules! parse_request {
        ($cases:expr) => {
            for (req, result) in $cases {
                let mut t = HttpConnection::from_req(req);

                if let Ok(result) = result {
                    assert_eq!(t.parse(), Ok(result.2));

                    assert_eq!(t.request.method(), result.0);
                    assert_eq!(str_op(t.request.url().target()), result.1);
                    assert_eq!(t.response.version, result.2);
                    assert_eq!(t.response.keep_alive, result.3);
                } else if let Err(e) = result {
                    assert_eq!(t.parse(), Err(e));
                }
            }
        };
    }

    #[test]
    fn parse_valid_request() {
        #[rustfmt::skip]
        let cases = vec![
            (
                "GET / HTTP/1.1\r\n\r\n",
                Ok((Method::Get, "/", Version::Http11, true)),
            ),
            (
                "POST /test HTTP/1.1\r\nHOST: 127.0.0.1\r\n\r\n",
                Ok((Method::Post, "/test", Version::Http11, true)),
            ),
            (
                "HEAD / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n",
                Ok((Method::Head, "/", Version::Http11, true)),
            ),
            (
                "OPTIONS / HTTP/1.1\r\nCoNNEctIon: close\r\n\r\n",
                Ok((Method::Options, "/", Version::Http11, false)),
            ),
            (
                "GET / HTTP/1.0\r\n\r\n",
                Ok((Method::Get, "/", Version::Http10, false)),
            ),
        ];

        parse_request! { cases }
    }

    #[test]
    fn parse_invalid_request() {
        #[rustfmt::skip]
        let cases = vec![
            (" GET/ HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n", Err(ErrorKind::InvalidMethod)),
            ("GET", Err(ErrorKind::InvalidMethod)),
            ("GET ", Err(ErrorKind::InvalidUrl)),
            ("GET  HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n", Err(ErrorKind::InvalidUrl)),
            ("GET /HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n", Err(ErrorKind::InvalidVersion)),
            ("GET / HTTP/1.1 \r\nHost: 127.0.0.1\r\n\r\n", Err(ErrorKind::InvalidVersion)),
            ("GET / HTTP/1.1\r\nHost: 127.0.0.1\n\r\n", Err(ErrorKind::InvalidHeader)),
            ("GET / HTTP/1.1\nHost: 127.0.0.1\r\n\r\n", Err(ErrorKind::InvalidHeader)),
        ];

        for (req, result) in cases {
            let mut t = HttpConnection::from_req(req);
            assert_eq!(t.parse(), result);
        }
    }

    #[test]
    fn check_limits() {
        let limits = ReqLimits::default().precalculate();

        let url_size = format!("/{}", "q".repeat(limits.url_size - 1));
        let h_name = "N".repeat(limits.header_name_size);
        let h_value = "v".repeat(limits.header_value_size);

        #[rustfmt::skip]
        let cases = vec![
            (
                format!("GET {} HTTP/1.1\n\n", url_size),
                Ok((Method::Get, url_size.clone(), Version::Http11, true)),
            ),
            (
                format!("GET {url_size}e HTTP/1.1\n\n"),
                Err(ErrorKind::UriTooLong),
            ),
            (
                format!("GET / HTTP/1.1\r\n{h_name}: {h_value}\r\n\r\n"),
                Ok((Method::Get, "/".to_string(), Version::Http11, true)),
            ),
            (
                format!(
                    "GET / HTTP/1.1\r\n{}\r\n",
                    format!("{h_name}: {h_value}\r\n").repeat(limits.header_count + 1)
                ),
                Err(ErrorKind::TooManyHeaders),
            ),
        ];

        for (req, result) in cases {
            let mut t = HttpConnection::from_req(&req);

            match result {
                Ok((method, target, version, keep_alive)) => {
                    assert_eq!(t.parse(), Ok(version));
                    assert_eq!(t.request.method(), method);
                    assert_eq!(str_op(t.request.url().target()), target);
                    assert_eq!(t.response.keep_alive, keep_alive);
                }
                Err(e) => assert_eq!(t.parse(), Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod parser {
    use super::*;
    use crate::tools::*;

    #[test]
    fn reset() {
        let limits = ReqLimits::default().precalculate();
        let mut parser = Parser::new(&limits);

        parser.position = 5;
        parser.len = 10;
        parser.has_crlf = true;
        parser.buffer[0] = b'X';

        parser.reset();

        assert_eq!(Parser::new(&limits), parser);
    }

    #[test]
    fn find_slice() {
        let limits = ReqLimits::default().precalculate();
        let mut parser = Parser::from(&limits, b"GET / HTTP/1.1");

        let slice = parser.find_slice(10, b' ').unwrap();
        assert_eq!(slice, b"GET");
        assert_eq!(parser.position, 4);

        let slice = parser.find_slice(10, b' ').unwrap();
        assert_eq!(slice, b"/");
    }

    #[test]
    fn find_char() {
        let limits = ReqLimits::default().precalculate();
        let parser = Parser::from(&limits, b"hello world\nnext line");

        assert_eq!(parser.find_char(20, b' '), Some(5));
        assert_eq!(parser.find_char(20, b'\n'), Some(11));
        assert_eq!(parser.find_char(5, b'x'), None);
    }

    #[test]
    fn get_slice() {
        let limits = ReqLimits::default().precalculate();
        let parser = Parser::from(&limits, b"test data here");

        assert_eq!(str(parser.get_slice(0, 4)), Some("test"));
        assert_eq!(str(parser.get_slice(5, 4)), Some("data"));
    }

    #[test]
    fn get_slice_mut() {
        let limits = ReqLimits::default().precalculate();
        let mut parser = Parser::from(&limits, b"original");

        {
            let slice = parser.get_slice_mut(0, 8).unwrap();
            slice.copy_from_slice(b"modified");
        }

        assert_eq!(parser.get_slice(0, 8), Some(b"modified".as_ref()));
    }

    #[test]
    fn get_slice_static() {
        let limits = ReqLimits::default().precalculate();
        let parser = Parser::from(&limits, b"static data");

        assert_eq!(str(parser.get_slice_static(0, 6)), Some("static"));
        assert_eq!(str(parser.get_slice_static(7, 4)), Some("data"));
    }

    #[test]
    fn trim_cr_strips_trailing_carriage_return() {
        assert_eq!(trim_cr(b"abc\r"), b"abc");
        assert_eq!(trim_cr(b"abc"), b"abc");
    }
}

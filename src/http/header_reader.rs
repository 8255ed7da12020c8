//! The **HeaderReader** capability: a strategy object consulted for every
//! parsed header name, letting an embedder filter headers before they ever
//! reach a [`Request`](crate::Request).
//!
//! Mirrors [`ConnectionFilter`](crate::ConnectionFilter) and
//! [`tls::TlsAdapter`](crate::tls::TlsAdapter): a small trait with a
//! default no-op implementation plus one concrete variant shipped for a
//! common case.

/// Decides whether a parsed header name is kept or silently dropped.
///
/// Consulted once per header, after the name has been lowercased but
/// before the header is inserted into the request's header map. A
/// rejected header never reaches [`Request::header`](crate::Request::header)
/// and never counts towards `Content-Length`/`Connection`/
/// `Transfer-Encoding` framing.
pub trait HeaderReader: Sync + Send + 'static {
    /// Returns `true` to keep the header, `false` to discard it silently
    /// (no error, no response change).
    fn accept(&self, name: &[u8]) -> bool;
}

/// Accepts every syntactically valid header. The default for a
/// [`Request`](crate::Request) that doesn't opt into a stricter reader.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHeaderReader;

impl HeaderReader for DefaultHeaderReader {
    #[inline(always)]
    fn accept(&self, _name: &[u8]) -> bool {
        true
    }
}

/// Drops any header whose name contains an underscore.
///
/// Some upstream proxies and CGI-style gateways normalize `-` and `_` to
/// the same character, which lets a header like `X-Forwarded-For` be
/// spoofed as `X_Forwarded_For` to smuggle past a filter keyed on the
/// dashed form. Rejecting underscored names outright removes the
/// ambiguity at the source.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropUnderscoreHeaderReader;

impl HeaderReader for DropUnderscoreHeaderReader {
    #[inline(always)]
    fn accept(&self, name: &[u8]) -> bool {
        !name.contains(&b'_')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reader_accepts_everything() {
        let reader = DefaultHeaderReader;
        assert!(reader.accept(b"x-forwarded-for"));
        assert!(reader.accept(b"x_forwarded_for"));
    }

    #[test]
    fn drop_underscore_reader_rejects_underscored_names() {
        let reader = DropUnderscoreHeaderReader;
        assert!(reader.accept(b"x-forwarded-for"));
        assert!(!reader.accept(b"x_forwarded_for"));
        assert!(!reader.accept(b"x-forwarded_for"));
    }
}

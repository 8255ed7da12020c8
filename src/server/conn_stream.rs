//! `ConnStream`: the stream type that actually reaches the Worker Pool and
//! the HTTP/1.x request state machine — a bare TCP socket, or one a
//! [`TlsAdapter`](crate::tls::TlsAdapter) finished handshaking during
//! accept. Everything downstream of the Connection Manager reads and
//! writes it through `AsyncRead`/`AsyncWrite` without caring which.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::TcpStream,
};

use crate::tls::{DuplexStream, TlsEnviron};

pub(crate) enum ConnStream {
    Plain(TcpStream),
    Wrapped(Box<dyn DuplexStream>, TlsEnviron),
}

impl ConnStream {
    /// The certificate/cipher environment a TLS Adapter produced for this
    /// connection, or `None` for a plain socket.
    pub(crate) fn tls_environ(&self) -> Option<&TlsEnviron> {
        match self {
            ConnStream::Plain(_) => None,
            ConnStream::Wrapped(_, environ) => Some(environ),
        }
    }
}

impl AsyncRead for ConnStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ConnStream::Wrapped(s, _) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ConnStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            ConnStream::Wrapped(s, _) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_flush(cx),
            ConnStream::Wrapped(s, _) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ConnStream::Wrapped(s, _) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

use std::pin::Pin;
use std::task::{Context, Poll};

use hyper::body::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

pub trait DuplexStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> DuplexStream for T {}

pub type BoxedStream = Box<dyn DuplexStream>;

/// A duplex byte stream tagged with whether shutting down its write side
/// leaves the read side usable.
///
/// The tag is fixed when the stream is created so the relay knows up front
/// whether a drained direction can be half-closed.
pub enum Connection {
    PlainDuplex { inner: BoxedStream },
    HalfCloseable { inner: BoxedStream },
}

impl Connection {
    pub fn plain<S: DuplexStream + 'static>(stream: S) -> Self {
        Connection::PlainDuplex {
            inner: Box::new(stream),
        }
    }

    pub fn half_closeable<S: DuplexStream + 'static>(stream: S) -> Self {
        Connection::HalfCloseable {
            inner: Box::new(stream),
        }
    }

    pub fn is_half_closeable(&self) -> bool {
        matches!(self, Connection::HalfCloseable { .. })
    }

    /// Wrap the inner stream while keeping the capability tag.
    pub fn map<F>(self, f: F) -> Self
    where
        F: FnOnce(BoxedStream) -> BoxedStream,
    {
        match self {
            Connection::PlainDuplex { inner } => Connection::PlainDuplex { inner: f(inner) },
            Connection::HalfCloseable { inner } => Connection::HalfCloseable { inner: f(inner) },
        }
    }

    /// Replay `prefix` ahead of the remaining bytes of this connection.
    pub fn prefixed(self, prefix: Bytes) -> Self {
        if prefix.is_empty() {
            return self;
        }
        self.map(|inner| Box::new(PrefixedStream::new(prefix, inner)))
    }
}

impl From<TcpStream> for Connection {
    fn from(inner: TcpStream) -> Self {
        Connection::half_closeable(inner)
    }
}

impl AsyncRead for Connection {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Connection::PlainDuplex { inner } => Pin::new(inner).poll_read(cx, buf),
            Connection::HalfCloseable { inner } => Pin::new(inner).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match &mut *self {
            Connection::PlainDuplex { inner } => Pin::new(inner).poll_write(cx, buf),
            Connection::HalfCloseable { inner } => Pin::new(inner).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Connection::PlainDuplex { inner } => Pin::new(inner).poll_flush(cx),
            Connection::HalfCloseable { inner } => Pin::new(inner).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Connection::PlainDuplex { inner } => Pin::new(inner).poll_shutdown(cx),
            Connection::HalfCloseable { inner } => Pin::new(inner).poll_shutdown(cx),
        }
    }
}

/// A stream whose reads first drain `prefix`, then continue on `inner`.
/// Writes go straight to `inner`.
pub struct PrefixedStream<S> {
    prefix: Bytes,
    inner: S,
}

impl<S> PrefixedStream<S> {
    pub fn new(prefix: Bytes, inner: S) -> Self {
        Self { prefix, inner }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PrefixedStream<S> {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        if !self.prefix.is_empty() {
            let n = self.prefix.len().min(buf.remaining());
            let chunk = self.prefix.split_to(n);
            buf.put_slice(&chunk);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PrefixedStream<S> {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

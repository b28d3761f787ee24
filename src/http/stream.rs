//! Response-body plumbing for streamed `git` output.
//!
//! [`BodyWriter`] is an [`AsyncWrite`] whose bytes become HTTP body frames.
//! It only hands a frame to the client when it is flushed (or its buffer
//! fills up), so a plain `tokio::io::copy` into it may hold data back.
//! [`FlushingWriter`] wraps any writer and flushes after every write, which
//! is what keeps large pack transfers moving incrementally.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::PollSender;

/// Frames queued between the streaming task and the HTTP connection.
const CHANNEL_DEPTH: usize = 16;

/// Bytes buffered by [`BodyWriter`] before it emits a frame on its own.
const MAX_BUFFERED: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// FlushingWriter
// ---------------------------------------------------------------------------

/// Decorator that forces a flush after every successful write.
#[derive(Debug)]
pub struct FlushingWriter<W> {
    inner: W,
    pending_flush: bool,
    written: usize,
}

impl<W> FlushingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            pending_flush: false,
            written: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for FlushingWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;

        // A write is only reported once its flush has completed, so a caller
        // never observes success for bytes still sitting in `inner`.
        if !this.pending_flush {
            let n = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
            if n == 0 {
                return Poll::Ready(Ok(0));
            }
            this.written = n;
            this.pending_flush = true;
        }

        ready!(Pin::new(&mut this.inner).poll_flush(cx))?;
        this.pending_flush = false;
        Poll::Ready(Ok(this.written))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

// ---------------------------------------------------------------------------
// BodyWriter
// ---------------------------------------------------------------------------

/// Writer half of a streamed response body.
///
/// Created together with its [`Body`] by [`body_channel`].  Once the body is
/// dropped (the client went away) every write fails with
/// [`io::ErrorKind::BrokenPipe`].
pub struct BodyWriter {
    tx: PollSender<io::Result<Bytes>>,
    buf: BytesMut,
}

/// Create a connected ([`BodyWriter`], [`Body`]) pair.
pub fn body_channel() -> (BodyWriter, Body) {
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let writer = BodyWriter {
        tx: PollSender::new(tx),
        buf: BytesMut::new(),
    };
    (writer, Body::from_stream(ReceiverStream::new(rx)))
}

impl BodyWriter {
    /// Resolves once the [`Body`] side has been dropped.
    ///
    /// The returned future does not borrow the writer, so it can be raced
    /// against a copy that is blocked on its input rather than on a write.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let weak = self.tx.get_ref().map(mpsc::Sender::downgrade);
        async move {
            if let Some(tx) = weak.and_then(|w| w.upgrade()) {
                tx.closed().await;
            }
        }
    }

    /// Push the buffered bytes to the body as one frame.
    fn poll_send_buffered(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.buf.is_empty() {
            return Poll::Ready(Ok(()));
        }
        ready!(self.tx.poll_reserve(cx)).map_err(|_| closed())?;
        let frame = self.buf.split().freeze();
        self.tx.send_item(Ok(frame)).map_err(|_| closed())?;
        Poll::Ready(Ok(()))
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "response body receiver dropped")
}

impl AsyncWrite for BodyWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        if this.tx.is_closed() {
            return Poll::Ready(Err(closed()));
        }
        if this.buf.len() >= MAX_BUFFERED {
            ready!(this.poll_send_buffered(cx))?;
        }
        let n = buf.len().min(MAX_BUFFERED - this.buf.len());
        this.buf.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_send_buffered(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.as_mut().poll_send_buffered(cx))?;
        self.tx.close();
        Poll::Ready(Ok(()))
    }
}

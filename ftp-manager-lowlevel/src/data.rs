use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt};

/// Data stream handed out by suppaftp, which speaks `futures-io`.
pub(crate) trait RawStream: futures_io::AsyncRead + futures_io::AsyncWrite + Send + Unpin {}

impl<T> RawStream for T where T: futures_io::AsyncRead + futures_io::AsyncWrite + Send + Unpin {}

pub(crate) type BoxedStream = Box<dyn RawStream>;

/// A passive-mode data connection, usable from tokio.
///
/// Reading yields the content of a `RETR`, writing feeds a `STOR`.
/// Give it back to the [`FtpSession`](crate::FtpSession) that opened it
/// to read the completion reply.
#[pin_project]
pub struct DataChannel {
    #[pin]
    stream: Compat<BoxedStream>,
    command: String,
}

impl DataChannel {
    pub(crate) fn new<S>(stream: S, command: String) -> Self
    where
        S: RawStream + 'static,
    {
        let stream: BoxedStream = Box::new(stream);

        Self {
            stream: stream.compat(),
            command,
        }
    }

    /// The command that opened this channel, e.g. `RETR /pub/a.txt`.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub(crate) fn into_parts(self) -> (BoxedStream, String) {
        (self.stream.into_inner(), self.command)
    }
}

impl fmt::Debug for DataChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChannel")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for DataChannel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().stream.poll_read(cx, buf)
    }
}

impl AsyncWrite for DataChannel {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().stream.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().stream.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().stream.poll_shutdown(cx)
    }
}

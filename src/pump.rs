use super::{Auxiliary, Error};

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Fixed size buffer bytes are moved through, with `buffer[offset..limit]`
/// holding what has been read but not written yet.
#[derive(Debug)]
pub(super) struct Pump {
    buffer: BytesMut,
    offset: usize,
    limit: usize,
    eof: bool,
}

impl Pump {
    pub(super) fn new(capacity: usize) -> Self {
        let mut buffer = BytesMut::with_capacity(capacity);
        buffer.resize(capacity, 0);

        Self {
            buffer,
            offset: 0,
            limit: 0,
            eof: false,
        }
    }

    fn is_drained(&self) -> bool {
        self.eof && self.offset == self.limit
    }

    /// Move everything from `reader` into `writer`.
    ///
    /// Reading is only attempted while there is free space left in the
    /// buffer, writing only while there are pending bytes. Every byte
    /// accepted by `writer` is accounted for in `auxiliary`.
    ///
    /// `writer` is neither flushed nor shut down.
    pub(super) async fn run<R, W>(
        &mut self,
        reader: &mut R,
        writer: &mut W,
        auxiliary: &Auxiliary,
        cancel_token: &CancellationToken,
    ) -> Result<u64, Error>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut total = 0;

        while !self.is_drained() {
            let (filled, free) = self.buffer.split_at_mut(self.limit);
            let pending = &filled[self.offset..];
            let can_read = !self.eof && !free.is_empty();

            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => return Err(Error::Aborted),

                res = writer.write(pending), if !pending.is_empty() => {
                    let n = res.map_err(Error::WriteError)?;
                    if n == 0 {
                        return Err(Error::WriteError(io::ErrorKind::WriteZero.into()));
                    }

                    self.offset += n;
                    if self.offset == self.limit {
                        self.offset = 0;
                        self.limit = 0;
                    }

                    total += n as u64;
                    auxiliary.add_processed(n as u64);
                }

                res = reader.read(free), if can_read => {
                    match res.map_err(Error::ReadError)? {
                        0 => self.eof = true,
                        n => self.limit += n,
                    }
                }
            }
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Action;

    use std::pin::Pin;
    use std::task::{Context, Poll};

    use pretty_assertions::assert_eq;
    use tokio::io::ReadBuf;

    fn auxiliary() -> (Auxiliary, CancellationToken) {
        let auxiliary = Auxiliary::new();
        let cancel_token = auxiliary.begin(Action::UploadFile).unwrap();
        (auxiliary, cancel_token)
    }

    /// Accept at most `chunk` bytes per write.
    struct ShortWriter {
        chunk: usize,
        data: Vec<u8>,
    }

    impl AsyncWrite for ShortWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let n = buf.len().min(self.chunk);
            self.data.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()))
        }
    }

    #[tokio::test]
    async fn test_partial_writes() {
        let (auxiliary, cancel_token) = auxiliary();
        auxiliary.set_file_size(100_000);

        let content: Vec<u8> = (0..100_000).map(|i| (i % 251) as u8).collect();
        let mut writer = ShortWriter {
            chunk: 1000,
            data: Vec::new(),
        };

        let total = Pump::new(4096)
            .run(&mut &content[..], &mut writer, &auxiliary, &cancel_token)
            .await
            .unwrap();

        assert_eq!(total, 100_000);
        assert_eq!(writer.data, content);

        let snapshot = auxiliary.snapshot().unwrap();
        assert_eq!(snapshot.bytes_processed, 100_000);
        assert_eq!(snapshot.file_size_processed, 100_000);
        assert_eq!(snapshot.progress, 1.0);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let (auxiliary, cancel_token) = auxiliary();
        let mut sink = Vec::new();

        let total = Pump::new(16)
            .run(&mut &b""[..], &mut sink, &auxiliary, &cancel_token)
            .await
            .unwrap();

        assert_eq!(total, 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_write_zero() {
        let (auxiliary, cancel_token) = auxiliary();
        let mut writer = ShortWriter {
            chunk: 0,
            data: Vec::new(),
        };

        let err = Pump::new(16)
            .run(&mut &b"abc"[..], &mut writer, &auxiliary, &cancel_token)
            .await
            .unwrap_err();

        assert!(
            matches!(&err, Error::WriteError(err) if err.kind() == io::ErrorKind::WriteZero),
            "{err:#?}"
        );
    }

    #[tokio::test]
    async fn test_read_error() {
        let (auxiliary, cancel_token) = auxiliary();
        let mut sink = Vec::new();

        let err = Pump::new(16)
            .run(&mut FailingReader, &mut sink, &auxiliary, &cancel_token)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ReadError(_)), "{err:#?}");
    }

    #[tokio::test]
    async fn test_aborted() {
        let (auxiliary, cancel_token) = auxiliary();
        auxiliary.abort();

        let mut sink = Vec::new();
        let err = Pump::new(16)
            .run(&mut &b"abc"[..], &mut sink, &auxiliary, &cancel_token)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Aborted), "{err:#?}");
        assert!(sink.is_empty());
    }
}

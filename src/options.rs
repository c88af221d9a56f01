use std::num::NonZeroUsize;
use std::time::Duration;

use ftp_manager_lowlevel::DEFAULT_COPY_BUFLEN;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Options when creating a [`TransferEngine`](crate::TransferEngine) or a
/// [`RawCommandChannel`](crate::RawCommandChannel).
#[derive(Debug, Copy, Clone, Default)]
pub struct Options {
    connect_timeout: Option<Duration>,
    data_timeout: Option<Duration>,
    buffer_size: Option<NonZeroUsize>,
}

impl Options {
    /// Create a new [`Options`].
    pub const fn new() -> Self {
        Self {
            connect_timeout: None,
            data_timeout: None,
            buffer_size: None,
        }
    }

    /// Set `connect_timeout`, default value is 30s.
    ///
    /// It bounds the tcp connect and the server greeting.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub(super) fn get_connect_timeout(&self) -> Duration {
        self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    /// Set `data_timeout`, default value is 30s.
    ///
    /// It bounds every reply after the greeting and the connect of
    /// each data channel.
    #[must_use]
    pub const fn data_timeout(mut self, timeout: Duration) -> Self {
        self.data_timeout = Some(timeout);
        self
    }

    pub(super) fn get_data_timeout(&self) -> Duration {
        self.data_timeout.unwrap_or(DEFAULT_DATA_TIMEOUT)
    }

    /// Set `buffer_size`, default value is 32768.
    ///
    /// Size of the buffer bytes are pumped through.
    #[must_use]
    pub const fn buffer_size(mut self, buffer_size: NonZeroUsize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    pub(super) fn get_buffer_size(&self) -> usize {
        self.buffer_size
            .map(NonZeroUsize::get)
            .unwrap_or(DEFAULT_COPY_BUFLEN)
    }
}

use super::listing::parse_listing_line;
use super::{DataChannel, Error, Reply};

use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;

use suppaftp::types::{FileType as TransferType, FtpError, FtpResult};
use suppaftp::{AsyncFtpStream, Status};
use tokio::time::timeout;

/// Reply codes accepted by [`FtpSession::execute`] without a detour
/// through [`FtpError::UnexpectedResponse`].
const COMPLETIONS: &[Status] = &[
    Status::CommandOk,
    Status::File,
    Status::RequestedFileActionOk,
];

fn timed_out(command: &str) -> Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("`{command}` timed out")).into()
}

fn command_error(command: &str, err: FtpError) -> Error {
    match err {
        FtpError::UnexpectedResponse(response) => {
            Reply::new(response.status.code(), &response.body).into_command_error(command)
        }
        FtpError::ConnectionError(source) => Error::IOError(source),
        err => Error::InvalidReply(err.to_string()),
    }
}

/// Await one suppaftp request, bounded by `timeout_dur`.
async fn bounded<T, F>(timeout_dur: Duration, command: &str, fut: F) -> Result<T, Error>
where
    F: Future<Output = FtpResult<T>>,
{
    tracing::trace!(">>> {command}");

    timeout(timeout_dur, fut)
        .await
        .map_err(|_| timed_out(command))?
        .map_err(|err| command_error(command, err))
}

/// One control connection, driven through [`AsyncFtpStream`].
///
/// Every method issues one request and waits for its final reply, except
/// [`FtpSession::retrieve`] / [`FtpSession::store`], which leave the
/// transfer open until the [`DataChannel`] is given back.
pub struct FtpSession {
    stream: AsyncFtpStream,
    addr: String,
    timeout: Duration,
}

impl fmt::Debug for FtpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpSession")
            .field("addr", &self.addr)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl FtpSession {
    /// Connect to `addr` (`host:port`) and consume the greeting.
    ///
    /// `timeout_dur` bounds the connect and, until
    /// [`FtpSession::set_timeout`] is called, every later request.
    pub async fn connect(addr: &str, timeout_dur: Duration) -> Result<Self, Error> {
        let stream = timeout(timeout_dur, AsyncFtpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectTimeout {
                addr: addr.to_owned(),
            })?
            .map_err(|err| Error::ConnectionError {
                addr: addr.to_owned(),
                source: match err {
                    FtpError::ConnectionError(source) => source,
                    err => io::Error::new(io::ErrorKind::ConnectionRefused, err.to_string()),
                },
            })?;

        tracing::debug!(addr, "connected");

        Ok(Self {
            stream,
            addr: addr.to_owned(),
            timeout: timeout_dur,
        })
    }

    /// Change the timeout applied to every request.
    pub fn set_timeout(&mut self, timeout_dur: Duration) {
        self.timeout = timeout_dur;
    }

    /// Authenticate with `USER` and, if asked for, `PASS`.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), Error> {
        let command = format!("USER {username}");

        bounded(self.timeout, &command, self.stream.login(username, password))
            .await
            .map_err(|err| match err {
                Error::CommandError { code, reply, .. } => Error::AuthError { code, reply },
                err => err,
            })?;

        tracing::debug!(username, "logged in");

        Ok(())
    }

    /// Send `command` and return the reply of the server, positive or not.
    ///
    /// Only failures to talk to the server are errors.
    pub async fn execute(&mut self, command: &str) -> Result<Reply, Error> {
        tracing::trace!(">>> {command}");

        let res = timeout(self.timeout, self.stream.custom_command(command, COMPLETIONS))
            .await
            .map_err(|_| timed_out(command))?;

        let reply = match res {
            Ok(response) | Err(FtpError::UnexpectedResponse(response)) => {
                Reply::new(response.status.code(), &response.body)
            }
            Err(err) => return Err(command_error(command, err)),
        };

        tracing::trace!("<<< {}", reply.text());

        Ok(reply)
    }

    /// Like [`FtpSession::execute`], but a negative reply is turned into
    /// [`Error::CommandError`].
    pub async fn expect_positive(&mut self, command: &str) -> Result<Reply, Error> {
        let reply = self.execute(command).await?;

        if reply.is_positive() {
            Ok(reply)
        } else {
            Err(reply.into_command_error(command))
        }
    }

    /// `TYPE I`
    pub async fn transfer_type_binary(&mut self) -> Result<(), Error> {
        bounded(
            self.timeout,
            "TYPE I",
            self.stream.transfer_type(TransferType::Binary),
        )
        .await
    }

    /// Start downloading `path`.
    pub async fn retrieve(&mut self, path: &str) -> Result<DataChannel, Error> {
        let command = format!("RETR {path}");
        let stream = bounded(self.timeout, &command, self.stream.retr_as_stream(path)).await?;

        Ok(DataChannel::new(stream, command))
    }

    /// Close the data channel of a [`FtpSession::retrieve`] and read the
    /// completion reply.
    pub async fn finish_retrieve(&mut self, data: DataChannel) -> Result<(), Error> {
        let (stream, command) = data.into_parts();

        bounded(
            self.timeout,
            &command,
            self.stream.finalize_retr_stream(stream),
        )
        .await
    }

    /// Start uploading to `path`, replacing any existing file.
    pub async fn store(&mut self, path: &str) -> Result<DataChannel, Error> {
        let command = format!("STOR {path}");
        let stream = bounded(self.timeout, &command, self.stream.put_with_stream(path)).await?;

        Ok(DataChannel::new(stream, command))
    }

    /// Close the data channel of a [`FtpSession::store`] and read the
    /// completion reply.
    ///
    /// The channel should be shut down first, so that a failure to flush
    /// the last bytes is reported as a write error.
    pub async fn finish_store(&mut self, data: DataChannel) -> Result<(), Error> {
        let (stream, command) = data.into_parts();

        bounded(
            self.timeout,
            &command,
            self.stream.finalize_put_stream(stream),
        )
        .await
    }

    /// Lines of `LIST path`, without line terminators.
    pub async fn list(&mut self, path: &str) -> Result<Vec<String>, Error> {
        let command = format!("LIST {path}");
        let lines = bounded(self.timeout, &command, self.stream.list(Some(path))).await?;

        Ok(lines
            .into_iter()
            .map(|line| line.trim_end_matches(|c| c == '\r' || c == '\n').to_owned())
            .collect())
    }

    /// Size of `path` according to `SIZE`.
    pub async fn size(&mut self, path: &str) -> Result<u64, Error> {
        let command = format!("SIZE {path}");
        let size = bounded(self.timeout, &command, self.stream.size(path)).await?;

        Ok(size as u64)
    }

    /// Size of `path` taken from the listing line of `STAT path`.
    ///
    /// For servers without `SIZE`. Return `None` if the reply carries no
    /// usable listing line.
    pub async fn stat_size(&mut self, path: &str) -> Result<Option<u64>, Error> {
        let command = format!("STAT {path}");
        let reply = self.expect_positive(&command).await?;

        Ok(reply
            .body()
            .iter()
            .find_map(|line| parse_listing_line(line.trim())?.len()))
    }

    /// `MKD path`
    pub async fn make_dir(&mut self, path: &str) -> Result<(), Error> {
        let command = format!("MKD {path}");
        bounded(self.timeout, &command, self.stream.mkdir(path)).await
    }

    /// `RMD path`
    pub async fn remove_dir(&mut self, path: &str) -> Result<(), Error> {
        self.expect_positive(&format!("RMD {path}")).await.map(drop)
    }

    /// Log out and close the connection.
    pub async fn quit(mut self) -> Result<(), Error> {
        bounded(self.timeout, "QUIT", self.stream.quit()).await
    }
}

#![forbid(unsafe_code)]

use std::io;

use thiserror::Error as ThisError;

/// Error returned by
/// [`ftp-manager-lowlevel`](../ftp_manager_lowlevel/index.html)
/// and [`ftp-manager`](../ftp_manager/index.html)
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum Error {
    /// Reading from the source of a transfer failed.
    #[error("Failed to read from the source stream: {0}.")]
    ReadError(#[source] io::Error),

    /// Writing to the sink of a transfer failed.
    #[error("Failed to write to the sink stream: {0}.")]
    WriteError(#[source] io::Error),

    /// The operation was aborted by [`abort`](../ftp_manager/struct.TransferEngine.html#method.abort).
    #[error("Operation aborted.")]
    Aborted,

    /// Failed to establish a tcp connection to the server.
    #[error("Failed to connect to {addr}: {source}.")]
    ConnectionError {
        /// `host:port` that was dialed.
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Establishing the tcp connection took longer than the configured timeout.
    #[error("Connecting to {addr} timed out.")]
    ConnectTimeout {
        /// `host:port` that was dialed.
        addr: String,
    },

    /// Server refused the credentials.
    #[error("Server rejected login with {code}: {reply}")]
    AuthError {
        /// Reply code of the rejected `USER` or `PASS`.
        code: u16,
        /// Last line of the reply.
        reply: String,
    },

    /// Server answered a command with a negative reply.
    #[error("Server rejected `{command}` with {code}: {reply}")]
    CommandError {
        /// The command sent, with arguments.
        command: String,
        /// Reply code.
        code: u16,
        /// Last line of the reply.
        reply: String,
    },

    /// Server sent something that is not a well-formed ftp reply.
    #[error("Reply from ftp server is invalid: {0:?}")]
    InvalidReply(String),

    /// The server descriptor cannot be used to connect.
    #[error("Invalid server descriptor: {0}")]
    InvalidServer(
        // Use `&&str` since `&str` takes 16 bytes while `&str` only takes 8 bytes.
        &'static &'static str,
    ),

    /// Another operation is already in flight on this engine.
    #[error("Another operation is already in progress on this engine.")]
    OperationInProgress,

    /// IO Error that is not attributed to either end of a transfer.
    #[error("IO Error: {0}.")]
    IOError(#[from] io::Error),

    /// tokio join error
    #[error("Failed to join tokio task")]
    TaskJoinError(#[from] tokio::task::JoinError),

    /// Raised 2 errors when cleaning up.
    #[error(transparent)]
    RecursiveErrors(Box<RecursiveError>),
}

impl Error {
    /// Create [`Error::CommandError`] from the command and the reply it got.
    pub fn command(command: impl Into<String>, code: u16, reply: impl Into<String>) -> Self {
        Error::CommandError {
            command: command.into(),
            code,
            reply: reply.into(),
        }
    }

    /// Classify this error into the coarse taxonomy callers use for
    /// retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ReadError(_) => ErrorKind::ReadError,
            Error::WriteError(_) => ErrorKind::WriteError,
            Error::Aborted => ErrorKind::Aborted,
            Error::ConnectionError { .. } | Error::ConnectTimeout { .. } => {
                ErrorKind::ConnectionError
            }
            Error::AuthError { .. } => ErrorKind::AuthError,
            Error::CommandError { .. } => ErrorKind::CommandError,
            // The error that triggered the cleanup is the one that matters.
            Error::RecursiveErrors(err) => err.original_error.kind(),
            Error::InvalidReply(_)
            | Error::InvalidServer(_)
            | Error::OperationInProgress
            | Error::IOError(_)
            | Error::TaskJoinError(_) => ErrorKind::GeneralError,
        }
    }

    /// The raw reply line attached to the error, if the server sent one.
    pub fn reply(&self) -> Option<&str> {
        match self {
            Error::AuthError { reply, .. } | Error::CommandError { reply, .. } => Some(reply),
            Error::InvalidReply(reply) => Some(reply),
            Error::RecursiveErrors(err) => err.original_error.reply(),
            _ => None,
        }
    }
}

/// Coarse classification of [`Error`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Reading the source failed mid-transfer.
    ReadError,
    /// Writing the sink failed mid-transfer.
    WriteError,
    /// Stream open failures, STAT failures, malformed replies and
    /// everything else not covered by another kind.
    GeneralError,
    /// Cancelled by the caller.
    Aborted,
    /// The control connection could not be established.
    ConnectionError,
    /// The server did not accept the credentials.
    AuthError,
    /// The server rejected a command.
    CommandError,
}

#[derive(Debug, ThisError)]
#[error("OriginalError: {original_error}, curr err raised when cleaning up: {occuring_error}.")]
pub struct RecursiveError {
    /// Original error
    pub original_error: Error,

    /// Current error raised when performing cleanup
    /// for original error.
    #[source]
    pub occuring_error: Error,
}

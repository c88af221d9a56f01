//! This crate provides the transport that `ftp-manager` drives.
//!
//! [`FtpSession`] wraps a [`suppaftp::AsyncFtpStream`]: it bounds every
//! request with a timeout and maps failures onto [`Error`], keeping the
//! command and the reply of the server.
//!
//! It does not pump data itself. [`FtpSession::retrieve`] and
//! [`FtpSession::store`] hand out a [`DataChannel`], which implements
//! [`tokio::io::AsyncRead`] and [`tokio::io::AsyncWrite`], and the caller
//! moves the bytes. The channel is then given back to
//! [`FtpSession::finish_retrieve`] or [`FtpSession::finish_store`] to
//! collect the completion reply.
//!
//! Directory listings are parsed with [`suppaftp::list::File`] and exposed
//! as [`DirectoryEntry`].

#![forbid(unsafe_code)]

pub use ftp_manager_error::{Error, ErrorKind, RecursiveError};

/// Default size of the buffer used to copy between streams.
pub const DEFAULT_COPY_BUFLEN: usize = 32768;

/// Default ftp control port.
pub const DEFAULT_PORT: u16 = 21;

/// Username that selects anonymous login.
pub const ANONYMOUS: &str = "anonymous";

mod reply;
pub use reply::Reply;

mod session;
pub use session::FtpSession;

mod data;
pub use data::DataChannel;

mod listing;
pub use listing::{parse_listing, parse_listing_line, DirectoryEntry, FileType, ResourceKey};

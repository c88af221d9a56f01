//! A blocking ftp client engine.
//!
//! [`TransferEngine`] runs one operation at a time (upload, download,
//! directory listing, folder creation or a login check) against the server
//! described by a [`ServerDescriptor`]. While an operation is running,
//! other threads may poll [`TransferEngine::progress`] and call
//! [`TransferEngine::abort`].
//!
//! [`RawCommandChannel`] issues the remaining one-shot commands: deleting
//! files and directories and changing permissions.
//!
//! ```no_run
//! use ftp_manager::{ServerDescriptor, TransferEngine};
//!
//! # fn main() -> Result<(), ftp_manager::Error> {
//! let server = ServerDescriptor::new("ftp://ftp.example.com/pub", "user", "secret")?;
//! let engine = TransferEngine::new()?;
//!
//! engine.upload_file("report.pdf", &server)?;
//! for entry in engine.contents_of_server(&server)? {
//!     println!("{} {:?}", entry.name(), entry.len());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub use ftp_manager_error::{Error, ErrorKind, RecursiveError};
pub use ftp_manager_lowlevel::{DirectoryEntry, FileType, Reply, ResourceKey};

mod cancel_utility;

mod options;
pub use options::Options;

mod server;
pub use server::ServerDescriptor;

mod progress;
pub use progress::{Action, FailureReason, ProgressSnapshot};

mod auxiliary;
use auxiliary::Auxiliary;

mod pump;

mod engine;
pub use engine::TransferEngine;

mod raw_command;
pub use raw_command::{classify_delete_reply, DeleteOutcome, RawCommandChannel};

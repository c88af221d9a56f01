use super::Error;

use std::fmt;

/// Operation a [`TransferEngine`](crate::TransferEngine) is running.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Action {
    UploadFile,
    DownloadFile,
    CreateFolder,
    ListDirectory,
    CheckLogin,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::UploadFile => "upload file",
            Action::DownloadFile => "download file",
            Action::CreateFolder => "create folder",
            Action::ListDirectory => "list directory",
            Action::CheckLogin => "check login",
        })
    }
}

/// Why the last operation of a [`TransferEngine`](crate::TransferEngine)
/// failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FailureReason {
    /// Reading the source stream failed.
    ReadError,
    /// Writing the sink stream failed.
    WriteError,
    /// Opening a stream, logging in or any protocol level failure.
    GeneralError,
    /// [`TransferEngine::abort`](crate::TransferEngine::abort) was called.
    Aborted,
}

impl From<&Error> for FailureReason {
    fn from(err: &Error) -> Self {
        match err {
            Error::ReadError(_) => FailureReason::ReadError,
            Error::WriteError(_) => FailureReason::WriteError,
            Error::Aborted => FailureReason::Aborted,
            Error::RecursiveErrors(err) => FailureReason::from(&err.original_error),
            _ => FailureReason::GeneralError,
        }
    }
}

/// A coherent copy of the counters of the running operation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// `0.0..=1.0`, or [`ProgressSnapshot::FAILED`].
    pub progress: f32,
    /// Expected size of the file being transferred.
    pub file_size: u64,
    /// Bytes moved during the whole operation.
    pub bytes_processed: u64,
    /// Bytes moved for the current file.
    pub file_size_processed: u64,
}

impl ProgressSnapshot {
    /// Value of [`ProgressSnapshot::progress`] once the operation failed.
    pub const FAILED: f32 = -1.0;

    /// Return true if the operation this snapshot belongs to failed.
    pub fn is_failed(&self) -> bool {
        self.progress < 0.0
    }
}

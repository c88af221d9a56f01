use super::{Error, Options, ServerDescriptor};

use std::io;

use ftp_manager_lowlevel::{FtpSession, Reply};
use tokio::runtime::{Builder, Runtime};

/// Reply texts of servers refusing `DELE` because the path is a directory.
///
/// Matched case-insensitively against 550 replies.
const DIRECTORY_REPLIES: &[&str] = &[
    "is a directory",
    "not a regular file",
    "not a plain file",
    "is not a file",
    // vsftpd
    "delete operation failed",
];

/// How the server answered `DELE`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DeleteOutcome {
    Deleted,
    /// The path is a directory and has to be removed with `RMD`.
    IsDirectory,
    Failed,
}

/// Classify the reply to `DELE`.
pub fn classify_delete_reply(reply: &Reply) -> DeleteOutcome {
    if reply.is_positive() {
        return DeleteOutcome::Deleted;
    }

    if reply.code == 550 {
        let text = reply.message().to_ascii_lowercase();

        if DIRECTORY_REPLIES.iter().any(|pattern| text.contains(pattern)) {
            return DeleteOutcome::IsDirectory;
        }
    }

    DeleteOutcome::Failed
}

/// Issue the one-shot commands the transfer engine does not cover:
/// deleting and changing permissions.
///
/// Every call opens its own control connection and closes it before
/// returning.
#[derive(Debug)]
pub struct RawCommandChannel {
    runtime: Runtime,
    options: Options,
}

impl RawCommandChannel {
    /// Create [`RawCommandChannel`] with default [`Options`].
    pub fn new() -> Result<Self, Error> {
        Self::with_options(Options::new())
    }

    pub fn with_options(options: Options) -> Result<Self, Error> {
        let runtime = Builder::new_current_thread().enable_all().build()?;

        Ok(Self { runtime, options })
    }

    async fn connect(&self, server: &ServerDescriptor) -> Result<FtpSession, Error> {
        let mut session =
            FtpSession::connect(&server.address(), self.options.get_connect_timeout()).await?;
        session.set_timeout(self.options.get_data_timeout());
        session.login(server.username(), server.password()).await?;

        Ok(session)
    }

    /// Log out, keeping the outcome of the commands sent before.
    async fn finish<T>(session: FtpSession, res: Result<T, Error>) -> Result<T, Error> {
        if let Err(err) = session.quit().await {
            tracing::debug!(?err, "failed to log out");
        }

        res
    }

    /// Delete the file `name` inside [`ServerDescriptor::remote_path`].
    ///
    /// If the server reports that `name` is a directory, it is removed with
    /// `RMD` instead.
    pub fn delete_file_named(&self, name: &str, server: &ServerDescriptor) -> Result<(), Error> {
        let path = server.path_for(name);

        self.runtime.block_on(async {
            let mut session = self.connect(server).await?;
            let res = delete_file(&mut session, &path).await;
            Self::finish(session, res).await
        })
    }

    /// Delete `absolute_path` on the server.
    ///
    /// A trailing `/` marks a directory, which is removed with `RMD`.
    pub fn delete_path(&self, absolute_path: &str, server: &ServerDescriptor) -> Result<(), Error> {
        self.runtime.block_on(async {
            let mut session = self.connect(server).await?;
            let res = match absolute_path.strip_suffix('/') {
                Some(dir) if !dir.is_empty() => session.remove_dir(dir).await,
                _ => delete_file(&mut session, absolute_path).await,
            };
            Self::finish(session, res).await
        })
    }

    /// Change the permissions of `name` inside
    /// [`ServerDescriptor::remote_path`] with `SITE CHMOD`.
    ///
    /// Only servers emulating unix permissions support this.
    pub fn chmod_file_named(
        &self,
        name: &str,
        mode: u32,
        server: &ServerDescriptor,
    ) -> Result<(), Error> {
        if mode > 0o7777 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "mode out of range").into());
        }

        let command = format!("SITE CHMOD {:03o} {}", mode, server.path_for(name));

        self.runtime.block_on(async {
            let mut session = self.connect(server).await?;
            let res = session.expect_positive(&command).await.map(drop);
            Self::finish(session, res).await
        })
    }
}

/// `DELE path`, falling back to `RMD path` if the server says `path` is a
/// directory.
///
/// If `RMD` fails too, the rejection of `DELE` is returned: some servers
/// answer `DELE` of a missing file the same way as `DELE` of a directory.
async fn delete_file(session: &mut FtpSession, path: &str) -> Result<(), Error> {
    let command = format!("DELE {path}");
    let reply = session.execute(&command).await?;

    match classify_delete_reply(&reply) {
        DeleteOutcome::Deleted => Ok(()),
        DeleteOutcome::IsDirectory => {
            tracing::debug!(%path, reply = reply.text(), "not a file, trying RMD");

            match session.remove_dir(path).await {
                Err(err @ Error::CommandError { .. }) => {
                    tracing::debug!(?err, %path, "RMD failed too");
                    Err(Error::command(command, reply.code, reply.text()))
                }
                res => res,
            }
        }
        DeleteOutcome::Failed => Err(Error::command(command, reply.code, reply.text())),
    }
}

use super::{
    cancel_utility::run_cancellable, pump::Pump, Action, Auxiliary, DirectoryEntry, Error,
    FailureReason, Options, ProgressSnapshot, RecursiveError, ServerDescriptor,
};

use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use ftp_manager_lowlevel::{parse_listing, FtpSession};
use scopeguard::ScopeGuard;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Everything an operation needs, moved into the task running it.
#[derive(Debug)]
struct Context {
    auxiliary: Arc<Auxiliary>,
    options: Options,
    cancel_token: CancellationToken,
    server: ServerDescriptor,
}

impl Context {
    async fn cancellable<T, F>(&self, future: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        run_cancellable(&self.cancel_token, future).await
    }

    async fn connect(&self) -> Result<FtpSession, Error> {
        self.cancellable(async {
            let mut session = FtpSession::connect(
                &self.server.address(),
                self.options.get_connect_timeout(),
            )
            .await?;
            session.set_timeout(self.options.get_data_timeout());

            session
                .login(self.server.username(), self.server.password())
                .await?;

            Ok(session)
        })
        .await
    }

    /// Connect, log in and switch to binary mode.
    async fn connect_binary(&self) -> Result<FtpSession, Error> {
        let mut session = self.connect().await?;
        self.cancellable(session.transfer_type_binary()).await?;
        Ok(session)
    }

    fn pump(&self) -> Pump {
        Pump::new(self.options.get_buffer_size())
    }
}

/// Log out, ignoring failures since the operation already succeeded.
async fn logout(session: FtpSession) {
    if let Err(err) = session.quit().await {
        tracing::warn!(?err, "failed to log out");
    }
}

async fn upload<R>(ctx: Context, mut source: R, name: String) -> Result<(), Error>
where
    R: AsyncRead + Unpin,
{
    let path = ctx.server.path_for(&name);

    let mut session = ctx.connect_binary().await?;
    let mut data = ctx.cancellable(session.store(&path)).await?;

    ctx.pump()
        .run(&mut source, &mut data, &ctx.auxiliary, &ctx.cancel_token)
        .await?;

    ctx.cancellable(async { data.shutdown().await.map_err(Error::WriteError) })
        .await?;
    ctx.cancellable(session.finish_store(data)).await?;
    logout(session).await;

    tracing::info!(%path, "uploaded");

    Ok(())
}

async fn upload_file(ctx: Context, local_path: PathBuf) -> Result<(), Error> {
    let name = local_path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?
        .to_string_lossy()
        .into_owned();

    let file = fs::File::open(&local_path).await?;
    ctx.auxiliary.set_file_size(file.metadata().await?.len());

    upload(ctx, file, name).await
}

async fn upload_data(ctx: Context, data: Bytes, name: String) -> Result<(), Error> {
    ctx.auxiliary.set_file_size(data.len() as u64);

    upload(ctx, &data[..], name).await
}

/// Query the size with `SIZE`, falling back to `STAT`.
///
/// Return 0 if the size cannot be found out.
async fn remote_size(session: &mut FtpSession, path: &str) -> u64 {
    let err = match session.size(path).await {
        Ok(size) => return size,
        Err(err) => err,
    };
    tracing::debug!(?err, path, "SIZE failed, trying STAT");

    match session.stat_size(path).await {
        Ok(size) => size.unwrap_or(0),
        Err(err) => {
            tracing::debug!(?err, path, "STAT failed, size is unknown");
            0
        }
    }
}

/// Where `name` is downloaded to inside `local_directory`.
///
/// Names that would leave `local_directory`, such as `../a.txt`, are
/// rejected.
fn local_path_for(local_directory: &Path, name: &str) -> Result<PathBuf, Error> {
    let relative = Path::new(name.trim_start_matches('/'));
    let mut components = relative.components().peekable();

    let contained = components.peek().is_some()
        && components.all(|component| matches!(component, Component::Normal(_)));

    if contained {
        Ok(local_directory.join(relative))
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cannot download {name:?} into a local directory"),
        )
        .into())
    }
}

/// Attach the failure to remove a partial download to the error that made
/// the download fail.
fn with_cleanup_error(err: Error, cleanup_err: io::Error) -> Error {
    Error::RecursiveErrors(Box::new(RecursiveError {
        original_error: err,
        occuring_error: cleanup_err.into(),
    }))
}

/// Remove a partially downloaded file.
fn remove_partial(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::error!(?err, ?path, "failed to remove partial download");
        }
    }
}

async fn download_file(ctx: Context, name: String, local_directory: PathBuf) -> Result<(), Error> {
    let path = ctx.server.path_for(&name);
    let local_path = local_path_for(&local_directory, &name)?;

    let mut session = ctx.connect_binary().await?;

    let file_size = ctx
        .cancellable(async { Ok(remote_size(&mut session, &path).await) })
        .await?;
    ctx.auxiliary.set_file_size(file_size);

    let mut data = ctx.cancellable(session.retrieve(&path)).await?;

    let file = fs::File::create(&local_path).await?;
    // The file is removed if this future is dropped half way, e.g. when the
    // runtime is shut down.
    let mut partial = scopeguard::guard((file, local_path), |(file, local_path)| {
        drop(file);
        remove_partial(&local_path);
    });

    let res = async {
        ctx.pump()
            .run(&mut data, &mut partial.0, &ctx.auxiliary, &ctx.cancel_token)
            .await?;
        ctx.cancellable(async { partial.0.flush().await.map_err(Error::WriteError) })
            .await
    }
    .await;

    let (file, local_path) = ScopeGuard::into_inner(partial);
    drop(file);

    if let Err(err) = res {
        ctx.auxiliary.mark_failed();
        drop(data);
        drop(session);

        return Err(match fs::remove_file(&local_path).await {
            Ok(()) => err,
            Err(cleanup_err) => with_cleanup_error(err, cleanup_err),
        });
    }

    // The server may still report the transfer as failed, e.g. with 426.
    if let Err(err) = ctx.cancellable(session.finish_retrieve(data)).await {
        remove_partial(&local_path);
        return Err(err);
    }
    logout(session).await;

    tracing::info!(%path, ?local_path, "downloaded");

    Ok(())
}

async fn create_new_folder(ctx: Context, name: String) -> Result<(), Error> {
    let path = ctx.server.path_for(&name);

    let mut session = ctx.connect().await?;
    ctx.cancellable(session.make_dir(&path)).await?;
    logout(session).await;

    Ok(())
}

async fn contents_of_server(ctx: Context) -> Result<Vec<DirectoryEntry>, Error> {
    let mut session = ctx.connect().await?;
    let lines = ctx
        .cancellable(session.list(ctx.server.remote_path()))
        .await?;

    // Count the CRLF each line arrived with.
    let received = lines.iter().map(|line| line.len() as u64 + 2).sum();
    ctx.auxiliary.add_processed(received);

    logout(session).await;

    Ok(parse_listing(&lines))
}

async fn check_login(ctx: Context) -> Result<(), Error> {
    let session = ctx.connect().await?;
    logout(session).await;

    Ok(())
}

/// Runs one ftp operation at a time, blocking the caller until it is done.
///
/// [`TransferEngine`] is [`Sync`]: share it with an [`Arc`] to poll
/// [`TransferEngine::progress`] or call [`TransferEngine::abort`] from
/// other threads while an operation is running.
#[derive(Debug)]
pub struct TransferEngine {
    runtime: Runtime,
    auxiliary: Arc<Auxiliary>,
    options: Options,
}

impl TransferEngine {
    /// Create [`TransferEngine`] with default [`Options`].
    pub fn new() -> Result<Self, Error> {
        Self::with_options(Options::new())
    }

    pub fn with_options(options: Options) -> Result<Self, Error> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("ftp-manager-engine")
            .enable_all()
            .build()?;

        Ok(Self {
            runtime,
            auxiliary: Arc::new(Auxiliary::new()),
            options,
        })
    }

    fn run<T, F, Fut>(&self, action: Action, server: &ServerDescriptor, f: F) -> Result<T, Error>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
        T: Send + 'static,
    {
        let cancel_token = self.auxiliary.begin(action)?;

        tracing::debug!(%action, url = %server.url(), "operation started");

        let ctx = Context {
            auxiliary: Arc::clone(&self.auxiliary),
            options: self.options,
            cancel_token,
            server: server.clone(),
        };

        let auxiliary = Arc::clone(&self.auxiliary);
        let fut = f(ctx);
        let handle = self.runtime.spawn(async move {
            let res = fut.await;
            if res.is_err() {
                auxiliary.mark_failed();
            }
            res
        });

        let res = self
            .runtime
            .block_on(handle)
            .unwrap_or_else(|err| Err(err.into()));

        match &res {
            Ok(_) => tracing::debug!(%action, "operation succeeded"),
            Err(err) => tracing::warn!(%action, ?err, "operation failed"),
        }

        self.auxiliary.finish(&res);

        res
    }

    /// Upload the file at `local_path` into
    /// [`ServerDescriptor::remote_path`], overwriting any existing file with
    /// the same name.
    ///
    /// A failed upload may leave a partial file on the server.
    pub fn upload_file(&self, local_path: impl AsRef<Path>, server: &ServerDescriptor) -> Result<(), Error> {
        let local_path = local_path.as_ref().to_owned();
        self.run(Action::UploadFile, server, |ctx| upload_file(ctx, local_path))
    }

    /// Upload `data` as `file_name` into [`ServerDescriptor::remote_path`].
    pub fn upload_data(
        &self,
        data: impl Into<Bytes>,
        file_name: &str,
        server: &ServerDescriptor,
    ) -> Result<(), Error> {
        let data = data.into();
        let name = file_name.to_owned();
        self.run(Action::UploadFile, server, |ctx| upload_data(ctx, data, name))
    }

    /// Download `file_name` from [`ServerDescriptor::remote_path`] into
    /// `local_directory`, overwriting any existing file.
    ///
    /// On failure no local file is left behind.
    pub fn download_file(
        &self,
        file_name: &str,
        local_directory: impl AsRef<Path>,
        server: &ServerDescriptor,
    ) -> Result<(), Error> {
        let name = file_name.to_owned();
        let local_directory = local_directory.as_ref().to_owned();
        self.run(Action::DownloadFile, server, |ctx| {
            download_file(ctx, name, local_directory)
        })
    }

    /// Create the directory `name` inside [`ServerDescriptor::remote_path`].
    pub fn create_new_folder(&self, name: &str, server: &ServerDescriptor) -> Result<(), Error> {
        let name = name.to_owned();
        self.run(Action::CreateFolder, server, |ctx| create_new_folder(ctx, name))
    }

    /// List [`ServerDescriptor::remote_path`].
    pub fn contents_of_server(&self, server: &ServerDescriptor) -> Result<Vec<DirectoryEntry>, Error> {
        self.run(Action::ListDirectory, server, contents_of_server)
    }

    /// Connect and log in, then log out again.
    pub fn check_login(&self, server: &ServerDescriptor) -> Result<(), Error> {
        self.run(Action::CheckLogin, server, check_login)
    }

    /// Progress of the running up/download.
    ///
    /// Return `None` if nothing is running or the size of the file is
    /// unknown.
    pub fn progress(&self) -> Option<ProgressSnapshot> {
        self.auxiliary.snapshot()
    }

    /// Abort the running operation, which then fails with
    /// [`Error::Aborted`].
    ///
    /// Does nothing if no operation is running.
    pub fn abort(&self) {
        self.auxiliary.abort();
    }

    pub fn current_action(&self) -> Option<Action> {
        self.auxiliary.action()
    }

    /// Why the last operation failed, `None` if it succeeded or none ran yet.
    pub fn last_failure(&self) -> Option<FailureReason> {
        self.auxiliary.last_failure()
    }

    pub fn was_aborted(&self) -> bool {
        self.auxiliary.was_aborted()
    }

    pub fn was_successful(&self) -> bool {
        self.auxiliary.was_successful()
    }

    /// Get notified whenever the progress changes.
    ///
    /// Polling [`TransferEngine::progress`] is preferred: the receiver is
    /// updated from the engine's worker thread on every write, which slows
    /// transfers down.
    pub fn subscribe(&self) -> watch::Receiver<Option<ProgressSnapshot>> {
        self.auxiliary.subscribe()
    }
}

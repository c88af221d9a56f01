//! A small in-process ftp server serving a temporary directory.
//!
//! It runs on its own thread with its own tokio runtime, so it can be used
//! from blocking tests as well as from `#[tokio::test]`.

use std::io;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::{fs, time};

const CHUNK: usize = 4096;

/// How a `RETR` data channel is cut short.
#[derive(Debug, Copy, Clone)]
enum Interrupt {
    /// Close after this many bytes.
    Close(usize),
    /// Reset after this many bytes.
    Reset(usize),
}

#[derive(Debug, Clone)]
struct Config {
    users: Vec<(String, String)>,
    anonymous: bool,
    unix: bool,
    throttle: Option<Duration>,
    interrupt: Option<Interrupt>,
}

/// Builder of [`TestServer`].
#[derive(Debug, Clone)]
pub struct TestServerBuilder(Config);

impl TestServerBuilder {
    /// Accept `username`/`password`.
    pub fn user(mut self, username: &str, password: &str) -> Self {
        self.0.users.push((username.to_owned(), password.to_owned()));
        self
    }

    /// Accept `anonymous` with any password.
    pub fn anonymous(mut self, anonymous: bool) -> Self {
        self.0.anonymous = anonymous;
        self
    }

    /// Behave like a UNIX server (`SITE CHMOD`, `ls -l` listings) or like
    /// a Windows one (no `SITE CHMOD`, DOS listings).
    pub fn unix(mut self, unix: bool) -> Self {
        self.0.unix = unix;
        self
    }

    /// Sleep for `delay` after every 4 KiB sent on a `RETR` data channel.
    pub fn throttle(mut self, delay: Duration) -> Self {
        self.0.throttle = Some(delay);
        self
    }

    /// Close the data channel of every `RETR` after `len` bytes and reply
    /// with 426.
    pub fn interrupt_retr_after(mut self, len: usize) -> Self {
        self.0.interrupt = Some(Interrupt::Close(len));
        self
    }

    /// Like [`TestServerBuilder::interrupt_retr_after`], but the data
    /// channel is reset instead of closed, so the client fails to read.
    pub fn reset_retr_after(mut self, len: usize) -> Self {
        self.0.interrupt = Some(Interrupt::Reset(len));
        self
    }

    pub fn start(self) -> TestServer {
        TestServer::start(self.0)
    }
}

/// A running ftp server, shut down on drop.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    root: TempDir,
    commands: Arc<Mutex<Vec<String>>>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl TestServer {
    /// A UNIX-like server accepting `user`/`secret` and anonymous login.
    pub fn builder() -> TestServerBuilder {
        TestServerBuilder(Config {
            users: vec![("user".to_owned(), "secret".to_owned())],
            anonymous: true,
            unix: true,
            throttle: None,
            interrupt: None,
        })
    }

    fn start(config: Config) -> Self {
        let root = tempfile::Builder::new()
            .prefix("ftp-test-common")
            .tempdir()
            .unwrap();

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let commands = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = oneshot::channel();

        let shared = Arc::new(Shared {
            root: root.path().to_owned(),
            config,
            commands: Arc::clone(&commands),
        });

        let thread = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async move {
                let listener = TcpListener::from_std(listener).unwrap();

                tokio::select! {
                    _ = rx => (),
                    _ = accept_loop(listener, shared) => (),
                }
            });
        });

        Self {
            addr,
            root,
            commands,
            shutdown: Some(tx),
            thread: Some(thread),
        }
    }

    /// `127.0.0.1:port`, usable as the destination of a server descriptor.
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    /// The directory served as `/`.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Every command received so far, `PASS` arguments masked.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
        if let Some(thread) = self.thread.take() {
            thread.join().ok();
        }
    }
}

#[derive(Debug)]
struct Shared {
    root: PathBuf,
    config: Config,
    commands: Arc<Mutex<Vec<String>>>,
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(err) => {
                tracing::warn!(?err, "accept failed");
                continue;
            }
        };

        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            if let Err(err) = Session::new(stream, shared).run().await {
                tracing::debug!(?err, "session ended with error");
            }
        });
    }
}

struct Session {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: OwnedWriteHalf,
    shared: Arc<Shared>,
    user: Option<String>,
    logged_in: bool,
    cwd: PathBuf,
    passive: Option<TcpListener>,
}

impl Session {
    fn new(stream: TcpStream, shared: Arc<Shared>) -> Self {
        let (reader, writer) = stream.into_split();

        Self {
            reader: BufReader::new(reader),
            writer,
            shared,
            user: None,
            logged_in: false,
            cwd: PathBuf::from("/"),
            passive: None,
        }
    }

    async fn reply(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await
    }

    async fn run(mut self) -> io::Result<()> {
        self.reply("220 ftp-test-common ready").await?;

        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            let command = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
            let (verb, arg) = match command.split_once(' ') {
                Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.to_owned()),
                None => (command.to_ascii_uppercase(), String::new()),
            };

            let logged = if verb == "PASS" {
                "PASS ****".to_owned()
            } else {
                command.to_owned()
            };
            self.shared.commands.lock().unwrap().push(logged);

            if !self.logged_in && !matches!(verb.as_str(), "USER" | "PASS" | "QUIT") {
                self.reply("530 Please login with USER and PASS.").await?;
                continue;
            }

            match verb.as_str() {
                "USER" => self.user(arg).await?,
                "PASS" => self.pass(&arg).await?,
                "SYST" => {
                    let syst = if self.shared.config.unix {
                        "215 UNIX Type: L8"
                    } else {
                        "215 Windows_NT"
                    };
                    self.reply(syst).await?
                }
                "TYPE" => self.reply("200 Switching to Binary mode.").await?,
                "NOOP" => self.reply("200 NOOP ok.").await?,
                "PWD" => {
                    let pwd = format!("257 \"{}\" is the current directory", self.cwd.display());
                    self.reply(&pwd).await?
                }
                "CWD" => self.cwd(&arg).await?,
                "PASV" => self.pasv().await?,
                "LIST" => self.list(&arg).await?,
                "RETR" => self.retr(&arg).await?,
                "STOR" => self.stor(&arg).await?,
                "SIZE" => self.size(&arg).await?,
                "STAT" => self.stat(&arg).await?,
                "MKD" => self.mkd(&arg).await?,
                "DELE" => self.dele(&arg).await?,
                "RMD" => self.rmd(&arg).await?,
                "SITE" => self.site(&arg).await?,
                "QUIT" => {
                    self.reply("221 Goodbye.").await?;
                    return Ok(());
                }
                _ => self.reply("502 Command not implemented.").await?,
            }
        }
    }

    /// Map a path on the server to the local filesystem, never escaping
    /// the root.
    fn resolve(&self, path: &str) -> PathBuf {
        let virtual_path = if path.starts_with('/') {
            PathBuf::from(path)
        } else {
            self.cwd.join(path)
        };

        let mut local = self.shared.root.clone();
        for component in virtual_path.components() {
            match component {
                Component::Normal(part) => local.push(part),
                Component::ParentDir => {
                    if local != self.shared.root {
                        local.pop();
                    }
                }
                _ => (),
            }
        }
        local
    }

    async fn user(&mut self, name: String) -> io::Result<()> {
        self.logged_in = false;
        self.user = Some(name);
        self.reply("331 Please specify the password.").await
    }

    async fn pass(&mut self, password: &str) -> io::Result<()> {
        let config = &self.shared.config;
        let accepted = match self.user.as_deref() {
            Some("anonymous") => config.anonymous,
            Some(user) => config
                .users
                .iter()
                .any(|(name, pass)| name == user && pass == password),
            None => false,
        };

        if accepted {
            self.logged_in = true;
            self.reply("230 Login successful.").await
        } else {
            self.reply("530 Login incorrect.").await
        }
    }

    async fn cwd(&mut self, path: &str) -> io::Result<()> {
        if fs::metadata(self.resolve(path))
            .await
            .map_or(false, |meta| meta.is_dir())
        {
            self.cwd = if path.starts_with('/') {
                PathBuf::from(path)
            } else {
                self.cwd.join(path)
            };
            self.reply("250 Directory successfully changed.").await
        } else {
            self.reply("550 Failed to change directory.").await
        }
    }

    async fn pasv(&mut self) -> io::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        self.passive = Some(listener);

        let reply = format!(
            "227 Entering Passive Mode (127,0,0,1,{},{}).",
            port >> 8,
            port & 0xff
        );
        self.reply(&reply).await
    }

    async fn accept_data(&mut self) -> io::Result<Option<TcpStream>> {
        let listener = match self.passive.take() {
            Some(listener) => listener,
            None => {
                self.reply("425 Use PASV first.").await?;
                return Ok(None);
            }
        };

        match time::timeout(Duration::from_secs(10), listener.accept()).await {
            Ok(Ok((stream, _))) => Ok(Some(stream)),
            _ => {
                self.reply("425 Failed to establish connection.").await?;
                Ok(None)
            }
        }
    }

    async fn list(&mut self, arg: &str) -> io::Result<()> {
        // Ignore `ls` flags such as `-la`.
        let path = arg
            .split_whitespace()
            .filter(|part| !part.starts_with('-'))
            .collect::<Vec<_>>()
            .join(" ");
        let dir = self.resolve(&path);

        let listing = match listing_of(&dir, self.shared.config.unix).await {
            Ok(listing) => listing,
            Err(_) => return self.reply("550 Failed to open directory.").await,
        };

        let mut data = match self.accept_data().await? {
            Some(data) => data,
            None => return Ok(()),
        };

        self.reply("150 Here comes the directory listing.").await?;
        let res = data.write_all(listing.as_bytes()).await;
        drop(data);

        match res {
            Ok(()) => self.reply("226 Directory send OK.").await,
            Err(_) => self.reply("426 Connection closed; transfer aborted.").await,
        }
    }

    async fn retr(&mut self, arg: &str) -> io::Result<()> {
        let path = self.resolve(arg);
        let mut file = match fs::File::open(&path).await {
            Ok(file) if !path.is_dir() => file,
            _ => return self.reply("550 Failed to open file.").await,
        };

        let mut data = match self.accept_data().await? {
            Some(data) => data,
            None => return Ok(()),
        };

        self.reply("150 Opening BINARY mode data connection.").await?;

        let throttle = self.shared.config.throttle;
        let interrupt = self.shared.config.interrupt;
        let limit = match interrupt {
            Some(Interrupt::Close(len) | Interrupt::Reset(len)) => len,
            None => usize::MAX,
        };

        let mut buf = vec![0; CHUNK];
        let mut sent = 0;
        let res: io::Result<()> = async {
            loop {
                if sent == limit {
                    break Err(io::ErrorKind::Interrupted.into());
                }

                let max = buf.len().min(limit - sent);
                let n = file.read(&mut buf[..max]).await?;
                if n == 0 {
                    break Ok(());
                }
                data.write_all(&buf[..n]).await?;
                sent += n;

                if let Some(delay) = throttle {
                    time::sleep(delay).await;
                }
            }
        }
        .await;

        if let (Err(_), Some(Interrupt::Reset(_))) = (&res, interrupt) {
            // SO_LINGER 0 turns the close into a RST.
            #[allow(deprecated)]
            data.set_linger(Some(Duration::ZERO))?;
        }
        drop(data);

        match res {
            Ok(()) => self.reply("226 Transfer complete.").await,
            Err(_) => self.reply("426 Connection closed; transfer aborted.").await,
        }
    }

    async fn stor(&mut self, arg: &str) -> io::Result<()> {
        let path = self.resolve(arg);
        let mut file = match fs::File::create(&path).await {
            Ok(file) => file,
            Err(_) => return self.reply("553 Could not create file.").await,
        };

        let mut data = match self.accept_data().await? {
            Some(data) => data,
            None => return Ok(()),
        };

        self.reply("150 Ok to send data.").await?;

        let res = tokio::io::copy(&mut data, &mut file).await;
        let res = match res {
            Ok(_) => file.flush().await,
            Err(err) => Err(err),
        };

        match res {
            Ok(()) => self.reply("226 Transfer complete.").await,
            Err(_) => self.reply("426 Connection closed; transfer aborted.").await,
        }
    }

    async fn size(&mut self, arg: &str) -> io::Result<()> {
        match fs::metadata(self.resolve(arg)).await {
            Ok(meta) if meta.is_file() => self.reply(&format!("213 {}", meta.len())).await,
            _ => self.reply("550 Could not get file size.").await,
        }
    }

    async fn stat(&mut self, arg: &str) -> io::Result<()> {
        if arg.is_empty() {
            return self.reply("211 ftp-test-common status OK").await;
        }

        let path = self.resolve(arg);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let line = listing_line(&name, &meta, self.shared.config.unix);

                self.reply("213-Status follows:").await?;
                self.reply(&line).await?;
                self.reply("213 End of status").await
            }
            _ => self.reply("550 No such file.").await,
        }
    }

    async fn mkd(&mut self, arg: &str) -> io::Result<()> {
        match fs::create_dir(self.resolve(arg)).await {
            Ok(()) => self.reply(&format!("257 \"{arg}\" created")).await,
            Err(_) => self.reply("550 Create directory operation failed.").await,
        }
    }

    async fn dele(&mut self, arg: &str) -> io::Result<()> {
        let path = self.resolve(arg);

        if path.is_dir() {
            return self.reply(&format!("550 {arg}: Is a directory")).await;
        }

        match fs::remove_file(path).await {
            Ok(()) => self.reply("250 Delete operation successful.").await,
            Err(_) => self.reply("550 Delete operation failed.").await,
        }
    }

    async fn rmd(&mut self, arg: &str) -> io::Result<()> {
        match fs::remove_dir(self.resolve(arg)).await {
            Ok(()) => self.reply("250 Remove directory operation successful.").await,
            Err(_) => self.reply("550 Remove directory operation failed.").await,
        }
    }

    async fn site(&mut self, arg: &str) -> io::Result<()> {
        let mut parts = arg.splitn(3, ' ');
        let sub = parts.next().unwrap_or_default().to_ascii_uppercase();

        if sub != "CHMOD" || !self.shared.config.unix {
            return self.reply("500 Unknown SITE command.").await;
        }

        let mode = parts.next().and_then(|mode| u32::from_str_radix(mode, 8).ok());
        let path = parts.next().map(|path| self.resolve(path));

        let res = match (mode, path) {
            (Some(mode), Some(path)) => {
                fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
            }
            _ => return self.reply("501 SITE CHMOD needs 2 arguments.").await,
        };

        match res {
            Ok(()) => self.reply("200 SITE CHMOD command ok.").await,
            Err(_) => self.reply("550 SITE CHMOD command failed.").await,
        }
    }
}

async fn listing_of(dir: &Path, unix: bool) -> io::Result<String> {
    let mut entries = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;

    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let meta = entry.metadata().await?;
        entries.push((name, meta));
    }
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut listing = String::new();
    if unix {
        listing.push_str(&format!("total {}\r\n", entries.len()));
    }
    for (name, meta) in &entries {
        listing.push_str(&listing_line(name, meta, unix));
        listing.push_str("\r\n");
    }

    Ok(listing)
}

fn listing_line(name: &str, meta: &std::fs::Metadata, unix: bool) -> String {
    if unix {
        let kind = if meta.is_dir() { 'd' } else { '-' };
        format!(
            "{kind}{} 1 ftp ftp {:>12} Jan 01 12:00 {name}",
            permission_string(meta.permissions().mode()),
            meta.len(),
        )
    } else if meta.is_dir() {
        format!("01-01-26  12:00AM       <DIR>          {name}")
    } else {
        format!("01-01-26  12:00AM {:>15} {name}", meta.len())
    }
}

fn permission_string(mode: u32) -> String {
    let flags = [b'r', b'w', b'x'];

    (0..9)
        .map(|i| {
            if mode & (1 << (8 - i)) != 0 {
                flags[i % 3] as char
            } else {
                '-'
            }
        })
        .collect()
}

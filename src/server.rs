use super::Error;

use std::fmt;

use ftp_manager_lowlevel::{ANONYMOUS, DEFAULT_PORT};

const SCHEME: &str = "ftp://";

/// Where to connect and how to log in.
///
/// `destination` given to the constructors is `host[:port][/path]`, with an
/// optional `ftp://` prefix.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct ServerDescriptor {
    host: String,
    remote_path: String,
    username: String,
    password: String,
    port: u16,
}

impl fmt::Debug for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerDescriptor")
            .field("host", &self.host)
            .field("remote_path", &self.remote_path)
            .field("username", &self.username)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl ServerDescriptor {
    /// Describe a server logged into with `username` and `password`.
    pub fn new(
        destination: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, Error> {
        let (authority, remote_path) = split_host_path(strip_scheme(destination.trim()));
        let (host, port) = split_port(authority)?;

        if host.is_empty() {
            return Err(Error::InvalidServer(&"host is empty"));
        }

        Ok(Self {
            host: host.to_owned(),
            remote_path: normalize_path(remote_path),
            username: username.into(),
            password: password.into(),
            port: port.unwrap_or(DEFAULT_PORT),
        })
    }

    /// Describe a server allowing anonymous login.
    pub fn anonymous(destination: &str) -> Result<Self, Error> {
        Self::new(destination, ANONYMOUS, "")
    }

    /// Set the port, default is 21 unless `destination` carries one.
    pub fn port(mut self, port: u16) -> Result<Self, Error> {
        if port == 0 {
            return Err(Error::InvalidServer(&"port must not be 0"));
        }
        self.port = port;
        Ok(self)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Directory (or file) on the server, always starting with `/`.
    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn is_anonymous(&self) -> bool {
        self.username == ANONYMOUS
    }

    /// `host:port`, suitable for connecting.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Fully qualified `ftp://host:port/path`.
    pub fn url(&self) -> String {
        format!("{SCHEME}{}{}", self.address(), self.remote_path)
    }

    /// Join [`ServerDescriptor::remote_path`] and `name` with exactly one `/`.
    pub fn path_for(&self, name: &str) -> String {
        let name = name.trim_start_matches('/');
        let base = self.remote_path.trim_end_matches('/');

        format!("{base}/{name}")
    }
}

fn strip_scheme(destination: &str) -> &str {
    match destination.get(..SCHEME.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(SCHEME) => &destination[SCHEME.len()..],
        _ => destination,
    }
}

fn split_host_path(destination: &str) -> (&str, &str) {
    match destination.find('/') {
        Some(index) => destination.split_at(index),
        None => (destination, ""),
    }
}

/// Split `host[:port]`, also accepting `[ipv6]:port`.
fn split_port(authority: &str) -> Result<(&str, Option<u16>), Error> {
    let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
        match rest.split_once(']') {
            Some((host, "")) => (host, None),
            Some((host, port)) => match port.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => return Err(Error::InvalidServer(&"malformed ipv6 address")),
            },
            None => return Err(Error::InvalidServer(&"malformed ipv6 address")),
        }
    } else {
        match authority.rsplit_once(':') {
            // A bare ipv6 address without brackets has no port.
            Some((host, port)) if !host.contains(':') => (host, Some(port)),
            _ => (authority, None),
        }
    };

    let port = match port {
        None => None,
        Some(port) => match port.parse::<u16>() {
            Ok(0) | Err(_) => return Err(Error::InvalidServer(&"invalid port")),
            Ok(port) => Some(port),
        },
    };

    Ok((host, port))
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');

    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_destination() {
        let server = ServerDescriptor::new("FTP://ftp.example.com/pub/incoming/", "user", "pw").unwrap();

        assert_eq!(server.host(), "ftp.example.com");
        assert_eq!(server.remote_path(), "/pub/incoming");
        assert_eq!(server.get_port(), 21);
        assert!(!server.is_anonymous());
        assert_eq!(server.url(), "ftp://ftp.example.com:21/pub/incoming");
        assert_eq!(server.path_for("a.txt"), "/pub/incoming/a.txt");
    }

    #[test]
    fn test_root_path_and_port() {
        let server = ServerDescriptor::anonymous("127.0.0.1:2121").unwrap();

        assert!(server.is_anonymous());
        assert_eq!(server.password(), "");
        assert_eq!(server.remote_path(), "/");
        assert_eq!(server.address(), "127.0.0.1:2121");
        assert_eq!(server.path_for("/x.bin"), "/x.bin");

        let server = server.port(21).unwrap();
        assert_eq!(server.address(), "127.0.0.1:21");
    }

    #[test]
    fn test_ipv6() {
        let server = ServerDescriptor::anonymous("ftp://[::1]:2121/data").unwrap();

        assert_eq!(server.host(), "::1");
        assert_eq!(server.address(), "[::1]:2121");
        assert_eq!(server.url(), "ftp://[::1]:2121/data");
    }

    #[test]
    fn test_invalid() {
        for destination in ["", "ftp://", "ftp:///path", "host:0", "host:port", "[::1"] {
            assert!(
                matches!(
                    ServerDescriptor::anonymous(destination),
                    Err(Error::InvalidServer(_))
                ),
                "{destination}"
            );
        }

        let server = ServerDescriptor::anonymous("host").unwrap();
        assert!(matches!(server.port(0), Err(Error::InvalidServer(_))));
    }

    #[test]
    fn test_debug_hides_password() {
        let server = ServerDescriptor::new("host", "user", "hunter2").unwrap();
        assert!(!format!("{server:?}").contains("hunter2"));
    }
}

//! Remote query daemon and its client
//!
//! Architecture:
//! - Daemon: listens on TCP or a Unix socket, runs one query per connection
//! - Client: connects, sends one request, reads one response
//! - Paths: `~` translation so a query names roots on the daemon's host

pub mod client;
pub mod daemon;
pub mod paths;
pub mod protocol;

pub use client::RemoteClient;
pub use daemon::{Daemon, DaemonConfig, Shutdown, ShutdownHandle};
pub use protocol::{QueryRequest, QueryResponse};

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown as NetShutdown, TcpStream};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

/// Default TCP address for the daemon
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:6450";

/// Where a daemon listens or a client connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    Unix(PathBuf),
}

impl Endpoint {
    /// `unix:<path>` or anything containing `/` is a socket file, the rest
    /// is a TCP `host:port`.
    pub fn parse(addr: &str) -> Self {
        if let Some(path) = addr.strip_prefix("unix:") {
            Endpoint::Unix(PathBuf::from(path))
        } else if addr.contains('/') {
            Endpoint::Unix(PathBuf::from(addr))
        } else {
            Endpoint::Tcp(addr.to_string())
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "{}", addr),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// A connected socket of either transport
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    pub fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => TcpStream::connect(addr.as_str()).map(Stream::Tcp),
            Endpoint::Unix(path) => UnixStream::connect(path).map(Stream::Unix),
        }
    }

    pub fn set_timeouts(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
            Stream::Unix(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
        }
    }

    /// Close both directions
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.shutdown(NetShutdown::Both),
            Stream::Unix(s) => s.shutdown(NetShutdown::Both),
        }
    }

    /// Peer description for logs
    pub fn peer(&self) -> String {
        match self {
            Stream::Tcp(s) => s
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            Stream::Unix(_) => "local socket".to_string(),
        }
    }

    /// Connections over a socket file or from loopback count as local
    pub fn is_local(&self) -> bool {
        match self {
            Stream::Tcp(s) => s.peer_addr().map(|a| is_loopback(a.ip())).unwrap_or(false),
            Stream::Unix(_) => true,
        }
    }
}

/// Dual-stack listeners see IPv4 clients as `::ffff:a.b.c.d`
fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map_or_else(|| v6.is_loopback(), |v4| v4.is_loopback()),
        IpAddr::V4(v4) => v4.is_loopback(),
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            Stream::Unix(s) => s.flush(),
        }
    }
}

/// Get the default socket path for the daemon
/// Uses a per-user runtime directory for security
pub fn get_socket_path() -> PathBuf {
    // Try XDG_RUNTIME_DIR first (most secure, tmpfs-backed)
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join("census.sock");
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".local").join("run").join("census.sock");
    }

    // Last resort: /tmp with user ID
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/census-{}.sock", uid))
}

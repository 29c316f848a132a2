//! Query daemon
//!
//! Serves one request per connection over TCP or a Unix socket. Every
//! accepted connection gets its own thread; nothing is shared between
//! handlers except the connection counter and the shutdown handle.

use crate::error::{CensusError, Result};
use crate::query;
use crate::server::paths::{home_dir, localize_with};
use crate::server::protocol::{
    read_frame, read_message, write_message, QueryRequest, QueryResponse, MAX_REQUEST_BYTES,
};
use crate::server::{Endpoint, Stream};
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Connection timeout
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Concurrent handlers allowed by default
const MAX_CONNECTIONS: usize = 64;

/// How long a rejected client gets to finish sending before the busy reply
const REJECT_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Pause after an accept error that is likely to repeat
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Concurrent handlers; 0 means unlimited
    pub max_connections: usize,
    /// Read/write timeout on every accepted stream
    pub connection_timeout: Option<Duration>,
    /// Honour stop requests from non-loopback TCP peers
    pub allow_remote_stop: bool,
    /// Directory names skipped by every query on top of its own ignore list
    pub default_ignore: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            max_connections: MAX_CONNECTIONS,
            connection_timeout: Some(CONNECTION_TIMEOUT),
            allow_remote_stop: false,
            default_ignore: Vec::new(),
        }
    }
}

/// Why the accept loop exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// A client sent a stop request
    Stopped,
    /// SIGINT or SIGTERM
    Signal,
}

struct ShutdownState {
    reason: OnceLock<Shutdown>,
    /// Address the accept loop can be woken through
    wake: Endpoint,
}

/// Cloneable trigger for stopping a running daemon
#[derive(Clone)]
pub struct ShutdownHandle {
    state: Arc<ShutdownState>,
}

impl ShutdownHandle {
    /// Record `reason` and wake the accept loop. The first reason wins.
    pub fn trigger(&self, reason: Shutdown) {
        if self.state.reason.set(reason).is_ok() {
            info!(?reason, "shutdown requested");
        }
        // A throwaway connection unblocks accept()
        if let Ok(stream) = Stream::connect(&self.state.wake) {
            let _ = stream.shutdown();
        }
    }

    pub fn reason(&self) -> Option<Shutdown> {
        self.state.reason.get().copied()
    }
}

/// Removes the socket file when the listener goes away
struct SocketFile(PathBuf);

impl Drop for SocketFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

enum Listener {
    Tcp(TcpListener),
    // Field order matters: the listener closes before the file is removed
    Unix(UnixListener, SocketFile),
}

impl Listener {
    fn accept(&self) -> io::Result<Stream> {
        match self {
            Listener::Tcp(l) => l.accept().map(|(s, _)| Stream::Tcp(s)),
            Listener::Unix(l, _) => l.accept().map(|(s, _)| Stream::Unix(s)),
        }
    }
}

/// Hold one of the limited handler slots until dropped
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (max == 0 || n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| Self(Arc::clone(active)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Refuse to start over a live daemon or a non-socket file, clear a dead
/// daemon's socket file
fn check_socket_conflict(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if !metadata.file_type().is_socket() {
        return Err(CensusError::NotASocket(path.to_path_buf()));
    }

    if UnixStream::connect(path).is_ok() {
        return Err(CensusError::AlreadyRunning(path.to_path_buf()));
    }

    warn!(path = %path.display(), "removing stale socket file");
    fs::remove_file(path)?;
    Ok(())
}

/// Accept errors caused by one client rather than the listener
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Answer a client over the connection limit, off the accept thread
fn reject_busy(mut stream: Stream) {
    warn!(peer = %stream.peer(), "connection limit reached, rejecting");
    thread::spawn(move || {
        let _ = stream.set_timeouts(Some(REJECT_DRAIN_TIMEOUT));
        let _ = read_frame(&mut stream, MAX_REQUEST_BYTES);
        let _ = write_message(&mut stream, &QueryResponse::error("server busy"));
    });
}

/// Loopback address a wildcard listener can be reached on
fn wake_address(addr: SocketAddr) -> SocketAddr {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, addr.port())
}

/// Per-connection request processing
#[derive(Clone)]
struct Handler {
    shutdown: ShutdownHandle,
    allow_remote_stop: bool,
    default_ignore: Vec<String>,
}

impl Handler {
    fn handle(&self, mut stream: Stream) -> Result<()> {
        let peer = stream.peer();
        debug!(%peer, "handling connection");

        let request: QueryRequest = match read_message(&mut stream, MAX_REQUEST_BYTES) {
            Ok(request) => request,
            Err(CensusError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!(%peer, "client disconnected before sending a request");
                return Ok(());
            }
            Err(e) => {
                warn!(%peer, error = %e, "unable to read command");
                let response = QueryResponse::error(format!("unable to read command. {}", e));
                write_message(&mut stream, &response)?;
                return Ok(());
            }
        };

        if request.stop_server {
            let local = stream.is_local();
            return self.handle_stop(&mut stream, &peer, local);
        }

        info!(%peer, paths = ?request.paths, "query");
        let response = QueryResponse::from_result(self.answer(request));
        if !response.error.is_empty() {
            info!(%peer, error = %response.error, "query failed");
        }
        write_message(&mut stream, &response)?;
        Ok(())
    }

    fn handle_stop<W: io::Write>(&self, stream: &mut W, peer: &str, local: bool) -> Result<()> {
        if !self.allow_remote_stop && !local {
            warn!(%peer, "refusing stop request from remote peer");
            let response = QueryResponse::error("stop requests are only accepted from local clients");
            write_message(stream, &response)?;
            return Ok(());
        }

        info!(%peer, "received stop request, shutting down");
        let written = write_message(stream, &QueryResponse::ack());
        self.shutdown.trigger(Shutdown::Stopped);
        written?;
        Ok(())
    }

    fn answer(&self, mut request: QueryRequest) -> Result<String> {
        let home = home_dir()?;
        request.paths = localize_with(&request.paths, &home);
        for name in &self.default_ignore {
            if !request.ignore_paths.contains(name) {
                request.ignore_paths.push(name.clone());
            }
        }
        query::run(&request)
    }
}

/// A bound daemon, ready to serve
pub struct Daemon {
    listener: Listener,
    endpoint: Endpoint,
    config: DaemonConfig,
    shutdown: ShutdownHandle,
    active: Arc<AtomicUsize>,
}

impl Daemon {
    /// Bind to `endpoint`
    ///
    /// For a Unix socket a stale socket file is removed first. Binding fails
    /// with `AlreadyRunning` if another daemon still answers on it, and with
    /// `NotASocket` if the path holds anything else.
    pub fn bind(endpoint: &Endpoint, config: DaemonConfig) -> Result<Self> {
        let (listener, endpoint, wake) = match endpoint {
            Endpoint::Tcp(addr) => {
                let listener =
                    TcpListener::bind(addr.as_str()).map_err(|source| CensusError::Transport {
                        host: addr.clone(),
                        source,
                    })?;
                let local = listener.local_addr()?;
                (
                    Listener::Tcp(listener),
                    Endpoint::Tcp(local.to_string()),
                    Endpoint::Tcp(wake_address(local).to_string()),
                )
            }
            Endpoint::Unix(path) => {
                check_socket_conflict(path)?;
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                let listener = UnixListener::bind(path).map_err(|source| CensusError::Transport {
                    host: path.display().to_string(),
                    source,
                })?;
                let guard = SocketFile(path.clone());

                // Set socket permissions (user only)
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
                }

                (
                    Listener::Unix(listener, guard),
                    endpoint.clone(),
                    endpoint.clone(),
                )
            }
        };

        Ok(Self {
            listener,
            endpoint,
            config,
            shutdown: ShutdownHandle {
                state: Arc::new(ShutdownState {
                    reason: OnceLock::new(),
                    wake,
                }),
            },
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The bound address, with any ephemeral port resolved
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept connections until a stop request or signal arrives
    ///
    /// In-flight handlers are not waited for. The listener is closed (and a
    /// socket file removed) when this returns.
    pub fn run(self) -> Result<Shutdown> {
        info!(endpoint = %self.endpoint, "census daemon listening");

        let handler = Handler {
            shutdown: self.shutdown.clone(),
            allow_remote_stop: self.config.allow_remote_stop,
            default_ignore: self.config.default_ignore.clone(),
        };

        loop {
            let accepted = self.listener.accept();

            if let Some(reason) = self.shutdown.reason() {
                info!(?reason, "closing listener");
                return Ok(reason);
            }

            match accepted {
                Ok(stream) => self.dispatch(stream, &handler),
                Err(e) if is_transient(&e) => debug!(error = %e, "accept error"),
                Err(e) => {
                    error!(error = %e, "accept error");
                    thread::sleep(ACCEPT_ERROR_BACKOFF);
                }
            }
        }
    }

    fn dispatch(&self, stream: Stream, handler: &Handler) {
        let _ = stream.set_timeouts(self.config.connection_timeout);

        let Some(slot) = ConnectionSlot::acquire(&self.active, self.config.max_connections) else {
            reject_busy(stream);
            return;
        };

        let handler = handler.clone();
        thread::spawn(move || {
            let _slot = slot;
            if let Err(e) = handler.handle(stream) {
                warn!(error = %e, "connection error");
            }
        });
    }
}

//! Error types shared by the index, query and server layers
//!
//! Every error here is recovered at a request boundary: the CLI prints it and
//! exits non-zero, the daemon serializes it into the response for the one
//! client that caused it.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Prefix the daemon uses for missing roots; the client keys its rewrite on it.
pub const PATH_NOT_FOUND_PREFIX: &str = "path not found";

#[derive(Error, Debug)]
pub enum CensusError {
    /// A requested root does not exist
    #[error("path not found '{0}'")]
    PathNotFound(String),

    /// A requested root exists but could not be statted
    #[error("unable to stat '{path}': {source}")]
    Stat {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The home directory could not be resolved for path translation
    #[error("unable to determine local home directory")]
    HomeDirUnavailable,

    /// A grep/vgrep pattern failed to compile
    #[error("unable to read regex: '{pattern}', {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The walk was aborted by the visitor
    #[error("walk aborted: {0}")]
    Walk(String),

    /// Connecting to or talking with a daemon failed
    #[error("unable to reach host {host}: {source}")]
    Transport {
        host: String,
        #[source]
        source: io::Error,
    },

    /// A message could not be framed or decoded
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote daemon reported a missing root
    #[error("path not found on {host} {detail}")]
    RemotePathNotFound { host: String, detail: String },

    /// The remote daemon reported any other error
    #[error("host {host} returned an error: {message}")]
    Remote { host: String, message: String },

    /// Another daemon already answers on the socket file
    #[error("another census is already running on {}", .0.display())]
    AlreadyRunning(PathBuf),

    /// Something other than a socket occupies the socket path
    #[error("refusing to replace {}: not a socket", .0.display())]
    NotASocket(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CensusError>;

impl CensusError {
    /// Rewrite an error string received from `host` so a missing root is
    /// attributed to the remote machine rather than the local one.
    pub fn from_remote(host: &str, message: &str) -> Self {
        match message.strip_prefix(PATH_NOT_FOUND_PREFIX) {
            Some(detail) => CensusError::RemotePathNotFound {
                host: host.to_string(),
                detail: detail.trim().to_string(),
            },
            None => CensusError::Remote {
                host: host.to_string(),
                message: message.to_string(),
            },
        }
    }
}

//! # census - snapshot and filter directory trees
//!
//! census walks one or more roots into an in-memory snapshot, then answers
//! a filtering query against it: files or directories, regex include and
//! exclude passes, hidden-file visibility, a depth bound and a list of
//! directory names to skip. The same query runs locally or on a long-running
//! daemon on another host.
//!
//! ## Architecture
//!
//! - [`index`] - Tree walker and the snapshot it builds
//! - [`query`] - Filter passes and the query orchestrator
//! - [`server`] - Wire protocol, daemon, client and `~` path translation
//! - [`config`] - Config file and ignore-file loading
//! - [`error`] - Error taxonomy shared by every layer
//!
//! ## Quick Start
//!
//! ```no_run
//! use census::server::{QueryRequest, RemoteClient};
//!
//! let request = QueryRequest {
//!     paths: vec!["/srv/data".to_string()],
//!     grep: r"\.csv$".to_string(),
//!     depth: 3,
//!     ..Default::default()
//! };
//!
//! // On this machine
//! let local = census::query::run(&request)?;
//!
//! // Or on a daemon elsewhere
//! let remote = RemoteClient::new("fileserver:6450").query(&request)?;
//! # Ok::<(), census::CensusError>(())
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod query;
pub mod server;

pub use error::{CensusError, Result};

//! Client for sending one query to a remote daemon

use crate::error::{CensusError, Result};
use crate::server::paths::{home_dir, remotize_with};
use crate::server::protocol::{
    decode, read_frame, write_message, QueryRequest, QueryResponse, MAX_RESPONSE_BYTES,
};
use crate::server::{Endpoint, Stream};
use std::io;
use std::time::Duration;
use tracing::debug;

/// Read/write timeout
const IO_TIMEOUT: Duration = Duration::from_secs(300);

/// Client for a census daemon
#[derive(Debug, Clone)]
pub struct RemoteClient {
    host: String,
    endpoint: Endpoint,
    timeout: Option<Duration>,
}

impl RemoteClient {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            endpoint: Endpoint::parse(host),
            timeout: Some(IO_TIMEOUT),
        }
    }

    /// Override the read/write timeout; `None` waits forever
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn transport(&self, source: io::Error) -> CensusError {
        CensusError::Transport {
            host: self.host.clone(),
            source,
        }
    }

    /// Send one request and return the raw response
    ///
    /// Only transport failures are errors here; a response carrying an
    /// `error` string is returned as is.
    pub fn send(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let mut stream = Stream::connect(&self.endpoint).map_err(|e| self.transport(e))?;
        stream.set_timeouts(self.timeout).map_err(|e| self.transport(e))?;
        debug!(host = %self.host, "sending request");

        write_message(&mut stream, request).map_err(|e| self.transport(e))?;

        let body = read_frame(&mut stream, MAX_RESPONSE_BYTES).map_err(|e| self.transport(e))?;
        decode(&body).map_err(|e| self.transport(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Run a query on the remote host and return its joined paths
    ///
    /// Roots under the local home directory are sent as `~` paths so the
    /// daemon resolves them against its own home.
    pub fn query(&self, request: &QueryRequest) -> Result<String> {
        let home = home_dir()?;
        let request = QueryRequest {
            paths: remotize_with(&request.paths, &home),
            host: self.host.clone(),
            stop_server: false,
            ..request.clone()
        };

        let response = self.send(&request)?;
        if !response.error.is_empty() {
            return Err(CensusError::from_remote(&self.host, &response.error));
        }
        Ok(response.paths)
    }

    /// Ask the daemon to shut down
    pub fn stop(&self) -> Result<()> {
        let response = self.send(&QueryRequest::stop(self.host.clone()))?;
        if !response.error.is_empty() {
            return Err(CensusError::from_remote(&self.host, &response.error));
        }
        if !response.ack {
            return Err(CensusError::Protocol(format!(
                "{} did not acknowledge the stop request",
                self.host
            )));
        }
        Ok(())
    }
}

//! Protocol messages for client-server communication
//!
//! Uses a simple length-prefixed JSON protocol:
//! - 4 bytes (little-endian u32): message length
//! - N bytes: JSON-encoded message
//!
//! One request and one response per connection.

use crate::error::{CensusError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// Largest request body the daemon will accept
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Largest response body the client will accept
pub const MAX_RESPONSE_BYTES: usize = 256 * 1024 * 1024;

/// A query, or the stop control message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    /// Maximum relative depth, -1 for unbounded
    pub depth: i32,
    /// Return directories instead of files
    pub dir_mode: bool,
    /// Case-insensitive include pattern
    pub grep: String,
    /// Case-sensitive include pattern
    pub grep_case: String,
    /// Case-insensitive exclude pattern
    pub vgrep: String,
    /// Case-sensitive exclude pattern
    pub vgrep_case: String,
    /// Directory leaf names to skip
    pub ignore_paths: Vec<String>,
    pub show_hidden: bool,
    /// Roots, possibly `~`-prefixed
    pub paths: Vec<String>,
    /// Remote daemon address, empty for local
    pub host: String,
    pub stop_server: bool,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            depth: -1,
            dir_mode: false,
            grep: String::new(),
            grep_case: String::new(),
            vgrep: String::new(),
            vgrep_case: String::new(),
            ignore_paths: Vec::new(),
            show_hidden: false,
            paths: Vec::new(),
            host: String::new(),
            stop_server: false,
        }
    }
}

impl QueryRequest {
    /// Stop request addressed to `host`
    pub fn stop(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            stop_server: true,
            ..Default::default()
        }
    }
}

/// Reply to a request
///
/// `paths` carries the result on success, `error` on failure; `ack` only
/// answers a stop request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryResponse {
    pub paths: String,
    pub error: String,
    pub ack: bool,
}

impl QueryResponse {
    pub fn paths(paths: String) -> Self {
        Self {
            paths,
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            ..Default::default()
        }
    }

    pub fn ack() -> Self {
        Self {
            ack: true,
            ..Default::default()
        }
    }

    pub fn from_result(result: Result<String>) -> Self {
        match result {
            Ok(paths) => Self::paths(paths),
            Err(e) => Self::error(e.to_string()),
        }
    }
}

/// Write a message to a stream with length prefix
pub fn write_message<W: Write>(writer: &mut W, msg: &impl Serialize) -> io::Result<()> {
    let json = serde_json::to_vec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let len = u32::try_from(json.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Message too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&json)?;
    writer.flush()?;

    Ok(())
}

/// Read one length-prefixed frame, refusing bodies larger than `limit`
pub fn read_frame<R: Read>(reader: &mut R, limit: usize) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {} bytes (limit {})", len, limit),
        ));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Decode a frame body, ignoring trailing NUL padding
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let end = body.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    serde_json::from_slice(&body[..end]).map_err(|e| CensusError::Protocol(e.to_string()))
}

/// Read and decode one message
pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R, limit: usize) -> Result<T> {
    let body = read_frame(reader, limit)?;
    decode(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_roundtrip_request() {
        let req = QueryRequest {
            depth: 3,
            dir_mode: true,
            grep: "src".to_string(),
            vgrep_case: "Target".to_string(),
            ignore_paths: vec!["node_modules".to_string()],
            show_hidden: true,
            paths: vec!["~/code".to_string(), "/srv".to_string()],
            host: "box:6450".to_string(),
            ..Default::default()
        };

        let mut buf = Vec::new();
        write_message(&mut buf, &req).unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded: QueryRequest = read_message(&mut cursor, MAX_REQUEST_BYTES).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_roundtrip_response() {
        let resp = QueryResponse::paths("/a\n/b".to_string());

        let mut buf = Vec::new();
        write_message(&mut buf, &resp).unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded: QueryResponse = read_message(&mut cursor, MAX_RESPONSE_BYTES).unwrap();
        assert_eq!(decoded, resp);
        assert!(decoded.error.is_empty());
        assert!(!decoded.ack);
    }

    #[test]
    fn test_partial_request_uses_defaults() {
        let req: QueryRequest = decode(br#"{"paths": ["/tmp"]}"#).unwrap();
        assert_eq!(req.depth, -1);
        assert_eq!(req.paths, vec!["/tmp".to_string()]);
        assert!(!req.stop_server);
    }

    #[test]
    fn test_trailing_nul_padding_is_trimmed() {
        let mut body = br#"{"stop_server": true}"#.to_vec();
        body.extend_from_slice(&[0u8; 16]);
        let req: QueryRequest = decode(&body).unwrap();
        assert!(req.stop_server);
    }

    #[test]
    fn test_garbage_is_protocol_error() {
        let err = decode::<QueryRequest>(b"not json").unwrap_err();
        assert!(matches!(err, CensusError::Protocol(_)));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(64u32).to_le_bytes());
        buf.extend_from_slice(&[b' '; 64]);
        let err = read_frame(&mut Cursor::new(buf), 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_response_from_result() {
        let ok = QueryResponse::from_result(Ok("/a".to_string()));
        assert_eq!(ok.paths, "/a");
        assert!(ok.error.is_empty());

        let err = QueryResponse::from_result(Err(CensusError::PathNotFound("/nope".to_string())));
        assert!(err.paths.is_empty());
        assert!(err.error.contains("/nope"));
    }
}

//! Transport layer for dispatch requests
//!
//! The agent issues one request at a time and each request gets its own
//! connection: connect, write the frame, read one response frame, close.
//! The [`Transport`] trait is the seam that lets tests swap the TCP
//! implementation for a scripted one.

use crate::protocol::{Codec, CodecError};
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

pub mod tcp;

pub use tcp::TcpTransport;

/// Transport failures; all of them abort the request in flight
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("I/O error during request")]
    Io(#[from] std::io::Error),
    #[error("failed to read response frame: {0}")]
    Frame(#[from] CodecError),
}

impl TransportError {
    /// The peer closed before the announced frame length arrived
    pub fn is_short_read(&self) -> bool {
        matches!(self, TransportError::Frame(CodecError::ShortRead { .. }))
    }
}

/// Request/response transport to the dispatch server
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one encoded request frame and return the body of the response
    /// frame (the bytes after its length prefix)
    async fn round_trip(&self, frame: &[u8], codec: &Codec) -> Result<Bytes, TransportError>;

    /// Human-readable description of the peer, used in logs
    fn peer(&self) -> String;
}

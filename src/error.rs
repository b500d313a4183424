//! Top-level error type for agent operations
//!
//! Each layer owns its own error enum; [`AgentError`] gathers them so the
//! lifecycle can decide what is fatal with a single match.

use crate::config::ConfigError;
use crate::map::ParseError;
use crate::pathfinding::PathError;
use crate::protocol::{CodecError, RequestType, StatusCode};
use crate::transport::TransportError;
use thiserror::Error;

/// Main error type for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Map parse error: {0}")]
    MapParse(#[from] ParseError),

    #[error("Pathfinding error: {0}")]
    Path(#[from] PathError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{request} rejected by server: {}", status.message())]
    Rejected {
        request: RequestType,
        status: StatusCode,
    },

    #[error("Interrupted by shutdown request")]
    Interrupted,

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl AgentError {
    /// Create a rejection error for a non-success response
    pub fn rejected(request: RequestType, status: StatusCode) -> Self {
        Self::Rejected { request, status }
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Status code carried by a rejection, if this is one
    pub fn rejection_status(&self) -> Option<StatusCode> {
        match self {
            AgentError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The request never reached the server or no answer came back
    ///
    /// A frame that arrived but is malformed counts as a failed response,
    /// not a network problem.
    pub fn is_transport(&self) -> bool {
        match self {
            AgentError::Transport(TransportError::Frame(e)) => !e.is_malformed(),
            AgentError::Transport(_) => true,
            _ => false,
        }
    }
}

/// Result type for Agent operations
pub type AgentResult<T> = Result<T, AgentError>;

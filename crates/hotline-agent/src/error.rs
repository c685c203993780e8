use std::time::Duration;

use hotline_core::{Endpoint, TargetHandle};
use hotline_proto::{Action, CodecError};
use thiserror::Error;

pub type Result<T, E = ChannelError> = std::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("connection to agent at {endpoint} refused")]
    ConnectionRefused { endpoint: Endpoint },
    #[error("agent did not answer {action} within {after:?}")]
    Timeout { action: Action, after: Duration },
    /// The reply does not correspond to the outstanding request.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),
    /// The target has no agent endpoint (filesystem-only, never attached, or
    /// halted).
    #[error("target {0} is not attached to an agent")]
    Detached(TargetHandle),
    #[error("connection to agent closed")]
    ConnectionClosed,
    /// The agent answered with `status: error`.
    #[error("agent error: {message}")]
    Agent { action: Action, message: String },
    #[error("agent i/o error: {0}")]
    Io(String),
}

impl ChannelError {
    /// Transport errors leave the session usable; the caller may retry.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused { .. }
                | Self::Timeout { .. }
                | Self::ProtocolMismatch(_)
                | Self::ConnectionClosed
                | Self::Io(_)
        )
    }
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<CodecError> for ChannelError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(err) => Self::Io(err.to_string()),
            other => Self::ProtocolMismatch(other.to_string()),
        }
    }
}

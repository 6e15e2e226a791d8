use thiserror::Error;

use crate::codec::CodecError;
use crate::protocol::{ClientError, ErrorCode};
use crate::CallId;

/// Errors that can occur while issuing, serving or settling calls.
#[derive(Error, Debug)]
pub enum RpcError {
    /// The call did not settle within the configured call timeout.
    #[error("call timed out waiting for a reply")]
    Timeout,

    /// The channel closed before a reply arrived.
    #[error("channel closed before the call settled")]
    ChannelClosed,

    /// JSON conversion of a typed value failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The injected codec rejected a payload.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Posting to a message port failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A caller-assigned id is already in use by a pending call.
    #[error("call id {0} is already pending")]
    DuplicateCallId(CallId),

    /// A reply arrived for an id with no pending call.
    #[error("orphan reply for call id {0}")]
    OrphanReply(CallId),

    /// A message on the channel did not match the wire format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The remote procedure failed.
    #[error("remote error: {0}")]
    Remote(#[from] ClientError),

    /// A procedure path is already registered.
    #[error("procedure already registered: {0}")]
    DuplicateProcedure(String),

    /// A procedure path is not a valid dotted path.
    #[error("invalid procedure path: {0:?}")]
    InvalidPath(String),
}

impl RpcError {
    /// Wire error code carried by a remote failure, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        // ---
        match self {
            RpcError::Remote(err) => Some(err.code()),
            _ => None,
        }
    }
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;

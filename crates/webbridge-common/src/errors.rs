use std::time::Duration;

use crate::id::{ObjectId, RequestId};

/// A message that cannot be handled at the inbound boundary.
///
/// These are dropped with a diagnostic and never surface to pending calls:
/// one bad message must not crash unrelated work.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    #[error("response for unknown request id: {0}")]
    UnknownRequest(RequestId),
}

/// Setup-time failure while registering objects or members.
///
/// Surfaced synchronously to the registration caller; these indicate a host
/// wiring bug, not a runtime transient.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("duplicate object id: {0}")]
    DuplicateId(ObjectId),

    #[error("unresolved parent '{parent}' while binding '{path}'")]
    UnresolvedPath { path: String, parent: String },

    #[error("invalid object path: {0:?}")]
    InvalidPath(String),

    #[error("unknown object id: {0}")]
    UnknownObject(ObjectId),
}

/// The underlying channel to the host is unavailable.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport channel closed")]
    ChannelClosed,

    #[error("transport failure: {0}")]
    Failed(String),
}

/// Umbrella error for everything a bridge caller can observe.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The host processed the call and reported a failure.
    #[error("host error: {0}")]
    Host(String),

    /// The optional timeout policy rejected the call.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The bridge went away before the call completed.
    #[error("call abandoned before completion")]
    Abandoned,
}

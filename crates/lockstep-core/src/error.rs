//! Error types for lockstep
//!
//! The synchronization core itself never fails; these errors come from the
//! layers around it (wire decoding, transport, configuration).

use thiserror::Error;

/// Lockstep errors
#[derive(Error, Debug)]
pub enum LockstepError {
    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unknown frame kind: {0}")]
    UnknownFrameKind(u8),

    #[error("Unsupported wire version: {0}")]
    UnsupportedWireVersion(u8),

    #[error("Non-finite value in field {0}")]
    NonFiniteValue(&'static str),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Transport errors
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for lockstep operations
pub type LockstepResult<T> = Result<T, LockstepError>;

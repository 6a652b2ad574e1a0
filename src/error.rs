//! Error types for bluewire.

use thiserror::Error;

use crate::att::ErrorCode;

/// Main error type for all bluewire operations.
#[derive(Debug, Error)]
pub enum BluewireError {
    /// Transport failure (channel open/send/receive). Forces the session
    /// back to `Disconnected`.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// An inbound frame did not decode as the expected PDU shape.
    /// The session stays connected; only the awaiting caller sees this.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer answered a request with an ATT Error Response.
    #[error("peer rejected request {request:#04x} on handle {handle:#06x}: {code}")]
    Rejected {
        /// Opcode of the rejected request.
        request: u8,
        /// Attribute handle the error refers to.
        handle: u16,
        /// ATT error code from the response.
        code: ErrorCode,
    },

    /// Operation invoked while the session state forbids it.
    /// Rejected synchronously; no bytes are sent.
    #[error("bad state: {0}")]
    BadState(&'static str),

    /// Caller-supplied handle/UUID/value failed validation before any
    /// frame was built.
    #[error("bad parameter: {0}")]
    BadParam(String),

    /// The channel closed (or `disconnect` was called) while an operation
    /// was outstanding.
    #[error("disconnected")]
    Disconnected,

    /// The configured request timeout elapsed before a response arrived.
    #[error("request timed out")]
    Timeout,
}

/// Result type alias using BluewireError.
pub type Result<T> = std::result::Result<T, BluewireError>;

impl BluewireError {
    /// Shorthand for a `Protocol` error from a format-ready message.
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

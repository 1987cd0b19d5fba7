//! Error types for gearwire.

use thiserror::Error;

/// Main error type for all agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The endpoint could not be reached.
    #[error("failed to dial {endpoint}: {source}")]
    Dial {
        /// Endpoint that was dialed.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Recoverable read condition; the read is retried in place.
    #[error("transient network error: {0}")]
    Transient(#[source] std::io::Error),

    /// The current socket generation is gone (remote close, reset, EOF).
    #[error("disconnected from {endpoint}: {source}")]
    Disconnected {
        /// Endpoint the agent was connected to.
        endpoint: String,
        /// Error that ended the connection.
        #[source]
        source: std::io::Error,
    },

    /// Not enough bytes buffered to decode an envelope yet.
    ///
    /// This is a control-flow signal for the framer, not a fault.
    #[error("insufficient data: need {needed} bytes, have {available}")]
    InsufficientData {
        /// Bytes required for the next step of decoding.
        needed: usize,
        /// Bytes currently available.
        available: usize,
    },

    /// The byte stream can not be a valid envelope sequence.
    #[error("protocol corruption: {0}")]
    ProtocolCorruption(String),

    /// An outbound packet could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Writing to the socket failed or was partial.
    #[error("write error: {0}")]
    Write(#[source] std::io::Error),

    /// A write was attempted while no socket is open.
    #[error("agent is not connected")]
    NotConnected,

    /// `connect()` was called on a live connection.
    #[error("agent is already connected")]
    AlreadyConnected,

    /// The `(network, address)` pair is not dialable.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The worker dropped its delivery queue.
    #[error("delivery queue closed")]
    DeliveryClosed,

    /// The read loop panicked and was contained at the task boundary.
    #[error("read loop panicked: {0}")]
    ReadLoopPanic(String),
}

impl AgentError {
    /// True for the framer's "keep buffering" signal.
    #[inline]
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, AgentError::InsufficientData { .. })
    }

    /// True when the error retires the socket generation it happened on.
    pub fn is_fatal_for_connection(&self) -> bool {
        matches!(
            self,
            AgentError::Disconnected { .. } | AgentError::Write(_) | AgentError::NotConnected
        )
    }
}

/// Result type alias using AgentError.
pub type Result<T> = std::result::Result<T, AgentError>;

//! GTP Error types

use thiserror::Error;

/// GTP Error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GtpError {
    /// Buffer too short for operation
    #[error("Buffer too short: need {needed} bytes, have {available}")]
    BufferTooShort { needed: usize, available: usize },

    /// Invalid message format
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    /// Invalid message type
    #[error("Invalid message type: {0}")]
    InvalidMessageType(u8),

    /// Invalid version
    #[error("Invalid GTP version: {0}")]
    InvalidVersion(u8),

    /// Encoding error
    #[error("Encoding error: {0}")]
    EncodingError(String),

    /// Decoding error
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// Resource exhausted
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Response kind differs from the kind pinned on the transaction
    #[error("Protocol mismatch: SQN[{sqn}] expected type {expected} received {received}")]
    ProtocolMismatch { sqn: u32, expected: u8, received: u8 },

    /// Sequence number collides with a live or recently completed transaction
    #[error("Duplicate transaction: SQN[{sqn}] type {message_type}")]
    DuplicateTransaction { sqn: u32, message_type: u8 },

    /// Non-initial message with no transaction to correlate against
    #[error("Unexpected message: SQN[{sqn}] type {message_type} matches no transaction")]
    UnexpectedMessage { sqn: u32, message_type: u8 },

    /// Response sent for a transaction id the engine does not know
    #[error("Transaction not found: XID[{0}]")]
    TransactionNotFound(u64),

    /// Datagram could not be handed to the socket
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<bincode::Error> for GtpError {
    fn from(e: bincode::Error) -> Self {
        GtpError::DecodingError(e.to_string())
    }
}

/// GTP Result type
pub type GtpResult<T> = Result<T, GtpError>;

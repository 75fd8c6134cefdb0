//! Error types for the FerroFix session engine.
//!
//! This module provides a unified error hierarchy using `thiserror` for typed,
//! domain-specific errors across all FerroFix operations.
//!
//! Transport failures (`ConnectionError`) are fatal to the connection but not
//! to persisted session state. Store failures (`StoreError`) are fatal to the
//! session. Sequence gaps are deliberately *not* represented here: they are
//! recoverable in-protocol and modeled by the session layer instead.

use thiserror::Error;

/// Result type alias using [`FixError`] as the error type.
pub type Result<T> = std::result::Result<T, FixError>;

/// Top-level error type for all FerroFix operations.
#[derive(Debug, Error)]
pub enum FixError {
    /// Error during message decoding.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error during message encoding.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Error in session layer operations.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error in message store operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error in the message audit log.
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// Connection-level transport error.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
}

/// Errors at the byte-transport level.
///
/// Always fatal to the current connection, never to the persisted session
/// state: sequence counters and stored messages survive for the next
/// connection attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The peer closed the connection. Surfaced as a distinguished error,
    /// never as a silent zero-length read.
    #[error("connection closed by peer")]
    PeerClosed,

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ConnectionError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors that occur during FIX message decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Message buffer is incomplete, need more data.
    #[error("incomplete message, need more data")]
    Incomplete,

    /// Invalid BeginString field (tag 8).
    #[error("invalid begin string: expected 8=FIX.x.y")]
    InvalidBeginString,

    /// Missing BodyLength field (tag 9).
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// Invalid BodyLength value.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// Missing MsgType field (tag 35).
    #[error("missing msg type field (tag 35)")]
    MissingMsgType,

    /// Checksum mismatch between calculated and declared values.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum value.
        calculated: u8,
        /// Declared checksum value in message.
        declared: u8,
    },

    /// Missing required field.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// Invalid field value for the expected type.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },

    /// Invalid UTF-8 in string field.
    #[error("invalid utf-8 in field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Message exceeds maximum allowed size.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Actual message size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max_size: usize,
    },
}

/// Errors that occur during FIX message encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Buffer capacity exceeded during encoding.
    #[error("buffer overflow: need {needed} bytes, have {available}")]
    BufferOverflow {
        /// Bytes needed to complete encoding.
        needed: usize,
        /// Bytes available in buffer.
        available: usize,
    },

    /// Missing required field during encoding.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },
}

/// Errors in FIX session layer operations.
///
/// These represent protocol violations and lifecycle failures; each one
/// produces a Reject or Logout and a transition to `Disconnected`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session is not in the correct state for the operation.
    #[error("invalid session state: expected {expected}, current {current}")]
    InvalidState {
        /// Expected state for the operation.
        expected: String,
        /// Current session state.
        current: String,
    },

    /// Logon was rejected: bad credentials or CompIDs.
    #[error("logon rejected: {reason}")]
    LogonRejected {
        /// Reason for rejection.
        reason: String,
    },

    /// CompIDs on an inbound message do not match the session identity.
    #[error("comp id mismatch: expected {expected}, received {received}")]
    CompIdMismatch {
        /// Expected CompID.
        expected: String,
        /// Received CompID.
        received: String,
    },

    /// Heartbeat timeout: no response to an outstanding TestRequest.
    #[error("heartbeat timeout after {elapsed_ms} milliseconds")]
    HeartbeatTimeout {
        /// Elapsed time in milliseconds since the last inbound message.
        elapsed_ms: u64,
    },

    /// Sequence number lower than expected without PossDupFlag.
    #[error("sequence too low: expected {expected}, received {received}")]
    SequenceTooLow {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// Inbound bytes could not be parsed as a FIX message.
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Errors in message store operations.
///
/// Any store failure during an outbound send is fatal to the session: the
/// engine cannot guarantee recoverability and must force a logout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Failed to store a message.
    #[error("failed to store message seq={seq_num}: {reason}")]
    WriteFailed {
        /// Sequence number of the message.
        seq_num: u64,
        /// Reason for failure.
        reason: String,
    },

    /// Message not found in the store.
    #[error("message not found: seq={seq_num}")]
    NotFound {
        /// Sequence number of the missing message.
        seq_num: u64,
    },

    /// Persisted state is corrupted beyond recovery.
    #[error("store corrupted: {reason}")]
    Corrupted {
        /// Description of the corruption.
        reason: String,
    },

    /// I/O error in a persistent store.
    #[error("store i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors in the append-only message audit log.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogError {
    /// I/O error while appending to the log.
    #[error("log i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for LogError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Terminal reason a session stopped, surfaced to the session owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Local side requested a graceful logout.
    LocalLogout,
    /// Peer initiated a graceful logout.
    PeerLogout,
    /// No inbound traffic despite a TestRequest; connection considered dead.
    HeartbeatTimeout,
    /// Peer violated the session protocol.
    ProtocolViolation(String),
    /// A message store write failed; recoverability cannot be guaranteed.
    StoreFailure(String),
    /// The transport failed or the peer closed the connection.
    ConnectionLost(String),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalLogout => write!(f, "local logout"),
            Self::PeerLogout => write!(f, "peer logout"),
            Self::HeartbeatTimeout => write!(f, "heartbeat timeout"),
            Self::ProtocolViolation(reason) => write!(f, "protocol violation: {reason}"),
            Self::StoreFailure(reason) => write!(f, "store failure: {reason}"),
            Self::ConnectionLost(reason) => write!(f, "connection lost: {reason}"),
        }
    }
}

//! Error types for framing and message decoding.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Structural errors found while framing or decoding protocol data.
///
/// Every variant describes malformed input from the peer. None of them are
/// recoverable on an established channel: the stream can no longer be trusted
/// to be in sync.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer shorter than a frame header
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum bytes needed
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Payload shorter than the header claims
    #[error("frame truncated: header claims {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Bytes claimed by the header
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Magic number mismatch
    #[error("invalid magic number")]
    InvalidMagic,

    /// Unknown protocol version
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Unknown frame kind byte
    #[error("unknown frame kind: {0:#04x}")]
    UnknownFrameKind(u8),

    /// Payload exceeds the protocol limit
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Actual payload size
        size: usize,
        /// Allowed maximum
        max: usize,
    },

    /// IV frame did not carry exactly 16 bytes
    #[error("invalid IV length: {0}")]
    InvalidIvLength(usize),

    /// CBOR encoding failed
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// CBOR decoding failed
    #[error("CBOR decode error: {0}")]
    CborDecode(String),

    /// Envelope carried the wrong number of payload values for its tag
    #[error("invalid arity for {tag}: expected {expected}, got {actual}")]
    InvalidArity {
        /// Envelope tag
        tag: String,
        /// Values required by the tag
        expected: usize,
        /// Values present
        actual: usize,
    },

    /// Payload value at `index` had the wrong type
    #[error("invalid value for {tag} at position {index}: expected {expected}")]
    InvalidValue {
        /// Envelope tag
        tag: String,
        /// Position within the payload
        index: usize,
        /// Expected value type
        expected: &'static str,
    },

    /// Tag is not part of the protocol vocabulary
    #[error("unknown message tag: {0:?}")]
    UnknownTag(String),

    /// Envelope on an established channel had no trailing sequence number
    #[error("missing sequence number")]
    MissingSequence,
}

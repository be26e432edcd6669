//! Error types for the Sharevault core.
//!
//! Two families:
//!
//! - [`ChannelError`]: anything that breaks a secure channel (transport
//!   failure, protocol violation, failed handshake). Always fatal to the
//!   connection.
//! - [`TrustError`]: the TOFU step refused or could not record a key.
//!   Aborts the connection attempt only.
//!
//! Authorization failures are not errors at this level; see
//! [`crate::authz::Denial`].

use std::io;

use sharevault_crypto::CryptoError;
use sharevault_proto::{FrameKind, ProtocolError};
use thiserror::Error;

use crate::channel::ChannelState;

/// Text shown to end users for any transport or protocol failure.
pub const CONNECTION_INTERRUPTED: &str = "Connection interrupted. Please reconnect and try again.";

/// Errors that break a secure channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Operation not valid in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when the error occurred
        state: ChannelState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Frame of the wrong kind for the current step
    #[error("unexpected frame: expected {expected:?}, received {actual:?}")]
    UnexpectedFrame {
        /// Frame kind the channel was waiting for
        expected: FrameKind,
        /// Frame kind that arrived
        actual: FrameKind,
    },

    /// Sequence number was not exactly the previous one plus one
    #[error("sequence mismatch: expected {expected}, received {actual}")]
    SequenceMismatch {
        /// Next value this side expected
        expected: u64,
        /// Value carried by the message
        actual: u64,
    },

    /// Sequence counter cannot advance further
    #[error("sequence counter exhausted")]
    SequenceExhausted,

    /// Handshake did not complete
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Message arrived that this side does not expect at this point
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// Framing or message decoding failed
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Decryption or HMAC verification failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Peer closed the stream
    #[error("connection closed by peer")]
    PeerClosed,

    /// Underlying transport error
    #[error("transport error: {0}")]
    Transport(String),
}

impl ChannelError {
    /// True for failures caused by the peer's bytes rather than the network.
    ///
    /// Servers log these at `warn`; transport failures are routine and log at
    /// `debug`.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, Self::PeerClosed | Self::Transport(_))
    }

    /// Message to show an end user. Every variant renders the same generic
    /// text: the details belong in logs, not on screen.
    pub fn user_message(&self) -> &'static str {
        CONNECTION_INTERRUPTED
    }
}

impl From<io::Error> for ChannelError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::PeerClosed
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Errors from the trust-on-first-use step.
#[derive(Error, Debug)]
pub enum TrustError {
    /// Operator did not confirm the fingerprint
    #[error("host key for {identity} was rejected")]
    Rejected {
        /// Server identity (`ip:port`)
        identity: String,
    },

    /// Offered key could not be parsed or fingerprinted
    #[error("invalid host key: {0}")]
    InvalidKey(#[from] CryptoError),

    /// Prompt or known-hosts file I/O failed
    #[error("known hosts I/O error: {0}")]
    Io(#[from] io::Error),

    /// Known-hosts file is corrupt
    #[error("known hosts file is corrupt: {0}")]
    Corrupt(String),
}

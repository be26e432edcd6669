//! Handshake messages: key offer and session-key transport.

use std::fmt;

/// Length of the per-connection session and signing keys.
pub const SYMMETRIC_KEY_LEN: usize = 16;

/// A file server's long-term public key, offered in the clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOffer {
    /// SPKI DER encoding of the RSA public key
    pub public_key: Vec<u8>,
}

/// Initiator's first message, sealed under the responder's public key.
///
/// Carries the only copy of the session and signing keys that ever crosses
/// the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Connect {
    /// Random value the responder must echo back incremented by one
    pub challenge: i64,
    /// AES-128 key for envelope confidentiality
    pub session_key: [u8; SYMMETRIC_KEY_LEN],
    /// HMAC-SHA1 key for envelope integrity
    pub signing_key: [u8; SYMMETRIC_KEY_LEN],
}

impl fmt::Debug for Connect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connect")
            .field("challenge", &self.challenge)
            .field("session_key", &"<redacted>")
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

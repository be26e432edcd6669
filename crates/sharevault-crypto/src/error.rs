//! Errors from cryptographic operations.

use thiserror::Error;

/// Failures of the primitives in this crate.
///
/// Messages never include key material or plaintext.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Ciphertext could not be decrypted (wrong key, wrong IV or bad padding)
    #[error("decryption failed")]
    Decryption,

    /// HMAC tag did not match the data
    #[error("message authentication failed")]
    MacMismatch,

    /// HMAC tag was not valid hex
    #[error("malformed message authentication code")]
    MalformedMac,

    /// RSA encryption or decryption failed
    #[error("RSA operation failed: {0}")]
    Rsa(String),

    /// Signature did not verify
    #[error("invalid signature")]
    InvalidSignature,

    /// Key could not be encoded or decoded
    #[error("key encoding error: {0}")]
    KeyEncoding(String),
}

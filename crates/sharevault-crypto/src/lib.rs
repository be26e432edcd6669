//! Sharevault cryptographic primitives.
//!
//! Pure functions and key types with no I/O. Randomness is always supplied by
//! the caller (either raw bytes or an `RngCore + CryptoRng`), so every
//! operation is deterministic under a seeded generator in tests.
//!
//! # Envelope pipeline
//!
//! ```text
//! CBOR(Envelope)
//!       │  AES-128-CBC / PKCS#7  (SessionKey, fresh IV)
//!       ▼
//! ciphertext ──► HMAC-SHA1 (SigningKey) ──► hex tag
//! ```
//!
//! Before a session exists, the initiator transports the session and signing
//! keys under the responder's RSA public key ([`PublicIdentity::seal`]).
//!
//! # Security
//!
//! - The IV is not covered by the HMAC. Flipping IV bits flips the same bits
//!   of the first plaintext block; this is a known property of the wire
//!   format.
//! - Symmetric keys and decrypted RSA plaintexts are zeroized on drop.
//! - Password digests and MAC tags are compared in constant time.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
mod error;
pub mod identity;
mod keys;
pub mod mac;
pub mod password;

pub use error::CryptoError;
pub use identity::{DEFAULT_RSA_BITS, IdentityKeyPair, PublicIdentity, fingerprint};
pub use keys::{GroupKey, KEY_LEN, SessionKey, SigningKey};
pub use password::PasswordHash;

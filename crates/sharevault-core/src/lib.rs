//! Sharevault core logic.
//!
//! Everything that decides, and nothing that listens: the secure channel
//! state machine, the async session that drives it over a byte stream,
//! trust-on-first-use pinning, token signing and validation, and the
//! authorization engine that owns the user and group directory.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐     ┌──────────────────────┐
//! │  AuthorizationEngine │     │      TrustStore      │
//! │ users, groups, keys  │     │  pinned host keys    │
//! └──────────┬───────────┘     └──────────┬───────────┘
//!            │ Message                    │ PublicIdentity
//! ┌──────────▼────────────────────────────▼───────────┐
//! │          Session  (read_frame / write_frames)     │
//! │ ┌───────────────────────────────────────────────┐ │
//! │ │ SecureChannel: handshake, seal, open, seqnum  │ │
//! │ └───────────────────────────────────────────────┘ │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! Time and randomness come from an [`Environment`], so the channel and the
//! engine run deterministically in tests.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod authz;
pub mod channel;
pub mod credentials;
pub mod env;
pub mod error;
pub mod keyring;
pub mod session;
pub mod snapshot;
pub mod token;
pub mod transport;
pub mod trust;

pub use authz::{ADMIN_GROUP, AuthorizationEngine, AuthzConfig, DEFAULT_SERVER_NAME, Denial};
pub use channel::{ChannelState, Role, SealedFrames, SecureChannel};
pub use credentials::{PasswordThrottle, UserRecord};
pub use env::{EnvRng, Environment};
pub use error::{CONNECTION_INTERRUPTED, ChannelError, TrustError};
pub use keyring::KeyRing;
pub use session::{Session, answer_key_offer, offer_key, receive_key_offer};
pub use snapshot::{DirectorySnapshot, UserEntry};
pub use token::{TokenRejection, TokenVerifier, sign_token};
pub use transport::{read_frame, write_frames};
pub use trust::{Prompter, TrustStore, is_affirmative};

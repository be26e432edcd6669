//! Sharevault wire protocol.
//!
//! Everything a peer writes on a TCP stream is a [`Frame`]: a 12-byte binary
//! header followed by a payload whose interpretation depends on the
//! [`FrameKind`]:
//!
//! ```text
//! Plain   CBOR Envelope                       (KEY, SUCCESS_KEY, FAIL_KEY)
//! Iv      16 raw bytes                        (before every encrypted frame)
//! Sealed  RSA(CBOR Envelope)                  (CONNECT)
//! Signed  CBOR { AES-CBC(CBOR Envelope), hmac }  (everything else)
//! ```
//!
//! An [`Envelope`] is a string tag plus positional [`Value`]s. Application
//! code never touches positions: [`Message`] is the typed view, and
//! [`Message::from_envelope`] is the single point where arity and value types
//! are validated.
//!
//! This crate is pure data. It holds no keys and performs no cryptography;
//! see `sharevault-crypto` and `sharevault-core` for the channel itself.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod envelope;
pub mod errors;
pub mod frame;
pub mod header;
pub mod messages;
pub mod response;
pub mod token;

pub use envelope::{Envelope, SignedContainer, Value};
pub use errors::{ProtocolError, Result};
pub use frame::{Frame, IV_LEN};
pub use header::{FrameHeader, FrameKind};
pub use messages::Message;
pub use response::ResponseTag;
pub use token::{Endpoint, RESERVED_CHAR, TOKEN_DELIMITER, Token, TokenClaims, is_valid_name};

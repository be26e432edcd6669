//! Fixed-size frame header with zero-copy parsing.
//!
//! Every unit written to a Sharevault stream starts with this 12-byte header.
//! It tells the reader how many payload bytes follow and how to interpret
//! them, so the receive path can validate framing before touching any
//! ciphertext.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// What the payload of a frame contains.
///
/// The kind is structural only. It never replaces authentication: a `Signed`
/// frame still has to pass HMAC verification before its content is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// CBOR envelope in the clear (public key offer and its answer)
    Plain = 0x01,
    /// 16 raw initialization-vector bytes preceding an encrypted frame
    Iv = 0x02,
    /// RSA ciphertext of a CBOR envelope (handshake bootstrap)
    Sealed = 0x03,
    /// CBOR `{ciphertext, hmac}` container on an established channel
    Signed = 0x04,
}

impl FrameKind {
    /// Raw wire byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire byte. `None` if unrecognized.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Plain),
            0x02 => Some(Self::Iv),
            0x03 => Some(Self::Sealed),
            0x04 => Some(Self::Signed),
            _ => None,
        }
    }
}

/// Fixed 12-byte frame header (big endian).
///
/// ```text
/// 0      4        5     6          8              12
/// ┌──────┬────────┬─────┬──────────┬──────────────┐
/// │ SVLT │ version│ kind│ reserved │ payload_size │
/// └──────┴────────┴─────┴──────────┴──────────────┘
/// ```
///
/// # Security
///
/// `#[repr(C, packed)]` with zerocopy traits makes every 12-byte pattern a
/// valid value, so casting untrusted network bytes cannot cause undefined
/// behavior. Semantic checks (magic, version, kind, size limit) happen in
/// [`FrameHeader::from_bytes`].
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    magic: [u8; 4],
    version: u8,
    kind: u8,
    reserved: [u8; 2],
    pub(crate) payload_size: [u8; 4],
}

impl FrameHeader {
    /// Size of the serialized header
    pub const SIZE: usize = 12;

    /// Magic number: "SVLT" in ASCII
    pub const MAGIC: u32 = 0x5356_4C54;

    /// Current protocol version
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (16 MB)
    pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

    /// Header for a frame of the given kind with an empty payload.
    #[must_use]
    pub fn new(kind: FrameKind) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            kind: kind.to_u8(),
            reserved: [0; 2],
            payload_size: [0; 4],
        }
    }

    /// Parse a header from the front of `bytes` without copying.
    ///
    /// # Errors
    ///
    /// - `FrameTooShort` if fewer than [`Self::SIZE`] bytes are available
    /// - `InvalidMagic` / `UnsupportedVersion` / `UnknownFrameKind` for
    ///   foreign or corrupted data
    /// - `PayloadTooLarge` if the claimed size exceeds the limit
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        if FrameKind::from_u8(header.kind).is_none() {
            return Err(ProtocolError::UnknownFrameKind(header.kind));
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }

    /// Frame kind. Validated on parse, so this only falls back to `Plain`
    /// for headers built in memory with a corrupted kind byte.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        FrameKind::from_u8(self.kind).unwrap_or(FrameKind::Plain)
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }
}

impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("kind", &self.kind())
            .field("payload_size", &self.payload_size())
            .finish()
    }
}

impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}

//! Frame type combining header and payload.
//!
//! A `Frame` is the transport unit: a 12-byte header followed by opaque
//! payload bytes. It carries no cryptographic meaning by itself. Sealing,
//! signing and decryption happen one layer up in the secure channel.

use bytes::{BufMut, Bytes};

use crate::{
    FrameHeader, FrameKind,
    errors::{ProtocolError, Result},
};

/// Length of an AES-CBC initialization vector.
pub const IV_LEN: usize = 16;

/// Complete protocol frame.
///
/// Layout on the wire: `[FrameHeader: 12 bytes] + [payload: variable bytes]`
///
/// # Invariants
///
/// - `payload.len()` always matches `header.payload_size()`; enforced by
///   [`Frame::new`] and verified by [`Frame::decode`].
/// - `payload.len()` never exceeds [`FrameHeader::MAX_PAYLOAD_SIZE`] once
///   encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,

    /// Raw payload bytes
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, setting `payload_size` from the payload.
    ///
    /// Payloads larger than `u32::MAX` saturate the size field and are then
    /// rejected by [`Frame::encode`].
    #[must_use]
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let mut header = FrameHeader::new(kind);
        let payload_len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        header.payload_size = payload_len.to_be_bytes();

        Self { header, payload }
    }

    /// Frame carrying an initialization vector.
    #[must_use]
    pub fn iv(iv: [u8; IV_LEN]) -> Self {
        Self::new(FrameKind::Iv, Bytes::copy_from_slice(&iv))
    }

    /// Frame kind from the header.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        self.header.kind()
    }

    /// Interpret this frame as an IV frame.
    ///
    /// # Errors
    ///
    /// - `InvalidIvLength` if the payload is not exactly 16 bytes
    pub fn as_iv(&self) -> Result<[u8; IV_LEN]> {
        <[u8; IV_LEN]>::try_from(self.payload.as_ref())
            .map_err(|_| ProtocolError::InvalidIvLength(self.payload.len()))
    }

    /// Total encoded length.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Encode frame into buffer.
    ///
    /// # Errors
    ///
    /// - `PayloadTooLarge` if payload exceeds 16 MB
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        debug_assert_eq!(self.payload.len(), self.header.payload_size() as usize);

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a frame from wire bytes. Trailing bytes are ignored.
    ///
    /// # Errors
    ///
    /// - Header errors from [`FrameHeader::from_bytes`]
    /// - `FrameTruncated` if fewer payload bytes are present than claimed
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;
        let payload_size = header.payload_size() as usize;

        let Some(payload) = bytes.get(FrameHeader::SIZE..FrameHeader::SIZE + payload_size) else {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_size,
                actual: bytes.len().saturating_sub(FrameHeader::SIZE),
            });
        };

        Ok(Self { header: *header, payload: Bytes::copy_from_slice(payload) })
    }
}

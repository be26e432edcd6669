//! Fuzz target for frame header boundary conditions
//!
//! # Strategy
//!
//! - Magic bytes: Valid, off-by-one, all-zeros, all-ones, random
//! - Payload size: Zero, small, at-max, just-over-max, u32::MAX
//! - Version and kind: valid and random
//!
//! # Invariants
//!
//! - `payload_size > MAX_PAYLOAD_SIZE` MUST return `PayloadTooLarge`
//! - Invalid magic MUST return `InvalidMagic`
//! - Unknown kind bytes MUST return `UnknownFrameKind`
//! - Encoded size MUST equal 12 + payload length

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sharevault_proto::{Frame, FrameHeader, FrameKind, ProtocolError};

const MAGIC: [u8; 4] = *b"SVLT";

#[derive(Debug, Clone, Arbitrary)]
struct BoundaryFrame {
    magic: MagicBytes,
    version: u8,
    valid_version: bool,
    kind: u8,
    payload_size: PayloadSize,
}

#[derive(Debug, Clone, Arbitrary)]
enum MagicBytes {
    Valid,
    OffByOne(u8),
    AllZeros,
    AllOnes,
    Random([u8; 4]),
}

#[derive(Debug, Clone, Arbitrary)]
enum PayloadSize {
    Zero,
    Small(u8),
    AtMax,
    JustOverMax,
    MaxU32,
    Random(u32),
}

fuzz_target!(|boundary: BoundaryFrame| {
    let claimed = match boundary.payload_size {
        PayloadSize::Zero => 0,
        PayloadSize::Small(s) => u32::from(s),
        PayloadSize::AtMax => FrameHeader::MAX_PAYLOAD_SIZE,
        PayloadSize::JustOverMax => FrameHeader::MAX_PAYLOAD_SIZE + 1,
        PayloadSize::MaxU32 => u32::MAX,
        PayloadSize::Random(r) => r,
    };

    let present = claimed.min(100_000) as usize;
    let mut buffer = vec![0u8; FrameHeader::SIZE + present];

    match boundary.magic {
        MagicBytes::Valid => buffer[0..4].copy_from_slice(&MAGIC),
        MagicBytes::OffByOne(offset) => {
            buffer[0..4].copy_from_slice(&MAGIC);
            let idx = (offset % 4) as usize;
            buffer[idx] = buffer[idx].wrapping_add(1);
        },
        MagicBytes::AllZeros => buffer[0..4].fill(0),
        MagicBytes::AllOnes => buffer[0..4].fill(0xFF),
        MagicBytes::Random(bytes) => buffer[0..4].copy_from_slice(&bytes),
    }
    buffer[4] = if boundary.valid_version { FrameHeader::VERSION } else { boundary.version };
    buffer[5] = boundary.kind;
    buffer[8..12].copy_from_slice(&claimed.to_be_bytes());

    match Frame::decode(&buffer) {
        Ok(frame) => {
            assert_eq!(buffer[0..4], MAGIC);
            assert_eq!(buffer[4], FrameHeader::VERSION);
            assert!(claimed <= FrameHeader::MAX_PAYLOAD_SIZE);
            assert_eq!(frame.kind().to_u8(), boundary.kind);
            assert_eq!(frame.payload.len(), claimed as usize);
        },
        Err(ProtocolError::InvalidMagic) => assert_ne!(buffer[0..4], MAGIC),
        Err(ProtocolError::PayloadTooLarge { .. }) => {
            assert!(claimed > FrameHeader::MAX_PAYLOAD_SIZE);
        },
        Err(ProtocolError::UnknownFrameKind(kind)) => {
            assert!(FrameKind::from_u8(kind).is_none());
        },
        Err(_) => {},
    }

    let Some(kind) = FrameKind::from_u8(boundary.kind) else {
        return;
    };
    let frame = Frame::new(kind, vec![0xAA; present.min(1000)]);
    let mut encoded = Vec::new();
    if frame.encode(&mut encoded).is_err() {
        return;
    }
    assert_eq!(encoded.len(), FrameHeader::SIZE + frame.payload.len());

    let decoded = Frame::decode(&encoded).expect("encoded frame must decode");
    assert_eq!(decoded, frame);
});

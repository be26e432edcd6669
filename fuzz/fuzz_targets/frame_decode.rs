//! Fuzz target for Frame::decode
//!
//! Arbitrary bytes through the frame parser, looking for:
//! - Parser crashes or panics
//! - Integer overflows in size calculations
//! - Buffer over-reads
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sharevault_proto::{Frame, FrameHeader};

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = Frame::decode(data) {
        assert_eq!(frame.payload.len(), frame.header.payload_size() as usize);
        assert!(frame.encoded_len() <= data.len());
        assert!(frame.header.payload_size() <= FrameHeader::MAX_PAYLOAD_SIZE);
    }
});

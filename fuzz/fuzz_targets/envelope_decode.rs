//! Fuzz target for envelope and message decoding
//!
//! # Strategy
//!
//! - Random bytes: arbitrary CBOR through `Envelope::from_cbor`
//! - Structured envelopes: every known tag with arbitrary values, so the
//!   arity and type checks of `Message::from_envelope` are exercised
//! - Deep nesting: CBOR arrays nested to arbitrary depth
//! - Signed containers: arbitrary bytes through `SignedContainer::from_cbor`
//!
//! # Invariants
//!
//! - Decoding NEVER panics
//! - A decoded message re-encodes to an envelope that decodes to the same
//!   message

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sharevault_proto::{Endpoint, Envelope, Message, SignedContainer, Token, TokenClaims, Value};

const TAGS: &[&str] = &[
    "KEY", "CONNECT", "SUCCESS_CONNECT", "FAIL_CONNECT", "GET", "CUSER", "DUSER", "CGROUP",
    "DGROUP", "LMEMBERS", "AUSERTOGROUP", "RUSERFROMGROUP", "AOWNERTOGROUP", "ROWNERFROMGROUP",
    "GETKEY", "LFILES", "UPLOADF", "DOWNLOADF", "DELETEF", "READY", "EOF", "CHUNK", "OK",
    "DISCONNECT", "SUCCESS_GET", "SUCCESS_LIST_MEMBERS", "SUCCESS_GET_KEY", "FAIL", "NOPE",
];

#[derive(Debug, Clone, Arbitrary)]
enum Input {
    RawBytes(Vec<u8>),
    Structured { tag: u8, values: Vec<FuzzValue> },
    DeeplyNested { depth: u8 },
    Container(Vec<u8>),
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzValue {
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<String>),
    Token { subject: String, groups: Vec<String>, port: u16, signature: Vec<u8> },
}

impl FuzzValue {
    fn into_value(self) -> Value {
        match self {
            Self::Int(i) => Value::Int(i),
            Self::Str(s) => Value::Str(s),
            Self::Bytes(b) => Value::Bytes(b),
            Self::List(l) => Value::List(l),
            Self::Token { subject, groups, port, signature } => Value::Token(Token::new(
                TokenClaims {
                    issuer: "ALPHA".into(),
                    subject,
                    groups,
                    endpoint: Endpoint::new("127.0.0.1", port),
                },
                signature,
            )),
        }
    }
}

fn check_message(envelope: Envelope) {
    if let Ok(message) = Message::from_envelope(envelope) {
        let again = Message::from_envelope(message.clone().into_envelope())
            .expect("re-encoded message must decode");
        assert_eq!(again, message);
    }
}

fuzz_target!(|input: Input| {
    match input {
        Input::RawBytes(bytes) => {
            if let Ok(envelope) = Envelope::from_cbor(&bytes) {
                check_message(envelope);
            }
        },
        Input::Structured { tag, values } => {
            let tag = TAGS[tag as usize % TAGS.len()];
            let payload = values.into_iter().map(FuzzValue::into_value).collect();
            let envelope = Envelope::with_payload(tag, payload);
            let bytes = envelope.to_cbor().expect("envelope must encode");
            let decoded = Envelope::from_cbor(&bytes).expect("encoded envelope must decode");
            check_message(decoded);
        },
        Input::DeeplyNested { depth } => {
            let depth = usize::from(depth);
            let mut bytes = vec![0x81; depth];
            bytes.push(0x00);
            let _ = Envelope::from_cbor(&bytes);
        },
        Input::Container(bytes) => {
            let _ = SignedContainer::from_cbor(&bytes);
        },
    }
});

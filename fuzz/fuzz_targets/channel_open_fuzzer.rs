//! Fuzz target for receiving on an established secure channel
//!
//! # Strategy
//!
//! - Untouched: a correctly sealed message
//! - Ciphertext / HMAC bit flips inside the signed container
//! - IV bit flips (the IV is not covered by the HMAC)
//! - Raw bytes as the signed frame body
//! - Replays of an already accepted message
//!
//! # Invariants
//!
//! - Untouched messages open to the sealed message
//! - Any ciphertext or HMAC change is rejected
//! - Replays are rejected
//! - Nothing panics

#![no_main]

use std::sync::{Arc, OnceLock};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use sharevault_core::SecureChannel;
use sharevault_crypto::IdentityKeyPair;
use sharevault_proto::{Frame, FrameKind, Message, SignedContainer, messages::Chunk};
use sharevault_server::SystemEnv;

#[derive(Debug, Clone, Arbitrary)]
enum Mutation {
    Untouched,
    FlipCiphertext { index: u16, bit: u8 },
    FlipHmac { index: u8 },
    FlipIv { index: u8, bit: u8 },
    RawBody(Vec<u8>),
    Replay,
}

#[derive(Debug, Clone, Arbitrary)]
struct Case {
    data: Vec<u8>,
    mutation: Mutation,
}

fn identity() -> Arc<IdentityKeyPair> {
    static KEY: OnceLock<Arc<IdentityKeyPair>> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        Arc::new(IdentityKeyPair::generate(&mut rng, 2048).expect("key generation"))
    })
    .clone()
}

fn established(env: &SystemEnv) -> (SecureChannel, SecureChannel) {
    let server_identity = identity();
    let mut client = SecureChannel::initiator(server_identity.public().clone());
    let mut server = SecureChannel::responder(server_identity);

    let hello = client.begin_handshake(env).expect("begin handshake");
    let reply = server.accept_connect(env, &hello.iv, &hello.body).expect("accept");
    client.complete_handshake(&reply.iv, &reply.body).expect("complete");
    (client, server)
}

fuzz_target!(|case: Case| {
    let env = SystemEnv::new();
    let (mut client, mut server) = established(&env);
    let message = Message::Chunk(Chunk { data: case.data });
    let sealed = client.seal(&env, message.clone()).expect("seal");
    let (mut iv, mut body) = (sealed.iv, sealed.body);

    match case.mutation {
        Mutation::Untouched => {
            assert_eq!(server.open(&iv, &body).expect("untouched message"), message);
        },
        Mutation::Replay => {
            server.open(&iv, &body).expect("first delivery");
            assert!(server.open(&iv, &body).is_err());
        },
        Mutation::FlipCiphertext { index, bit } => {
            let mut container = SignedContainer::from_cbor(&body.payload).expect("container");
            if container.ciphertext.is_empty() {
                return;
            }
            let i = usize::from(index) % container.ciphertext.len();
            container.ciphertext[i] ^= 1 << (bit % 8);
            body = Frame::new(FrameKind::Signed, container.to_cbor().expect("encode"));
            assert!(server.open(&iv, &body).is_err());
        },
        Mutation::FlipHmac { index } => {
            let mut container = SignedContainer::from_cbor(&body.payload).expect("container");
            let mut hmac = container.hmac.into_bytes();
            let i = usize::from(index) % hmac.len();
            hmac[i] = if hmac[i] == b'0' { b'1' } else { b'0' };
            container.hmac = String::from_utf8(hmac).expect("hex stays ascii");
            body = Frame::new(FrameKind::Signed, container.to_cbor().expect("encode"));
            assert!(server.open(&iv, &body).is_err());
        },
        Mutation::FlipIv { index, bit } => {
            let mut bytes = iv.as_iv().expect("iv frame");
            bytes[usize::from(index) % bytes.len()] ^= 1 << (bit % 8);
            iv = Frame::iv(bytes);
            let _ = server.open(&iv, &body);
        },
        Mutation::RawBody(raw) => {
            body = Frame::new(FrameKind::Signed, raw);
            let _ = server.open(&iv, &body);
        },
    }
});

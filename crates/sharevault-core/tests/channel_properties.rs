//! Property tests for the secure channel state machine
//!
//! These tests verify:
//! - Both ends agree on keys and the sequence counter after the handshake
//! - Sequence numbers advance by exactly one across both directions
//! - Replayed, skipped and tampered messages are rejected
//! - A `CONNECT` sealed to the wrong key never establishes a channel

use std::{
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use proptest::prelude::*;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sharevault_core::{
    ChannelError, ChannelState, Environment, SealedFrames, SecureChannel,
    channel::MAX_INITIAL_SEQUENCE,
};
use sharevault_crypto::{CryptoError, IdentityKeyPair};
use sharevault_proto::{
    Frame, FrameKind, Message, ResponseTag, SignedContainer,
    messages::Chunk,
};

#[derive(Clone)]
struct TestEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl TestEnv {
    fn seeded(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))) }
    }
}

impl Environment for TestEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}

fn identity(seed: u64) -> Arc<IdentityKeyPair> {
    static KEYS: OnceLock<[Arc<IdentityKeyPair>; 2]> = OnceLock::new();
    let keys = KEYS.get_or_init(|| {
        let mut rng = ChaCha20Rng::seed_from_u64(99);
        [
            Arc::new(IdentityKeyPair::generate(&mut rng, 2048).unwrap()),
            Arc::new(IdentityKeyPair::generate(&mut rng, 2048).unwrap()),
        ]
    });
    keys[usize::try_from(seed % 2).unwrap()].clone()
}

fn established(env: &TestEnv) -> (SecureChannel, SecureChannel) {
    let server_key = identity(0);
    let mut client = SecureChannel::initiator(server_key.public().clone());
    let mut server = SecureChannel::responder(server_key);

    let hello = client.begin_handshake_with_challenge(env, 42).unwrap();
    let reply = server.accept_connect(env, &hello.iv, &hello.body).unwrap();
    client.complete_handshake(&reply.iv, &reply.body).unwrap();

    (client, server)
}

fn request() -> Message {
    Message::FileList(vec!["notes.txt".to_string(), "plans.md".to_string()])
}

#[test]
fn connect_carries_sequence_zero() {
    let env = TestEnv::seeded(1);
    let mut client = SecureChannel::initiator(identity(0).public().clone());

    client.begin_handshake(&env).unwrap();

    assert_eq!(client.state(), ChannelState::Pending);
    assert_eq!(client.last_sequence(), Some(0));
}

#[test]
fn handshake_agrees_on_counter() {
    let env = TestEnv::seeded(2);
    let (client, server) = established(&env);

    assert!(client.is_established());
    assert!(server.is_established());

    // Responder seeds r in [0, i32::MAX] and replies with r + 1
    let seq = server.last_sequence().unwrap();
    assert_eq!(client.last_sequence(), Some(seq));
    assert!((1..=MAX_INITIAL_SEQUENCE + 1).contains(&seq));
}

#[test]
fn wrong_identity_fails_handshake() {
    let env = TestEnv::seeded(3);
    let mut client = SecureChannel::initiator(identity(1).public().clone());
    let mut server = SecureChannel::responder(identity(0));

    let hello = client.begin_handshake(&env).unwrap();
    let result = server.accept_connect(&env, &hello.iv, &hello.body);

    assert!(matches!(result, Err(ChannelError::Crypto(_))));
    assert_eq!(server.state(), ChannelState::Closed);
}

#[test]
fn foreign_reply_closes_initiator() {
    let env = TestEnv::seeded(4);
    let mut client = SecureChannel::initiator(identity(0).public().clone());
    client.begin_handshake(&env).unwrap();

    // Reply sealed under some other session's keys
    let (_, mut other_server) = established(&env);
    let reply = other_server.seal(&env, Message::Status(ResponseTag::FailConnect)).unwrap();

    assert!(client.complete_handshake(&reply.iv, &reply.body).is_err());
    assert_eq!(client.state(), ChannelState::Closed);
    assert_eq!(client.last_sequence(), None);
}

#[test]
fn messages_before_handshake_are_refused() {
    let env = TestEnv::seeded(5);
    let mut client = SecureChannel::initiator(identity(0).public().clone());

    assert!(matches!(client.seal(&env, request()), Err(ChannelError::InvalidState { .. })));
}

#[test]
fn closed_channel_is_unusable() {
    let env = TestEnv::seeded(6);
    let (mut client, mut server) = established(&env);
    let frames = client.seal(&env, request()).unwrap();

    server.close();
    server.close();

    assert_eq!(server.state(), ChannelState::Closed);
    assert!(matches!(server.open(&frames.iv, &frames.body), Err(ChannelError::InvalidState { .. })));
    assert!(matches!(server.seal(&env, Message::Ok), Err(ChannelError::InvalidState { .. })));
}

#[test]
fn replay_is_rejected() {
    let env = TestEnv::seeded(7);
    let (mut client, mut server) = established(&env);

    let frames = client.seal(&env, request()).unwrap();
    assert_eq!(server.open(&frames.iv, &frames.body).unwrap(), request());

    let replayed = server.open(&frames.iv, &frames.body);
    assert!(matches!(replayed, Err(ChannelError::SequenceMismatch { .. })));
}

#[test]
fn stale_replay_is_rejected_after_channel_advances() {
    let env = TestEnv::seeded(11);
    let (mut client, mut server) = established(&env);
    let base = server.last_sequence().unwrap();

    let sent: Vec<SealedFrames> = (0..6).map(|_| client.seal(&env, request()).unwrap()).collect();
    for frames in &sent {
        assert_eq!(server.open(&frames.iv, &frames.body).unwrap(), request());
    }
    assert_eq!(server.last_sequence(), Some(base + 6));

    // First message carried base + 1; the channel now expects base + 7
    let result = server.open(&sent[0].iv, &sent[0].body);
    assert_eq!(result, Err(ChannelError::SequenceMismatch { expected: base + 7, actual: base + 1 }));
}

#[test]
fn skipped_messages_are_rejected() {
    let env = TestEnv::seeded(8);
    let (mut client, mut server) = established(&env);
    let base = server.last_sequence().unwrap();

    let sent: Vec<SealedFrames> = (0..6).map(|_| client.seal(&env, request()).unwrap()).collect();

    // Counter expects base + 1; the sixth message carries base + 6
    let result = server.open(&sent[5].iv, &sent[5].body);
    assert_eq!(result, Err(ChannelError::SequenceMismatch { expected: base + 1, actual: base + 6 }));
}

#[test]
fn tampered_ciphertext_fails_mac() {
    let env = TestEnv::seeded(9);
    let (mut client, mut server) = established(&env);

    let frames = client.seal(&env, request()).unwrap();
    let mut container = SignedContainer::from_cbor(&frames.body.payload).unwrap();
    container.ciphertext[0] ^= 0x01;
    let tampered = Frame::new(FrameKind::Signed, container.to_cbor().unwrap());

    let result = server.open(&frames.iv, &tampered);
    assert_eq!(result, Err(ChannelError::Crypto(CryptoError::MacMismatch)));
}

#[test]
fn wrong_frame_kind_is_rejected() {
    let env = TestEnv::seeded(10);
    let (mut client, mut server) = established(&env);

    let frames = client.seal(&env, request()).unwrap();
    let result = server.open(&frames.body, &frames.iv);
    assert!(matches!(result, Err(ChannelError::UnexpectedFrame { .. })));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn counter_advances_by_one_in_either_direction(
        seed in any::<u64>(),
        directions in prop::collection::vec(any::<bool>(), 1..24),
        data in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let env = TestEnv::seeded(seed);
        let (mut client, mut server) = established(&env);
        let start = client.last_sequence().unwrap();

        for (i, client_sends) in directions.iter().enumerate() {
            let message = Message::Chunk(Chunk { data: data.clone() });
            let (sender, receiver) =
                if *client_sends { (&mut client, &mut server) } else { (&mut server, &mut client) };

            let frames = sender.seal(&env, message.clone()).unwrap();
            prop_assert_eq!(receiver.open(&frames.iv, &frames.body).unwrap(), message);

            let expected = start + u64::try_from(i).unwrap() + 1;
            prop_assert_eq!(client.last_sequence(), Some(expected));
            prop_assert_eq!(server.last_sequence(), Some(expected));
        }
    }
}

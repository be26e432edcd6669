//! Secure channel state machine.
//!
//! One type serves both ends of a connection; [`Role`] decides which half of
//! the handshake it runs. The channel is pure: it turns messages into frames
//! and frames into messages, and never touches a socket. [`crate::Session`]
//! drives it over a real stream.
//!
//! # State Machine
//!
//! ```text
//! Initiator:
//! ┌──────┐ begin_handshake ┌─────────┐ complete_handshake ┌─────────────┐
//! │ Init │────────────────>│ Pending │───────────────────>│ Established │
//! └──────┘   [Iv, Sealed]  └─────────┘  SUCCESS_CONNECT   └─────────────┘
//!
//! Responder:
//! ┌──────┐ accept_connect ─────────────────────────────────>┌─────────────┐
//! │ Init │  reads [Iv, Sealed], writes [Iv, Signed]         │ Established │
//! └──────┘                                                  └─────────────┘
//!
//! Any failure during the handshake, or close(), moves to Closed.
//! ```
//!
//! # Sequencing
//!
//! A single counter spans both directions. The initiator's `CONNECT` carries
//! 0. The responder then seeds the counter with a random value `r` and its
//! reply carries `r + 1`; the initiator accepts whatever value that first
//! symmetric message carries. From then on every message, in either
//! direction, must carry exactly the previous value plus one.
//!
//! # Security
//!
//! - `CONNECT` is sealed with RSA PKCS#1 v1.5 and carries no HMAC.
//! - Every later message is AES-128-CBC encrypted under the session key with
//!   a fresh IV, and the ciphertext is tagged with HMAC-SHA1 under the signing
//!   key. The HMAC is checked before decryption.
//! - A failed `open` leaves the counter untouched. The caller is expected to
//!   drop the connection; nothing here tries to resynchronize.

use std::sync::Arc;

use sharevault_crypto::{IdentityKeyPair, PublicIdentity, SessionKey, SigningKey, cipher, mac};
use sharevault_proto::{
    Envelope, Frame, FrameKind, Message, ResponseTag, SignedContainer,
    messages::{Connect, SYMMETRIC_KEY_LEN},
};

use crate::{
    env::{EnvRng, Environment},
    error::ChannelError,
};

/// Largest value the responder seeds the sequence counter with.
pub const MAX_INITIAL_SEQUENCE: u64 = i32::MAX as u64;

/// Largest sequence number the wire integer can carry.
const MAX_SEQUENCE: u64 = i64::MAX as u64;

/// Which side of the handshake this channel runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connecting peer: generates the session keys and the challenge
    Initiator,
    /// Accepting peer: owns the long-term RSA identity
    Responder,
}

/// Channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No handshake traffic yet
    Init,
    /// `CONNECT` sent, waiting for `SUCCESS_CONNECT` (initiator only)
    Pending,
    /// Keys exchanged, symmetric pipeline active
    Established,
    /// Keys zeroized, channel unusable
    Closed,
}

/// The two frames that carry one encrypted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedFrames {
    /// 16-byte IV, sent first and unauthenticated
    pub iv: Frame,
    /// `Sealed` or `Signed` body
    pub body: Frame,
}

impl SealedFrames {
    /// Frames in wire order.
    pub fn into_frames(self) -> [Frame; 2] {
        [self.iv, self.body]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SequenceCheck {
    /// Must be exactly last + 1
    Strict,
    /// First symmetric read on the initiator: adopt the responder's seed
    Adopt,
}

/// Per-connection secure channel.
///
/// Owns the session key, signing key and sequence counter for one
/// connection. Not shared between tasks: all sends and receives on a
/// connection go through the single owner.
pub struct SecureChannel {
    role: Role,
    state: ChannelState,
    /// Responder's long-term key pair
    identity: Option<Arc<IdentityKeyPair>>,
    /// Initiator's view of the responder's public key
    peer: Option<PublicIdentity>,
    session_key: Option<SessionKey>,
    signing_key: Option<SigningKey>,
    /// Last sequence number sent or received
    last_sequence: Option<u64>,
    /// Challenge sent in `CONNECT` (initiator only)
    challenge: Option<i64>,
}

impl SecureChannel {
    /// Channel for the connecting side, sealing `CONNECT` to `peer`.
    pub fn initiator(peer: PublicIdentity) -> Self {
        Self::new(Role::Initiator, None, Some(peer))
    }

    /// Channel for the accepting side, opening `CONNECT` with `identity`.
    pub fn responder(identity: Arc<IdentityKeyPair>) -> Self {
        Self::new(Role::Responder, Some(identity), None)
    }

    fn new(role: Role, identity: Option<Arc<IdentityKeyPair>>, peer: Option<PublicIdentity>) -> Self {
        Self {
            role,
            state: ChannelState::Init,
            identity,
            peer,
            session_key: None,
            signing_key: None,
            last_sequence: None,
            challenge: None,
        }
    }

    /// Handshake role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// True once keys are exchanged and the symmetric pipeline is active.
    pub fn is_established(&self) -> bool {
        self.state == ChannelState::Established
    }

    /// Last sequence number sent or received. `None` before any traffic.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Start the handshake with a random challenge.
    ///
    /// # Errors
    ///
    /// See [`Self::begin_handshake_with_challenge`].
    pub fn begin_handshake<E: Environment>(&mut self, env: &E) -> Result<SealedFrames, ChannelError> {
        let challenge = (env.random_u64() % (MAX_INITIAL_SEQUENCE + 1)) as i64;
        self.begin_handshake_with_challenge(env, challenge)
    }

    /// Start the handshake: generate fresh session and signing keys and seal
    /// them with `challenge` into a `CONNECT` message for the peer.
    ///
    /// On success the channel is `Pending` and already holds the new keys.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless this is an initiator in `Init`
    /// - `Crypto` if RSA sealing fails
    pub fn begin_handshake_with_challenge<E: Environment>(
        &mut self,
        env: &E,
        challenge: i64,
    ) -> Result<SealedFrames, ChannelError> {
        self.require(Role::Initiator, ChannelState::Init, "begin_handshake")?;
        let Some(peer) = &self.peer else {
            return Err(self.invalid("begin_handshake"));
        };

        let session_key = env.random_array::<SYMMETRIC_KEY_LEN>();
        let signing_key = env.random_array::<SYMMETRIC_KEY_LEN>();

        let mut envelope =
            Message::Connect(Connect { challenge, session_key, signing_key }).into_envelope();
        let sequence = self.next_sequence()?;
        envelope.push_sequence(sequence)?;

        let plaintext = zeroize::Zeroizing::new(envelope.to_cbor()?);
        let ciphertext = peer.seal(&mut EnvRng(env), &plaintext)?;

        // The IV carries no meaning for an RSA body, but the frame is always
        // present so the reader's framing does not depend on state.
        let iv = env.random_array::<{ sharevault_proto::IV_LEN }>();

        self.session_key = Some(SessionKey::from_bytes(session_key));
        self.signing_key = Some(SigningKey::from_bytes(signing_key));
        self.challenge = Some(challenge);
        self.last_sequence = Some(sequence);
        self.state = ChannelState::Pending;

        Ok(SealedFrames { iv: Frame::iv(iv), body: Frame::new(FrameKind::Sealed, ciphertext) })
    }

    /// Finish the handshake on the initiator by checking the responder's
    /// reply.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless this is an initiator in `Pending`
    /// - `HandshakeFailed` on `FAIL_CONNECT`, a wrong challenge response or
    ///   any other reply
    /// - framing, HMAC or decryption failures from the reply itself
    ///
    /// Every error closes the channel.
    pub fn complete_handshake(&mut self, iv: &Frame, body: &Frame) -> Result<(), ChannelError> {
        self.require(Role::Initiator, ChannelState::Pending, "complete_handshake")?;

        let result = self.open_with(iv, body, SequenceCheck::Adopt).and_then(|reply| {
            let expected = self.challenge.and_then(|c| c.checked_add(1));
            match reply {
                Message::ConnectAccepted { challenge_response }
                    if Some(challenge_response) == expected =>
                {
                    Ok(())
                },
                Message::ConnectAccepted { challenge_response } => {
                    Err(ChannelError::HandshakeFailed(format!(
                        "challenge mismatch: expected {expected:?}, received {challenge_response}"
                    )))
                },
                Message::Status(ResponseTag::FailConnect) => {
                    Err(ChannelError::HandshakeFailed("rejected by peer".to_string()))
                },
                other => Err(ChannelError::HandshakeFailed(format!(
                    "unexpected reply {}",
                    other.tag()
                ))),
            }
        });

        match result {
            Ok(()) => {
                self.challenge = None;
                self.state = ChannelState::Established;
                Ok(())
            },
            Err(e) => {
                self.close();
                Err(e)
            },
        }
    }

    /// Responder side of the handshake: open `CONNECT`, adopt its keys, seed
    /// the sequence counter and seal the `SUCCESS_CONNECT` reply.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless this is a responder in `Init`
    /// - `UnexpectedFrame` if the body is not `Sealed`
    /// - `Crypto` if the body was not sealed to this identity
    /// - `SequenceMismatch` if `CONNECT` does not carry 0
    /// - `HandshakeFailed` if the message is not `CONNECT`
    ///
    /// Every error closes the channel.
    pub fn accept_connect<E: Environment>(
        &mut self,
        env: &E,
        iv: &Frame,
        body: &Frame,
    ) -> Result<SealedFrames, ChannelError> {
        self.require(Role::Responder, ChannelState::Init, "accept_connect")?;

        let result = self.accept_connect_inner(env, iv, body);
        if result.is_err() {
            self.close();
        }
        result
    }

    fn accept_connect_inner<E: Environment>(
        &mut self,
        env: &E,
        iv: &Frame,
        body: &Frame,
    ) -> Result<SealedFrames, ChannelError> {
        expect_kind(iv, FrameKind::Iv)?.as_iv()?;
        expect_kind(body, FrameKind::Sealed)?;
        let Some(identity) = &self.identity else {
            return Err(self.invalid("accept_connect"));
        };

        let plaintext = identity.open(&body.payload)?;
        let mut envelope = Envelope::from_cbor(&plaintext)?;
        let sequence = envelope.pop_sequence()?;
        if sequence != 0 {
            return Err(ChannelError::SequenceMismatch { expected: 0, actual: sequence });
        }

        let connect = match Message::from_envelope(envelope)? {
            Message::Connect(connect) => connect,
            other => {
                return Err(ChannelError::HandshakeFailed(format!(
                    "expected CONNECT, received {}",
                    other.tag()
                )));
            },
        };
        let response = connect
            .challenge
            .checked_add(1)
            .ok_or_else(|| ChannelError::HandshakeFailed("challenge overflow".to_string()))?;

        self.session_key = Some(SessionKey::from_bytes(connect.session_key));
        self.signing_key = Some(SigningKey::from_bytes(connect.signing_key));
        self.last_sequence = Some(env.random_u64() % (MAX_INITIAL_SEQUENCE + 1));
        self.state = ChannelState::Established;

        self.seal(env, Message::ConnectAccepted { challenge_response: response })
    }

    /// Encrypt, sign and sequence `message`.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless established
    /// - `SequenceExhausted` if the counter cannot advance
    pub fn seal<E: Environment>(
        &mut self,
        env: &E,
        message: Message,
    ) -> Result<SealedFrames, ChannelError> {
        if self.state != ChannelState::Established {
            return Err(self.invalid("seal"));
        }
        let (Some(session_key), Some(signing_key)) = (&self.session_key, &self.signing_key) else {
            return Err(self.invalid("seal"));
        };

        let sequence = self.next_sequence()?;
        let mut envelope = message.into_envelope();
        envelope.push_sequence(sequence)?;
        let plaintext = zeroize::Zeroizing::new(envelope.to_cbor()?);

        let iv = env.random_array::<{ sharevault_proto::IV_LEN }>();
        let ciphertext = cipher::encrypt(session_key, &iv, &plaintext);
        let hmac = mac::tag(signing_key, &ciphertext);
        let container = SignedContainer { ciphertext, hmac }.to_cbor()?;

        self.last_sequence = Some(sequence);

        Ok(SealedFrames { iv: Frame::iv(iv), body: Frame::new(FrameKind::Signed, container) })
    }

    /// Verify, decrypt and sequence-check one received message.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless established
    /// - `UnexpectedFrame` if the frames are not `[Iv, Signed]`
    /// - `Crypto` if the HMAC fails or decryption fails
    /// - `SequenceMismatch` on a gap, repeat or reorder
    /// - `Protocol` if the plaintext is not a well-formed message
    pub fn open(&mut self, iv: &Frame, body: &Frame) -> Result<Message, ChannelError> {
        if self.state != ChannelState::Established {
            return Err(self.invalid("open"));
        }
        self.open_with(iv, body, SequenceCheck::Strict)
    }

    fn open_with(
        &mut self,
        iv: &Frame,
        body: &Frame,
        check: SequenceCheck,
    ) -> Result<Message, ChannelError> {
        let iv = expect_kind(iv, FrameKind::Iv)?.as_iv()?;
        expect_kind(body, FrameKind::Signed)?;
        let (Some(session_key), Some(signing_key)) = (&self.session_key, &self.signing_key) else {
            return Err(self.invalid("open"));
        };

        let container = SignedContainer::from_cbor(&body.payload)?;
        mac::verify(signing_key, &container.ciphertext, &container.hmac)?;
        let plaintext =
            zeroize::Zeroizing::new(cipher::decrypt(session_key, &iv, &container.ciphertext)?);

        let mut envelope = Envelope::from_cbor(&plaintext)?;
        let sequence = envelope.pop_sequence()?;
        if check == SequenceCheck::Strict {
            let expected = self.next_sequence()?;
            if sequence != expected {
                return Err(ChannelError::SequenceMismatch { expected, actual: sequence });
            }
        }

        let message = Message::from_envelope(envelope)?;
        self.last_sequence = Some(sequence);
        Ok(message)
    }

    /// Zeroize keys and reset the counter. Idempotent.
    pub fn close(&mut self) {
        // SessionKey and SigningKey zeroize on drop
        self.session_key = None;
        self.signing_key = None;
        self.last_sequence = None;
        self.challenge = None;
        self.state = ChannelState::Closed;
    }

    fn next_sequence(&self) -> Result<u64, ChannelError> {
        match self.last_sequence {
            None => Ok(0),
            Some(last) => last
                .checked_add(1)
                .filter(|next| *next <= MAX_SEQUENCE)
                .ok_or(ChannelError::SequenceExhausted),
        }
    }

    fn require(
        &self,
        role: Role,
        state: ChannelState,
        operation: &'static str,
    ) -> Result<(), ChannelError> {
        if self.role == role && self.state == state { Ok(()) } else { Err(self.invalid(operation)) }
    }

    fn invalid(&self, operation: &'static str) -> ChannelError {
        ChannelError::InvalidState { state: self.state, operation }
    }
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("last_sequence", &self.last_sequence)
            .finish_non_exhaustive()
    }
}

/// Frame carrying a message in the clear. Only used before the handshake
/// (`KEY` and its answer); carries no sequence number.
///
/// # Errors
///
/// - `Protocol` if encoding fails
pub fn encode_plain(message: Message) -> Result<Frame, ChannelError> {
    let cbor = message.into_envelope().to_cbor()?;
    Ok(Frame::new(FrameKind::Plain, cbor))
}

/// Decode a frame produced by [`encode_plain`].
///
/// # Errors
///
/// - `UnexpectedFrame` if the frame is not `Plain`
/// - `Protocol` if the payload is not a well-formed message
pub fn decode_plain(frame: &Frame) -> Result<Message, ChannelError> {
    expect_kind(frame, FrameKind::Plain)?;
    let envelope = Envelope::from_cbor(&frame.payload)?;
    Ok(Message::from_envelope(envelope)?)
}

fn expect_kind(frame: &Frame, expected: FrameKind) -> Result<&Frame, ChannelError> {
    let actual = frame.kind();
    if actual == expected { Ok(frame) } else { Err(ChannelError::UnexpectedFrame { expected, actual }) }
}

//! Async driver for a [`SecureChannel`] over a byte stream.
//!
//! Executes what the channel produces: frames out, frames in. One session
//! per connection, owned by one task; every request is followed by its
//! response before the next request is sent.

use std::sync::Arc;

use sharevault_crypto::{IdentityKeyPair, PublicIdentity};
use sharevault_proto::{Message, ResponseTag, messages::KeyOffer};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::{
    channel::{SecureChannel, SealedFrames, decode_plain, encode_plain},
    env::Environment,
    error::ChannelError,
    transport::{read_frame, write_frames},
};

/// An established secure session over `S`.
pub struct Session<S, E> {
    stream: S,
    env: E,
    channel: SecureChannel,
}

impl<S, E> Session<S, E>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: Environment,
{
    /// Run the initiator handshake against a peer whose public key is
    /// already known (pinned or configured).
    ///
    /// # Errors
    ///
    /// Any [`ChannelError`]; the stream should be dropped.
    pub async fn connect(mut stream: S, env: E, peer: PublicIdentity) -> Result<Self, ChannelError> {
        let mut channel = SecureChannel::initiator(peer);

        let hello = channel.begin_handshake(&env)?;
        write_frames(&mut stream, &hello.into_frames()).await?;

        let iv = read_frame(&mut stream).await?;
        let body = read_frame(&mut stream).await?;
        channel.complete_handshake(&iv, &body)?;

        Ok(Self { stream, env, channel })
    }

    /// Run the responder handshake with this server's identity.
    ///
    /// # Errors
    ///
    /// Any [`ChannelError`]; the stream should be dropped.
    pub async fn accept(
        mut stream: S,
        env: E,
        identity: Arc<IdentityKeyPair>,
    ) -> Result<Self, ChannelError> {
        let mut channel = SecureChannel::responder(identity);

        let iv = read_frame(&mut stream).await?;
        let body = read_frame(&mut stream).await?;
        let reply = channel.accept_connect(&env, &iv, &body)?;
        write_frames(&mut stream, &reply.into_frames()).await?;

        Ok(Self { stream, env, channel })
    }

    /// Send one message.
    ///
    /// # Errors
    ///
    /// Any [`ChannelError`].
    pub async fn send(&mut self, message: Message) -> Result<(), ChannelError> {
        let frames: SealedFrames = self.channel.seal(&self.env, message)?;
        write_frames(&mut self.stream, &frames.into_frames()).await
    }

    /// Receive one message.
    ///
    /// # Errors
    ///
    /// Any [`ChannelError`]. Protocol violations are not recoverable; drop
    /// the session.
    pub async fn recv(&mut self) -> Result<Message, ChannelError> {
        let iv = read_frame(&mut self.stream).await?;
        let body = read_frame(&mut self.stream).await?;
        self.channel.open(&iv, &body)
    }

    /// Send a request and wait for its response.
    ///
    /// # Errors
    ///
    /// Any [`ChannelError`].
    pub async fn request(&mut self, message: Message) -> Result<Message, ChannelError> {
        self.send(message).await?;
        self.recv().await
    }

    /// Underlying channel state.
    pub fn channel(&self) -> &SecureChannel {
        &self.channel
    }

    /// Send `DISCONNECT`, then zeroize keys and shut the stream down.
    ///
    /// # Errors
    ///
    /// Transport errors while sending or shutting down. Keys are zeroized
    /// regardless.
    pub async fn disconnect(mut self) -> Result<(), ChannelError> {
        let sent = self.send(Message::Disconnect).await;
        self.close().await;
        sent
    }

    /// Zeroize keys and shut the stream down without notifying the peer.
    pub async fn close(&mut self) {
        self.channel.close();
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(error = %e, "stream shutdown failed");
        }
    }
}

/// Responder side of the public key exchange: offer `identity` in the clear
/// and report whether the peer accepted it.
///
/// # Errors
///
/// - `UnexpectedMessage` if the peer answers with anything but
///   `SUCCESS_KEY` / `FAIL_KEY`
/// - transport and framing errors
pub async fn offer_key<S>(stream: &mut S, identity: &IdentityKeyPair) -> Result<bool, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let public_key = identity.public().to_der()?;
    let offer = encode_plain(Message::Key(KeyOffer { public_key }))?;
    write_frames(stream, &[offer]).await?;

    match decode_plain(&read_frame(stream).await?)? {
        Message::Status(ResponseTag::SuccessKey) => Ok(true),
        Message::Status(ResponseTag::FailKey) => Ok(false),
        other => Err(ChannelError::UnexpectedMessage(other.tag().to_string())),
    }
}

/// Initiator side of the public key exchange: read the offered key.
///
/// The caller decides whether to trust it and answers with
/// [`answer_key_offer`].
///
/// # Errors
///
/// - `UnexpectedMessage` if the first message is not `KEY`
/// - `Crypto` if the key is not a valid RSA public key
/// - transport and framing errors
pub async fn receive_key_offer<S>(stream: &mut S) -> Result<PublicIdentity, ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match decode_plain(&read_frame(stream).await?)? {
        Message::Key(offer) => Ok(PublicIdentity::from_der(&offer.public_key)?),
        other => Err(ChannelError::UnexpectedMessage(other.tag().to_string())),
    }
}

/// Tell the responder whether its key was accepted.
///
/// # Errors
///
/// Transport errors.
pub async fn answer_key_offer<S>(stream: &mut S, accepted: bool) -> Result<(), ChannelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let tag = if accepted { ResponseTag::SuccessKey } else { ResponseTag::FailKey };
    write_frames(stream, &[encode_plain(Message::Status(tag))?]).await
}

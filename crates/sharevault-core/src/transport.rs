//! Frame I/O over async byte streams.
//!
//! A thin layer that reads and writes whole frames. It knows nothing about
//! keys or message semantics; the secure channel sits on top.

use bytes::BytesMut;
use sharevault_proto::{Frame, FrameHeader};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ChannelError;

/// Read exactly one frame.
///
/// The header is validated before the payload is read, so an oversized or
/// foreign frame is rejected without allocating its claimed size.
///
/// # Errors
///
/// - `PeerClosed` if the stream ends
/// - `Protocol` if the header is invalid
/// - `Transport` on I/O failure
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, ChannelError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::zeroed(FrameHeader::SIZE);
    reader.read_exact(&mut buf[..FrameHeader::SIZE]).await?;

    let payload_size = FrameHeader::from_bytes(&buf)?.payload_size() as usize;

    if payload_size > 0 {
        buf.resize(FrameHeader::SIZE + payload_size, 0);
        reader.read_exact(&mut buf[FrameHeader::SIZE..]).await?;
    }

    Ok(Frame::decode(&buf)?)
}

/// Write frames back to back and flush.
///
/// # Errors
///
/// - `Protocol` if a frame cannot be encoded
/// - `Transport` on I/O failure
pub async fn write_frames<W>(writer: &mut W, frames: &[Frame]) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(frames.iter().map(Frame::encoded_len).sum());
    for frame in frames {
        frame.encode(&mut buf)?;
    }

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

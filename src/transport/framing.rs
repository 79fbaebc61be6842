//! Length-prefixed framing for byte-stream transports.
//!
//! ```text
//! +----------------+------------------------+
//! | len: u32 (BE)  | message (len bytes)    |
//! +----------------+------------------------+
//! ```
//!
//! A zero-length frame is the "connected, no data" reply.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::{QueueError, Result};

/// Largest message a single frame may carry.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, message: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    // ---
    if message.len() > MAX_FRAME_LEN {
        return Err(QueueError::Decode(format!(
            "frame of {} bytes exceeds limit of {MAX_FRAME_LEN}",
            message.len()
        )));
    }

    writer.write_u32(message.len() as u32).await?;
    writer.write_all(message).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// A peer that closes the stream before sending a length prefix is treated
/// as an empty reply, the same as an explicit zero-length frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    Ok(read_request(reader).await?.unwrap_or_default())
}

/// Read one frame, distinguishing a closed stream (`None`) from an empty
/// frame. Used by server loops that serve several requests per connection.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    // ---
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    if len > MAX_FRAME_LEN {
        return Err(QueueError::Decode(format!(
            "frame length {len} exceeds limit of {MAX_FRAME_LEN}"
        )));
    }

    let mut buf = BytesMut::zeroed(len);
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf.freeze()))
}

/// Write `frame` on a connected stream and close the write half.
pub(crate) async fn deliver<S>(stream: &mut S, frame: &[u8], write_timeout: Duration) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    // ---
    timeout(write_timeout, async {
        write_frame(stream, frame).await?;
        stream.shutdown().await?;
        Ok(())
    })
    .await
    .map_err(|_| QueueError::Timeout("write"))?
}

/// Write `frame` on a connected stream, then read exactly one reply frame.
/// The write and the read are each bounded by `read_timeout`.
pub(crate) async fn exchange<S>(stream: &mut S, frame: &[u8], read_timeout: Duration) -> Result<Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // ---
    timeout(read_timeout, write_frame(stream, frame))
        .await
        .map_err(|_| QueueError::Timeout("write"))??;

    timeout(read_timeout, read_frame(stream))
        .await
        .map_err(|_| QueueError::Timeout("read"))?
}

//! Reads TCPROS frames: a little-endian `u32` length followed by that many payload bytes.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// TCPROS frames never legitimately exceed this size; a length at or above it indicates a
/// desynchronized stream rather than an unusually large message.
pub const MAX_FRAME_LEN: u32 = 256_000_000;

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("read timed out")]
    Timeout,
    #[error("remote closed the connection")]
    RemoteClosed,
    #[error("frame length {0} is out of sync (>= {MAX_FRAME_LEN})")]
    OutOfSync(u32),
    #[error("transport error: {0}")]
    Failed(#[from] std::io::Error),
}

/// Reads one frame from `stream`, bounding the whole read (length prefix + payload) by
/// `timeout`.
///
/// The returned buffer is freshly allocated per call; callers are free to retain it.
pub async fn read_frame<S>(stream: &mut S, timeout: Duration) -> Result<Vec<u8>, FrameError>
where
    S: AsyncRead + Unpin,
{
    let len = match tokio::time::timeout(timeout, stream.read_u32_le()).await {
        Ok(Ok(len)) => len,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::RemoteClosed)
        }
        Ok(Err(e)) => return Err(FrameError::Failed(e)),
        Err(_elapsed) => return Err(FrameError::Timeout),
    };

    if len >= MAX_FRAME_LEN {
        return Err(FrameError::OutOfSync(len));
    }

    let mut payload = vec![0u8; len as usize];
    match tokio::time::timeout(timeout, stream.read_exact(&mut payload)).await {
        Ok(Ok(_)) => Ok(payload),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::RemoteClosed),
        Ok(Err(e)) => Err(FrameError::Failed(e)),
        Err(_elapsed) => Err(FrameError::Timeout),
    }
}

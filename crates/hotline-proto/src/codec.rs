//! The one shared encoder/decoder for agent frames.
//!
//! A frame is a big-endian `u32` payload length followed by a UTF-8 JSON
//! document. Binary data (class files, jars) travels inside the JSON as
//! standard base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_FRAME_BYTES;

pub const LENGTH_PREFIX_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame too large ({len} bytes, max {max})")]
    FrameTooLarge { len: usize, max: usize },
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Serialize `value` into a complete frame (length prefix included).
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let payload = serde_json::to_vec(value)?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_BYTES,
        });
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode a frame payload (without the length prefix).
pub fn decode_frame<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    Ok(serde_json::from_slice(payload)?)
}

pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(value)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame payload.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge {
            len,
            max: MAX_FRAME_BYTES,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub fn encode_body(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_body(body: &str) -> Result<Vec<u8>, CodecError> {
    Ok(STANDARD.decode(body.trim())?)
}

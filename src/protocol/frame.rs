use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, trace};

use crate::protocol::constants::{FRAME_PREFIX_LEN, MAX_FRAME_SIZE};
use crate::protocol::error::ProtocolError;
use crate::utils::io::{flush, read_exact, write_all};

/// Fixed-size frame header: big-endian payload length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_len: u32,
}

impl FrameHeader {
    pub const SIZE: usize = FRAME_PREFIX_LEN;

    pub fn decode(buf: [u8; Self::SIZE]) -> Result<Self, ProtocolError> {
        let payload_len = u32::from_be_bytes(buf);
        if payload_len as usize > MAX_FRAME_SIZE {
            error!("Rejected oversized frame: {} bytes (max: {})", payload_len, MAX_FRAME_SIZE);
            return Err(ProtocolError::FrameTooLarge(payload_len as usize));
        }
        Ok(Self { payload_len })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        self.payload_len.to_be_bytes()
    }
}

pub async fn write_frame<W: AsyncWrite + Unpin>(
    stream: &mut W,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    let header = FrameHeader { payload_len: payload.len() as u32 };
    trace!("Writing frame: {} bytes", header.payload_len);

    write_all(stream, &header.encode()).await?;
    if !payload.is_empty() {
        write_all(stream, payload).await?;
    }
    flush(stream).await
}

pub async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut header_buf = [0u8; FrameHeader::SIZE];
    header_buf.copy_from_slice(&read_exact(stream, FrameHeader::SIZE).await?);
    let header = FrameHeader::decode(header_buf)?;

    trace!("Reading frame: {} bytes", header.payload_len);
    read_exact(stream, header.payload_len as usize).await
}

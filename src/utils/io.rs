use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::ProtocolError;

/// Read exactly `len` bytes or fail; a peer that closes early is `ConnectionClosed`.
pub async fn read_exact<R: AsyncRead + Unpin>(
    reader: &mut R,
    len: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut buf).await.map_err(ProtocolError::from_io)?;
    }
    Ok(buf)
}

/// Write all bytes or fail
pub async fn write_all<W: AsyncWrite + Unpin>(
    writer: &mut W,
    buf: &[u8],
) -> Result<(), ProtocolError> {
    writer.write_all(buf).await.map_err(ProtocolError::from_io)?;
    Ok(())
}

pub async fn flush<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<(), ProtocolError> {
    writer.flush().await.map_err(ProtocolError::from_io)
}

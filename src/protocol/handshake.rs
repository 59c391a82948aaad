use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tracing::{debug, error};

use crate::protocol::constants::BANNER;
use crate::protocol::error::ProtocolError;
use crate::utils::io::{flush, read_exact, write_all};

/// Server side: announce readiness once, right after accept.
pub async fn write_banner<W: AsyncWrite + Unpin>(stream: &mut W) -> Result<(), ProtocolError> {
    debug!("Writing readiness banner");
    write_all(stream, BANNER).await?;
    flush(stream).await
}

/// Client side: discard the readiness banner if it is the next thing on the
/// stream. Returns whether a banner was consumed.
///
/// A frame prefix can never start with the banner's first byte because frame
/// lengths are capped well below `0x50 << 24`.
pub async fn skip_banner<R: AsyncBufRead + Unpin>(stream: &mut R) -> Result<bool, ProtocolError> {
    let first = {
        let buf = stream.fill_buf().await.map_err(ProtocolError::from_io)?;
        match buf.first() {
            Some(b) => *b,
            None => return Err(ProtocolError::ConnectionClosed),
        }
    };

    if first != BANNER[0] {
        return Ok(false);
    }

    let banner = read_exact(stream, BANNER.len()).await?;
    if banner != BANNER {
        error!("Invalid banner: {:?}", String::from_utf8_lossy(&banner));
        return Err(ProtocolError::InvalidBanner);
    }

    debug!("Banner received");
    Ok(true)
}

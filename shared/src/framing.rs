//! Length-prefixed packet framing over any async byte stream
//!
//! Each frame is a 4-byte big-endian payload length followed by the
//! bincode-encoded `Packet`. TCP delivers a byte stream, so the prefix is what
//! lets the reader find packet boundaries.

use crate::Packet;
use bincode::{deserialize, serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame. A full board of a large maze is the
/// biggest packet we send.
pub const MAX_PACKET_SIZE: u32 = 64 * 1024;

/// Encodes and writes one packet, flushing the writer.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = serialize(packet).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    if payload.len() > MAX_PACKET_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "packet too large: {} bytes (max {})",
                payload.len(),
                MAX_PACKET_SIZE
            ),
        ));
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await
}

/// Reads one packet.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly between frames.
/// A stream that ends inside a frame is `UnexpectedEof`, an undecodable
/// payload is `InvalidData`.
pub async fn read_packet<R>(reader: &mut R) -> io::Result<Option<Packet>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_PACKET_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("packet too large: {} bytes (max {})", len, MAX_PACKET_SIZE),
        ));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    deserialize(&payload)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

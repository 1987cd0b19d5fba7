//! Socket write path.
//!
//! Packets are encoded up front, then written as one scatter/gather batch
//! while the caller holds the agent's write lock:
//!
//! ```text
//! send_grab() ─┐
//! announce()  ─┼─► lock ─► encode ─► write_vectored (loop on partial) ─► flush ─► unlock
//! send()      ─┘
//! ```
//!
//! The lock makes every batch atomic on the wire: two callers never
//! interleave bytes of their packets.

use std::io::{self, IoSlice};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{AgentError, Result};
use crate::protocol::{OutboundPacket, MIN_PACKET_LENGTH};

/// A packet with its header already encoded.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    /// Encoded 12-byte header.
    pub header: [u8; MIN_PACKET_LENGTH],
    /// Payload bytes (can be empty for plain commands).
    pub payload: Bytes,
}

impl EncodedPacket {
    /// Encode an outbound packet, enforcing the payload bound.
    pub fn encode(packet: &OutboundPacket, max_payload_size: u32) -> Result<Self> {
        let header = packet.header(max_payload_size)?;
        Ok(Self {
            header: header.encode(),
            payload: packet.payload.clone(),
        })
    }

    /// Total size of this packet (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        MIN_PACKET_LENGTH + self.payload.len()
    }
}

/// Write a batch of packets, then flush.
///
/// Partial writes are resumed until every byte is out or the socket fails.
/// Any failure is a `Write` error; the caller decides whether to reconnect.
pub async fn write_batch<W>(writer: &mut W, batch: &[EncodedPacket]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_all_vectored(writer, batch)
        .await
        .map_err(AgentError::Write)
}

async fn write_all_vectored<W>(writer: &mut W, batch: &[EncodedPacket]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut cursor = WriteCursor::default();

    while !cursor.is_done(batch) {
        let written = writer.write_vectored(&cursor.pending(batch)).await?;
        if written == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "socket accepted no bytes",
            ));
        }
        cursor.advance(batch, written);
    }

    writer.flush().await
}

/// Next unwritten byte of a batch: a packet index and an offset into that
/// packet's header-then-payload bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct WriteCursor {
    packet: usize,
    offset: usize,
}

impl WriteCursor {
    fn is_done(&self, batch: &[EncodedPacket]) -> bool {
        self.packet >= batch.len()
    }

    /// Slices still to be written, starting at the cursor.
    fn pending<'a>(&self, batch: &'a [EncodedPacket]) -> Vec<IoSlice<'a>> {
        let rest = batch.get(self.packet..).unwrap_or_default();
        let mut slices = Vec::with_capacity(rest.len() * 2);

        for (i, packet) in rest.iter().enumerate() {
            let skip = if i == 0 { self.offset } else { 0 };
            if let Some(header) = packet.header.get(skip..).filter(|h| !h.is_empty()) {
                slices.push(IoSlice::new(header));
            }
            let payload_skip = skip.saturating_sub(MIN_PACKET_LENGTH);
            if let Some(payload) = packet.payload.get(payload_skip..).filter(|p| !p.is_empty()) {
                slices.push(IoSlice::new(payload));
            }
        }

        slices
    }

    /// Move past `written` bytes.
    fn advance(&mut self, batch: &[EncodedPacket], mut written: usize) {
        while let Some(packet) = batch.get(self.packet) {
            let left = packet.size() - self.offset;
            if written < left {
                self.offset += written;
                return;
            }
            written -= left;
            self.packet += 1;
            self.offset = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PacketType, DEFAULT_MAX_PAYLOAD_SIZE};
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn packet(packet_type: PacketType, payload: &'static [u8]) -> EncodedPacket {
        let outbound = OutboundPacket::new(packet_type, Bytes::from_static(payload));
        EncodedPacket::encode(&outbound, DEFAULT_MAX_PAYLOAD_SIZE).unwrap()
    }

    /// Accepts at most `chunk` bytes per write call.
    struct TrickleWriter {
        chunk: usize,
        written: Vec<u8>,
        flushed: bool,
    }

    impl AsyncWrite for TrickleWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let n = buf.len().min(self.chunk);
            self.written.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.flushed = true;
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Always fails.
    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn test_encoded_packet_size() {
        let grab = packet(PacketType::GRAB_JOB_UNIQ, b"");
        assert_eq!(grab.size(), MIN_PACKET_LENGTH);
        assert_eq!(&grab.header[..4], b"\0REQ");

        let can_do = packet(PacketType::CAN_DO, b"reverse");
        assert_eq!(can_do.size(), MIN_PACKET_LENGTH + 7);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let outbound = OutboundPacket::new(PacketType::WORK_DATA, vec![0u8; 32]);
        let err = EncodedPacket::encode(&outbound, 8).unwrap_err();
        assert!(matches!(err, AgentError::Encoding(_)));
    }

    #[test]
    fn test_cursor_pending_from_start() {
        let batch = vec![packet(PacketType::CAN_DO, b"hello")];
        let slices = WriteCursor::default().pending(&batch);
        assert_eq!(slices.len(), 2);
    }

    #[test]
    fn test_cursor_inside_header() {
        let batch = vec![packet(PacketType::CAN_DO, b"hello")];
        let mut cursor = WriteCursor::default();
        cursor.advance(&batch, 5);

        let slices = cursor.pending(&batch);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), MIN_PACKET_LENGTH - 5);
        assert_eq!(slices[1].len(), 5);
    }

    #[test]
    fn test_cursor_crosses_packets() {
        let batch = vec![
            packet(PacketType::CAN_DO, b"hello"),
            packet(PacketType::GRAB_JOB_UNIQ, b""),
        ];
        let mut cursor = WriteCursor::default();
        cursor.advance(&batch, MIN_PACKET_LENGTH + 3);
        cursor.advance(&batch, 4);

        assert_eq!(cursor, WriteCursor { packet: 1, offset: 2 });
        let slices = cursor.pending(&batch);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].len(), MIN_PACKET_LENGTH - 2);

        cursor.advance(&batch, MIN_PACKET_LENGTH - 2);
        assert!(cursor.is_done(&batch));
        assert!(cursor.pending(&batch).is_empty());
    }

    #[tokio::test]
    async fn test_write_batch_single() {
        let mut buf = Cursor::new(Vec::new());
        write_batch(&mut buf, &[packet(PacketType::PRE_SLEEP, b"")])
            .await
            .unwrap();

        let written = buf.into_inner();
        assert_eq!(written.len(), MIN_PACKET_LENGTH);
        assert_eq!(&written[4..8], &4u32.to_be_bytes());
    }

    #[tokio::test]
    async fn test_write_batch_resumes_partial_writes() {
        let batch = vec![
            packet(PacketType::CAN_DO, b"reverse"),
            packet(PacketType::CAN_DO, b"resize"),
            packet(PacketType::GRAB_JOB_UNIQ, b""),
        ];
        let mut writer = TrickleWriter {
            chunk: 5,
            written: Vec::new(),
            flushed: false,
        };

        write_batch(&mut writer, &batch).await.unwrap();

        let expected: Vec<u8> = batch
            .iter()
            .flat_map(|p| p.header.iter().chain(p.payload.iter()).copied())
            .collect();
        assert_eq!(writer.written, expected);
        assert!(writer.flushed);
    }

    #[tokio::test]
    async fn test_write_batch_reports_write_error() {
        let err = write_batch(&mut BrokenWriter, &[packet(PacketType::GRAB_JOB_UNIQ, b"")])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Write(_)));
    }
}

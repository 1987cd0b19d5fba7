//! Envelopes: one complete protocol unit, header plus payload.
//!
//! [`encode`] and [`decode`] are the stateless codec. Neither touches I/O;
//! the framer and the writer are built on top of them.
//!
//! # Example
//!
//! ```
//! use gearwire::protocol::{decode, encode, Magic, PacketType, DEFAULT_MAX_PAYLOAD_SIZE};
//!
//! let bytes = encode(Magic::Req, PacketType::CAN_DO, b"reverse").unwrap();
//! let (envelope, consumed) = decode(&bytes, DEFAULT_MAX_PAYLOAD_SIZE).unwrap();
//!
//! assert_eq!(consumed, 12 + 7);
//! assert_eq!(envelope.packet_type(), PacketType::CAN_DO);
//! assert_eq!(envelope.payload(), b"reverse");
//! ```

use bytes::Bytes;

use super::wire_format::{
    Header, Magic, PacketType, ARG_SEPARATOR, DEFAULT_MAX_PAYLOAD_SIZE, MIN_PACKET_LENGTH,
};
use crate::error::{AgentError, Result};

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Envelope {
    /// Create a new envelope from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Packet type code.
    #[inline]
    pub fn packet_type(&self) -> PacketType {
        self.header.packet_type
    }

    /// Direction marker.
    #[inline]
    pub fn magic(&self) -> Magic {
        self.header.magic
    }

    /// Payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Bytes this envelope occupies on the wire.
    #[inline]
    pub fn wire_len(&self) -> usize {
        MIN_PACKET_LENGTH + self.payload.len()
    }

    /// Split the payload into at most `max` NUL-separated arguments.
    ///
    /// The last argument keeps any further separators, so opaque job data
    /// at the tail of a packet survives intact.
    pub fn args(&self, max: usize) -> Vec<Bytes> {
        let mut args = Vec::with_capacity(max.min(4));
        if max == 0 {
            return args;
        }

        let mut rest = self.payload.clone();
        while args.len() + 1 < max {
            match rest.iter().position(|&b| b == ARG_SEPARATOR) {
                Some(idx) => {
                    let arg = rest.split_to(idx);
                    // skip the separator
                    let _ = rest.split_to(1);
                    args.push(arg);
                }
                None => break,
            }
        }
        args.push(rest);
        args
    }
}

/// A packet to send: type code plus payload.
///
/// Always encoded with the [`Magic::Req`] marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    /// Packet type code.
    pub packet_type: PacketType,
    /// Payload bytes; empty for plain commands.
    pub payload: Bytes,
}

impl OutboundPacket {
    /// Create a packet with a payload.
    pub fn new(packet_type: PacketType, payload: impl Into<Bytes>) -> Self {
        Self {
            packet_type,
            payload: payload.into(),
        }
    }

    /// Create a packet with an empty payload.
    pub fn empty(packet_type: PacketType) -> Self {
        Self {
            packet_type,
            payload: Bytes::new(),
        }
    }

    /// Create a packet whose payload is `args` joined by NUL.
    pub fn with_args(packet_type: PacketType, args: &[&[u8]]) -> Self {
        let len = args.iter().map(|a| a.len()).sum::<usize>() + args.len().saturating_sub(1);
        let mut payload = Vec::with_capacity(len);
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                payload.push(ARG_SEPARATOR);
            }
            payload.extend_from_slice(arg);
        }
        Self::new(packet_type, payload)
    }

    /// Encode the header for this packet.
    ///
    /// Fails with `Encoding` if the payload exceeds `max_payload_size`.
    pub fn header(&self, max_payload_size: u32) -> Result<Header> {
        let len = u32::try_from(self.payload.len())
            .ok()
            .filter(|len| *len <= max_payload_size)
            .ok_or_else(|| {
                AgentError::Encoding(format!(
                    "payload size {} exceeds maximum {}",
                    self.payload.len(),
                    max_payload_size
                ))
            })?;
        Ok(Header::new(Magic::Req, self.packet_type, len))
    }

    /// Total size of this packet on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        MIN_PACKET_LENGTH + self.payload.len()
    }
}

/// Encode an envelope into one contiguous buffer.
///
/// The length field is always `payload.len()`. Fails with `Encoding` only
/// when the payload exceeds [`DEFAULT_MAX_PAYLOAD_SIZE`].
pub fn encode(magic: Magic, packet_type: PacketType, payload: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= DEFAULT_MAX_PAYLOAD_SIZE)
        .ok_or_else(|| {
            AgentError::Encoding(format!(
                "payload size {} exceeds maximum {}",
                payload.len(),
                DEFAULT_MAX_PAYLOAD_SIZE
            ))
        })?;

    let header = Header::new(magic, packet_type, len);
    let mut buf = Vec::with_capacity(MIN_PACKET_LENGTH + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decode the first envelope in `buf`.
///
/// Returns the envelope and the exact number of bytes it occupied, so the
/// caller can slice off whatever follows. Fails with `InsufficientData`
/// when `buf` holds less than one full envelope, and with
/// `ProtocolCorruption` when the header is unusable.
pub fn decode(buf: &[u8], max_payload_size: u32) -> Result<(Envelope, usize)> {
    let header = Header::decode(buf)?;
    header.validate(max_payload_size)?;

    let total = header.envelope_len();
    let Some(payload) = buf.get(MIN_PACKET_LENGTH..total) else {
        return Err(AgentError::InsufficientData {
            needed: total,
            available: buf.len(),
        });
    };

    Ok((Envelope::new(header, Bytes::copy_from_slice(payload)), total))
}

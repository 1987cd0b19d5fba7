//! Protocol module - wire format, envelopes and framing.
//!
//! This module implements the binary job-server protocol:
//! - 12-byte header encoding/decoding
//! - Stateless envelope codec
//! - Framer for reassembling envelopes across partial reads

mod envelope;
mod frame_buffer;
mod wire_format;

pub use envelope::{decode, encode, Envelope, OutboundPacket};
pub use frame_buffer::Framer;
pub use wire_format::{
    Header, Magic, PacketType, ARG_SEPARATOR, DEFAULT_MAX_PAYLOAD_SIZE, MIN_PACKET_LENGTH,
};

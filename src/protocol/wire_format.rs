//! Wire format encoding and decoding.
//!
//! Implements the 12-byte envelope header:
//! ```text
//! ┌──────────┬──────────┬──────────┬───────────────┐
//! │ Magic    │ Type     │ Length   │ Payload       │
//! │ 4 bytes  │ uint32 BE│ uint32 BE│ Length bytes  │
//! └──────────┴──────────┴──────────┴───────────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use std::fmt;

use crate::error::{AgentError, Result};

/// Header size in bytes; also the smallest valid envelope.
pub const MIN_PACKET_LENGTH: usize = 12;

/// Default maximum payload size (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Argument separator inside payloads.
pub const ARG_SEPARATOR: u8 = 0;

/// Direction marker at offset 0 of every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Magic {
    /// `"\0REQ"`: sent by workers and clients.
    Req,
    /// `"\0RES"`: sent by the job server.
    Res,
}

impl Magic {
    /// Raw marker bytes as they appear on the wire.
    pub const fn bytes(self) -> [u8; 4] {
        match self {
            Magic::Req => *b"\0REQ",
            Magic::Res => *b"\0RES",
        }
    }

    /// Big-endian code of the marker.
    pub const fn code(self) -> u32 {
        u32::from_be_bytes(self.bytes())
    }

    /// Look up a marker from its wire code.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            c if c == Magic::Req.code() => Some(Magic::Req),
            c if c == Magic::Res.code() => Some(Magic::Res),
            _ => None,
        }
    }
}

/// Packet type code.
///
/// An open newtype: codes the agent does not know are still delivered so
/// the worker can decide what to do with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketType(pub u32);

impl PacketType {
    pub const CAN_DO: PacketType = PacketType(1);
    pub const CANT_DO: PacketType = PacketType(2);
    pub const RESET_ABILITIES: PacketType = PacketType(3);
    pub const PRE_SLEEP: PacketType = PacketType(4);
    pub const NOOP: PacketType = PacketType(6);
    pub const GRAB_JOB: PacketType = PacketType(9);
    pub const NO_JOB: PacketType = PacketType(10);
    pub const JOB_ASSIGN: PacketType = PacketType(11);
    pub const WORK_STATUS: PacketType = PacketType(12);
    pub const WORK_COMPLETE: PacketType = PacketType(13);
    pub const WORK_FAIL: PacketType = PacketType(14);
    pub const ECHO_REQ: PacketType = PacketType(16);
    pub const ECHO_RES: PacketType = PacketType(17);
    pub const ERROR: PacketType = PacketType(19);
    pub const SET_CLIENT_ID: PacketType = PacketType(22);
    pub const CAN_DO_TIMEOUT: PacketType = PacketType(23);
    pub const ALL_YOURS: PacketType = PacketType(24);
    pub const WORK_EXCEPTION: PacketType = PacketType(25);
    pub const WORK_DATA: PacketType = PacketType(28);
    pub const WORK_WARNING: PacketType = PacketType(29);
    pub const GRAB_JOB_UNIQ: PacketType = PacketType(30);
    pub const JOB_ASSIGN_UNIQ: PacketType = PacketType(31);

    /// Numeric code.
    #[inline]
    pub const fn code(self) -> u32 {
        self.0
    }

    /// Protocol name, if the code is known.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            PacketType::CAN_DO => "CAN_DO",
            PacketType::CANT_DO => "CANT_DO",
            PacketType::RESET_ABILITIES => "RESET_ABILITIES",
            PacketType::PRE_SLEEP => "PRE_SLEEP",
            PacketType::NOOP => "NOOP",
            PacketType::GRAB_JOB => "GRAB_JOB",
            PacketType::NO_JOB => "NO_JOB",
            PacketType::JOB_ASSIGN => "JOB_ASSIGN",
            PacketType::WORK_STATUS => "WORK_STATUS",
            PacketType::WORK_COMPLETE => "WORK_COMPLETE",
            PacketType::WORK_FAIL => "WORK_FAIL",
            PacketType::ECHO_REQ => "ECHO_REQ",
            PacketType::ECHO_RES => "ECHO_RES",
            PacketType::ERROR => "ERROR",
            PacketType::SET_CLIENT_ID => "SET_CLIENT_ID",
            PacketType::CAN_DO_TIMEOUT => "CAN_DO_TIMEOUT",
            PacketType::ALL_YOURS => "ALL_YOURS",
            PacketType::WORK_EXCEPTION => "WORK_EXCEPTION",
            PacketType::WORK_DATA => "WORK_DATA",
            PacketType::WORK_WARNING => "WORK_WARNING",
            PacketType::GRAB_JOB_UNIQ => "GRAB_JOB_UNIQ",
            PacketType::JOB_ASSIGN_UNIQ => "JOB_ASSIGN_UNIQ",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "UNKNOWN({})", self.0),
        }
    }
}

/// Decoded envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Direction marker.
    pub magic: Magic,
    /// Packet type code.
    pub packet_type: PacketType,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(magic: Magic, packet_type: PacketType, payload_length: u32) -> Self {
        Self {
            magic,
            packet_type,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use gearwire::protocol::{Header, Magic, PacketType};
    ///
    /// let header = Header::new(Magic::Req, PacketType::GRAB_JOB_UNIQ, 0);
    /// let bytes = header.encode();
    /// assert_eq!(&bytes[..4], b"\0REQ");
    /// assert_eq!(bytes.len(), 12);
    /// ```
    pub fn encode(&self) -> [u8; MIN_PACKET_LENGTH] {
        let mut buf = [0u8; MIN_PACKET_LENGTH];
        buf[0..4].copy_from_slice(&self.magic.bytes());
        buf[4..8].copy_from_slice(&self.packet_type.code().to_be_bytes());
        buf[8..12].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `InsufficientData` if fewer than 12 bytes are available and
    /// `ProtocolCorruption` if the magic marker is unknown.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let Some(raw) = buf.get(..MIN_PACKET_LENGTH) else {
            return Err(AgentError::InsufficientData {
                needed: MIN_PACKET_LENGTH,
                available: buf.len(),
            });
        };

        let magic_code = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let magic = Magic::from_code(magic_code).ok_or_else(|| {
            AgentError::ProtocolCorruption(format!("unknown magic 0x{magic_code:08x}"))
        })?;

        Ok(Self {
            magic,
            packet_type: PacketType(u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]])),
            payload_length: u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]),
        })
    }

    /// Reject payload lengths above the configured bound.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.payload_length > max_payload_size {
            return Err(AgentError::ProtocolCorruption(format!(
                "payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }
        Ok(())
    }

    /// Length of the whole envelope this header announces.
    #[inline]
    pub fn envelope_len(&self) -> usize {
        MIN_PACKET_LENGTH + self.payload_length as usize
    }
}

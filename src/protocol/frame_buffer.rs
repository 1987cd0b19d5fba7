//! Framer: reassembles socket reads into complete envelopes.
//!
//! Uses `bytes::BytesMut` for the leftover buffer carried across reads.
//! Implements a state machine for handling fragmented envelopes:
//! - `WaitingForHeader`: Need at least 12 bytes
//! - `WaitingForPayload`: Header parsed, need the rest of the envelope
//!
//! # Example
//!
//! ```
//! use gearwire::protocol::{encode, Framer, Magic, PacketType};
//!
//! let mut framer = Framer::new();
//! let bytes = encode(Magic::Res, PacketType::NOOP, b"").unwrap();
//!
//! assert!(framer.push(&bytes[..5]).unwrap().is_empty());
//! let envelopes = framer.push(&bytes[5..]).unwrap();
//! assert_eq!(envelopes[0].packet_type(), PacketType::NOOP);
//! ```

use bytes::BytesMut;

use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, MIN_PACKET_LENGTH};
use super::Envelope;
use crate::error::Result;

/// Default initial capacity of the leftover buffer.
const DEFAULT_CAPACITY: usize = 4 * 1024;

/// Largest reservation made on the strength of a declared length alone.
const MAX_RESERVE: usize = 64 * 1024;

/// State machine for envelope parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for a complete header.
    WaitingForHeader,
    /// Header parsed, waiting for `header.envelope_len()` buffered bytes.
    WaitingForPayload { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete envelopes.
///
/// Bytes stay in one `BytesMut`; a complete envelope is split off the front
/// and frozen, so each byte is copied once, on the way in.
#[derive(Debug)]
pub struct Framer {
    /// Bytes not yet consumed by a complete envelope.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl Framer {
    /// Create a new framer with default settings.
    pub fn new() -> Self {
        Self::with_capacity_and_max_payload(DEFAULT_CAPACITY, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new framer with custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self::with_capacity_and_max_payload(DEFAULT_CAPACITY, max_payload_size)
    }

    /// Create a new framer with custom capacity and max payload.
    pub fn with_capacity_and_max_payload(capacity: usize, max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Push one socket read and extract all complete envelopes.
    ///
    /// Partial data stays buffered for the next push. On error the buffered
    /// bytes are discarded; envelopes decoded before the bad header are lost
    /// with them, so the read loop uses [`Framer::extend`] and
    /// [`Framer::next_envelope`] instead.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Envelope>> {
        self.buffer.extend_from_slice(data);

        let mut envelopes = Vec::new();
        while let Some(envelope) = self.next_envelope()? {
            envelopes.push(envelope);
        }
        Ok(envelopes)
    }

    /// Append data to the buffer without extracting envelopes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract a single envelope from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(envelope))` if a complete envelope was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(ProtocolCorruption)` if the buffered header is unusable; the
    ///   buffer is cleared since the next envelope boundary is unknown
    pub fn next_envelope(&mut self) -> Result<Option<Envelope>> {
        match self.try_extract_one() {
            Err(e) => {
                self.clear();
                Err(e)
            }
            ok => ok,
        }
    }

    fn try_extract_one(&mut self) -> Result<Option<Envelope>> {
        let header = match &self.state {
            State::WaitingForHeader => {
                if self.buffer.len() < MIN_PACKET_LENGTH {
                    return Ok(None);
                }

                let header = Header::decode(&self.buffer)?;
                header.validate(self.max_payload_size)?;
                self.state = State::WaitingForPayload { header };
                header
            }
            State::WaitingForPayload { header } => *header,
        };

        let total = header.envelope_len();
        if self.buffer.len() < total {
            // the rest grows with the bytes that actually arrive
            self.buffer
                .reserve((total - self.buffer.len()).min(MAX_RESERVE));
            return Ok(None);
        }

        let mut envelope = self.buffer.split_to(total).freeze();
        let payload = envelope.split_off(MIN_PACKET_LENGTH);
        self.state = State::WaitingForHeader;

        Ok(Some(Envelope::new(header, payload)))
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::protocol::{encode, Magic, PacketType};

    fn res(packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
        encode(Magic::Res, packet_type, payload).unwrap()
    }

    #[test]
    fn test_single_complete_envelope() {
        let mut framer = Framer::new();
        let envelopes = framer.push(&res(PacketType::ECHO_RES, b"hello")).unwrap();

        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].packet_type(), PacketType::ECHO_RES);
        assert_eq!(envelopes[0].payload(), b"hello");
        assert!(framer.is_empty());
    }

    #[test]
    fn test_multiple_envelopes_in_one_push() {
        let mut framer = Framer::new();
        let mut combined = res(PacketType::NOOP, b"");
        combined.extend(res(PacketType::NO_JOB, b""));
        combined.extend(res(PacketType::JOB_ASSIGN, b"H:1\0f\0x"));

        let envelopes = framer.push(&combined).unwrap();

        let types: Vec<_> = envelopes.iter().map(|e| e.packet_type()).collect();
        assert_eq!(
            types,
            [PacketType::NOOP, PacketType::NO_JOB, PacketType::JOB_ASSIGN]
        );
        assert!(framer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut framer = Framer::new();
        let bytes = res(PacketType::WORK_DATA, b"test");

        assert!(framer.push(&bytes[..5]).unwrap().is_empty());
        assert_eq!(framer.state_name(), "WaitingForHeader");
        assert_eq!(framer.len(), 5);

        let envelopes = framer.push(&bytes[5..]).unwrap();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].payload(), b"test");
    }

    #[test]
    fn test_fragmented_payload() {
        let mut framer = Framer::new();
        let payload = b"this is a longer payload that will be fragmented";
        let bytes = res(PacketType::WORK_DATA, payload);

        assert!(framer.push(&bytes[..MIN_PACKET_LENGTH + 10]).unwrap().is_empty());
        assert_eq!(framer.state_name(), "WaitingForPayload");

        let envelopes = framer.push(&bytes[MIN_PACKET_LENGTH + 10..]).unwrap();
        assert_eq!(envelopes[0].payload(), payload);
        assert!(framer.is_empty());
    }

    #[test]
    fn test_reads_of_5_15_12() {
        // 12-byte and 20-byte envelopes arriving as reads of 5, 15 and 12
        let mut stream = res(PacketType::NOOP, b"");
        stream.extend(res(PacketType::ECHO_RES, b"8 bytes!"));
        assert_eq!(stream.len(), 32);

        let mut framer = Framer::new();
        let first = framer.push(&stream[..5]).unwrap();
        let second = framer.push(&stream[5..20]).unwrap();
        let third = framer.push(&stream[20..]).unwrap();

        assert!(first.is_empty());
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].packet_type(), PacketType::NOOP);
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].payload(), b"8 bytes!");
        assert!(framer.is_empty());
    }

    #[test]
    fn test_any_chunking_yields_same_envelopes() {
        let originals = [
            (PacketType::NOOP, &b""[..]),
            (PacketType::JOB_ASSIGN_UNIQ, &b"H:lap:1\0reverse\0u-1\0payload"[..]),
            (PacketType::NO_JOB, &b""[..]),
            (PacketType::WORK_DATA, &[7u8; 40][..]),
        ];
        let stream: Vec<u8> = originals
            .iter()
            .flat_map(|(t, p)| res(*t, p))
            .collect();

        for chunk_size in 1..=stream.len() {
            let mut framer = Framer::new();
            let mut decoded = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                // empty reads in between must be harmless
                decoded.extend(framer.push(&[]).unwrap());
                decoded.extend(framer.push(chunk).unwrap());
            }

            assert_eq!(decoded.len(), originals.len(), "chunk size {chunk_size}");
            for (envelope, (t, p)) in decoded.iter().zip(originals.iter()) {
                assert_eq!(envelope.packet_type(), *t);
                assert_eq!(envelope.payload(), *p);
            }
            assert!(framer.is_empty());
        }
    }

    #[test]
    fn test_short_input_never_decodes() {
        let mut framer = Framer::new();
        for _ in 0..MIN_PACKET_LENGTH - 1 {
            assert!(framer.push(&[0]).unwrap().is_empty());
        }
        assert_eq!(framer.len(), MIN_PACKET_LENGTH - 1);
    }

    #[test]
    fn test_max_payload_validation_clears_buffer() {
        let mut framer = Framer::with_max_payload(100);
        let header = Header::new(Magic::Res, PacketType::JOB_ASSIGN, 1000);

        let err = framer.push(&header.encode()).unwrap_err();

        assert!(matches!(err, AgentError::ProtocolCorruption(_)));
        assert!(framer.is_empty());
        assert_eq!(framer.state_name(), "WaitingForHeader");
    }

    #[test]
    fn test_next_envelope_keeps_prior_envelopes_on_corruption() {
        let mut framer = Framer::new();
        let mut data = res(PacketType::NOOP, b"");
        data.extend_from_slice(b"garbage-not-a-header");
        framer.extend(&data);

        let first = framer.next_envelope().unwrap().unwrap();
        assert_eq!(first.packet_type(), PacketType::NOOP);

        assert!(framer.next_envelope().is_err());
        assert!(framer.is_empty());

        // recovers on the next good envelope
        let envelopes = framer.push(&res(PacketType::NO_JOB, b"")).unwrap();
        assert_eq!(envelopes[0].packet_type(), PacketType::NO_JOB);
    }

    #[test]
    fn test_large_declared_length_is_not_preallocated() {
        let mut framer = Framer::new();
        let header = Header::new(Magic::Res, PacketType::WORK_DATA, 32 * 1024 * 1024);

        assert!(framer.push(&header.encode()).unwrap().is_empty());

        assert_eq!(framer.state_name(), "WaitingForPayload");
        assert!(framer.buffer.capacity() <= DEFAULT_CAPACITY + MAX_RESERVE);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut framer = Framer::new();
        let bytes = res(PacketType::WORK_DATA, b"test");
        framer.push(&bytes[..MIN_PACKET_LENGTH]).unwrap();
        assert_eq!(framer.state_name(), "WaitingForPayload");

        framer.clear();

        assert_eq!(framer.state_name(), "WaitingForHeader");
        assert!(framer.is_empty());
    }
}

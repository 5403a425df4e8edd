//! Protocol errors: well-formed bytes that violate PTP/IP semantics.

use thiserror::Error;

use super::codes::EventCode;
use super::packet::PacketType;
use crate::codec::CodecError;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown packet type 0x{0:08X}")]
    UnknownPacketType(u32),

    #[error("Invalid packet length {length} (header alone is 8 bytes)")]
    InvalidLength { length: u32 },

    #[error("Packet of {length} bytes does not fit the 32-bit length field")]
    PacketTooLarge { length: usize },

    #[error("Unexpected packet: expected {expected}, got {actual}")]
    UnexpectedPacket {
        expected: &'static str,
        actual: PacketType,
    },

    #[error("Invalid {packet} payload: {reason}")]
    InvalidPayload { packet: PacketType, reason: String },

    #[error("Malformed {packet} payload: {source}")]
    MalformedPayload {
        packet: PacketType,
        #[source]
        source: CodecError,
    },

    #[error("Too many parameters: {count} (max {max})")]
    TooManyParameters { count: usize, max: usize },

    #[error("Transaction ID mismatch: expected {expected}, got {actual}")]
    TransactionMismatch { expected: u32, actual: u32 },

    #[error("Data phase overrun: {received} bytes received, {expected} announced")]
    DataOverrun { expected: u64, received: u64 },

    #[error("Unexpected {packet} in data phase: {reason}")]
    DataPhase {
        packet: PacketType,
        reason: &'static str,
    },

    #[error("Responder rejected the connection: reason 0x{reason:08X} ({text})")]
    HandshakeRejected { reason: u32, text: &'static str },

    #[error("{code} event is missing parameter {index}")]
    MissingEventParameter { code: EventCode, index: usize },

    #[error("{code} event parameter {index} is 0x{value:08X}, exceeds 16 bits")]
    EventParameterOutOfRange {
        code: EventCode,
        index: usize,
        value: u32,
    },

    #[error("Response is missing parameter {index}")]
    MissingResponseParameter { index: usize },
}

impl ProtocolError {
    /// True when the byte stream can no longer be framed after this error.
    pub fn breaks_framing(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidLength { .. } | ProtocolError::PacketTooLarge { .. }
        )
    }
}

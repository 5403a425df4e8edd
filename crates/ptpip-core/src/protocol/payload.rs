//! Typed payloads for each PTP/IP packet type.
//!
//! Decoding is the second, type-specific step after framing: it re-checks
//! the type tag and the payload shape, and reports violations as
//! [`ProtocolError`] rather than end-of-stream.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::codes::{EventCode, OperationCode, PtpCode, ResponseCode};
use super::constants::{GUID_LEN, MAX_EVENT_PARAMS, MAX_OPERATION_PARAMS};
use super::error::ProtocolError;
use super::packet::{Packet, PacketType};
use crate::codec::{CodecError, DataReader, DataWriter};

/// A packet payload with a fixed packet type.
pub trait Payload: Sized {
    const TYPE: PacketType;

    /// Append the payload bytes.
    fn encode(&self, out: &mut DataWriter);

    /// Decode payload bytes already known to carry `Self::TYPE`.
    fn decode(payload: &[u8]) -> Result<Self, ProtocolError>;

    fn to_packet(&self) -> Packet {
        let mut out = DataWriter::new();
        self.encode(&mut out);
        Packet::new(Self::TYPE, out.into_bytes())
    }

    fn from_packet(packet: &Packet) -> Result<Self, ProtocolError> {
        if packet.packet_type() != Self::TYPE {
            return Err(ProtocolError::UnexpectedPacket {
                expected: type_name(Self::TYPE),
                actual: packet.packet_type(),
            });
        }
        Self::decode(packet.payload())
    }
}

fn type_name(packet_type: PacketType) -> &'static str {
    match packet_type {
        PacketType::InitCommandRequest => "InitCommandRequest",
        PacketType::InitCommandAck => "InitCommandAck",
        PacketType::InitEventRequest => "InitEventRequest",
        PacketType::InitEventAck => "InitEventAck",
        PacketType::InitFail => "InitFail",
        PacketType::OperationRequest => "OperationRequest",
        PacketType::OperationResponse => "OperationResponse",
        PacketType::Event => "Event",
        PacketType::StartData => "StartData",
        PacketType::Data => "Data",
        PacketType::Cancel => "Cancel",
        PacketType::EndData => "EndData",
        PacketType::ProbeRequest => "ProbeRequest",
        PacketType::ProbeResponse => "ProbeResponse",
    }
}

/// Run a field decoder over the payload, mapping codec failures to a
/// protocol error. Returns the reader so callers can check what is left.
fn decode_with<'a, T>(
    packet: PacketType,
    payload: &'a [u8],
    read: impl FnOnce(&mut DataReader<'a>) -> Result<T, CodecError>,
) -> Result<(T, DataReader<'a>), ProtocolError> {
    let mut reader = DataReader::new(payload);
    let value = read(&mut reader)
        .map_err(|source| ProtocolError::MalformedPayload { packet, source })?;
    Ok((value, reader))
}

fn exact_len(packet: PacketType, payload: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if payload.len() != expected {
        return Err(ProtocolError::InvalidPayload {
            packet,
            reason: format!("expected exactly {} bytes, got {}", expected, payload.len()),
        });
    }
    Ok(())
}

fn min_len(packet: PacketType, payload: &[u8], minimum: usize) -> Result<(), ProtocolError> {
    if payload.len() < minimum {
        return Err(ProtocolError::InvalidPayload {
            packet,
            reason: format!("expected at least {} bytes, got {}", minimum, payload.len()),
        });
    }
    Ok(())
}

// ============================================================================
// Shared field types
// ============================================================================

/// 16-byte initiator/responder identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid([u8; GUID_LEN]);

impl Guid {
    pub const fn new(bytes: [u8; GUID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; GUID_LEN] {
        &self.0
    }

    fn read(reader: &mut DataReader<'_>) -> Result<Self, CodecError> {
        let mut bytes = [0u8; GUID_LEN];
        for byte in bytes.iter_mut() {
            *byte = reader.read_u8()?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

/// GUID text was not 32 hex digits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid GUID '{0}': expected 32 hex digits")]
pub struct GuidParseError(String);

impl FromStr for Guid {
    type Err = GuidParseError;

    /// Accepts 32 hex digits, optionally separated by dashes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: Vec<u8> = s.bytes().filter(|&b| b != b'-').collect();
        if digits.len() != GUID_LEN * 2 {
            return Err(GuidParseError(s.to_string()));
        }
        let mut bytes = [0u8; GUID_LEN];
        for (byte, pair) in bytes.iter_mut().zip(digits.chunks_exact(2)) {
            let text = std::str::from_utf8(pair).map_err(|_| GuidParseError(s.to_string()))?;
            *byte = u8::from_str_radix(text, 16).map_err(|_| GuidParseError(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Up to `MAX` 32-bit parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params<const MAX: usize>(Vec<u32>);

/// OperationRequest / OperationResponse parameters.
pub type OperationParams = Params<MAX_OPERATION_PARAMS>;

/// Event parameters.
pub type EventParams = Params<MAX_EVENT_PARAMS>;

impl<const MAX: usize> Params<MAX> {
    pub fn new(values: &[u32]) -> Result<Self, ProtocolError> {
        if values.len() > MAX {
            return Err(ProtocolError::TooManyParameters {
                count: values.len(),
                max: MAX,
            });
        }
        Ok(Self(values.to_vec()))
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        self.0.get(index).copied()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn encode(&self, out: &mut DataWriter) {
        for &value in &self.0 {
            out.put_u32(value);
        }
    }

    /// Decode a parameter tail: a whole number of `u32`s, at most `MAX`.
    fn decode(packet: PacketType, tail: &[u8]) -> Result<Self, ProtocolError> {
        if tail.len() % 4 != 0 {
            return Err(ProtocolError::InvalidPayload {
                packet,
                reason: format!("parameter block of {} bytes is not 4-byte aligned", tail.len()),
            });
        }
        let count = tail.len() / 4;
        if count > MAX {
            return Err(ProtocolError::TooManyParameters { count, max: MAX });
        }
        Ok(Self(
            tail.chunks_exact(4)
                .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        ))
    }
}

/// DataPhaseInfo field of an OperationRequest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPhase {
    Unknown,
    /// No data phase, or data flows responder to initiator.
    NoDataOrDataIn,
    /// Data flows initiator to responder.
    DataOut,
    Other(u32),
}

impl DataPhase {
    pub fn code(self) -> u32 {
        match self {
            DataPhase::Unknown => 0,
            DataPhase::NoDataOrDataIn => 1,
            DataPhase::DataOut => 2,
            DataPhase::Other(code) => code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            0 => DataPhase::Unknown,
            1 => DataPhase::NoDataOrDataIn,
            2 => DataPhase::DataOut,
            other => DataPhase::Other(other),
        }
    }
}

// ============================================================================
// Handshake
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitCommandRequest {
    pub guid: Guid,
    pub name: String,
    pub protocol_version: u32,
}

impl Payload for InitCommandRequest {
    const TYPE: PacketType = PacketType::InitCommandRequest;

    fn encode(&self, out: &mut DataWriter) {
        out.put_bytes(self.guid.as_bytes())
            .put_string(&self.name)
            .put_u32(self.protocol_version);
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let (decoded, reader) = decode_with(Self::TYPE, payload, |r| {
            Ok(Self {
                guid: Guid::read(r)?,
                name: r.read_string()?,
                protocol_version: r.read_u32()?,
            })
        })?;
        exact_len(Self::TYPE, payload, reader.position())?;
        Ok(decoded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitCommandAck {
    pub connection_number: u32,
    pub guid: Guid,
    pub name: String,
    pub protocol_version: u32,
}

impl Payload for InitCommandAck {
    const TYPE: PacketType = PacketType::InitCommandAck;

    fn encode(&self, out: &mut DataWriter) {
        out.put_u32(self.connection_number)
            .put_bytes(self.guid.as_bytes())
            .put_string(&self.name)
            .put_u32(self.protocol_version);
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let (decoded, reader) = decode_with(Self::TYPE, payload, |r| {
            Ok(Self {
                connection_number: r.read_u32()?,
                guid: Guid::read(r)?,
                name: r.read_string()?,
                protocol_version: r.read_u32()?,
            })
        })?;
        exact_len(Self::TYPE, payload, reader.position())?;
        Ok(decoded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitEventRequest {
    pub connection_number: u32,
}

impl Payload for InitEventRequest {
    const TYPE: PacketType = PacketType::InitEventRequest;

    fn encode(&self, out: &mut DataWriter) {
        out.put_u32(self.connection_number);
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        exact_len(Self::TYPE, payload, 4)?;
        let (connection_number, _) = decode_with(Self::TYPE, payload, |r| r.read_u32())?;
        Ok(Self { connection_number })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitFail {
    pub reason: u32,
}

impl Payload for InitFail {
    const TYPE: PacketType = PacketType::InitFail;

    fn encode(&self, out: &mut DataWriter) {
        out.put_u32(self.reason);
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        exact_len(Self::TYPE, payload, 4)?;
        let (reason, _) = decode_with(Self::TYPE, payload, |r| r.read_u32())?;
        Ok(Self { reason })
    }
}

macro_rules! empty_payload {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name;

        impl Payload for $name {
            const TYPE: PacketType = PacketType::$name;

            fn encode(&self, _out: &mut DataWriter) {}

            fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
                exact_len(Self::TYPE, payload, 0)?;
                Ok($name)
            }
        }
    };
}

empty_payload!(
    /// Event channel accepted.
    InitEventAck
);
empty_payload!(
    /// Keep-alive probe; either side may send it.
    ProbeRequest
);
empty_payload!(
    /// Answer to a ProbeRequest.
    ProbeResponse
);

// ============================================================================
// Operations and events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub data_phase: DataPhase,
    pub code: OperationCode,
    pub transaction_id: u32,
    pub params: OperationParams,
}

impl Payload for OperationRequest {
    const TYPE: PacketType = PacketType::OperationRequest;

    fn encode(&self, out: &mut DataWriter) {
        out.put_u32(self.data_phase.code())
            .put_u16(self.code.code())
            .put_u32(self.transaction_id);
        self.params.encode(out);
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        min_len(Self::TYPE, payload, 10)?;
        let ((data_phase, code, transaction_id), reader) =
            decode_with(Self::TYPE, payload, |r| {
                Ok((r.read_u32()?, r.read_u16()?, r.read_u32()?))
            })?;
        Ok(Self {
            data_phase: DataPhase::from_code(data_phase),
            code: OperationCode::from_code(code),
            transaction_id,
            params: Params::decode(Self::TYPE, reader.rest())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResponse {
    pub code: ResponseCode,
    pub transaction_id: u32,
    pub params: OperationParams,
}

impl Payload for OperationResponse {
    const TYPE: PacketType = PacketType::OperationResponse;

    fn encode(&self, out: &mut DataWriter) {
        out.put_u16(self.code.code()).put_u32(self.transaction_id);
        self.params.encode(out);
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        min_len(Self::TYPE, payload, 6)?;
        let ((code, transaction_id), reader) =
            decode_with(Self::TYPE, payload, |r| Ok((r.read_u16()?, r.read_u32()?)))?;
        Ok(Self {
            code: ResponseCode::from_code(code),
            transaction_id,
            params: Params::decode(Self::TYPE, reader.rest())?,
        })
    }
}

/// Event as carried on the event connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPacket {
    pub code: EventCode,
    pub transaction_id: u32,
    pub params: EventParams,
}

impl Payload for EventPacket {
    const TYPE: PacketType = PacketType::Event;

    fn encode(&self, out: &mut DataWriter) {
        out.put_u16(self.code.code()).put_u32(self.transaction_id);
        self.params.encode(out);
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        min_len(Self::TYPE, payload, 6)?;
        let ((code, transaction_id), reader) =
            decode_with(Self::TYPE, payload, |r| Ok((r.read_u16()?, r.read_u32()?)))?;
        Ok(Self {
            code: EventCode::from_code(code),
            transaction_id,
            params: Params::decode(Self::TYPE, reader.rest())?,
        })
    }
}

// ============================================================================
// Data phase
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartData {
    pub transaction_id: u32,
    pub total_length: u64,
}

impl Payload for StartData {
    const TYPE: PacketType = PacketType::StartData;

    fn encode(&self, out: &mut DataWriter) {
        out.put_u32(self.transaction_id).put_u64(self.total_length);
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        exact_len(Self::TYPE, payload, 12)?;
        let (start, _) = decode_with(Self::TYPE, payload, |r| {
            Ok(Self {
                transaction_id: r.read_u32()?,
                total_length: r.read_u64()?,
            })
        })?;
        Ok(start)
    }
}

/// A data chunk: `Data` packets carry intermediate chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub transaction_id: u32,
    pub chunk: Vec<u8>,
}

/// The final chunk of a data phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndData {
    pub transaction_id: u32,
    pub chunk: Vec<u8>,
}

macro_rules! chunk_payload {
    ($name:ident, $packet_type:ident) => {
        impl Payload for $name {
            const TYPE: PacketType = PacketType::$packet_type;

            fn encode(&self, out: &mut DataWriter) {
                out.put_u32(self.transaction_id).put_bytes(&self.chunk);
            }

            fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
                min_len(Self::TYPE, payload, 4)?;
                let (transaction_id, reader) =
                    decode_with(Self::TYPE, payload, |r| r.read_u32())?;
                Ok(Self {
                    transaction_id,
                    chunk: reader.rest().to_vec(),
                })
            }
        }
    };
}

chunk_payload!(DataPacket, Data);
chunk_payload!(EndData, EndData);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancel {
    pub transaction_id: u32,
}

impl Payload for Cancel {
    const TYPE: PacketType = PacketType::Cancel;

    fn encode(&self, out: &mut DataWriter) {
        out.put_u32(self.transaction_id);
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        exact_len(Self::TYPE, payload, 4)?;
        let (transaction_id, _) = decode_with(Self::TYPE, payload, |r| r.read_u32())?;
        Ok(Self { transaction_id })
    }
}

//! PTP/IP packet envelope.
//!
//! ```text
//! +--------+--------+--------+--------+
//! |  Length (LE, header + payload)    |  (4 bytes)
//! +--------+--------+--------+--------+
//! |  Packet type (LE)                 |  (4 bytes)
//! +--------+--------+--------+--------+
//! |  Payload ...                      |  (Length - 8 bytes)
//! +--------+--------+--------+--------+
//! ```

use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian};

use super::constants::HEADER_LEN;
use super::error::ProtocolError;
use crate::codec::CodecError;
use crate::error::PtpError;

/// Closed set of PTP/IP packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketType {
    InitCommandRequest = 1,
    InitCommandAck = 2,
    InitEventRequest = 3,
    InitEventAck = 4,
    InitFail = 5,
    OperationRequest = 6,
    OperationResponse = 7,
    Event = 8,
    StartData = 9,
    Data = 10,
    Cancel = 11,
    EndData = 12,
    ProbeRequest = 13,
    ProbeResponse = 14,
}

impl PacketType {
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => PacketType::InitCommandRequest,
            2 => PacketType::InitCommandAck,
            3 => PacketType::InitEventRequest,
            4 => PacketType::InitEventAck,
            5 => PacketType::InitFail,
            6 => PacketType::OperationRequest,
            7 => PacketType::OperationResponse,
            8 => PacketType::Event,
            9 => PacketType::StartData,
            10 => PacketType::Data,
            11 => PacketType::Cancel,
            12 => PacketType::EndData,
            13 => PacketType::ProbeRequest,
            14 => PacketType::ProbeResponse,
            _ => return None,
        })
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A framed PTP/IP packet: type tag plus raw payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    packet_type: PacketType,
    payload: Vec<u8>,
}

impl Packet {
    pub fn new(packet_type: PacketType, payload: Vec<u8>) -> Self {
        Self {
            packet_type,
            payload,
        }
    }

    /// Packet with an empty payload.
    pub fn empty(packet_type: PacketType) -> Self {
        Self::new(packet_type, Vec::new())
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Total wire length (header + payload).
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    fn header(&self) -> Result<[u8; HEADER_LEN], ProtocolError> {
        let length = u32::try_from(self.wire_len()).map_err(|_| ProtocolError::PacketTooLarge {
            length: self.wire_len(),
        })?;
        let mut header = [0u8; HEADER_LEN];
        LittleEndian::write_u32(&mut header[0..4], length);
        LittleEndian::write_u32(&mut header[4..8], self.packet_type.code());
        Ok(header)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(self.wire_len());
        buf.extend_from_slice(&self.header()?);
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Write header and payload, then flush.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), PtpError> {
        let header = self.header()?;
        writer.write_all(&header)?;
        writer.write_all(&self.payload)?;
        writer.flush()?;
        Ok(())
    }

    /// Read one packet: 8 header bytes, then exactly `length - 8` payload bytes.
    ///
    /// The payload is consumed before the type tag is validated, so an
    /// unknown type leaves the stream positioned at the next packet.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, PtpError> {
        let mut header = [0u8; HEADER_LEN];
        read_exact(reader, &mut header, "packet header")?;

        let length = LittleEndian::read_u32(&header[0..4]);
        let code = LittleEndian::read_u32(&header[4..8]);
        if (length as usize) < HEADER_LEN {
            return Err(ProtocolError::InvalidLength { length }.into());
        }

        let payload_len = length as usize - HEADER_LEN;
        let mut payload = Vec::new();
        (&mut *reader)
            .take(payload_len as u64)
            .read_to_end(&mut payload)?;
        if payload.len() < payload_len {
            return Err(CodecError::EndOfStream {
                what: "packet payload",
            }
            .into());
        }

        let packet_type = PacketType::from_code(code).ok_or(ProtocolError::UnknownPacketType(code))?;
        Ok(Self::new(packet_type, payload))
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("type", &self.packet_type)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// `read_exact` with short reads reported as end-of-stream and other
/// failures passed through as transport errors.
fn read_exact<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), PtpError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            PtpError::Codec(CodecError::EndOfStream { what })
        } else {
            PtpError::from(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_layout() {
        let packet = Packet::new(PacketType::InitEventRequest, vec![7, 0, 0, 0]);
        let bytes = packet.to_bytes().unwrap();
        assert_eq!(bytes.len(), 8 + 4);
        assert_eq!(&bytes[0..4], &[12, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[3, 0, 0, 0]);
        assert_eq!(&bytes[8..], &[7, 0, 0, 0]);
    }

    #[test]
    fn test_reread_yields_equal_packet() {
        for (packet_type, payload) in [
            (PacketType::ProbeRequest, vec![]),
            (PacketType::Data, vec![1, 2, 3, 4, 5, 6, 7]),
            (PacketType::Cancel, vec![9, 0, 0, 0]),
        ] {
            let packet = Packet::new(packet_type, payload);
            let bytes = packet.to_bytes().unwrap();
            assert_eq!(bytes.len(), packet.wire_len());
            let mut cursor = &bytes[..];
            assert_eq!(Packet::read_from(&mut cursor).unwrap(), packet);
            assert!(cursor.is_empty());
        }
    }

    #[test]
    fn test_short_header_is_end_of_stream() {
        let mut cursor: &[u8] = &[12, 0, 0];
        let err = Packet::read_from(&mut cursor).unwrap_err();
        assert!(matches!(err, PtpError::Codec(CodecError::EndOfStream { .. })));
    }

    #[test]
    fn test_short_payload_is_end_of_stream() {
        let mut cursor: &[u8] = &[16, 0, 0, 0, 10, 0, 0, 0, 1, 2];
        let err = Packet::read_from(&mut cursor).unwrap_err();
        assert!(matches!(err, PtpError::Codec(CodecError::EndOfStream { .. })));
    }

    #[test]
    fn test_length_below_header_is_protocol_error() {
        let mut cursor: &[u8] = &[4, 0, 0, 0, 1, 0, 0, 0];
        let err = Packet::read_from(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            PtpError::Protocol(ProtocolError::InvalidLength { length: 4 })
        ));
    }

    #[test]
    fn test_unknown_type_consumes_payload() {
        let mut wire = vec![10, 0, 0, 0, 0x63, 0, 0, 0, 0xAA, 0xBB];
        wire.extend(Packet::empty(PacketType::ProbeResponse).to_bytes().unwrap());
        let mut cursor = &wire[..];

        let err = Packet::read_from(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            PtpError::Protocol(ProtocolError::UnknownPacketType(0x63))
        ));
        let next = Packet::read_from(&mut cursor).unwrap();
        assert_eq!(next.packet_type(), PacketType::ProbeResponse);
    }
}

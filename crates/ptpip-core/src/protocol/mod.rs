//! Protocol module - PTP/IP packet framing, payload catalog and code tables.

pub mod codes;
pub mod constants;
pub mod error;
pub mod packet;
pub mod payload;

pub use codes::{CodeClass, EventCode, OperationCode, PtpCode, ResponseCode};
pub use constants::*;
pub use error::ProtocolError;
pub use packet::{Packet, PacketType};
pub use payload::{
    Cancel, DataPacket, DataPhase, EndData, EventPacket, EventParams, Guid, GuidParseError,
    InitCommandAck, InitCommandRequest, InitEventAck, InitEventRequest, InitFail, OperationParams,
    OperationRequest, OperationResponse, Params, Payload, ProbeRequest, ProbeResponse, StartData,
};

//! Protocol constants from the PTP/IP (CIPA DC-005) standard.

// ============================================================================
// Transport
// ============================================================================

/// IANA-registered PTP/IP TCP port.
pub const PTPIP_PORT: u16 = 15740;

/// PTP/IP protocol version 1.0 (major in the high word).
pub const PTPIP_PROTOCOL_VERSION: u32 = 0x0001_0000;

// ============================================================================
// Packet layout
// ============================================================================

/// Envelope header: 4-byte length + 4-byte packet type.
pub const HEADER_LEN: usize = 8;

/// Initiator / responder GUID length.
pub const GUID_LEN: usize = 16;

/// Maximum parameters in an OperationRequest / OperationResponse.
pub const MAX_OPERATION_PARAMS: usize = 5;

/// Maximum parameters in an Event.
pub const MAX_EVENT_PARAMS: usize = 3;

/// StartData total length meaning "not known in advance".
pub const UNKNOWN_DATA_LENGTH: u64 = u64::MAX;

// ============================================================================
// InitFail reasons
// ============================================================================

/// Responder rejected this initiator.
pub const INIT_FAIL_REJECTED_INITIATOR: u32 = 0x0000_0001;

/// Responder is busy with another initiator.
pub const INIT_FAIL_BUSY: u32 = 0x0000_0002;

/// Unspecified failure.
pub const INIT_FAIL_UNSPECIFIED: u32 = 0x0000_0003;

/// Human-readable InitFail reason.
pub fn init_fail_reason(reason: u32) -> &'static str {
    match reason {
        INIT_FAIL_REJECTED_INITIATOR => "rejected initiator",
        INIT_FAIL_BUSY => "busy",
        INIT_FAIL_UNSPECIFIED => "unspecified",
        _ => "unknown",
    }
}

//! PTPIP-Core: Picture Transfer Protocol over TCP (PTP/IP) in Rust.
//!
//! This crate implements the initiator side of PTP/IP: it connects to a
//! camera (the responder), runs the two-connection handshake, issues PTP
//! operations and delivers unsolicited events to listeners.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Codec**: Width-typed little-endian integers, arrays and UTF-16 strings
//! - **Protocol**: Packet envelope, typed payloads, operation/response/event codes
//! - **Transport**: Byte-stream abstraction (TCP, in-memory mock)
//! - **State**: Session lifecycle, transaction IDs, data-phase reassembly
//! - **Events**: Background event reader and listener dispatch
//! - **Datasets**: DeviceInfo, StorageInfo, ObjectInfo
//! - **Session**: Handshake, transactions, teardown
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ptpip_core::{PtpIpSession, SessionConfig, TracingListener};
//!
//! let config = SessionConfig {
//!     host: "192.168.1.1".to_string(),
//!     ..Default::default()
//! };
//!
//! let mut session = PtpIpSession::open(&config).expect("connect failed");
//! session.add_listener(Arc::new(TracingListener));
//! session.open_session(1).expect("OpenSession failed");
//! let info = session.get_device_info().expect("GetDeviceInfo failed");
//! println!("{} {}", info.manufacturer, info.model);
//! ```

pub mod codec;
pub mod datasets;
pub mod error;
pub mod events;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use codec::{CodecError, DataReader, DataWriter, PtpArray, PtpString, WireInt};
pub use datasets::{Dataset, DeviceInfo, ObjectInfo, StorageInfo};
pub use error::PtpError;
pub use events::{Event, EventDispatcher, EventListener, ListenerSet, TracingListener};
pub use protocol::{
    EventCode, Guid, OperationCode, Packet, PacketType, ProtocolError, PtpCode, ResponseCode,
};
pub use session::{PtpIpSession, ResponderInfo, SessionConfig, Transaction};
pub use state::SessionState;
pub use transport::{
    Connector, MockConnector, MockStream, PtpStream, TcpConnector, TransportError,
};

//! Transport layer module.

pub mod mock;
pub mod tcp;
pub mod traits;

pub use mock::{MockConnector, MockStream};
pub use tcp::TcpConnector;
pub use traits::{Connector, PtpStream, TransportError};

//! Transport layer abstraction.
//!
//! A PTP/IP session needs two byte streams to the same responder. The
//! [`Connector`] trait opens them; [`PtpStream`] adds the two operations the
//! session needs beyond `Read + Write`: a second handle for cross-thread
//! shutdown, and the shutdown itself.

use std::io::{Read, Write};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Address {0} did not resolve to any socket address")]
    Unresolved(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bidirectional byte stream to the responder.
pub trait PtpStream: Read + Write + Send + 'static {
    /// A second handle to the same connection.
    fn try_clone(&self) -> Result<Self, TransportError>
    where
        Self: Sized;

    /// Shut down both directions, unblocking any pending read.
    fn shutdown(&self) -> Result<(), TransportError>;

    /// Peer description for logging.
    fn peer(&self) -> String {
        "unknown".to_string()
    }
}

/// Opens connections to a responder.
pub trait Connector {
    type Stream: PtpStream;

    fn connect(&self) -> Result<Self::Stream, TransportError>;
}

//! TCP transport.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info, instrument};

use super::traits::{Connector, PtpStream, TransportError};

impl PtpStream for TcpStream {
    fn try_clone(&self) -> Result<Self, TransportError> {
        Ok(TcpStream::try_clone(self)?)
    }

    fn shutdown(&self) -> Result<(), TransportError> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            Ok(()) => Ok(()),
            // Already closed by the peer.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn peer(&self) -> String {
        self.peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

/// Connects to a PTP/IP responder over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    /// `addr` is `host:port`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn connect_one(&self, addr: &SocketAddr) -> io::Result<TcpStream> {
        match self.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(addr, timeout),
            None => TcpStream::connect(addr),
        }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    #[instrument(level = "debug", skip(self), fields(addr = %self.addr))]
    fn connect(&self) -> Result<TcpStream, TransportError> {
        let addrs: Vec<SocketAddr> = self
            .addr
            .to_socket_addrs()
            .map_err(|source| TransportError::Connect {
                addr: self.addr.clone(),
                source,
            })?
            .collect();

        let mut last_err = None;
        for addr in &addrs {
            match self.connect_one(addr) {
                Ok(stream) => {
                    // Requests are small and latency-bound.
                    stream.set_nodelay(true)?;
                    info!(peer = %addr, "TCP connection established");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(peer = %addr, error = %e, "Connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(source) => Err(TransportError::Connect {
                addr: self.addr.clone(),
                source,
            }),
            None => Err(TransportError::Unresolved(self.addr.clone())),
        }
    }
}

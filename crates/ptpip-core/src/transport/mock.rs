//! Mock transport for testing.
//!
//! [`MockStream::pair`] returns two connected in-memory ends. Reads block
//! until bytes arrive or the pipe is shut down, like a socket.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use super::traits::{Connector, PtpStream, TransportError};

#[derive(Debug, Default)]
struct PipeState {
    buf: VecDeque<u8>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Pipe {
    state: Mutex<PipeState>,
    readable: Condvar,
}

impl Pipe {
    fn close(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed = true;
        self.readable.notify_all();
    }
}

/// One end of an in-memory duplex connection.
#[derive(Debug, Clone)]
pub struct MockStream {
    incoming: Arc<Pipe>,
    outgoing: Arc<Pipe>,
}

impl MockStream {
    /// Two connected ends: bytes written to one are read from the other.
    pub fn pair() -> (MockStream, MockStream) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());
        (
            MockStream {
                incoming: b_to_a.clone(),
                outgoing: a_to_b.clone(),
            },
            MockStream {
                incoming: a_to_b,
                outgoing: b_to_a,
            },
        )
    }

    /// Whether this end has been shut down (by either side).
    pub fn is_closed(&self) -> bool {
        self.incoming
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self
            .incoming
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while state.buf.is_empty() && !state.closed {
            state = self
                .incoming
                .readable
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let n = buf.len().min(state.buf.len());
        for (slot, byte) in buf.iter_mut().zip(state.buf.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self
            .outgoing
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock pipe closed"));
        }
        state.buf.extend(buf);
        self.outgoing.readable.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl PtpStream for MockStream {
    fn try_clone(&self) -> Result<Self, TransportError> {
        Ok(self.clone())
    }

    fn shutdown(&self) -> Result<(), TransportError> {
        self.incoming.close();
        self.outgoing.close();
        Ok(())
    }

    fn peer(&self) -> String {
        "mock".to_string()
    }
}

/// Hands out pre-built streams in order, one per `connect`.
#[derive(Debug, Default)]
pub struct MockConnector {
    streams: Mutex<VecDeque<MockStream>>,
}

impl MockConnector {
    pub fn new(streams: impl IntoIterator<Item = MockStream>) -> Self {
        Self {
            streams: Mutex::new(streams.into_iter().collect()),
        }
    }

    /// Streams not yet handed out.
    pub fn remaining(&self) -> usize {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Connector for MockConnector {
    type Stream = MockStream;

    fn connect(&self) -> Result<MockStream, TransportError> {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| TransportError::Connect {
                addr: "mock".to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "no mock stream queued"),
            })
    }
}

//! Inbound data-phase reassembly.
//!
//! A responder delivers data either as a single `Data` packet or as
//! `StartData`, zero or more `Data`, then `EndData`. Chunks are appended in
//! arrival order.

use tracing::{trace, warn};

use crate::protocol::constants::UNKNOWN_DATA_LENGTH;
use crate::protocol::{PacketType, ProtocolError};

/// Largest buffer reserved up front from an announced total length.
const MAX_PREALLOC: usize = 16 * 1024 * 1024;

/// Collects the data phase of one transaction.
#[derive(Debug)]
pub struct DataPhaseAssembler {
    transaction_id: u32,
    /// Announced total, `None` until StartData (or when unknown).
    expected: Option<u64>,
    started: bool,
    finished: bool,
    buf: Vec<u8>,
}

impl DataPhaseAssembler {
    pub fn new(transaction_id: u32) -> Self {
        Self {
            transaction_id,
            expected: None,
            started: false,
            finished: false,
            buf: Vec::new(),
        }
    }

    /// Handle StartData.
    pub fn start(&mut self, transaction_id: u32, total_length: u64) -> Result<(), ProtocolError> {
        self.check_transaction(transaction_id)?;
        if self.started || !self.buf.is_empty() {
            return Err(ProtocolError::DataPhase {
                packet: PacketType::StartData,
                reason: "data phase already started",
            });
        }
        self.started = true;
        if total_length != UNKNOWN_DATA_LENGTH {
            self.expected = Some(total_length);
            self.buf
                .reserve(usize::try_from(total_length).unwrap_or(usize::MAX).min(MAX_PREALLOC));
        }
        trace!(tx_id = transaction_id, total_length, "Data phase started");
        Ok(())
    }

    /// Handle a Data (`last == false`) or EndData (`last == true`) chunk.
    pub fn push(
        &mut self,
        transaction_id: u32,
        chunk: &[u8],
        last: bool,
    ) -> Result<(), ProtocolError> {
        let packet = if last {
            PacketType::EndData
        } else {
            PacketType::Data
        };
        self.check_transaction(transaction_id)?;
        if self.finished {
            return Err(ProtocolError::DataPhase {
                packet,
                reason: "data phase already ended",
            });
        }

        let received = (self.buf.len() + chunk.len()) as u64;
        if let Some(expected) = self.expected
            && received > expected
        {
            return Err(ProtocolError::DataOverrun { expected, received });
        }

        self.buf.extend_from_slice(chunk);
        if last {
            self.finished = true;
            if let Some(expected) = self.expected
                && received < expected
            {
                warn!(
                    tx_id = transaction_id,
                    expected, received, "Data phase ended short of announced length"
                );
            }
        }
        Ok(())
    }

    fn check_transaction(&self, transaction_id: u32) -> Result<(), ProtocolError> {
        if transaction_id != self.transaction_id {
            return Err(ProtocolError::TransactionMismatch {
                expected: self.transaction_id,
                actual: transaction_id,
            });
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn expected_len(&self) -> Option<u64> {
        self.expected
    }

    pub fn received_len(&self) -> usize {
        self.buf.len()
    }

    pub fn into_data(self) -> Vec<u8> {
        self.buf
    }
}

//! Crate-level error type.
//!
//! Errors fall into four families: malformed input and truncated streams
//! ([`CodecError`]), protocol violations ([`ProtocolError`]), raw transport
//! failures ([`TransportError`]), and session misuse.

use std::io;

use thiserror::Error;

use crate::codec::CodecError;
use crate::protocol::{OperationCode, ProtocolError, ResponseCode};
use crate::state::SessionState;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum PtpError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{operation} failed with {code}")]
    ResponseNotOk {
        operation: OperationCode,
        code: ResponseCode,
    },

    #[error("Session is {actual}, operation requires {required}")]
    InvalidState {
        actual: SessionState,
        required: SessionState,
    },
}

impl From<io::Error> for PtpError {
    fn from(err: io::Error) -> Self {
        PtpError::Transport(TransportError::Io(err))
    }
}

impl PtpError {
    /// True when the underlying stream cannot deliver further packets.
    pub fn is_fatal_to_stream(&self) -> bool {
        match self {
            PtpError::Transport(_) => true,
            PtpError::Codec(CodecError::EndOfStream { .. } | CodecError::Io(_)) => true,
            PtpError::Protocol(err) => err.breaks_framing(),
            _ => false,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, PtpError::Codec(err) if err.is_end_of_stream())
    }
}

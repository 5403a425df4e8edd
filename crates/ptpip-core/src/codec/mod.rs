//! Codec module - PTP primitive wire types.
//!
//! All PTP integers are little-endian with a fixed width. Arrays carry a
//! 4-byte element count, strings are null-terminated UTF-16LE.

pub mod int;
pub mod reader;
pub mod string;

pub use int::{
    Int8, Int16, Int32, Int64, Int128, PtpArray, UInt8, UInt16, UInt32, UInt64, UInt128, WireInt,
};
pub use reader::{DataReader, DataWriter};
pub use string::PtpString;

use std::io;
use thiserror::Error;

/// Errors raised while encoding or decoding primitive PTP values.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Value {value} out of range for {what}")]
    OutOfRange { what: &'static str, value: String },

    #[error("Wrong length for {what}: expected {expected}, got {actual}")]
    WrongLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("End of stream while reading {what}")]
    EndOfStream { what: &'static str },

    #[error("String is not terminated by a final U+0000")]
    MissingTerminator,

    #[error("String is not valid UTF-16")]
    InvalidUtf16,

    #[error("Array of {count} elements exceeds the 32-bit element count")]
    TooManyElements { count: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Map a read failure, keeping short reads distinct from other I/O errors.
    pub(crate) fn from_read(err: io::Error, what: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            CodecError::EndOfStream { what }
        } else {
            CodecError::Io(err)
        }
    }

    /// True when the input simply ran out of bytes.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, CodecError::EndOfStream { .. })
    }
}

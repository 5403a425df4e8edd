//! Sequential readers and writers over data-phase buffers.
//!
//! Dataset decoders (DeviceInfo, ObjectInfo, ...) are built purely from
//! these primitives; they know nothing about packets or sessions.

use std::io::Cursor;

use super::int::{PtpArray, UInt8, UInt16, UInt32, UInt64, UInt128, WireInt};
use super::string::{self, PtpString};
use super::CodecError;

/// Reads PTP primitives in order from a byte buffer.
#[derive(Debug)]
pub struct DataReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> DataReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(UInt8::read_from(&mut self.cursor)?.value())
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(UInt16::read_from(&mut self.cursor)?.value())
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(UInt32::read_from(&mut self.cursor)?.value())
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(UInt64::read_from(&mut self.cursor)?.value())
    }

    pub fn read_u128(&mut self) -> Result<u128, CodecError> {
        Ok(UInt128::read_from(&mut self.cursor)?.value())
    }

    /// Read any width-typed integer.
    pub fn read<T: WireInt>(&mut self) -> Result<T, CodecError> {
        T::read_from(&mut self.cursor)
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        Ok(PtpString::read_from(&mut self.cursor)?.into_string())
    }

    pub fn read_array<T: WireInt>(&mut self) -> Result<PtpArray<T>, CodecError> {
        PtpArray::read_from(&mut self.cursor)
    }

    pub fn read_u16_array(&mut self) -> Result<Vec<u16>, CodecError> {
        Ok(self.read_array::<UInt16>()?.values())
    }

    pub fn read_u32_array(&mut self) -> Result<Vec<u32>, CodecError> {
        Ok(self.read_array::<UInt32>()?.values())
    }

    /// Skip `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<(), CodecError> {
        if self.remaining() < len {
            return Err(CodecError::EndOfStream { what: "skipped bytes" });
        }
        self.cursor.set_position(self.cursor.position() + len as u64);
        Ok(())
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    /// Unread tail of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        let data: &'a [u8] = *self.cursor.get_ref();
        &data[self.position().min(data.len())..]
    }
}

/// Builds a buffer of PTP primitives in order.
#[derive(Debug, Default, Clone)]
pub struct DataWriter {
    buf: Vec<u8>,
}

impl DataWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_u128(&mut self, value: u128) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put<T: WireInt>(&mut self, value: T) -> &mut Self {
        self.buf.extend_from_slice(&value.to_bytes());
        self
    }

    pub fn put_string(&mut self, text: &str) -> &mut Self {
        self.buf.extend_from_slice(&string::encode(text));
        self
    }

    pub fn put_array<T: WireInt>(&mut self, array: &PtpArray<T>) -> &mut Self {
        self.buf.extend_from_slice(&array.to_bytes());
        self
    }

    /// Write a `UINT16` array; fails only past the 32-bit element count.
    pub fn put_u16_array(&mut self, values: &[u16]) -> Result<&mut Self, CodecError> {
        let array = PtpArray::<UInt16>::from_values(values.iter().copied())?;
        Ok(self.put_array(&array))
    }

    pub fn put_u32_array(&mut self, values: &[u32]) -> Result<&mut Self, CodecError> {
        let array = PtpArray::<UInt32>::from_values(values.iter().copied())?;
        Ok(self.put_array(&array))
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

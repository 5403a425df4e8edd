//! Width-typed PTP integers and length-prefixed arrays.
//!
//! Each PTP integer type (`INT8` .. `UINT128`) is an immutable newtype over
//! the matching native integer. The wire form is exactly `WIDTH` bytes,
//! little-endian. Construction from a wider value is range-checked.

use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::CodecError;

/// Upper bound on elements reserved up front when decoding an array.
///
/// The declared count comes from the peer, so larger arrays grow as
/// elements actually arrive.
const MAX_PREALLOC: usize = 4096;

/// A fixed-width little-endian PTP integer.
pub trait WireInt: Copy + Eq + Ord + fmt::Debug + Sized {
    /// Native Rust integer carried by this type.
    type Native: Copy;

    /// Wire width in bytes.
    const WIDTH: usize;

    /// PTP datatype name, used in error messages.
    const NAME: &'static str;

    /// Numeric value.
    fn value(self) -> Self::Native;

    /// Encoded bytes (always `WIDTH` long).
    fn to_bytes(&self) -> Vec<u8>;

    /// Read exactly `WIDTH` bytes from a stream.
    fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, CodecError>;

    /// Write the `WIDTH`-byte encoding to a stream.
    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()>;

    /// Decode from a buffer whose length must equal `WIDTH`.
    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != Self::WIDTH {
            return Err(CodecError::WrongLength {
                what: Self::NAME,
                expected: Self::WIDTH,
                actual: bytes.len(),
            });
        }
        let mut cursor = bytes;
        Self::read_from(&mut cursor)
    }
}

macro_rules! wire_int {
    ($(#[$meta:meta])* $name:ident($native:ty), $ptp:literal, $read:ident, $write:ident $(, $endian:ty)?) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name($native);

        impl $name {
            pub const MIN: Self = Self(<$native>::MIN);
            pub const MAX: Self = Self(<$native>::MAX);

            pub const fn new(value: $native) -> Self {
                Self(value)
            }

            /// Range-checked construction from a signed value.
            pub fn from_i128(value: i128) -> Result<Self, CodecError> {
                <$native>::try_from(value)
                    .map(Self)
                    .map_err(|_| CodecError::OutOfRange {
                        what: $ptp,
                        value: value.to_string(),
                    })
            }

            /// Range-checked construction from an unsigned value.
            pub fn from_u128(value: u128) -> Result<Self, CodecError> {
                <$native>::try_from(value)
                    .map(Self)
                    .map_err(|_| CodecError::OutOfRange {
                        what: $ptp,
                        value: value.to_string(),
                    })
            }
        }

        impl WireInt for $name {
            type Native = $native;
            const WIDTH: usize = std::mem::size_of::<$native>();
            const NAME: &'static str = $ptp;

            fn value(self) -> $native {
                self.0
            }

            fn to_bytes(&self) -> Vec<u8> {
                self.0.to_le_bytes().to_vec()
            }

            fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, CodecError> {
                reader
                    .$read$(::<$endian>)?()
                    .map(Self)
                    .map_err(|e| CodecError::from_read(e, $ptp))
            }

            fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
                writer.$write$(::<$endian>)?(self.0)
            }
        }

        impl From<$native> for $name {
            fn from(value: $native) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $native {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $ptp, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

wire_int!(/// PTP `INT8`.
    Int8(i8), "INT8", read_i8, write_i8);
wire_int!(/// PTP `UINT8`.
    UInt8(u8), "UINT8", read_u8, write_u8);
wire_int!(/// PTP `INT16`.
    Int16(i16), "INT16", read_i16, write_i16, LittleEndian);
wire_int!(/// PTP `UINT16`.
    UInt16(u16), "UINT16", read_u16, write_u16, LittleEndian);
wire_int!(/// PTP `INT32`.
    Int32(i32), "INT32", read_i32, write_i32, LittleEndian);
wire_int!(/// PTP `UINT32`.
    UInt32(u32), "UINT32", read_u32, write_u32, LittleEndian);
wire_int!(/// PTP `INT64`.
    Int64(i64), "INT64", read_i64, write_i64, LittleEndian);
wire_int!(/// PTP `UINT64`.
    UInt64(u64), "UINT64", read_u64, write_u64, LittleEndian);
wire_int!(/// PTP `INT128`.
    Int128(i128), "INT128", read_i128, write_i128, LittleEndian);
wire_int!(/// PTP `UINT128`.
    UInt128(u128), "UINT128", read_u128, write_u128, LittleEndian);

/// PTP array: 4-byte unsigned element count followed by the elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PtpArray<T> {
    items: Vec<T>,
}

impl<T: WireInt> PtpArray<T> {
    /// Wrap elements; fails if the count does not fit the 32-bit prefix.
    pub fn new(items: Vec<T>) -> Result<Self, CodecError> {
        if u32::try_from(items.len()).is_err() {
            return Err(CodecError::TooManyElements { count: items.len() });
        }
        Ok(Self { items })
    }

    /// Build from native values.
    pub fn from_values<I>(values: I) -> Result<Self, CodecError>
    where
        I: IntoIterator,
        I::Item: Into<T>,
    {
        Self::new(values.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    /// Native values in wire order.
    pub fn values(&self) -> Vec<T::Native> {
        self.items.iter().map(|item| item.value()).collect()
    }

    /// Encoded size: count prefix plus elements.
    pub fn encoded_len(&self) -> usize {
        4 + self.items.len() * T::WIDTH
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut buf);
        buf
    }

    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        // `new` guarantees the count fits.
        writer.write_u32::<LittleEndian>(self.items.len() as u32)?;
        for item in &self.items {
            item.write_to(writer)?;
        }
        Ok(())
    }

    /// Decode from a buffer. Bytes past the declared count are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = bytes;
        Self::read_from(&mut cursor)
    }

    /// Decode from a stream, consuming exactly `4 + count * WIDTH` bytes.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, CodecError> {
        let count = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| CodecError::from_read(e, "array count"))? as usize;
        let mut items = Vec::with_capacity(count.min(MAX_PREALLOC));
        for _ in 0..count {
            items.push(T::read_from(reader)?);
        }
        Ok(Self { items })
    }
}

impl<T> IntoIterator for PtpArray<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a PtpArray<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

//! PTP datasets carried in data phases.
//!
//! Each dataset is a fixed sequence of primitives read with
//! [`DataReader`] and written with [`DataWriter`].

mod device_info;
mod object_info;
mod storage_info;

pub use device_info::DeviceInfo;
pub use object_info::ObjectInfo;
pub use storage_info::StorageInfo;

use crate::codec::{CodecError, DataReader, DataWriter};

/// A record decoded from, or encoded into, a data phase.
pub trait Dataset: Sized {
    fn read(reader: &mut DataReader<'_>) -> Result<Self, CodecError>;

    fn write(&self, writer: &mut DataWriter) -> Result<(), CodecError>;

    /// Decode from a complete data-phase buffer. Trailing bytes are ignored.
    fn decode(data: &[u8]) -> Result<Self, CodecError> {
        Self::read(&mut DataReader::new(data))
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut writer = DataWriter::new();
        self.write(&mut writer)?;
        Ok(writer.into_bytes())
    }
}

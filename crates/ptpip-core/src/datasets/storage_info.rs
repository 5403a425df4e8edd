use serde::Serialize;

use super::Dataset;
use crate::codec::{CodecError, DataReader, DataWriter};

/// One storage (card, internal memory) as reported by GetStorageInfo.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StorageInfo {
    pub storage_type: u16,
    pub filesystem_type: u16,
    pub access_capability: u16,
    pub max_capacity: u64,
    pub free_space_in_bytes: u64,
    /// 0xFFFFFFFF when the responder does not report it.
    pub free_space_in_images: u32,
    pub storage_description: String,
    pub volume_label: String,
}

impl StorageInfo {
    pub fn is_read_only(&self) -> bool {
        self.access_capability != 0
    }
}

impl Dataset for StorageInfo {
    fn read(r: &mut DataReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            storage_type: r.read_u16()?,
            filesystem_type: r.read_u16()?,
            access_capability: r.read_u16()?,
            max_capacity: r.read_u64()?,
            free_space_in_bytes: r.read_u64()?,
            free_space_in_images: r.read_u32()?,
            storage_description: r.read_string()?,
            volume_label: r.read_string()?,
        })
    }

    fn write(&self, w: &mut DataWriter) -> Result<(), CodecError> {
        w.put_u16(self.storage_type)
            .put_u16(self.filesystem_type)
            .put_u16(self.access_capability)
            .put_u64(self.max_capacity)
            .put_u64(self.free_space_in_bytes)
            .put_u32(self.free_space_in_images)
            .put_string(&self.storage_description)
            .put_string(&self.volume_label);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_prefix_layout() {
        let info = StorageInfo {
            storage_type: 4,
            filesystem_type: 2,
            access_capability: 0,
            max_capacity: 32 << 30,
            free_space_in_bytes: 1 << 30,
            free_space_in_images: 0xFFFF_FFFF,
            storage_description: "SD".into(),
            volume_label: String::new(),
        };
        let bytes = info.encode().unwrap();
        // 3 x u16, 2 x u64, u32, then "SD\0" and "\0" as UTF-16.
        assert_eq!(bytes.len(), 6 + 16 + 4 + 6 + 2);
        assert_eq!(StorageInfo::decode(&bytes).unwrap(), info);
        assert!(!info.is_read_only());
    }
}

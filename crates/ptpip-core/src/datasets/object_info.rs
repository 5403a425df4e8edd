use serde::Serialize;

use super::Dataset;
use crate::codec::{CodecError, DataReader, DataWriter};

/// Object format code for associations (folders).
pub const FORMAT_ASSOCIATION: u16 = 0x3001;

/// Metadata for one object (GetObjectInfo).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ObjectInfo {
    pub storage_id: u32,
    pub object_format: u16,
    pub protection_status: u16,
    pub object_compressed_size: u32,
    pub thumb_format: u16,
    pub thumb_compressed_size: u32,
    pub thumb_pix_width: u32,
    pub thumb_pix_height: u32,
    pub image_pix_width: u32,
    pub image_pix_height: u32,
    pub image_bit_depth: u32,
    pub parent_object: u32,
    pub association_type: u16,
    pub association_desc: u32,
    pub sequence_number: u32,
    pub filename: String,
    /// ISO 8601 basic form, e.g. `20240131T235959`.
    pub capture_date: String,
    pub modification_date: String,
    pub keywords: String,
}

impl ObjectInfo {
    pub fn is_association(&self) -> bool {
        self.object_format == FORMAT_ASSOCIATION
    }
}

impl Dataset for ObjectInfo {
    fn read(r: &mut DataReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            storage_id: r.read_u32()?,
            object_format: r.read_u16()?,
            protection_status: r.read_u16()?,
            object_compressed_size: r.read_u32()?,
            thumb_format: r.read_u16()?,
            thumb_compressed_size: r.read_u32()?,
            thumb_pix_width: r.read_u32()?,
            thumb_pix_height: r.read_u32()?,
            image_pix_width: r.read_u32()?,
            image_pix_height: r.read_u32()?,
            image_bit_depth: r.read_u32()?,
            parent_object: r.read_u32()?,
            association_type: r.read_u16()?,
            association_desc: r.read_u32()?,
            sequence_number: r.read_u32()?,
            filename: r.read_string()?,
            capture_date: r.read_string()?,
            modification_date: r.read_string()?,
            keywords: r.read_string()?,
        })
    }

    fn write(&self, w: &mut DataWriter) -> Result<(), CodecError> {
        w.put_u32(self.storage_id)
            .put_u16(self.object_format)
            .put_u16(self.protection_status)
            .put_u32(self.object_compressed_size)
            .put_u16(self.thumb_format)
            .put_u32(self.thumb_compressed_size)
            .put_u32(self.thumb_pix_width)
            .put_u32(self.thumb_pix_height)
            .put_u32(self.image_pix_width)
            .put_u32(self.image_pix_height)
            .put_u32(self.image_bit_depth)
            .put_u32(self.parent_object)
            .put_u16(self.association_type)
            .put_u32(self.association_desc)
            .put_u32(self.sequence_number)
            .put_string(&self.filename)
            .put_string(&self.capture_date)
            .put_string(&self.modification_date)
            .put_string(&self.keywords);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_object_info() {
        let info = ObjectInfo {
            storage_id: 0x0001_0001,
            object_format: 0x3801,
            object_compressed_size: 4_500_000,
            image_pix_width: 6000,
            image_pix_height: 4000,
            image_bit_depth: 24,
            filename: "IMG_0001.JPG".into(),
            capture_date: "20240131T235959".into(),
            ..Default::default()
        };
        let bytes = info.encode().unwrap();
        let decoded = ObjectInfo::decode(&bytes).unwrap();
        assert_eq!(decoded.filename, "IMG_0001.JPG");
        assert_eq!(decoded, info);
        assert!(!decoded.is_association());
    }

    #[test]
    fn test_missing_strings_fail() {
        let mut w = DataWriter::new();
        w.put_u32(1).put_u16(0x3001);
        assert!(ObjectInfo::decode(&w.into_bytes()).unwrap_err().is_end_of_stream());
    }
}

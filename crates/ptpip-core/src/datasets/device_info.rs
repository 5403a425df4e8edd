use serde::Serialize;

use super::Dataset;
use crate::codec::{CodecError, DataReader, DataWriter};
use crate::protocol::{EventCode, OperationCode, PtpCode};

/// Responder capabilities and identity (GetDeviceInfo).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DeviceInfo {
    pub standard_version: u16,
    pub vendor_extension_id: u32,
    pub vendor_extension_version: u16,
    pub vendor_extension_desc: String,
    pub functional_mode: u16,
    pub operations_supported: Vec<u16>,
    pub events_supported: Vec<u16>,
    pub device_properties_supported: Vec<u16>,
    pub capture_formats: Vec<u16>,
    pub image_formats: Vec<u16>,
    pub manufacturer: String,
    pub model: String,
    pub device_version: String,
    pub serial_number: String,
}

impl DeviceInfo {
    pub fn supports_operation(&self, code: OperationCode) -> bool {
        self.operations_supported.contains(&code.code())
    }

    pub fn supports_event(&self, code: EventCode) -> bool {
        self.events_supported.contains(&code.code())
    }
}

impl Dataset for DeviceInfo {
    fn read(r: &mut DataReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            standard_version: r.read_u16()?,
            vendor_extension_id: r.read_u32()?,
            vendor_extension_version: r.read_u16()?,
            vendor_extension_desc: r.read_string()?,
            functional_mode: r.read_u16()?,
            operations_supported: r.read_u16_array()?,
            events_supported: r.read_u16_array()?,
            device_properties_supported: r.read_u16_array()?,
            capture_formats: r.read_u16_array()?,
            image_formats: r.read_u16_array()?,
            manufacturer: r.read_string()?,
            model: r.read_string()?,
            device_version: r.read_string()?,
            serial_number: r.read_string()?,
        })
    }

    fn write(&self, w: &mut DataWriter) -> Result<(), CodecError> {
        w.put_u16(self.standard_version)
            .put_u32(self.vendor_extension_id)
            .put_u16(self.vendor_extension_version)
            .put_string(&self.vendor_extension_desc)
            .put_u16(self.functional_mode);
        w.put_u16_array(&self.operations_supported)?
            .put_u16_array(&self.events_supported)?
            .put_u16_array(&self.device_properties_supported)?
            .put_u16_array(&self.capture_formats)?
            .put_u16_array(&self.image_formats)?;
        w.put_string(&self.manufacturer)
            .put_string(&self.model)
            .put_string(&self.device_version)
            .put_string(&self.serial_number);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeviceInfo {
        DeviceInfo {
            standard_version: 100,
            vendor_extension_id: 0x0000_000A,
            vendor_extension_version: 100,
            vendor_extension_desc: "vendor.example: 1.0".into(),
            functional_mode: 0,
            operations_supported: vec![0x1001, 0x1002, 0x1003, 0x1009, 0x100E],
            events_supported: vec![0x4002, 0x400D],
            device_properties_supported: vec![0x5001, 0x5003],
            capture_formats: vec![0x3801],
            image_formats: vec![0x3801, 0x3000],
            manufacturer: "Example".into(),
            model: "Camera Ω".into(),
            device_version: "1.2.3".into(),
            serial_number: "SN0001".into(),
        }
    }

    #[test]
    fn test_decode_matches_source() {
        let info = sample();
        let bytes = info.encode().unwrap();
        assert_eq!(&bytes[..2], &[100, 0]);
        assert_eq!(DeviceInfo::decode(&bytes).unwrap(), info);
    }

    #[test]
    fn test_truncated_is_end_of_stream() {
        let bytes = sample().encode().unwrap();
        let err = DeviceInfo::decode(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(err.is_end_of_stream());
    }

    #[test]
    fn test_capability_queries() {
        let info = sample();
        assert!(info.supports_operation(OperationCode::InitiateCapture));
        assert!(!info.supports_operation(OperationCode::FormatStore));
        assert!(info.supports_event(EventCode::CaptureComplete));
        assert!(!info.supports_event(EventCode::StoreFull));
    }
}

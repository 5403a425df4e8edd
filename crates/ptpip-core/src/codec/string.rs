//! PTP strings: UTF-16LE code units terminated by U+0000.
//!
//! The wire form carries no length prefix. The decoded value never
//! includes the terminator.

use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt};

use super::CodecError;

/// Immutable PTP string value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PtpString(String);

impl PtpString {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Encoded size in bytes, terminator included.
    pub fn encoded_len(&self) -> usize {
        (self.0.encode_utf16().count() + 1) * 2
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode(&self.0)
    }

    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// Read code units until U+0000.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, CodecError> {
        let mut units = Vec::new();
        loop {
            let unit = reader
                .read_u16::<LittleEndian>()
                .map_err(|e| CodecError::from_read(e, "string"))?;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        String::from_utf16(&units)
            .map(Self)
            .map_err(|_| CodecError::InvalidUtf16)
    }

    /// Decode a buffer whose final code unit must be the only terminator.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() % 2 != 0 {
            return Err(CodecError::WrongLength {
                what: "string",
                expected: bytes.len() + 1,
                actual: bytes.len(),
            });
        }
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        match units.iter().position(|&unit| unit == 0) {
            Some(end) if end + 1 == units.len() => String::from_utf16(&units[..end])
                .map(Self)
                .map_err(|_| CodecError::InvalidUtf16),
            _ => Err(CodecError::MissingTerminator),
        }
    }
}

/// Encode text as UTF-16LE plus terminator.
pub fn encode(text: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity((text.len() + 1) * 2);
    for unit in text.encode_utf16().chain(std::iter::once(0)) {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
    buf
}

impl From<&str> for PtpString {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for PtpString {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<PtpString> for String {
    fn from(value: PtpString) -> Self {
        value.0
    }
}

impl AsRef<str> for PtpString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PtpString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_string_is_just_terminator() {
        let s = PtpString::new("");
        assert_eq!(s.to_bytes(), vec![0, 0]);
        assert_eq!(PtpString::from_bytes(&[0, 0]).unwrap(), s);
    }

    #[test]
    fn test_ascii_layout() {
        assert_eq!(encode("test"), b"t\0e\0s\0t\0\0\0".to_vec());
    }

    #[test]
    fn test_multibyte_roundtrip() {
        // BMP characters and a surrogate pair.
        let text = "Kamera \u{00E9}\u{65E5}\u{672C} \u{1F4F7}";
        let s = PtpString::new(text);
        let bytes = s.to_bytes();
        assert_eq!(bytes.len(), s.encoded_len());

        let mut cursor = &bytes[..];
        assert_eq!(PtpString::read_from(&mut cursor).unwrap().as_str(), text);
        assert!(cursor.is_empty());
        assert_eq!(PtpString::from_bytes(&bytes).unwrap().as_str(), text);
    }

    #[test]
    fn test_stream_stops_at_terminator() {
        let mut wire = encode("ab");
        wire.extend_from_slice(&[0x11, 0x22]);
        let mut cursor = &wire[..];
        assert_eq!(PtpString::read_from(&mut cursor).unwrap().as_str(), "ab");
        assert_eq!(cursor, &[0x11, 0x22]);
    }

    #[test]
    fn test_missing_terminator_is_end_of_stream() {
        let mut cursor: &[u8] = b"a\0b\0";
        let err = PtpString::read_from(&mut cursor).unwrap_err();
        assert!(err.is_end_of_stream());
    }

    #[test]
    fn test_fixed_buffer_requires_final_terminator() {
        assert!(matches!(
            PtpString::from_bytes(b"a\0b\0").unwrap_err(),
            CodecError::MissingTerminator
        ));
        assert!(matches!(
            PtpString::from_bytes(b"a\0\0\0b\0\0\0").unwrap_err(),
            CodecError::MissingTerminator
        ));
        assert!(matches!(
            PtpString::from_bytes(b"a\0\0").unwrap_err(),
            CodecError::WrongLength { .. }
        ));
    }

    #[test]
    fn test_unpaired_surrogate_rejected() {
        let bytes = [0x00, 0xD8, 0x00, 0x00];
        assert!(matches!(
            PtpString::from_bytes(&bytes).unwrap_err(),
            CodecError::InvalidUtf16
        ));
    }
}

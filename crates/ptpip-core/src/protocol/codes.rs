//! PTP operation, response and event code tables.
//!
//! Each table is a closed enum of the PTP 1.0 standard codes plus an
//! `Unrecognized` variant. Vendor-extended codes are legal protocol values,
//! so lookup never fails.

use std::fmt;

/// A 16-bit PTP code.
pub trait PtpCode {
    fn code(&self) -> u16;

    fn class(&self) -> CodeClass {
        CodeClass::of(self.code())
    }

    fn is_vendor_extended(&self) -> bool {
        self.class().is_vendor_extended()
    }
}

/// Code range, identified by the top nibble of the 16-bit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeClass {
    Operation,
    Response,
    Event,
    VendorOperation,
    VendorResponse,
    VendorEvent,
    /// Any other range (formats, properties, reserved).
    Other,
}

impl CodeClass {
    pub const fn of(code: u16) -> Self {
        match code >> 12 {
            0x1 => CodeClass::Operation,
            0x2 => CodeClass::Response,
            0x4 => CodeClass::Event,
            0x9 => CodeClass::VendorOperation,
            0xA => CodeClass::VendorResponse,
            0xC => CodeClass::VendorEvent,
            _ => CodeClass::Other,
        }
    }

    pub fn is_vendor_extended(&self) -> bool {
        matches!(
            self,
            CodeClass::VendorOperation | CodeClass::VendorResponse | CodeClass::VendorEvent
        )
    }
}

macro_rules! ptp_codes {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal,)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)*
            /// Code outside the standard table (vendor-extended or reserved).
            Unrecognized(u16),
        }

        impl $name {
            /// Reverse lookup. Unknown codes map to `Unrecognized`.
            pub const fn from_code(code: u16) -> Self {
                match code {
                    $($code => $name::$variant,)*
                    other => $name::Unrecognized(other),
                }
            }

            /// Standard name, if this is a standard code.
            pub const fn name(&self) -> Option<&'static str> {
                match self {
                    $($name::$variant => Some(stringify!($variant)),)*
                    $name::Unrecognized(_) => None,
                }
            }
        }

        impl PtpCode for $name {
            fn code(&self) -> u16 {
                match self {
                    $($name::$variant => $code,)*
                    $name::Unrecognized(code) => *code,
                }
            }
        }

        impl From<u16> for $name {
            fn from(code: u16) -> Self {
                Self::from_code(code)
            }
        }

        impl From<$name> for u16 {
            fn from(value: $name) -> Self {
                value.code()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.name() {
                    Some(name) => write!(f, "{}(0x{:04X})", name, self.code()),
                    None => write!(f, "0x{:04X}", self.code()),
                }
            }
        }
    };
}

ptp_codes! {
    /// PTP operation codes (0x1000 range).
    OperationCode {
        Undefined = 0x1000,
        GetDeviceInfo = 0x1001,
        OpenSession = 0x1002,
        CloseSession = 0x1003,
        GetStorageIds = 0x1004,
        GetStorageInfo = 0x1005,
        GetNumObjects = 0x1006,
        GetObjectHandles = 0x1007,
        GetObjectInfo = 0x1008,
        GetObject = 0x1009,
        GetThumb = 0x100A,
        DeleteObject = 0x100B,
        SendObjectInfo = 0x100C,
        SendObject = 0x100D,
        InitiateCapture = 0x100E,
        FormatStore = 0x100F,
        ResetDevice = 0x1010,
        SelfTest = 0x1011,
        SetObjectProtection = 0x1012,
        PowerDown = 0x1013,
        GetDevicePropDesc = 0x1014,
        GetDevicePropValue = 0x1015,
        SetDevicePropValue = 0x1016,
        ResetDevicePropValue = 0x1017,
        TerminateOpenCapture = 0x1018,
        MoveObject = 0x1019,
        CopyObject = 0x101A,
        GetPartialObject = 0x101B,
        InitiateOpenCapture = 0x101C,
    }
}

ptp_codes! {
    /// PTP response codes (0x2000 range).
    ResponseCode {
        Undefined = 0x2000,
        Ok = 0x2001,
        GeneralError = 0x2002,
        SessionNotOpen = 0x2003,
        InvalidTransactionId = 0x2004,
        OperationNotSupported = 0x2005,
        ParameterNotSupported = 0x2006,
        IncompleteTransfer = 0x2007,
        InvalidStorageId = 0x2008,
        InvalidObjectHandle = 0x2009,
        DevicePropNotSupported = 0x200A,
        InvalidObjectFormatCode = 0x200B,
        StoreFull = 0x200C,
        ObjectWriteProtected = 0x200D,
        StoreReadOnly = 0x200E,
        AccessDenied = 0x200F,
        NoThumbnailPresent = 0x2010,
        SelfTestFailed = 0x2011,
        PartialDeletion = 0x2012,
        StoreNotAvailable = 0x2013,
        SpecificationByFormatUnsupported = 0x2014,
        NoValidObjectInfo = 0x2015,
        InvalidCodeFormat = 0x2016,
        UnknownVendorCode = 0x2017,
        CaptureAlreadyTerminated = 0x2018,
        DeviceBusy = 0x2019,
        InvalidParentObject = 0x201A,
        InvalidDevicePropFormat = 0x201B,
        InvalidDevicePropValue = 0x201C,
        InvalidParameter = 0x201D,
        SessionAlreadyOpen = 0x201E,
        TransactionCancelled = 0x201F,
        SpecificationOfDestinationUnsupported = 0x2020,
    }
}

ptp_codes! {
    /// PTP event codes (0x4000 range).
    EventCode {
        Undefined = 0x4000,
        CancelTransaction = 0x4001,
        ObjectAdded = 0x4002,
        ObjectRemoved = 0x4003,
        StoreAdded = 0x4004,
        StoreRemoved = 0x4005,
        DevicePropChanged = 0x4006,
        ObjectInfoChanged = 0x4007,
        DeviceInfoChanged = 0x4008,
        RequestObjectTransfer = 0x4009,
        StoreFull = 0x400A,
        DeviceReset = 0x400B,
        StorageInfoChanged = 0x400C,
        CaptureComplete = 0x400D,
        UnreportedStatus = 0x400E,
    }
}

impl ResponseCode {
    pub fn is_ok(&self) -> bool {
        *self == ResponseCode::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_roundtrip() {
        assert_eq!(OperationCode::from_code(0x1001), OperationCode::GetDeviceInfo);
        assert_eq!(OperationCode::GetDeviceInfo.code(), 0x1001);
        assert_eq!(ResponseCode::from_code(0x2001), ResponseCode::Ok);
        assert_eq!(EventCode::from_code(0x4002), EventCode::ObjectAdded);
        assert_eq!(u16::from(EventCode::CaptureComplete), 0x400D);
    }

    #[test]
    fn test_vendor_codes_are_not_errors() {
        let op = OperationCode::from_code(0x9201);
        assert_eq!(op, OperationCode::Unrecognized(0x9201));
        assert!(op.is_vendor_extended());
        assert_eq!(op.class(), CodeClass::VendorOperation);
        assert_eq!(op.to_string(), "0x9201");

        let event = EventCode::from_code(0xC101);
        assert_eq!(event.class(), CodeClass::VendorEvent);
        assert_eq!(ResponseCode::from_code(0xA001).class(), CodeClass::VendorResponse);
    }

    #[test]
    fn test_standard_classes() {
        assert_eq!(CodeClass::of(0x1002), CodeClass::Operation);
        assert_eq!(CodeClass::of(0x2019), CodeClass::Response);
        assert_eq!(CodeClass::of(0x4001), CodeClass::Event);
        assert_eq!(CodeClass::of(0x5001), CodeClass::Other);
        assert!(!ResponseCode::Ok.is_vendor_extended());
    }

    #[test]
    fn test_display() {
        assert_eq!(ResponseCode::Ok.to_string(), "Ok(0x2001)");
        assert_eq!(
            OperationCode::GetStorageIds.to_string(),
            "GetStorageIds(0x1004)"
        );
    }
}

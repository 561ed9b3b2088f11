//! Completion status reported by the link for GATT procedures

use super::constants::*;
use std::fmt;

/// ATT error codes as defined in the Bluetooth Core Specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttErrorCode {
    InvalidHandle,
    ReadNotPermitted,
    WriteNotPermitted,
    InvalidPdu,
    InsufficientAuthentication,
    RequestNotSupported,
    InvalidOffset,
    InsufficientAuthorization,
    PrepareQueueFull,
    AttributeNotFound,
    AttributeNotLong,
    InsufficientEncryptionKeySize,
    InvalidAttributeValueLength,
    Unlikely,
    InsufficientEncryption,
    UnsupportedGroupType,
    InsufficientResources,
    Unknown(u8),
}

impl From<u8> for AttErrorCode {
    fn from(code: u8) -> Self {
        match code {
            ATT_ERROR_INVALID_HANDLE => AttErrorCode::InvalidHandle,
            ATT_ERROR_READ_NOT_PERMITTED => AttErrorCode::ReadNotPermitted,
            ATT_ERROR_WRITE_NOT_PERMITTED => AttErrorCode::WriteNotPermitted,
            ATT_ERROR_INVALID_PDU => AttErrorCode::InvalidPdu,
            ATT_ERROR_INSUFFICIENT_AUTHENTICATION => AttErrorCode::InsufficientAuthentication,
            ATT_ERROR_REQUEST_NOT_SUPPORTED => AttErrorCode::RequestNotSupported,
            ATT_ERROR_INVALID_OFFSET => AttErrorCode::InvalidOffset,
            ATT_ERROR_INSUFFICIENT_AUTHORIZATION => AttErrorCode::InsufficientAuthorization,
            ATT_ERROR_PREPARE_QUEUE_FULL => AttErrorCode::PrepareQueueFull,
            ATT_ERROR_ATTRIBUTE_NOT_FOUND => AttErrorCode::AttributeNotFound,
            ATT_ERROR_ATTRIBUTE_NOT_LONG => AttErrorCode::AttributeNotLong,
            ATT_ERROR_INSUFFICIENT_ENCRYPTION_KEY_SIZE => {
                AttErrorCode::InsufficientEncryptionKeySize
            }
            ATT_ERROR_INVALID_ATTRIBUTE_VALUE_LENGTH => AttErrorCode::InvalidAttributeValueLength,
            ATT_ERROR_UNLIKELY => AttErrorCode::Unlikely,
            ATT_ERROR_INSUFFICIENT_ENCRYPTION => AttErrorCode::InsufficientEncryption,
            ATT_ERROR_UNSUPPORTED_GROUP_TYPE => AttErrorCode::UnsupportedGroupType,
            ATT_ERROR_INSUFFICIENT_RESOURCES => AttErrorCode::InsufficientResources,
            _ => AttErrorCode::Unknown(code),
        }
    }
}

impl From<AttErrorCode> for u8 {
    fn from(code: AttErrorCode) -> Self {
        match code {
            AttErrorCode::InvalidHandle => ATT_ERROR_INVALID_HANDLE,
            AttErrorCode::ReadNotPermitted => ATT_ERROR_READ_NOT_PERMITTED,
            AttErrorCode::WriteNotPermitted => ATT_ERROR_WRITE_NOT_PERMITTED,
            AttErrorCode::InvalidPdu => ATT_ERROR_INVALID_PDU,
            AttErrorCode::InsufficientAuthentication => ATT_ERROR_INSUFFICIENT_AUTHENTICATION,
            AttErrorCode::RequestNotSupported => ATT_ERROR_REQUEST_NOT_SUPPORTED,
            AttErrorCode::InvalidOffset => ATT_ERROR_INVALID_OFFSET,
            AttErrorCode::InsufficientAuthorization => ATT_ERROR_INSUFFICIENT_AUTHORIZATION,
            AttErrorCode::PrepareQueueFull => ATT_ERROR_PREPARE_QUEUE_FULL,
            AttErrorCode::AttributeNotFound => ATT_ERROR_ATTRIBUTE_NOT_FOUND,
            AttErrorCode::AttributeNotLong => ATT_ERROR_ATTRIBUTE_NOT_LONG,
            AttErrorCode::InsufficientEncryptionKeySize => {
                ATT_ERROR_INSUFFICIENT_ENCRYPTION_KEY_SIZE
            }
            AttErrorCode::InvalidAttributeValueLength => ATT_ERROR_INVALID_ATTRIBUTE_VALUE_LENGTH,
            AttErrorCode::Unlikely => ATT_ERROR_UNLIKELY,
            AttErrorCode::InsufficientEncryption => ATT_ERROR_INSUFFICIENT_ENCRYPTION,
            AttErrorCode::UnsupportedGroupType => ATT_ERROR_UNSUPPORTED_GROUP_TYPE,
            AttErrorCode::InsufficientResources => ATT_ERROR_INSUFFICIENT_RESOURCES,
            AttErrorCode::Unknown(code) => code,
        }
    }
}

/// Outcome of a discovery, read or write procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattStatus {
    Success,
    /// The peer answered with an ATT error response.
    Att(AttErrorCode),
    /// The local stack failed the procedure (timeout, link loss, ...).
    Transport(u16),
}

impl GattStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, GattStatus::Success)
    }

    /// Insufficient authentication or authorization. These are recovered by
    /// pairing and reissuing the rejected request.
    pub fn is_security_failure(&self) -> bool {
        matches!(
            self,
            GattStatus::Att(AttErrorCode::InsufficientAuthentication)
                | GattStatus::Att(AttErrorCode::InsufficientAuthorization)
        )
    }

    /// A discovery that matched nothing. Absence is not an error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GattStatus::Att(AttErrorCode::AttributeNotFound))
    }

    /// Success, or a discovery that simply came back empty.
    pub fn is_success_or_empty(&self) -> bool {
        self.is_success() || self.is_not_found()
    }
}

impl From<u8> for GattStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => GattStatus::Success,
            c => GattStatus::Att(AttErrorCode::from(c)),
        }
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GattStatus::Success => write!(f, "success"),
            GattStatus::Att(code) => write!(f, "ATT error {:?} (0x{:02x})", code, u8::from(*code)),
            GattStatus::Transport(code) => write!(f, "transport failure 0x{:04x}", code),
        }
    }
}

// ATT error codes carried in read, write and discovery confirmations
pub const ATT_ERROR_INVALID_HANDLE: u8 = 0x01;
pub const ATT_ERROR_READ_NOT_PERMITTED: u8 = 0x02;
pub const ATT_ERROR_WRITE_NOT_PERMITTED: u8 = 0x03;
pub const ATT_ERROR_INVALID_PDU: u8 = 0x04;
pub const ATT_ERROR_INSUFFICIENT_AUTHENTICATION: u8 = 0x05;
pub const ATT_ERROR_REQUEST_NOT_SUPPORTED: u8 = 0x06;
pub const ATT_ERROR_INVALID_OFFSET: u8 = 0x07;
pub const ATT_ERROR_INSUFFICIENT_AUTHORIZATION: u8 = 0x08;
pub const ATT_ERROR_PREPARE_QUEUE_FULL: u8 = 0x09;
pub const ATT_ERROR_ATTRIBUTE_NOT_FOUND: u8 = 0x0A;
pub const ATT_ERROR_ATTRIBUTE_NOT_LONG: u8 = 0x0B;
pub const ATT_ERROR_INSUFFICIENT_ENCRYPTION_KEY_SIZE: u8 = 0x0C;
pub const ATT_ERROR_INVALID_ATTRIBUTE_VALUE_LENGTH: u8 = 0x0D;
pub const ATT_ERROR_UNLIKELY: u8 = 0x0E;
pub const ATT_ERROR_INSUFFICIENT_ENCRYPTION: u8 = 0x0F;
pub const ATT_ERROR_UNSUPPORTED_GROUP_TYPE: u8 = 0x10;
pub const ATT_ERROR_INSUFFICIENT_RESOURCES: u8 = 0x11;

// Descriptor UUIDs
pub const CLIENT_CHAR_CONFIG_UUID: u16 = 0x2902;

// Client characteristic configuration value enabling notifications
pub const CCCD_NOTIFICATION: u16 = 0x0001;

// Address types
pub const PUBLIC_DEVICE_ADDRESS: u8 = 0x00;
pub const RANDOM_DEVICE_ADDRESS: u8 = 0x01;
pub const PUBLIC_IDENTITY_ADDRESS: u8 = 0x02;
pub const RANDOM_IDENTITY_ADDRESS: u8 = 0x03;

// Random address sub-types, held in the two most significant bits
pub const RANDOM_ADDRESS_SUBTYPE_MASK: u8 = 0xC0;
pub const RANDOM_ADDRESS_RESOLVABLE: u8 = 0x40;

// Preferred connection parameters requested once a device is configured
pub const PREFERRED_CONN_INTERVAL_MIN: u16 = 0x0010; // 20 ms
pub const PREFERRED_CONN_INTERVAL_MAX: u16 = 0x0010; // 20 ms
pub const PREFERRED_CONN_LATENCY: u16 = 0x003C; // 60 events
pub const PREFERRED_SUPERVISION_TIMEOUT: u16 = 0x03E8; // 10 s

// Advertising Data Types
pub const ADV_TYPE_FLAGS: u8 = 0x01;
pub const ADV_TYPE_16BIT_SERVICE_UUID_PARTIAL: u8 = 0x02;
pub const ADV_TYPE_16BIT_SERVICE_UUID_COMPLETE: u8 = 0x03;
pub const ADV_TYPE_128BIT_SERVICE_UUID_PARTIAL: u8 = 0x06;
pub const ADV_TYPE_128BIT_SERVICE_UUID_COMPLETE: u8 = 0x07;
pub const ADV_TYPE_SHORT_LOCAL_NAME: u8 = 0x08;
pub const ADV_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;

// HCI status codes
pub const HCI_SUCCESS: u8 = 0x00;
pub const HCI_REMOTE_USER_TERMINATED: u8 = 0x13;
pub const HCI_LOCAL_HOST_TERMINATED: u8 = 0x16;

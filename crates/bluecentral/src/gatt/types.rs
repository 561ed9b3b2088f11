//! Common types for GATT operations
//!
//! This module defines the common types used by the discovery and
//! configuration engines and by service descriptors.

use bitflags::bitflags;
use std::fmt;

/// UUID for GATT attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uuid {
    /// Bluetooth SIG assigned 16-bit UUID
    Uuid16(u16),
    /// Full 128-bit UUID, little-endian
    Uuid128([u8; 16]),
}

impl Uuid {
    /// Convert raw little-endian bytes to a UUID based on length
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            2 => Some(Uuid::Uuid16(u16::from_le_bytes([bytes[0], bytes[1]]))),
            16 => {
                let mut uuid = [0u8; 16];
                uuid.copy_from_slice(bytes);
                Some(Uuid::Uuid128(uuid))
            }
            _ => None,
        }
    }

    pub fn from_u16(uuid: u16) -> Self {
        Uuid::Uuid16(uuid)
    }

    pub fn from_u128(uuid: u128) -> Self {
        Uuid::Uuid128(uuid.to_le_bytes())
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            Uuid::Uuid16(uuid) => uuid.to_le_bytes().to_vec(),
            Uuid::Uuid128(uuid) => uuid.to_vec(),
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Uuid::Uuid16(uuid) => Some(*uuid),
            Uuid::Uuid128(_) => None,
        }
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uuid::Uuid16(uuid) => write!(f, "{:04x}", uuid),
            Uuid::Uuid128(uuid) => {
                let mut be = *uuid;
                be.reverse();
                let text = hex::encode(be);
                write!(
                    f,
                    "{}-{}-{}-{}-{}",
                    &text[0..8],
                    &text[8..12],
                    &text[12..16],
                    &text[16..20],
                    &text[20..32]
                )
            }
        }
    }
}

bitflags! {
    /// Characteristic properties as defined in the Bluetooth Core Specification
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CharacteristicProperties: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        const EXTENDED_PROPERTIES = 0x80;
    }
}

impl CharacteristicProperties {
    pub fn can_read(&self) -> bool {
        self.contains(Self::READ)
    }

    pub fn can_write(&self) -> bool {
        self.contains(Self::WRITE)
    }

    /// Whether the characteristic may carry a client configuration descriptor.
    pub fn can_notify_or_indicate(&self) -> bool {
        self.intersects(Self::NOTIFY | Self::INDICATE)
    }
}

/// An inclusive range of attribute handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandleRange {
    pub start: u16,
    pub end: u16,
}

impl HandleRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// A range is empty when it holds no valid handle.
    pub fn is_empty(&self) -> bool {
        self.start == 0 || self.start > self.end
    }

    pub fn contains(&self, handle: u16) -> bool {
        !self.is_empty() && handle >= self.start && handle <= self.end
    }
}

impl fmt::Display for HandleRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}..=0x{:04x}", self.start, self.end)
    }
}

/// Granularity of a `get_handles` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// The whole service range
    Service,
    /// The descriptor range following the next characteristic
    Characteristic,
}

/// Answer to a `get_handles` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleQuery {
    pub range: HandleRange,
    /// False once the service has no further characteristic to offer.
    pub more: bool,
}

impl HandleQuery {
    pub fn some(range: HandleRange) -> Self {
        Self { range, more: true }
    }

    pub fn none() -> Self {
        Self {
            range: HandleRange::default(),
            more: false,
        }
    }
}

/// Index of a device slot in the central.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceSlot(pub usize);

impl fmt::Display for DeviceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

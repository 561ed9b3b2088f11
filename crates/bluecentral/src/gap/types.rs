use crate::gap::constants::*;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    Public,
    Random,
    PublicIdentity,
    RandomIdentity,
}

impl From<u8> for AddressType {
    fn from(value: u8) -> Self {
        match value {
            PUBLIC_DEVICE_ADDRESS => AddressType::Public,
            RANDOM_DEVICE_ADDRESS => AddressType::Random,
            PUBLIC_IDENTITY_ADDRESS => AddressType::PublicIdentity,
            RANDOM_IDENTITY_ADDRESS => AddressType::RandomIdentity,
            _ => AddressType::Public,
        }
    }
}

impl From<AddressType> for u8 {
    fn from(value: AddressType) -> Self {
        match value {
            AddressType::Public => PUBLIC_DEVICE_ADDRESS,
            AddressType::Random => RANDOM_DEVICE_ADDRESS,
            AddressType::PublicIdentity => PUBLIC_IDENTITY_ADDRESS,
            AddressType::RandomIdentity => RANDOM_IDENTITY_ADDRESS,
        }
    }
}

/// A Bluetooth device address, stored little-endian as it travels over the air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() >= 6 {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(&slice[0..6]);
            Some(Self { bytes })
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// The most significant byte, which carries the random address sub-type.
    pub fn msb(&self) -> u8 {
        self.bytes[5]
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

impl FromStr for BdAddr {
    type Err = hex::FromHexError;

    /// Parses the `AA:BB:CC:DD:EE:FF` form printed by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != ':').collect();
        let mut bytes = [0u8; 6];
        hex::decode_to_slice(digits, &mut bytes)?;
        bytes.reverse();
        Ok(Self { bytes })
    }
}

/// A device address together with its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypedAddress {
    pub addr_type: AddressType,
    pub addr: BdAddr,
}

impl TypedAddress {
    pub fn new(addr_type: AddressType, addr: BdAddr) -> Self {
        Self { addr_type, addr }
    }

    pub fn public(addr: BdAddr) -> Self {
        Self::new(AddressType::Public, addr)
    }

    pub fn random(addr: BdAddr) -> Self {
        Self::new(AddressType::Random, addr)
    }

    pub fn is_random(&self) -> bool {
        matches!(
            self.addr_type,
            AddressType::Random | AddressType::RandomIdentity
        )
    }

    /// True for resolvable private addresses. Pairing with such a peer is
    /// left to the peer since its identity is only known after key
    /// distribution.
    pub fn is_resolvable_random(&self) -> bool {
        self.addr_type == AddressType::Random
            && self.addr.msb() & RANDOM_ADDRESS_SUBTYPE_MASK == RANDOM_ADDRESS_RESOLVABLE
    }
}

impl fmt::Display for TypedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.addr, self.addr_type)
    }
}

/// LE connection parameters, in controller units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Minimum connection interval (1.25 ms units)
    pub interval_min: u16,
    /// Maximum connection interval (1.25 ms units)
    pub interval_max: u16,
    /// Peripheral latency in connection events
    pub latency: u16,
    /// Supervision timeout (10 ms units)
    pub supervision_timeout: u16,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            interval_min: PREFERRED_CONN_INTERVAL_MIN,
            interval_max: PREFERRED_CONN_INTERVAL_MAX,
            latency: PREFERRED_CONN_LATENCY,
            supervision_timeout: PREFERRED_SUPERVISION_TIMEOUT,
        }
    }
}

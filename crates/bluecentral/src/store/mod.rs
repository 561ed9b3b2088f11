//! Bonded-device persistence
//!
//! Bonds live in a small byte-addressed store (flash, EEPROM, a file). The
//! layout is a 16-bit sanity marker followed by a fixed number of slots,
//! each holding a bonded flag and the peer's security keys.

mod bond;
mod keys;
mod memory;

#[cfg(test)]
mod tests;

pub use self::bond::{BondRecord, BondStore, EvictionPolicy, SANITY_MARKER, SLOT_SIZE};
pub use self::keys::{KeySet, LongTermKey, SecurityKeys, KEYS_SIZE};
pub use self::memory::MemoryStore;

use thiserror::Error;

/// Errors raised by the bond store and its backing storage
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Access of {len} bytes at offset {offset} is out of bounds")]
    OutOfBounds { offset: usize, len: usize },

    #[error("Store holds {available} bytes but the bond table needs {required}")]
    TooSmall { required: usize, available: usize },

    #[error("Invalid bond slot: {0}")]
    InvalidSlot(usize),

    #[error("All {0} bond slots are in use")]
    Full(usize),

    #[error("Keys carry no identity address")]
    MissingIdentity,

    #[error("Bond record I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte-addressed persistent storage.
pub trait PersistentStore {
    fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, StoreError>;

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StoreError>;

    /// Total addressable size in bytes.
    fn size(&self) -> usize;
}

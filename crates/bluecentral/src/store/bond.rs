use super::keys::{SecurityKeys, KEYS_SIZE};
use super::{PersistentStore, StoreError};
use crate::gap::TypedAddress;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};
use std::io::Cursor;

/// Written once at offset 0; anything else means the table is not trusted.
pub const SANITY_MARKER: u16 = 0xABAB;

const SANITY_OFFSET: usize = 0;
const SLOTS_OFFSET: usize = 2;
const BONDED_FLAG: u8 = 0x01;
const UNBONDED_FLAG: u8 = 0x00;

/// Bonded flag followed by the encoded keys.
pub const SLOT_SIZE: usize = 1 + KEYS_SIZE;

/// What to do when a new bond arrives and every slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Overwrite the last slot, dropping whichever peer held it.
    #[default]
    OverwriteLast,
    /// Refuse the new bond.
    Reject,
}

/// One bond table entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BondRecord {
    pub bonded: bool,
    pub keys: SecurityKeys,
}

impl BondRecord {
    pub fn new(keys: SecurityKeys) -> Self {
        Self { bonded: true, keys }
    }

    pub fn identity(&self) -> Option<&TypedAddress> {
        self.keys.identity.as_ref()
    }
}

/// Fixed-capacity bond table on top of a [`PersistentStore`].
#[derive(Debug)]
pub struct BondStore<S: PersistentStore> {
    store: S,
    slots: usize,
    policy: EvictionPolicy,
}

impl<S: PersistentStore> BondStore<S> {
    /// Open the table, resetting it when the sanity marker does not match.
    pub fn open(store: S, slots: usize, policy: EvictionPolicy) -> Result<Self, StoreError> {
        let required = SLOTS_OFFSET + slots * SLOT_SIZE;
        if store.size() < required {
            return Err(StoreError::TooSmall {
                required,
                available: store.size(),
            });
        }

        let mut bonds = Self {
            store,
            slots,
            policy,
        };
        bonds.check_sanity()?;
        Ok(bonds)
    }

    /// Returns false when the table had to be reset.
    fn check_sanity(&mut self) -> Result<bool, StoreError> {
        let raw = self.read_exact(SANITY_OFFSET, 2)?;
        let marker = LittleEndian::read_u16(&raw);
        if marker == SANITY_MARKER {
            debug!("Bond table sane, {} slots", self.slots);
            return Ok(true);
        }

        warn!(
            "Bond table marker is 0x{:04x}, expected 0x{:04x}; clearing {} slots",
            marker, SANITY_MARKER, self.slots
        );
        let mut raw = [0u8; 2];
        LittleEndian::write_u16(&mut raw, SANITY_MARKER);
        self.store.write(SANITY_OFFSET, &raw)?;
        self.reset_all()?;
        Ok(false)
    }

    /// Read from the backing store, rejecting short reads.
    fn read_exact(&self, offset: usize, len: usize) -> Result<Vec<u8>, StoreError> {
        let raw = self.store.read(offset, len)?;
        if raw.len() < len {
            return Err(StoreError::OutOfBounds { offset, len });
        }
        Ok(raw)
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    fn slot_offset(&self, slot: usize) -> Result<usize, StoreError> {
        if slot >= self.slots {
            return Err(StoreError::InvalidSlot(slot));
        }
        Ok(SLOTS_OFFSET + slot * SLOT_SIZE)
    }

    pub fn is_bonded(&self, slot: usize) -> Result<bool, StoreError> {
        let offset = self.slot_offset(slot)?;
        Ok(self.read_exact(offset, 1)?[0] == BONDED_FLAG)
    }

    /// Slot holding a bond for `address`, if any.
    pub fn find(&self, address: &TypedAddress) -> Result<Option<usize>, StoreError> {
        for slot in 0..self.slots {
            if !self.is_bonded(slot)? {
                continue;
            }
            if self.read(slot)?.identity() == Some(address) {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    /// An unbonded slot reads back as an empty record.
    pub fn read(&self, slot: usize) -> Result<BondRecord, StoreError> {
        let offset = self.slot_offset(slot)?;
        let raw = self.read_exact(offset, SLOT_SIZE)?;
        if raw[0] != BONDED_FLAG {
            return Ok(BondRecord::default());
        }
        let keys = SecurityKeys::decode(&mut Cursor::new(&raw[1..]))?;
        Ok(BondRecord { bonded: true, keys })
    }

    pub fn write(&mut self, slot: usize, record: &BondRecord) -> Result<(), StoreError> {
        let offset = self.slot_offset(slot)?;
        let mut raw = Vec::with_capacity(SLOT_SIZE);
        raw.push(if record.bonded {
            BONDED_FLAG
        } else {
            UNBONDED_FLAG
        });
        record.keys.encode(&mut raw)?;
        self.store.write(offset, &raw)
    }

    /// First free slot. When none is free the eviction policy decides.
    pub fn allocate_slot(&self) -> Result<usize, StoreError> {
        for slot in 0..self.slots {
            if !self.is_bonded(slot)? {
                return Ok(slot);
            }
        }
        match self.policy {
            EvictionPolicy::OverwriteLast if self.slots > 0 => {
                warn!("Bond table full, overwriting slot {}", self.slots - 1);
                Ok(self.slots - 1)
            }
            _ => Err(StoreError::Full(self.slots)),
        }
    }

    pub fn remove(&mut self, slot: usize) -> Result<(), StoreError> {
        let offset = self.slot_offset(slot)?;
        self.store.write(offset, &[UNBONDED_FLAG])
    }

    pub fn reset_all(&mut self) -> Result<(), StoreError> {
        for slot in 0..self.slots {
            self.remove(slot)?;
        }
        Ok(())
    }

    /// Persist a new bond. A peer that is already bonded keeps its slot and
    /// its stored keys.
    pub fn store_bond(&mut self, keys: &SecurityKeys) -> Result<usize, StoreError> {
        let identity = keys.identity.ok_or(StoreError::MissingIdentity)?;
        if let Some(slot) = self.find(&identity)? {
            debug!("{} already bonded in slot {}", identity, slot);
            return Ok(slot);
        }

        let slot = self.allocate_slot()?;
        self.write(slot, &BondRecord::new(keys.clone()))?;
        info!("Bonded {} in slot {}", identity, slot);
        Ok(slot)
    }

    pub fn get_ref(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

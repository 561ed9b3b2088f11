//! Unit tests for the bond table

use super::*;
use crate::gap::{AddressType, BdAddr, TypedAddress};
use rand::Rng;

fn store_for(slots: usize) -> MemoryStore {
    MemoryStore::new(2 + slots * SLOT_SIZE)
}

fn address(last: u8) -> TypedAddress {
    TypedAddress::public(BdAddr::new([last, 0x22, 0x33, 0x44, 0x55, 0x66]))
}

fn keys_for(identity: TypedAddress) -> SecurityKeys {
    SecurityKeys {
        key_set: KeySet::ENCRYPTION | KeySet::IDENTITY,
        identity: Some(identity),
        ltk: Some(LongTermKey::new([0x11; 16], 0x1234, [0x22; 8], false)),
        irk: Some([0x33; 16]),
        key_size: 16,
    }
}

#[test]
fn test_erased_store_gets_marker_and_empty_slots() {
    let bonds = BondStore::open(store_for(2), 2, EvictionPolicy::OverwriteLast).unwrap();

    assert_eq!(&bonds.get_ref().as_bytes()[0..2], &SANITY_MARKER.to_le_bytes());
    for slot in 0..2 {
        assert!(!bonds.is_bonded(slot).unwrap());
        assert_eq!(bonds.read(slot).unwrap(), BondRecord::default());
    }
    assert_eq!(bonds.find(&address(1)).unwrap(), None);
}

#[test]
fn test_bonds_survive_reopen() {
    let mut bonds = BondStore::open(store_for(2), 2, EvictionPolicy::OverwriteLast).unwrap();
    let slot = bonds.store_bond(&keys_for(address(1))).unwrap();
    assert_eq!(slot, 0);

    let bonds = BondStore::open(bonds.into_inner(), 2, EvictionPolicy::OverwriteLast).unwrap();
    assert_eq!(bonds.find(&address(1)).unwrap(), Some(0));
    assert_eq!(bonds.read(0).unwrap(), BondRecord::new(keys_for(address(1))));
}

#[test]
fn test_corrupt_marker_clears_table() {
    let mut bonds = BondStore::open(store_for(1), 1, EvictionPolicy::OverwriteLast).unwrap();
    bonds.store_bond(&keys_for(address(1))).unwrap();

    let mut store = bonds.into_inner();
    store.as_bytes_mut()[0] = 0x00;

    let bonds = BondStore::open(store, 1, EvictionPolicy::OverwriteLast).unwrap();
    assert!(!bonds.is_bonded(0).unwrap());
    assert_eq!(bonds.find(&address(1)).unwrap(), None);
    assert_eq!(&bonds.get_ref().as_bytes()[0..2], &SANITY_MARKER.to_le_bytes());
}

#[test]
fn test_store_too_small() {
    let result = BondStore::open(MemoryStore::new(10), 1, EvictionPolicy::Reject);
    assert!(matches!(
        result,
        Err(StoreError::TooSmall {
            required,
            available: 10
        }) if required == 2 + SLOT_SIZE
    ));
}

#[test]
fn test_full_table_overwrites_last_slot() {
    let mut bonds = BondStore::open(store_for(2), 2, EvictionPolicy::OverwriteLast).unwrap();
    assert_eq!(bonds.store_bond(&keys_for(address(1))).unwrap(), 0);
    assert_eq!(bonds.store_bond(&keys_for(address(2))).unwrap(), 1);
    assert_eq!(bonds.allocate_slot().unwrap(), 1);

    assert_eq!(bonds.store_bond(&keys_for(address(3))).unwrap(), 1);
    assert_eq!(bonds.find(&address(1)).unwrap(), Some(0));
    assert_eq!(bonds.find(&address(2)).unwrap(), None);
    assert_eq!(bonds.find(&address(3)).unwrap(), Some(1));
}

#[test]
fn test_full_table_rejects() {
    let mut bonds = BondStore::open(store_for(1), 1, EvictionPolicy::Reject).unwrap();
    bonds.store_bond(&keys_for(address(1))).unwrap();

    assert!(matches!(bonds.allocate_slot(), Err(StoreError::Full(1))));
    assert!(matches!(
        bonds.store_bond(&keys_for(address(2))),
        Err(StoreError::Full(1))
    ));
    assert_eq!(bonds.find(&address(1)).unwrap(), Some(0));
}

#[test]
fn test_already_bonded_keeps_stored_keys() {
    let mut bonds = BondStore::open(store_for(2), 2, EvictionPolicy::OverwriteLast).unwrap();
    let original = keys_for(address(1));
    bonds.store_bond(&original).unwrap();

    let mut replacement = original.clone();
    replacement.key_size = 7;
    assert_eq!(bonds.store_bond(&replacement).unwrap(), 0);
    assert_eq!(bonds.read(0).unwrap().keys, original);
    assert!(!bonds.is_bonded(1).unwrap());
}

#[test]
fn test_remove_and_reset() {
    let mut bonds = BondStore::open(store_for(2), 2, EvictionPolicy::OverwriteLast).unwrap();
    bonds.store_bond(&keys_for(address(1))).unwrap();
    bonds.store_bond(&keys_for(address(2))).unwrap();

    bonds.remove(0).unwrap();
    assert_eq!(bonds.find(&address(1)).unwrap(), None);
    assert_eq!(bonds.allocate_slot().unwrap(), 0);

    bonds.reset_all().unwrap();
    assert_eq!(bonds.find(&address(2)).unwrap(), None);
}

#[test]
fn test_invalid_slot_and_missing_identity() {
    let mut bonds = BondStore::open(store_for(1), 1, EvictionPolicy::OverwriteLast).unwrap();
    assert!(matches!(bonds.read(1), Err(StoreError::InvalidSlot(1))));
    assert!(matches!(
        bonds.write(3, &BondRecord::default()),
        Err(StoreError::InvalidSlot(3))
    ));

    let anonymous = SecurityKeys {
        identity: None,
        ..keys_for(address(1))
    };
    assert!(matches!(
        bonds.store_bond(&anonymous),
        Err(StoreError::MissingIdentity)
    ));
}

#[test]
fn test_random_keys_persist_exactly() {
    let mut rng = rand::thread_rng();
    let mut bonds = BondStore::open(store_for(4), 4, EvictionPolicy::Reject).unwrap();

    let mut stored = Vec::new();
    for slot in 0..4 {
        let mut addr = [0u8; 6];
        rng.fill(&mut addr);
        addr[0] = slot as u8;
        let mut key = [0u8; 16];
        rng.fill(&mut key);
        let mut rand_value = [0u8; 8];
        rng.fill(&mut rand_value);
        let mut irk = [0u8; 16];
        rng.fill(&mut irk);

        let keys = SecurityKeys {
            key_set: KeySet::ENCRYPTION | KeySet::IDENTITY,
            identity: Some(TypedAddress::new(AddressType::RandomIdentity, BdAddr::new(addr))),
            ltk: Some(LongTermKey::new(key, rng.gen(), rand_value, rng.gen())),
            irk: Some(irk),
            key_size: rng.gen_range(7..=16),
        };
        assert_eq!(bonds.store_bond(&keys).unwrap(), slot);
        stored.push(keys);
    }

    let bonds = BondStore::open(bonds.into_inner(), 4, EvictionPolicy::Reject).unwrap();
    for (slot, keys) in stored.iter().enumerate() {
        assert_eq!(&bonds.read(slot).unwrap().keys, keys);
        assert_eq!(bonds.find(keys.identity.as_ref().unwrap()).unwrap(), Some(slot));
    }
}

#[test]
fn test_long_term_key_hidden_from_debug() {
    let keys = keys_for(address(1));
    let printed = format!("{:?}", keys);
    assert!(!printed.contains(&hex::encode([0x11u8; 16])));
    assert!(printed.contains("ediv"));
}

/// Backing store that hands back at most `limit` bytes per read.
struct ShortReads {
    inner: MemoryStore,
    limit: usize,
}

impl PersistentStore for ShortReads {
    fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, StoreError> {
        let mut raw = self.inner.read(offset, len)?;
        raw.truncate(self.limit);
        Ok(raw)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StoreError> {
        self.inner.write(offset, data)
    }

    fn size(&self) -> usize {
        self.inner.size()
    }
}

#[test]
fn test_short_reads_are_rejected() {
    let empty = ShortReads {
        inner: store_for(1),
        limit: 0,
    };
    assert!(matches!(
        BondStore::open(empty, 1, EvictionPolicy::Reject),
        Err(StoreError::OutOfBounds { offset: 0, len: 2 })
    ));

    let truncated = ShortReads {
        inner: store_for(1),
        limit: 2,
    };
    let bonds = BondStore::open(truncated, 1, EvictionPolicy::Reject).unwrap();
    assert!(!bonds.is_bonded(0).unwrap());
    assert!(matches!(
        bonds.read(0),
        Err(StoreError::OutOfBounds { offset: 2, len }) if len == SLOT_SIZE
    ));
}

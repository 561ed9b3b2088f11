use super::{PersistentStore, StoreError};

/// Value of a freshly erased cell.
const ERASED: u8 = 0xFF;

/// RAM-backed store. Starts out erased, like new flash.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    bytes: Vec<u8>,
}

impl MemoryStore {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![ERASED; size],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn bounds(&self, offset: usize, len: usize) -> Result<std::ops::Range<usize>, StoreError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(offset..end),
            _ => Err(StoreError::OutOfBounds { offset, len }),
        }
    }
}

impl PersistentStore for MemoryStore {
    fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, StoreError> {
        let range = self.bounds(offset, len)?;
        Ok(self.bytes[range].to_vec())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StoreError> {
        let range = self.bounds(offset, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    fn size(&self) -> usize {
        self.bytes.len()
    }
}

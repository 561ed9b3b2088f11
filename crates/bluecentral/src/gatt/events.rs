//! Indications produced while walking a peer's attribute database

use super::types::{CharacteristicProperties, HandleRange, Uuid};

/// One primary service instance matching a discover-by-UUID request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryServiceFound {
    pub uuid: Uuid,
    pub range: HandleRange,
}

/// One characteristic declaration inside the current service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicFound {
    pub uuid: Uuid,
    pub declaration_handle: u16,
    pub value_handle: u16,
    pub properties: CharacteristicProperties,
}

/// One descriptor inside the range requested after a characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorFound {
    pub uuid: Uuid,
    pub handle: u16,
}

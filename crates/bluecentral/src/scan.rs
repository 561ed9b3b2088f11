//! Advertising data parsing
//!
//! Only what the connect filter needs: splitting the payload into AD
//! structures and collecting the service UUIDs they list.

use crate::gap::constants::*;
use crate::gatt::types::Uuid;

/// Parse advertisement data into (type, data) pairs
///
/// Parsing stops at the first zero-length or truncated structure.
pub fn parse_advertising_data(data: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i] as usize;
        if length == 0 || i + length >= data.len() {
            break;
        }

        let ad_type = data[i + 1];
        let ad_data = data[i + 2..i + 1 + length].to_vec();

        result.push((ad_type, ad_data));

        i += 1 + length;
    }

    result
}

/// Service UUIDs listed in the complete and incomplete 16-bit and 128-bit
/// service UUID structures.
pub fn service_uuids(data: &[u8]) -> Vec<Uuid> {
    let mut uuids = Vec::new();
    for (ad_type, payload) in parse_advertising_data(data) {
        let width = match ad_type {
            ADV_TYPE_16BIT_SERVICE_UUID_PARTIAL | ADV_TYPE_16BIT_SERVICE_UUID_COMPLETE => 2,
            ADV_TYPE_128BIT_SERVICE_UUID_PARTIAL | ADV_TYPE_128BIT_SERVICE_UUID_COMPLETE => 16,
            _ => continue,
        };
        uuids.extend(payload.chunks_exact(width).filter_map(Uuid::from_bytes));
    }
    uuids
}

/// The complete or shortened local name, if advertised.
pub fn local_name(data: &[u8]) -> Option<String> {
    parse_advertising_data(data)
        .into_iter()
        .find(|(ad_type, _)| {
            *ad_type == ADV_TYPE_COMPLETE_LOCAL_NAME || *ad_type == ADV_TYPE_SHORT_LOCAL_NAME
        })
        .map(|(_, name)| String::from_utf8_lossy(&name).into_owned())
}

//! Battery Service client

use crate::error::Result;
use crate::gatt::constants::CCCD_NOTIFICATION;
use crate::gatt::{
    AttributeRequester, CharacteristicFound, DescriptorFound, DeviceSlot, HandleKind, HandleQuery,
    PrimaryServiceFound, ServiceData, ServiceDescriptor, Uuid,
};
use log::{debug, info, warn};
use std::collections::HashMap;

pub const BATTERY_SERVICE_UUID: u16 = 0x180F;
pub const BATTERY_LEVEL_UUID: u16 = 0x2A19;

type LevelListener = Box<dyn FnMut(DeviceSlot, u8)>;

#[derive(Debug, Default)]
struct BatteryData {
    service: ServiceData,
    /// Next characteristic to configure
    config_cursor: usize,
    /// CCCD whose write is awaiting confirmation
    config_pending: Option<u16>,
    level: Option<u8>,
}

/// Reads the battery level after discovery and subscribes to its
/// notifications. Each new level is handed to the listener.
#[derive(Default)]
pub struct BatteryService {
    devices: HashMap<DeviceSlot, BatteryData>,
    listener: Option<LevelListener>,
    mandatory: bool,
}

impl BatteryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(mut self, listener: impl FnMut(DeviceSlot, u8) + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Refuse peers that do not expose the service.
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Last level reported by the peer in `slot`, in percent.
    pub fn level(&self, slot: DeviceSlot) -> Option<u8> {
        self.devices.get(&slot).and_then(|d| d.level)
    }

    fn update_level(&mut self, slot: DeviceSlot, handle: u16, value: &[u8]) {
        let Some(data) = self.devices.get_mut(&slot) else {
            return;
        };
        if data.service.characteristic_by_value(handle).is_none() {
            debug!("{}: 0x{:04x} is not a battery level", slot, handle);
            return;
        }
        let Some(&level) = value.first() else {
            warn!("{}: empty battery level", slot);
            return;
        };
        info!("{}: battery level {}%", slot, level);
        data.level = Some(level);
        if let Some(listener) = self.listener.as_mut() {
            listener(slot, level);
        }
    }
}

impl ServiceDescriptor for BatteryService {
    fn name(&self) -> &str {
        "Battery"
    }

    fn uuid(&self) -> Uuid {
        Uuid::Uuid16(BATTERY_SERVICE_UUID)
    }

    fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    fn init(&mut self, slot: DeviceSlot, service: &PrimaryServiceFound) {
        self.devices.insert(
            slot,
            BatteryData {
                service: ServiceData::new(service.range),
                ..BatteryData::default()
            },
        );
    }

    fn reset(&mut self, slot: DeviceSlot) {
        self.devices.remove(&slot);
    }

    fn found(&self, slot: DeviceSlot) -> bool {
        self.devices.contains_key(&slot)
    }

    fn handle_in_range(&self, slot: DeviceSlot, handle: u16) -> bool {
        self.devices
            .get(&slot)
            .is_some_and(|d| d.service.contains(handle))
    }

    fn get_handles(&mut self, slot: DeviceSlot, kind: HandleKind) -> HandleQuery {
        match self.devices.get_mut(&slot) {
            Some(data) => data.service.handles(kind),
            None => HandleQuery::none(),
        }
    }

    fn on_characteristic_found(&mut self, slot: DeviceSlot, characteristic: &CharacteristicFound) -> bool {
        if characteristic.uuid != Uuid::Uuid16(BATTERY_LEVEL_UUID) {
            return false;
        }
        match self.devices.get_mut(&slot) {
            Some(data) => {
                data.service.add_characteristic(characteristic);
                true
            }
            None => false,
        }
    }

    fn on_descriptor_found(&mut self, slot: DeviceSlot, descriptor: &DescriptorFound) {
        if let Some(data) = self.devices.get_mut(&slot) {
            data.service.add_descriptor(descriptor);
        }
    }

    /// Read the current level before moving on to the next service.
    fn on_discovery_complete(
        &mut self,
        slot: DeviceSlot,
        requester: &mut AttributeRequester<'_>,
    ) -> Result<bool> {
        let Some(data) = self.devices.get(&slot) else {
            return Ok(false);
        };
        let readable = data
            .service
            .characteristic(&Uuid::Uuid16(BATTERY_LEVEL_UUID))
            .filter(|c| c.properties.can_read());
        match readable {
            Some(level) => {
                requester.read(level.value_handle)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Enable notifications on every level characteristic, one write per
    /// call. Done once per connection.
    fn configure(&mut self, slot: DeviceSlot, requester: &mut AttributeRequester<'_>) -> Result<bool> {
        let Some(data) = self.devices.get_mut(&slot) else {
            return Ok(false);
        };
        while let Some(characteristic) = data.service.characteristics.get(data.config_cursor) {
            let Some(cccd) = characteristic.cccd else {
                data.config_cursor += 1;
                continue;
            };
            debug!("{}: enabling battery notifications via 0x{:04x}", slot, cccd);
            requester.write(cccd, &CCCD_NOTIFICATION.to_le_bytes())?;
            data.config_pending = Some(cccd);
            return Ok(true);
        }
        Ok(false)
    }

    fn on_notify(&mut self, slot: DeviceSlot, handle: u16, value: &[u8]) {
        self.update_level(slot, handle, value);
    }

    fn on_read_confirm(&mut self, slot: DeviceSlot, handle: u16, value: &[u8]) {
        self.update_level(slot, handle, value);
    }

    fn on_write_confirm(&mut self, slot: DeviceSlot, handle: u16) {
        if let Some(data) = self.devices.get_mut(&slot) {
            if data.config_pending == Some(handle) {
                data.config_pending = None;
                data.config_cursor += 1;
            }
        }
    }
}

//! Device Information Service client

use crate::error::Result;
use crate::gatt::{
    AttributeRequester, CharacteristicFound, DescriptorFound, DeviceSlot, HandleKind, HandleQuery,
    PrimaryServiceFound, ServiceData, ServiceDescriptor, Uuid,
};
use log::{debug, info};
use std::collections::HashMap;

pub const DEVICE_INFO_SERVICE_UUID: u16 = 0x180A;

/// Characteristics of the Device Information Service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceInfoField {
    ManufacturerName,
    ModelNumber,
    SerialNumber,
    HardwareRevision,
    FirmwareRevision,
    SoftwareRevision,
    SystemId,
    CertificationData,
    PnpId,
}

impl DeviceInfoField {
    pub const ALL: [DeviceInfoField; 9] = [
        DeviceInfoField::ManufacturerName,
        DeviceInfoField::ModelNumber,
        DeviceInfoField::SerialNumber,
        DeviceInfoField::HardwareRevision,
        DeviceInfoField::FirmwareRevision,
        DeviceInfoField::SoftwareRevision,
        DeviceInfoField::SystemId,
        DeviceInfoField::CertificationData,
        DeviceInfoField::PnpId,
    ];

    pub fn uuid(&self) -> u16 {
        match self {
            DeviceInfoField::ManufacturerName => 0x2A29,
            DeviceInfoField::ModelNumber => 0x2A24,
            DeviceInfoField::SerialNumber => 0x2A25,
            DeviceInfoField::HardwareRevision => 0x2A27,
            DeviceInfoField::FirmwareRevision => 0x2A26,
            DeviceInfoField::SoftwareRevision => 0x2A28,
            DeviceInfoField::SystemId => 0x2A23,
            DeviceInfoField::CertificationData => 0x2A2A,
            DeviceInfoField::PnpId => 0x2A50,
        }
    }

    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        let uuid = uuid.as_u16()?;
        Self::ALL.into_iter().find(|field| field.uuid() == uuid)
    }

    /// UTF-8 string fields, as opposed to binary ones.
    pub fn is_text(&self) -> bool {
        !matches!(
            self,
            DeviceInfoField::SystemId | DeviceInfoField::CertificationData | DeviceInfoField::PnpId
        )
    }
}

type FieldListener = Box<dyn FnMut(DeviceSlot, DeviceInfoField, &[u8])>;

#[derive(Debug, Default)]
struct DeviceInfoData {
    service: ServiceData,
    values: HashMap<DeviceInfoField, Vec<u8>>,
}

/// Reads every supported characteristic once the peer is configured.
///
/// Nothing here needs configuring; values are kept per device and handed
/// to the listener as they arrive.
#[derive(Default)]
pub struct DeviceInfoService {
    devices: HashMap<DeviceSlot, DeviceInfoData>,
    listener: Option<FieldListener>,
}

impl DeviceInfoService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(
        mut self,
        listener: impl FnMut(DeviceSlot, DeviceInfoField, &[u8]) + 'static,
    ) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn value(&self, slot: DeviceSlot, field: DeviceInfoField) -> Option<&[u8]> {
        self.devices
            .get(&slot)
            .and_then(|d| d.values.get(&field))
            .map(Vec::as_slice)
    }

    pub fn text(&self, slot: DeviceSlot, field: DeviceInfoField) -> Option<String> {
        self.value(slot, field)
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
    }
}

impl ServiceDescriptor for DeviceInfoService {
    fn name(&self) -> &str {
        "Device Information"
    }

    fn uuid(&self) -> Uuid {
        Uuid::Uuid16(DEVICE_INFO_SERVICE_UUID)
    }

    fn init(&mut self, slot: DeviceSlot, service: &PrimaryServiceFound) {
        self.devices.insert(
            slot,
            DeviceInfoData {
                service: ServiceData::new(service.range),
                values: HashMap::new(),
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
        if DeviceInfoField::from_uuid(&characteristic.uuid).is_none() {
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
        debug!("{}: ignoring descriptor {} at 0x{:04x}", slot, descriptor.uuid, descriptor.handle);
    }

    fn configure(&mut self, _slot: DeviceSlot, _requester: &mut AttributeRequester<'_>) -> Result<bool> {
        Ok(false)
    }

    fn on_notify(&mut self, slot: DeviceSlot, handle: u16, _value: &[u8]) {
        debug!("{}: unexpected notification on 0x{:04x}", slot, handle);
    }

    fn on_read_confirm(&mut self, slot: DeviceSlot, handle: u16, value: &[u8]) {
        let Some(data) = self.devices.get_mut(&slot) else {
            return;
        };
        let Some(field) = data
            .service
            .characteristic_by_value(handle)
            .and_then(|c| DeviceInfoField::from_uuid(&c.uuid))
        else {
            return;
        };

        if field.is_text() {
            info!("{}: {:?} = {}", slot, field, String::from_utf8_lossy(value));
        } else {
            info!("{}: {:?} = {}", slot, field, hex::encode(value));
        }
        data.values.insert(field, value.to_vec());
        if let Some(listener) = self.listener.as_mut() {
            listener(slot, field, value);
        }
    }

    fn initial_reads(&self, slot: DeviceSlot) -> Vec<u16> {
        self.devices
            .get(&slot)
            .map(|data| {
                data.service
                    .characteristics
                    .iter()
                    .filter(|c| c.properties.can_read())
                    .map(|c| c.value_handle)
                    .collect()
            })
            .unwrap_or_default()
    }
}

//! Test doubles shared by the unit tests

use crate::error::Result;
use crate::gap::{ConnectionParams, TypedAddress};
use crate::gatt::{
    AttributeRequester, CharacteristicFound, DescriptorFound, DeviceSlot, DiscoveredCharacteristic,
    HandleKind, HandleQuery, HandleRange, PrimaryServiceFound, ServiceData, ServiceDescriptor, Uuid,
};
use crate::link::{ConnectionId, LinkError, LinkLayer, ScanFilter};
use crate::store::SecurityKeys;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A request the code under test handed to the link stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRequest {
    DiscoverPrimary(ConnectionId, Uuid),
    DiscoverCharacteristics(ConnectionId, HandleRange),
    DiscoverDescriptors(ConnectionId, HandleRange),
    Read(ConnectionId, u16),
    Write(ConnectionId, u16, Vec<u8>),
    Connect(TypedAddress),
    CancelConnect,
    Disconnect(ConnectionId),
    ScanStart(ScanFilter),
    ScanStop,
    RequestSecurity(ConnectionId),
    KeyResponse(ConnectionId, Option<SecurityKeys>),
    UpdateParams(ConnectionId, ConnectionParams),
}

/// Mock link stack that records every request it accepts
#[derive(Debug, Default)]
pub struct MockLink {
    pub requests: Vec<LinkRequest>,
    /// Refuse the next request with this error
    pub refuse_next: Option<LinkError>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the recorded requests.
    pub fn take(&mut self) -> Vec<LinkRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn last(&self) -> Option<&LinkRequest> {
        self.requests.last()
    }

    pub fn count(&self, matches: impl Fn(&LinkRequest) -> bool) -> usize {
        self.requests.iter().filter(|r| matches(r)).count()
    }

    fn accept(&mut self, request: LinkRequest) -> std::result::Result<(), LinkError> {
        if let Some(err) = self.refuse_next.take() {
            return Err(err);
        }
        self.requests.push(request);
        Ok(())
    }
}

impl LinkLayer for MockLink {
    fn discover_primary_by_uuid(
        &mut self,
        conn: ConnectionId,
        uuid: Uuid,
    ) -> std::result::Result<(), LinkError> {
        self.accept(LinkRequest::DiscoverPrimary(conn, uuid))
    }

    fn discover_characteristics(
        &mut self,
        conn: ConnectionId,
        range: HandleRange,
    ) -> std::result::Result<(), LinkError> {
        self.accept(LinkRequest::DiscoverCharacteristics(conn, range))
    }

    fn discover_descriptors(
        &mut self,
        conn: ConnectionId,
        range: HandleRange,
    ) -> std::result::Result<(), LinkError> {
        self.accept(LinkRequest::DiscoverDescriptors(conn, range))
    }

    fn read_attribute(&mut self, conn: ConnectionId, handle: u16) -> std::result::Result<(), LinkError> {
        self.accept(LinkRequest::Read(conn, handle))
    }

    fn write_attribute(
        &mut self,
        conn: ConnectionId,
        handle: u16,
        value: &[u8],
    ) -> std::result::Result<(), LinkError> {
        self.accept(LinkRequest::Write(conn, handle, value.to_vec()))
    }

    fn connect(&mut self, address: TypedAddress) -> std::result::Result<(), LinkError> {
        self.accept(LinkRequest::Connect(address))
    }

    fn cancel_connect(&mut self) -> std::result::Result<(), LinkError> {
        self.accept(LinkRequest::CancelConnect)
    }

    fn disconnect(&mut self, conn: ConnectionId) -> std::result::Result<(), LinkError> {
        self.accept(LinkRequest::Disconnect(conn))
    }

    fn scan_start(&mut self, filter: &ScanFilter) -> std::result::Result<(), LinkError> {
        self.accept(LinkRequest::ScanStart(filter.clone()))
    }

    fn scan_stop(&mut self) -> std::result::Result<(), LinkError> {
        self.accept(LinkRequest::ScanStop)
    }

    fn request_security(&mut self, conn: ConnectionId) -> std::result::Result<(), LinkError> {
        self.accept(LinkRequest::RequestSecurity(conn))
    }

    fn key_request_response(
        &mut self,
        conn: ConnectionId,
        keys: Option<&SecurityKeys>,
    ) -> std::result::Result<(), LinkError> {
        self.accept(LinkRequest::KeyResponse(conn, keys.cloned()))
    }

    fn update_connection_params(
        &mut self,
        conn: ConnectionId,
        params: &ConnectionParams,
    ) -> std::result::Result<(), LinkError> {
        self.accept(LinkRequest::UpdateParams(conn, *params))
    }
}

/// What a [`TestService`] was told, readable after it is boxed into a
/// registry.
#[derive(Debug, Default)]
pub struct ServiceLog {
    pub characteristics: Vec<CharacteristicFound>,
    pub descriptors: Vec<DescriptorFound>,
    pub notifications: Vec<(DeviceSlot, u16, Vec<u8>)>,
    pub reads: Vec<(DeviceSlot, u16, Vec<u8>)>,
    pub writes: Vec<(DeviceSlot, u16)>,
    pub resets: Vec<DeviceSlot>,
    /// What the service held for a slot when its discovery completed
    pub completed: Vec<(DeviceSlot, HandleRange, Vec<DiscoveredCharacteristic>)>,
}

#[derive(Debug, Default)]
struct TestData {
    service: ServiceData,
    config_steps: usize,
}

/// Scriptable service descriptor. Accepts every characteristic, issues
/// `config_writes` configuration writes and optionally one read when its
/// discovery completes.
pub struct TestService {
    uuid: Uuid,
    mandatory: bool,
    config_writes: usize,
    discovery_read: bool,
    initial_reads: bool,
    devices: HashMap<DeviceSlot, TestData>,
    pub log: Rc<RefCell<ServiceLog>>,
}

impl TestService {
    pub fn new(uuid: u16) -> Self {
        Self {
            uuid: Uuid::Uuid16(uuid),
            mandatory: false,
            config_writes: 0,
            discovery_read: false,
            initial_reads: false,
            devices: HashMap::new(),
            log: Rc::new(RefCell::new(ServiceLog::default())),
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn config_writes(mut self, writes: usize) -> Self {
        self.config_writes = writes;
        self
    }

    pub fn discovery_read(mut self) -> Self {
        self.discovery_read = true;
        self
    }

    pub fn initial_reads(mut self) -> Self {
        self.initial_reads = true;
        self
    }

    /// Shared handle on the log, taken before the service is boxed.
    pub fn log(&self) -> Rc<RefCell<ServiceLog>> {
        Rc::clone(&self.log)
    }

    fn first_value_handle(&self, slot: DeviceSlot) -> Option<u16> {
        let data = self.devices.get(&slot)?;
        data.service
            .characteristics
            .first()
            .map(|c| c.value_handle)
            .or(Some(data.service.range.start))
    }
}

impl ServiceDescriptor for TestService {
    fn name(&self) -> &str {
        "Test"
    }

    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    fn init(&mut self, slot: DeviceSlot, service: &PrimaryServiceFound) {
        self.devices.insert(
            slot,
            TestData {
                service: ServiceData::new(service.range),
                config_steps: 0,
            },
        );
    }

    fn reset(&mut self, slot: DeviceSlot) {
        self.devices.remove(&slot);
        self.log.borrow_mut().resets.push(slot);
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
        self.log.borrow_mut().characteristics.push(characteristic.clone());
        match self.devices.get_mut(&slot) {
            Some(data) => {
                data.service.add_characteristic(characteristic);
                true
            }
            None => false,
        }
    }

    fn on_descriptor_found(&mut self, slot: DeviceSlot, descriptor: &DescriptorFound) {
        self.log.borrow_mut().descriptors.push(descriptor.clone());
        if let Some(data) = self.devices.get_mut(&slot) {
            data.service.add_descriptor(descriptor);
        }
    }

    fn on_discovery_complete(
        &mut self,
        slot: DeviceSlot,
        requester: &mut AttributeRequester<'_>,
    ) -> Result<bool> {
        if let Some(data) = self.devices.get(&slot) {
            self.log.borrow_mut().completed.push((
                slot,
                data.service.range,
                data.service.characteristics.clone(),
            ));
        }
        if !self.discovery_read {
            return Ok(false);
        }
        match self.first_value_handle(slot) {
            Some(handle) => {
                requester.read(handle)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn configure(&mut self, slot: DeviceSlot, requester: &mut AttributeRequester<'_>) -> Result<bool> {
        let Some(handle) = self.first_value_handle(slot) else {
            return Ok(false);
        };
        let limit = self.config_writes;
        let Some(data) = self.devices.get_mut(&slot) else {
            return Ok(false);
        };
        if data.config_steps >= limit {
            return Ok(false);
        }
        requester.write(handle, &[data.config_steps as u8])?;
        data.config_steps += 1;
        Ok(true)
    }

    fn on_notify(&mut self, slot: DeviceSlot, handle: u16, value: &[u8]) {
        self.log
            .borrow_mut()
            .notifications
            .push((slot, handle, value.to_vec()));
    }

    fn on_read_confirm(&mut self, slot: DeviceSlot, handle: u16, value: &[u8]) {
        self.log.borrow_mut().reads.push((slot, handle, value.to_vec()));
    }

    fn on_write_confirm(&mut self, slot: DeviceSlot, handle: u16) {
        self.log.borrow_mut().writes.push((slot, handle));
    }

    fn initial_reads(&self, slot: DeviceSlot) -> Vec<u16> {
        if !self.initial_reads {
            return Vec::new();
        }
        self.first_value_handle(slot).into_iter().collect()
    }
}

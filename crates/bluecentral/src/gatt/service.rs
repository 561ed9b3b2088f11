//! The service descriptor plug-in interface
//!
//! Each supported GATT service is one [`ServiceDescriptor`] registered with
//! the central. The same instance serves every device slot, so anything it
//! learns about a peer is kept per [`DeviceSlot`].

use super::constants::CLIENT_CHAR_CONFIG_UUID;
use super::events::{CharacteristicFound, DescriptorFound, PrimaryServiceFound};
use super::registry::ServiceId;
use super::session::{AttributeOp, Outstanding, ProcedureTracker};
use super::types::{
    CharacteristicProperties, DeviceSlot, HandleKind, HandleQuery, HandleRange, Uuid,
};
use crate::error::Result;
use crate::link::{ConnectionId, LinkLayer};
use log::trace;

pub trait ServiceDescriptor {
    fn name(&self) -> &str;

    fn uuid(&self) -> Uuid;

    /// A peer lacking a mandatory service is disconnected.
    fn is_mandatory(&self) -> bool {
        false
    }

    /// Start tracking a service instance found on the peer.
    fn init(&mut self, slot: DeviceSlot, service: &PrimaryServiceFound);

    /// Forget everything about the peer in `slot`.
    fn reset(&mut self, slot: DeviceSlot);

    fn found(&self, slot: DeviceSlot) -> bool;

    fn handle_in_range(&self, slot: DeviceSlot, handle: u16) -> bool;

    /// `HandleKind::Service` returns the service range. Each
    /// `HandleKind::Characteristic` call returns the descriptor range of the
    /// next characteristic and advances past it; `more` is false once every
    /// characteristic has been handed out.
    fn get_handles(&mut self, slot: DeviceSlot, kind: HandleKind) -> HandleQuery;

    /// Returns false for characteristics this service does not use.
    fn on_characteristic_found(&mut self, slot: DeviceSlot, characteristic: &CharacteristicFound)
        -> bool;

    fn on_descriptor_found(&mut self, slot: DeviceSlot, descriptor: &DescriptorFound);

    /// Called once the service's descriptors are discovered. Returns true if
    /// the service issued a request of its own; discovery then waits for its
    /// confirmation before moving to the next service.
    fn on_discovery_complete(
        &mut self,
        _slot: DeviceSlot,
        _requester: &mut AttributeRequester<'_>,
    ) -> Result<bool> {
        Ok(false)
    }

    /// One configuration step. Returns true after issuing a write, false once
    /// the service is fully configured.
    fn configure(&mut self, slot: DeviceSlot, requester: &mut AttributeRequester<'_>)
        -> Result<bool>;

    fn on_notify(&mut self, slot: DeviceSlot, handle: u16, value: &[u8]);

    fn on_read_confirm(&mut self, _slot: DeviceSlot, _handle: u16, _value: &[u8]) {}

    fn on_write_confirm(&mut self, _slot: DeviceSlot, _handle: u16) {}

    /// Value handles to read once the device is configured.
    fn initial_reads(&self, _slot: DeviceSlot) -> Vec<u16> {
        Vec::new()
    }
}

/// Lets a service issue reads and writes on its peer.
///
/// Requests go through the device's [`ProcedureTracker`], so a second read
/// (or write) while one is outstanding fails with `CentralError::Busy`.
pub struct AttributeRequester<'a> {
    link: &'a mut dyn LinkLayer,
    conn: ConnectionId,
    tracker: &'a mut ProcedureTracker,
    owner: Option<ServiceId>,
    queued: bool,
}

impl<'a> AttributeRequester<'a> {
    pub(crate) fn new(
        link: &'a mut dyn LinkLayer,
        conn: ConnectionId,
        tracker: &'a mut ProcedureTracker,
        owner: Option<ServiceId>,
    ) -> Self {
        Self {
            link,
            conn,
            tracker,
            owner,
            queued: false,
        }
    }

    pub(crate) fn from_queue(mut self) -> Self {
        self.queued = true;
        self
    }

    pub fn connection(&self) -> ConnectionId {
        self.conn
    }

    pub fn read(&mut self, handle: u16) -> Result<()> {
        self.issue(Outstanding {
            owner: self.owner,
            handle,
            op: AttributeOp::Read,
            queued: self.queued,
        })
    }

    pub fn write(&mut self, handle: u16, value: &[u8]) -> Result<()> {
        self.issue(Outstanding {
            owner: self.owner,
            handle,
            op: AttributeOp::Write(value.to_vec()),
            queued: self.queued,
        })
    }

    pub(crate) fn issue(&mut self, request: Outstanding) -> Result<()> {
        self.tracker.ensure_free(&request.op)?;
        match &request.op {
            AttributeOp::Read => {
                trace!("read 0x{:04x} on {}", request.handle, self.conn);
                self.link.read_attribute(self.conn, request.handle)?;
            }
            AttributeOp::Write(value) => {
                trace!(
                    "write 0x{:04x} <- {} on {}",
                    request.handle,
                    hex::encode(value),
                    self.conn
                );
                self.link.write_attribute(self.conn, request.handle, value)?;
            }
        }
        self.tracker.record(request);
        Ok(())
    }
}

/// A characteristic recorded by a service during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    pub uuid: Uuid,
    pub declaration_handle: u16,
    pub value_handle: u16,
    pub properties: CharacteristicProperties,
    /// Client configuration descriptor, when the peer has one
    pub cccd: Option<u16>,
}

impl From<&CharacteristicFound> for DiscoveredCharacteristic {
    fn from(found: &CharacteristicFound) -> Self {
        Self {
            uuid: found.uuid,
            declaration_handle: found.declaration_handle,
            value_handle: found.value_handle,
            properties: found.properties,
            cccd: None,
        }
    }
}

/// What a service knows about its instance on one peer.
///
/// Concrete descriptors keep one of these per device slot and delegate the
/// handle bookkeeping to it.
#[derive(Debug, Clone, Default)]
pub struct ServiceData {
    pub range: HandleRange,
    pub characteristics: Vec<DiscoveredCharacteristic>,
    cursor: usize,
}

impl ServiceData {
    pub fn new(range: HandleRange) -> Self {
        Self {
            range,
            characteristics: Vec::new(),
            cursor: 0,
        }
    }

    pub fn contains(&self, handle: u16) -> bool {
        self.range.contains(handle)
    }

    pub fn add_characteristic(&mut self, found: &CharacteristicFound) {
        self.characteristics.push(found.into());
    }

    pub fn handles(&mut self, kind: HandleKind) -> HandleQuery {
        match kind {
            HandleKind::Service => HandleQuery::some(self.range),
            HandleKind::Characteristic => self.next_descriptor_range(),
        }
    }

    /// From just after the value handle up to the attribute before the next
    /// characteristic declaration, or the end of the service.
    fn next_descriptor_range(&mut self) -> HandleQuery {
        let Some(current) = self.characteristics.get(self.cursor) else {
            return HandleQuery::none();
        };
        let end = self
            .characteristics
            .get(self.cursor + 1)
            .map(|next| next.declaration_handle.saturating_sub(1))
            .unwrap_or(self.range.end);
        let start = current.value_handle.saturating_add(1);
        self.cursor += 1;
        HandleQuery::some(HandleRange::new(start, end))
    }

    /// Attaches a CCCD to the characteristic whose descriptor range was
    /// handed out last. Other descriptors are ignored.
    ///
    /// The range may run over characteristics the service did not record,
    /// so only the first CCCD in it belongs to ours.
    pub fn add_descriptor(&mut self, descriptor: &DescriptorFound) -> bool {
        if descriptor.uuid != Uuid::Uuid16(CLIENT_CHAR_CONFIG_UUID) {
            return false;
        }
        let Some(index) = self.cursor.checked_sub(1) else {
            return false;
        };
        match self.characteristics.get_mut(index) {
            Some(ch) if ch.cccd.is_none() && ch.properties.can_notify_or_indicate() => {
                ch.cccd = Some(descriptor.handle);
                true
            }
            _ => false,
        }
    }

    pub fn characteristic(&self, uuid: &Uuid) -> Option<&DiscoveredCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }

    pub fn characteristic_by_value(&self, handle: u16) -> Option<&DiscoveredCharacteristic> {
        self.characteristics.iter().find(|c| c.value_handle == handle)
    }
}

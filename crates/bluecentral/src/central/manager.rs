//! Connection state machine
//!
//! [`Central`] owns the device slots and reacts to one [`CentralEvent`] at a
//! time. State-sensitive events (connections, pairing, timers) drive
//! transitions here; GATT events are handed to the discovery engine,
//! configuration engine and dispatcher, whose outcomes feed back into the
//! state machine.

use super::events::{CentralEvent, PairingResult};
use super::observer::CentralObserver;
use super::state::{ConnectionState, DeviceRecord, QueuedProcedure, TimerKind};
use crate::config::CentralConfig;
use crate::error::{CentralError, Result};
use crate::gap::{ConnectionParams, TypedAddress, HCI_SUCCESS};
use crate::gatt::{
    configure, discovery, dispatch, AttributeRequester, ConfigOutcome, ConfirmOutcome,
    DeviceSlot, DiscoveryOutcome, DiscoverySession, GattContext, ServiceDescriptor, ServiceId,
    ServiceRegistry,
};
use crate::link::{ConnectionId, LinkLayer, ScanFilter};
use crate::scan;
use crate::store::{BondRecord, BondStore, PersistentStore, SecurityKeys, StoreError};
use crate::timer::{TimerId, TimerService};
use log::{debug, error, info, trace, warn};

/// The central role: scanning, connecting, discovering, configuring and
/// bonding with peers, one event at a time.
pub struct Central<L: LinkLayer, T: TimerService, S: PersistentStore> {
    config: CentralConfig,
    link: L,
    timers: T,
    bonds: BondStore<S>,
    registry: ServiceRegistry,
    devices: Vec<DeviceRecord>,
    observer: Option<Box<dyn CentralObserver>>,
}

impl<L: LinkLayer, T: TimerService, S: PersistentStore> Central<L, T, S> {
    /// Create a central. The bond table is opened, and reset if its sanity
    /// marker is missing.
    pub fn new(config: CentralConfig, link: L, timers: T, store: S) -> Result<Self> {
        let bonds = BondStore::open(store, config.max_bonded_devices, config.eviction_policy)?;
        let registry = ServiceRegistry::new(config.max_services);
        let devices = vec![DeviceRecord::default(); config.max_devices];
        Ok(Self {
            config,
            link,
            timers,
            bonds,
            registry,
            devices,
            observer: None,
        })
    }

    pub fn register_service(&mut self, service: Box<dyn ServiceDescriptor>) -> Result<ServiceId> {
        let id = self.registry.register(service)?;
        debug!("Registered {} as {}", self.registry.get(id).name(), id);
        Ok(id)
    }

    pub fn set_observer(&mut self, observer: Box<dyn CentralObserver>) {
        self.observer = Some(observer);
    }

    /// Start scanning on the first idle slot.
    pub fn start(&mut self) -> Result<()> {
        info!(
            "Starting central with {} device slots and {} services",
            self.devices.len(),
            self.registry.len()
        );
        self.start_next_scan()
    }

    pub fn config(&self) -> &CentralConfig {
        &self.config
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn devices(&self) -> &[DeviceRecord] {
        &self.devices
    }

    pub fn device(&self, slot: DeviceSlot) -> Option<&DeviceRecord> {
        self.devices.get(slot.0)
    }

    pub fn state(&self, slot: DeviceSlot) -> Option<ConnectionState> {
        self.device(slot).map(|d| d.state)
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut T {
        &mut self.timers
    }

    pub fn bonds(&self) -> &BondStore<S> {
        &self.bonds
    }

    /// Process one event to completion.
    ///
    /// Protocol violations are logged, the device involved is disconnected,
    /// and the error is returned. Link refusals only disconnect.
    pub fn handle_event(&mut self, event: CentralEvent) -> Result<()> {
        match event {
            CentralEvent::AdvertisingReport {
                address,
                rssi,
                data,
            } => self.on_advertising_report(address, rssi, &data),
            CentralEvent::ConnectionComplete {
                address,
                status,
                conn,
                link_handle,
                params,
            } => self.on_connection_complete(address, status, conn, link_handle, params),
            CentralEvent::CancelConnectConfirm => self.on_cancel_connect_confirm(),
            CentralEvent::PrimaryServiceFound { conn, found } => {
                let slot = self.slot_for(conn)?;
                let result = self
                    .gatt(slot)
                    .and_then(|mut ctx| discovery::on_primary_found(&mut ctx, &found));
                if let Some(Some(id)) = self.check(slot, result)? {
                    let name = self.registry.get(id).name().to_string();
                    self.notify(|o| o.service_found(slot, id, &name));
                }
                Ok(())
            }
            CentralEvent::PrimaryDiscoveryComplete { conn, status } => {
                let slot = self.slot_for(conn)?;
                let result = self
                    .gatt(slot)
                    .and_then(|mut ctx| discovery::on_primary_complete(&mut ctx, status));
                self.after_discovery(slot, result)
            }
            CentralEvent::CharacteristicFound { conn, found } => {
                let slot = self.slot_for(conn)?;
                let result = self
                    .gatt(slot)
                    .and_then(|mut ctx| discovery::on_characteristic_found(&mut ctx, &found));
                self.check(slot, result).map(|_| ())
            }
            CentralEvent::CharacteristicDiscoveryComplete { conn, status } => {
                let slot = self.slot_for(conn)?;
                let result = self
                    .gatt(slot)
                    .and_then(|mut ctx| discovery::on_characteristics_complete(&mut ctx, status));
                self.after_discovery(slot, result)
            }
            CentralEvent::DescriptorFound { conn, found } => {
                let slot = self.slot_for(conn)?;
                let result = self
                    .gatt(slot)
                    .and_then(|mut ctx| discovery::on_descriptor_found(&mut ctx, &found));
                self.check(slot, result).map(|_| ())
            }
            CentralEvent::DescriptorDiscoveryComplete { conn, status } => {
                let slot = self.slot_for(conn)?;
                let result = self
                    .gatt(slot)
                    .and_then(|mut ctx| discovery::on_descriptors_complete(&mut ctx, status));
                self.after_discovery(slot, result)
            }
            CentralEvent::ReadConfirm {
                conn,
                handle,
                status,
                value,
            } => {
                let slot = self.slot_for(conn)?;
                let result = self
                    .gatt(slot)
                    .and_then(|mut ctx| dispatch::on_read_confirm(&mut ctx, handle, status, &value));
                self.after_confirm(slot, result)
            }
            CentralEvent::WriteConfirm {
                conn,
                handle,
                status,
            } => {
                let slot = self.slot_for(conn)?;
                let result = self
                    .gatt(slot)
                    .and_then(|mut ctx| dispatch::on_write_confirm(&mut ctx, handle, status));
                self.after_confirm(slot, result)
            }
            CentralEvent::Notification {
                conn,
                handle,
                value,
                indication,
            } => {
                let slot = self.slot_for(conn)?;
                if indication {
                    trace!("{}: indication on 0x{:04x}", slot, handle);
                }
                let device = &self.devices[slot.0];
                dispatch::on_notification(
                    &mut self.registry,
                    &device.discovered_services,
                    slot,
                    handle,
                    &value,
                );
                Ok(())
            }
            CentralEvent::KeyRequest { conn } => self.on_key_request(conn),
            CentralEvent::KeysDistributed { conn, keys } => self.on_keys_distributed(conn, keys),
            CentralEvent::PairingComplete { conn, result } => self.on_pairing_complete(conn, result),
            CentralEvent::ConnectionParamUpdateConfirm {
                conn,
                status,
                params,
            } => {
                let slot = self.slot_for(conn)?;
                if status == HCI_SUCCESS {
                    info!(
                        "{}: connection interval {}..{}, latency {}",
                        slot, params.interval_min, params.interval_max, params.latency
                    );
                    self.devices[slot.0].params = Some(params);
                } else {
                    warn!("{}: connection parameter update failed: 0x{:02x}", slot, status);
                }
                Ok(())
            }
            CentralEvent::DisconnectComplete { conn, reason } => {
                let slot = self.slot_for(conn)?;
                info!("{}: disconnected, reason 0x{:02x}", slot, reason);
                self.on_disconnected(slot, reason)
            }
            CentralEvent::TimerExpired(id) => self.on_timer(id),
        }
    }

    /// Disconnect a connected device, or abandon a pending connection.
    pub fn disconnect(&mut self, slot: DeviceSlot) -> Result<()> {
        match self.device_ref(slot)?.state {
            ConnectionState::Connected
            | ConnectionState::Discovering
            | ConnectionState::Configured => self.set_state(slot, ConnectionState::Disconnecting),
            ConnectionState::Disconnecting => Ok(()),
            ConnectionState::Connecting => {
                self.cancel_timer(slot, TimerKind::Connect);
                self.link.cancel_connect()?;
                Ok(())
            }
            ConnectionState::Init | ConnectionState::Scanning => {
                Err(CentralError::NotConnected(slot.0))
            }
        }
    }

    /// Queue a read. It is issued once the device is configured and nothing
    /// else is outstanding; the owning service, if any, gets the value.
    pub fn queue_read(&mut self, slot: DeviceSlot, handle: u16) -> Result<()> {
        let owner = self.connected_owner(slot, handle)?;
        self.devices[slot.0]
            .queue
            .push(QueuedProcedure::read(owner, handle));
        self.next_procedure(slot)
    }

    pub fn queue_write(&mut self, slot: DeviceSlot, handle: u16, value: &[u8]) -> Result<()> {
        let owner = self.connected_owner(slot, handle)?;
        self.devices[slot.0]
            .queue
            .push(QueuedProcedure::write(owner, handle, value.to_vec()));
        self.next_procedure(slot)
    }

    /// Forget the bond for `address`. Returns false if there was none.
    pub fn remove_bond(&mut self, address: &TypedAddress) -> Result<bool> {
        let Some(bond_slot) = self.bonds.find(address)? else {
            return Ok(false);
        };
        self.bonds.remove(bond_slot)?;
        for device in self.devices.iter_mut() {
            if device.bond_slot == Some(bond_slot) {
                device.bonded = false;
                device.bond_slot = None;
            }
        }
        info!("Removed bond for {}", address);
        Ok(true)
    }

    fn device_ref(&self, slot: DeviceSlot) -> Result<&DeviceRecord> {
        self.devices
            .get(slot.0)
            .ok_or(CentralError::InvalidSlot(slot.0))
    }

    fn slot_for(&self, conn: ConnectionId) -> Result<DeviceSlot> {
        self.devices
            .iter()
            .position(|d| d.conn == Some(conn))
            .map(DeviceSlot)
            .ok_or_else(|| {
                warn!("Event for unknown connection {}", conn);
                CentralError::UnknownConnection(conn)
            })
    }

    fn connected_owner(&self, slot: DeviceSlot, handle: u16) -> Result<Option<ServiceId>> {
        let device = self.device_ref(slot)?;
        if !device.state.is_connected() {
            return Err(CentralError::NotConnected(slot.0));
        }
        Ok(device.discovered_services.iter().copied().find(|&id| {
            let service = self.registry.get(id);
            service.found(slot) && service.handle_in_range(slot, handle)
        }))
    }

    fn gatt(&mut self, slot: DeviceSlot) -> Result<GattContext<'_>> {
        let max_services = self.config.max_services_per_device;
        let device = self
            .devices
            .get_mut(slot.0)
            .ok_or(CentralError::InvalidSlot(slot.0))?;
        let conn = device.conn.ok_or(CentralError::NotConnected(slot.0))?;
        Ok(GattContext {
            slot,
            conn,
            link: &mut self.link,
            registry: &mut self.registry,
            session: &mut device.session,
            discovered: &mut device.discovered_services,
            tracker: &mut device.tracker,
            max_services,
        })
    }

    fn notify(&mut self, f: impl FnOnce(&mut dyn CentralObserver)) {
        if let Some(observer) = self.observer.as_mut() {
            f(observer.as_mut());
        }
    }

    /// Funnel a failure through the disconnect transition. Link refusals are
    /// absorbed; anything else is an invariant breach and is returned.
    fn check<R>(&mut self, slot: DeviceSlot, result: Result<R>) -> Result<Option<R>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(CentralError::Link(err)) => {
                warn!("{}: link refused request: {}", slot, err);
                self.disconnect(slot)?;
                Ok(None)
            }
            Err(err) => {
                error!("{}: {}", slot, err);
                if let Err(disconnect_err) = self.disconnect(slot) {
                    warn!("{}: disconnect failed: {}", slot, disconnect_err);
                }
                Err(err)
            }
        }
    }

    fn after_discovery(&mut self, slot: DeviceSlot, result: Result<DiscoveryOutcome>) -> Result<()> {
        match self.check(slot, result)? {
            Some(outcome) => self.on_discovery_outcome(slot, outcome),
            None => Ok(()),
        }
    }

    fn after_confirm(&mut self, slot: DeviceSlot, result: Result<ConfirmOutcome>) -> Result<()> {
        match self.check(slot, result)? {
            Some(outcome) => self.on_confirm_outcome(slot, outcome),
            None => Ok(()),
        }
    }

    fn on_discovery_outcome(&mut self, slot: DeviceSlot, outcome: DiscoveryOutcome) -> Result<()> {
        match outcome {
            DiscoveryOutcome::Pending | DiscoveryOutcome::ServiceProcedure(_) => Ok(()),
            DiscoveryOutcome::Complete => {
                let result = self.gatt(slot).and_then(|mut ctx| configure::start(&mut ctx));
                match self.check(slot, result)? {
                    Some(outcome) => self.on_config_outcome(slot, outcome),
                    None => Ok(()),
                }
            }
            DiscoveryOutcome::MandatoryMissing(_)
            | DiscoveryOutcome::NothingFound
            | DiscoveryOutcome::Failed(_) => self.disconnect(slot),
        }
    }

    fn on_config_outcome(&mut self, slot: DeviceSlot, outcome: ConfigOutcome) -> Result<()> {
        match outcome {
            ConfigOutcome::Pending(id) => {
                trace!("{}: waiting on configuration write for {}", slot, id);
                Ok(())
            }
            ConfigOutcome::Complete => self.set_state(slot, ConnectionState::Configured),
        }
    }

    fn on_confirm_outcome(&mut self, slot: DeviceSlot, outcome: ConfirmOutcome) -> Result<()> {
        match outcome {
            ConfirmOutcome::Discovery(outcome) => self.on_discovery_outcome(slot, outcome),
            ConfirmOutcome::Configuration(outcome) => self.on_config_outcome(slot, outcome),
            ConfirmOutcome::Completed { queued } => {
                if queued {
                    self.devices[slot.0].queue.advance();
                }
                self.next_procedure(slot)
            }
            ConfirmOutcome::SecurityRequired => self.start_pairing(slot),
            ConfirmOutcome::Fatal(status) => {
                warn!("{}: disconnecting after {}", slot, status);
                self.disconnect(slot)
            }
        }
    }

    /// Issue the head of the queue if the device is configured and idle.
    fn next_procedure(&mut self, slot: DeviceSlot) -> Result<()> {
        let device = &mut self.devices[slot.0];
        if device.state != ConnectionState::Configured || device.tracker.has_pending_access() {
            return Ok(());
        }
        let (Some(conn), Some(item)) = (device.conn, device.queue.current()) else {
            return Ok(());
        };
        let request = item.to_outstanding();
        debug!("{}: issuing queued {:?} of 0x{:04x}", slot, request.op, request.handle);
        let result = AttributeRequester::new(&mut self.link, conn, &mut device.tracker, request.owner)
            .from_queue()
            .issue(request);
        self.check(slot, result).map(|_| ())
    }

    fn start_pairing(&mut self, slot: DeviceSlot) -> Result<()> {
        if !self.config.pairing_support {
            warn!("{}: peer requires pairing, which is disabled", slot);
            return self.disconnect(slot);
        }
        let device = &mut self.devices[slot.0];
        device.pairing_in_progress = true;
        let (Some(conn), Some(address)) = (device.conn, device.address) else {
            return Err(CentralError::NotConnected(slot.0));
        };
        self.notify(|o| o.pairing_required(slot, &address));
        let result = self.link.request_security(conn).map_err(CentralError::from);
        self.check(slot, result).map(|_| ())
    }

    /// Reissue the request parked by a security rejection, exactly once.
    fn resume_suspended(&mut self, slot: DeviceSlot) -> Result<()> {
        let device = &mut self.devices[slot.0];
        let Some(suspended) = device.tracker.take_suspended() else {
            return self.next_procedure(slot);
        };
        let Some(conn) = device.conn else {
            return Err(CentralError::NotConnected(slot.0));
        };

        let request = if suspended.queued {
            match device.queue.retry_current() {
                Some(item) if item.handle == suspended.handle => item.to_outstanding(),
                _ => {
                    let err = CentralError::violation(format!(
                        "{}: suspended 0x{:04x} is no longer at the head of the queue",
                        slot, suspended.handle
                    ));
                    return self.check::<()>(slot, Err(err)).map(|_| ());
                }
            }
        } else {
            suspended
        };

        info!("{}: resuming {:?} of 0x{:04x}", slot, request.op, request.handle);
        let result = AttributeRequester::new(&mut self.link, conn, &mut device.tracker, request.owner)
            .issue(request);
        self.check(slot, result).map(|_| ())
    }

    fn on_advertising_report(&mut self, address: TypedAddress, rssi: i8, data: &[u8]) -> Result<()> {
        let Some(slot) = self
            .devices
            .iter()
            .position(|d| d.state == ConnectionState::Scanning)
            .map(DeviceSlot)
        else {
            trace!("Ignoring advertisement from {}, not scanning", address);
            return Ok(());
        };

        if self
            .devices
            .iter()
            .any(|d| d.address == Some(address) && d.state != ConnectionState::Scanning)
        {
            trace!("Ignoring advertisement from {}, already tracked", address);
            return Ok(());
        }

        if self.config.filter_by_service {
            let advertised = scan::service_uuids(data);
            if !self.registry.matches_any(&advertised) {
                trace!("Ignoring {}, no supported service advertised", address);
                return Ok(());
            }
        }

        info!("{}: found {} (rssi {})", slot, address, rssi);
        self.notify(|o| o.device_found(slot, &address));
        if let Err(err) = self.link.scan_stop() {
            warn!("Failed to stop scanning: {}", err);
        }
        self.devices[slot.0].address = Some(address);
        self.set_state(slot, ConnectionState::Connecting)
    }

    fn on_connection_complete(
        &mut self,
        address: TypedAddress,
        status: u8,
        conn: ConnectionId,
        link_handle: u16,
        params: ConnectionParams,
    ) -> Result<()> {
        let Some(slot) = self
            .devices
            .iter()
            .position(|d| d.state == ConnectionState::Connecting && d.address == Some(address))
            .map(DeviceSlot)
        else {
            let err = CentralError::violation(format!(
                "connection complete for {} without a pending connect",
                address
            ));
            error!("{}", err);
            if status == HCI_SUCCESS {
                if let Err(link_err) = self.link.disconnect(conn) {
                    warn!("Failed to drop unexpected connection {}: {}", conn, link_err);
                }
            }
            return Err(err);
        };

        self.cancel_timer(slot, TimerKind::Connect);
        if status != HCI_SUCCESS {
            warn!("{}: connection to {} failed: 0x{:02x}", slot, address, status);
            self.notify(|o| o.connect_failed(&address));
            return self.set_state(slot, ConnectionState::Scanning);
        }

        let bond = match self.stored_bond(&address) {
            Ok(bond) => bond,
            Err(err) => {
                warn!("{}: bond lookup for {} failed, treating as unbonded: {}", slot, address, err);
                None
            }
        };

        let device = &mut self.devices[slot.0];
        device.conn = Some(conn);
        device.link_handle = Some(link_handle);
        device.params = Some(params);
        if let Some((bond_slot, record)) = bond {
            debug!("{}: {} is bonded in slot {}", slot, address, bond_slot);
            device.bonded = true;
            device.bond_slot = Some(bond_slot);
            device.keys = record.keys;
        }
        info!("{}: connected to {} as {}", slot, address, conn);
        self.set_state(slot, ConnectionState::Connected)
    }

    fn stored_bond(
        &self,
        address: &TypedAddress,
    ) -> std::result::Result<Option<(usize, BondRecord)>, StoreError> {
        match self.bonds.find(address)? {
            Some(bond_slot) => Ok(Some((bond_slot, self.bonds.read(bond_slot)?))),
            None => Ok(None),
        }
    }

    fn on_cancel_connect_confirm(&mut self) -> Result<()> {
        let Some(slot) = self
            .devices
            .iter()
            .position(|d| d.state == ConnectionState::Connecting)
            .map(DeviceSlot)
        else {
            debug!("Connect cancel confirmed with nothing pending");
            return Ok(());
        };
        if let Some(address) = self.devices[slot.0].address {
            self.notify(|o| o.connect_failed(&address));
        }
        self.set_state(slot, ConnectionState::Scanning)
    }

    fn on_key_request(&mut self, conn: ConnectionId) -> Result<()> {
        let slot = self.slot_for(conn)?;
        let device = &self.devices[slot.0];
        let keys = (device.bonded && !device.request_new_keys).then(|| device.keys.clone());
        debug!("{}: key request, answering with{} keys", slot, if keys.is_some() { "" } else { "out" });
        let result = self
            .link
            .key_request_response(conn, keys.as_ref())
            .map_err(CentralError::from);
        self.check(slot, result).map(|_| ())
    }

    fn on_keys_distributed(&mut self, conn: ConnectionId, keys: SecurityKeys) -> Result<()> {
        let slot = self.slot_for(conn)?;
        if !keys.is_valid() {
            warn!("{}: ignoring key distribution {:?}", slot, keys.key_set);
            return Ok(());
        }

        let device = &mut self.devices[slot.0];
        if device.bonded && !device.request_new_keys {
            debug!("{}: already bonded, keeping stored keys", slot);
            return Ok(());
        }
        device.keys = keys.clone();
        if !device.request_new_keys {
            return Ok(());
        }

        // The peer re-paired after losing its keys; replace ours right away.
        let stored = match device.bond_slot {
            Some(bond_slot) => self
                .bonds
                .write(bond_slot, &BondRecord::new(keys))
                .map(|_| bond_slot),
            None => self.bonds.store_bond(&keys),
        };
        match stored {
            Ok(bond_slot) => {
                info!("{}: replaced keys in bond slot {}", slot, bond_slot);
                self.devices[slot.0].bond_slot = Some(bond_slot);
            }
            Err(err) => warn!("{}: replacement keys not stored: {}", slot, err),
        }
        Ok(())
    }

    fn on_pairing_complete(&mut self, conn: ConnectionId, result: PairingResult) -> Result<()> {
        let slot = self.slot_for(conn)?;
        match result {
            PairingResult::Success { authenticated } => {
                self.cancel_timer(slot, TimerKind::Bonding);
                let device = &mut self.devices[slot.0];
                let replaced_keys = device.request_new_keys;
                device.pairing_in_progress = false;
                device.request_new_keys = false;
                info!("{}: link encrypted (authenticated: {})", slot, authenticated);
                self.record_bond(slot, replaced_keys);
                self.resume_suspended(slot)
            }
            PairingResult::KeyMissing if !self.devices[slot.0].bonded => {
                warn!("{}: encryption failed for lack of a key on an unbonded link", slot);
                self.disconnect(slot)
            }
            PairingResult::KeyMissing if !self.config.pairing_support => {
                warn!("{}: peer lost its keys and pairing is disabled", slot);
                self.disconnect(slot)
            }
            PairingResult::KeyMissing => {
                warn!("{}: peer lost its keys, pairing again", slot);
                let device = &mut self.devices[slot.0];
                device.request_new_keys = true;
                let result = self.link.request_security(conn).map_err(CentralError::from);
                self.check(slot, result).map(|_| ())
            }
            PairingResult::Failed(reason) => self.pairing_failed(slot, reason),
        }
    }

    fn pairing_failed(&mut self, slot: DeviceSlot, reason: u8) -> Result<()> {
        let device = &mut self.devices[slot.0];
        device.pairing_in_progress = false;
        if device.tracker.suspended().is_some() {
            warn!("{}: pairing failed (0x{:02x}), suspended request lost", slot, reason);
            return self.disconnect(slot);
        }
        warn!("{}: pairing failed: 0x{:02x}", slot, reason);
        Ok(())
    }

    /// Persist the bond if the distributed identity matches the peer.
    ///
    /// A store failure leaves the link encrypted but unbonded.
    fn record_bond(&mut self, slot: DeviceSlot, replaced_keys: bool) {
        let device = &self.devices[slot.0];
        if device.bonded && !replaced_keys {
            return;
        }
        if device.address.is_none() || device.keys.identity != device.address {
            debug!("{}: no identity keys for this peer, not bonding", slot);
            return;
        }

        match self.bonds.store_bond(&device.keys) {
            Ok(bond_slot) => {
                let device = &mut self.devices[slot.0];
                device.bonded = true;
                device.bond_slot = Some(bond_slot);
            }
            Err(StoreError::Full(slots)) => {
                warn!("{}: bond table full ({} slots), bond not stored", slot, slots);
            }
            Err(err) => warn!("{}: bond not stored: {}", slot, err),
        }
    }

    fn on_timer(&mut self, id: TimerId) -> Result<()> {
        let claimed = self
            .devices
            .iter_mut()
            .enumerate()
            .find_map(|(index, d)| d.timers.claim(id).map(|kind| (DeviceSlot(index), kind)));
        let Some((slot, kind)) = claimed else {
            debug!("Ignoring stale {}", id);
            return Ok(());
        };

        let device = &self.devices[slot.0];
        match (kind, device.state) {
            (TimerKind::Connect, ConnectionState::Connecting) => {
                warn!("{}: connection attempt timed out", slot);
                if let Err(err) = self.link.cancel_connect() {
                    warn!("{}: cancel connect failed: {}", slot, err);
                    return self.set_state(slot, ConnectionState::Scanning);
                }
                Ok(())
            }
            (TimerKind::Discovery, ConnectionState::Connected) => {
                self.set_state(slot, ConnectionState::Discovering)
            }
            (TimerKind::Bonding, state) if state.is_connected() => {
                let (Some(conn), Some(address)) = (device.conn, device.address) else {
                    return Ok(());
                };
                if device.pairing_in_progress || address.is_resolvable_random() {
                    debug!("{}: leaving security to the peer", slot);
                    return Ok(());
                }
                debug!("{}: requesting security", slot);
                let result = self.link.request_security(conn).map_err(CentralError::from);
                self.check(slot, result).map(|_| ())
            }
            (kind, state) => {
                debug!("{}: {:?} timer expired in {:?}, ignoring", slot, kind, state);
                Ok(())
            }
        }
    }

    fn arm_timer(&mut self, slot: DeviceSlot, kind: TimerKind, duration: std::time::Duration) {
        self.cancel_timer(slot, kind);
        let id = self.timers.arm(duration);
        self.devices[slot.0].timers.set(kind, id);
    }

    fn cancel_timer(&mut self, slot: DeviceSlot, kind: TimerKind) {
        if let Some(id) = self.devices[slot.0].timers.take(kind) {
            self.timers.cancel(id);
        }
    }

    fn cancel_timers(&mut self, slot: DeviceSlot) {
        for kind in [TimerKind::Connect, TimerKind::Discovery, TimerKind::Bonding] {
            self.cancel_timer(slot, kind);
        }
    }

    fn scan_filter(&self) -> ScanFilter {
        if self.config.filter_by_service {
            ScanFilter::Services(self.registry.uuids())
        } else {
            ScanFilter::Any
        }
    }

    /// Scan on the first idle slot unless another slot holds the pipeline.
    fn start_next_scan(&mut self) -> Result<()> {
        if self.devices.iter().any(|d| d.state.is_blocking()) {
            return Ok(());
        }
        match self
            .devices
            .iter()
            .position(|d| d.state == ConnectionState::Init)
        {
            Some(index) => self.set_state(DeviceSlot(index), ConnectionState::Scanning),
            None => {
                debug!("All device slots in use");
                Ok(())
            }
        }
    }

    fn on_disconnected(&mut self, slot: DeviceSlot, reason: u8) -> Result<()> {
        let address = self.devices[slot.0].address;
        self.cancel_timers(slot);
        self.registry.reset_device(slot);
        self.devices[slot.0].clear();
        self.notify(|o| o.device_disconnected(slot, address.as_ref(), reason));

        let busy = self
            .devices
            .iter()
            .enumerate()
            .any(|(index, d)| index != slot.0 && d.state.is_blocking());
        let next = if busy {
            ConnectionState::Init
        } else {
            ConnectionState::Scanning
        };
        self.set_state(slot, next)
    }

    /// Same-state transitions do nothing.
    fn set_state(&mut self, slot: DeviceSlot, new: ConnectionState) -> Result<()> {
        let old = self.device_ref(slot)?.state;
        if old == new {
            return Ok(());
        }
        self.exit_state(slot, old);
        self.devices[slot.0].state = new;
        info!("{}: {:?} -> {:?}", slot, old, new);
        self.enter_state(slot, new)
    }

    fn exit_state(&mut self, slot: DeviceSlot, old: ConnectionState) {
        match old {
            ConnectionState::Init => self.devices[slot.0].clear(),
            ConnectionState::Connecting => self.cancel_timer(slot, TimerKind::Connect),
            ConnectionState::Connected => self.cancel_timer(slot, TimerKind::Discovery),
            ConnectionState::Scanning
            | ConnectionState::Discovering
            | ConnectionState::Configured
            | ConnectionState::Disconnecting => {}
        }
    }

    fn enter_state(&mut self, slot: DeviceSlot, new: ConnectionState) -> Result<()> {
        match new {
            ConnectionState::Init => Ok(()),
            ConnectionState::Scanning => {
                self.cancel_timers(slot);
                self.registry.reset_device(slot);
                self.devices[slot.0].clear();
                let filter = self.scan_filter();
                self.link.scan_start(&filter)?;
                Ok(())
            }
            ConnectionState::Connecting => {
                let address = self.devices[slot.0].address.ok_or_else(|| {
                    CentralError::violation(format!("{}: connecting without an address", slot))
                })?;
                self.arm_timer(slot, TimerKind::Connect, self.config.connect_timeout);
                if let Err(err) = self.link.connect(address) {
                    warn!("{}: connect to {} refused: {}", slot, address, err);
                    self.notify(|o| o.connect_failed(&address));
                    return self.set_state(slot, ConnectionState::Scanning);
                }
                Ok(())
            }
            ConnectionState::Connected => {
                if self.config.pairing_support {
                    self.arm_timer(slot, TimerKind::Bonding, self.config.bonding_chance_delay);
                }
                self.arm_timer(slot, TimerKind::Discovery, self.config.discovery_start_delay);
                Ok(())
            }
            ConnectionState::Discovering => {
                let result = self.gatt(slot).and_then(|mut ctx| discovery::start(&mut ctx));
                self.after_discovery(slot, result)
            }
            ConnectionState::Configured => {
                self.devices[slot.0].session = DiscoverySession::default();
                let device = &self.devices[slot.0];
                let (Some(conn), Some(address)) = (device.conn, device.address) else {
                    return Err(CentralError::NotConnected(slot.0));
                };
                let reads: Vec<QueuedProcedure> = device
                    .discovered_services
                    .iter()
                    .flat_map(|&id| {
                        self.registry
                            .get(id)
                            .initial_reads(slot)
                            .into_iter()
                            .map(move |handle| QueuedProcedure::read(Some(id), handle))
                    })
                    .collect();

                let params = self.config.preferred_params;
                if let Err(err) = self.link.update_connection_params(conn, &params) {
                    warn!("{}: connection parameter update refused: {}", slot, err);
                }
                self.notify(|o| o.device_configured(slot, &address));

                let queue = &mut self.devices[slot.0].queue;
                for read in reads {
                    queue.push(read);
                }
                self.next_procedure(slot)?;
                self.start_next_scan()
            }
            ConnectionState::Disconnecting => {
                self.cancel_timers(slot);
                let device = &mut self.devices[slot.0];
                device.session = DiscoverySession::default();
                match device.conn {
                    Some(conn) => match self.link.disconnect(conn) {
                        Ok(()) => Ok(()),
                        Err(err) => {
                            warn!("{}: disconnect refused ({}), dropping connection", slot, err);
                            self.on_disconnected(slot, 0)
                        }
                    },
                    None => self.on_disconnected(slot, 0),
                }
            }
        }
    }
}

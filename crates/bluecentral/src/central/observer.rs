use crate::gap::TypedAddress;
use crate::gatt::{DeviceSlot, ServiceId};

/// Application hooks invoked by the central. Every method defaults to a
/// no-op.
pub trait CentralObserver {
    /// An advertiser passed the filter and a connection is being attempted.
    fn device_found(&mut self, _slot: DeviceSlot, _address: &TypedAddress) {}

    fn service_found(&mut self, _slot: DeviceSlot, _service: ServiceId, _name: &str) {}

    /// Discovery and configuration are done.
    fn device_configured(&mut self, _slot: DeviceSlot, _address: &TypedAddress) {}

    /// The peer rejected a request for lack of security and pairing was
    /// requested.
    fn pairing_required(&mut self, _slot: DeviceSlot, _address: &TypedAddress) {}

    fn connect_failed(&mut self, _address: &TypedAddress) {}

    fn device_disconnected(
        &mut self,
        _slot: DeviceSlot,
        _address: Option<&TypedAddress>,
        _reason: u8,
    ) {
    }
}

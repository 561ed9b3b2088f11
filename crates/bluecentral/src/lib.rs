//! BlueCentral - GATT client orchestration for Bluetooth Low Energy centrals
//!
//! This library drives the central side of a BLE connection on top of a
//! link stack it does not own: it scans for peripherals advertising the
//! services it cares about, connects, discovers those services and their
//! characteristics, configures notifications, and keeps bonds in a small
//! persistent table. Services plug in through the
//! [`ServiceDescriptor`](gatt::ServiceDescriptor) trait.
//!
//! Everything is event driven. The link stack and the timer service report
//! back through [`Central::handle_event`], one [`CentralEvent`] at a time.

pub mod central;
pub mod config;
pub mod error;
pub mod gap;
pub mod gatt;
pub mod link;
pub mod scan;
pub mod services;
pub mod store;
pub mod timer;

#[cfg(test)]
pub(crate) mod testing;

// Re-export common types for convenience
pub use central::{Central, CentralEvent, CentralObserver, ConnectionState, PairingResult};
pub use config::CentralConfig;
pub use error::{CentralError, Result};
pub use gap::{AddressType, BdAddr, ConnectionParams, TypedAddress};
pub use gatt::{
    AttributeRequester, DeviceSlot, GattStatus, HandleRange, ServiceData, ServiceDescriptor,
    ServiceId, Uuid,
};
pub use link::{ConnectionId, LinkError, LinkLayer, ScanFilter};
pub use scan::parse_advertising_data;
pub use services::{BatteryService, DeviceInfoService};
pub use store::{BondStore, EvictionPolicy, MemoryStore, PersistentStore, SecurityKeys};
pub use timer::{SimulatedTimers, TimerId, TimerService};

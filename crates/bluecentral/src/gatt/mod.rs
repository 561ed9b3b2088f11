//! GATT client orchestration
//!
//! Service descriptors plug into a [`ServiceRegistry`]. For each connected
//! peer the discovery engine finds the registered services and their
//! attributes, the configuration engine then configures them one by one,
//! and the dispatcher routes confirmations and notifications back to the
//! owning service.

pub mod configure;
pub mod constants;
pub mod context;
pub mod discovery;
pub mod dispatch;
pub mod events;
pub mod registry;
pub mod service;
pub mod session;
pub mod status;
pub mod types;

#[cfg(test)]
mod tests;

pub use configure::ConfigOutcome;
pub use context::GattContext;
pub use discovery::DiscoveryOutcome;
pub use dispatch::ConfirmOutcome;
pub use events::{CharacteristicFound, DescriptorFound, PrimaryServiceFound};
pub use registry::{ServiceId, ServiceRegistry};
pub use service::{AttributeRequester, DiscoveredCharacteristic, ServiceData, ServiceDescriptor};
pub use session::{DiscoveryPhase, DiscoverySession, ProcedureTracker};
pub use status::{AttErrorCode, GattStatus};
pub use types::{
    CharacteristicProperties, DeviceSlot, HandleKind, HandleQuery, HandleRange, Uuid,
};
